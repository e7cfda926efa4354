//! # Tenacity
//!
//! Resilience and coordination layer for a long-lived messaging client.
//!
//! ## Core Concepts
//!
//! - **Notifications**: Topic-keyed observers that only fire when a topic
//!   has been marked as changed
//! - **Pool**: Bounded registry of background handles with FIFO eviction
//!   and a reaper for finished ones
//! - **Deferred delivery**: Outbound items parked until their destination
//!   is ready, expired after a maximum wait
//! - **Supervisor**: Single-flight connect, explicit disable, and retrying
//!   sends across transient I/O failures
//!
//! ## Example
//!
//! ```ignore
//! use tenacity::{ClientConfig, DeliveryKind, EventKind, ResilientClient};
//!
//! let client = ResilientClient::new(connector, ClientConfig::default())?;
//!
//! // Buffer every inbound event for polling
//! let inbox = client.attach_auto_observer()?;
//!
//! // Sent now if the peer is ready, queued otherwise
//! client.deliver("alice@example.com", payload, DeliveryKind::Chat)?;
//!
//! for event in inbox.take_received(&EventKind::Message) {
//!     println!("{:?}", event);
//! }
//! ```

pub mod client;
pub mod config;
pub mod deferred;
pub mod error;
pub mod notifications;
pub mod pool;
pub mod supervisor;
pub mod types;

// Re-exports
pub use client::{Delivery, ResilientClient, AUTO_OBSERVER_ID};
pub use config::{ClientConfig, DeferredConfig, PoolConfig, RetryPolicy, SupervisorConfig};
pub use deferred::{Courier, DeferredItem, DeferredQueue, DeferredStats};
pub use error::{Error, Result, TransientKind};
pub use notifications::{
    Disposition, HandlerFailure, NotificationHub, NotifyReport, Observer, QueueObserver,
};
pub use pool::{ManagedHandle, ResourcePool, StopSignal, Worker};
pub use supervisor::{
    ConnectOutcome, ConnectionState, ConnectionSupervisor, Connector, EventCallback, Session,
    ServiceSlot, SessionEvent,
};
pub use types::{Credential, DeliveryKind, EventKind, ObserverId};
