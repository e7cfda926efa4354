//! Change-driven notification fan-out.
//!
//! Observers subscribe to topics under an identity that is unique per
//! topic. Producers mark a topic as changed and then call `notify`; the
//! event reaches each observer at most once per marked change, no matter
//! how many times `notify` is triggered in between.
//!
//! # Example
//!
//! ```ignore
//! let hub: NotificationHub<EventKind, String> = NotificationHub::new();
//!
//! hub.subscribe(EventKind::Message, "printer", |kind: &EventKind, body: &String| {
//!     println!("{kind}: {body}");
//!     Disposition::Keep
//! })?;
//!
//! hub.mark_changed(&EventKind::Message);
//! hub.notify(&EventKind::Message, &"hello".to_string()); // delivered
//! hub.notify(&EventKind::Message, &"again".to_string()); // no-op
//! ```

mod hub;
mod queue_observer;
mod types;

pub use hub::NotificationHub;
pub use queue_observer::QueueObserver;
pub use types::{Disposition, HandlerFailure, NotifyReport, Observer};
