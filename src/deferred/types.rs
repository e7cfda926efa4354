//! Deferred delivery types.

use crate::error::Result;
use crate::types::DeliveryKind;
use std::fmt;
use std::time::{Duration, Instant};

/// Outbound work waiting for its destination to become ready.
#[derive(Clone)]
pub struct DeferredItem {
    pub destination: String,
    pub payload: Vec<u8>,
    pub kind: DeliveryKind,
    pub enqueued_at: Instant,
}

impl DeferredItem {
    pub fn new(destination: impl Into<String>, payload: Vec<u8>, kind: DeliveryKind) -> Self {
        Self {
            destination: destination.into(),
            payload,
            kind,
            enqueued_at: Instant::now(),
        }
    }

    /// True once the item has waited longer than `max_wait`.
    pub fn is_expired(&self, now: Instant, max_wait: Duration) -> bool {
        self.enqueued_at
            .checked_add(max_wait)
            .is_some_and(|deadline| now > deadline)
    }
}

impl fmt::Debug for DeferredItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredItem")
            .field("destination", &self.destination)
            .field("kind", &self.kind)
            .field("payload_size", &self.payload.len())
            .field("age", &self.enqueued_at.elapsed())
            .finish()
    }
}

/// Delivery path used by the deferred queue.
pub trait Courier: Send + Sync {
    /// Whether `destination` can receive now.
    fn is_ready(&self, destination: &str) -> bool;

    /// Attempt delivery. The queue drops the item whatever the outcome.
    fn deliver(&self, item: &DeferredItem) -> Result<()>;
}

/// Counters kept by the deferred queue.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeferredStats {
    /// Items handed to the courier successfully.
    pub delivered: u64,
    /// Items handed to the courier that failed to send.
    pub failed: u64,
    /// Items dropped after waiting longer than the max wait.
    pub expired: u64,
    /// Times an item went back to the tail because its destination was
    /// not ready.
    pub requeued: u64,
}
