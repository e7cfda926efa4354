//! Deferred delivery of outbound work.
//!
//! Items whose destination is not ready are kept in a FIFO and retried by
//! a background worker. An item leaves the queue when it is handed to the
//! courier (success or not) or when it has waited longer than the max
//! wait; an item that is not ready yet goes back to the tail.

mod queue;
mod types;

pub use queue::DeferredQueue;
pub use types::{Courier, DeferredItem, DeferredStats};
