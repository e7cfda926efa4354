//! Bounded pool of background handles.
//!
//! The pool owns every handle added to it until the handle is evicted
//! (capacity overflow, `keep`, `kill_all`) or found finished by the reaper.
//! Eviction terminates the handle; reaping only forgets it.

mod handle;
mod manager;

pub use handle::{ManagedHandle, StopSignal, Worker};
pub use manager::ResourcePool;
