//! One-time service binding.

use crate::error::{Error, Result};
use parking_lot::Mutex;

/// Holds at most one bound service name (for instance the publish/subscribe
/// component of the server). Binding twice is an error; clear it first.
#[derive(Debug, Default)]
pub struct ServiceSlot {
    bound: Mutex<Option<String>>,
}

impl ServiceSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `name`. Requires a live connection.
    pub fn bind(&self, name: &str, connected: bool) -> Result<()> {
        if !connected {
            return Err(Error::NotConnected);
        }
        let mut bound = self.bound.lock();
        if let Some(existing) = bound.as_ref() {
            return Err(Error::AlreadySet(format!("service already bound to {}", existing)));
        }
        *bound = Some(name.to_string());
        Ok(())
    }

    pub fn clear(&self) {
        self.bound.lock().take();
    }

    pub fn get(&self) -> Option<String> {
        self.bound.lock().clone()
    }

    /// The bound service, or `NoService`.
    pub fn require(&self) -> Result<String> {
        self.get().ok_or(Error::NoService)
    }

    pub fn is_bound(&self) -> bool {
        self.bound.lock().is_some()
    }
}
