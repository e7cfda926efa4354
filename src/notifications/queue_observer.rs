//! Observer that buffers every notification it receives.

use crate::error::Result;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::hash::Hash;

use super::types::{Disposition, Observer};

/// Collects events per topic so a caller can poll for them instead of
/// reacting inside a callback.
pub struct QueueObserver<T, A> {
    queues: Mutex<HashMap<T, Vec<A>>>,
}

impl<T, A> QueueObserver<T, A>
where
    T: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
        }
    }

    /// Topics that have buffered events.
    pub fn queues(&self) -> Vec<T> {
        self.queues
            .lock()
            .iter()
            .filter(|(_, events)| !events.is_empty())
            .map(|(topic, _)| topic.clone())
            .collect()
    }

    /// True if at least one event is buffered for `topic`.
    pub fn has_received(&self, topic: &T) -> bool {
        self.queues
            .lock()
            .get(topic)
            .map(|events| !events.is_empty())
            .unwrap_or(false)
    }

    /// Drain buffered events for `topic`, oldest first.
    pub fn take_received(&self, topic: &T) -> Vec<A> {
        self.queues.lock().remove(topic).unwrap_or_default()
    }

    /// Total buffered events over all topics.
    pub fn len(&self) -> usize {
        self.queues.lock().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T, A> Default for QueueObserver<T, A>
where
    T: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, A> Observer<T, A> for QueueObserver<T, A>
where
    T: Eq + Hash + Clone + Send,
    A: Clone + Send,
{
    fn update(&self, topic: &T, event: &A) -> Result<Disposition> {
        self.queues
            .lock()
            .entry(topic.clone())
            .or_default()
            .push(event.clone());
        Ok(Disposition::Keep)
    }
}
