//! Topic-scoped notification hub with dirty-flag delivery.

use crate::error::{Error, Result};
use crate::types::ObserverId;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use super::types::{Disposition, HandlerFailure, NotifyReport, Observer};

/// A registered observer.
struct Subscriber<T, A> {
    id: ObserverId,
    observer: Arc<dyn Observer<T, A>>,
}

impl<T, A> Clone for Subscriber<T, A> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            observer: Arc::clone(&self.observer),
        }
    }
}

/// Mutable per-topic state.
struct TopicState<T, A> {
    /// Observers in subscription order.
    subscribers: Vec<Subscriber<T, A>>,
    /// Unconsumed change pending.
    dirty: bool,
}

/// Per-topic entry. Each topic has its own lock so dispatching on one
/// topic never blocks another.
struct TopicEntry<T, A> {
    state: Mutex<TopicState<T, A>>,
    /// Total dispatches, one per (notify, observer) pair.
    dispatches: AtomicU64,
}

impl<T, A> TopicEntry<T, A> {
    fn new() -> Self {
        Self {
            state: Mutex::new(TopicState {
                subscribers: Vec::new(),
                dirty: false,
            }),
            dispatches: AtomicU64::new(0),
        }
    }
}

/// Fans events out to observers, at most once per marked change.
///
/// A topic must be marked with [`mark_changed`](Self::mark_changed) before
/// [`notify`](Self::notify) delivers anything; `notify` consumes the mark.
/// Observers run outside the topic lock, on the caller's thread, in
/// subscription order.
pub struct NotificationHub<T, A> {
    topics: RwLock<HashMap<T, Arc<TopicEntry<T, A>>>>,
}

impl<T, A> NotificationHub<T, A>
where
    T: Eq + Hash + Clone + fmt::Debug,
{
    /// Create an empty hub.
    pub fn new() -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
        }
    }

    fn entry(&self, topic: &T) -> Option<Arc<TopicEntry<T, A>>> {
        self.topics.read().get(topic).cloned()
    }

    fn entry_or_create(&self, topic: &T) -> Arc<TopicEntry<T, A>> {
        if let Some(entry) = self.entry(topic) {
            return entry;
        }
        let mut topics = self.topics.write();
        Arc::clone(
            topics
                .entry(topic.clone())
                .or_insert_with(|| Arc::new(TopicEntry::new())),
        )
    }

    // --- Subscriptions ---

    /// Subscribe an observer to a topic.
    ///
    /// Subscribing an id that is already present replaces its observer and
    /// keeps its position in the dispatch order.
    pub fn subscribe<O>(&self, topic: T, id: impl Into<ObserverId>, observer: O) -> Result<()>
    where
        O: Observer<T, A> + 'static,
    {
        self.subscribe_shared(topic, id, Arc::new(observer))
    }

    /// Subscribe an observer that is shared with other topics or callers.
    pub fn subscribe_shared(
        &self,
        topic: T,
        id: impl Into<ObserverId>,
        observer: Arc<dyn Observer<T, A>>,
    ) -> Result<()> {
        let id = id.into();
        if id.as_str().is_empty() {
            return Err(Error::InvalidObserver("empty observer id".to_string()));
        }
        if !observer.accepts(&topic) {
            return Err(Error::InvalidObserver(format!(
                "observer {} cannot handle topic {:?}",
                id, topic
            )));
        }

        let entry = self.entry_or_create(&topic);
        let mut state = entry.state.lock();
        match state.subscribers.iter_mut().find(|s| s.id == id) {
            Some(existing) => existing.observer = observer,
            None => state.subscribers.push(Subscriber { id, observer }),
        }
        Ok(())
    }

    /// Remove one observer from a topic. No-op if absent.
    pub fn unsubscribe(&self, topic: &T, id: &ObserverId) {
        if let Some(entry) = self.entry(topic) {
            entry.state.lock().subscribers.retain(|s| &s.id != id);
        }
    }

    /// Remove every observer of one topic, or of all topics when `None`.
    pub fn unsubscribe_all(&self, topic: Option<&T>) {
        match topic {
            Some(topic) => {
                if let Some(entry) = self.entry(topic) {
                    entry.state.lock().subscribers.clear();
                }
            }
            None => {
                for entry in self.topics.read().values() {
                    entry.state.lock().subscribers.clear();
                }
            }
        }
    }

    /// Number of observers of one topic, or the sum over all topics.
    pub fn count_subscribers(&self, topic: Option<&T>) -> usize {
        match topic {
            Some(topic) => self
                .entry(topic)
                .map(|e| e.state.lock().subscribers.len())
                .unwrap_or(0),
            None => self
                .topics
                .read()
                .values()
                .map(|e| e.state.lock().subscribers.len())
                .sum(),
        }
    }

    /// Observer ids of a topic, in dispatch order.
    pub fn subscribers(&self, topic: &T) -> Vec<ObserverId> {
        self.entry(topic)
            .map(|e| e.state.lock().subscribers.iter().map(|s| s.id.clone()).collect())
            .unwrap_or_default()
    }

    /// Total dispatches performed for a topic. 0 for unknown topics.
    pub fn count_dispatches(&self, topic: &T) -> u64 {
        self.entry(topic)
            .map(|e| e.dispatches.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    // --- Change tracking ---

    /// Mark a topic as having an unconsumed change.
    pub fn mark_changed(&self, topic: &T) {
        self.set_changed(topic, true);
    }

    /// Set the dirty flag of a topic explicitly.
    pub fn set_changed(&self, topic: &T, changed: bool) {
        if !changed && self.entry(topic).is_none() {
            return;
        }
        self.entry_or_create(topic).state.lock().dirty = changed;
    }

    pub fn is_changed(&self, topic: &T) -> bool {
        self.entry(topic)
            .map(|e| e.state.lock().dirty)
            .unwrap_or(false)
    }

    // --- Dispatch ---

    /// Deliver `event` to every observer of `topic` if the topic is marked
    /// as changed, then clear the mark.
    ///
    /// The mark is consumed when the observer list is snapshotted, so a
    /// change marked while observers are running is kept for the next call.
    /// Observer errors and panics are isolated: they are logged, collected
    /// into the report, and dispatch continues with the next observer.
    pub fn notify(&self, topic: &T, event: &A) -> NotifyReport {
        let mut report = NotifyReport::default();
        let Some(entry) = self.entry(topic) else {
            return report;
        };

        let snapshot = {
            let mut state = entry.state.lock();
            if !state.dirty {
                return report;
            }
            state.dirty = false;
            state.subscribers.clone()
        };

        for sub in snapshot {
            entry.dispatches.fetch_add(1, Ordering::SeqCst);
            report.dispatched += 1;

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| sub.observer.update(topic, event)));
            match outcome {
                Ok(Ok(Disposition::Keep)) => {}
                Ok(Ok(Disposition::Unsubscribe)) => {
                    // Only this handler: the id may have been re-subscribed
                    // with a new one while it ran.
                    entry
                        .state
                        .lock()
                        .subscribers
                        .retain(|s| s.id != sub.id || !same_observer(&s.observer, &sub.observer));
                    debug!(topic = ?topic, observer = %sub.id, "observer unsubscribed itself");
                    report.unsubscribed.push(sub.id);
                }
                Ok(Err(error)) => {
                    warn!(topic = ?topic, observer = %sub.id, %error, "observer failed");
                    report.failures.push(HandlerFailure {
                        observer: sub.id,
                        error,
                    });
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    warn!(topic = ?topic, observer = %sub.id, %message, "observer panicked");
                    report.failures.push(HandlerFailure {
                        observer: sub.id,
                        error: Error::Handler(message),
                    });
                }
            }
        }

        report
    }

    /// Mark a topic as changed and notify its observers in one step.
    pub fn publish(&self, topic: &T, event: &A) -> NotifyReport {
        self.mark_changed(topic);
        self.notify(topic, event)
    }
}

fn same_observer<T, A>(a: &Arc<dyn Observer<T, A>>, b: &Arc<dyn Observer<T, A>>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "observer panicked".to_string()
    }
}

impl<T, A> Default for NotificationHub<T, A>
where
    T: Eq + Hash + Clone + fmt::Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, A> fmt::Debug for NotificationHub<T, A>
where
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let topics = self.topics.read();
        let mut map = f.debug_map();
        for (topic, entry) in topics.iter() {
            map.entry(topic, &entry.state.lock().subscribers.len());
        }
        map.finish()
    }
}
