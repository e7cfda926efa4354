//! Observer types for the notification hub.

use crate::error::Result;
use crate::types::ObserverId;

/// What an observer wants after handling a notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Disposition {
    /// Stay subscribed.
    #[default]
    Keep,
    /// Remove this observer from the topic right after this dispatch.
    Unsubscribe,
}

/// Something that can be notified about changes on a topic.
///
/// Closures of the shape `Fn(&T, &A) -> Disposition` are observers out of
/// the box. Implement the trait directly to report failures or to restrict
/// the topics an observer can be registered on.
pub trait Observer<T, A>: Send + Sync {
    /// Handle one notification.
    fn update(&self, topic: &T, event: &A) -> Result<Disposition>;

    /// Capability check, run once at subscribe time.
    fn accepts(&self, _topic: &T) -> bool {
        true
    }
}

impl<T, A, F> Observer<T, A> for F
where
    F: Fn(&T, &A) -> Disposition + Send + Sync,
{
    fn update(&self, topic: &T, event: &A) -> Result<Disposition> {
        Ok(self(topic, event))
    }
}

/// An observer that failed while being notified.
#[derive(Debug)]
pub struct HandlerFailure {
    pub observer: ObserverId,
    pub error: crate::error::Error,
}

/// Outcome of a single `notify` call.
#[derive(Debug, Default)]
pub struct NotifyReport {
    /// Number of observers the event was dispatched to.
    pub dispatched: usize,
    /// Observers removed because they asked to unsubscribe.
    pub unsubscribed: Vec<ObserverId>,
    /// Observers that returned an error or panicked. The remaining
    /// observers were still notified.
    pub failures: Vec<HandlerFailure>,
}

impl NotifyReport {
    /// True if nothing was dispatched (topic was not marked as changed,
    /// or had no observers).
    pub fn is_empty(&self) -> bool {
        self.dispatched == 0
    }

    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }
}
