//! Client facade tying the components together.

use crate::config::ClientConfig;
use crate::deferred::{Courier, DeferredQueue};
use crate::error::{Error, Result};
use crate::notifications::{NotificationHub, Observer, QueueObserver};
use crate::pool::{ResourcePool, StopSignal, Worker};
use crate::supervisor::{ConnectOutcome, ConnectionSupervisor, Connector, SessionEvent};
use crate::types::{DeliveryKind, EventKind, ObserverId};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Observer id used by the auto observer on every event kind.
pub const AUTO_OBSERVER_ID: &str = "auto-observer";

/// How [`ResilientClient::deliver`] handled a payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Written to the live session.
    Sent,
    /// Destination not ready; queued for later delivery.
    Deferred,
}

/// A long-lived client: supervised connection, change-driven event
/// fan-out, deferred delivery and a bounded pool of background tasks.
///
/// Inbound events of every [`EventKind`] are published on
/// [`hub`](Self::hub).
pub struct ResilientClient<C: Connector> {
    supervisor: Arc<ConnectionSupervisor<C>>,
    deferred: DeferredQueue,
    tasks: ResourcePool<Worker>,
    auto: Mutex<Option<Arc<QueueObserver<EventKind, SessionEvent<C>>>>>,
    delivered: AtomicU64,
}

impl<C: Connector> ResilientClient<C> {
    /// Build a client and start its background workers. The connection is
    /// opened lazily, or explicitly with [`connect`](Self::connect).
    pub fn new(connector: C, config: ClientConfig) -> Result<Self> {
        let supervisor = Arc::new(ConnectionSupervisor::new(
            connector,
            config.supervisor,
            config.retry,
        ));
        if let Some(status) = config.initial_status {
            supervisor.remember_status(status);
        }

        let courier: Arc<dyn Courier> = supervisor.clone();
        let deferred = DeferredQueue::new(config.deferred, courier)?;
        let tasks = ResourcePool::new(config.pool)?;

        Ok(Self {
            supervisor,
            deferred,
            tasks,
            auto: Mutex::new(None),
            delivered: AtomicU64::new(0),
        })
    }

    pub fn supervisor(&self) -> &Arc<ConnectionSupervisor<C>> {
        &self.supervisor
    }

    pub fn hub(&self) -> &Arc<NotificationHub<EventKind, SessionEvent<C>>> {
        self.supervisor.hub()
    }

    pub fn deferred(&self) -> &DeferredQueue {
        &self.deferred
    }

    pub fn tasks(&self) -> &ResourcePool<Worker> {
        &self.tasks
    }

    // --- Connection ---

    pub fn connect(&self) -> Result<ConnectOutcome> {
        self.supervisor.connect()
    }

    pub fn reconnect(&self) -> Result<ConnectOutcome> {
        self.supervisor.reconnect()
    }

    /// Disconnect and stay disconnected until [`reconnect`](Self::reconnect).
    pub fn disconnect(&self) {
        self.supervisor.disconnect();
    }

    pub fn is_connected(&self) -> bool {
        self.supervisor.is_connected()
    }

    pub fn set_status(&self, payload: Vec<u8>) -> Result<()> {
        self.supervisor.set_status(payload)
    }

    // --- Delivery ---

    /// Send `payload` now if `destination` is ready, otherwise queue it
    /// until it is (or until the deferred max wait runs out).
    pub fn deliver(
        &self,
        destination: &str,
        payload: Vec<u8>,
        kind: DeliveryKind,
    ) -> Result<Delivery> {
        if self.supervisor.is_disabled() {
            return Err(Error::ConnectionDisabled);
        }
        if !self.supervisor.is_connected() {
            self.supervisor.connect()?;
        }

        if self.supervisor.is_peer_ready(destination) {
            self.supervisor.send(&payload)?;
            self.delivered.fetch_add(1, Ordering::Relaxed);
            Ok(Delivery::Sent)
        } else {
            debug!(%destination, ?kind, "destination not ready, deferring");
            self.deferred.enqueue(destination, payload, kind);
            Ok(Delivery::Deferred)
        }
    }

    /// Queue `payload` for `destination` without trying to send it now.
    pub fn deliver_deferred(&self, destination: &str, payload: Vec<u8>, kind: DeliveryKind) {
        self.deferred.enqueue(destination, payload, kind);
    }

    pub fn deferred_max_wait(&self) -> Duration {
        self.deferred.max_wait()
    }

    pub fn set_deferred_max_wait(&self, max_wait: Duration) {
        self.deferred.set_max_wait(max_wait);
    }

    /// Payloads sent directly plus deferred items delivered later.
    pub fn delivered_count(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed) + self.deferred.stats().delivered
    }

    // --- Counters ---

    /// Observers registered per event kind.
    pub fn observer_counts(&self) -> BTreeMap<EventKind, usize> {
        EventKind::ALL
            .iter()
            .map(|kind| (*kind, self.hub().count_subscribers(Some(kind))))
            .collect()
    }

    /// Dispatches performed per event kind.
    pub fn notification_counts(&self) -> BTreeMap<EventKind, u64> {
        EventKind::ALL
            .iter()
            .map(|kind| (*kind, self.hub().count_dispatches(kind)))
            .collect()
    }

    // --- Background tasks ---

    /// Run `body` on a pooled background thread. Returns its sequence in
    /// the task pool.
    pub fn spawn_task<F>(&self, name: impl Into<String>, body: F) -> Result<u64>
    where
        F: FnOnce(StopSignal) + Send + 'static,
    {
        let worker = Worker::spawn(name, body)?;
        Ok(self.tasks.add(worker))
    }
}

impl<C> ResilientClient<C>
where
    C: Connector,
    SessionEvent<C>: Clone,
{
    /// Subscribe a [`QueueObserver`] to every event kind.
    pub fn attach_auto_observer(&self) -> Result<Arc<QueueObserver<EventKind, SessionEvent<C>>>> {
        let mut auto = self.auto.lock();
        if auto.is_some() {
            return Err(Error::AlreadySet("auto observer already attached".to_string()));
        }

        let id = ObserverId::new(AUTO_OBSERVER_ID);
        if let Some(kind) = EventKind::ALL
            .into_iter()
            .find(|kind| self.hub().subscribers(kind).contains(&id))
        {
            return Err(Error::AlreadySet(format!(
                "observer id {} already in use on {}",
                id, kind
            )));
        }

        let observer = Arc::new(QueueObserver::new());
        for kind in EventKind::ALL {
            let shared: Arc<dyn Observer<EventKind, SessionEvent<C>>> = observer.clone();
            self.hub().subscribe_shared(kind, AUTO_OBSERVER_ID, shared)?;
        }
        *auto = Some(Arc::clone(&observer));
        Ok(observer)
    }

    /// Remove the auto observer from every event kind.
    pub fn detach_auto_observer(&self) -> Result<()> {
        let mut auto = self.auto.lock();
        if auto.take().is_none() {
            return Err(Error::NotAttached);
        }
        let id = ObserverId::new(AUTO_OBSERVER_ID);
        for kind in EventKind::ALL {
            self.hub().unsubscribe(&kind, &id);
        }
        Ok(())
    }

    pub fn auto_observer(&self) -> Option<Arc<QueueObserver<EventKind, SessionEvent<C>>>> {
        self.auto.lock().clone()
    }
}

impl<C: Connector> Drop for ResilientClient<C> {
    fn drop(&mut self) {
        // Wakes any send sleeping in a retry backoff so the deferred
        // worker can be joined.
        self.supervisor.disconnect();
    }
}

impl<C: Connector> fmt::Debug for ResilientClient<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientClient")
            .field("identity", &self.supervisor.config().credential.identity)
            .field("delivered", &self.delivered_count())
            .field("deferred", &self.deferred.len())
            .field("observer_counts", &self.observer_counts())
            .field("notification_counts", &self.notification_counts())
            .field("service", &self.supervisor.service())
            .finish()
    }
}
