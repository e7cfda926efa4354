//! FIFO retry buffer with a background redelivery worker.

use crate::config::DeferredConfig;
use crate::error::Result;
use crate::pool::{StopSignal, Worker};
use crate::types::DeliveryKind;
use crossbeam_channel::{bounded, select, Receiver, Sender};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::types::{Courier, DeferredItem, DeferredStats};

/// Margin past an item's deadline before the worker looks at it, so the
/// expiry check is already true when the pass runs.
const EXPIRY_SLACK: Duration = Duration::from_millis(1);

struct Shared {
    items: Mutex<VecDeque<DeferredItem>>,
    /// Serializes delivery passes.
    pass: Mutex<()>,
    max_wait_ms: AtomicU64,
    courier: Arc<dyn Courier>,
    /// Nudges the worker when an item is queued.
    wake: Sender<()>,
    delivered: AtomicU64,
    failed: AtomicU64,
    expired: AtomicU64,
    requeued: AtomicU64,
}

impl Shared {
    fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms.load(Ordering::Relaxed))
    }

    /// Earliest instant at which a queued item runs out of time.
    fn next_expiry(&self) -> Option<Instant> {
        let max_wait = self.max_wait();
        self.items
            .lock()
            .iter()
            .filter_map(|item| item.enqueued_at.checked_add(max_wait))
            .min()
    }

    /// Look at every item queued when the pass starts, once, oldest first.
    fn run_pass(&self) -> usize {
        let _pass = self.pass.lock();
        let pending = self.items.lock().len();
        let max_wait = self.max_wait();
        let mut handled = 0;

        for _ in 0..pending {
            let Some(item) = self.items.lock().pop_front() else {
                break;
            };

            if self.courier.is_ready(&item.destination) {
                handled += 1;
                match self.courier.deliver(&item) {
                    Ok(()) => {
                        self.delivered.fetch_add(1, Ordering::Relaxed);
                        debug!(destination = %item.destination, "deferred item delivered");
                    }
                    Err(error) => {
                        self.failed.fetch_add(1, Ordering::Relaxed);
                        warn!(destination = %item.destination, %error, "deferred delivery failed, dropping item");
                    }
                }
            } else if item.is_expired(Instant::now(), max_wait) {
                handled += 1;
                self.expired.fetch_add(1, Ordering::Relaxed);
                warn!(
                    destination = %item.destination,
                    waited = ?item.enqueued_at.elapsed(),
                    "deferred item expired"
                );
            } else {
                self.requeued.fetch_add(1, Ordering::Relaxed);
                self.items.lock().push_back(item);
            }
        }
        handled
    }
}

/// Buffers outbound items whose destination is not ready yet and retries
/// them from a background worker until delivered or expired.
pub struct DeferredQueue {
    shared: Arc<Shared>,
    worker: Option<Worker>,
}

impl DeferredQueue {
    /// Create a queue delivering through `courier` and start its worker.
    pub fn new(config: DeferredConfig, courier: Arc<dyn Courier>) -> Result<Self> {
        let (wake, wake_rx) = bounded(1);
        let shared = Arc::new(Shared {
            items: Mutex::new(VecDeque::new()),
            pass: Mutex::new(()),
            max_wait_ms: AtomicU64::new(config.max_wait.as_millis() as u64),
            courier,
            wake,
            delivered: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            expired: AtomicU64::new(0),
            requeued: AtomicU64::new(0),
        });

        let worker_shared = Arc::clone(&shared);
        let interval = config.poll_interval;
        let worker = Worker::spawn("deferred-delivery", move |stop| {
            delivery_loop(worker_shared, stop, wake_rx, interval)
        })?;

        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    /// Queue an item for later delivery.
    pub fn enqueue(&self, destination: impl Into<String>, payload: Vec<u8>, kind: DeliveryKind) {
        self.push(DeferredItem::new(destination, payload, kind));
    }

    /// Queue a prepared item. Its `enqueued_at` is kept as given.
    pub fn push(&self, item: DeferredItem) {
        debug!(destination = %item.destination, "deferring item");
        self.shared.items.lock().push_back(item);
        let _ = self.shared.wake.try_send(());
    }

    pub fn len(&self) -> usize {
        self.shared.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.items.lock().is_empty()
    }

    /// Destinations of the queued items, head first.
    pub fn destinations(&self) -> Vec<String> {
        self.shared
            .items
            .lock()
            .iter()
            .map(|i| i.destination.clone())
            .collect()
    }

    pub fn max_wait(&self) -> Duration {
        self.shared.max_wait()
    }

    /// Change how long items may wait. Applies to items already queued.
    pub fn set_max_wait(&self, max_wait: Duration) {
        self.shared
            .max_wait_ms
            .store(max_wait.as_millis() as u64, Ordering::Relaxed);
        let _ = self.shared.wake.try_send(());
    }

    /// Run one delivery pass on the calling thread. Returns how many items
    /// left the queue (delivered, failed or expired).
    pub fn process_pending(&self) -> usize {
        self.shared.run_pass()
    }

    pub fn stats(&self) -> DeferredStats {
        DeferredStats {
            delivered: self.shared.delivered.load(Ordering::Relaxed),
            failed: self.shared.failed.load(Ordering::Relaxed),
            expired: self.shared.expired.load(Ordering::Relaxed),
            requeued: self.shared.requeued.load(Ordering::Relaxed),
        }
    }
}

/// Runs a pass `interval` after the queue becomes non-empty, and again
/// each `interval` while it stays so. Also runs one as soon as the oldest
/// item's max wait is up.
fn delivery_loop(shared: Arc<Shared>, stop: StopSignal, wake: Receiver<()>, interval: Duration) {
    let mut next_pass: Option<Instant> = None;
    loop {
        let now = Instant::now();
        if shared.items.lock().is_empty() {
            next_pass = None;
        } else if next_pass.is_none() {
            next_pass = now.checked_add(interval);
        }

        let expiry = shared
            .next_expiry()
            .and_then(|at| at.checked_add(EXPIRY_SLACK));
        let deadline = match (next_pass, expiry) {
            (Some(pass), Some(expiry)) => Some(pass.min(expiry)),
            (pass, expiry) => pass.or(expiry),
        };
        let timeout = deadline
            .map(|at| at.saturating_duration_since(now))
            .unwrap_or(interval);

        select! {
            recv(stop.receiver()) -> _ => return,
            recv(wake) -> _ => {}
            default(timeout) => {
                if deadline.is_some_and(|at| Instant::now() >= at) {
                    shared.run_pass();
                    next_pass = None;
                }
            }
        }
    }
}

impl Drop for DeferredQueue {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.join();
        }
        let left = self.shared.items.lock().len();
        if left > 0 {
            debug!(left, "deferred queue dropped with pending items");
        }
    }
}

impl std::fmt::Debug for DeferredQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredQueue")
            .field("len", &self.len())
            .field("max_wait", &self.max_wait())
            .field("stats", &self.stats())
            .finish()
    }
}
