//! Handles the pool can manage.

use crate::error::{Error, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::fmt;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::debug;

/// A running task with a liveness check and a way to stop it.
pub trait ManagedHandle: Send + 'static {
    /// False once the task has finished.
    fn is_alive(&self) -> bool;

    /// Ask the task to stop. Must not block.
    fn terminate(&mut self);
}

/// Stop request seen from inside a [`Worker`] body.
///
/// The signal fires when the owning `Worker` is terminated or dropped.
pub struct StopSignal {
    rx: Receiver<()>,
}

impl StopSignal {
    /// Signal plus the sender that fires it when dropped.
    pub fn pair() -> (Sender<()>, Self) {
        let (tx, rx) = bounded(1);
        (tx, Self { rx })
    }

    pub fn is_stopped(&self) -> bool {
        !matches!(self.rx.try_recv(), Err(TryRecvError::Empty))
    }

    /// Sleep for up to `timeout`. Returns true if a stop was requested.
    pub fn wait(&self, timeout: Duration) -> bool {
        !matches!(self.rx.recv_timeout(timeout), Err(RecvTimeoutError::Timeout))
    }

    /// Channel that disconnects on stop, for use in `select!`.
    pub(crate) fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }
}

/// A named background thread that can be stopped cooperatively.
pub struct Worker {
    name: String,
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawn `body` on a new thread. The body should return soon after its
    /// [`StopSignal`] fires.
    pub fn spawn<F>(name: impl Into<String>, body: F) -> Result<Self>
    where
        F: FnOnce(StopSignal) + Send + 'static,
    {
        let name = name.into();
        let (stop, signal) = StopSignal::pair();
        let thread = thread::Builder::new()
            .name(name.clone())
            .spawn(move || body(signal))
            .map_err(Error::Spawn)?;

        Ok(Self {
            name,
            stop: Some(stop),
            thread: Some(thread),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop the worker and wait for its thread to exit.
    pub fn join(mut self) {
        self.stop.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                debug!(worker = %self.name, "worker panicked");
            }
        }
    }
}

impl ManagedHandle for Worker {
    fn is_alive(&self) -> bool {
        self.thread
            .as_ref()
            .map(|t| !t.is_finished())
            .unwrap_or(false)
    }

    fn terminate(&mut self) {
        // Dropping the sender fires the signal; the thread is detached.
        self.stop.take();
        self.thread.take();
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("name", &self.name)
            .field("alive", &self.is_alive())
            .finish()
    }
}
