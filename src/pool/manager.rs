//! Bounded pool of live handles with a background reaper.

use crate::config::PoolConfig;
use crate::error::{Error, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

use super::handle::ManagedHandle;

/// A pooled handle and its insertion sequence.
struct Entry<H> {
    seq: u64,
    handle: H,
}

struct PoolState<H> {
    /// Oldest first.
    entries: VecDeque<Entry<H>>,
    next_seq: u64,
    cycles: u64,
}

struct Shared<H> {
    state: Mutex<PoolState<H>>,
    max: usize,
}

impl<H: ManagedHandle> Shared<H> {
    /// Drop every handle that has finished. Returns how many were removed.
    fn sweep(&self) -> usize {
        let mut state = self.state.lock();
        let before = state.entries.len();
        state.entries.retain(|e| e.handle.is_alive());
        let removed = before - state.entries.len();
        state.cycles += 1;
        if removed > 0 {
            debug!(removed, remaining = state.entries.len(), "reaped finished handles");
        }
        removed
    }
}

/// Holds at most `max` live handles, evicting the oldest on overflow.
///
/// A reaper thread periodically drops handles whose task has finished.
/// Handles still in the pool when it is dropped are terminated.
pub struct ResourcePool<H: ManagedHandle> {
    shared: Arc<Shared<H>>,
    /// Dropping this stops the reaper.
    shutdown: Option<Sender<()>>,
    reaper: Option<JoinHandle<()>>,
}

impl<H: ManagedHandle> ResourcePool<H> {
    /// Create a pool and start its reaper.
    pub fn new(config: PoolConfig) -> Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(PoolState {
                entries: VecDeque::new(),
                next_seq: 1,
                cycles: 0,
            }),
            max: config.max,
        });

        let (shutdown, shutdown_rx) = bounded(1);
        let reaper_shared = Arc::clone(&shared);
        let reaper = thread::Builder::new()
            .name("pool-reaper".to_string())
            .spawn(move || reap_loop(reaper_shared, shutdown_rx, config))
            .map_err(Error::Spawn)?;

        Ok(Self {
            shared,
            shutdown: Some(shutdown),
            reaper: Some(reaper),
        })
    }

    /// Add a handle at the tail. If that puts the pool over capacity, the
    /// oldest handle is terminated and removed. Returns the handle's
    /// insertion sequence.
    pub fn add(&self, handle: H) -> u64 {
        let mut state = self.shared.state.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.entries.push_back(Entry { seq, handle });

        while state.entries.len() > self.shared.max {
            if let Some(mut evicted) = state.entries.pop_front() {
                debug!(seq = evicted.seq, max = self.shared.max, "evicting oldest handle");
                evicted.handle.terminate();
            }
        }
        seq
    }

    pub fn size(&self) -> usize {
        self.shared.state.lock().entries.len()
    }

    pub fn max(&self) -> usize {
        self.shared.max
    }

    /// Completed reaper sweeps.
    pub fn cycles(&self) -> u64 {
        self.shared.state.lock().cycles
    }

    /// Insertion sequences of the pooled handles, oldest first.
    pub fn sequences(&self) -> Vec<u64> {
        self.shared.state.lock().entries.iter().map(|e| e.seq).collect()
    }

    /// Run one reaper sweep now. Returns how many handles were removed.
    pub fn sweep(&self) -> usize {
        self.shared.sweep()
    }

    /// Terminate and remove every handle. Returns how many were removed.
    pub fn kill_all(&self) -> usize {
        let mut state = self.shared.state.lock();
        let count = state.entries.len();
        for mut entry in state.entries.drain(..) {
            entry.handle.terminate();
        }
        count
    }

    /// Keep only the `n` most recently added handles, terminating the rest.
    ///
    /// `None` is rejected: there is no sensible default bound.
    pub fn keep(&self, n: Option<usize>) -> Result<usize> {
        let n = n.ok_or(Error::MissingArgument("keep() needs the number of handles to keep"))?;
        let mut state = self.shared.state.lock();
        let mut removed = 0;
        while state.entries.len() > n {
            if let Some(mut entry) = state.entries.pop_front() {
                entry.handle.terminate();
                removed += 1;
            }
        }
        Ok(removed)
    }
}

fn reap_loop<H: ManagedHandle>(shared: Arc<Shared<H>>, shutdown: Receiver<()>, config: PoolConfig) {
    let stopped = |r: std::result::Result<(), RecvTimeoutError>| {
        !matches!(r, Err(RecvTimeoutError::Timeout))
    };

    loop {
        while shared.state.lock().entries.is_empty() {
            if stopped(shutdown.recv_timeout(config.poll_interval)) {
                return;
            }
        }
        if stopped(shutdown.recv_timeout(config.settle_delay)) {
            return;
        }
        shared.sweep();
    }
}

impl<H: ManagedHandle> Drop for ResourcePool<H> {
    fn drop(&mut self) {
        self.shutdown.take();
        if let Some(reaper) = self.reaper.take() {
            if reaper.join().is_err() {
                warn!("pool reaper panicked");
            }
        }
        self.kill_all();
    }
}

impl<H: ManagedHandle> fmt::Debug for ResourcePool<H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("ResourcePool")
            .field("max", &self.shared.max)
            .field("size", &state.entries.len())
            .field("cycles", &state.cycles)
            .finish()
    }
}
