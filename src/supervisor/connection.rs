//! Connection supervisor: single-flight connect, disable/enable and
//! retrying sends.

use crate::config::{RetryPolicy, SupervisorConfig};
use crate::deferred::{Courier, DeferredItem};
use crate::error::{Error, Result, TransientKind};
use crate::notifications::NotificationHub;
use crate::types::EventKind;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::service::ServiceSlot;
use super::transport::{Connector, Session};

/// Event type produced by a connector's sessions.
pub type SessionEvent<C> = <<C as Connector>::Session as Session>::Event;

/// Observable state of the supervised connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Explicitly disconnected; implicit reconnects are suppressed.
    Disabled,
    Disconnected,
    Connecting,
    Connected,
}

/// What a call to [`ConnectionSupervisor::connect`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectOutcome {
    Connected,
    /// Another caller was already connecting; nothing was done.
    Skipped,
}

/// Owns the live session and is the only path to the collaborator's
/// `send`.
///
/// Connects lazily on first send. Transient I/O failures during a send
/// trigger a reconnect and a retry, up to the configured cap.
pub struct ConnectionSupervisor<C: Connector> {
    connector: C,
    config: SupervisorConfig,
    retry: RetryPolicy,
    session: RwLock<Option<Arc<C::Session>>>,
    /// Held for the whole connect sequence. Never waited on.
    connect_lock: Mutex<()>,
    disabled: AtomicBool,
    /// Retry backoffs wait on the receiver; disabling drops the sender,
    /// which wakes them. Replaced on re-enable.
    halt: Mutex<(Option<Sender<()>>, Receiver<()>)>,
    /// Last status payload, re-sent after each connect.
    status: Mutex<Option<Vec<u8>>>,
    service: ServiceSlot,
    hub: Arc<NotificationHub<EventKind, SessionEvent<C>>>,
    connects: AtomicU64,
    send_attempts: AtomicU64,
}

impl<C: Connector> ConnectionSupervisor<C> {
    /// Create a supervisor. No connection is made until it is needed.
    pub fn new(connector: C, config: SupervisorConfig, retry: RetryPolicy) -> Self {
        Self::with_hub(connector, config, retry, Arc::new(NotificationHub::new()))
    }

    /// Create a supervisor publishing inbound events on an existing hub.
    pub fn with_hub(
        connector: C,
        config: SupervisorConfig,
        retry: RetryPolicy,
        hub: Arc<NotificationHub<EventKind, SessionEvent<C>>>,
    ) -> Self {
        let (halt_tx, halt_rx) = bounded(1);
        Self {
            connector,
            config,
            retry,
            session: RwLock::new(None),
            connect_lock: Mutex::new(()),
            disabled: AtomicBool::new(false),
            halt: Mutex::new((Some(halt_tx), halt_rx)),
            status: Mutex::new(None),
            service: ServiceSlot::new(),
            hub,
            connects: AtomicU64::new(0),
            send_attempts: AtomicU64::new(0),
        }
    }

    /// Hub receiving inbound events from every session.
    pub fn hub(&self) -> &Arc<NotificationHub<EventKind, SessionEvent<C>>> {
        &self.hub
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    // --- State ---

    /// True iff there is a session and it reports itself live.
    pub fn is_connected(&self) -> bool {
        self.session
            .read()
            .as_ref()
            .map(|s| s.is_connected())
            .unwrap_or(false)
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> ConnectionState {
        if self.is_disabled() {
            ConnectionState::Disabled
        } else if self.connect_lock.is_locked() {
            ConnectionState::Connecting
        } else if self.is_connected() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    /// Successful connects so far.
    pub fn connect_count(&self) -> u64 {
        self.connects.load(Ordering::SeqCst)
    }

    /// Payload writes attempted through the collaborator so far.
    pub fn send_attempts(&self) -> u64 {
        self.send_attempts.load(Ordering::SeqCst)
    }

    // --- Connect / disconnect ---

    /// Open, authenticate and install a new session.
    ///
    /// If another caller is connecting right now this returns
    /// `ConnectOutcome::Skipped` at once, without waiting for it.
    pub fn connect(&self) -> Result<ConnectOutcome> {
        if self.is_disabled() {
            return Err(Error::ConnectionDisabled);
        }
        let Some(_guard) = self.connect_lock.try_lock() else {
            debug!("connect already in progress, skipping");
            return Ok(ConnectOutcome::Skipped);
        };

        if self.session.read().is_some() {
            self.close_session();
        }

        info!(host = %self.config.host, port = self.config.port, "connecting");
        let session = self
            .connector
            .connect(&self.config.host, self.config.port)
            .map_err(Error::Connect)?;
        if let Err(e) = session.authenticate(&self.config.credential) {
            let _ = session.close();
            return Err(Error::Auth(e));
        }

        let session = Arc::new(session);
        self.register_callbacks(&session);
        *self.session.write() = Some(Arc::clone(&session));

        // A disconnect() issued while connecting wins over this connect.
        if self.is_disabled() {
            info!("disconnect requested while connecting, dropping new session");
            self.close_session();
            return Err(Error::ConnectionDisabled);
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        info!(identity = %self.config.credential.identity, "connected");

        let status = self.status.lock().clone();
        if let Some(status) = status {
            if let Err(error) = session.send(&status) {
                warn!(%error, "failed to restore status after connect");
            }
        }

        if let Some(service) = &self.config.default_service {
            self.service.clear();
            if let Err(error) = self.service.bind(service, session.is_connected()) {
                warn!(%service, %error, "failed to re-attach service");
            }
        }

        Ok(ConnectOutcome::Connected)
    }

    /// Close the live session, if any.
    ///
    /// With `auto_reconnect == false` the supervisor becomes disabled and
    /// will not connect again until [`reconnect`](Self::reconnect).
    pub fn disconnect_with(&self, auto_reconnect: bool) {
        if !auto_reconnect {
            let mut halt = self.halt.lock();
            self.disabled.store(true, Ordering::SeqCst);
            halt.0.take();
        }
        self.close_session();
        self.service.clear();
    }

    /// Disconnect and suppress automatic reconnects.
    pub fn disconnect(&self) {
        info!("disconnect requested");
        self.disconnect_with(false);
    }

    /// Re-enable connections and connect.
    pub fn reconnect(&self) -> Result<ConnectOutcome> {
        {
            let mut halt = self.halt.lock();
            if halt.0.is_none() {
                let (tx, rx) = bounded(1);
                *halt = (Some(tx), rx);
            }
            self.disabled.store(false, Ordering::SeqCst);
        }
        self.connect()
    }

    /// Sleep for a retry backoff. Cut short with `ConnectionDisabled` if
    /// the supervisor is disabled meanwhile.
    fn backoff(&self, delay: Duration) -> Result<()> {
        let halt = {
            let halt = self.halt.lock();
            if self.is_disabled() {
                return Err(Error::ConnectionDisabled);
            }
            halt.1.clone()
        };
        match halt.recv_timeout(delay) {
            Err(RecvTimeoutError::Timeout) => Ok(()),
            _ => {
                debug!("retry backoff interrupted by disconnect");
                Err(Error::ConnectionDisabled)
            }
        }
    }

    fn close_session(&self) {
        let Some(session) = self.session.write().take() else {
            return;
        };
        if !session.is_connected() {
            return;
        }
        match session.close() {
            Ok(()) => debug!("session closed"),
            Err(error) if TransientKind::classify(&error).is_some() => {
                debug!(%error, "ignoring transient error while closing")
            }
            Err(error) => warn!(%error, "error while closing session"),
        }
    }

    /// Route every kind of inbound event from `session` into the hub.
    fn register_callbacks(&self, session: &C::Session) {
        for kind in EventKind::ALL {
            let hub = Arc::clone(&self.hub);
            session.on_event(
                kind,
                Box::new(move |event| {
                    hub.mark_changed(&kind);
                    let report = hub.notify(&kind, &event);
                    if !report.is_ok() {
                        debug!(kind = %kind, failures = report.failures.len(), "observers failed");
                    }
                }),
            );
        }
    }

    // --- Sending ---

    /// Send a payload, reconnecting and retrying on transient I/O errors.
    ///
    /// Broken-pipe class errors wait `pipe_delay`; connection resets wait
    /// `reset_delay(attempt)`. After `max_retries` retries the last error is
    /// returned as `TransientIo`. Other errors are returned at once.
    pub fn send(&self, payload: &[u8]) -> Result<()> {
        if self.is_disabled() {
            return Err(Error::ConnectionDisabled);
        }

        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            let err = match self.send_once(payload)? {
                Ok(()) => return Ok(()),
                Err(err) => err,
            };

            let Some(kind) = TransientKind::classify(&err) else {
                return Err(Error::PermanentIo(err));
            };
            if attempts > self.retry.max_retries {
                warn!(attempts, error = %err, "giving up after transient errors");
                return Err(Error::TransientIo {
                    attempts,
                    source: err,
                });
            }

            let delay = match kind {
                TransientKind::BrokenPipe => self.retry.pipe_delay,
                TransientKind::ConnectionReset => self.retry.reset_delay(attempts),
            };
            warn!(attempts, ?kind, ?delay, error = %err, "send failed, reconnecting");
            self.backoff(delay)?;

            self.disconnect_with(true);
            self.connect()?;
        }
    }

    /// One write. The outer error aborts the send; the inner one is the
    /// I/O result to classify.
    fn send_once(&self, payload: &[u8]) -> Result<io::Result<()>> {
        if !self.is_connected() {
            self.connect()?;
        }
        let session = self.session.read().clone();
        let Some(session) = session else {
            return Ok(Err(io::Error::from(io::ErrorKind::NotConnected)));
        };
        self.send_attempts.fetch_add(1, Ordering::SeqCst);
        Ok(session.send(payload))
    }

    /// Remember `payload` as the current status and send it. It is sent
    /// again after every reconnect.
    pub fn set_status(&self, payload: Vec<u8>) -> Result<()> {
        *self.status.lock() = Some(payload.clone());
        // A fresh connect announces the stored status itself.
        if !self.is_connected() && self.connect()? == ConnectOutcome::Connected {
            return Ok(());
        }
        self.send(&payload)
    }

    /// Store a status to announce on the next connect, without sending it.
    pub fn remember_status(&self, payload: Vec<u8>) {
        *self.status.lock() = Some(payload);
    }

    pub fn status(&self) -> Option<Vec<u8>> {
        self.status.lock().clone()
    }

    // --- Service binding ---

    /// Bind the one-time service. Fails with `AlreadySet` if bound.
    pub fn bind_service(&self, name: &str) -> Result<()> {
        self.service.bind(name, self.is_connected())
    }

    pub fn clear_service(&self) {
        self.service.clear();
    }

    pub fn service(&self) -> Option<String> {
        self.service.get()
    }

    /// Bound service name or `NoService`.
    pub fn require_service(&self) -> Result<String> {
        self.service.require()
    }

    /// Whether the live session reports `destination` as ready.
    pub fn is_peer_ready(&self, destination: &str) -> bool {
        self.session
            .read()
            .as_ref()
            .map(|s| s.is_connected() && s.is_peer_ready(destination))
            .unwrap_or(false)
    }
}

impl<C: Connector> Courier for ConnectionSupervisor<C> {
    fn is_ready(&self, destination: &str) -> bool {
        self.is_peer_ready(destination)
    }

    fn deliver(&self, item: &DeferredItem) -> Result<()> {
        self.send(&item.payload)
    }
}

impl<C: Connector> fmt::Debug for ConnectionSupervisor<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSupervisor")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("state", &self.state())
            .field("service", &self.service.get())
            .field("connects", &self.connect_count())
            .finish()
    }
}
