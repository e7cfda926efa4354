//! Scripted in-memory connector shared by the integration tests.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tenacity::{
    ClientConfig, Credential, DeferredConfig, EventCallback, EventKind, PoolConfig, RetryPolicy,
    Session, Connector,
};

/// Behaviour and observations shared by every session a connector opens.
#[derive(Default)]
pub struct Script {
    pub connects: AtomicU64,
    pub closes: AtomicU64,
    pub refuse_connect: AtomicBool,
    pub reject_auth: AtomicBool,
    pub connect_delay: Mutex<Duration>,
    pub send_failures: Mutex<VecDeque<io::ErrorKind>>,
    pub ready: Mutex<HashSet<String>>,
    pub sent: Mutex<Vec<Vec<u8>>>,
    handlers: Mutex<HashMap<EventKind, EventCallback<String>>>,
    live: Mutex<Option<Arc<AtomicBool>>>,
}

impl Script {
    /// Deliver an inbound event through the registered handler.
    pub fn emit(&self, kind: EventKind, event: &str) {
        if let Some(handler) = self.handlers.lock().get(&kind) {
            handler(event.to_string());
        }
    }

    pub fn set_ready(&self, destination: &str) {
        self.ready.lock().insert(destination.to_string());
    }

    pub fn fail_next_sends(&self, kinds: impl IntoIterator<Item = io::ErrorKind>) {
        self.send_failures.lock().extend(kinds);
    }

    /// Simulate the server dropping the connection.
    pub fn drop_connection(&self) {
        if let Some(live) = self.live.lock().as_ref() {
            live.store(false, Ordering::SeqCst);
        }
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().clone()
    }

    pub fn connect_count(&self) -> u64 {
        self.connects.load(Ordering::SeqCst)
    }
}

pub struct MockSession {
    script: Arc<Script>,
    live: Arc<AtomicBool>,
}

impl Session for MockSession {
    type Event = String;

    fn authenticate(&self, credential: &Credential) -> io::Result<()> {
        if self.script.reject_auth.load(Ordering::SeqCst) || credential.secret.is_empty() {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "not authorized"));
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    fn send(&self, payload: &[u8]) -> io::Result<()> {
        if let Some(kind) = self.script.send_failures.lock().pop_front() {
            return Err(io::Error::from(kind));
        }
        if !self.is_connected() {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }
        self.script.sent.lock().push(payload.to_vec());
        Ok(())
    }

    fn close(&self) -> io::Result<()> {
        self.live.store(false, Ordering::SeqCst);
        self.script.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn on_event(&self, kind: EventKind, handler: EventCallback<String>) {
        self.script.handlers.lock().insert(kind, handler);
    }

    fn is_peer_ready(&self, destination: &str) -> bool {
        self.script.ready.lock().contains(destination)
    }
}

pub struct MockConnector(pub Arc<Script>);

impl MockConnector {
    pub fn new() -> (Self, Arc<Script>) {
        let script = Arc::new(Script::default());
        (Self(Arc::clone(&script)), script)
    }
}

impl Connector for MockConnector {
    type Session = MockSession;

    fn connect(&self, _host: &str, _port: u16) -> io::Result<MockSession> {
        let delay = *self.0.connect_delay.lock();
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        if self.0.refuse_connect.load(Ordering::SeqCst) {
            return Err(io::Error::from(io::ErrorKind::ConnectionRefused));
        }
        self.0.connects.fetch_add(1, Ordering::SeqCst);
        let live = Arc::new(AtomicBool::new(true));
        *self.0.live.lock() = Some(Arc::clone(&live));
        Ok(MockSession {
            script: Arc::clone(&self.0),
            live,
        })
    }
}

/// Client config with millisecond-scale timings.
pub fn fast_config() -> ClientConfig {
    let mut config = ClientConfig {
        pool: PoolConfig {
            max: 10,
            poll_interval: Duration::from_millis(10),
            settle_delay: Duration::from_millis(10),
        },
        deferred: DeferredConfig {
            max_wait: Duration::from_secs(60),
            poll_interval: Duration::from_millis(10),
        },
        retry: RetryPolicy {
            max_retries: 3,
            pipe_delay: Duration::from_millis(1),
            reset_base: Duration::from_millis(1),
        },
        ..Default::default()
    };
    config.supervisor.host = "chat.example.com".to_string();
    config.supervisor.credential = Credential::new("bot@chat.example.com", "hunter2");
    config
}

pub fn retry_policy() -> RetryPolicy {
    fast_config().retry
}

/// Poll `cond` until it holds or three seconds pass.
pub fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
