//! Integration tests for the client and its components.

mod common;

use common::{fast_config, init_tracing, retry_policy, wait_until, MockConnector};
use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tenacity::{
    ConnectionState, ConnectionSupervisor, Courier, DeferredConfig, DeferredItem, DeferredQueue,
    Delivery, DeliveryKind, Disposition, EventKind, ManagedHandle, NotificationHub, PoolConfig,
    ResilientClient, ResourcePool, Worker,
};

// --- Notifications ---

#[test]
fn test_notify_only_after_mark() {
    let hub: NotificationHub<String, String> = NotificationHub::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    hub.subscribe("msg".to_string(), "o", move |topic: &String, event: &String| {
        sink.lock().push((topic.clone(), event.clone()));
        Disposition::Keep
    })
    .unwrap();

    let topic = "msg".to_string();
    hub.mark_changed(&topic);
    hub.notify(&topic, &"hello".to_string());
    assert_eq!(*seen.lock(), vec![("msg".to_string(), "hello".to_string())]);
    assert_eq!(hub.count_dispatches(&topic), 1);

    // No intervening mark: nothing is dispatched.
    let report = hub.notify(&topic, &"again".to_string());
    assert!(report.is_empty());
    assert_eq!(seen.lock().len(), 1);
    assert_eq!(hub.count_dispatches(&topic), 1);
}

#[test]
fn test_observer_chain_survives_failures() {
    let hub: NotificationHub<String, u32> = NotificationHub::new();
    let topic = "prices".to_string();
    let total = Arc::new(Mutex::new(0u32));

    hub.subscribe(topic.clone(), "boom", |_: &String, _: &u32| -> Disposition {
        panic!("bad handler")
    })
    .unwrap();
    let sum = Arc::clone(&total);
    hub.subscribe(topic.clone(), "sum", move |_: &String, v: &u32| {
        *sum.lock() += *v;
        Disposition::Keep
    })
    .unwrap();
    hub.subscribe(topic.clone(), "once", |_: &String, _: &u32| Disposition::Unsubscribe)
        .unwrap();

    let report = hub.publish(&topic, &5);
    assert_eq!(report.dispatched, 3);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].observer.as_str(), "boom");
    assert_eq!(report.unsubscribed.len(), 1);
    assert_eq!(hub.count_subscribers(Some(&topic)), 2);

    hub.publish(&topic, &7);
    assert_eq!(*total.lock(), 12);
    assert_eq!(hub.count_dispatches(&topic), 5);
}

// --- Pool ---

fn parked_worker(name: &str, stopped: Arc<AtomicBool>) -> Worker {
    Worker::spawn(name, move |stop| {
        while !stop.wait(Duration::from_millis(50)) {}
        stopped.store(true, Ordering::SeqCst);
    })
    .unwrap()
}

#[test]
fn test_pool_evicts_oldest() {
    let pool = ResourcePool::new(PoolConfig {
        max: 2,
        poll_interval: Duration::from_millis(10),
        settle_delay: Duration::from_millis(10),
    })
    .unwrap();

    let flags: Vec<Arc<AtomicBool>> = (0..3).map(|_| Arc::new(AtomicBool::new(false))).collect();
    let h1 = pool.add(parked_worker("h1", Arc::clone(&flags[0])));
    let h2 = pool.add(parked_worker("h2", Arc::clone(&flags[1])));
    let h3 = pool.add(parked_worker("h3", Arc::clone(&flags[2])));

    assert_eq!(pool.size(), 2);
    assert_eq!(pool.sequences(), vec![h2, h3]);
    assert!(h1 < h2);
    assert!(wait_until(|| flags[0].load(Ordering::SeqCst)));
    assert!(!flags[1].load(Ordering::SeqCst));
    assert!(!flags[2].load(Ordering::SeqCst));

    drop(pool);
    assert!(wait_until(|| flags.iter().all(|f| f.load(Ordering::SeqCst))));
}

#[test]
fn test_pool_reaps_finished_workers() {
    let pool = ResourcePool::new(PoolConfig {
        max: 5,
        poll_interval: Duration::from_millis(10),
        settle_delay: Duration::from_millis(10),
    })
    .unwrap();

    for i in 0..3 {
        pool.add(Worker::spawn(format!("short-{}", i), |_stop| {}).unwrap());
    }
    let long = Arc::new(AtomicBool::new(false));
    pool.add(parked_worker("long", Arc::clone(&long)));

    assert!(wait_until(|| pool.size() == 1));
    assert!(pool.cycles() >= 1);
    assert_eq!(pool.keep(Some(0)).unwrap(), 1);
    assert!(wait_until(|| long.load(Ordering::SeqCst)));
}

#[test]
fn test_zero_capacity_pool() {
    let pool = ResourcePool::new(PoolConfig::with_max(-3)).unwrap();
    assert_eq!(pool.max(), 0);

    let stopped = Arc::new(AtomicBool::new(false));
    let worker = parked_worker("doomed", Arc::clone(&stopped));
    assert!(worker.is_alive());
    pool.add(worker);

    assert_eq!(pool.size(), 0);
    assert!(wait_until(|| stopped.load(Ordering::SeqCst)));
}

// --- Deferred delivery ---

struct NeverReady;

impl Courier for NeverReady {
    fn is_ready(&self, _destination: &str) -> bool {
        false
    }

    fn deliver(&self, _item: &DeferredItem) -> tenacity::Result<()> {
        Ok(())
    }
}

#[test]
fn test_deferred_item_expires() {
    let queue = DeferredQueue::new(
        DeferredConfig {
            max_wait: Duration::from_millis(50),
            poll_interval: Duration::from_millis(10),
        },
        Arc::new(NeverReady),
    )
    .unwrap();

    queue.enqueue("nobody", b"ping".to_vec(), DeliveryKind::Normal);
    assert_eq!(queue.len(), 1);

    assert!(wait_until(|| queue.is_empty()));
    assert_eq!(queue.stats().expired, 1);
    assert_eq!(queue.stats().delivered, 0);
}

// --- Supervisor ---

#[test]
fn test_supervisor_lifecycle() {
    init_tracing();
    let (connector, script) = MockConnector::new();
    let sup = ConnectionSupervisor::new(connector, fast_config().supervisor, retry_policy());

    assert_eq!(sup.state(), ConnectionState::Disconnected);
    sup.send(b"first").unwrap();
    assert_eq!(sup.state(), ConnectionState::Connected);

    script.drop_connection();
    assert_eq!(sup.state(), ConnectionState::Disconnected);
    sup.send(b"second").unwrap();
    assert_eq!(script.connect_count(), 2);
    assert_eq!(script.sent(), vec![b"first".to_vec(), b"second".to_vec()]);

    sup.disconnect();
    assert_eq!(sup.state(), ConnectionState::Disabled);
    sup.reconnect().unwrap();
    assert_eq!(sup.state(), ConnectionState::Connected);
}

// --- Client ---

#[test]
fn test_deliver_or_defer() {
    init_tracing();
    let (connector, script) = MockConnector::new();
    let client = ResilientClient::new(connector, fast_config()).unwrap();

    script.set_ready("alice@chat.example.com");
    let sent = client
        .deliver("alice@chat.example.com", b"hi alice".to_vec(), DeliveryKind::Chat)
        .unwrap();
    let parked = client
        .deliver("bob@chat.example.com", b"hi bob".to_vec(), DeliveryKind::Chat)
        .unwrap();

    assert_eq!(sent, Delivery::Sent);
    assert_eq!(parked, Delivery::Deferred);
    assert_eq!(client.deferred().destinations(), vec!["bob@chat.example.com"]);

    // Bob accepts the subscription request.
    script.set_ready("bob@chat.example.com");
    assert!(wait_until(|| client.delivered_count() == 2));
    assert_eq!(script.sent(), vec![b"hi alice".to_vec(), b"hi bob".to_vec()]);
}

#[test]
fn test_deferred_expiry_through_client() {
    let (connector, script) = MockConnector::new();
    let client = ResilientClient::new(connector, fast_config()).unwrap();
    client.set_deferred_max_wait(Duration::from_millis(30));
    assert_eq!(client.deferred_max_wait(), Duration::from_millis(30));

    client
        .deliver("ghost@chat.example.com", b"boo".to_vec(), DeliveryKind::Normal)
        .unwrap();
    assert!(wait_until(|| client.deferred().is_empty()));
    assert_eq!(client.deferred().stats().expired, 1);
    assert!(script.sent().is_empty());
    assert_eq!(client.delivered_count(), 0);
}

#[test]
fn test_send_recovers_from_transient_errors() {
    let (connector, script) = MockConnector::new();
    let client = ResilientClient::new(connector, fast_config()).unwrap();
    script.set_ready("alice@chat.example.com");
    client.connect().unwrap();

    script.fail_next_sends([io::ErrorKind::BrokenPipe, io::ErrorKind::ConnectionReset]);
    let outcome = client
        .deliver("alice@chat.example.com", b"persist".to_vec(), DeliveryKind::Chat)
        .unwrap();

    assert_eq!(outcome, Delivery::Sent);
    assert_eq!(script.connect_count(), 3);
    assert_eq!(script.sent(), vec![b"persist".to_vec()]);
}

#[test]
fn test_events_follow_reconnects() {
    let (connector, script) = MockConnector::new();
    let mut config = fast_config();
    config.initial_status = Some(b"<presence/>".to_vec());
    let client = ResilientClient::new(connector, config).unwrap();
    let inbox = client.attach_auto_observer().unwrap();

    client.connect().unwrap();
    script.emit(EventKind::Message, "one");
    script.emit(EventKind::SubscriptionRequest, "carol");

    client.disconnect();
    client.reconnect().unwrap();
    script.emit(EventKind::Message, "two");

    assert_eq!(inbox.take_received(&EventKind::Message), vec!["one", "two"]);
    assert_eq!(inbox.take_received(&EventKind::SubscriptionRequest), vec!["carol"]);
    assert!(inbox.is_empty());

    let counts = client.notification_counts();
    assert_eq!(counts[&EventKind::Message], 2);
    assert_eq!(counts[&EventKind::Presence], 0);

    // Status announced on both connects.
    assert_eq!(script.sent(), vec![b"<presence/>".to_vec(), b"<presence/>".to_vec()]);
}

#[test]
fn test_background_tasks_are_bounded() {
    let (connector, _script) = MockConnector::new();
    let mut config = fast_config();
    config.pool.max = 2;
    let client = ResilientClient::new(connector, config).unwrap();

    let stops: Vec<Arc<AtomicBool>> = (0..3).map(|_| Arc::new(AtomicBool::new(false))).collect();
    for (i, flag) in stops.iter().enumerate() {
        let flag = Arc::clone(flag);
        client
            .spawn_task(format!("poller-{}", i), move |stop| {
                while !stop.wait(Duration::from_millis(20)) {}
                flag.store(true, Ordering::SeqCst);
            })
            .unwrap();
    }

    assert_eq!(client.tasks().size(), 2);
    assert!(wait_until(|| stops[0].load(Ordering::SeqCst)));

    drop(client);
    assert!(wait_until(|| stops.iter().all(|f| f.load(Ordering::SeqCst))));
}

#[test]
fn test_deferred_expiry_with_default_polling() {
    let queue = DeferredQueue::new(
        DeferredConfig {
            max_wait: Duration::from_secs(2),
            ..Default::default()
        },
        Arc::new(NeverReady),
    )
    .unwrap();

    // Enqueued partway through the worker's idle poll.
    std::thread::sleep(Duration::from_millis(1500));
    queue.enqueue("nobody", b"ping".to_vec(), DeliveryKind::Normal);

    std::thread::sleep(Duration::from_secs(3));
    assert!(queue.is_empty());
    assert_eq!(queue.stats().expired, 1);
}

#[test]
fn test_drop_does_not_wait_out_backoff() {
    let (connector, script) = MockConnector::new();
    let mut config = fast_config();
    config.retry.reset_base = Duration::from_secs(30);
    let client = ResilientClient::new(connector, config).unwrap();
    client.connect().unwrap();

    script.fail_next_sends([io::ErrorKind::ConnectionReset]);
    client.deliver_deferred("erin@chat.example.com", b"late".to_vec(), DeliveryKind::Chat);
    script.set_ready("erin@chat.example.com");
    assert!(wait_until(|| client.supervisor().send_attempts() >= 1));

    let started = std::time::Instant::now();
    drop(client);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(script.sent().is_empty());
}

#[test]
fn test_delivery_worker_outside_task_pool() {
    let (connector, script) = MockConnector::new();
    let mut config = fast_config();
    config.pool.max = 0;
    let client = ResilientClient::new(connector, config).unwrap();

    // A zero-capacity pool evicts every task, but never the delivery worker.
    client.spawn_task("evicted", |stop| {
        stop.wait(Duration::from_secs(30));
    })
    .unwrap();
    assert_eq!(client.tasks().size(), 0);

    client.connect().unwrap();
    client.deliver_deferred("frank@chat.example.com", b"still here".to_vec(), DeliveryKind::Chat);
    script.set_ready("frank@chat.example.com");
    assert!(wait_until(|| client.delivered_count() == 1));
    assert_eq!(script.sent(), vec![b"still here".to_vec()]);
}
