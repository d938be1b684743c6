//! Connection pool behavior under concurrent use.

use anyfs_ops::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Default)]
struct Gauge {
    live: AtomicUsize,
    peak: AtomicUsize,
}

struct GaugedConn {
    open: Arc<AtomicBool>,
}

impl Connection for GaugedConn {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn close(self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

struct GaugedConnector {
    connects: AtomicUsize,
}

impl Connector for GaugedConnector {
    type Conn = GaugedConn;

    fn connect(&self, _: &Authority) -> OpResult<GaugedConn> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(GaugedConn {
            open: Arc::new(AtomicBool::new(true)),
        })
    }
}

fn pool(max: usize, when_exhausted: ExhaustedPolicy) -> Arc<ConnectionPool<GaugedConnector>> {
    Arc::new(ConnectionPool::new(
        GaugedConnector {
            connects: AtomicUsize::new(0),
        },
        PoolConfig {
            max_per_authority: max,
            when_exhausted,
            ..PoolConfig::default()
        },
    ))
}

fn authority(s: &str) -> Authority {
    Authority::from_uri(&Uri::parse(s).unwrap()).unwrap()
}

#[test]
fn blocking_pool_never_exceeds_bound() {
    let pool = pool(
        2,
        ExhaustedPolicy::Block {
            timeout: Duration::from_secs(10),
        },
    );
    let gauge = Gauge::default();
    let host = authority("mem://shared/");

    thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                for _ in 0..20 {
                    let conn = pool.borrow(&host).unwrap();
                    let live = gauge.live.fetch_add(1, Ordering::SeqCst) + 1;
                    gauge.peak.fetch_max(live, Ordering::SeqCst);
                    thread::sleep(Duration::from_micros(200));
                    gauge.live.fetch_sub(1, Ordering::SeqCst);
                    drop(conn);
                }
            });
        }
    });

    assert!(gauge.peak.load(Ordering::SeqCst) <= 2);
    assert!(pool.connector().connects.load(Ordering::SeqCst) <= 2);
    let stats = pool.stats();
    assert_eq!(stats.active, 0);
    assert_eq!(stats.idle, stats.opened - stats.closed);
}

#[test]
fn authorities_have_independent_bounds() {
    let pool = pool(1, ExhaustedPolicy::Fail);
    let a = pool.borrow(&authority("mem://a/")).unwrap();
    let b = pool.borrow(&authority("mem://b/")).unwrap();
    assert!(matches!(
        pool.borrow(&authority("mem://a/")),
        Err(OpError::PoolExhausted { .. })
    ));
    drop(a);
    drop(b);
    assert_eq!(pool.stats().idle, 2);
}

#[test]
fn returned_connection_wakes_waiter_behind_other_authority() {
    let pool = pool(
        1,
        ExhaustedPolicy::Block {
            timeout: Duration::from_secs(3),
        },
    );
    let a = authority("mem://a/");
    let b = authority("mem://b/");
    let held_a = pool.borrow(&a).unwrap();
    let _held_b = pool.borrow(&b).unwrap();

    thread::scope(|s| {
        let b_waiter = s.spawn(|| pool.borrow(&b).is_ok());
        thread::sleep(Duration::from_millis(50));
        let a_waiter = s.spawn(|| {
            let started = Instant::now();
            let ok = pool.borrow(&a).is_ok();
            (ok, started.elapsed())
        });
        thread::sleep(Duration::from_millis(50));
        drop(held_a);

        let (ok, waited) = a_waiter.join().unwrap();
        assert!(ok);
        assert!(waited < Duration::from_secs(1), "waited {waited:?}");
        // Still held, so the other waiter runs out its timeout.
        assert!(!b_waiter.join().unwrap());
    });
}

#[test]
fn invalidated_connections_are_replaced_under_load() {
    let pool = pool(
        3,
        ExhaustedPolicy::Block {
            timeout: Duration::from_secs(10),
        },
    );
    let host = authority("mem://flaky/");

    thread::scope(|s| {
        for worker in 0..4 {
            let pool = &pool;
            let host = &host;
            s.spawn(move || {
                for round in 0..10 {
                    let mut conn = pool.borrow(host).unwrap();
                    assert!(conn.is_open());
                    if (worker + round) % 3 == 0 {
                        conn.invalidate();
                    }
                }
            });
        }
    });

    let stats = pool.stats();
    assert_eq!(stats.active, 0);
    assert!(stats.closed > 0);
    assert_eq!(stats.idle, stats.opened - stats.closed);
    assert!(stats.idle <= 3);
}

#[test]
fn shared_dispatcher_serves_many_threads() {
    let memory = Arc::new(MemoryProvider::new(
        MemoryNetwork::new(),
        PoolConfig {
            max_per_authority: 2,
            ..PoolConfig::default()
        },
    ));
    let dispatcher = Dispatcher::builder()
        .provider(memory.clone())
        .build()
        .unwrap();

    thread::scope(|s| {
        for worker in 0..6 {
            let dispatcher = &dispatcher;
            s.spawn(move || {
                let dir = format!("mem://h/w{worker}/");
                let files = format!("{dir}a;{dir}b;{dir}c");
                let created = dispatcher.create(&UriList::parse(&dir).unwrap(), &CreateParams::default());
                assert!(created.success());
                let created = dispatcher.create(&UriList::parse(&files).unwrap(), &CreateParams::default());
                assert_eq!(created.success_count(), 3);
            });
        }
    });

    let listed = dispatcher.list(
        &UriList::parse("mem://h/").unwrap(),
        &ListParams::default().with_recursive(true),
    );
    assert_eq!(listed.infos().len(), 6 * 4);
    assert!(memory.pool().stats().opened <= 2);
}
