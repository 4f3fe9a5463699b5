use drainable::*;

use std::sync::atomic::Ordering;
use std::sync::atomic::{AtomicBool, AtomicUsize};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

struct CountDrops(Arc<AtomicUsize>);
impl Drop for CountDrops {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn wait_wakes_on_last_release() {
    let drops = Arc::new(AtomicUsize::new(0));
    let handle = ExclusiveHandle::new((42, CountDrops(Arc::clone(&drops))));

    let observer = handle.share();
    let started = Arc::new(Barrier::new(2));
    let t = {
        let started = Arc::clone(&started);
        thread::spawn(move || {
            started.wait();
            thread::sleep(Duration::from_millis(20));
            assert_eq!(observer.0, 42);
            drop(observer);
        })
    };

    let draining = handle.into_draining();
    started.wait();
    draining.wait();
    assert!(draining.drained());
    assert_eq!(drops.load(Ordering::SeqCst), 0);

    t.join().unwrap();
    drop(draining);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn many_workers_drain() {
    let drops = Arc::new(AtomicUsize::new(0));
    let handle = ExclusiveHandle::new((AtomicUsize::new(0), CountDrops(Arc::clone(&drops))));

    let nthreads = 8;
    let barrier = Arc::new(Barrier::new(nthreads + 1));
    let threads: Vec<_> = (0..nthreads)
        .map(|_| {
            let observer = handle.share();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..1000 {
                    let copy = observer.clone();
                    copy.0.fetch_add(1, Ordering::Relaxed);
                }
            })
        })
        .collect();

    let draining = handle.into_draining();
    barrier.wait();
    draining.wait();

    // Every worker's updates happen before the drain is observed.
    assert_eq!(draining.0.load(Ordering::Relaxed), nthreads * 1000);
    for t in threads {
        t.join().unwrap();
    }
    drop(draining);
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn observer_released_on_other_thread_destroys_pointee() {
    let drops = Arc::new(AtomicUsize::new(0));
    let handle = ExclusiveHandle::new(CountDrops(Arc::clone(&drops)));
    let observer = handle.share();

    // The owner gives up its claim before the observer is done.
    drop(handle.into_draining());
    assert_eq!(drops.load(Ordering::SeqCst), 0);

    thread::spawn(move || drop(observer)).join().unwrap();
    assert_eq!(drops.load(Ordering::SeqCst), 1);
}

#[test]
fn waiters_on_several_threads() {
    let handle = ExclusiveHandle::new(0_u64);
    let observer = handle.share();
    let draining = Arc::new(handle.into_draining());

    let waiters: Vec<_> = (0..4)
        .map(|_| {
            let draining = Arc::clone(&draining);
            thread::spawn(move || {
                draining.wait();
                assert!(draining.drained());
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(20));
    drop(observer);
    for w in waiters {
        w.join().unwrap();
    }
}

#[test]
fn timed_wait_on_undrained_handle() {
    let handle = ExclusiveHandle::new(0_u8);
    let observer = handle.share();
    let draining = handle.into_draining();

    let timeout = Duration::from_millis(100);
    let start = Instant::now();
    assert!(draining.wait_timeout(timeout).timed_out());
    assert!(start.elapsed() >= timeout);
    assert!(!draining.drained());

    let t = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        drop(observer);
    });
    assert!(draining
        .wait_timeout(Duration::from_secs(60))
        .is_satisfied());
    t.join().unwrap();
}

#[test]
fn predicate_allows_early_exit() {
    let handle = ExclusiveHandle::new(0_u8);
    let observer = handle.share();
    let draining = handle.into_draining();
    let cancelled = Arc::new(AtomicBool::new(false));

    let t = {
        let cancelled = Arc::clone(&cancelled);
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            cancelled.store(true, Ordering::SeqCst);
        })
    };

    // Nothing broadcasts when only the flag changes, so poll it with a short timeout.
    while draining
        .wait_timeout_until(Duration::from_millis(5), || {
            draining.drained() || cancelled.load(Ordering::SeqCst)
        })
        .timed_out()
    {}
    assert!(cancelled.load(Ordering::SeqCst));
    assert!(!draining.drained());

    t.join().unwrap();
    drop(observer);
    assert!(draining.drained());
}

/// The kind of owner this is meant for: entries are looked up through a registry, and retiring
/// one waits for every in-flight request before the entry is reclaimed.
#[test]
fn registry_retire() {
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct Entry {
        served: AtomicUsize,
        gone: Arc<AtomicBool>,
    }
    impl Drop for Entry {
        fn drop(&mut self) {
            self.gone.store(true, Ordering::SeqCst);
        }
    }

    let gone = Arc::new(AtomicBool::new(false));
    let registry: Arc<Mutex<HashMap<&'static str, ExclusiveHandle<Entry>>>> = Default::default();
    registry.lock().unwrap().insert(
        "a",
        ExclusiveHandle::new(Entry {
            served: AtomicUsize::new(0),
            gone: Arc::clone(&gone),
        }),
    );

    let lookup = |key: &str| registry.lock().unwrap().get(key).map(|h| h.share());

    let requests: Vec<_> = (0..4)
        .map(|_| {
            let entry = lookup("a").expect("registered");
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                entry.served.fetch_add(1, Ordering::SeqCst);
            })
        })
        .collect();

    let retired = registry
        .lock()
        .unwrap()
        .remove("a")
        .expect("registered")
        .into_draining();
    assert!(lookup("a").is_none());

    retired.wait();
    assert_eq!(retired.served.load(Ordering::SeqCst), 4);
    assert!(!gone.load(Ordering::SeqCst));
    drop(retired);
    assert!(gone.load(Ordering::SeqCst));

    for r in requests {
        r.join().unwrap();
    }
}
