//! Integration tests for lock acquisition, release and hand-off

use parking_lot::Mutex as ParkingLotMutex;
use rand::Rng;
use raya_sync::{
    Context, ExclusiveLock, Lock, LockError, LockExt, LockOptions, ReadWriteLock, ReentrantLock,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn worker_count() -> usize {
    num_cpus::get().clamp(2, 8)
}

/// Hammer a lock from several threads, checking that critical sections never
/// overlap and that no increment is lost
fn assert_mutual_exclusion<L: Lock + Send + Sync + 'static>(lock: Arc<L>) {
    const ITERATIONS: usize = 500;
    let workers = worker_count();
    let inside = Arc::new(AtomicBool::new(false));
    let counter = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(workers));

    let handles: Vec<_> = (0..workers)
        .map(|_| {
            let lock = lock.clone();
            let inside = inside.clone();
            let counter = counter.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let mut rng = rand::thread_rng();
                barrier.wait();
                for _ in 0..ITERATIONS {
                    match rng.gen_range(0..3) {
                        0 => lock.lock(),
                        1 => lock.lock_interruptibly().unwrap(),
                        _ => {
                            while !lock.try_lock_for(Duration::from_millis(1)).unwrap() {}
                        }
                    }
                    assert!(!inside.swap(true, Ordering::Relaxed), "critical sections overlap");
                    // Deliberately non-atomic read-modify-write
                    let value = counter.load(Ordering::Relaxed);
                    if rng.gen_bool(0.1) {
                        thread::yield_now();
                    }
                    counter.store(value + 1, Ordering::Relaxed);
                    inside.store(false, Ordering::Relaxed);
                    lock.unlock().unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(counter.load(Ordering::Relaxed), workers * ITERATIONS);
}

#[test]
fn test_mutual_exclusion_barging() {
    init_tracing();
    assert_mutual_exclusion(Arc::new(ReentrantLock::new()));
}

#[test]
fn test_mutual_exclusion_fair() {
    init_tracing();
    assert_mutual_exclusion(Arc::new(ReentrantLock::fair()));
}

#[test]
fn test_mutual_exclusion_spinning() {
    init_tracing();
    assert_mutual_exclusion(Arc::new(ReentrantLock::with_options(
        LockOptions::new().spin_limit(64),
    )));
}

#[test]
fn test_mutual_exclusion_non_reentrant() {
    init_tracing();
    assert_mutual_exclusion(Arc::new(ExclusiveLock::new()));
}

#[test]
fn test_mutual_exclusion_write_lock() {
    init_tracing();

    struct Writer(ReadWriteLock);

    impl Lock for Writer {
        fn lock(&self) {
            self.0.write().lock()
        }
        fn lock_interruptibly(&self) -> raya_sync::LockResult<()> {
            self.0.write().lock_interruptibly()
        }
        fn try_lock(&self) -> bool {
            self.0.write().try_lock()
        }
        fn try_lock_for(&self, timeout: Duration) -> raya_sync::LockResult<bool> {
            self.0.write().try_lock_for(timeout)
        }
        fn unlock(&self) -> raya_sync::LockResult<()> {
            self.0.write().unlock()
        }
        fn new_condition(&self) -> raya_sync::LockResult<raya_sync::Condition> {
            self.0.write().new_condition()
        }
    }

    assert_mutual_exclusion(Arc::new(Writer(ReadWriteLock::new())));
}

#[test]
fn test_release_requires_ownership() {
    init_tracing();
    let lock = Arc::new(ReentrantLock::new());
    lock.lock();
    lock.lock();
    let before = lock.stats();

    let err = {
        let lock = lock.clone();
        thread::spawn(move || lock.unlock()).join().unwrap()
    };
    assert!(matches!(err, Err(LockError::NotOwner { owner: Some(_), .. })));
    assert_eq!(lock.stats(), before);

    lock.unlock().unwrap();
    lock.unlock().unwrap();
}

#[test]
fn test_reentrant_release_count() {
    init_tracing();
    const DEPTH: usize = 4;
    let lock = Arc::new(ReentrantLock::new());
    for _ in 0..DEPTH {
        lock.lock();
    }
    assert_eq!(lock.hold_count(), DEPTH);

    let probe = |lock: &Arc<ReentrantLock>| {
        let lock = lock.clone();
        thread::spawn(move || {
            let acquired = lock.try_lock();
            if acquired {
                lock.unlock().unwrap();
            }
            acquired
        })
        .join()
        .unwrap()
    };

    for remaining in (1..DEPTH).rev() {
        lock.unlock().unwrap();
        assert_eq!(lock.hold_count(), remaining);
        assert!(!probe(&lock));
    }
    lock.unlock().unwrap();
    assert!(probe(&lock));
}

#[test]
fn test_two_contexts_race_for_fresh_lock() {
    init_tracing();
    let lock = Arc::new(ExclusiveLock::new());
    let barrier = Arc::new(Barrier::new(2));
    let order = Arc::new(ParkingLotMutex::new(Vec::new()));

    let handles: Vec<_> = (0..2)
        .map(|i| {
            let lock = lock.clone();
            let barrier = barrier.clone();
            let order = order.clone();
            thread::spawn(move || {
                barrier.wait();
                let acquired = lock.try_lock_for(Duration::from_secs(10)).unwrap();
                order.lock().push(i);
                thread::sleep(Duration::from_millis(30));
                lock.unlock().unwrap();
                acquired
            })
        })
        .collect();

    for handle in handles {
        assert!(handle.join().unwrap());
    }
    assert_eq!(order.lock().len(), 2);
    assert!(!lock.is_locked());
}

#[test]
fn test_fair_lock_grants_in_arrival_order() {
    init_tracing();
    let lock = Arc::new(ReentrantLock::fair());
    let order = Arc::new(ParkingLotMutex::new(Vec::new()));
    lock.lock();

    let mut handles = Vec::new();
    for i in 0..4 {
        let handle = {
            let lock = lock.clone();
            let order = order.clone();
            thread::spawn(move || {
                lock.lock();
                order.lock().push(i);
                lock.unlock().unwrap();
            })
        };
        while lock.queue_len() < i + 1 {
            thread::yield_now();
        }
        handles.push(handle);
    }

    // A newcomer's try_lock still fails while the lock is held
    assert!(!thread::spawn({
        let lock = lock.clone();
        move || lock.try_lock()
    })
    .join()
    .unwrap());

    lock.unlock().unwrap();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(*order.lock(), vec![0, 1, 2, 3]);
}

#[test]
fn test_zero_timeout_never_blocks() {
    init_tracing();
    let lock = Arc::new(ReentrantLock::new());
    let (locked_tx, locked_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    let holder = {
        let lock = lock.clone();
        thread::spawn(move || {
            lock.lock();
            locked_tx.send(()).unwrap();
            release_rx.recv().unwrap();
            lock.unlock().unwrap();
        })
    };
    locked_rx.recv().unwrap();

    let start = Instant::now();
    assert_eq!(lock.try_lock_for(Duration::ZERO), Ok(false));
    assert_eq!(lock.try_lock_until(start - Duration::from_secs(1)), Ok(false));
    assert!(start.elapsed() < Duration::from_millis(500));
    assert_eq!(lock.queue_len(), 0);

    release_tx.send(()).unwrap();
    holder.join().unwrap();
    assert_eq!(lock.try_lock_for(Duration::ZERO), Ok(true));
    lock.unlock().unwrap();
}

#[test]
fn test_timed_acquire_expires() {
    init_tracing();
    let lock = Arc::new(ReentrantLock::fair());
    let (locked_tx, locked_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    let holder = {
        let lock = lock.clone();
        thread::spawn(move || {
            lock.lock();
            locked_tx.send(()).unwrap();
            release_rx.recv().unwrap();
            lock.unlock().unwrap();
        })
    };
    locked_rx.recv().unwrap();

    let timeout = Duration::from_millis(60);
    let start = Instant::now();
    assert_eq!(lock.try_lock_for(timeout), Ok(false));
    assert!(start.elapsed() >= timeout);
    assert_eq!(lock.queue_len(), 0);
    assert!(!lock.is_held_by_current());

    release_tx.send(()).unwrap();
    holder.join().unwrap();
}

#[test]
fn test_timed_acquire_succeeds_after_release() {
    init_tracing();
    let lock = Arc::new(ReentrantLock::new());
    lock.lock();

    let waiter = {
        let lock = lock.clone();
        thread::spawn(move || {
            let acquired = lock.try_lock_for(Duration::from_secs(10)).unwrap();
            let held = lock.is_held_by_current();
            lock.unlock().unwrap();
            (acquired, held)
        })
    };
    while !lock.has_queued_waiters() {
        thread::yield_now();
    }
    lock.unlock().unwrap();
    assert_eq!(waiter.join().unwrap(), (true, true));
}

#[test]
fn test_release_publishes_writes() {
    init_tracing();
    const SLOTS: usize = 64;
    // Fair, so the polling loop below cannot starve the writer
    let lock = Arc::new(ReentrantLock::fair());
    let data: Arc<Vec<AtomicUsize>> = Arc::new((0..SLOTS).map(|_| AtomicUsize::new(0)).collect());
    let published = Arc::new(AtomicBool::new(false));

    let writer = {
        let lock = lock.clone();
        let data = data.clone();
        let published = published.clone();
        thread::spawn(move || {
            let _guard = lock.guard();
            for (i, slot) in data.iter().enumerate() {
                slot.store(i + 1, Ordering::Relaxed);
            }
            published.store(true, Ordering::Relaxed);
        })
    };

    loop {
        let _guard = lock.guard();
        if published.load(Ordering::Relaxed) {
            for (i, slot) in data.iter().enumerate() {
                assert_eq!(slot.load(Ordering::Relaxed), i + 1);
            }
            break;
        }
    }
    writer.join().unwrap();
}

#[test]
fn test_owner_is_reported_to_other_contexts() {
    init_tracing();
    let lock = Arc::new(ExclusiveLock::new());
    let (tx, rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();

    let holder = {
        let lock = lock.clone();
        thread::spawn(move || {
            lock.lock();
            tx.send(Context::current_id()).unwrap();
            release_rx.recv().unwrap();
            lock.unlock().unwrap();
        })
    };
    let holder_id = rx.recv().unwrap();
    assert_eq!(lock.owner(), Some(holder_id));
    assert!(!lock.is_held_by_current());

    release_tx.send(()).unwrap();
    holder.join().unwrap();
    assert_eq!(lock.owner(), None);
}

#[test]
fn test_readers_run_concurrently() {
    init_tracing();
    let rw = Arc::new(ReadWriteLock::fair());
    let readers = 3;
    let barrier = Arc::new(Barrier::new(readers));

    let handles: Vec<_> = (0..readers)
        .map(|_| {
            let rw = rw.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let read = rw.read();
                let _guard = read.guard();
                // Every reader must be inside at once to pass the barrier
                barrier.wait();
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(rw.read_holds(), 0);
}
