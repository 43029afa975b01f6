use kernel_sync::hosted::HostCpu;
use kernel_sync::{Cpu, SleepLock};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, mpsc};
use std::thread;
use std::time::Duration;

#[test]
fn lock_tracks_holder() {
    let cpu = HostCpu::new(2);
    let l = SleepLock::new("buffer", [0u8; 16]);
    assert!(l.holder().is_none());
    assert!(!l.holding(&cpu));

    {
        let mut g = l.lock(&cpu);
        g[0] = 9;
        assert!(l.holding(&cpu));
        assert!(g.is_held_by(&cpu));
        assert_eq!(l.holder(), Some(cpu.thread()));
        assert_eq!(g.owner(), cpu.thread());
    }

    assert!(l.holder().is_none());
    assert_eq!(l.lock(&cpu)[0], 9);
}

#[test]
fn other_threads_do_not_hold_it() {
    let cpu = HostCpu::new(2);
    let l = Arc::new(SleepLock::new("buffer", ()));
    let _g = l.lock(&cpu);

    let remote = Arc::clone(&l);
    let seen = thread::spawn(move || (remote.holding(&cpu), remote.try_lock(&cpu).is_some()))
        .join()
        .unwrap();
    assert_eq!(seen, (false, false));
}

#[test]
fn try_lock_fails_while_held() {
    let cpu = HostCpu::new(1);
    let l = SleepLock::new("buffer", 1u32);
    let g = l.try_lock(&cpu);
    assert!(g.is_some());
    assert!(l.try_lock(&cpu).is_none());
    drop(g);
    assert!(l.try_lock(&cpu).is_some());
}

#[test]
#[should_panic(expected = "already held by thread")]
fn recursive_acquire_is_fatal() {
    let cpu = HostCpu::new(1);
    let l = SleepLock::new("buffer", ());
    let _g = l.lock(&cpu);
    let _again = l.lock(&cpu);
}

#[test]
fn waiter_sleeps_until_holder_releases() {
    let cpu = HostCpu::new(2);
    let l = Arc::new(SleepLock::new("buffer", 0u32));
    let mut g = l.lock(&cpu);

    let (tx, rx) = mpsc::channel();
    let remote = Arc::clone(&l);
    let waiter = thread::spawn(move || {
        let v = *remote.lock(&cpu);
        tx.send(v).unwrap();
    });

    // still blocked while we hold it
    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    *g = 5;
    drop(g);

    assert_eq!(rx.recv_timeout(Duration::from_secs(10)).unwrap(), 5);
    waiter.join().unwrap();
}

#[test]
fn contended_sleep_lock_is_exclusive() {
    let threads = 6;
    let iters = 2_000;

    let cpu = HostCpu::new(2);
    let lock = Arc::new(SleepLock::new("counter", 0usize));
    let in_cs = Arc::new(AtomicUsize::new(0));
    let start = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let lock = Arc::clone(&lock);
            let in_cs = Arc::clone(&in_cs);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                for _ in 0..iters {
                    let mut v = lock.lock(&cpu);
                    assert_eq!(in_cs.fetch_add(1, Ordering::SeqCst), 0);
                    *v += 1;
                    in_cs.fetch_sub(1, Ordering::SeqCst);
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(*lock.lock(&cpu), threads * iters);
}
