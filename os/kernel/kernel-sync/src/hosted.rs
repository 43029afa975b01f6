//! # Hosted execution context
//!
//! A [`Cpu`] backed by the host's threads, for exercising the lock primitives
//! and the resource managers under `std` (integration tests, simulators).
//!
//! * Every host thread gets a unique, non-zero [`ThreadId`] on first use.
//! * A thread runs "on" core `thread_id % cpus` unless it calls
//!   [`HostCpu::bind`], which pins it to a chosen core.
//! * `push_off`/`pop_off` maintain a per-thread nesting depth; unbalanced
//!   `pop_off` and yielding with preemption disabled are reported as panics.

extern crate std;

use crate::{Cpu, ThreadId};
use core::cell::Cell;
use core::sync::atomic::{AtomicU64, Ordering};

static NEXT_THREAD: AtomicU64 = AtomicU64::new(1);

std::thread_local! {
    static THREAD: Cell<u64> = const { Cell::new(0) };
    static BOUND: Cell<Option<usize>> = const { Cell::new(None) };
    static DEPTH: Cell<usize> = const { Cell::new(0) };
}

#[derive(Debug, Clone, Copy)]
pub struct HostCpu {
    cpus: usize,
}

impl HostCpu {
    /// # Panics
    /// If `cpus` is zero.
    #[must_use]
    pub const fn new(cpus: usize) -> Self {
        assert!(cpus > 0, "HostCpu needs at least one cpu");
        Self { cpus }
    }

    #[must_use]
    pub const fn cpus(&self) -> usize {
        self.cpus
    }

    /// Pins the calling thread to core `cpu` (modulo the core count).
    pub fn bind(&self, cpu: usize) {
        BOUND.with(|b| b.set(Some(cpu % self.cpus)));
    }

    /// Current `push_off` nesting depth of the calling thread.
    #[must_use]
    pub fn preempt_depth() -> usize {
        DEPTH.with(Cell::get)
    }

    fn thread_id() -> u64 {
        THREAD.with(|t| {
            if t.get() == 0 {
                t.set(NEXT_THREAD.fetch_add(1, Ordering::Relaxed));
            }
            t.get()
        })
    }
}

impl Cpu for HostCpu {
    fn id(&self) -> usize {
        BOUND.with(Cell::get).map_or_else(
            || usize::try_from(Self::thread_id()).unwrap_or_default() % self.cpus,
            |cpu| cpu,
        )
    }

    fn thread(&self) -> ThreadId {
        ThreadId::from_u64(Self::thread_id()).unwrap_or_else(|| unreachable!("thread ids start at 1"))
    }

    fn push_off(&self) {
        DEPTH.with(|d| d.set(d.get() + 1));
    }

    fn pop_off(&self) {
        DEPTH.with(|d| {
            let depth = d.get();
            assert!(depth > 0, "pop_off: preemption was not disabled");
            d.set(depth - 1);
        });
    }

    fn yield_now(&self) {
        assert_eq!(
            Self::preempt_depth(),
            0,
            "yield_now: would suspend with preemption disabled"
        );
        std::thread::yield_now();
    }
}
