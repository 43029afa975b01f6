//! # Use timestamps
//!
//! The cache orders buffers for eviction by the time they were last used. Any
//! monotonic counter will do; the kernel uses its timer-interrupt tick count.

use core::sync::atomic::{AtomicU64, Ordering};

pub trait Clock {
    /// Current time; never decreases.
    fn now(&self) -> u64;
}

impl<K: Clock + ?Sized> Clock for &K {
    #[inline]
    fn now(&self) -> u64 {
        (**self).now()
    }
}

/// A tick counter advanced by the timer interrupt.
#[derive(Debug, Default)]
pub struct Ticks(AtomicU64);

impl Ticks {
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Advances the counter by one and returns the new value.
    pub fn tick(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl Clock for Ticks {
    #[inline]
    fn now(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}
