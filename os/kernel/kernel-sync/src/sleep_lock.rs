use crate::{Cpu, ThreadId};
use core::{
    cell::UnsafeCell,
    marker::PhantomData,
    ops::{Deref, DerefMut},
    sync::atomic::{AtomicU64, Ordering},
};

/// Holder value of an unlocked [`SleepLock`].
const FREE: u64 = 0;

/// Blocking mutual-exclusion lock that records which thread holds it.
///
/// Unlike [`SpinLock`](crate::SpinLock), a contended acquisition gives the
/// processor away ([`Cpu::yield_now`]) instead of busy-waiting, so it may be
/// held across operations that suspend the holder, such as a disk transfer.
/// It must therefore never be acquired with preemption disabled, i.e. never
/// while a spin lock is held.
///
/// # Invariants
/// - `holder` is [`FREE`] or the [`ThreadId`] of exactly one live guard's owner.
/// - Only the holder can observe or mutate the protected value.
pub struct SleepLock<T> {
    holder: AtomicU64,
    /// Diagnostic name, reported on lock-discipline violations.
    name: &'static str,
    inner: UnsafeCell<T>,
}

// Safety: mutual exclusion; only T: Send may cross threads.
unsafe impl<T: Send> Sync for SleepLock<T> {}

impl<T> SleepLock<T> {
    pub const fn new(name: &'static str, inner: T) -> Self {
        Self {
            holder: AtomicU64::new(FREE),
            name,
            inner: UnsafeCell::new(inner),
        }
    }

    #[inline]
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Acquires the lock, yielding the processor while another thread holds it.
    ///
    /// # Panics
    /// If the calling thread already holds the lock.
    pub fn lock<C: Cpu + ?Sized>(&self, cpu: &C) -> SleepLockGuard<'_, T> {
        let me = cpu.thread();
        loop {
            match self.holder.compare_exchange_weak(
                FREE,
                me.as_u64(),
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return SleepLockGuard::new(self, me),
                Err(holder) if holder == me.as_u64() => {
                    panic!("acquiresleep: {} already held by thread {me}", self.name);
                }
                Err(_) => cpu.yield_now(),
            }
        }
    }

    /// Try once; returns immediately.
    pub fn try_lock<C: Cpu + ?Sized>(&self, cpu: &C) -> Option<SleepLockGuard<'_, T>> {
        let me = cpu.thread();
        self.holder
            .compare_exchange(FREE, me.as_u64(), Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| SleepLockGuard::new(self, me))
    }

    /// Whether the thread running on `cpu` currently holds the lock.
    #[inline]
    pub fn holding<C: Cpu + ?Sized>(&self, cpu: &C) -> bool {
        self.holder.load(Ordering::Relaxed) == cpu.thread().as_u64()
    }

    /// The current holder, if any; stale as soon as it is returned.
    #[inline]
    #[must_use]
    pub fn holder(&self) -> Option<ThreadId> {
        ThreadId::from_u64(self.holder.load(Ordering::Relaxed))
    }
}

/// Proof of holding a [`SleepLock`]; releases it on drop.
///
/// The guard is `!Send`: the lock is owned by a thread, and handing the guard
/// to another thread would make [`SleepLock::holding`] lie.
pub struct SleepLockGuard<'a, T> {
    lock: &'a SleepLock<T>,
    owner: ThreadId,
    _not_send: PhantomData<*const ()>,
}

impl<'a, T> SleepLockGuard<'a, T> {
    const fn new(lock: &'a SleepLock<T>, owner: ThreadId) -> Self {
        Self {
            lock,
            owner,
            _not_send: PhantomData,
        }
    }

    #[inline]
    #[must_use]
    pub const fn owner(&self) -> ThreadId {
        self.owner
    }

    /// Whether the thread running on `cpu` is the one this guard was issued to.
    #[inline]
    pub fn is_held_by<C: Cpu + ?Sized>(&self, cpu: &C) -> bool {
        self.lock.holding(cpu)
    }
}

impl<T> Deref for SleepLockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.inner.get() }
    }
}

impl<T> DerefMut for SleepLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.inner.get() }
    }
}

impl<T> Drop for SleepLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.holder.store(FREE, Ordering::Release);
    }
}
