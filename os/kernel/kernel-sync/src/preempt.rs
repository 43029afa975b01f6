use crate::spin_lock::NO_OWNER;
use crate::{Cpu, SpinLock, SpinLockGuard};
use core::ops::{Deref, DerefMut};

/// RAII guard that disables local preemption on creation and restores it on
/// drop.
///
/// `PreemptGuard::new()` calls [`Cpu::push_off`]; dropping it calls
/// [`Cpu::pop_off`]. Guards nest, so preemption comes back only when the
/// outermost guard is gone.
///
/// # Examples
///
/// ```ignore
/// use kernel_sync::PreemptGuard;
/// use kernel_sync::hosted::HostCpu;
///
/// let cpu = HostCpu::new(4);
/// {
///     let _g = PreemptGuard::new(&cpu);
///     // `cpu.id()` cannot change underneath us here
/// }
/// ```
#[must_use = "preemption is re-enabled as soon as the guard is dropped"]
pub struct PreemptGuard<'a, C: Cpu + ?Sized> {
    cpu: &'a C,
}

impl<'a, C: Cpu + ?Sized> PreemptGuard<'a, C> {
    #[inline]
    pub fn new(cpu: &'a C) -> Self {
        cpu.push_off();
        Self { cpu }
    }
}

impl<C: Cpu + ?Sized> Drop for PreemptGuard<'_, C> {
    fn drop(&mut self) {
        self.cpu.pop_off();
    }
}

/// A [`SpinLockGuard`] that also keeps local preemption disabled while held.
///
/// Created via [`SpinLock::lock_preempt`], it:
///
/// 1. disables preemption, and
/// 2. spins for the lock,
///
/// and on drop releases the lock *before* preemption is re-enabled, so the
/// holder can never be descheduled while other cores spin on it.
pub struct PreemptSpinGuard<'a, T, C: Cpu + ?Sized> {
    lock: &'a SpinLock<T>,
    // Field order is drop order: unlock first, then pop_off.
    guard: SpinLockGuard<'a, T>,
    _off: PreemptGuard<'a, C>,
}

impl<T> SpinLock<T> {
    /// Acquires the lock with local preemption disabled for the guard's
    /// lifetime.
    ///
    /// Critical sections entered this way must be short and must not call
    /// anything that can suspend the caller.
    ///
    /// # Panics
    /// If the caller already holds this lock (it would spin forever).
    #[inline]
    pub fn lock_preempt<'a, C: Cpu + ?Sized>(&'a self, cpu: &'a C) -> PreemptSpinGuard<'a, T, C> {
        let off = PreemptGuard::new(cpu);
        let me = cpu.thread().as_u64();
        if self.is_locked() && self.owner() == me {
            panic!("acquire: {} already held by thread {me}", self.name());
        }
        let guard = self.lock();
        self.set_owner(me);
        PreemptSpinGuard {
            lock: self,
            guard,
            _off: off,
        }
    }
}

impl<T, C: Cpu + ?Sized> Drop for PreemptSpinGuard<'_, T, C> {
    fn drop(&mut self) {
        self.lock.set_owner(NO_OWNER);
    }
}

impl<T, C: Cpu + ?Sized> Deref for PreemptSpinGuard<'_, T, C> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T, C: Cpu + ?Sized> DerefMut for PreemptSpinGuard<'_, T, C> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}
