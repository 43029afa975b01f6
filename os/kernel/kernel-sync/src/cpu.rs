use core::fmt;
use core::num::NonZeroU64;

/// Identity of a kernel thread, as seen by the blocking lock.
///
/// Zero is reserved to mean "nobody" inside [`SleepLock`](crate::SleepLock),
/// hence the `NonZeroU64`.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ThreadId(NonZeroU64);

impl ThreadId {
    #[inline]
    #[must_use]
    pub const fn new(id: NonZeroU64) -> Self {
        Self(id)
    }

    /// Returns `None` for zero.
    #[inline]
    #[must_use]
    pub const fn from_u64(id: u64) -> Option<Self> {
        match NonZeroU64::new(id) {
            Some(id) => Some(Self(id)),
            None => None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Debug for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ThreadId({})", self.0)
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Execution-context services the lock primitives and the resource managers
/// need from the scheduler and the interrupt layer.
///
/// The kernel implements this on top of its per-CPU block; tests use
/// [`HostCpu`](crate::hosted::HostCpu) (feature `hosted`).
///
/// # Contract
/// * [`push_off`](Self::push_off)/[`pop_off`](Self::pop_off) nest: local
///   preemption stays disabled until every `push_off` has been matched.
/// * [`id`](Self::id) is only stable while preemption is disabled.
/// * [`yield_now`](Self::yield_now) must not be called with preemption
///   disabled.
pub trait Cpu {
    /// Index of the processor executing the caller.
    fn id(&self) -> usize;

    /// Identity of the thread executing the caller.
    fn thread(&self) -> ThreadId;

    /// Disables local preemption (and interrupts); nestable.
    fn push_off(&self);

    /// Undoes one [`push_off`](Self::push_off).
    fn pop_off(&self);

    /// Gives up the processor so that other threads may run.
    fn yield_now(&self);
}

impl<C: Cpu + ?Sized> Cpu for &C {
    #[inline]
    fn id(&self) -> usize {
        (**self).id()
    }

    #[inline]
    fn thread(&self) -> ThreadId {
        (**self).thread()
    }

    #[inline]
    fn push_off(&self) {
        (**self).push_off();
    }

    #[inline]
    fn pop_off(&self) {
        (**self).pop_off();
    }

    #[inline]
    fn yield_now(&self) {
        (**self).yield_now();
    }
}
