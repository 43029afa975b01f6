//! # Kernel synchronization primitives
//!
//! * [`SpinLock`]: non-blocking lock for short critical sections; acquire it
//!   with [`SpinLock::lock_preempt`] to keep the holder from being
//!   descheduled.
//! * [`SleepLock`]: blocking lock that tracks its holder and may be held across
//!   operations that suspend the caller.
//! * [`Cpu`]: the execution-context services both need from the scheduler.
//!
//! Enable the `hosted` feature for [`hosted::HostCpu`], a `std`-backed [`Cpu`].

#![cfg_attr(not(any(test, doctest, feature = "hosted")), no_std)]
#![allow(unsafe_code)]

mod cpu;
#[cfg(feature = "hosted")]
pub mod hosted;
mod preempt;
mod sleep_lock;
mod spin_lock;

pub use cpu::{Cpu, ThreadId};
pub use preempt::{PreemptGuard, PreemptSpinGuard};
pub use sleep_lock::{SleepLock, SleepLockGuard};
pub use spin_lock::{SpinLock, SpinLockGuard};
