//! # Reaching frame contents
//!
//! The allocator never dereferences a physical address itself; it asks a
//! [`PhysMapper`] where a frame is visible in the current address space and
//! writes its junk patterns there.
//!
//! * [`HhdmPhysMapper`]: the kernel's higher-half direct map, where every
//!   physical address `pa` is mapped at `HHDM_BASE + pa`.
//! * [`ArenaMemory`](crate::arena::ArenaMemory): heap-backed stand-in for a
//!   physical range, for hosted use.

use crate::frame::PhysicalFrame;
use kernel_info::memory::HHDM_BASE;

/// Converts a physical frame into a pointer usable by the kernel.
///
/// # Safety
/// Implementations must return a pointer to `FRAME_BYTES` writable bytes that
/// belong to `frame` and to nothing else, valid for as long as the mapper
/// lives. The allocator only writes through it while it exclusively owns the
/// frame.
pub unsafe trait PhysMapper {
    fn frame_ptr(&self, frame: PhysicalFrame) -> *mut u8;
}

unsafe impl<M: PhysMapper + ?Sized> PhysMapper for &M {
    #[inline]
    fn frame_ptr(&self, frame: PhysicalFrame) -> *mut u8 {
        (**self).frame_ptr(frame)
    }
}

/// [`PhysMapper`] for kernels with a higher-half direct map (HHDM).
///
/// The HHDM mapping must be present, writable, and cover every frame handed
/// to the allocator.
#[derive(Debug, Default, Copy, Clone)]
pub struct HhdmPhysMapper;

unsafe impl PhysMapper for HhdmPhysMapper {
    #[inline]
    fn frame_ptr(&self, frame: PhysicalFrame) -> *mut u8 {
        let va = HHDM_BASE + frame.base().as_u64();
        va as *mut u8
    }
}
