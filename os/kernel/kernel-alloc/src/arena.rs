//! # Heap-backed physical memory

use crate::frame::{FRAME_BYTES, PhysicalFrame};
use crate::layout::MemoryLayout;
use crate::phys_mapper::PhysMapper;
use alloc::boxed::Box;
use core::cell::UnsafeCell;

#[repr(C, align(4096))]
struct Page([u8; FRAME_BYTES]);

/// Stands in for the physical range of a [`MemoryLayout`] with heap pages,
/// so the allocator can run (and be observed) outside the kernel.
///
/// Frame `layout.frame_at(i)` is backed by page `i`.
pub struct ArenaMemory {
    layout: MemoryLayout,
    pages: Box<[UnsafeCell<Page>]>,
}

// Safety: pages are only written through `PhysMapper::frame_ptr` by the
// allocator while it exclusively owns the frame, and read through the unsafe
// accessors below under the caller's ownership guarantee.
unsafe impl Sync for ArenaMemory {}
unsafe impl Send for ArenaMemory {}

impl ArenaMemory {
    #[must_use]
    pub fn new(layout: MemoryLayout) -> Self {
        let pages = (0..layout.frame_count())
            .map(|_| UnsafeCell::new(Page([0; FRAME_BYTES])))
            .collect();
        Self { layout, pages }
    }

    fn page(&self, frame: PhysicalFrame) -> &UnsafeCell<Page> {
        match self.layout.index_of(frame.base()) {
            Some(index) => &self.pages[index],
            None => panic!("arena: frame {frame} is outside {:?}", self.layout),
        }
    }

    /// The contents of `frame`.
    ///
    /// # Safety
    /// The caller must own `frame` (hold it allocated) and nobody may write
    /// it while the returned slice lives.
    ///
    /// # Panics
    /// If `frame` is outside the arena.
    #[must_use]
    pub unsafe fn bytes(&self, frame: PhysicalFrame) -> &[u8; FRAME_BYTES] {
        unsafe { &(*self.page(frame).get()).0 }
    }

    /// Mutable contents of `frame`.
    ///
    /// # Safety
    /// The caller must own `frame` exclusively while the returned slice lives.
    ///
    /// # Panics
    /// If `frame` is outside the arena.
    #[allow(clippy::mut_from_ref)]
    #[must_use]
    pub unsafe fn bytes_mut(&self, frame: PhysicalFrame) -> &mut [u8; FRAME_BYTES] {
        unsafe { &mut (*self.page(frame).get()).0 }
    }
}

unsafe impl PhysMapper for ArenaMemory {
    fn frame_ptr(&self, frame: PhysicalFrame) -> *mut u8 {
        self.page(frame).get().cast::<u8>()
    }
}
