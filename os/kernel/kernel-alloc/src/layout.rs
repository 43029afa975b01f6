//! # Managed physical memory layout
//!
//! Describes the frame range the allocator owns, `[round_up(kernel_end),
//! phys_top)`, and how frame indices are split between cores. Frame `i` is
//! the `i`-th frame above the first managed frame; core `c` initially owns
//! the contiguous index range [`partition(c)`](MemoryLayout::partition) and
//! is the *home* of every index in it for the lifetime of the allocator.

use crate::frame::{PhysicalAddress, PhysicalFrame};
use core::ops::Range;
use kernel_info::memory::PHYSTOP;
use kernel_info::param::{NCPU, PAGE_SHIFT, PAGE_SIZE};

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    #[error("at least one cpu is required")]
    NoCpus,
    #[error("physical top {0} is not page-aligned")]
    UnalignedTop(PhysicalAddress),
    #[error("no whole frame between kernel end {kernel_end} and physical top {phys_top}")]
    Empty {
        kernel_end: PhysicalAddress,
        phys_top: PhysicalAddress,
    },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MemoryLayout {
    first: PhysicalAddress,
    top: PhysicalAddress,
    cpus: usize,
    frames: usize,
    /// Frames per core partition (the last one may be shorter).
    chunk: usize,
}

impl MemoryLayout {
    /// # Errors
    /// See [`LayoutError`].
    pub fn new(
        kernel_end: PhysicalAddress,
        phys_top: PhysicalAddress,
        cpus: usize,
    ) -> Result<Self, LayoutError> {
        if cpus == 0 {
            return Err(LayoutError::NoCpus);
        }
        if !phys_top.is_page_aligned() {
            return Err(LayoutError::UnalignedTop(phys_top));
        }
        let empty = LayoutError::Empty {
            kernel_end,
            phys_top,
        };
        let first = kernel_end.checked_align_up().ok_or(empty)?;
        if first >= phys_top {
            return Err(empty);
        }

        let frames = usize::try_from((phys_top.as_u64() - first.as_u64()) >> PAGE_SHIFT)
            .map_err(|_| empty)?;
        Ok(Self {
            first,
            top: phys_top,
            cpus,
            frames,
            chunk: frames.div_ceil(cpus),
        })
    }

    /// Layout of the running kernel: everything from `kernel_end` up to
    /// [`PHYSTOP`], split across [`NCPU`] cores.
    ///
    /// # Errors
    /// If `kernel_end` leaves no frame below [`PHYSTOP`].
    pub fn kernel(kernel_end: PhysicalAddress) -> Result<Self, LayoutError> {
        Self::new(kernel_end, PhysicalAddress::new(PHYSTOP), NCPU)
    }

    /// Base of the lowest managed frame.
    #[inline]
    #[must_use]
    pub const fn first_frame(&self) -> PhysicalFrame {
        PhysicalFrame::containing(self.first)
    }

    #[inline]
    #[must_use]
    pub const fn phys_top(&self) -> PhysicalAddress {
        self.top
    }

    #[inline]
    #[must_use]
    pub const fn cpus(&self) -> usize {
        self.cpus
    }

    #[inline]
    #[must_use]
    pub const fn frame_count(&self) -> usize {
        self.frames
    }

    #[inline]
    #[must_use]
    pub fn contains(&self, addr: PhysicalAddress) -> bool {
        addr >= self.first && addr < self.top
    }

    /// Index of the managed frame containing `addr`.
    #[must_use]
    pub fn index_of(&self, addr: PhysicalAddress) -> Option<usize> {
        if !self.contains(addr) {
            return None;
        }
        usize::try_from((addr.as_u64() - self.first.as_u64()) >> PAGE_SHIFT).ok()
    }

    /// The frame with the given index.
    ///
    /// # Panics
    /// If `index` is not below [`frame_count`](Self::frame_count).
    #[must_use]
    pub fn frame_at(&self, index: usize) -> PhysicalFrame {
        assert!(index < self.frames, "frame index {index} out of range");
        let offset = u64::try_from(index).unwrap_or(u64::MAX) * PAGE_SIZE;
        PhysicalFrame::containing(self.first + offset)
    }

    /// Frame indices initially handed to `cpu`'s free list.
    ///
    /// Partitions are contiguous, ascending, disjoint, and cover every index;
    /// cores past the end of memory get an empty range.
    #[must_use]
    pub fn partition(&self, cpu: usize) -> Range<usize> {
        let start = cpu.saturating_mul(self.chunk).min(self.frames);
        let end = start.saturating_add(self.chunk).min(self.frames);
        start..end
    }

    /// The core whose partition contains `index`.
    #[inline]
    #[must_use]
    pub const fn home_cpu(&self, index: usize) -> usize {
        index / self.chunk
    }
}
