//! # Per-core physical frame allocator
//!
//! Hands out and reclaims whole [`PAGE_SIZE`](kernel_info::param::PAGE_SIZE)
//! frames for user memory, kernel stacks, page-table pages, and pipe buffers,
//! and keeps a reference count per frame so that copy-on-write mappings can
//! share one frame.
//!
//! ## Locking
//!
//! Each core owns a [`SpinLock`] over its free list *and* over the reference
//! counts of its home frames (the indices of its initial partition, see
//! [`MemoryLayout::partition`]). Frames migrate between free lists (stolen on
//! one core, freed on another) but never change home, so a count always has
//! exactly one lock. No path holds two core locks at once:
//!
//! ```text
//! allocate:  pop   (own lock, else one victim lock at a time) ─► claim count (home lock)
//! free:      drop count (home lock) ─► push (own lock)
//! ```
//!
//! Between the two steps the frame is on no list and its count is zero.

use crate::free_list::{FrameLinks, FreeList};
use crate::frame::{FRAME_BYTES, PhysicalAddress, PhysicalFrame};
use crate::layout::MemoryLayout;
use crate::phys_mapper::PhysMapper;
use alloc::boxed::Box;
use kernel_info::param::{ALLOC_JUNK, FREE_JUNK};
use kernel_sync::{Cpu, PreemptGuard, SpinLock};
use log::{debug, info, trace, warn};

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("out of physical memory")]
    OutOfMemory,
    #[error("address {0} is outside the managed frame range")]
    OutOfRange(PhysicalAddress),
}

/// Reference counts for the frames whose home is one core.
struct RefCounts {
    first: usize,
    counts: Box<[u32]>,
}

impl RefCounts {
    fn zeroed(home: core::ops::Range<usize>) -> Self {
        Self {
            first: home.start,
            counts: alloc::vec![0; home.len()].into_boxed_slice(),
        }
    }

    fn get(&self, index: usize) -> u32 {
        self.counts[index - self.first]
    }

    fn get_mut(&mut self, index: usize) -> &mut u32 {
        &mut self.counts[index - self.first]
    }
}

/// Everything guarded by one core's lock.
struct CoreMem {
    free: FreeList,
    refs: RefCounts,
}

pub struct FrameAllocator<M, C> {
    layout: MemoryLayout,
    links: FrameLinks,
    cores: Box<[SpinLock<CoreMem>]>,
    mapper: M,
    cpu: C,
}

impl<M: PhysMapper, C: Cpu> FrameAllocator<M, C> {
    /// Takes ownership of every frame in `layout`, filling each with
    /// [`FREE_JUNK`] and distributing them evenly across the cores' free lists.
    /// All reference counts start at zero.
    #[must_use]
    pub fn new(layout: MemoryLayout, mapper: M, cpu: C) -> Self {
        let links = FrameLinks::new(layout.frame_count());
        let cores = (0..layout.cpus())
            .map(|cpu| {
                let part = layout.partition(cpu);
                for index in part.clone() {
                    junk(&mapper, layout.frame_at(index), FREE_JUNK);
                }
                SpinLock::named(
                    "kmem",
                    CoreMem {
                        free: FreeList::from_range(&links, part.clone()),
                        refs: RefCounts::zeroed(part),
                    },
                )
            })
            .collect();

        info!(
            "kinit: {} frames ({} KiB) from {} to {} across {} cpus",
            layout.frame_count(),
            layout.frame_count() * (FRAME_BYTES / 1024),
            layout.first_frame(),
            layout.phys_top(),
            layout.cpus()
        );

        Self {
            layout,
            links,
            cores,
            mapper,
            cpu,
        }
    }

    #[inline]
    #[must_use]
    pub const fn layout(&self) -> &MemoryLayout {
        &self.layout
    }

    #[inline]
    #[must_use]
    pub const fn total_frames(&self) -> usize {
        self.layout.frame_count()
    }

    /// Frames currently sitting on free lists; a snapshot under concurrency.
    #[must_use]
    pub fn free_frames(&self) -> usize {
        self.cores
            .iter()
            .map(|core| core.lock_preempt(&self.cpu).free.len())
            .sum()
    }

    /// Allocates one frame, filled with [`ALLOC_JUNK`], with reference count 1.
    ///
    /// Takes from the calling core's list, or steals from another core's when
    /// that is empty.
    ///
    /// # Errors
    /// [`FrameError::OutOfMemory`] if every free list is empty.
    ///
    /// # Panics
    /// If the frame taken off a free list has a nonzero reference count; the
    /// allocator's state is corrupt.
    pub fn allocate(&self) -> Result<PhysicalFrame, FrameError> {
        let index = {
            let _off = PreemptGuard::new(&self.cpu);
            let me = self.current_core();
            let local = self.cores[me].lock_preempt(&self.cpu).free.pop(&self.links);
            local.or_else(|| self.steal(me))
        };
        let Some(index) = index else {
            warn!("kalloc: out of memory ({} frames)", self.total_frames());
            return Err(FrameError::OutOfMemory);
        };

        let frame = self.layout.frame_at(index);
        {
            let mut home = self.home(index);
            let count = home.refs.get_mut(index);
            assert!(
                *count == 0,
                "kalloc: free frame {frame} has reference count {count}"
            );
            *count = 1;
        }

        junk(&self.mapper, frame, ALLOC_JUNK);
        Ok(frame)
    }

    /// Drops one reference to the frame at `addr`. When it was the last, the
    /// frame is filled with [`FREE_JUNK`] and put on the calling core's list.
    ///
    /// # Panics
    /// If `addr` is not the base of a managed frame, or the frame is not
    /// allocated (double free).
    pub fn free(&self, addr: PhysicalAddress) {
        let Some(index) = self
            .layout
            .index_of(addr)
            .filter(|_| addr.is_page_aligned())
        else {
            panic!("kfree: {addr} is not a managed frame");
        };

        let frame = self.layout.frame_at(index);
        {
            let mut home = self.home(index);
            let count = home.refs.get_mut(index);
            assert!(*count != 0, "kfree: double free of frame {frame}");
            *count -= 1;
            if *count > 0 {
                trace!("kfree: frame {frame} still has {count} references");
                return;
            }
        }

        junk(&self.mapper, frame, FREE_JUNK);

        let _off = PreemptGuard::new(&self.cpu);
        let me = self.current_core();
        self.cores[me]
            .lock_preempt(&self.cpu)
            .free
            .push(&self.links, index);
    }

    /// Records one more mapping of the frame containing `addr`.
    ///
    /// Addresses outside the managed range carry no count and are ignored.
    ///
    /// # Panics
    /// If the frame is not allocated.
    pub fn add_reference(&self, addr: PhysicalAddress) {
        let Some(index) = self.layout.index_of(addr) else {
            debug!("kaddref: {addr} is not a managed frame, ignored");
            return;
        };

        let mut home = self.home(index);
        let count = home.refs.get_mut(index);
        assert!(
            *count > 0,
            "kaddref: frame {} is not allocated",
            self.layout.frame_at(index)
        );
        *count = count
            .checked_add(1)
            .unwrap_or_else(|| panic!("kaddref: reference count overflow at {addr}"));
    }

    /// Number of live references to the frame containing `addr`.
    ///
    /// # Errors
    /// [`FrameError::OutOfRange`] if `addr` is not in a managed frame.
    pub fn reference_count(&self, addr: PhysicalAddress) -> Result<u32, FrameError> {
        let index = self
            .layout
            .index_of(addr)
            .ok_or(FrameError::OutOfRange(addr))?;
        Ok(self.home(index).refs.get(index))
    }

    fn current_core(&self) -> usize {
        self.cpu.id() % self.cores.len()
    }

    fn home(&self, index: usize) -> kernel_sync::PreemptSpinGuard<'_, CoreMem, C> {
        self.cores[self.layout.home_cpu(index)].lock_preempt(&self.cpu)
    }

    /// Takes one frame from the first other core (in index order after `me`)
    /// that has any. Locks one victim at a time.
    fn steal(&self, me: usize) -> Option<usize> {
        let n = self.cores.len();
        (1..n).map(|k| (me + k) % n).find_map(|victim| {
            let index = self.cores[victim]
                .lock_preempt(&self.cpu)
                .free
                .pop(&self.links)?;
            trace!("kalloc: cpu {me} stole frame {index} from cpu {victim}");
            Some(index)
        })
    }
}

/// Overwrites `frame` with `byte`.
fn junk<M: PhysMapper + ?Sized>(mapper: &M, frame: PhysicalFrame, byte: u8) {
    // SAFETY: called only while the allocator exclusively owns `frame`: during
    // construction, between taking it off a list and returning it, or after
    // its last reference was dropped and before it is pushed.
    unsafe { core::ptr::write_bytes(mapper.frame_ptr(frame), byte, FRAME_BYTES) }
}
