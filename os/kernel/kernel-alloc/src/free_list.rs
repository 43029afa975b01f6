use alloc::boxed::Box;
use core::ops::Range;
use core::sync::atomic::{AtomicUsize, Ordering};

/// End-of-list marker.
const NIL: usize = usize::MAX;

/// Out-of-band successor links for every managed frame.
///
/// `next[i]` is meaningful only while frame `i` is free, and is then read and
/// written only under the lock of the [`FreeList`] that holds frame `i`. The
/// atomics merely make the shared array `Sync`; ordering comes from that lock.
///
/// ```text
/// FreeList { head: 4 }      next: [ NIL │  -  │  0  │  -  │  2  ]
///                                     0     1     2     3     4
/// list order: 4 → 2 → 0             (1 and 3 are allocated)
/// ```
///
/// Keeping the links here instead of in the first bytes of each free frame
/// means frame contents are never interpreted by the allocator.
pub(crate) struct FrameLinks {
    next: Box<[AtomicUsize]>,
}

impl FrameLinks {
    pub(crate) fn new(frames: usize) -> Self {
        Self {
            next: (0..frames).map(|_| AtomicUsize::new(NIL)).collect(),
        }
    }

    #[inline]
    fn next(&self, index: usize) -> usize {
        self.next[index].load(Ordering::Relaxed)
    }

    #[inline]
    fn set_next(&self, index: usize, next: usize) {
        self.next[index].store(next, Ordering::Relaxed);
    }
}

/// LIFO stack of free frame indices threaded through [`FrameLinks`].
///
/// # Invariants
/// - Every index reachable from `head` is distinct and free.
/// - `len` is the number of reachable indices.
/// - A given index is reachable from at most one list.
#[derive(Debug)]
pub(crate) struct FreeList {
    head: usize,
    len: usize,
}

impl FreeList {
    pub(crate) const fn new() -> Self {
        Self { head: NIL, len: 0 }
    }

    /// A list holding all of `range`, lowest index on top.
    pub(crate) fn from_range(links: &FrameLinks, range: Range<usize>) -> Self {
        let mut list = Self::new();
        for index in range.rev() {
            list.push(links, index);
        }
        list
    }

    pub(crate) fn push(&mut self, links: &FrameLinks, index: usize) {
        debug_assert_ne!(index, NIL);
        links.set_next(index, self.head);
        self.head = index;
        self.len += 1;
    }

    pub(crate) fn pop(&mut self, links: &FrameLinks) -> Option<usize> {
        if self.head == NIL {
            return None;
        }
        let index = self.head;
        self.head = links.next(index);
        links.set_next(index, NIL);
        self.len -= 1;
        Some(index)
    }

    #[inline]
    pub(crate) const fn len(&self) -> usize {
        self.len
    }
}
