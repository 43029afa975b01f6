use crate::bucket::Bucket;
use crate::clock::Clock;
use crate::device::{BlockData, BlockId};
use alloc::boxed::Box;
use core::fmt;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::AtomicBool;
use kernel_sync::{Cpu, SleepLockGuard};

/// A locked, referenced cache buffer holding one block.
///
/// Only the thread that obtained a `Buf` can reach its bytes; it is `!Send`.
/// Dropping it (or passing it to [`BufferCache::release`](crate::BufferCache::release))
/// unlocks the buffer, then drops the reference; the buffer stays cached
/// until it is evicted.
pub struct Buf<'a> {
    // Field order is drop order: unlock, then unreference.
    data: SleepLockGuard<'a, Box<BlockData>>,
    slot: SlotRef<'a>,
}

/// One reference on a bucket slot, dropped on drop.
pub(crate) struct SlotRef<'a> {
    pub(crate) bucket: &'a Bucket,
    pub(crate) bucket_index: usize,
    pub(crate) slot: usize,
    pub(crate) id: BlockId,
    pub(crate) cpu: &'a dyn Cpu,
    pub(crate) clock: &'a dyn Clock,
}

impl Drop for SlotRef<'_> {
    fn drop(&mut self) {
        self.bucket.unref(self.slot, self.cpu, self.clock.now());
    }
}

impl<'a> Buf<'a> {
    pub(crate) fn new(data: SleepLockGuard<'a, Box<BlockData>>, slot: SlotRef<'a>) -> Self {
        Self { data, slot }
    }

    #[inline]
    #[must_use]
    pub const fn id(&self) -> BlockId {
        self.slot.id
    }

    #[inline]
    #[must_use]
    pub fn data(&self) -> &BlockData {
        &self.data
    }

    #[inline]
    pub fn data_mut(&mut self) -> &mut BlockData {
        &mut self.data
    }

    /// Whether the calling thread holds this buffer's lock.
    pub(crate) fn is_held(&self) -> bool {
        self.data.is_held_by(self.slot.cpu)
    }

    pub(crate) fn valid(&self) -> &'a AtomicBool {
        &self.slot.bucket.slots[self.slot.slot].valid
    }

    pub(crate) const fn location(&self) -> (usize, usize) {
        (self.slot.bucket_index, self.slot.slot)
    }
}

impl fmt::Debug for Buf<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buf")
            .field("id", &self.slot.id)
            .field("bucket", &self.slot.bucket_index)
            .field("slot", &self.slot.slot)
            .finish_non_exhaustive()
    }
}

impl Deref for Buf<'_> {
    type Target = BlockData;

    fn deref(&self) -> &BlockData {
        self.data()
    }
}

impl DerefMut for Buf<'_> {
    fn deref_mut(&mut self) -> &mut BlockData {
        self.data_mut()
    }
}

/// An extra reference that keeps a block's buffer from being evicted after
/// its [`Buf`] is released. Hand it back to
/// [`BufferCache::unpin`](crate::BufferCache::unpin) exactly once.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "a dropped pin keeps its buffer cached forever"]
pub struct BufPin {
    pub(crate) id: BlockId,
    pub(crate) bucket: usize,
    pub(crate) slot: usize,
}

impl BufPin {
    #[inline]
    #[must_use]
    pub const fn id(&self) -> BlockId {
        self.id
    }
}
