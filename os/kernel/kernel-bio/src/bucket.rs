//! # Buckets
//!
//! A bucket owns a fixed set of buffer slots. Its [`SpinLock`] guards the
//! slots' metadata (bound block, reference count, last use); each slot's
//! bytes sit behind the slot's own [`SleepLock`].
//!
//! ```text
//! Bucket
//! ├── meta: SpinLock<[SlotMeta; n]>     id │ refcnt │ timestamp
//! └── slots: [Slot; n]                  valid │ SleepLock<BlockData>
//! ```
//!
//! A slot with a nonzero reference count is never rebound, and a slot with a
//! zero count has no sleep-lock holder or waiter: [`Buf`](crate::Buf) drops
//! its sleep lock before it drops its reference.

use crate::device::{BLOCK_SIZE, BlockData, BlockId};
use alloc::boxed::Box;
use core::sync::atomic::AtomicBool;
use kernel_sync::{Cpu, SleepLock, SpinLock};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub(crate) struct SlotMeta {
    pub(crate) id: Option<BlockId>,
    pub(crate) refcnt: u32,
    pub(crate) timestamp: u64,
}

pub(crate) struct Slot {
    /// Whether `data` holds the bound block's contents. Written by the
    /// sleep-lock holder, or under the bucket lock while unreferenced.
    pub(crate) valid: AtomicBool,
    pub(crate) data: SleepLock<Box<BlockData>>,
}

pub(crate) struct Bucket {
    pub(crate) meta: SpinLock<Box<[SlotMeta]>>,
    pub(crate) slots: Box<[Slot]>,
}

/// Outcome of [`claim`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Claim {
    /// The block was already bound to `slot`.
    Hit(usize),
    /// `slot` was unreferenced and is now bound to the block; its contents
    /// are stale.
    Miss {
        slot: usize,
        evicted: Option<BlockId>,
    },
}

impl Bucket {
    pub(crate) fn new(buffers: usize, now: u64) -> Self {
        let meta = (0..buffers)
            .map(|_| SlotMeta {
                id: None,
                refcnt: 0,
                timestamp: now,
            })
            .collect();
        let slots = (0..buffers)
            .map(|_| Slot {
                valid: AtomicBool::new(false),
                data: SleepLock::new("buffer", Box::new([0; BLOCK_SIZE])),
            })
            .collect();
        Self {
            meta: SpinLock::named("bcache.bucket", meta),
            slots,
        }
    }

    /// Drops one reference to `slot`; the last one stamps the slot as used
    /// at `now`.
    pub(crate) fn unref<C: Cpu + ?Sized>(&self, slot: usize, cpu: &C, now: u64) {
        self.meta.lock_preempt(cpu)[slot].unref(now);
    }

    /// Adds one reference to `slot`, which must be referenced and bound to
    /// `id`.
    pub(crate) fn pin<C: Cpu + ?Sized>(&self, slot: usize, id: BlockId, cpu: &C) {
        let mut meta = self.meta.lock_preempt(cpu);
        let Some(m) = meta.get_mut(slot) else {
            panic!("bpin: {id} is not held in this cache");
        };
        m.pin(id);
    }

    /// Drops a reference taken by [`pin`](Self::pin).
    pub(crate) fn unpin<C: Cpu + ?Sized>(&self, slot: usize, id: BlockId, cpu: &C) {
        let mut meta = self.meta.lock_preempt(cpu);
        let Some(m) = meta.get_mut(slot) else {
            panic!("bunpin: {id} is not pinned");
        };
        m.unpin(id);
    }
}

impl SlotMeta {
    /// The last reference stamps the slot as used at `now`.
    pub(crate) fn unref(&mut self, now: u64) {
        let Some(refcnt) = self.refcnt.checked_sub(1) else {
            panic!("brelse: buffer has no references");
        };
        self.refcnt = refcnt;
        if refcnt == 0 {
            self.timestamp = now;
        }
    }

    pub(crate) fn pin(&mut self, id: BlockId) {
        assert!(
            self.id == Some(id) && self.refcnt > 0,
            "bpin: {id} is not held in this cache"
        );
        self.refcnt = bump(self.refcnt, id);
    }

    /// Does not count as a use.
    pub(crate) fn unpin(&mut self, id: BlockId) {
        assert!(
            self.id == Some(id) && self.refcnt > 0,
            "bunpin: {id} is not pinned"
        );
        self.refcnt -= 1;
    }
}

/// Finds `id` among the slots, or binds it to the least recently used
/// unreferenced slot (lowest index on ties). Either way the slot gains a
/// reference and is stamped with `now`. `None` if every slot is referenced.
pub(crate) fn claim(meta: &mut [SlotMeta], id: BlockId, now: u64) -> Option<Claim> {
    if let Some(slot) = meta.iter().position(|m| m.id == Some(id)) {
        let m = &mut meta[slot];
        m.refcnt = bump(m.refcnt, id);
        m.timestamp = now;
        return Some(Claim::Hit(slot));
    }

    let (slot, m) = meta
        .iter_mut()
        .enumerate()
        .filter(|(_, m)| m.refcnt == 0)
        .min_by_key(|(_, m)| m.timestamp)?;
    let evicted = m.id.replace(id);
    m.refcnt = 1;
    m.timestamp = now;
    Some(Claim::Miss { slot, evicted })
}

fn bump(refcnt: u32, id: BlockId) -> u32 {
    refcnt
        .checked_add(1)
        .unwrap_or_else(|| panic!("bget: reference count overflow on {id}"))
}
