//! # The buffer cache
//!
//! Keeps recently used disk blocks in memory and serializes access to each
//! of them. Blocks hash to one of `config.buckets` buckets by
//! `(dev * 10 + blockno) mod buckets`; each bucket has its own lock and its
//! own buffers, so lookups of blocks in different buckets never contend.
//!
//! ```text
//! read(dev, blockno)
//!   bucket lock ─► hit: take reference │ miss: rebind LRU unreferenced slot
//!   bucket unlock
//!   sleep-lock the buffer ─► if stale, read from the device
//! release(buf)
//!   unlock the buffer ─► bucket lock ─► drop reference (last: stamp time)
//! ```
//!
//! A bucket with every buffer referenced cannot take another block, even if
//! other buckets are idle.

use crate::bucket::{self, Bucket, Claim};
use crate::buf::{Buf, BufPin, SlotRef};
use crate::clock::Clock;
use crate::config::{CacheConfig, ConfigError};
use crate::device::{BlockDevice, BlockId, DeviceError};
use alloc::boxed::Box;
use core::sync::atomic::Ordering;
use kernel_sync::Cpu;
use log::{debug, info, trace, warn};

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BioError {
    #[error("no buffers in bucket {bucket}")]
    NoBuffers { bucket: usize },
    #[error(transparent)]
    Device(#[from] DeviceError),
}

pub struct BufferCache<D, C, K> {
    config: CacheConfig,
    buckets: Box<[Bucket]>,
    device: D,
    cpu: C,
    clock: K,
}

impl<D: BlockDevice, C: Cpu, K: Clock> BufferCache<D, C, K> {
    /// Creates `config.buckets` buckets of `config.buffers_per_bucket` empty
    /// buffers each, all stamped with the current time.
    ///
    /// # Errors
    /// If `config` is invalid.
    pub fn new(config: CacheConfig, device: D, cpu: C, clock: K) -> Result<Self, ConfigError> {
        config.validate()?;
        let now = clock.now();
        let buckets = (0..config.buckets)
            .map(|_| Bucket::new(config.buffers_per_bucket, now))
            .collect();

        info!(
            "binit: {} buckets x {} buffers",
            config.buckets, config.buffers_per_bucket
        );

        Ok(Self {
            config,
            buckets,
            device,
            cpu,
            clock,
        })
    }

    #[inline]
    #[must_use]
    pub const fn config(&self) -> &CacheConfig {
        &self.config
    }

    #[inline]
    #[must_use]
    pub const fn device(&self) -> &D {
        &self.device
    }

    /// The bucket that block `blockno` of device `dev` lives in.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn bucket_of(&self, dev: u32, blockno: u32) -> usize {
        let key = u64::from(dev) * 10 + u64::from(blockno);
        // the remainder is below the bucket count
        (key % self.buckets.len() as u64) as usize
    }

    /// Returns a locked buffer for `dev`/`blockno` holding its contents.
    ///
    /// # Errors
    /// Device errors, unchanged. The buffer stays stale and is released.
    ///
    /// # Panics
    /// If every buffer of the block's bucket is referenced.
    pub fn read(&self, dev: u32, blockno: u32) -> Result<Buf<'_>, DeviceError> {
        let id = BlockId::new(dev, blockno);
        let buf = match self.get_block(id) {
            Ok(buf) => buf,
            Err(e) => panic!("bget: {e} for block {id}"),
        };
        self.load(buf)
    }

    /// Like [`read`](Self::read), but reports an exhausted bucket as
    /// [`BioError::NoBuffers`].
    ///
    /// # Errors
    /// [`BioError::NoBuffers`] or [`BioError::Device`].
    pub fn try_read(&self, dev: u32, blockno: u32) -> Result<Buf<'_>, BioError> {
        let id = BlockId::new(dev, blockno);
        let buf = self
            .get_block(id)
            .inspect_err(|e| warn!("bget: {e} for block {id}"))?;
        Ok(self.load(buf)?)
    }

    /// Writes `buf`'s contents to the device.
    ///
    /// # Errors
    /// Device errors, unchanged.
    ///
    /// # Panics
    /// If the calling thread does not hold `buf`.
    pub fn write(&self, buf: &Buf<'_>) -> Result<(), DeviceError> {
        assert!(buf.is_held(), "bwrite: {} is not locked by the caller", buf.id());
        self.device.write_block(buf.id(), buf.data())
    }

    /// Unlocks `buf` and drops its reference.
    ///
    /// # Panics
    /// If the calling thread does not hold `buf`.
    pub fn release(&self, buf: Buf<'_>) {
        assert!(buf.is_held(), "brelse: {} is not locked by the caller", buf.id());
        drop(buf);
    }

    /// Adds a reference that keeps `buf`'s block cached after `buf` is
    /// released.
    ///
    /// # Panics
    /// If `buf` was not handed out by this cache.
    pub fn pin(&self, buf: &Buf<'_>) -> BufPin {
        let (bucket, slot) = buf.location();
        match self.buckets.get(bucket) {
            Some(b) => b.pin(slot, buf.id(), &self.cpu),
            None => panic!("bpin: {} is not held in this cache", buf.id()),
        }
        BufPin {
            id: buf.id(),
            bucket,
            slot,
        }
    }

    /// Drops the reference taken by [`pin`](Self::pin).
    ///
    /// # Panics
    /// If the pinned buffer has no references left, e.g. because `pin` came
    /// from another cache.
    #[allow(clippy::needless_pass_by_value)]
    pub fn unpin(&self, pin: BufPin) {
        match self.buckets.get(pin.bucket) {
            Some(bucket) => bucket.unpin(pin.slot, pin.id, &self.cpu),
            None => panic!("bunpin: {} is not pinned", pin.id),
        }
    }

    /// Finds or binds a buffer for `id` and returns it locked, with the
    /// contents possibly stale.
    fn get_block(&self, id: BlockId) -> Result<Buf<'_>, BioError> {
        let bucket_index = self.bucket_of(id.dev, id.blockno);
        let bucket = &self.buckets[bucket_index];
        let now = self.clock.now();

        let slot = {
            let mut meta = bucket.meta.lock_preempt(&self.cpu);
            match bucket::claim(&mut meta, id, now) {
                Some(Claim::Hit(slot)) => {
                    trace!("bget: hit {id} in bucket {bucket_index} slot {slot}");
                    slot
                }
                Some(Claim::Miss { slot, evicted }) => {
                    bucket.slots[slot].valid.store(false, Ordering::Release);
                    if let Some(old) = evicted {
                        debug!("bget: {id} evicts {old} from bucket {bucket_index} slot {slot}");
                    }
                    slot
                }
                None => {
                    return Err(BioError::NoBuffers {
                        bucket: bucket_index,
                    });
                }
            }
        };

        let slot_ref = SlotRef {
            bucket,
            bucket_index,
            slot,
            id,
            cpu: &self.cpu,
            clock: &self.clock,
        };
        let data = bucket.slots[slot].data.lock(&self.cpu);
        Ok(Buf::new(data, slot_ref))
    }

    fn load<'a>(&self, mut buf: Buf<'a>) -> Result<Buf<'a>, DeviceError> {
        let valid = buf.valid();
        if !valid.load(Ordering::Acquire) {
            self.device.read_block(buf.id(), buf.data_mut())?;
            valid.store(true, Ordering::Release);
        }
        Ok(buf)
    }
}
