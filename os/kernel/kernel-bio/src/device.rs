//! # Block devices

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use kernel_info::param::BSIZE;
use kernel_sync::SpinLock;

/// Bytes per disk block and per cached buffer.
pub const BLOCK_SIZE: usize = BSIZE;

/// Contents of one block.
pub type BlockData = [u8; BLOCK_SIZE];

/// Identity of a disk block: device number and block number on that device.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId {
    pub dev: u32,
    pub blockno: u32,
}

impl BlockId {
    #[inline]
    #[must_use]
    pub const fn new(dev: u32, blockno: u32) -> Self {
        Self { dev, blockno }
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.dev, self.blockno)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    #[error("no such device {0}")]
    NoDevice(u32),
    #[error("block {0} is beyond the end of the device")]
    OutOfRange(BlockId),
    #[error("i/o error on block {0}")]
    Io(BlockId),
}

/// Synchronous whole-block transfers, as provided by the disk driver.
///
/// Both calls return only once the transfer is complete.
pub trait BlockDevice {
    /// # Errors
    /// Any [`DeviceError`]; `data` is unspecified on failure.
    fn read_block(&self, id: BlockId, data: &mut BlockData) -> Result<(), DeviceError>;

    /// # Errors
    /// Any [`DeviceError`].
    fn write_block(&self, id: BlockId, data: &BlockData) -> Result<(), DeviceError>;
}

impl<D: BlockDevice + ?Sized> BlockDevice for &D {
    #[inline]
    fn read_block(&self, id: BlockId, data: &mut BlockData) -> Result<(), DeviceError> {
        (**self).read_block(id, data)
    }

    #[inline]
    fn write_block(&self, id: BlockId, data: &BlockData) -> Result<(), DeviceError> {
        (**self).write_block(id, data)
    }
}

/// Block number that [`RamDisk`] treats as healthy.
const NO_FAULT: u64 = u64::MAX;

/// A zero-filled in-memory disk serving a single device number.
///
/// Counts completed transfers and can be told to fail one block with
/// [`DeviceError::Io`].
pub struct RamDisk {
    dev: u32,
    blocks: SpinLock<Vec<Box<BlockData>>>,
    reads: AtomicUsize,
    writes: AtomicUsize,
    faulty: AtomicU64,
}

impl RamDisk {
    #[must_use]
    pub fn new(dev: u32, blocks: u32) -> Self {
        Self {
            dev,
            blocks: SpinLock::named(
                "ramdisk",
                (0..blocks).map(|_| Box::new([0; BLOCK_SIZE])).collect(),
            ),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            faulty: AtomicU64::new(NO_FAULT),
        }
    }

    #[inline]
    #[must_use]
    pub const fn dev(&self) -> u32 {
        self.dev
    }

    /// Successful [`read_block`](BlockDevice::read_block) calls so far.
    #[must_use]
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    /// Successful [`write_block`](BlockDevice::write_block) calls so far.
    #[must_use]
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    /// Makes every transfer of `blockno` fail until cleared with `None`.
    pub fn fail_block(&self, blockno: Option<u32>) {
        self.faulty
            .store(blockno.map_or(NO_FAULT, u64::from), Ordering::Relaxed);
    }

    /// Copy of a block's contents, bypassing counters and faults.
    #[must_use]
    pub fn contents(&self, blockno: u32) -> Option<BlockData> {
        let blocks = self.blocks.lock();
        blocks.get(usize::try_from(blockno).ok()?).map(|b| **b)
    }

    /// Overwrites a block's contents, bypassing counters and faults.
    ///
    /// # Errors
    /// [`DeviceError::OutOfRange`] if the disk has no such block.
    pub fn load(&self, blockno: u32, data: &BlockData) -> Result<(), DeviceError> {
        let id = BlockId::new(self.dev, blockno);
        let mut blocks = self.blocks.lock();
        let block = Self::slot(&mut blocks, id)?;
        block.copy_from_slice(data);
        Ok(())
    }

    fn check(&self, id: BlockId) -> Result<(), DeviceError> {
        if id.dev != self.dev {
            return Err(DeviceError::NoDevice(id.dev));
        }
        if self.faulty.load(Ordering::Relaxed) == u64::from(id.blockno) {
            return Err(DeviceError::Io(id));
        }
        Ok(())
    }

    fn slot(blocks: &mut [Box<BlockData>], id: BlockId) -> Result<&mut BlockData, DeviceError> {
        usize::try_from(id.blockno)
            .ok()
            .and_then(|i| blocks.get_mut(i))
            .map(|b| &mut **b)
            .ok_or(DeviceError::OutOfRange(id))
    }
}

impl BlockDevice for RamDisk {
    fn read_block(&self, id: BlockId, data: &mut BlockData) -> Result<(), DeviceError> {
        self.check(id)?;
        let mut blocks = self.blocks.lock();
        data.copy_from_slice(Self::slot(&mut blocks, id)?);
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn write_block(&self, id: BlockId, data: &BlockData) -> Result<(), DeviceError> {
        self.check(id)?;
        let mut blocks = self.blocks.lock();
        Self::slot(&mut blocks, id)?.copy_from_slice(data);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
