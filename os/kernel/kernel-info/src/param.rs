//! # Kernel Parameters

/// Maximum number of processors, and therefore of per-core free lists.
pub const NCPU: usize = 8;

/// Size of a physical page frame in bytes.
pub const PAGE_SIZE: u64 = 4096;

/// log2 of [`PAGE_SIZE`].
pub const PAGE_SHIFT: u32 = 12;

/// Byte written over every byte of a frame when it is handed out.
///
/// A non-zero pattern makes reads of uninitialized memory stand out.
pub const ALLOC_JUNK: u8 = 0x05;

/// Byte written over every byte of a frame when it is reclaimed.
///
/// Dangling users of a freed frame observe this pattern.
pub const FREE_JUNK: u8 = 0x01;

/// Size of a disk block, and of every buffer-cache buffer, in bytes.
pub const BSIZE: usize = 1024;

/// Number of independently locked buffer-cache buckets.
pub const NBUCKET: usize = 13;

/// Number of buffers owned by each bucket.
pub const NBUF: usize = 30;

const _: () = {
    assert!(NCPU > 0);
    assert!(1 << PAGE_SHIFT == PAGE_SIZE);
    assert!(ALLOC_JUNK != 0 && FREE_JUNK != 0);
    assert!(ALLOC_JUNK != FREE_JUNK);
    assert!(BSIZE > 0 && BSIZE.is_power_of_two());
    assert!(NBUCKET > 0 && NBUF > 0);
};
