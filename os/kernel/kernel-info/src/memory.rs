//! # Memory Layout

/// Physical address at which RAM starts and the kernel image is loaded.
pub const KERNBASE: u64 = 0x8000_0000;

/// Amount of RAM the kernel manages above [`KERNBASE`].
pub const PHYS_MEM_SIZE: u64 = 128 * 1024 * 1024;

/// Physical-memory ceiling: the first address past the last allocatable frame.
pub const PHYSTOP: u64 = KERNBASE + PHYS_MEM_SIZE;

/// A simple Higher Half Direct Map (HHDM) base.
/// Anything you map at [`HHDM_BASE`] + `pa` lets the kernel
/// access physical memory via a fixed offset.
pub const HHDM_BASE: u64 = 0xffff_8880_0000_0000;

const _: () = {
    assert!(KERNBASE.is_multiple_of(4096));
    assert!(PHYSTOP.is_multiple_of(4096));
    assert!(PHYSTOP > KERNBASE);
    assert!(HHDM_BASE.checked_add(PHYSTOP).is_some());
};
