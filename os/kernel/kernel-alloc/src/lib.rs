//! # Physical Frame Allocation
//!
//! This crate owns every physical page between the end of the kernel image and
//! the top of RAM and hands them out one at a time to the rest of the kernel:
//! user memory, kernel stacks, page-table pages, and pipe buffers.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ FrameAllocator                                               │
//! │                                                              │
//! │  cpu 0: SpinLock<free list + home ref counts>                │
//! │  cpu 1: SpinLock<free list + home ref counts>                │
//! │  ...                                                         │
//! │                                                              │
//! │  FrameLinks (shared, out-of-band "next" per frame)           │
//! └──────────────┬───────────────────────────────┬───────────────┘
//!                │ junk fills                    │ index ↔ address
//!        ┌───────▼───────┐               ┌───────▼───────┐
//!        │  PhysMapper   │               │ MemoryLayout  │
//!        └───────────────┘               └───────────────┘
//! ```
//!
//! ### Frame Allocator ([`frame_alloc`])
//! * **Per-core free lists**: allocation and release touch only the calling
//!   core's lock in the common case
//! * **Stealing**: an empty core takes a frame from another core's list
//! * **Reference counts**: shared frames (copy-on-write) are reclaimed only
//!   when the last reference is dropped
//! * **Junk fills**: freshly allocated frames read as `0x05`, freed ones as
//!   `0x01`, so stale or uninitialized use shows up quickly
//!
//! ### Layout ([`layout`])
//! Maps between frame indices and physical addresses and splits the indices
//! into per-core partitions.
//!
//! ### Physical Mapper ([`phys_mapper`])
//! Tells the allocator where a frame's bytes are visible: the higher-half
//! direct map in the kernel, or an [`ArenaMemory`] on a host.
//!
//! ## Usage
//!
//! ```rust
//! use kernel_alloc::{ArenaMemory, FrameAllocator, MemoryLayout, PhysicalAddress};
//! use kernel_sync::hosted::HostCpu;
//!
//! let layout = MemoryLayout::new(
//!     PhysicalAddress::new(0x8000_0000),
//!     PhysicalAddress::new(0x8001_0000),
//!     2,
//! )
//! .unwrap();
//! let memory = ArenaMemory::new(layout);
//! let frames = FrameAllocator::new(layout, &memory, HostCpu::new(2));
//!
//! let frame = frames.allocate().unwrap();
//! frames.add_reference(frame.base());
//! assert_eq!(frames.reference_count(frame.base()), Ok(2));
//! frames.free(frame.base());
//! frames.free(frame.base());
//! assert_eq!(frames.free_frames(), frames.total_frames());
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

pub mod arena;
pub mod frame;
pub mod frame_alloc;
mod free_list;
pub mod layout;
pub mod phys_mapper;

pub use arena::ArenaMemory;
pub use frame::{FRAME_BYTES, PhysicalAddress, PhysicalFrame};
pub use frame_alloc::{FrameAllocator, FrameError};
pub use layout::{LayoutError, MemoryLayout};
pub use phys_mapper::{HhdmPhysMapper, PhysMapper};
