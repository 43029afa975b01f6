//! # Kernel Configuration
//!
//! Compile-time parameters shared by the kernel's resource managers. This
//! crate is the single source of truth for the numbers that the frame
//! allocator and the buffer cache are sized by, so that the two engines (and
//! the code that boots them) never drift apart.
//!
//! ## Modules
//!
//! ### Memory Layout ([`memory`])
//! Physical memory bounds and the direct map used to touch frame contents:
//! * **Physical Window**: `KERNBASE` (where RAM and the kernel image start) and
//!   `PHYSTOP` (the configured physical-memory ceiling)
//! * **Direct Map**: `HHDM_BASE`, the virtual offset at which all of physical
//!   memory is mapped for kernel use
//!
//! ### Parameters ([`param`])
//! Sizing knobs for the per-core allocator and the buffer cache:
//! * **Processors**: `NCPU`, the number of per-core free lists
//! * **Pages**: `PAGE_SIZE` and the junk patterns written into frames
//! * **Buffer Cache**: `BSIZE`, `NBUCKET`, and `NBUF` (buffers per bucket)
//!
//! ## Physical Memory Layout
//!
//! ```text
//! KERNBASE      ┌─────────────────────────────────┐ 0x8000_0000
//!               │       Kernel Image              │
//!               │   (Text, Data, BSS)             │
//! kernel end    ├─────────────────────────────────┤ (linker symbol, rounded up)
//!               │    Allocatable Frames           │
//!               │  (split across NCPU free lists) │
//! PHYSTOP       └─────────────────────────────────┘ KERNBASE + 128 MiB
//! ```
//!
//! All values are `const` and validated with compile-time assertions.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod memory;
pub mod param;
