//! # Block Buffer Cache
//!
//! Caches disk blocks in memory for the file system and is the only path
//! through which it touches the disk. The cache
//!
//! * keeps at most one buffer per block, so every reader sees every writer's
//!   changes,
//! * hands each buffer to one thread at a time ([`Buf`] owns its sleep lock),
//! * evicts the least recently used unreferenced buffer when a block is not
//!   cached.
//!
//! ## Architecture
//!
//! Buffers are split into hash buckets, each with its own spin lock over the
//! buffer metadata; buffer contents are guarded by per-buffer sleep locks
//! that may be held across disk I/O. See [`cache`] for the protocol.
//!
//! ## Usage
//!
//! ```rust
//! use kernel_bio::{BufferCache, CacheConfig, RamDisk, Ticks};
//! use kernel_sync::hosted::HostCpu;
//!
//! let disk = RamDisk::new(1, 64);
//! let ticks = Ticks::new();
//! let cache = BufferCache::new(CacheConfig::default(), &disk, HostCpu::new(2), &ticks).unwrap();
//!
//! let mut buf = cache.read(1, 7).unwrap();
//! buf[0] = 0xAB;
//! cache.write(&buf).unwrap();
//! cache.release(buf);
//!
//! assert_eq!(disk.contents(7).unwrap()[0], 0xAB);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

mod bucket;
mod buf;
pub mod cache;
pub mod clock;
pub mod config;
pub mod device;
#[cfg(test)]
mod interleavings;

pub use buf::{Buf, BufPin};
pub use cache::{BioError, BufferCache};
pub use clock::{Clock, Ticks};
pub use config::{CacheConfig, ConfigError};
pub use device::{BLOCK_SIZE, BlockData, BlockDevice, BlockId, DeviceError, RamDisk};
