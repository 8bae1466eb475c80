//! Virtual disk abstractions backing the Aeon storage device models.
//!
//! The ATA/ATAPI layer needs a *sector-oriented* view of its media, while host
//! images are plain byte streams. This crate provides:
//!
//! - [`VirtualDisk`]: byte-addressed disk interface with sector helpers
//! - [`MemDisk`]: in-memory raw image (tests, scratch media)
//! - [`FileDisk`]: raw image file on the host filesystem

#![forbid(unsafe_code)]

mod disk;
mod error;

pub use disk::{FileDisk, MemDisk, VirtualDisk, SECTOR_SIZE};
pub use error::{DiskError, Result};
