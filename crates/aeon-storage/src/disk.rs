use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{DiskError, Result};

/// Native ATA sector size in bytes. ATAPI media use 2048-byte sectors; those
/// backends pass an explicit `sector_size` to the helpers below.
pub const SECTOR_SIZE: usize = 512;

/// Byte-addressed virtual disk with sector helpers.
///
/// `read_at`/`write_at` take `&mut self` because file-backed implementations
/// seek; all access goes through one owner (the device model), so there is no
/// sharing to preserve.
pub trait VirtualDisk: Send {
    fn capacity_bytes(&self) -> u64;

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()>;

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()>;

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// Number of whole `sector_size`-byte sectors the disk holds.
    fn sector_count(&self, sector_size: usize) -> u64 {
        self.capacity_bytes() / sector_size as u64
    }

    fn read_sectors(&mut self, lba: u64, sector_size: usize, buf: &mut [u8]) -> Result<()> {
        let offset = sector_offset(lba, sector_size, buf.len())?;
        self.read_at(offset, buf)
    }

    fn write_sectors(&mut self, lba: u64, sector_size: usize, buf: &[u8]) -> Result<()> {
        let offset = sector_offset(lba, sector_size, buf.len())?;
        self.write_at(offset, buf)
    }
}

fn sector_offset(lba: u64, sector_size: usize, len: usize) -> Result<u64> {
    if !len.is_multiple_of(sector_size) {
        return Err(DiskError::UnalignedLength {
            len,
            alignment: sector_size,
        });
    }
    lba.checked_mul(sector_size as u64)
        .ok_or(DiskError::OffsetOverflow)
}

fn check_bounds(offset: u64, len: usize, capacity: u64) -> Result<()> {
    let end = offset
        .checked_add(len as u64)
        .ok_or(DiskError::OffsetOverflow)?;
    if end > capacity {
        return Err(DiskError::OutOfBounds {
            offset,
            len,
            capacity,
        });
    }
    Ok(())
}

/// In-memory raw disk image.
pub struct MemDisk {
    data: Vec<u8>,
}

impl MemDisk {
    /// Create a zero-filled disk of `capacity` bytes.
    pub fn new(capacity: u64) -> Result<Self> {
        let len = usize::try_from(capacity).map_err(|_| DiskError::OffsetOverflow)?;
        Ok(Self { data: vec![0; len] })
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }
}

impl VirtualDisk for MemDisk {
    fn capacity_bytes(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        check_bounds(offset, buf.len(), self.capacity_bytes())?;
        let start = offset as usize;
        buf.copy_from_slice(&self.data[start..start + buf.len()]);
        Ok(())
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        check_bounds(offset, buf.len(), self.capacity_bytes())?;
        let start = offset as usize;
        self.data[start..start + buf.len()].copy_from_slice(buf);
        Ok(())
    }
}

/// Raw disk image stored in a host file.
///
/// The capacity is fixed at open time; the guest cannot grow the image.
pub struct FileDisk {
    file: File,
    capacity: u64,
    read_only: bool,
}

impl FileDisk {
    pub fn open(path: &Path, read_only: bool) -> Result<Self> {
        let file = File::options()
            .read(true)
            .write(!read_only)
            .open(path)?;
        let capacity = file.metadata()?.len();
        Ok(Self {
            file,
            capacity,
            read_only,
        })
    }
}

impl VirtualDisk for FileDisk {
    fn capacity_bytes(&self) -> u64 {
        self.capacity
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        check_bounds(offset, buf.len(), self.capacity)?;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<()> {
        if self.read_only {
            return Err(DiskError::ReadOnly);
        }
        check_bounds(offset, buf.len(), self.capacity)?;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buf)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }
}
