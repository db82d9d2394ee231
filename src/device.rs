//! The block device: read sector / write sector / number-of-sectors.
//!
//! `spec.md` §1 names the block device driver as an external collaborator
//! described only by this interface. [`MemBlockDevice`] is the one concrete
//! implementation this crate ships — an in-memory stand-in used by its own
//! tests (mirroring the teacher's `mkfs` tool, which drives the identical
//! on-disk structures through plain `std::fs::File` reads/writes rather
//! than a real disk driver).

use crate::error::{Error, Result};
use crate::layout::SECTOR_SIZE;
use std::sync::Mutex;

/// A sector-addressable block device.
///
/// Implementations are expected to be safe to share across threads; GOSFS
/// wraps every device in an `Arc` and may call into it from whichever
/// thread holds a mount's mutex.
pub trait BlockDevice: Send + Sync {
    /// Reads exactly one sector (`SECTOR_SIZE` bytes) into `buf`.
    fn read_sector(&self, sector: u64, buf: &mut [u8]) -> Result<()>;

    /// Writes exactly one sector (`SECTOR_SIZE` bytes) from `buf`.
    fn write_sector(&self, sector: u64, buf: &[u8]) -> Result<()>;

    /// Total number of sectors exposed by the device.
    fn num_sectors(&self) -> u64;
}

/// An in-memory [`BlockDevice`] backed by a single `Vec<u8>`.
///
/// Used by this crate's own test suite in place of a real disk driver, and
/// exported under `test-util` for downstream crates that want the same
/// fixture.
pub struct MemBlockDevice {
    sectors: Mutex<Vec<u8>>,
    num_sectors: u64,
}

impl MemBlockDevice {
    /// Creates a zeroed device with room for `num_sectors` sectors.
    pub fn new(num_sectors: u64) -> Self {
        let bytes = num_sectors as usize * SECTOR_SIZE as usize;
        Self {
            sectors: Mutex::new(vec![0u8; bytes]),
            num_sectors,
        }
    }
}

impl BlockDevice for MemBlockDevice {
    fn read_sector(&self, sector: u64, buf: &mut [u8]) -> Result<()> {
        if sector >= self.num_sectors {
            return Err(Error::Unspecified(format!(
                "read_sector: sector {sector} out of range"
            )));
        }
        let start = sector as usize * SECTOR_SIZE as usize;
        let data = self.sectors.lock().map_err(|_| Error::NoMemory)?;
        buf.copy_from_slice(&data[start..start + SECTOR_SIZE as usize]);
        Ok(())
    }

    fn write_sector(&self, sector: u64, buf: &[u8]) -> Result<()> {
        if sector >= self.num_sectors {
            return Err(Error::Unspecified(format!(
                "write_sector: sector {sector} out of range"
            )));
        }
        let start = sector as usize * SECTOR_SIZE as usize;
        let mut data = self.sectors.lock().map_err(|_| Error::NoMemory)?;
        data[start..start + SECTOR_SIZE as usize].copy_from_slice(buf);
        Ok(())
    }

    fn num_sectors(&self) -> u64 {
        self.num_sectors
    }
}
