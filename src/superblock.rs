//! The on-disk superblock (`spec.md` §3, §4.A, §6).
//!
//! Block 0, offset 0 carries the 32-bit magic `0x0d000721`, followed by the
//! rest of the superblock fields in declared order, all little-endian,
//! native (32-bit) pointer width. Only the superblock's own block number
//! (0) is hard-coded; everything downstream of it is an offset carried in
//! these fields, mirroring the teacher's `fs/mod.rs::SuperBlock` (which
//! plays the same "describes the disk layout" role for `inodestart` /
//! `bmapstart`).

use crate::cache::BufferCache;
use crate::device::BlockDevice;
use crate::error::{Error, Result};
use crate::layout::{BLOCK_SIZE, INODE_TABLE_BLOCKS, MAGIC};

/// Offset, within block 0, of each superblock field.
mod field {
    pub const MAGIC: usize = 0;
    pub const STRUCT_SIZE: usize = 4;
    pub const TOTAL_BLOCKS: usize = 8;
    pub const BITMAP_START: usize = 12;
    pub const INODE_TABLE_START: usize = 16;
    pub const DATA_START: usize = 20;
    pub const END: usize = 24;
}

/// The in-memory cache of the superblock's on-disk fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Superblock {
    pub magic: u32,
    /// Byte size of this structure as persisted (field::END).
    pub struct_size: u32,
    /// Total number of file-system blocks on the volume.
    pub total_blocks: u32,
    /// Block number of the first bitmap block.
    pub bitmap_start: u32,
    /// Block number of the first inode-table block.
    pub inode_table_start: u32,
    /// Block number of the first data block.
    pub data_start: u32,
}

impl Superblock {
    /// Number of blocks needed to hold one bit per block of a volume with
    /// `total_blocks` blocks.
    pub fn bitmap_blocks(total_blocks: u32) -> u32 {
        let bits_per_block = BLOCK_SIZE * 8;
        total_blocks.div_ceil(bits_per_block)
    }

    /// Computes the layout for a fresh volume of `total_blocks` blocks.
    pub fn for_new_volume(total_blocks: u32) -> Self {
        let bitmap_start = 1;
        let bitmap_blocks = Self::bitmap_blocks(total_blocks);
        let inode_table_start = bitmap_start + bitmap_blocks;
        let data_start = inode_table_start + INODE_TABLE_BLOCKS;
        Superblock {
            magic: MAGIC,
            struct_size: field::END as u32,
            total_blocks,
            bitmap_start,
            inode_table_start,
            data_start,
        }
    }

    /// Number of bitmap blocks on this volume.
    pub fn bitmap_block_count(&self) -> u32 {
        self.inode_table_start - self.bitmap_start
    }

    fn encode(&self, buf: &mut [u8]) {
        buf[field::MAGIC..field::MAGIC + 4].copy_from_slice(&self.magic.to_le_bytes());
        buf[field::STRUCT_SIZE..field::STRUCT_SIZE + 4]
            .copy_from_slice(&self.struct_size.to_le_bytes());
        buf[field::TOTAL_BLOCKS..field::TOTAL_BLOCKS + 4]
            .copy_from_slice(&self.total_blocks.to_le_bytes());
        buf[field::BITMAP_START..field::BITMAP_START + 4]
            .copy_from_slice(&self.bitmap_start.to_le_bytes());
        buf[field::INODE_TABLE_START..field::INODE_TABLE_START + 4]
            .copy_from_slice(&self.inode_table_start.to_le_bytes());
        buf[field::DATA_START..field::DATA_START + 4]
            .copy_from_slice(&self.data_start.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Self {
        let read = |off: usize| u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
        Superblock {
            magic: read(field::MAGIC),
            struct_size: read(field::STRUCT_SIZE),
            total_blocks: read(field::TOTAL_BLOCKS),
            bitmap_start: read(field::BITMAP_START),
            inode_table_start: read(field::INODE_TABLE_START),
            data_start: read(field::DATA_START),
        }
    }

    /// Reads and validates the superblock from block 0 of `cache`.
    ///
    /// Fails with [`Error::InvalidFs`] on a magic mismatch, the only
    /// condition `spec.md` §4.I calls out for mount-time rejection.
    pub fn read<D: BlockDevice>(cache: &BufferCache<D>) -> Result<Self> {
        let guard = cache.get(0)?;
        let mut buf = vec![0u8; field::END];
        guard.read_at(0, &mut buf);
        let sb = Self::decode(&buf);
        if sb.magic != MAGIC {
            return Err(Error::InvalidFs("superblock magic mismatch"));
        }
        Ok(sb)
    }

    /// Persists this superblock to block 0 of `cache`.
    pub fn write<D: BlockDevice>(&self, cache: &BufferCache<D>) -> Result<()> {
        let guard = cache.get(0)?;
        let mut buf = vec![0u8; field::END];
        self.encode(&mut buf);
        guard.write_at(0, &buf);
        Ok(())
    }
}
