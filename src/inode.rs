//! The on-disk inode record and inode-table operations (`spec.md` §3,
//! §4.C).
//!
//! Generalizes the teacher's `DINode`/`ITable` (`fs/mod.rs`, `fs/fs.rs`):
//! fixed-size records packed into a flat table of blocks, indexed by
//! inode number, with a `USED` flag replacing the teacher's `type: i16`
//! (free vs. in-use) and `ISDIRECTORY` standing in for its separate
//! `T_DIR` variant. Unlike the teacher, an inode's block-pointer vector is
//! mutated in place through the cache by `indexer.rs` rather than via a
//! decode-mutate-encode round trip, so the pointer layout is exposed here
//! as byte offsets as well as through the whole-record [`Inode`] type.

use bitflags::bitflags;

use crate::cache::BufferCache;
use crate::device::BlockDevice;
use crate::error::{Error, Result};
use crate::layout::{INODES_PER_BLOCK, INODE_SIZE, MAX_ACL_ENTRIES, MAX_INODES, N_PTRS, NULL_INODE};
use crate::superblock::Superblock;

bitflags! {
    /// Flags carried in an inode's `flags` field.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InodeFlags: u64 {
        /// Set for every inode currently allocated to a file or directory.
        const USED = 1 << 0;
        /// Set when the inode names a directory rather than a regular file.
        const IS_DIRECTORY = 1 << 1;
        /// Set-UID bit, carried through but not interpreted by this crate.
        const SETUID = 1 << 2;
    }
}

/// One access-control-list entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AclEntry {
    pub uid: u32,
    pub permissions: u32,
    pub valid: bool,
}

impl AclEntry {
    const SIZE: usize = 12;

    fn encode(&self, buf: &mut [u8]) {
        buf[0..4].copy_from_slice(&self.uid.to_le_bytes());
        buf[4..8].copy_from_slice(&self.permissions.to_le_bytes());
        buf[8..12].copy_from_slice(&(self.valid as u32).to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Self {
        AclEntry {
            uid: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            permissions: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            valid: u32::from_le_bytes(buf[8..12].try_into().unwrap()) != 0,
        }
    }
}

/// The whole-record view of one on-disk inode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inode {
    pub size: u64,
    pub flags: InodeFlags,
    pub block_list: [u32; N_PTRS],
    pub acl: [AclEntry; MAX_ACL_ENTRIES],
}

impl Inode {
    /// A freshly zeroed, unused inode record.
    pub fn empty() -> Self {
        Inode {
            size: 0,
            flags: InodeFlags::empty(),
            block_list: [0; N_PTRS],
            acl: [AclEntry::default(); MAX_ACL_ENTRIES],
        }
    }

    fn encode(&self, buf: &mut [u8]) {
        buf[0..8].copy_from_slice(&self.size.to_le_bytes());
        buf[8..16].copy_from_slice(&self.flags.bits().to_le_bytes());
        for (i, ptr) in self.block_list.iter().enumerate() {
            let off = ptr_offset(i);
            buf[off..off + 4].copy_from_slice(&ptr.to_le_bytes());
        }
        for (i, entry) in self.acl.iter().enumerate() {
            let off = acl_offset(i);
            entry.encode(&mut buf[off..off + AclEntry::SIZE]);
        }
    }

    fn decode(buf: &[u8]) -> Self {
        let size = u64::from_le_bytes(buf[0..8].try_into().unwrap());
        let flags = InodeFlags::from_bits_truncate(u64::from_le_bytes(buf[8..16].try_into().unwrap()));
        let mut block_list = [0u32; N_PTRS];
        for (i, slot) in block_list.iter_mut().enumerate() {
            let off = ptr_offset(i);
            *slot = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
        }
        let mut acl = [AclEntry::default(); MAX_ACL_ENTRIES];
        for (i, entry) in acl.iter_mut().enumerate() {
            let off = acl_offset(i);
            *entry = AclEntry::decode(&buf[off..off + AclEntry::SIZE]);
        }
        Inode {
            size,
            flags,
            block_list,
            acl,
        }
    }
}

/// Byte offset, within one inode record, of block-pointer slot `slot`.
pub fn ptr_offset(slot: usize) -> usize {
    16 + slot * 4
}

fn acl_offset(entry: usize) -> usize {
    16 + N_PTRS * 4 + entry * AclEntry::SIZE
}

/// Block number and in-block byte offset of inode `index`'s record.
pub fn location(sb: &Superblock, index: u32) -> (u32, usize) {
    let block = sb.inode_table_start + index / INODES_PER_BLOCK;
    let offset = (index % INODES_PER_BLOCK) as usize * INODE_SIZE as usize;
    (block, offset)
}

/// Reads inode `index` in full.
pub fn read_inode<D: BlockDevice>(
    cache: &BufferCache<D>,
    sb: &Superblock,
    index: u32,
) -> Result<Inode> {
    let (block, offset) = location(sb, index);
    let guard = cache.get(block)?;
    let mut buf = vec![0u8; INODE_SIZE as usize];
    guard.read_at(offset, &mut buf);
    Ok(Inode::decode(&buf))
}

/// Persists `inode` to index `index` in full.
pub fn write_inode<D: BlockDevice>(
    cache: &BufferCache<D>,
    sb: &Superblock,
    index: u32,
    inode: &Inode,
) -> Result<()> {
    let (block, offset) = location(sb, index);
    let guard = cache.get(block)?;
    let mut buf = vec![0u8; INODE_SIZE as usize];
    inode.encode(&mut buf);
    guard.write_at(offset, &buf);
    Ok(())
}

/// Reads block-pointer slot `slot` of inode `index` directly from the
/// cache, without decoding the whole record. Used by the block indexer.
pub fn read_ptr<D: BlockDevice>(
    cache: &BufferCache<D>,
    sb: &Superblock,
    index: u32,
    slot: usize,
) -> Result<u32> {
    let (block, offset) = location(sb, index);
    let guard = cache.get(block)?;
    Ok(guard.read_u32(offset + ptr_offset(slot)))
}

/// Writes block-pointer slot `slot` of inode `index` directly through the
/// cache, marking the inode-table block dirty.
pub fn write_ptr<D: BlockDevice>(
    cache: &BufferCache<D>,
    sb: &Superblock,
    index: u32,
    slot: usize,
    value: u32,
) -> Result<()> {
    let (block, offset) = location(sb, index);
    let guard = cache.get(block)?;
    guard.write_u32(offset + ptr_offset(slot), value);
    Ok(())
}

/// Scans the inode table for the lowest-numbered unused inode and marks it
/// [`InodeFlags::USED`], without yet setting any other field.
///
/// Fails with [`Error::NoSpace`] when every inode is in use.
pub fn find_free_inode<D: BlockDevice>(cache: &BufferCache<D>, sb: &Superblock) -> Result<u32> {
    for index in 0..MAX_INODES {
        let inode = read_inode(cache, sb, index)?;
        if !inode.flags.contains(InodeFlags::USED) {
            return Ok(index);
        }
    }
    Err(Error::NoSpace)
}

/// Initializes inode `index` as a fresh, empty file or directory.
pub fn init_inode<D: BlockDevice>(
    cache: &BufferCache<D>,
    sb: &Superblock,
    index: u32,
    is_directory: bool,
) -> Result<()> {
    let mut inode = Inode::empty();
    inode.flags = InodeFlags::USED;
    if is_directory {
        inode.flags |= InodeFlags::IS_DIRECTORY;
    }
    write_inode(cache, sb, index, &inode)
}

/// Clears inode `index` back to an unused, zeroed record. Callers must
/// have already freed every block named in its block-pointer vector.
pub fn destroy_inode<D: BlockDevice>(cache: &BufferCache<D>, sb: &Superblock, index: u32) -> Result<()> {
    if index == NULL_INODE {
        return Err(Error::InvalidArgument("cannot destroy the null inode"));
    }
    write_inode(cache, sb, index, &Inode::empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemBlockDevice;
    use crate::layout::SECTORS_PER_BLOCK;
    use std::sync::Arc;

    fn fixture() -> (BufferCache<MemBlockDevice>, Superblock) {
        let total_blocks = 64u32;
        let dev = Arc::new(MemBlockDevice::new(
            total_blocks as u64 * SECTORS_PER_BLOCK as u64,
        ));
        let cache = BufferCache::new(dev);
        let sb = Superblock::for_new_volume(total_blocks);
        (cache, sb)
    }

    #[test]
    fn round_trips_a_full_inode_record() {
        let (cache, sb) = fixture();
        let mut inode = Inode::empty();
        inode.size = 12345;
        inode.flags = InodeFlags::USED | InodeFlags::IS_DIRECTORY;
        inode.block_list[0] = 99;
        inode.acl[1] = AclEntry {
            uid: 7,
            permissions: 0o644,
            valid: true,
        };
        write_inode(&cache, &sb, 5, &inode).unwrap();
        let back = read_inode(&cache, &sb, 5).unwrap();
        assert_eq!(back, inode);
    }

    #[test]
    fn find_free_inode_skips_used_ones() {
        let (cache, sb) = fixture();
        init_inode(&cache, &sb, 0, false).unwrap();
        init_inode(&cache, &sb, 1, false).unwrap();
        let free = find_free_inode(&cache, &sb).unwrap();
        assert_eq!(free, 2);
    }

    #[test]
    fn destroy_inode_clears_used_flag() {
        let (cache, sb) = fixture();
        init_inode(&cache, &sb, 3, true).unwrap();
        destroy_inode(&cache, &sb, 3).unwrap();
        let inode = read_inode(&cache, &sb, 3).unwrap();
        assert!(!inode.flags.contains(InodeFlags::USED));
    }

    #[test]
    fn read_ptr_and_write_ptr_agree_with_whole_record_codec() {
        let (cache, sb) = fixture();
        init_inode(&cache, &sb, 0, false).unwrap();
        write_ptr(&cache, &sb, 0, 2, 77).unwrap();
        assert_eq!(read_ptr(&cache, &sb, 0, 2).unwrap(), 77);
        let whole = read_inode(&cache, &sb, 0).unwrap();
        assert_eq!(whole.block_list[2], 77);
    }
}
