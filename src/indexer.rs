//! The block indexer: direct / single-indirect / double-indirect logical
//! block resolution (`spec.md` §4.D).
//!
//! Generalizes the teacher's `INode::bmap` (`fs/fs.rs`), which only goes one
//! level (direct, then one indirect block) deep, to the two levels of
//! indirection `spec.md` §4.D calls for. Exactly like `bmap`, a pointer
//! slot of zero is either materialized (allocating a fresh, zeroed block
//! and writing its number back into the parent slot) or reported as a
//! hole, depending on the caller's `allocate_if_missing`.

use crate::bitmap;
use crate::cache::BufferCache;
use crate::device::BlockDevice;
use crate::error::{Error, Result};
use crate::inode::{self, Inode};
use crate::layout::{I1_CAP, MAX_FILE_BLOCKS, N_DIR, N_IND, POINTERS_PER_BLOCK};
use crate::superblock::Superblock;

const P: u64 = POINTERS_PER_BLOCK as u64;

/// Resolves logical block `logical` of inode `inode_index` to a physical
/// block number.
///
/// When `allocate_if_missing` is `false`, a hole (an unwritten region of
/// the file) is reported as `Ok(None)` rather than an error — reading a
/// hole is a valid, zero-filled read, not a failure. When `true`, every
/// missing pointer on the path (indirect blocks included) is allocated so
/// the returned block is always writable.
pub fn locate<D: BlockDevice>(
    cache: &BufferCache<D>,
    sb: &Superblock,
    inode_index: u32,
    logical: u64,
    allocate_if_missing: bool,
) -> Result<Option<u32>> {
    if logical >= MAX_FILE_BLOCKS {
        return Err(Error::FileTooLarge);
    }

    if logical < N_DIR as u64 {
        let slot = logical as usize;
        return resolve_slot(cache, sb, inode_index, slot, allocate_if_missing);
    }

    if logical < N_DIR as u64 + I1_CAP {
        let r = logical - N_DIR as u64;
        let ind_slot = N_DIR + (r / P) as usize;
        let ind_block = match resolve_slot(cache, sb, inode_index, ind_slot, allocate_if_missing)? {
            Some(b) => b,
            None => return Ok(None),
        };
        let leaf_off = ((r % P) * 4) as usize;
        return resolve_in_block(cache, sb, ind_block, leaf_off, allocate_if_missing);
    }

    let r = logical - N_DIR as u64 - I1_CAP;
    let top_slot = N_DIR + N_IND + (r / (P * P)) as usize;
    let top_block = match resolve_slot(cache, sb, inode_index, top_slot, allocate_if_missing)? {
        Some(b) => b,
        None => return Ok(None),
    };
    let mid_index = (r / P) % P;
    let mid_off = (mid_index * 4) as usize;
    let mid_block = match resolve_in_block(cache, sb, top_block, mid_off, allocate_if_missing)? {
        Some(b) => b,
        None => return Ok(None),
    };
    let leaf_index = r % P;
    let leaf_off = (leaf_index * 4) as usize;
    resolve_in_block(cache, sb, mid_block, leaf_off, allocate_if_missing)
}

/// Resolves (and optionally materializes) a pointer slot in an inode's own
/// `block_list`.
fn resolve_slot<D: BlockDevice>(
    cache: &BufferCache<D>,
    sb: &Superblock,
    inode_index: u32,
    slot: usize,
    allocate_if_missing: bool,
) -> Result<Option<u32>> {
    let ptr = inode::read_ptr(cache, sb, inode_index, slot)?;
    if ptr != 0 {
        return Ok(Some(ptr));
    }
    if !allocate_if_missing {
        return Ok(None);
    }
    let fresh = bitmap::allocate_block(cache, sb)?;
    inode::write_ptr(cache, sb, inode_index, slot, fresh)?;
    Ok(Some(fresh))
}

/// Resolves (and optionally materializes) a pointer slot at byte offset
/// `offset` within indirect block `block_no`.
fn resolve_in_block<D: BlockDevice>(
    cache: &BufferCache<D>,
    sb: &Superblock,
    block_no: u32,
    offset: usize,
    allocate_if_missing: bool,
) -> Result<Option<u32>> {
    let guard = cache.get(block_no)?;
    let ptr = guard.read_u32(offset);
    if ptr != 0 {
        return Ok(Some(ptr));
    }
    if !allocate_if_missing {
        return Ok(None);
    }
    drop(guard);
    let fresh = bitmap::allocate_block(cache, sb)?;
    let guard = cache.get(block_no)?;
    guard.write_u32(offset, fresh);
    Ok(Some(fresh))
}

/// Frees every block an inode's direct, single-indirect and
/// double-indirect pointers reach, including the indirection blocks
/// themselves. Leaves the inode's `block_list` zeroed; does not clear the
/// `USED` flag — callers pair this with [`crate::inode::destroy_inode`].
pub fn free_inode_storage<D: BlockDevice>(
    cache: &BufferCache<D>,
    sb: &Superblock,
    inode_index: u32,
) -> Result<()> {
    let inode: Inode = inode::read_inode(cache, sb, inode_index)?;

    for slot in 0..N_DIR {
        let ptr = inode.block_list[slot];
        if ptr != 0 {
            bitmap::free_block(cache, sb, ptr)?;
            inode::write_ptr(cache, sb, inode_index, slot, 0)?;
        }
    }

    for n in 0..N_IND {
        let slot = N_DIR + n;
        let ind_ptr = inode.block_list[slot];
        if ind_ptr != 0 {
            free_leaf_pointers(cache, sb, ind_ptr)?;
            bitmap::free_block(cache, sb, ind_ptr)?;
            inode::write_ptr(cache, sb, inode_index, slot, 0)?;
        }
    }

    let top_slot = N_DIR + N_IND;
    let top_ptr = inode.block_list[top_slot];
    if top_ptr != 0 {
        let mids: Vec<u32> = {
            let guard = cache.get(top_ptr)?;
            (0..P as usize)
                .map(|i| guard.read_u32(i * 4))
                .collect()
        };
        for mid_ptr in mids {
            if mid_ptr != 0 {
                free_leaf_pointers(cache, sb, mid_ptr)?;
                bitmap::free_block(cache, sb, mid_ptr)?;
            }
        }
        bitmap::free_block(cache, sb, top_ptr)?;
        inode::write_ptr(cache, sb, inode_index, top_slot, 0)?;
    }

    Ok(())
}

/// Frees every non-zero leaf pointer held in indirect block `block_no`.
fn free_leaf_pointers<D: BlockDevice>(cache: &BufferCache<D>, sb: &Superblock, block_no: u32) -> Result<()> {
    let leaves: Vec<u32> = {
        let guard = cache.get(block_no)?;
        (0..P as usize).map(|i| guard.read_u32(i * 4)).collect()
    };
    for leaf in leaves {
        if leaf != 0 {
            bitmap::free_block(cache, sb, leaf)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap::reserve_metadata_blocks;
    use crate::device::MemBlockDevice;
    use crate::inode::init_inode;
    use crate::layout::SECTORS_PER_BLOCK;
    use std::sync::Arc;

    fn fixture(total_blocks: u32) -> (BufferCache<MemBlockDevice>, Superblock) {
        let dev = Arc::new(MemBlockDevice::new(
            total_blocks as u64 * SECTORS_PER_BLOCK as u64,
        ));
        let cache = BufferCache::new(dev);
        let sb = Superblock::for_new_volume(total_blocks);
        reserve_metadata_blocks(&cache, &sb).unwrap();
        init_inode(&cache, &sb, 0, false).unwrap();
        (cache, sb)
    }

    #[test]
    fn direct_block_is_absent_until_allocated() {
        let (cache, sb) = fixture(4096);
        assert_eq!(locate(&cache, &sb, 0, 3, false).unwrap(), None);
        let b = locate(&cache, &sb, 0, 3, true).unwrap().unwrap();
        assert!(b >= sb.data_start);
        assert_eq!(locate(&cache, &sb, 0, 3, false).unwrap(), Some(b));
    }

    #[test]
    fn single_indirect_region_allocates_indirect_block_once() {
        let (cache, sb) = fixture(8192);
        let l = N_DIR as u64;
        let first = locate(&cache, &sb, 0, l, true).unwrap().unwrap();
        let second = locate(&cache, &sb, 0, l + 1, true).unwrap().unwrap();
        assert_ne!(first, second);
        // Adjacent logical blocks share one indirect block.
        let ptr0 = inode::read_ptr(&cache, &sb, 0, N_DIR).unwrap();
        assert_ne!(ptr0, 0);
    }

    #[test]
    fn double_indirect_region_resolves_and_allocates() {
        let (cache, sb) = fixture(16384);
        let l = N_DIR as u64 + I1_CAP + 5;
        assert_eq!(locate(&cache, &sb, 0, l, false).unwrap(), None);
        let b = locate(&cache, &sb, 0, l, true).unwrap().unwrap();
        assert_eq!(locate(&cache, &sb, 0, l, false).unwrap(), Some(b));
    }

    #[test]
    fn out_of_range_logical_block_is_file_too_large() {
        let (cache, sb) = fixture(4096);
        let err = locate(&cache, &sb, 0, MAX_FILE_BLOCKS, true).unwrap_err();
        assert_eq!(err, Error::FileTooLarge);
    }

    #[test]
    fn free_inode_storage_releases_direct_and_indirect_blocks() {
        let (cache, sb) = fixture(8192);
        let l = N_DIR as u64 + 2;
        locate(&cache, &sb, 0, 0, true).unwrap();
        locate(&cache, &sb, 0, l, true).unwrap();
        free_inode_storage(&cache, &sb, 0).unwrap();
        let inode = inode::read_inode(&cache, &sb, 0).unwrap();
        assert!(inode.block_list.iter().all(|&p| p == 0));
    }
}
