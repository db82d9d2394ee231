//! Directory entry operations (`spec.md` §4.F).
//!
//! A directory's contents are fixed-size entries packed into its direct
//! data blocks only — this crate does not extend directories through the
//! single- or double-indirect regions, capping a directory at
//! `N_DIR * DIRENTS_PER_BLOCK` entries. Generalizes the teacher's
//! `dirlookup`/`dirlink` (`fs/fs.rs`), which scan a directory inode's data a
//! `Dirent` at a time for a name match or a free (`inum == 0`) slot; here
//! a three-way type tag (`Free` / `Regular` / `This`) replaces the
//! teacher's implicit "`inum == 0` means free" convention so a directory's
//! self-reference entry can be told apart from an ordinary child.

use crate::cache::BufferCache;
use crate::device::BlockDevice;
use crate::error::{Error, Result};
use crate::indexer;
use crate::inode;
use crate::layout::{DIRENTS_PER_BLOCK, DIRENT_SIZE, FILENAME_FIELD, N_DIR, NAME_MAX};
use crate::superblock::Superblock;

/// The tag carried by a directory entry's `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryType {
    /// An unused slot, available for a new entry.
    Free,
    /// An ordinary child (file or subdirectory).
    Regular,
    /// The self-reference entry every directory is given at creation.
    This,
}

impl EntryType {
    fn from_u64(v: u64) -> Self {
        match v {
            1 => EntryType::Regular,
            2 => EntryType::This,
            _ => EntryType::Free,
        }
    }

    fn to_u64(self) -> u64 {
        match self {
            EntryType::Free => 0,
            EntryType::Regular => 1,
            EntryType::This => 2,
        }
    }
}

/// One decoded directory entry and the slot it occupies.
#[derive(Debug, Clone)]
struct Slot {
    block_index: usize,
    entry_index: usize,
    name: [u8; FILENAME_FIELD],
    entry_type: EntryType,
    inode: u32,
}

fn entry_offset(entry_index: usize) -> usize {
    entry_index * DIRENT_SIZE as usize
}

fn encode_name(name: &[u8]) -> Result<[u8; FILENAME_FIELD]> {
    if name.is_empty() || name.len() > NAME_MAX {
        return Err(Error::InvalidArgument("directory entry name length out of range"));
    }
    if name.contains(&b'/') || name.contains(&0) {
        return Err(Error::InvalidArgument("directory entry name contains '/' or NUL"));
    }
    let mut buf = [0u8; FILENAME_FIELD];
    buf[..name.len()].copy_from_slice(name);
    Ok(buf)
}

fn decode_name(buf: &[u8; FILENAME_FIELD]) -> &[u8] {
    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    &buf[..len]
}

/// A directory inode's `size` is the count of its populated (non-`Free`)
/// entries (`spec.md` §3, §8). `insert_entry`/`remove_entry`/
/// `init_directory` keep it current by reading, adjusting and writing
/// back the whole inode record each time a slot changes occupancy.
fn adjust_size<D: BlockDevice>(
    cache: &BufferCache<D>,
    sb: &Superblock,
    dir_inode: u32,
    delta: i64,
) -> Result<()> {
    let mut inode = inode::read_inode(cache, sb, dir_inode)?;
    inode.size = (inode.size as i64 + delta) as u64;
    inode::write_inode(cache, sb, dir_inode, &inode)
}

/// Walks every entry across a directory's direct blocks, calling `f` with
/// each occupied slot, stopping early if `f` returns `Some`.
fn scan<D: BlockDevice, R>(
    cache: &BufferCache<D>,
    sb: &Superblock,
    dir_inode: u32,
    mut f: impl FnMut(&Slot) -> Option<R>,
) -> Result<Option<R>> {
    for block_index in 0..N_DIR {
        let block_no = match indexer::locate(cache, sb, dir_inode, block_index as u64, false)? {
            Some(b) => b,
            None => continue,
        };
        let guard = cache.get(block_no)?;
        for entry_index in 0..DIRENTS_PER_BLOCK as usize {
            let off = entry_offset(entry_index);
            let mut name = [0u8; FILENAME_FIELD];
            guard.read_at(off, &mut name);
            let entry_type = EntryType::from_u64(guard.read_u64_at(off + FILENAME_FIELD));
            let inode = guard.read_u64_at(off + FILENAME_FIELD + 8) as u32;
            if matches!(entry_type, EntryType::Free) {
                continue;
            }
            let slot = Slot {
                block_index,
                entry_index,
                name,
                entry_type,
                inode,
            };
            if let Some(r) = f(&slot) {
                return Ok(Some(r));
            }
        }
    }
    Ok(None)
}

/// Looks up `name` among a directory's entries, first-match-in-scan-order.
pub fn find_entry<D: BlockDevice>(
    cache: &BufferCache<D>,
    sb: &Superblock,
    dir_inode: u32,
    name: &[u8],
) -> Result<Option<u32>> {
    scan(cache, sb, dir_inode, |slot| {
        if decode_name(&slot.name) == name {
            Some(slot.inode)
        } else {
            None
        }
    })
}

/// Writes `entry_type`/`child_inode` into block `block_index`, entry
/// `entry_index` of `dir_inode`, allocating the block if it is a hole.
fn write_slot<D: BlockDevice>(
    cache: &BufferCache<D>,
    sb: &Superblock,
    dir_inode: u32,
    block_index: usize,
    entry_index: usize,
    name: &[u8; FILENAME_FIELD],
    entry_type: EntryType,
    child_inode: u32,
) -> Result<()> {
    let block_no = indexer::locate(cache, sb, dir_inode, block_index as u64, true)?
        .expect("allocate_if_missing always returns Some");
    let guard = cache.get(block_no)?;
    let off = entry_offset(entry_index);
    guard.write_at(off, name);
    guard.write_u64_at(off + FILENAME_FIELD, entry_type.to_u64());
    guard.write_u64_at(off + FILENAME_FIELD + 8, child_inode as u64);
    Ok(())
}

/// Inserts a new entry named `name` pointing at `child_inode`.
///
/// Fails with [`Error::NotFound`]-adjacent [`Error::InvalidArgument`] if
/// `name` already names an entry, and [`Error::NoSpace`] once every direct
/// block is allocated and full.
pub fn insert_entry<D: BlockDevice>(
    cache: &BufferCache<D>,
    sb: &Superblock,
    dir_inode: u32,
    name: &[u8],
    child_inode: u32,
) -> Result<()> {
    let encoded = encode_name(name)?;
    if find_entry(cache, sb, dir_inode, name)?.is_some() {
        return Err(Error::InvalidArgument("directory entry already exists"));
    }

    // Reuse a freed slot in an already-allocated block if one exists,
    // otherwise fall through to the first hole.
    for block_index in 0..N_DIR {
        let block_no = match indexer::locate(cache, sb, dir_inode, block_index as u64, false)? {
            Some(b) => b,
            None => {
                // First hole: allocate it fresh and use its first slot.
                write_slot(
                    cache,
                    sb,
                    dir_inode,
                    block_index,
                    0,
                    &encoded,
                    EntryType::Regular,
                    child_inode,
                )?;
                return adjust_size(cache, sb, dir_inode, 1);
            }
        };
        let guard = cache.get(block_no)?;
        for entry_index in 0..DIRENTS_PER_BLOCK as usize {
            let off = entry_offset(entry_index);
            let entry_type = EntryType::from_u64(guard.read_u64_at(off + FILENAME_FIELD));
            if matches!(entry_type, EntryType::Free) {
                drop(guard);
                write_slot(
                    cache,
                    sb,
                    dir_inode,
                    block_index,
                    entry_index,
                    &encoded,
                    EntryType::Regular,
                    child_inode,
                )?;
                return adjust_size(cache, sb, dir_inode, 1);
            }
        }
    }
    Err(Error::NoSpace)
}

/// Removes the entry named `name`, marking its slot free. The directory's
/// data block holding it is never freed, even if this was its last entry.
pub fn remove_entry<D: BlockDevice>(
    cache: &BufferCache<D>,
    sb: &Superblock,
    dir_inode: u32,
    name: &[u8],
) -> Result<()> {
    let found = scan(cache, sb, dir_inode, |slot| {
        if decode_name(&slot.name) == name {
            Some((slot.block_index, slot.entry_index))
        } else {
            None
        }
    })?;
    let (block_index, entry_index) = found.ok_or_else(|| Error::NotFound(String::from_utf8_lossy(name).into_owned()))?;
    let block_no = indexer::locate(cache, sb, dir_inode, block_index as u64, false)?
        .expect("slot came from an existing entry in an allocated block");
    let guard = cache.get(block_no)?;
    let off = entry_offset(entry_index);
    guard.write_u64_at(off + FILENAME_FIELD, EntryType::Free.to_u64());
    guard.write_u64_at(off + FILENAME_FIELD + 8, 0);
    drop(guard);
    adjust_size(cache, sb, dir_inode, -1)
}

/// Reports whether a directory has no `Regular` children. Its own `This`
/// self-reference entry does not count as content.
pub fn is_empty<D: BlockDevice>(cache: &BufferCache<D>, sb: &Superblock, dir_inode: u32) -> Result<bool> {
    let found = scan(cache, sb, dir_inode, |slot| {
        if matches!(slot.entry_type, EntryType::Regular) {
            Some(())
        } else {
            None
        }
    })?;
    Ok(found.is_none())
}

/// Initializes a freshly allocated directory inode with its self-reference
/// `This` entry in slot 0 of its first data block, and sets its size to 1
/// to account for that entry (`spec.md` §4.H: `size == 1` right after
/// `mkdir`).
pub fn init_directory<D: BlockDevice>(cache: &BufferCache<D>, sb: &Superblock, dir_inode: u32) -> Result<()> {
    let encoded = encode_name(b".")?;
    write_slot(cache, sb, dir_inode, 0, 0, &encoded, EntryType::This, dir_inode)?;
    adjust_size(cache, sb, dir_inode, 1)
}

/// Returns every `(name, inode)` pair for `Regular` children, in scan
/// order, used by `spec.md` §4.H `read_entry` iteration.
pub fn list_entries<D: BlockDevice>(
    cache: &BufferCache<D>,
    sb: &Superblock,
    dir_inode: u32,
) -> Result<Vec<(Vec<u8>, u32)>> {
    let mut out = Vec::new();
    scan(cache, sb, dir_inode, |slot| {
        if matches!(slot.entry_type, EntryType::Regular) {
            out.push((decode_name(&slot.name).to_vec(), slot.inode));
        }
        None::<()>
    })?;
    Ok(out)
}
