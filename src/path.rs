//! Absolute path resolution (`spec.md` §4.E).
//!
//! Generalizes the teacher's `namex`/`nameiparent`/`skipelem`
//! (`fs/fs.rs`): split an absolute, `/`-separated path into components and
//! walk them one directory lookup at a time from the root inode, with
//! case-sensitive, byte-exact component comparison and first-match-wins
//! scan order (inherited from [`crate::dir::find_entry`]). Unlike the
//! teacher, which runs inside a kernel that always has a current working
//! directory, GOSFS paths are always absolute — there is no relative
//! resolution to fall back to.

use crate::cache::BufferCache;
use crate::device::BlockDevice;
use crate::dir;
use crate::error::{Error, Result};
use crate::inode::{self, InodeFlags};
use crate::layout::ROOT_INODE;
use crate::superblock::Superblock;

/// Splits an absolute path into its non-empty components.
///
/// `/` resolves to zero components (the root itself). Consecutive
/// separators (`//`) collapse, matching the teacher's `skipelem`, which
/// skips runs of `/` between components rather than treating them as
/// empty names.
fn split(path: &[u8]) -> Result<Vec<&[u8]>> {
    if path.first() != Some(&b'/') {
        return Err(Error::InvalidArgument("path must be absolute"));
    }
    Ok(path
        .split(|&b| b == b'/')
        .filter(|c| !c.is_empty())
        .collect())
}

/// Resolves an absolute path to the inode it names.
pub fn resolve<D: BlockDevice>(cache: &BufferCache<D>, sb: &Superblock, path: &[u8]) -> Result<u32> {
    let components = split(path)?;
    let mut current = ROOT_INODE;
    for name in components {
        current = step(cache, sb, current, name)?;
    }
    Ok(current)
}

/// Resolves the parent directory of `path` and returns it along with the
/// final path component, for operations (`mkdir`, `delete`, file `open`
/// in create mode) that need to insert or remove an entry in that
/// directory rather than resolve all the way through it.
///
/// Verifies the resolved parent itself is a directory, not just the
/// intermediate components `step` walks through on the way there — a
/// caller reusing the returned inode index to insert or remove a
/// directory entry would otherwise be free to reinterpret a regular
/// file's data blocks as directory-entry storage.
pub fn resolve_parent<'a, D: BlockDevice>(
    cache: &BufferCache<D>,
    sb: &Superblock,
    path: &'a [u8],
) -> Result<(u32, &'a [u8])> {
    let components = split(path)?;
    let (last, parents) = components
        .split_last()
        .ok_or(Error::InvalidArgument("root has no parent"))?;
    let mut current = ROOT_INODE;
    for name in parents {
        current = step(cache, sb, current, name)?;
    }
    let parent_inode = inode::read_inode(cache, sb, current)?;
    if !parent_inode.flags.contains(InodeFlags::IS_DIRECTORY) {
        return Err(Error::AccessDenied("parent is not a directory"));
    }
    Ok((current, last))
}

fn step<D: BlockDevice>(cache: &BufferCache<D>, sb: &Superblock, dir_inode: u32, name: &[u8]) -> Result<u32> {
    let inode = inode::read_inode(cache, sb, dir_inode)?;
    if !inode.flags.contains(InodeFlags::IS_DIRECTORY) {
        return Err(Error::NotFound(String::from_utf8_lossy(name).into_owned()));
    }
    dir::find_entry(cache, sb, dir_inode, name)?
        .ok_or_else(|| Error::NotFound(String::from_utf8_lossy(name).into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap::reserve_metadata_blocks;
    use crate::device::MemBlockDevice;
    use crate::dir::{init_directory, insert_entry};
    use crate::inode::init_inode;
    use crate::layout::SECTORS_PER_BLOCK;
    use std::sync::Arc;

    fn fixture() -> (BufferCache<MemBlockDevice>, Superblock) {
        let total_blocks = 4096u32;
        let dev = Arc::new(MemBlockDevice::new(
            total_blocks as u64 * SECTORS_PER_BLOCK as u64,
        ));
        let cache = BufferCache::new(dev);
        let sb = Superblock::for_new_volume(total_blocks);
        reserve_metadata_blocks(&cache, &sb).unwrap();
        init_inode(&cache, &sb, ROOT_INODE, true).unwrap();
        init_directory(&cache, &sb, ROOT_INODE).unwrap();
        init_inode(&cache, &sb, 2, true).unwrap();
        init_directory(&cache, &sb, 2).unwrap();
        insert_entry(&cache, &sb, ROOT_INODE, b"sub", 2).unwrap();
        init_inode(&cache, &sb, 3, false).unwrap();
        insert_entry(&cache, &sb, 2, b"file.txt", 3).unwrap();
        (cache, sb)
    }

    #[test]
    fn root_resolves_to_its_fixed_inode() {
        let (cache, sb) = fixture();
        assert_eq!(resolve(&cache, &sb, b"/").unwrap(), ROOT_INODE);
    }

    #[test]
    fn nested_path_resolves_through_each_component() {
        let (cache, sb) = fixture();
        assert_eq!(resolve(&cache, &sb, b"/sub/file.txt").unwrap(), 3);
    }

    #[test]
    fn missing_component_is_not_found() {
        let (cache, sb) = fixture();
        assert!(resolve(&cache, &sb, b"/sub/missing").is_err());
    }

    #[test]
    fn relative_paths_are_rejected() {
        let (cache, sb) = fixture();
        assert!(resolve(&cache, &sb, b"sub/file.txt").is_err());
    }

    #[test]
    fn resolve_parent_splits_off_the_final_component() {
        let (cache, sb) = fixture();
        let (parent, name) = resolve_parent(&cache, &sb, b"/sub/file.txt").unwrap();
        assert_eq!(parent, 2);
        assert_eq!(name, b"file.txt");
    }

    #[test]
    fn component_matching_is_case_sensitive() {
        let (cache, sb) = fixture();
        assert!(resolve(&cache, &sb, b"/SUB").is_err());
    }

    #[test]
    fn resolve_parent_rejects_a_regular_file_as_the_final_parent() {
        let (cache, sb) = fixture();
        // "/sub/file.txt" is a regular file; "/sub/file.txt/x" would have
        // to insert an entry into it as if it were a directory.
        assert_eq!(
            resolve_parent(&cache, &sb, b"/sub/file.txt/x").unwrap_err(),
            Error::AccessDenied("parent is not a directory")
        );
    }
}
