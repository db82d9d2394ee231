//! On-disk layout constants (`spec.md` §3, §4.A, §6).
//!
//! Blocks are numbered from 0. The volume layout, in order, is:
//! `[superblock | bitmap blocks | inode-table blocks | data blocks]`. Only
//! the superblock's own block number (0) is hard-coded; the bitmap,
//! inode-table and data-region offsets are computed at format time and
//! then carried in the on-disk [`crate::superblock::Superblock`].

/// Sector size of the underlying block device, in bytes.
pub const SECTOR_SIZE: u32 = 512;

/// Number of device sectors that make up one file-system block.
pub const SECTORS_PER_BLOCK: u32 = 8;

/// Size of one file-system block, in bytes (`512 * 8 = 4096`).
pub const BLOCK_SIZE: u32 = SECTOR_SIZE * SECTORS_PER_BLOCK;

/// Magic number identifying a GOSFS volume, stored at byte 0 of block 0.
pub const MAGIC: u32 = 0x0d00_0721;

/// Number of direct block pointers carried in each inode.
pub const N_DIR: usize = 10;
/// Number of singly-indirect block pointers carried in each inode.
pub const N_IND: usize = 1;
/// Number of doubly-indirect block pointers carried in each inode.
pub const N_2IND: usize = 1;
/// Total length of an inode's block-pointer vector.
pub const N_PTRS: usize = N_DIR + N_IND + N_2IND;

/// Size in bytes of one on-disk block pointer (native 32-bit pointer width,
/// per `spec.md` §6).
pub const POINTER_SIZE: u32 = 4;

/// Number of pointers that fit in one indirect block.
pub const POINTERS_PER_BLOCK: u32 = BLOCK_SIZE / POINTER_SIZE;

/// Capacity, in logical blocks, reachable through singly-indirect pointers.
pub const I1_CAP: u64 = N_IND as u64 * POINTERS_PER_BLOCK as u64;
/// Capacity, in logical blocks, reachable through doubly-indirect pointers.
pub const I2_CAP: u64 = N_2IND as u64 * POINTERS_PER_BLOCK as u64 * POINTERS_PER_BLOCK as u64;
/// One past the highest logical block index a file can address.
pub const MAX_FILE_BLOCKS: u64 = N_DIR as u64 + I1_CAP + I2_CAP;

/// Number of ACL entries carried in each inode.
pub const MAX_ACL_ENTRIES: usize = 3;
/// Size in bytes of one ACL entry (`uid`, `permissions`, `valid` bit).
pub const ACL_ENTRY_SIZE: u32 = 12;

/// Fixed cap on the number of inodes a volume can hold (`spec.md` §3).
pub const MAX_INODES: u32 = 1024;

/// Size in bytes of one on-disk inode record: `size(8) | flags(8) |
/// blockList[N_PTRS] (4 bytes each) | acl[MAX_ACL_ENTRIES] (12 bytes each)`.
pub const INODE_SIZE: u32 = 8 + 8 + (N_PTRS as u32 * POINTER_SIZE) + (MAX_ACL_ENTRIES as u32 * ACL_ENTRY_SIZE);

/// Number of inodes that fit in one block.
pub const INODES_PER_BLOCK: u32 = BLOCK_SIZE / INODE_SIZE;

/// Number of blocks occupied by the inode table, sized to hold
/// [`MAX_INODES`] inodes of [`INODE_SIZE`] bytes each.
///
/// `spec.md` §4.A describes the source's inode table as "a fixed constant
/// (four blocks, >= 1024 inodes)"; that figure comes from the original's
/// much narrower on-disk inode (no ACL vector). This crate's inode carries
/// an ACL, so the table is sized from the real record instead of the
/// literal "four" — see `DESIGN.md`.
pub const INODE_TABLE_BLOCKS: u32 = MAX_INODES.div_ceil(INODES_PER_BLOCK);

/// Maximum length, in bytes, of a filename (excluding the NUL terminator).
pub const NAME_MAX: usize = 127;
/// On-disk size of a directory entry's filename field (`NAME_MAX` + NUL).
pub const FILENAME_FIELD: usize = NAME_MAX + 1;

/// Size in bytes of one on-disk directory entry: `filename[128] | type(8) |
/// inode(8)`.
pub const DIRENT_SIZE: u32 = FILENAME_FIELD as u32 + 8 + 8;

/// Number of directory entries that fit in one data block.
pub const DIRENTS_PER_BLOCK: u32 = BLOCK_SIZE / DIRENT_SIZE;

/// The root directory's fixed inode index, chosen and stored consistently
/// at format time (`spec.md` §4.E).
pub const ROOT_INODE: u32 = 1;

/// Sentinel inode pointer meaning "absent" (`spec.md` §3).
pub const NULL_INODE: u32 = 0;

/// Sentinel block pointer meaning "unallocated" (a hole, or an empty
/// indirect slot).
pub const NULL_BLOCK: u32 = 0;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_size_is_4096() {
        assert_eq!(BLOCK_SIZE, 4096);
    }

    #[test]
    fn inode_table_holds_at_least_max_inodes() {
        assert!(INODE_TABLE_BLOCKS * INODES_PER_BLOCK >= MAX_INODES);
    }

    #[test]
    fn dirent_fits_name_and_tag_fields() {
        assert_eq!(DIRENT_SIZE as usize, FILENAME_FIELD + 16);
    }

    #[test]
    fn max_file_blocks_matches_spec_formula() {
        let d = N_DIR as u64;
        let p = POINTERS_PER_BLOCK as u64;
        assert_eq!(MAX_FILE_BLOCKS, d + p + p * p);
    }
}
