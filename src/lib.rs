//! GOSFS: a block-structured on-disk file system.
//!
//! A superblock names the offsets of a free-space bitmap, a fixed-size
//! inode table and a data region; inodes address their data through
//! direct, single-indirect and double-indirect block pointers; a single
//! mutex per mount serializes every externally visible operation. See
//! [`mount::Mount`] for the entry point.

pub mod bitmap;
pub mod cache;
pub mod device;
pub mod dir;
pub mod error;
pub mod file;
pub mod indexer;
pub mod inode;
pub mod layout;
pub mod mount;
pub mod path;
pub mod superblock;

pub use device::BlockDevice;
#[cfg(feature = "test-util")]
pub use device::MemBlockDevice;
pub use error::{Error, Result};
pub use file::{OpenFile, Stat};
pub use mount::{Mount, OpenDir};
