//! The closed error taxonomy surfaced to callers (`spec.md` §6-7).
//!
//! Every externally visible operation returns `Result<T, Error>`. There is
//! no second, internal error type: helpers that can fail propagate one of
//! these variants with `?`.

use thiserror::Error;

/// An error produced by a GOSFS operation.
#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum Error {
    /// A path was null, relative, missing its leading `/`, or named the
    /// parent of root.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// A path component, or the target of an operation, does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The embedding allocator failed, or a fixed-size in-memory table
    /// (e.g. the buffer cache) has no room left.
    #[error("out of memory")]
    NoMemory,

    /// No free block or inode remains, or a directory cannot be extended.
    #[error("no space left on device")]
    NoSpace,

    /// A handle was used for an operation its open mode does not permit,
    /// or a non-empty directory was targeted for deletion.
    #[error("access denied: {0}")]
    AccessDenied(&'static str),

    /// The volume's superblock failed validation at mount time.
    #[error("invalid file system: {0}")]
    InvalidFs(&'static str),

    /// A logical block index is beyond what direct/indirect/double-indirect
    /// addressing can reach.
    #[error("file too large")]
    FileTooLarge,

    /// All other failures, including propagated device I/O errors.
    #[error("unspecified failure: {0}")]
    Unspecified(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;
