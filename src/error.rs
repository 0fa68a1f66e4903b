//! Error taxonomy for the filesystem core.

use std::io;
use thiserror::Error;

/// Everything a [`crate::fs::FileSystem`] operation can fail with.
///
/// Every variant maps to a small negative integer via [`Error::code`] for
/// callers that want a legacy numeric return instead of matching on the
/// variant.
#[derive(Debug, Error)]
pub enum Error {
    /// Null/empty path, relative path, trailing slash, oversize component,
    /// bad `whence`, or a zero-length buffer where one is required.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// A path component (other than the last) did not resolve, or the
    /// target of the final component does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// A directory was expected but a regular file was found, or vice
    /// versa.
    #[error("wrong type for {0}")]
    WrongType(String),
    /// `create`/`move` target already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),
    /// A directory's 7 slots are all occupied.
    #[error("directory full: {0}")]
    DirectoryFull(String),
    /// `remove` on a directory that still has live children.
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),
    /// All 256 inode slots are in use.
    #[error("inode table full")]
    InodeTableFull,
    /// The block store has no free blocks left to satisfy an allocation.
    #[error("out of space")]
    OutOfSpace,
    /// `fd` was never allocated, or was already closed.
    #[error("bad descriptor: {0}")]
    BadDescriptor(u32),
    /// `move` would make a directory its own descendant.
    #[error("move would create a cycle: {0} into {1}")]
    MoveIntoSelf(String, String),
    /// The root directory cannot be removed or moved.
    #[error("operation not permitted on root")]
    RootOperation,
    /// Failure to open, map, or otherwise touch the backing image file.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Collapses the taxonomy to a small set of negative integers, one
    /// per variant, so any failure is reported as a negative return.
    pub fn code(&self) -> i32 {
        match self {
            Error::InvalidArgument(_) => -1,
            Error::NotFound(_) => -2,
            Error::WrongType(_) => -3,
            Error::AlreadyExists(_) => -4,
            Error::DirectoryFull(_) => -5,
            Error::DirectoryNotEmpty(_) => -6,
            Error::InodeTableFull => -7,
            Error::OutOfSpace => -8,
            Error::BadDescriptor(_) => -9,
            Error::MoveIntoSelf(_, _) => -10,
            Error::RootOperation => -11,
            Error::Io(_) => -12,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
