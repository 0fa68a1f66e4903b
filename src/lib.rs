//! A self-contained, single-file disk-image filesystem: a fixed 2^16 ×
//! 512-byte block image holding an inode table, a hand-rolled directory
//! format, and UNIX-style direct/indirect/double-indirect block
//! addressing, manipulated entirely through host file I/O and a memory
//! map, with no kernel involvement and no external dependency on a real
//! block device.
//!
//! The modules below mirror the system's own layering: on-disk geometry
//! and record formats at the bottom, sub-store allocators above that, and
//! [`fs::FileSystem`] tying them into the public operation set at the top.

pub mod address;
pub mod bitmap;
pub mod block_store;
pub mod descriptor;
pub mod directory;
pub mod error;
pub mod fs;
pub mod geometry;
pub mod inode;
pub mod inode_store;
pub mod path;

pub use descriptor::Level;
pub use error::{Error, Result};
pub use fs::{FileRecord, FileSystem, Whence};
pub use inode::FileType;
