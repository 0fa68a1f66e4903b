//! In-memory descriptor sub-store: a 256-slot allocator, fresh on every
//! mount, decoupling descriptor identity from inode identity so several
//! descriptors can reference one inode.
//!
//! Uses the same bitmap-backed sub-store shape as [`crate::inode_store::InodeStore`],
//! but the backing buffer is process memory rather than the mapped image.

use crate::bitmap::Bitmap;
use crate::geometry::{DESCRIPTOR_CAPACITY, DIRECT_PTRS, INDIRECT_CAPACITY};

/// Which pointer level a descriptor's current block falls under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Direct,
    Indirect,
    DoubleIndirect,
}

impl Level {
    /// Number of data blocks addressed by all levels below this one.
    pub fn prefix(self) -> u64 {
        match self {
            Level::Direct => 0,
            Level::Indirect => DIRECT_PTRS as u64,
            Level::DoubleIndirect => (DIRECT_PTRS + INDIRECT_CAPACITY) as u64,
        }
    }
}

/// Binds a logical file position to an inode: `(inode_id, level, order,
/// offset)`. The logical position is `(level.prefix() + order) * 512 +
/// offset`.
#[derive(Debug, Clone, Copy)]
pub struct Descriptor {
    pub inode_id: u16,
    pub level: Level,
    pub order: u32,
    pub offset: u16,
}

impl Descriptor {
    fn at_start(inode_id: u16) -> Self {
        Self {
            inode_id,
            level: Level::Direct,
            order: 0,
            offset: 0,
        }
    }
}

impl Default for Descriptor {
    fn default() -> Self {
        Self::at_start(0)
    }
}

/// A transient 256-slot allocator of [`Descriptor`] records.
pub struct DescriptorStore {
    bitmap: [u8; DESCRIPTOR_CAPACITY / 8],
    records: [Descriptor; DESCRIPTOR_CAPACITY],
}

impl DescriptorStore {
    pub fn new() -> Self {
        Self {
            bitmap: [0; DESCRIPTOR_CAPACITY / 8],
            records: [Descriptor::default(); DESCRIPTOR_CAPACITY],
        }
    }

    /// Opens a fresh descriptor at the beginning of `inode_id`'s data.
    /// `None` if all 256 descriptors are in use.
    pub fn open(&mut self, inode_id: u16) -> Option<u32> {
        let id = Bitmap::new(&mut self.bitmap, DESCRIPTOR_CAPACITY).first_zero()?;
        Bitmap::new(&mut self.bitmap, DESCRIPTOR_CAPACITY).set(id);
        self.records[id] = Descriptor::at_start(inode_id);
        Some(id as u32)
    }

    /// Releases a descriptor slot. Errors (double-close, never-allocated)
    /// are the caller's job to detect via `is_open` before calling this.
    pub fn close(&mut self, fd: u32) {
        if (fd as usize) < DESCRIPTOR_CAPACITY {
            Bitmap::new(&mut self.bitmap, DESCRIPTOR_CAPACITY).clear(fd as usize);
        }
    }

    pub fn is_open(&self, fd: u32) -> bool {
        (fd as usize) < DESCRIPTOR_CAPACITY
            && crate::bitmap::test_bit(&self.bitmap, fd as usize)
    }

    pub fn get(&self, fd: u32) -> Option<&Descriptor> {
        self.is_open(fd).then(|| &self.records[fd as usize])
    }

    pub fn get_mut(&mut self, fd: u32) -> Option<&mut Descriptor> {
        if self.is_open(fd) {
            Some(&mut self.records[fd as usize])
        } else {
            None
        }
    }

    /// Closes every descriptor currently bound to `inode_id`: open
    /// descriptors of a removed file are closed, not left dangling.
    pub fn close_all_for_inode(&mut self, inode_id: u16) {
        for fd in 0..DESCRIPTOR_CAPACITY as u32 {
            if self.is_open(fd) && self.records[fd as usize].inode_id == inode_id {
                self.close(fd);
            }
        }
    }
}

impl Default for DescriptorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn open_close_round_trip() {
        let mut ds = DescriptorStore::new();
        let fd = ds.open(3).unwrap();
        assert!(ds.is_open(fd));
        assert_eq!(ds.get(fd).unwrap().inode_id, 3);
        ds.close(fd);
        assert!(!ds.is_open(fd));
    }

    #[test]
    fn closed_slot_is_reusable_immediately() {
        let mut ds = DescriptorStore::new();
        let fd = ds.open(1).unwrap();
        ds.close(fd);
        assert_eq!(ds.open(2), Some(fd));
    }

    #[test]
    fn exhausts_after_256_opens() {
        let mut ds = DescriptorStore::new();
        for _ in 0..DESCRIPTOR_CAPACITY {
            assert!(ds.open(0).is_some());
        }
        assert_eq!(ds.open(0), None);
    }

    #[test]
    fn close_all_for_inode_only_touches_matching_descriptors() {
        let mut ds = DescriptorStore::new();
        let a = ds.open(5).unwrap();
        let b = ds.open(6).unwrap();
        ds.close_all_for_inode(5);
        assert!(!ds.is_open(a));
        assert!(ds.is_open(b));
    }

    #[test]
    fn level_prefixes_are_cumulative() {
        assert_eq!(Level::Direct.prefix(), 0);
        assert_eq!(Level::Indirect.prefix(), 6);
        assert_eq!(Level::DoubleIndirect.prefix(), 6 + 256);
    }
}
