//! Inode sub-allocator: a 256-slot bitmap living inside block 0, indexing
//! a contiguous run of inode-bearing blocks.
//!
//! Unlike the free-block bitmap, the inode bitmap and the inode table
//! sit at byte offsets that never move, so `InodeStore` doesn't need to
//! borrow the image between calls. It just knows where to look and
//! takes the image slice fresh on every call, indexing directly into the
//! mapped region by inode number.

use log::warn;

use crate::bitmap::{self, Bitmap};
use crate::geometry::*;
use crate::inode::Inode;

/// Points at the two fixed regions of the image that back the inode
/// allocator: the bitmap inside block 0, and the first inode-table block.
#[derive(Clone, Copy)]
pub struct InodeStore {
    bitmap_offset: usize,
    table_offset: usize,
}

impl InodeStore {
    pub fn new() -> Self {
        Self {
            bitmap_offset: INODE_BITMAP_OFFSET,
            table_offset: INODE_TABLE_OFFSET,
        }
    }

    fn bitmap_mut<'a>(&self, image: &'a mut [u8]) -> Bitmap<'a> {
        Bitmap::new(
            &mut image[self.bitmap_offset..self.bitmap_offset + INODE_BITMAP_BYTES],
            NUM_INODES,
        )
    }

    fn bitmap_ref<'a>(&self, image: &'a [u8]) -> &'a [u8] {
        &image[self.bitmap_offset..self.bitmap_offset + INODE_BITMAP_BYTES]
    }

    fn record_offset(&self, id: u16) -> usize {
        self.table_offset + id as usize * INODE_SIZE
    }

    /// Sub-allocates the first free inode slot. `None` if all 256 slots
    /// are taken.
    pub fn allocate(&self, image: &mut [u8]) -> Option<u16> {
        let id = match self.bitmap_mut(image).first_zero() {
            Some(id) => id,
            None => {
                warn!("inode store exhausted: all {NUM_INODES} slots in use");
                return None;
            }
        };
        self.bitmap_mut(image).set(id);
        Some(id as u16)
    }

    /// Releases inode `id`. Out-of-range ids are silently ignored.
    pub fn release(&self, image: &mut [u8], id: u16) {
        if (id as usize) < NUM_INODES {
            self.bitmap_mut(image).clear(id as usize);
        }
    }

    pub fn is_allocated(&self, image: &[u8], id: u16) -> bool {
        (id as usize) < NUM_INODES && bitmap::test_bit(self.bitmap_ref(image), id as usize)
    }

    /// Inodes currently in use; gates "inode table full" at `>= NUM_INODES`,
    /// computed directly from the bitmap's popcount.
    pub fn used_count(&self, image: &[u8]) -> usize {
        bitmap::popcount_bits(self.bitmap_ref(image), NUM_INODES)
    }

    /// Decodes the 64-byte record for `id`.
    pub fn read(&self, image: &[u8], id: u16) -> Inode {
        let off = self.record_offset(id);
        Inode::decode(&image[off..off + INODE_SIZE])
    }

    /// Encodes `inode` into slot `id`. Returns `INODE_SIZE` on success.
    pub fn write(&self, image: &mut [u8], id: u16, inode: &Inode) -> usize {
        let off = self.record_offset(id);
        image[off..off + INODE_SIZE].copy_from_slice(&inode.encode());
        INODE_SIZE
    }
}

impl Default for InodeStore {
    fn default() -> Self {
        Self::new()
    }
}
