//! Block store: a memory-mapped 2^16-block image plus its free-block
//! bitmap.
//!
//! Uses `mmap`/`ftruncate` to present the backing file as a byte slice,
//! the same way `memmap2` gets used elsewhere in this codebase to drive
//! read/write/seek against a mapped file.

use std::fs::{File, OpenOptions};
use std::path::Path;

use log::{debug, warn};
use memmap2::{MmapMut, MmapOptions};

use crate::bitmap::Bitmap;
use crate::error::{Error, Result};
use crate::geometry::*;

/// A single 512-byte block.
pub type Block = [u8; BLOCK_SIZE];

/// Owns the memory-mapped image and the free-block bitmap living in its
/// trailing 16 blocks.
pub struct BlockStore {
    file: File,
    mmap: MmapMut,
}

impl BlockStore {
    /// Creates a new image at `path`: truncates/creates it to the fixed
    /// size, zeroes it, and marks the bitmap's own trailing 16 blocks as
    /// permanently allocated.
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(IMAGE_BYTES)?;
        let mut mmap = unsafe { MmapOptions::new().map_mut(&file)? };
        mmap.fill(0);

        let mut store = Self { file, mmap };
        {
            let mut bm = store.bitmap_mut();
            for id in FREE_BITMAP_START_BLOCK..NUM_BLOCKS {
                bm.set(id);
            }
        }
        debug!("created block store image");
        Ok(store)
    }

    /// Attaches to an existing image. The file's size must fall within
    /// `[IMAGE_BYTES, IMAGE_BYTES + IMAGE_BYTES/8]`, slack reserved for
    /// legacy layouts.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len();
        let max = IMAGE_BYTES + IMAGE_BYTES / 8;
        if len < IMAGE_BYTES || len > max {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "image size out of range",
            )));
        }
        let mmap = unsafe { MmapOptions::new().len(IMAGE_BYTES as usize).map_mut(&file)? };
        debug!("mounted block store image");
        Ok(Self { file, mmap })
    }

    fn bitmap_mut(&mut self) -> Bitmap<'_> {
        Bitmap::new(
            &mut self.mmap[FREE_BITMAP_OFFSET..FREE_BITMAP_OFFSET + FREE_BITMAP_BYTES],
            NUM_BLOCKS,
        )
    }

    /// Finds and claims the first free block. `None` if the user-addressable
    /// range (`AVAIL_BLOCKS`) is exhausted.
    pub fn allocate(&mut self) -> Option<u16> {
        let id = self.bitmap_mut().first_zero()?;
        if id >= AVAIL_BLOCKS {
            warn!("block store exhausted: no free block below AVAIL_BLOCKS");
            return None;
        }
        self.bitmap_mut().set(id);
        Some(id as u16)
    }

    /// Claims a specific block id. Fails if already set or out of range.
    pub fn request(&mut self, id: u16) -> bool {
        if id as usize >= AVAIL_BLOCKS {
            return false;
        }
        let mut bm = self.bitmap_mut();
        if bm.test(id as usize) {
            return false;
        }
        bm.set(id as usize);
        true
    }

    /// Clears the bit for `id`. Invalid ids (including already-free ones)
    /// are silently tolerated; release is idempotent.
    pub fn release(&mut self, id: u16) {
        if (id as usize) < NUM_BLOCKS {
            self.bitmap_mut().clear(id as usize);
        }
    }

    /// Copies block `id` into `buf`. Returns `BLOCK_SIZE` on success, 0 on
    /// a bad id.
    pub fn read(&self, id: u16, buf: &mut Block) -> usize {
        let off = id as usize * BLOCK_SIZE;
        if off + BLOCK_SIZE > self.mmap.len() {
            return 0;
        }
        buf.copy_from_slice(&self.mmap[off..off + BLOCK_SIZE]);
        BLOCK_SIZE
    }

    /// Copies `buf` into block `id`. Returns `BLOCK_SIZE` on success, 0 on
    /// a bad id.
    pub fn write(&mut self, id: u16, buf: &Block) -> usize {
        let off = id as usize * BLOCK_SIZE;
        if off + BLOCK_SIZE > self.mmap.len() {
            return 0;
        }
        self.mmap[off..off + BLOCK_SIZE].copy_from_slice(buf);
        BLOCK_SIZE
    }

    pub fn used_count(&self) -> usize {
        // Bits in [AVAIL_BLOCKS, NUM_BLOCKS) are permanently set and not
        // part of the user-addressable population, so popcount is only
        // taken over the first AVAIL_BLOCKS bits.
        let bitmap = &self.mmap[FREE_BITMAP_OFFSET..FREE_BITMAP_OFFSET + FREE_BITMAP_BYTES];
        crate::bitmap::popcount_bits(bitmap, AVAIL_BLOCKS)
    }

    pub fn free_count(&self) -> usize {
        AVAIL_BLOCKS - self.used_count()
    }

    pub fn total(&self) -> usize {
        AVAIL_BLOCKS
    }

    /// The whole mapped image, for components (inode store, directory
    /// code) that address the image by byte offset rather than block id.
    pub fn image(&self) -> &[u8] {
        &self.mmap
    }

    pub fn image_mut(&mut self) -> &mut [u8] {
        &mut self.mmap
    }

    /// Flushes dirty pages back to the backing file. `unmount` relies on
    /// `Drop` for the actual unmap; this is for callers that want the
    /// data durable before that point.
    pub fn flush(&self) -> Result<()> {
        self.mmap.flush()?;
        Ok(())
    }
}

impl Drop for BlockStore {
    fn drop(&mut self) {
        let _ = self.mmap.flush();
        let _ = &self.file;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::NamedTempFile;

    fn temp_image() -> (NamedTempFile, BlockStore) {
        let file = NamedTempFile::new().unwrap();
        let bs = BlockStore::create(file.path()).unwrap();
        (file, bs)
    }

    #[test]
    fn create_reserves_bitmap_blocks() {
        let (_f, bs) = temp_image();
        assert_eq!(bs.free_count(), AVAIL_BLOCKS);
        assert_eq!(bs.total(), AVAIL_BLOCKS);
    }

    #[test]
    fn allocate_then_release_round_trips() {
        let (_f, mut bs) = temp_image();
        let before = bs.free_count();
        let id = bs.allocate().unwrap();
        assert_eq!(bs.free_count(), before - 1);
        bs.release(id);
        assert_eq!(bs.free_count(), before);
    }

    #[test]
    fn request_fails_on_taken_block() {
        let (_f, mut bs) = temp_image();
        let id = bs.allocate().unwrap();
        assert!(!bs.request(id));
        bs.release(id);
        assert!(bs.request(id));
    }

    #[test]
    fn read_write_round_trip() {
        let (_f, mut bs) = temp_image();
        let id = bs.allocate().unwrap();
        let mut buf = [0u8; BLOCK_SIZE];
        buf[0] = 0xab;
        buf[BLOCK_SIZE - 1] = 0xcd;
        assert_eq!(bs.write(id, &buf), BLOCK_SIZE);
        let mut out = [0u8; BLOCK_SIZE];
        assert_eq!(bs.read(id, &mut out), BLOCK_SIZE);
        assert_eq!(out, buf);
    }

    #[test]
    fn release_of_already_free_block_is_tolerated() {
        let (_f, mut bs) = temp_image();
        let before = bs.free_count();
        bs.release(40);
        bs.release(40);
        assert_eq!(bs.free_count(), before);
    }

    #[test]
    fn open_rejects_undersized_image() {
        let file = NamedTempFile::new().unwrap();
        file.as_file().set_len(1024).unwrap();
        assert!(BlockStore::open(file.path()).is_err());
    }
}
