//! The orchestrating filesystem API: `format`, `mount`, `unmount`,
//! `create`, `open`, `close`, `seek`, `read`, `write`, `remove`,
//! `get_dir`, and `move_file`, each implemented operation-for-operation
//! over the block/inode/descriptor sub-stores defined elsewhere in this
//! crate.

use std::path::Path;

use log::{debug, info, warn};

use crate::address;
use crate::block_store::BlockStore;
use crate::descriptor::{Descriptor, DescriptorStore, Level};
use crate::directory::DirBlock;
use crate::error::{Error, Result};
use crate::geometry::*;
use crate::inode::{FileType, Inode};
use crate::inode_store::InodeStore;
use crate::path::{self, split_components, split_parent};

/// One entry as returned by [`FileSystem::get_dir`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub name: String,
    pub file_type: FileType,
}

/// Reference point for [`FileSystem::seek`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Set,
    Cur,
    End,
}

fn free_slot(vacant: u8) -> Option<usize> {
    (0..DIR_ENTRIES_PER_BLOCK).find(|&i| vacant & (1 << i) == 0)
}

fn descriptor_position(d: &Descriptor) -> u64 {
    (d.level.prefix() + d.order as u64) * BLOCK_SIZE as u64 + d.offset as u64
}

/// The inverse of `descriptor_position`: decomposes an absolute byte
/// position back into `(level, order, offset)`.
fn position_to_level_order_offset(pos: u64) -> (Level, u32, u16) {
    let block_index = pos / BLOCK_SIZE as u64;
    let offset = (pos % BLOCK_SIZE as u64) as u16;
    if block_index < DIRECT_PTRS as u64 {
        (Level::Direct, block_index as u32, offset)
    } else if block_index < (DIRECT_PTRS + INDIRECT_CAPACITY) as u64 {
        (Level::Indirect, (block_index - DIRECT_PTRS as u64) as u32, offset)
    } else {
        (
            Level::DoubleIndirect,
            (block_index - (DIRECT_PTRS + INDIRECT_CAPACITY) as u64) as u32,
            offset,
        )
    }
}

/// A mounted filesystem: the block store, the inode allocator overlay, and
/// a fresh in-memory descriptor table.
pub struct FileSystem {
    block_store: BlockStore,
    inode_store: InodeStore,
    descriptors: DescriptorStore,
}

impl FileSystem {
    /// Creates a brand new image at `path` and mounts it.
    pub fn format<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(Error::InvalidArgument("empty image path".into()));
        }
        let mut block_store = BlockStore::create(path)?;
        let inode_store = InodeStore::new();

        for id in 0..DATA_REGION_START {
            block_store.request(id);
        }

        let root_id = inode_store
            .allocate(block_store.image_mut())
            .expect("root inode allocation cannot fail on a fresh image");
        debug_assert_eq!(root_id, ROOT_INODE);

        let mut root = Inode::new(ROOT_INODE, FileType::Directory);
        root.file_size = BLOCK_SIZE as u32;
        root.direct[0] = ROOT_DIR_BLOCK;
        root.vacant = 0;
        inode_store.write(block_store.image_mut(), ROOT_INODE, &root);
        block_store.write(ROOT_DIR_BLOCK, &DirBlock::empty().encode());

        info!("formatted new image at {}", path.display());
        Ok(Self {
            block_store,
            inode_store,
            descriptors: DescriptorStore::new(),
        })
    }

    /// Re-attaches to an existing image and creates a fresh descriptor
    /// sub-store; the inode sub-store is a stateless overlay, so
    /// "reconstructing" it is just building a new one.
    pub fn mount<P: AsRef<Path>>(path: P) -> Result<Self> {
        let block_store = BlockStore::open(path.as_ref())?;
        info!("mounted image at {}", path.as_ref().display());
        Ok(Self {
            block_store,
            inode_store: InodeStore::new(),
            descriptors: DescriptorStore::new(),
        })
    }

    /// Flushes the mapping and consumes the handle. A null-handle unmount
    /// has no Rust equivalent: ownership already guarantees `self` is a
    /// live handle, and `Drop` on `BlockStore` flushes regardless of
    /// whether this is called explicitly.
    pub fn unmount(self) -> Result<()> {
        self.block_store.flush()?;
        debug!("unmounted image");
        Ok(())
    }

    fn image(&self) -> &[u8] {
        self.block_store.image()
    }

    fn read_inode(&self, id: u16) -> Inode {
        self.inode_store.read(self.block_store.image(), id)
    }

    fn write_inode(&mut self, id: u16, inode: &Inode) {
        self.inode_store.write(self.block_store.image_mut(), id, inode);
    }

    fn read_dir_block(&self, dir_inode: &Inode) -> DirBlock {
        let mut raw = [0u8; BLOCK_SIZE];
        self.block_store.read(dir_inode.direct[0], &mut raw);
        DirBlock::decode(&raw)
    }

    fn write_dir_block(&mut self, dir_inode: &Inode, block: &DirBlock) {
        self.block_store.write(dir_inode.direct[0], &block.encode());
    }

    fn resolve(&self, target: &str) -> Result<(u16, Inode)> {
        let components = split_components(target)?;
        path::resolve(&self.block_store, &self.inode_store, &components)
    }

    /// Creates a new regular file or directory at `target`.
    pub fn create(&mut self, target: &str, file_type: FileType) -> Result<()> {
        let (parent_components, name) = split_parent(target)?;
        if self.inode_store.used_count(self.image()) >= NUM_INODES {
            return Err(Error::InodeTableFull);
        }
        let (parent_id, mut parent) =
            path::resolve_parent(&self.block_store, &self.inode_store, &parent_components)?;
        if !parent.is_directory() {
            return Err(Error::WrongType(target.to_string()));
        }
        if path::lookup_child(&self.block_store, &parent, name).is_some() {
            return Err(Error::AlreadyExists(target.to_string()));
        }
        let slot =
            free_slot(parent.vacant).ok_or_else(|| Error::DirectoryFull(target.to_string()))?;

        let new_id = self
            .inode_store
            .allocate(self.block_store.image_mut())
            .ok_or(Error::InodeTableFull)?;

        let mut new_inode = Inode::new(new_id, file_type);
        if file_type == FileType::Directory {
            let block_id = self.block_store.allocate().ok_or(Error::OutOfSpace)?;
            self.block_store.write(block_id, &DirBlock::empty().encode());
            new_inode.direct[0] = block_id;
            new_inode.file_size = BLOCK_SIZE as u32;
        }
        self.write_inode(new_id, &new_inode);

        let mut block = self.read_dir_block(&parent);
        block.set(slot, name, new_id as u8);
        parent.vacant |= 1 << slot;
        self.write_dir_block(&parent, &block);
        self.write_inode(parent_id, &parent);

        debug!("created {target}");
        Ok(())
    }

    /// Opens a regular file for reading/writing, returning a descriptor id.
    pub fn open(&mut self, target: &str) -> Result<u32> {
        let (id, inode) = self.resolve(target)?;
        if inode.is_directory() {
            return Err(Error::WrongType(target.to_string()));
        }
        self.descriptors
            .open(id)
            .ok_or_else(|| Error::InvalidArgument("descriptor table full".into()))
    }

    /// Releases a descriptor. Double-close is an error.
    pub fn close(&mut self, fd: u32) -> Result<()> {
        if !self.descriptors.is_open(fd) {
            return Err(Error::BadDescriptor(fd));
        }
        self.descriptors.close(fd);
        Ok(())
    }

    /// Repositions `fd`, clamped into `[0, file_size]`.
    pub fn seek(&mut self, fd: u32, delta: i64, whence: Whence) -> Result<u64> {
        let inode_id = self
            .descriptors
            .get(fd)
            .ok_or(Error::BadDescriptor(fd))?
            .inode_id;
        let inode = self.read_inode(inode_id);
        let current = descriptor_position(self.descriptors.get(fd).unwrap());

        let base: i64 = match whence {
            Whence::Set => 0,
            Whence::Cur => current as i64,
            Whence::End => inode.file_size as i64,
        };
        let clamped = base.saturating_add(delta).clamp(0, inode.file_size as i64) as u64;

        let (level, order, offset) = position_to_level_order_offset(clamped);
        let desc = self.descriptors.get_mut(fd).unwrap();
        desc.level = level;
        desc.order = order;
        desc.offset = offset;
        Ok(clamped)
    }

    /// Reads up to `dst.len()` bytes from `fd`'s current position, never
    /// allocating. Returns the number of bytes actually read.
    pub fn read(&mut self, fd: u32, dst: &mut [u8]) -> Result<usize> {
        if dst.is_empty() {
            return Ok(0);
        }
        if !self.descriptors.is_open(fd) {
            return Err(Error::BadDescriptor(fd));
        }
        let inode_id = self.descriptors.get(fd).unwrap().inode_id;
        let mut inode = self.read_inode(inode_id);
        let mut total = 0usize;

        while total < dst.len() {
            let pos = descriptor_position(self.descriptors.get(fd).unwrap());
            if pos >= inode.file_size as u64 {
                break;
            }
            let (level, order, offset) = position_to_level_order_offset(pos);
            let block_id =
                match address::translate(&mut self.block_store, &mut inode, level, order, false)? {
                    Some(id) => id,
                    None => break,
                };
            let mut raw = [0u8; BLOCK_SIZE];
            self.block_store.read(block_id, &mut raw);

            let in_block = offset as usize;
            let remaining_in_block = BLOCK_SIZE - in_block;
            let remaining_in_file = (inode.file_size as u64 - pos) as usize;
            let remaining_in_dst = dst.len() - total;
            let chunk = remaining_in_block.min(remaining_in_file).min(remaining_in_dst);
            if chunk == 0 {
                break;
            }
            dst[total..total + chunk].copy_from_slice(&raw[in_block..in_block + chunk]);
            total += chunk;

            let (new_level, new_order, new_offset) =
                position_to_level_order_offset(pos + chunk as u64);
            let desc = self.descriptors.get_mut(fd).unwrap();
            desc.level = new_level;
            desc.order = new_order;
            desc.offset = new_offset;
        }
        Ok(total)
    }

    /// Writes `src` at `fd`'s current position, allocating blocks as
    /// needed. Returns the number of bytes actually written; a block-store
    /// exhaustion truncates rather than failing the whole call.
    pub fn write(&mut self, fd: u32, src: &[u8]) -> Result<usize> {
        if src.is_empty() {
            return Ok(0);
        }
        if !self.descriptors.is_open(fd) {
            return Err(Error::BadDescriptor(fd));
        }
        let inode_id = self.descriptors.get(fd).unwrap().inode_id;
        let mut inode = self.read_inode(inode_id);
        let mut total = 0usize;

        while total < src.len() {
            let pos = descriptor_position(self.descriptors.get(fd).unwrap());
            if pos >= MAX_FILE_SIZE {
                break;
            }
            let (level, order, offset) = position_to_level_order_offset(pos);
            let block_id =
                match address::translate(&mut self.block_store, &mut inode, level, order, true) {
                    Ok(Some(id)) => id,
                    Ok(None) => break,
                    Err(Error::OutOfSpace) => {
                        warn!("write truncated on fd {fd}: block store exhausted");
                        break;
                    }
                    Err(e) => return Err(e),
                };

            let in_block = offset as usize;
            let remaining_in_block = BLOCK_SIZE - in_block;
            let remaining_in_src = src.len() - total;
            let chunk = remaining_in_block.min(remaining_in_src);

            if in_block == 0 && chunk == BLOCK_SIZE {
                let mut buf = [0u8; BLOCK_SIZE];
                buf.copy_from_slice(&src[total..total + chunk]);
                self.block_store.write(block_id, &buf);
            } else {
                let mut raw = [0u8; BLOCK_SIZE];
                self.block_store.read(block_id, &mut raw);
                raw[in_block..in_block + chunk].copy_from_slice(&src[total..total + chunk]);
                self.block_store.write(block_id, &raw);
            }

            total += chunk;
            let new_pos = pos + chunk as u64;
            let (new_level, new_order, new_offset) = position_to_level_order_offset(new_pos);
            let desc = self.descriptors.get_mut(fd).unwrap();
            desc.level = new_level;
            desc.order = new_order;
            desc.offset = new_offset;

            if new_pos > inode.file_size as u64 {
                inode.file_size = new_pos as u32;
            }
        }

        self.write_inode(inode_id, &inode);
        Ok(total)
    }

    /// Removes the file or empty directory at `target`.
    pub fn remove(&mut self, target: &str) -> Result<()> {
        let (parent_components, name) = split_parent(target)?;
        let (parent_id, mut parent) =
            path::resolve_parent(&self.block_store, &self.inode_store, &parent_components)?;
        let found = path::lookup_child(&self.block_store, &parent, name)
            .ok_or_else(|| Error::NotFound(target.to_string()))?;
        let target_id = found.inode_id as u16;
        if target_id == ROOT_INODE {
            return Err(Error::RootOperation);
        }

        let target_inode = self.read_inode(target_id);
        if target_inode.is_directory() && target_inode.vacant != 0 {
            return Err(Error::DirectoryNotEmpty(target.to_string()));
        }

        address::release_all(&mut self.block_store, &target_inode);
        self.inode_store.release(self.block_store.image_mut(), target_id);

        parent.vacant &= !(1 << found.slot);
        self.write_inode(parent_id, &parent);

        self.descriptors.close_all_for_inode(target_id);

        debug!("removed {target}");
        Ok(())
    }

    /// Lists the live children of the directory at `target`.
    pub fn get_dir(&self, target: &str) -> Result<Vec<FileRecord>> {
        let (_id, inode) = self.resolve(target)?;
        if !inode.is_directory() {
            return Err(Error::WrongType(target.to_string()));
        }
        let block = self.read_dir_block(&inode);
        let mut records = Vec::new();
        for slot in 0..DIR_ENTRIES_PER_BLOCK {
            if inode.vacant & (1 << slot) != 0 {
                let entry = &block.entries[slot];
                let child = self.read_inode(entry.inode_id as u16);
                records.push(FileRecord {
                    name: entry.name_str().to_string(),
                    file_type: child.file_type,
                });
            }
        }
        Ok(records)
    }

    /// Metadata-only rename/move: clears the source parent's slot and
    /// claims a slot in the destination parent without touching the
    /// moved inode's own data. Open descriptors on the moved file keep
    /// working because they bind to inode id, not to path.
    pub fn move_file(&mut self, src: &str, dst: &str) -> Result<()> {
        let (src_parent_components, src_name) = split_parent(src)?;
        let (dst_parent_components, dst_name) = split_parent(dst)?;

        let (src_parent_id, mut src_parent) =
            path::resolve_parent(&self.block_store, &self.inode_store, &src_parent_components)?;
        let src_found = path::lookup_child(&self.block_store, &src_parent, src_name)
            .ok_or_else(|| Error::NotFound(src.to_string()))?;
        let moved_id = src_found.inode_id as u16;
        if moved_id == ROOT_INODE {
            return Err(Error::RootOperation);
        }

        let (dst_parent_id, dst_parent_preview) =
            path::resolve_parent(&self.block_store, &self.inode_store, &dst_parent_components)?;
        if !dst_parent_preview.is_directory() {
            return Err(Error::WrongType(dst.to_string()));
        }
        if path::lookup_child(&self.block_store, &dst_parent_preview, dst_name).is_some() {
            return Err(Error::AlreadyExists(dst.to_string()));
        }

        let moved_inode = self.read_inode(moved_id);
        if moved_inode.is_directory()
            && path::is_ancestor_or_self(&self.block_store, &self.inode_store, moved_id, dst_parent_id)
        {
            return Err(Error::MoveIntoSelf(src.to_string(), dst.to_string()));
        }

        let mut src_block = self.read_dir_block(&src_parent);
        src_block.set(src_found.slot, "", 0);
        src_parent.vacant &= !(1 << src_found.slot);
        self.write_dir_block(&src_parent, &src_block);
        self.write_inode(src_parent_id, &src_parent);

        // Re-read the destination parent after the source write: when src
        // and dst share a parent (a plain rename), the clear above already
        // landed on disk and must be reflected before picking a free slot.
        let mut dst_parent = self.read_inode(dst_parent_id);
        let dst_slot =
            free_slot(dst_parent.vacant).ok_or_else(|| Error::DirectoryFull(dst.to_string()))?;
        let mut dst_block = self.read_dir_block(&dst_parent);
        dst_block.set(dst_slot, dst_name, moved_id as u8);
        dst_parent.vacant |= 1 << dst_slot;
        self.write_dir_block(&dst_parent, &dst_block);
        self.write_inode(dst_parent_id, &dst_parent);

        debug!("moved {src} to {dst}");
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::NamedTempFile;

    fn formatted() -> (NamedTempFile, FileSystem) {
        let file = NamedTempFile::new().unwrap();
        let fs = FileSystem::format(file.path()).unwrap();
        (file, fs)
    }

    #[test]
    fn format_mount_round_trip_leaves_root_empty() {
        let file = NamedTempFile::new().unwrap();
        let fs = FileSystem::format(file.path()).unwrap();
        let free_after_format = fs.block_store.free_count();
        fs.unmount().unwrap();

        let fs = FileSystem::mount(file.path()).unwrap();
        assert_eq!(fs.get_dir("/").unwrap(), Vec::new());
        assert_eq!(fs.block_store.free_count(), free_after_format);
    }

    #[test]
    fn create_duplicate_is_rejected_and_get_dir_shows_one_entry() {
        let (_f, mut fs) = formatted();
        fs.create("/a", FileType::Regular).unwrap();
        assert!(fs.create("/a", FileType::Regular).is_err());
        let entries = fs.get_dir("/").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "a");
        assert_eq!(entries[0].file_type, FileType::Regular);
    }

    #[test]
    fn write_then_seek_then_read_round_trips() {
        let (_f, mut fs) = formatted();
        fs.create("/d", FileType::Directory).unwrap();
        fs.create("/d/f", FileType::Regular).unwrap();
        let fd = fs.open("/d/f").unwrap();
        assert_eq!(fs.write(fd, b"hello").unwrap(), 5);
        fs.seek(fd, 0, Whence::Set).unwrap();
        let mut buf = [0u8; 5];
        assert_eq!(fs.read(fd, &mut buf).unwrap(), 5);
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn write_spans_direct_into_indirect() {
        let (_f, mut fs) = formatted();
        fs.create("/f", FileType::Regular).unwrap();
        let fd = fs.open("/f").unwrap();
        let chunk = vec![0xabu8; BLOCK_SIZE];
        for _ in 0..3 {
            assert_eq!(fs.write(fd, &chunk).unwrap(), BLOCK_SIZE);
        }
        for _ in 0..2 {
            assert_eq!(fs.write(fd, &chunk).unwrap(), BLOCK_SIZE);
        }
        for _ in 0..2 {
            assert_eq!(fs.write(fd, &chunk).unwrap(), BLOCK_SIZE);
        }
        fs.seek(fd, 0, Whence::Set).unwrap();
        let inode = fs.read_inode(fs.descriptors.get(fd).unwrap().inode_id);
        assert_eq!(inode.file_size as usize, 7 * BLOCK_SIZE);
        assert_ne!(inode.indirect, 0);
    }

    #[test]
    fn exhausts_inode_table_on_257th_allocation() {
        // A chain of single-child directories never brushes against the
        // 7-entries-per-directory cap, so this drains the inode table
        // (root + 255 more = 256) without ever hitting DirectoryFull.
        let (_f, mut fs) = formatted();
        let mut parent = "".to_string();
        let mut count = 1; // root
        loop {
            let path = format!("{parent}/d");
            match fs.create(&path, FileType::Directory) {
                Ok(()) => {
                    count += 1;
                    parent = path;
                }
                Err(Error::InodeTableFull) => break,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(count, NUM_INODES);
        assert!(fs.create("/overflow", FileType::Regular).is_err());
    }

    #[test]
    fn move_open_descriptor_keeps_working() {
        let (_f, mut fs) = formatted();
        fs.create("/file", FileType::Regular).unwrap();
        fs.create("/folder", FileType::Directory).unwrap();
        let fd = fs.open("/file").unwrap();
        fs.move_file("/file", "/folder/new").unwrap();
        assert_eq!(fs.write(fd, b"12345678").unwrap(), 8);
        let folder_entries = fs.get_dir("/folder").unwrap();
        assert_eq!(folder_entries[0].name, "new");
        let root_entries = fs.get_dir("/").unwrap();
        assert!(root_entries.iter().all(|e| e.name != "file"));
    }

    #[test]
    fn remove_restores_free_block_count() {
        let (_f, mut fs) = formatted();
        let before = fs.block_store.free_count();
        fs.create("/big", FileType::Regular).unwrap();
        let fd = fs.open("/big").unwrap();
        let chunk = vec![0x11u8; BLOCK_SIZE];
        for _ in 0..300 {
            fs.write(fd, &chunk).unwrap();
        }
        fs.close(fd).unwrap();
        fs.remove("/big").unwrap();
        assert_eq!(fs.block_store.free_count(), before);
    }

    #[test]
    fn remove_of_nonempty_directory_fails() {
        let (_f, mut fs) = formatted();
        fs.create("/d", FileType::Directory).unwrap();
        fs.create("/d/f", FileType::Regular).unwrap();
        assert!(fs.remove("/d").is_err());
    }

    #[test]
    fn seek_clamps_into_file_bounds() {
        let (_f, mut fs) = formatted();
        fs.create("/f", FileType::Regular).unwrap();
        let fd = fs.open("/f").unwrap();
        fs.write(fd, b"abcdef").unwrap();
        assert_eq!(fs.seek(fd, -100, Whence::Set).unwrap(), 0);
        assert_eq!(fs.seek(fd, 100, Whence::Set).unwrap(), 6);
    }

    #[test]
    fn root_cannot_be_removed_or_moved() {
        let (_f, mut fs) = formatted();
        assert!(fs.remove("/").is_err());
        fs.create("/x", FileType::Directory).unwrap();
        assert!(fs.move_file("/", "/x/root").is_err());
    }
}
