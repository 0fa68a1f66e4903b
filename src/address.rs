//! Address translation: maps a `(level, order)` descriptor position to a
//! concrete data block id, allocating index blocks and data blocks on
//! demand.
//!
//! The classic direct/indirect/double-indirect walk, allocating lazily
//! as it descends, sized to this format's 256-entry index blocks and
//! `u16` block ids.

use log::trace;

use crate::block_store::BlockStore;
use crate::descriptor::Level;
use crate::error::{Error, Result};
use crate::geometry::{BLOCK_SIZE, PTRS_PER_INDEX_BLOCK};
use crate::inode::Inode;

type IndexBlock = [u16; PTRS_PER_INDEX_BLOCK];

fn decode_index(raw: &[u8; BLOCK_SIZE]) -> IndexBlock {
    let mut out = [0u16; PTRS_PER_INDEX_BLOCK];
    for (i, slot) in out.iter_mut().enumerate() {
        *slot = u16::from_ne_bytes([raw[i * 2], raw[i * 2 + 1]]);
    }
    out
}

fn encode_index(index: &IndexBlock) -> [u8; BLOCK_SIZE] {
    let mut raw = [0u8; BLOCK_SIZE];
    for (i, &ptr) in index.iter().enumerate() {
        let bytes = ptr.to_ne_bytes();
        raw[i * 2] = bytes[0];
        raw[i * 2 + 1] = bytes[1];
    }
    raw
}

fn read_index(block_store: &BlockStore, block_id: u16) -> IndexBlock {
    let mut raw = [0u8; BLOCK_SIZE];
    block_store.read(block_id, &mut raw);
    decode_index(&raw)
}

fn write_index(block_store: &mut BlockStore, block_id: u16, index: &IndexBlock) {
    block_store.write(block_id, &encode_index(index));
}

/// Finds (and, if `may_allocate`, creates) the data block that backs
/// `inode`'s `(level, order)` position.
///
/// `order` is relative to `level`: `0..6` for `Direct`, `0..256` for
/// `Indirect`, `0..65536` for `DoubleIndirect`. Returns `Ok(None)` when
/// the position is unallocated and `may_allocate` is false (an `Err` of
/// [`Error::OutOfSpace`] is only raised when allocation is requested but
/// the block store has nothing left to give).
pub fn translate(
    block_store: &mut BlockStore,
    inode: &mut Inode,
    level: Level,
    order: u32,
    may_allocate: bool,
) -> Result<Option<u16>> {
    match level {
        Level::Direct => translate_direct(block_store, inode, order, may_allocate),
        Level::Indirect => translate_indirect(block_store, inode, order, may_allocate),
        Level::DoubleIndirect => translate_double_indirect(block_store, inode, order, may_allocate),
    }
}

fn translate_direct(
    block_store: &mut BlockStore,
    inode: &mut Inode,
    order: u32,
    may_allocate: bool,
) -> Result<Option<u16>> {
    let slot = order as usize;
    let existing = inode.direct[slot];
    if existing != 0 {
        return Ok(Some(existing));
    }
    if !may_allocate {
        return Ok(None);
    }
    let id = block_store.allocate().ok_or(Error::OutOfSpace)?;
    inode.direct[slot] = id;
    Ok(Some(id))
}

fn translate_indirect(
    block_store: &mut BlockStore,
    inode: &mut Inode,
    order: u32,
    may_allocate: bool,
) -> Result<Option<u16>> {
    if inode.indirect == 0 {
        if !may_allocate {
            return Ok(None);
        }
        let index_id = block_store.allocate().ok_or(Error::OutOfSpace)?;
        write_index(block_store, index_id, &[0u16; PTRS_PER_INDEX_BLOCK]);
        inode.indirect = index_id;
    }
    let mut index = read_index(block_store, inode.indirect);
    let slot = order as usize;
    if index[slot] != 0 {
        return Ok(Some(index[slot]));
    }
    if !may_allocate {
        return Ok(None);
    }
    let data_id = match block_store.allocate() {
        Some(id) => id,
        None => return Err(Error::OutOfSpace),
    };
    index[slot] = data_id;
    write_index(block_store, inode.indirect, &index);
    Ok(Some(data_id))
}

fn translate_double_indirect(
    block_store: &mut BlockStore,
    inode: &mut Inode,
    order: u32,
    may_allocate: bool,
) -> Result<Option<u16>> {
    let outer_slot = (order / PTRS_PER_INDEX_BLOCK as u32) as usize;
    let inner_slot = (order % PTRS_PER_INDEX_BLOCK as u32) as usize;

    if inode.double_indirect == 0 {
        if !may_allocate {
            return Ok(None);
        }
        let outer_id = block_store.allocate().ok_or(Error::OutOfSpace)?;
        write_index(block_store, outer_id, &[0u16; PTRS_PER_INDEX_BLOCK]);
        inode.double_indirect = outer_id;
    }
    let mut outer = read_index(block_store, inode.double_indirect);

    if outer[outer_slot] == 0 {
        if !may_allocate {
            return Ok(None);
        }
        let inner_id = match block_store.allocate() {
            Some(id) => id,
            None => return Err(Error::OutOfSpace),
        };
        write_index(block_store, inner_id, &[0u16; PTRS_PER_INDEX_BLOCK]);
        outer[outer_slot] = inner_id;
        write_index(block_store, inode.double_indirect, &outer);
    }
    let mut inner = read_index(block_store, outer[outer_slot]);

    if inner[inner_slot] != 0 {
        return Ok(Some(inner[inner_slot]));
    }
    if !may_allocate {
        return Ok(None);
    }
    let data_id = match block_store.allocate() {
        Some(id) => id,
        None => return Err(Error::OutOfSpace),
    };
    inner[inner_slot] = data_id;
    write_index(block_store, outer[outer_slot], &inner);
    Ok(Some(data_id))
}

/// Releases every block reachable from `inode`: data blocks plus any
/// index blocks that address them, then the index blocks themselves.
/// Used by `remove`.
pub fn release_all(block_store: &mut BlockStore, inode: &Inode) {
    for &id in &inode.direct {
        if id != 0 {
            trace!("releasing direct block {id}");
            block_store.release(id);
        }
    }
    if inode.indirect != 0 {
        let index = read_index(block_store, inode.indirect);
        for &id in index.iter() {
            if id != 0 {
                trace!("releasing indirect data block {id}");
                block_store.release(id);
            }
        }
        trace!("releasing indirect index block {}", inode.indirect);
        block_store.release(inode.indirect);
    }
    if inode.double_indirect != 0 {
        let outer = read_index(block_store, inode.double_indirect);
        for &inner_id in outer.iter() {
            if inner_id != 0 {
                let inner = read_index(block_store, inner_id);
                for &id in inner.iter() {
                    if id != 0 {
                        trace!("releasing double-indirect data block {id}");
                        block_store.release(id);
                    }
                }
                trace!("releasing double-indirect inner index block {inner_id}");
                block_store.release(inner_id);
            }
        }
        trace!(
            "releasing double-indirect outer index block {}",
            inode.double_indirect
        );
        block_store.release(inode.double_indirect);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::inode::FileType;
    use tempfile::NamedTempFile;

    fn store() -> (NamedTempFile, BlockStore) {
        let file = NamedTempFile::new().unwrap();
        let bs = BlockStore::create(file.path()).unwrap();
        (file, bs)
    }

    #[test]
    fn direct_allocates_on_demand_and_is_stable() {
        let (_f, mut bs) = store();
        let mut inode = Inode::new(0, FileType::Regular);
        let a = translate(&mut bs, &mut inode, Level::Direct, 2, true).unwrap().unwrap();
        let b = translate(&mut bs, &mut inode, Level::Direct, 2, true).unwrap().unwrap();
        assert_eq!(a, b);
        assert_eq!(inode.direct[2], a);
    }

    #[test]
    fn direct_without_allocate_returns_none_until_written() {
        let (_f, mut bs) = store();
        let mut inode = Inode::new(0, FileType::Regular);
        assert_eq!(translate(&mut bs, &mut inode, Level::Direct, 0, false).unwrap(), None);
    }

    #[test]
    fn indirect_allocates_index_block_then_data_block() {
        let (_f, mut bs) = store();
        let mut inode = Inode::new(0, FileType::Regular);
        let before = bs.free_count();
        let data = translate(&mut bs, &mut inode, Level::Indirect, 5, true).unwrap().unwrap();
        assert_ne!(inode.indirect, 0);
        assert_ne!(data, inode.indirect);
        // one block for the index, one for the data.
        assert_eq!(bs.free_count(), before - 2);
    }

    #[test]
    fn double_indirect_allocates_outer_inner_and_data() {
        let (_f, mut bs) = store();
        let mut inode = Inode::new(0, FileType::Regular);
        let before = bs.free_count();
        let data = translate(&mut bs, &mut inode, Level::DoubleIndirect, 300, true)
            .unwrap()
            .unwrap();
        assert_ne!(inode.double_indirect, 0);
        assert_eq!(bs.free_count(), before - 3);
        // same (outer, inner) pair reused for an order in the same outer slot.
        let data2 = translate(&mut bs, &mut inode, Level::DoubleIndirect, 301, true)
            .unwrap()
            .unwrap();
        assert_ne!(data, data2);
        assert_eq!(bs.free_count(), before - 4);
    }

    #[test]
    fn release_all_returns_every_reachable_block() {
        let (_f, mut bs) = store();
        let mut inode = Inode::new(0, FileType::Regular);
        translate(&mut bs, &mut inode, Level::Direct, 0, true).unwrap();
        translate(&mut bs, &mut inode, Level::Indirect, 0, true).unwrap();
        translate(&mut bs, &mut inode, Level::DoubleIndirect, 0, true).unwrap();
        let before_release = bs.free_count();
        assert!(before_release < bs.total());
        release_all(&mut bs, &inode);
        assert_eq!(bs.free_count(), bs.total());
    }
}
