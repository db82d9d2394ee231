//! The buffered block cache: pin/unpin of a fixed-size block by block
//! number, with explicit dirty marking and a cache-wide flush.
//!
//! `spec.md` §1 names the buffer cache as an external collaborator; this is
//! this crate's one concrete implementation of it, generalizing the
//! teacher's `bio.rs` (`bread`/`brelse`/`bwrite`/`bpin`/`bunpin` over a
//! fixed `[Buf; NBUF]` table guarded by one spinlock and a per-buffer
//! sleeplock) into a safe, unbounded, per-mount cache: every block stays
//! resident for the life of the mount (no LRU eviction — `sync` is the only
//! way blocks reach the device), and each block has its own lock so a
//! caller may pin several blocks at once (an inode block, an indirect
//! block and a leaf, say) without the single-buffer-at-a-time restriction
//! `bio.rs` imposes.
//!
//! [`BufferCache::get`] returns a [`BlockGuard`], a scoped handle in the
//! sense `spec.md` §9 asks for: acquiring one is "pinning" the block, and
//! dropping it is the paired "release" — there is no way to forget the
//! release on an exit path, including an error path, because it happens in
//! `Drop`.

use crate::error::{Error, Result};
use crate::layout::{BLOCK_SIZE, SECTORS_PER_BLOCK, SECTOR_SIZE};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use crate::device::BlockDevice;

struct Slot {
    data: Mutex<Vec<u8>>,
    dirty: AtomicBool,
    pins: AtomicU32,
}

impl Slot {
    fn new(data: Vec<u8>) -> Self {
        Self {
            data: Mutex::new(data),
            dirty: AtomicBool::new(false),
            pins: AtomicU32::new(0),
        }
    }
}

/// A write-behind cache of file-system blocks shared by every operation on
/// one mount.
pub struct BufferCache<D: BlockDevice> {
    dev: Arc<D>,
    slots: Mutex<HashMap<u32, Arc<Slot>>>,
}

impl<D: BlockDevice> BufferCache<D> {
    /// Creates a cache over `dev`. The cache starts empty; blocks are
    /// loaded lazily on first [`get`](Self::get).
    pub fn new(dev: Arc<D>) -> Self {
        Self {
            dev,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// The device this cache is backed by.
    pub fn device(&self) -> &Arc<D> {
        &self.dev
    }

    fn slot_for(&self, block_no: u32) -> Result<Arc<Slot>> {
        let mut slots = self.slots.lock().map_err(|_| Error::NoMemory)?;
        if let Some(slot) = slots.get(&block_no) {
            return Ok(slot.clone());
        }
        let mut buf = vec![0u8; BLOCK_SIZE as usize];
        let first_sector = block_no as u64 * SECTORS_PER_BLOCK as u64;
        for i in 0..SECTORS_PER_BLOCK as u64 {
            let sector_buf = &mut buf
                [(i * SECTOR_SIZE as u64) as usize..((i + 1) * SECTOR_SIZE as u64) as usize];
            self.dev.read_sector(first_sector + i, sector_buf)?;
        }
        let slot = Arc::new(Slot::new(buf));
        slots.insert(block_no, slot.clone());
        Ok(slot)
    }

    /// Pins block `block_no`, loading it from the device on first access.
    pub fn get(&self, block_no: u32) -> Result<BlockGuard<'_, D>> {
        let slot = self.slot_for(block_no)?;
        slot.pins.fetch_add(1, Ordering::AcqRel);
        Ok(BlockGuard {
            cache: self,
            block_no,
            slot,
        })
    }

    /// Pins block `block_no` and zeroes its contents, marking it dirty.
    /// Used by the allocator to hand callers a clean canvas.
    pub fn get_zeroed(&self, block_no: u32) -> Result<BlockGuard<'_, D>> {
        let guard = self.get(block_no)?;
        guard.zero();
        Ok(guard)
    }

    /// Flushes every dirty block back to the device and clears their dirty
    /// bits (`spec.md` §4.I `sync`).
    pub fn flush(&self) -> Result<()> {
        let slots = self.slots.lock().map_err(|_| Error::NoMemory)?;
        for (&block_no, slot) in slots.iter() {
            if slot.dirty.swap(false, Ordering::AcqRel) {
                let data = slot.data.lock().map_err(|_| Error::NoMemory)?;
                let first_sector = block_no as u64 * SECTORS_PER_BLOCK as u64;
                for i in 0..SECTORS_PER_BLOCK as u64 {
                    let sector_buf = &data[(i * SECTOR_SIZE as u64) as usize
                        ..((i + 1) * SECTOR_SIZE as u64) as usize];
                    self.dev.write_sector(first_sector + i, sector_buf)?;
                }
            }
        }
        Ok(())
    }
}

/// A pinned, locked handle to one cached block.
///
/// Releasing the pin happens automatically when the guard is dropped, on
/// every exit path including errors — the scoped-acquisition contract
/// `spec.md` §9 calls for.
pub struct BlockGuard<'c, D: BlockDevice> {
    cache: &'c BufferCache<D>,
    block_no: u32,
    slot: Arc<Slot>,
}

impl<'c, D: BlockDevice> BlockGuard<'c, D> {
    /// The block number this guard has pinned.
    pub fn block_no(&self) -> u32 {
        self.block_no
    }

    /// Reads `buf.len()` bytes starting at `offset` within the block.
    pub fn read_at(&self, offset: usize, buf: &mut [u8]) {
        let data = self.slot.data.lock().expect("block lock poisoned");
        buf.copy_from_slice(&data[offset..offset + buf.len()]);
    }

    /// Writes `bytes` starting at `offset` within the block and marks it
    /// dirty.
    pub fn write_at(&self, offset: usize, bytes: &[u8]) {
        let mut data = self.slot.data.lock().expect("block lock poisoned");
        data[offset..offset + bytes.len()].copy_from_slice(bytes);
        drop(data);
        self.mark_dirty();
    }

    /// Reads a little-endian `u32` at `offset`.
    pub fn read_u32(&self, offset: usize) -> u32 {
        let mut raw = [0u8; 4];
        self.read_at(offset, &mut raw);
        u32::from_le_bytes(raw)
    }

    /// Writes a little-endian `u32` at `offset` and marks the block dirty.
    pub fn write_u32(&self, offset: usize, value: u32) {
        self.write_at(offset, &value.to_le_bytes());
    }

    /// Reads a little-endian `u64` at `offset`.
    pub fn read_u64_at(&self, offset: usize) -> u64 {
        let mut raw = [0u8; 8];
        self.read_at(offset, &mut raw);
        u64::from_le_bytes(raw)
    }

    /// Writes a little-endian `u64` at `offset` and marks the block dirty.
    pub fn write_u64_at(&self, offset: usize, value: u64) {
        self.write_at(offset, &value.to_le_bytes());
    }

    /// Zeroes the whole block and marks it dirty.
    pub fn zero(&self) {
        let mut data = self.slot.data.lock().expect("block lock poisoned");
        data.iter_mut().for_each(|b| *b = 0);
        drop(data);
        self.mark_dirty();
    }

    /// Explicitly marks the block dirty without writing to it (used when a
    /// caller mutated the block through some other handle to the same
    /// bytes).
    pub fn mark_dirty(&self) {
        self.slot.dirty.store(true, Ordering::Release);
    }

    /// Borrows the whole block's bytes read-only for the duration of `f`.
    pub fn with<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let data = self.slot.data.lock().expect("block lock poisoned");
        f(&data)
    }

    /// Borrows the whole block's bytes mutably for the duration of `f`,
    /// then marks the block dirty.
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let mut data = self.slot.data.lock().expect("block lock poisoned");
        let r = f(&mut data);
        drop(data);
        self.mark_dirty();
        r
    }
}

impl<'c, D: BlockDevice> Drop for BlockGuard<'c, D> {
    fn drop(&mut self) {
        self.slot.pins.fetch_sub(1, Ordering::AcqRel);
        let _ = self.cache; // guard only needs the cache for its lifetime bound
    }
}
