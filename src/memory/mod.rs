//! Fixed-block memory pools.
//!
//! Each pool reserves one contiguous region at startup and carves it into
//! equal blocks tracked by an occupancy bitmap. Nothing is ever split or
//! coalesced, so the pools cannot fragment.
//!
//! ```text
//!   pool i:  base ─┬──────────┬──────────┬─ ... ─┬──────────┐
//!                  │ block 0  │ block 1  │       │ block n-1│
//!                  └──────────┴──────────┴─ ... ─┴──────────┘
//!   bitmap i: [1, 0, 1, ...]        addr → (addr - base) / block_size
//! ```
//!
//! Pool geometry (base, block size, count) is immutable after `init`, so
//! address-to-block resolution runs without the lock. Every bitmap
//! mutation happens inside the single [`Guarded`] that owns all bitmaps.

pub mod region;

use core::ops::{Deref, DerefMut};
use core::ptr::NonNull;

use log::{error, info, warn};
use serde::Serialize;

use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::sync::Guarded;

pub use region::{PsramAllocator, Region, RegionAllocator};

// ---------------------------------------------------------------------------
// Occupancy bitmap
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Occupancy {
    words: Vec<u32>,
    /// Blocks whose handle was given up with [`PoolBlock::into_raw`]. Only
    /// these may be released by address.
    detached: Vec<u32>,
    len: usize,
    used: usize,
}

/// Outcome of releasing a block by address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RawRelease {
    Freed,
    AlreadyFree,
    HandleOwned,
}

fn bit_of(index: usize) -> (usize, u32) {
    (index / 32, 1u32 << (index % 32))
}

impl Occupancy {
    fn new(len: usize) -> Self {
        let words = len.div_ceil(32);
        Self {
            words: vec![0; words],
            detached: vec![0; words],
            len,
            used: 0,
        }
    }

    /// Claim the lowest free block.
    fn claim(&mut self) -> Option<usize> {
        if self.used == self.len {
            return None;
        }
        let (w, word) = self
            .words
            .iter()
            .enumerate()
            .find(|(_, w)| **w != u32::MAX)?;
        let index = w * 32 + word.trailing_ones() as usize;
        if index >= self.len {
            return None;
        }
        self.words[w] |= 1 << (index % 32);
        self.used += 1;
        Some(index)
    }

    /// Clear a block's bit. Returns `false` if it was already free.
    fn release(&mut self, index: usize) -> bool {
        let (w, bit) = bit_of(index);
        if self.words[w] & bit == 0 {
            return false;
        }
        self.words[w] &= !bit;
        self.detached[w] &= !bit;
        self.used -= 1;
        true
    }

    fn detach(&mut self, index: usize) {
        let (w, bit) = bit_of(index);
        self.detached[w] |= bit;
    }

    fn release_detached(&mut self, index: usize) -> RawRelease {
        let (w, bit) = bit_of(index);
        if self.words[w] & bit == 0 {
            RawRelease::AlreadyFree
        } else if self.detached[w] & bit == 0 {
            RawRelease::HandleOwned
        } else {
            self.release(index);
            RawRelease::Freed
        }
    }
}

// ---------------------------------------------------------------------------
// Pools
// ---------------------------------------------------------------------------

struct Pool {
    name: heapless::String<24>,
    block_size: usize,
    block_count: usize,
    region: Region,
}

impl Pool {
    fn block_ptr(&self, index: usize) -> NonNull<u8> {
        // SAFETY: index < block_count, so the offset stays inside the region.
        unsafe { NonNull::new_unchecked(self.region.as_ptr().add(index * self.block_size)) }
    }
}

/// Usage snapshot for one pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub name: heapless::String<24>,
    pub block_size: usize,
    pub block_count: usize,
    pub used: usize,
}

pub struct MemoryManager {
    pools: Vec<Pool>,
    /// Pool indices ordered by ascending block size.
    by_size: Vec<usize>,
    occupancy: Guarded<Vec<Occupancy>>,
}

impl Default for MemoryManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryManager {
    /// An empty manager. Call [`init`](Self::init) before allocating.
    pub fn new() -> Self {
        Self {
            pools: Vec::new(),
            by_size: Vec::new(),
            occupancy: Guarded::new(Vec::new()),
        }
    }

    /// Reserve one region per table entry.
    ///
    /// A failed entry is skipped and the remaining entries are still set
    /// up; the result reports how many failed. Startup only.
    pub fn init(
        &mut self,
        table: &[PoolConfig],
        backing: &dyn RegionAllocator,
    ) -> Result<(), PoolError> {
        let mut failed = 0;
        let mut bitmaps = Vec::with_capacity(table.len());

        for cfg in table {
            let reserved = cfg
                .block_size
                .checked_mul(cfg.block_count)
                .filter(|&bytes| bytes > 0)
                .and_then(|bytes| backing.reserve(bytes));
            let Some(region) = reserved else {
                error!(
                    "MemoryManager: failed to reserve {} ({} x {} B)",
                    cfg.name, cfg.block_count, cfg.block_size
                );
                failed += 1;
                continue;
            };
            info!(
                "MemoryManager: {} ready, {} x {} B at {:#x}",
                cfg.name,
                cfg.block_count,
                cfg.block_size,
                region.base_addr()
            );
            self.pools.push(Pool {
                name: cfg.name.clone(),
                block_size: cfg.block_size,
                block_count: cfg.block_count,
                region,
            });
            bitmaps.push(Occupancy::new(cfg.block_count));
        }

        let mut by_size: Vec<usize> = (0..self.pools.len()).collect();
        by_size.sort_by_key(|&i| self.pools[i].block_size);
        self.by_size = by_size;
        self.occupancy = Guarded::new(bitmaps);

        if failed > 0 {
            Err(PoolError::ReserveFailed { failed })
        } else {
            Ok(())
        }
    }

    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    /// Address range covered by pool `index` (table order).
    pub fn pool_span(&self, index: usize) -> Option<core::ops::Range<usize>> {
        self.pools.get(index).map(|p| {
            let base = p.region.base_addr();
            base..base + p.region.len()
        })
    }

    /// Allocate a block of at least `size` bytes.
    ///
    /// The tightest fitting pool is tried first; if it is exhausted the
    /// larger pools are tried in ascending order and the waste is logged.
    pub fn allocate(&self, size: usize) -> Option<PoolBlock<'_>> {
        let mut fitting = self
            .by_size
            .iter()
            .copied()
            .filter(|&i| self.pools[i].block_size >= size);

        let Some(tight) = fitting.next() else {
            error!("MemoryManager: no pool can hold {} B", size);
            return None;
        };

        let claimed = self.occupancy.with(|maps| {
            if let Some(index) = maps[tight].claim() {
                return Some((tight, index));
            }
            fitting.find_map(|i| maps[i].claim().map(|index| (i, index)))
        });

        match claimed {
            Some((pool, index)) => {
                if pool != tight {
                    warn!(
                        "MemoryManager: {} exhausted, serving {} B from {} ({} B block)",
                        self.pools[tight].name, size, self.pools[pool].name, self.pools[pool].block_size
                    );
                }
                Some(self.block(pool, index))
            }
            None => {
                warn!("MemoryManager: all pools that fit {} B are exhausted", size);
                None
            }
        }
    }

    /// Allocate directly from pool `index` (table order).
    pub fn allocate_from(&self, index: usize) -> Option<PoolBlock<'_>> {
        let Some(pool) = self.pools.get(index) else {
            warn!("MemoryManager: pool index {} out of range", index);
            return None;
        };
        match self.occupancy.with(|maps| maps[index].claim()) {
            Some(block) => Some(self.block(index, block)),
            None => {
                warn!("MemoryManager: {} exhausted", pool.name);
                None
            }
        }
    }

    /// Release a block by address, as returned by [`PoolBlock::into_raw`].
    ///
    /// Foreign, misaligned or already-free addresses are logged and ignored,
    /// as are blocks still owned by a live [`PoolBlock`]. Returns whether a
    /// block was actually freed.
    pub fn release_raw(&self, addr: usize) -> bool {
        let Some(pool) = self.pools.iter().position(|p| p.region.contains(addr)) else {
            warn!("MemoryManager: release of foreign pointer {:#x} ignored", addr);
            return false;
        };
        let p = &self.pools[pool];
        let offset = addr - p.region.base_addr();
        if offset % p.block_size != 0 {
            warn!(
                "MemoryManager: release of misaligned pointer {:#x} in {} ignored",
                addr, p.name
            );
            return false;
        }
        let index = offset / p.block_size;
        match self.occupancy.with(|maps| maps[pool].release_detached(index)) {
            RawRelease::Freed => true,
            RawRelease::AlreadyFree => {
                warn!(
                    "MemoryManager: double release of block {} in {} ignored",
                    index, p.name
                );
                false
            }
            RawRelease::HandleOwned => {
                warn!(
                    "MemoryManager: block {} in {} is still held by a handle, release ignored",
                    index, p.name
                );
                false
            }
        }
    }

    fn release_index(&self, pool: usize, index: usize) {
        if !self.occupancy.with(|maps| maps[pool].release(index)) {
            warn!(
                "MemoryManager: double release of block {} in {} ignored",
                index, self.pools[pool].name
            );
        }
    }

    fn block(&self, pool: usize, index: usize) -> PoolBlock<'_> {
        let p = &self.pools[pool];
        PoolBlock {
            manager: self,
            pool,
            index,
            ptr: p.block_ptr(index),
            len: p.block_size,
        }
    }

    pub fn stats(&self) -> Vec<PoolStats> {
        self.occupancy.with(|maps| {
            self.pools
                .iter()
                .zip(maps.iter())
                .map(|(p, m)| PoolStats {
                    name: p.name.clone(),
                    block_size: p.block_size,
                    block_count: p.block_count,
                    used: m.used,
                })
                .collect()
        })
    }

    pub fn log_status(&self) {
        info!("MemoryManager: {} pool(s)", self.pools.len());
        for s in self.stats() {
            info!(
                "  {:<18} {:>8} B x {:>3}  used {:>3}/{}",
                s.name, s.block_size, s.block_count, s.used, s.block_count
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Block handle
// ---------------------------------------------------------------------------

/// Exclusive handle to one pool block. Released on drop.
pub struct PoolBlock<'a> {
    manager: &'a MemoryManager,
    pool: usize,
    index: usize,
    ptr: NonNull<u8>,
    len: usize,
}

impl PoolBlock<'_> {
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Give up the handle without releasing the block. The address can
    /// later be handed to [`MemoryManager::release_raw`].
    pub fn into_raw(self) -> usize {
        let addr = self.ptr.as_ptr() as usize;
        self.manager
            .occupancy
            .with(|maps| maps[self.pool].detach(self.index));
        core::mem::forget(self);
        addr
    }
}

impl Deref for PoolBlock<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // SAFETY: the occupancy bit grants this handle sole access to the block.
        unsafe { core::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl DerefMut for PoolBlock<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        // SAFETY: as above; `&mut self` makes the borrow unique.
        unsafe { core::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for PoolBlock<'_> {
    fn drop(&mut self) {
        self.manager.release_index(self.pool, self.index);
    }
}

impl core::fmt::Debug for PoolBlock<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PoolBlock")
            .field("pool", &self.pool)
            .field("index", &self.index)
            .field("len", &self.len)
            .finish()
    }
}

#[cfg(all(test, not(target_os = "espidf")))]
mod tests {
    use super::*;

    struct NoMemory;

    impl RegionAllocator for NoMemory {
        fn reserve(&self, _bytes: usize) -> Option<Region> {
            None
        }
    }

    fn small_table() -> Vec<PoolConfig> {
        // Deliberately out of size order.
        vec![
            PoolConfig::new("Large", 1024, 2),
            PoolConfig::new("Small", 64, 4),
            PoolConfig::new("Medium", 256, 2),
        ]
    }

    fn manager() -> MemoryManager {
        let mut m = MemoryManager::new();
        m.init(&small_table(), &PsramAllocator).unwrap();
        m
    }

    fn used(m: &MemoryManager, name: &str) -> usize {
        m.stats()
            .into_iter()
            .find(|s| s.name.as_str() == name)
            .map(|s| s.used)
            .unwrap()
    }

    #[test]
    fn tightest_pool_is_preferred() {
        let m = manager();
        let b = m.allocate(100).unwrap();
        assert_eq!(b.len(), 256);
        assert_eq!(used(&m, "Medium"), 1);
        assert_eq!(used(&m, "Small"), 0);
    }

    #[test]
    fn falls_back_to_larger_pool_when_tight_pool_is_full() {
        let m = manager();
        let _a = m.allocate(200).unwrap();
        let _b = m.allocate(200).unwrap();
        let c = m.allocate(200).unwrap();
        assert_eq!(c.len(), 1024);
        assert_eq!(used(&m, "Large"), 1);
    }

    #[test]
    fn request_larger_than_every_pool_fails() {
        let m = manager();
        assert!(m.allocate(4096).is_none());
        assert!(m.stats().iter().all(|s| s.used == 0));
    }

    #[test]
    fn exhaustion_returns_none() {
        let m = manager();
        let held: Vec<_> = (0..8).map(|_| m.allocate(10).unwrap()).collect();
        assert_eq!(held.len(), 8);
        assert!(m.allocate(10).is_none());
    }

    #[test]
    fn drop_releases_block() {
        let m = manager();
        {
            let _b = m.allocate(64).unwrap();
            assert_eq!(used(&m, "Small"), 1);
        }
        assert_eq!(used(&m, "Small"), 0);
    }

    #[test]
    fn blocks_are_writable_and_disjoint() {
        let m = manager();
        let mut a = m.allocate(64).unwrap();
        let mut b = m.allocate(64).unwrap();
        a.fill(0xAA);
        b.fill(0x55);
        assert!(a.iter().all(|&x| x == 0xAA));
        assert!(b.iter().all(|&x| x == 0x55));
        assert_eq!((b.as_ptr() as usize).abs_diff(a.as_ptr() as usize) % 64, 0);
    }

    #[test]
    fn allocate_from_uses_table_index() {
        let m = manager();
        let b = m.allocate_from(0).unwrap();
        assert_eq!(b.len(), 1024);
        assert!(m.allocate_from(3).is_none());
        let _c = m.allocate_from(0).unwrap();
        assert!(m.allocate_from(0).is_none());
    }

    #[test]
    fn double_release_is_ignored() {
        let m = manager();
        let a = m.allocate(64).unwrap().into_raw();
        let _other = m.allocate(64).unwrap();
        assert!(m.release_raw(a));
        assert!(!m.release_raw(a));
        assert_eq!(used(&m, "Small"), 1);
    }

    #[test]
    fn foreign_and_misaligned_pointers_are_ignored() {
        let m = manager();
        let local = [0u8; 4];
        assert!(!m.release_raw(local.as_ptr() as usize));

        let a = m.allocate(64).unwrap().into_raw();
        assert!(!m.release_raw(a + 1));
        assert_eq!(used(&m, "Small"), 1);
        assert!(m.release_raw(a));
    }

    #[test]
    fn address_of_live_handle_is_not_released() {
        let mut m = MemoryManager::new();
        m.init(&[PoolConfig::new("Single", 64, 1)], &PsramAllocator)
            .unwrap();
        let mut a = m.allocate(64).unwrap();
        a[0] = 1;
        assert!(!m.release_raw(a.as_ptr() as usize));
        assert!(m.allocate(64).is_none());
        assert_eq!(a[0], 1);

        let addr = a.into_raw();
        assert!(m.release_raw(addr));
        let mut b = m.allocate(64).unwrap();
        b[0] = 2;
        // The new handle cannot be freed through the old address.
        assert!(!m.release_raw(addr));
        assert_eq!(used(&m, "Single"), 1);
    }

    #[test]
    fn failed_reservation_keeps_going_and_reports() {
        let mut m = MemoryManager::new();
        let err = m.init(&small_table(), &NoMemory).unwrap_err();
        assert_eq!(err, PoolError::ReserveFailed { failed: 3 });
        assert_eq!(m.pool_count(), 0);
        assert!(m.allocate(1).is_none());
    }

    #[test]
    fn zero_sized_entry_counts_as_failure() {
        let mut table = small_table();
        table.push(PoolConfig::new("Empty", 0, 4));
        let mut m = MemoryManager::new();
        assert_eq!(
            m.init(&table, &PsramAllocator),
            Err(PoolError::ReserveFailed { failed: 1 })
        );
        assert_eq!(m.pool_count(), 3);
    }

    #[test]
    fn concurrent_allocation_never_hands_out_a_block_twice() {
        let m = manager();
        let addrs = std::sync::Mutex::new(Vec::new());
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..50 {
                        if let Some(b) = m.allocate(32) {
                            addrs.lock().unwrap().push(b.into_raw());
                        }
                    }
                });
            }
        });
        let mut addrs = addrs.into_inner().unwrap();
        let n = addrs.len();
        addrs.sort_unstable();
        addrs.dedup();
        assert_eq!(addrs.len(), n);
        assert_eq!(n, 8);
    }
}
