//! The page descriptor table: one [`PageDescriptor`] per resident page,
//! looked up through a hash-partitioned table so unrelated pages don't
//! contend on the same lock.

use crate::common::{PageId, Tier};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

/// A writer-preferring read-write spin latch, released by an explicit call
/// rather than RAII so it can be held across a `get()`/`put()` pair that
/// crosses an API boundary (the `PageAccessor` carries only an `Arc` to its
/// descriptor, not a borrowed guard).
///
/// State: `0` free, `> 0` shared-held count, `-1` exclusively held.
pub struct PageLatch {
    state: AtomicI64,
}

impl PageLatch {
    pub fn new() -> Self {
        Self { state: AtomicI64::new(0) }
    }

    fn try_acquire_shared(&self) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current < 0 {
                return false;
            }
            match self.state.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    fn try_acquire_exclusive(&self) -> bool {
        self.state
            .compare_exchange(0, -1, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn acquire_shared(&self) {
        while !self.try_acquire_shared() {
            thread::yield_now();
        }
    }

    pub fn acquire_exclusive(&self) {
        while !self.try_acquire_exclusive() {
            thread::yield_now();
        }
    }

    pub fn release_shared(&self) {
        self.state.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn release_exclusive(&self) {
        self.state.store(0, Ordering::Release);
    }
}

impl Default for PageLatch {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-page metadata: which tier it's resident in, where in that tier, its
/// pin count, dirty flag, and LSN. The page latch itself lives here too —
/// `get`/`put` take it in shared (read modes) or exclusive (write modes)
/// order, and migration takes it exclusively so in-flight accessors block
/// until the migration completes.
pub struct PageDescriptor {
    pub pid: PageId,
    pub latch: PageLatch,
    tier: RwLock<Tier>,
    dram_addr: RwLock<Option<u64>>,
    nvm_addr: RwLock<Option<u64>>,
    pin_count: AtomicU32,
    dirty: AtomicBool,
    lsn: AtomicU64,
    last_access: AtomicU64,
}

impl PageDescriptor {
    pub fn new(pid: PageId, tier: Tier) -> Self {
        Self {
            pid,
            latch: PageLatch::new(),
            tier: RwLock::new(tier),
            dram_addr: RwLock::new(None),
            nvm_addr: RwLock::new(None),
            pin_count: AtomicU32::new(0),
            dirty: AtomicBool::new(false),
            lsn: AtomicU64::new(0),
            last_access: AtomicU64::new(0),
        }
    }

    pub fn tier(&self) -> Tier {
        *self.tier.read()
    }

    pub fn set_tier(&self, tier: Tier) {
        *self.tier.write() = tier;
    }

    pub fn dram_addr(&self) -> Option<u64> {
        *self.dram_addr.read()
    }

    pub fn set_dram_addr(&self, addr: Option<u64>) {
        *self.dram_addr.write() = addr;
    }

    pub fn nvm_addr(&self) -> Option<u64> {
        *self.nvm_addr.read()
    }

    pub fn set_nvm_addr(&self, addr: Option<u64>) {
        *self.nvm_addr.write() = addr;
    }

    pub fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn unpin(&self) -> u32 {
        self.pin_count.fetch_sub(1, Ordering::SeqCst) - 1
    }

    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::SeqCst)
    }

    pub fn is_pinned(&self) -> bool {
        self.pin_count() > 0
    }

    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    pub fn clear_dirty(&self) {
        self.dirty.store(false, Ordering::SeqCst);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    pub fn lsn(&self) -> u64 {
        self.lsn.load(Ordering::SeqCst)
    }

    pub fn set_lsn(&self, lsn: u64) {
        self.lsn.store(lsn, Ordering::SeqCst);
    }

    pub fn touch(&self, clock: u64) {
        self.last_access.store(clock, Ordering::Relaxed);
    }

    pub fn last_access(&self) -> u64 {
        self.last_access.load(Ordering::Relaxed)
    }
}

const NUM_PARTITIONS: usize = 64;

/// Hash-partitioned `PageId -> Arc<PageDescriptor>` map. Partition count is
/// fixed at construction; lookups hash the pid to a partition and take only
/// that partition's lock.
pub struct DescriptorTable {
    partitions: Vec<RwLock<HashMap<PageId, Arc<PageDescriptor>>>>,
}

impl DescriptorTable {
    pub fn new() -> Self {
        let mut partitions = Vec::with_capacity(NUM_PARTITIONS);
        for _ in 0..NUM_PARTITIONS {
            partitions.push(RwLock::new(HashMap::new()));
        }
        Self { partitions }
    }

    fn partition_index(&self, pid: PageId) -> usize {
        (pid.wrapping_mul(0x9e3779b97f4a7c15) as usize) % self.partitions.len()
    }

    pub fn get(&self, pid: PageId) -> Option<Arc<PageDescriptor>> {
        let idx = self.partition_index(pid);
        self.partitions[idx].read().get(&pid).cloned()
    }

    /// Returns the existing descriptor if present, otherwise inserts
    /// `make()` and returns that. Avoids a second allocation racing another
    /// thread's `new_page`/`get` for the same pid.
    pub fn get_or_insert_with(
        &self,
        pid: PageId,
        make: impl FnOnce() -> Arc<PageDescriptor>,
    ) -> Arc<PageDescriptor> {
        let idx = self.partition_index(pid);
        let mut partition = self.partitions[idx].write();
        partition.entry(pid).or_insert_with(make).clone()
    }

    pub fn remove(&self, pid: PageId) -> Option<Arc<PageDescriptor>> {
        let idx = self.partition_index(pid);
        self.partitions[idx].write().remove(&pid)
    }

    pub fn len(&self) -> usize {
        self.partitions.iter().map(|p| p.read().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DescriptorTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_and_lookup() {
        let table = DescriptorTable::new();
        let desc = table.get_or_insert_with(1, || Arc::new(PageDescriptor::new(1, Tier::Dram)));
        assert_eq!(desc.pid, 1);
        assert!(table.get(1).is_some());
        assert!(table.get(2).is_none());
    }

    #[test]
    fn get_or_insert_is_idempotent() {
        let table = DescriptorTable::new();
        let a = table.get_or_insert_with(5, || Arc::new(PageDescriptor::new(5, Tier::Dram)));
        let b = table.get_or_insert_with(5, || Arc::new(PageDescriptor::new(5, Tier::Nvm)));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(b.tier(), Tier::Dram);
    }

    #[test]
    fn pin_unpin_tracks_count() {
        let desc = PageDescriptor::new(1, Tier::Dram);
        assert!(!desc.is_pinned());
        desc.pin();
        desc.pin();
        assert_eq!(desc.pin_count(), 2);
        desc.unpin();
        assert!(desc.is_pinned());
        desc.unpin();
        assert!(!desc.is_pinned());
    }

    #[test]
    fn remove_drops_descriptor_from_table() {
        let table = DescriptorTable::new();
        table.get_or_insert_with(9, || Arc::new(PageDescriptor::new(9, Tier::Ssd)));
        assert_eq!(table.len(), 1);
        table.remove(9);
        assert!(table.is_empty());
    }
}
