//! The `TierAllocator` capability trait and its DRAM/SSD implementations.
//! The NVM implementation lives in [`crate::memory::nvm`] since it needs
//! considerably more machinery (chunks, arenas, a root-object table, a
//! crash-recovery log).

use crate::error::Result;
use crate::storage::{PageId, SsdPageManager};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// `{alloc, free, persist}`, implemented once per tier. `alloc` returns an
/// opaque tier-relative address; callers never interpret it, only round-trip
/// it back into `free`/`persist`.
pub trait TierAllocator: Send + Sync {
    fn alloc(&self, size: usize) -> Result<u64>;
    fn free(&self, addr: u64) -> Result<()>;
    /// Make the bytes at `[addr, addr+size)` durable. A no-op for DRAM.
    fn persist(&self, addr: u64, size: usize) -> Result<()>;
}

/// Standard heap allocator. Handles are opaque ids into a concurrent map
/// rather than raw pointers, so the allocator stays `Send + Sync` without
/// unsafe code; the buffer manager is the only caller and always treats the
/// handle as opaque.
pub struct DramAllocator {
    next_handle: AtomicU64,
    live: DashMap<u64, Box<[u8]>>,
}

impl DramAllocator {
    pub fn new() -> Self {
        Self {
            next_handle: AtomicU64::new(1),
            live: DashMap::new(),
        }
    }

    pub fn get(&self, addr: u64) -> Option<dashmap::mapref::one::Ref<'_, u64, Box<[u8]>>> {
        self.live.get(&addr)
    }

    pub fn get_mut(&self, addr: u64) -> Option<dashmap::mapref::one::RefMut<'_, u64, Box<[u8]>>> {
        self.live.get_mut(&addr)
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }
}

impl Default for DramAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl TierAllocator for DramAllocator {
    fn alloc(&self, size: usize) -> Result<u64> {
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.live.insert(handle, vec![0u8; size].into_boxed_slice());
        Ok(handle)
    }

    fn free(&self, addr: u64) -> Result<()> {
        self.live.remove(&addr);
        Ok(())
    }

    fn persist(&self, _addr: u64, _size: usize) -> Result<()> {
        Ok(())
    }
}

/// Trivial wrapper over the SSD page manager: `alloc` reserves a fresh pid
/// (one allocation == one page, regardless of `size`), `free` records the
/// pid on a free list for a future allocator generation to reuse, and
/// `persist` is a no-op because page bytes are written through
/// [`SsdPageManager::write_page`] directly by the buffer manager, not
/// through this allocator.
pub struct SsdAllocator {
    pages: Arc<SsdPageManager>,
    free_list: Mutex<Vec<PageId>>,
}

impl SsdAllocator {
    pub fn new(pages: Arc<SsdPageManager>) -> Self {
        Self {
            pages,
            free_list: Mutex::new(Vec::new()),
        }
    }

    pub fn page_manager(&self) -> &Arc<SsdPageManager> {
        &self.pages
    }
}

impl TierAllocator for SsdAllocator {
    fn alloc(&self, _size: usize) -> Result<u64> {
        if let Some(pid) = self.free_list.lock().pop() {
            return Ok(pid);
        }
        Ok(self.pages.allocate_pid())
    }

    fn free(&self, addr: u64) -> Result<()> {
        self.free_list.lock().push(addr);
        Ok(())
    }

    fn persist(&self, _addr: u64, _size: usize) -> Result<()> {
        Ok(())
    }
}
