//! A slab allocator for mini-page slots, gated behind the `mini_page`
//! feature. A mini-page is a ≤1 KiB DRAM-resident partial cache of a full
//! NVM page — used when the buffer manager only needs to service a small
//! read/write range and pulling the whole page into DRAM would waste
//! capacity.

use crate::error::{Result, SpitfireError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const MINI_PAGE_SIZE: usize = 1024;

/// Fixed-size slots, all `MINI_PAGE_SIZE` bytes. `acquire` hands out a
/// zeroed slot (reused from the free list when available); `release`
/// returns it.
pub struct MiniPageSlab {
    free: Mutex<Vec<Box<[u8]>>>,
    capacity: usize,
    allocated: AtomicUsize,
}

impl MiniPageSlab {
    pub fn new(capacity: usize) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            capacity,
            allocated: AtomicUsize::new(0),
        }
    }

    pub fn acquire(&self) -> Result<Box<[u8]>> {
        if let Some(mut slot) = self.free.lock().pop() {
            slot.fill(0);
            return Ok(slot);
        }
        let prev = self.allocated.fetch_add(1, Ordering::SeqCst);
        if prev >= self.capacity {
            self.allocated.fetch_sub(1, Ordering::SeqCst);
            return Err(SpitfireError::OutOfSpace(
                "mini-page slab exhausted".into(),
            ));
        }
        Ok(vec![0u8; MINI_PAGE_SIZE].into_boxed_slice())
    }

    pub fn release(&self, slot: Box<[u8]>) {
        debug_assert_eq!(slot.len(), MINI_PAGE_SIZE);
        self.free.lock().push(slot);
    }

    pub fn in_use(&self) -> usize {
        self.allocated.load(Ordering::SeqCst) - self.free.lock().len()
    }
}
