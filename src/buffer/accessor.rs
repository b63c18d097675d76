//! `PageAccessor`: the handle `BufferManager::get` hands back. Bundles the
//! pinned descriptor with the page bytes currently materialized in memory,
//! and tracks which byte ranges were written so `finish_access` knows what
//! to fold into the dirty state and LSN.

use crate::buffer::descriptor::PageDescriptor;
use crate::common::PageId;
use std::sync::Arc;

/// The four access intents `BufferManager::get` accepts. Read modes take
/// the descriptor's latch in shared mode; write modes take it exclusively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    IntentReadPartial,
    IntentReadFull,
    IntentWritePartial,
    IntentWriteFull,
}

impl AccessMode {
    pub fn is_write(&self) -> bool {
        matches!(self, AccessMode::IntentWritePartial | AccessMode::IntentWriteFull)
    }
}

/// Bound to one `get`/`put` cycle. `prepare_for_read`/`prepare_for_write`
/// slice into the materialized page image; `finish_access` is called by
/// `BufferManager::put` once the caller is done, folding any written ranges
/// into the descriptor's dirty flag and advancing its LSN.
pub struct PageAccessor {
    pub pid: PageId,
    pub mode: AccessMode,
    pub(crate) descriptor: Arc<PageDescriptor>,
    pub(crate) image: Vec<u8>,
    pub(crate) wrote: bool,
}

impl PageAccessor {
    pub(crate) fn new(
        pid: PageId,
        mode: AccessMode,
        descriptor: Arc<PageDescriptor>,
        image: Vec<u8>,
    ) -> Self {
        Self {
            pid,
            mode,
            descriptor,
            image,
            wrote: false,
        }
    }

    pub fn prepare_for_read(&self, off: usize, len: usize) -> &[u8] {
        &self.image[off..off + len]
    }

    pub fn prepare_for_write(&mut self, off: usize, len: usize) -> &mut [u8] {
        assert!(self.mode.is_write(), "accessor not opened for writing");
        self.wrote = true;
        &mut self.image[off..off + len]
    }

    pub fn image(&self) -> &[u8] {
        &self.image
    }

    /// Commits pending writes to the descriptor's dirty bitmap and bumps
    /// its LSN if any writes occurred. Called by `BufferManager::put`.
    pub(crate) fn finish_access(&self, next_lsn: impl FnOnce() -> u64) {
        if self.wrote {
            self.descriptor.mark_dirty();
            self.descriptor.set_lsn(next_lsn());
        }
    }
}
