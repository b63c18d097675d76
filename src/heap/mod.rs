//! The per-table version heap: every tuple version's record body lives
//! here, addressed by `TuplePointer`. A version's header (in the tuple
//! header store) carries a `body` pointer into this heap; a tombstone
//! keeps the predecessor's body pointer so the chain stays walkable.
//!
//! Records are variable-length, unlike the tuple header store's fixed-size
//! slots, so each one is stored with a little-endian `u32` length prefix:
//! a read takes the prefix first, then the body.

use crate::buffer::{AccessMode, BufferManager};
use crate::common::{PageId, TuplePointer};
use crate::error::{Result, SpitfireError};
use parking_lot::Mutex;
use std::sync::Arc;

const NUM_PARTITIONS: usize = 16;
const LENGTH_PREFIX: usize = 4;

/// Capability trait for a record-bodied heap, opaque to the executors the
/// same way the primary index is: they store and fetch bytes, MVTO and the
/// caller interpret them.
pub trait RecordStore: Send + Sync {
    fn insert(&self, bytes: &[u8]) -> Result<TuplePointer>;
    fn get(&self, ptr: TuplePointer) -> Result<Vec<u8>>;
}

struct AppendCursor {
    current_pid: Option<PageId>,
}

/// Reference `RecordStore` implementation: one append cursor per partition,
/// backed by pages pulled from the buffer manager exactly like the tuple
/// header store.
pub struct PartitionedHeap {
    buffer: Arc<BufferManager>,
    cursors: Vec<Mutex<AppendCursor>>,
}

impl PartitionedHeap {
    pub fn new(buffer: Arc<BufferManager>) -> Self {
        let mut cursors = Vec::with_capacity(NUM_PARTITIONS);
        for _ in 0..NUM_PARTITIONS {
            cursors.push(Mutex::new(AppendCursor { current_pid: None }));
        }
        Self { buffer, cursors }
    }

    fn partition_for(&self, hint: u64) -> usize {
        (hint.wrapping_mul(0x9e3779b97f4a7c15) as usize) % self.cursors.len()
    }

    fn try_append(&self, pid: PageId, encoded: &[u8]) -> Result<Option<TuplePointer>> {
        let mut accessor = self.buffer.get(pid, AccessMode::IntentWriteFull)?;
        let page_bytes = accessor.image().to_vec();
        let mut page = crate::storage::Page::from_bytes(page_bytes);
        let slot = match page.insert_record(encoded) {
            Ok(slot) => slot,
            Err(SpitfireError::OutOfSpace(_)) => {
                self.buffer.put(accessor)?;
                return Ok(None);
            }
            Err(e) => {
                self.buffer.put(accessor)?;
                return Err(e);
            }
        };
        accessor.prepare_for_write(0, page.as_bytes().len()).copy_from_slice(page.as_bytes());
        self.buffer.put(accessor)?;
        Ok(Some(TuplePointer::new(pid, slot)))
    }
}

impl RecordStore for PartitionedHeap {
    fn insert(&self, bytes: &[u8]) -> Result<TuplePointer> {
        let mut encoded = Vec::with_capacity(LENGTH_PREFIX + bytes.len());
        encoded.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        encoded.extend_from_slice(bytes);

        let cursor = &self.cursors[self.partition_for(bytes.len() as u64)];
        let mut cursor = cursor.lock();
        if let Some(pid) = cursor.current_pid {
            if let Some(ptr) = self.try_append(pid, &encoded)? {
                return Ok(ptr);
            }
        }
        let pid = self.buffer.new_page()?;
        cursor.current_pid = Some(pid);
        self.try_append(pid, &encoded)?
            .ok_or_else(|| SpitfireError::OutOfSpace("record too large for an empty page".into()))
    }

    fn get(&self, ptr: TuplePointer) -> Result<Vec<u8>> {
        let accessor = self.buffer.get(ptr.page_id, AccessMode::IntentReadFull)?;
        let page = crate::storage::Page::from_bytes(accessor.image().to_vec());
        let prefix = page
            .record(ptr.slot, LENGTH_PREFIX)
            .ok_or_else(|| SpitfireError::InvariantViolation(format!("no record at {ptr}")))?;
        let len = u32::from_le_bytes(prefix.try_into().unwrap()) as usize;
        let full = page
            .record(ptr.slot, LENGTH_PREFIX + len)
            .ok_or_else(|| SpitfireError::InvariantViolation(format!("truncated record at {ptr}")))?;
        let bytes = full[LENGTH_PREFIX..].to_vec();
        self.buffer.put(accessor)?;
        Ok(bytes)
    }
}
