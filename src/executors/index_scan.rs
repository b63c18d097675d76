//! Index scan: returns the visible version of every key in a range. The
//! index only ever holds the newest version's pointer, so visibility is
//! resolved per row by [`MvtoManager::scan_read`], which walks
//! `next_version_ptr` back to an older version when the newest one isn't
//! visible to this reader's snapshot.

use crate::error::Result;
use crate::executors::ReadExecutor;
use crate::heap::RecordStore;
use crate::index::OrderedIndex;
use crate::txn::{MvtoManager, TransactionContext};
use std::ops::Bound;
use std::sync::Arc;

pub struct IndexScanExecutor<K> {
    index: Arc<dyn OrderedIndex<K>>,
    heap: Arc<dyn RecordStore>,
    mvto: Arc<MvtoManager>,
    start: Bound<K>,
    end: Bound<K>,
}

impl<K> IndexScanExecutor<K>
where
    K: Ord + Clone + Send + Sync,
{
    pub fn new(index: Arc<dyn OrderedIndex<K>>, heap: Arc<dyn RecordStore>, mvto: Arc<MvtoManager>, start: Bound<K>, end: Bound<K>) -> Self {
        Self { index, heap, mvto, start, end }
    }
}

impl<K> ReadExecutor<K> for IndexScanExecutor<K>
where
    K: Ord + Clone + Send + Sync,
{
    fn execute(&self, ctx: &Arc<TransactionContext>) -> Result<Vec<(K, Vec<u8>)>> {
        let mut rows = Vec::new();
        for (key, ptr) in self.index.range(self.start.clone(), self.end.clone()) {
            if let Some(header) = self.mvto.scan_read(ctx, ptr)? {
                rows.push((key, self.heap.get(header.body)?));
            }
        }
        Ok(rows)
    }
}
