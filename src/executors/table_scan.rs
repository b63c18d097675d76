//! Table scan: iterates the whole key space rather than an index range.
//!
//! The reference index is the only catalog of a table's rows, so here a
//! table scan and an unbounded index scan walk the same structure; a
//! deployment with a separate heap-ordered catalog would instead iterate
//! that heap's pages directly and consult the index only for per-row
//! ownership/visibility, which is why this stays a distinct type rather
//! than a type alias for `IndexScanExecutor`.

use crate::error::Result;
use crate::executors::ReadExecutor;
use crate::heap::RecordStore;
use crate::index::OrderedIndex;
use crate::txn::{MvtoManager, TransactionContext};
use std::ops::Bound;
use std::sync::Arc;

pub struct TableScanExecutor<K> {
    index: Arc<dyn OrderedIndex<K>>,
    heap: Arc<dyn RecordStore>,
    mvto: Arc<MvtoManager>,
}

impl<K> TableScanExecutor<K>
where
    K: Ord + Clone + Send + Sync,
{
    pub fn new(index: Arc<dyn OrderedIndex<K>>, heap: Arc<dyn RecordStore>, mvto: Arc<MvtoManager>) -> Self {
        Self { index, heap, mvto }
    }
}

impl<K> ReadExecutor<K> for TableScanExecutor<K>
where
    K: Ord + Clone + Send + Sync,
{
    fn execute(&self, ctx: &Arc<TransactionContext>) -> Result<Vec<(K, Vec<u8>)>> {
        let mut rows = Vec::new();
        for (key, ptr) in self.index.range(Bound::Unbounded, Bound::Unbounded) {
            if let Some(header) = self.mvto.scan_read(ctx, ptr)? {
                rows.push((key, self.heap.get(header.body)?));
            }
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferManager;
    use crate::config::EngineConfigBuilder;
    use crate::executors::{Executor, InsertExecutor};
    use crate::heap::PartitionedHeap;
    use crate::index::BTreeMapIndex;
    use crate::txn::TupleHeaderStore;
    use crate::wal::WalWriter;

    #[test]
    fn table_scan_sees_every_row_regardless_of_insert_order() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfigBuilder::new()
            .db_path(dir.path().join("ssd"))
            .nvm_path(dir.path().join("nvm"))
            .dram_buf_num_pages(16)
            .build()
            .unwrap();
        let wal = Arc::new(WalWriter::open(dir.path().join("wal")).unwrap());
        let buffer = Arc::new(BufferManager::new(&config, wal.clone()).unwrap());
        let header_store = Arc::new(TupleHeaderStore::new(buffer.clone()));
        let heap: Arc<dyn RecordStore> = Arc::new(PartitionedHeap::new(buffer));
        let mvto = Arc::new(MvtoManager::new(header_store, wal, None));
        let index: Arc<dyn OrderedIndex<u64>> = Arc::new(BTreeMapIndex::new());

        for k in 0..1000u64 {
            let ctx = mvto.begin();
            InsertExecutor::new(index.clone(), heap.clone(), mvto.clone(), k, k.to_le_bytes().to_vec())
                .execute(&ctx)
                .unwrap();
            mvto.commit(&ctx).unwrap();
        }

        let reader = mvto.begin();
        let scan = TableScanExecutor::new(index, heap, mvto);
        let rows = scan.execute(&reader).unwrap();
        assert_eq!(rows.len(), 1000);
        for (i, (k, v)) in rows.iter().enumerate() {
            assert_eq!(*k, i as u64);
            assert_eq!(*v, (i as u64).to_le_bytes().to_vec());
        }
    }
}
