//! Insert: CAS-insert into the index predicated on no visible row. If the
//! predicate trips on an existing tombstone, resurrect it in place instead
//! of reporting a duplicate key.

use crate::executors::{encode_key, fail, Executor};
use crate::heap::RecordStore;
use crate::index::OrderedIndex;
use crate::txn::{MvtoManager, TransactionContext, TupleHeader, Visibility};
use crate::common::TuplePointer;
use crate::error::Result;
use std::sync::Arc;

/// `row_id` identifies a version across the header store independent of
/// its body's physical location; derived from the body pointer so callers
/// never have to mint one themselves.
fn derive_row_id(body: TuplePointer) -> u64 {
    (body.page_id << 16) | body.slot as u64
}

pub struct InsertExecutor<K> {
    index: Arc<dyn OrderedIndex<K>>,
    heap: Arc<dyn RecordStore>,
    mvto: Arc<MvtoManager>,
    key: K,
    row: Vec<u8>,
}

impl<K> InsertExecutor<K>
where
    K: Ord + Clone + Send + Sync + serde::Serialize,
{
    pub fn new(index: Arc<dyn OrderedIndex<K>>, heap: Arc<dyn RecordStore>, mvto: Arc<MvtoManager>, key: K, row: Vec<u8>) -> Self {
        Self { index, heap, mvto, key, row }
    }
}

impl<K> Executor for InsertExecutor<K>
where
    K: Ord + Clone + Send + Sync + serde::Serialize,
{
    fn execute(&self, ctx: &Arc<TransactionContext>) -> Result<bool> {
        let body = self.heap.insert(&self.row)?;
        let row_id = derive_row_id(body);
        let header = TupleHeader::new_version(row_id, ctx.tid, body, None);
        let header_ptr = self.mvto.insert_version(&header)?;
        let key_bytes = encode_key(&self.key)?;

        match self.index.insert_if_absent(self.key.clone(), header_ptr) {
            Ok(()) => {
                self.mvto.record_insert(ctx, header_ptr, key_bytes);
                Ok(true)
            }
            Err(existing_ptr) => {
                let existing = self.mvto.get_header(existing_ptr)?;
                if self.mvto.visibility(&existing, ctx) != Visibility::Deleted {
                    return fail(ctx);
                }
                match self
                    .mvto
                    .acquire_for_update(ctx, existing_ptr, existing.row_id, body, key_bytes, false)
                {
                    Ok(new_ptr) => {
                        self.index.update(&self.key, new_ptr)?;
                        Ok(true)
                    }
                    Err(crate::error::SpitfireError::WriteConflict(_)) => fail(ctx),
                    Err(e) => Err(e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferManager;
    use crate::config::EngineConfigBuilder;
    use crate::heap::PartitionedHeap;
    use crate::index::BTreeMapIndex;
    use crate::txn::TupleHeaderStore;
    use crate::wal::WalWriter;

    fn fixtures(dir: &std::path::Path) -> (Arc<dyn OrderedIndex<u64>>, Arc<dyn RecordStore>, Arc<MvtoManager>) {
        let config = EngineConfigBuilder::new()
            .db_path(dir.join("ssd"))
            .nvm_path(dir.join("nvm"))
            .dram_buf_num_pages(16)
            .build()
            .unwrap();
        let wal = Arc::new(WalWriter::open(dir.join("wal")).unwrap());
        let buffer = Arc::new(BufferManager::new(&config, wal.clone()).unwrap());
        let header_store = Arc::new(TupleHeaderStore::new(buffer.clone()));
        let heap = Arc::new(PartitionedHeap::new(buffer));
        let mvto = Arc::new(MvtoManager::new(header_store, wal, None));
        let index: Arc<dyn OrderedIndex<u64>> = Arc::new(BTreeMapIndex::new());
        (index, heap, mvto)
    }

    #[test]
    fn insert_then_commit_is_visible_to_a_later_reader() {
        let dir = tempfile::tempdir().unwrap();
        let (index, heap, mvto) = fixtures(dir.path());

        let ctx = mvto.begin();
        let exec = InsertExecutor::new(index.clone(), heap.clone(), mvto.clone(), 1u64, b"row-a".to_vec());
        assert!(exec.execute(&ctx).unwrap());
        mvto.commit(&ctx).unwrap();

        let reader = mvto.begin();
        let ptr = index.get(&1).unwrap();
        let header = mvto.get_header(ptr).unwrap();
        assert_eq!(mvto.visibility(&header, &reader), Visibility::Ok);
        assert_eq!(heap.get(header.body).unwrap(), b"row-a");
    }

    #[test]
    fn duplicate_insert_fails_without_resurrecting_a_live_row() {
        let dir = tempfile::tempdir().unwrap();
        let (index, heap, mvto) = fixtures(dir.path());

        let ctx = mvto.begin();
        InsertExecutor::new(index.clone(), heap.clone(), mvto.clone(), 1u64, b"row-a".to_vec())
            .execute(&ctx)
            .unwrap();
        mvto.commit(&ctx).unwrap();

        let ctx2 = mvto.begin();
        let dup = InsertExecutor::new(index.clone(), heap.clone(), mvto.clone(), 1u64, b"row-b".to_vec());
        assert!(!dup.execute(&ctx2).unwrap());
        assert_eq!(ctx2.result(), crate::txn::TransactionResult::Failure);
    }
}
