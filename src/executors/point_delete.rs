//! Point delete: lookup-for-update on the index, check visibility, acquire
//! ownership, create a tombstone version. The tombstone keeps the deleted
//! row's body pointer so the version chain stays walkable for readers
//! below the delete.

use crate::error::{Result, SpitfireError};
use crate::executors::{encode_key, fail, Executor};
use crate::heap::RecordStore;
use crate::index::OrderedIndex;
use crate::txn::{MvtoManager, TransactionContext, Visibility};
use std::sync::Arc;

pub struct PointDeleteExecutor<K> {
    index: Arc<dyn OrderedIndex<K>>,
    mvto: Arc<MvtoManager>,
    key: K,
}

impl<K> PointDeleteExecutor<K>
where
    K: Ord + Clone + Send + Sync + serde::Serialize,
{
    pub fn new(index: Arc<dyn OrderedIndex<K>>, mvto: Arc<MvtoManager>, key: K) -> Self {
        Self { index, mvto, key }
    }
}

impl<K> Executor for PointDeleteExecutor<K>
where
    K: Ord + Clone + Send + Sync + serde::Serialize,
{
    fn execute(&self, ctx: &Arc<TransactionContext>) -> Result<bool> {
        let Some(ptr) = self.index.get(&self.key) else {
            return fail(ctx);
        };
        let header = self.mvto.get_header(ptr)?;
        match self.mvto.visibility(&header, ctx) {
            Visibility::Ok => {}
            Visibility::Deleted | Visibility::Invisible | Visibility::Invalid => return fail(ctx),
        }

        let key_bytes = encode_key(&self.key)?;
        match self
            .mvto
            .acquire_for_update(ctx, ptr, header.row_id, header.body, key_bytes, true)
        {
            Ok(new_ptr) => {
                self.index.update(&self.key, new_ptr)?;
                Ok(true)
            }
            Err(SpitfireError::WriteConflict(_)) => fail(ctx),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferManager;
    use crate::config::EngineConfigBuilder;
    use crate::executors::InsertExecutor;
    use crate::heap::{PartitionedHeap, RecordStore};
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
    fn delete_then_read_sees_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let (index, heap, mvto) = fixtures(dir.path());

        let ctx = mvto.begin();
        InsertExecutor::new(index.clone(), heap.clone(), mvto.clone(), 1u64, b"row".to_vec())
            .execute(&ctx)
            .unwrap();
        mvto.commit(&ctx).unwrap();

        let ctx2 = mvto.begin();
        assert!(PointDeleteExecutor::new(index.clone(), mvto.clone(), 1u64).execute(&ctx2).unwrap());
        mvto.commit(&ctx2).unwrap();

        let reader = mvto.begin();
        let ptr = index.get(&1).unwrap();
        let header = mvto.get_header(ptr).unwrap();
        assert_eq!(mvto.visibility(&header, &reader), Visibility::Deleted);
    }

    #[test]
    fn delete_then_insert_resurrects_the_slot() {
        let dir = tempfile::tempdir().unwrap();
        let (index, heap, mvto) = fixtures(dir.path());

        let ctx = mvto.begin();
        InsertExecutor::new(index.clone(), heap.clone(), mvto.clone(), 1u64, b"row-1".to_vec())
            .execute(&ctx)
            .unwrap();
        mvto.commit(&ctx).unwrap();

        let ctx2 = mvto.begin();
        PointDeleteExecutor::new(index.clone(), mvto.clone(), 1u64).execute(&ctx2).unwrap();
        mvto.commit(&ctx2).unwrap();

        let ctx3 = mvto.begin();
        assert!(InsertExecutor::new(index.clone(), heap.clone(), mvto.clone(), 1u64, b"row-2".to_vec())
            .execute(&ctx3)
            .unwrap());
        mvto.commit(&ctx3).unwrap();

        let reader = mvto.begin();
        let ptr = index.get(&1).unwrap();
        let header = mvto.get_header(ptr).unwrap();
        assert_eq!(mvto.visibility(&header, &reader), Visibility::Ok);
        assert_eq!(heap.get(header.body).unwrap(), b"row-2");
    }
}
