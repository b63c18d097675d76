//! Point update: lookup-for-update on the index, check visibility, acquire
//! ownership, create the new version.

use crate::error::{Result, SpitfireError};
use crate::executors::{encode_key, fail, Executor};
use crate::heap::RecordStore;
use crate::index::OrderedIndex;
use crate::txn::{MvtoManager, TransactionContext, Visibility};
use std::sync::Arc;

pub struct PointUpdateExecutor<K> {
    index: Arc<dyn OrderedIndex<K>>,
    heap: Arc<dyn RecordStore>,
    mvto: Arc<MvtoManager>,
    key: K,
    apply: Box<dyn Fn(&[u8]) -> Vec<u8> + Send + Sync>,
}

impl<K> PointUpdateExecutor<K>
where
    K: Ord + Clone + Send + Sync + serde::Serialize,
{
    pub fn new(
        index: Arc<dyn OrderedIndex<K>>,
        heap: Arc<dyn RecordStore>,
        mvto: Arc<MvtoManager>,
        key: K,
        apply: impl Fn(&[u8]) -> Vec<u8> + Send + Sync + 'static,
    ) -> Self {
        Self {
            index,
            heap,
            mvto,
            key,
            apply: Box::new(apply),
        }
    }
}

impl<K> Executor for PointUpdateExecutor<K>
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

        let old_bytes = self.heap.get(header.body)?;
        let new_bytes = (self.apply)(&old_bytes);
        let new_body = self.heap.insert(&new_bytes)?;
        let key_bytes = encode_key(&self.key)?;

        match self
            .mvto
            .acquire_for_update(ctx, ptr, header.row_id, new_body, key_bytes, false)
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
