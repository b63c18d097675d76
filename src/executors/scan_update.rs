//! Scan update: an ordered index scan driving a point update per matching
//! row, stopping early once a predicate says so.

use crate::error::{Result, SpitfireError};
use crate::executors::{encode_key, fail, Executor};
use crate::heap::RecordStore;
use crate::index::OrderedIndex;
use crate::txn::{MvtoManager, TransactionContext, Visibility};
use std::ops::Bound;
use std::sync::Arc;

pub struct ScanUpdateExecutor<K> {
    index: Arc<dyn OrderedIndex<K>>,
    heap: Arc<dyn RecordStore>,
    mvto: Arc<MvtoManager>,
    start: Bound<K>,
    end: Bound<K>,
    /// Called with each key in ascending order before it's touched; `false`
    /// ends the scan without visiting that key or anything after it.
    continue_while: Box<dyn Fn(&K) -> bool + Send + Sync>,
    apply: Box<dyn Fn(&[u8]) -> Vec<u8> + Send + Sync>,
}

impl<K> ScanUpdateExecutor<K>
where
    K: Ord + Clone + Send + Sync + serde::Serialize,
{
    pub fn new(
        index: Arc<dyn OrderedIndex<K>>,
        heap: Arc<dyn RecordStore>,
        mvto: Arc<MvtoManager>,
        start: Bound<K>,
        end: Bound<K>,
        continue_while: impl Fn(&K) -> bool + Send + Sync + 'static,
        apply: impl Fn(&[u8]) -> Vec<u8> + Send + Sync + 'static,
    ) -> Self {
        Self {
            index,
            heap,
            mvto,
            start,
            end,
            continue_while: Box::new(continue_while),
            apply: Box::new(apply),
        }
    }
}

impl<K> Executor for ScanUpdateExecutor<K>
where
    K: Ord + Clone + Send + Sync + serde::Serialize,
{
    fn execute(&self, ctx: &Arc<TransactionContext>) -> Result<bool> {
        for (key, ptr) in self.index.range(self.start.clone(), self.end.clone()) {
            if !(self.continue_while)(&key) {
                break;
            }
            let header = self.mvto.get_header(ptr)?;
            match self.mvto.visibility(&header, ctx) {
                Visibility::Ok => {}
                Visibility::Deleted | Visibility::Invisible | Visibility::Invalid => continue,
            }

            let old_bytes = self.heap.get(header.body)?;
            let new_bytes = (self.apply)(&old_bytes);
            let new_body = self.heap.insert(&new_bytes)?;
            let key_bytes = encode_key(&key)?;

            match self
                .mvto
                .acquire_for_update(ctx, ptr, header.row_id, new_body, key_bytes, false)
            {
                Ok(new_ptr) => {
                    self.index.update(&key, new_ptr)?;
                }
                Err(SpitfireError::WriteConflict(_)) => return fail(ctx),
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }
}
