//! Scan delete: an ordered index scan driving a point delete per matching
//! row, stopping early once a predicate says so.

use crate::error::{Result, SpitfireError};
use crate::executors::{encode_key, fail, Executor};
use crate::index::OrderedIndex;
use crate::txn::{MvtoManager, TransactionContext, Visibility};
use std::ops::Bound;
use std::sync::Arc;

pub struct ScanDeleteExecutor<K> {
    index: Arc<dyn OrderedIndex<K>>,
    mvto: Arc<MvtoManager>,
    start: Bound<K>,
    end: Bound<K>,
    continue_while: Box<dyn Fn(&K) -> bool + Send + Sync>,
}

impl<K> ScanDeleteExecutor<K>
where
    K: Ord + Clone + Send + Sync + serde::Serialize,
{
    pub fn new(
        index: Arc<dyn OrderedIndex<K>>,
        mvto: Arc<MvtoManager>,
        start: Bound<K>,
        end: Bound<K>,
        continue_while: impl Fn(&K) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            index,
            mvto,
            start,
            end,
            continue_while: Box::new(continue_while),
        }
    }
}

impl<K> Executor for ScanDeleteExecutor<K>
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

            let key_bytes = encode_key(&key)?;
            match self
                .mvto
                .acquire_for_update(ctx, ptr, header.row_id, header.body, key_bytes, true)
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
