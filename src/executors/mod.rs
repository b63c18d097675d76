//! Executors: the layer that drives the index, the version heap, and
//! `MvtoManager` together to carry out one row-level operation under a
//! transaction.
//!
//! `MvtoManager` has no reference to the index, so every executor owns
//! both and is responsible for applying `ctx.rollback_log`'s
//! [`crate::txn::RollbackAction`]s against the index itself when `abort`
//! returns — `apply_rollback` below is the shared routine for that.
//!
//! Mutating executors (insert, point/scan update, point/scan delete)
//! implement [`Executor`]: `execute` returns `Ok(false)` and leaves
//! `ctx.result` set to `Failure` on a write-write conflict or a predicate
//! miss, `Ok(true)` on success. Reads (index scan, table scan) have no
//! conflict/failure outcome to report, so they implement [`ReadExecutor`]
//! instead and just return the visible rows.

pub mod index_scan;
pub mod insert;
pub mod point_delete;
pub mod point_update;
pub mod scan_delete;
pub mod scan_update;
pub mod table_scan;

pub use index_scan::IndexScanExecutor;
pub use insert::InsertExecutor;
pub use point_delete::PointDeleteExecutor;
pub use point_update::PointUpdateExecutor;
pub use scan_delete::ScanDeleteExecutor;
pub use scan_update::ScanUpdateExecutor;
pub use table_scan::TableScanExecutor;

use crate::common::TuplePointer;
use crate::error::Result;
use crate::index::OrderedIndex;
use crate::txn::{RollbackAction, TransactionContext, TransactionResult};
use std::sync::Arc;

/// A row-mutating operation under one transaction.
pub trait Executor {
    /// Carry out the operation. `Ok(false)` means the transaction's
    /// `result` is now `Failure` and the caller should abort; `Ok(true)`
    /// means it can proceed to commit or perform further operations.
    fn execute(&self, ctx: &Arc<TransactionContext>) -> Result<bool>;
}

/// A read-only operation that returns the rows it saw rather than a
/// success flag.
pub trait ReadExecutor<K> {
    fn execute(&self, ctx: &Arc<TransactionContext>) -> Result<Vec<(K, Vec<u8>)>>;
}

fn encode_key<K: serde::Serialize>(key: &K) -> Result<Vec<u8>> {
    Ok(bincode::serde::encode_to_vec(key, bincode::config::standard())?)
}

fn decode_key<K: for<'de> serde::Deserialize<'de>>(bytes: &[u8]) -> Result<K> {
    let (key, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
    Ok(key)
}

/// Undo every rollback action this transaction logged, in reverse order,
/// against `index`. Called by an executor (or the caller driving it) after
/// `MvtoManager::abort` returns, since `MvtoManager` itself never touches
/// the index.
pub fn apply_rollback<K>(index: &dyn OrderedIndex<K>, ctx: &TransactionContext) -> Result<()>
where
    K: Ord + Clone + Send + Sync + serde::Serialize + for<'de> serde::Deserialize<'de>,
{
    let actions = ctx.rollback_log.lock().clone();
    for action in actions.into_iter().rev() {
        match action {
            RollbackAction::Noop => {}
            RollbackAction::DeleteIndexEntry { key } => {
                let key: K = decode_key(&key)?;
                let _ = index.remove(&key);
            }
            RollbackAction::ReinstateIndexEntry { key, saved_bytes } => {
                let key: K = decode_key(&key)?;
                let ptr = decode_ptr(&saved_bytes)?;
                let _ = index.update(&key, ptr);
            }
        }
    }
    Ok(())
}

fn decode_ptr(bytes: &[u8]) -> Result<TuplePointer> {
    let page_id = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
    let slot = u16::from_le_bytes(bytes[8..10].try_into().unwrap());
    Ok(TuplePointer::new(page_id, slot))
}

/// `Ok(false)` shorthand for the common "conflict: mark failure, bail"
/// path shared by every mutating executor.
fn fail(ctx: &TransactionContext) -> Result<bool> {
    *ctx.result.lock() = TransactionResult::Failure;
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::TuplePointer;
    use crate::index::BTreeMapIndex;
    use crate::txn::TransactionContext;

    #[test]
    fn apply_rollback_deletes_inserted_key() {
        let index: BTreeMapIndex<u64> = BTreeMapIndex::new();
        index.insert_if_absent(1, TuplePointer::new(1, 0)).unwrap();
        let ctx = TransactionContext::new(1, 0);
        ctx.rollback_log.lock().push(RollbackAction::DeleteIndexEntry {
            key: encode_key(&1u64).unwrap(),
        });
        apply_rollback(&index, &ctx).unwrap();
        assert_eq!(index.get(&1), None);
    }

    #[test]
    fn apply_rollback_reinstates_previous_pointer() {
        let index: BTreeMapIndex<u64> = BTreeMapIndex::new();
        index.insert_if_absent(1, TuplePointer::new(1, 0)).unwrap();
        index.update(&1, TuplePointer::new(2, 0)).unwrap();
        let ctx = TransactionContext::new(1, 0);
        ctx.rollback_log.lock().push(RollbackAction::ReinstateIndexEntry {
            key: encode_key(&1u64).unwrap(),
            saved_bytes: {
                let mut b = 1u64.to_le_bytes().to_vec();
                b.extend_from_slice(&0u16.to_le_bytes());
                b
            },
        });
        apply_rollback(&index, &ctx).unwrap();
        assert_eq!(index.get(&1), Some(TuplePointer::new(1, 0)));
    }
}
