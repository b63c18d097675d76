//! Transaction context and the rollback log.
//!
//! Rollback actions are represented as a small tagged variant rather than
//! arbitrary closures, so abort is deterministic and doesn't need to carry
//! `Box<dyn FnOnce>` through the active-transaction table.

use crate::common::{Timestamp, TransactionId, TuplePointer};
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionResult {
    InProgress,
    Success,
    Failure,
    Aborted,
}

/// What to undo if the transaction that performed it aborts.
#[derive(Debug, Clone)]
pub enum RollbackAction {
    /// Point the index entry for `key` back at `saved_bytes` (the
    /// previously indexed `TuplePointer`, encoded by the caller).
    ReinstateIndexEntry { key: Vec<u8>, saved_bytes: Vec<u8> },
    /// Remove the index entry created for `key` by this transaction's insert.
    DeleteIndexEntry { key: Vec<u8> },
    Noop,
}

/// One entry in a transaction's write set: the predecessor header this
/// transaction's new version supersedes, paired with the new version's own
/// pointer so `commit` can install both validity-interval endpoints.
#[derive(Debug, Clone, Copy)]
pub struct WriteSetEntry {
    pub predecessor: TuplePointer,
    pub new_version: TuplePointer,
}

pub struct TransactionContext {
    pub tid: TransactionId,
    pub read_ts: Timestamp,
    pub commit_ts: Mutex<Option<Timestamp>>,
    pub result: Mutex<TransactionResult>,
    pub read_set: Mutex<Vec<TuplePointer>>,
    pub write_set: Mutex<Vec<WriteSetEntry>>,
    pub rollback_log: Mutex<Vec<RollbackAction>>,
}

impl TransactionContext {
    pub fn new(tid: TransactionId, read_ts: Timestamp) -> Self {
        Self {
            tid,
            read_ts,
            commit_ts: Mutex::new(None),
            result: Mutex::new(TransactionResult::InProgress),
            read_set: Mutex::new(Vec::new()),
            write_set: Mutex::new(Vec::new()),
            rollback_log: Mutex::new(Vec::new()),
        }
    }

    pub fn result(&self) -> TransactionResult {
        *self.result.lock()
    }

    pub fn record_read(&self, ptr: TuplePointer) {
        self.read_set.lock().push(ptr);
    }

    pub fn record_write(&self, entry: WriteSetEntry, rollback: RollbackAction) {
        self.write_set.lock().push(entry);
        self.rollback_log.lock().push(rollback);
    }
}
