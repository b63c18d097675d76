//! Multi-version timestamp-ordering concurrency control: the visibility
//! rule, the ownership-acquisition protocol, and the commit/abort lifecycle.

use crate::common::{Timestamp, TransactionId, TuplePointer, INITIAL_TXN_ID};
use crate::error::{Result, SpitfireError};
use crate::txn::context::{RollbackAction, TransactionContext, TransactionResult, WriteSetEntry};
use crate::txn::header::TupleHeader;
use crate::txn::header_store::TupleHeaderStore;
use crate::wal::WalWriter;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// How a version at `ctx.read_ts` reads, per the visibility rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Ok,
    Deleted,
    Invisible,
    Invalid,
}

/// A racing installer can leave a version in `INVISIBLE` with
/// `transaction_id = INITIAL_TXN_ID` briefly; scans retry a bounded number
/// of times before giving up.
const SCAN_RETRY_LIMIT: u32 = 5;

pub struct MvtoManager {
    next_tid: AtomicU64,
    next_cid: AtomicU64,
    active: DashMap<TransactionId, Arc<TransactionContext>>,
    header_store: Arc<TupleHeaderStore>,
    wal: Arc<WalWriter>,
}

impl MvtoManager {
    /// `resume_from` carries the last persisted `(max_tid, max_cid)` from
    /// the database meta page on restart, so freshly begun transactions get
    /// ids strictly greater than anything recorded before the shutdown.
    pub fn new(header_store: Arc<TupleHeaderStore>, wal: Arc<WalWriter>, resume_from: Option<(TransactionId, Timestamp)>) -> Self {
        let (tid_floor, cid_floor) = resume_from.unwrap_or((INITIAL_TXN_ID, 0));
        Self {
            next_tid: AtomicU64::new(tid_floor + 1),
            next_cid: AtomicU64::new(cid_floor + 1),
            active: DashMap::new(),
            header_store,
            wal,
        }
    }

    fn next_tid(&self) -> TransactionId {
        self.next_tid.fetch_add(1, Ordering::SeqCst)
    }

    fn next_cid(&self) -> Timestamp {
        self.next_cid.fetch_add(1, Ordering::SeqCst)
    }

    pub fn begin(&self) -> Arc<TransactionContext> {
        let tid = self.next_tid();
        let read_ts = self.next_cid();
        let ctx = Arc::new(TransactionContext::new(tid, read_ts));
        self.active.insert(tid, ctx.clone());
        ctx
    }

    pub fn lookup(&self, tid: TransactionId) -> Option<Arc<TransactionContext>> {
        self.active.get(&tid).map(|e| e.clone())
    }

    /// Fetch a header without any visibility check or read-timestamp bump,
    /// for callers (the executors) that need to inspect it before deciding
    /// which MVTO operation to perform.
    pub fn get_header(&self, ptr: TuplePointer) -> Result<TupleHeader> {
        self.header_store.get(ptr)
    }

    /// Append a brand-new version's header, independent of the
    /// ownership-acquisition protocol. Used by the insert executor, which
    /// has no predecessor to acquire ownership of.
    pub fn insert_version(&self, header: &TupleHeader) -> Result<TuplePointer> {
        self.header_store.insert_hard_header(header)
    }

    /// The visibility rule for a version under `ctx`.
    pub fn visibility(&self, header: &TupleHeader, ctx: &TransactionContext) -> Visibility {
        if header.end_cid < header.begin_cid && header.end_cid != 0 {
            return Visibility::Invalid;
        }
        let owned_or_free = header.transaction_id == 0 || header.transaction_id == ctx.tid;
        if owned_or_free && header.begin_cid <= ctx.read_ts && ctx.read_ts < header.end_cid {
            return if header.deleted { Visibility::Deleted } else { Visibility::Ok };
        }
        Visibility::Invisible
    }

    /// Read a header, applying the CAS-loop `read_ts` bump and, if
    /// `acquire_owner`, the ownership CAS from the ownership protocol.
    /// Returns `WriteConflict` if another transaction already owns it.
    pub fn perform_read(&self, ctx: &TransactionContext, ptr: TuplePointer, acquire_owner: bool) -> Result<TupleHeader> {
        let (outcome, header) = self.header_store.with_header_mut(ptr, |h| {
            let visibility_ok = (h.transaction_id == 0 || h.transaction_id == ctx.tid)
                && h.begin_cid <= ctx.read_ts
                && ctx.read_ts < h.end_cid;
            if !visibility_ok {
                return false;
            }
            h.read_ts = h.read_ts.max(ctx.read_ts);
            if acquire_owner {
                if h.transaction_id != 0 && h.transaction_id != ctx.tid {
                    return false;
                }
                h.transaction_id = ctx.tid;
            }
            true
        })?;
        if !outcome {
            return Err(SpitfireError::WriteConflict(ptr));
        }
        if !acquire_owner {
            ctx.record_read(ptr);
        }
        Ok(header)
    }

    /// Read the version at `ptr` as it reads to `ctx`, walking the version
    /// chain via `next_version_ptr` toward older versions when the one at
    /// `ptr` is not yet visible — either because it's still owned by
    /// another in-flight transaction or because it committed after `ctx`
    /// began. A version observed `INVISIBLE` with `transaction_id =
    /// INITIAL_TXN_ID` and an already-closed validity interval may be
    /// mid-install by a racing writer rather than genuinely superseded, so
    /// that specific case is retried in place a bounded number of times
    /// before the walk moves on to its predecessor.
    pub fn scan_read(&self, ctx: &TransactionContext, ptr: TuplePointer) -> Result<Option<TupleHeader>> {
        let mut current = ptr;
        loop {
            let mut header = self.header_store.get(current)?;
            let mut visibility = self.visibility(&header, ctx);
            let mut retries = 0;
            while visibility == Visibility::Invisible
                && header.transaction_id == INITIAL_TXN_ID
                && header.end_cid <= ctx.read_ts
            {
                if retries >= SCAN_RETRY_LIMIT {
                    return Err(SpitfireError::NoVisibleVersion(current));
                }
                std::thread::yield_now();
                header = self.header_store.get(current)?;
                visibility = self.visibility(&header, ctx);
                retries += 1;
            }
            match visibility {
                Visibility::Ok => {
                    ctx.record_read(current);
                    return Ok(Some(header));
                }
                Visibility::Deleted => return Ok(None),
                Visibility::Invalid => {
                    return Err(SpitfireError::InvariantViolation(format!("malformed header at {current}")))
                }
                Visibility::Invisible => match header.next_version_ptr {
                    Some(older) => current = older,
                    None => return Ok(None),
                },
            }
        }
    }

    /// Acquire ownership of the version at `ptr` (steps 1-2 of the
    /// ownership protocol) and create its successor (steps 3-5), recording
    /// a rollback action that restores `key`'s index entry to `ptr` on
    /// abort.
    pub fn acquire_for_update(
        &self,
        ctx: &TransactionContext,
        ptr: TuplePointer,
        row_id: u64,
        new_body: TuplePointer,
        key: Vec<u8>,
        tombstone: bool,
    ) -> Result<TuplePointer> {
        let owned_header = self.perform_read(ctx, ptr, true)?;
        let new_header = if tombstone {
            TupleHeader::new_tombstone(row_id, ctx.tid, new_body, Some(ptr))
        } else {
            TupleHeader::new_version(row_id, ctx.tid, new_body, Some(ptr))
        };
        let new_ptr = self.header_store.insert_hard_header(&new_header)?;
        let _ = owned_header;
        ctx.record_write(
            WriteSetEntry {
                predecessor: ptr,
                new_version: new_ptr,
            },
            RollbackAction::ReinstateIndexEntry {
                key,
                saved_bytes: encode_ptr(ptr),
            },
        );
        Ok(new_ptr)
    }

    /// Record a fresh insert's rollback action (deleting the newly created
    /// index entry on abort) without touching a predecessor.
    pub fn record_insert(&self, ctx: &TransactionContext, new_version: TuplePointer, key: Vec<u8>) {
        ctx.record_write(
            WriteSetEntry {
                predecessor: new_version,
                new_version,
            },
            RollbackAction::DeleteIndexEntry { key },
        );
    }

    /// Validate the write set, install validity-interval endpoints, release
    /// ownership, and append the commit record.
    pub fn commit(&self, ctx: &Arc<TransactionContext>) -> Result<TransactionResult> {
        let write_set = ctx.write_set.lock().clone();

        for entry in &write_set {
            let predecessor = self.header_store.get(entry.predecessor)?;
            if predecessor.read_ts > ctx.read_ts {
                return self.abort(ctx);
            }
        }

        let commit_ts = self.next_cid();
        *ctx.commit_ts.lock() = Some(commit_ts);

        for entry in &write_set {
            if entry.predecessor.page_id != entry.new_version.page_id
                || entry.predecessor.slot != entry.new_version.slot
            {
                self.header_store.with_header_mut(entry.predecessor, |h| {
                    h.end_cid = commit_ts;
                })?;
            }
            self.header_store.with_header_mut(entry.new_version, |h| {
                h.transaction_id = 0;
                h.begin_cid = commit_ts;
            })?;
        }

        self.wal.append_commit(ctx.tid, commit_ts)?;
        *ctx.result.lock() = TransactionResult::Success;
        self.active.remove(&ctx.tid);
        Ok(TransactionResult::Success)
    }

    /// Invoke every recorded rollback action in reverse order, release
    /// ownership of every version this transaction touched, and mark the
    /// context aborted.
    pub fn abort(&self, ctx: &Arc<TransactionContext>) -> Result<TransactionResult> {
        let write_set = ctx.write_set.lock().clone();
        for entry in write_set.iter().rev() {
            self.header_store.with_header_mut(entry.predecessor, |h| {
                if h.transaction_id == ctx.tid {
                    h.transaction_id = 0;
                }
            })?;
            if entry.new_version.page_id != entry.predecessor.page_id
                || entry.new_version.slot != entry.predecessor.slot
            {
                self.header_store.with_header_mut(entry.new_version, |h| {
                    h.transaction_id = 0;
                    h.end_cid = 0;
                })?;
            }
        }
        *ctx.result.lock() = TransactionResult::Aborted;
        self.active.remove(&ctx.tid);
        Ok(TransactionResult::Aborted)
    }
}

fn encode_ptr(ptr: TuplePointer) -> Vec<u8> {
    let mut bytes = ptr.page_id.to_le_bytes().to_vec();
    bytes.extend_from_slice(&ptr.slot.to_le_bytes());
    bytes
}
