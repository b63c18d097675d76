//! The tuple header: per-version MVCC metadata. The primary (newest)
//! version's header lives in the indexed record; older versions' headers
//! live in the per-table version heap, linked by `next_version_ptr`.

use crate::common::{Timestamp, TransactionId, TuplePointer};
use serde::{Deserialize, Serialize};

/// Sentinel used for both `begin_cid` and `end_cid` on a version that has
/// not yet committed — "infinity" in the spec's validity-interval notation.
pub const CID_INFINITY: Timestamp = Timestamp::MAX;

/// MVCC metadata for one tuple version. `transaction_id = 0` means
/// unowned; a nonzero value is the owning transaction's id.
/// `[begin_cid, end_cid)` is the version's validity interval in
/// commit-timestamp order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TupleHeader {
    pub row_id: u64,
    pub transaction_id: TransactionId,
    pub begin_cid: Timestamp,
    pub end_cid: Timestamp,
    pub read_ts: Timestamp,
    pub next_version_ptr: Option<TuplePointer>,
    /// This version's record body, stored in the per-table version heap.
    /// A tombstone still carries the body pointer of the row it deleted, so
    /// the version chain remains walkable for readers below the delete.
    pub body: TuplePointer,
    /// Set on the version created by a delete: once committed, this is the
    /// tombstone a later reader sees in place of a live row.
    pub deleted: bool,
}

impl TupleHeader {
    /// A brand-new version created by an in-progress transaction: owned,
    /// with an unresolved validity interval.
    pub fn new_version(row_id: u64, tid: TransactionId, body: TuplePointer, next: Option<TuplePointer>) -> Self {
        Self {
            row_id,
            transaction_id: tid,
            begin_cid: CID_INFINITY,
            end_cid: CID_INFINITY,
            read_ts: 0,
            next_version_ptr: next,
            body,
            deleted: false,
        }
    }

    /// A brand-new tombstone version, otherwise identical to `new_version`.
    pub fn new_tombstone(row_id: u64, tid: TransactionId, body: TuplePointer, next: Option<TuplePointer>) -> Self {
        Self {
            deleted: true,
            ..Self::new_version(row_id, tid, body, next)
        }
    }
}

/// Fixed encoded size of a `TupleHeader` record, used by the header store to
/// size its pages' slots consistently. Generous relative to the bincode
/// encoding of seven `u64`-sized fields plus two `Option`/pointer discriminants.
pub const TUPLE_HEADER_ENCODED_SIZE: usize = 96;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_version_has_infinite_validity() {
        let h = TupleHeader::new_version(1, 7, TuplePointer::new(1, 0), None);
        assert_eq!(h.begin_cid, CID_INFINITY);
        assert_eq!(h.end_cid, CID_INFINITY);
        assert_eq!(h.transaction_id, 7);
    }
}
