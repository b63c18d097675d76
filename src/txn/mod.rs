//! Tuple headers, the tuple header store, and the MVTO transaction manager.
//!
//! `MvtoManager` only ever touches tuple headers — it has no reference to
//! the index or version heap, so applying a [`context::RollbackAction`]
//! against those structures on abort is the executor's job: it owns the
//! index and calls `ctx.rollback_log` itself once `MvtoManager::abort`
//! returns.

pub mod context;
pub mod header;
pub mod header_store;
pub mod mvto;

pub use context::{RollbackAction, TransactionContext, TransactionResult, WriteSetEntry};
pub use header::{TupleHeader, CID_INFINITY};
pub use header_store::TupleHeaderStore;
pub use mvto::{MvtoManager, Visibility};
