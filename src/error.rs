use thiserror::Error;

/// Crate-wide error type.
///
/// Variants map onto the failure modes named in the component design: I/O on
/// the SSD page manager, structural violations in the tuple-header store and
/// MVTO manager, and the handful of places a caller can pass a bad page id,
/// key, or configuration value.
#[derive(Error, Debug)]
pub enum SpitfireError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("page not found: {0}")]
    PageNotFound(u64),

    #[error("out of space: {0}")]
    OutOfSpace(String),

    #[error("checksum mismatch on page {page_id}: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        page_id: u64,
        expected: u32,
        actual: u32,
    },

    #[error("write conflict on tuple {0:?}: writer-writer conflict under MVTO")]
    WriteConflict(crate::common::TuplePointer),

    #[error("transaction {0} aborted")]
    TransactionAborted(u64),

    #[error("transaction {0} not found or already finished")]
    TransactionNotFound(u64),

    #[error("no visible version for tuple {0:?} at the requesting transaction's read timestamp")]
    NoVisibleVersion(crate::common::TuplePointer),

    #[error("key not found")]
    KeyNotFound,

    #[error("duplicate key")]
    DuplicateKey,

    #[error("WAL record corrupt at offset {0}: {1}")]
    WalCorruption(u64, String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("latch poisoned: {0}")]
    PoisonedLatch(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("allocator error: {0}")]
    Allocator(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

pub type Result<T> = std::result::Result<T, SpitfireError>;

impl From<bincode::error::EncodeError> for SpitfireError {
    fn from(e: bincode::error::EncodeError) -> Self {
        SpitfireError::Serialization(e.to_string())
    }
}

impl From<bincode::error::DecodeError> for SpitfireError {
    fn from(e: bincode::error::DecodeError) -> Self {
        SpitfireError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for SpitfireError {
    fn from(e: serde_json::Error) -> Self {
        SpitfireError::Serialization(e.to_string())
    }
}
