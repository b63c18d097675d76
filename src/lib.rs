//! Spitfire — a three-tier (DRAM / NVM / SSD) buffer pool with a multi-version
//! timestamp-ordering (MVTO) transaction manager sitting on top of it.
//!
//! Module map:
//! - [`common`]: shared ids, the `Component` lifecycle trait.
//! - [`config`]: `EngineConfig`, the typed equivalent of the CLI flags.
//! - [`storage`]: SSD page manager — the bottom of the tier stack.
//! - [`memory`]: DRAM/NVM/SSD tier allocators.
//! - [`wal`]: shared write-ahead log used by both the buffer manager and the
//!   MVTO manager.
//! - [`buffer`]: the three-tier buffer manager itself.
//! - [`txn`]: tuple headers, version chains, and the MVTO manager.
//! - [`index`]: the `OrderedIndex` trait plus a reference B-tree index.
//! - [`heap`]: the `RecordStore` trait plus a reference heap table.
//! - [`executors`]: insert/update/delete/scan executors built on the above.

pub mod buffer;
pub mod common;
pub mod config;
pub mod error;
pub mod executors;
pub mod heap;
pub mod index;
pub mod memory;
pub mod storage;
pub mod txn;
pub mod wal;

pub use config::EngineConfig;
pub use error::{Result, SpitfireError};

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Installs a `tracing-subscriber` `fmt` layer reading `RUST_LOG` (falling
/// back to `info`). Never called automatically by the library — binaries
/// and tests opt in explicitly, exactly once.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt().with_env_filter(filter).init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_tracing_is_idempotent() {
        init_tracing();
        init_tracing();
    }
}
