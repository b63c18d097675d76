//! Shared identifiers and small cross-cutting types used by every module:
//! buffer manager, WAL, MVTO manager, executors.
//!
//! Keeps the same "Component" lifecycle trait the rest of the engine uses
//! for `initialize` / `shutdown` / `health_check` so every long-lived
//! subsystem (buffer manager, MVTO manager, WAL writer) exposes a uniform
//! start/stop surface.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Identifies a logical page across all three tiers. Page 0 is reserved for
/// SSD file metadata (next-pid counter, free-list head).
pub type PageId = u64;

/// Sentinel for "no page" in optional page-id fields.
pub const INVALID_PID: PageId = u64::MAX;

/// Monotonically increasing transaction identifier, assigned at `begin()`.
pub type TransactionId = u64;

/// Commit-timestamp / snapshot-timestamp counter used by MVTO. Distinct
/// counter from `TransactionId` even though both are simple atomics.
pub type Timestamp = u64;

/// Write-ahead-log sequence number. Monotonic, one per log record.
pub type LogSequenceNumber = u64;

/// The transaction id reserved for "no owner" / "not yet touched" headers.
pub const INITIAL_TXN_ID: TransactionId = 0;

/// Which tier of the buffer pool a page frame currently lives in.
///
/// `Dram` always means top-tier residency. `DramMid` is the distinct case of
/// `DramDramSsd` mode's second DRAM tier: without it, a page demoted from
/// top into that middle tier would also tag as `Dram` and be indistinguishable
/// from a top-resident page, even though its address lives in the
/// descriptor's `nvm_addr` slot (the generic "middle tier" slot) rather than
/// `dram_addr`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    Dram,
    DramMid,
    Nvm,
    Ssd,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Dram => "dram",
            Tier::DramMid => "dram_mid",
            Tier::Nvm => "nvm",
            Tier::Ssd => "ssd",
        }
    }
}

/// Physical location of a tuple header: the page it lives on plus its slot
/// index within that page's header array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TuplePointer {
    pub page_id: PageId,
    pub slot: u16,
}

impl TuplePointer {
    pub const fn new(page_id: PageId, slot: u16) -> Self {
        Self { page_id, slot }
    }
}

impl std::fmt::Display for TuplePointer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.page_id, self.slot)
    }
}

/// Health status of a component, reported by `Component::health_check`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Lifecycle contract for the engine's long-lived subsystems (buffer
/// manager, MVTO manager, WAL writer). Construction wires up in-memory
/// state; `initialize` performs I/O (opening files, replaying logs) so it
/// can fail, and `shutdown` flushes and releases resources.
pub trait Component: Send + Sync {
    fn initialize(&mut self) -> Result<()>;
    fn shutdown(&mut self) -> Result<()>;
    fn health_check(&self) -> HealthStatus;
}

/// Lightweight operation counters a component can expose without
/// committing to a particular metrics backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComponentStatistics {
    pub component_name: String,
    pub total_operations: u64,
    pub failed_operations: u64,
    pub custom: HashMap<String, f64>,
}

impl ComponentStatistics {
    pub fn new(component_name: impl Into<String>) -> Self {
        Self {
            component_name: component_name.into(),
            ..Default::default()
        }
    }
}

/// Default lock-timeout-free sleep used by retry loops (e.g. the MVTO
/// ownership CAS retry in the executors) between attempts.
pub const RETRY_BACKOFF: Duration = Duration::from_micros(50);
