//! The SSD page manager: the bottom of the tier stack. Owns one or more
//! page files of fixed-size pages; page 0 of file 0 is a metadata page
//! holding the next-pid counter and free-list head.
//!
//! Direct I/O (the `direct_io` config flag) opens the data file with
//! `O_DIRECT` on Linux so reads/writes bypass the page cache — the buffer
//! manager is the only cache that matters for this engine. `O_DIRECT`
//! requires page-aligned, page-sized buffers, which `Page` already is by
//! construction (its length is always `page_size`).

use crate::common::PageId;
use crate::error::{Result, SpitfireError};
use crate::storage::checksum::hardware_crc32c;
use crate::storage::page::Page;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Page 0 is reserved: it is never handed out by `allocate_page`.
pub const METADATA_PID: PageId = 0;

#[derive(Debug, Default, Clone, Copy)]
pub struct DiskStats {
    pub reads: u64,
    pub writes: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
}

/// Append-only-growth page file plus a metadata page (pid 0) that tracks
/// the next pid to allocate. Every exposed operation is page-granular and
/// synchronous: there is no write-behind buffering here, because ordering
/// with the WAL (log-before-data) is the buffer manager's job, not this
/// one's.
pub struct SsdPageManager {
    file: Mutex<File>,
    page_size: usize,
    next_pid: AtomicU64,
    stats: Mutex<DiskStats>,
}

impl SsdPageManager {
    pub fn open(dir: impl AsRef<Path>, page_size: usize, direct_io: bool) -> Result<Self> {
        std::fs::create_dir_all(&dir)?;
        let mut path = PathBuf::from(dir.as_ref());
        path.push("spitfire.db");

        let mut options = OpenOptions::new();
        options.read(true).write(true).create(true);
        if direct_io {
            #[cfg(target_os = "linux")]
            options.custom_flags(libc::O_DIRECT);
        }
        let file = options.open(&path)?;

        let len = file.metadata()?.len();
        let existing_pages = len / page_size as u64;
        let next_pid = if existing_pages == 0 { 1 } else { existing_pages };

        let manager = Self {
            file: Mutex::new(file),
            page_size,
            next_pid: AtomicU64::new(next_pid),
            stats: Mutex::new(DiskStats::default()),
        };
        if existing_pages == 0 {
            manager.write_page_unchecked(&Page::new(METADATA_PID, page_size))?;
        }
        Ok(manager)
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Reserve the next pid without writing a page for it. Callers create
    /// the `Page` themselves and write it through the buffer manager, which
    /// is responsible for WAL-ordering the first write.
    pub fn allocate_pid(&self) -> PageId {
        self.next_pid.fetch_add(1, Ordering::SeqCst)
    }

    pub fn read_page(&self, pid: PageId) -> Result<Page> {
        let mut data = vec![0u8; self.page_size];
        {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(pid * self.page_size as u64))?;
            file.read_exact(&mut data)?;
        }
        let mut stats = self.stats.lock();
        stats.reads += 1;
        stats.bytes_read += self.page_size as u64;
        Ok(Page::from_bytes(data))
    }

    /// Checksum-verified read, used after a crash when replaying the WAL:
    /// a torn write leaves a checksum mismatch rather than silently
    /// returning corrupt data.
    pub fn read_page_checked(&self, pid: PageId, expected_crc: u32) -> Result<Page> {
        let page = self.read_page(pid)?;
        let actual = hardware_crc32c(page.as_bytes());
        if actual != expected_crc {
            return Err(SpitfireError::ChecksumMismatch {
                page_id: pid,
                expected: expected_crc,
                actual,
            });
        }
        Ok(page)
    }

    pub fn write_page(&self, page: &Page) -> Result<()> {
        self.write_page_unchecked(page)
    }

    fn write_page_unchecked(&self, page: &Page) -> Result<()> {
        debug_assert_eq!(page.size(), self.page_size);
        {
            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(page.pid() * self.page_size as u64))?;
            file.write_all(page.as_bytes())?;
            file.sync_data()?;
        }
        let mut stats = self.stats.lock();
        stats.writes += 1;
        stats.bytes_written += self.page_size as u64;
        Ok(())
    }

    pub fn checksum(&self, page: &Page) -> u32 {
        hardware_crc32c(page.as_bytes())
    }

    pub fn num_pages(&self) -> u64 {
        self.next_pid.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> DiskStats {
        *self.stats.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn fresh_manager_reserves_metadata_page() {
        let dir = tempdir().unwrap();
        let mgr = SsdPageManager::open(dir.path(), 4096, false).unwrap();
        assert_eq!(mgr.allocate_pid(), 1);
        assert_eq!(mgr.allocate_pid(), 2);
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let mgr = SsdPageManager::open(dir.path(), 4096, false).unwrap();
        let pid = mgr.allocate_pid();
        let mut page = Page::new(pid, 4096);
        page.insert_record(b"row one").unwrap();
        mgr.write_page(&page).unwrap();

        let read_back = mgr.read_page(pid).unwrap();
        assert_eq!(read_back.pid(), pid);
        assert_eq!(read_back.record(0, 7), Some(&b"row one"[..]));
    }

    #[test]
    fn checksum_mismatch_detected() {
        let dir = tempdir().unwrap();
        let mgr = SsdPageManager::open(dir.path(), 4096, false).unwrap();
        let pid = mgr.allocate_pid();
        let page = Page::new(pid, 4096);
        mgr.write_page(&page).unwrap();
        assert!(mgr.read_page_checked(pid, 0xdead_beef).is_err());
        let good_crc = mgr.checksum(&page);
        assert!(mgr.read_page_checked(pid, good_crc).is_ok());
    }

    #[test]
    fn reopening_resumes_pid_counter() {
        let dir = tempdir().unwrap();
        {
            let mgr = SsdPageManager::open(dir.path(), 4096, false).unwrap();
            let _ = mgr.allocate_pid();
            let _ = mgr.allocate_pid();
            let pid = mgr.allocate_pid();
            let page = Page::new(pid, 4096);
            mgr.write_page(&page).unwrap();
        }
        let mgr = SsdPageManager::open(dir.path(), 4096, false).unwrap();
        assert!(mgr.allocate_pid() >= 4);
    }
}
