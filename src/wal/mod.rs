//! The write-ahead log shared by the buffer manager (`PAGE_IMAGE` records,
//! written before a dirty page reaches SSD) and the MVTO manager (`COMMIT`
//! records, written directly at commit time).
//!
//! Record layout on disk: `{u32 length, u8 type, u64 lsn, payload, u32
//! crc}`. `length` covers the whole record including itself, so a reader
//! can skip unknown or corrupt records without re-deriving their size from
//! the payload.

use crate::common::{LogSequenceNumber, PageId, TransactionId, Timestamp};
use crate::error::{Result, SpitfireError};
use crate::storage::hardware_crc32c;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LogRecordType {
    PageImage = 1,
    Commit = 2,
}

impl LogRecordType {
    fn from_u8(tag: u8) -> Result<Self> {
        match tag {
            1 => Ok(LogRecordType::PageImage),
            2 => Ok(LogRecordType::Commit),
            other => Err(SpitfireError::WalCorruption(0, format!("unknown record type {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecord {
    PageImage {
        pid: PageId,
        lsn: LogSequenceNumber,
        bytes: Vec<u8>,
    },
    Commit {
        tid: TransactionId,
        lsn: LogSequenceNumber,
        commit_ts: Timestamp,
    },
}

impl LogRecord {
    fn lsn(&self) -> LogSequenceNumber {
        match self {
            LogRecord::PageImage { lsn, .. } => *lsn,
            LogRecord::Commit { lsn, .. } => *lsn,
        }
    }

    fn record_type(&self) -> LogRecordType {
        match self {
            LogRecord::PageImage { .. } => LogRecordType::PageImage,
            LogRecord::Commit { .. } => LogRecordType::Commit,
        }
    }

    fn payload(&self) -> Vec<u8> {
        match self {
            LogRecord::PageImage { pid, bytes, .. } => {
                let mut buf = Vec::with_capacity(8 + bytes.len());
                buf.extend_from_slice(&pid.to_le_bytes());
                buf.extend_from_slice(bytes);
                buf
            }
            LogRecord::Commit { tid, commit_ts, .. } => {
                let mut buf = Vec::with_capacity(16);
                buf.extend_from_slice(&tid.to_le_bytes());
                buf.extend_from_slice(&commit_ts.to_le_bytes());
                buf
            }
        }
    }

    fn decode(record_type: LogRecordType, lsn: LogSequenceNumber, payload: &[u8]) -> Result<Self> {
        match record_type {
            LogRecordType::PageImage => {
                if payload.len() < 8 {
                    return Err(SpitfireError::WalCorruption(lsn, "short PAGE_IMAGE payload".into()));
                }
                let pid = u64::from_le_bytes(payload[0..8].try_into().unwrap());
                Ok(LogRecord::PageImage {
                    pid,
                    lsn,
                    bytes: payload[8..].to_vec(),
                })
            }
            LogRecordType::Commit => {
                if payload.len() != 16 {
                    return Err(SpitfireError::WalCorruption(lsn, "malformed COMMIT payload".into()));
                }
                let tid = u64::from_le_bytes(payload[0..8].try_into().unwrap());
                let commit_ts = u64::from_le_bytes(payload[8..16].try_into().unwrap());
                Ok(LogRecord::Commit { tid, lsn, commit_ts })
            }
        }
    }

    fn encode(&self) -> Vec<u8> {
        let payload = self.payload();
        // length | type | lsn | payload | crc
        let header_len = 4 + 1 + 8;
        let total_len = header_len + payload.len() + 4;
        let mut buf = Vec::with_capacity(total_len);
        buf.extend_from_slice(&(total_len as u32).to_le_bytes());
        buf.push(self.record_type() as u8);
        buf.extend_from_slice(&self.lsn().to_le_bytes());
        buf.extend_from_slice(&payload);
        let crc = hardware_crc32c(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        buf
    }
}

/// Append-only WAL writer. Every `append_*` call fsyncs before returning,
/// matching the synchronous-commit design: a transaction's commit record
/// (or a dirty page's PAGE_IMAGE) is durable by the time the call returns.
pub struct WalWriter {
    file: Mutex<File>,
    next_lsn: AtomicU64,
}

impl WalWriter {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        std::fs::create_dir_all(&dir)?;
        let path = dir.as_ref().join("wal.log");
        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)?;

        let next_lsn = Self::scan_max_lsn(&mut file)?.map(|l| l + 1).unwrap_or(1);

        Ok(Self {
            file: Mutex::new(file),
            next_lsn: AtomicU64::new(next_lsn),
        })
    }

    fn scan_max_lsn(file: &mut File) -> Result<Option<LogSequenceNumber>> {
        file.seek(SeekFrom::Start(0))?;
        let mut max_lsn = None;
        for record in Self::read_all_from(file)? {
            max_lsn = Some(max_lsn.map_or(record.lsn(), |m: LogSequenceNumber| m.max(record.lsn())));
        }
        Ok(max_lsn)
    }

    fn read_all_from(file: &mut File) -> Result<Vec<LogRecord>> {
        let mut bytes = Vec::new();
        file.seek(SeekFrom::Start(0))?;
        file.read_to_end(&mut bytes)?;
        let mut records = Vec::new();
        let mut offset = 0usize;
        while offset + 13 <= bytes.len() {
            let total_len = u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap()) as usize;
            if total_len < 13 || offset + total_len > bytes.len() {
                break; // torn write at the tail; stop replay here.
            }
            let record_bytes = &bytes[offset..offset + total_len];
            let (body, crc_bytes) = record_bytes.split_at(total_len - 4);
            let expected_crc = u32::from_le_bytes(crc_bytes.try_into().unwrap());
            let actual_crc = hardware_crc32c(body);
            if actual_crc != expected_crc {
                break; // torn write; everything after this is untrustworthy.
            }
            let record_type = LogRecordType::from_u8(body[4])?;
            let lsn = u64::from_le_bytes(body[5..13].try_into().unwrap());
            let payload = &body[13..];
            records.push(LogRecord::decode(record_type, lsn, payload)?);
            offset += total_len;
        }
        Ok(records)
    }

    fn append(&self, record: LogRecord) -> Result<()> {
        let bytes = record.encode();
        let mut file = self.file.lock();
        file.write_all(&bytes)?;
        file.sync_data()?;
        Ok(())
    }

    pub fn next_lsn(&self) -> LogSequenceNumber {
        self.next_lsn.fetch_add(1, Ordering::SeqCst)
    }

    pub fn append_page_image(&self, pid: PageId, lsn: LogSequenceNumber, bytes: Vec<u8>) -> Result<()> {
        self.append(LogRecord::PageImage { pid, lsn, bytes })
    }

    pub fn append_commit(&self, tid: TransactionId, commit_ts: Timestamp) -> Result<LogSequenceNumber> {
        let lsn = self.next_lsn();
        self.append(LogRecord::Commit { tid, lsn, commit_ts })?;
        Ok(lsn)
    }

    /// Replays every well-formed record currently on disk, in LSN order.
    /// Used by recovery and by tests asserting durability.
    pub fn read_all(&self) -> Result<Vec<LogRecord>> {
        let mut file = self.file.lock();
        let mut records = Self::read_all_from(&mut file)?;
        records.sort_by_key(LogRecord::lsn);
        Ok(records)
    }
}
