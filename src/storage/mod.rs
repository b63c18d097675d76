//! The SSD tier: page file management, the slotted page layout, and
//! checksums. Everything above this module works in terms of [`Page`] and
//! [`PageId`]; only [`disk::SsdPageManager`] touches the filesystem.

pub mod checksum;
pub mod disk;
pub mod page;

pub use checksum::hardware_crc32c;
pub use disk::{DiskStats, SsdPageManager, METADATA_PID};
pub use page::{Page, PAGE_HEADER_SIZE};

pub use crate::common::PageId;
