//! The three tier allocators (`{alloc, free, persist}`) that back the
//! buffer manager's DRAM, NVM, and SSD residency. The NVM allocator is
//! crash-safe (chunked arenas, a named root-object table, a circular
//! activation log replayed on restart); DRAM and SSD are comparatively
//! trivial wrappers.

pub mod allocator;
pub mod mini_page;
pub mod nvm;

pub use allocator::{DramAllocator, SsdAllocator, TierAllocator};
pub use mini_page::{MiniPageSlab, MINI_PAGE_SIZE};
pub use nvm::NvmAllocator;
