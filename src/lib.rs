//! Strata - the page-oriented storage core of a disk-backed database
//!
//! Strata caches fixed-size pages in memory, decides which cached pages to evict,
//! schedules the disk I/O behind them and builds a persistent hash index entirely
//! out of cached pages.
//!
//! # Architecture
//!
//! - **Storage Layer** (`storage`): Disk I/O
//!   - `DiskManager`: Reads and writes whole pages; `FileDiskManager` and `MemoryDiskManager`
//!   - `DiskScheduler`: Background worker serving I/O requests in FIFO order
//!
//! - **Buffer Pool** (`buffer`): Memory management for database pages
//!   - `BufferPoolManager`: Fetches pages from disk and caches them in memory
//!   - `LruKReplacer`: LRU-K page replacement policy
//!   - `FrameHeader`: Per-frame metadata and data storage
//!   - `BasicPageGuard`/`ReadPageGuard`/`WritePageGuard`: RAII guards for pinned pages
//!
//! - **Index** (`index`): Disk extendible hash table
//!   - `DiskExtendibleHashTable`: header -> directory -> bucket pages
//!   - `HashTableHeaderPage`/`HashTableDirectoryPage`/`HashTableBucketPage`: page layouts
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use strata::buffer::BufferPoolManager;
//! use strata::index::{DiskExtendibleHashTable, IntegerComparator, XxKeyHasher};
//! use strata::storage::disk::FileDiskManager;
//!
//! let disk_manager = Arc::new(FileDiskManager::new("test.db").unwrap());
//!
//! // 64 frames, LRU-2 replacement
//! let bpm = Arc::new(BufferPoolManager::new(64, 2, disk_manager));
//!
//! let index = DiskExtendibleHashTable::<i32, i32, _, _>::new(
//!     "accounts", bpm.clone(), IntegerComparator, XxKeyHasher, 2, 9, 511,
//! )
//! .unwrap();
//!
//! assert!(index.insert(&7, &700).unwrap());
//! assert_eq!(index.get_value(&7).unwrap(), Some(700));
//!
//! bpm.flush_all_pages();
//! ```

pub mod buffer;
pub mod common;
pub mod index;
pub mod storage;

// Re-export commonly used types at the crate root
pub use common::{PageId, RecordId, Result, SlotId, StorageConfig, StrataError};
