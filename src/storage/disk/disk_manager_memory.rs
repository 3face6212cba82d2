//! Unbounded in-memory page store.
//!
//! Used by tests and benchmarks that want the full buffer pool / scheduler path
//! without touching the filesystem. Pages spring into existence on first write;
//! reading a page that was never written yields zeros.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::common::{zeroed_page, PageBuf, PageId, Result, PAGE_SIZE};

use super::DiskManager;

#[derive(Default)]
pub struct MemoryDiskManager {
    pages: Mutex<HashMap<PageId, PageBuf>>,
    num_reads: AtomicU32,
    num_writes: AtomicU32,
}

impl MemoryDiskManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of page reads served.
    pub fn get_num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    /// Returns the number of page writes applied.
    pub fn get_num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }

    /// Returns whether the page has ever been written.
    pub fn contains(&self, page_id: PageId) -> bool {
        self.pages.lock().contains_key(&page_id)
    }
}

impl DiskManager for MemoryDiskManager {
    fn read_page(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");

        match self.pages.lock().get(&page_id) {
            Some(page) => data.copy_from_slice(&page[..]),
            None => data.fill(0),
        }

        self.num_reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");

        let mut pages = self.pages.lock();
        pages
            .entry(page_id)
            .or_insert_with(zeroed_page)
            .copy_from_slice(data);

        self.num_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn deallocate_page(&self, page_id: PageId) -> Result<()> {
        self.pages.lock().remove(&page_id);
        Ok(())
    }

    fn num_pages(&self) -> u32 {
        self.pages
            .lock()
            .keys()
            .map(|pid| pid.as_u32() + 1)
            .max()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_disk_unwritten_page_reads_zero() {
        let dm = MemoryDiskManager::new();
        let mut data = [9u8; PAGE_SIZE];
        dm.read_page(PageId::new(3), &mut data).unwrap();
        assert!(data.iter().all(|&b| b == 0));
        assert_eq!(dm.num_pages(), 0);
    }

    #[test]
    fn test_memory_disk_read_write() {
        let dm = MemoryDiskManager::new();

        let mut data = [0u8; PAGE_SIZE];
        data[0] = 1;
        data[PAGE_SIZE - 1] = 2;
        dm.write_page(PageId::new(7), &data).unwrap();

        let mut out = [0u8; PAGE_SIZE];
        dm.read_page(PageId::new(7), &mut out).unwrap();
        assert_eq!(out[0], 1);
        assert_eq!(out[PAGE_SIZE - 1], 2);
        assert_eq!(dm.num_pages(), 8);
        assert_eq!(dm.get_num_reads(), 1);
        assert_eq!(dm.get_num_writes(), 1);
    }

    #[test]
    fn test_memory_disk_deallocate() {
        let dm = MemoryDiskManager::new();
        dm.write_page(PageId::new(0), &[5u8; PAGE_SIZE]).unwrap();
        assert!(dm.contains(PageId::new(0)));

        dm.deallocate_page(PageId::new(0)).unwrap();
        assert!(!dm.contains(PageId::new(0)));
    }
}
