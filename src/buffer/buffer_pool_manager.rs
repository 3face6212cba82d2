use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use log::{debug, error, warn};
use parking_lot::Mutex;

use crate::common::{
    zeroed_page, FrameId, PageId, Result, StorageConfig, StrataError, INVALID_PAGE_ID,
};
use crate::storage::disk::{DiskManager, DiskScheduler};

use super::{BasicPageGuard, FrameHeader, LruKReplacer, ReadPageGuard, WritePageGuard};

/// Bookkeeping that is only touched under the pool latch
struct PoolInner {
    /// Page table: maps page IDs to frame IDs
    page_table: HashMap<PageId, FrameId>,
    /// Free list: frames that are not currently in use
    free_list: VecDeque<FrameId>,
}

/// Internal state that can be shared across threads and with page guards
pub(crate) struct BufferPoolState {
    /// The buffer pool frames
    frames: Vec<Arc<FrameHeader>>,
    /// Pool latch, serializes every structural change
    latch: Mutex<PoolInner>,
    /// LRU-K replacer for eviction decisions
    replacer: LruKReplacer,
    /// Disk scheduler for async I/O
    disk_scheduler: DiskScheduler,
    /// Next page id to hand out
    next_page_id: AtomicU32,
}

impl BufferPoolState {
    /// Decrements the pin count of a page, marking it evictable when it reaches zero.
    pub(crate) fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let inner = self.latch.lock();

        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return false;
        };
        let frame = &self.frames[frame_id.as_usize()];

        match frame.unpin() {
            None => false,
            Some(remaining) => {
                if is_dirty {
                    frame.set_dirty(true);
                }
                if remaining == 0 {
                    self.replacer.set_evictable(frame_id, true);
                }
                true
            }
        }
    }

    /// Gets a frame from the free list or by evicting a page. Must be called under the pool latch.
    fn acquire_frame(&self, inner: &mut PoolInner) -> Result<FrameId> {
        if let Some(frame_id) = inner.free_list.pop_front() {
            return Ok(frame_id);
        }

        let frame_id = self.replacer.evict().ok_or(StrataError::BufferPoolFull)?;
        let frame = &self.frames[frame_id.as_usize()];
        let victim = frame.page_id();

        assert_eq!(
            frame.pin_count(),
            0,
            "replacer evicted pinned {} holding {}",
            frame_id,
            victim
        );

        debug!("evicting {} from {} (dirty: {})", victim, frame_id, frame.is_dirty());

        if frame.is_dirty() {
            if let Err(e) = self
                .disk_scheduler
                .schedule_write_sync(victim, frame.snapshot())
            {
                fatal_io("write", victim, e);
            }
            frame.set_dirty(false);
        }

        inner.page_table.remove(&victim);
        Ok(frame_id)
    }

    /// Writes a pinned frame's content to disk and clears its dirty flag.
    fn flush_frame(&self, frame: &FrameHeader) {
        let page_id = frame.page_id();

        // Cleared before the snapshot so a concurrent writer re-marks the page afterwards
        frame.set_dirty(false);
        let data = frame.snapshot();

        if let Err(e) = self.disk_scheduler.schedule_write_sync(page_id, data) {
            fatal_io("write", page_id, e);
        }
    }
}

/// Disk failures leave the pool unable to honour residency guarantees.
fn fatal_io(op: &str, page_id: PageId, err: StrataError) -> ! {
    error!("disk {} of {} failed: {}", op, page_id, err);
    panic!("disk {} of {} failed: {}", op, page_id, err);
}

/// BufferPoolManager is responsible for fetching database pages from disk
/// and storing them in memory. It manages a fixed number of frames and uses
/// the LRU-K replacement policy to decide which pages to evict.
///
/// Pages can be pinned directly with [`new_page`](Self::new_page) /
/// [`fetch_page`](Self::fetch_page) and released with [`unpin_page`](Self::unpin_page),
/// or through the guard entry points which release on drop.
pub struct BufferPoolManager {
    /// Number of frames in the buffer pool
    pool_size: usize,
    /// Shared state
    state: Arc<BufferPoolState>,
}

impl BufferPoolManager {
    /// Creates a new BufferPoolManager with the given pool size, k value for LRU-K,
    /// and disk manager.
    pub fn new(pool_size: usize, k: usize, disk_manager: Arc<dyn DiskManager>) -> Self {
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);

        for i in 0..pool_size {
            let frame_id = FrameId::new(i as u32);
            frames.push(Arc::new(FrameHeader::new(frame_id)));
            free_list.push_back(frame_id);
        }

        // Never reissue an id that already exists on disk
        let next_page_id = AtomicU32::new(disk_manager.num_pages());

        let state = Arc::new(BufferPoolState {
            frames,
            latch: Mutex::new(PoolInner {
                page_table: HashMap::with_capacity(pool_size),
                free_list,
            }),
            replacer: LruKReplacer::new(k, pool_size),
            disk_scheduler: DiskScheduler::new(disk_manager),
            next_page_id,
        });

        Self { pool_size, state }
    }

    /// Creates a BufferPoolManager sized by a [`StorageConfig`].
    pub fn with_config(config: &StorageConfig, disk_manager: Arc<dyn DiskManager>) -> Result<Self> {
        if config.pool_size == 0 {
            return Err(StrataError::InvalidConfig(
                "pool_size must be at least 1".to_string(),
            ));
        }
        if config.replacer_k == 0 {
            return Err(StrataError::InvalidConfig(
                "replacer_k must be at least 1".to_string(),
            ));
        }

        Ok(Self::new(config.pool_size, config.replacer_k, disk_manager))
    }

    /// Hands out the next page id. Ids are never reused.
    pub fn allocate_page(&self) -> PageId {
        PageId::new(self.state.next_page_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Creates a new zeroed page in the buffer pool and returns its id, pinned once.
    /// The caller must eventually call [`unpin_page`](Self::unpin_page).
    pub fn new_page(&self) -> Result<PageId> {
        self.create_page().map(|(page_id, _)| page_id)
    }

    fn create_page(&self) -> Result<(PageId, FrameId)> {
        let state = &self.state;
        let mut inner = state.latch.lock();

        let frame_id = state.acquire_frame(&mut inner)?;
        let frame = &state.frames[frame_id.as_usize()];
        let page_id = self.allocate_page();

        frame.reset();
        frame.set_page_id(page_id);
        frame.pin();

        inner.page_table.insert(page_id, frame_id);
        state.replacer.record_access(frame_id);
        state.replacer.set_evictable(frame_id, false);

        Ok((page_id, frame_id))
    }

    /// Pins a page, reading it from disk if it isn't resident, and returns its frame.
    /// The caller must eventually call [`unpin_page`](Self::unpin_page).
    pub fn fetch_page(&self, page_id: PageId) -> Result<FrameId> {
        if page_id == INVALID_PAGE_ID {
            return Err(StrataError::InvalidPageId(page_id));
        }

        let state = &self.state;
        let mut inner = state.latch.lock();

        if let Some(&frame_id) = inner.page_table.get(&page_id) {
            state.frames[frame_id.as_usize()].pin();
            state.replacer.record_access(frame_id);
            state.replacer.set_evictable(frame_id, false);
            return Ok(frame_id);
        }

        let frame_id = state.acquire_frame(&mut inner)?;
        let frame = &state.frames[frame_id.as_usize()];

        let data = match state.disk_scheduler.schedule_read_sync(page_id, zeroed_page()) {
            Ok(data) => data,
            Err(e) => fatal_io("read", page_id, e),
        };

        frame.install(data);
        frame.set_page_id(page_id);
        frame.set_dirty(false);
        frame.pin();

        inner.page_table.insert(page_id, frame_id);
        state.replacer.record_access(frame_id);
        state.replacer.set_evictable(frame_id, false);

        Ok(frame_id)
    }

    /// Releases one pin on a page. Returns false if the page isn't resident or isn't pinned.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        self.state.unpin_page(page_id, is_dirty)
    }

    /// Writes a resident page to disk whether or not it is dirty.
    /// Returns false if the page isn't resident.
    pub fn flush_page(&self, page_id: PageId) -> bool {
        let state = &self.state;

        // Pin under the pool latch, then let go of it before touching the content latch
        let frame = {
            let inner = state.latch.lock();
            let Some(&frame_id) = inner.page_table.get(&page_id) else {
                return false;
            };
            let frame = Arc::clone(&state.frames[frame_id.as_usize()]);
            if frame.pin() == 1 {
                state.replacer.set_evictable(frame_id, false);
            }
            frame
        };

        state.flush_frame(&frame);
        state.unpin_page(page_id, false);
        true
    }

    /// Flushes every resident page to disk.
    pub fn flush_all_pages(&self) {
        let resident: Vec<PageId> = self.state.latch.lock().page_table.keys().copied().collect();

        for page_id in resident {
            // A page evicted in the meantime was written back by the eviction
            self.flush_page(page_id);
        }
    }

    /// Removes a page from the pool and tells the disk manager it is gone.
    /// Returns false if the page is still pinned.
    pub fn delete_page(&self, page_id: PageId) -> bool {
        let state = &self.state;
        let mut inner = state.latch.lock();

        if let Some(&frame_id) = inner.page_table.get(&page_id) {
            let frame = &state.frames[frame_id.as_usize()];
            if frame.pin_count() > 0 {
                return false;
            }

            inner.page_table.remove(&page_id);
            state.replacer.remove(frame_id);
            frame.reset();
            inner.free_list.push_back(frame_id);
        }

        // An evicted page still occupies space on disk
        if let Err(e) = state.disk_scheduler.disk_manager().deallocate_page(page_id) {
            warn!("failed to deallocate {}: {}", page_id, e);
        }

        true
    }

    /// Creates a new page and returns it wrapped in an unlatched guard.
    pub fn new_page_guarded(&self) -> Result<BasicPageGuard> {
        let (page_id, frame_id) = self.create_page()?;
        Ok(self.make_guard(page_id, frame_id))
    }

    /// Pins a page and returns it wrapped in an unlatched guard.
    pub fn fetch_page_basic(&self, page_id: PageId) -> Result<BasicPageGuard> {
        let frame_id = self.fetch_page(page_id)?;
        Ok(self.make_guard(page_id, frame_id))
    }

    /// Pins a page and latches it for reading.
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<ReadPageGuard> {
        Ok(self.fetch_page_basic(page_id)?.upgrade_read())
    }

    /// Pins a page and latches it for writing.
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<WritePageGuard> {
        Ok(self.fetch_page_basic(page_id)?.upgrade_write())
    }

    /// Returns the pin count for a page, or None if it isn't resident.
    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        let inner = self.state.latch.lock();

        inner
            .page_table
            .get(&page_id)
            .map(|&frame_id| self.state.frames[frame_id.as_usize()].pin_count())
    }

    /// Returns the pool size.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Returns the number of free frames.
    pub fn free_frame_count(&self) -> usize {
        self.state.latch.lock().free_list.len()
    }

    /// Returns the number of frames the replacer may currently evict.
    pub fn evictable_count(&self) -> usize {
        self.state.replacer.size()
    }

    /// Returns the disk manager backing this pool.
    pub fn disk_manager(&self) -> &Arc<dyn DiskManager> {
        self.state.disk_scheduler.disk_manager()
    }

    fn make_guard(&self, page_id: PageId, frame_id: FrameId) -> BasicPageGuard {
        BasicPageGuard::new(
            page_id,
            Arc::clone(&self.state.frames[frame_id.as_usize()]),
            Arc::clone(&self.state),
        )
    }
}
