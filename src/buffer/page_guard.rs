use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{RawRwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::common::{PageBuf, PageId};

use super::buffer_pool_manager::BufferPoolState;
use super::FrameHeader;

/// Owns one pin on a resident page, without holding its content latch.
///
/// Dropping the guard (or calling [`BasicPageGuard::drop_guard`]) unpins the page exactly
/// once. Use [`upgrade_read`](BasicPageGuard::upgrade_read) or
/// [`upgrade_write`](BasicPageGuard::upgrade_write) to latch the page for longer access;
/// the pin carries over so the page can't be evicted in between.
pub struct BasicPageGuard {
    page_id: PageId,
    frame: Arc<FrameHeader>,
    /// `None` once the pin has been handed back
    pool: Option<Arc<BufferPoolState>>,
    is_dirty: bool,
}

impl BasicPageGuard {
    /// Wraps a page the caller has already pinned.
    pub(crate) fn new(page_id: PageId, frame: Arc<FrameHeader>, pool: Arc<BufferPoolState>) -> Self {
        Self {
            page_id,
            frame,
            pool: Some(pool),
            is_dirty: false,
        }
    }

    /// Returns the page ID.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Latches the page shared for the lifetime of the returned reference.
    pub fn data(&self) -> RwLockReadGuard<'_, PageBuf> {
        self.frame.read_data()
    }

    /// Latches the page exclusively for the lifetime of the returned reference
    /// and marks the page dirty.
    pub fn data_mut(&mut self) -> RwLockWriteGuard<'_, PageBuf> {
        self.is_dirty = true;
        self.frame.write_data()
    }

    /// Converts into a read guard, keeping the pin.
    pub fn upgrade_read(self) -> ReadPageGuard {
        let latch = self.frame.data.read_arc();
        ReadPageGuard { latch, base: self }
    }

    /// Converts into a write guard, keeping the pin.
    pub fn upgrade_write(self) -> WritePageGuard {
        let latch = self.frame.data.write_arc();
        WritePageGuard { latch, base: self }
    }

    /// Drops this guard, releasing the page.
    pub fn drop_guard(self) {
        drop(self);
    }
}

impl Drop for BasicPageGuard {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.unpin_page(self.page_id, self.is_dirty);
        }
    }
}

/// RAII guard for read-only access to a page.
/// Holds the page's shared latch; unlatches and then unpins when dropped.
pub struct ReadPageGuard {
    // Field order matters: the latch is released before the base guard unpins
    latch: ArcRwLockReadGuard<RawRwLock, PageBuf>,
    base: BasicPageGuard,
}

impl ReadPageGuard {
    /// Returns the page ID.
    pub fn page_id(&self) -> PageId {
        self.base.page_id
    }

    /// Returns a reference to the page data.
    pub fn data(&self) -> &[u8] {
        &self.latch[..]
    }

    /// Drops this guard, releasing the page.
    pub fn drop_guard(self) {
        drop(self);
    }
}

impl Deref for ReadPageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

/// RAII guard for read-write access to a page.
/// Holds the page's exclusive latch; unlatches and then unpins when dropped,
/// reporting the page dirty if mutable data was ever handed out.
pub struct WritePageGuard {
    // Field order matters: the latch is released before the base guard unpins
    latch: ArcRwLockWriteGuard<RawRwLock, PageBuf>,
    base: BasicPageGuard,
}

impl WritePageGuard {
    /// Returns the page ID.
    pub fn page_id(&self) -> PageId {
        self.base.page_id
    }

    /// Returns a reference to the page data.
    pub fn data(&self) -> &[u8] {
        &self.latch[..]
    }

    /// Returns a mutable reference to the page data.
    /// Automatically marks the page as dirty.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.base.is_dirty = true;
        &mut self.latch[..]
    }

    /// Drops this guard, releasing the page.
    pub fn drop_guard(self) {
        drop(self);
    }
}

impl Deref for WritePageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl DerefMut for WritePageGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data_mut()
    }
}
