use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use log::error;

use crate::common::{PageBuf, PageId, Result, StrataError, DISK_SCHEDULER_QUEUE_CAPACITY};

use super::DiskManager;

/// Outcome of a disk request, handed back through the request's callback.
/// The page buffer always travels back to the caller; for reads it holds the page content.
pub struct DiskCompletion {
    pub data: PageBuf,
    pub result: Result<()>,
}

/// Sending half of a completion signal
pub type DiskPromise = Sender<DiskCompletion>;

/// Receiving half of a completion signal
pub type DiskFuture = Receiver<DiskCompletion>;

/// Represents a disk I/O request
pub struct DiskRequest {
    /// Whether this is a write (true) or read (false) request
    pub is_write: bool,
    /// The page to read/write
    pub page_id: PageId,
    /// For writes: the content to persist. For reads: the buffer to fill.
    pub data: PageBuf,
    /// Signalled once the request has been carried out
    pub callback: DiskPromise,
}

impl DiskRequest {
    /// Creates a new single-page read request
    pub fn read(page_id: PageId, data: PageBuf, callback: DiskPromise) -> Self {
        Self {
            is_write: false,
            page_id,
            data,
            callback,
        }
    }

    /// Creates a new single-page write request
    pub fn write(page_id: PageId, data: PageBuf, callback: DiskPromise) -> Self {
        Self {
            is_write: true,
            page_id,
            data,
            callback,
        }
    }
}

/// DiskScheduler owns a background worker thread that processes disk I/O requests
/// strictly in the order they were scheduled.
///
/// Dropping the scheduler (or calling [`DiskScheduler::shutdown`]) closes the queue;
/// the worker finishes every request already queued before it exits.
pub struct DiskScheduler {
    /// The disk manager for actual I/O operations
    disk_manager: Arc<dyn DiskManager>,
    /// Channel sender for queuing requests, `None` once shut down
    request_sender: Option<Sender<DiskRequest>>,
    /// Handle to the background worker thread
    worker_handle: Option<JoinHandle<()>>,
}

impl DiskScheduler {
    /// Creates a new DiskScheduler and spawns its worker thread.
    pub fn new(disk_manager: Arc<dyn DiskManager>) -> Self {
        let (sender, receiver) = bounded::<DiskRequest>(DISK_SCHEDULER_QUEUE_CAPACITY);

        let dm_clone = Arc::clone(&disk_manager);
        let worker_handle = thread::spawn(move || {
            Self::start_worker_thread(dm_clone, receiver);
        });

        Self {
            disk_manager,
            request_sender: Some(sender),
            worker_handle: Some(worker_handle),
        }
    }

    /// Creates a one-shot completion channel for a request.
    pub fn create_promise() -> (DiskPromise, DiskFuture) {
        bounded(1)
    }

    /// Queues a request for the background worker.
    pub fn schedule(&self, request: DiskRequest) -> Result<()> {
        let sender = self
            .request_sender
            .as_ref()
            .ok_or(StrataError::SchedulerShutdown)?;

        sender
            .send(request)
            .map_err(|_| StrataError::SchedulerShutdown)
    }

    /// Waits for a scheduled request and returns its buffer, or the I/O error it hit.
    pub fn wait(future: &DiskFuture) -> Result<PageBuf> {
        let completion = future.recv().map_err(|e| {
            StrataError::DiskScheduler(format!("Failed to receive completion: {}", e))
        })?;

        completion.result?;
        Ok(completion.data)
    }

    /// Schedules a read request and waits for completion.
    pub fn schedule_read_sync(&self, page_id: PageId, data: PageBuf) -> Result<PageBuf> {
        let (promise, future) = Self::create_promise();
        self.schedule(DiskRequest::read(page_id, data, promise))?;
        Self::wait(&future)
    }

    /// Schedules a write request and waits for completion.
    pub fn schedule_write_sync(&self, page_id: PageId, data: PageBuf) -> Result<()> {
        let (promise, future) = Self::create_promise();
        self.schedule(DiskRequest::write(page_id, data, promise))?;
        Self::wait(&future).map(|_| ())
    }

    /// Stops accepting requests, drains the queue and joins the worker.
    pub fn shutdown(&mut self) {
        // Closing the only sender lets the worker fall out of its loop once the queue is empty
        self.request_sender.take();

        if let Some(handle) = self.worker_handle.take() {
            if handle.join().is_err() {
                error!("disk scheduler worker panicked, queued requests were dropped");
            }
        }
    }

    /// Returns whether the scheduler still accepts requests.
    pub fn is_running(&self) -> bool {
        self.request_sender.is_some()
    }

    /// The background worker thread function.
    fn start_worker_thread(disk_manager: Arc<dyn DiskManager>, receiver: Receiver<DiskRequest>) {
        for request in receiver.iter() {
            Self::process_request(disk_manager.as_ref(), request);
        }
    }

    /// Processes a single disk request and signals its completion.
    fn process_request(disk_manager: &dyn DiskManager, request: DiskRequest) {
        let DiskRequest {
            is_write,
            page_id,
            mut data,
            callback,
        } = request;

        let result = if is_write {
            disk_manager.write_page(page_id, &data[..])
        } else {
            disk_manager.read_page(page_id, &mut data[..])
        };

        // The requester may have stopped waiting; nothing to do then
        let _ = callback.send(DiskCompletion {
            data,
            result,
        });
    }

    /// Returns a reference to the underlying DiskManager.
    pub fn disk_manager(&self) -> &Arc<dyn DiskManager> {
        &self.disk_manager
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{zeroed_page, PAGE_SIZE};
    use crate::storage::disk::{FileDiskManager, MemoryDiskManager};
    use tempfile::NamedTempFile;

    #[test]
    fn test_disk_scheduler_read_write() {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = Arc::new(FileDiskManager::new(temp_file.path()).unwrap());
        let scheduler = DiskScheduler::new(dm);

        let mut write_data = zeroed_page();
        write_data[0] = 42;
        write_data[100] = 255;
        scheduler
            .schedule_write_sync(PageId::new(0), write_data)
            .unwrap();

        let read_data = scheduler
            .schedule_read_sync(PageId::new(0), zeroed_page())
            .unwrap();

        assert_eq!(read_data[0], 42);
        assert_eq!(read_data[100], 255);
    }

    #[test]
    fn test_disk_scheduler_fifo_order() {
        let dm = Arc::new(MemoryDiskManager::new());
        let scheduler = DiskScheduler::new(dm);

        // Queue several writes to the same page without waiting; the last one must win
        let mut futures = Vec::new();
        for i in 0..10u8 {
            let mut data = zeroed_page();
            data[0] = i;
            let (promise, future) = DiskScheduler::create_promise();
            scheduler
                .schedule(DiskRequest::write(PageId::new(1), data, promise))
                .unwrap();
            futures.push(future);
        }

        let (promise, future) = DiskScheduler::create_promise();
        scheduler
            .schedule(DiskRequest::read(PageId::new(1), zeroed_page(), promise))
            .unwrap();

        for f in &futures {
            DiskScheduler::wait(f).unwrap();
        }
        let data = DiskScheduler::wait(&future).unwrap();
        assert_eq!(data[0], 9);
    }

    #[test]
    fn test_disk_scheduler_drains_on_shutdown() {
        let dm = Arc::new(MemoryDiskManager::new());
        let mut scheduler = DiskScheduler::new(dm.clone());

        let mut futures = Vec::new();
        for i in 0..20u32 {
            let mut data = zeroed_page();
            data[..4].copy_from_slice(&i.to_le_bytes());
            let (promise, future) = DiskScheduler::create_promise();
            scheduler
                .schedule(DiskRequest::write(PageId::new(i), data, promise))
                .unwrap();
            futures.push(future);
        }

        scheduler.shutdown();
        assert!(!scheduler.is_running());

        for i in 0..20u32 {
            let mut out = [0u8; PAGE_SIZE];
            dm.read_page(PageId::new(i), &mut out).unwrap();
            assert_eq!(u32::from_le_bytes(out[..4].try_into().unwrap()), i);
        }
        for f in &futures {
            assert!(DiskScheduler::wait(f).is_ok());
        }
    }

    /// Disk whose writes bring the worker down.
    struct PanickingDisk;

    impl DiskManager for PanickingDisk {
        fn read_page(&self, _page_id: PageId, _data: &mut [u8]) -> Result<()> {
            Ok(())
        }

        fn write_page(&self, page_id: PageId, _data: &[u8]) -> Result<()> {
            panic!("write of {} blew up", page_id);
        }

        fn num_pages(&self) -> u32 {
            0
        }
    }

    #[test]
    fn test_disk_scheduler_survives_worker_panic() {
        let mut scheduler = DiskScheduler::new(Arc::new(PanickingDisk));

        // The completion is dropped while the worker unwinds
        let result = scheduler.schedule_write_sync(PageId::new(0), zeroed_page());
        assert!(matches!(result, Err(StrataError::DiskScheduler(_))));

        // Joining the dead worker doesn't propagate its panic
        scheduler.shutdown();
        assert!(!scheduler.is_running());

        let result = scheduler.schedule_read_sync(PageId::new(0), zeroed_page());
        assert!(matches!(result, Err(StrataError::SchedulerShutdown)));
    }

    #[test]
    fn test_disk_scheduler_rejects_after_shutdown() {
        let dm = Arc::new(MemoryDiskManager::new());
        let mut scheduler = DiskScheduler::new(dm);
        scheduler.shutdown();

        let result = scheduler.schedule_write_sync(PageId::new(0), zeroed_page());
        assert!(matches!(result, Err(StrataError::SchedulerShutdown)));
    }
}
