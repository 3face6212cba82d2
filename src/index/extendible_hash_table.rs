use std::marker::PhantomData;
use std::sync::Arc;

use log::{debug, warn};

use crate::buffer::{BufferPoolManager, WritePageGuard};
use crate::common::{
    PageId, Result, StorageConfig, StrataError, HTABLE_DIRECTORY_MAX_DEPTH,
    HTABLE_HEADER_MAX_DEPTH, INVALID_PAGE_ID,
};

use super::{
    bucket_array_size, HashTableBucketPage, HashTableDirectoryPage, HashTableHeaderPage,
    KeyComparator, KeyHasher, Storable, XxKeyHasher,
};

type BucketPage<'a, K, V> = HashTableBucketPage<&'a mut [u8], K, V>;
type DirectoryPage<'a> = HashTableDirectoryPage<&'a mut [u8]>;

/// A persistent hash index built out of buffer pool pages.
///
/// A header page routes the top bits of a key's hash to a directory page; the directory
/// routes the low bits to a bucket page. Full buckets split (doubling the directory when
/// needed) and empty buckets merge with their buddy, shrinking the directory when possible.
///
/// Keys are unique. Lookups latch header, directory and bucket pages in shared mode, releasing
/// each parent once the child is latched. Inserts and removes hold the directory's exclusive
/// latch for the whole operation, so writers on different directories proceed in parallel.
pub struct DiskExtendibleHashTable<K, V, C, H = XxKeyHasher> {
    name: String,
    bpm: Arc<BufferPoolManager>,
    cmp: C,
    hash_fn: H,
    header_page_id: PageId,
    header_max_depth: u32,
    directory_max_depth: u32,
    bucket_max_size: u32,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V, C, H> DiskExtendibleHashTable<K, V, C, H>
where
    K: Storable,
    V: Storable,
    C: KeyComparator,
    H: KeyHasher<K>,
{
    /// Creates an empty index with a fresh header page.
    pub fn new(
        name: impl Into<String>,
        bpm: Arc<BufferPoolManager>,
        cmp: C,
        hash_fn: H,
        header_max_depth: u32,
        directory_max_depth: u32,
        bucket_max_size: u32,
    ) -> Result<Self> {
        Self::validate(header_max_depth, directory_max_depth, bucket_max_size)?;

        let header_page_id = {
            let mut guard = bpm.new_page_guarded()?.upgrade_write();
            HashTableHeaderPage::new(guard.data_mut()).init(header_max_depth);
            guard.page_id()
        };

        let name = name.into();
        debug!("{}: created header {}", name, header_page_id);

        Ok(Self {
            name,
            bpm,
            cmp,
            hash_fn,
            header_page_id,
            header_max_depth,
            directory_max_depth,
            bucket_max_size,
            _marker: PhantomData,
        })
    }

    /// Creates an empty index sized by a [`StorageConfig`]. Without an explicit bucket size
    /// buckets hold as many entries as fit in a page.
    pub fn with_config(
        name: impl Into<String>,
        bpm: Arc<BufferPoolManager>,
        cmp: C,
        hash_fn: H,
        config: &StorageConfig,
    ) -> Result<Self> {
        let bucket_max_size = config
            .bucket_max_size
            .unwrap_or(bucket_array_size::<K, V>() as u32);

        Self::new(
            name,
            bpm,
            cmp,
            hash_fn,
            config.header_max_depth,
            config.directory_max_depth,
            bucket_max_size,
        )
    }

    /// Reattaches to an index previously created on the same disk.
    /// `directory_max_depth` and `bucket_max_size` apply to directories and buckets
    /// created from now on.
    pub fn open(
        name: impl Into<String>,
        bpm: Arc<BufferPoolManager>,
        cmp: C,
        hash_fn: H,
        header_page_id: PageId,
        directory_max_depth: u32,
        bucket_max_size: u32,
    ) -> Result<Self> {
        let header_max_depth = {
            let guard = bpm.fetch_page_read(header_page_id)?;
            HashTableHeaderPage::new(guard.data()).max_depth()
        };
        Self::validate(header_max_depth, directory_max_depth, bucket_max_size)?;

        Ok(Self {
            name: name.into(),
            bpm,
            cmp,
            hash_fn,
            header_page_id,
            header_max_depth,
            directory_max_depth,
            bucket_max_size,
            _marker: PhantomData,
        })
    }

    fn validate(header_max_depth: u32, directory_max_depth: u32, bucket_max_size: u32) -> Result<()> {
        if header_max_depth > HTABLE_HEADER_MAX_DEPTH {
            return Err(StrataError::InvalidConfig(format!(
                "header max depth {} exceeds {}",
                header_max_depth, HTABLE_HEADER_MAX_DEPTH
            )));
        }
        if directory_max_depth > HTABLE_DIRECTORY_MAX_DEPTH {
            return Err(StrataError::InvalidConfig(format!(
                "directory max depth {} exceeds {}",
                directory_max_depth, HTABLE_DIRECTORY_MAX_DEPTH
            )));
        }

        let capacity = bucket_array_size::<K, V>();
        if bucket_max_size == 0 || bucket_max_size as usize > capacity {
            return Err(StrataError::InvalidConfig(format!(
                "bucket max size {} outside 1..={}",
                bucket_max_size, capacity
            )));
        }

        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn header_page_id(&self) -> PageId {
        self.header_page_id
    }

    pub fn header_max_depth(&self) -> u32 {
        self.header_max_depth
    }

    pub fn directory_max_depth(&self) -> u32 {
        self.directory_max_depth
    }

    pub fn bucket_max_size(&self) -> u32 {
        self.bucket_max_size
    }

    fn hash(&self, key: &K) -> u32 {
        self.hash_fn.hash(key)
    }

    /// Looks up the value stored for `key`.
    pub fn get_value(&self, key: &K) -> Result<Option<V>> {
        let hash = self.hash(key);

        let header_guard = self.bpm.fetch_page_read(self.header_page_id)?;
        let header = HashTableHeaderPage::new(header_guard.data());
        let directory_page_id = header.directory_page_id(header.hash_to_directory_index(hash));
        if directory_page_id == INVALID_PAGE_ID {
            return Ok(None);
        }

        let directory_guard = self.bpm.fetch_page_read(directory_page_id)?;
        drop(header_guard);
        let directory = HashTableDirectoryPage::new(directory_guard.data());
        let bucket_page_id = directory.bucket_page_id(directory.hash_to_bucket_index(hash));
        if bucket_page_id == INVALID_PAGE_ID {
            return Ok(None);
        }

        let bucket_guard = self.bpm.fetch_page_read(bucket_page_id)?;
        drop(directory_guard);
        let bucket = HashTableBucketPage::<_, K, V>::new(bucket_guard.data());

        Ok(bucket.lookup(key, &self.cmp))
    }

    /// Inserts a key/value pair.
    ///
    /// Returns `Ok(false)` if the key is already present, or if its bucket is full and can't
    /// split any further because the directory reached its max depth.
    pub fn insert(&self, key: &K, value: &V) -> Result<bool> {
        let hash = self.hash(key);
        let mut directory_guard = self.fetch_directory_write(hash)?;
        let directory_page_id = directory_guard.page_id();

        loop {
            let mut directory = HashTableDirectoryPage::new(directory_guard.data_mut());
            let bucket_idx = directory.hash_to_bucket_index(hash);
            let bucket_page_id = directory.bucket_page_id(bucket_idx);

            let mut bucket_guard = self.bpm.fetch_page_write(bucket_page_id)?;
            let mut bucket = HashTableBucketPage::<_, K, V>::new(bucket_guard.data_mut());

            if bucket.lookup(key, &self.cmp).is_some() {
                return Ok(false);
            }
            if !bucket.is_full() {
                return Ok(bucket.insert(key, value, &self.cmp));
            }

            let local_depth = directory.local_depth(bucket_idx);
            if local_depth >= directory.max_depth() {
                debug!(
                    "{}: bucket {} is full at max depth {}",
                    self.name, bucket_page_id, local_depth
                );
                return Ok(false);
            }

            if local_depth == directory.global_depth() {
                directory.incr_global_depth();
                debug!(
                    "{}: directory {} grew to depth {}",
                    self.name,
                    directory_page_id,
                    directory.global_depth()
                );
            }

            self.split_bucket(&mut directory, &mut bucket, bucket_idx)?;
        }
    }

    /// Removes `key`. Returns `Ok(false)` if it wasn't present.
    pub fn remove(&self, key: &K) -> Result<bool> {
        let hash = self.hash(key);

        let header_guard = self.bpm.fetch_page_read(self.header_page_id)?;
        let header = HashTableHeaderPage::new(header_guard.data());
        let directory_page_id = header.directory_page_id(header.hash_to_directory_index(hash));
        if directory_page_id == INVALID_PAGE_ID {
            return Ok(false);
        }

        let mut directory_guard = self.bpm.fetch_page_write(directory_page_id)?;
        drop(header_guard);
        let mut directory = HashTableDirectoryPage::new(directory_guard.data_mut());

        let bucket_idx = directory.hash_to_bucket_index(hash);
        let bucket_page_id = directory.bucket_page_id(bucket_idx);
        {
            let mut bucket_guard = self.bpm.fetch_page_write(bucket_page_id)?;
            let mut bucket = HashTableBucketPage::<_, K, V>::new(bucket_guard.data_mut());
            if !bucket.remove(key, &self.cmp) {
                return Ok(false);
            }
        }

        self.merge_buckets(&mut directory, bucket_idx)?;

        while directory.can_shrink() {
            directory.decr_global_depth();
            debug!(
                "{}: directory {} shrank to depth {}",
                self.name,
                directory_page_id,
                directory.global_depth()
            );
        }

        Ok(true)
    }

    /// Latches the directory for `hash` exclusively, creating it if the header has none.
    fn fetch_directory_write(&self, hash: u32) -> Result<WritePageGuard> {
        {
            let header_guard = self.bpm.fetch_page_read(self.header_page_id)?;
            let header = HashTableHeaderPage::new(header_guard.data());
            let directory_page_id = header.directory_page_id(header.hash_to_directory_index(hash));
            if directory_page_id != INVALID_PAGE_ID {
                return self.bpm.fetch_page_write(directory_page_id);
            }
        }

        let mut header_guard = self.bpm.fetch_page_write(self.header_page_id)?;
        let mut header = HashTableHeaderPage::new(header_guard.data_mut());
        let directory_idx = header.hash_to_directory_index(hash);

        // Another writer may have created it while the header was unlatched
        let directory_page_id = header.directory_page_id(directory_idx);
        if directory_page_id != INVALID_PAGE_ID {
            return self.bpm.fetch_page_write(directory_page_id);
        }

        let mut directory_guard = self.bpm.new_page_guarded()?.upgrade_write();
        let directory_page_id = directory_guard.page_id();

        let bucket_page_id = match self.new_bucket() {
            Ok(page_id) => page_id,
            Err(e) => {
                drop(directory_guard);
                self.bpm.delete_page(directory_page_id);
                return Err(e);
            }
        };

        let mut directory = HashTableDirectoryPage::new(directory_guard.data_mut());
        directory.init(self.directory_max_depth);
        directory.set_bucket_page_id(0, bucket_page_id);
        directory.set_local_depth(0, 0);

        header.set_directory_page_id(directory_idx, directory_page_id);
        debug!(
            "{}: created directory {} with bucket {} for header slot {}",
            self.name, directory_page_id, bucket_page_id, directory_idx
        );

        Ok(directory_guard)
    }

    /// Allocates and formats an empty bucket page, returning it unpinned.
    fn new_bucket(&self) -> Result<PageId> {
        let mut guard = self.bpm.new_page_guarded()?.upgrade_write();
        HashTableBucketPage::<_, K, V>::new(guard.data_mut()).init(self.bucket_max_size);
        Ok(guard.page_id())
    }

    /// Splits the bucket behind `bucket_idx` into itself and a new split image, repointing
    /// half of its slots and rehashing its entries.
    fn split_bucket(
        &self,
        directory: &mut DirectoryPage<'_>,
        bucket: &mut BucketPage<'_, K, V>,
        bucket_idx: u32,
    ) -> Result<()> {
        let bucket_page_id = directory.bucket_page_id(bucket_idx);
        let local_depth = directory.local_depth(bucket_idx);

        let mut image_guard = self.bpm.new_page_guarded()?.upgrade_write();
        let image_page_id = image_guard.page_id();
        let mut image = HashTableBucketPage::<_, K, V>::new(image_guard.data_mut());
        image.init(self.bucket_max_size);

        let split_bit = 1u32 << local_depth;
        let image_idx = directory.split_image_index(bucket_idx);

        for idx in 0..directory.size() {
            if directory.bucket_page_id(idx) != bucket_page_id {
                continue;
            }
            if idx & split_bit == image_idx & split_bit {
                directory.set_bucket_page_id(idx, image_page_id);
            }
            directory.incr_local_depth(idx);
        }

        let entries = bucket.entries();
        bucket.clear();
        for (key, value) in &entries {
            let target_idx = directory.hash_to_bucket_index(self.hash(key));
            if directory.bucket_page_id(target_idx) == image_page_id {
                image.insert(key, value, &self.cmp);
            } else {
                bucket.insert(key, value, &self.cmp);
            }
        }

        debug!(
            "{}: split {} into {} at local depth {} ({} / {} entries)",
            self.name,
            bucket_page_id,
            image_page_id,
            local_depth + 1,
            bucket.size(),
            image.size()
        );

        Ok(())
    }

    /// Folds empty buckets into their buddies, starting at `bucket_idx`, until no merge applies.
    fn merge_buckets(&self, directory: &mut DirectoryPage<'_>, bucket_idx: u32) -> Result<()> {
        while let Some(buddy_idx) = directory.merge_buddy_index(bucket_idx) {
            let local_depth = directory.local_depth(bucket_idx);
            if directory.local_depth(buddy_idx) != local_depth {
                break;
            }

            let bucket_page_id = directory.bucket_page_id(bucket_idx);
            let buddy_page_id = directory.bucket_page_id(buddy_idx);
            if bucket_page_id == buddy_page_id {
                break;
            }

            let bucket_empty = self.bucket_is_empty(bucket_page_id)?;
            if !bucket_empty && !self.bucket_is_empty(buddy_page_id)? {
                break;
            }

            let (survivor, merged) = if bucket_empty {
                (buddy_page_id, bucket_page_id)
            } else {
                (bucket_page_id, buddy_page_id)
            };

            for idx in 0..directory.size() {
                let page_id = directory.bucket_page_id(idx);
                if page_id == bucket_page_id || page_id == buddy_page_id {
                    directory.set_bucket_page_id(idx, survivor);
                    directory.decr_local_depth(idx);
                }
            }

            debug!(
                "{}: merged {} into {} at local depth {}",
                self.name,
                merged,
                survivor,
                local_depth - 1
            );

            if !self.bpm.delete_page(merged) {
                warn!("{}: merged bucket {} is still pinned, leaving it allocated", self.name, merged);
            }
        }

        Ok(())
    }

    fn bucket_is_empty(&self, page_id: PageId) -> Result<bool> {
        let guard = self.bpm.fetch_page_read(page_id)?;
        Ok(HashTableBucketPage::<_, K, V>::new(guard.data()).is_empty())
    }

    /// Asserts the topology of every directory.
    ///
    /// # Panics
    /// Panics if any directory violates its depth or slot-count invariants.
    pub fn verify_integrity(&self) -> Result<()> {
        for directory_page_id in self.directory_page_ids()? {
            let guard = self.bpm.fetch_page_read(directory_page_id)?;
            HashTableDirectoryPage::new(guard.data()).verify_integrity();
        }
        Ok(())
    }

    /// Dumps the header, directories and bucket sizes at debug level.
    pub fn print_hash_table(&self) -> Result<()> {
        debug!(
            "{}: header {} (max depth {})",
            self.name, self.header_page_id, self.header_max_depth
        );

        for directory_page_id in self.directory_page_ids()? {
            let guard = self.bpm.fetch_page_read(directory_page_id)?;
            let directory = HashTableDirectoryPage::new(guard.data());
            debug!(
                "  directory {}: global depth {} / max depth {}",
                directory_page_id,
                directory.global_depth(),
                directory.max_depth()
            );

            for idx in 0..directory.size() {
                let bucket_page_id = directory.bucket_page_id(idx);
                let bucket_guard = self.bpm.fetch_page_read(bucket_page_id)?;
                let bucket = HashTableBucketPage::<_, K, V>::new(bucket_guard.data());
                debug!(
                    "    slot {:#b}: bucket {} local depth {} size {}/{}",
                    idx,
                    bucket_page_id,
                    directory.local_depth(idx),
                    bucket.size(),
                    bucket.max_size()
                );
            }
        }

        Ok(())
    }

    fn directory_page_ids(&self) -> Result<Vec<PageId>> {
        let guard = self.bpm.fetch_page_read(self.header_page_id)?;
        let header = HashTableHeaderPage::new(guard.data());
        Ok((0..header.max_size())
            .map(|idx| header.directory_page_id(idx))
            .filter(|&page_id| page_id != INVALID_PAGE_ID)
            .collect())
    }
}
