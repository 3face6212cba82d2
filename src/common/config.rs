use std::env;

/// Size of a page in bytes (4 KB)
pub const PAGE_SIZE: usize = 4096;

/// Invalid page ID constant
pub const INVALID_PAGE_ID: PageId = PageId(u32::MAX);

/// Default K value for LRU-K replacement policy
pub const DEFAULT_LRUK_K: usize = 2;

/// Default buffer pool size (number of frames)
pub const DEFAULT_BUFFER_POOL_SIZE: usize = 10;

/// Capacity of the disk scheduler request queue
pub const DISK_SCHEDULER_QUEUE_CAPACITY: usize = 128;

/// Largest header depth an extendible hash table may be configured with
pub const HTABLE_HEADER_MAX_DEPTH: u32 = 9;

/// Largest directory depth an extendible hash table may be configured with
pub const HTABLE_DIRECTORY_MAX_DEPTH: u32 = 9;

/// Number of directory page ids stored in a header page
pub const HTABLE_HEADER_ARRAY_SIZE: usize = 1 << HTABLE_HEADER_MAX_DEPTH;

/// Number of bucket slots stored in a directory page
pub const HTABLE_DIRECTORY_ARRAY_SIZE: usize = 1 << HTABLE_DIRECTORY_MAX_DEPTH;

use super::types::PageId;

/// Runtime tunables for the buffer pool and the hash index built on top of it.
///
/// Every field can be overridden from the environment through [`StorageConfig::from_env`]:
/// `STRATA_POOL_SIZE`, `STRATA_REPLACER_K`, `STRATA_HEADER_MAX_DEPTH`,
/// `STRATA_DIRECTORY_MAX_DEPTH` and `STRATA_BUCKET_MAX_SIZE`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageConfig {
    /// Number of frames in the buffer pool.
    pub pool_size: usize,
    /// K of the LRU-K replacer.
    pub replacer_k: usize,
    /// Number of hash bits the header page uses to pick a directory.
    pub header_max_depth: u32,
    /// Maximum global depth a directory page may grow to.
    pub directory_max_depth: u32,
    /// Bucket capacity; `None` means "as many entries as fit in a page".
    pub bucket_max_size: Option<u32>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_BUFFER_POOL_SIZE,
            replacer_k: DEFAULT_LRUK_K,
            header_max_depth: HTABLE_HEADER_MAX_DEPTH,
            directory_max_depth: HTABLE_DIRECTORY_MAX_DEPTH,
            bucket_max_size: None,
        }
    }
}

impl StorageConfig {
    /// Builds a config from defaults overridden by `STRATA_*` environment variables.
    /// Unparseable values are ignored.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Some(v) = env_parse::<usize>("STRATA_POOL_SIZE") {
            cfg.pool_size = v;
        }
        if let Some(v) = env_parse::<usize>("STRATA_REPLACER_K") {
            cfg.replacer_k = v;
        }
        if let Some(v) = env_parse::<u32>("STRATA_HEADER_MAX_DEPTH") {
            cfg.header_max_depth = v;
        }
        if let Some(v) = env_parse::<u32>("STRATA_DIRECTORY_MAX_DEPTH") {
            cfg.directory_max_depth = v;
        }
        if let Some(v) = env_parse::<u32>("STRATA_BUCKET_MAX_SIZE") {
            cfg.bucket_max_size = Some(v);
        }

        cfg
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_replacer_k(mut self, k: usize) -> Self {
        self.replacer_k = k;
        self
    }

    pub fn with_header_max_depth(mut self, depth: u32) -> Self {
        self.header_max_depth = depth;
        self
    }

    pub fn with_directory_max_depth(mut self, depth: u32) -> Self {
        self.directory_max_depth = depth;
        self
    }

    pub fn with_bucket_max_size(mut self, size: u32) -> Self {
        self.bucket_max_size = Some(size);
        self
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse().ok())
}
