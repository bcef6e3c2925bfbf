//! Configuration constants and tunables for pagecore.

use std::time::Duration;

use super::{Error, Result};

/// Size of a page in bytes (4KB).
///
/// Matches the OS page size on most systems, so pages can be read and
/// written with `O_DIRECT` without bounce buffers.
///
/// # Memory Layout
/// With 4KB pages and 32-bit PageIds (id 0 reserved):
/// - Max pages: 2^32 - 1
/// - Max database size: ≈16TB
pub const PAGE_SIZE: usize = 4096;

/// Size of the fixed header at the start of every page.
pub const PAGE_HEADER_SIZE: usize = 64;

/// Size of the payload that follows the header.
pub const PAGE_DATA_SIZE: usize = PAGE_SIZE - PAGE_HEADER_SIZE;

/// Largest allocatable page id.
pub const MAX_PAGE_ID: u32 = u32::MAX;

/// Maximum theoretical database size in bytes (including the reserved slot 0).
pub const MAX_DB_SIZE_BYTES: u64 = (MAX_PAGE_ID as u64 + 1) * PAGE_SIZE as u64;

/// Default number of frames in a buffer pool (1024 × 4KB = 4MB).
pub const DEFAULT_POOL_SIZE: usize = 1024;

/// Default history depth of the LRU-K replacer (LRU-2).
pub const DEFAULT_LRU_K: usize = 2;

/// How long a pool flush waits for a writer to release a page before it
/// gives up with [`Error::PageLocked`](crate::Error::PageLocked).
pub const FLUSH_LOCK_TIMEOUT: Duration = Duration::from_millis(50);

/// Tunables for a [`BufferPoolManager`](crate::BufferPoolManager).
///
/// # Example
/// ```
/// use pagecore::BufferPoolConfig;
///
/// let config = BufferPoolConfig::default().with_pool_size(64).with_lru_k(3);
/// assert!(config.validate().is_ok());
/// assert_eq!(config.pool_size, 64);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferPoolConfig {
    /// Number of frames held in memory.
    pub pool_size: usize,
    /// Number of accesses remembered per frame by the replacer.
    pub lru_k: usize,
}

impl BufferPoolConfig {
    /// Set the number of frames.
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Set the replacer history depth.
    pub fn with_lru_k(mut self, k: usize) -> Self {
        self.lru_k = k;
        self
    }

    /// Reject values the pool cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(Error::Config("pool_size must be > 0".to_string()));
        }
        if self.lru_k == 0 {
            return Err(Error::Config("lru_k must be > 0".to_string()));
        }
        Ok(())
    }
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            lru_k: DEFAULT_LRU_K,
        }
    }
}
