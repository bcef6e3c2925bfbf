//! Buffer Pool Manager - the core page caching layer.
//!
//! The [`BufferPoolManager`] provides:
//! - Page caching between disk and memory
//! - Pin-based reference counting
//! - Write-back of dirty pages before their frame is reused
//! - LRU-K victim selection

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::buffer::replacer::LruKReplacer;
use crate::buffer::{BufferPoolStats, Frame, PageReadGuard, PageWriteGuard, PoolStats};
use crate::common::config::{BufferPoolConfig, DEFAULT_LRU_K, FLUSH_LOCK_TIMEOUT};
use crate::common::{Error, FrameId, PageId, Result};
use crate::storage::page::Page;
use crate::storage::DiskManager;

/// Page table and free list, always changed together under one latch.
struct PoolState {
    /// Maps resident page IDs to frame IDs.
    page_table: HashMap<PageId, FrameId>,

    /// Stack of free frame IDs (LIFO for cache locality).
    free_list: Vec<FrameId>,
}

/// Manages a pool of buffer frames for caching disk pages.
///
/// # Architecture
/// ```text
/// ┌─────────────────────────────────────────────────────────────┐
/// │                    BufferPoolManager                        │
/// │  ┌─────────── state: Mutex ──────────┐                      │
/// │  │ page_table      free_list         │                      │
/// │  │ PageId → Fid    Vec<FrameId>      │                      │
/// │  └───────────────────────────────────┘                      │
/// │  ┌───────────────────────────────────┐                      │
/// │  │        frames: Vec<Frame>         │                      │
/// │  │  [Frame0] [Frame1] [Frame2] ...   │                      │
/// │  └───────────────────────────────────┘                      │
/// │  ┌──────────────┐  ┌────────────────┐  ┌───────────────┐    │
/// │  │   replacer   │  │  disk_manager  │  │     stats     │    │
/// │  │ LruKReplacer │  │ Arc<DiskMgr>   │  │   (atomics)   │    │
/// │  └──────────────┘  └────────────────┘  └───────────────┘    │
/// └─────────────────────────────────────────────────────────────┘
/// ```
///
/// # Thread Safety
/// - `state`: one coarse `Mutex`; every mapping, free-list and pin-count
///   change happens under it, so victim selection and table updates are
///   atomic with respect to other fetches
/// - `replacer`: its own internal lock, always taken after `state`
/// - `frames`: fixed size, each Frame has internal locks
/// - `stats`: no lock, all atomic counters
///
/// Page contents are protected by the frame's `RwLock`, which is never
/// acquired by a caller while it waits on `state`. Callers using the
/// explicit [`fetch_page`](Self::fetch_page) API must release the frame's
/// page lock before calling [`unpin_page`](Self::unpin_page).
///
/// Flushes never block indefinitely on a page lock. A page that stays
/// write-locked for longer than [`FLUSH_LOCK_TIMEOUT`] is reported as
/// `Error::PageLocked` and left dirty; a thread holding a
/// [`PageWriteGuard`] flushes through [`PageWriteGuard::flush`].
///
/// # Usage
/// ```
/// use std::sync::Arc;
/// use pagecore::{BufferPoolManager, DiskManager};
///
/// let dir = tempfile::tempdir().unwrap();
/// let dm = Arc::new(DiskManager::create(dir.path().join("test.db")).unwrap());
/// let bpm = BufferPoolManager::new(10, dm);
///
/// // Allocate a new page
/// let page_id = {
///     let mut guard = bpm.create_page().unwrap();
///     guard.data_mut()[0] = 0xAB;
///     guard.page_id()
/// }; // guard drops: page marked dirty, unpinned
///
/// // Fetch it for reading
/// let guard = bpm.fetch_page_read(page_id).unwrap();
/// assert_eq!(guard.data()[0], 0xAB);
/// ```
pub struct BufferPoolManager {
    /// Fixed pool of frames allocated at startup.
    frames: Vec<Frame>,

    state: Mutex<PoolState>,

    /// Eviction policy for selecting victim frames.
    replacer: LruKReplacer,

    /// Shared with other components; the pool never opens or closes it.
    disk_manager: Arc<DiskManager>,

    stats: BufferPoolStats,

    /// Number of frames in the pool (immutable after construction).
    pool_size: usize,
}

impl BufferPoolManager {
    /// Create a new buffer pool manager with the default LRU-K depth.
    ///
    /// # Panics
    /// Panics if `pool_size` is 0.
    pub fn new(pool_size: usize, disk_manager: Arc<DiskManager>) -> Self {
        assert!(pool_size > 0, "pool_size must be > 0");
        Self::build(pool_size, DEFAULT_LRU_K, disk_manager)
    }

    /// Create a buffer pool manager from a validated config.
    ///
    /// # Errors
    /// - `Error::Config` if the config is rejected by [`BufferPoolConfig::validate`]
    pub fn with_config(config: BufferPoolConfig, disk_manager: Arc<DiskManager>) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config.pool_size, config.lru_k, disk_manager))
    }

    fn build(pool_size: usize, lru_k: usize, disk_manager: Arc<DiskManager>) -> Self {
        let frames: Vec<Frame> = (0..pool_size).map(|_| Frame::new()).collect();

        // Reversed so frame 0 is handed out first
        let free_list: Vec<FrameId> = (0..pool_size).rev().map(FrameId::new).collect();

        debug!(pool_size, lru_k, "buffer pool created");

        Self {
            frames,
            state: Mutex::new(PoolState {
                page_table: HashMap::with_capacity(pool_size),
                free_list,
            }),
            replacer: LruKReplacer::new(lru_k, pool_size),
            disk_manager,
            stats: BufferPoolStats::new(),
            pool_size,
        }
    }

    // ========================================================================
    // Public API: explicit pin/unpin
    // ========================================================================

    /// Pin a page in the pool, loading it from disk on a miss.
    ///
    /// The returned frame stays pinned until a matching
    /// [`unpin_page`](Self::unpin_page). Access the page through
    /// [`frame`](Self::frame).
    ///
    /// # Errors
    /// - `Error::InvalidPageId` for id 0 or an id that was never allocated
    /// - `Error::NoFreeFrames` if all frames are pinned
    /// - `Error::Corruption` / `Error::Io` if the page could not be loaded;
    ///   the frame goes back to the free list and nothing is installed
    pub fn fetch_page(&self, page_id: PageId) -> Result<FrameId> {
        let mut state = self.state.lock();

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            self.frames[frame_id.0].pin();
            self.replacer.record_access(frame_id);
            self.replacer.set_evictable(frame_id, false);
            self.stats.record_hit();
            trace!(%page_id, %frame_id, "buffer pool hit");
            return Ok(frame_id);
        }

        if !page_id.is_valid() || page_id.0 > self.disk_manager.num_pages() {
            return Err(Error::InvalidPageId(page_id));
        }

        let frame_id = self.acquire_frame(&mut state)?;
        let frame = &self.frames[frame_id.0];

        let loaded = {
            let mut page = frame.page_mut();
            self.disk_manager.read_page(page_id, &mut page)
        };
        if let Err(e) = loaded {
            frame.reset();
            state.free_list.push(frame_id);
            self.stats.record_failed_load();
            warn!(%page_id, error = %e, "failed to load page");
            return Err(e);
        }

        self.install(&mut state, frame_id, page_id);
        self.stats.record_load();
        debug!(%page_id, %frame_id, "buffer pool miss, page loaded");

        Ok(frame_id)
    }

    /// Allocate a new page on disk and pin it in the pool.
    ///
    /// The page starts zeroed and clean: its on-disk image already matches.
    ///
    /// # Errors
    /// - `Error::NoFreeFrames` if all frames are pinned
    /// - I/O errors from disk allocation
    pub fn new_page(&self) -> Result<(PageId, FrameId)> {
        let mut state = self.state.lock();

        // Take the frame first so a saturated pool never burns a page id
        let frame_id = self.acquire_frame(&mut state)?;

        let page_id = match self.disk_manager.allocate_page() {
            Ok(page_id) => page_id,
            Err(e) => {
                state.free_list.push(frame_id);
                return Err(e);
            }
        };

        self.frames[frame_id.0].page_mut().reset(page_id);
        self.install(&mut state, frame_id, page_id);
        debug!(%page_id, %frame_id, "new page");

        Ok((page_id, frame_id))
    }

    /// Drop one pin on a resident page.
    ///
    /// `is_dirty = true` marks the page dirty; `false` never clears an
    /// existing dirty flag. When the pin count reaches zero the frame
    /// becomes evictable.
    ///
    /// # Errors
    /// - `Error::PageNotResident` if the page is not in the pool
    /// - `Error::PageNotPinned` if the pin count is already zero (nothing changes)
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> Result<()> {
        let state = self.state.lock();

        let frame_id = *state
            .page_table
            .get(&page_id)
            .ok_or(Error::PageNotResident(page_id))?;
        let frame = &self.frames[frame_id.0];

        let remaining = frame.try_unpin().ok_or(Error::PageNotPinned(page_id))?;
        if is_dirty {
            frame.mark_dirty();
        }
        if remaining == 0 {
            self.replacer.set_evictable(frame_id, true);
        }

        Ok(())
    }

    // ========================================================================
    // Public API: guarded access
    // ========================================================================

    /// Fetch a page for reading (shared access).
    ///
    /// Same as [`fetch_page`](Self::fetch_page), but returns a guard that
    /// holds the page's read lock and unpins on drop.
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<PageReadGuard<'_>> {
        let frame_id = self.fetch_page(page_id)?;
        let lock = self.frames[frame_id.0].page();

        Ok(PageReadGuard::new(self, frame_id, page_id, lock))
    }

    /// Fetch a page for writing (exclusive access).
    ///
    /// The page is marked dirty when the guard drops.
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<PageWriteGuard<'_>> {
        let frame_id = self.fetch_page(page_id)?;
        let lock = self.frames[frame_id.0].page_mut();

        Ok(PageWriteGuard::new(self, frame_id, page_id, lock))
    }

    /// Allocate a new page and return a write guard for it.
    pub fn create_page(&self) -> Result<PageWriteGuard<'_>> {
        let (page_id, frame_id) = self.new_page()?;
        let lock = self.frames[frame_id.0].page_mut();

        Ok(PageWriteGuard::new(self, frame_id, page_id, lock))
    }

    // ========================================================================
    // Public API: delete and flush
    // ========================================================================

    /// Remove a page from the buffer pool.
    ///
    /// Unsaved changes are discarded and the on-disk space is not reclaimed.
    /// Deleting a page that isn't resident is a no-op.
    ///
    /// # Errors
    /// - `Error::PagePinned` if the page is pinned (nothing changes)
    pub fn delete_page(&self, page_id: PageId) -> Result<()> {
        let mut state = self.state.lock();

        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return Ok(());
        };
        let frame = &self.frames[frame_id.0];

        if frame.is_pinned() {
            return Err(Error::PagePinned(page_id));
        }

        state.page_table.remove(&page_id);
        self.replacer.remove(frame_id);
        frame.reset();
        state.free_list.push(frame_id);
        debug!(%page_id, %frame_id, "deleted page from pool");

        Ok(())
    }

    /// Write a page to disk if it's dirty, then clear its dirty flag.
    ///
    /// Pinned pages can be flushed. Flushing a page that isn't resident is
    /// a no-op.
    ///
    /// # Errors
    /// - `Error::PageLocked` if a writer holds the page for longer than
    ///   [`FLUSH_LOCK_TIMEOUT`]; the page stays dirty
    /// - I/O errors from disk write; the page stays dirty
    pub fn flush_page(&self, page_id: PageId) -> Result<()> {
        let frame_id = {
            let state = self.state.lock();

            let Some(&frame_id) = state.page_table.get(&page_id) else {
                return Ok(());
            };
            if !self.frames[frame_id.0].is_dirty() {
                return Ok(());
            }
            self.pin_for_flush(frame_id);
            frame_id
        };

        let result = self.flush_pinned(page_id, frame_id);
        self.release_flush_pins(&[frame_id]);
        result
    }

    /// Flush every dirty page, then sync the file.
    ///
    /// Every dirty page is attempted even if an earlier one fails.
    ///
    /// # Errors
    /// - The first write error; failed pages stay dirty and the file is not synced
    pub fn flush_all_pages(&self) -> Result<()> {
        let mut dirty: Vec<(PageId, FrameId)> = Vec::new();
        {
            let state = self.state.lock();
            for (&page_id, &frame_id) in &state.page_table {
                if self.frames[frame_id.0].is_dirty() {
                    self.pin_for_flush(frame_id);
                    dirty.push((page_id, frame_id));
                }
            }
        }

        let mut first_error = None;
        for &(page_id, frame_id) in &dirty {
            if let Err(e) = self.flush_pinned(page_id, frame_id) {
                first_error.get_or_insert(e);
            }
        }

        let frame_ids: Vec<FrameId> = dirty.iter().map(|&(_, frame_id)| frame_id).collect();
        self.release_flush_pins(&frame_ids);

        if let Some(e) = first_error {
            return Err(e);
        }

        self.disk_manager.sync()?;
        debug!(flushed = dirty.len(), "flushed all dirty pages");
        Ok(())
    }

    // ========================================================================
    // Public API: Stats and info
    // ========================================================================

    /// Counters plus current occupancy.
    pub fn get_stats(&self) -> PoolStats {
        let state = self.state.lock();

        PoolStats {
            counters: self.stats.snapshot(),
            pool_size: self.pool_size,
            resident_pages: state.page_table.len(),
            free_frames: state.free_list.len(),
            pinned_frames: self.frames.iter().filter(|f| f.is_pinned()).count(),
        }
    }

    /// Raw counters.
    pub fn stats(&self) -> &BufferPoolStats {
        &self.stats
    }

    /// Frame by id, for callers of [`fetch_page`](Self::fetch_page).
    pub fn frame(&self, frame_id: FrameId) -> Option<&Frame> {
        self.frames.get(frame_id.0)
    }

    /// Pin count of a resident page.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        self.resident_frame(page_id).map(Frame::pin_count)
    }

    /// Dirty flag of a resident page.
    pub fn is_dirty(&self, page_id: PageId) -> Option<bool> {
        self.resident_frame(page_id).map(Frame::is_dirty)
    }

    /// Whether the page is currently cached.
    pub fn contains_page(&self, page_id: PageId) -> bool {
        self.state.lock().page_table.contains_key(&page_id)
    }

    /// Get the pool size.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Get the number of free frames.
    pub fn free_frame_count(&self) -> usize {
        self.state.lock().free_list.len()
    }

    /// Get the number of pages in the buffer pool.
    pub fn page_count(&self) -> usize {
        self.state.lock().page_table.len()
    }

    /// Number of frames the replacer may currently evict.
    pub fn evictable_count(&self) -> usize {
        self.replacer.size()
    }

    /// The disk manager backing this pool.
    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }

    // ========================================================================
    // Internal: Called by page guards on drop
    // ========================================================================

    pub(crate) fn release_pin(&self, page_id: PageId, is_dirty: bool) {
        if let Err(e) = self.unpin_page(page_id, is_dirty) {
            warn!(%page_id, error = %e, "guard failed to unpin page");
        }
    }

    // ========================================================================
    // Internal: frame allocation and eviction
    // ========================================================================

    fn resident_frame(&self, page_id: PageId) -> Option<&Frame> {
        let state = self.state.lock();
        state
            .page_table
            .get(&page_id)
            .map(|frame_id| &self.frames[frame_id.0])
    }

    /// Map `page_id` into `frame_id` with one pin.
    fn install(&self, state: &mut PoolState, frame_id: FrameId, page_id: PageId) {
        let frame = &self.frames[frame_id.0];
        frame.set_page_id(Some(page_id));
        frame.pin();

        state.page_table.insert(page_id, frame_id);
        self.replacer.record_access(frame_id);
        self.replacer.set_evictable(frame_id, false);
    }

    /// Get a free frame, evicting if necessary.
    ///
    /// A dirty victim is written back first. If that fails the error is
    /// returned and the victim keeps its mapping, dirty flag and replacer
    /// history.
    fn acquire_frame(&self, state: &mut PoolState) -> Result<FrameId> {
        if let Some(frame_id) = state.free_list.pop() {
            return Ok(frame_id);
        }

        let frame_id = self.replacer.victim().ok_or(Error::NoFreeFrames)?;
        let frame = &self.frames[frame_id.0];

        if let Some(old_page_id) = frame.page_id() {
            if frame.is_dirty() {
                // Unpinned frames are not locked by well-behaved callers
                let written = match frame.try_page() {
                    Some(page) => self.write_image(old_page_id, &page),
                    None => Err(Error::PageLocked(old_page_id)),
                };
                if let Err(e) = written {
                    warn!(page_id = %old_page_id, %frame_id, error = %e, "failed to flush eviction victim");
                    return Err(e);
                }
            }
            state.page_table.remove(&old_page_id);
            debug!(page_id = %old_page_id, %frame_id, "evicted page");
        }

        self.replacer.remove(frame_id);
        frame.reset();
        self.stats.record_eviction();

        Ok(frame_id)
    }

    // ========================================================================
    // Internal: write-back
    // ========================================================================

    /// Write a private copy of `page`.
    ///
    /// The copy gets `page_id`, a zero pin count, a clear dirty byte and a
    /// fresh checksum. The caller holds the page's lock.
    fn write_image(&self, page_id: PageId, page: &Page) -> Result<()> {
        let mut image = Page::new();
        image.copy_from(page);
        image.set_page_id(page_id);
        image.set_pin_count(0);
        image.clear_dirty();
        image.update_checksum();

        self.disk_manager.write_page(page_id, &image)?;
        self.stats.record_flush();
        trace!(%page_id, "flushed page");
        Ok(())
    }

    /// Hold a pin across a flush so the frame can't be evicted while the
    /// latch is released. Called with the latch held.
    fn pin_for_flush(&self, frame_id: FrameId) {
        let frame = &self.frames[frame_id.0];
        frame.pin();
        self.replacer.set_evictable(frame_id, false);
        frame.clear_dirty();
    }

    /// Write back a frame pinned by `pin_for_flush`, without the latch.
    fn flush_pinned(&self, page_id: PageId, frame_id: FrameId) -> Result<()> {
        let frame = &self.frames[frame_id.0];
        let result = match frame.try_page_for(FLUSH_LOCK_TIMEOUT) {
            Some(page) => self.write_image(page_id, &page),
            None => Err(Error::PageLocked(page_id)),
        };
        if let Err(e) = &result {
            frame.mark_dirty();
            warn!(%page_id, error = %e, "failed to flush page");
        }
        result
    }

    /// Flush from a page lock the caller already holds.
    ///
    /// Used by [`PageWriteGuard::flush`]; the guard's pin keeps the frame
    /// resident, so the latch isn't needed.
    pub(crate) fn flush_held(&self, page_id: PageId, frame_id: FrameId, page: &Page) -> Result<()> {
        let frame = &self.frames[frame_id.0];
        frame.clear_dirty();
        if let Err(e) = self.write_image(page_id, page) {
            frame.mark_dirty();
            warn!(%page_id, error = %e, "failed to flush page");
            return Err(e);
        }
        Ok(())
    }

    fn release_flush_pins(&self, frame_ids: &[FrameId]) {
        if frame_ids.is_empty() {
            return;
        }

        let _state = self.state.lock();
        for &frame_id in frame_ids {
            if self.frames[frame_id.0].try_unpin() == Some(0) {
                self.replacer.set_evictable(frame_id, true);
            }
        }
    }
}

impl Drop for BufferPoolManager {
    fn drop(&mut self) {
        if !self.disk_manager.is_open() {
            return;
        }
        if let Err(e) = self.flush_all_pages() {
            warn!(error = %e, "failed to flush buffer pool on drop");
        }
    }
}
