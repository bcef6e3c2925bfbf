//! Frame - one page-sized slot of the buffer pool.
//!
//! A [`Frame`] owns a [`Page`] buffer and the bookkeeping the pool keeps
//! outside the page image: the resident page id, the pin count and the
//! dirty flag.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::common::PageId;
use crate::storage::page::Page;

/// A slot in the buffer pool's frame arena.
///
/// The pool allocates all frames up front and never moves them, so a
/// [`FrameId`](crate::FrameId) stays valid for the lifetime of the pool.
///
/// While a page is cached, the frame's pin count and dirty flag are the
/// source of truth. The matching header bytes inside the page are only
/// filled in on the copy that is written to disk.
///
/// The resident id is stored as a raw `u32`: page id 0 is never allocated,
/// so 0 doubles as "free". The pool changes the id and the pin count only
/// while holding its latch; the page bytes are guarded by their own
/// `RwLock`.
pub struct Frame {
    page: RwLock<Page>,
    page_id: AtomicU32,
    pin_count: AtomicU32,
    is_dirty: AtomicBool,
}

impl Frame {
    /// A free frame holding a zeroed page.
    pub fn new() -> Self {
        Self {
            page: RwLock::new(Page::new()),
            page_id: AtomicU32::new(PageId::INVALID.0),
            pin_count: AtomicU32::new(0),
            is_dirty: AtomicBool::new(false),
        }
    }

    // ========================================================================
    // Page bytes
    // ========================================================================

    /// Shared access to the page, blocking while a writer holds it.
    #[inline]
    pub fn page(&self) -> RwLockReadGuard<'_, Page> {
        self.page.read()
    }

    /// Exclusive access to the page.
    ///
    /// Drop the lock before unpinning the page and before asking the pool
    /// to flush it; a flush of a write-locked page fails with
    /// [`Error::PageLocked`](crate::Error::PageLocked).
    #[inline]
    pub fn page_mut(&self) -> RwLockWriteGuard<'_, Page> {
        self.page.write()
    }

    /// Shared access if no writer currently holds the page.
    #[inline]
    pub(crate) fn try_page(&self) -> Option<RwLockReadGuard<'_, Page>> {
        self.page.try_read()
    }

    /// Shared access, waiting at most `timeout` for a writer to finish.
    #[inline]
    pub(crate) fn try_page_for(&self, timeout: Duration) -> Option<RwLockReadGuard<'_, Page>> {
        self.page.try_read_for(timeout)
    }

    // ========================================================================
    // Resident page
    // ========================================================================

    /// Id of the cached page, or `None` for a free frame.
    #[inline]
    pub fn page_id(&self) -> Option<PageId> {
        let raw = self.page_id.load(Ordering::Acquire);
        Some(PageId::new(raw)).filter(PageId::is_valid)
    }

    #[inline]
    pub(crate) fn set_page_id(&self, page_id: Option<PageId>) {
        let raw = page_id.unwrap_or(PageId::INVALID).0;
        self.page_id.store(raw, Ordering::Release);
    }

    // ========================================================================
    // Pins
    // ========================================================================

    /// Add a pin; returns the new count.
    #[inline]
    pub(crate) fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Drop a pin; returns the new count, or `None` (and changes nothing)
    /// when the frame had no pins.
    #[inline]
    pub(crate) fn try_unpin(&self) -> Option<u32> {
        self.pin_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                count.checked_sub(1)
            })
            .ok()
            .map(|old| old - 1)
    }

    #[inline]
    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.pin_count() > 0
    }

    // ========================================================================
    // Dirty flag
    // ========================================================================

    /// Record that the cached page differs from its on-disk image.
    #[inline]
    pub fn mark_dirty(&self) {
        self.is_dirty.store(true, Ordering::Release);
    }

    #[inline]
    pub(crate) fn clear_dirty(&self) {
        self.is_dirty.store(false, Ordering::Release);
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::Acquire)
    }

    // ========================================================================
    // State
    // ========================================================================

    /// No page cached here.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.page_id().is_none()
    }

    /// A cached page with no pins: a candidate for eviction.
    #[inline]
    pub fn is_evictable(&self) -> bool {
        !self.is_empty() && !self.is_pinned()
    }

    /// Return the frame to the free state with a zeroed page.
    ///
    /// Used after eviction, deletion and failed loads.
    pub(crate) fn reset(&self) {
        self.page_mut().reset(PageId::INVALID);
        self.set_page_id(None);
        self.pin_count.store(0, Ordering::Release);
        self.clear_dirty();
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("page_id", &self.page_id())
            .field("pin_count", &self.pin_count())
            .field("is_dirty", &self.is_dirty())
            .finish()
    }
}
