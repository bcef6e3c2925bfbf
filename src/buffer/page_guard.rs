//! RAII guards for page access.
//!
//! These guards provide safe access to pages in the buffer pool:
//! - [`PageReadGuard`] - Shared read access (multiple allowed)
//! - [`PageWriteGuard`] - Exclusive write access (marks dirty on release)
//!
//! Both guards hold a pin and auto-unpin the page when dropped. The page
//! lock is released before the pin, so a page never becomes evictable while
//! its lock is held.

use std::ops::{Deref, DerefMut};

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::{FrameId, PageId, Result};
use crate::storage::page::Page;

use super::buffer_pool_manager::BufferPoolManager;

/// One pin on a resident page, released on drop.
///
/// Guards declare it after their lock field; struct fields drop in
/// declaration order, so the lock is gone by the time the pin is released.
struct Pin<'a> {
    bpm: &'a BufferPoolManager,
    frame_id: FrameId,
    page_id: PageId,
    is_dirty: bool,
}

impl Drop for Pin<'_> {
    fn drop(&mut self) {
        self.bpm.release_pin(self.page_id, self.is_dirty);
    }
}

/// Guard for read-only page access.
///
/// Multiple `PageReadGuard`s can exist for the same page simultaneously.
/// The page is automatically unpinned when the guard is dropped.
///
/// # Example
/// ```ignore
/// let guard = bpm.fetch_page_read(page_id)?;
/// let first = guard.data()[0];  // Deref to &Page
/// // guard drops here, page unpinned
/// ```
pub struct PageReadGuard<'a> {
    lock: RwLockReadGuard<'a, Page>,
    pin: Pin<'a>,
}

impl<'a> PageReadGuard<'a> {
    /// Called by `BufferPoolManager::fetch_page_read()`.
    pub(crate) fn new(
        bpm: &'a BufferPoolManager,
        frame_id: FrameId,
        page_id: PageId,
        lock: RwLockReadGuard<'a, Page>,
    ) -> Self {
        Self {
            lock,
            pin: Pin {
                bpm,
                frame_id,
                page_id,
                is_dirty: false,
            },
        }
    }

    /// Get the page ID.
    #[inline]
    pub fn page_id(&self) -> PageId {
        self.pin.page_id
    }

    /// Get the frame ID.
    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.pin.frame_id
    }

    /// Release the lock and the pin now.
    #[inline]
    pub fn drop_guard(self) {}
}

impl std::fmt::Debug for PageReadGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageReadGuard")
            .field("page_id", &self.pin.page_id)
            .field("frame_id", &self.pin.frame_id)
            .finish()
    }
}

impl Deref for PageReadGuard<'_> {
    type Target = Page;

    #[inline]
    fn deref(&self) -> &Page {
        &self.lock
    }
}

/// Guard for exclusive write access to a page.
///
/// Only one `PageWriteGuard` can exist for a page at a time.
/// The page is marked dirty and unpinned when the guard is dropped, unless
/// it was [flushed](Self::flush) and not modified since.
///
/// # Example
/// ```ignore
/// let mut guard = bpm.fetch_page_write(page_id)?;
/// guard.data_mut()[0] = 0xFF;  // DerefMut to &mut Page
/// // guard drops here, page marked dirty and unpinned
/// ```
pub struct PageWriteGuard<'a> {
    lock: RwLockWriteGuard<'a, Page>,
    pin: Pin<'a>,
}

impl<'a> PageWriteGuard<'a> {
    /// Called by `BufferPoolManager::fetch_page_write()` and `create_page()`.
    pub(crate) fn new(
        bpm: &'a BufferPoolManager,
        frame_id: FrameId,
        page_id: PageId,
        lock: RwLockWriteGuard<'a, Page>,
    ) -> Self {
        Self {
            lock,
            pin: Pin {
                bpm,
                frame_id,
                page_id,
                is_dirty: true,
            },
        }
    }

    /// Get the page ID.
    #[inline]
    pub fn page_id(&self) -> PageId {
        self.pin.page_id
    }

    /// Get the frame ID.
    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.pin.frame_id
    }

    /// Write the page to disk through this guard's own lock.
    ///
    /// The pool's [`flush_page`](BufferPoolManager::flush_page) cannot read
    /// a page while this guard holds it; this is the way to persist a page
    /// mid-edit. On success the page is clean until the next mutable access.
    ///
    /// # Errors
    /// - I/O errors from the disk write; the page stays dirty
    pub fn flush(&mut self) -> Result<()> {
        self.pin
            .bpm
            .flush_held(self.pin.page_id, self.pin.frame_id, &self.lock)?;
        self.pin.is_dirty = false;
        Ok(())
    }

    /// Release the lock and the pin now.
    #[inline]
    pub fn drop_guard(self) {}
}

impl std::fmt::Debug for PageWriteGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageWriteGuard")
            .field("page_id", &self.pin.page_id)
            .field("frame_id", &self.pin.frame_id)
            .finish()
    }
}

impl Deref for PageWriteGuard<'_> {
    type Target = Page;

    #[inline]
    fn deref(&self) -> &Page {
        &self.lock
    }
}

impl DerefMut for PageWriteGuard<'_> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Page {
        self.pin.is_dirty = true;
        &mut self.lock
    }
}
