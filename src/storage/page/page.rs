//! Page - the fundamental 4KB unit of storage.
//!
//! A [`Page`] is a 4KB byte array: a 64-byte [`PageHeader`] followed by a
//! 4032-byte payload. Header fields are read and written in place, so the
//! page is always exactly its on-disk image. Pages are stored in
//! [`Frame`](crate::buffer::Frame)s within the buffer pool.

use crate::common::config::{PAGE_DATA_SIZE, PAGE_HEADER_SIZE, PAGE_SIZE};
use crate::common::PageId;

use super::page_header::{
    read_u16, read_u32, read_u64, write_u16, write_u32, write_u64, PageHeader,
};

/// A page of data (4KB, 4KB-aligned).
///
/// This is the fundamental unit of I/O between disk and memory.
///
/// # Memory Layout
/// - Size: 4096 bytes (4KB)
/// - Alignment: 4096 bytes, so a `Page` is a valid `O_DIRECT` buffer
///
/// # Concurrency
/// A `Page` has no locking of its own; the buffer pool wraps each one in
/// a per-frame `RwLock`.
///
/// # Clone Implementation
/// `Page` does NOT implement `Clone` in production code: copying 4KB
/// should be explicit, see [`Page::copy_from`]. A `#[cfg(test)]` Clone is
/// provided for tests.
///
/// # Example
/// ```
/// use pagecore::{Page, PageId};
///
/// let mut page = Page::new();
/// page.reset(PageId::new(1));
/// page.data_mut()[0] = 0xFF;
/// page.update_checksum();
/// assert!(page.verify_checksum());
/// ```
#[repr(align(4096))]
pub struct Page {
    data: [u8; PAGE_SIZE],
}

impl Page {
    /// Create a new zeroed page (id 0, no free space recorded).
    #[inline]
    pub fn new() -> Self {
        Self {
            data: [0u8; PAGE_SIZE],
        }
    }

    /// Get the size of a page.
    #[inline]
    pub const fn size() -> usize {
        PAGE_SIZE
    }

    /// Get the size of the payload region.
    #[inline]
    pub const fn data_size() -> usize {
        PAGE_DATA_SIZE
    }

    // ========================================================================
    // Raw access
    // ========================================================================

    /// The full 4096-byte image, header included.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Mutable full image. Writing header bytes through this bypasses the
    /// typed setters.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// The payload region (bytes 64..4096).
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data[PAGE_HEADER_SIZE..]
    }

    /// Mutable payload region.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data[PAGE_HEADER_SIZE..]
    }

    /// Overwrite this page with the contents of `other`.
    #[inline]
    pub fn copy_from(&mut self, other: &Page) {
        self.data.copy_from_slice(&other.data);
    }

    /// Zero out the page and give it a fresh header for `page_id`.
    ///
    /// Free space is set to the full payload, dirty is cleared and the pin
    /// count is zero.
    pub fn reset(&mut self, page_id: PageId) {
        self.data.fill(0);
        PageHeader::new(page_id).write_to(&mut self.data);
    }

    // ========================================================================
    // Header access
    // ========================================================================

    /// Decode the page header.
    pub fn header(&self) -> PageHeader {
        PageHeader::from_bytes(&self.data)
    }

    /// Write a page header.
    pub fn set_header(&mut self, header: &PageHeader) {
        header.write_to(&mut self.data);
    }

    #[inline]
    pub fn page_id(&self) -> PageId {
        PageId::new(read_u32(&self.data, PageHeader::OFFSET_PAGE_ID))
    }

    #[inline]
    pub fn set_page_id(&mut self, page_id: PageId) {
        write_u32(&mut self.data, PageHeader::OFFSET_PAGE_ID, page_id.0);
    }

    #[inline]
    pub fn lsn(&self) -> u64 {
        read_u64(&self.data, PageHeader::OFFSET_LSN)
    }

    /// Stamp the LSN of the log record describing the latest change.
    #[inline]
    pub fn set_lsn(&mut self, lsn: u64) {
        write_u64(&mut self.data, PageHeader::OFFSET_LSN, lsn);
    }

    #[inline]
    pub fn pin_count(&self) -> u32 {
        read_u32(&self.data, PageHeader::OFFSET_PIN_COUNT)
    }

    #[inline]
    pub fn set_pin_count(&mut self, pin_count: u32) {
        write_u32(&mut self.data, PageHeader::OFFSET_PIN_COUNT, pin_count);
    }

    /// Increment the header pin count. Returns the new value.
    pub fn increment_pin_count(&mut self) -> u32 {
        let count = self.pin_count().saturating_add(1);
        self.set_pin_count(count);
        count
    }

    /// Decrement the header pin count, never going below zero.
    pub fn decrement_pin_count(&mut self) -> u32 {
        let count = self.pin_count().saturating_sub(1);
        self.set_pin_count(count);
        count
    }

    #[inline]
    pub fn checksum(&self) -> u32 {
        read_u32(&self.data, PageHeader::OFFSET_CHECKSUM)
    }

    #[inline]
    pub fn free_space(&self) -> u16 {
        read_u16(&self.data, PageHeader::OFFSET_FREE_SPACE)
    }

    #[inline]
    pub fn set_free_space(&mut self, free_space: u16) {
        write_u16(&mut self.data, PageHeader::OFFSET_FREE_SPACE, free_space);
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.data[PageHeader::OFFSET_DIRTY] != 0
    }

    #[inline]
    pub fn mark_dirty(&mut self) {
        self.data[PageHeader::OFFSET_DIRTY] = 1;
    }

    #[inline]
    pub fn clear_dirty(&mut self) {
        self.data[PageHeader::OFFSET_DIRTY] = 0;
    }

    /// Opaque type tag owned by higher layers.
    #[inline]
    pub fn page_type(&self) -> u8 {
        self.data[PageHeader::OFFSET_PAGE_TYPE]
    }

    #[inline]
    pub fn set_page_type(&mut self, page_type: u8) {
        self.data[PageHeader::OFFSET_PAGE_TYPE] = page_type;
    }

    // ========================================================================
    // Checksums
    // ========================================================================

    /// CRC32 of the page image with the checksum field treated as zero.
    pub fn compute_checksum(&self) -> u32 {
        PageHeader::compute_checksum(&self.data)
    }

    /// Compute and store checksum in the header.
    ///
    /// Call this after all modifications to the page (LSN included) are
    /// complete and before the page is written.
    pub fn update_checksum(&mut self) {
        let checksum = self.compute_checksum();
        write_u32(&mut self.data, PageHeader::OFFSET_CHECKSUM, checksum);
    }

    /// Verify the page checksum is valid.
    pub fn verify_checksum(&self) -> bool {
        self.checksum() == self.compute_checksum()
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page").field("header", &self.header()).finish()
    }
}

// Clone only available in tests - forces explicit copying in production
#[cfg(test)]
impl Clone for Page {
    fn clone(&self) -> Self {
        let mut new_page = Page::new();
        new_page.copy_from(self);
        new_page
    }
}

// ============================================================================
// TESTS
// ============================================================================
