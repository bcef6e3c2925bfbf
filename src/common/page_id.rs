//! Page identifier type.

use std::fmt;

/// Identifies a page on disk.
///
/// Page `N` lives at byte offset `N × PAGE_SIZE` of the database file.
/// Id 0 is reserved: it is never allocated and doubles as the "no page"
/// sentinel, so a zeroed header reads back as [`PageId::INVALID`].
///
/// Using `u32` allows for 4 billion pages:
/// - 4,294,967,295 pages × 4KB ≈ 16TB maximum database size
///
/// # Example
/// ```
/// use pagecore::PageId;
///
/// let page_id = PageId::new(42);
/// assert!(page_id.is_valid());
/// assert_eq!(page_id.0, 42);
/// ```
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(pub u32);

impl PageId {
    /// Invalid/sentinel page ID.
    pub const INVALID: PageId = PageId(0);

    /// Create a new PageId.
    #[inline]
    pub fn new(id: u32) -> Self {
        PageId(id)
    }

    /// Check if this page ID is valid (not the reserved id 0).
    #[inline]
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }

    /// Byte offset of this page in the database file.
    #[inline]
    pub fn file_offset(&self, page_size: usize) -> u64 {
        (self.0 as u64) * (page_size as u64)
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "Page(INVALID)")
        } else {
            write!(f, "Page({})", self.0)
        }
    }
}
