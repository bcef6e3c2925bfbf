//! Error types for pagecore.

use thiserror::Error;

use super::PageId;

/// Convenient Result type alias.
///
/// Instead of writing `Result<T, Error>` everywhere, we can write `Result<T>`.
/// This is a common Rust pattern (see `std::io::Result`).
pub type Result<T> = std::result::Result<T, Error>;

/// Broad classification of an [`Error`].
///
/// Callers that only need to decide *how* to react (retry after unpinning,
/// escalate to recovery, fix a bug) can match on the kind instead of every
/// variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad page id or malformed request.
    InvalidArgument,
    /// OS-level read/write/open failure.
    Io,
    /// Checksum or identity mismatch on a page read from disk.
    Corruption,
    /// No frame could be obtained (pool saturated with pinned pages).
    ResourceExhausted,
    /// The operation's precondition did not hold (double unpin, deleting a
    /// pinned page). Pool state is unchanged.
    PreconditionViolated,
    /// The component is not in a state that allows the call (closed file).
    InvalidState,
}

/// All possible errors in pagecore.
///
/// By having a single error type, error handling stays consistent across
/// the storage and buffer layers.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from disk operations.
    ///
    /// This wraps `std::io::Error` from file read/write operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The page id is reserved (0) or beyond the allocation high-water mark.
    #[error("Invalid page ID: {0}")]
    InvalidPageId(PageId),

    /// Any other malformed request.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A page read from disk failed verification.
    #[error("Corruption in {page_id}: {reason}")]
    Corruption { page_id: PageId, reason: String },

    /// Buffer pool has no free frames and cannot evict any pages.
    ///
    /// This happens when all frames are pinned.
    #[error("No free frames available in buffer pool")]
    NoFreeFrames,

    /// Attempted to unpin a page whose pin count is already zero.
    ///
    /// This indicates a bug - unpinning should match pinning.
    #[error("{0} is not pinned")]
    PageNotPinned(PageId),

    /// Attempted to delete a page that is still pinned.
    #[error("{0} is still pinned")]
    PagePinned(PageId),

    /// A flush could not read the page because a writer holds it.
    ///
    /// The page stays dirty. Flush through the write guard, or release it
    /// and retry.
    #[error("{0} is locked for writing")]
    PageLocked(PageId),

    /// The page is not resident in the buffer pool.
    #[error("{0} is not in the buffer pool")]
    PageNotResident(PageId),

    /// The disk manager has not been opened (or was closed).
    #[error("Disk manager is not open")]
    NotOpen,

    /// `open()` was called on a disk manager that is already open.
    #[error("Disk manager is already open")]
    AlreadyOpen,

    /// Rejected configuration value.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Shorthand for building a [`Error::Corruption`].
    pub fn corruption(page_id: PageId, reason: impl Into<String>) -> Self {
        Error::Corruption {
            page_id,
            reason: reason.into(),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(_) => ErrorKind::Io,
            Error::InvalidPageId(_) | Error::InvalidArgument(_) | Error::Config(_) => {
                ErrorKind::InvalidArgument
            }
            Error::Corruption { .. } => ErrorKind::Corruption,
            Error::NoFreeFrames => ErrorKind::ResourceExhausted,
            Error::PageNotPinned(_)
            | Error::PagePinned(_)
            | Error::PageLocked(_)
            | Error::PageNotResident(_) => ErrorKind::PreconditionViolated,
            Error::NotOpen | Error::AlreadyOpen => ErrorKind::InvalidState,
        }
    }

    /// True if the page image on disk failed verification.
    #[inline]
    pub fn is_corruption(&self) -> bool {
        self.kind() == ErrorKind::Corruption
    }
}
