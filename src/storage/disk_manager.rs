//! Disk Manager - low-level file I/O for database pages.
//!
//! The [`DiskManager`] handles all direct file operations:
//! - Opening and closing the database file
//! - Reading and writing whole pages, with checksum verification on read
//! - Allocating new page ids by growing the file
//! - Forcing writes to durable media

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::common::config::PAGE_SIZE;
use crate::common::{Error, PageId, Result};
use crate::storage::page::Page;

/// How the database file is accessed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum IoMode {
    /// Regular buffered I/O through the OS page cache.
    #[default]
    Buffered,
    /// `O_DIRECT` I/O, bypassing the OS page cache. Falls back to
    /// [`IoMode::Buffered`] when the platform or filesystem refuses it.
    Direct,
}

/// Options for [`DiskManager`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DiskManagerOptions {
    pub io_mode: IoMode,
}

/// One entry of [`DiskManager::read_pages_batch`].
pub struct PageReadRequest<'a> {
    pub page_id: PageId,
    pub page: &'a mut Page,
}

/// One entry of [`DiskManager::write_pages_batch`].
pub struct PageWriteRequest<'a> {
    pub page_id: PageId,
    pub page: &'a Page,
}

/// I/O counters of a [`DiskManager`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DiskStats {
    pub total_reads: u64,
    pub total_writes: u64,
    pub total_allocations: u64,
    pub checksum_failures: u64,
}

struct OpenFile {
    file: File,
    direct: bool,
}

/// Manages disk I/O for a single database file.
///
/// # File Layout
/// The database is stored as a single file with pages laid out sequentially:
/// ```text
/// ┌──────────┬─────────┬─────────┬─────────┬─────────┐
/// │ reserved │ Page 1  │ Page 2  │  ...    │ Page N  │
/// │ (4KB)    │ (4KB)   │ (4KB)   │         │ (4KB)   │
/// └──────────┴─────────┴─────────┴─────────┴─────────┘
/// Offset:  0      4096     8192    ...    N×4096
/// ```
///
/// Page N is located at file offset `N × PAGE_SIZE`. Id 0 is never
/// allocated, so the first 4KB of the file is a reserved slot.
///
/// # Thread Safety
/// All methods take `&self`. The file handle sits behind a mutex, so
/// concurrent reads, writes and allocations are serialized; the page
/// counter is atomic so [`num_pages`](Self::num_pages) never blocks.
///
/// # Durability
/// Writes go to the OS; they are durable only after [`sync`](Self::sync).
pub struct DiskManager {
    path: PathBuf,
    options: DiskManagerOptions,
    file: Mutex<Option<OpenFile>>,
    /// Highest allocated page id.
    num_pages: AtomicU32,
    total_reads: AtomicU64,
    total_writes: AtomicU64,
    total_allocations: AtomicU64,
    checksum_failures: AtomicU64,
}

impl DiskManager {
    /// Create a closed manager for `path` with default options.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self::with_options(path, DiskManagerOptions::default())
    }

    /// Create a closed manager for `path`.
    pub fn with_options<P: AsRef<Path>>(path: P, options: DiskManagerOptions) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            options,
            file: Mutex::new(None),
            num_pages: AtomicU32::new(0),
            total_reads: AtomicU64::new(0),
            total_writes: AtomicU64::new(0),
            total_allocations: AtomicU64::new(0),
            checksum_failures: AtomicU64::new(0),
        }
    }

    /// Create and open a new database file.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", path.as_ref().display()),
            )));
        }
        Self::open_or_create(path)
    }

    /// Open an existing database file, or create it if it doesn't exist.
    pub fn open_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_or_create_with(path, DiskManagerOptions::default())
    }

    /// Like [`open_or_create`](Self::open_or_create) with explicit options.
    pub fn open_or_create_with<P: AsRef<Path>>(
        path: P,
        options: DiskManagerOptions,
    ) -> Result<Self> {
        let dm = Self::with_options(path, options);
        dm.open()?;
        Ok(dm)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Open the backing file, creating it (and its parent directory) if
    /// missing, and recover the allocation high-water mark from its length.
    ///
    /// # Errors
    /// - `Error::AlreadyOpen` if called twice
    /// - `Error::Corruption` if the file length is not a multiple of the page size
    pub fn open(&self) -> Result<()> {
        let mut slot = self.file.lock();
        if slot.is_some() {
            return Err(Error::AlreadyOpen);
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let (file, direct) = open_file(&self.path, self.options.io_mode)?;

        let file_size = file.metadata()?.len();
        if file_size % PAGE_SIZE as u64 != 0 {
            return Err(Error::corruption(
                PageId::INVALID,
                format!("file size {} is not a multiple of the page size", file_size),
            ));
        }

        // The first slot is the reserved page 0.
        let slots = file_size / PAGE_SIZE as u64;
        let num_pages = u32::try_from(slots.saturating_sub(1)).map_err(|_| {
            Error::corruption(PageId::INVALID, "file is larger than the page id space")
        })?;
        self.num_pages.store(num_pages, Ordering::SeqCst);

        debug!(
            path = %self.path.display(),
            num_pages,
            direct_io = direct,
            "disk manager opened"
        );

        *slot = Some(OpenFile { file, direct });
        Ok(())
    }

    /// Sync and release the file handle. Closing a closed manager is a no-op.
    ///
    /// The handle is released even if the final sync fails.
    pub fn close(&self) -> Result<()> {
        let Some(open) = self.file.lock().take() else {
            return Ok(());
        };

        let result = open.file.sync_all();
        debug!(path = %self.path.display(), "disk manager closed");
        result.map_err(Error::from)
    }

    /// Whether the file is currently open.
    pub fn is_open(&self) -> bool {
        self.file.lock().is_some()
    }

    /// Whether the open file is using `O_DIRECT`.
    pub fn using_direct_io(&self) -> bool {
        self.file.lock().as_ref().is_some_and(|open| open.direct)
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    // ========================================================================
    // Page I/O
    // ========================================================================

    /// Read a page from disk into `page` and verify it.
    ///
    /// On error the contents of `page` are unspecified.
    ///
    /// # Errors
    /// - `Error::NotOpen` if the manager is closed
    /// - `Error::InvalidPageId` for id 0 or an id beyond [`num_pages`](Self::num_pages)
    /// - `Error::Corruption` if the checksum or the stored page id doesn't match
    pub fn read_page(&self, page_id: PageId, page: &mut Page) -> Result<()> {
        let mut slot = self.file.lock();
        let open = slot.as_mut().ok_or(Error::NotOpen)?;
        self.read_locked(&mut open.file, page_id, page)
    }

    /// Read several pages under one lock acquisition.
    ///
    /// Equivalent to calling [`read_page`](Self::read_page) for each request
    /// in order: stops at, and returns, the first error.
    pub fn read_pages_batch(&self, requests: &mut [PageReadRequest<'_>]) -> Result<()> {
        if requests.is_empty() {
            return Ok(());
        }

        let mut slot = self.file.lock();
        let open = slot.as_mut().ok_or(Error::NotOpen)?;
        for request in requests.iter_mut() {
            self.read_locked(&mut open.file, request.page_id, request.page)?;
        }
        Ok(())
    }

    /// Write a page to disk.
    ///
    /// The caller must have called [`Page::update_checksum`] after its last
    /// modification. A write either lands completely or returns an error.
    ///
    /// # Errors
    /// - `Error::NotOpen` if the manager is closed
    /// - `Error::InvalidPageId` if the page hasn't been allocated
    /// - `Error::InvalidArgument` if the page's checksum is stale
    pub fn write_page(&self, page_id: PageId, page: &Page) -> Result<()> {
        let mut slot = self.file.lock();
        let open = slot.as_mut().ok_or(Error::NotOpen)?;
        self.write_locked(&mut open.file, page_id, page)
    }

    /// Write several pages under one lock acquisition.
    ///
    /// Equivalent to calling [`write_page`](Self::write_page) for each
    /// request in order: stops at, and returns, the first error.
    pub fn write_pages_batch(&self, requests: &[PageWriteRequest<'_>]) -> Result<()> {
        if requests.is_empty() {
            return Ok(());
        }

        let mut slot = self.file.lock();
        let open = slot.as_mut().ok_or(Error::NotOpen)?;
        for request in requests {
            self.write_locked(&mut open.file, request.page_id, request.page)?;
        }
        Ok(())
    }

    /// Read `pages.len()` consecutive pages starting at `first`.
    ///
    /// The whole range must be allocated; it is checked before anything is
    /// read. Each page is verified like [`read_page`](Self::read_page) and
    /// the call stops at the first page that fails.
    ///
    /// # Errors
    /// - `Error::NotOpen` if the manager is closed
    /// - `Error::InvalidPageId` if the range starts at 0 or runs past [`num_pages`](Self::num_pages)
    /// - `Error::Corruption` for the first page that fails verification
    pub fn read_contiguous(&self, first: PageId, pages: &mut [Page]) -> Result<()> {
        if pages.is_empty() {
            return Ok(());
        }

        let mut slot = self.file.lock();
        let open = slot.as_mut().ok_or(Error::NotOpen)?;
        self.check_range(first, pages.len())?;

        open.file.seek(SeekFrom::Start(first.file_offset(PAGE_SIZE)))?;
        for (page, id) in pages.iter_mut().zip(first.0..) {
            let page_id = PageId::new(id);
            open.file.read_exact(page.as_mut_slice())?;
            self.verify_read(page_id, page)?;
        }
        Ok(())
    }

    /// Write `pages` to consecutive slots starting at `first`.
    ///
    /// The range must already be allocated. Pages are written in order and
    /// the call stops at the first one with a stale checksum; earlier pages
    /// stay written.
    ///
    /// # Errors
    /// - `Error::NotOpen` if the manager is closed
    /// - `Error::InvalidPageId` if the range starts at 0 or runs past [`num_pages`](Self::num_pages)
    /// - `Error::InvalidArgument` for the first page whose checksum is stale
    pub fn write_contiguous(&self, first: PageId, pages: &[Page]) -> Result<()> {
        if pages.is_empty() {
            return Ok(());
        }

        let mut slot = self.file.lock();
        let open = slot.as_mut().ok_or(Error::NotOpen)?;
        self.check_range(first, pages.len())?;

        open.file.seek(SeekFrom::Start(first.file_offset(PAGE_SIZE)))?;
        for (page, id) in pages.iter().zip(first.0..) {
            let page_id = PageId::new(id);
            check_fresh_checksum(page_id, page)?;
            open.file.write_all(page.as_slice())?;
            self.total_writes.fetch_add(1, Ordering::Relaxed);
        }
        trace!(%first, count = pages.len(), "wrote contiguous pages");
        Ok(())
    }

    // ========================================================================
    // Allocation and durability
    // ========================================================================

    /// Allocate a new page on disk.
    ///
    /// Ids are handed out in increasing order starting at 1 and are never
    /// reused. The new page is written as a reset image with a valid
    /// checksum, so it can be read back immediately.
    pub fn allocate_page(&self) -> Result<PageId> {
        let mut slot = self.file.lock();
        let open = slot.as_mut().ok_or(Error::NotOpen)?;

        let next = self
            .num_pages
            .load(Ordering::SeqCst)
            .checked_add(1)
            .ok_or_else(|| Error::InvalidArgument("page id space exhausted".to_string()))?;
        let page_id = PageId::new(next);

        let mut page = Page::new();
        page.reset(page_id);
        page.update_checksum();

        open.file
            .seek(SeekFrom::Start(page_id.file_offset(PAGE_SIZE)))?;
        open.file.write_all(page.as_slice())?;

        self.num_pages.store(next, Ordering::SeqCst);
        self.total_allocations.fetch_add(1, Ordering::Relaxed);
        trace!(%page_id, "allocated page");

        Ok(page_id)
    }

    /// Force all previously issued writes to durable storage.
    ///
    /// This is expensive; it belongs on checkpoint and shutdown paths.
    pub fn sync(&self) -> Result<()> {
        let slot = self.file.lock();
        let open = slot.as_ref().ok_or(Error::NotOpen)?;
        open.file.sync_all()?;
        Ok(())
    }

    /// Highest allocated page id (0 when nothing has been allocated).
    #[inline]
    pub fn num_pages(&self) -> u32 {
        self.num_pages.load(Ordering::SeqCst)
    }

    /// Snapshot of the I/O counters.
    pub fn stats(&self) -> DiskStats {
        DiskStats {
            total_reads: self.total_reads.load(Ordering::Relaxed),
            total_writes: self.total_writes.load(Ordering::Relaxed),
            total_allocations: self.total_allocations.load(Ordering::Relaxed),
            checksum_failures: self.checksum_failures.load(Ordering::Relaxed),
        }
    }

    // ========================================================================
    // Internal
    // ========================================================================

    fn check_page_id(&self, page_id: PageId) -> Result<()> {
        if !page_id.is_valid() || page_id.0 > self.num_pages() {
            return Err(Error::InvalidPageId(page_id));
        }
        Ok(())
    }

    fn check_range(&self, first: PageId, count: usize) -> Result<()> {
        self.check_page_id(first)?;
        let last = u64::from(first.0) + count as u64 - 1;
        if last > u64::from(self.num_pages()) {
            return Err(Error::InvalidPageId(PageId::new(
                self.num_pages().saturating_add(1),
            )));
        }
        Ok(())
    }

    fn read_locked(&self, file: &mut File, page_id: PageId, page: &mut Page) -> Result<()> {
        self.check_page_id(page_id)?;

        file.seek(SeekFrom::Start(page_id.file_offset(PAGE_SIZE)))?;
        file.read_exact(page.as_mut_slice())?;

        self.verify_read(page_id, page)
    }

    /// Checksum and identity checks on a page image just read from disk.
    fn verify_read(&self, page_id: PageId, page: &Page) -> Result<()> {
        if !page.verify_checksum() {
            self.checksum_failures.fetch_add(1, Ordering::Relaxed);
            warn!(%page_id, "checksum mismatch on read");
            return Err(Error::corruption(
                page_id,
                format!(
                    "checksum mismatch: stored {:#010x}, computed {:#010x}",
                    page.checksum(),
                    page.compute_checksum()
                ),
            ));
        }

        let stored = page.page_id();
        if stored.is_valid() && stored != page_id {
            warn!(%page_id, %stored, "page id mismatch on read");
            return Err(Error::corruption(
                page_id,
                format!("page id mismatch: found {}", stored),
            ));
        }

        self.total_reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn write_locked(&self, file: &mut File, page_id: PageId, page: &Page) -> Result<()> {
        self.check_page_id(page_id)?;
        check_fresh_checksum(page_id, page)?;

        file.seek(SeekFrom::Start(page_id.file_offset(PAGE_SIZE)))?;
        file.write_all(page.as_slice())?;

        self.total_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

fn check_fresh_checksum(page_id: PageId, page: &Page) -> Result<()> {
    if !page.verify_checksum() {
        return Err(Error::InvalidArgument(format!(
            "checksum of {} is stale - call update_checksum() before writing",
            page_id
        )));
    }
    Ok(())
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(path = %self.path.display(), error = %e, "failed to close disk manager");
        }
    }
}

/// Open `path` read/write (creating it), honoring `io_mode` where possible.
///
/// Returns the file and whether `O_DIRECT` is in effect.
fn open_file(path: &Path, io_mode: IoMode) -> io::Result<(File, bool)> {
    let mut options = OpenOptions::new();
    options.read(true).write(true).create(true);

    if io_mode == IoMode::Direct {
        #[cfg(target_os = "linux")]
        {
            use std::os::unix::fs::OpenOptionsExt;

            let mut direct = options.clone();
            direct.custom_flags(libc::O_DIRECT);
            match direct.open(path) {
                Ok(file) => return Ok((file, true)),
                Err(e) if e.raw_os_error() == Some(libc::EINVAL) => {
                    warn!(path = %path.display(), "O_DIRECT unsupported here, using buffered I/O");
                }
                Err(e) => return Err(e),
            }
        }
        #[cfg(not(target_os = "linux"))]
        warn!(path = %path.display(), "direct I/O unavailable on this platform, using buffered I/O");
    }

    Ok((options.open(path)?, false))
}
