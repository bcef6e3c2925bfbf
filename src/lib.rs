//! pagecore - the page cache at the bottom of an embedded storage engine.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  callers (engine, index persistence)            │
//! └─────────────────────────────────────────────────────────────────┘
//!                               ↓  fetch / new / unpin / flush
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │                Buffer Pool (buffer/)                     │   │
//! │  │   BufferPoolManager + Frame + guards + statistics        │   │
//! │  │   ┌─────────────────────────────────────────────────┐   │   │
//! │  │   │        Eviction: LRU-K (replacer/)               │   │   │
//! │  │   └─────────────────────────────────────────────────┘   │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │           Storage Layer (storage/)                       │   │
//! │  │     DiskManager + Page + PageHeader (CRC32 checked)      │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - Shared primitives (PageId, FrameId, Error, config)
//! - [`buffer`] - Buffer pool management and the LRU-K replacer
//! - [`storage`] - Disk I/O and page formats
//!
//! # Logging
//! Diagnostics are emitted through `tracing`; install a subscriber in the
//! application to see them.
//!
//! # Quick Start
//! ```no_run
//! use std::sync::Arc;
//! use pagecore::{BufferPoolManager, DiskManager};
//!
//! let dm = Arc::new(DiskManager::open_or_create("my_database.db").unwrap());
//! let bpm = BufferPoolManager::new(64, Arc::clone(&dm));
//!
//! let page_id = {
//!     let mut guard = bpm.create_page().unwrap();
//!     guard.data_mut()[..5].copy_from_slice(b"hello");
//!     guard.page_id()
//! };
//!
//! bpm.flush_all_pages().unwrap();
//! assert_eq!(&bpm.fetch_page_read(page_id).unwrap().data()[..5], b"hello");
//! ```

pub mod buffer;
pub mod common;
pub mod storage;

// Re-export commonly used items at crate root for convenience
pub use common::config::{BufferPoolConfig, PAGE_SIZE};
pub use common::{Error, ErrorKind, FrameId, PageId, Result};

pub use buffer::replacer::LruKReplacer;
pub use buffer::{
    BufferPoolManager, BufferPoolStats, Frame, PageReadGuard, PageWriteGuard, PoolStats,
    StatsSnapshot,
};
pub use storage::page::{Page, PageHeader};
pub use storage::{
    DiskManager, DiskManagerOptions, DiskStats, IoMode, PageReadRequest, PageWriteRequest,
};
