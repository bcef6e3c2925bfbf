//! Page types and layout.
//!
//! This module contains:
//! - [`Page`] - The 4KB data container with in-place header accessors
//! - [`PageHeader`] - Decoded view of the 64-byte header

#[allow(clippy::module_inception)]
mod page;
mod page_header;

pub use page::Page;
pub use page_header::PageHeader;
