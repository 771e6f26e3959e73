//! Storage Module
//!
//! Paged storage on a single line-oriented text file.
//!
//! ## Responsibilities
//! - Header bootstrap and parsing
//! - Page allocation with free-page recycling
//! - Page-granular reads and writes
//! - Record storage inside Data pages
//!
//! ## File Format
//! ```text
//! # DATABASE HEADER
//! PAGESIZE=4096
//! ENCODING=UTF-8
//! VERSION=1.0
//! PAGES=3
//! DEALLOCATED_PAGES=
//!
//! # PAGE
//! PageID: 1
//! LSN: 2
//! Type: Metadata
//! Order: 4
//! RootPage: 2
//!
//! # PAGE
//! PageID: 3
//! LSN: 1
//! Type: Data
//! EntryIndex: 1
//! Entry-1: user:1|John Doe
//! ```
//!
//! A section runs from its `# PAGE` marker to the next marker or end of file.

mod header;
mod page;
mod record;
mod store;

pub use header::{FileHeader, ENCODING, FORMAT_VERSION, HEADER_MARKER};
pub use page::{Page, PageContent, PageId, PageType, Payload, NO_PAGE, PAGE_MARKER};
pub use record::{DataPage, Record, FIELD_SEPARATOR};
pub use store::PageStore;
