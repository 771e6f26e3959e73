//! Error types for flatdb
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

use crate::storage::{PageId, PageType};

/// Result type alias using FlatError
pub type Result<T> = std::result::Result<T, FlatError>;

/// Unified error type for flatdb operations
#[derive(Debug, Error)]
pub enum FlatError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Format Errors
    // -------------------------------------------------------------------------
    #[error("Format error: {0}")]
    Format(String),

    // -------------------------------------------------------------------------
    // Lookup Errors
    // -------------------------------------------------------------------------
    #[error("Page {0} not found")]
    PageNotFound(PageId),

    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Record {entry_index} not found on page {page_id}")]
    RecordNotFound { page_id: PageId, entry_index: u32 },

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    // -------------------------------------------------------------------------
    // Page Errors
    // -------------------------------------------------------------------------
    #[error("Page {page_id} is {found}, expected {expected}")]
    WrongPageType {
        page_id: PageId,
        expected: PageType,
        found: PageType,
    },

    #[error("Page {0} has no type set")]
    UntypedPage(PageId),

    #[error("Storage error: {0}")]
    Storage(String),

    // -------------------------------------------------------------------------
    // Input Errors
    // -------------------------------------------------------------------------
    #[error("Invalid key {0:?}")]
    InvalidKey(String),

    #[error("Invalid value {0:?}")]
    InvalidValue(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("Store is closed")]
    Closed,
}

impl FlatError {
    /// True for outcomes a caller is expected to handle (missing key or page,
    /// duplicate insert) as opposed to I/O or format failures.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            FlatError::PageNotFound(_)
                | FlatError::KeyNotFound(_)
                | FlatError::RecordNotFound { .. }
                | FlatError::DuplicateKey(_)
                | FlatError::InvalidKey(_)
                | FlatError::InvalidValue(_)
        )
    }
}
