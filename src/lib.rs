//! # flatdb
//!
//! A minimal embedded database:
//! - Records keyed by a string id, stored in one flat text file
//! - Paged storage with free-page recycling
//! - B+Tree index for O(log n) lookups and ordered scans
//! - Single-process, multi-reader/single-writer concurrency
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Database                              │
//! │        insert / get / update / delete / scan                │
//! │                 (one RwLock per instance)                   │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │   B+Tree    │          │ Data pages  │
//!   │(Index pages)│          │  (records)  │
//!   └──────┬──────┘          └──────┬──────┘
//!          │                        │
//!          └───────────┬────────────┘
//!                      ▼
//!              ┌──────────────┐
//!              │  PageStore   │
//!              │ (text file)  │
//!              └──────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod storage;
pub mod btree;
pub mod database;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{FlatError, Result};
pub use config::{Config, SyncStrategy};
pub use database::Database;
pub use btree::{BPlusTree, RecordPointer, TreeStats};
pub use storage::{Page, PageId, PageStore, PageType, Record};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of flatdb
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
