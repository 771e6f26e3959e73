//! Configuration for flatdb
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{FlatError, Result};

/// Default page size recorded in a new file header (bytes)
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Default B+Tree order (max children per internal node)
pub const DEFAULT_ORDER: usize = 4;

/// Smallest order for which splits leave both halves non-empty
pub const MIN_ORDER: usize = 3;

/// Main configuration for a flatdb instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// The single backing file. Created on first open.
    pub path: PathBuf,

    /// Page size written into a newly created header.
    /// Existing files keep the value recorded in their header.
    pub page_size: usize,

    /// When to fsync the backing file
    pub sync_strategy: SyncStrategy,

    // -------------------------------------------------------------------------
    // Index Configuration
    // -------------------------------------------------------------------------
    /// B+Tree order for a newly created index.
    /// Reopened files keep the order stored in their metadata page.
    pub order: usize,
}

/// Sync strategy: how often to fsync the backing file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// fsync after every page or header rewrite
    EveryWrite,

    /// fsync once when the store is closed
    OnClose,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./flatdb.db"),
            page_size: DEFAULT_PAGE_SIZE,
            sync_strategy: SyncStrategy::OnClose,
            order: DEFAULT_ORDER,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check values that would otherwise break the tree or the page budget
    pub fn validate(&self) -> Result<()> {
        if self.order < MIN_ORDER {
            return Err(FlatError::Config(format!(
                "order must be at least {}, got {}",
                MIN_ORDER, self.order
            )));
        }
        if self.page_size == 0 {
            return Err(FlatError::Config("page_size must be positive".to_string()));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the backing file path
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.path = path.into();
        self
    }

    /// Set the page size used when creating a new file
    pub fn page_size(mut self, size: usize) -> Self {
        self.config.page_size = size;
        self
    }

    /// Set the sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Set the B+Tree order used when creating a new index
    pub fn order(mut self, order: usize) -> Self {
        self.config.order = order;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
