//! Database Module
//!
//! The record façade that sequences page store and index calls.
//!
//! ## Responsibilities
//! - Validate keys and values against the text format
//! - Place records on Data pages, filling the current page up to PAGESIZE
//! - Keep the index and the Data pages in step on insert/update/delete
//! - Gate every operation behind one reader-writer lock

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::Path;

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::btree::{BPlusTree, LIST_SEPARATOR, RecordPointer, TreeStats};
use crate::config::Config;
use crate::error::{FlatError, Result};
use crate::storage::{Page, PageId, PageStore, PageType, Record, FIELD_SEPARATOR};

/// Embedded record store
///
/// Records are `[id, data]` field pairs. Each lives on a Data page and is
/// reachable through the B+Tree entry for its id.
///
/// ## Concurrency Model
///
/// One coarse RwLock covers the store and the index together:
/// - **Reads** (get/scan/check/page): shared
/// - **Writes** (insert/update/delete/close): exclusive for the whole call,
///   including any splits or merges it causes
pub struct Database {
    /// Database configuration
    config: Config,

    /// Index (owning the page store) plus placement state
    state: RwLock<DbState>,
}

struct DbState {
    tree: BPlusTree,

    /// Data page currently receiving new records
    data_tail: Option<PageId>,
}

impl Database {
    /// Open or create a database with the given config
    ///
    /// On startup:
    /// 1. Open/create the backing file
    /// 2. Load the index, or create an empty one for a new file
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        let store = PageStore::open(&config)?;
        let tree = BPlusTree::open(store, config.order)?;

        info!(path = %config.path.display(), root = tree.root(), "database opened");

        Ok(Self {
            config,
            state: RwLock::new(DbState {
                tree,
                data_tail: None,
            }),
        })
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified file
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(Config::builder().path(path.as_ref()).build())
    }

    /// Release the backing file. Later operations fail with `Closed`.
    pub fn close(&self) -> Result<()> {
        let state = self.state.write();
        state.tree.store().close()
    }

    // =========================================================================
    // Record Operations
    // =========================================================================

    /// Insert a new record. Fails with `DuplicateKey` if `id` exists.
    pub fn insert(&self, id: &str, data: &str) -> Result<()> {
        validate_key(id)?;
        validate_value(data)?;

        let mut guard = self.state.write();
        let state = &mut *guard;

        if state.tree.find(id)?.is_some() {
            return Err(FlatError::DuplicateKey(id.to_string()));
        }

        let fields = [id, data];
        let mut page = Self::page_for_record(state, &fields)?;
        let entry_index = page.add_record(&fields)?;
        state.tree.store().write_page(&mut page)?;
        state.data_tail = Some(page.id);

        state
            .tree
            .insert(id, RecordPointer::new(page.id, entry_index))?;
        debug!(id, page_id = page.id, entry_index, "inserted record");
        Ok(())
    }

    /// Get a record by id
    pub fn get(&self, id: &str) -> Result<Option<Record>> {
        let state = self.state.read();

        let Some(pointer) = state.tree.find(id)? else {
            return Ok(None);
        };
        let page = state.tree.store().read_page(pointer.page_id)?;
        page.get_record(pointer.entry_index).map(Some)
    }

    /// Replace the data of an existing record
    pub fn update(&self, id: &str, data: &str) -> Result<()> {
        validate_value(data)?;

        let state = self.state.write();

        let pointer = state
            .tree
            .find(id)?
            .ok_or_else(|| FlatError::KeyNotFound(id.to_string()))?;
        let store = state.tree.store();
        let mut page = store.read_page(pointer.page_id)?;

        let mut fields = page.get_record(pointer.entry_index)?.fields;
        match fields.get_mut(1) {
            Some(slot) => *slot = data.to_string(),
            None => fields.push(data.to_string()),
        }
        page.update_record(pointer.entry_index, &fields)?;
        store.write_page(&mut page)?;

        debug!(id, page_id = page.id, "updated record");
        Ok(())
    }

    /// Delete a record by id. Fails with `KeyNotFound` if absent.
    ///
    /// The index entry goes first so no index entry ever points at a
    /// missing record. A Data page left empty is deallocated.
    pub fn delete(&self, id: &str) -> Result<()> {
        let mut guard = self.state.write();
        let state = &mut *guard;

        let pointer = state.tree.delete(id)?;
        let store = state.tree.store();
        let mut page = store.read_page(pointer.page_id)?;
        page.delete_record(pointer.entry_index)?;

        if page.data()?.is_empty() {
            store.deallocate_page(page.id)?;
            if state.data_tail == Some(page.id) {
                state.data_tail = None;
            }
        } else {
            store.write_page(&mut page)?;
        }

        debug!(id, page_id = pointer.page_id, "deleted record");
        Ok(())
    }

    /// All records in id order
    pub fn scan(&self) -> Result<Vec<Record>> {
        let state = self.state.read();
        let store = state.tree.store();

        let mut pages: HashMap<PageId, Page> = HashMap::new();
        let mut records = Vec::new();
        for (_, pointer) in state.tree.scan()? {
            let page = match pages.entry(pointer.page_id) {
                Entry::Occupied(e) => e.into_mut(),
                Entry::Vacant(e) => e.insert(store.read_page(pointer.page_id)?),
            };
            records.push(page.get_record(pointer.entry_index)?);
        }
        Ok(records)
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Number of indexed records
    pub fn len(&self) -> Result<usize> {
        Ok(self.state.read().tree.scan()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Verify index invariants
    pub fn check(&self) -> Result<TreeStats> {
        self.state.read().tree.check()
    }

    /// Raw page as last written
    pub fn page(&self, id: PageId) -> Result<Page> {
        self.state.read().tree.store().read_page(id)
    }

    /// Current root page of the index
    pub fn root(&self) -> PageId {
        self.state.read().tree.root()
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// The tail Data page if the record fits, otherwise a new Data page
    fn page_for_record(state: &DbState, fields: &[&str]) -> Result<Page> {
        let store = state.tree.store();

        if let Some(tail) = state.data_tail {
            let page = store.read_page(tail)?;
            if page.record_fits(fields, store.page_size()?)? {
                return Ok(page);
            }
        }

        let mut page = store.allocate_page()?;
        page.set_type(PageType::Data);
        debug!(page_id = page.id, "started new data page");
        Ok(page)
    }
}

/// Keys must be non-empty and survive both the index key list and the
/// record field list
fn validate_key(id: &str) -> Result<()> {
    if id.is_empty() || id.contains([LIST_SEPARATOR, FIELD_SEPARATOR, '\n', '\r']) {
        return Err(FlatError::InvalidKey(id.to_string()));
    }
    Ok(())
}

fn validate_value(data: &str) -> Result<()> {
    if data.contains([FIELD_SEPARATOR, '\n', '\r']) {
        return Err(FlatError::InvalidValue(data.to_string()));
    }
    Ok(())
}
