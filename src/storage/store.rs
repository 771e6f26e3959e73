//! Page Store
//!
//! Owns the backing file and gives page-granular access to it.
//!
//! ## Responsibilities
//! - Create the file with a fresh header, or parse an existing header
//! - Hand out page ids (freed ids first, then the next monotonic id)
//! - Read a page section by id, always from disk
//! - Replace or append a page section, keeping the header in the same rewrite
//! - Persist the free list whenever a page is deallocated
//!
//! Every write rewrites the whole file (truncate, then write). A crash between
//! the two leaves a truncated file; there is no recovery log.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::ops::Range;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::{debug, info, trace};

use crate::config::{Config, SyncStrategy};
use crate::error::{FlatError, Result};

use super::header::FileHeader;
use super::page::{is_page_marker, section_page_id, Page, PageId, NO_PAGE};

/// Paged access to a single database file
///
/// ## Concurrency:
/// - `state`: one RwLock; reads take it shared, allocation, writes,
///   deallocation and close take it exclusive
/// - `None` inside the lock means the store has been closed
pub struct PageStore {
    /// Path of the backing file
    path: PathBuf,

    /// When to fsync
    sync_strategy: SyncStrategy,

    /// Open file and bookkeeping
    state: RwLock<Option<StoreState>>,
}

struct StoreState {
    /// Read/write handle used for rewrites
    file: File,

    /// In-memory header; persisted on every rewrite
    header: FileHeader,

    /// Next never-used page id
    next_page_id: PageId,
}

impl PageStore {
    /// Open or create the file named by `config.path`
    ///
    /// A missing file is created with a header recording `config.page_size`
    /// and zero pages. An existing file must start with a parsable header.
    pub fn open(config: &Config) -> Result<Self> {
        config.validate()?;
        let path = config.path.clone();

        let (file, header) = if path.exists() {
            let mut file = OpenOptions::new().read(true).write(true).open(&path)?;
            let contents = read_all(&mut file)?;
            let header_end = first_marker(&contents).unwrap_or(contents.len());
            let header = FileHeader::parse(&contents[..header_end])?;
            info!(
                path = %path.display(),
                pages = header.page_count,
                free = header.deallocated.len(),
                "opened database file"
            );
            (file, header)
        } else {
            let mut file = OpenOptions::new()
                .read(true)
                .write(true)
                .create_new(true)
                .open(&path)?;
            let header = FileHeader::new(config.page_size);
            file.write_all(header.encode().as_bytes())?;
            file.sync_all()?;
            info!(path = %path.display(), page_size = config.page_size, "created database file");
            (file, header)
        };

        let next_page_id = header.page_count + 1;

        Ok(Self {
            path,
            sync_strategy: config.sync_strategy,
            state: RwLock::new(Some(StoreState {
                file,
                header,
                next_page_id,
            })),
        })
    }

    /// Open with default settings at `path`
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        let config = Config::builder().path(path.as_ref()).build();
        Self::open(&config)
    }

    // =========================================================================
    // Page Operations
    // =========================================================================

    /// Reserve a page id and return an empty, untyped page for it
    ///
    /// Freed ids are reused before new ones are minted. Nothing is written;
    /// the shrunken free list reaches disk with the next rewrite.
    pub fn allocate_page(&self) -> Result<Page> {
        let mut guard = self.state.write();
        let state = guard.as_mut().ok_or(FlatError::Closed)?;

        let id = match state.header.deallocated.pop_front() {
            Some(id) => {
                debug!(page_id = id, "reusing deallocated page");
                id
            }
            None => {
                let id = state.next_page_id;
                state.next_page_id += 1;
                debug!(page_id = id, "allocated new page");
                id
            }
        };

        Ok(Page::new(id))
    }

    /// Read the last written version of a page
    pub fn read_page(&self, id: PageId) -> Result<Page> {
        let guard = self.state.read();
        let state = guard.as_ref().ok_or(FlatError::Closed)?;

        if id == NO_PAGE || id > state.header.page_count || state.header.is_deallocated(id) {
            return Err(FlatError::PageNotFound(id));
        }

        let reader = BufReader::new(File::open(&self.path)?);
        let section = find_section_streaming(reader, id)?.ok_or(FlatError::PageNotFound(id))?;
        let page = Page::decode(&section)?;
        if page.id != id {
            return Err(FlatError::Format(format!(
                "section for page {} decoded as page {}",
                id, page.id
            )));
        }

        trace!(page_id = id, lsn = page.lsn, "read page");
        Ok(page)
    }

    /// Persist a page, replacing its previous section or appending a new one
    ///
    /// Bumps `page.lsn` once the write succeeds.
    pub fn write_page(&self, page: &mut Page) -> Result<()> {
        let mut guard = self.state.write();
        let state = guard.as_mut().ok_or(FlatError::Closed)?;

        if page.id == NO_PAGE || page.id >= state.next_page_id {
            return Err(FlatError::Storage(format!(
                "page {} was never allocated",
                page.id
            )));
        }
        if state.header.is_deallocated(page.id) {
            return Err(FlatError::Storage(format!(
                "page {} is deallocated",
                page.id
            )));
        }

        let lsn = page.lsn + 1;
        let section = page.encode_with_lsn(lsn)?;

        let contents = read_all(&mut state.file)?;
        let mut body = contents[first_marker(&contents).unwrap_or(contents.len())..].to_string();
        match find_section(&body, page.id) {
            Some(range) => body.replace_range(range, &section),
            None => body.push_str(&section),
        }

        let mut header = state.header.clone();
        header.page_count = header.page_count.max(page.id);
        state.rewrite(&header, &body, self.sync_strategy)?;
        state.header = header;
        page.lsn = lsn;

        trace!(page_id = page.id, lsn, "wrote page");
        Ok(())
    }

    /// Return a page id to the free list and persist the list
    ///
    /// The stale section stays in the file until the id is reused; reads of
    /// a deallocated id fail with `PageNotFound`.
    pub fn deallocate_page(&self, id: PageId) -> Result<()> {
        let mut guard = self.state.write();
        let state = guard.as_mut().ok_or(FlatError::Closed)?;

        if id == NO_PAGE || id >= state.next_page_id {
            return Err(FlatError::PageNotFound(id));
        }
        if state.header.is_deallocated(id) {
            return Err(FlatError::Storage(format!(
                "page {} is already deallocated",
                id
            )));
        }

        let contents = read_all(&mut state.file)?;
        let body = &contents[first_marker(&contents).unwrap_or(contents.len())..];

        let mut header = state.header.clone();
        header.deallocated.push_back(id);
        // an id handed out but never written still has to fit under PAGES
        header.page_count = header.page_count.max(id);
        state.rewrite(&header, body, self.sync_strategy)?;
        state.header = header;

        debug!(page_id = id, "deallocated page");
        Ok(())
    }

    /// Release the file. Later calls fail with `Closed`.
    pub fn close(&self) -> Result<()> {
        let mut guard = self.state.write();
        let state = guard.take().ok_or(FlatError::Closed)?;
        state.file.sync_all()?;
        info!(path = %self.path.display(), "closed database file");
        Ok(())
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_closed(&self) -> bool {
        self.state.read().is_none()
    }

    /// Page size recorded in the header
    pub fn page_size(&self) -> Result<usize> {
        self.with_header(|h| h.page_size)
    }

    /// Highest page id recorded in the header
    pub fn page_count(&self) -> Result<PageId> {
        self.with_header(|h| h.page_count)
    }

    /// Ids waiting to be reused, oldest first
    pub fn free_pages(&self) -> Result<Vec<PageId>> {
        self.with_header(|h| h.deallocated.iter().copied().collect())
    }

    fn with_header<T>(&self, f: impl FnOnce(&FileHeader) -> T) -> Result<T> {
        let guard = self.state.read();
        let state = guard.as_ref().ok_or(FlatError::Closed)?;
        Ok(f(&state.header))
    }
}

impl StoreState {
    /// Replace the whole file with `header` followed by `body`
    fn rewrite(&mut self, header: &FileHeader, body: &str, sync: SyncStrategy) -> Result<()> {
        let mut contents = header.encode();
        contents.push_str(body);

        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(contents.as_bytes())?;
        self.file.flush()?;
        if sync == SyncStrategy::EveryWrite {
            self.file.sync_all()?;
        }
        Ok(())
    }
}

// =============================================================================
// Section Helpers
// =============================================================================

fn read_all(file: &mut File) -> Result<String> {
    file.seek(SeekFrom::Start(0))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    String::from_utf8(bytes).map_err(|e| FlatError::Format(format!("file is not UTF-8: {}", e)))
}

/// Byte offsets of every page marker line
fn marker_offsets(contents: &str) -> Vec<usize> {
    let mut offsets = Vec::new();
    let mut pos = 0;
    for line in contents.split_inclusive('\n') {
        if is_page_marker(line) {
            offsets.push(pos);
        }
        pos += line.len();
    }
    offsets
}

fn first_marker(contents: &str) -> Option<usize> {
    marker_offsets(contents).first().copied()
}

/// Byte range of the first section for `id`, from its marker up to the next
/// marker or end of text
fn find_section(contents: &str, id: PageId) -> Option<Range<usize>> {
    let offsets = marker_offsets(contents);
    offsets.iter().enumerate().find_map(|(i, &start)| {
        let end = offsets.get(i + 1).copied().unwrap_or(contents.len());
        (section_page_id(&contents[start..end]) == Some(id)).then_some(start..end)
    })
}

/// Line-by-line scan for the section of `id`, stopping once it is complete
fn find_section_streaming(reader: impl BufRead, id: PageId) -> Result<Option<String>> {
    let mut current: Option<String> = None;

    for line in reader.lines() {
        let line = line?;
        if is_page_marker(&line) {
            if let Some(section) = current.take() {
                if section_page_id(&section) == Some(id) {
                    return Ok(Some(section));
                }
            }
            current = Some(String::new());
        }
        if let Some(section) = current.as_mut() {
            section.push_str(&line);
            section.push('\n');
        }
    }

    Ok(current.filter(|section| section_page_id(section) == Some(id)))
}
