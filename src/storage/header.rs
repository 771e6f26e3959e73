//! Database file header
//!
//! The header is the block before the first `# PAGE` marker:
//!
//! ```text
//! # DATABASE HEADER
//! PAGESIZE=4096
//! ENCODING=UTF-8
//! VERSION=1.0
//! PAGES=7
//! DEALLOCATED_PAGES=5,3
//! ```
//!
//! It is regenerated from memory on every rewrite of the file, so the page
//! count and free list always land in the same write as the page bodies.

use std::collections::VecDeque;

use crate::error::{FlatError, Result};

use super::page::{parse_number, PageId, NO_PAGE};

/// First line of every database file
pub const HEADER_MARKER: &str = "# DATABASE HEADER";

/// The only supported text encoding
pub const ENCODING: &str = "UTF-8";

/// Format version written into new files
pub const FORMAT_VERSION: &str = "1.0";

const PAGE_SIZE_KEY: &str = "PAGESIZE";
const ENCODING_KEY: &str = "ENCODING";
const VERSION_KEY: &str = "VERSION";
const PAGES_KEY: &str = "PAGES";
const DEALLOCATED_KEY: &str = "DEALLOCATED_PAGES";

/// Parsed database header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub page_size: usize,
    pub encoding: String,
    pub version: String,

    /// Highest page id recorded in the file
    pub page_count: PageId,

    /// Freed page ids, reused oldest first
    pub deallocated: VecDeque<PageId>,
}

impl FileHeader {
    /// Header of an empty database
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            encoding: ENCODING.to_string(),
            version: FORMAT_VERSION.to_string(),
            page_count: 0,
            deallocated: VecDeque::new(),
        }
    }

    pub fn is_deallocated(&self, id: PageId) -> bool {
        self.deallocated.contains(&id)
    }

    /// Serialize, including the blank line that separates it from the pages
    pub fn encode(&self) -> String {
        let free: Vec<String> = self.deallocated.iter().map(|id| id.to_string()).collect();
        format!(
            "{}\n{}={}\n{}={}\n{}={}\n{}={}\n{}={}\n\n",
            HEADER_MARKER,
            PAGE_SIZE_KEY,
            self.page_size,
            ENCODING_KEY,
            self.encoding,
            VERSION_KEY,
            self.version,
            PAGES_KEY,
            self.page_count,
            DEALLOCATED_KEY,
            free.join(",")
        )
    }

    /// Parse the header block (text before the first page marker)
    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text
            .lines()
            .map(|l| l.trim_end_matches('\r'))
            .filter(|l| !l.trim().is_empty());

        match lines.next() {
            Some(first) if first.trim_end() == HEADER_MARKER => {}
            other => {
                return Err(FlatError::Format(format!(
                    "file must start with {:?}, found {:?}",
                    HEADER_MARKER, other
                )))
            }
        }

        let mut page_size = None;
        let mut encoding = None;
        let mut version = None;
        let mut page_count = None;
        let mut deallocated = VecDeque::new();

        for line in lines {
            let (key, value) = line.split_once('=').ok_or_else(|| {
                FlatError::Format(format!("expected KEY=VALUE in header, found {:?}", line))
            })?;
            let (key, value) = (key.trim(), value.trim());

            match key {
                PAGE_SIZE_KEY => page_size = Some(parse_number::<usize>(key, value)?),
                ENCODING_KEY => encoding = Some(value.to_string()),
                VERSION_KEY => version = Some(value.to_string()),
                PAGES_KEY => page_count = Some(parse_number::<PageId>(key, value)?),
                DEALLOCATED_KEY => {
                    for id in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                        deallocated.push_back(parse_number::<PageId>(key, id)?);
                    }
                }
                _ => tracing::warn!(key, "ignoring unknown header field"),
            }
        }

        let page_size = page_size.ok_or_else(|| missing(PAGE_SIZE_KEY))?;
        let page_count = page_count.ok_or_else(|| missing(PAGES_KEY))?;
        let encoding = encoding.unwrap_or_else(|| ENCODING.to_string());
        if encoding != ENCODING {
            return Err(FlatError::Format(format!("unsupported encoding {:?}", encoding)));
        }

        for (i, &id) in deallocated.iter().enumerate() {
            if id == NO_PAGE || id > page_count {
                return Err(FlatError::Format(format!(
                    "deallocated page {} outside 1..={}",
                    id, page_count
                )));
            }
            if deallocated.iter().skip(i + 1).any(|&other| other == id) {
                return Err(FlatError::Format(format!("page {} deallocated twice", id)));
            }
        }

        Ok(Self {
            page_size,
            encoding,
            version: version.unwrap_or_else(|| FORMAT_VERSION.to_string()),
            page_count,
            deallocated,
        })
    }
}

fn missing(key: &str) -> FlatError {
    FlatError::Format(format!("header is missing {}", key))
}
