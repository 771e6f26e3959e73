//! Page definitions
//!
//! A page is one `# PAGE` section of the backing file: a three-line header
//! (`PageID`, `LSN`, `Type`) followed by `Key: Value` payload lines.
//!
//! The `Type` line is resolved into a [`PageContent`] variant when the
//! section is decoded, so Data pages arrive already parsed into records and
//! malformed sections are rejected up front.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{FlatError, Result};

use super::record::DataPage;

/// Page identifier. Assigned monotonically by the store, starting at 1.
pub type PageId = u32;

/// Sentinel meaning "no page" (empty leaf link, unset reference)
pub const NO_PAGE: PageId = 0;

/// Line that opens every page section
pub const PAGE_MARKER: &str = "# PAGE";

/// Untyped `Key: Value` payload of Index and Metadata pages.
/// A BTreeMap keeps the on-disk line order deterministic.
pub type Payload = BTreeMap<String, String>;

const PAGE_ID_KEY: &str = "PageID";
const LSN_KEY: &str = "LSN";
const TYPE_KEY: &str = "Type";

// =============================================================================
// Page Type
// =============================================================================

/// Role of a page within the file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageType {
    /// Holds records
    Data,
    /// Holds one B+Tree node
    Index,
    /// Holds database-level settings (root reference, tree order)
    Metadata,
}

impl PageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageType::Data => "Data",
            PageType::Index => "Index",
            PageType::Metadata => "Metadata",
        }
    }
}

impl fmt::Display for PageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PageType {
    type Err = FlatError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Data" => Ok(PageType::Data),
            "Index" => Ok(PageType::Index),
            "Metadata" => Ok(PageType::Metadata),
            other => Err(FlatError::Format(format!("unknown page type {:?}", other))),
        }
    }
}

// =============================================================================
// Page Content
// =============================================================================

/// Typed body of a page
#[derive(Debug, Clone, PartialEq)]
pub enum PageContent {
    /// Freshly allocated; must be given a type before it can be written
    Unset,
    Data(DataPage),
    Index(Payload),
    Metadata(Payload),
}

impl PageContent {
    /// Empty content of the given kind
    pub fn empty(page_type: PageType) -> Self {
        match page_type {
            PageType::Data => PageContent::Data(DataPage::default()),
            PageType::Index => PageContent::Index(Payload::new()),
            PageType::Metadata => PageContent::Metadata(Payload::new()),
        }
    }

    pub fn page_type(&self) -> Option<PageType> {
        match self {
            PageContent::Unset => None,
            PageContent::Data(_) => Some(PageType::Data),
            PageContent::Index(_) => Some(PageType::Index),
            PageContent::Metadata(_) => Some(PageType::Metadata),
        }
    }
}

// =============================================================================
// Page
// =============================================================================

/// In-memory copy of one page. Changes reach disk only through
/// `PageStore::write_page`.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub id: PageId,

    /// Number of times this page has been written
    pub lsn: u64,

    pub content: PageContent,
}

impl Page {
    /// A page with no type and an empty payload
    pub fn new(id: PageId) -> Self {
        Self {
            id,
            lsn: 0,
            content: PageContent::Unset,
        }
    }

    /// A page of the given type with an empty payload
    pub fn with_type(id: PageId, page_type: PageType) -> Self {
        Self {
            id,
            lsn: 0,
            content: PageContent::empty(page_type),
        }
    }

    pub fn page_type(&self) -> Option<PageType> {
        self.content.page_type()
    }

    /// Give the page a type, discarding any previous payload
    pub fn set_type(&mut self, page_type: PageType) {
        self.content = PageContent::empty(page_type);
    }

    /// Payload of an Index or Metadata page, checked against `expected`
    pub fn payload(&self, expected: PageType) -> Result<&Payload> {
        match (&self.content, expected) {
            (PageContent::Index(payload), PageType::Index)
            | (PageContent::Metadata(payload), PageType::Metadata) => Ok(payload),
            _ => Err(self.type_mismatch(expected)),
        }
    }

    /// Mutable payload of an Index or Metadata page
    pub fn payload_mut(&mut self, expected: PageType) -> Result<&mut Payload> {
        let err = self.type_mismatch(expected);
        match (&mut self.content, expected) {
            (PageContent::Index(payload), PageType::Index)
            | (PageContent::Metadata(payload), PageType::Metadata) => Ok(payload),
            _ => Err(err),
        }
    }

    pub(crate) fn type_mismatch(&self, expected: PageType) -> FlatError {
        match self.page_type() {
            Some(found) => FlatError::WrongPageType {
                page_id: self.id,
                expected,
                found,
            },
            None => FlatError::UntypedPage(self.id),
        }
    }

    // =========================================================================
    // Encoding
    // =========================================================================

    /// Serialize as a `# PAGE` section, including the trailing blank line
    pub fn encode(&self) -> Result<String> {
        self.encode_with_lsn(self.lsn)
    }

    /// Length in bytes of the encoded section
    pub fn encoded_len(&self) -> Result<usize> {
        Ok(self.encode()?.len())
    }

    pub(crate) fn encode_with_lsn(&self, lsn: u64) -> Result<String> {
        let page_type = self.page_type().ok_or(FlatError::UntypedPage(self.id))?;

        let mut out = format!(
            "{}\n{}: {}\n{}: {}\n{}: {}\n",
            PAGE_MARKER, PAGE_ID_KEY, self.id, LSN_KEY, lsn, TYPE_KEY, page_type
        );

        match &self.content {
            PageContent::Data(data) => data.encode_into(&mut out)?,
            PageContent::Index(payload) | PageContent::Metadata(payload) => {
                for (key, value) in payload {
                    push_line(&mut out, key, value)?;
                }
            }
            PageContent::Unset => return Err(FlatError::UntypedPage(self.id)),
        }

        out.push('\n');
        Ok(out)
    }

    /// Parse one `# PAGE` section
    pub fn decode(section: &str) -> Result<Self> {
        let mut lines = section
            .lines()
            .map(|l| l.trim_end_matches('\r'))
            .filter(|l| !l.trim().is_empty());

        match lines.next() {
            Some(first) if is_page_marker(first) => {}
            other => {
                return Err(FlatError::Format(format!(
                    "page section must start with {:?}, found {:?}",
                    PAGE_MARKER, other
                )))
            }
        }

        let mut id = None;
        let mut lsn = None;
        let mut page_type = None;
        let mut payload = Payload::new();

        for line in lines {
            let (key, value) = split_line(line)?;
            match key {
                PAGE_ID_KEY => id = Some(parse_number::<PageId>(PAGE_ID_KEY, value)?),
                LSN_KEY => lsn = Some(parse_number::<u64>(LSN_KEY, value)?),
                TYPE_KEY => page_type = Some(value.parse::<PageType>()?),
                _ => {
                    if payload.insert(key.to_string(), value.to_string()).is_some() {
                        return Err(FlatError::Format(format!(
                            "duplicate payload key {:?}",
                            key
                        )));
                    }
                }
            }
        }

        let id = id.ok_or_else(|| missing(PAGE_ID_KEY))?;
        if id == NO_PAGE {
            return Err(FlatError::Format("page id 0 is reserved".to_string()));
        }
        let lsn = lsn.ok_or_else(|| missing(LSN_KEY))?;
        let page_type = page_type.ok_or_else(|| missing(TYPE_KEY))?;

        let content = match page_type {
            PageType::Data => PageContent::Data(DataPage::from_payload(payload)?),
            PageType::Index => {
                match payload.get("IsLeaf").map(String::as_str) {
                    Some("true") | Some("false") => {}
                    other => {
                        return Err(FlatError::Format(format!(
                            "index page {} has invalid IsLeaf {:?}",
                            id, other
                        )))
                    }
                }
                PageContent::Index(payload)
            }
            PageType::Metadata => PageContent::Metadata(payload),
        };

        Ok(Self { id, lsn, content })
    }
}

// =============================================================================
// Line Helpers
// =============================================================================

/// True if `line` opens a page section (trailing whitespace tolerated)
pub(crate) fn is_page_marker(line: &str) -> bool {
    line.trim_end() == PAGE_MARKER
}

/// Extract the `PageID` of an encoded section without decoding the payload
pub(crate) fn section_page_id(section: &str) -> Option<PageId> {
    section.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        if key.trim() == PAGE_ID_KEY {
            value.trim().parse().ok()
        } else {
            None
        }
    })
}

/// Split a `Key: Value` line. The value keeps everything after the first
/// colon and one following space.
pub(crate) fn split_line(line: &str) -> Result<(&str, &str)> {
    let (key, value) = line
        .split_once(':')
        .ok_or_else(|| FlatError::Format(format!("expected `Key: Value`, found {:?}", line)))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(FlatError::Format(format!("empty key in line {:?}", line)));
    }
    Ok((key, value.strip_prefix(' ').unwrap_or(value)))
}

pub(crate) fn push_line(out: &mut String, key: &str, value: &str) -> Result<()> {
    if key.contains([':', '\n', '\r']) || value.contains(['\n', '\r']) {
        return Err(FlatError::Format(format!(
            "payload entry {:?} cannot be encoded on one line",
            key
        )));
    }
    out.push_str(key);
    out.push_str(": ");
    out.push_str(value);
    out.push('\n');
    Ok(())
}

pub(crate) fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| FlatError::Format(format!("{} is not a number: {:?}", key, value)))
}

fn missing(key: &str) -> FlatError {
    FlatError::Format(format!("page section is missing {}", key))
}
