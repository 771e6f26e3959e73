//! B+Tree nodes
//!
//! A node is a decoded view of one Index page. It is rebuilt from the page
//! on every read and turned back into a page on every write.
//!
//! ```text
//! leaf:      IsLeaf: true   Keys: a,b     Pointers: 3:1,3:2   NextLeaf: 7
//! internal:  IsLeaf: false  Keys: m       Children: 2,7
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::{FlatError, Result};
use crate::storage::{Page, PageContent, PageId, PageType, Payload, NO_PAGE};

const IS_LEAF_KEY: &str = "IsLeaf";
const KEYS_KEY: &str = "Keys";
const POINTERS_KEY: &str = "Pointers";
const CHILDREN_KEY: &str = "Children";
const NEXT_LEAF_KEY: &str = "NextLeaf";

/// Separator for key, pointer and child lists
pub const LIST_SEPARATOR: char = ',';

// =============================================================================
// Record Pointer
// =============================================================================

/// Location of a record: Data page id plus entry index within that page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordPointer {
    pub page_id: PageId,
    pub entry_index: u32,
}

impl RecordPointer {
    pub fn new(page_id: PageId, entry_index: u32) -> Self {
        Self {
            page_id,
            entry_index,
        }
    }
}

impl fmt::Display for RecordPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.page_id, self.entry_index)
    }
}

impl FromStr for RecordPointer {
    type Err = FlatError;

    /// "3:1" → RecordPointer { page_id: 3, entry_index: 1 }
    fn from_str(s: &str) -> Result<Self> {
        let bad = || FlatError::Format(format!("invalid record pointer {:?}", s));
        let (page, entry) = s.split_once(':').ok_or_else(bad)?;
        Ok(Self {
            page_id: page.trim().parse().map_err(|_| bad())?,
            entry_index: entry.trim().parse().map_err(|_| bad())?,
        })
    }
}

// =============================================================================
// Nodes
// =============================================================================

/// Leaf: keys with parallel record pointers and a link to the next leaf
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafNode {
    pub id: PageId,
    pub lsn: u64,
    pub keys: Vec<String>,
    pub pointers: Vec<RecordPointer>,
    /// `NO_PAGE` for the rightmost leaf
    pub next_leaf: PageId,
}

/// Internal node: `children.len() == keys.len() + 1`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalNode {
    pub id: PageId,
    pub lsn: u64,
    pub keys: Vec<String>,
    pub children: Vec<PageId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Leaf(LeafNode),
    Internal(InternalNode),
}

impl LeafNode {
    pub fn empty(id: PageId) -> Self {
        Self {
            id,
            lsn: 0,
            keys: Vec::new(),
            pointers: Vec::new(),
            next_leaf: NO_PAGE,
        }
    }

    /// `Ok(position)` of an exact match, else `Err(insertion point)`
    pub fn search(&self, key: &str) -> std::result::Result<usize, usize> {
        self.keys.binary_search_by(|k| k.as_str().cmp(key))
    }

    /// Move the upper half into a new leaf with id `right_id` and link it
    /// after this one
    pub fn split_off(&mut self, right_id: PageId) -> LeafNode {
        let mid = self.keys.len() / 2;
        let right = LeafNode {
            id: right_id,
            lsn: 0,
            keys: self.keys.split_off(mid),
            pointers: self.pointers.split_off(mid),
            next_leaf: self.next_leaf,
        };
        self.next_leaf = right_id;
        right
    }
}

impl InternalNode {
    /// Index of the child whose range holds `key`
    pub fn child_index(&self, key: &str) -> usize {
        self.keys.partition_point(|k| k.as_str() <= key)
    }

    /// Move the keys above the middle into a new node with id `right_id`.
    /// Returns the middle key, which moves up to the parent.
    pub fn split_off(&mut self, right_id: PageId) -> (String, InternalNode) {
        let mid = self.keys.len() / 2;
        let right = InternalNode {
            id: right_id,
            lsn: 0,
            keys: self.keys.split_off(mid + 1),
            children: self.children.split_off(mid + 1),
        };
        let separator = self.keys.pop().unwrap_or_default();
        (separator, right)
    }
}

impl Node {
    pub fn id(&self) -> PageId {
        match self {
            Node::Leaf(leaf) => leaf.id,
            Node::Internal(node) => node.id,
        }
    }

    pub fn keys(&self) -> &[String] {
        match self {
            Node::Leaf(leaf) => &leaf.keys,
            Node::Internal(node) => &node.keys,
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_))
    }

    pub fn into_leaf(self) -> Result<LeafNode> {
        match self {
            Node::Leaf(leaf) => Ok(leaf),
            Node::Internal(node) => Err(FlatError::Format(format!(
                "page {} is an internal node where a leaf was expected",
                node.id
            ))),
        }
    }

    pub fn into_internal(self) -> Result<InternalNode> {
        match self {
            Node::Internal(node) => Ok(node),
            Node::Leaf(leaf) => Err(FlatError::Format(format!(
                "page {} is a leaf where an internal node was expected",
                leaf.id
            ))),
        }
    }

    /// Decode an Index page, checking list lengths and key order
    pub fn from_page(page: &Page) -> Result<Node> {
        let payload = page.payload(PageType::Index)?;
        let field = |key: &str| -> String { payload.get(key).cloned().unwrap_or_default() };

        let keys: Vec<String> = split_list(&field(KEYS_KEY)).map(str::to_string).collect();
        if let Some(pair) = keys.windows(2).find(|w| w[0] >= w[1]) {
            return Err(FlatError::Format(format!(
                "keys out of order in node {}: {:?} >= {:?}",
                page.id, pair[0], pair[1]
            )));
        }

        let node = if field(IS_LEAF_KEY) == "true" {
            let pointers = split_list(&field(POINTERS_KEY))
                .map(str::parse::<RecordPointer>)
                .collect::<Result<Vec<RecordPointer>>>()?;
            if pointers.len() != keys.len() {
                return Err(FlatError::Format(format!(
                    "leaf {} has {} keys but {} pointers",
                    page.id,
                    keys.len(),
                    pointers.len()
                )));
            }
            let next_leaf = match field(NEXT_LEAF_KEY).as_str() {
                "" => NO_PAGE,
                s => parse_page_id(s)?,
            };
            Node::Leaf(LeafNode {
                id: page.id,
                lsn: page.lsn,
                keys,
                pointers,
                next_leaf,
            })
        } else {
            let children = split_list(&field(CHILDREN_KEY))
                .map(parse_page_id)
                .collect::<Result<Vec<PageId>>>()?;
            if children.len() != keys.len() + 1 {
                return Err(FlatError::Format(format!(
                    "internal node {} has {} keys but {} children",
                    page.id,
                    keys.len(),
                    children.len()
                )));
            }
            Node::Internal(InternalNode {
                id: page.id,
                lsn: page.lsn,
                keys,
                children,
            })
        };

        Ok(node)
    }
}

// =============================================================================
// Encoding
// =============================================================================

/// Conversion back into an Index page
pub(crate) trait NodePage {
    fn to_page(&self) -> Page;
    fn set_lsn(&mut self, lsn: u64);
}

impl NodePage for LeafNode {
    fn to_page(&self) -> Page {
        let mut payload = Payload::new();
        payload.insert(IS_LEAF_KEY.to_string(), "true".to_string());
        payload.insert(KEYS_KEY.to_string(), join_list(&self.keys));
        payload.insert(POINTERS_KEY.to_string(), join_list(&self.pointers));
        payload.insert(NEXT_LEAF_KEY.to_string(), self.next_leaf.to_string());
        index_page(self.id, self.lsn, payload)
    }

    fn set_lsn(&mut self, lsn: u64) {
        self.lsn = lsn;
    }
}

impl NodePage for InternalNode {
    fn to_page(&self) -> Page {
        let mut payload = Payload::new();
        payload.insert(IS_LEAF_KEY.to_string(), "false".to_string());
        payload.insert(KEYS_KEY.to_string(), join_list(&self.keys));
        payload.insert(CHILDREN_KEY.to_string(), join_list(&self.children));
        index_page(self.id, self.lsn, payload)
    }

    fn set_lsn(&mut self, lsn: u64) {
        self.lsn = lsn;
    }
}

impl NodePage for Node {
    fn to_page(&self) -> Page {
        match self {
            Node::Leaf(leaf) => leaf.to_page(),
            Node::Internal(node) => node.to_page(),
        }
    }

    fn set_lsn(&mut self, lsn: u64) {
        match self {
            Node::Leaf(leaf) => leaf.lsn = lsn,
            Node::Internal(node) => node.lsn = lsn,
        }
    }
}

fn index_page(id: PageId, lsn: u64, payload: Payload) -> Page {
    Page {
        id,
        lsn,
        content: PageContent::Index(payload),
    }
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value
        .split(LIST_SEPARATOR)
        .filter(move |_| !value.is_empty())
}

fn join_list<T: ToString>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",")
}

fn parse_page_id(s: &str) -> Result<PageId> {
    s.trim()
        .parse()
        .map_err(|_| FlatError::Format(format!("invalid page id {:?}", s)))
}
