//! B+Tree over Index pages
//!
//! The root reference lives in the Metadata page (page 1), which is created
//! together with an empty root leaf the first time a store is opened.
//!
//! Write ordering keeps the tree readable between page writes:
//! - split: new right sibling, then the original node, then the parent
//! - merge: surviving node, then the parent, then the freed page
//! - root change: new root page, then the metadata page, then the old root

use std::collections::HashSet;

use tracing::{debug, info, warn};

use crate::config::MIN_ORDER;
use crate::error::{FlatError, Result};
use crate::storage::{Page, PageId, PageStore, PageType, NO_PAGE};

use super::node::{InternalNode, LeafNode, Node, NodePage, RecordPointer};

/// Well-known id of the Metadata page
pub const META_PAGE_ID: PageId = 1;

const META_ROOT_KEY: &str = "RootPage";
const META_ORDER_KEY: &str = "Order";

/// Shape of a tree as measured by [`BPlusTree::check`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStats {
    /// Levels from root to leaves (1 for a lone root leaf)
    pub height: usize,
    pub leaves: usize,
    pub internal_nodes: usize,
    pub keys: usize,
}

/// Separator and new right sibling produced by a split
struct Split {
    separator: String,
    right: PageId,
}

/// Outcome of removing a key below some node
struct Removal {
    pointer: RecordPointer,
    underflow: bool,
}

/// B+Tree index mapping keys to record pointers
///
/// Mutations take `&mut self`; callers sharing a tree must hold an exclusive
/// lock across each insert or delete.
pub struct BPlusTree {
    store: PageStore,
    root: PageId,
    order: usize,
}

impl BPlusTree {
    /// Load the tree from `store`, creating it if the store is empty
    ///
    /// `order` only applies to a new tree; an existing tree keeps the order
    /// recorded in its metadata page.
    pub fn open(store: PageStore, order: usize) -> Result<Self> {
        if order < MIN_ORDER {
            return Err(FlatError::Config(format!(
                "order must be at least {}, got {}",
                MIN_ORDER, order
            )));
        }

        if store.page_count()? == 0 {
            return Self::bootstrap(store, order);
        }

        let meta = store.read_page(META_PAGE_ID).map_err(|e| match e {
            FlatError::PageNotFound(_) => {
                FlatError::Format("metadata page is missing".to_string())
            }
            other => other,
        })?;
        let payload = meta.payload(PageType::Metadata)?;
        let root: PageId = parse_meta(payload.get(META_ROOT_KEY), META_ROOT_KEY)?;
        let stored_order: usize = parse_meta(payload.get(META_ORDER_KEY), META_ORDER_KEY)?;
        if stored_order < MIN_ORDER {
            return Err(FlatError::Format(format!(
                "stored order {} is below {}",
                stored_order, MIN_ORDER
            )));
        }
        if stored_order != order {
            warn!(
                configured = order,
                stored = stored_order,
                "using the tree order recorded in the file"
            );
        }

        debug!(root, order = stored_order, "loaded index");
        Ok(Self {
            store,
            root,
            order: stored_order,
        })
    }

    fn bootstrap(store: PageStore, order: usize) -> Result<Self> {
        let mut meta = store.allocate_page()?;
        if meta.id != META_PAGE_ID {
            return Err(FlatError::Format(format!(
                "empty store handed out page {} before the metadata page",
                meta.id
            )));
        }

        let mut root = LeafNode::empty(store.allocate_page()?.id);
        write_node(&store, &mut root)?;

        meta.set_type(PageType::Metadata);
        let payload = meta.payload_mut(PageType::Metadata)?;
        payload.insert(META_ROOT_KEY.to_string(), root.id.to_string());
        payload.insert(META_ORDER_KEY.to_string(), order.to_string());
        store.write_page(&mut meta)?;

        info!(root = root.id, order, "created empty index");
        Ok(Self {
            store,
            root: root.id,
            order,
        })
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn store(&self) -> &PageStore {
        &self.store
    }

    pub fn root(&self) -> PageId {
        self.root
    }

    pub fn order(&self) -> usize {
        self.order
    }

    fn max_keys(&self) -> usize {
        self.order - 1
    }

    /// ⌈order/2⌉ − 1
    fn min_keys(&self) -> usize {
        (self.order + 1) / 2 - 1
    }

    pub fn read_node(&self, id: PageId) -> Result<Node> {
        Node::from_page(&self.store.read_page(id)?)
    }

    // =========================================================================
    // Find
    // =========================================================================

    /// Pointer stored for `key`, if any
    pub fn find(&self, key: &str) -> Result<Option<RecordPointer>> {
        let leaf = self.find_leaf(key)?;
        Ok(leaf.search(key).ok().map(|i| leaf.pointers[i]))
    }

    fn find_leaf(&self, key: &str) -> Result<LeafNode> {
        self.descend(|node| node.child_index(key))
    }

    fn leftmost_leaf(&self) -> Result<LeafNode> {
        self.descend(|_| 0)
    }

    fn descend(&self, choose: impl Fn(&InternalNode) -> usize) -> Result<LeafNode> {
        let limit = self.store.page_count()? as usize;
        let mut id = self.root;
        for _ in 0..=limit {
            match self.read_node(id)? {
                Node::Leaf(leaf) => return Ok(leaf),
                Node::Internal(node) => id = node.children[choose(&node)],
            }
        }
        Err(FlatError::Format(format!(
            "no leaf reached within {} levels from root {}",
            limit, self.root
        )))
    }

    // =========================================================================
    // Insert
    // =========================================================================

    /// Add `key → pointer`. Existing keys are never overwritten.
    pub fn insert(&mut self, key: &str, pointer: RecordPointer) -> Result<()> {
        let Some(split) = self.insert_into(self.root, key, pointer)? else {
            return Ok(());
        };

        let mut new_root = InternalNode {
            id: self.store.allocate_page()?.id,
            lsn: 0,
            keys: vec![split.separator],
            children: vec![self.root, split.right],
        };
        write_node(&self.store, &mut new_root)?;
        info!(
            old_root = self.root,
            new_root = new_root.id,
            "root split, tree grew one level"
        );
        self.set_root(new_root.id)
    }

    fn insert_into(&self, page_id: PageId, key: &str, pointer: RecordPointer) -> Result<Option<Split>> {
        match self.read_node(page_id)? {
            Node::Leaf(mut leaf) => {
                let pos = match leaf.search(key) {
                    Ok(_) => return Err(FlatError::DuplicateKey(key.to_string())),
                    Err(pos) => pos,
                };
                leaf.keys.insert(pos, key.to_string());
                leaf.pointers.insert(pos, pointer);

                if leaf.keys.len() <= self.max_keys() {
                    write_node(&self.store, &mut leaf)?;
                    return Ok(None);
                }

                let mut right = leaf.split_off(self.store.allocate_page()?.id);
                write_node(&self.store, &mut right)?;
                write_node(&self.store, &mut leaf)?;
                debug!(left = leaf.id, right = right.id, separator = %right.keys[0], "split leaf");

                Ok(Some(Split {
                    separator: right.keys[0].clone(),
                    right: right.id,
                }))
            }
            Node::Internal(mut node) => {
                let idx = node.child_index(key);
                let Some(split) = self.insert_into(node.children[idx], key, pointer)? else {
                    return Ok(None);
                };

                node.keys.insert(idx, split.separator);
                node.children.insert(idx + 1, split.right);

                if node.keys.len() <= self.max_keys() {
                    write_node(&self.store, &mut node)?;
                    return Ok(None);
                }

                let (separator, mut right) = node.split_off(self.store.allocate_page()?.id);
                write_node(&self.store, &mut right)?;
                write_node(&self.store, &mut node)?;
                debug!(left = node.id, right = right.id, separator = %separator, "split internal node");

                Ok(Some(Split {
                    separator,
                    right: right.id,
                }))
            }
        }
    }

    // =========================================================================
    // Delete
    // =========================================================================

    /// Remove `key` and return the pointer it mapped to
    pub fn delete(&mut self, key: &str) -> Result<RecordPointer> {
        let removal = self.delete_from(self.root, key, true)?;
        self.collapse_root()?;
        Ok(removal.pointer)
    }

    fn delete_from(&self, page_id: PageId, key: &str, is_root: bool) -> Result<Removal> {
        match self.read_node(page_id)? {
            Node::Leaf(mut leaf) => {
                let pos = leaf
                    .search(key)
                    .map_err(|_| FlatError::KeyNotFound(key.to_string()))?;
                leaf.keys.remove(pos);
                let pointer = leaf.pointers.remove(pos);
                write_node(&self.store, &mut leaf)?;

                Ok(Removal {
                    pointer,
                    underflow: !is_root && leaf.keys.len() < self.min_keys(),
                })
            }
            Node::Internal(mut node) => {
                let idx = node.child_index(key);
                let removal = self.delete_from(node.children[idx], key, false)?;
                if !removal.underflow {
                    return Ok(removal);
                }

                let released = self.rebalance_child(&mut node, idx)?;
                write_node(&self.store, &mut node)?;
                if let Some(freed) = released {
                    self.store.deallocate_page(freed)?;
                }

                Ok(Removal {
                    pointer: removal.pointer,
                    underflow: !is_root && node.keys.len() < self.min_keys(),
                })
            }
        }
    }

    /// Fix an underflowing child of `parent` by borrowing from a sibling or
    /// merging with one. Writes the children; the caller writes `parent`
    /// and then deallocates the returned page, if any.
    fn rebalance_child(&self, parent: &mut InternalNode, idx: usize) -> Result<Option<PageId>> {
        match self.read_node(parent.children[idx])? {
            Node::Leaf(child) => self.rebalance_leaf(parent, idx, child),
            Node::Internal(child) => self.rebalance_internal(parent, idx, child),
        }
    }

    fn rebalance_leaf(
        &self,
        parent: &mut InternalNode,
        idx: usize,
        mut child: LeafNode,
    ) -> Result<Option<PageId>> {
        let min = self.min_keys();

        let mut left = match idx {
            0 => None,
            _ => Some(self.read_node(parent.children[idx - 1])?.into_leaf()?),
        };
        if let Some(left) = left.as_mut().filter(|l| l.keys.len() > min) {
            let last = left.keys.len() - 1;
            child.keys.insert(0, left.keys.remove(last));
            child.pointers.insert(0, left.pointers.remove(last));
            parent.keys[idx - 1] = child.keys[0].clone();
            write_node(&self.store, left)?;
            write_node(&self.store, &mut child)?;
            debug!(from = left.id, to = child.id, "leaf borrowed from left sibling");
            return Ok(None);
        }

        let mut right = match parent.children.get(idx + 1) {
            Some(&id) => Some(self.read_node(id)?.into_leaf()?),
            None => None,
        };
        if let Some(right) = right.as_mut().filter(|r| r.keys.len() > min) {
            child.keys.push(right.keys.remove(0));
            child.pointers.push(right.pointers.remove(0));
            parent.keys[idx] = right.keys[0].clone();
            write_node(&self.store, right)?;
            write_node(&self.store, &mut child)?;
            debug!(from = right.id, to = child.id, "leaf borrowed from right sibling");
            return Ok(None);
        }

        if let Some(mut left) = left {
            left.keys.append(&mut child.keys);
            left.pointers.append(&mut child.pointers);
            left.next_leaf = child.next_leaf;
            parent.keys.remove(idx - 1);
            parent.children.remove(idx);
            write_node(&self.store, &mut left)?;
            debug!(merged = child.id, into = left.id, "merged leaf into left sibling");
            return Ok(Some(child.id));
        }

        if let Some(mut right) = right {
            child.keys.append(&mut right.keys);
            child.pointers.append(&mut right.pointers);
            child.next_leaf = right.next_leaf;
            parent.keys.remove(idx);
            parent.children.remove(idx + 1);
            write_node(&self.store, &mut child)?;
            debug!(merged = right.id, into = child.id, "merged right sibling into leaf");
            return Ok(Some(right.id));
        }

        Ok(None)
    }

    fn rebalance_internal(
        &self,
        parent: &mut InternalNode,
        idx: usize,
        mut child: InternalNode,
    ) -> Result<Option<PageId>> {
        let min = self.min_keys();

        let mut left = match idx {
            0 => None,
            _ => Some(self.read_node(parent.children[idx - 1])?.into_internal()?),
        };
        if let Some(left) = left.as_mut().filter(|l| l.keys.len() > min) {
            let last = left.keys.len() - 1;
            let separator = std::mem::replace(&mut parent.keys[idx - 1], left.keys.remove(last));
            child.keys.insert(0, separator);
            child.children.insert(0, left.children.remove(last + 1));
            write_node(&self.store, left)?;
            write_node(&self.store, &mut child)?;
            debug!(from = left.id, to = child.id, "internal node borrowed from left sibling");
            return Ok(None);
        }

        let mut right = match parent.children.get(idx + 1) {
            Some(&id) => Some(self.read_node(id)?.into_internal()?),
            None => None,
        };
        if let Some(right) = right.as_mut().filter(|r| r.keys.len() > min) {
            let separator = std::mem::replace(&mut parent.keys[idx], right.keys.remove(0));
            child.keys.push(separator);
            child.children.push(right.children.remove(0));
            write_node(&self.store, right)?;
            write_node(&self.store, &mut child)?;
            debug!(from = right.id, to = child.id, "internal node borrowed from right sibling");
            return Ok(None);
        }

        if let Some(mut left) = left {
            left.keys.push(parent.keys.remove(idx - 1));
            left.keys.append(&mut child.keys);
            left.children.append(&mut child.children);
            parent.children.remove(idx);
            write_node(&self.store, &mut left)?;
            debug!(merged = child.id, into = left.id, "merged internal node into left sibling");
            return Ok(Some(child.id));
        }

        if let Some(mut right) = right {
            child.keys.push(parent.keys.remove(idx));
            child.keys.append(&mut right.keys);
            child.children.append(&mut right.children);
            parent.children.remove(idx + 1);
            write_node(&self.store, &mut child)?;
            debug!(merged = right.id, into = child.id, "merged right sibling into internal node");
            return Ok(Some(right.id));
        }

        Ok(None)
    }

    /// Replace a root internal node that has no keys left by its only child
    fn collapse_root(&mut self) -> Result<()> {
        loop {
            let Node::Internal(root) = self.read_node(self.root)? else {
                return Ok(());
            };
            if !root.keys.is_empty() {
                return Ok(());
            }

            let old_root = self.root;
            self.set_root(root.children[0])?;
            self.store.deallocate_page(old_root)?;
            info!(old_root, new_root = self.root, "root collapsed, tree shrank one level");
        }
    }

    fn set_root(&mut self, root: PageId) -> Result<()> {
        let mut meta = self.store.read_page(META_PAGE_ID)?;
        meta.payload_mut(PageType::Metadata)?
            .insert(META_ROOT_KEY.to_string(), root.to_string());
        self.store.write_page(&mut meta)?;
        self.root = root;
        Ok(())
    }

    // =========================================================================
    // Scan
    // =========================================================================

    /// Every entry in key order
    pub fn scan(&self) -> Result<Vec<(String, RecordPointer)>> {
        let leaf = self.leftmost_leaf()?;
        self.walk_leaves(leaf, None)
    }

    /// Entries with keys `>= start`, in key order
    pub fn scan_from(&self, start: &str) -> Result<Vec<(String, RecordPointer)>> {
        let leaf = self.find_leaf(start)?;
        self.walk_leaves(leaf, Some(start))
    }

    fn walk_leaves(
        &self,
        first: LeafNode,
        start: Option<&str>,
    ) -> Result<Vec<(String, RecordPointer)>> {
        let mut entries = Vec::new();
        let mut visited = HashSet::new();
        let mut leaf = first;

        loop {
            if !visited.insert(leaf.id) {
                return Err(FlatError::Format(format!(
                    "leaf chain revisits page {}",
                    leaf.id
                )));
            }
            for (key, pointer) in leaf.keys.into_iter().zip(leaf.pointers) {
                if start.map_or(true, |s| key.as_str() >= s) {
                    entries.push((key, pointer));
                }
            }
            if leaf.next_leaf == NO_PAGE {
                return Ok(entries);
            }
            leaf = self.read_node(leaf.next_leaf)?.into_leaf()?;
        }
    }

    // =========================================================================
    // Verification
    // =========================================================================

    /// Walk the whole tree and verify its structural invariants
    ///
    /// Checks key order, separator ranges, occupancy bounds, equal leaf
    /// depth and that the leaf chain visits every leaf once, left to right,
    /// with strictly ascending keys. Any violation is a `Format` error.
    pub fn check(&self) -> Result<TreeStats> {
        let mut checker = Checker {
            tree: self,
            stats: TreeStats::default(),
            leaves: Vec::new(),
            visited: HashSet::new(),
        };
        checker.visit(self.root, None, None, 1, true)?;
        checker.check_leaf_chain()?;
        Ok(checker.stats)
    }
}

struct Checker<'a> {
    tree: &'a BPlusTree,
    stats: TreeStats,
    /// Leaf ids in left-to-right tree order
    leaves: Vec<PageId>,
    visited: HashSet<PageId>,
}

impl Checker<'_> {
    fn visit(
        &mut self,
        id: PageId,
        lower: Option<&str>,
        upper: Option<&str>,
        depth: usize,
        is_root: bool,
    ) -> Result<()> {
        if !self.visited.insert(id) {
            return Err(corrupt(format!("page {} is referenced twice", id)));
        }

        let node = self.tree.read_node(id)?;
        let keys = node.keys();

        if keys.len() > self.tree.max_keys() {
            return Err(corrupt(format!("node {} holds {} keys", id, keys.len())));
        }
        if !is_root && keys.len() < self.tree.min_keys() {
            return Err(corrupt(format!("node {} underflows with {} keys", id, keys.len())));
        }
        for key in keys {
            let below = lower.map_or(false, |l| key.as_str() < l);
            let above = upper.map_or(false, |u| key.as_str() >= u);
            if below || above {
                return Err(corrupt(format!(
                    "key {:?} in node {} is outside [{:?}, {:?})",
                    key, id, lower, upper
                )));
            }
        }

        match node {
            Node::Leaf(leaf) => {
                match self.stats.height {
                    0 => self.stats.height = depth,
                    h if h != depth => {
                        return Err(corrupt(format!(
                            "leaf {} at depth {} but other leaves at depth {}",
                            id, depth, h
                        )))
                    }
                    _ => {}
                }
                self.stats.leaves += 1;
                self.stats.keys += leaf.keys.len();
                self.leaves.push(id);
            }
            Node::Internal(node) => {
                if is_root && node.keys.is_empty() {
                    return Err(corrupt(format!("root {} is internal with no keys", id)));
                }
                self.stats.internal_nodes += 1;
                for (i, &child) in node.children.iter().enumerate() {
                    let child_lower = if i == 0 { lower } else { Some(node.keys[i - 1].as_str()) };
                    let child_upper = node.keys.get(i).map(String::as_str).or(upper);
                    self.visit(child, child_lower, child_upper, depth + 1, false)?;
                }
            }
        }
        Ok(())
    }

    fn check_leaf_chain(&self) -> Result<()> {
        let mut expected = self.leaves.iter();
        let mut next = self.leaves.first().copied().unwrap_or(NO_PAGE);
        let mut last_key: Option<String> = None;

        while next != NO_PAGE {
            match expected.next() {
                Some(&id) if id == next => {}
                other => {
                    return Err(corrupt(format!(
                        "leaf chain reaches page {} where tree order expects {:?}",
                        next, other
                    )))
                }
            }
            let leaf = self.tree.read_node(next)?.into_leaf()?;
            for key in &leaf.keys {
                if last_key.as_deref().map_or(false, |last| last >= key.as_str()) {
                    return Err(corrupt(format!("leaf chain not ascending at {:?}", key)));
                }
                last_key = Some(key.clone());
            }
            next = leaf.next_leaf;
        }

        if let Some(missed) = expected.next() {
            return Err(corrupt(format!("leaf chain stops before leaf {}", missed)));
        }
        Ok(())
    }
}

fn corrupt(message: String) -> FlatError {
    FlatError::Format(format!("index corrupted: {}", message))
}

fn write_node<N: NodePage>(store: &PageStore, node: &mut N) -> Result<()> {
    let mut page: Page = node.to_page();
    store.write_page(&mut page)?;
    node.set_lsn(page.lsn);
    Ok(())
}

fn parse_meta<T: std::str::FromStr>(value: Option<&String>, key: &str) -> Result<T> {
    value
        .and_then(|v| v.trim().parse().ok())
        .ok_or_else(|| FlatError::Format(format!("metadata page has no valid {}", key)))
}
