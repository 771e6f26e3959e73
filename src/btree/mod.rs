//! Index Module
//!
//! B+Tree index persisted as Index pages in the page store.
//!
//! ## Responsibilities
//! - Map each primary key to a (page id, entry index) record pointer
//! - Keep nodes between ⌈order/2⌉−1 and order−1 keys (root excepted)
//! - Split on overflow, borrow or merge on underflow
//! - Maintain the left-to-right leaf chain for ordered scans
//!
//! ## Layout
//! ```text
//!                 ┌──────────────┐
//!                 │  Metadata 1  │  RootPage, Order
//!                 └──────┬───────┘
//!                        ▼
//!                 ┌──────────────┐
//!                 │ Internal [c] │
//!                 └──┬────────┬──┘
//!                    ▼        ▼
//!            ┌─────────┐  ┌─────────┐
//!            │ Leaf a,b│─▶│ Leaf c,d│─▶ 0
//!            └─────────┘  └─────────┘
//! ```

mod node;
mod tree;

pub use node::{InternalNode, LeafNode, Node, RecordPointer, LIST_SEPARATOR};
pub use tree::{BPlusTree, TreeStats, META_PAGE_ID};
