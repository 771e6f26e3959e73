//! Tests for B+Tree nodes

use flatdb::btree::{InternalNode, LeafNode, Node, RecordPointer};
use flatdb::storage::{Page, NO_PAGE};
use flatdb::FlatError;

fn keys(list: &[&str]) -> Vec<String> {
    list.iter().map(|k| k.to_string()).collect()
}

// =============================================================================
// Record Pointer Tests
// =============================================================================

#[test]
fn test_record_pointer_text_form() {
    let pointer = RecordPointer::new(3, 12);

    assert_eq!(pointer.to_string(), "3:12");
    assert_eq!("3:12".parse::<RecordPointer>().unwrap(), pointer);
    assert_eq!(" 4 : 1".parse::<RecordPointer>().unwrap(), RecordPointer::new(4, 1));
}

#[test]
fn test_record_pointer_rejects_garbage() {
    assert!(matches!("3".parse::<RecordPointer>(), Err(FlatError::Format(_))));
    assert!(matches!("a:1".parse::<RecordPointer>(), Err(FlatError::Format(_))));
    assert!(matches!("3:-1".parse::<RecordPointer>(), Err(FlatError::Format(_))));
}

// =============================================================================
// Split Tests
// =============================================================================

#[test]
fn test_leaf_split_links_siblings() {
    let mut leaf = LeafNode::empty(2);
    leaf.keys = keys(&["a", "b", "c", "d"]);
    leaf.pointers = (1..=4).map(|i| RecordPointer::new(9, i)).collect();
    leaf.next_leaf = 8;

    let right = leaf.split_off(5);

    assert_eq!(leaf.keys, keys(&["a", "b"]));
    assert_eq!(right.keys, keys(&["c", "d"]));
    assert_eq!(right.pointers[0], RecordPointer::new(9, 3));
    assert_eq!(leaf.next_leaf, 5);
    assert_eq!(right.next_leaf, 8);
}

#[test]
fn test_internal_split_promotes_middle_key() {
    let mut node = InternalNode {
        id: 4,
        lsn: 0,
        keys: keys(&["b", "d", "f", "h"]),
        children: vec![10, 11, 12, 13, 14],
    };

    let (separator, right) = node.split_off(20);

    assert_eq!(separator, "f");
    assert_eq!(node.keys, keys(&["b", "d"]));
    assert_eq!(node.children, vec![10, 11, 12]);
    assert_eq!(right.id, 20);
    assert_eq!(right.keys, keys(&["h"]));
    assert_eq!(right.children, vec![13, 14]);
}

#[test]
fn test_child_index_routes_equal_keys_right() {
    let node = InternalNode {
        id: 1,
        lsn: 0,
        keys: keys(&["c", "m"]),
        children: vec![2, 3, 4],
    };

    assert_eq!(node.child_index("a"), 0);
    assert_eq!(node.child_index("c"), 1);
    assert_eq!(node.child_index("d"), 1);
    assert_eq!(node.child_index("m"), 2);
    assert_eq!(node.child_index("z"), 2);
}

#[test]
fn test_leaf_search() {
    let mut leaf = LeafNode::empty(2);
    leaf.keys = keys(&["b", "d"]);

    assert_eq!(leaf.search("d"), Ok(1));
    assert_eq!(leaf.search("a"), Err(0));
    assert_eq!(leaf.search("c"), Err(1));
    assert_eq!(leaf.search("e"), Err(2));
}

// =============================================================================
// Decoding Tests
// =============================================================================

#[test]
fn test_decode_leaf_page() {
    let page = Page::decode(
        "# PAGE\nPageID: 2\nLSN: 5\nType: Index\nIsLeaf: true\nKeys: a,b\nPointers: 3:1,3:2\nNextLeaf: 7\n",
    )
    .unwrap();

    let leaf = Node::from_page(&page).unwrap().into_leaf().unwrap();

    assert_eq!(leaf.id, 2);
    assert_eq!(leaf.lsn, 5);
    assert_eq!(leaf.keys, keys(&["a", "b"]));
    assert_eq!(leaf.pointers, vec![RecordPointer::new(3, 1), RecordPointer::new(3, 2)]);
    assert_eq!(leaf.next_leaf, 7);
}

#[test]
fn test_decode_empty_leaf() {
    let page = Page::decode("# PAGE\nPageID: 2\nLSN: 1\nType: Index\nIsLeaf: true\nKeys: \nPointers: \nNextLeaf: 0\n")
        .unwrap();

    let node = Node::from_page(&page).unwrap();

    assert!(node.is_leaf());
    assert!(node.keys().is_empty());
    assert_eq!(node.into_leaf().unwrap().next_leaf, NO_PAGE);
}

#[test]
fn test_decode_internal_page() {
    let page = Page::decode(
        "# PAGE\nPageID: 4\nLSN: 2\nType: Index\nIsLeaf: false\nKeys: c\nChildren: 2,3\n",
    )
    .unwrap();

    let node = Node::from_page(&page).unwrap();

    assert_eq!(node.id(), 4);
    assert!(matches!(node.clone().into_leaf(), Err(FlatError::Format(_))));
    let internal = node.into_internal().unwrap();
    assert_eq!(internal.children, vec![2, 3]);
}

#[test]
fn test_decode_rejects_unsorted_keys() {
    let page = Page::decode(
        "# PAGE\nPageID: 2\nLSN: 1\nType: Index\nIsLeaf: true\nKeys: b,a\nPointers: 3:1,3:2\n",
    )
    .unwrap();

    assert!(matches!(Node::from_page(&page), Err(FlatError::Format(_))));
}

#[test]
fn test_decode_rejects_mismatched_lists() {
    let leaf = Page::decode(
        "# PAGE\nPageID: 2\nLSN: 1\nType: Index\nIsLeaf: true\nKeys: a,b\nPointers: 3:1\n",
    )
    .unwrap();
    assert!(matches!(Node::from_page(&leaf), Err(FlatError::Format(_))));

    let internal = Page::decode(
        "# PAGE\nPageID: 4\nLSN: 1\nType: Index\nIsLeaf: false\nKeys: c\nChildren: 2\n",
    )
    .unwrap();
    assert!(matches!(Node::from_page(&internal), Err(FlatError::Format(_))));
}

#[test]
fn test_decode_rejects_non_index_page() {
    let page = Page::decode("# PAGE\nPageID: 3\nLSN: 1\nType: Data\nEntryIndex: 0\n").unwrap();

    assert!(matches!(
        Node::from_page(&page),
        Err(FlatError::WrongPageType { page_id: 3, .. })
    ));
}
