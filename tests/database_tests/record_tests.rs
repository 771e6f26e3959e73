//! Tests for record operations

use std::path::PathBuf;

use flatdb::{Config, Database, FlatError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_db() -> (TempDir, PathBuf, Database) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("records.db");
    let db = Database::open_path(&path).unwrap();
    (temp_dir, path, db)
}

fn value_of(db: &Database, id: &str) -> Option<String> {
    db.get(id)
        .unwrap()
        .and_then(|record| record.field(1).map(str::to_string))
}

// =============================================================================
// Insert/Get Tests
// =============================================================================

#[test]
fn test_insert_and_get() {
    let (_temp, _path, db) = setup_temp_db();

    db.insert("user:1", "John Doe").unwrap();
    db.insert("user:2", "Jane Roe").unwrap();

    let record = db.get("user:1").unwrap().unwrap();
    assert_eq!(record.fields, vec!["user:1", "John Doe"]);
    assert_eq!(value_of(&db, "user:2").as_deref(), Some("Jane Roe"));
}

#[test]
fn test_get_missing() {
    let (_temp, _path, db) = setup_temp_db();
    db.insert("a", "1").unwrap();

    assert!(db.get("b").unwrap().is_none());
}

#[test]
fn test_empty_value_allowed() {
    let (_temp, _path, db) = setup_temp_db();

    db.insert("blank", "").unwrap();

    assert_eq!(value_of(&db, "blank").as_deref(), Some(""));
}

#[test]
fn test_duplicate_insert_keeps_original() {
    let (_temp, _path, db) = setup_temp_db();
    db.insert("user:1", "X").unwrap();

    let result = db.insert("user:1", "Y");

    assert!(matches!(result, Err(FlatError::DuplicateKey(k)) if k == "user:1"));
    assert_eq!(value_of(&db, "user:1").as_deref(), Some("X"));
    assert_eq!(db.len().unwrap(), 1);
}

#[test]
fn test_invalid_keys_rejected() {
    let (_temp, _path, db) = setup_temp_db();

    for key in ["", "a,b", "a|b", "a\nb", "a\rb"] {
        assert!(
            matches!(db.insert(key, "v"), Err(FlatError::InvalidKey(_))),
            "key {:?} accepted",
            key
        );
    }
    assert!(db.is_empty().unwrap());
}

#[test]
fn test_invalid_values_rejected() {
    let (_temp, _path, db) = setup_temp_db();

    assert!(matches!(db.insert("k", "a|b"), Err(FlatError::InvalidValue(_))));
    assert!(matches!(db.insert("k", "two\nlines"), Err(FlatError::InvalidValue(_))));
    assert!(db.get("k").unwrap().is_none());
}

#[test]
fn test_value_with_colons_and_spaces() {
    let (_temp, path, db) = setup_temp_db();

    db.insert("url", " http://host:8080/a b ").unwrap();
    db.close().unwrap();

    let db = Database::open_path(&path).unwrap();
    assert_eq!(value_of(&db, "url").as_deref(), Some(" http://host:8080/a b "));
}

// =============================================================================
// Update Tests
// =============================================================================

#[test]
fn test_update_replaces_value() {
    let (_temp, _path, db) = setup_temp_db();
    db.insert("user:1", "old").unwrap();

    db.update("user:1", "new").unwrap();

    assert_eq!(value_of(&db, "user:1").as_deref(), Some("new"));
    assert_eq!(db.len().unwrap(), 1);
}

#[test]
fn test_update_missing_key() {
    let (_temp, _path, db) = setup_temp_db();

    let result = db.update("ghost", "v");

    assert!(matches!(result, Err(FlatError::KeyNotFound(k)) if k == "ghost"));
}

#[test]
fn test_update_rejects_invalid_value() {
    let (_temp, _path, db) = setup_temp_db();
    db.insert("k", "v").unwrap();

    assert!(matches!(db.update("k", "x|y"), Err(FlatError::InvalidValue(_))));
    assert_eq!(value_of(&db, "k").as_deref(), Some("v"));
}

// =============================================================================
// Delete Tests
// =============================================================================

#[test]
fn test_delete_record() {
    let (_temp, _path, db) = setup_temp_db();
    db.insert("a", "1").unwrap();
    db.insert("b", "2").unwrap();

    db.delete("a").unwrap();

    assert!(db.get("a").unwrap().is_none());
    assert_eq!(value_of(&db, "b").as_deref(), Some("2"));
}

#[test]
fn test_delete_missing_key_keeps_others() {
    let (_temp, _path, db) = setup_temp_db();
    let keys: Vec<String> = (0..12).map(|i| format!("key{:02}", i)).collect();
    for key in &keys {
        db.insert(key, "v").unwrap();
    }

    let result = db.delete("nope");

    assert!(matches!(result, Err(FlatError::KeyNotFound(_))));
    for key in &keys {
        assert!(db.get(key).unwrap().is_some(), "{} lost", key);
    }
    db.check().unwrap();
}

#[test]
fn test_reinsert_after_delete() {
    let (_temp, _path, db) = setup_temp_db();
    db.insert("k", "first").unwrap();
    db.delete("k").unwrap();

    db.insert("k", "second").unwrap();

    assert_eq!(value_of(&db, "k").as_deref(), Some("second"));
}

// =============================================================================
// Scan Tests
// =============================================================================

#[test]
fn test_scan_returns_records_in_key_order() {
    let (_temp, _path, db) = setup_temp_db();
    for key in ["pear", "apple", "mango", "banana", "kiwi", "fig"] {
        db.insert(key, &key.to_uppercase()).unwrap();
    }
    db.delete("mango").unwrap();

    let records = db.scan().unwrap();
    let ids: Vec<&str> = records.iter().filter_map(|r| r.field(0)).collect();

    assert_eq!(ids, vec!["apple", "banana", "fig", "kiwi", "pear"]);
    assert_eq!(records[0].field(1), Some("APPLE"));
    assert_eq!(db.len().unwrap(), 5);
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_reopen_preserves_records() {
    let (_temp, path, db) = setup_temp_db();
    for i in 0..30 {
        db.insert(&format!("user:{:02}", i), &format!("name {}", i)).unwrap();
    }
    db.delete("user:07").unwrap();
    db.update("user:08", "renamed").unwrap();
    let root = db.root();
    db.close().unwrap();

    let db = Database::open_path(&path).unwrap();

    assert_eq!(db.root(), root);
    assert_eq!(db.len().unwrap(), 29);
    assert!(db.get("user:07").unwrap().is_none());
    assert_eq!(value_of(&db, "user:08").as_deref(), Some("renamed"));
    assert_eq!(value_of(&db, "user:29").as_deref(), Some("name 29"));
    db.check().unwrap();

    db.insert("user:30", "after reopen").unwrap();
    assert_eq!(value_of(&db, "user:30").as_deref(), Some("after reopen"));
}

#[test]
fn test_reopen_keeps_stored_order() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("order.db");

    let db = Database::open(Config::builder().path(&path).order(3).build()).unwrap();
    for i in 0..10 {
        db.insert(&format!("k{}", i), "v").unwrap();
    }
    db.close().unwrap();

    let db = Database::open(Config::builder().path(&path).order(16).build()).unwrap();
    let stats = db.check().unwrap();

    assert_eq!(stats.keys, 10);
    assert!(stats.height > 1);
}

// =============================================================================
// Close Tests
// =============================================================================

#[test]
fn test_operations_after_close_fail() {
    let (_temp, _path, db) = setup_temp_db();
    db.insert("a", "1").unwrap();

    db.close().unwrap();

    assert!(matches!(db.get("a"), Err(FlatError::Closed)));
    assert!(matches!(db.insert("b", "2"), Err(FlatError::Closed)));
    assert!(matches!(db.update("a", "2"), Err(FlatError::Closed)));
    assert!(matches!(db.delete("a"), Err(FlatError::Closed)));
    assert!(matches!(db.scan(), Err(FlatError::Closed)));
    assert!(matches!(db.close(), Err(FlatError::Closed)));
}

#[test]
fn test_open_rejects_bad_config() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .path(temp_dir.path().join("bad.db"))
        .order(2)
        .build();

    assert!(matches!(Database::open(config), Err(FlatError::Config(_))));
}
