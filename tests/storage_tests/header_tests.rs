//! Tests for FileHeader

use flatdb::storage::FileHeader;
use flatdb::FlatError;

// =============================================================================
// Encoding Tests
// =============================================================================

#[test]
fn test_new_header_encoding() {
    let header = FileHeader::new(4096);

    assert_eq!(
        header.encode(),
        "# DATABASE HEADER\nPAGESIZE=4096\nENCODING=UTF-8\nVERSION=1.0\nPAGES=0\nDEALLOCATED_PAGES=\n\n"
    );
}

#[test]
fn test_header_round_trip_with_free_pages() {
    let mut header = FileHeader::new(512);
    header.page_count = 9;
    header.deallocated.push_back(7);
    header.deallocated.push_back(3);

    let encoded = header.encode();
    assert!(encoded.contains("DEALLOCATED_PAGES=7,3\n"));

    let parsed = FileHeader::parse(&encoded).unwrap();
    assert_eq!(parsed, header);
    // reuse order survives
    assert_eq!(parsed.deallocated.front(), Some(&7));
}

// =============================================================================
// Parsing Tests
// =============================================================================

#[test]
fn test_parse_tolerates_spacing_and_missing_free_list() {
    let text = "# DATABASE HEADER\nPAGESIZE = 1024\nENCODING=UTF-8\nVERSION=2.1\nPAGES= 4\n";

    let header = FileHeader::parse(text).unwrap();

    assert_eq!(header.page_size, 1024);
    assert_eq!(header.version, "2.1");
    assert_eq!(header.page_count, 4);
    assert!(header.deallocated.is_empty());
}

#[test]
fn test_parse_rejects_missing_marker() {
    let result = FileHeader::parse("PAGESIZE=4096\nPAGES=0\n");
    assert!(matches!(result, Err(FlatError::Format(_))));
}

#[test]
fn test_parse_rejects_missing_page_count() {
    let result = FileHeader::parse("# DATABASE HEADER\nPAGESIZE=4096\nENCODING=UTF-8\n");
    assert!(matches!(result, Err(FlatError::Format(_))));
}

#[test]
fn test_parse_rejects_non_numeric_fields() {
    let result = FileHeader::parse("# DATABASE HEADER\nPAGESIZE=big\nPAGES=0\n");
    assert!(matches!(result, Err(FlatError::Format(_))));
}

#[test]
fn test_parse_rejects_other_encoding() {
    let result = FileHeader::parse("# DATABASE HEADER\nPAGESIZE=4096\nENCODING=latin1\nPAGES=0\n");
    assert!(matches!(result, Err(FlatError::Format(_))));
}

#[test]
fn test_parse_rejects_free_page_outside_range() {
    let result = FileHeader::parse("# DATABASE HEADER\nPAGESIZE=4096\nPAGES=2\nDEALLOCATED_PAGES=5\n");
    assert!(matches!(result, Err(FlatError::Format(_))));

    let result = FileHeader::parse("# DATABASE HEADER\nPAGESIZE=4096\nPAGES=2\nDEALLOCATED_PAGES=0\n");
    assert!(matches!(result, Err(FlatError::Format(_))));
}

#[test]
fn test_parse_rejects_duplicate_free_page() {
    let result = FileHeader::parse("# DATABASE HEADER\nPAGESIZE=4096\nPAGES=4\nDEALLOCATED_PAGES=2,2\n");
    assert!(matches!(result, Err(FlatError::Format(_))));
}

#[test]
fn test_parse_rejects_line_without_equals() {
    let result = FileHeader::parse("# DATABASE HEADER\nPAGESIZE 4096\nPAGES=0\n");
    assert!(matches!(result, Err(FlatError::Format(_))));
}
