mod common;

use common::minimal_pdf;
use pdf_query::extract::{extract_pages, load_pdf};

#[test]
fn test_extracts_single_page() {
    let units = extract_pages("doc.pdf", &minimal_pdf("quarterly revenue grew")).unwrap();
    assert_eq!(units.len(), 1);
    assert_eq!(units[0].page, 1);
    assert_eq!(units[0].source, "doc.pdf");
    assert!(units[0].text.contains("quarterly revenue grew"));
}

#[test]
fn test_load_pdf_names_units_after_file() {
    let tmp = tempfile::TempDir::new().unwrap();
    let path = tmp.path().join("notes.pdf");
    std::fs::write(&path, minimal_pdf("meeting notes")).unwrap();

    let units = load_pdf(&path).unwrap();
    assert_eq!(units.len(), 1);
    assert_eq!(units[0].source, "notes.pdf");
    assert!(units[0].text.contains("meeting notes"));
}
