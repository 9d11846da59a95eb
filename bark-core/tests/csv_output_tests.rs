//! Streaming CSV export of synthetic particle files.

mod common;

use bark_core::{output, CsvCollector, ReadError, Reader};
use common::{particle_file, FileBuilder};
use std::io::Cursor;

#[test]
fn test_csv_export_in_requested_order() {
    let bytes = particle_file(&[2, 0, 1]);
    let mut csv = CsvCollector::new(Vec::new(), &["pdg", "t"]);
    csv.write_header().unwrap();

    let summary = Reader::from_reader(Cursor::new(bytes))
        .read(&["pdg", "t"], &mut csv)
        .unwrap();
    assert_eq!(csv.rows_written(), summary.particles);

    let text = String::from_utf8(csv.finish_writing().unwrap()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines,
        vec!["event,pdg,t", "0,211,0", "0,-211,0.25", "2,111,2"]
    );
}

#[test]
fn test_csv_file_on_truncated_input() {
    let bytes = particle_file(&[1, 2]);
    let cut = bytes.len() - 10;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.csv");
    let mut csv = output::csv_file(&path, &["ncoll"]).unwrap();

    let err = Reader::from_reader(Cursor::new(bytes[..cut].to_vec()))
        .read(&["ncoll"], &mut csv)
        .unwrap_err();
    assert!(matches!(err, ReadError::Truncated { .. }));
    csv.finish_writing().unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert_eq!(text, "event,ncoll\n0,0\n");
}

#[test]
fn test_csv_header_only_for_empty_file() {
    let bytes = FileBuilder::particles(1).build();
    let mut csv = CsvCollector::new(Vec::new(), &["mass"]);
    csv.write_header().unwrap();

    Reader::from_reader(Cursor::new(bytes))
        .read(&["mass"], &mut csv)
        .unwrap();

    let text = String::from_utf8(csv.finish_writing().unwrap()).unwrap();
    assert_eq!(text, "event,mass\n");
}
