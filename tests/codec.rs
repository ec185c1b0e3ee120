use std::fs::{self, File, OpenOptions};
use std::io::{Cursor, Write};

use assert_matches::assert_matches;

use gex_etl::codec::{self, RowInput};
use gex_etl::domain::HeaderLayout;
use gex_etl::error::GexError;

fn rows<'a>(values: &'a [Vec<f32>]) -> Vec<RowInput<'a>> {
    values
        .iter()
        .enumerate()
        .map(|(i, values)| RowInput {
            id: 100 + i as u32,
            values: values.as_slice(),
        })
        .collect()
}

#[test]
fn keyed_round_trip_keeps_bit_patterns() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tpm.bin");
    let quiet_nan = f32::from_bits(0x7fc0_0001);
    let values = vec![
        vec![1.5, quiet_nan, f32::INFINITY],
        vec![f32::NEG_INFINITY, -0.0, f32::from_bits(1)],
    ];

    let encoded = codec::write_file(&path, HeaderLayout::Keyed, 3, &rows(&values)).unwrap();
    assert_eq!(encoded.header.version(), 2);

    let mut file = File::open(&path).unwrap();
    let header = codec::read_header(&mut file).unwrap();
    assert_eq!(header, encoded.header);

    for (i, span) in encoded.spans.iter().enumerate() {
        let record = codec::read_record(&mut file, header.layout, span.offset, span.length).unwrap();
        assert_eq!(record.id, Some(100 + i as u32));
        let bits: Vec<u32> = record.values.iter().map(|v| v.to_bits()).collect();
        let expected: Vec<u32> = values[i].iter().map(|v| v.to_bits()).collect();
        assert_eq!(bits, expected);
    }
}

#[test]
fn offsets_advance_by_block_size() {
    let values: Vec<Vec<f32>> = (0..5).map(|i| vec![i as f32; 3]).collect();
    let mut buf = Vec::new();
    let encoded = codec::encode(&mut buf, HeaderLayout::Keyed, 3, &rows(&values)).unwrap();

    let block_size = encoded.header.record_size();
    assert_eq!(block_size, 16);
    for (i, span) in encoded.spans.iter().enumerate() {
        assert_eq!(span.offset, 20 + i as u64 * block_size);
        assert_eq!(span.length, block_size);
    }
    assert_eq!(encoded.bytes_written, encoded.header.expected_file_size());
}

#[test]
fn legacy_three_by_four_is_64_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("counts.bin");
    let values: Vec<Vec<f32>> = (0..3).map(|i| vec![i as f32, 1.0, 2.0, 3.0]).collect();

    let encoded = codec::write_file(&path, HeaderLayout::Legacy, 4, &rows(&values)).unwrap();
    assert_eq!(encoded.bytes_written, 64);
    assert_eq!(fs::metadata(&path).unwrap().len(), 64);

    let mut file = File::open(&path).unwrap();
    let header = codec::read_header(&mut file).unwrap();
    assert_eq!(header.layout, HeaderLayout::Legacy);
    let record = codec::read_record(&mut file, header.layout, 48, 16).unwrap();
    assert_eq!(record.id, None);
    assert_eq!(record.values, [2.0, 1.0, 2.0, 3.0]);
}

#[test]
fn reads_outside_the_file_fail() {
    let values = vec![vec![1.0f32, 2.0]];
    let mut buf = Vec::new();
    codec::encode(&mut buf, HeaderLayout::Legacy, 2, &rows(&values)).unwrap();
    let mut cursor = Cursor::new(buf);

    let err = codec::read_values(&mut cursor, 16, 12).unwrap_err();
    assert_matches!(
        err,
        GexError::OutOfBounds {
            offset: 16,
            length: 12,
            file_size: 24
        }
    );
    let err = codec::read_values(&mut cursor, u64::MAX, 4).unwrap_err();
    assert_matches!(err, GexError::OutOfBounds { .. });
    let err = codec::read_values(&mut cursor, 16, 6).unwrap_err();
    assert_matches!(err, GexError::MisalignedLength(6));
    assert_eq!(codec::read_values(&mut cursor, 16, 8).unwrap(), [1.0, 2.0]);
}

#[test]
fn rewrite_leaves_no_stale_tail() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tpm.bin");
    let long: Vec<Vec<f32>> = (0..10).map(|i| vec![i as f32; 2]).collect();
    let short: Vec<Vec<f32>> = (0..2).map(|i| vec![i as f32; 2]).collect();

    codec::write_file(&path, HeaderLayout::Keyed, 2, &rows(&long)).unwrap();
    codec::write_file(&path, HeaderLayout::Keyed, 2, &rows(&short)).unwrap();

    let summary = codec::inspect(&path).unwrap();
    assert_eq!(summary.rows, 2);
    assert_eq!(summary.trailing_bytes, 0);
    assert!(!summary.truncated);
}

#[test]
fn inspect_reports_trailing_and_truncated_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tpm.bin");
    let values = vec![vec![1.0f32, 2.0], vec![3.0, 4.0]];
    codec::write_file(&path, HeaderLayout::Keyed, 2, &rows(&values)).unwrap();

    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(&[0u8; 8]).unwrap();
    drop(file);
    let summary = codec::inspect(&path).unwrap();
    assert_eq!(summary.expected_size, 44);
    assert_eq!(summary.trailing_bytes, 8);

    let file = OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(30).unwrap();
    drop(file);
    let summary = codec::inspect(&path).unwrap();
    assert!(summary.truncated);
}

#[test]
fn missing_directory_is_a_filesystem_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent").join("tpm.bin");
    let err = codec::write_file(&path, HeaderLayout::Keyed, 0, &[]).unwrap_err();
    assert_matches!(err, GexError::Filesystem(_));
}
