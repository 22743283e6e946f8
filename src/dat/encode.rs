//! Byte-level encoders for the DAT layout.
//!
//! The converter never writes archives back; these encoders exist to build
//! well-formed (and deliberately broken) archives for tests and fixtures, and
//! are hidden from the generated docs.

use super::float::{FLOAT_RECORDS_OFFSET, FLOAT_RECORD_LEN};
use super::header::{ArchiveHeader, HEADER_LEN, YEAR_EPOCH};
use super::tag::{TAG_NAME_LEN, TAG_RECORDS_OFFSET, TAG_RECORD_LEN};
use chrono::{NaiveDateTime, Timelike};
use std::io;
use std::path::Path;

/// Encodes a header into its 8-byte form.
pub fn encode_header(header: &ArchiveHeader) -> [u8; HEADER_LEN] {
    let mut buf = [0u8; HEADER_LEN];
    buf[0] = header.format_version;
    buf[1] = header.date.year.saturating_sub(YEAR_EPOCH).min(255) as u8;
    buf[2] = header.date.month;
    buf[3] = header.date.day;
    // counts beyond i32::MAX are not representable in the format
    let rows = i32::try_from(header.row_count).unwrap_or(i32::MAX);
    buf[4..8].copy_from_slice(&rows.to_le_bytes());
    buf
}

/// Input for [`encode_float_record`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FloatSample {
    /// Record timestamp, millisecond precision.
    pub timestamp: NaiveDateTime,
    /// Tag id the value belongs to.
    pub internal_id: i32,
    /// Sample value.
    pub value: f64,
    /// Status byte.
    pub status: u8,
    /// Marker byte.
    pub marker: u8,
}

impl FloatSample {
    /// A sample with status `G` and a blank marker.
    pub fn new(timestamp: NaiveDateTime, internal_id: i32, value: f64) -> Self {
        Self {
            timestamp,
            internal_id,
            value,
            status: b'G',
            marker: b' ',
        }
    }

    /// Same sample for another tag.
    pub fn with_id(mut self, internal_id: i32) -> Self {
        self.internal_id = internal_id;
        self
    }

    /// Same sample with another value.
    pub fn with_value(mut self, value: f64) -> Self {
        self.value = value;
        self
    }
}

/// Encodes one 39-byte float record slot.
pub fn encode_float_record(sample: &FloatSample) -> [u8; FLOAT_RECORD_LEN] {
    let mut buf = [0u8; FLOAT_RECORD_LEN];
    let datetime = sample.timestamp.format("%Y%m%d%H:%M:%S").to_string();
    let millis = sample.timestamp.nanosecond() / 1_000_000 % 1000;
    let id = format!("{:05}", sample.internal_id);

    copy_padded(&mut buf[1..17], datetime.as_bytes());
    copy_padded(&mut buf[17..20], format!("{millis:03}").as_bytes());
    copy_padded(&mut buf[20..25], id.as_bytes());
    buf[25..33].copy_from_slice(&sample.value.to_le_bytes());
    buf[33] = sample.status;
    buf[34] = sample.marker;
    buf
}

/// Encodes one 264-byte tag record slot.
pub fn encode_tag_record(
    name: &str,
    internal_id: i32,
    point_kind: u8,
    data_subtype: u8,
) -> [u8; TAG_RECORD_LEN] {
    let mut buf = [b' '; TAG_RECORD_LEN];
    buf[0] = 0;
    let name_end = 1 + TAG_NAME_LEN;
    copy_padded(&mut buf[1..name_end], name.as_bytes());
    copy_padded(
        &mut buf[name_end..name_end + 5],
        format!("{internal_id:05}").as_bytes(),
    );
    buf[name_end + 5] = b'0' + point_kind % 10;
    copy_padded(
        &mut buf[name_end + 6..name_end + 8],
        format!("{:02}", data_subtype % 100).as_bytes(),
    );
    buf
}

/// Builds a complete float file: header, padding to the record offset, records.
pub fn float_file_bytes(samples: &[FloatSample]) -> Vec<u8> {
    let mut bytes = archive_prefix(samples.len(), FLOAT_RECORDS_OFFSET);
    for sample in samples {
        bytes.extend_from_slice(&encode_float_record(sample));
    }
    bytes
}

/// Builds a complete tag file from `(name, internal_id)` pairs.
pub fn tag_file_bytes(tags: &[(&str, i32)]) -> Vec<u8> {
    let mut bytes = archive_prefix(tags.len(), TAG_RECORDS_OFFSET);
    for (name, id) in tags {
        bytes.extend_from_slice(&encode_tag_record(name, *id, 1, 0));
    }
    bytes
}

/// Writes a float file built by [`float_file_bytes`].
pub fn write_float_file(path: &Path, samples: &[FloatSample]) -> io::Result<()> {
    std::fs::write(path, float_file_bytes(samples))
}

/// Writes a tag file built by [`tag_file_bytes`].
pub fn write_tag_file(path: &Path, tags: &[(&str, i32)]) -> io::Result<()> {
    std::fs::write(path, tag_file_bytes(tags))
}

fn archive_prefix(rows: usize, records_offset: u64) -> Vec<u8> {
    let header = ArchiveHeader {
        format_version: 1,
        date: super::ArchiveDate {
            year: 2024,
            month: 3,
            day: 1,
        },
        row_count: u32::try_from(rows).unwrap_or(u32::MAX),
    };
    let mut bytes = encode_header(&header).to_vec();
    bytes.resize(records_offset as usize, 0);
    bytes
}

fn copy_padded(dst: &mut [u8], src: &[u8]) {
    let n = src.len().min(dst.len());
    dst[..n].copy_from_slice(&src[..n]);
    dst[n..].fill(b' ');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dat::{decode_float_record, decode_tag_record};

    #[test]
    fn header_encoding_matches_layout() {
        let header = ArchiveHeader::from_bytes(&[2, 124, 12, 31, 5, 0, 0, 0]).unwrap();
        assert_eq!(encode_header(&header), [2, 124, 12, 31, 5, 0, 0, 0]);
    }

    #[test]
    fn encoded_records_decode() {
        let ts = NaiveDateTime::parse_from_str("2024-03-01 13:45:22.123", "%Y-%m-%d %H:%M:%S%.3f")
            .unwrap();
        let record = decode_float_record(&encode_float_record(&FloatSample::new(ts, 42, 98.6)))
            .unwrap();
        assert_eq!(record.timestamp, ts);
        assert_eq!(record.internal_id, 42);

        let tag = decode_tag_record(&encode_tag_record("AI101", 7, 2, 13)).unwrap();
        assert_eq!(tag.name, "AI101");
        assert_eq!(tag.internal_id, 7);
        assert_eq!(tag.point_kind, 2);
        assert_eq!(tag.data_subtype, 13);
    }

    #[test]
    fn prefixes_pad_to_record_offset() {
        assert_eq!(float_file_bytes(&[]).len(), FLOAT_RECORDS_OFFSET as usize);
        assert_eq!(
            tag_file_bytes(&[("A", 1)]).len(),
            TAG_RECORDS_OFFSET as usize + TAG_RECORD_LEN
        );
    }
}
