//! Float (value) records.
//!
//! Each record occupies a 39-byte slot:
//!
//! ```text
//! 0       reserved
//! 1..17   date-time, ASCII "YYYYMMDDHH:MM:SS"
//! 17..20  milliseconds, ASCII zero-padded
//! 20..25  internal tag id, ASCII zero-padded
//! 25..33  value, f64 little-endian
//! 33      status code
//! 34      marker code
//! 35..39  reserved
//! ```
//!
//! A record whose date-time, milliseconds or tag id does not parse is returned as an
//! [`InvalidFloatRecord`] that still carries a placeholder with `valid == false`.
//! The file readers omit such records from their output; they never abort the file.

use super::header::ArchiveHeader;
use super::{parse_ascii_int, read_slot};
use crate::error::DecodeError;
use chrono::{NaiveDate, NaiveDateTime};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use thiserror::Error;
use tracing::{info, trace, warn};

/// Size of one float record slot.
pub const FLOAT_RECORD_LEN: usize = 39;

/// Byte offset of the first float record.
pub const FLOAT_RECORDS_OFFSET: u64 = 0x121;

const DATETIME: std::ops::Range<usize> = 1..17;
const MILLIS: std::ops::Range<usize> = 17..20;
const TAG_ID: std::ops::Range<usize> = 20..25;
const VALUE: std::ops::Range<usize> = 25..33;
const STATUS: usize = 33;
const MARKER: usize = 34;

/// One decoded value sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FloatRecord {
    /// Logger-local time with millisecond precision (no time zone is recorded).
    pub timestamp: NaiveDateTime,
    /// Tag id; looked up in the pair's tag file.
    pub internal_id: i32,
    /// Sample value.
    pub value: f64,
    /// Logger status byte, kept as read.
    pub status: u8,
    /// Logger marker byte, kept as read.
    pub marker: u8,
    /// `false` for placeholders built from undecodable slots.
    pub valid: bool,
}

impl fmt::Display for FloatRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} | tag {:05} | {:16.8} | status {} | marker {} | valid {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.internal_id,
            self.value,
            char::from(self.status),
            char::from(self.marker),
            self.valid
        )
    }
}

/// A float record whose timestamp or tag id failed to parse.
#[derive(Error, Debug)]
#[error("invalid float record: {source}")]
pub struct InvalidFloatRecord {
    /// Placeholder with `valid == false`; fields that could not be parsed are zeroed.
    pub record: FloatRecord,
    /// Why the slot could not be decoded.
    #[source]
    pub source: DecodeError,
}

/// Decodes one 39-byte float record slot.
pub fn decode_float_record(
    buf: &[u8; FLOAT_RECORD_LEN],
) -> Result<FloatRecord, InvalidFloatRecord> {
    let mut raw_value = [0u8; 8];
    raw_value.copy_from_slice(&buf[VALUE]);

    let mut record = FloatRecord {
        timestamp: NaiveDateTime::MIN,
        internal_id: 0,
        value: f64::from_le_bytes(raw_value),
        status: buf[STATUS],
        marker: buf[MARKER],
        valid: false,
    };

    let timestamp = parse_timestamp(&buf[DATETIME], &buf[MILLIS]);
    let internal_id = parse_ascii_int("tag id", &buf[TAG_ID]);

    match (timestamp, internal_id) {
        (Ok(timestamp), Ok(internal_id)) => {
            record.timestamp = timestamp;
            record.internal_id = internal_id;
            record.valid = true;
            Ok(record)
        }
        (Err(source), id) => {
            record.internal_id = id.unwrap_or_default();
            Err(InvalidFloatRecord { record, source })
        }
        (Ok(timestamp), Err(source)) => {
            record.timestamp = timestamp;
            Err(InvalidFloatRecord { record, source })
        }
    }
}

fn parse_timestamp(datetime: &[u8], millis: &[u8]) -> Result<NaiveDateTime, DecodeError> {
    let invalid = || DecodeError::InvalidDateTime {
        raw: String::from_utf8_lossy(datetime).into_owned(),
    };

    if datetime.len() != 16 || datetime[10] != b':' || datetime[13] != b':' {
        return Err(invalid());
    }

    let year = digits(&datetime[0..4]).ok_or_else(invalid)?;
    let month = digits(&datetime[4..6]).ok_or_else(invalid)?;
    let day = digits(&datetime[6..8]).ok_or_else(invalid)?;
    let hour = digits(&datetime[8..10]).ok_or_else(invalid)?;
    let minute = digits(&datetime[11..13]).ok_or_else(invalid)?;
    let second = digits(&datetime[14..16]).ok_or_else(invalid)?;

    let millis = parse_ascii_int("milliseconds", millis)?;
    let millis = u32::try_from(millis)
        .ok()
        .filter(|ms| *ms < 1000)
        .ok_or(DecodeError::MillisOutOfRange(millis))?;

    // year has at most four digits, so the cast cannot wrap
    NaiveDate::from_ymd_opt(year as i32, month, day)
        .and_then(|date| date.and_hms_milli_opt(hour, minute, second, millis))
        .ok_or_else(invalid)
}

/// Parses a run of ASCII digits, rejecting signs and blanks.
fn digits(bytes: &[u8]) -> Option<u32> {
    if bytes.is_empty() || !bytes.iter().all(u8::is_ascii_digit) {
        return None;
    }
    Some(
        bytes
            .iter()
            .fold(0u32, |acc, b| acc * 10 + u32::from(b - b'0')),
    )
}

/// Counters describing how a float file decoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FloatDecodeStats {
    /// Row count declared in the header.
    pub declared: u32,
    /// Records that decoded with `valid == true`.
    pub decoded: usize,
    /// Records whose fields failed to parse.
    pub invalid: usize,
    /// Slots that could not be read (truncated file or I/O error).
    pub missing: usize,
}

/// A decoded float file. `records` holds only valid records, in file order.
#[derive(Debug, Clone)]
pub struct FloatFile {
    /// File header.
    pub header: ArchiveHeader,
    /// Valid records in file order.
    pub records: Vec<FloatRecord>,
    /// Counts of decoded, invalid and missing slots.
    pub stats: FloatDecodeStats,
}

/// Reads the header and `row_count` float records from `reader`.
///
/// Only a header failure (or failing to seek to the record area) is an error.
/// Invalid records are counted and skipped; a truncated tail ends the read with
/// the unread slots counted as missing.
pub fn read_float_records<R: Read + Seek>(reader: &mut R) -> Result<FloatFile, DecodeError> {
    let header = ArchiveHeader::decode(reader)?;
    info!(
        rows = header.row_count,
        date = %header.date,
        version = header.format_version,
        "float file header"
    );

    reader.seek(SeekFrom::Start(FLOAT_RECORDS_OFFSET))?;

    let mut stats = FloatDecodeStats {
        declared: header.row_count,
        ..Default::default()
    };
    let mut records = Vec::with_capacity(header.row_count.min(1 << 20) as usize);
    let mut buf = [0u8; FLOAT_RECORD_LEN];

    for index in 0..header.row_count {
        match read_slot(reader, &mut buf, "float record") {
            Ok(()) => {}
            Err(DecodeError::Truncated { .. }) => {
                let missing = (header.row_count - index) as usize;
                warn!(index, missing, "float file ends before declared row count");
                stats.missing += missing;
                break;
            }
            Err(e) => {
                warn!(index, error = %e, "failed to read float record");
                stats.missing += 1;
                continue;
            }
        }

        match decode_float_record(&buf) {
            Ok(record) => {
                trace!(%record, "float record");
                records.push(record);
            }
            Err(invalid) => {
                warn!(index, error = %invalid.source, "skipping invalid float record");
                stats.invalid += 1;
            }
        }
    }

    stats.decoded = records.len();
    Ok(FloatFile {
        header,
        records,
        stats,
    })
}

/// Opens `path` and decodes it as a float file.
pub fn read_float_file(path: &Path) -> Result<FloatFile, DecodeError> {
    let file = File::open(path)?;
    let mut reader = BufReader::with_capacity(64 * 1024, file);
    read_float_records(&mut reader)
}
