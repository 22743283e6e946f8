//! Archive header shared by tag and float files.

use super::read_slot;
use crate::error::DecodeError;
use chrono::NaiveDate;
use std::fmt;
use std::io::Read;

/// Number of header bytes decoded at the start of every archive file.
pub const HEADER_LEN: usize = 8;

/// The header year byte counts from this year.
pub const YEAR_EPOCH: u16 = 1900;

/// Session date as stored in the header.
///
/// The raw components are kept even when they do not form a calendar date;
/// records carry their own full timestamps, so a bad header date is only logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveDate {
    /// Calendar year (stored as years since 1900).
    pub year: u16,
    /// Month, 1-based.
    pub month: u8,
    /// Day of month.
    pub day: u8,
}

impl ArchiveDate {
    /// Calendar date, or `None` if month/day are out of range.
    pub fn to_naive_date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(
            i32::from(self.year),
            u32::from(self.month),
            u32::from(self.day),
        )
    }
}

impl fmt::Display for ArchiveDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}-{:02}", self.year, self.month, self.day)
    }
}

/// Decoded archive header. `row_count` is the exact number of fixed-size
/// records that follow at the file type's record offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveHeader {
    /// Archive format version byte.
    pub format_version: u8,
    /// Session date.
    pub date: ArchiveDate,
    /// Number of records following the header.
    pub row_count: u32,
}

impl ArchiveHeader {
    /// Reads and decodes the header from the current position of `reader`.
    pub fn decode<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let mut buf = [0u8; HEADER_LEN];
        read_slot(reader, &mut buf, "header")?;
        Self::from_bytes(&buf)
    }

    /// Decodes a header from the first [`HEADER_LEN`] bytes of `buf`.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() < HEADER_LEN {
            return Err(DecodeError::Truncated {
                field: "header",
                needed: HEADER_LEN,
            });
        }

        let row_count = i32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let row_count =
            u32::try_from(row_count).map_err(|_| DecodeError::NegativeRowCount(row_count))?;

        Ok(Self {
            format_version: buf[0],
            date: ArchiveDate {
                year: YEAR_EPOCH + u16::from(buf[1]),
                month: buf[2],
                day: buf[3],
            },
            row_count,
        })
    }
}
