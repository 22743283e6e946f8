//! DAT archive decoding.
//!
//! A datalog session is stored as a pair of fixed-layout binary files that share
//! the same header shape:
//!
//! ```text
//! offset  size  field
//! 0       1     format version
//! 1       3     date (year - 1900, month, day)
//! 4       4     row count (i32, little-endian)
//! ...           reserved
//! 0xA1          tag records   (264 bytes each, "(Tagname)" file)
//! 0x121         float records ( 39 bytes each, "(Float)" file)
//! ```
//!
//! The decoders here are pure functions over byte slices plus sequential readers
//! over `Read + Seek` sources. They hold no state and perform no I/O policy beyond
//! reading `row_count` records from the fixed record offset.

pub mod discovery;
#[doc(hidden)]
pub mod encode;
pub mod float;
pub mod header;
pub mod tag;

pub use discovery::{ArchiveNaming, ArchivePair, DatDirectory};
pub use float::{
    decode_float_record, read_float_file, read_float_records, FloatDecodeStats, FloatFile,
    FloatRecord, InvalidFloatRecord, FLOAT_RECORDS_OFFSET, FLOAT_RECORD_LEN,
};
pub use header::{ArchiveDate, ArchiveHeader, HEADER_LEN};
pub use tag::{
    decode_tag_record, read_tag_file, read_tag_records, TagFile, TagRecord, TAG_RECORDS_OFFSET,
    TAG_RECORD_LEN,
};

use crate::error::DecodeError;
use std::io::{ErrorKind, Read};

/// Fills `buf` from `reader`, reporting a short read as [`DecodeError::Truncated`].
pub(crate) fn read_slot<R: Read>(
    reader: &mut R,
    buf: &mut [u8],
    field: &'static str,
) -> Result<(), DecodeError> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => DecodeError::Truncated {
            field,
            needed: buf.len(),
        },
        _ => DecodeError::Io(e),
    })
}

/// Parses a fixed-width ASCII integer field, ignoring surrounding blanks.
pub(crate) fn parse_ascii_int(field: &'static str, bytes: &[u8]) -> Result<i32, DecodeError> {
    let invalid = || DecodeError::InvalidInteger {
        field,
        raw: String::from_utf8_lossy(bytes).into_owned(),
    };
    let text = std::str::from_utf8(bytes).map_err(|_| invalid())?;
    text.trim().parse::<i32>().map_err(|_| invalid())
}
