//! Tag (metadata) records.
//!
//! Each record is 264 bytes: a skip byte, a 255-byte blank-padded name, a
//! 5-character id, a 1-character point kind and a 2-character data subtype.
//! Unlike float records, a malformed tag record aborts the whole file: a tag
//! with an unknown identity cannot be safely skipped.

use super::header::ArchiveHeader;
use super::{parse_ascii_int, read_slot};
use crate::error::DecodeError;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;
use tracing::{debug, info};

/// Byte offset of the first tag record.
pub const TAG_RECORDS_OFFSET: u64 = 0xA1;

/// Width of the name field.
pub const TAG_NAME_LEN: usize = 255;

/// Size of one tag record slot.
pub const TAG_RECORD_LEN: usize = 1 + TAG_NAME_LEN + 5 + 1 + 2;

/// One logged tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRecord {
    /// Tag name with trailing padding removed.
    pub name: String,
    /// Identifier referenced by float records; unique within one archive pair.
    pub internal_id: i32,
    /// Logger point type code.
    pub point_kind: i32,
    /// Logger data subtype code.
    pub data_subtype: i32,
}

/// Decodes one tag record slot.
pub fn decode_tag_record(buf: &[u8; TAG_RECORD_LEN]) -> Result<TagRecord, DecodeError> {
    let name_end = 1 + TAG_NAME_LEN;
    let name = String::from_utf8_lossy(&buf[1..name_end])
        .trim_matches(|c: char| c.is_whitespace() || c == '\0')
        .to_string();

    Ok(TagRecord {
        name,
        internal_id: parse_ascii_int("tag id", &buf[name_end..name_end + 5])?,
        point_kind: parse_ascii_int("point kind", &buf[name_end + 5..name_end + 6])?,
        data_subtype: parse_ascii_int("data subtype", &buf[name_end + 6..name_end + 8])?,
    })
}

/// A decoded tag file; `tags.len()` always equals `header.row_count`.
#[derive(Debug, Clone)]
pub struct TagFile {
    /// File header.
    pub header: ArchiveHeader,
    /// Tags in file order.
    pub tags: Vec<TagRecord>,
}

/// Reads the header and exactly `row_count` tag records from `reader`.
pub fn read_tag_records<R: Read + Seek>(reader: &mut R) -> Result<TagFile, DecodeError> {
    let header = ArchiveHeader::decode(reader)?;
    info!(
        tags = header.row_count,
        date = %header.date,
        version = header.format_version,
        "tag file header"
    );

    reader.seek(SeekFrom::Start(TAG_RECORDS_OFFSET))?;

    let mut tags = Vec::with_capacity(header.row_count.min(1 << 16) as usize);
    let mut buf = [0u8; TAG_RECORD_LEN];
    for index in 0..header.row_count {
        read_slot(reader, &mut buf, "tag record")
            .and_then(|()| decode_tag_record(&buf))
            .map(|tag| {
                debug!(
                    "Tag Name: {:<100} | Tag ID: {:<5} | Type: {:<3} | Dtype: {:<3}",
                    tag.name, tag.internal_id, tag.point_kind, tag.data_subtype
                );
                tags.push(tag);
            })
            .map_err(|source| DecodeError::Record {
                index,
                source: Box::new(source),
            })?;
    }

    Ok(TagFile { header, tags })
}

/// Opens `path` and decodes it as a tag file.
pub fn read_tag_file(path: &Path) -> Result<TagFile, DecodeError> {
    let file = File::open(path)?;
    read_tag_records(&mut BufReader::new(file))
}
