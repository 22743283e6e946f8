//! Operator-supplied rename table.
//!
//! A headerless two-column delimited file, `internalName,externalName` per row.
//! Fields are taken verbatim (no trimming). Rows with fewer than two fields are
//! skipped with a warning and a repeated internal name overwrites the earlier
//! entry. When a table is supplied, tags without an entry are not forwarded.

use crate::error::AppResult;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

/// Internal tag name to historian point name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagMap {
    entries: HashMap<String, String>,
}

impl TagMap {
    /// Loads the table at `path`.
    pub fn load(path: &Path) -> AppResult<Self> {
        let file = std::fs::File::open(path)?;
        let map = Self::from_reader(file)?;
        info!(path = %path.display(), entries = map.len(), "loaded tag map");
        Ok(map)
    }

    /// Parses a table from any reader.
    pub fn from_reader<R: Read>(reader: R) -> AppResult<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut entries = HashMap::new();
        for (line, record) in reader.records().enumerate() {
            let record = record?;
            match (record.get(0), record.get(1)) {
                (Some(internal), Some(external)) => {
                    entries.insert(internal.to_string(), external.to_string());
                }
                _ => warn!(line = line + 1, fields = record.len(), "skipping short tag map row"),
            }
        }
        Ok(Self { entries })
    }

    /// External name for `internal_name`, if mapped.
    pub fn get(&self, internal_name: &str) -> Option<&str> {
        self.entries.get(internal_name).map(String::as_str)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, String)> for TagMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Historian name to look up for a tag.
///
/// Without a table every tag keeps its own name; with one, unmapped tags yield
/// `None` and are dropped.
pub fn external_name_for<'a>(map: Option<&'a TagMap>, internal_name: &'a str) -> Option<&'a str> {
    match map {
        Some(map) => map.get(internal_name),
        None => Some(internal_name),
    }
}
