//! Archive pair discovery.

use crate::error::{AppResult, ConvertError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// File naming convention pairing float files with their tag files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveNaming {
    /// Marker present in float file names, e.g. `" (Float)"`.
    pub float_marker: String,
    /// Marker substituted for `float_marker` to name the tag file.
    pub tag_marker: String,
    /// File extension following the marker, e.g. `".DAT"`.
    pub extension: String,
}

impl Default for ArchiveNaming {
    fn default() -> Self {
        Self {
            float_marker: " (Float)".to_string(),
            tag_marker: " (Tagname)".to_string(),
            extension: ".DAT".to_string(),
        }
    }
}

impl ArchiveNaming {
    /// Whether `file_name` names a float archive.
    pub fn is_float_file(&self, file_name: &str) -> bool {
        file_name
            .strip_suffix(self.extension.as_str())
            .is_some_and(|stem| stem.ends_with(self.float_marker.as_str()))
    }

    /// Tag file path belonging to `float_path`: the first float marker in the
    /// file name is replaced by the tag marker.
    pub fn tag_path_for(&self, float_path: &Path) -> PathBuf {
        let file_name = float_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tag_name = file_name.replacen(self.float_marker.as_str(), self.tag_marker.as_str(), 1);
        float_path.with_file_name(tag_name)
    }
}

/// One unit of work: a float file and its tag file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivePair {
    /// Float (value) file.
    pub float_path: PathBuf,
    /// Tag (name table) file derived from the float file name.
    pub tag_path: PathBuf,
}

impl ArchivePair {
    /// Pair built from a float file path using `naming`.
    pub fn from_float_path(float_path: impl Into<PathBuf>, naming: &ArchiveNaming) -> Self {
        let float_path = float_path.into();
        let tag_path = naming.tag_path_for(&float_path);
        Self {
            float_path,
            tag_path,
        }
    }

    /// Float file name, used to label logs and outcomes.
    pub fn name(&self) -> String {
        self.float_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.float_path.display().to_string())
    }
}

/// Float archives found in one directory.
#[derive(Debug, Clone)]
pub struct DatDirectory {
    root: PathBuf,
    pairs: Vec<ArchivePair>,
}

impl DatDirectory {
    /// Lists `path` for float archives, sorted by file name.
    ///
    /// Quote characters are stripped from the path (shells on the logging PCs
    /// tend to pass them through). A missing directory or one with no float
    /// archives is a setup error.
    pub fn scan(path: &Path, naming: &ArchiveNaming) -> AppResult<Self> {
        let root = PathBuf::from(path.to_string_lossy().replace('"', ""));
        if !root.is_dir() {
            return Err(ConvertError::Setup(format!(
                "directory not found: {}",
                root.display()
            )));
        }

        let mut float_paths = Vec::new();
        for entry in std::fs::read_dir(&root)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if naming.is_float_file(&name) && entry.file_type()?.is_file() {
                float_paths.push(entry.path());
            }
        }

        if float_paths.is_empty() {
            return Err(ConvertError::Setup(format!(
                "no input files in {}",
                root.display()
            )));
        }

        float_paths.sort();
        let pairs: Vec<_> = float_paths
            .into_iter()
            .map(|p| ArchivePair::from_float_path(p, naming))
            .collect();
        debug!(count = pairs.len(), root = %root.display(), "discovered archive pairs");

        Ok(Self { root, pairs })
    }

    /// Directory that was scanned.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Discovered pairs.
    pub fn pairs(&self) -> &[ArchivePair] {
        &self.pairs
    }

    /// Consumes the listing, returning its pairs.
    pub fn into_pairs(self) -> Vec<ArchivePair> {
        self.pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_float_files() {
        let naming = ArchiveNaming::default();
        assert!(naming.is_float_file("2024 03 01 0000 (Float).DAT"));
        assert!(!naming.is_float_file("2024 03 01 0000 (Tagname).DAT"));
        assert!(!naming.is_float_file("2024 03 01 0000 (Float).DAT.bak"));
        assert!(!naming.is_float_file("notes.txt"));
    }

    #[test]
    fn derives_tag_path_from_file_name_only() {
        let naming = ArchiveNaming::default();
        let pair =
            ArchivePair::from_float_path("/data/x (Float)/2024 (Float).DAT", &naming);
        assert_eq!(pair.tag_path, PathBuf::from("/data/x (Float)/2024 (Tagname).DAT"));
        assert_eq!(pair.name(), "2024 (Float).DAT");
    }

    #[test]
    fn scan_lists_sorted_float_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "b (Float).DAT",
            "b (Tagname).DAT",
            "a (Float).DAT",
            "a (Tagname).DAT",
            "readme.txt",
        ] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }

        let listing = DatDirectory::scan(dir.path(), &ArchiveNaming::default()).unwrap();
        let names: Vec<_> = listing.pairs().iter().map(ArchivePair::name).collect();
        assert_eq!(names, ["a (Float).DAT", "b (Float).DAT"]);
        assert_eq!(listing.pairs()[0].tag_path, dir.path().join("a (Tagname).DAT"));
    }

    #[test]
    fn empty_or_missing_directory_is_setup_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = DatDirectory::scan(dir.path(), &ArchiveNaming::default()).unwrap_err();
        assert!(matches!(err, ConvertError::Setup(ref m) if m.contains("no input files")));

        let missing = dir.path().join("nope");
        let err = DatDirectory::scan(&missing, &ArchiveNaming::default()).unwrap_err();
        assert!(err.is_fatal());
    }
}
