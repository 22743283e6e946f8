//! Custom error types for the converter.
//!
//! This module defines the error types used across the crate. Using the `thiserror`
//! crate, it provides a centralized and consistent way to handle the different kinds
//! of failure that occur while converting a directory of datalog archives, from
//! malformed bytes in a single record up to an unreachable historian.
//!
//! ## Error Hierarchy
//!
//! - **`DecodeError`**: Raised by the pure decoders in [`crate::dat`]. A decode error
//!   on a header or tag record is fatal for the file; on a float record it only marks
//!   that record invalid.
//! - **`HistorianError`**: Raised at the boundary to the external historian (point
//!   lookups, type lookups, snapshot writes, connection lifecycle).
//! - **`ConvertError`**: The application-level error. Its variants follow the scope at
//!   which a failure is absorbed:
//!   - **`Setup`**, **`Config`**, **`Configuration`**, **`TagMap`**: stop the whole run.
//!   - **`PairDecode`**: fatal for one archive pair only.
//!   - **`Resolution`**: one tag cannot be mapped to a historian point.
//!   - **`Write`**: the historian rejected (part of) one pair's batch.
//!
//! By using `#[from]`, `ConvertError` can be created from the underlying error types,
//! keeping the `?` operator usable throughout the crate.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, ConvertError>;

/// Failure to decode bytes from a DAT archive.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// Fewer bytes than a fixed-width field needs.
    #[error("Truncated input: needed {needed} bytes for {field}")]
    Truncated {
        /// Field being read.
        field: &'static str,
        /// Bytes the field needs.
        needed: usize,
    },

    /// Header declares a negative record count.
    #[error("Negative row count {0} in header")]
    NegativeRowCount(i32),

    /// Numeric field did not parse.
    #[error("Invalid integer in {field}: {raw:?}")]
    InvalidInteger {
        /// Field being read.
        field: &'static str,
        /// Text as found in the archive.
        raw: String,
    },

    /// Timestamp field did not parse.
    #[error("Invalid date-time {raw:?}")]
    InvalidDateTime {
        /// Text as found in the archive.
        raw: String,
    },

    /// Millisecond field outside `0..1000`.
    #[error("Milliseconds out of range: {0}")]
    MillisOutOfRange(i32),

    /// Failure inside the record at `index`.
    #[error("Record {index}: {source}")]
    Record {
        /// Zero-based record index.
        index: u32,
        /// Failure inside the record.
        #[source]
        source: Box<DecodeError>,
    },

    /// Reading the archive failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure reported by, or while talking to, the historian.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HistorianError {
    /// A call was made before `connect`.
    #[error("Not connected to historian")]
    NotConnected,

    /// No point with this name.
    #[error("Point {name} not found (code {code})")]
    PointNotFound {
        /// Name looked up.
        name: String,
        /// Historian status code.
        code: i32,
    },

    /// Name longer than the historian accepts; rejected without a call.
    #[error("Point name {name} exceeds {limit} characters")]
    NameTooLong {
        /// Rejected name.
        name: String,
        /// Maximum accepted length.
        limit: usize,
    },

    /// Type lookup failed for a point number.
    #[error("Point type lookup for point {id} failed with code {code}")]
    PointType {
        /// Point number.
        id: i32,
        /// Historian status code.
        code: i32,
    },

    /// The write call as a whole failed.
    #[error("Snapshot write failed: {0}")]
    Write(String),

    /// The call did not finish within the configured timeout.
    #[error("Historian call {call} timed out after {timeout_ms} ms")]
    Timeout {
        /// Call that timed out.
        call: &'static str,
        /// Configured limit.
        timeout_ms: u64,
    },

    /// Any other backend failure.
    #[error("Historian backend error: {0}")]
    Backend(String),
}

/// Application-level error for a conversion run.
#[derive(Error, Debug)]
pub enum ConvertError {
    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Configuration loaded but failed validation.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Run cannot start (missing input, failed connect).
    #[error("Setup error: {0}")]
    Setup(String),

    /// Filesystem error outside archive decoding.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Rename table could not be read.
    #[error("Tag map error: {0}")]
    TagMap(#[from] csv::Error),

    /// An archive of one pair could not be decoded.
    #[error("Failed to decode {}: {source}", .path.display())]
    PairDecode {
        /// File that failed.
        path: PathBuf,
        /// Decode failure.
        #[source]
        source: DecodeError,
    },

    /// A point name could not be resolved.
    #[error("Resolution of {name} failed: {source}")]
    Resolution {
        /// External name looked up.
        name: String,
        /// Lookup failure.
        #[source]
        source: HistorianError,
    },

    /// A snapshot write failed.
    #[error("Write failed: {0}")]
    Write(#[from] HistorianError),

    /// A worker task panicked or was cancelled.
    #[error("Worker task failed: {0}")]
    Task(String),
}

impl From<figment::Error> for ConvertError {
    fn from(value: figment::Error) -> Self {
        ConvertError::Config(Box::new(value))
    }
}

impl ConvertError {
    /// Wraps a decode error with the file it came from.
    pub fn pair_decode(path: impl Into<PathBuf>, source: DecodeError) -> Self {
        ConvertError::PairDecode {
            path: path.into(),
            source,
        }
    }

    /// Whether this error must stop the whole run rather than one pair.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ConvertError::Config(_)
                | ConvertError::Configuration(_)
                | ConvertError::Setup(_)
                | ConvertError::TagMap(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_errors_are_fatal() {
        assert!(ConvertError::Setup("directory not found".into()).is_fatal());
        assert!(ConvertError::Configuration("decode_workers must be > 0".into()).is_fatal());
    }

    #[test]
    fn pair_level_errors_are_not_fatal() {
        let err = ConvertError::pair_decode(
            "a (Tagname).DAT",
            DecodeError::Truncated {
                field: "row count",
                needed: 4,
            },
        );
        assert!(!err.is_fatal());
        assert!(err.to_string().contains("a (Tagname).DAT"));

        let err = ConvertError::Write(HistorianError::Write("rejected".into()));
        assert!(!err.is_fatal());
    }

    #[test]
    fn resolution_error_names_the_point() {
        let err = ConvertError::Resolution {
            name: "Reactor.Temp".into(),
            source: HistorianError::PointNotFound {
                name: "Reactor.Temp".into(),
                code: -5,
            },
        };
        assert!(err.to_string().contains("Reactor.Temp"));
    }
}
