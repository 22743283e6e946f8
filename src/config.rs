//! Layered configuration using Figment.
//!
//! Settings are merged from, in increasing precedence:
//! 1. built-in defaults ([`Settings::default`])
//! 2. a TOML file (`config/datalog.toml` unless another path is given)
//! 3. environment variables prefixed with `DATALOG_`, nested keys split on `__`
//! 4. command-line overrides applied by the binary
//!
//! # Example
//! ```no_run
//! use datalog_convert::config::Settings;
//!
//! // DATALOG_PIPELINE__DECODE_WORKERS=8 overrides pipeline.decode_workers
//! let settings = Settings::load()?;
//! settings.validate()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::dat::ArchiveNaming;
use crate::error::{AppResult, ConvertError};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/datalog.toml";

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "DATALOG_";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: [&str; 3] = ["pretty", "compact", "json"];

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Logging settings
    pub application: ApplicationSettings,
    /// Where the DAT archives are and how they are named
    pub source: SourceSettings,
    /// Historian backend and connection settings
    pub historian: HistorianSettings,
    /// Worker pool sizes
    pub pipeline: PipelineSettings,
    /// Optional rename table; when set, only mapped tags are forwarded
    #[serde(default)]
    pub tag_map: Option<PathBuf>,
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationSettings {
    /// trace, debug, info, warn or error
    pub log_level: String,
    /// pretty, compact or json
    pub log_format: String,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

/// Input directory and archive naming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSettings {
    /// Directory holding the DAT archives
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Marker in float file names
    pub float_marker: String,
    /// Marker in tag file names
    pub tag_marker: String,
    /// Archive file extension
    pub extension: String,
}

impl Default for SourceSettings {
    fn default() -> Self {
        let naming = ArchiveNaming::default();
        Self {
            path: None,
            float_marker: naming.float_marker,
            tag_marker: naming.tag_marker,
            extension: naming.extension,
        }
    }
}

impl SourceSettings {
    /// File naming convention described by these settings.
    pub fn naming(&self) -> ArchiveNaming {
        ArchiveNaming {
            float_marker: self.float_marker.clone(),
            tag_marker: self.tag_marker.clone(),
            extension: self.extension.clone(),
        }
    }
}

/// Historian backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum HistorianBackend {
    /// Point table from CSV, snapshots appended to CSV
    Csv,
    /// In-process store that accepts every point
    Memory,
}

/// Historian connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistorianSettings {
    /// Which historian backend to write to
    pub backend: HistorianBackend,
    /// Historian server host
    pub host: String,
    /// Name this writer registers under
    pub process_name: String,
    /// `name,id,type` point table (csv backend)
    pub points_file: PathBuf,
    /// Directory for snapshot output (csv backend)
    pub output_dir: PathBuf,
    /// Per-item write codes counted as success
    pub benign_error_codes: Vec<i32>,
    /// Upper bound for any single historian call
    pub call_timeout_ms: u64,
    /// Longest point name the historian accepts
    pub max_point_name_len: usize,
}

impl Default for HistorianSettings {
    fn default() -> Self {
        Self {
            backend: HistorianBackend::Csv,
            host: "localhost".to_string(),
            process_name: "datalog-convert".to_string(),
            points_file: PathBuf::from("points.csv"),
            output_dir: PathBuf::from("output"),
            benign_error_codes: vec![-109],
            call_timeout_ms: 30_000,
            max_point_name_len: 80,
        }
    }
}

impl HistorianSettings {
    /// Per-call timeout as a `Duration`.
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

/// Worker pool sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSettings {
    /// Archive pairs decoded at once
    pub decode_workers: usize,
    /// Batches written at once
    pub writer_workers: usize,
    /// Decoded batches buffered between the stages
    pub queue_capacity: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            decode_workers: 4,
            writer_workers: 2,
            queue_capacity: 4,
        }
    }
}

impl Settings {
    /// Loads from [`DEFAULT_CONFIG_PATH`] and the environment. A missing file
    /// leaves the defaults in place.
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Loads from a specific TOML file and the environment.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        Ok(Self::figment(path.as_ref()).extract()?)
    }

    /// The provider stack without extraction.
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Checks value ranges that serde cannot express.
    pub fn validate(&self) -> AppResult<()> {
        let level = self.application.log_level.to_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(invalid(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                LOG_LEVELS.join(", ")
            )));
        }

        let format = self.application.log_format.to_lowercase();
        if !LOG_FORMATS.contains(&format.as_str()) {
            return Err(invalid(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                LOG_FORMATS.join(", ")
            )));
        }

        if self.pipeline.decode_workers == 0 {
            return Err(invalid("pipeline.decode_workers must be > 0".into()));
        }
        if self.pipeline.writer_workers == 0 {
            return Err(invalid("pipeline.writer_workers must be > 0".into()));
        }
        if self.pipeline.queue_capacity == 0 {
            return Err(invalid("pipeline.queue_capacity must be > 0".into()));
        }
        if self.historian.call_timeout_ms == 0 {
            return Err(invalid("historian.call_timeout_ms must be > 0".into()));
        }
        if self.historian.max_point_name_len == 0 {
            return Err(invalid("historian.max_point_name_len must be > 0".into()));
        }
        if self.source.float_marker.is_empty() || self.source.float_marker == self.source.tag_marker {
            return Err(invalid(
                "source.float_marker must be non-empty and differ from source.tag_marker".into(),
            ));
        }

        Ok(())
    }
}

fn invalid(message: String) -> ConvertError {
    ConvertError::Configuration(message)
}
