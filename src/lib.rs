//! # Datalog Convert Library
//!
//! Decodes the paired binary DAT archives written by an industrial data logger
//! and forwards their values to a process historian. The binary (`main.rs`) is a
//! thin CLI over this library; tests drive the same entry points with the
//! in-memory historian.
//!
//! ## Crate Structure
//!
//! - **`dat`**: pure decoders for the archive header, tag records and float
//!   records, plus discovery of float/tag file pairs in a directory.
//! - **`points`**: per-pair `PointLookup` and the run-wide memoizing
//!   `PointResolver` that maps logger tags to historian points.
//! - **`tag_map`**: the optional operator rename table.
//! - **`historian`**: the `Historian` trait, the serialized and time-bounded
//!   `HistorianConnection`, and the memory and CSV backends.
//! - **`pipeline`**: bounded decode workers feeding a writer stage over a
//!   bounded handoff queue, and the per-pair outcomes of a run.
//! - **`config`**: layered `Settings` (defaults, TOML, environment).
//! - **`logging`**: tracing subscriber setup.
//! - **`error`**: `DecodeError`, `HistorianError` and `ConvertError`.

pub mod config;
pub mod dat;
pub mod error;
pub mod historian;
pub mod logging;
pub mod pipeline;
pub mod points;
pub mod tag_map;

pub use error::{AppResult, ConvertError};
