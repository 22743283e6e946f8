//! Historian boundary.
//!
//! The external time-series store is reached through the [`Historian`] trait.
//! Its call shapes follow the historian's native API: a point-number lookup by
//! name, a point-type lookup by number, and a bulk snapshot write that reports a
//! status code per item. Backends implement the trait; the rest of the crate
//! only talks to a [`HistorianConnection`], which
//!
//! - serializes every remote call behind one lock (the native client is a
//!   single connection and is not reentrant),
//! - bounds every call with a timeout,
//! - classifies per-item write codes against a configurable benign allow-list.
//!
//! # Backends
//!
//! - [`memory::MemoryHistorian`] - in-process store used by tests and `--dry-run`
//! - [`csv_store::CsvHistorian`] - point table from CSV, snapshots appended to CSV

pub mod csv_store;
pub mod memory;

use crate::error::HistorianError;
use async_trait::async_trait;
use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// Data type of a historian point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PointKind {
    /// Floating-point values.
    Real,
    /// Integer values.
    Integer,
    /// Digital (state) values.
    Digital,
    /// Type lookup failed or returned an unmapped code.
    Unknown,
}

impl PointKind {
    /// Maps the historian's point-type code (`R`, `I`, `D`, ...) to a kind.
    pub fn from_type_code(code: char) -> Self {
        match code.to_ascii_uppercase() {
            'R' => PointKind::Real,
            'I' => PointKind::Integer,
            'D' => PointKind::Digital,
            _ => PointKind::Unknown,
        }
    }

    /// Inverse of [`PointKind::from_type_code`].
    pub fn type_code(self) -> char {
        match self {
            PointKind::Real => 'R',
            PointKind::Integer => 'I',
            PointKind::Digital => 'D',
            PointKind::Unknown => '?',
        }
    }
}

/// Broken-down timestamp in the historian's wire shape. Seconds carry the
/// sub-second fraction; the logger records no time zone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistorianTimestamp {
    /// Calendar year.
    pub year: i32,
    /// Month, 1-based.
    pub month: u32,
    /// Day of month.
    pub day: u32,
    /// Hour, 0-23.
    pub hour: u32,
    /// Minute, 0-59.
    pub minute: u32,
    /// Seconds including the fractional part.
    pub second: f64,
}

impl From<NaiveDateTime> for HistorianTimestamp {
    fn from(dt: NaiveDateTime) -> Self {
        Self {
            year: dt.year(),
            month: dt.month(),
            day: dt.day(),
            hour: dt.hour(),
            minute: dt.minute(),
            second: f64::from(dt.second()) + f64::from(dt.nanosecond()) / 1e9,
        }
    }
}

/// One value to write.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snapshot {
    /// Historian point number.
    pub point_id: i32,
    /// Value to store.
    pub value: f64,
    /// Logger-local sample time.
    pub timestamp: NaiveDateTime,
}

impl Snapshot {
    /// Timestamp in the historian's wire shape.
    pub fn historian_timestamp(&self) -> HistorianTimestamp {
        HistorianTimestamp::from(self.timestamp)
    }
}

/// Status code the historian reports for an accepted item.
pub const ITEM_OK: i32 = 0;

/// External time-series store.
///
/// Implementations need not be reentrant; [`HistorianConnection`] never issues
/// two calls at once.
#[async_trait]
pub trait Historian: Send + Sync {
    /// Opens the session. `process_name` identifies this writer to the store.
    async fn connect(&self, host: &str, process_name: &str) -> Result<(), HistorianError>;

    /// Closes the session.
    async fn disconnect(&self) -> Result<(), HistorianError>;

    /// Looks up the point number for `name`.
    async fn find_point(&self, name: &str) -> Result<i32, HistorianError>;

    /// Looks up the data type of a point.
    async fn point_type(&self, point_id: i32) -> Result<PointKind, HistorianError>;

    /// Writes snapshots in one call, returning one status code per item
    /// ([`ITEM_OK`] for success). An `Err` means the call as a whole failed.
    async fn put_snapshots(&self, snapshots: &[Snapshot]) -> Result<Vec<i32>, HistorianError>;
}

/// Per-item result of one snapshot write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Items reported [`ITEM_OK`].
    pub accepted: usize,
    /// Items reported with a code on the benign allow-list.
    pub benign: usize,
    /// `(item index, code)` for every other item.
    pub rejected: Vec<(usize, i32)>,
}

impl WriteOutcome {
    /// Classifies per-item codes.
    pub fn classify(codes: &[i32], benign_codes: &[i32]) -> Self {
        let mut outcome = WriteOutcome::default();
        for (index, &code) in codes.iter().enumerate() {
            if code == ITEM_OK {
                outcome.accepted += 1;
            } else if benign_codes.contains(&code) {
                outcome.benign += 1;
            } else {
                outcome.rejected.push((index, code));
            }
        }
        outcome
    }

    /// Items counted as written (accepted + benign).
    pub fn written(&self) -> usize {
        self.accepted + self.benign
    }

    /// Whether no item was rejected.
    pub fn is_success(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Result of [`HistorianConnection::put_snapshots`].
#[derive(Debug, Clone)]
pub struct WriteReport {
    /// Per-item classification.
    pub outcome: WriteOutcome,
    /// Time spent waiting for the connection lock.
    pub lock_wait: Duration,
    /// Time spent in the write call itself.
    pub elapsed: Duration,
}

struct ConnectionInner {
    backend: Arc<dyn Historian>,
    lock: Mutex<()>,
    call_timeout: Duration,
    benign_codes: Vec<i32>,
}

/// Shared handle to the historian that serializes and bounds every call.
#[derive(Clone)]
pub struct HistorianConnection {
    inner: Arc<ConnectionInner>,
}

impl HistorianConnection {
    /// Wraps `backend`.
    pub fn new(backend: Arc<dyn Historian>, call_timeout: Duration, benign_codes: Vec<i32>) -> Self {
        Self {
            inner: Arc::new(ConnectionInner {
                backend,
                lock: Mutex::new(()),
                call_timeout,
                benign_codes,
            }),
        }
    }

    /// Codes treated as success for individual items.
    pub fn benign_codes(&self) -> &[i32] {
        &self.inner.benign_codes
    }

    /// Opens the backend session.
    pub async fn connect(&self, host: &str, process_name: &str) -> Result<(), HistorianError> {
        self.call("connect", self.inner.backend.connect(host, process_name))
            .await
            .map(|(result, _)| result)
    }

    /// Closes the backend session.
    pub async fn disconnect(&self) -> Result<(), HistorianError> {
        self.call("disconnect", self.inner.backend.disconnect())
            .await
            .map(|(result, _)| result)
    }

    /// Looks up the point number for `name`.
    pub async fn find_point(&self, name: &str) -> Result<i32, HistorianError> {
        self.call("find_point", self.inner.backend.find_point(name))
            .await
            .map(|(id, _)| id)
    }

    /// Looks up the type of `point_id`.
    pub async fn point_type(&self, point_id: i32) -> Result<PointKind, HistorianError> {
        self.call("point_type", self.inner.backend.point_type(point_id))
            .await
            .map(|(kind, _)| kind)
    }

    /// Writes `snapshots` in one call. An empty slice makes no remote call.
    pub async fn put_snapshots(&self, snapshots: &[Snapshot]) -> Result<WriteReport, HistorianError> {
        if snapshots.is_empty() {
            return Ok(WriteReport {
                outcome: WriteOutcome::default(),
                lock_wait: Duration::ZERO,
                elapsed: Duration::ZERO,
            });
        }

        let started = Instant::now();
        let (codes, lock_wait) = self
            .call("put_snapshots", self.inner.backend.put_snapshots(snapshots))
            .await?;
        if codes.len() != snapshots.len() {
            return Err(HistorianError::Write(format!(
                "historian returned {} item codes for {} snapshots",
                codes.len(),
                snapshots.len()
            )));
        }

        Ok(WriteReport {
            outcome: WriteOutcome::classify(&codes, &self.inner.benign_codes),
            lock_wait,
            elapsed: started.elapsed().saturating_sub(lock_wait),
        })
    }

    /// Runs one backend call under the connection lock and timeout, returning
    /// its result and how long the lock took to acquire.
    async fn call<T, F>(&self, name: &'static str, fut: F) -> Result<(T, Duration), HistorianError>
    where
        F: Future<Output = Result<T, HistorianError>>,
    {
        let waiting = Instant::now();
        let _guard = self.inner.lock.lock().await;
        let lock_wait = waiting.elapsed();
        debug!(call = name, wait_ms = lock_wait.as_millis() as u64, "historian call");

        match tokio::time::timeout(self.inner.call_timeout, fut).await {
            Ok(result) => result.map(|value| (value, lock_wait)),
            Err(_) => Err(HistorianError::Timeout {
                call: name,
                timeout_ms: self.inner.call_timeout.as_millis() as u64,
            }),
        }
    }
}
