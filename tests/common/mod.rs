//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDateTime;
use datalog_convert::dat::encode::{tag_file_bytes, write_float_file, write_tag_file, FloatSample};
use datalog_convert::dat::{ArchiveNaming, ArchivePair, FLOAT_RECORDS_OFFSET, FLOAT_RECORD_LEN};
use datalog_convert::error::HistorianError;
use datalog_convert::historian::memory::MemoryHistorian;
use datalog_convert::historian::{Historian, HistorianConnection, PointKind, Snapshot};
use datalog_convert::pipeline::{Pipeline, PipelineOptions};
use datalog_convert::points::PointResolver;
use datalog_convert::tag_map::TagMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

pub fn ts(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.3f").unwrap()
}

/// Writes `<stem> (Float).DAT` and `<stem> (Tagname).DAT` into `dir`.
pub fn write_pair(
    dir: &Path,
    stem: &str,
    tags: &[(&str, i32)],
    samples: &[FloatSample],
) -> ArchivePair {
    let pair = ArchivePair::from_float_path(
        dir.join(format!("{stem} (Float).DAT")),
        &ArchiveNaming::default(),
    );
    write_tag_file(&pair.tag_path, tags).unwrap();
    write_float_file(&pair.float_path, samples).unwrap();
    pair
}

/// Overwrites the date-time field of float record `index` with garbage.
pub fn corrupt_float_record(path: &Path, index: usize) {
    let mut bytes = std::fs::read(path).unwrap();
    let start = FLOAT_RECORDS_OFFSET as usize + index * FLOAT_RECORD_LEN + 1;
    bytes[start..start + 8].copy_from_slice(b"20XX03AB");
    std::fs::write(path, bytes).unwrap();
}

/// Rewrites a tag file so its header declares more records than it holds.
pub fn truncate_tag_file(path: &Path, tags: &[(&str, i32)]) {
    let mut bytes = tag_file_bytes(tags);
    bytes.truncate(bytes.len() - 10);
    std::fs::write(path, bytes).unwrap();
}

pub async fn connect(historian: Arc<dyn Historian>) -> HistorianConnection {
    let connection = HistorianConnection::new(historian, Duration::from_secs(5), vec![-109]);
    connection.connect("localhost", "integration").await.unwrap();
    connection
}

pub fn pipeline(
    connection: HistorianConnection,
    tag_map: Option<TagMap>,
    options: PipelineOptions,
) -> Pipeline {
    let resolver = Arc::new(PointResolver::new(connection.clone(), 80));
    Pipeline::new(connection, resolver, tag_map.map(Arc::new), options)
}

/// Historian call held back by a [`GatedHistorian`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    FindPoint,
    PutSnapshots,
}

/// Memory historian whose gated call waits until [`GatedHistorian::open`].
pub struct GatedHistorian {
    pub inner: MemoryHistorian,
    gate: Gate,
    opened: AtomicBool,
    notify: Notify,
}

impl GatedHistorian {
    pub fn new(inner: MemoryHistorian, gate: Gate) -> Self {
        Self {
            inner,
            gate,
            opened: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    pub fn open(&self) {
        self.opened.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    async fn pass(&self, call: Gate) {
        if call != self.gate {
            return;
        }
        loop {
            let notified = self.notify.notified();
            if self.opened.load(Ordering::SeqCst) {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl Historian for GatedHistorian {
    async fn connect(&self, host: &str, process_name: &str) -> Result<(), HistorianError> {
        self.inner.connect(host, process_name).await
    }

    async fn disconnect(&self) -> Result<(), HistorianError> {
        self.inner.disconnect().await
    }

    async fn find_point(&self, name: &str) -> Result<i32, HistorianError> {
        self.pass(Gate::FindPoint).await;
        self.inner.find_point(name).await
    }

    async fn point_type(&self, point_id: i32) -> Result<PointKind, HistorianError> {
        self.inner.point_type(point_id).await
    }

    async fn put_snapshots(&self, snapshots: &[Snapshot]) -> Result<Vec<i32>, HistorianError> {
        self.pass(Gate::PutSnapshots).await;
        self.inner.put_snapshots(snapshots).await
    }
}
