//! File-backed historian.
//!
//! Stands in for a historian server on machines without one. Point definitions
//! are read from a CSV table with a `name,id,type` header; written snapshots are
//! appended to `<output_dir>/<process_name>.csv` as `point_id,timestamp,value`.

use super::{Historian, PointKind, Snapshot, ITEM_OK};
use crate::error::HistorianError;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::info;

use super::memory::{NO_SUCH_POINT, POINT_NOT_FOUND};

#[derive(Debug, Deserialize)]
struct PointRow {
    name: String,
    id: i32,
    #[serde(rename = "type")]
    kind: String,
}

struct Session {
    points: HashMap<String, i32>,
    kinds: HashMap<i32, PointKind>,
    writer: csv::Writer<File>,
    path: PathBuf,
}

/// Historian that reads its point table from CSV and appends writes to CSV.
pub struct CsvHistorian {
    points_file: PathBuf,
    output_dir: PathBuf,
    session: Mutex<Option<Session>>,
}

impl CsvHistorian {
    /// Backend reading points from `points_file` and appending snapshots under
    /// `output_dir`. Nothing is opened until `connect`.
    pub fn new(points_file: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            points_file: points_file.into(),
            output_dir: output_dir.into(),
            session: Mutex::new(None),
        }
    }

    /// Path of the snapshot file once connected.
    pub async fn output_path(&self) -> Option<PathBuf> {
        self.session.lock().await.as_ref().map(|s| s.path.clone())
    }

    fn load_points(path: &Path) -> Result<(HashMap<String, i32>, HashMap<i32, PointKind>), HistorianError> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|e| backend(format!("failed to open point table {}: {e}", path.display())))?;

        let mut points = HashMap::new();
        let mut kinds = HashMap::new();
        for row in reader.deserialize::<PointRow>() {
            let row = row.map_err(|e| backend(format!("invalid point table row: {e}")))?;
            let kind = row
                .kind
                .chars()
                .next()
                .map_or(PointKind::Unknown, PointKind::from_type_code);
            points.insert(row.name, row.id);
            kinds.insert(row.id, kind);
        }
        Ok((points, kinds))
    }
}

fn backend(message: String) -> HistorianError {
    HistorianError::Backend(message)
}

#[async_trait]
impl Historian for CsvHistorian {
    async fn connect(&self, host: &str, process_name: &str) -> Result<(), HistorianError> {
        let (points, kinds) = Self::load_points(&self.points_file)?;

        std::fs::create_dir_all(&self.output_dir)
            .map_err(|e| backend(format!("failed to create {}: {e}", self.output_dir.display())))?;
        let path = self.output_dir.join(format!("{process_name}.csv"));
        let is_new = !path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| backend(format!("failed to open {}: {e}", path.display())))?;

        let mut writer = csv::Writer::from_writer(file);
        if is_new {
            writer
                .write_record(["point_id", "timestamp", "value"])
                .map_err(|e| backend(e.to_string()))?;
        }

        info!(
            host,
            points = points.len(),
            output = %path.display(),
            "CSV historian connected"
        );
        *self.session.lock().await = Some(Session {
            points,
            kinds,
            writer,
            path,
        });
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), HistorianError> {
        if let Some(mut session) = self.session.lock().await.take() {
            session
                .writer
                .flush()
                .map_err(|e| backend(e.to_string()))?;
        }
        Ok(())
    }

    async fn find_point(&self, name: &str) -> Result<i32, HistorianError> {
        let guard = self.session.lock().await;
        let session = guard.as_ref().ok_or(HistorianError::NotConnected)?;
        session
            .points
            .get(name)
            .copied()
            .ok_or_else(|| HistorianError::PointNotFound {
                name: name.to_string(),
                code: POINT_NOT_FOUND,
            })
    }

    async fn point_type(&self, point_id: i32) -> Result<PointKind, HistorianError> {
        let guard = self.session.lock().await;
        let session = guard.as_ref().ok_or(HistorianError::NotConnected)?;
        session
            .kinds
            .get(&point_id)
            .copied()
            .ok_or(HistorianError::PointType {
                id: point_id,
                code: NO_SUCH_POINT,
            })
    }

    async fn put_snapshots(&self, snapshots: &[Snapshot]) -> Result<Vec<i32>, HistorianError> {
        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or(HistorianError::NotConnected)?;

        let mut codes = Vec::with_capacity(snapshots.len());
        for snapshot in snapshots {
            if !session.kinds.contains_key(&snapshot.point_id) {
                codes.push(NO_SUCH_POINT);
                continue;
            }
            session
                .writer
                .write_record(&[
                    snapshot.point_id.to_string(),
                    snapshot.timestamp.format("%Y-%m-%dT%H:%M:%S%.3f").to_string(),
                    snapshot.value.to_string(),
                ])
                .map_err(|e| HistorianError::Write(e.to_string()))?;
            codes.push(ITEM_OK);
        }
        session
            .writer
            .flush()
            .map_err(|e| HistorianError::Write(e.to_string()))?;
        Ok(codes)
    }
}
