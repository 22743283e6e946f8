//! In-memory historian.
//!
//! Simulates the historian without a server. Used by the test suite and by
//! `--dry-run`, where every point name is accepted and auto-registered as `Real`.
//! In that mode written batches are counted but not kept.
//! All delays use `tokio::time::sleep` so the simulated latency never blocks a
//! runtime worker.

use super::{Historian, PointKind, Snapshot, ITEM_OK};
use crate::error::HistorianError;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::sleep;

/// Code returned by the historian for an unknown point name.
pub const POINT_NOT_FOUND: i32 = -5;

/// Code returned for a write to a point number that does not exist.
pub const NO_SUCH_POINT: i32 = -1;

#[derive(Default)]
struct State {
    connected: bool,
    host: Option<String>,
    points: HashMap<String, (i32, PointKind)>,
    next_id: i32,
    failing_types: HashSet<i32>,
    item_codes: HashMap<i32, i32>,
    writes: Vec<Vec<Snapshot>>,
    write_calls: usize,
    items_written: usize,
    find_calls: usize,
    type_calls: usize,
    fail_writes: bool,
}

/// Historian backed by process memory.
///
/// # Example
///
/// ```rust,ignore
/// let historian = MemoryHistorian::new().with_point("Reactor.Temp", 17, PointKind::Real);
/// historian.connect("localhost", "test").await?;
/// assert_eq!(historian.find_point("Reactor.Temp").await?, 17);
/// ```
#[derive(Default)]
pub struct MemoryHistorian {
    state: Mutex<State>,
    accept_all: bool,
    discard_writes: bool,
    latency: Duration,
}

impl MemoryHistorian {
    /// Empty historian: every lookup fails until points are registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Historian that registers unknown names on lookup (dry runs).
    ///
    /// Written batches are only counted; [`writes`](Self::writes) stays empty.
    pub fn accepting_all() -> Self {
        Self {
            accept_all: true,
            discard_writes: true,
            ..Self::default()
        }
    }

    /// Registers a point.
    pub fn with_point(self, name: &str, id: i32, kind: PointKind) -> Self {
        self.lock().points.insert(name.to_string(), (id, kind));
        self
    }

    /// Makes type lookups for `point_id` fail.
    pub fn with_failing_type(self, point_id: i32) -> Self {
        self.lock().failing_types.insert(point_id);
        self
    }

    /// Reports `code` for every item written to `point_id`.
    pub fn with_item_code(self, point_id: i32, code: i32) -> Self {
        self.lock().item_codes.insert(point_id, code);
        self
    }

    /// Makes every write call fail as a whole.
    pub fn failing_writes(self) -> Self {
        self.lock().fail_writes = true;
        self
    }

    /// Adds a fixed delay to every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Number of `find_point` calls received.
    pub fn find_calls(&self) -> usize {
        self.lock().find_calls
    }

    /// Number of `point_type` calls received.
    pub fn type_calls(&self) -> usize {
        self.lock().type_calls
    }

    /// Number of `put_snapshots` calls received.
    pub fn write_calls(&self) -> usize {
        self.lock().write_calls
    }

    /// Number of snapshots received across all write calls.
    pub fn items_written(&self) -> usize {
        self.lock().items_written
    }

    /// Snapshot batches in the order they were written. Empty for
    /// [`accepting_all`](Self::accepting_all).
    pub fn writes(&self) -> Vec<Vec<Snapshot>> {
        self.lock().writes.clone()
    }

    /// Host passed to the last `connect`.
    pub fn host(&self) -> Option<String> {
        self.lock().host.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // a poisoned lock only means a test panicked mid-call; the state is still usable
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn delay(&self) {
        if !self.latency.is_zero() {
            sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl Historian for MemoryHistorian {
    async fn connect(&self, host: &str, _process_name: &str) -> Result<(), HistorianError> {
        self.delay().await;
        let mut state = self.lock();
        state.connected = true;
        state.host = Some(host.to_string());
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), HistorianError> {
        self.lock().connected = false;
        Ok(())
    }

    async fn find_point(&self, name: &str) -> Result<i32, HistorianError> {
        self.delay().await;
        let mut state = self.lock();
        if !state.connected {
            return Err(HistorianError::NotConnected);
        }
        state.find_calls += 1;

        if let Some((id, _)) = state.points.get(name) {
            return Ok(*id);
        }
        if self.accept_all {
            let id = state
                .points
                .values()
                .map(|(id, _)| *id)
                .max()
                .unwrap_or(0)
                .max(state.next_id)
                + 1;
            state.next_id = id;
            state.points.insert(name.to_string(), (id, PointKind::Real));
            return Ok(id);
        }
        Err(HistorianError::PointNotFound {
            name: name.to_string(),
            code: POINT_NOT_FOUND,
        })
    }

    async fn point_type(&self, point_id: i32) -> Result<PointKind, HistorianError> {
        self.delay().await;
        let mut state = self.lock();
        if !state.connected {
            return Err(HistorianError::NotConnected);
        }
        state.type_calls += 1;

        if state.failing_types.contains(&point_id) {
            return Err(HistorianError::PointType {
                id: point_id,
                code: NO_SUCH_POINT,
            });
        }
        state
            .points
            .values()
            .find(|(id, _)| *id == point_id)
            .map(|(_, kind)| *kind)
            .ok_or(HistorianError::PointType {
                id: point_id,
                code: NO_SUCH_POINT,
            })
    }

    async fn put_snapshots(&self, snapshots: &[Snapshot]) -> Result<Vec<i32>, HistorianError> {
        self.delay().await;
        let mut state = self.lock();
        if !state.connected {
            return Err(HistorianError::NotConnected);
        }
        if state.fail_writes {
            return Err(HistorianError::Write("simulated write failure".into()));
        }

        let known: HashSet<i32> = state.points.values().map(|(id, _)| *id).collect();
        let codes: Vec<i32> = snapshots
            .iter()
            .map(|s| match state.item_codes.get(&s.point_id) {
                Some(code) => *code,
                None if known.contains(&s.point_id) => ITEM_OK,
                None => NO_SUCH_POINT,
            })
            .collect();
        state.write_calls += 1;
        state.items_written += snapshots.len();
        if !self.discard_writes {
            state.writes.push(snapshots.to_vec());
        }
        Ok(codes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lookups_require_connection() {
        let historian = MemoryHistorian::new().with_point("A", 1, PointKind::Real);
        assert_eq!(
            historian.find_point("A").await,
            Err(HistorianError::NotConnected)
        );
        historian.connect("pi-server", "test").await.unwrap();
        assert_eq!(historian.find_point("A").await, Ok(1));
        assert_eq!(historian.host().as_deref(), Some("pi-server"));
    }

    #[tokio::test]
    async fn unknown_points_fail_unless_accepting_all() {
        let strict = MemoryHistorian::new();
        strict.connect("h", "p").await.unwrap();
        assert!(matches!(
            strict.find_point("Missing").await,
            Err(HistorianError::PointNotFound { code: POINT_NOT_FOUND, .. })
        ));

        let open = MemoryHistorian::accepting_all().with_point("Known", 10, PointKind::Digital);
        open.connect("h", "p").await.unwrap();
        let a = open.find_point("New.A").await.unwrap();
        let b = open.find_point("New.B").await.unwrap();
        assert!(a > 10 && b > a);
        assert_eq!(open.find_point("New.A").await.unwrap(), a);
        assert_eq!(open.point_type(a).await.unwrap(), PointKind::Real);
        assert_eq!(open.find_calls(), 3);
    }

    #[tokio::test]
    async fn writes_report_per_item_codes() {
        let historian = MemoryHistorian::new()
            .with_point("A", 1, PointKind::Real)
            .with_point("B", 2, PointKind::Integer)
            .with_item_code(2, -109);
        historian.connect("h", "p").await.unwrap();

        let timestamp = chrono::NaiveDateTime::MIN;
        let snapshots = [1, 2, 3].map(|point_id| Snapshot {
            point_id,
            value: 0.0,
            timestamp,
        });
        let codes = historian.put_snapshots(&snapshots).await.unwrap();
        assert_eq!(codes, vec![ITEM_OK, -109, NO_SUCH_POINT]);
        assert_eq!(historian.writes()[0].len(), 3);
    }

    #[tokio::test]
    async fn dry_run_counts_writes_without_keeping_them() {
        let historian = MemoryHistorian::accepting_all();
        historian.connect("h", "p").await.unwrap();
        let id = historian.find_point("A").await.unwrap();

        let snapshots: Vec<Snapshot> = (0..10_000)
            .map(|i| Snapshot {
                point_id: id,
                value: f64::from(i),
                timestamp: chrono::NaiveDateTime::MIN,
            })
            .collect();
        for _ in 0..10 {
            historian.put_snapshots(&snapshots).await.unwrap();
        }

        assert_eq!(historian.write_calls(), 10);
        assert_eq!(historian.items_written(), 100_000);
        assert!(historian.writes().is_empty());
    }
}
