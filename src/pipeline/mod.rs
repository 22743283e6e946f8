//! Ingestion pipeline.
//!
//! ```text
//!   pairs ──► decode workers (≤ decode_workers, semaphore)
//!                 │  tag file ─► point resolution ─► float file
//!                 ▼
//!           handoff queue (bounded mpsc, queue_capacity)
//!                 │
//!                 ▼
//!           writer stage (≤ writer_workers concurrent writes)
//!                 │  one put_snapshots call per pair
//!                 ▼
//!             historian
//! ```
//!
//! A decode worker keeps its permit until its batch is accepted by the queue, so
//! a slow historian stalls decoding instead of piling up decoded batches. Pairs
//! are independent: a failure in one is recorded in its [`PairOutcome`] and the
//! run continues.

pub mod pair;
pub mod summary;
pub mod writer;

pub use pair::{process_pair, DecodedBatch, PairState};
pub use summary::{PairOutcome, PairStatus, RunSummary};
pub use writer::{run_writer_stage, write_batch};

use crate::config::PipelineSettings;
use crate::dat::ArchivePair;
use crate::historian::HistorianConnection;
use crate::points::PointResolver;
use crate::tag_map::TagMap;
use pair::enter;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, info_span, Instrument};

/// Concurrency limits for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Pairs decoded and resolved at once.
    pub decode_workers: usize,
    /// Concurrent historian write calls.
    pub writer_workers: usize,
    /// Decoded batches buffered between the stages.
    pub queue_capacity: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions::from(&PipelineSettings::default())
    }
}

impl From<&PipelineSettings> for PipelineOptions {
    fn from(settings: &PipelineSettings) -> Self {
        Self {
            decode_workers: settings.decode_workers,
            writer_workers: settings.writer_workers,
            queue_capacity: settings.queue_capacity,
        }
    }
}

/// Runs archive pairs through decode, resolution and write.
pub struct Pipeline {
    connection: HistorianConnection,
    resolver: Arc<PointResolver>,
    tag_map: Option<Arc<TagMap>>,
    options: PipelineOptions,
}

impl Pipeline {
    /// Pipeline writing through `connection`, resolving through `resolver`.
    pub fn new(
        connection: HistorianConnection,
        resolver: Arc<PointResolver>,
        tag_map: Option<Arc<TagMap>>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            connection,
            resolver,
            tag_map,
            options,
        }
    }

    /// Resolver shared by every decode worker.
    pub fn resolver(&self) -> &PointResolver {
        &self.resolver
    }

    /// Processes every pair and returns one outcome per pair, sorted by float
    /// file path.
    pub async fn run(&self, pairs: Vec<ArchivePair>) -> RunSummary {
        let started = Instant::now();
        info!(
            pairs = pairs.len(),
            decode_workers = self.options.decode_workers,
            writer_workers = self.options.writer_workers,
            "starting conversion"
        );

        let (tx, rx) = mpsc::channel(self.options.queue_capacity.max(1));
        let writer = tokio::spawn(run_writer_stage(
            rx,
            self.connection.clone(),
            self.options.writer_workers,
        ));

        let permits = Arc::new(Semaphore::new(self.options.decode_workers.max(1)));
        let mut producers = JoinSet::new();
        for pair in pairs.iter().cloned() {
            let permits = permits.clone();
            let tx = tx.clone();
            let resolver = self.resolver.clone();
            let tag_map = self.tag_map.clone();
            let span = info_span!("pair", pair = %pair.name());

            producers.spawn(
                async move {
                    let Ok(_permit) = permits.acquire_owned().await else {
                        return Some(failed(pair, "decode pool closed".into()));
                    };
                    let batch = match process_pair(pair.clone(), &resolver, tag_map.as_deref()).await {
                        Ok(batch) => batch,
                        Err(e) => {
                            error!(error = %e, "pair failed");
                            enter(PairState::Failed);
                            return Some(failed(pair, e.to_string()));
                        }
                    };
                    if tx.send(batch).await.is_err() {
                        error!("writer stage closed before batch was handed off");
                        return Some(failed(pair, "writer stage closed".into()));
                    }
                    None
                }
                .instrument(span),
            );
        }
        drop(tx);

        let mut outcomes = Vec::with_capacity(pairs.len());
        while let Some(joined) = producers.join_next().await {
            match joined {
                Ok(Some(outcome)) => outcomes.push(outcome),
                Ok(None) => {}
                Err(e) => error!(error = %e, "decode task failed"),
            }
        }
        match writer.await {
            Ok(written) => outcomes.extend(written),
            Err(e) => error!(error = %e, "writer stage failed"),
        }

        for pair in &pairs {
            if !outcomes.iter().any(|o| &o.pair == pair) {
                outcomes.push(failed(pair.clone(), "worker task aborted".into()));
            }
        }
        outcomes.sort_by(|a, b| a.pair.float_path.cmp(&b.pair.float_path));

        let stats = self.resolver.stats();
        info!(
            lookups = stats.requests,
            remote = stats.remote_lookups,
            hits = stats.hits(),
            failures = stats.failures,
            "point resolution"
        );

        RunSummary {
            outcomes,
            elapsed: started.elapsed(),
        }
    }
}

fn failed(pair: ArchivePair, reason: String) -> PairOutcome {
    PairOutcome {
        pair,
        status: PairStatus::Failed { reason },
    }
}
