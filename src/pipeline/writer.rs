//! Writer stage: drains the handoff queue and forwards each pair in one call.

use super::pair::{enter, DecodedBatch, PairState};
use super::summary::{PairOutcome, PairStatus};
use crate::error::ConvertError;
use crate::historian::HistorianConnection;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, info_span, warn, Instrument};

/// Forwards one pair's batch. Never fails; the result is the pair's outcome.
pub async fn write_batch(batch: DecodedBatch, connection: &HistorianConnection) -> PairOutcome {
    let snapshots = batch.snapshots();
    if snapshots.is_empty() {
        info!("no forwardable records, skipping write");
        return PairOutcome {
            pair: batch.pair,
            status: PairStatus::Skipped,
        };
    }

    let status = match connection.put_snapshots(&snapshots).await {
        Ok(report) => {
            info!(
                records = snapshots.len(),
                lock_wait_ms = report.lock_wait.as_millis() as u64,
                write_ms = report.elapsed.as_millis() as u64,
                decode_ms = batch.decode_elapsed.as_millis() as u64,
                "batch written"
            );
            let outcome = report.outcome;
            if outcome.is_success() {
                enter(PairState::Written);
                PairStatus::Written {
                    records: outcome.written(),
                    benign: outcome.benign,
                }
            } else {
                for &(index, code) in &outcome.rejected {
                    if let Some(s) = snapshots.get(index) {
                        warn!(point = s.point_id, timestamp = %s.timestamp, code, "item rejected");
                    }
                }
                enter(PairState::PartialFailure);
                PairStatus::PartialFailure {
                    written: outcome.written(),
                    rejected: outcome.rejected.len(),
                }
            }
        }
        Err(e) => {
            let e = ConvertError::from(e);
            error!(error = %e, records = snapshots.len(), "batch write failed");
            enter(PairState::Failed);
            PairStatus::Failed {
                reason: e.to_string(),
            }
        }
    };

    PairOutcome {
        pair: batch.pair,
        status,
    }
}

/// Consumes batches until every sender is dropped, running at most
/// `writer_workers` writes at once. Returns one outcome per batch received,
/// except for write tasks that panicked.
pub async fn run_writer_stage(
    mut rx: mpsc::Receiver<DecodedBatch>,
    connection: HistorianConnection,
    writer_workers: usize,
) -> Vec<PairOutcome> {
    let permits = Arc::new(Semaphore::new(writer_workers.max(1)));
    let mut tasks = JoinSet::new();

    loop {
        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };
        let Some(batch) = rx.recv().await else {
            break;
        };

        let connection = connection.clone();
        let span = info_span!("pair", pair = %batch.pair.name());
        tasks.spawn(
            async move {
                let _permit = permit;
                enter(PairState::HandedOff);
                write_batch(batch, &connection).await
            }
            .instrument(span),
        );
    }

    let mut outcomes = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => error!(error = %e, "writer task failed"),
        }
    }
    outcomes
}
