//! Per-pair outcomes and the run summary.

use crate::dat::ArchivePair;
use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

/// Terminal status of one archive pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairStatus {
    /// Every forwarded item was accepted; `benign` of them with an allow-listed code.
    Written {
        /// Items accepted, benign ones included.
        records: usize,
        /// Items reported with an allow-listed code.
        benign: usize,
    },
    /// Nothing to forward; no write call was made.
    Skipped,
    /// The write call returned, but some items were rejected.
    PartialFailure {
        /// Items accepted.
        written: usize,
        /// Items rejected.
        rejected: usize,
    },
    /// The pair was abandoned (decode failure or failed write call).
    Failed {
        /// Error that ended the pair.
        reason: String,
    },
}

impl PairStatus {
    /// Items the historian accepted for this pair.
    pub fn records_written(&self) -> usize {
        match self {
            PairStatus::Written { records, .. } => *records,
            PairStatus::PartialFailure { written, .. } => *written,
            PairStatus::Skipped | PairStatus::Failed { .. } => 0,
        }
    }

    /// Whether the pair failed outright or partially.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            PairStatus::Failed { .. } | PairStatus::PartialFailure { .. }
        )
    }
}

impl fmt::Display for PairStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairStatus::Written { records, benign } => {
                write!(f, "written ({records} records, {benign} benign)")
            }
            PairStatus::Skipped => write!(f, "skipped (no forwardable records)"),
            PairStatus::PartialFailure { written, rejected } => {
                write!(f, "partial failure ({written} written, {rejected} rejected)")
            }
            PairStatus::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

/// Outcome of one archive pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairOutcome {
    /// The archive pair.
    pub pair: ArchivePair,
    /// What happened to it.
    pub status: PairStatus,
}

/// Everything a run did.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// One entry per discovered pair, ordered by float file path.
    pub outcomes: Vec<PairOutcome>,
    /// Wall time of the run.
    pub elapsed: Duration,
}

impl RunSummary {
    /// Total items accepted by the historian.
    pub fn records_written(&self) -> usize {
        self.outcomes.iter().map(|o| o.status.records_written()).sum()
    }

    /// Pairs that failed outright or partially.
    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.status.is_failure()).count()
    }

    /// Status recorded for `pair`, if it was part of the run.
    pub fn outcome_for(&self, pair: &ArchivePair) -> Option<&PairStatus> {
        self.outcomes
            .iter()
            .find(|o| &o.pair == pair)
            .map(|o| &o.status)
    }

    /// Logs one line per pair and a total.
    pub fn log(&self) {
        for outcome in &self.outcomes {
            if outcome.status.is_failure() {
                warn!(pair = %outcome.pair.name(), status = %outcome.status, "pair finished");
            } else {
                info!(pair = %outcome.pair.name(), status = %outcome.status, "pair finished");
            }
        }
        info!(
            pairs = self.outcomes.len(),
            failed = self.failed(),
            records = self.records_written(),
            elapsed_ms = self.elapsed.as_millis() as u64,
            "conversion finished"
        );
    }
}
