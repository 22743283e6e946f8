//! Decode side of one archive pair.
//!
//! A decode worker walks its pair through
//! `Discovered -> TagsDecoded -> PointsResolved -> RecordsDecoded`, then hands the
//! resulting [`DecodedBatch`] to the writer stage, which finishes it as
//! `Written`, `PartialFailure` or `Failed`. File reads run on the blocking pool.

use crate::dat::{read_float_file, read_tag_file, ArchivePair, FloatDecodeStats, FloatRecord};
use crate::error::{AppResult, ConvertError};
use crate::historian::Snapshot;
use crate::points::{PointLookup, PointResolver};
use crate::tag_map::{external_name_for, TagMap};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Processing state of an archive pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairState {
    /// Found by directory discovery.
    Discovered,
    /// Tag file read.
    TagsDecoded,
    /// Every tag mapped to a point identity.
    PointsResolved,
    /// Float file read.
    RecordsDecoded,
    /// Taken from the handoff queue by the writer stage.
    HandedOff,
    /// Every record accepted.
    Written,
    /// Write call succeeded but some items were rejected.
    PartialFailure,
    /// Decode or write failed.
    Failed,
}

impl PairState {
    /// State name as logged.
    pub fn as_str(self) -> &'static str {
        match self {
            PairState::Discovered => "discovered",
            PairState::TagsDecoded => "tags_decoded",
            PairState::PointsResolved => "points_resolved",
            PairState::RecordsDecoded => "records_decoded",
            PairState::HandedOff => "handed_off",
            PairState::Written => "written",
            PairState::PartialFailure => "partial_failure",
            PairState::Failed => "failed",
        }
    }

    /// Whether no further transition follows.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PairState::Written | PairState::PartialFailure | PairState::Failed
        )
    }
}

impl fmt::Display for PairState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logs entry into `state`. Callers run inside the pair's span.
pub(crate) fn enter(state: PairState) {
    debug!(state = %state, "pair state");
}

/// Everything the writer needs for one pair. Owned by the decode worker until
/// it is sent on the handoff queue.
#[derive(Debug)]
pub struct DecodedBatch {
    /// Pair this batch came from.
    pub pair: ArchivePair,
    /// Identities of the pair's tags.
    pub lookup: PointLookup,
    /// Valid records in file order.
    pub records: Vec<FloatRecord>,
    /// Float file decode counters.
    pub stats: FloatDecodeStats,
    /// Time spent decoding and resolving.
    pub decode_elapsed: Duration,
}

impl DecodedBatch {
    /// Snapshots for every valid record whose tag resolved.
    pub fn snapshots(&self) -> Vec<Snapshot> {
        self.records
            .iter()
            .filter(|r| r.valid)
            .filter_map(|r| {
                self.lookup
                    .external_id_for(r.internal_id)
                    .map(|point_id| Snapshot {
                        point_id,
                        value: r.value,
                        timestamp: r.timestamp,
                    })
            })
            .collect()
    }
}

/// Decodes the tag file, resolves its tags, then decodes the float file.
///
/// Any tag-file failure, or a float-file header failure, is returned as
/// [`ConvertError::PairDecode`]. Unmapped and unresolvable tags are not errors.
pub async fn process_pair(
    pair: ArchivePair,
    resolver: &PointResolver,
    tag_map: Option<&TagMap>,
) -> AppResult<DecodedBatch> {
    let started = Instant::now();
    enter(PairState::Discovered);

    let tag_path = pair.tag_path.clone();
    let tag_file = tokio::task::spawn_blocking(move || read_tag_file(&tag_path))
        .await
        .map_err(|e| ConvertError::Task(e.to_string()))?
        .map_err(|e| ConvertError::pair_decode(&pair.tag_path, e))?;
    enter(PairState::TagsDecoded);

    let mut lookup = PointLookup::new();
    let mut dropped = 0usize;
    for tag in &tag_file.tags {
        let Some(external_name) = external_name_for(tag_map, &tag.name) else {
            debug!(tag = %tag.name, "no rename entry, dropping tag");
            dropped += 1;
            continue;
        };
        if let Some(existing) = lookup.get_by_internal_id(tag.internal_id) {
            warn!(
                id = tag.internal_id,
                tag = %tag.name,
                kept = %existing.internal_name,
                "duplicate tag id, keeping first"
            );
            continue;
        }

        let identity = resolver
            .resolve(tag.internal_id, &tag.name, Some(external_name))
            .await;
        if !lookup.add(identity) {
            warn!(id = tag.internal_id, tag = %tag.name, "duplicate tag name, keeping first");
        }
    }
    lookup.log_all();
    info!(
        tags = tag_file.tags.len(),
        resolvable = lookup.resolvable_count(),
        dropped,
        "points resolved"
    );
    enter(PairState::PointsResolved);

    let float_path = pair.float_path.clone();
    let float_file = tokio::task::spawn_blocking(move || read_float_file(&float_path))
        .await
        .map_err(|e| ConvertError::Task(e.to_string()))?
        .map_err(|e| ConvertError::pair_decode(&pair.float_path, e))?;
    enter(PairState::RecordsDecoded);

    let decode_elapsed = started.elapsed();
    info!(
        records = float_file.stats.decoded,
        invalid = float_file.stats.invalid,
        missing = float_file.stats.missing,
        elapsed_ms = decode_elapsed.as_millis() as u64,
        "pair decoded"
    );

    Ok(DecodedBatch {
        pair,
        lookup,
        records: float_file.records,
        stats: float_file.stats,
        decode_elapsed,
    })
}
