//! Reset finalization: drain every active turn and leaf into bindles.
//!
//! When a session resets, its visible context must survive as durable
//! summaries. Finalization runs a fixed pipeline of four stages, ordered by
//! [`ResetStage::ORDERED`] rather than convention: capture the unpersisted
//! tail, fold turns into leaves, fold leaves into bindles, then force one
//! short bindle over whatever remains. On success no turn or leaf stays
//! active.
//!
//! Every stage summarizes before it writes, so a summarizer failure aborts
//! that stage with the store untouched; prior committed stages stay
//! committed and the whole finalization is safe to re-invoke.

use tracing::{debug, info, instrument, warn};

use dolt_core::{Record, RecordTier};
use dolt_store::{LaneSnapshot, ListActiveLane, RecordStore};

use crate::errors::{EngineError, Result};
use crate::policy::{
    resolve_lane_policies, select_turn_chunk_for_compaction, LanePolicies, LanePolicyOverrides,
    TurnChunkCandidate,
};
use crate::rollup::{build_rollup_commit, build_summarize_request, validate_summary_outcome};
use crate::summarizer::{SummarizeMode, Summarizer, TailIngestor};

/// Upper bound on rollup passes per lane before finalization is declared
/// non-convergent.
pub const DEFAULT_MAX_COMPACTION_PASSES: usize = 256;
/// Minimum active turns required to run a turn-to-leaf pass.
pub const DEFAULT_MIN_TURN_SOURCE_FLOOR: usize = 2;
/// Minimum active leaves required to run a leaf-to-bindle pass.
pub const DEFAULT_MIN_LEAF_SOURCE_FLOOR: usize = 2;

/// The four pipeline stages, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResetStage {
    /// Capture unpersisted tail turns via the optional collaborator.
    IngestTail,
    /// Fold active turn chunks into leaf summaries.
    TurnToLeaf,
    /// Fold active leaf chunks into bindle summaries.
    LeafToBindle,
    /// Force one bindle over every residual active turn and leaf.
    ShortBindle,
}

impl ResetStage {
    /// Pipeline order.
    pub const ORDERED: [Self; 4] = [
        Self::IngestTail,
        Self::TurnToLeaf,
        Self::LeafToBindle,
        Self::ShortBindle,
    ];

    /// Stable name used in logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::IngestTail => "ingest-tail",
            Self::TurnToLeaf => "turn-to-leaf",
            Self::LeafToBindle => "leaf-to-bindle",
            Self::ShortBindle => "short-bindle",
        }
    }
}

/// Inputs for [`finalize_reset`].
pub struct FinalizeResetParams<'a> {
    /// Backing store.
    pub store: &'a RecordStore,
    /// Session being reset.
    pub session_id: &'a str,
    /// Optional channel-scoped session key stamped on new rows.
    pub session_key: Option<&'a str>,
    /// Summary producer.
    pub summarizer: &'a dyn Summarizer,
    /// Optional source of unpersisted tail turns.
    pub tail_ingestor: Option<&'a dyn TailIngestor>,
    /// Optional per-tier policy overrides.
    pub lane_policy_overrides: Option<&'a LanePolicyOverrides>,
    /// Minimum turns per turn-to-leaf pass.
    pub min_turn_source_floor: usize,
    /// Minimum leaves per leaf-to-bindle pass.
    pub min_leaf_source_floor: usize,
    /// Pass ceiling per lane.
    pub max_compaction_passes: usize,
}

/// Residual active counts observed just before the short-bindle stage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ResidualCounts {
    /// Active turns remaining after compaction.
    pub turns: usize,
    /// Active leaves remaining after compaction.
    pub leaves: usize,
}

/// Outcome of one finalization run.
#[derive(Clone, Debug, Default)]
pub struct ResetFinalization {
    /// Tail turns captured by stage one.
    pub ingested_tail_count: usize,
    /// Turn-to-leaf rollups committed.
    pub turn_to_leaf_rollups: usize,
    /// Leaf-to-bindle rollups committed.
    pub leaf_to_bindle_rollups: usize,
    /// Whether the forced short bindle was produced.
    pub short_bindle_created: bool,
    /// Pointer of the forced short bindle, when created.
    pub short_bindle_pointer: Option<String>,
    /// Active turn/leaf counts entering the short-bindle stage.
    pub residual_before_short_bindle: ResidualCounts,
    /// Lane aggregates after the run; turn and leaf lanes are empty on
    /// success.
    pub active_after_finalize: LaneSnapshot,
}

/// Run the full reset pipeline for one session.
///
/// Idempotent: a repeat run that finds no active turn or leaf commits
/// nothing and reports `short_bindle_created: false`.
///
/// # Errors
///
/// Returns [`EngineError::CompactionPassLimit`] when a compaction lane fails
/// to converge, [`EngineError::Summarizer`] / [`EngineError::SummaryContract`]
/// for collaborator failures, and propagates store errors.
#[instrument(skip_all, fields(session_id = params.session_id))]
pub async fn finalize_reset(params: &FinalizeResetParams<'_>) -> Result<ResetFinalization> {
    let policies = resolve_lane_policies(params.lane_policy_overrides)?;
    let mut result = ResetFinalization::default();

    for stage in ResetStage::ORDERED {
        debug!(stage = stage.as_str(), "finalization stage");
        match stage {
            ResetStage::IngestTail => {
                result.ingested_tail_count = ingest_tail(params).await?;
            }
            ResetStage::TurnToLeaf => {
                result.turn_to_leaf_rollups = compact_turns(params, &policies).await?;
            }
            ResetStage::LeafToBindle => {
                result.leaf_to_bindle_rollups = compact_leaves(params).await?;
            }
            ResetStage::ShortBindle => {
                let (created, pointer, residual) = short_bindle(params).await?;
                result.short_bindle_created = created;
                result.short_bindle_pointer = pointer;
                result.residual_before_short_bindle = residual;
            }
        }
    }

    result.active_after_finalize = params.store.lane_snapshot(params.session_id)?;
    info!(
        ingested = result.ingested_tail_count,
        turn_rollups = result.turn_to_leaf_rollups,
        leaf_rollups = result.leaf_to_bindle_rollups,
        short_bindle = result.short_bindle_created,
        active_turns = result.active_after_finalize.turn.active_records,
        active_leaves = result.active_after_finalize.leaf.active_records,
        active_bindles = result.active_after_finalize.bindle.active_records,
        "reset finalization complete"
    );
    Ok(result)
}

// ─────────────────────────────────────────────────────────────────────────────
// Stages
// ─────────────────────────────────────────────────────────────────────────────

async fn ingest_tail(params: &FinalizeResetParams<'_>) -> Result<usize> {
    let Some(ingestor) = params.tail_ingestor else {
        return Ok(0);
    };
    let count = ingestor
        .ingest_missing_tail()
        .await
        .map_err(|err| EngineError::TailIngest(err.to_string()))?;
    Ok(usize::try_from(count).unwrap_or(usize::MAX))
}

async fn compact_turns(
    params: &FinalizeResetParams<'_>,
    policies: &LanePolicies,
) -> Result<usize> {
    let mut rollups = 0;
    loop {
        let turns = active_records(params.store, params.session_id, RecordTier::Turn)?;
        if turns.len() < params.min_turn_source_floor {
            break;
        }
        let lane_tokens: i64 = turns.iter().map(|record| record.token_count).sum();
        let candidates: Vec<TurnChunkCandidate> = turns
            .iter()
            .map(|record| TurnChunkCandidate {
                pointer: record.pointer.clone(),
                token_count: record.token_count,
            })
            .collect();
        let selection = select_turn_chunk_for_compaction(
            &candidates,
            lane_tokens,
            &policies.turn,
            params.min_turn_source_floor,
        );
        if selection.selected.is_empty() {
            break;
        }
        if rollups >= params.max_compaction_passes {
            return Err(EngineError::CompactionPassLimit {
                lane: "turn",
                max_passes: params.max_compaction_passes,
            });
        }

        // The selection is the oldest prefix of the lane.
        let sources: Vec<Record> = turns
            .into_iter()
            .take(selection.selected.len())
            .collect();
        commit_pass(params, SummarizeMode::Leaf, &sources).await?;
        rollups += 1;
    }
    Ok(rollups)
}

async fn compact_leaves(params: &FinalizeResetParams<'_>) -> Result<usize> {
    let mut rollups = 0;
    loop {
        let leaves = active_records(params.store, params.session_id, RecordTier::Leaf)?;
        if leaves.len() < params.min_leaf_source_floor {
            break;
        }
        if rollups >= params.max_compaction_passes {
            return Err(EngineError::CompactionPassLimit {
                lane: "leaf",
                max_passes: params.max_compaction_passes,
            });
        }
        let sources: Vec<Record> = leaves
            .into_iter()
            .take(params.min_leaf_source_floor)
            .collect();
        commit_pass(params, SummarizeMode::Bindle, &sources).await?;
        rollups += 1;
    }
    Ok(rollups)
}

async fn short_bindle(
    params: &FinalizeResetParams<'_>,
) -> Result<(bool, Option<String>, ResidualCounts)> {
    let turns = active_records(params.store, params.session_id, RecordTier::Turn)?;
    let leaves = active_records(params.store, params.session_id, RecordTier::Leaf)?;
    let residual = ResidualCounts {
        turns: turns.len(),
        leaves: leaves.len(),
    };
    if turns.is_empty() && leaves.is_empty() {
        return Ok((false, None, residual));
    }

    let mut sources: Vec<Record> = leaves.into_iter().chain(turns).collect();
    sources.sort_by(|a, b| {
        a.event_ts_ms
            .cmp(&b.event_ts_ms)
            .then_with(|| a.pointer.cmp(&b.pointer))
    });
    let record = commit_pass(params, SummarizeMode::ResetShortBindle, &sources).await?;
    Ok((true, Some(record.pointer), residual))
}

// ─────────────────────────────────────────────────────────────────────────────
// Shared pass plumbing
// ─────────────────────────────────────────────────────────────────────────────

/// Summarize `sources` in `mode`, validate the reply, and commit the rollup.
/// The summarize call strictly precedes any store write.
async fn commit_pass(
    params: &FinalizeResetParams<'_>,
    mode: SummarizeMode,
    sources: &[Record],
) -> Result<Record> {
    let request = build_summarize_request(mode, params.session_id, sources)?;
    let outcome = params
        .summarizer
        .summarize(&request)
        .await
        .map_err(|err| EngineError::Summarizer(err.to_string()))?;
    let document = validate_summary_outcome(mode, &outcome).inspect_err(|err| {
        warn!(mode = mode.as_str(), %err, "summarizer reply violates the request contract");
    })?;

    debug!(
        mode = mode.as_str(),
        sources = sources.len(),
        provider = outcome.model_selection.provider.as_str(),
        model = outcome.model_selection.model_id.as_str(),
        "rollup summarized"
    );

    let commit = build_rollup_commit(
        mode,
        params.session_id,
        params.session_key,
        document,
        sources,
    );
    let record = params.store.commit_rollup(&commit)?;
    Ok(record)
}

/// Active records for one lane, ascending chronological.
fn active_records(
    store: &RecordStore,
    session_id: &str,
    tier: RecordTier,
) -> Result<Vec<Record>> {
    let entries = store.list_active_lane(&ListActiveLane {
        session_id,
        tier,
        active_only: true,
    })?;
    let mut records = Vec::with_capacity(entries.len());
    for entry in entries {
        let record = store.get_record(&entry.pointer)?.ok_or_else(|| {
            dolt_store::StoreError::RecordNotFound(entry.pointer.clone())
        })?;
        records.push(record);
    }
    records.sort_by(|a, b| {
        a.event_ts_ms
            .cmp(&b.event_ts_ms)
            .then_with(|| a.pointer.cmp(&b.pointer))
    });
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_order_is_fixed() {
        assert_eq!(
            ResetStage::ORDERED,
            [
                ResetStage::IngestTail,
                ResetStage::TurnToLeaf,
                ResetStage::LeafToBindle,
                ResetStage::ShortBindle,
            ]
        );
        assert_eq!(ResetStage::ShortBindle.as_str(), "short-bindle");
    }
}
