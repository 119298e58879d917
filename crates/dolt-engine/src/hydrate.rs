//! Bootstrap hydration: rebuild the active lane set after a restart.
//!
//! After a process restart the lane tables may be stale or empty while the
//! record table holds the full durable history. Hydration re-derives the
//! visible context within a token budget, coarse tiers first so a long
//! history always keeps its bindle backbone even when the budget is tight.

use tracing::{debug, info, instrument};

use dolt_core::{Record, RecordTier};
use dolt_store::{LaneSelection, ListRecords, RecordStore};

use crate::errors::Result;
use crate::policy::{resolve_lane_policies, LanePolicy, LanePolicyOverrides};

/// Inputs for [`hydrate_bootstrap_state`].
pub struct HydrateBootstrapParams<'a> {
    /// Backing store.
    pub store: &'a RecordStore,
    /// Session to hydrate.
    pub session_id: &'a str,
    /// Optional channel-scoped session key stamped on lane rows.
    pub session_key: Option<&'a str>,
    /// Global token budget across all tiers.
    pub token_budget: i64,
    /// Optional per-tier policy overrides.
    pub lane_policy_overrides: Option<&'a LanePolicyOverrides>,
}

/// Selected pointers per tier, in newest-first scan order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TierPointers {
    /// Turn lane pointers.
    pub turn: Vec<String>,
    /// Leaf lane pointers.
    pub leaf: Vec<String>,
    /// Bindle lane pointers.
    pub bindle: Vec<String>,
}

/// Selected records per tier, ascending chronological within each tier.
#[derive(Clone, Debug, Default)]
pub struct TierRecords {
    /// Turn lane records.
    pub turn: Vec<Record>,
    /// Leaf lane records.
    pub leaf: Vec<Record>,
    /// Bindle lane records.
    pub bindle: Vec<Record>,
}

/// The hydrated context handed to the downstream reasoning engine.
#[derive(Clone, Debug, Default)]
pub struct ContextAssembly {
    /// Selected records, chronological within each tier.
    pub selected_records: TierRecords,
}

impl ContextAssembly {
    /// Records in prompt order: bindles, then leaves, then turns, each
    /// chronological.
    pub fn ordered(&self) -> impl Iterator<Item = &Record> {
        self.selected_records
            .bindle
            .iter()
            .chain(self.selected_records.leaf.iter())
            .chain(self.selected_records.turn.iter())
    }

    /// Token total across all selected records.
    #[must_use]
    pub fn total_tokens(&self) -> i64 {
        self.ordered().map(|record| record.token_count).sum()
    }
}

/// Result of one hydration pass.
#[derive(Clone, Debug, Default)]
pub struct BootstrapHydration {
    /// False when the session had no records to select.
    pub hydrated: bool,
    /// Activated pointers per tier, newest first.
    pub activated_pointers: TierPointers,
    /// Selected records for context assembly.
    pub assembly: ContextAssembly,
}

/// Rebuild the active lane set for one session from durable history.
///
/// Tiers fill in priority order Bindle, Leaf, Turn. Each tier admits its
/// newest records greedily into `min(tier.target, remaining_budget)`; for
/// Leaf and Bindle the policy's `summary_cap` additionally bounds admitted
/// summary tokens. The first record that would exceed either bound ends that
/// tier's scan, so the selection is always a contiguous most-recent window.
/// Each tier's selection replaces that lane atomically.
///
/// Not safe against concurrent hydration of the same session; callers
/// serialize per session.
///
/// # Errors
///
/// Returns [`crate::EngineError::Policy`] for invalid overrides and
/// propagates store failures.
#[instrument(skip_all, fields(session_id = params.session_id))]
pub fn hydrate_bootstrap_state(params: &HydrateBootstrapParams<'_>) -> Result<BootstrapHydration> {
    let policies = resolve_lane_policies(params.lane_policy_overrides)?;
    let mut remaining = params.token_budget.max(0);
    let mut result = BootstrapHydration::default();

    for tier in [RecordTier::Bindle, RecordTier::Leaf, RecordTier::Turn] {
        let policy = policies.tier(tier);
        let admitted = hydrate_tier(params, tier, &policy, remaining)?;
        let used: i64 = admitted.iter().map(|record| record.token_count).sum();
        remaining -= used;

        debug!(
            tier = tier.as_str(),
            admitted = admitted.len(),
            tokens = used,
            remaining,
            "hydrated lane"
        );

        let (pointers, records) = match tier {
            RecordTier::Turn => (
                &mut result.activated_pointers.turn,
                &mut result.assembly.selected_records.turn,
            ),
            RecordTier::Leaf => (
                &mut result.activated_pointers.leaf,
                &mut result.assembly.selected_records.leaf,
            ),
            RecordTier::Bindle => (
                &mut result.activated_pointers.bindle,
                &mut result.assembly.selected_records.bindle,
            ),
        };
        *pointers = admitted.iter().map(|record| record.pointer.clone()).collect();
        // Scan order is newest first; assembly wants chronological.
        *records = admitted.into_iter().rev().collect();
    }

    result.hydrated = !result.activated_pointers.turn.is_empty()
        || !result.activated_pointers.leaf.is_empty()
        || !result.activated_pointers.bindle.is_empty();

    info!(
        hydrated = result.hydrated,
        bindles = result.activated_pointers.bindle.len(),
        leaves = result.activated_pointers.leaf.len(),
        turns = result.activated_pointers.turn.len(),
        tokens = result.assembly.total_tokens(),
        "bootstrap hydration complete"
    );
    Ok(result)
}

/// Admit one tier's newest records into its budget and commit the lane
/// selection. Returns the admitted records in newest-first scan order.
fn hydrate_tier(
    params: &HydrateBootstrapParams<'_>,
    tier: RecordTier,
    policy: &LanePolicy,
    remaining_budget: i64,
) -> Result<Vec<Record>> {
    let tier_budget = policy.target.min(remaining_budget);
    let candidates = params.store.list_records_by_session(&ListRecords {
        session_id: params.session_id,
        tier: Some(tier),
        limit: None,
        newest_first: true,
    })?;

    let mut admitted = Vec::new();
    let mut used = 0i64;
    let mut summary_used = 0i64;
    for record in candidates {
        let cost = record.token_count.max(0);
        if used + cost > tier_budget {
            break;
        }
        let is_summary = tier != RecordTier::Turn;
        if is_summary {
            if let Some(cap) = policy.summary_cap {
                if summary_used + cost > cap {
                    break;
                }
            }
            summary_used += cost;
        }
        used += cost;
        admitted.push(record);
    }

    let selected: Vec<(String, i64)> = admitted
        .iter()
        .map(|record| (record.pointer.clone(), record.event_ts_ms))
        .collect();
    params.store.apply_lane_selection(&LaneSelection {
        session_id: params.session_id,
        session_key: params.session_key,
        tier,
        selected,
    })?;

    Ok(admitted)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
