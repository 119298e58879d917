//! Lane policy resolution and compaction chunk selection.
//!
//! A [`LanePolicy`] gives one tier its token ceilings: `target` (the budget a
//! hydration pass may fill), `soft` (the lane size above which compaction may
//! select sources), `delta` (the most tokens one compaction pass may fold),
//! and an optional `summary_cap` bounding newly admitted summary tokens
//! independent of `target`.
//!
//! Resolution fails fast on malformed overrides rather than silently
//! defaulting — a silently defaulted policy could violate the global-budget
//! priority cascade.

use serde::Deserialize;

use dolt_core::RecordTier;

use crate::errors::{EngineError, Result};

/// Token ceilings for one lane tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LanePolicy {
    /// Hydration budget for the tier.
    pub target: i64,
    /// Lane size above which compaction selects sources.
    pub soft: i64,
    /// Maximum tokens folded per compaction pass.
    pub delta: i64,
    /// Additional cap on newly admitted summary tokens (Leaf/Bindle).
    pub summary_cap: Option<i64>,
}

/// Resolved policies for all three tiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LanePolicies {
    /// Turn lane policy.
    pub turn: LanePolicy,
    /// Leaf lane policy.
    pub leaf: LanePolicy,
    /// Bindle lane policy.
    pub bindle: LanePolicy,
}

impl LanePolicies {
    /// Policy for one tier.
    #[must_use]
    pub fn tier(&self, tier: RecordTier) -> LanePolicy {
        match tier {
            RecordTier::Turn => self.turn,
            RecordTier::Leaf => self.leaf,
            RecordTier::Bindle => self.bindle,
        }
    }
}

impl Default for LanePolicies {
    fn default() -> Self {
        Self {
            turn: LanePolicy {
                target: 48_000,
                soft: 60_000,
                delta: 16_000,
                summary_cap: None,
            },
            leaf: LanePolicy {
                target: 24_000,
                soft: 30_000,
                delta: 6_000,
                summary_cap: Some(12_000),
            },
            bindle: LanePolicy {
                target: 12_000,
                soft: 16_000,
                delta: 4_000,
                summary_cap: Some(8_000),
            },
        }
    }
}

/// Partial override for one tier's policy.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LanePolicyOverride {
    /// Override for [`LanePolicy::target`].
    pub target: Option<i64>,
    /// Override for [`LanePolicy::soft`].
    pub soft: Option<i64>,
    /// Override for [`LanePolicy::delta`].
    pub delta: Option<i64>,
    /// Override for [`LanePolicy::summary_cap`].
    pub summary_cap: Option<i64>,
}

/// Partial per-tier policy overrides, deserializable from configuration.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LanePolicyOverrides {
    /// Turn lane overrides.
    pub turn: Option<LanePolicyOverride>,
    /// Leaf lane overrides.
    pub leaf: Option<LanePolicyOverride>,
    /// Bindle lane overrides.
    pub bindle: Option<LanePolicyOverride>,
}

/// Resolve per-tier policies from defaults plus optional overrides.
///
/// # Errors
///
/// Returns [`EngineError::Policy`] when an override produces a non-positive
/// `target` or `delta`, a `soft` below `target`, or a non-positive
/// `summary_cap`.
pub fn resolve_lane_policies(overrides: Option<&LanePolicyOverrides>) -> Result<LanePolicies> {
    let defaults = LanePolicies::default();
    let Some(overrides) = overrides else {
        return Ok(defaults);
    };

    Ok(LanePolicies {
        turn: apply_override("turn", defaults.turn, overrides.turn.as_ref())?,
        leaf: apply_override("leaf", defaults.leaf, overrides.leaf.as_ref())?,
        bindle: apply_override("bindle", defaults.bindle, overrides.bindle.as_ref())?,
    })
}

fn apply_override(
    lane: &str,
    base: LanePolicy,
    patch: Option<&LanePolicyOverride>,
) -> Result<LanePolicy> {
    let Some(patch) = patch else {
        return Ok(base);
    };
    let policy = LanePolicy {
        target: patch.target.unwrap_or(base.target),
        soft: patch.soft.unwrap_or(base.soft),
        delta: patch.delta.unwrap_or(base.delta),
        summary_cap: patch.summary_cap.or(base.summary_cap),
    };

    if policy.target <= 0 {
        return Err(EngineError::Policy(format!(
            "{lane}.target must be positive, got {}",
            policy.target
        )));
    }
    if policy.soft < policy.target {
        return Err(EngineError::Policy(format!(
            "{lane}.soft ({}) must be at least {lane}.target ({})",
            policy.soft, policy.target
        )));
    }
    if policy.delta <= 0 {
        return Err(EngineError::Policy(format!(
            "{lane}.delta must be positive, got {}",
            policy.delta
        )));
    }
    if let Some(cap) = policy.summary_cap {
        if cap <= 0 {
            return Err(EngineError::Policy(format!(
                "{lane}.summaryCap must be positive, got {cap}"
            )));
        }
    }
    Ok(policy)
}

// ─────────────────────────────────────────────────────────────────────────────
// Turn chunk selection
// ─────────────────────────────────────────────────────────────────────────────

/// One turn considered for compaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnChunkCandidate {
    /// Record pointer.
    pub pointer: String,
    /// Token footprint.
    pub token_count: i64,
}

/// Outcome of one chunk-selection pass.
#[derive(Clone, Debug, Default)]
pub struct TurnChunkSelection {
    /// Oldest-first turns to fold this pass; empty when the lane is within
    /// its soft ceiling or the floor cannot be met.
    pub selected: Vec<TurnChunkCandidate>,
    /// Token total of the selection.
    pub selected_tokens: i64,
    /// Token total of the retained (newest) turns.
    pub retained_tokens: i64,
}

/// Choose the oldest turns to fold into a leaf for one compaction pass.
///
/// `turns` must be chronological (oldest first). No selection happens while
/// the lane total is at or under the soft ceiling. Otherwise the newest turns
/// that fit `target` are retained and the older remainder is selected, capped
/// per pass by `delta` once the minimum chunk size is met. A remainder
/// smaller than `min_chunk_turns` selects nothing — the residue is left for
/// forced finalization.
#[must_use]
pub fn select_turn_chunk_for_compaction(
    turns: &[TurnChunkCandidate],
    lane_token_count: i64,
    policy: &LanePolicy,
    min_chunk_turns: usize,
) -> TurnChunkSelection {
    if lane_token_count <= policy.soft || turns.is_empty() {
        return TurnChunkSelection::default();
    }

    // Retain the newest suffix that fits target.
    let mut retained_tokens = 0i64;
    let mut split = turns.len();
    for (idx, turn) in turns.iter().enumerate().rev() {
        let cost = turn.token_count.max(0);
        if retained_tokens + cost > policy.target {
            break;
        }
        retained_tokens += cost;
        split = idx;
    }

    let remainder = &turns[..split];
    if remainder.len() < min_chunk_turns {
        return TurnChunkSelection::default();
    }

    // Fold oldest-first, honoring the floor before the delta cap so repeated
    // passes always make progress.
    let mut selected = Vec::new();
    let mut selected_tokens = 0i64;
    for turn in remainder {
        let cost = turn.token_count.max(0);
        if selected.len() >= min_chunk_turns && selected_tokens + cost > policy.delta {
            break;
        }
        selected_tokens += cost;
        selected.push(turn.clone());
    }

    TurnChunkSelection {
        selected,
        selected_tokens,
        retained_tokens,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn candidates(counts: &[i64]) -> Vec<TurnChunkCandidate> {
        counts
            .iter()
            .enumerate()
            .map(|(idx, count)| TurnChunkCandidate {
                pointer: format!("turn:{idx}"),
                token_count: *count,
            })
            .collect()
    }

    #[test]
    fn no_overrides_yields_defaults() {
        let policies = resolve_lane_policies(None).unwrap();
        assert_eq!(policies, LanePolicies::default());
        assert_eq!(policies.tier(RecordTier::Bindle).target, 12_000);
    }

    #[test]
    fn overrides_apply_per_field() {
        let overrides = LanePolicyOverrides {
            bindle: Some(LanePolicyOverride {
                target: Some(5_000),
                soft: Some(6_000),
                ..Default::default()
            }),
            ..Default::default()
        };
        let policies = resolve_lane_policies(Some(&overrides)).unwrap();
        assert_eq!(policies.bindle.target, 5_000);
        assert_eq!(policies.bindle.soft, 6_000);
        // Untouched fields keep their defaults.
        assert_eq!(policies.bindle.delta, 4_000);
        assert_eq!(policies.turn, LanePolicies::default().turn);
    }

    #[test]
    fn zero_target_fails_fast() {
        let overrides = LanePolicyOverrides {
            turn: Some(LanePolicyOverride {
                target: Some(0),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_matches!(
            resolve_lane_policies(Some(&overrides)),
            Err(EngineError::Policy(msg)) if msg.contains("turn.target")
        );
    }

    #[test]
    fn soft_below_target_fails_fast() {
        let overrides = LanePolicyOverrides {
            leaf: Some(LanePolicyOverride {
                target: Some(10_000),
                soft: Some(9_000),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_matches!(
            resolve_lane_policies(Some(&overrides)),
            Err(EngineError::Policy(msg)) if msg.contains("leaf.soft")
        );
    }

    #[test]
    fn negative_summary_cap_fails_fast() {
        let overrides = LanePolicyOverrides {
            bindle: Some(LanePolicyOverride {
                summary_cap: Some(-1),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_matches!(
            resolve_lane_policies(Some(&overrides)),
            Err(EngineError::Policy(msg)) if msg.contains("summaryCap")
        );
    }

    // -- chunk selection --

    fn tight_policy() -> LanePolicy {
        LanePolicy {
            target: 100,
            soft: 150,
            delta: 60,
            summary_cap: None,
        }
    }

    #[test]
    fn lane_within_soft_ceiling_selects_nothing() {
        let turns = candidates(&[50, 50, 50]);
        let selection = select_turn_chunk_for_compaction(&turns, 150, &tight_policy(), 2);
        assert!(selection.selected.is_empty());
    }

    #[test]
    fn selects_oldest_remainder_beyond_target() {
        // Lane total 240 > soft 150. Newest suffix fitting target=100 is the
        // last two turns (40+50=90); remainder is the three oldest.
        let turns = candidates(&[50, 50, 50, 40, 50]);
        let selection = select_turn_chunk_for_compaction(&turns, 240, &tight_policy(), 2);
        let pointers: Vec<_> = selection.selected.iter().map(|t| t.pointer.as_str()).collect();
        assert_eq!(pointers, ["turn:0", "turn:1"], "delta caps at 60 after floor is met");
        assert_eq!(selection.selected_tokens, 100);
        assert_eq!(selection.retained_tokens, 90);
    }

    #[test]
    fn floor_overrides_delta_cap() {
        let policy = LanePolicy {
            target: 10,
            soft: 20,
            delta: 1,
            summary_cap: None,
        };
        let turns = candidates(&[30, 30, 10]);
        let selection = select_turn_chunk_for_compaction(&turns, 70, &policy, 2);
        assert_eq!(selection.selected.len(), 2, "floor is met even past delta");
    }

    #[test]
    fn remainder_below_floor_selects_nothing() {
        // Only one turn older than the retained suffix.
        let turns = candidates(&[80, 50, 40]);
        let selection = select_turn_chunk_for_compaction(&turns, 170, &tight_policy(), 2);
        assert!(selection.selected.is_empty());
    }

    #[test]
    fn empty_lane_selects_nothing() {
        let selection = select_turn_chunk_for_compaction(&[], 999, &tight_policy(), 2);
        assert!(selection.selected.is_empty());
    }
}
