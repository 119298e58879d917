//! Parameter and result types for the public store API.
//!
//! These are the shapes callers hand to [`crate::RecordStore`] — distinct
//! from the raw database row types in [`crate::sqlite::row_types`].

use dolt_core::{RecordPayload, RecordTier};

/// Parameters for creating or updating one record row.
///
/// Idempotent by pointer: re-upserting the same pointer updates payload and
/// timestamps in place.
#[derive(Clone, Debug)]
pub struct RecordUpsert {
    /// Globally unique record pointer.
    pub pointer: String,
    /// Owning session.
    pub session_id: String,
    /// Optional channel-scoped session key.
    pub session_key: Option<String>,
    /// Rollup tier.
    pub tier: RecordTier,
    /// Logical event timestamp.
    pub event_ts_ms: i64,
    /// Derived token size.
    pub token_count: i64,
    /// Tier-tagged payload.
    pub payload: RecordPayload,
    /// Forced-finalization marker (bindles only).
    pub finalized_at_reset: bool,
}

/// Query options for listing a session's records.
#[derive(Clone, Debug)]
pub struct ListRecords<'a> {
    /// Session to query.
    pub session_id: &'a str,
    /// Optional tier filter.
    pub tier: Option<RecordTier>,
    /// Optional row cap.
    pub limit: Option<i64>,
    /// Newest-first when true; chronological otherwise.
    pub newest_first: bool,
}

/// Parameters for setting or clearing one lane membership row.
#[derive(Clone, Debug)]
pub struct ActiveLaneUpsert {
    /// Owning session.
    pub session_id: String,
    /// Optional channel-scoped session key.
    pub session_key: Option<String>,
    /// Lane tier.
    pub tier: RecordTier,
    /// Member pointer.
    pub pointer: String,
    /// New membership state.
    pub is_active: bool,
    /// Activation/deactivation timestamp.
    pub last_event_ts_ms: i64,
}

/// Query options for listing lane rows.
#[derive(Clone, Copy, Debug)]
pub struct ListActiveLane<'a> {
    /// Session to query.
    pub session_id: &'a str,
    /// Lane tier.
    pub tier: RecordTier,
    /// Restrict to currently-active rows.
    pub active_only: bool,
}

/// One child reference when replacing a summary's direct children.
#[derive(Clone, Debug)]
pub struct ChildRef {
    /// Child record pointer.
    pub pointer: String,
    /// Child record tier.
    pub tier: RecordTier,
}

/// A structural parent→child adjacency edge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LineageEdge {
    /// Parent summary pointer.
    pub parent_pointer: String,
    /// Child record pointer.
    pub child_pointer: String,
    /// Position within the parent's child list.
    pub child_index: i64,
    /// Child record tier.
    pub child_tier: RecordTier,
    /// Edge creation time.
    pub created_at_ms: i64,
}

/// One source lane row deactivated by a rollup commit.
#[derive(Clone, Debug)]
pub struct SourceLane {
    /// Source record tier.
    pub tier: RecordTier,
    /// Source record pointer.
    pub pointer: String,
    /// Session key carried on the source's lane row.
    pub session_key: Option<String>,
}

/// Atomic rollup commit: parent summary creation, lineage replacement, parent
/// activation, and source deactivation in one transaction.
#[derive(Clone, Debug)]
pub struct RollupCommit {
    /// The new parent summary record.
    pub record: RecordUpsert,
    /// Structural direct children (tier-adjacent only).
    pub children: Vec<ChildRef>,
    /// Lane rows to deactivate, stamped with the parent's event timestamp.
    pub source_lanes: Vec<SourceLane>,
}

/// Atomic lane reselection for one `(session, tier)`: activate the selected
/// pointers in order and deactivate every other currently-active row.
#[derive(Clone, Debug)]
pub struct LaneSelection<'a> {
    /// Owning session.
    pub session_id: &'a str,
    /// Optional channel-scoped session key.
    pub session_key: Option<&'a str>,
    /// Lane tier.
    pub tier: RecordTier,
    /// Selected `(pointer, last_event_ts_ms)` pairs in activation order.
    pub selected: Vec<(String, i64)>,
}

/// Per-tier active lane aggregate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TierSnapshot {
    /// Number of active records in the lane.
    pub active_records: i64,
    /// Token total of active records in the lane.
    pub active_tokens: i64,
}

/// Active lane aggregates across all tiers, used for structured logging.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LaneSnapshot {
    /// Turn lane aggregate.
    pub turn: TierSnapshot,
    /// Leaf lane aggregate.
    pub leaf: TierSnapshot,
    /// Bindle lane aggregate.
    pub bindle: TierSnapshot,
}

impl LaneSnapshot {
    /// Aggregate for one tier.
    #[must_use]
    pub fn tier(&self, tier: RecordTier) -> TierSnapshot {
        match tier {
            RecordTier::Turn => self.turn,
            RecordTier::Leaf => self.leaf,
            RecordTier::Bindle => self.bindle,
        }
    }
}

/// One turn supplied to (or parsed for) bootstrap import.
#[derive(Clone, Debug)]
pub struct BootstrapTurn {
    /// Explicit pointer, or `None` to derive one positionally.
    pub pointer: Option<String>,
    /// Event timestamp, or `None` to fall back to line position.
    pub event_ts_ms: Option<i64>,
    /// Token count derived from usage data.
    pub token_count: i64,
    /// Speaker role.
    pub role: dolt_core::TurnRole,
    /// Flattened message text.
    pub content: String,
}

/// Parameters for seeding an empty session with turn history.
#[derive(Clone, Debug)]
pub struct BootstrapImport<'a> {
    /// Session to seed.
    pub session_id: &'a str,
    /// Optional channel-scoped session key.
    pub session_key: Option<&'a str>,
    /// Turns to import, chronological.
    pub turns: Vec<BootstrapTurn>,
}

/// Outcome of a bootstrap import attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BootstrapOutcome {
    /// Whether any rows were written.
    pub bootstrapped: bool,
    /// Number of turn records imported.
    pub imported_records: u64,
    /// Skip reason when nothing was written.
    pub skipped_reason: Option<BootstrapSkipReason>,
}

/// Why a bootstrap import wrote nothing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BootstrapSkipReason {
    /// The session already has records; import would duplicate history.
    SessionNotEmpty,
    /// No importable turns were supplied or parsed.
    NoTurnsFound,
}
