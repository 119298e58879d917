//! Database row types for mapping between `SQLite` rows and Rust structs.
//!
//! These represent the raw database row shape — not the public API types.
//! Conversion to public types ([`dolt_core::Record`] and friends) happens in
//! the [`crate::store::record_store`] layer, where tier strings and payload
//! JSON are decoded.

/// Raw record row from the `dolt_records` table.
#[derive(Clone, Debug)]
pub struct RecordRow {
    /// Record pointer.
    pub pointer: String,
    /// Owning session.
    pub session_id: String,
    /// Optional session key.
    pub session_key: Option<String>,
    /// Tier string (`turn` / `leaf` / `bindle`).
    pub tier: String,
    /// Logical event timestamp.
    pub event_ts_ms: i64,
    /// Token count.
    pub token_count: i64,
    /// Payload as JSON text.
    pub payload_json: String,
    /// Forced-finalization flag (0/1).
    pub finalized_at_reset: i64,
    /// Row creation time.
    pub created_at_ms: i64,
    /// Last row update time.
    pub updated_at_ms: i64,
}

/// Raw lineage row from the `dolt_lineage` table.
#[derive(Clone, Debug)]
pub struct LineageRow {
    /// Parent summary pointer.
    pub parent_pointer: String,
    /// Child record pointer.
    pub child_pointer: String,
    /// Position within the parent's child list.
    pub child_index: i64,
    /// Child tier string.
    pub child_tier: String,
    /// Edge creation time.
    pub created_at_ms: i64,
}

/// Raw lane row from the `dolt_active_lane` table.
#[derive(Clone, Debug)]
pub struct LaneRow {
    /// Owning session.
    pub session_id: String,
    /// Optional session key.
    pub session_key: Option<String>,
    /// Tier string.
    pub tier: String,
    /// Member pointer.
    pub pointer: String,
    /// Membership flag (0/1).
    pub is_active: i64,
    /// Activation/deactivation timestamp.
    pub last_event_ts_ms: i64,
    /// Last row update time.
    pub updated_at_ms: i64,
}
