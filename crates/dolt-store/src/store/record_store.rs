//! High-level transactional [`RecordStore`] API.
//!
//! Composes the record, lineage, and lane repositories into atomic,
//! session-scoped operations. Every write method that touches multiple rows
//! runs inside a single `SQLite` transaction — callers never observe partial
//! state. All access is scoped by `session_id`; different sessions may use
//! the shared pool concurrently, while mutating calls for one session are
//! expected to be serialized by the caller.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::Connection;
use tracing::debug;

use dolt_core::{ActiveLaneEntry, Record, RecordPayload, RecordTier, TurnRole};

use crate::errors::{Result, StoreError};
use crate::sqlite::connection::{self, ConnectionConfig, ConnectionPool, PooledConnection};
use crate::sqlite::migrations::run_migrations;
use crate::sqlite::repositories::lane::LaneRepo;
use crate::sqlite::repositories::lineage::LineageRepo;
use crate::sqlite::repositories::record::{ListRecordRows, RecordRepo};
use crate::sqlite::row_types::{LaneRow, LineageRow, RecordRow};
use crate::types::{
    ActiveLaneUpsert, BootstrapImport, BootstrapOutcome, BootstrapSkipReason, ChildRef,
    LaneSelection, LaneSnapshot, LineageEdge, ListActiveLane, ListRecords, RecordUpsert,
    RollupCommit, TierSnapshot,
};

/// Epoch milliseconds from the system clock.
fn system_now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Durable store for Dolt records, lineage, and active-lane membership.
pub struct RecordStore {
    pool: ConnectionPool,
    now: fn() -> i64,
}

impl RecordStore {
    /// Open an in-memory store (for testing) and run migrations.
    pub fn open_in_memory() -> Result<Self> {
        let pool = connection::new_in_memory(&ConnectionConfig::default())?;
        Self::from_pool(pool)
    }

    /// Open a file-backed store, creating parent directories, and run
    /// migrations.
    pub fn open_file(path: &Path) -> Result<Self> {
        let pool = connection::new_file(path, &ConnectionConfig::default())?;
        Self::from_pool(pool)
    }

    /// Wrap an existing pool, running migrations first.
    pub fn from_pool(pool: ConnectionPool) -> Result<Self> {
        {
            let conn = pool.get()?;
            let _ = run_migrations(&conn)?;
        }
        Ok(Self {
            pool,
            now: system_now_ms,
        })
    }

    /// Replace the clock (for deterministic tests).
    #[must_use]
    pub fn with_clock(mut self, now: fn() -> i64) -> Self {
        self.now = now;
        self
    }

    fn conn(&self) -> Result<PooledConnection> {
        Ok(self.pool.get()?)
    }

    /// Release the underlying pool.
    pub fn close(self) {
        drop(self.pool);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Records
    // ─────────────────────────────────────────────────────────────────────

    /// Create or update one record row, idempotent by pointer.
    pub fn upsert_record(&self, upsert: &RecordUpsert) -> Result<Record> {
        validate_pointer(&upsert.pointer)?;
        validate_session(&upsert.session_id)?;
        let conn = self.conn()?;
        self.upsert_record_on(&conn, upsert)?;
        self.get_record_on(&conn, &upsert.pointer)?
            .ok_or_else(|| StoreError::RecordNotFound(upsert.pointer.clone()))
    }

    /// Read one record by pointer.
    pub fn get_record(&self, pointer: &str) -> Result<Option<Record>> {
        validate_pointer(pointer)?;
        let conn = self.conn()?;
        self.get_record_on(&conn, pointer)
    }

    /// List a session's records ordered by event timestamp (pointer tiebreak).
    pub fn list_records_by_session(&self, opts: &ListRecords<'_>) -> Result<Vec<Record>> {
        validate_session(opts.session_id)?;
        let conn = self.conn()?;
        let rows = RecordRepo::list_by_session(
            &conn,
            &ListRecordRows {
                session_id: opts.session_id,
                tier: opts.tier.map(RecordTier::as_str),
                limit: opts.limit,
                newest_first: opts.newest_first,
            },
        )?;
        rows.into_iter().map(decode_record).collect()
    }

    /// Number of records stored for one session.
    pub fn count_session_records(&self, session_id: &str) -> Result<i64> {
        validate_session(session_id)?;
        let conn = self.conn()?;
        RecordRepo::count_by_session(&conn, session_id)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Lineage
    // ─────────────────────────────────────────────────────────────────────

    /// Replace all direct children of one parent in a single transaction.
    pub fn replace_direct_children(&self, parent: &str, children: &[ChildRef]) -> Result<()> {
        validate_pointer(parent)?;
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        self.replace_children_on(&tx, parent, children)?;
        tx.commit()?;
        Ok(())
    }

    /// List direct child edges of one parent in child-index order.
    pub fn list_direct_children(&self, parent: &str) -> Result<Vec<LineageEdge>> {
        validate_pointer(parent)?;
        let conn = self.conn()?;
        let rows = LineageRepo::list_children(&conn, parent)?;
        rows.into_iter()
            .map(|row| {
                Ok(LineageEdge {
                    parent_pointer: row.parent_pointer,
                    child_pointer: row.child_pointer,
                    child_index: row.child_index,
                    child_tier: row.child_tier.parse().map_err(StoreError::CorruptRow)?,
                    created_at_ms: row.created_at_ms,
                })
            })
            .collect()
    }

    /// Read direct child records of one parent in child-index order.
    pub fn list_direct_child_records(&self, parent: &str) -> Result<Vec<Record>> {
        validate_pointer(parent)?;
        let conn = self.conn()?;
        let rows = LineageRepo::list_child_records(&conn, parent)?;
        rows.into_iter().map(decode_record).collect()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Active lane
    // ─────────────────────────────────────────────────────────────────────

    /// Set or clear one lane membership row.
    pub fn upsert_active_lane(&self, upsert: &ActiveLaneUpsert) -> Result<()> {
        validate_pointer(&upsert.pointer)?;
        validate_session(&upsert.session_id)?;
        let conn = self.conn()?;
        self.upsert_lane_on(&conn, upsert)
    }

    /// List lane rows for one `(session, tier)` in recency order.
    pub fn list_active_lane(&self, opts: &ListActiveLane<'_>) -> Result<Vec<ActiveLaneEntry>> {
        validate_session(opts.session_id)?;
        let conn = self.conn()?;
        let rows = LaneRepo::list(&conn, opts.session_id, opts.tier.as_str(), opts.active_only)?;
        rows.into_iter()
            .map(|row| {
                Ok(ActiveLaneEntry {
                    session_id: row.session_id,
                    session_key: row.session_key,
                    tier: row.tier.parse().map_err(StoreError::CorruptRow)?,
                    pointer: row.pointer,
                    is_active: row.is_active == 1,
                    last_event_ts_ms: row.last_event_ts_ms,
                    updated_at_ms: row.updated_at_ms,
                })
            })
            .collect()
    }

    /// Deactivate every lane pointer for one `(session, tier)`, optionally
    /// sparing one.
    pub fn deactivate_tier_pointers(
        &self,
        session_id: &str,
        tier: RecordTier,
        except_pointer: Option<&str>,
    ) -> Result<()> {
        validate_session(session_id)?;
        let conn = self.conn()?;
        LaneRepo::deactivate_tier(&conn, session_id, tier.as_str(), except_pointer, (self.now)())
    }

    /// Atomically reselect one `(session, tier)` lane: activate the selected
    /// pointers in order, deactivate everything else currently active.
    pub fn apply_lane_selection(&self, selection: &LaneSelection<'_>) -> Result<()> {
        validate_session(selection.session_id)?;
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        let now_ms = (self.now)();

        let selected: HashSet<&str> = selection
            .selected
            .iter()
            .map(|(pointer, _)| pointer.as_str())
            .collect();
        let existing = LaneRepo::list(&tx, selection.session_id, selection.tier.as_str(), true)?;
        for row in &existing {
            if !selected.contains(row.pointer.as_str()) {
                LaneRepo::upsert(
                    &tx,
                    &LaneRow {
                        session_id: row.session_id.clone(),
                        session_key: row.session_key.clone(),
                        tier: row.tier.clone(),
                        pointer: row.pointer.clone(),
                        is_active: 0,
                        last_event_ts_ms: now_ms,
                        updated_at_ms: now_ms,
                    },
                )?;
            }
        }
        for (pointer, last_event_ts_ms) in &selection.selected {
            LaneRepo::upsert(
                &tx,
                &LaneRow {
                    session_id: selection.session_id.to_string(),
                    session_key: selection.session_key.map(ToString::to_string),
                    tier: selection.tier.as_str().to_string(),
                    pointer: pointer.clone(),
                    is_active: 1,
                    last_event_ts_ms: *last_event_ts_ms,
                    updated_at_ms: now_ms,
                },
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Per-tier active record counts and token totals for one session.
    pub fn lane_snapshot(&self, session_id: &str) -> Result<LaneSnapshot> {
        validate_session(session_id)?;
        let conn = self.conn()?;
        let aggregates = LaneRepo::active_aggregates(&conn, session_id)?;
        let mut snapshot = LaneSnapshot::default();
        for row in aggregates {
            let tier: RecordTier = row.tier.parse().map_err(StoreError::CorruptRow)?;
            let slot = match tier {
                RecordTier::Turn => &mut snapshot.turn,
                RecordTier::Leaf => &mut snapshot.leaf,
                RecordTier::Bindle => &mut snapshot.bindle,
            };
            *slot = TierSnapshot {
                active_records: row.active_records,
                active_tokens: row.active_tokens,
            };
        }
        Ok(snapshot)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Composite writes
    // ─────────────────────────────────────────────────────────────────────

    /// Commit one rollup atomically: upsert the parent summary record,
    /// replace its direct children, activate the parent's lane row, and
    /// deactivate every source lane row with the parent's event timestamp.
    ///
    /// A failure at any step commits nothing.
    pub fn commit_rollup(&self, commit: &RollupCommit) -> Result<Record> {
        validate_pointer(&commit.record.pointer)?;
        validate_session(&commit.record.session_id)?;
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;

        self.upsert_record_on(&tx, &commit.record)?;
        self.replace_children_on(&tx, &commit.record.pointer, &commit.children)?;
        self.upsert_lane_on(
            &tx,
            &ActiveLaneUpsert {
                session_id: commit.record.session_id.clone(),
                session_key: commit.record.session_key.clone(),
                tier: commit.record.tier,
                pointer: commit.record.pointer.clone(),
                is_active: true,
                last_event_ts_ms: commit.record.event_ts_ms,
            },
        )?;
        for source in &commit.source_lanes {
            self.upsert_lane_on(
                &tx,
                &ActiveLaneUpsert {
                    session_id: commit.record.session_id.clone(),
                    session_key: source.session_key.clone(),
                    tier: source.tier,
                    pointer: source.pointer.clone(),
                    is_active: false,
                    last_event_ts_ms: commit.record.event_ts_ms,
                },
            )?;
        }

        let record = self
            .get_record_on(&tx, &commit.record.pointer)?
            .ok_or_else(|| StoreError::RecordNotFound(commit.record.pointer.clone()))?;
        tx.commit()?;

        debug!(
            pointer = %record.pointer,
            tier = %record.tier,
            sources = commit.source_lanes.len(),
            "rollup committed"
        );
        Ok(record)
    }

    /// Seed an empty session with turn records and active lane rows in one
    /// transaction.
    ///
    /// Skipped (with a reason) when the session already has records or no
    /// turns are supplied. Duplicate pointers within the import are
    /// disambiguated positionally.
    pub fn bootstrap_turns_if_empty(&self, import: &BootstrapImport<'_>) -> Result<BootstrapOutcome> {
        validate_session(import.session_id)?;
        let conn = self.conn()?;

        if RecordRepo::count_by_session(&conn, import.session_id)? > 0 {
            return Ok(BootstrapOutcome {
                bootstrapped: false,
                imported_records: 0,
                skipped_reason: Some(BootstrapSkipReason::SessionNotEmpty),
            });
        }
        if import.turns.is_empty() {
            return Ok(BootstrapOutcome {
                bootstrapped: false,
                imported_records: 0,
                skipped_reason: Some(BootstrapSkipReason::NoTurnsFound),
            });
        }

        let tx = conn.unchecked_transaction()?;
        let mut seen: HashMap<String, u32> = HashMap::new();
        for (idx, turn) in import.turns.iter().enumerate() {
            let position = i64::try_from(idx).unwrap_or(i64::MAX) + 1;
            let base = turn
                .pointer
                .clone()
                .unwrap_or_else(|| format!("turn:{}:bootstrap:{position}", import.session_id));
            let pointer = dedupe_pointer(base, &mut seen);
            let event_ts_ms = turn.event_ts_ms.unwrap_or(position);

            self.upsert_record_on(
                &tx,
                &RecordUpsert {
                    pointer: pointer.clone(),
                    session_id: import.session_id.to_string(),
                    session_key: import.session_key.map(ToString::to_string),
                    tier: RecordTier::Turn,
                    event_ts_ms,
                    token_count: turn.token_count,
                    payload: RecordPayload::RawTurn {
                        role: turn.role,
                        content: turn.content.clone(),
                    },
                    finalized_at_reset: false,
                },
            )?;
            self.upsert_lane_on(
                &tx,
                &ActiveLaneUpsert {
                    session_id: import.session_id.to_string(),
                    session_key: import.session_key.map(ToString::to_string),
                    tier: RecordTier::Turn,
                    pointer,
                    is_active: true,
                    last_event_ts_ms: event_ts_ms,
                },
            )?;
        }
        tx.commit()?;

        Ok(BootstrapOutcome {
            bootstrapped: true,
            imported_records: import.turns.len() as u64,
            skipped_reason: None,
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Internal — shared row-level helpers over an arbitrary connection
    // ─────────────────────────────────────────────────────────────────────

    fn upsert_record_on(&self, conn: &Connection, upsert: &RecordUpsert) -> Result<()> {
        let now_ms = (self.now)();
        RecordRepo::upsert(
            conn,
            &RecordRow {
                pointer: upsert.pointer.clone(),
                session_id: upsert.session_id.clone(),
                session_key: upsert.session_key.clone(),
                tier: upsert.tier.as_str().to_string(),
                event_ts_ms: upsert.event_ts_ms,
                token_count: upsert.token_count.max(0),
                payload_json: serde_json::to_string(&upsert.payload)?,
                finalized_at_reset: i64::from(upsert.finalized_at_reset),
                created_at_ms: now_ms,
                updated_at_ms: now_ms,
            },
        )
    }

    fn get_record_on(&self, conn: &Connection, pointer: &str) -> Result<Option<Record>> {
        RecordRepo::get_by_pointer(conn, pointer)?
            .map(decode_record)
            .transpose()
    }

    fn replace_children_on(
        &self,
        conn: &Connection,
        parent: &str,
        children: &[ChildRef],
    ) -> Result<()> {
        let now_ms = (self.now)();
        LineageRepo::delete_children(conn, parent)?;
        for (idx, child) in children.iter().enumerate() {
            LineageRepo::upsert_edge(
                conn,
                &LineageRow {
                    parent_pointer: parent.to_string(),
                    child_pointer: child.pointer.clone(),
                    child_index: i64::try_from(idx).unwrap_or(i64::MAX),
                    child_tier: child.tier.as_str().to_string(),
                    created_at_ms: now_ms,
                },
            )?;
        }
        Ok(())
    }

    fn upsert_lane_on(&self, conn: &Connection, upsert: &ActiveLaneUpsert) -> Result<()> {
        LaneRepo::upsert(
            conn,
            &LaneRow {
                session_id: upsert.session_id.clone(),
                session_key: upsert.session_key.clone(),
                tier: upsert.tier.as_str().to_string(),
                pointer: upsert.pointer.clone(),
                is_active: i64::from(upsert.is_active),
                last_event_ts_ms: upsert.last_event_ts_ms,
                updated_at_ms: (self.now)(),
            },
        )
    }
}

/// Decode a raw row into the public record type.
fn decode_record(row: RecordRow) -> Result<Record> {
    let tier: RecordTier = row.tier.parse().map_err(StoreError::CorruptRow)?;
    let payload: RecordPayload = serde_json::from_str(&row.payload_json)?;
    Ok(Record {
        pointer: row.pointer,
        session_id: row.session_id,
        session_key: row.session_key,
        tier,
        event_ts_ms: row.event_ts_ms,
        token_count: row.token_count,
        payload,
        finalized_at_reset: row.finalized_at_reset == 1,
        created_at_ms: row.created_at_ms,
        updated_at_ms: row.updated_at_ms,
    })
}

fn dedupe_pointer(pointer: String, seen: &mut HashMap<String, u32>) -> String {
    let count = seen.entry(pointer.clone()).or_insert(0);
    *count += 1;
    if *count == 1 {
        pointer
    } else {
        format!("{pointer}:dup:{}", *count - 1)
    }
}

fn validate_pointer(pointer: &str) -> Result<()> {
    if pointer.trim().is_empty() {
        return Err(StoreError::InvalidInput("pointer must be non-empty".into()));
    }
    Ok(())
}

fn validate_session(session_id: &str) -> Result<()> {
    if session_id.trim().is_empty() {
        return Err(StoreError::InvalidInput(
            "session_id must be non-empty".into(),
        ));
    }
    Ok(())
}

/// Convenience constructor for raw-turn upserts; shared by tests and the
/// bootstrap path.
#[must_use]
pub fn raw_turn_upsert(
    pointer: &str,
    session_id: &str,
    role: TurnRole,
    content: &str,
    event_ts_ms: i64,
    token_count: i64,
) -> RecordUpsert {
    RecordUpsert {
        pointer: pointer.to_string(),
        session_id: session_id.to_string(),
        session_key: None,
        tier: RecordTier::Turn,
        event_ts_ms,
        token_count,
        payload: RecordPayload::RawTurn {
            role,
            content: content.to_string(),
        },
        finalized_at_reset: false,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
