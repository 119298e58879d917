//! Lane repository — visible-context membership rows.
//!
//! One row per `(session_id, tier, pointer)`; `is_active` is a flag on that
//! row. Listing returns recency order (`last_event_ts_ms DESC, pointer DESC`)
//! — the introspection order, distinct from the chronological assembly order
//! the hydrator produces.

use rusqlite::{params, Connection};

use crate::errors::Result;
use crate::sqlite::row_types::LaneRow;

/// Per-tier active aggregate row.
#[derive(Clone, Debug)]
pub struct LaneAggregateRow {
    /// Tier string.
    pub tier: String,
    /// Active row count.
    pub active_records: i64,
    /// Token total over active records.
    pub active_tokens: i64,
}

/// Lane repository — stateless, every method takes `&Connection`.
pub struct LaneRepo;

impl LaneRepo {
    /// Insert or update one membership row.
    pub fn upsert(conn: &Connection, row: &LaneRow) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO dolt_active_lane (session_id, session_key, tier, pointer, is_active,
                                           last_event_ts_ms, updated_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(session_id, tier, pointer) DO UPDATE SET
               session_key = excluded.session_key,
               is_active = excluded.is_active,
               last_event_ts_ms = excluded.last_event_ts_ms,
               updated_at_ms = excluded.updated_at_ms",
            params![
                row.session_id,
                row.session_key,
                row.tier,
                row.pointer,
                row.is_active,
                row.last_event_ts_ms,
                row.updated_at_ms,
            ],
        )?;
        Ok(())
    }

    /// List membership rows for one `(session, tier)` in recency order.
    pub fn list(
        conn: &Connection,
        session_id: &str,
        tier: &str,
        active_only: bool,
    ) -> Result<Vec<LaneRow>> {
        let mut stmt = conn.prepare(
            "SELECT session_id, session_key, tier, pointer, is_active, last_event_ts_ms, updated_at_ms
             FROM dolt_active_lane
             WHERE session_id = ?1 AND tier = ?2 AND (?3 = 0 OR is_active = 1)
             ORDER BY last_event_ts_ms DESC, pointer DESC",
        )?;
        let rows = stmt
            .query_map(
                params![session_id, tier, i64::from(active_only)],
                |row| {
                    Ok(LaneRow {
                        session_id: row.get(0)?,
                        session_key: row.get(1)?,
                        tier: row.get(2)?,
                        pointer: row.get(3)?,
                        is_active: row.get(4)?,
                        last_event_ts_ms: row.get(5)?,
                        updated_at_ms: row.get(6)?,
                    })
                },
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Deactivate all pointers for a `(session, tier)`, optionally sparing one.
    pub fn deactivate_tier(
        conn: &Connection,
        session_id: &str,
        tier: &str,
        except_pointer: Option<&str>,
        now_ms: i64,
    ) -> Result<()> {
        match except_pointer {
            Some(except) => {
                let _ = conn.execute(
                    "UPDATE dolt_active_lane
                     SET is_active = 0, last_event_ts_ms = ?1, updated_at_ms = ?1
                     WHERE session_id = ?2 AND tier = ?3 AND pointer <> ?4",
                    params![now_ms, session_id, tier, except],
                )?;
            }
            None => {
                let _ = conn.execute(
                    "UPDATE dolt_active_lane
                     SET is_active = 0, last_event_ts_ms = ?1, updated_at_ms = ?1
                     WHERE session_id = ?2 AND tier = ?3",
                    params![now_ms, session_id, tier],
                )?;
            }
        }
        Ok(())
    }

    /// Per-tier active record counts and token totals for one session.
    pub fn active_aggregates(conn: &Connection, session_id: &str) -> Result<Vec<LaneAggregateRow>> {
        let mut stmt = conn.prepare(
            "SELECT l.tier, COUNT(*), COALESCE(SUM(r.token_count), 0)
             FROM dolt_active_lane l
             LEFT JOIN dolt_records r ON r.pointer = l.pointer
             WHERE l.session_id = ?1 AND l.is_active = 1
             GROUP BY l.tier",
        )?;
        let rows = stmt
            .query_map(params![session_id], |row| {
                Ok(LaneAggregateRow {
                    tier: row.get(0)?,
                    active_records: row.get(1)?,
                    active_tokens: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sqlite::migrations::run_migrations;

    fn open_memory() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    fn lane(session: &str, tier: &str, pointer: &str, active: bool, ts: i64) -> LaneRow {
        LaneRow {
            session_id: session.into(),
            session_key: None,
            tier: tier.into(),
            pointer: pointer.into(),
            is_active: i64::from(active),
            last_event_ts_ms: ts,
            updated_at_ms: ts,
        }
    }

    #[test]
    fn upsert_flips_flag_in_place() {
        let conn = open_memory();
        LaneRepo::upsert(&conn, &lane("s1", "turn", "p1", true, 10)).unwrap();
        LaneRepo::upsert(&conn, &lane("s1", "turn", "p1", false, 20)).unwrap();

        let rows = LaneRepo::list(&conn, "s1", "turn", false).unwrap();
        assert_eq!(rows.len(), 1, "exactly one row per (session, tier, pointer)");
        assert_eq!(rows[0].is_active, 0);
        assert_eq!(rows[0].last_event_ts_ms, 20);
    }

    #[test]
    fn list_orders_by_recency_then_pointer() {
        let conn = open_memory();
        LaneRepo::upsert(&conn, &lane("s1", "turn", "old", true, 10)).unwrap();
        LaneRepo::upsert(&conn, &lane("s1", "turn", "new", true, 30)).unwrap();
        LaneRepo::upsert(&conn, &lane("s1", "turn", "a-tied", true, 30)).unwrap();

        let rows = LaneRepo::list(&conn, "s1", "turn", true).unwrap();
        let pointers: Vec<_> = rows.iter().map(|r| r.pointer.as_str()).collect();
        assert_eq!(pointers, ["new", "a-tied", "old"]);
    }

    #[test]
    fn active_only_filters_inactive() {
        let conn = open_memory();
        LaneRepo::upsert(&conn, &lane("s1", "turn", "live", true, 10)).unwrap();
        LaneRepo::upsert(&conn, &lane("s1", "turn", "dead", false, 20)).unwrap();

        assert_eq!(LaneRepo::list(&conn, "s1", "turn", true).unwrap().len(), 1);
        assert_eq!(LaneRepo::list(&conn, "s1", "turn", false).unwrap().len(), 2);
    }

    #[test]
    fn deactivate_tier_spares_excepted_pointer() {
        let conn = open_memory();
        LaneRepo::upsert(&conn, &lane("s1", "leaf", "keep", true, 10)).unwrap();
        LaneRepo::upsert(&conn, &lane("s1", "leaf", "drop", true, 10)).unwrap();
        LaneRepo::upsert(&conn, &lane("s1", "turn", "other-tier", true, 10)).unwrap();

        LaneRepo::deactivate_tier(&conn, "s1", "leaf", Some("keep"), 99).unwrap();

        let active: Vec<_> = LaneRepo::list(&conn, "s1", "leaf", true).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].pointer, "keep");
        assert_eq!(LaneRepo::list(&conn, "s1", "turn", true).unwrap().len(), 1);
    }

    #[test]
    fn active_aggregates_join_token_counts() {
        let conn = open_memory();
        let _ = conn
            .execute(
                "INSERT INTO dolt_records (pointer, session_id, tier, event_ts_ms, token_count,
                                           payload_json, created_at_ms, updated_at_ms)
                 VALUES ('p1', 's1', 'turn', 1, 40, '{}', 1, 1)",
                [],
            )
            .unwrap();
        LaneRepo::upsert(&conn, &lane("s1", "turn", "p1", true, 1)).unwrap();
        LaneRepo::upsert(&conn, &lane("s1", "turn", "no-record", true, 2)).unwrap();

        let aggregates = LaneRepo::active_aggregates(&conn, "s1").unwrap();
        assert_eq!(aggregates.len(), 1);
        assert_eq!(aggregates[0].tier, "turn");
        assert_eq!(aggregates[0].active_records, 2);
        assert_eq!(aggregates[0].active_tokens, 40);
    }
}
