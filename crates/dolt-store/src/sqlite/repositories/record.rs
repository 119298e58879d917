//! Record repository — persisted turn/summary rows.
//!
//! Records are idempotent by pointer: re-upserting updates payload and
//! timestamps in place while preserving `created_at_ms`. All listing is
//! session-scoped with `pointer` as the deterministic timestamp tiebreak.

use rusqlite::{params, Connection, OptionalExtension};

use crate::errors::Result;
use crate::sqlite::row_types::RecordRow;

const RECORD_COLUMNS: &str = "pointer, session_id, session_key, tier, event_ts_ms, token_count, \
     payload_json, finalized_at_reset, created_at_ms, updated_at_ms";

/// Options for listing a session's records at the row level.
pub struct ListRecordRows<'a> {
    /// Session to query.
    pub session_id: &'a str,
    /// Optional tier filter (stable string form).
    pub tier: Option<&'a str>,
    /// Optional row cap.
    pub limit: Option<i64>,
    /// Newest-first when true.
    pub newest_first: bool,
}

/// Record repository — stateless, every method takes `&Connection`.
pub struct RecordRepo;

impl RecordRepo {
    /// Insert or update one record row by pointer.
    pub fn upsert(
        conn: &Connection,
        row: &RecordRow,
    ) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO dolt_records (pointer, session_id, session_key, tier, event_ts_ms,
                                       token_count, payload_json, finalized_at_reset,
                                       created_at_ms, updated_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(pointer) DO UPDATE SET
               session_id = excluded.session_id,
               session_key = excluded.session_key,
               tier = excluded.tier,
               event_ts_ms = excluded.event_ts_ms,
               token_count = excluded.token_count,
               payload_json = excluded.payload_json,
               finalized_at_reset = excluded.finalized_at_reset,
               updated_at_ms = excluded.updated_at_ms",
            params![
                row.pointer,
                row.session_id,
                row.session_key,
                row.tier,
                row.event_ts_ms,
                row.token_count,
                row.payload_json,
                row.finalized_at_reset,
                row.created_at_ms,
                row.updated_at_ms,
            ],
        )?;
        Ok(())
    }

    /// Read one record row by pointer.
    pub fn get_by_pointer(conn: &Connection, pointer: &str) -> Result<Option<RecordRow>> {
        let row = conn
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM dolt_records WHERE pointer = ?1"),
                params![pointer],
                Self::map_row,
            )
            .optional()?;
        Ok(row)
    }

    /// List record rows for a session, ordered by event timestamp with
    /// pointer as tiebreak.
    pub fn list_by_session(conn: &Connection, opts: &ListRecordRows<'_>) -> Result<Vec<RecordRow>> {
        let direction = if opts.newest_first { "DESC" } else { "ASC" };
        let mut sql = format!(
            "SELECT {RECORD_COLUMNS} FROM dolt_records WHERE session_id = ?1"
        );
        if opts.tier.is_some() {
            sql.push_str(" AND tier = ?2");
        }
        sql.push_str(&format!(
            " ORDER BY event_ts_ms {direction}, pointer {direction}"
        ));
        if let Some(limit) = opts.limit {
            use std::fmt::Write;
            let _ = write!(sql, " LIMIT {limit}");
        }

        let mut stmt = conn.prepare(&sql)?;
        let rows = match opts.tier {
            Some(tier) => stmt
                .query_map(params![opts.session_id, tier], Self::map_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?,
            None => stmt
                .query_map(params![opts.session_id], Self::map_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?,
        };
        Ok(rows)
    }

    /// Return the number of records for one session.
    pub fn count_by_session(conn: &Connection, session_id: &str) -> Result<i64> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM dolt_records WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn map_row(row: &rusqlite::Row<'_>) -> std::result::Result<RecordRow, rusqlite::Error> {
        Ok(RecordRow {
            pointer: row.get(0)?,
            session_id: row.get(1)?,
            session_key: row.get(2)?,
            tier: row.get(3)?,
            event_ts_ms: row.get(4)?,
            token_count: row.get(5)?,
            payload_json: row.get(6)?,
            finalized_at_reset: row.get(7)?,
            created_at_ms: row.get(8)?,
            updated_at_ms: row.get(9)?,
        })
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

    fn turn_row(pointer: &str, session_id: &str, ts: i64) -> RecordRow {
        RecordRow {
            pointer: pointer.into(),
            session_id: session_id.into(),
            session_key: None,
            tier: "turn".into(),
            event_ts_ms: ts,
            token_count: 10,
            payload_json: r#"{"type":"turn","role":"user","content":"hi"}"#.into(),
            finalized_at_reset: 0,
            created_at_ms: ts,
            updated_at_ms: ts,
        }
    }

    #[test]
    fn upsert_then_get_round_trips() {
        let conn = open_memory();
        RecordRepo::upsert(&conn, &turn_row("p1", "s1", 100)).unwrap();

        let row = RecordRepo::get_by_pointer(&conn, "p1").unwrap().unwrap();
        assert_eq!(row.session_id, "s1");
        assert_eq!(row.tier, "turn");
        assert_eq!(row.event_ts_ms, 100);
    }

    #[test]
    fn get_missing_returns_none() {
        let conn = open_memory();
        assert!(RecordRepo::get_by_pointer(&conn, "nope").unwrap().is_none());
    }

    #[test]
    fn upsert_is_idempotent_by_pointer() {
        let conn = open_memory();
        RecordRepo::upsert(&conn, &turn_row("p1", "s1", 100)).unwrap();

        let mut updated = turn_row("p1", "s1", 250);
        updated.token_count = 99;
        updated.created_at_ms = 999; // ignored on conflict
        RecordRepo::upsert(&conn, &updated).unwrap();

        assert_eq!(RecordRepo::count_by_session(&conn, "s1").unwrap(), 1);
        let row = RecordRepo::get_by_pointer(&conn, "p1").unwrap().unwrap();
        assert_eq!(row.event_ts_ms, 250);
        assert_eq!(row.token_count, 99);
        assert_eq!(row.created_at_ms, 100, "created_at preserved on upsert");
    }

    #[test]
    fn list_by_session_orders_and_filters() {
        let conn = open_memory();
        RecordRepo::upsert(&conn, &turn_row("p1", "s1", 100)).unwrap();
        RecordRepo::upsert(&conn, &turn_row("p2", "s1", 300)).unwrap();
        RecordRepo::upsert(&conn, &turn_row("p3", "s1", 200)).unwrap();
        RecordRepo::upsert(&conn, &turn_row("other", "s2", 50)).unwrap();

        let newest = RecordRepo::list_by_session(
            &conn,
            &ListRecordRows {
                session_id: "s1",
                tier: Some("turn"),
                limit: None,
                newest_first: true,
            },
        )
        .unwrap();
        let pointers: Vec<_> = newest.iter().map(|r| r.pointer.as_str()).collect();
        assert_eq!(pointers, ["p2", "p3", "p1"]);

        let oldest = RecordRepo::list_by_session(
            &conn,
            &ListRecordRows {
                session_id: "s1",
                tier: None,
                limit: Some(2),
                newest_first: false,
            },
        )
        .unwrap();
        let pointers: Vec<_> = oldest.iter().map(|r| r.pointer.as_str()).collect();
        assert_eq!(pointers, ["p1", "p3"]);
    }

    #[test]
    fn timestamp_ties_break_by_pointer() {
        let conn = open_memory();
        RecordRepo::upsert(&conn, &turn_row("a", "s1", 100)).unwrap();
        RecordRepo::upsert(&conn, &turn_row("b", "s1", 100)).unwrap();

        let newest = RecordRepo::list_by_session(
            &conn,
            &ListRecordRows {
                session_id: "s1",
                tier: None,
                limit: None,
                newest_first: true,
            },
        )
        .unwrap();
        let pointers: Vec<_> = newest.iter().map(|r| r.pointer.as_str()).collect();
        assert_eq!(pointers, ["b", "a"]);
    }

    #[test]
    fn count_is_session_scoped() {
        let conn = open_memory();
        RecordRepo::upsert(&conn, &turn_row("p1", "s1", 1)).unwrap();
        RecordRepo::upsert(&conn, &turn_row("p2", "s2", 2)).unwrap();
        assert_eq!(RecordRepo::count_by_session(&conn, "s1").unwrap(), 1);
        assert_eq!(RecordRepo::count_by_session(&conn, "s3").unwrap(), 0);
    }
}
