//! Lineage repository — structural parent→child adjacency for summaries.
//!
//! The lineage index is a convenience for tier-adjacent traversal. The
//! summary frontmatter `children` list remains the source of truth for full
//! provenance, including skip-level edges the index does not carry.

use rusqlite::{params, Connection};

use crate::errors::Result;
use crate::sqlite::row_types::{LineageRow, RecordRow};

/// Lineage repository — stateless, every method takes `&Connection`.
pub struct LineageRepo;

impl LineageRepo {
    /// Insert or update one direct edge.
    pub fn upsert_edge(conn: &Connection, edge: &LineageRow) -> Result<()> {
        let _ = conn.execute(
            "INSERT INTO dolt_lineage (parent_pointer, child_pointer, child_index, child_tier, created_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(parent_pointer, child_pointer) DO UPDATE SET
               child_index = excluded.child_index,
               child_tier = excluded.child_tier",
            params![
                edge.parent_pointer,
                edge.child_pointer,
                edge.child_index,
                edge.child_tier,
                edge.created_at_ms,
            ],
        )?;
        Ok(())
    }

    /// Delete all direct edges under one parent.
    pub fn delete_children(conn: &Connection, parent_pointer: &str) -> Result<()> {
        let _ = conn.execute(
            "DELETE FROM dolt_lineage WHERE parent_pointer = ?1",
            params![parent_pointer],
        )?;
        Ok(())
    }

    /// List direct edges under one parent in child-index order.
    pub fn list_children(conn: &Connection, parent_pointer: &str) -> Result<Vec<LineageRow>> {
        let mut stmt = conn.prepare(
            "SELECT parent_pointer, child_pointer, child_index, child_tier, created_at_ms
             FROM dolt_lineage
             WHERE parent_pointer = ?1
             ORDER BY child_index ASC, child_pointer ASC",
        )?;
        let rows = stmt
            .query_map(params![parent_pointer], |row| {
                Ok(LineageRow {
                    parent_pointer: row.get(0)?,
                    child_pointer: row.get(1)?,
                    child_index: row.get(2)?,
                    child_tier: row.get(3)?,
                    created_at_ms: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Read direct child records in child-index order.
    pub fn list_child_records(conn: &Connection, parent_pointer: &str) -> Result<Vec<RecordRow>> {
        let mut stmt = conn.prepare(
            "SELECT r.pointer, r.session_id, r.session_key, r.tier, r.event_ts_ms,
                    r.token_count, r.payload_json, r.finalized_at_reset,
                    r.created_at_ms, r.updated_at_ms
             FROM dolt_lineage l
             JOIN dolt_records r ON r.pointer = l.child_pointer
             WHERE l.parent_pointer = ?1
             ORDER BY l.child_index ASC, l.child_pointer ASC",
        )?;
        let rows = stmt
            .query_map(params![parent_pointer], |row| {
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
    use crate::sqlite::repositories::record::RecordRepo;

    fn open_memory() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    fn edge(parent: &str, child: &str, index: i64) -> LineageRow {
        LineageRow {
            parent_pointer: parent.into(),
            child_pointer: child.into(),
            child_index: index,
            child_tier: "turn".into(),
            created_at_ms: 1,
        }
    }

    #[test]
    fn upsert_and_list_in_index_order() {
        let conn = open_memory();
        LineageRepo::upsert_edge(&conn, &edge("leaf:1", "turn:b", 1)).unwrap();
        LineageRepo::upsert_edge(&conn, &edge("leaf:1", "turn:a", 0)).unwrap();

        let children = LineageRepo::list_children(&conn, "leaf:1").unwrap();
        let pointers: Vec<_> = children.iter().map(|e| e.child_pointer.as_str()).collect();
        assert_eq!(pointers, ["turn:a", "turn:b"]);
    }

    #[test]
    fn upsert_edge_updates_index_in_place() {
        let conn = open_memory();
        LineageRepo::upsert_edge(&conn, &edge("leaf:1", "turn:a", 0)).unwrap();
        LineageRepo::upsert_edge(&conn, &edge("leaf:1", "turn:a", 5)).unwrap();

        let children = LineageRepo::list_children(&conn, "leaf:1").unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].child_index, 5);
    }

    #[test]
    fn delete_children_clears_parent_only() {
        let conn = open_memory();
        LineageRepo::upsert_edge(&conn, &edge("leaf:1", "turn:a", 0)).unwrap();
        LineageRepo::upsert_edge(&conn, &edge("leaf:2", "turn:b", 0)).unwrap();

        LineageRepo::delete_children(&conn, "leaf:1").unwrap();
        assert!(LineageRepo::list_children(&conn, "leaf:1").unwrap().is_empty());
        assert_eq!(LineageRepo::list_children(&conn, "leaf:2").unwrap().len(), 1);
    }

    #[test]
    fn list_child_records_joins_records() {
        let conn = open_memory();
        let row = RecordRow {
            pointer: "turn:a".into(),
            session_id: "s1".into(),
            session_key: None,
            tier: "turn".into(),
            event_ts_ms: 10,
            token_count: 4,
            payload_json: r#"{"type":"turn","role":"user","content":"x"}"#.into(),
            finalized_at_reset: 0,
            created_at_ms: 10,
            updated_at_ms: 10,
        };
        RecordRepo::upsert(&conn, &row).unwrap();
        LineageRepo::upsert_edge(&conn, &edge("leaf:1", "turn:a", 0)).unwrap();
        // Dangling edge: no record row behind it, so the join drops it.
        LineageRepo::upsert_edge(&conn, &edge("leaf:1", "turn:ghost", 1)).unwrap();

        let records = LineageRepo::list_child_records(&conn, "leaf:1").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].pointer, "turn:a");
    }
}
