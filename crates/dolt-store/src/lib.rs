//! # dolt-store
//!
//! `SQLite`-backed persistence for the Dolt tiered memory engine:
//!
//! - **Record store**: append-only `dolt_records` rows, one per turn or
//!   summary, idempotently upserted by pointer
//! - **Lineage index**: structural parent→child adjacency for summaries
//! - **Active lane tracker**: per-session, per-tier visible-context
//!   membership flags
//! - **Bootstrap import**: JSONL session-history seeding for empty sessions
//!
//! Built on a `rusqlite` facade with the repository pattern: stateless repos
//! take `&Connection`, and the high-level [`RecordStore`] composes them into
//! transactional session-scoped operations. Every multi-row write runs inside
//! a single transaction — callers never observe partial state.

#![deny(unsafe_code)]

pub mod bootstrap;
pub mod errors;
pub mod sqlite;
pub mod store;
pub mod types;

pub use errors::{Result, StoreError};
pub use sqlite::connection::ConnectionConfig;
pub use store::record_store::{raw_turn_upsert, RecordStore};
pub use types::{
    ActiveLaneUpsert, BootstrapImport, BootstrapOutcome, BootstrapSkipReason, BootstrapTurn,
    ChildRef, LaneSelection, LaneSnapshot, LineageEdge, ListActiveLane, ListRecords, RecordUpsert,
    RollupCommit, SourceLane, TierSnapshot,
};
