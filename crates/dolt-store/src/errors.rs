//! Error types for the store subsystem.
//!
//! [`StoreError`] is returned by every store operation. Store failures are
//! fatal to the current operation and propagate to the caller — recovery
//! policy lives in the message pipeline, not here.

use thiserror::Error;

/// Errors that can occur during record store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// `SQLite` database error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// JSON serialization/deserialization error.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Persisted row failed domain-level decoding (tier, payload shape).
    #[error("corrupt row: {0}")]
    CorruptRow(#[from] dolt_core::DocumentError),

    /// Schema migration failed.
    #[error("migration error: {message}")]
    Migration {
        /// Describes which migration failed and why.
        message: String,
    },

    /// Requested record was not found.
    #[error("record not found: {0}")]
    RecordNotFound(String),

    /// Caller-supplied input failed validation.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Bootstrap session file could not be read.
    #[error("bootstrap io error: {0}")]
    BootstrapIo(#[from] std::io::Error),
}

/// Convenience type alias for store results.
pub type Result<T> = std::result::Result<T, StoreError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
