//! Error types for the engine layer.
//!
//! Hydration and finalization propagate store and collaborator failures to
//! their caller — a failed hydration must be treated as "context unavailable",
//! never silently served as an empty history.

use thiserror::Error;

/// Errors that can occur during hydration or finalization.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] dolt_store::StoreError),

    /// Summary document failed to encode or decode.
    #[error("document error: {0}")]
    Document(#[from] dolt_core::DocumentError),

    /// Lane policy overrides failed validation.
    #[error("invalid lane policy: {0}")]
    Policy(String),

    /// The summarizer collaborator failed.
    #[error("summarizer error: {0}")]
    Summarizer(String),

    /// The summarizer returned a document inconsistent with the request.
    #[error("summarizer contract violation: {0}")]
    SummaryContract(String),

    /// The tail-ingestion collaborator failed.
    #[error("tail ingestion error: {0}")]
    TailIngest(String),

    /// A compaction loop failed to converge within the pass limit.
    #[error("compaction exceeded {max_passes} passes for {lane} lane")]
    CompactionPassLimit {
        /// Which rollup lane was looping.
        lane: &'static str,
        /// The configured pass ceiling.
        max_passes: usize,
    },
}

/// Convenience alias for engine results.
pub type Result<T> = std::result::Result<T, EngineError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_error_display() {
        let err = EngineError::Policy("turn.target must be positive".into());
        assert_eq!(
            err.to_string(),
            "invalid lane policy: turn.target must be positive"
        );
    }

    #[test]
    fn pass_limit_display() {
        let err = EngineError::CompactionPassLimit {
            lane: "turn->leaf",
            max_passes: 256,
        };
        assert_eq!(
            err.to_string(),
            "compaction exceeded 256 passes for turn->leaf lane"
        );
    }

    #[test]
    fn store_error_converts() {
        let err: EngineError =
            dolt_store::StoreError::RecordNotFound("p1".into()).into();
        assert!(err.to_string().contains("record not found"));
    }
}
