//! Rollup pass plumbing shared by the reset finalizer.
//!
//! A rollup pass turns a chronological slice of source records into one
//! parent summary: derive a deterministic pointer, build the summarize
//! request, check the returned document against the mode's contract, and
//! assemble the atomic [`RollupCommit`] the store applies. The summarize
//! call happens strictly before any write; a failed or malformed reply
//! leaves the store untouched.

use sha2::{Digest, Sha256};

use dolt_core::tokens::estimate_text_tokens;
use dolt_core::{DatesCovered, Record, RecordPayload, RecordTier, SummaryDocument};
use dolt_store::{ChildRef, RecordUpsert, RollupCommit, SourceLane};

use crate::errors::{EngineError, Result};
use crate::summarizer::{SummarizeMode, SummarizeOutcome, SummarizeRequest, SummarizeSourceTurn};

/// Parent tier a mode commits into.
#[must_use]
pub fn parent_tier(mode: SummarizeMode) -> RecordTier {
    match mode {
        SummarizeMode::Leaf => RecordTier::Leaf,
        SummarizeMode::Bindle | SummarizeMode::ResetShortBindle => RecordTier::Bindle,
    }
}

/// Derive the deterministic pointer for a rollup parent.
///
/// Shape: `{tier}:{session}:{kind}:{end_ms}:{digest12}` where `kind` is
/// `reset` for forced short bindles and `rollup` otherwise, and `digest12`
/// is the first 12 hex chars of a SHA-256 over the session, end timestamp,
/// and child pointers. Identical inputs always re-derive the same pointer,
/// which is what makes re-running an interrupted finalization an upsert
/// instead of a duplicate.
#[must_use]
pub fn derive_parent_pointer(
    mode: SummarizeMode,
    session_id: &str,
    end_ms: i64,
    child_pointers: &[String],
) -> String {
    let kind = match mode {
        SummarizeMode::ResetShortBindle => "reset",
        SummarizeMode::Leaf | SummarizeMode::Bindle => "rollup",
    };
    let mut hasher = Sha256::new();
    hasher.update(session_id.as_bytes());
    hasher.update(b"|");
    hasher.update(end_ms.to_string().as_bytes());
    for child in child_pointers {
        hasher.update(b"|");
        hasher.update(child.as_bytes());
    }
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(12);
    for byte in &digest[..6] {
        hex.push_str(&format!("{byte:02x}"));
    }
    format!("{}:{session_id}:{kind}:{end_ms}:{hex}", parent_tier(mode).as_str())
}

/// Coverage window of one source record.
///
/// Summaries report their frontmatter range; raw turns report their event
/// timestamp as a point.
#[must_use]
pub fn source_coverage(record: &Record) -> DatesCovered {
    match &record.payload {
        RecordPayload::Summary { document } => document.frontmatter.dates_covered,
        RecordPayload::RawTurn { .. } => DatesCovered {
            start_epoch_ms: record.event_ts_ms,
            end_epoch_ms: record.event_ts_ms,
        },
    }
}

/// Union coverage window over a chronological source slice.
///
/// # Errors
///
/// Returns [`EngineError::SummaryContract`] for an empty slice.
pub fn sources_coverage(sources: &[Record]) -> Result<DatesCovered> {
    let mut iter = sources.iter().map(source_coverage);
    let Some(first) = iter.next() else {
        return Err(EngineError::SummaryContract(
            "rollup requires at least one source record".to_string(),
        ));
    };
    Ok(iter.fold(first, |acc, window| DatesCovered {
        start_epoch_ms: acc.start_epoch_ms.min(window.start_epoch_ms),
        end_epoch_ms: acc.end_epoch_ms.max(window.end_epoch_ms),
    }))
}

/// Build the summarize request for a chronological source slice.
///
/// # Errors
///
/// Returns [`EngineError::SummaryContract`] when `sources` is empty.
pub fn build_summarize_request(
    mode: SummarizeMode,
    session_id: &str,
    sources: &[Record],
) -> Result<SummarizeRequest> {
    let dates_covered = sources_coverage(sources)?;
    let source_turns = sources
        .iter()
        .map(|record| SummarizeSourceTurn {
            pointer: record.pointer.clone(),
            role: record.payload.source_role().as_str().to_string(),
            content: record.payload.source_text().to_string(),
            timestamp_ms: record.event_ts_ms,
        })
        .collect();
    Ok(SummarizeRequest {
        mode,
        session_id: session_id.to_string(),
        child_pointers: sources.iter().map(|r| r.pointer.clone()).collect(),
        dates_covered,
        source_turns,
    })
}

/// Check a summarizer reply against the mode's contract and parse it.
///
/// # Errors
///
/// Returns [`EngineError::SummaryContract`] when the document does not
/// parse, declares the wrong summary type, or carries the wrong
/// `finalized_at_reset` flag for the mode.
pub fn validate_summary_outcome(
    mode: SummarizeMode,
    outcome: &SummarizeOutcome,
) -> Result<SummaryDocument> {
    let document = SummaryDocument::parse(&outcome.summary).map_err(|err| {
        EngineError::SummaryContract(format!("{mode} reply is not a summary document: {err}"))
    })?;

    if document.frontmatter.summary_type != mode.expected_summary_type() {
        return Err(EngineError::SummaryContract(format!(
            "{mode} reply declares summary_type {}, expected {}",
            document.frontmatter.summary_type.as_str(),
            mode.expected_summary_type().as_str(),
        )));
    }
    if document.frontmatter.finalized_at_reset != mode.expects_finalized_at_reset() {
        return Err(EngineError::SummaryContract(format!(
            "{mode} reply carries finalized_at_reset: {}",
            document.frontmatter.finalized_at_reset,
        )));
    }
    if document.frontmatter.dates_covered.start_epoch_ms
        > document.frontmatter.dates_covered.end_epoch_ms
    {
        return Err(EngineError::SummaryContract(format!(
            "{mode} reply covers an inverted date range",
        )));
    }
    Ok(document)
}

/// Assemble the atomic commit for one validated rollup pass.
///
/// Structural children are tier-adjacent only; skip-level turn pointers
/// live solely in the document frontmatter. Every source lane row is
/// deactivated regardless of whether it became a structural child.
#[must_use]
pub fn build_rollup_commit(
    mode: SummarizeMode,
    session_id: &str,
    session_key: Option<&str>,
    document: SummaryDocument,
    sources: &[Record],
) -> RollupCommit {
    let tier = parent_tier(mode);
    let end_ms = document.frontmatter.dates_covered.end_epoch_ms;
    let pointer =
        derive_parent_pointer(mode, session_id, end_ms, &document.frontmatter.children);
    let token_count = estimate_text_tokens(&document.body);

    // Only the adjacent child tier is structural lineage.
    let child_tier = match tier {
        RecordTier::Leaf => RecordTier::Turn,
        RecordTier::Bindle => RecordTier::Leaf,
        RecordTier::Turn => RecordTier::Turn,
    };
    let children = sources
        .iter()
        .filter(|record| record.tier == child_tier)
        .map(|record| ChildRef {
            pointer: record.pointer.clone(),
            tier: record.tier,
        })
        .collect();
    let source_lanes = sources
        .iter()
        .map(|record| SourceLane {
            tier: record.tier,
            pointer: record.pointer.clone(),
            session_key: record.session_key.clone(),
        })
        .collect();

    RollupCommit {
        record: RecordUpsert {
            pointer,
            session_id: session_id.to_string(),
            session_key: session_key.map(ToString::to_string),
            tier,
            event_ts_ms: end_ms,
            token_count,
            payload: RecordPayload::Summary {
                document: document.clone(),
            },
            finalized_at_reset: document.frontmatter.finalized_at_reset,
        },
        children,
        source_lanes,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use dolt_core::{SummaryFrontmatter, SummaryType, TurnRole};

    fn turn_record(pointer: &str, ts_ms: i64, content: &str) -> Record {
        Record {
            pointer: pointer.to_string(),
            session_id: "s1".to_string(),
            session_key: Some("agent:main".to_string()),
            tier: RecordTier::Turn,
            event_ts_ms: ts_ms,
            token_count: estimate_text_tokens(content),
            payload: RecordPayload::RawTurn {
                role: TurnRole::User,
                content: content.to_string(),
            },
            finalized_at_reset: false,
            created_at_ms: ts_ms,
            updated_at_ms: ts_ms,
        }
    }

    fn leaf_document(start: i64, end: i64, children: Vec<String>) -> SummaryDocument {
        SummaryDocument {
            frontmatter: SummaryFrontmatter {
                summary_type: SummaryType::Leaf,
                dates_covered: DatesCovered {
                    start_epoch_ms: start,
                    end_epoch_ms: end,
                },
                children,
                finalized_at_reset: false,
            },
            body: "What happened, in prose.".to_string(),
        }
    }

    #[test]
    fn pointer_is_deterministic_and_mode_shaped() {
        let children = vec!["turn:a".to_string(), "turn:b".to_string()];
        let a = derive_parent_pointer(SummarizeMode::Leaf, "s1", 2_000, &children);
        let b = derive_parent_pointer(SummarizeMode::Leaf, "s1", 2_000, &children);
        assert_eq!(a, b);
        assert!(a.starts_with("leaf:s1:rollup:2000:"), "{a}");
        assert_eq!(a.rsplit(':').next().unwrap().len(), 12);

        let reset = derive_parent_pointer(SummarizeMode::ResetShortBindle, "s1", 2_000, &children);
        assert!(reset.starts_with("bindle:s1:reset:2000:"), "{reset}");
        assert_ne!(a, reset);
    }

    #[test]
    fn pointer_varies_with_children() {
        let a = derive_parent_pointer(SummarizeMode::Bindle, "s1", 5, &["leaf:x".to_string()]);
        let b = derive_parent_pointer(SummarizeMode::Bindle, "s1", 5, &["leaf:y".to_string()]);
        assert_ne!(a, b);
    }

    #[test]
    fn request_flattens_sources_chronologically() {
        let sources = vec![
            turn_record("turn:a", 1_000, "hello"),
            turn_record("turn:b", 2_000, "world"),
        ];
        let request = build_summarize_request(SummarizeMode::Leaf, "s1", &sources).unwrap();
        assert_eq!(request.child_pointers, ["turn:a", "turn:b"]);
        assert_eq!(request.dates_covered.start_epoch_ms, 1_000);
        assert_eq!(request.dates_covered.end_epoch_ms, 2_000);
        assert_eq!(request.source_turns[0].role, "user");
        assert_eq!(request.source_turns[1].content, "world");
    }

    #[test]
    fn empty_sources_are_a_contract_error() {
        assert_matches!(
            build_summarize_request(SummarizeMode::Leaf, "s1", &[]),
            Err(EngineError::SummaryContract(_))
        );
    }

    #[test]
    fn coverage_unions_summary_windows() {
        let mut leaf = turn_record("leaf:x", 9_000, "ignored");
        leaf.tier = RecordTier::Leaf;
        leaf.payload = RecordPayload::Summary {
            document: leaf_document(500, 8_000, vec!["turn:a".to_string()]),
        };
        let sources = vec![leaf, turn_record("turn:c", 9_500, "tail")];
        let window = sources_coverage(&sources).unwrap();
        assert_eq!(window.start_epoch_ms, 500);
        assert_eq!(window.end_epoch_ms, 9_500);
    }

    #[test]
    fn validate_rejects_wrong_summary_type() {
        let document = leaf_document(1, 2, vec!["turn:a".to_string()]);
        let outcome = SummarizeOutcome {
            summary: document.to_document_string(),
            metadata: crate::summarizer::SummarizeMetadata {
                summary_type: SummaryType::Leaf,
                finalized_at_reset: false,
                prompt_template: None,
                max_output_tokens: None,
            },
            model_selection: crate::summarizer::ModelSelection {
                provider: "test".to_string(),
                model_id: "test-1".to_string(),
            },
        };
        assert_matches!(
            validate_summary_outcome(SummarizeMode::Bindle, &outcome),
            Err(EngineError::SummaryContract(msg)) if msg.contains("summary_type")
        );
        assert!(validate_summary_outcome(SummarizeMode::Leaf, &outcome).is_ok());
    }

    #[test]
    fn validate_requires_reset_flag_for_short_bindle() {
        let mut document = leaf_document(1, 2, vec!["leaf:a".to_string()]);
        document.frontmatter.summary_type = SummaryType::Bindle;
        let outcome = SummarizeOutcome {
            summary: document.to_document_string(),
            metadata: crate::summarizer::SummarizeMetadata {
                summary_type: SummaryType::Bindle,
                finalized_at_reset: false,
                prompt_template: None,
                max_output_tokens: None,
            },
            model_selection: crate::summarizer::ModelSelection {
                provider: "test".to_string(),
                model_id: "test-1".to_string(),
            },
        };
        assert_matches!(
            validate_summary_outcome(SummarizeMode::ResetShortBindle, &outcome),
            Err(EngineError::SummaryContract(msg)) if msg.contains("finalized_at_reset")
        );
    }

    #[test]
    fn commit_keeps_only_adjacent_children_but_deactivates_all_sources() {
        let mut leaf = turn_record("leaf:x", 3_000, "ignored");
        leaf.tier = RecordTier::Leaf;
        leaf.payload = RecordPayload::Summary {
            document: leaf_document(1_000, 3_000, vec!["turn:a".to_string()]),
        };
        let tail = turn_record("turn:tail", 4_000, "loose end");
        let sources = vec![leaf, tail];

        let mut document = leaf_document(1_000, 4_000, vec![
            "leaf:x".to_string(),
            "turn:tail".to_string(),
        ]);
        document.frontmatter.summary_type = SummaryType::Bindle;
        document.frontmatter.finalized_at_reset = true;

        let commit = build_rollup_commit(
            SummarizeMode::ResetShortBindle,
            "s1",
            Some("agent:main"),
            document,
            &sources,
        );

        assert_eq!(commit.record.tier, RecordTier::Bindle);
        assert!(commit.record.finalized_at_reset);
        assert_eq!(commit.record.event_ts_ms, 4_000);
        // Skip-level turn stays out of structural lineage.
        assert_eq!(commit.children.len(), 1);
        assert_eq!(commit.children[0].pointer, "leaf:x");
        // Both sources leave their lanes.
        assert_eq!(commit.source_lanes.len(), 2);
    }
}
