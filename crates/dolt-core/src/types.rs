//! Core data model: tiers, records, payloads, and active-lane membership.
//!
//! Every row the store persists is expressed in these types. The payload is a
//! closed sum type over tier — raw turns carry role + content, summary tiers
//! carry a parsed [`SummaryDocument`] — so every reader pattern-matches
//! exhaustively and a new tier cannot silently fall through.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DocumentError;

/// Rollup tier for a record. Ordering is the rollup direction:
/// `Turn < Leaf < Bindle`, never the reverse.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordTier {
    /// Raw conversational turn.
    Turn,
    /// Short-range summary over a chunk of turns.
    Leaf,
    /// Long-range summary over leaves; the terminal tier.
    Bindle,
}

impl RecordTier {
    /// All tiers in rollup order.
    pub const ALL: [Self; 3] = [Self::Turn, Self::Leaf, Self::Bindle];

    /// Stable string form used in persisted rows.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Turn => "turn",
            Self::Leaf => "leaf",
            Self::Bindle => "bindle",
        }
    }
}

impl fmt::Display for RecordTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordTier {
    type Err = DocumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "turn" => Ok(Self::Turn),
            "leaf" => Ok(Self::Leaf),
            "bindle" => Ok(Self::Bindle),
            other => Err(DocumentError::UnknownTier(other.to_string())),
        }
    }
}

/// Speaker role on a raw turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    /// Inbound user message.
    User,
    /// Agent reply.
    Assistant,
}

impl TurnRole {
    /// Stable string form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// Summary granularity recorded in frontmatter.
///
/// Distinct from [`RecordTier`]: a forced reset summary is stored at Bindle
/// tier and also declares `Bindle` here, regardless of what it covered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryType {
    /// Short-range summary.
    Leaf,
    /// Long-range summary.
    Bindle,
}

impl SummaryType {
    /// Stable string form used in frontmatter.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Leaf => "leaf",
            Self::Bindle => "bindle",
        }
    }
}

impl FromStr for SummaryType {
    type Err = DocumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "leaf" => Ok(Self::Leaf),
            "bindle" => Ok(Self::Bindle),
            other => Err(DocumentError::UnknownSummaryType(other.to_string())),
        }
    }
}

/// Inclusive epoch-millisecond range a summary covers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatesCovered {
    /// Timestamp of the oldest contributing record.
    pub start_epoch_ms: i64,
    /// Timestamp of the newest contributing record.
    pub end_epoch_ms: i64,
}

/// Frontmatter block embedded in every summary record's payload.
///
/// `children` is the source of truth for provenance: it lists every
/// contributing child pointer in chronological order, including skip-level
/// turn pointers that the structural lineage index does not track.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryFrontmatter {
    /// Granularity of this summary.
    pub summary_type: SummaryType,
    /// Time range covered by the contributing records.
    pub dates_covered: DatesCovered,
    /// Ordered contributing child pointers.
    pub children: Vec<String>,
    /// True only for bindles produced by forced reset finalization.
    pub finalized_at_reset: bool,
}

/// A summary record's payload: frontmatter plus prose body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryDocument {
    /// Structured metadata block.
    pub frontmatter: SummaryFrontmatter,
    /// Summary prose.
    pub body: String,
}

/// Closed payload union over tier.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RecordPayload {
    /// Turn-tier payload: one raw conversational message.
    #[serde(rename = "turn")]
    RawTurn {
        /// Speaker role.
        role: TurnRole,
        /// Message text.
        content: String,
    },
    /// Leaf/Bindle-tier payload: a parsed summary document.
    Summary {
        /// The parsed document.
        document: SummaryDocument,
    },
}

impl RecordPayload {
    /// Flat text representation used when a record feeds a summarize call.
    ///
    /// Raw turns yield their content; summaries yield their body.
    #[must_use]
    pub fn source_text(&self) -> &str {
        match self {
            Self::RawTurn { content, .. } => content,
            Self::Summary { document } => &document.body,
        }
    }

    /// Speaker role for summarize-call source turns. Summaries read as
    /// assistant prose.
    #[must_use]
    pub fn source_role(&self) -> TurnRole {
        match self {
            Self::RawTurn { role, .. } => *role,
            Self::Summary { .. } => TurnRole::Assistant,
        }
    }
}

/// One persisted record: a raw turn or a summary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Globally unique identifier, immutable once created.
    pub pointer: String,
    /// Owning session.
    pub session_id: String,
    /// Optional channel-scoped session key.
    pub session_key: Option<String>,
    /// Rollup tier.
    pub tier: RecordTier,
    /// Logical timestamp used for ordering and recency selection.
    pub event_ts_ms: i64,
    /// Derived size used for budgeting.
    pub token_count: i64,
    /// Tier-tagged payload.
    pub payload: RecordPayload,
    /// True only for bindles produced by forced reset finalization.
    pub finalized_at_reset: bool,
    /// Row creation time.
    pub created_at_ms: i64,
    /// Last row update time.
    pub updated_at_ms: i64,
}

/// Membership row for the visible-context set of one `(session, tier)` lane.
///
/// Exactly one row exists per `(session_id, tier, pointer)`; "active" is a
/// flag on that row, not a separate table of facts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveLaneEntry {
    /// Owning session.
    pub session_id: String,
    /// Optional channel-scoped session key.
    pub session_key: Option<String>,
    /// Lane tier.
    pub tier: RecordTier,
    /// Member record pointer.
    pub pointer: String,
    /// Whether the pointer currently counts toward the visible context.
    pub is_active: bool,
    /// Timestamp of the last activation or deactivation event.
    pub last_event_ts_ms: i64,
    /// Last row update time.
    pub updated_at_ms: i64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn tier_ordering_is_rollup_direction() {
        assert!(RecordTier::Turn < RecordTier::Leaf);
        assert!(RecordTier::Leaf < RecordTier::Bindle);
    }

    #[test]
    fn tier_round_trips_through_str() {
        for tier in RecordTier::ALL {
            assert_eq!(tier.as_str().parse::<RecordTier>().unwrap(), tier);
        }
    }

    #[test]
    fn unknown_tier_rejected() {
        assert_matches!(
            "bundle".parse::<RecordTier>(),
            Err(DocumentError::UnknownTier(v)) if v == "bundle"
        );
    }

    #[test]
    fn payload_serde_tags_by_type() {
        let payload = RecordPayload::RawTurn {
            role: TurnRole::User,
            content: "hello".into(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "turn");
        assert_eq!(json["role"], "user");

        let back: RecordPayload = serde_json::from_value(json).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn summary_payload_source_text_is_body() {
        let payload = RecordPayload::Summary {
            document: SummaryDocument {
                frontmatter: SummaryFrontmatter {
                    summary_type: SummaryType::Leaf,
                    dates_covered: DatesCovered {
                        start_epoch_ms: 1,
                        end_epoch_ms: 2,
                    },
                    children: vec!["turn:1".into()],
                    finalized_at_reset: false,
                },
                body: "what happened".into(),
            },
        };
        assert_eq!(payload.source_text(), "what happened");
        assert_eq!(payload.source_role(), TurnRole::Assistant);
    }
}
