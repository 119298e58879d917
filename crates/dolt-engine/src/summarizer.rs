//! External collaborator traits for summarization and tail ingestion.
//!
//! The engine never calls a model directly. Rollup passes hand a
//! [`SummarizeRequest`] to the injected [`Summarizer`] and require the reply
//! to be a well-formed summary document whose frontmatter matches the
//! requested mode; a reply that fails that contract aborts the pass with
//! nothing committed.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use dolt_core::{DatesCovered, SummaryType};

/// Boxed error type collaborators report failures with.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Which kind of summary a rollup pass is asking for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SummarizeMode {
    /// Fold a turn chunk into a leaf summary.
    Leaf,
    /// Fold a leaf chunk into a bindle summary.
    Bindle,
    /// Forced end-of-session bindle over everything still active.
    ResetShortBindle,
}

impl SummarizeMode {
    /// Stable wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Leaf => "leaf",
            Self::Bindle => "bindle",
            Self::ResetShortBindle => "reset-short-bindle",
        }
    }

    /// Summary type the produced document must declare.
    #[must_use]
    pub fn expected_summary_type(self) -> SummaryType {
        match self {
            Self::Leaf => SummaryType::Leaf,
            Self::Bindle | Self::ResetShortBindle => SummaryType::Bindle,
        }
    }

    /// Whether the produced document must carry `finalized_at_reset: true`.
    #[must_use]
    pub fn expects_finalized_at_reset(self) -> bool {
        matches!(self, Self::ResetShortBindle)
    }
}

impl std::fmt::Display for SummarizeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One source turn included in a summarize request, chronological position
/// preserved by the surrounding `Vec`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SummarizeSourceTurn {
    /// Record pointer of the source turn.
    pub pointer: String,
    /// Speaker role (`user` or `assistant`).
    pub role: String,
    /// Turn text.
    pub content: String,
    /// Event timestamp, epoch milliseconds.
    pub timestamp_ms: i64,
}

/// Everything a summarizer needs to produce one summary document.
#[derive(Clone, Debug)]
pub struct SummarizeRequest {
    /// Requested summary kind.
    pub mode: SummarizeMode,
    /// Session being summarized.
    pub session_id: String,
    /// Pointers of the records being folded, chronological.
    pub child_pointers: Vec<String>,
    /// Time range the sources span.
    pub dates_covered: DatesCovered,
    /// Raw turn material, chronological. For [`SummarizeMode::Bindle`] this
    /// holds the child summaries flattened to turn shape.
    pub source_turns: Vec<SummarizeSourceTurn>,
}

/// Which model served a summarize call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSelection {
    /// Provider name, e.g. `anthropic`.
    pub provider: String,
    /// Provider-scoped model identifier.
    pub model_id: String,
}

/// Summarizer-reported details about how the document was produced.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SummarizeMetadata {
    /// Declared summary type of the produced document.
    pub summary_type: SummaryType,
    /// Whether the document was produced by a forced reset rollup.
    pub finalized_at_reset: bool,
    /// Prompt template identifier used, if any.
    pub prompt_template: Option<String>,
    /// Output token ceiling the call ran with, if any.
    pub max_output_tokens: Option<i64>,
}

/// Successful summarizer reply.
#[derive(Clone, Debug)]
pub struct SummarizeOutcome {
    /// Full summary document, frontmatter included. Must parse with
    /// [`dolt_core::SummaryDocument::parse`].
    pub summary: String,
    /// Call metadata.
    pub metadata: SummarizeMetadata,
    /// Model that produced the document.
    pub model_selection: ModelSelection,
}

/// Produces summary documents from source material. Must be pure with
/// respect to the store.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Produce one summary document for `request`.
    async fn summarize(&self, request: &SummarizeRequest) -> Result<SummarizeOutcome, BoxError>;
}

/// Captures raw turns that reached the gateway but were never persisted,
/// so reset finalization sees the in-flight tail before rolling up. The
/// implementation writes the missing turns itself, already marked active.
#[async_trait]
pub trait TailIngestor: Send + Sync {
    /// Append any unpersisted tail turns and return how many were written.
    async fn ingest_missing_tail(&self) -> Result<u64, BoxError>;
}
