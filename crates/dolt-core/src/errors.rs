//! Error types for domain-level parsing and validation.

use thiserror::Error;

/// Errors raised while encoding or decoding summary documents.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// The document does not open with a `---` frontmatter block.
    #[error("summary document has no frontmatter block")]
    MissingFrontmatter,

    /// The frontmatter block was opened but never closed with `---`.
    #[error("summary document frontmatter block is unclosed")]
    UnclosedFrontmatter,

    /// A `summary_type` value outside `leaf` / `bindle`.
    #[error("unknown summary type: {0}")]
    UnknownSummaryType(String),

    /// A required frontmatter field is absent.
    #[error("missing frontmatter field: {0}")]
    MissingField(&'static str),

    /// A frontmatter field is present but unparseable.
    #[error("invalid frontmatter field {field}: {value}")]
    InvalidField {
        /// Name of the offending field.
        field: &'static str,
        /// Raw value as found in the document.
        value: String,
    },

    /// An unknown record tier string was read from persisted state.
    #[error("unknown record tier: {0}")]
    UnknownTier(String),
}

/// Convenience alias for domain results.
pub type Result<T> = std::result::Result<T, DocumentError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_frontmatter_display() {
        let err = DocumentError::MissingFrontmatter;
        assert_eq!(err.to_string(), "summary document has no frontmatter block");
    }

    #[test]
    fn unknown_summary_type_display() {
        let err = DocumentError::UnknownSummaryType("branch".into());
        assert_eq!(err.to_string(), "unknown summary type: branch");
    }

    #[test]
    fn invalid_field_display() {
        let err = DocumentError::InvalidField {
            field: "start_epoch_ms",
            value: "yesterday".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid frontmatter field start_epoch_ms: yesterday"
        );
    }
}
