//! Summary document codec.
//!
//! A summary record's serialized form is a `---`-delimited frontmatter block
//! followed by the prose body. The frontmatter is a hand-written key/value
//! subset (no external YAML dependency) supporting scalars, booleans, and
//! multi-line pointer lists:
//!
//! ```text
//! ---
//! summary_type: bindle
//! start_epoch_ms: 1700000000000
//! end_epoch_ms: 1700000600000
//! finalized_at_reset: true
//! children:
//!   - turn:sess-1:msg:41
//!   - turn:sess-1:msg:42
//! ---
//! The user asked about ...
//! ```
//!
//! Parsing fails fast: a document with no frontmatter, an unclosed block, an
//! unknown `summary_type`, or a missing/malformed epoch is a [`DocumentError`],
//! never a silently defaulted document.

use crate::errors::{DocumentError, Result};
use crate::types::{DatesCovered, SummaryDocument, SummaryFrontmatter, SummaryType};

impl SummaryDocument {
    /// Serialize this document to its frontmatter + body wire form.
    #[must_use]
    pub fn to_document_string(&self) -> String {
        let fm = &self.frontmatter;
        let mut out = String::new();
        out.push_str("---\n");
        out.push_str(&format!("summary_type: {}\n", fm.summary_type.as_str()));
        out.push_str(&format!(
            "start_epoch_ms: {}\n",
            fm.dates_covered.start_epoch_ms
        ));
        out.push_str(&format!("end_epoch_ms: {}\n", fm.dates_covered.end_epoch_ms));
        out.push_str(&format!("finalized_at_reset: {}\n", fm.finalized_at_reset));
        if fm.children.is_empty() {
            out.push_str("children: []\n");
        } else {
            out.push_str("children:\n");
            for child in &fm.children {
                out.push_str(&format!("  - {child}\n"));
            }
        }
        out.push_str("---\n");
        out.push_str(&self.body);
        out
    }

    /// Parse a serialized summary document.
    pub fn parse(raw: &str) -> Result<Self> {
        let (block, body) = extract_frontmatter(raw)?;
        let frontmatter = parse_frontmatter_block(&block)?;
        Ok(Self { frontmatter, body })
    }
}

/// Split a raw document into its frontmatter block and body.
fn extract_frontmatter(raw: &str) -> Result<(String, String)> {
    let trimmed = raw.trim_start();
    let Some(after_open) = trimmed.strip_prefix("---") else {
        return Err(DocumentError::MissingFrontmatter);
    };
    let after_open = after_open.strip_prefix('\n').unwrap_or(after_open);

    let Some(end_idx) = after_open.find("\n---") else {
        return Err(DocumentError::UnclosedFrontmatter);
    };
    let block = after_open[..end_idx].to_string();
    let body_start = end_idx + "\n---".len();
    let body = if body_start < after_open.len() {
        let rest = &after_open[body_start..];
        rest.strip_prefix('\n').unwrap_or(rest).to_string()
    } else {
        String::new()
    };
    Ok((block, body))
}

/// Parse the key/value lines of a frontmatter block.
fn parse_frontmatter_block(block: &str) -> Result<SummaryFrontmatter> {
    let mut summary_type: Option<SummaryType> = None;
    let mut start_epoch_ms: Option<i64> = None;
    let mut end_epoch_ms: Option<i64> = None;
    let mut finalized_at_reset: Option<bool> = None;
    let mut children: Option<Vec<String>> = None;

    let lines: Vec<&str> = block.lines().collect();
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i].trim();
        i += 1;

        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();

        match key {
            "summary_type" => {
                summary_type = Some(unquote(value).parse()?);
            }
            "start_epoch_ms" => {
                start_epoch_ms = Some(parse_epoch("start_epoch_ms", value)?);
            }
            "end_epoch_ms" => {
                end_epoch_ms = Some(parse_epoch("end_epoch_ms", value)?);
            }
            "finalized_at_reset" => {
                finalized_at_reset = Some(parse_bool("finalized_at_reset", value)?);
            }
            "children" => {
                children = Some(parse_pointer_list(value, &lines, &mut i)?);
            }
            _ => {}
        }
    }

    Ok(SummaryFrontmatter {
        summary_type: summary_type.ok_or(DocumentError::MissingField("summary_type"))?,
        dates_covered: DatesCovered {
            start_epoch_ms: start_epoch_ms.ok_or(DocumentError::MissingField("start_epoch_ms"))?,
            end_epoch_ms: end_epoch_ms.ok_or(DocumentError::MissingField("end_epoch_ms"))?,
        },
        children: children.ok_or(DocumentError::MissingField("children"))?,
        finalized_at_reset: finalized_at_reset.unwrap_or(false),
    })
}

/// Parse a pointer list, either inline `[a, b]` or multi-line `- item`.
fn parse_pointer_list(value: &str, lines: &[&str], i: &mut usize) -> Result<Vec<String>> {
    if value.starts_with('[') {
        let inner = value.trim_start_matches('[').trim_end_matches(']').trim();
        if inner.is_empty() {
            return Ok(Vec::new());
        }
        return Ok(inner.split(',').map(|s| unquote(s.trim())).collect());
    }

    if !value.is_empty() {
        return Err(DocumentError::InvalidField {
            field: "children",
            value: value.to_string(),
        });
    }

    let mut items = Vec::new();
    while *i < lines.len() {
        let trimmed = lines[*i].trim();
        if let Some(item) = trimmed.strip_prefix("- ") {
            items.push(unquote(item.trim()));
            *i += 1;
        } else if trimmed.starts_with('-') && trimmed.len() > 1 {
            items.push(unquote(trimmed[1..].trim()));
            *i += 1;
        } else {
            break;
        }
    }
    Ok(items)
}

fn parse_epoch(field: &'static str, value: &str) -> Result<i64> {
    unquote(value)
        .parse::<i64>()
        .map_err(|_| DocumentError::InvalidField {
            field,
            value: value.to_string(),
        })
}

fn parse_bool(field: &'static str, value: &str) -> Result<bool> {
    match unquote(value).to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(DocumentError::InvalidField {
            field,
            value: value.to_string(),
        }),
    }
}

/// Remove surrounding quotes from a scalar value.
fn unquote(s: &str) -> String {
    let trimmed = s.trim();
    if (trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2)
        || (trimmed.starts_with('\'') && trimmed.ends_with('\'') && trimmed.len() >= 2)
    {
        trimmed[1..trimmed.len() - 1].to_string()
    } else {
        trimmed.to_string()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn sample_document() -> SummaryDocument {
        SummaryDocument {
            frontmatter: SummaryFrontmatter {
                summary_type: SummaryType::Bindle,
                dates_covered: DatesCovered {
                    start_epoch_ms: 1_700_000_000_000,
                    end_epoch_ms: 1_700_000_600_000,
                },
                children: vec!["leaf:s1:rollup:9:aaa".into(), "turn:s1:msg:42".into()],
                finalized_at_reset: true,
            },
            body: "The user migrated the billing service.\n\nOpen items: none.".into(),
        }
    }

    #[test]
    fn round_trips_serialized_form() {
        let doc = sample_document();
        let raw = doc.to_document_string();
        let parsed = SummaryDocument::parse(&raw).unwrap();
        assert_eq!(parsed, doc);
    }

    #[test]
    fn empty_children_serialize_inline() {
        let mut doc = sample_document();
        doc.frontmatter.children.clear();
        let raw = doc.to_document_string();
        assert!(raw.contains("children: []"));
        let parsed = SummaryDocument::parse(&raw).unwrap();
        assert!(parsed.frontmatter.children.is_empty());
    }

    #[test]
    fn inline_children_list_parses() {
        let raw = "---\nsummary_type: leaf\nstart_epoch_ms: 1\nend_epoch_ms: 2\nchildren: [turn:a, turn:b]\n---\nbody";
        let parsed = SummaryDocument::parse(raw).unwrap();
        assert_eq!(parsed.frontmatter.children, vec!["turn:a", "turn:b"]);
        assert_eq!(parsed.body, "body");
    }

    #[test]
    fn missing_finalized_flag_defaults_false() {
        let raw =
            "---\nsummary_type: leaf\nstart_epoch_ms: 1\nend_epoch_ms: 2\nchildren: []\n---\nbody";
        let parsed = SummaryDocument::parse(raw).unwrap();
        assert!(!parsed.frontmatter.finalized_at_reset);
    }

    #[test]
    fn missing_frontmatter_rejected() {
        assert_matches!(
            SummaryDocument::parse("just prose, no block"),
            Err(DocumentError::MissingFrontmatter)
        );
    }

    #[test]
    fn unclosed_frontmatter_rejected() {
        assert_matches!(
            SummaryDocument::parse("---\nsummary_type: leaf\nno closing fence"),
            Err(DocumentError::UnclosedFrontmatter)
        );
    }

    #[test]
    fn unknown_summary_type_rejected() {
        let raw =
            "---\nsummary_type: branch\nstart_epoch_ms: 1\nend_epoch_ms: 2\nchildren: []\n---\n";
        assert_matches!(
            SummaryDocument::parse(raw),
            Err(DocumentError::UnknownSummaryType(v)) if v == "branch"
        );
    }

    #[test]
    fn missing_dates_rejected() {
        let raw = "---\nsummary_type: leaf\nchildren: []\n---\nbody";
        assert_matches!(
            SummaryDocument::parse(raw),
            Err(DocumentError::MissingField("start_epoch_ms"))
        );
    }

    #[test]
    fn malformed_epoch_rejected() {
        let raw =
            "---\nsummary_type: leaf\nstart_epoch_ms: soon\nend_epoch_ms: 2\nchildren: []\n---\n";
        assert_matches!(
            SummaryDocument::parse(raw),
            Err(DocumentError::InvalidField { field: "start_epoch_ms", .. })
        );
    }

    #[test]
    fn scalar_children_value_rejected() {
        let raw =
            "---\nsummary_type: leaf\nstart_epoch_ms: 1\nend_epoch_ms: 2\nchildren: turn:a\n---\n";
        assert_matches!(
            SummaryDocument::parse(raw),
            Err(DocumentError::InvalidField { field: "children", .. })
        );
    }

    #[test]
    fn body_preserved_verbatim_after_fence() {
        let doc = sample_document();
        let parsed = SummaryDocument::parse(&doc.to_document_string()).unwrap();
        assert!(parsed.body.contains("Open items: none."));
    }

    #[test]
    fn empty_body_parses() {
        let raw =
            "---\nsummary_type: leaf\nstart_epoch_ms: 1\nend_epoch_ms: 2\nchildren: []\n---";
        let parsed = SummaryDocument::parse(raw).unwrap();
        assert!(parsed.body.is_empty());
    }
}
