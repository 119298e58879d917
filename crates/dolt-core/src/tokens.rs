//! Token estimation for summary budgeting.
//!
//! Raw turns arrive with provider-reported token counts; summaries do not.
//! Their `token_count` is derived from the summary body with the standard
//! chars/4 heuristic.

/// Estimate the token footprint of a text: `ceil(len / 4)`.
#[must_use]
pub fn estimate_text_tokens(text: &str) -> i64 {
    i64::try_from(text.len().div_ceil(4)).unwrap_or(i64::MAX)
}
