//! JSONL session-history reader for bootstrap import.
//!
//! Gateway session files are JSONL streams of typed entries. Only
//! `{"type": "message"}` entries with a user/assistant role become bootstrap
//! turns; blank and malformed lines are tolerated and skipped. Timestamps may
//! be epoch milliseconds or RFC 3339 strings; token counts come from the
//! entry's usage block (`total`, or the sum of its components).

use std::fs;
use std::path::Path;

use chrono::DateTime;
use serde_json::Value;

use dolt_core::TurnRole;

use crate::errors::Result;
use crate::types::BootstrapTurn;

/// Parse a session JSONL file into bootstrap turns, line order preserved.
///
/// A missing file yields an empty list rather than an error: the caller
/// distinguishes "no session file" from "file with no messages" via
/// [`session_file_exists`].
pub fn read_turns_from_jsonl(session_file: &Path, session_id: &str) -> Result<Vec<BootstrapTurn>> {
    if !session_file.exists() {
        return Ok(Vec::new());
    }
    let raw = fs::read_to_string(session_file)?;
    let mut turns = Vec::new();

    for (line_idx, line) in raw.lines().enumerate() {
        let line_number = i64::try_from(line_idx).unwrap_or(i64::MAX) + 1;
        let Some(entry) = parse_json_line(line) else {
            continue;
        };
        let Some(turn) = parse_message_entry(&entry, session_id, line_number) else {
            continue;
        };
        turns.push(turn);
    }
    Ok(turns)
}

/// Whether the session file is present on disk.
#[must_use]
pub fn session_file_exists(session_file: &Path) -> bool {
    session_file.exists()
}

fn parse_json_line(line: &str) -> Option<Value> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str::<Value>(trimmed) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

fn parse_message_entry(entry: &Value, session_id: &str, line_number: i64) -> Option<BootstrapTurn> {
    if entry.get("type").and_then(Value::as_str) != Some("message") {
        return None;
    }
    let message = entry.get("message")?.as_object()?;
    let role = match message.get("role").and_then(Value::as_str) {
        Some("user") => TurnRole::User,
        Some("assistant") => TurnRole::Assistant,
        _ => return None,
    };

    let event_ts_ms = parse_timestamp_ms(entry.get("timestamp"))
        .or_else(|| parse_timestamp_ms(message.get("timestamp")))
        .unwrap_or(line_number);
    let usage = message.get("usage").or_else(|| entry.get("usage"));
    let token_count = parse_token_count(usage);
    let pointer = entry
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.trim().is_empty())
        .map(|id| format!("turn:{session_id}:msg:{id}"));
    let content = stringify_content(message.get("content"));

    Some(BootstrapTurn {
        pointer,
        event_ts_ms: Some(event_ts_ms),
        token_count,
        role,
        content,
    })
}

fn parse_timestamp_ms(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64().map(|ts| ts.max(0)),
        Value::String(s) if !s.trim().is_empty() => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.timestamp_millis()),
        _ => None,
    }
}

fn parse_token_count(usage: Option<&Value>) -> i64 {
    let Some(usage) = usage.and_then(Value::as_object) else {
        return 0;
    };
    if let Some(total) = usage.get("total").and_then(Value::as_i64) {
        return total.max(0);
    }
    ["input", "output", "cacheRead", "cacheWrite"]
        .iter()
        .filter_map(|key| usage.get(*key).and_then(Value::as_i64))
        .sum::<i64>()
        .max(0)
}

/// Flatten message content: plain strings pass through; content-block arrays
/// contribute their `text` fields; anything else serializes to JSON.
fn stringify_content(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(blocks)) => {
            let joined: String = blocks
                .iter()
                .filter_map(|block| block.get("text").and_then(Value::as_str))
                .collect();
            if joined.trim().is_empty() {
                serde_json::to_string(content.unwrap_or(&Value::Null)).unwrap_or_default()
            } else {
                joined
            }
        }
        Some(other) => serde_json::to_string(other).unwrap_or_default(),
        None => String::new(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
