//! # dolt-core
//!
//! Shared domain types for the Dolt tiered conversational memory engine.
//!
//! The engine keeps every turn of a long-running session representable within
//! a fixed token budget by rolling raw turns into progressively coarser
//! summaries: `Turn` → `Leaf` → `Bindle`. This crate defines the vocabulary
//! the store and engine crates share:
//!
//! - [`RecordTier`] — the ordered rollup hierarchy
//! - [`Record`] / [`RecordPayload`] — the unit of storage with its closed
//!   payload union
//! - [`SummaryDocument`] / [`SummaryFrontmatter`] — the parsed shape of a
//!   summary record's payload
//! - [`document`] — the frontmatter codec for serialized summary documents
//! - [`tokens`] — the byte-length token estimation heuristic

#![deny(unsafe_code)]

pub mod document;
pub mod errors;
pub mod tokens;
pub mod types;

pub use errors::{DocumentError, Result};
pub use types::{
    ActiveLaneEntry, DatesCovered, Record, RecordPayload, RecordTier, SummaryDocument,
    SummaryFrontmatter, SummaryType, TurnRole,
};
