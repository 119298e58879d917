//! High-level store API.

pub mod record_store;
