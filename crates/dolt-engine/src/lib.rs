//! # dolt-engine
//!
//! The decision layer of the Dolt tiered memory engine, on top of
//! [`dolt_store::RecordStore`]:
//!
//! - **Lane policy resolver** ([`policy`]) — turns a global token budget and
//!   per-tier overrides into concrete numeric ceilings, and selects turn
//!   chunks for compaction
//! - **Bootstrap hydrator** ([`hydrate`]) — reconstructs the active lane set
//!   from durable history after a process restart, within budget
//! - **Reset finalizer** ([`finalize`]) — the ordered rollup pipeline that
//!   drains every active turn and leaf into bindle summaries at session-reset
//!   time, via the external [`summarizer::Summarizer`] collaborator
//!
//! Both entry points assume single-writer-per-session sequential access;
//! different sessions are fully independent.

#![deny(unsafe_code)]

pub mod errors;
pub mod finalize;
pub mod hydrate;
pub mod policy;
pub mod rollup;
pub mod summarizer;

pub use errors::{EngineError, Result};
pub use finalize::{
    finalize_reset, FinalizeResetParams, ResetFinalization, ResetStage, ResidualCounts,
    DEFAULT_MAX_COMPACTION_PASSES, DEFAULT_MIN_LEAF_SOURCE_FLOOR, DEFAULT_MIN_TURN_SOURCE_FLOOR,
};
pub use hydrate::{
    hydrate_bootstrap_state, BootstrapHydration, ContextAssembly, HydrateBootstrapParams,
    TierPointers, TierRecords,
};
pub use policy::{
    resolve_lane_policies, select_turn_chunk_for_compaction, LanePolicies, LanePolicy,
    LanePolicyOverride, LanePolicyOverrides, TurnChunkCandidate, TurnChunkSelection,
};
pub use summarizer::{
    ModelSelection, SummarizeMetadata, SummarizeMode, SummarizeOutcome, SummarizeRequest,
    SummarizeSourceTurn, Summarizer, TailIngestor,
};
