//! Core engine for Runbook live documents.
//!
//! Code blocks embedded in a rich-text document are continuously
//! discovered, statically analyzed, executed in a sandbox, and their
//! results written back into adjacent result regions as the user types.
//!
//! This crate provides:
//! - Region discovery with iteration counters for cache invalidation
//! - An edit guard protecting generated result regions
//! - A per-region execution state machine with staleness carry-over
//! - A cooperative, cancellable, order-preserving run scheduler
//! - Result rendering to persisted text plus live decorations
//!
//! Execution backends plug in through [`ScriptRuntime`]; the document
//! model is consumed through the contract in [`doc`].

pub mod doc;
pub mod error;
pub mod executive;
pub mod guard;
pub mod regions;
pub mod render;
pub mod runtime;
pub mod state;

pub use doc::{
    BlockKind, BlockNode, DispatchOutcome, DocumentSnapshot, InMemoryDocument, Position, Step,
    Transaction,
};
pub use error::{Error, Result};
pub use executive::{EngineConfig, ExecutiveManager};
pub use guard::{should_allow, OverlapClass};
pub use regions::{find_code_regions, scan_regions, CodeRegion, NodeSpan, RegionMap};
pub use render::{Decoration, RenderSpan, SpanClass, WidgetKind};
pub use runtime::{LogSink, ParsedBlock, ScriptRuntime};
pub use state::{
    DocumentRuntimeState, LogOutput, RunError, RunValue, ScriptRuntimeState, StaleResult,
};
