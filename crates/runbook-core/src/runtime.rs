//! The runtime adapter contract.
//!
//! An adapter is a pluggable execution backend: it statically analyzes
//! code regions and executes them in a sandbox of its own. The engine
//! treats the sandbox as opaque — no security properties are assumed. The
//! adapter set on a manager is append-only; registration order decides
//! ownership when several adapters claim the same region.

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::doc::DocumentSnapshot;
use crate::regions::CodeRegion;
use crate::state::{LogOutput, RunError, RunValue};

/// Static-analysis output for one region.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ParsedBlock {
    /// Variable names the region declares.
    pub variables: Vec<String>,
}

/// Sink for log output an adapter emits during (or after) a run.
pub type LogSink = Arc<dyn Fn(LogOutput) + Send + Sync>;

/// A pluggable execution backend.
pub trait ScriptRuntime: Send + Sync {
    /// Adapter name, used in diagnostics.
    fn name(&self) -> &str;

    /// Statically analyze every region. The returned vector is
    /// index-aligned with `regions`; `None` means this adapter produced no
    /// artifact for that region (it cannot or will not execute it).
    fn parse(
        &self,
        regions: &[CodeRegion],
        snapshot: &DocumentSnapshot,
    ) -> Vec<Option<ParsedBlock>>;

    /// Execute the region at `index`, as analyzed by the latest `parse`
    /// call. Runs share one execution environment: later regions may read
    /// bindings earlier regions established.
    fn run_code_block(&self, index: usize) -> BoxFuture<'static, Result<RunValue, RunError>>;

    /// Install the sink log output is delivered to. Called once at
    /// registration; adapters that never log may ignore it.
    fn set_log_sink(&self, sink: LogSink) {
        let _ = sink;
    }
}
