//! Reference runtime adapter for Runbook documents.
//!
//! A deliberately small expression language — numbers, strings, booleans,
//! arrays, arithmetic and comparison, `name = expr` bindings, `print`,
//! `throw` — proving the [`ScriptRuntime`] contract end-to-end. All blocks
//! of a document share one environment, so later blocks may read bindings
//! earlier blocks established; the engine's strict document-order
//! execution is what makes that sound.

pub mod error;
pub mod interp;
pub mod lexer;
pub mod parser;
pub mod value;

use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use futures::FutureExt;
use rustc_hash::FxHashMap;
use tracing::debug;

use runbook_core::doc::DocumentSnapshot;
use runbook_core::regions::CodeRegion;
use runbook_core::runtime::{LogSink, ParsedBlock, ScriptRuntime};
use runbook_core::state::{LogOutput, RunError, RunValue};

pub use error::{EvalError, EvalResult};
pub use interp::eval_program;
pub use parser::{parse_program, Program};
pub use value::Value;

struct EvalInner {
    /// Programs from the latest `parse`, index-aligned with the regions.
    programs: Mutex<Vec<Option<Program>>>,
    /// The environment shared by every block of the document. Persists for
    /// the adapter's lifetime, like a long-lived sandbox.
    env: Mutex<FxHashMap<String, Value>>,
    sink: Mutex<Option<LogSink>>,
}

/// Expression-language execution backend.
#[derive(Clone)]
pub struct EvalRuntime {
    inner: Arc<EvalInner>,
}

impl Default for EvalRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl EvalRuntime {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(EvalInner {
                programs: Mutex::new(Vec::new()),
                env: Mutex::new(FxHashMap::default()),
                sink: Mutex::new(None),
            }),
        }
    }
}

impl ScriptRuntime for EvalRuntime {
    fn name(&self) -> &str {
        "eval"
    }

    fn parse(
        &self,
        regions: &[CodeRegion],
        _snapshot: &DocumentSnapshot,
    ) -> Vec<Option<ParsedBlock>> {
        let mut programs = Vec::with_capacity(regions.len());
        let mut parsed = Vec::with_capacity(regions.len());

        for (index, region) in regions.iter().enumerate() {
            match parse_program(&region.code_text) {
                Ok(program) => {
                    parsed.push(Some(ParsedBlock {
                        variables: program.assigned_variables(),
                    }));
                    programs.push(Some(program));
                }
                Err(e) => {
                    debug!(region = index, error = %e, "block does not parse");
                    parsed.push(None);
                    programs.push(None);
                }
            }
        }

        *self.inner.programs.lock().expect("program lock poisoned") = programs;
        parsed
    }

    fn run_code_block(&self, index: usize) -> BoxFuture<'static, Result<RunValue, RunError>> {
        let inner = self.inner.clone();
        async move {
            let program = inner
                .programs
                .lock()
                .expect("program lock poisoned")
                .get(index)
                .cloned()
                .flatten()
                .ok_or_else(|| RunError::new("No AST"))?;

            let sink = inner.sink.lock().expect("sink lock poisoned").clone();
            let print = move |line: String| {
                if let Some(sink) = &sink {
                    sink(LogOutput::new(line));
                }
            };

            let mut env = inner.env.lock().expect("environment lock poisoned");
            let value = eval_program(&program, &mut env, &print)
                .map_err(|e| RunError::new(e.to_string()))?;
            Ok(RunValue::Data(value.to_json()))
        }
        .boxed()
    }

    fn set_log_sink(&self, sink: LogSink) {
        *self.inner.sink.lock().expect("sink lock poisoned") = Some(sink);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runbook_core::doc::BlockKind;
    use runbook_core::regions::scan_regions;

    fn regions_for(code: &[&str]) -> (Vec<CodeRegion>, DocumentSnapshot) {
        let snapshot = DocumentSnapshot::from_blocks(
            code.iter().map(|c| (BlockKind::Code, c.to_string())),
        );
        (scan_regions(&snapshot), snapshot)
    }

    #[tokio::test]
    async fn test_parse_reports_assigned_variables() {
        let runtime = EvalRuntime::new();
        let (regions, snapshot) = regions_for(&["x = 1\ny = 2", "oops ="]);
        let parsed = runtime.parse(&regions, &snapshot);

        assert_eq!(
            parsed[0],
            Some(ParsedBlock {
                variables: vec!["x".to_string(), "y".to_string()]
            })
        );
        assert_eq!(parsed[1], None);
    }

    #[tokio::test]
    async fn test_blocks_share_environment_in_order() {
        let runtime = EvalRuntime::new();
        let (regions, snapshot) = regions_for(&["x = 21", "x * 2"]);
        runtime.parse(&regions, &snapshot);

        runtime.run_code_block(0).await.unwrap();
        let value = runtime.run_code_block(1).await.unwrap();
        assert_eq!(value, RunValue::Data(serde_json::json!(42)));
    }

    #[tokio::test]
    async fn test_throw_becomes_run_error() {
        let runtime = EvalRuntime::new();
        let (regions, snapshot) = regions_for(&["throw 'x'"]);
        runtime.parse(&regions, &snapshot);

        let error = runtime.run_code_block(0).await.unwrap_err();
        assert!(error.message.contains('x'));
    }

    #[tokio::test]
    async fn test_print_goes_through_log_sink() {
        let runtime = EvalRuntime::new();
        let lines = Arc::new(Mutex::new(Vec::new()));
        let captured = lines.clone();
        runtime.set_log_sink(Arc::new(move |output| {
            captured.lock().unwrap().push(output.text);
        }));

        let (regions, snapshot) = regions_for(&["print('hi', 2)\n1"]);
        runtime.parse(&regions, &snapshot);
        runtime.run_code_block(0).await.unwrap();

        assert_eq!(lines.lock().unwrap().as_slice(), ["hi 2"]);
    }
}
