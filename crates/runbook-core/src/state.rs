//! Per-region execution state.
//!
//! Each code region carries one [`ScriptRuntimeState`] progressing through
//! five phases, driven exclusively by the executive manager. There is no
//! terminal phase: every region can be revisited indefinitely as the
//! document changes. A settled outcome is carried forward as `stale`
//! through the unknown/parsed/executing phases so consumers can show
//! "previous result, recomputing" instead of blanking.

use std::time::Instant;

/// One log line emitted asynchronously by a runtime adapter.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LogOutput {
    pub text: String,
}

impl LogOutput {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// The value produced by a successful run.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum RunValue {
    /// A function value; renders via its source text.
    Function { source: String },
    /// Any data value.
    Data(serde_json::Value),
}

/// The error produced by a failed run.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RunError {
    pub message: String,
    /// Captured stack trace, preferred over the message when rendering.
    pub stack: Option<String>,
}

impl RunError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
        }
    }

    /// The text a result region shows for this error.
    pub fn render_text(&self) -> &str {
        self.stack.as_deref().unwrap_or(&self.message)
    }
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for RunError {}

/// Snapshot of the last settled run, shown dimmed while a newer
/// computation is in flight.
#[derive(Debug, Clone, PartialEq)]
pub struct StaleResult {
    pub outcome: Result<RunValue, RunError>,
    pub completed: Instant,
}

/// The five-phase state of one code region.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptRuntimeState {
    /// No analysis artifact exists for the region (parse failed, or no
    /// adapter claimed it).
    Unknown { stale: Option<StaleResult> },

    /// Static analysis succeeded; not yet run.
    Parsed {
        /// Variable names the region declares.
        variables: Vec<String>,
        stale: Option<StaleResult>,
    },

    /// A run is in flight.
    Executing {
        started: Instant,
        logs: Vec<LogOutput>,
        stale: Option<StaleResult>,
    },

    /// The run completed without error.
    Succeeded {
        started: Instant,
        completed: Instant,
        logs: Vec<LogOutput>,
        result: RunValue,
    },

    /// The run completed with an error.
    Failed {
        started: Instant,
        completed: Instant,
        logs: Vec<LogOutput>,
        error: RunError,
    },
}

impl ScriptRuntimeState {
    /// Phase name for diagnostics and tests.
    pub fn phase(&self) -> &'static str {
        match self {
            Self::Unknown { .. } => "unknown",
            Self::Parsed { .. } => "parsed",
            Self::Executing { .. } => "executing",
            Self::Succeeded { .. } => "succeeded",
            Self::Failed { .. } => "failed",
        }
    }

    /// The stale snapshot to carry into the next non-settled phase: a
    /// settled state snapshots itself, a non-settled state forwards what it
    /// already carries.
    pub fn to_stale(&self) -> Option<StaleResult> {
        match self {
            Self::Succeeded {
                completed, result, ..
            } => Some(StaleResult {
                outcome: Ok(result.clone()),
                completed: *completed,
            }),
            Self::Failed {
                completed, error, ..
            } => Some(StaleResult {
                outcome: Err(error.clone()),
                completed: *completed,
            }),
            Self::Unknown { stale }
            | Self::Parsed { stale, .. }
            | Self::Executing { stale, .. } => stale.clone(),
        }
    }

    /// Log lines attached to this state, if the phase carries any.
    pub fn logs(&self) -> Option<&[LogOutput]> {
        match self {
            Self::Executing { logs, .. }
            | Self::Succeeded { logs, .. }
            | Self::Failed { logs, .. } => Some(logs),
            Self::Unknown { .. } | Self::Parsed { .. } => None,
        }
    }
}

/// Runtime state of the whole document.
///
/// Owned exclusively by the executive manager and replaced — never mutated
/// in place — on every transition, so consumers detect change by reference
/// comparison.
#[derive(Debug, Clone, Default)]
pub struct DocumentRuntimeState {
    /// Index-aligned with the discovered regions.
    pub code_block_states: Vec<Option<ScriptRuntimeState>>,
    /// Union of the variable names every adapter declared, sorted.
    pub global_variables: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn succeeded(value: serde_json::Value) -> ScriptRuntimeState {
        let now = Instant::now();
        ScriptRuntimeState::Succeeded {
            started: now,
            completed: now,
            logs: vec![LogOutput::new("hello")],
            result: RunValue::Data(value),
        }
    }

    #[test]
    fn test_settled_state_snapshots_itself() {
        let state = succeeded(serde_json::json!(2));
        let stale = state.to_stale().expect("settled states become stale");
        assert_eq!(stale.outcome, Ok(RunValue::Data(serde_json::json!(2))));
    }

    #[test]
    fn test_stale_survives_reparse_and_execution() {
        let stale = succeeded(serde_json::json!(2)).to_stale();

        let parsed = ScriptRuntimeState::Parsed {
            variables: vec![],
            stale: stale.clone(),
        };
        let executing = ScriptRuntimeState::Executing {
            started: Instant::now(),
            logs: vec![],
            stale: parsed.to_stale(),
        };
        let unknown = ScriptRuntimeState::Unknown {
            stale: executing.to_stale(),
        };

        // the original settled outcome is still visible after three hops
        assert_eq!(
            unknown.to_stale().map(|s| s.outcome),
            stale.map(|s| s.outcome)
        );
    }

    #[test]
    fn test_error_render_prefers_stack() {
        let mut error = RunError::new("boom");
        assert_eq!(error.render_text(), "boom");
        error.stack = Some("boom\n  at block 1".to_string());
        assert_eq!(error.render_text(), "boom\n  at block 1");
    }

    #[test]
    fn test_phase_names() {
        assert_eq!(succeeded(serde_json::json!(null)).phase(), "succeeded");
        assert_eq!(
            ScriptRuntimeState::Unknown { stale: None }.phase(),
            "unknown"
        );
    }
}
