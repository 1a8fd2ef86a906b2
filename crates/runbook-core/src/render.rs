//! Result rendering: one authoritative span sequence, two projections.
//!
//! [`render`] turns a region's execution state into spans. The
//! concatenation of the text spans is exactly what gets persisted into the
//! result node ([`flatten_text`]); widget markers and span classes exist
//! only as live decorations ([`decorations`]) and contribute no persisted
//! text. Deriving both views from the same spans keeps them consistent by
//! construction.

use crate::doc::Position;
use crate::state::{RunError, RunValue, ScriptRuntimeState, StaleResult};

/// Placeholder text for a region with no analysis artifact.
pub const NO_AST_PLACEHOLDER: &str = "No AST";

/// Styling class attached to a text span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanClass {
    /// A carried-forward previous result, shown while recomputing.
    Stale,
    /// The unknown-phase placeholder.
    Placeholder,
    /// The parsed-phase variable summary.
    Summary,
    /// A failed run's error text.
    Error,
}

impl SpanClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stale => "stale",
            Self::Placeholder => "placeholder",
            Self::Summary => "summary",
            Self::Error => "error",
        }
    }
}

/// A live-only widget attached to a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetKind {
    /// Run-in-flight indicator.
    Spinner,
}

/// One element of the rendered sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderSpan {
    Text {
        text: String,
        class: Option<SpanClass>,
    },
    Widget(WidgetKind),
}

impl RenderSpan {
    fn text(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            class: None,
        }
    }

    fn classed(text: impl Into<String>, class: SpanClass) -> Self {
        Self::Text {
            text: text.into(),
            class: Some(class),
        }
    }
}

/// A live overlay attached to absolute positions, leaving text untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoration {
    Inline {
        from: Position,
        to: Position,
        class: &'static str,
    },
    Widget {
        pos: Position,
        widget: WidgetKind,
    },
}

/// Render a region's execution state to its span sequence.
pub fn render(state: &ScriptRuntimeState) -> Vec<RenderSpan> {
    match state {
        ScriptRuntimeState::Unknown { stale } => match stale {
            Some(stale) => vec![stale_span(stale)],
            None => vec![RenderSpan::classed(NO_AST_PLACEHOLDER, SpanClass::Placeholder)],
        },
        ScriptRuntimeState::Parsed { variables, stale } => match stale {
            Some(stale) => vec![stale_span(stale)],
            None => vec![RenderSpan::classed(variables.join(", "), SpanClass::Summary)],
        },
        ScriptRuntimeState::Executing { stale, .. } => {
            let mut spans = vec![RenderSpan::Widget(WidgetKind::Spinner)];
            if let Some(stale) = stale {
                spans.push(stale_span(stale));
            }
            spans
        }
        ScriptRuntimeState::Succeeded { result, .. } => vec![RenderSpan::text(format_value(result))],
        ScriptRuntimeState::Failed { error, .. } => {
            vec![RenderSpan::classed(format_error(error), SpanClass::Error)]
        }
    }
}

fn stale_span(stale: &StaleResult) -> RenderSpan {
    let text = match &stale.outcome {
        Ok(value) => format_value(value),
        Err(error) => format_error(error),
    };
    RenderSpan::classed(text, SpanClass::Stale)
}

/// The persisted text: concatenation of all text spans.
pub fn flatten_text(spans: &[RenderSpan]) -> String {
    let mut out = String::new();
    for span in spans {
        if let RenderSpan::Text { text, .. } = span {
            out.push_str(text);
        }
    }
    out
}

/// The live overlay view: classes and widgets positioned from
/// `content_start` (the first content position of the result node).
pub fn decorations(spans: &[RenderSpan], content_start: Position) -> Vec<Decoration> {
    let mut out = Vec::new();
    let mut pos = content_start;
    for span in spans {
        match span {
            RenderSpan::Text { text, class } => {
                if let Some(class) = class
                    && !text.is_empty()
                {
                    out.push(Decoration::Inline {
                        from: pos,
                        to: pos + text.len(),
                        class: class.as_str(),
                    });
                }
                pos += text.len();
            }
            RenderSpan::Widget(widget) => out.push(Decoration::Widget {
                pos,
                widget: *widget,
            }),
        }
    }
    out
}

/// Format a run value for persistence.
///
/// Functions render via their source text. Falsy data (null, false, 0, the
/// empty string) renders as `<type> <value>`, collapsing to just the type
/// when the value's own string form adds nothing. Everything else renders
/// as indented structural serialization.
pub fn format_value(value: &RunValue) -> String {
    match value {
        RunValue::Function { source } => source.clone(),
        RunValue::Data(data) => {
            if is_falsy(data) {
                let type_name = json_type_name(data);
                let string_form = falsy_string_form(data);
                if string_form.is_empty() || string_form == type_name {
                    type_name.to_string()
                } else {
                    format!("{type_name} {string_form}")
                }
            } else {
                serde_json::to_string_pretty(data).unwrap_or_else(|_| data.to_string())
            }
        }
    }
}

/// Format a run error for persistence: stack trace when captured, plain
/// message otherwise.
pub fn format_error(error: &RunError) -> String {
    error.render_text().to_string()
}

fn is_falsy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => true,
        serde_json::Value::Bool(b) => !b,
        serde_json::Value::Number(n) => n.as_f64() == Some(0.0),
        serde_json::Value::String(s) => s.is_empty(),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => false,
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

fn falsy_string_form(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => "null".to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s.clone(),
        _ => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::LogOutput;
    use serde_json::json;
    use std::time::Instant;

    fn data(value: serde_json::Value) -> RunValue {
        RunValue::Data(value)
    }

    #[test]
    fn test_simple_number_renders_bare() {
        assert_eq!(format_value(&data(json!(2))), "2");
    }

    #[test]
    fn test_falsy_values() {
        assert_eq!(format_value(&data(json!(null))), "null");
        assert_eq!(format_value(&data(json!(false))), "boolean false");
        assert_eq!(format_value(&data(json!(0))), "number 0");
        assert_eq!(format_value(&data(json!(""))), "string");
    }

    #[test]
    fn test_function_renders_source() {
        let value = RunValue::Function {
            source: "fn double(x) { x * 2 }".to_string(),
        };
        assert_eq!(format_value(&value), "fn double(x) { x * 2 }");
    }

    #[test]
    fn test_structure_renders_indented() {
        let text = format_value(&data(json!({"a": [1, 2]})));
        assert_eq!(text, "{\n  \"a\": [\n    1,\n    2\n  ]\n}");
    }

    #[test]
    fn test_executing_keeps_stale_text_and_adds_spinner() {
        let now = Instant::now();
        let prior = ScriptRuntimeState::Succeeded {
            started: now,
            completed: now,
            logs: vec![],
            result: data(json!(2)),
        };
        let executing = ScriptRuntimeState::Executing {
            started: now,
            logs: vec![LogOutput::new("working")],
            stale: prior.to_stale(),
        };

        let spans = render(&executing);
        assert_eq!(spans[0], RenderSpan::Widget(WidgetKind::Spinner));
        // persisted text is unchanged from the prior result
        assert_eq!(flatten_text(&spans), "2");

        let decos = decorations(&spans, 10);
        assert_eq!(
            decos[0],
            Decoration::Widget {
                pos: 10,
                widget: WidgetKind::Spinner
            }
        );
        assert_eq!(
            decos[1],
            Decoration::Inline {
                from: 10,
                to: 11,
                class: "stale"
            }
        );
    }

    #[test]
    fn test_unknown_renders_placeholder() {
        let spans = render(&ScriptRuntimeState::Unknown { stale: None });
        assert_eq!(flatten_text(&spans), NO_AST_PLACEHOLDER);
    }

    #[test]
    fn test_parsed_renders_variable_summary() {
        let spans = render(&ScriptRuntimeState::Parsed {
            variables: vec!["a".to_string(), "b".to_string()],
            stale: None,
        });
        assert_eq!(flatten_text(&spans), "a, b");
    }

    #[test]
    fn test_failed_renders_error() {
        let now = Instant::now();
        let failed = ScriptRuntimeState::Failed {
            started: now,
            completed: now,
            logs: vec![],
            error: RunError::new("unknown variable `q`"),
        };
        assert_eq!(flatten_text(&render(&failed)), "unknown variable `q`");
    }

    #[test]
    fn test_widgets_contribute_no_text() {
        let spans = vec![
            RenderSpan::Widget(WidgetKind::Spinner),
            RenderSpan::text("ok"),
        ];
        assert_eq!(flatten_text(&spans), "ok");
    }
}
