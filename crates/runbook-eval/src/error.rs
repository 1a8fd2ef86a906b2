//! Error types for runbook-eval.

use thiserror::Error;

/// Result type for evaluation operations.
pub type EvalResult<T> = std::result::Result<T, EvalError>;

/// Errors produced while parsing or evaluating a code block.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EvalError {
    /// The block's source failed to parse.
    #[error("parse error: {0}")]
    Parse(String),

    /// A variable was read before any block bound it.
    #[error("unknown variable `{0}`")]
    UnknownVariable(String),

    /// A call named a function that does not exist.
    #[error("unknown function `{0}`")]
    UnknownFunction(String),

    /// An operator was applied to operands it does not support.
    #[error("type error: {0}")]
    Type(String),

    /// Division or remainder by zero.
    #[error("division by zero")]
    DivisionByZero,

    /// A `throw` statement ran.
    #[error("thrown: {0}")]
    Thrown(String),
}
