//! Error types for runbook-core.

use thiserror::Error;

/// Result type for runbook-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in runbook-core.
///
/// Region-level failures (analysis producing no artifact, a sandboxed run
/// rejecting) are not errors at this level: they are recorded in the
/// per-region execution state and the pass continues. This enum covers
/// genuine API misuse against the document host.
#[derive(Debug, Error)]
pub enum Error {
    /// A transaction step addressed positions the document cannot edit.
    #[error("invalid step: {0}")]
    InvalidStep(String),

    /// A position fell inside a multi-byte character.
    #[error("position {0} is not on a character boundary")]
    NotCharBoundary(usize),

    /// A node insertion point was not a block boundary.
    #[error("position {0} is not a block boundary")]
    NotBlockBoundary(usize),
}
