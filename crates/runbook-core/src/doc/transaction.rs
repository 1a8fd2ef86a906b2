//! Edit transactions: ordered steps, position mapping, metadata flags.
//!
//! A transaction is an atomic unit: either every step applies or none does.
//! Steps are expressed in the coordinates produced by the steps before them,
//! so callers composing multi-region edits map positions through the
//! transaction with [`Transaction::map_pos`] before pushing further steps.

use super::{BlockKind, Position};

/// A single edit step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Replace the range `[from, to)` with `text`. Covers insertion
    /// (`from == to`) and deletion (`text.is_empty()`). The only step kind
    /// the edit guard inspects.
    Replace {
        from: Position,
        to: Position,
        text: String,
    },

    /// Insert a fresh block node at a block boundary. Issued by the engine
    /// when a code region has no result node yet.
    InsertNode {
        at: Position,
        kind: BlockKind,
        text: String,
    },
}

impl Step {
    /// Net change in document size produced by this step.
    pub fn delta(&self) -> isize {
        match self {
            Step::Replace { from, to, text } => text.len() as isize - (to - from) as isize,
            Step::InsertNode { text, .. } => (text.len() + 2) as isize,
        }
    }

    /// Map a position in this step's input coordinates to its output
    /// coordinates. Positions inside a replaced range collapse to the range
    /// start.
    pub fn map_pos(&self, pos: Position) -> Position {
        match self {
            Step::Replace { from, to, text } => {
                if pos <= *from {
                    pos
                } else if pos >= *to {
                    pos + text.len() - (to - from)
                } else {
                    *from
                }
            }
            Step::InsertNode { at, text, .. } => {
                if pos < *at {
                    pos
                } else {
                    pos + text.len() + 2
                }
            }
        }
    }
}

/// An ordered sequence of steps plus metadata flags.
#[derive(Debug, Clone, Default)]
pub struct Transaction {
    pub steps: Vec<Step>,

    /// Set on engine write-backs: bypasses the edit guard and is excluded
    /// from undo history. The undo stack reflects user intent only.
    pub system_write: bool,

    /// Whether the host records this transaction for undo.
    pub add_to_history: bool,
}

impl Transaction {
    /// A user-originated transaction: guarded, recorded for undo.
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            system_write: false,
            add_to_history: true,
        }
    }

    /// An engine write-back: unguarded, invisible to undo.
    pub fn system() -> Self {
        Self {
            steps: Vec::new(),
            system_write: true,
            add_to_history: false,
        }
    }

    /// Append a replace step. Positions are in the coordinates after the
    /// steps already present.
    pub fn replace(&mut self, from: Position, to: Position, text: impl Into<String>) -> &mut Self {
        self.steps.push(Step::Replace {
            from,
            to,
            text: text.into(),
        });
        self
    }

    /// Append a node-insertion step.
    pub fn insert_node(
        &mut self,
        at: Position,
        kind: BlockKind,
        text: impl Into<String>,
    ) -> &mut Self {
        self.steps.push(Step::InsertNode {
            at,
            kind,
            text: text.into(),
        });
        self
    }

    /// Map a pre-transaction position through every step currently in the
    /// transaction.
    pub fn map_pos(&self, pos: Position) -> Position {
        self.steps.iter().fold(pos, |p, step| step.map_pos(p))
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
