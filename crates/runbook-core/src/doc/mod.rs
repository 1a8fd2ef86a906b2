//! Document-model collaborator contract.
//!
//! The engine does not own a rich-text document; it consumes a narrow
//! contract: an ordered sequence of block nodes with positions and sizes in
//! a linearized coordinate space, an edit/transaction abstraction with
//! position mapping and metadata flags, and a filter hook consulted before
//! a transaction commits. [`document::InMemoryDocument`] is a minimal
//! reference host implementing that contract for tests and embedding; a
//! real editor replaces it at this seam.

pub mod document;
pub mod history;
pub mod transaction;

pub use document::{DispatchOutcome, InMemoryDocument, TransactionFilter};
pub use transaction::{Step, Transaction};

/// Offset into the linearized document. Stable only until the next edit.
pub type Position = usize;

/// Node-type discrimination for top-level blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// Executable code block; roots a region.
    Code,
    /// Generated result block; attaches to the immediately preceding code
    /// block when strictly adjacent.
    Result,
    /// Any other block (prose). Invisible to the engine.
    Text,
}

/// A top-level block node in the linearized document.
///
/// A node occupies `text.len() + 2` positions: an opening token, the
/// content, and a closing token. Content therefore lives in
/// `[pos + 1, pos + 1 + text.len())`. Blocks tile the document
/// contiguously from position 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockNode {
    pub kind: BlockKind,
    pub pos: Position,
    pub text: String,
}

impl BlockNode {
    /// Total number of positions this node occupies.
    pub fn size(&self) -> usize {
        self.text.len() + 2
    }

    /// One past the last position of this node.
    pub fn end(&self) -> Position {
        self.pos + self.size()
    }

    /// First position of the node's content.
    pub fn content_start(&self) -> Position {
        self.pos + 1
    }

    /// One past the last position of the node's content.
    pub fn content_end(&self) -> Position {
        self.pos + 1 + self.text.len()
    }
}

/// An immutable view of the document's top-level blocks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentSnapshot {
    pub blocks: Vec<BlockNode>,
}

impl DocumentSnapshot {
    /// Build a snapshot from `(kind, text)` pairs, assigning positions.
    pub fn from_blocks<I, S>(blocks: I) -> Self
    where
        I: IntoIterator<Item = (BlockKind, S)>,
        S: Into<String>,
    {
        let mut pos = 0;
        let blocks = blocks
            .into_iter()
            .map(|(kind, text)| {
                let node = BlockNode {
                    kind,
                    pos,
                    text: text.into(),
                };
                pos = node.end();
                node
            })
            .collect();
        Self { blocks }
    }

    /// The block starting exactly at `pos`, if any.
    pub fn block_at(&self, pos: Position) -> Option<&BlockNode> {
        self.blocks.iter().find(|b| b.pos == pos)
    }

    /// Total size of the document in positions.
    pub fn size(&self) -> usize {
        self.blocks.last().map(BlockNode::end).unwrap_or(0)
    }
}
