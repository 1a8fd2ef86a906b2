//! In-memory reference document host.
//!
//! Implements the collaborator contract the engine consumes: ordered block
//! storage, atomic transaction application with a filter chain, and undo
//! history that excludes system writes. A real editor host replaces this
//! type; the engine only relies on the behavior specified here.

use tracing::debug;

use crate::error::{Error, Result};

use super::history::History;
use super::transaction::{Step, Transaction};
use super::{BlockKind, DocumentSnapshot, Position};

/// A filter consulted with each candidate transaction before it commits.
/// Returning `false` drops the whole transaction.
pub type TransactionFilter = Box<dyn Fn(&Transaction, &DocumentSnapshot) -> bool + Send + Sync>;

/// Outcome of dispatching a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// All steps applied.
    Applied,
    /// A filter vetoed the transaction; the document is unchanged.
    Rejected,
}

struct StoredBlock {
    kind: BlockKind,
    text: String,
}

/// A minimal in-memory document of top-level blocks.
pub struct InMemoryDocument {
    blocks: Vec<StoredBlock>,
    filters: Vec<TransactionFilter>,
    history: History,
    /// Count of applied transactions that contained at least one step.
    version: u64,
}

impl Default for InMemoryDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDocument {
    pub fn new() -> Self {
        Self {
            blocks: Vec::new(),
            filters: Vec::new(),
            history: History::new(),
            version: 0,
        }
    }

    /// Build a document from `(kind, text)` pairs.
    pub fn from_blocks<I, S>(blocks: I) -> Self
    where
        I: IntoIterator<Item = (BlockKind, S)>,
        S: Into<String>,
    {
        let mut doc = Self::new();
        for (kind, text) in blocks {
            doc.blocks.push(StoredBlock {
                kind,
                text: text.into(),
            });
        }
        doc
    }

    /// Register a transaction filter. Filters run in registration order for
    /// every transaction, including system writes (a filter decides for
    /// itself whether the system flag bypasses it).
    pub fn add_filter(&mut self, filter: TransactionFilter) {
        self.filters.push(filter);
    }

    /// Snapshot the current blocks with assigned positions.
    pub fn snapshot(&self) -> DocumentSnapshot {
        DocumentSnapshot::from_blocks(self.blocks.iter().map(|b| (b.kind, b.text.clone())))
    }

    /// Number of applied doc-changing transactions.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Number of undoable entries currently recorded.
    pub fn undo_depth(&self) -> usize {
        self.history.len()
    }

    /// Apply a transaction atomically.
    ///
    /// Filters are consulted first; any veto drops the whole transaction.
    /// A step failure rolls back the steps already applied and returns the
    /// error, leaving the document as it was.
    pub fn apply(&mut self, tr: &Transaction) -> Result<DispatchOutcome> {
        let snapshot = self.snapshot();
        for filter in &self.filters {
            if !filter(tr, &snapshot) {
                debug!("transaction vetoed by filter");
                return Ok(DispatchOutcome::Rejected);
            }
        }

        let mut inverses: Vec<Vec<Step>> = Vec::with_capacity(tr.steps.len());
        for step in &tr.steps {
            match self.apply_step(step) {
                Ok(inverse) => inverses.push(inverse),
                Err(e) => {
                    for inverse in inverses.iter().rev().flatten() {
                        // Inverses of well-applied steps always re-apply.
                        let _ = self.apply_step(inverse);
                    }
                    return Err(e);
                }
            }
        }

        if !tr.steps.is_empty() {
            self.version += 1;
            if tr.add_to_history && !tr.system_write {
                let mut flat: Vec<Step> = inverses.into_iter().rev().flatten().collect();
                flat.shrink_to_fit();
                self.history.record(flat);
            }
        }

        Ok(DispatchOutcome::Applied)
    }

    /// Pop the most recent undo entry as a ready-to-dispatch transaction.
    ///
    /// The entry is removed; if the resulting transaction is subsequently
    /// rejected, push it back with [`InMemoryDocument::restore_undo`].
    pub fn pop_undo(&mut self) -> Option<Transaction> {
        let steps = self.history.pop()?;
        Some(Transaction {
            steps,
            system_write: false,
            add_to_history: false,
        })
    }

    /// Return an undo entry taken with [`InMemoryDocument::pop_undo`].
    pub fn restore_undo(&mut self, tr: Transaction) {
        self.history.restore(tr.steps);
    }

    /// Apply one step, returning the steps that invert it.
    fn apply_step(&mut self, step: &Step) -> Result<Vec<Step>> {
        match step {
            Step::Replace { from, to, text } => self.apply_replace(*from, *to, text),
            Step::InsertNode { at, kind, text } => self.apply_insert_node(*at, *kind, text),
        }
    }

    fn apply_replace(&mut self, from: Position, to: Position, text: &str) -> Result<Vec<Step>> {
        if to < from {
            return Err(Error::InvalidStep(format!("inverted range {from}..{to}")));
        }
        let snapshot = self.snapshot();

        // Content edit within a single block.
        if let Some((index, block)) = snapshot
            .blocks
            .iter()
            .enumerate()
            .find(|(_, b)| from >= b.content_start() && to <= b.content_end())
        {
            let start = from - block.content_start();
            let end = to - block.content_start();
            let stored = &mut self.blocks[index].text;
            if !stored.is_char_boundary(start) {
                return Err(Error::NotCharBoundary(from));
            }
            if !stored.is_char_boundary(end) {
                return Err(Error::NotCharBoundary(to));
            }
            let removed = stored[start..end].to_string();
            stored.replace_range(start..end, text);
            return Ok(vec![Step::Replace {
                from,
                to: from + text.len(),
                text: removed,
            }]);
        }

        // Deletion of one or more whole blocks.
        let first = snapshot.blocks.iter().position(|b| b.pos == from);
        let last = snapshot.blocks.iter().position(|b| b.end() == to);
        if let (Some(first), Some(last)) = (first, last) {
            if first <= last && text.is_empty() {
                let removed: Vec<StoredBlock> = self.blocks.drain(first..=last).collect();
                // Re-inserting at the same boundary in reverse order
                // restores the original sequence.
                return Ok(removed
                    .into_iter()
                    .rev()
                    .map(|b| Step::InsertNode {
                        at: from,
                        kind: b.kind,
                        text: b.text,
                    })
                    .collect());
            }
        }

        Err(Error::InvalidStep(format!(
            "range {from}..{to} is neither within one block's content nor a whole-block range"
        )))
    }

    fn apply_insert_node(&mut self, at: Position, kind: BlockKind, text: &str) -> Result<Vec<Step>> {
        let snapshot = self.snapshot();
        let index = if at == snapshot.size() {
            self.blocks.len()
        } else {
            snapshot
                .blocks
                .iter()
                .position(|b| b.pos == at)
                .ok_or(Error::NotBlockBoundary(at))?
        };

        self.blocks.insert(
            index,
            StoredBlock {
                kind,
                text: text.to_string(),
            },
        );
        Ok(vec![Step::Replace {
            from: at,
            to: at + text.len() + 2,
            text: String::new(),
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> InMemoryDocument {
        InMemoryDocument::from_blocks([
            (BlockKind::Text, "intro"),
            (BlockKind::Code, "1+1"),
            (BlockKind::Result, "2"),
        ])
    }

    fn texts(doc: &InMemoryDocument) -> Vec<String> {
        doc.snapshot().blocks.iter().map(|b| b.text.clone()).collect()
    }

    #[test]
    fn test_content_replace() {
        let mut doc = sample();
        // code block content starts at 7 + 1
        let mut tr = Transaction::new();
        tr.replace(8, 11, "2*3");
        assert_eq!(doc.apply(&tr).unwrap(), DispatchOutcome::Applied);
        assert_eq!(texts(&doc)[1], "2*3");
        assert_eq!(doc.version(), 1);
    }

    #[test]
    fn test_insert_node_at_boundary() {
        let mut doc = InMemoryDocument::from_blocks([(BlockKind::Code, "1+1")]);
        let mut tr = Transaction::system();
        tr.insert_node(5, BlockKind::Result, "2");
        doc.apply(&tr).unwrap();

        let snapshot = doc.snapshot();
        assert_eq!(snapshot.blocks.len(), 2);
        assert_eq!(snapshot.blocks[1].kind, BlockKind::Result);
        assert_eq!(snapshot.blocks[1].pos, 5);
    }

    #[test]
    fn test_whole_block_deletion_and_undo() {
        let mut doc = sample();
        let result_pos = doc.snapshot().blocks[2].pos;
        let result_end = doc.snapshot().blocks[2].end();

        let mut tr = Transaction::new();
        tr.replace(result_pos, result_end, "");
        doc.apply(&tr).unwrap();
        assert_eq!(doc.snapshot().blocks.len(), 2);

        let undo = doc.pop_undo().expect("undo entry recorded");
        doc.apply(&undo).unwrap();
        assert_eq!(texts(&doc), vec!["intro", "1+1", "2"]);
    }

    #[test]
    fn test_system_writes_skip_history() {
        let mut doc = sample();
        let mut tr = Transaction::system();
        tr.replace(8, 11, "9");
        doc.apply(&tr).unwrap();
        assert_eq!(doc.undo_depth(), 0);

        let mut user = Transaction::new();
        user.replace(8, 9, "7");
        doc.apply(&user).unwrap();
        assert_eq!(doc.undo_depth(), 1);
    }

    #[test]
    fn test_filter_veto_drops_whole_transaction() {
        let mut doc = sample();
        doc.add_filter(Box::new(|tr, _| tr.system_write));

        let mut tr = Transaction::new();
        tr.replace(8, 11, "oops");
        assert_eq!(doc.apply(&tr).unwrap(), DispatchOutcome::Rejected);
        assert_eq!(texts(&doc)[1], "1+1");
        assert_eq!(doc.version(), 0);
    }

    #[test]
    fn test_failed_step_rolls_back() {
        let mut doc = sample();
        let mut tr = Transaction::new();
        tr.replace(8, 9, "x");
        // second step straddles a node boundary: invalid for this host
        tr.replace(3, 20, "y");
        assert!(doc.apply(&tr).is_err());
        assert_eq!(texts(&doc)[1], "1+1");
    }

    #[test]
    fn test_empty_transaction_does_not_bump_version() {
        let mut doc = sample();
        doc.apply(&Transaction::system()).unwrap();
        assert_eq!(doc.version(), 0);
    }
}
