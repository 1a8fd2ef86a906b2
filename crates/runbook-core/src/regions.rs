//! Region discovery: one linear scan of the document's top-level blocks.
//!
//! A `Code` block roots a region; the immediately following `Result` block
//! attaches to it when strictly adjacent (no gap). Regions are identified
//! by their index in document order — identity across edits is inferred by
//! comparing consecutive scans, not stored. Two monotonic counters
//! summarize what changed between scans; consumers holding a stale pair
//! know exactly which cached artifact is still valid.

use crate::doc::{BlockKind, DocumentSnapshot, Position};

/// Position and size of one node, without its text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeSpan {
    pub pos: Position,
    pub size: usize,
}

impl NodeSpan {
    /// One past the last position of the node.
    pub fn end(&self) -> Position {
        self.pos + self.size
    }
}

/// A code block plus its optional adjacent result block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeRegion {
    pub code: NodeSpan,
    /// The code block's text content.
    pub code_text: String,
    /// Present iff a result node sits strictly adjacent after the code
    /// node: `result.pos == code.end()`.
    pub result: Option<NodeSpan>,
}

impl CodeRegion {
    /// One past the last position covered by the region (result included).
    pub fn end(&self) -> Position {
        self.result.map(|r| r.end()).unwrap_or_else(|| self.code.end())
    }
}

/// Ordered regions plus the two iteration counters.
///
/// `code_only_iteration` bumps only when some region's code text changes
/// (including regions appearing or disappearing); it invalidates parsed
/// artifacts and schedules re-execution. `code_or_positions_iteration`
/// bumps whenever that happens or any region moves, resizes, or gains or
/// loses a result node; it invalidates position-derived artifacts such as
/// decoration lists. The counters are independent change tokens, both
/// starting at 0 ("never computed").
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegionMap {
    pub regions: Vec<CodeRegion>,
    pub code_only_iteration: u64,
    pub code_or_positions_iteration: u64,
}

impl RegionMap {
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Scan a snapshot for code regions, without counters.
///
/// Orphaned result nodes — not strictly adjacent to a preceding code node,
/// or following a code node that already has a result — attach to nothing
/// and are invisible to the engine.
pub fn scan_regions(snapshot: &DocumentSnapshot) -> Vec<CodeRegion> {
    let mut regions: Vec<CodeRegion> = Vec::new();

    for block in &snapshot.blocks {
        match block.kind {
            BlockKind::Code => regions.push(CodeRegion {
                code: NodeSpan {
                    pos: block.pos,
                    size: block.size(),
                },
                code_text: block.text.clone(),
                result: None,
            }),
            BlockKind::Result => {
                if let Some(last) = regions.last_mut()
                    && last.result.is_none()
                    && last.code.end() == block.pos
                {
                    last.result = Some(NodeSpan {
                        pos: block.pos,
                        size: block.size(),
                    });
                }
            }
            BlockKind::Text => {}
        }
    }

    regions
}

/// Scan a snapshot and bump the iteration counters relative to `previous`.
///
/// Pure: identical snapshots with an identical previous map always yield
/// identical output.
pub fn find_code_regions(snapshot: &DocumentSnapshot, previous: &RegionMap) -> RegionMap {
    let regions = scan_regions(snapshot);

    let code_changed = regions.len() != previous.regions.len()
        || regions
            .iter()
            .zip(&previous.regions)
            .any(|(a, b)| a.code_text != b.code_text);

    let positions_changed = code_changed
        || regions
            .iter()
            .zip(&previous.regions)
            .any(|(a, b)| a.code != b.code || a.result != b.result);

    RegionMap {
        regions,
        code_only_iteration: previous.code_only_iteration + u64::from(code_changed),
        code_or_positions_iteration: previous.code_or_positions_iteration
            + u64::from(positions_changed),
    }
}
