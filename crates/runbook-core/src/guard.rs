//! Edit guard: protects generated result regions from destructive edits.
//!
//! Consulted with each candidate transaction before it commits. Engine
//! write-backs carry the system flag and pass unconditionally; for
//! everything else, each replace step is classified against the ordered
//! region list and the whole transaction is rejected — fail closed, a
//! transaction is atomic — if the step significantly overlaps any result
//! span. Code spans may always be edited.

use tracing::debug;

use crate::doc::transaction::{Step, Transaction};
use crate::doc::{DocumentSnapshot, Position};
use crate::regions::{scan_regions, CodeRegion, NodeSpan};

/// How a replace step lies relative to one region's code+result span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlapClass {
    /// Entirely outside the region.
    Outside,
    /// Wholly inside the region.
    Inside,
    /// Starts inside the region's span, ends after it.
    Leading,
    /// Starts before the region, ends inside it.
    Trailing,
    /// Fully spans the region.
    SpansWhole,
}

/// Overlap of a step with one node span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpanOverlap {
    pub pos: Position,
    pub size: usize,
    /// Covers more than two-thirds of the node, or at least 3 positions
    /// outright. Trivial boundary nudges stay insignificant.
    pub significant: bool,
}

/// Overlap of `[from, to)` with the node `span`, if any.
///
/// A zero-width insertion strictly inside the node counts as a (zero-size,
/// insignificant) overlap; an insertion exactly at the node's boundary does
/// not touch it at all.
pub fn span_overlap(from: Position, to: Position, span: NodeSpan) -> Option<SpanOverlap> {
    let common_pos = from.max(span.pos);
    let common_end = to.min(span.end());

    let inside_insertion = from == to && from > span.pos && from < span.end();
    if common_end > common_pos || inside_insertion {
        let size = common_end.saturating_sub(common_pos);
        Some(SpanOverlap {
            pos: common_pos,
            size,
            significant: size * 3 > span.size * 2 || size >= 3,
        })
    } else {
        None
    }
}

/// Classify how `[from, to)` lies relative to `region`.
pub fn classify_step(from: Position, to: Position, region: &CodeRegion) -> OverlapClass {
    let start = region.code.pos;
    let end = region.end();

    if to < start || from > end {
        return OverlapClass::Outside;
    }
    if from > start {
        if to < end {
            OverlapClass::Inside
        } else {
            OverlapClass::Leading
        }
    } else if to >= end {
        OverlapClass::SpansWhole
    } else {
        OverlapClass::Trailing
    }
}

/// Decide whether a transaction may commit against the current regions.
///
/// Rejection drops the whole transaction; nothing is partially applied and
/// nothing is surfaced to the user beyond the edit having no effect.
pub fn should_allow(tr: &Transaction, regions: &[CodeRegion]) -> bool {
    if tr.system_write {
        return true;
    }

    for step in &tr.steps {
        let Step::Replace { from, to, .. } = step else {
            continue;
        };

        for region in regions {
            // regions are ordered; nothing further back can overlap
            if region.code.pos > *to {
                break;
            }
            if *from > region.end() {
                continue;
            }

            let Some(result) = region.result else {
                continue;
            };
            if let Some(overlap) = span_overlap(*from, *to, result)
                && overlap.significant
            {
                debug!(
                    from,
                    to,
                    class = ?classify_step(*from, *to, region),
                    overlap = overlap.size,
                    result_size = result.size,
                    "rejecting transaction: significant result overlap"
                );
                return false;
            }
        }
    }

    true
}

/// A transaction filter enforcing the guard, deriving regions from the
/// document snapshot on each call.
pub fn guard_filter() -> crate::doc::TransactionFilter {
    Box::new(|tr: &Transaction, snapshot: &DocumentSnapshot| {
        should_allow(tr, &scan_regions(snapshot))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc::BlockKind;

    /// code "abcde" at 0..7, result "0123456789" at 7..19
    fn region_with_result() -> Vec<CodeRegion> {
        let snapshot = DocumentSnapshot::from_blocks([
            (BlockKind::Code, "abcde"),
            (BlockKind::Result, "0123456789"),
        ]);
        scan_regions(&snapshot)
    }

    fn user_replace(from: Position, to: Position) -> Transaction {
        let mut tr = Transaction::new();
        tr.replace(from, to, "");
        tr
    }

    #[test]
    fn test_edit_inside_code_always_allowed() {
        let regions = region_with_result();
        // entire code content replaced: still fine, code is the user's
        assert!(should_allow(&user_replace(1, 6), &regions));
    }

    #[test]
    fn test_large_result_overlap_rejects() {
        let regions = region_with_result();
        // covers 9 of 12 result positions: well past two-thirds
        assert!(!should_allow(&user_replace(9, 18), &regions));
    }

    #[test]
    fn test_three_positions_reject_outright() {
        let regions = region_with_result();
        assert!(!should_allow(&user_replace(9, 12), &regions));
    }

    #[test]
    fn test_small_nudge_allowed() {
        let regions = region_with_result();
        // two positions into a 12-position result: insignificant
        assert!(should_allow(&user_replace(8, 10), &regions));
    }

    #[test]
    fn test_boundary_insertion_allowed() {
        let regions = region_with_result();
        let mut tr = Transaction::new();
        tr.replace(7, 7, "x");
        assert!(should_allow(&tr, &regions));
    }

    #[test]
    fn test_system_write_always_allowed() {
        let regions = region_with_result();
        let mut tr = Transaction::system();
        tr.replace(8, 18, "rewritten");
        assert!(should_allow(&tr, &regions));
    }

    #[test]
    fn test_spanning_region_without_result_allowed() {
        let snapshot = DocumentSnapshot::from_blocks([(BlockKind::Code, "abc")]);
        let regions = scan_regions(&snapshot);
        assert!(should_allow(&user_replace(0, 5), &regions));
    }

    #[test]
    fn test_leading_overlap_into_result_rejects() {
        let regions = region_with_result();
        // starts in code, runs over the whole result and past the region
        assert!(!should_allow(&user_replace(3, 25), &regions));
    }

    #[test]
    fn test_classification() {
        let regions = region_with_result();
        let region = &regions[0];
        assert_eq!(classify_step(20, 25, region), OverlapClass::Outside);
        assert_eq!(classify_step(2, 10, region), OverlapClass::Inside);
        assert_eq!(classify_step(2, 25, region), OverlapClass::Leading);
        assert_eq!(classify_step(0, 10, region), OverlapClass::Trailing);
        assert_eq!(classify_step(0, 19, region), OverlapClass::SpansWhole);
    }

    #[test]
    fn test_rejection_is_atomic_across_steps() {
        let regions = region_with_result();
        let mut tr = Transaction::new();
        tr.replace(2, 3, "z"); // harmless code edit
        tr.replace(8, 18, ""); // destroys most of the result
        assert!(!should_allow(&tr, &regions));
    }
}
