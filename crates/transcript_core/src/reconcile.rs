//! crates/transcript_core/src/reconcile.rs
//!
//! Computes the structural operations that turn one transcript snapshot into
//! another.
//!
//! A plan is applied in three phases so that no index is invalidated by an
//! earlier structural change:
//!
//! 1. deletions (`DeleteSection`, then `DeleteRow`), each index valid against
//!    the list as left by the preceding deletes;
//! 2. moves and edits, against the post-deletion list of common sections;
//! 3. insertions (`InsertSection`, then `InsertRow`), indexed against the
//!    final snapshot.
//!
//! The plan carries the snapshot after phase 1 and the snapshot after phase 2
//! so a renderer can swap its backing data between phases.
//!
//! Both snapshots are expected to uphold the `Transcript::validate` invariants
//! and to order their sections the same way. With duplicate row ids every
//! lookup resolves to the first match and the resulting plan is meaningless.

use crate::domain::{Row, Section, Transcript};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

//=========================================================================================
// Operations and Plans
//=========================================================================================

/// A single structural change to the rendered transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Remove a whole day, index valid after the preceding section deletes.
    DeleteSection { index: usize },
    /// Add a whole day with all of its rows, index in the new snapshot.
    InsertSection { index: usize },
    /// Remove a row from a common section.
    DeleteRow { section: usize, row: usize },
    /// Add a row to a section, both indices in the new snapshot.
    InsertRow { section: usize, row: usize },
    /// Remove the row at `from` and reinsert it at `to` within one section.
    MoveRow {
        section: usize,
        from: usize,
        to: usize,
    },
    /// Refresh a row in place; its identity and position are unchanged.
    EditRow { section: usize, row: usize },
}

impl Operation {
    /// Whether this operation changes the shape of the list (everything but edits).
    pub fn is_structural(&self) -> bool {
        !matches!(self, Operation::EditRow { .. })
    }
}

/// Number of operations of each kind in a plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub sections_deleted: usize,
    pub sections_inserted: usize,
    pub rows_deleted: usize,
    pub rows_inserted: usize,
    pub rows_moved: usize,
    pub rows_edited: usize,
}

/// The ordered result of a reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationPlan {
    /// Operations in application order.
    pub operations: Vec<Operation>,
    /// The old snapshot with every deletion applied.
    pub after_deletions: Transcript,
    /// The snapshot after deletions, moves and edits, before any insertion.
    pub before_insertions: Transcript,
}

impl ReconciliationPlan {
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary::default();
        for op in &self.operations {
            match op {
                Operation::DeleteSection { .. } => summary.sections_deleted += 1,
                Operation::InsertSection { .. } => summary.sections_inserted += 1,
                Operation::DeleteRow { .. } => summary.rows_deleted += 1,
                Operation::InsertRow { .. } => summary.rows_inserted += 1,
                Operation::MoveRow { .. } => summary.rows_moved += 1,
                Operation::EditRow { .. } => summary.rows_edited += 1,
            }
        }
        summary
    }
}

//=========================================================================================
// Reconciliation
//=========================================================================================

#[derive(Default)]
struct PlanBuilder {
    section_deletes: Vec<Operation>,
    section_inserts: Vec<Operation>,
    row_deletes: Vec<Operation>,
    row_inserts: Vec<Operation>,
    moves: Vec<Operation>,
    edits: Vec<Operation>,
}

impl PlanBuilder {
    fn into_operations(self) -> Vec<Operation> {
        let mut operations = self.section_deletes;
        operations.extend(self.section_inserts);
        operations.extend(self.row_deletes);
        operations.extend(self.row_inserts);
        operations.extend(self.moves);
        operations.extend(self.edits);
        operations
    }
}

/// Computes the plan that transforms `old` into `new`.
///
/// Dates are visited newest first, which fixes the order of operations of the
/// same kind. The function is pure and never fails.
pub fn reconcile(old: &Transcript, new: &Transcript) -> ReconciliationPlan {
    let mut dates: Vec<NaiveDate> = old
        .sections
        .iter()
        .chain(new.sections.iter())
        .map(|section| section.date)
        .collect();
    dates.sort_unstable_by(|a, b| b.cmp(a));
    dates.dedup();

    let mut builder = PlanBuilder::default();

    // --- Phase 1: whole sections ---
    let mut working_old: Vec<&Section> = old.sections.iter().collect();
    let mut common_dates = Vec::new();
    for &date in &dates {
        let old_index = working_old.iter().position(|section| section.date == date);
        match (old_index, new.section_index(date)) {
            (Some(index), None) => {
                builder.section_deletes.push(Operation::DeleteSection { index });
                working_old.remove(index);
            }
            (None, Some(index)) => {
                builder.section_inserts.push(Operation::InsertSection { index });
            }
            (Some(_), Some(_)) => common_dates.push(date),
            (None, None) => {}
        }
    }

    // --- Phases 2 and 3: rows of every common section ---
    let mut after_deletions = vec![None; working_old.len()];
    let mut before_insertions = vec![None; working_old.len()];
    for date in common_dates {
        let Some(section) = working_old.iter().position(|s| s.date == date) else {
            continue;
        };
        let Some(new_section_index) = new.section_index(date) else {
            continue;
        };
        let new_section = &new.sections[new_section_index];

        let diff = diff_rows(
            &working_old[section].rows,
            &new_section.rows,
            section,
            new_section_index,
            &mut builder,
        );
        after_deletions[section] = Some(Section::new(date, diff.after_deletions));
        before_insertions[section] = Some(Section::new(date, diff.before_insertions));
    }

    let plan = ReconciliationPlan {
        operations: builder.into_operations(),
        after_deletions: Transcript::new(after_deletions.into_iter().flatten().collect()),
        before_insertions: Transcript::new(before_insertions.into_iter().flatten().collect()),
    };

    debug!(summary = ?plan.summary(), "reconciled transcript");
    plan
}

struct RowDiff {
    after_deletions: Vec<Row>,
    before_insertions: Vec<Row>,
}

fn diff_rows(
    old_rows: &[Row],
    new_rows: &[Row],
    section: usize,
    new_section: usize,
    builder: &mut PlanBuilder,
) -> RowDiff {
    let old_ids: HashSet<&str> = old_rows.iter().map(|row| row.id.as_str()).collect();
    let new_ids: HashSet<&str> = new_rows.iter().map(|row| row.id.as_str()).collect();

    // Deletes run back to front, so each row is still at its original index
    // when it is removed.
    for (index, row) in old_rows.iter().enumerate().rev() {
        if !new_ids.contains(row.id.as_str()) {
            builder.row_deletes.push(Operation::DeleteRow { section, row: index });
        }
    }
    let working_old: Vec<&Row> = old_rows
        .iter()
        .filter(|row| new_ids.contains(row.id.as_str()))
        .collect();

    // Inserts point into the final rows; the working copy keeps only common rows.
    let mut working_new: Vec<&Row> = Vec::with_capacity(new_rows.len());
    for (index, row) in new_rows.iter().enumerate() {
        if old_ids.contains(row.id.as_str()) {
            working_new.push(row);
        } else {
            builder.row_inserts.push(Operation::InsertRow {
                section: new_section,
                row: index,
            });
        }
    }

    push_moves(&working_old, &working_new, section, builder);

    let old_by_id: HashMap<&str, &Row> = working_old
        .iter()
        .map(|row| (row.id.as_str(), *row))
        .collect();
    for (index, row) in working_new.iter().enumerate() {
        if old_by_id.get(row.id.as_str()).is_some_and(|old| *old != *row) {
            builder.edits.push(Operation::EditRow { section, row: index });
        }
    }

    RowDiff {
        after_deletions: working_old.into_iter().cloned().collect(),
        before_insertions: working_new.into_iter().cloned().collect(),
    }
}

/// Emits the moves that put the common rows into their new order.
///
/// Rows on a longest run that already appears in increasing new order stay
/// where they are; each other row is moved once, directly behind its new
/// predecessor, so the move count is minimal. Moves are sequential
/// remove-then-insert steps.
///
/// Each move searches the working order, so this is O(n * k) for n common
/// rows and k moved rows. A single edit or swap keeps k small.
fn push_moves(old_rows: &[&Row], new_rows: &[&Row], section: usize, builder: &mut PlanBuilder) {
    let new_index: HashMap<&str, usize> = new_rows
        .iter()
        .enumerate()
        .map(|(index, row)| (row.id.as_str(), index))
        .collect();
    let targets: Vec<usize> = old_rows
        .iter()
        .filter_map(|row| new_index.get(row.id.as_str()).copied())
        .collect();
    if targets.len() != old_rows.len() || targets.windows(2).all(|w| w[0] < w[1]) {
        return;
    }

    let stable: HashSet<usize> = longest_increasing_subsequence(&targets)
        .into_iter()
        .map(|i| targets[i])
        .collect();

    let mut current: Vec<&str> = old_rows.iter().map(|row| row.id.as_str()).collect();
    for (target, row) in new_rows.iter().enumerate() {
        if stable.contains(&target) {
            continue;
        }
        let Some(from) = current.iter().position(|id| *id == row.id) else {
            continue;
        };
        let id = current.remove(from);
        let to = match target.checked_sub(1) {
            Some(previous) => current
                .iter()
                .position(|id| *id == new_rows[previous].id)
                .map_or(0, |index| index + 1),
            None => 0,
        };
        current.insert(to, id);
        if from != to {
            builder.moves.push(Operation::MoveRow { section, from, to });
        }
    }
}

/// Indices into `values` of one longest strictly increasing subsequence.
fn longest_increasing_subsequence(values: &[usize]) -> Vec<usize> {
    let mut tails: Vec<usize> = Vec::new();
    let mut previous: Vec<Option<usize>> = vec![None; values.len()];

    for (i, &value) in values.iter().enumerate() {
        let slot = tails.partition_point(|&t| values[t] < value);
        previous[i] = slot.checked_sub(1).map(|s| tails[s]);
        if slot == tails.len() {
            tails.push(i);
        } else {
            tails[slot] = i;
        }
    }

    let mut sequence = Vec::with_capacity(tails.len());
    let mut cursor = tails.last().copied();
    while let Some(i) = cursor {
        sequence.push(i);
        cursor = previous[i];
    }
    sequence.reverse();
    sequence
}
