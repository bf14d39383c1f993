//! crates/transcript_core/src/apply.rs
//!
//! Replays a `ReconciliationPlan` against a snapshot, phase by phase.
//! Renderers that keep their own copy of the rows use these to stay in step
//! with the operations they animate.

use crate::domain::{Row, Transcript};
use crate::reconcile::{Operation, ReconciliationPlan};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApplyError {
    #[error("Operation {0:?} is out of range for the current snapshot")]
    OutOfRange(Operation),
    #[error("Row {0} is missing from the target snapshot")]
    MissingRow(String),
}

/// Applies every `DeleteSection` and `DeleteRow` of the plan, in order.
pub fn apply_deletions(
    old: &Transcript,
    plan: &ReconciliationPlan,
) -> Result<Transcript, ApplyError> {
    let mut sections = old.sections.clone();
    for op in &plan.operations {
        match *op {
            Operation::DeleteSection { index } => {
                if index >= sections.len() {
                    return Err(ApplyError::OutOfRange(*op));
                }
                sections.remove(index);
            }
            Operation::DeleteRow { section, row } => {
                let rows = sections
                    .get_mut(section)
                    .map(|s| &mut s.rows)
                    .filter(|rows| row < rows.len())
                    .ok_or(ApplyError::OutOfRange(*op))?;
                rows.remove(row);
            }
            _ => {}
        }
    }
    Ok(Transcript::new(sections))
}

/// Applies moves and then edits to the post-deletion snapshot. Edited rows
/// take their content from `new`.
pub fn apply_moves_and_edits(
    after_deletions: &Transcript,
    plan: &ReconciliationPlan,
    new: &Transcript,
) -> Result<Transcript, ApplyError> {
    let mut sections = after_deletions.sections.clone();
    for op in &plan.operations {
        match *op {
            Operation::MoveRow { section, from, to } => {
                let rows = sections
                    .get_mut(section)
                    .map(|s| &mut s.rows)
                    .filter(|rows| from < rows.len() && to < rows.len())
                    .ok_or(ApplyError::OutOfRange(*op))?;
                let moved = rows.remove(from);
                rows.insert(to, moved);
            }
            Operation::EditRow { section, row } => {
                let target = sections
                    .get_mut(section)
                    .ok_or(ApplyError::OutOfRange(*op))?;
                let date = target.date;
                let slot = target.rows.get_mut(row).ok_or(ApplyError::OutOfRange(*op))?;
                *slot = find_row(new, date, &slot.id)?.clone();
            }
            _ => {}
        }
    }
    Ok(Transcript::new(sections))
}

/// Applies section inserts and then row inserts, taking content from `new`.
pub fn apply_insertions(
    before_insertions: &Transcript,
    plan: &ReconciliationPlan,
    new: &Transcript,
) -> Result<Transcript, ApplyError> {
    let mut sections = before_insertions.sections.clone();

    let mut section_inserts: Vec<usize> = plan
        .operations
        .iter()
        .filter_map(|op| match op {
            Operation::InsertSection { index } => Some(*index),
            _ => None,
        })
        .collect();
    section_inserts.sort_unstable();
    for index in section_inserts {
        let op = Operation::InsertSection { index };
        let inserted = new.sections.get(index).ok_or(ApplyError::OutOfRange(op))?;
        if index > sections.len() {
            return Err(ApplyError::OutOfRange(op));
        }
        sections.insert(index, inserted.clone());
    }

    let mut row_inserts: Vec<(usize, usize)> = plan
        .operations
        .iter()
        .filter_map(|op| match op {
            Operation::InsertRow { section, row } => Some((*section, *row)),
            _ => None,
        })
        .collect();
    row_inserts.sort_unstable();
    for (section, row) in row_inserts {
        let op = Operation::InsertRow { section, row };
        let inserted = new
            .sections
            .get(section)
            .and_then(|s| s.rows.get(row))
            .ok_or(ApplyError::OutOfRange(op))?;
        let rows = sections
            .get_mut(section)
            .map(|s| &mut s.rows)
            .filter(|rows| row <= rows.len())
            .ok_or(ApplyError::OutOfRange(op))?;
        rows.insert(row, inserted.clone());
    }

    Ok(Transcript::new(sections))
}

/// Replays the whole plan: deletions, then moves and edits, then insertions.
pub fn apply_plan(
    old: &Transcript,
    plan: &ReconciliationPlan,
    new: &Transcript,
) -> Result<Transcript, ApplyError> {
    let after_deletions = apply_deletions(old, plan)?;
    let before_insertions = apply_moves_and_edits(&after_deletions, plan, new)?;
    apply_insertions(&before_insertions, plan, new)
}

fn find_row<'a>(
    transcript: &'a Transcript,
    date: chrono::NaiveDate,
    id: &str,
) -> Result<&'a Row, ApplyError> {
    transcript
        .section(date)
        .and_then(|section| section.rows.iter().find(|row| row.id == id))
        .ok_or_else(|| ApplyError::MissingRow(id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Message, MessageStatus, Position, Section};
    use crate::reconcile::reconcile;
    use chrono::{NaiveDate, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn section(d: u32, ids: &[&str]) -> Section {
        let rows = ids
            .iter()
            .map(|id| {
                Row::new(
                    Message {
                        id: id.to_string(),
                        sender_id: "bob".to_string(),
                        text: id.to_string(),
                        status: MessageStatus::Delivered,
                        sent_at: Utc.with_ymd_and_hms(2024, 5, d, 8, 0, 0).unwrap(),
                        attachments: Vec::new(),
                    },
                    Position::Single,
                    Position::Single,
                )
            })
            .collect();
        Section::new(NaiveDate::from_ymd_opt(2024, 5, d).unwrap(), rows)
    }

    #[test]
    fn phases_match_the_plan_snapshots() {
        let old = Transcript::new(vec![
            section(4, &["d1", "d2"]),
            section(3, &["c1", "c2", "c3", "c4"]),
            section(1, &["a1"]),
        ]);
        let mut new = Transcript::new(vec![
            section(5, &["e1"]),
            section(3, &["c4", "c2", "n1", "c1"]),
            section(2, &["b1", "b2"]),
        ]);
        new.sections[1].rows[1].message.text = "edited".to_string();

        let plan = reconcile(&old, &new);
        let after_deletions = apply_deletions(&old, &plan).unwrap();
        assert_eq!(after_deletions, plan.after_deletions);
        let before_insertions = apply_moves_and_edits(&after_deletions, &plan, &new).unwrap();
        assert_eq!(before_insertions, plan.before_insertions);
        assert_eq!(apply_insertions(&before_insertions, &plan, &new).unwrap(), new);
    }

    #[test]
    fn out_of_range_operations_are_reported() {
        let old = Transcript::new(vec![section(1, &["a"])]);
        let plan = ReconciliationPlan {
            operations: vec![Operation::DeleteRow { section: 0, row: 3 }],
            ..ReconciliationPlan::default()
        };
        assert_eq!(
            apply_deletions(&old, &plan),
            Err(ApplyError::OutOfRange(Operation::DeleteRow { section: 0, row: 3 }))
        );
    }

    #[test]
    fn edits_need_the_row_in_the_target() {
        let old = Transcript::new(vec![section(1, &["a"])]);
        let plan = ReconciliationPlan {
            operations: vec![Operation::EditRow { section: 0, row: 0 }],
            ..ReconciliationPlan::default()
        };
        assert_eq!(
            apply_moves_and_edits(&old, &plan, &Transcript::default()),
            Err(ApplyError::MissingRow("a".to_string()))
        );
    }
}
