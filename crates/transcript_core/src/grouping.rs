//! crates/transcript_core/src/grouping.rs
//!
//! Turns a flat list of messages into a transcript snapshot: one section per
//! calendar day, newest day first, with the derived row positions filled in.

use crate::domain::{Message, Position, Row, Section, Transcript};
use chrono::{FixedOffset, NaiveDate};
use std::collections::BTreeMap;

/// Groups `messages` into day sections using the calendar of `offset`.
///
/// Sections come out newest day first; rows within a section are
/// chronological, keeping the input order for equal timestamps.
pub fn group_messages(messages: &[Message], offset: FixedOffset) -> Transcript {
    let mut days: BTreeMap<NaiveDate, Vec<&Message>> = BTreeMap::new();
    for message in messages {
        let day = message.sent_at.with_timezone(&offset).date_naive();
        days.entry(day).or_default().push(message);
    }

    let sections = days
        .into_iter()
        .rev()
        .map(|(date, mut day_messages)| {
            day_messages.sort_by_key(|message| message.sent_at);
            Section::new(date, build_rows(&day_messages))
        })
        .collect();

    Transcript::new(sections)
}

/// Derives both positions for every message of one day.
fn build_rows(messages: &[&Message]) -> Vec<Row> {
    let len = messages.len();
    let mut rows = Vec::with_capacity(len);
    let mut run_start = 0;

    while run_start < len {
        let sender = &messages[run_start].sender_id;
        let run_len = messages[run_start..]
            .iter()
            .take_while(|message| &message.sender_id == sender)
            .count();

        for offset in 0..run_len {
            let index = run_start + offset;
            rows.push(Row::new(
                messages[index].clone(),
                Position::of(offset, run_len),
                Position::of(index, len),
            ));
        }
        run_start += run_len;
    }

    rows
}
