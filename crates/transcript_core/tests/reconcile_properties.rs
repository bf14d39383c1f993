//! Behavioural tests for `reconcile` + `apply_plan` over whole transcripts.
//!
//! - hand-built snapshots pin the exact plan for the basic change shapes
//! - grouped snapshots check what a real message feed produces
//! - generated histories check that every plan replays to the new snapshot

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, TimeZone, Utc};
use pretty_assertions::assert_eq;
use rand::{rngs::StdRng, Rng, SeedableRng};
use transcript_core::{
    apply_deletions, apply_moves_and_edits, apply_plan, group_messages, reconcile, Message,
    MessageStatus, Operation, Position, Row, Section, Transcript,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn utc() -> FixedOffset {
    FixedOffset::east_opt(0).unwrap()
}

fn at(day: u32, minute: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, day, 0, 0, 0).unwrap() + Duration::minutes(minute)
}

fn message(id: &str, sender: &str, sent_at: DateTime<Utc>) -> Message {
    Message {
        id: id.to_string(),
        sender_id: sender.to_string(),
        text: format!("body of {id}"),
        status: MessageStatus::Sent,
        sent_at,
        attachments: Vec::new(),
    }
}

fn fixed_row(id: &str, text: &str) -> Row {
    let mut message = message(id, "alice", at(1, 0));
    message.text = text.to_string();
    Row::new(message, Position::Middle, Position::Middle)
}

fn one_section(rows: Vec<Row>) -> Transcript {
    Transcript::new(vec![Section::new(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(), rows)])
}

fn assert_round_trip(old: &Transcript, new: &Transcript) {
    let plan = reconcile(old, new);
    let after_deletions = apply_deletions(old, &plan).expect("deletions apply");
    assert_eq!(after_deletions, plan.after_deletions);
    let before_insertions =
        apply_moves_and_edits(&after_deletions, &plan, new).expect("moves and edits apply");
    assert_eq!(before_insertions, plan.before_insertions);
    assert_eq!(&apply_plan(old, &plan, new).expect("plan applies"), new);
}

// ---------------------------------------------------------------------------
// Basic change shapes on hand-built rows
// ---------------------------------------------------------------------------

#[test]
fn same_snapshot_is_a_no_op() {
    let snapshot = one_section(vec![fixed_row("m1", "hi"), fixed_row("m2", "there")]);
    assert!(reconcile(&snapshot, &snapshot).is_empty());
}

#[test]
fn appended_row_is_one_insert() {
    let old = one_section(vec![fixed_row("m1", "hi"), fixed_row("m2", "there")]);
    let mut new = old.clone();
    new.sections[0].rows.push(fixed_row("m3", "again"));

    let plan = reconcile(&old, &new);
    assert_eq!(plan.operations, vec![Operation::InsertRow { section: 0, row: 2 }]);
    assert_round_trip(&old, &new);
}

#[test]
fn removed_row_is_one_delete() {
    let old = one_section(vec![
        fixed_row("m1", "a"),
        fixed_row("m2", "b"),
        fixed_row("m3", "c"),
    ]);
    let mut new = old.clone();
    new.sections[0].rows.remove(1);

    let plan = reconcile(&old, &new);
    assert_eq!(plan.operations, vec![Operation::DeleteRow { section: 0, row: 1 }]);
    assert_round_trip(&old, &new);
}

#[test]
fn status_change_is_one_edit() {
    let old = one_section(vec![fixed_row("m1", "a"), fixed_row("m2", "b")]);
    let mut new = old.clone();
    new.sections[0].rows[1].message.status = MessageStatus::Read;

    let plan = reconcile(&old, &new);
    assert_eq!(plan.operations, vec![Operation::EditRow { section: 0, row: 1 }]);
    assert_round_trip(&old, &new);
}

#[test]
fn swapped_rows_are_one_move() {
    let old = one_section(vec![fixed_row("m1", "hi"), fixed_row("m2", "there")]);
    let new = one_section(vec![fixed_row("m2", "there"), fixed_row("m1", "hi")]);

    let plan = reconcile(&old, &new);
    assert_eq!(
        plan.operations,
        vec![Operation::MoveRow {
            section: 0,
            from: 0,
            to: 1
        }]
    );
    assert_round_trip(&old, &new);
}

#[test]
fn adjacent_swap_in_a_longer_section_is_one_move() {
    let ids = ["a", "b", "c", "d", "e"];
    let old = one_section(ids.iter().map(|id| fixed_row(id, id)).collect());
    let new = one_section(
        ["a", "b", "d", "c", "e"]
            .iter()
            .map(|id| fixed_row(id, id))
            .collect(),
    );

    let plan = reconcile(&old, &new);
    assert_eq!(plan.summary().rows_moved, 1);
    assert_eq!(plan.len(), 1);
    assert_round_trip(&old, &new);
}

// ---------------------------------------------------------------------------
// Snapshots built from a message feed
// ---------------------------------------------------------------------------

#[test]
fn message_on_a_new_day_only_inserts_that_section() {
    let mut messages = vec![
        message("m1", "alice", at(1, 10)),
        message("m2", "bob", at(1, 20)),
    ];
    let old = group_messages(&messages, utc());
    messages.push(message("m3", "alice", at(2, 5)));
    let new = group_messages(&messages, utc());

    let plan = reconcile(&old, &new);
    assert_eq!(plan.operations, vec![Operation::InsertSection { index: 0 }]);
    assert_eq!(new.sections[0].rows[0].id, "m3");
    assert_round_trip(&old, &new);
}

#[test]
fn appending_to_a_sender_run_also_reshapes_the_previous_tail() {
    let mut messages = vec![
        message("m1", "alice", at(1, 10)),
        message("m2", "alice", at(1, 11)),
    ];
    let old = group_messages(&messages, utc());
    messages.push(message("m3", "alice", at(1, 12)));
    let new = group_messages(&messages, utc());

    let plan = reconcile(&old, &new);
    assert_eq!(
        plan.operations,
        vec![
            Operation::InsertRow { section: 0, row: 2 },
            Operation::EditRow { section: 0, row: 1 },
        ]
    );
    assert_round_trip(&old, &new);
}

#[test]
fn confirming_a_send_with_a_server_id_replaces_the_row() {
    let mut messages = vec![message("m1", "bob", at(1, 1))];
    let mut pending = message("tmp-1", "alice", at(1, 2));
    pending.status = MessageStatus::Sending;
    messages.push(pending);
    let old = group_messages(&messages, utc());

    messages[1].id = "srv-42".to_string();
    messages[1].status = MessageStatus::Sent;
    let new = group_messages(&messages, utc());

    let plan = reconcile(&old, &new);
    assert_eq!(
        plan.operations,
        vec![
            Operation::DeleteRow { section: 0, row: 1 },
            Operation::InsertRow { section: 0, row: 1 },
        ]
    );
    assert_round_trip(&old, &new);
}

#[test]
fn clearing_the_transcript_deletes_every_section() {
    let messages = vec![
        message("m1", "alice", at(1, 1)),
        message("m2", "alice", at(2, 1)),
        message("m3", "alice", at(3, 1)),
    ];
    let old = group_messages(&messages, utc());
    let plan = reconcile(&old, &Transcript::default());
    assert_eq!(plan.summary().sections_deleted, 3);
    assert!(plan.after_deletions.is_empty());
    assert_round_trip(&old, &Transcript::default());
}

// ---------------------------------------------------------------------------
// Generated histories
// ---------------------------------------------------------------------------

fn random_history(rng: &mut StdRng, next_id: &mut usize) -> Vec<Message> {
    let count: usize = rng.gen_range(0..12);
    (0..count)
        .map(|_| random_message(rng, next_id))
        .collect()
}

fn random_message(rng: &mut StdRng, next_id: &mut usize) -> Message {
    *next_id += 1;
    let sender = if rng.gen_bool(0.5) { "alice" } else { "bob" };
    let day = rng.gen_range(1..=4);
    message(&format!("m{next_id}"), sender, at(day, rng.gen_range(0..600)))
}

fn mutate(rng: &mut StdRng, next_id: &mut usize, messages: &[Message]) -> Vec<Message> {
    let mut out = Vec::new();
    for message in messages {
        match rng.gen_range(0..6) {
            0 => {}
            1 => {
                let mut edited = message.clone();
                edited.status = MessageStatus::Read;
                out.push(edited);
            }
            2 => {
                let mut moved = message.clone();
                let midnight = moved.sent_at.date_naive().and_hms_opt(0, 0, 0).unwrap();
                moved.sent_at =
                    Utc.from_utc_datetime(&midnight) + Duration::minutes(rng.gen_range(0..600));
                out.push(moved);
            }
            _ => out.push(message.clone()),
        }
    }
    for _ in 0..rng.gen_range(0..4) {
        out.push(random_message(rng, next_id));
    }
    out
}

#[test]
fn generated_histories_round_trip() {
    let mut rng = StdRng::seed_from_u64(0x9E37_79B9_7F4A_7C15);
    let mut next_id = 0;

    for _ in 0..500 {
        let before = random_history(&mut rng, &mut next_id);
        let after = mutate(&mut rng, &mut next_id, &before);
        let old = group_messages(&before, utc());
        let new = group_messages(&after, utc());

        assert_round_trip(&old, &new);
        assert!(reconcile(&new, &new).is_empty());
    }
}
