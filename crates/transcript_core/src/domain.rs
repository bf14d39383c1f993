//! crates/transcript_core/src/domain.rs
//!
//! Defines the pure, core data structures of a chat transcript.
//! A transcript snapshot is a list of calendar-day sections, each holding the
//! rows (messages plus their derived display position) sent on that day.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

//=========================================================================================
// Messages
//=========================================================================================

/// A file or image attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    pub mime_type: String,
}

/// The original content of a message that failed to send, kept so it can be retried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draft {
    pub text: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// Delivery status of a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MessageStatus {
    Sending,
    Sent,
    Delivered,
    Read,
    Failed {
        #[serde(default)]
        draft: Option<Draft>,
    },
}

/// Two `Failed` statuses are always equal, whatever draft they carry.
///
/// Swapping the retry payload must not make a row look edited, so the draft
/// takes no part in equality.
impl PartialEq for MessageStatus {
    fn eq(&self, other: &Self) -> bool {
        matches!(
            (self, other),
            (Self::Sending, Self::Sending)
                | (Self::Sent, Self::Sent)
                | (Self::Delivered, Self::Delivered)
                | (Self::Read, Self::Read)
                | (Self::Failed { .. }, Self::Failed { .. })
        )
    }
}

impl Eq for MessageStatus {}

/// A single chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub text: String,
    pub status: MessageStatus,
    pub sent_at: DateTime<Utc>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

//=========================================================================================
// Rows and Sections
//=========================================================================================

/// Where an element sits inside a consecutive run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    First,
    Middle,
    Last,
    Single,
}

impl Position {
    /// Position of the element at `index` in a run of `len` elements.
    pub fn of(index: usize, len: usize) -> Self {
        match (index, len) {
            (_, 0 | 1) => Position::Single,
            (0, _) => Position::First,
            (i, n) if i + 1 == n => Position::Last,
            _ => Position::Middle,
        }
    }
}

/// One message plus its derived display-position metadata.
///
/// Row equality covers the id, both positions and the message content, so a
/// status change or a neighbour joining the sender's group both count as edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Row {
    pub id: String,
    pub message: Message,
    pub position_in_user_group: Position,
    pub position_in_section: Position,
}

impl Row {
    pub fn new(
        message: Message,
        position_in_user_group: Position,
        position_in_section: Position,
    ) -> Self {
        Self {
            id: message.id.clone(),
            message,
            position_in_user_group,
            position_in_section,
        }
    }
}

/// All messages sent on one calendar day, in chronological order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub date: NaiveDate,
    pub rows: Vec<Row>,
}

impl Section {
    pub fn new(date: NaiveDate, rows: Vec<Row>) -> Self {
        Self { date, rows }
    }
}

//=========================================================================================
// Transcript (a complete snapshot)
//=========================================================================================

/// Structural problems that make a snapshot unusable for reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TranscriptError {
    #[error("Duplicate section for date {0}")]
    DuplicateSection(NaiveDate),
    #[error("Duplicate row id {id} in section {date}")]
    DuplicateRow { date: NaiveDate, id: String },
}

/// A complete ordered view of all sections and rows at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    pub sections: Vec<Section>,
}

impl Transcript {
    pub fn new(sections: Vec<Section>) -> Self {
        Self { sections }
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn section_index(&self, date: NaiveDate) -> Option<usize> {
        self.sections.iter().position(|section| section.date == date)
    }

    pub fn section(&self, date: NaiveDate) -> Option<&Section> {
        self.sections.iter().find(|section| section.date == date)
    }

    /// Row ids in display order.
    pub fn ids(&self) -> Vec<&str> {
        self.sections
            .iter()
            .flat_map(|section| section.rows.iter().map(|row| row.id.as_str()))
            .collect()
    }

    pub fn row_count(&self) -> usize {
        self.sections.iter().map(|section| section.rows.len()).sum()
    }

    /// Checks the invariants the reconciler relies on: one section per date
    /// and unique row ids across the snapshot.
    pub fn validate(&self) -> Result<(), TranscriptError> {
        let mut dates = HashSet::new();
        let mut ids = HashSet::new();
        for section in &self.sections {
            if !dates.insert(section.date) {
                return Err(TranscriptError::DuplicateSection(section.date));
            }
            for row in &section.rows {
                if !ids.insert(row.id.as_str()) {
                    return Err(TranscriptError::DuplicateRow {
                        date: section.date,
                        id: row.id.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}
