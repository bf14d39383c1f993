pub mod apply;
pub mod domain;
pub mod grouping;
pub mod ports;
pub mod reconcile;

pub use apply::{apply_deletions, apply_insertions, apply_moves_and_edits, apply_plan, ApplyError};
pub use domain::{
    Attachment, Draft, Message, MessageStatus, Position, Row, Section, Transcript, TranscriptError,
};
pub use grouping::group_messages;
pub use ports::{AppliedPlan, PlanRenderer, PortError, PortResult, TranscriptSource};
pub use reconcile::{reconcile, Operation, PlanSummary, ReconciliationPlan};
