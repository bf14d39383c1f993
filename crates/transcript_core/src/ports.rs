//! crates/transcript_core/src/ports.rs
//!
//! Defines the service contracts (traits) around the reconciler.
//! The reconciler itself never fetches or renders anything: a source supplies
//! the messages a snapshot is built from and a renderer consumes the plans.

use async_trait::async_trait;
use uuid::Uuid;
use crate::domain::{Message, Transcript};
use crate::reconcile::ReconciliationPlan;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., network, storage).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Invalid request: {0}")]
    Invalid(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// A plan together with the snapshot it leads to, as handed to a renderer.
#[derive(Debug, Clone)]
pub struct AppliedPlan {
    /// Position of this plan in the conversation's sequence of applied plans.
    pub revision: u64,
    pub plan: ReconciliationPlan,
    pub transcript: Transcript,
}

#[async_trait]
pub trait TranscriptSource: Send + Sync {
    /// Fetches every message of a conversation, in no particular order.
    async fn fetch_messages(&self, conversation_id: Uuid) -> PortResult<Vec<Message>>;
}

#[async_trait]
pub trait PlanRenderer: Send + Sync {
    /// Applies a plan to the rendered transcript. Returns once the plan is fully applied.
    async fn apply_plan(&self, conversation_id: Uuid, applied: &AppliedPlan) -> PortResult<()>;
}
