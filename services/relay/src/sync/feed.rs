//! services/relay/src/sync/feed.rs
//!
//! Folds a conversation's message feed into full transcript snapshots.
//!
//! Every change (a realtime insert, a local send, a status update) triggers a
//! refresh: the messages are refetched from the source, regrouped into day
//! sections and queued for reconciliation. A failed fetch is recorded as the
//! feed's state and never reaches the reconciler, so the last accepted
//! snapshot stays authoritative.

use crate::sync::queue::{Accepted, QueueError, ReconcileQueue};
use chrono::FixedOffset;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};
use transcript_core::{group_messages, AppliedPlan, PortError, TranscriptSource};
use uuid::Uuid;

/// The outcome of the latest refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum FeedState {
    /// Nothing has been fetched yet.
    Idle,
    /// The latest refresh was applied at this revision.
    Current { revision: u64 },
    /// The latest refresh failed; the previous snapshot is still shown.
    Failed { reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("Fetching messages failed: {0}")]
    Fetch(#[from] PortError),
    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// The snapshot pipeline of one conversation.
pub struct TranscriptFeed {
    conversation_id: Uuid,
    source: Arc<dyn TranscriptSource>,
    queue: ReconcileQueue,
    day_offset: FixedOffset,
    state: RwLock<FeedState>,
    /// Serializes fetch + enqueue so an older fetch is never queued after a newer one.
    refresh_lock: Mutex<()>,
}

impl TranscriptFeed {
    pub fn new(
        conversation_id: Uuid,
        source: Arc<dyn TranscriptSource>,
        queue: ReconcileQueue,
        day_offset: FixedOffset,
    ) -> Self {
        Self {
            conversation_id,
            source,
            queue,
            day_offset,
            state: RwLock::new(FeedState::Idle),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn conversation_id(&self) -> Uuid {
        self.conversation_id
    }

    pub async fn state(&self) -> FeedState {
        self.state.read().await.clone()
    }

    /// The snapshot the renderers currently show.
    pub fn accepted(&self) -> Accepted {
        self.queue.accepted()
    }

    /// Refetches the conversation and waits for the resulting plan to be applied.
    pub async fn refresh(&self) -> Result<AppliedPlan, FeedError> {
        let pending = {
            let _guard = self.refresh_lock.lock().await;

            let messages = match self.source.fetch_messages(self.conversation_id).await {
                Ok(messages) => messages,
                Err(e) => {
                    warn!(conversation_id = %self.conversation_id, "Fetch failed, keeping the last snapshot: {}", e);
                    self.set_state(FeedState::Failed {
                        reason: e.to_string(),
                    })
                    .await;
                    return Err(e.into());
                }
            };

            let snapshot = group_messages(&messages, self.day_offset);
            match self.queue.enqueue(snapshot).await {
                Ok(pending) => pending,
                Err(e) => {
                    self.fail(&e).await;
                    return Err(e.into());
                }
            }
        };

        match pending.wait().await {
            Ok(applied) => {
                info!(
                    conversation_id = %self.conversation_id,
                    revision = applied.revision,
                    operations = applied.plan.len(),
                    "Transcript refreshed."
                );
                self.record_applied(applied.revision).await;
                Ok(applied)
            }
            Err(e) => {
                self.fail(&e).await;
                Err(e.into())
            }
        }
    }

    async fn fail(&self, error: &QueueError) {
        warn!(conversation_id = %self.conversation_id, "Reconciliation failed: {}", error);
        self.set_state(FeedState::Failed {
            reason: error.to_string(),
        })
        .await;
    }

    /// Concurrent refreshes can finish out of order; the reported revision
    /// never goes backwards.
    async fn record_applied(&self, revision: u64) {
        let mut state = self.state.write().await;
        if let FeedState::Current { revision: recorded } = *state {
            if recorded > revision {
                return;
            }
        }
        *state = FeedState::Current { revision };
    }

    /// Stops the reconcile worker once its current job is done.
    pub fn shutdown(&self) {
        self.queue.shutdown();
    }

    async fn set_state(&self, state: FeedState) {
        *self.state.write().await = state;
    }
}
