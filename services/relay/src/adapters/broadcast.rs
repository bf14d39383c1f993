//! services/relay/src/adapters/broadcast.rs
//!
//! The `PlanRenderer` used by the relay: every applied plan is published on a
//! per-conversation broadcast channel that WebSocket connections subscribe to.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;
use transcript_core::ports::{AppliedPlan, PlanRenderer, PortResult};
use uuid::Uuid;

pub struct BroadcastRenderer {
    capacity: usize,
    channels: RwLock<HashMap<Uuid, broadcast::Sender<Arc<AppliedPlan>>>>,
}

impl BroadcastRenderer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Subscribes to the plans of one conversation.
    pub async fn subscribe(&self, conversation_id: Uuid) -> broadcast::Receiver<Arc<AppliedPlan>> {
        if let Some(sender) = self.channels.read().await.get(&conversation_id) {
            return sender.subscribe();
        }
        self.channels
            .write()
            .await
            .entry(conversation_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    pub async fn has_subscribers(&self, conversation_id: Uuid) -> bool {
        self.channels
            .read()
            .await
            .get(&conversation_id)
            .is_some_and(|sender| sender.receiver_count() > 0)
    }

    /// Drops the channel of a conversation nobody listens to anymore.
    /// Returns whether the channel is gone.
    pub async fn release(&self, conversation_id: Uuid) -> bool {
        let mut channels = self.channels.write().await;
        match channels.get(&conversation_id) {
            Some(sender) if sender.receiver_count() > 0 => false,
            Some(_) => {
                channels.remove(&conversation_id);
                true
            }
            None => true,
        }
    }

    /// Drops every channel; subscribers see their stream close.
    pub async fn close_all(&self) {
        self.channels.write().await.clear();
    }

    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }
}

#[async_trait]
impl PlanRenderer for BroadcastRenderer {
    async fn apply_plan(&self, conversation_id: Uuid, applied: &AppliedPlan) -> PortResult<()> {
        let channels = self.channels.read().await;
        let Some(sender) = channels.get(&conversation_id) else {
            debug!(%conversation_id, "No renderer subscribed, plan not published.");
            return Ok(());
        };
        // Having no live receivers is not an error: late subscribers start from a snapshot.
        let receivers = sender.send(Arc::new(applied.clone())).unwrap_or(0);
        debug!(%conversation_id, revision = applied.revision, receivers, "Plan published.");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use transcript_core::{ReconciliationPlan, Transcript};

    fn applied(revision: u64) -> AppliedPlan {
        AppliedPlan {
            revision,
            plan: ReconciliationPlan::default(),
            transcript: Transcript::default(),
        }
    }

    #[tokio::test]
    async fn subscribers_receive_plans_in_order() {
        let renderer = BroadcastRenderer::new(8);
        let conversation = Uuid::new_v4();
        let mut plans = renderer.subscribe(conversation).await;

        renderer.apply_plan(conversation, &applied(1)).await.unwrap();
        renderer.apply_plan(conversation, &applied(2)).await.unwrap();
        renderer.apply_plan(Uuid::new_v4(), &applied(9)).await.unwrap();

        assert_eq!(plans.recv().await.unwrap().revision, 1);
        assert_eq!(plans.recv().await.unwrap().revision, 2);
        assert!(plans.try_recv().is_err());
    }

    #[tokio::test]
    async fn channels_are_released_once_unsubscribed() {
        let renderer = BroadcastRenderer::new(8);
        let conversation = Uuid::new_v4();
        let plans = renderer.subscribe(conversation).await;

        assert!(renderer.has_subscribers(conversation).await);
        assert!(!renderer.release(conversation).await);
        assert_eq!(renderer.channel_count().await, 1);

        drop(plans);
        assert!(!renderer.has_subscribers(conversation).await);
        assert!(renderer.release(conversation).await);
        assert_eq!(renderer.channel_count().await, 0);
    }

    #[tokio::test]
    async fn close_all_ends_every_subscription() {
        let renderer = BroadcastRenderer::new(8);
        let mut plans = renderer.subscribe(Uuid::new_v4()).await;
        renderer.close_all().await;
        assert!(matches!(
            plans.recv().await,
            Err(broadcast::error::RecvError::Closed)
        ));
    }
}
