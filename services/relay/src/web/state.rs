//! services/relay/src/web/state.rs
//!
//! Defines the relay's shared state and the per-conversation feeds.

use crate::adapters::{BroadcastRenderer, InMemoryMessageStore};
use crate::config::Config;
use crate::sync::{ReconcileQueue, TranscriptFeed};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<InMemoryMessageStore>,
    pub renderer: Arc<BroadcastRenderer>,
    feeds: Arc<RwLock<HashMap<Uuid, Arc<TranscriptFeed>>>>,
    /// Parent of every reconcile worker's token.
    cancellation_token: CancellationToken,
}

impl AppState {
    pub fn new(config: Arc<Config>) -> Self {
        let renderer = Arc::new(BroadcastRenderer::new(config.plan_channel_capacity));
        Self {
            config,
            store: Arc::new(InMemoryMessageStore::new()),
            renderer,
            feeds: Arc::new(RwLock::new(HashMap::new())),
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Returns the feed of a conversation, starting its reconcile worker on first use.
    pub async fn feed(&self, conversation_id: Uuid) -> Arc<TranscriptFeed> {
        if let Some(feed) = self.feeds.read().await.get(&conversation_id) {
            return feed.clone();
        }

        let mut feeds = self.feeds.write().await;
        feeds
            .entry(conversation_id)
            .or_insert_with(|| {
                info!(%conversation_id, "Starting transcript feed.");
                let queue = ReconcileQueue::spawn(
                    conversation_id,
                    self.renderer.clone(),
                    self.cancellation_token.child_token(),
                );
                Arc::new(TranscriptFeed::new(
                    conversation_id,
                    self.store.clone(),
                    queue,
                    self.config.day_offset,
                ))
            })
            .clone()
    }

    /// The feed of a conversation if one is already running.
    pub async fn existing_feed(&self, conversation_id: Uuid) -> Option<Arc<TranscriptFeed>> {
        self.feeds.read().await.get(&conversation_id).cloned()
    }

    pub async fn feed_count(&self) -> usize {
        self.feeds.read().await.len()
    }

    /// Called when a caller is done with a conversation. A feed with nothing
    /// accepted, no renderer subscribed and no other holder is stopped and
    /// removed; the plan channel goes once it has no receivers.
    pub async fn release(&self, conversation_id: Uuid) {
        let mut feeds = self.feeds.write().await;
        if self.renderer.has_subscribers(conversation_id).await {
            return;
        }

        let evict = feeds.get(&conversation_id).is_some_and(|feed| {
            Arc::strong_count(feed) == 1 && feed.accepted().transcript.is_empty()
        });
        if evict {
            if let Some(feed) = feeds.remove(&conversation_id) {
                feed.shutdown();
            }
        }
        let channel_released = self.renderer.release(conversation_id).await;
        debug!(
            %conversation_id,
            evicted = evict,
            channel_released,
            feeds = feeds.len(),
            "Released conversation."
        );
    }

    /// Stops every reconcile worker after its current job and closes the
    /// renderer channels.
    pub async fn shutdown(&self) {
        self.cancellation_token.cancel();
        self.feeds.write().await.clear();
        self.renderer.close_all().await;
    }
}
