//! services/relay/src/adapters/memory.rs
//!
//! An in-memory message store, the concrete implementation of the
//! `TranscriptSource` port used by the relay.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use transcript_core::ports::{PortError, PortResult, TranscriptSource};
use transcript_core::{Message, MessageStatus};
use uuid::Uuid;

/// Messages of every conversation, kept in insertion order.
#[derive(Default)]
pub struct InMemoryMessageStore {
    conversations: RwLock<HashMap<Uuid, Vec<Message>>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a message. Ids are unique per conversation.
    pub async fn insert_message(&self, conversation_id: Uuid, message: Message) -> PortResult<()> {
        let mut conversations = self.conversations.write().await;
        let messages = conversations.entry(conversation_id).or_default();
        if messages.iter().any(|m| m.id == message.id) {
            return Err(PortError::Invalid(format!(
                "message {} already exists",
                message.id
            )));
        }
        messages.push(message);
        Ok(())
    }

    /// Replaces the status of a message and returns the updated message.
    pub async fn update_status(
        &self,
        conversation_id: Uuid,
        message_id: &str,
        status: MessageStatus,
    ) -> PortResult<Message> {
        let mut conversations = self.conversations.write().await;
        let message = find_mut(&mut conversations, conversation_id, message_id)?;
        message.status = status;
        Ok(message.clone())
    }

    /// Swaps the temporary client id of an optimistically sent message for the
    /// id the server assigned, and marks it sent.
    pub async fn confirm_send(
        &self,
        conversation_id: Uuid,
        temporary_id: &str,
        server_id: &str,
    ) -> PortResult<Message> {
        let mut conversations = self.conversations.write().await;
        let taken = conversations
            .get(&conversation_id)
            .is_some_and(|messages| messages.iter().any(|m| m.id == server_id));
        if taken {
            return Err(PortError::Invalid(format!(
                "message {} already exists",
                server_id
            )));
        }

        let message = find_mut(&mut conversations, conversation_id, temporary_id)?;
        message.id = server_id.to_string();
        message.status = MessageStatus::Sent;
        Ok(message.clone())
    }

    pub async fn messages(&self, conversation_id: Uuid) -> Vec<Message> {
        self.conversations
            .read()
            .await
            .get(&conversation_id)
            .cloned()
            .unwrap_or_default()
    }
}

fn find_mut<'a>(
    conversations: &'a mut HashMap<Uuid, Vec<Message>>,
    conversation_id: Uuid,
    message_id: &str,
) -> PortResult<&'a mut Message> {
    conversations
        .get_mut(&conversation_id)
        .and_then(|messages| messages.iter_mut().find(|m| m.id == message_id))
        .ok_or_else(|| PortError::NotFound(format!("message {}", message_id)))
}

#[async_trait]
impl TranscriptSource for InMemoryMessageStore {
    async fn fetch_messages(&self, conversation_id: Uuid) -> PortResult<Vec<Message>> {
        Ok(self.messages(conversation_id).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn message(id: &str) -> Message {
        Message {
            id: id.to_string(),
            sender_id: "alice".to_string(),
            text: "hello".to_string(),
            status: MessageStatus::Sending,
            sent_at: Utc::now(),
            attachments: Vec::new(),
        }
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected() {
        let store = InMemoryMessageStore::new();
        let conversation = Uuid::new_v4();
        store.insert_message(conversation, message("m1")).await.unwrap();

        let err = store.insert_message(conversation, message("m1")).await.unwrap_err();
        assert!(matches!(err, PortError::Invalid(_)));

        // The same id is fine in another conversation.
        store.insert_message(Uuid::new_v4(), message("m1")).await.unwrap();
    }

    #[tokio::test]
    async fn confirm_send_swaps_the_id() {
        let store = InMemoryMessageStore::new();
        let conversation = Uuid::new_v4();
        store.insert_message(conversation, message("tmp-1")).await.unwrap();

        let confirmed = store.confirm_send(conversation, "tmp-1", "srv-1").await.unwrap();
        assert_eq!(confirmed.id, "srv-1");
        assert_eq!(confirmed.status, MessageStatus::Sent);

        let ids: Vec<_> = store
            .fetch_messages(conversation)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec!["srv-1"]);

        let err = store.confirm_send(conversation, "tmp-1", "srv-2").await.unwrap_err();
        assert!(matches!(err, PortError::NotFound(_)));
    }

    #[tokio::test]
    async fn update_status_of_unknown_message_is_not_found() {
        let store = InMemoryMessageStore::new();
        let err = store
            .update_status(Uuid::new_v4(), "nope", MessageStatus::Read)
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::NotFound(_)));
    }
}
