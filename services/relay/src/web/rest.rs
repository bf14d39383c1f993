//! services/relay/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.
//!
//! Every handler that changes a conversation's messages refreshes its feed, so
//! the change reaches connected renderers as a plan before the response is sent.

use crate::sync::{FeedState, TranscriptFeed};
use crate::web::state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, warn};
use transcript_core::{Attachment, Draft, Message, MessageStatus, PortError, Transcript};
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        health_handler,
        get_transcript_handler,
        create_message_handler,
        update_status_handler,
        confirm_send_handler,
    ),
    components(
        schemas(
            HealthResponse,
            TranscriptResponse,
            NewMessageRequest,
            StatusUpdateRequest,
            ConfirmSendRequest,
            MessageResponse,
            MessageBody,
            AttachmentBody,
            DraftBody,
            StatusKind,
        )
    ),
    tags(
        (name = "Transcript Relay API", description = "Message feed and transcript reconciliation endpoints.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    status: String,
}

/// Delivery status as exchanged over HTTP.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    Sending,
    Sent,
    Delivered,
    Read,
    Failed,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct AttachmentBody {
    pub url: String,
    pub mime_type: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct DraftBody {
    pub text: String,
    #[serde(default)]
    pub attachments: Vec<AttachmentBody>,
}

/// A message to add to a conversation. Omitting `id` marks an optimistic local
/// send: the relay assigns a temporary id and the `sending` status.
#[derive(Deserialize, ToSchema, Debug)]
pub struct NewMessageRequest {
    pub id: Option<String>,
    pub sender_id: String,
    pub text: String,
    pub status: Option<StatusKind>,
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attachments: Vec<AttachmentBody>,
}

#[derive(Deserialize, ToSchema, Debug)]
pub struct StatusUpdateRequest {
    pub status: StatusKind,
    /// Only kept for `failed`: the content to offer for retry.
    pub draft: Option<DraftBody>,
}

#[derive(Deserialize, ToSchema, Debug)]
pub struct ConfirmSendRequest {
    pub server_id: String,
}

#[derive(Serialize, ToSchema, Debug, Clone)]
pub struct MessageBody {
    pub id: String,
    pub sender_id: String,
    pub text: String,
    pub status: StatusKind,
    pub sent_at: DateTime<Utc>,
    pub attachments: Vec<AttachmentBody>,
}

/// The stored message and the revision its change was applied at. `revision` is
/// absent when the change could not be reconciled; the transcript then keeps
/// showing the previous snapshot.
#[derive(Serialize, ToSchema, Debug)]
pub struct MessageResponse {
    pub message: MessageBody,
    pub revision: Option<u64>,
}

#[derive(Serialize, ToSchema)]
pub struct TranscriptResponse {
    conversation_id: Uuid,
    revision: u64,
    #[schema(value_type = Object)]
    state: FeedState,
    #[schema(value_type = Object)]
    transcript: Transcript,
}

//=========================================================================================
// Conversions
//=========================================================================================

impl From<AttachmentBody> for Attachment {
    fn from(body: AttachmentBody) -> Self {
        Attachment {
            url: body.url,
            mime_type: body.mime_type,
        }
    }
}

impl From<&Attachment> for AttachmentBody {
    fn from(attachment: &Attachment) -> Self {
        AttachmentBody {
            url: attachment.url.clone(),
            mime_type: attachment.mime_type.clone(),
        }
    }
}

impl StatusKind {
    fn into_status(self, draft: Option<DraftBody>) -> MessageStatus {
        match self {
            StatusKind::Sending => MessageStatus::Sending,
            StatusKind::Sent => MessageStatus::Sent,
            StatusKind::Delivered => MessageStatus::Delivered,
            StatusKind::Read => MessageStatus::Read,
            StatusKind::Failed => MessageStatus::Failed {
                draft: draft.map(|d| Draft {
                    text: d.text,
                    attachments: d.attachments.into_iter().map(Attachment::from).collect(),
                }),
            },
        }
    }
}

impl From<&MessageStatus> for StatusKind {
    fn from(status: &MessageStatus) -> Self {
        match status {
            MessageStatus::Sending => StatusKind::Sending,
            MessageStatus::Sent => StatusKind::Sent,
            MessageStatus::Delivered => StatusKind::Delivered,
            MessageStatus::Read => StatusKind::Read,
            MessageStatus::Failed { .. } => StatusKind::Failed,
        }
    }
}

impl From<&Message> for MessageBody {
    fn from(message: &Message) -> Self {
        MessageBody {
            id: message.id.clone(),
            sender_id: message.sender_id.clone(),
            text: message.text.clone(),
            status: StatusKind::from(&message.status),
            sent_at: message.sent_at,
            attachments: message.attachments.iter().map(AttachmentBody::from).collect(),
        }
    }
}

impl NewMessageRequest {
    fn into_message(self) -> Message {
        Message {
            id: self
                .id
                .unwrap_or_else(|| format!("tmp-{}", Uuid::new_v4())),
            sender_id: self.sender_id,
            text: self.text,
            status: self.status.unwrap_or(StatusKind::Sending).into_status(None),
            sent_at: self.sent_at.unwrap_or_else(Utc::now),
            attachments: self.attachments.into_iter().map(Attachment::from).collect(),
        }
    }
}

fn port_error_response(e: PortError) -> (StatusCode, String) {
    match e {
        PortError::NotFound(what) => (StatusCode::NOT_FOUND, format!("Not found: {}", what)),
        PortError::Invalid(reason) => (StatusCode::CONFLICT, reason),
        PortError::Unexpected(reason) => {
            error!("Unexpected store error: {}", reason);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            )
        }
    }
}

/// Refreshes the feed after a change, reporting the applied revision if any.
async fn refresh_after_change(feed: &TranscriptFeed) -> Option<u64> {
    match feed.refresh().await {
        Ok(applied) => Some(applied.revision),
        Err(e) => {
            warn!(conversation_id = %feed.conversation_id(), "Change stored but not reconciled: {}", e);
            None
        }
    }
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Liveness check.
#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "The relay is up", body = HealthResponse))
)]
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// The transcript renderers of this conversation currently show.
///
/// Reading never starts a feed: a conversation without one is reported as an
/// idle, empty transcript at revision 0.
#[utoipa::path(
    get,
    path = "/conversations/{conversation_id}/transcript",
    responses((status = 200, description = "Current accepted snapshot", body = TranscriptResponse)),
    params(("conversation_id" = Uuid, Path, description = "The conversation to read."))
)]
pub async fn get_transcript_handler(
    State(app_state): State<Arc<AppState>>,
    Path(conversation_id): Path<Uuid>,
) -> Json<TranscriptResponse> {
    let Some(feed) = app_state.existing_feed(conversation_id).await else {
        return Json(TranscriptResponse {
            conversation_id,
            revision: 0,
            state: FeedState::Idle,
            transcript: Transcript::default(),
        });
    };
    let accepted = feed.accepted();
    Json(TranscriptResponse {
        conversation_id,
        revision: accepted.revision,
        state: feed.state().await,
        transcript: accepted.transcript,
    })
}

/// Add a message to a conversation (a realtime insert or an optimistic local send).
#[utoipa::path(
    post,
    path = "/conversations/{conversation_id}/messages",
    request_body = NewMessageRequest,
    responses(
        (status = 201, description = "Message stored", body = MessageResponse),
        (status = 409, description = "A message with this id already exists")
    ),
    params(("conversation_id" = Uuid, Path, description = "The conversation to post to."))
)]
pub async fn create_message_handler(
    State(app_state): State<Arc<AppState>>,
    Path(conversation_id): Path<Uuid>,
    Json(request): Json<NewMessageRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let message = request.into_message();
    app_state
        .store
        .insert_message(conversation_id, message.clone())
        .await
        .map_err(port_error_response)?;

    let feed = app_state.feed(conversation_id).await;
    let revision = refresh_after_change(&feed).await;
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse {
            message: MessageBody::from(&message),
            revision,
        }),
    ))
}

/// Change the delivery status of a message.
#[utoipa::path(
    put,
    path = "/conversations/{conversation_id}/messages/{message_id}/status",
    request_body = StatusUpdateRequest,
    responses(
        (status = 200, description = "Status updated", body = MessageResponse),
        (status = 404, description = "Unknown message")
    ),
    params(
        ("conversation_id" = Uuid, Path, description = "The conversation of the message."),
        ("message_id" = String, Path, description = "The message to update.")
    )
)]
pub async fn update_status_handler(
    State(app_state): State<Arc<AppState>>,
    Path((conversation_id, message_id)): Path<(Uuid, String)>,
    Json(request): Json<StatusUpdateRequest>,
) -> Result<Json<MessageResponse>, (StatusCode, String)> {
    let status = request.status.into_status(request.draft);
    let message = app_state
        .store
        .update_status(conversation_id, &message_id, status)
        .await
        .map_err(port_error_response)?;

    let feed = app_state.feed(conversation_id).await;
    let revision = refresh_after_change(&feed).await;
    Ok(Json(MessageResponse {
        message: MessageBody::from(&message),
        revision,
    }))
}

/// Replace the temporary id of an optimistically sent message with the server id.
///
/// Renderers see this as the temporary row being deleted and the confirmed
/// row inserted at the same place.
#[utoipa::path(
    post,
    path = "/conversations/{conversation_id}/messages/{message_id}/confirm",
    request_body = ConfirmSendRequest,
    responses(
        (status = 200, description = "Send confirmed", body = MessageResponse),
        (status = 404, description = "Unknown message"),
        (status = 409, description = "The server id is already in use")
    ),
    params(
        ("conversation_id" = Uuid, Path, description = "The conversation of the message."),
        ("message_id" = String, Path, description = "The temporary id of the message.")
    )
)]
pub async fn confirm_send_handler(
    State(app_state): State<Arc<AppState>>,
    Path((conversation_id, message_id)): Path<(Uuid, String)>,
    Json(request): Json<ConfirmSendRequest>,
) -> Result<Json<MessageResponse>, (StatusCode, String)> {
    let message = app_state
        .store
        .confirm_send(conversation_id, &message_id, &request.server_id)
        .await
        .map_err(port_error_response)?;

    let feed = app_state.feed(conversation_id).await;
    let revision = refresh_after_change(&feed).await;
    Ok(Json(MessageResponse {
        message: MessageBody::from(&message),
        revision,
    }))
}
