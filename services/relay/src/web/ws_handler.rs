//! services/relay/src/web/ws_handler.rs
//!
//! The WebSocket connection of one renderer. The renderer first receives the
//! full accepted snapshot, then every plan in revision order. A gap in the
//! revisions (the renderer fell behind the broadcast buffer) is healed by
//! sending a fresh snapshot.

use crate::{
    error::RelayError,
    sync::{FeedState, TranscriptFeed},
    web::{
        protocol::{ClientMessage, ServerMessage},
        state::AppState,
    },
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{
    stream::{SplitSink, StreamExt},
    SinkExt,
};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{error, info, warn};
use transcript_core::AppliedPlan;
use uuid::Uuid;

type WsSender = SplitSink<WebSocket, Message>;

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
    Path(conversation_id): Path<Uuid>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state, conversation_id))
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>, conversation_id: Uuid) {
    info!(%conversation_id, "New renderer connected.");

    // Subscribe before reading the snapshot so no plan can fall between the two.
    let plans = app_state.renderer.subscribe(conversation_id).await;
    let feed = app_state.feed(conversation_id).await;
    if feed.state().await == FeedState::Idle {
        if let Err(e) = feed.refresh().await {
            warn!(%conversation_id, "Initial refresh failed: {}", e);
        }
    }

    serve_renderer(socket, plans, &feed).await;

    drop(feed);
    app_state.release(conversation_id).await;
    info!(%conversation_id, "WebSocket connection closed.");
}

/// Sends the snapshot, then plans in revision order until either side closes.
async fn serve_renderer(
    socket: WebSocket,
    mut plans: broadcast::Receiver<Arc<AppliedPlan>>,
    feed: &TranscriptFeed,
) {
    let conversation_id = feed.conversation_id();
    let (mut sender, mut receiver) = socket.split();

    let mut revision = match send_snapshot(&mut sender, feed).await {
        Ok(revision) => revision,
        Err(e) => {
            error!(%conversation_id, "Failed to send the initial snapshot: {}", e);
            return;
        }
    };

    loop {
        let outcome = tokio::select! {
            plan = plans.recv() => match plan.map(|applied| (gate_plan(revision, applied.revision), applied)) {
                Ok((PlanGate::Skip, _)) => Ok(()),
                Ok((PlanGate::Forward, applied)) => {
                    revision = applied.revision;
                    send(
                        &mut sender,
                        &ServerMessage::Plan {
                            revision: applied.revision,
                            plan: applied.plan.clone(),
                            transcript: applied.transcript.clone(),
                        },
                    )
                    .await
                }
                Ok((PlanGate::Resync, _)) | Err(RecvError::Lagged(_)) => {
                    warn!(%conversation_id, "Renderer fell behind, resending the snapshot.");
                    send_snapshot(&mut sender, feed).await.map(|r| revision = r)
                }
                Err(RecvError::Closed) => {
                    info!(%conversation_id, "Plan stream closed.");
                    break;
                }
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    handle_client_message(text.as_str(), &mut sender, feed, &mut revision).await
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!(%conversation_id, "Renderer disconnected.");
                    break;
                }
                Some(Ok(_)) => Ok(()),
                Some(Err(e)) => Err(RelayError::from(e)),
            },
        };

        if let Err(e) = outcome {
            error!(%conversation_id, "Closing renderer connection: {}", e);
            break;
        }
    }
}

/// What a connection at one revision does with an incoming plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlanGate {
    /// Already covered by the snapshot or an earlier plan.
    Skip,
    /// The next plan in sequence.
    Forward,
    /// Plans went missing; only a fresh snapshot can catch up.
    Resync,
}

fn gate_plan(current: u64, incoming: u64) -> PlanGate {
    if incoming <= current {
        PlanGate::Skip
    } else if incoming == current + 1 {
        PlanGate::Forward
    } else {
        PlanGate::Resync
    }
}

/// Handles one client text frame.
async fn handle_client_message(
    text: &str,
    sender: &mut WsSender,
    feed: &TranscriptFeed,
    revision: &mut u64,
) -> Result<(), RelayError> {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Resync) => {
            *revision = send_snapshot(sender, feed).await?;
            Ok(())
        }
        Ok(ClientMessage::Refresh) => {
            // The resulting plan arrives through the broadcast like any other.
            if let Err(e) = feed.refresh().await {
                send(
                    sender,
                    &ServerMessage::Error {
                        message: e.to_string(),
                    },
                )
                .await?;
            }
            Ok(())
        }
        Err(e) => {
            warn!("Failed to deserialize client message: {}", e);
            send(
                sender,
                &ServerMessage::Error {
                    message: "Unrecognized message.".to_string(),
                },
            )
            .await
        }
    }
}

/// Sends the accepted snapshot and returns its revision.
async fn send_snapshot(sender: &mut WsSender, feed: &TranscriptFeed) -> Result<u64, RelayError> {
    let accepted = feed.accepted();
    send(
        sender,
        &ServerMessage::Snapshot {
            revision: accepted.revision,
            transcript: accepted.transcript,
        },
    )
    .await?;
    Ok(accepted.revision)
}

async fn send(sender: &mut WsSender, message: &ServerMessage) -> Result<(), RelayError> {
    let json = serde_json::to_string(message).map_err(|e| RelayError::Internal(e.to_string()))?;
    sender.send(Message::Text(json.into())).await?;
    Ok(())
}
