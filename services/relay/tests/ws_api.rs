//! End-to-end tests of the renderer WebSocket against a relay bound to an
//! ephemeral port.
//!
//! - a connection starts with the accepted snapshot
//! - plans follow in revision order
//! - `resync` and `refresh` requests from the renderer
//! - disconnecting releases what the connection started

use chrono::{TimeZone, Utc};
use futures::{SinkExt, StreamExt};
use relay_lib::{config::Config, web, web::state::AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream};
use transcript_core::{Message, MessageStatus};
use uuid::Uuid;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn start_relay() -> (String, Arc<AppState>) {
    let state = Arc::new(AppState::new(Arc::new(Config::default())));
    let router = web::router(state.clone()).unwrap();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (format!("ws://{addr}"), state)
}

async fn connect(base: &str, conversation: Uuid) -> Client {
    let (client, _) = tokio_tungstenite::connect_async(format!("{base}/conversations/{conversation}/ws"))
        .await
        .unwrap();
    client
}

/// Next text frame as JSON, skipping control frames.
async fn next_json(client: &mut Client) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("no frame within 5s")
            .expect("socket closed")
            .unwrap();
        if let WsMessage::Text(text) = frame {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn send_json(client: &mut Client, value: Value) {
    client.send(WsMessage::Text(value.to_string().into())).await.unwrap();
}

fn message(id: &str, hour: u32) -> Message {
    Message {
        id: id.to_string(),
        sender_id: "alice".to_string(),
        text: id.to_string(),
        status: MessageStatus::Sent,
        sent_at: Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap(),
        attachments: Vec::new(),
    }
}

fn row_ids(transcript: &Value) -> Vec<String> {
    transcript
        .as_array()
        .unwrap()
        .iter()
        .flat_map(|section| section["rows"].as_array().unwrap().iter())
        .map(|row| row["id"].as_str().unwrap().to_string())
        .collect()
}

/// Polls until the relay holds no feed and no plan channel.
async fn released(state: &AppState) -> bool {
    for _ in 0..100 {
        if state.feed_count().await == 0 && state.renderer.channel_count().await == 0 {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn renderer_gets_a_snapshot_then_plans_in_order() {
    let (base, state) = start_relay().await;
    let conversation = Uuid::new_v4();
    state.store.insert_message(conversation, message("m1", 9)).await.unwrap();

    let mut client = connect(&base, conversation).await;
    let snapshot = next_json(&mut client).await;
    assert_eq!(snapshot["type"], "snapshot");
    assert_eq!(snapshot["revision"], 1);
    assert_eq!(row_ids(&snapshot["transcript"]), vec!["m1"]);

    state.store.insert_message(conversation, message("m2", 10)).await.unwrap();
    state.feed(conversation).await.refresh().await.unwrap();

    let plan = next_json(&mut client).await;
    assert_eq!(plan["type"], "plan");
    assert_eq!(plan["revision"], 2);
    assert_eq!(
        plan["plan"]["operations"],
        json!([
            { "op": "insert_row", "section": 0, "row": 1 },
            { "op": "edit_row", "section": 0, "row": 0 },
        ])
    );
    assert_eq!(row_ids(&plan["transcript"]), vec!["m1", "m2"]);

    send_json(&mut client, json!({ "type": "resync" })).await;
    let resent = next_json(&mut client).await;
    assert_eq!(resent["type"], "snapshot");
    assert_eq!(resent["revision"], 2);
    assert_eq!(row_ids(&resent["transcript"]), vec!["m1", "m2"]);

    state.store.insert_message(conversation, message("m3", 11)).await.unwrap();
    send_json(&mut client, json!({ "type": "refresh" })).await;
    let refreshed = next_json(&mut client).await;
    assert_eq!(refreshed["type"], "plan");
    assert_eq!(refreshed["revision"], 3);
    assert_eq!(row_ids(&refreshed["transcript"]), vec!["m1", "m2", "m3"]);
}

#[tokio::test]
async fn unrecognized_frames_get_an_error_reply() {
    let (base, _state) = start_relay().await;
    let mut client = connect(&base, Uuid::new_v4()).await;
    assert_eq!(next_json(&mut client).await["type"], "snapshot");

    send_json(&mut client, json!({ "type": "rewind" })).await;
    let reply = next_json(&mut client).await;
    assert_eq!(reply["type"], "error");
}

#[tokio::test]
async fn disconnecting_from_an_empty_conversation_releases_it() {
    let (base, state) = start_relay().await;
    let conversation = Uuid::new_v4();

    let mut client = connect(&base, conversation).await;
    let snapshot = next_json(&mut client).await;
    assert_eq!(snapshot["revision"], 0);
    assert_eq!(state.feed_count().await, 1);

    client.close(None).await.unwrap();
    assert!(released(&state).await);
}
