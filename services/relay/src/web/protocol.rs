//! services/relay/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between a rendering client and the relay.

use serde::{Deserialize, Serialize};
use transcript_core::{ReconciliationPlan, Transcript};

//=========================================================================================
// Messages Sent FROM the Client (Renderer) TO the Server
//=========================================================================================

/// Represents the structured text messages a client can send to the server.
#[derive(Deserialize, Debug, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Asks for the full current snapshot, e.g. after the client lost track of revisions.
    Resync,

    /// Asks the relay to refetch the conversation from its source.
    Refresh,
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Renderer)
//=========================================================================================

/// Represents the structured text messages the server can send to the client.
#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The full transcript at `revision`. Sent first on every connection and on resync.
    /// The client replaces whatever it was showing.
    Snapshot {
        revision: u64,
        transcript: Transcript,
    },

    /// The plan that moves the client from `revision - 1` to `revision`.
    /// `transcript` is the resulting snapshot, the source of inserted and edited rows.
    Plan {
        revision: u64,
        plan: ReconciliationPlan,
        transcript: Transcript,
    },

    /// Reports an error to the client, which should display an error message.
    Error { message: String },
}
