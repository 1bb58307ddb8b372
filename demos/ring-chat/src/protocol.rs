//! Frames exchanged between sessions and domain servers.

use ringnet_core::{Configuration, FatalError, Message, VertexId};
use serde::{Deserialize, Serialize};

/// Wrapper for frames over the in-process wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", content = "data", rename_all = "snake_case")]
pub enum WireMessage {
    // Client -> Server
    Attach { user: VertexId },
    Send(Message),

    // Server -> Client
    Configuration(Configuration),
    /// TRANSIT, AR or a protocol error reply.
    Deliver(Message),
    /// The session cannot continue.
    Fatal(FatalError),
}

impl WireMessage {
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn decode(frame: &str) -> serde_json::Result<Self> {
        serde_json::from_str(frame)
    }
}
