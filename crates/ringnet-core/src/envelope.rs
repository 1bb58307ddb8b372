//! Envelopes handed to a client outside the message flow.

use crate::clock::Timestamp;
use crate::message::{Message, MessageType};
use crate::topology::{Neighbors, Node, Vertex};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Initial snapshot sent to a client once its session is attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// The client's own vertex.
    pub center: Vertex,
    /// Vertices the client can see.
    pub neighbors: Neighbors,
    pub timestamp: Timestamp,
}

impl Configuration {
    /// Copy `center` and `neighbors` out of `node`. The node is assumed to be
    /// consistent already; nothing is validated.
    pub fn from_node(node: &Node, timestamp: Timestamp) -> Self {
        Self {
            center: node.center.clone(),
            neighbors: node.neighbors.clone(),
            timestamp,
        }
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "configuration for {} with {} neighbor(s) @ {}",
            self.center,
            self.neighbors.size(),
            self.timestamp
        )
    }
}

/// Terminal notification: the client's session cannot continue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FatalError {
    pub message: String,
    pub timestamp: Timestamp,
}

impl FatalError {
    pub fn from_message(message: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            message: message.into(),
            timestamp,
        }
    }

    /// Lift a local `ERROR_CONNECTION` notification into the envelope sent to
    /// the client. Returns `None` for any other message type.
    pub fn from_connection_error(message: &Message) -> Option<Self> {
        (message.kind == MessageType::ErrorConnection)
            .then(|| Self::from_message(message.content.clone(), message.timestamp))
    }
}

impl fmt::Display for FatalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fatal error @ {}: {}", self.timestamp, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier::{MessageId, VertexId};
    use crate::topology::NodeBuilder;

    #[test]
    fn configuration_copies_node() {
        let mut builder = NodeBuilder::without_neighbors(Vertex::new(VertexId::new("d0u0"), "0"));
        builder.insert_neighbor(Vertex::new(VertexId::new("d0u1"), "1"));
        let node = builder.finish();

        let config = Configuration::from_node(&node, Timestamp::from_millis(5));
        assert_eq!(config.center, node.center);
        assert_eq!(config.neighbors, node.neighbors);
        assert_eq!(config.timestamp.as_millis(), 5);
    }

    #[test]
    fn fatal_error_only_from_connection_errors() {
        let err = Message::connection_error(
            MessageId::new("attach#0"),
            VertexId::new("d0u0"),
            "duplicate attach",
            Timestamp::from_millis(9),
        );
        let fatal = FatalError::from_connection_error(&err).unwrap();
        assert_eq!(fatal, FatalError::from_message("duplicate attach", Timestamp::from_millis(9)));

        let ack = err.with_ack();
        assert!(FatalError::from_connection_error(&ack).is_none());
    }
}
