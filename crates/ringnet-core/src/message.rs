//! Protocol messages.
//!
//! A [`Message`] is never edited in place. Every step of the protocol derives
//! a new value from the previous one, changing only the type and, for error
//! replies, the content. The id, both endpoints and the timestamp are carried
//! through unchanged so a client can correlate a reply with its request.

use crate::clock::Timestamp;
use crate::identifier::{MessageId, VertexId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Type tag of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    /// Client to server: a user wants to communicate.
    Com,
    /// Server to receiver: the communication in transit.
    Transit,
    /// Server to sender: acknowledgment of receipt.
    Ar,
    /// Local notification: the session could not be attached.
    ErrorConnection,
    /// The sender is unknown.
    ErrorSender,
    /// The receiver is unknown.
    ErrorReceiver,
    /// The type is not allowed here.
    ErrorType,
    /// The sender may not reach the receiver.
    Forbidden,
}

impl MessageType {
    pub const ALL: [MessageType; 8] = [
        MessageType::Com,
        MessageType::Transit,
        MessageType::Ar,
        MessageType::ErrorConnection,
        MessageType::ErrorSender,
        MessageType::ErrorReceiver,
        MessageType::ErrorType,
        MessageType::Forbidden,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Com => "COM",
            MessageType::Transit => "TRANSIT",
            MessageType::Ar => "AR",
            MessageType::ErrorConnection => "ERROR_CONNECTION",
            MessageType::ErrorSender => "ERROR_SENDER",
            MessageType::ErrorReceiver => "ERROR_RECEIVER",
            MessageType::ErrorType => "ERROR_TYPE",
            MessageType::Forbidden => "FORBIDDEN",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            MessageType::ErrorConnection
                | MessageType::ErrorSender
                | MessageType::ErrorReceiver
                | MessageType::ErrorType
                | MessageType::Forbidden
        )
    }

    /// Terminal types end the session that receives them.
    pub fn is_terminal(&self) -> bool {
        matches!(self, MessageType::ErrorConnection)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A protocol message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub sender_id: VertexId,
    pub receiver_id: VertexId,
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub content: String,
    pub timestamp: Timestamp,
}

impl Message {
    pub fn new(
        id: MessageId,
        sender_id: VertexId,
        receiver_id: VertexId,
        kind: MessageType,
        content: impl Into<String>,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id,
            sender_id,
            receiver_id,
            kind,
            content: content.into(),
            timestamp,
        }
    }

    /// A client's request to send `content` to `receiver_id`.
    pub fn com(
        id: MessageId,
        sender_id: VertexId,
        receiver_id: VertexId,
        content: impl Into<String>,
        timestamp: Timestamp,
    ) -> Self {
        Self::new(id, sender_id, receiver_id, MessageType::Com, content, timestamp)
    }

    /// Self-addressed notification that `vertex` could not be attached.
    pub fn connection_error(
        id: MessageId,
        vertex: VertexId,
        content: impl Into<String>,
        timestamp: Timestamp,
    ) -> Self {
        Self::new(
            id,
            vertex.clone(),
            vertex,
            MessageType::ErrorConnection,
            content,
            timestamp,
        )
    }

    /// The message as forwarded to its receiver.
    pub fn transit(&self) -> Self {
        self.retyped(MessageType::Transit)
    }

    /// The acknowledgment returned to the sender.
    pub fn with_ack(&self) -> Self {
        self.retyped(MessageType::Ar)
    }

    pub fn error_sender(&self, content: impl Into<String>) -> Self {
        self.reply(MessageType::ErrorSender, content)
    }

    pub fn error_receiver(&self, content: impl Into<String>) -> Self {
        self.reply(MessageType::ErrorReceiver, content)
    }

    pub fn error_type(&self, content: impl Into<String>) -> Self {
        self.reply(MessageType::ErrorType, content)
    }

    pub fn forbidden(&self, content: impl Into<String>) -> Self {
        self.reply(MessageType::Forbidden, content)
    }

    /// True for self-addressed messages (only connection errors are).
    pub fn is_local(&self) -> bool {
        self.sender_id == self.receiver_id
    }

    fn retyped(&self, kind: MessageType) -> Self {
        Self {
            kind,
            ..self.clone()
        }
    }

    fn reply(&self, kind: MessageType, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            ..self.clone()
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {} -> {} @ {}: {}",
            self.kind, self.id, self.sender_id, self.receiver_id, self.timestamp, self.content
        )
    }
}
