//! Validation and routing of `COM` messages.
//!
//! A request is checked in a fixed order: sender, receiver, type, policy.
//! The sender must belong to the population of the server handling the
//! request; the receiver may live anywhere on the network. The first failing
//! check decides the reply. Every outcome is an ordinary
//! [`Message`], so a dispatcher delivers failures the same way as successes.

use crate::identifier::{Category, Identifier, VertexId, tag};
use crate::message::{Message, MessageType};
use crate::population::Population;
use crate::table::IdentificationTable;
use std::collections::HashSet;

/// Lookup of the vertices a server knows about.
pub trait Directory {
    fn knows(&self, id: &VertexId) -> bool;
}

impl Directory for Population {
    fn knows(&self, id: &VertexId) -> bool {
        self.contains(id)
    }
}

impl<T> Directory for IdentificationTable<tag::Vertex, T> {
    fn knows(&self, id: &VertexId) -> bool {
        self.contains(id)
    }
}

impl<D: Directory + ?Sized> Directory for &D {
    fn knows(&self, id: &VertexId) -> bool {
        (**self).knows(id)
    }
}

/// Decides whether a sender may reach a receiver.
pub trait Policy {
    fn allows(&self, sender: &VertexId, receiver: &VertexId) -> bool;
}

/// Every sender may reach every receiver.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenPolicy;

impl Policy for OpenPolicy {
    fn allows(&self, _sender: &VertexId, _receiver: &VertexId) -> bool {
        true
    }
}

/// Explicit `sender -> receiver` blocks; everything else is allowed.
#[derive(Debug, Clone, Default)]
pub struct BlockList {
    blocked: HashSet<(VertexId, VertexId)>,
}

impl BlockList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block(&mut self, sender: VertexId, receiver: VertexId) {
        self.blocked.insert((sender, receiver));
    }

    pub fn unblock(&mut self, sender: &VertexId, receiver: &VertexId) -> bool {
        self.blocked.remove(&(sender.clone(), receiver.clone()))
    }

    pub fn len(&self) -> usize {
        self.blocked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocked.is_empty()
    }
}

impl Policy for BlockList {
    fn allows(&self, sender: &VertexId, receiver: &VertexId) -> bool {
        !self.blocked.contains(&(sender.clone(), receiver.clone()))
    }
}

/// Outcome of routing one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Routing {
    /// Forward `transit` to the receiver and return `ack` to the sender.
    Deliver { transit: Message, ack: Message },
    /// Return this correlated error reply to the sender.
    Reject(Message),
}

impl Routing {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Routing::Deliver { .. })
    }

    /// Every message this outcome sends, in delivery order.
    pub fn into_messages(self) -> Vec<Message> {
        match self {
            Routing::Deliver { transit, ack } => vec![transit, ack],
            Routing::Reject(reply) => vec![reply],
        }
    }
}

/// Validate a client request and derive the messages it produces.
///
/// `senders` is the population of the server the request arrived at,
/// `receivers` every user reachable from it.
pub fn validate_and_route(
    message: &Message,
    senders: &impl Directory,
    receivers: &impl Directory,
    policy: &impl Policy,
) -> Routing {
    let routing = if !senders.knows(&message.sender_id) {
        Routing::Reject(message.error_sender(unknown(&message.sender_id)))
    } else if !receivers.knows(&message.receiver_id) {
        Routing::Reject(message.error_receiver(unknown(&message.receiver_id)))
    } else if message.kind != MessageType::Com {
        Routing::Reject(message.error_type(format!(
            "type {} cannot be sent by a client",
            message.kind
        )))
    } else if !policy.allows(&message.sender_id, &message.receiver_id) {
        Routing::Reject(message.forbidden(format!(
            "{} may not reach {}",
            message.sender_id, message.receiver_id
        )))
    } else {
        Routing::Deliver {
            transit: message.transit(),
            ack: message.with_ack(),
        }
    };

    if let Routing::Reject(reply) = &routing {
        tracing::debug!(id = %message.id, kind = %reply.kind, "request rejected: {}", reply.content);
    }
    routing
}

fn unknown<C: Category>(id: &Identifier<C>) -> String {
    format!("unknown {}: {}", C::SCHEME, id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Timestamp;
    use crate::identifier::MessageId;
    use crate::topology::Vertex;

    fn directory() -> IdentificationTable<tag::Vertex, Vertex> {
        ["d0u0", "d1u0"]
            .into_iter()
            .map(|p| (VertexId::new(p), Vertex::new(VertexId::new(p), p)))
            .collect()
    }

    fn com(sender: &str, receiver: &str) -> Message {
        Message::com(
            MessageId::new(format!("{sender}#0")),
            VertexId::new(sender),
            VertexId::new(receiver),
            "hello",
            Timestamp::from_millis(1),
        )
    }

    #[test]
    fn delivers_transit_and_ack() {
        let msg = com("d0u0", "d1u0");
        let routing = validate_and_route(&msg, &directory(), &directory(), &OpenPolicy);
        assert_eq!(
            routing,
            Routing::Deliver {
                transit: msg.transit(),
                ack: msg.with_ack(),
            }
        );
    }

    #[test]
    fn rejects_unknown_sender_then_receiver() {
        let dir = directory();
        let Routing::Reject(reply) = validate_and_route(&com("d7u7", "d9u9"), &dir, &dir, &OpenPolicy)
        else {
            panic!("expected rejection");
        };
        assert_eq!(reply.kind, MessageType::ErrorSender);

        let Routing::Reject(reply) = validate_and_route(&com("d0u0", "d9u9"), &dir, &dir, &OpenPolicy)
        else {
            panic!("expected rejection");
        };
        assert_eq!(reply.kind, MessageType::ErrorReceiver);
        assert_eq!(reply.content, "unknown vertex: vertex:d9u9");
    }

    #[test]
    fn rejects_non_com_types() {
        let msg = com("d0u0", "d1u0").transit();
        let routing = validate_and_route(&msg, &directory(), &directory(), &OpenPolicy);
        let Routing::Reject(reply) = routing else {
            panic!("expected rejection");
        };
        assert_eq!(reply.kind, MessageType::ErrorType);
        assert_eq!(reply.id, msg.id);
        assert_eq!(reply.timestamp, msg.timestamp);
    }

    #[test]
    fn block_list_forbids_one_direction() {
        let mut blocks = BlockList::new();
        blocks.block(VertexId::new("d0u0"), VertexId::new("d1u0"));

        let forward = validate_and_route(&com("d0u0", "d1u0"), &directory(), &directory(), &blocks);
        assert!(matches!(
            forward,
            Routing::Reject(ref reply) if reply.kind == MessageType::Forbidden
        ));

        let back = validate_and_route(&com("d1u0", "d0u0"), &directory(), &directory(), &blocks);
        assert!(back.is_delivered());
        assert_eq!(back.into_messages().len(), 2);

        assert!(blocks.unblock(&VertexId::new("d0u0"), &VertexId::new("d1u0")));
        assert!(blocks.is_empty());
    }

    #[test]
    fn unknown_sender_is_reported_before_a_bad_type() {
        let msg = com("d7u7", "d1u0").transit();
        let Routing::Reject(reply) =
            validate_and_route(&msg, &directory(), &directory(), &OpenPolicy)
        else {
            panic!("expected rejection");
        };
        assert_eq!(reply.kind, MessageType::ErrorSender);

        let msg = com("d0u0", "d9u9").with_ack();
        let Routing::Reject(reply) =
            validate_and_route(&msg, &directory(), &directory(), &OpenPolicy)
        else {
            panic!("expected rejection");
        };
        assert_eq!(reply.kind, MessageType::ErrorReceiver);
    }

    #[test]
    fn sender_must_belong_to_the_local_population() {
        let local: IdentificationTable<tag::Vertex, ()> =
            [(VertexId::new("d0u0"), ())].into_iter().collect();
        let network = directory();

        let routing = validate_and_route(&com("d0u0", "d1u0"), &local, &network, &OpenPolicy);
        assert!(routing.is_delivered());

        let Routing::Reject(reply) =
            validate_and_route(&com("d1u0", "d0u0"), &local, &network, &OpenPolicy)
        else {
            panic!("expected rejection");
        };
        assert_eq!(reply.kind, MessageType::ErrorSender);
        assert_eq!(reply.content, "unknown vertex: vertex:d1u0");
    }
}
