//! Per-domain population and the connection lifecycle.
//!
//! Every user starts in `to_connect` and moves to `connected` exactly once,
//! when its session attaches. It never moves back.

use crate::clock::Timestamp;
use crate::envelope::{Configuration, FatalError};
use crate::identifier::{MessageId, VertexId, tag};
use crate::message::Message;
use crate::table::MutableIdentificationTable;
use crate::topology::{Node, NodeBuilder, Vertex};

/// Users of one domain, split by connection state.
#[derive(Debug, Clone)]
pub struct Population {
    domain: Vertex,
    to_connect: MutableIdentificationTable<tag::Vertex, Vertex>,
    connected: MutableIdentificationTable<tag::Vertex, Vertex>,
}

impl Population {
    pub fn new(domain: Vertex) -> Self {
        Self {
            domain,
            to_connect: MutableIdentificationTable::new(),
            connected: MutableIdentificationTable::new(),
        }
    }

    /// The domain this population belongs to.
    pub fn domain(&self) -> &Vertex {
        &self.domain
    }

    /// Add a user waiting to connect.
    pub(crate) fn enlist(&mut self, user: Vertex) {
        self.to_connect.insert(user.id.clone(), user);
    }

    /// Move `id` from `to_connect` to `connected`.
    ///
    /// On error nothing changes.
    pub fn attach(&mut self, id: &VertexId) -> Result<Vertex, PopulationError> {
        if self.connected.contains(id) {
            return Err(PopulationError::AlreadyConnected(id.to_string()));
        }
        let user = self
            .to_connect
            .remove(id)
            .ok_or_else(|| PopulationError::Unknown {
                user: id.to_string(),
                domain: self.domain.id.to_string(),
            })?;
        self.connected.insert(user.id.clone(), user.clone());
        tracing::debug!(user = %user.id, domain = %self.domain.id, "user connected");
        Ok(user)
    }

    /// Attach `id` and build its [`Configuration`]. A failed attach is
    /// escalated to an `ERROR_CONNECTION` notification plus the
    /// [`FatalError`] that ends the session.
    pub fn admit(
        &mut self,
        id: &VertexId,
        notification_id: MessageId,
        timestamp: Timestamp,
    ) -> Result<Configuration, Rejection> {
        match self.attach(id) {
            Ok(user) => Ok(Configuration::from_node(&self.node_around(user), timestamp)),
            Err(e) => {
                tracing::warn!(user = %id, domain = %self.domain.id, "attach rejected: {}", e);
                Err(Rejection::new(notification_id, id, &e, timestamp))
            }
        }
    }

    /// Node centered on `center` whose neighbors are the other users of this
    /// domain, connected or not.
    fn node_around(&self, center: Vertex) -> Node {
        let mut builder = NodeBuilder::without_neighbors(center);
        for user in self.users() {
            builder.insert_neighbor(user.clone());
        }
        builder.finish()
    }

    pub fn user(&self, id: &VertexId) -> Option<&Vertex> {
        self.to_connect.get(id).or_else(|| self.connected.get(id))
    }

    /// True if `id` belongs to this domain, connected or not.
    pub fn contains(&self, id: &VertexId) -> bool {
        self.to_connect.contains(id) || self.connected.contains(id)
    }

    pub fn is_connected(&self, id: &VertexId) -> bool {
        self.connected.contains(id)
    }

    pub fn pending_count(&self) -> usize {
        self.to_connect.size()
    }

    pub fn connected_count(&self) -> usize {
        self.connected.size()
    }

    pub fn len(&self) -> usize {
        self.pending_count() + self.connected_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every user of the domain, in unspecified order.
    pub fn users(&self) -> impl Iterator<Item = &Vertex> {
        self.to_connect.iter().chain(self.connected.iter()).map(|(_, v)| v)
    }
}

/// Why a user could not be moved to `connected`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PopulationError {
    #[error("user {0} is already connected")]
    AlreadyConnected(String),
    #[error("user {user} is not waiting to connect to {domain}")]
    Unknown { user: String, domain: String },
}

/// A refused attach, as delivered locally and to the client.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub notification: Message,
    pub fatal: FatalError,
}

impl Rejection {
    fn new(
        notification_id: MessageId,
        user: &VertexId,
        error: &PopulationError,
        timestamp: Timestamp,
    ) -> Self {
        let notification =
            Message::connection_error(notification_id, user.clone(), error.to_string(), timestamp);
        let fatal = FatalError::from_message(error.to_string(), timestamp);
        Self {
            notification,
            fatal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageType;

    fn population(users: usize) -> Population {
        let mut population = Population::new(Vertex::new(VertexId::new("d0"), "0"));
        for j in 0..users {
            population.enlist(Vertex::new(VertexId::new(format!("d0u{j}")), format!("{j:b}")));
        }
        population
    }

    #[test]
    fn attach_moves_user_once() {
        let mut pop = population(2);
        let id = VertexId::new("d0u1");

        let user = pop.attach(&id).unwrap();
        assert_eq!(user.name, "1");
        assert!(pop.is_connected(&id));
        assert_eq!((pop.pending_count(), pop.connected_count()), (1, 1));

        assert_eq!(
            pop.attach(&id),
            Err(PopulationError::AlreadyConnected("vertex:d0u1".to_string()))
        );
        assert_eq!((pop.pending_count(), pop.connected_count()), (1, 1));
    }

    #[test]
    fn attach_unknown_user_fails_without_change() {
        let mut pop = population(1);
        let err = pop.attach(&VertexId::new("d9u9")).unwrap_err();
        assert!(matches!(err, PopulationError::Unknown { .. }));
        assert_eq!(pop.len(), 1);
        assert_eq!(pop.connected_count(), 0);
    }

    #[test]
    fn admit_builds_configuration_with_domain_contacts() {
        let mut pop = population(3);
        let id = VertexId::new("d0u0");
        let config = pop
            .admit(&id, MessageId::new("attach#0"), Timestamp::from_millis(3))
            .unwrap();
        assert_eq!(config.center.id, id);
        assert_eq!(config.neighbors.size(), 2);
        assert!(!config.neighbors.contains(&id));
    }

    #[test]
    fn duplicate_admit_escalates_to_connection_error() {
        let mut pop = population(1);
        let id = VertexId::new("d0u0");
        pop.admit(&id, MessageId::new("attach#0"), Timestamp::from_millis(1))
            .unwrap();

        let rejection = pop
            .admit(&id, MessageId::new("attach#1"), Timestamp::from_millis(2))
            .unwrap_err();
        assert_eq!(rejection.notification.kind, MessageType::ErrorConnection);
        assert_eq!(rejection.notification.sender_id, id);
        assert_eq!(rejection.notification.receiver_id, id);
        assert_eq!(rejection.fatal.timestamp, Timestamp::from_millis(2));
        assert_eq!(pop.connected_count(), 1);
    }
}
