//! Topology primitives: vertices and the nodes built around them.

use crate::identifier::{VertexId, tag};
use crate::table::{IdentificationTable, MutableIdentificationTable};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One participant of the network: a user, or the center of a domain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Vertex {
    pub id: VertexId,
    pub name: String,
}

impl Vertex {
    pub fn new(id: VertexId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

impl fmt::Display for Vertex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// Neighbor set of a vertex, keyed by vertex id.
pub type Neighbors = IdentificationTable<tag::Vertex, Vertex>;

/// A vertex together with the vertices visible to it.
///
/// `neighbors` never contains the center itself. Nodes do not check that the
/// center id is unique across a network; the assembler guarantees that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub center: Vertex,
    pub neighbors: Neighbors,
}

impl Node {
    /// A node that has not been linked to anything yet.
    pub fn without_neighbors(center: Vertex) -> Self {
        Self {
            center,
            neighbors: Neighbors::empty(),
        }
    }

    pub fn id(&self) -> &VertexId {
        &self.center.id
    }

    /// Neighbors reduced to `id -> name`.
    pub fn collapsed_neighbors(&self) -> IdentificationTable<tag::Vertex, String> {
        self.neighbors.map(|_, v| v.name.clone())
    }

    pub fn is_neighbor(&self, id: &VertexId) -> bool {
        self.neighbors.contains(id)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.neighbors.values().map(|v| v.name.as_str()).collect();
        names.sort_unstable();
        write!(f, "{} -> [{}]", self.center, names.join(", "))
    }
}

/// Mutable node used while a topology is assembled. [`finish`](Self::finish)
/// hands back the immutable [`Node`].
#[derive(Debug)]
pub struct NodeBuilder {
    center: Vertex,
    neighbors: MutableIdentificationTable<tag::Vertex, Vertex>,
}

impl NodeBuilder {
    pub fn without_neighbors(center: Vertex) -> Self {
        Self {
            center,
            neighbors: MutableIdentificationTable::new(),
        }
    }

    pub fn center(&self) -> &Vertex {
        &self.center
    }

    /// Link `neighbor`. Returns `false` (and links nothing) if it is the
    /// center itself.
    pub fn insert_neighbor(&mut self, neighbor: Vertex) -> bool {
        if neighbor.id == self.center.id {
            return false;
        }
        self.neighbors.insert(neighbor.id.clone(), neighbor);
        true
    }

    pub fn remove_neighbor(&mut self, id: &VertexId) -> Option<Vertex> {
        self.neighbors.remove(id)
    }

    pub fn neighbor_count(&self) -> usize {
        self.neighbors.size()
    }

    pub fn finish(self) -> Node {
        Node {
            center: self.center,
            neighbors: self.neighbors.freeze(),
        }
    }
}

impl From<Node> for NodeBuilder {
    fn from(node: Node) -> Self {
        Self {
            center: node.center,
            neighbors: node.neighbors.thaw(),
        }
    }
}
