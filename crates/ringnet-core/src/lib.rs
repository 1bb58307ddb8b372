//! Core types for Ringnet.
//!
//! Ringnet simulates a chat network laid out as a ring of domains. This crate
//! provides the topology model, the message protocol and the assembler that
//! derives a scenario (population plus instructions) from a domain count and
//! per-domain user counts. Transport and dispatch live in the applications.

mod clock;
mod envelope;
mod identifier;
mod message;
mod population;
mod protocol;
mod ring;
mod table;
mod topology;

pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use envelope::{Configuration, FatalError};
pub use identifier::{Category, Identifier, IdentifierParseError, MessageId, VertexId, tag};
pub use message::{Message, MessageType};
pub use population::{Population, PopulationError, Rejection};
pub use protocol::{BlockList, Directory, OpenPolicy, Policy, Routing, validate_and_route};
pub use ring::{
    DISTINGUISHED, Domain, Enumeration, FrameLayout, Instruction, InstructionTable, ORDINARY, Ring,
    RingConfig, RingError, Slot, address_bits, assemble_ring, assemble_ring_with, binary_name,
    content_for,
};
pub use table::{IdentificationTable, MutableIdentificationTable, TableError};
pub use topology::{Neighbors, Node, NodeBuilder, Vertex};

/// Session lifecycle of a client attached to a domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the attach to be accepted.
    Connecting,
    /// Configuration received; messages flow.
    Live,
    /// A fatal error ended the session.
    Closed,
}
