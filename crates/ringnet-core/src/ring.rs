//! Ring assembly: builds a scenario's population and its instruction table.
//!
//! Domains are placed around a ring by an [`Enumeration`]. Every user of the
//! domain at position `i` gets one [`Instruction`] telling it to write to a
//! user of the domain opposite it, at position `(i + ND / 2) % ND`. With an
//! odd number of domains the opposite is not symmetric; that is intended.

use crate::clock::Timestamp;
use crate::identifier::{MessageId, VertexId};
use crate::message::Message;
use crate::population::Population;
use crate::protocol::Directory;
use crate::topology::{Node, NodeBuilder, Vertex};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::hash_map;

/// Content marker carried by exactly one instruction per scenario.
pub const DISTINGUISHED: &str = "black";
/// Content marker of every other instruction.
pub const ORDINARY: &str = "white";

/// Name of item `k`: its binary representation.
pub fn binary_name(k: usize) -> String {
    format!("{k:b}")
}

/// Content of the instruction sent by user `j` of the domain at position `i`.
///
/// Only `(0, 0)` is distinguished.
pub fn content_for(i: usize, j: usize) -> String {
    let tint = if (i, j) == (0, 0) { DISTINGUISHED } else { ORDINARY };
    format!("{tint} {}.{}", binary_name(i), binary_name(j))
}

/// A bijection from `0..len` to items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enumeration<T> {
    items: Vec<T>,
}

impl<T> Enumeration<T> {
    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Permute the assignment of indices to items.
    pub fn shuffle<R: rand::Rng + ?Sized>(&mut self, rng: &mut R) {
        self.items.shuffle(rng);
    }
}

impl<T> From<Vec<T>> for Enumeration<T> {
    fn from(items: Vec<T>) -> Self {
        Self { items }
    }
}

impl<T> FromIterator<T> for Enumeration<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

/// Parameters of a scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingConfig {
    /// User count of the domain at each ring position. Its length is the
    /// number of domains.
    pub users_per_domain: Vec<usize>,
    /// Shuffle the domain enumeration with this seed. `None` keeps domain
    /// `k` at ring position `k`.
    #[serde(default)]
    pub shuffle_seed: Option<u64>,
}

impl RingConfig {
    pub fn new(users_per_domain: Vec<usize>) -> Self {
        Self {
            users_per_domain,
            shuffle_seed: None,
        }
    }

    /// `domain_count` domains of `users` users each.
    pub fn uniform(domain_count: usize, users: usize) -> Self {
        Self::new(vec![users; domain_count])
    }

    pub fn domain_count(&self) -> usize {
        self.users_per_domain.len()
    }

    pub fn with_shuffle_seed(mut self, seed: u64) -> Self {
        self.shuffle_seed = Some(seed);
        self
    }
}

/// Position of a user on the ring: domain position `i`, local index `j`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Slot {
    pub domain: usize,
    pub user: usize,
}

/// Directive for one user: what to send, and to whom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub sender_domain: VertexId,
    pub sender_user: VertexId,
    pub receiver_domain: VertexId,
    pub receiver_user: VertexId,
    pub content: String,
    pub sender_slot: Slot,
    pub receiver_slot: Slot,
}

impl Instruction {
    pub fn is_distinguished(&self) -> bool {
        self.content.starts_with(DISTINGUISHED)
    }

    /// Id of the `seq`-th message sent for this instruction.
    pub fn message_id(&self, seq: u64) -> MessageId {
        MessageId::new(format!("{}#{seq}", self.sender_user.payload()))
    }

    /// The `COM` request a dispatcher sends for this instruction.
    pub fn to_message(&self, id: MessageId, timestamp: Timestamp) -> Message {
        Message::com(
            id,
            self.sender_user.clone(),
            self.receiver_user.clone(),
            self.content.clone(),
            timestamp,
        )
    }
}

/// Instructions keyed by `(sender domain, sender user)`.
#[derive(Debug, Clone, Default)]
pub struct InstructionTable {
    entries: HashMap<(VertexId, VertexId), Instruction>,
}

impl InstructionTable {
    pub fn get(&self, domain: &VertexId, user: &VertexId) -> Option<&Instruction> {
        self.entries.get(&(domain.clone(), user.clone()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> hash_map::Values<'_, (VertexId, VertexId), Instruction> {
        self.entries.values()
    }

    /// Instructions ordered by sender slot.
    pub fn ordered(&self) -> Vec<&Instruction> {
        let mut all: Vec<_> = self.entries.values().collect();
        all.sort_by_key(|ins| ins.sender_slot);
        all
    }

    /// The distinguished instruction, if any.
    pub fn distinguished(&self) -> Option<&Instruction> {
        self.entries.values().find(|ins| ins.is_distinguished())
    }

    fn insert(&mut self, instruction: Instruction) -> Option<Instruction> {
        let key = (
            instruction.sender_domain.clone(),
            instruction.sender_user.clone(),
        );
        self.entries.insert(key, instruction)
    }
}

/// Bits a frame needs per field when carrying one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameLayout {
    pub domain_bits: u32,
    pub user_bits: u32,
}

impl FrameLayout {
    pub const CONTROL_BITS: u32 = 1;

    fn for_counts(domain_count: usize, user_counts: &[usize]) -> Self {
        Self {
            domain_bits: address_bits(domain_count),
            user_bits: user_counts.iter().copied().map(address_bits).max().unwrap_or(1),
        }
    }

    /// Total size of a frame carrying `content`.
    pub fn frame_bits(&self, content: &str) -> u64 {
        u64::from(self.domain_bits)
            + u64::from(self.user_bits)
            + 8 * content.len() as u64
            + u64::from(Self::CONTROL_BITS)
    }
}

/// Binary digits needed to address indices `0..n` (at least one).
pub fn address_bits(n: usize) -> u32 {
    (usize::BITS - n.saturating_sub(1).leading_zeros()).max(1)
}

/// One ring position: the domain's node and its users.
#[derive(Debug, Clone)]
pub struct Domain {
    /// Center is the domain vertex; neighbors are the adjacent domains.
    pub node: Node,
    pub population: Population,
}

impl Domain {
    pub fn id(&self) -> &VertexId {
        self.node.id()
    }
}

/// An assembled scenario.
#[derive(Debug, Clone)]
pub struct Ring {
    domains: Vec<Domain>,
    instructions: InstructionTable,
    homes: HashMap<VertexId, usize>,
    layout: FrameLayout,
}

impl Ring {
    /// Domains in ring order.
    pub fn domains(&self) -> &[Domain] {
        &self.domains
    }

    pub fn domain(&self, position: usize) -> Option<&Domain> {
        self.domains.get(position)
    }

    pub fn domain_mut(&mut self, position: usize) -> Option<&mut Domain> {
        self.domains.get_mut(position)
    }

    /// Ring position of the domain `user` belongs to.
    pub fn home_of(&self, user: &VertexId) -> Option<usize> {
        self.homes.get(user).copied()
    }

    pub fn instructions(&self) -> &InstructionTable {
        &self.instructions
    }

    pub fn user_count(&self) -> usize {
        self.homes.len()
    }

    pub fn frame_layout(&self) -> FrameLayout {
        self.layout
    }

    pub fn into_parts(self) -> (Vec<Domain>, InstructionTable) {
        (self.domains, self.instructions)
    }
}

impl Directory for Ring {
    fn knows(&self, id: &VertexId) -> bool {
        self.homes.contains_key(id)
    }
}

/// Why a scenario could not be assembled.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RingError {
    #[error("a ring needs at least one domain")]
    NoDomains,
    #[error("domain at position {index} has no users")]
    EmptyDomain { index: usize },
}

/// Assemble a ring of `domain_count` domains, where the domain at position
/// `i` holds `users_per_domain(i)` users.
pub fn assemble_ring(
    domain_count: usize,
    users_per_domain: impl Fn(usize) -> usize,
) -> Result<Ring, RingError> {
    assemble(domain_count, users_per_domain, None)
}

/// Assemble the ring described by `config`.
pub fn assemble_ring_with(config: &RingConfig) -> Result<Ring, RingError> {
    assemble(
        config.domain_count(),
        |i| config.users_per_domain[i],
        config.shuffle_seed,
    )
}

fn assemble(
    nd: usize,
    nu: impl Fn(usize) -> usize,
    shuffle_seed: Option<u64>,
) -> Result<Ring, RingError> {
    if nd == 0 {
        return Err(RingError::NoDomains);
    }
    let counts: Vec<usize> = (0..nd).map(nu).collect();
    if let Some(index) = counts.iter().position(|&n| n == 0) {
        return Err(RingError::EmptyDomain { index });
    }

    // ED: ring position -> domain vertex.
    let mut ed: Enumeration<Vertex> = (0..nd)
        .map(|k| Vertex::new(VertexId::new(format!("d{k}")), binary_name(k)))
        .collect();
    if let Some(seed) = shuffle_seed {
        ed.shuffle(&mut StdRng::seed_from_u64(seed));
    }

    // EPop: domain id -> local index -> user. Lives for this run only.
    let mut epop: HashMap<VertexId, Enumeration<Vertex>> = HashMap::with_capacity(nd);
    let mut populations = Vec::with_capacity(nd);
    let mut homes = HashMap::new();
    for (i, domain) in ed.iter().enumerate() {
        let mut population = Population::new(domain.clone());
        let users: Enumeration<Vertex> = (0..counts[i])
            .map(|j| {
                let id = VertexId::new(format!("{}u{j}", domain.id.payload()));
                Vertex::new(id, binary_name(j))
            })
            .collect();
        for user in users.iter() {
            population.enlist(user.clone());
            homes.insert(user.id.clone(), i);
        }
        epop.insert(domain.id.clone(), users);
        populations.push(population);
    }

    let offset = nd / 2;
    let mut instructions = InstructionTable::default();
    for (i, domain) in ed.iter().enumerate() {
        let k = (i + offset) % nd;
        let opposite = &ed.items[k];
        let senders = &epop[&domain.id];
        let receivers = &epop[&opposite.id];
        for (j, sender) in senders.iter().enumerate() {
            let r = (i + j) % receivers.len();
            let receiver = &receivers.items[r];
            instructions.insert(Instruction {
                sender_domain: domain.id.clone(),
                sender_user: sender.id.clone(),
                receiver_domain: opposite.id.clone(),
                receiver_user: receiver.id.clone(),
                content: content_for(i, j),
                sender_slot: Slot { domain: i, user: j },
                receiver_slot: Slot { domain: k, user: r },
            });
        }
    }

    let domains: Vec<Domain> = populations
        .into_iter()
        .enumerate()
        .map(|(i, population)| {
            let mut builder = NodeBuilder::without_neighbors(ed.items[i].clone());
            builder.insert_neighbor(ed.items[(i + nd - 1) % nd].clone());
            builder.insert_neighbor(ed.items[(i + 1) % nd].clone());
            Domain {
                node: builder.finish(),
                population,
            }
        })
        .collect();

    let ring = Ring {
        domains,
        instructions,
        homes,
        layout: FrameLayout::for_counts(nd, &counts),
    };
    tracing::info!(
        domains = nd,
        users = ring.user_count(),
        instructions = ring.instructions.len(),
        "ring assembled"
    );
    Ok(ring)
}
