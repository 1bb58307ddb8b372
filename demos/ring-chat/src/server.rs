//! Domain servers and client sessions, wired with in-process channels.
//!
//! Each domain of the ring runs as one task holding its node and population.
//! Each user runs as one session task: it attaches to its home domain, sends
//! the instruction assigned to it, then waits for its acknowledgment and for
//! every message addressed to it.

use crate::protocol::WireMessage;
use ringnet_core::{
    BlockList, Clock, Domain, FatalError, IdentificationTable, Instruction, Message, MessageId,
    MessageType, Node, Policy, Population, RingConfig, Routing, SessionState, VertexId,
    assemble_ring_with, tag, validate_and_route,
};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, mpsc, watch};

const SESSION_TIMEOUT: Duration = Duration::from_secs(5);

type Outbox = mpsc::UnboundedSender<String>;

/// Frame arriving at a domain server.
enum Inbound {
    /// From a client session; replies go to `reply`.
    Client { frame: String, reply: Outbox },
    /// TRANSIT handed over by another domain server.
    Relay(Message),
}

/// State of one domain server.
struct ServerState {
    node: Node,
    population: Population,
    sessions: HashMap<VertexId, Outbox>,
    /// Frames for users whose session has not attached yet.
    held: HashMap<VertexId, Vec<String>>,
    attach_seq: u64,
}

impl ServerState {
    fn new(domain: Domain) -> Self {
        Self {
            node: domain.node,
            population: domain.population,
            sessions: HashMap::new(),
            held: HashMap::new(),
            attach_seq: 0,
        }
    }

    /// True if `outbox` belongs to the session attached as `user`.
    fn is_session(&self, user: &VertexId, outbox: &Outbox) -> bool {
        self.sessions
            .get(user)
            .is_some_and(|attached| attached.same_channel(outbox))
    }

    fn next_notification_id(&mut self) -> MessageId {
        self.attach_seq += 1;
        MessageId::new(format!("{}#attach{}", self.node.id().payload(), self.attach_seq))
    }
}

type SharedState = Arc<RwLock<ServerState>>;

/// What every server needs to route a request.
struct Router {
    servers: Vec<mpsc::UnboundedSender<Inbound>>,
    /// User -> ring position of its home domain.
    directory: IdentificationTable<tag::Vertex, usize>,
    policy: BlockList,
    clock: Arc<dyn Clock>,
}

/// Outcome of one session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub user: VertexId,
    pub contacts: usize,
    pub acked: bool,
    pub received: Vec<String>,
    pub rejections: Vec<Message>,
    pub fatal: Option<FatalError>,
}

impl SessionReport {
    fn new(user: VertexId) -> Self {
        Self {
            user,
            contacts: 0,
            acked: false,
            received: Vec::new(),
            rejections: Vec::new(),
            fatal: None,
        }
    }
}

/// Outcome of a whole scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub domains: usize,
    pub users: usize,
    pub instructions: usize,
    pub largest_frame_bits: u64,
    pub delivered: usize,
    pub rejected: BTreeMap<String, usize>,
    pub distinguished: Option<(VertexId, VertexId)>,
    pub duplicate_attach: Option<FatalError>,
    pub sessions: Vec<SessionReport>,
}

/// Assemble the ring described by `config` and drive every instruction
/// through it.
pub async fn run(
    config: RingConfig,
    policy: BlockList,
    clock: Arc<dyn Clock>,
) -> anyhow::Result<ScenarioReport> {
    let ring = assemble_ring_with(&config)?;
    let layout = ring.frame_layout();
    let largest_frame_bits = ring
        .instructions()
        .iter()
        .map(|ins| layout.frame_bits(&ins.content))
        .max()
        .unwrap_or(0);

    let directory = home_directory(ring.domains());

    let mut expected: HashMap<VertexId, usize> = HashMap::new();
    for ins in ring.instructions().iter() {
        if policy.allows(&ins.sender_user, &ins.receiver_user) {
            *expected.entry(ins.receiver_user.clone()).or_default() += 1;
        }
    }

    let (domains, instructions) = ring.into_parts();
    let domain_count = domains.len();

    let mut inboxes = Vec::with_capacity(domain_count);
    let mut servers = Vec::with_capacity(domain_count);
    for _ in 0..domain_count {
        let (tx, rx) = mpsc::unbounded_channel();
        servers.push(tx);
        inboxes.push(rx);
    }
    let router = Arc::new(Router {
        servers,
        directory,
        policy,
        clock,
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut server_tasks = Vec::with_capacity(domain_count);
    let mut roster = Vec::new();
    for (position, (domain, inbox)) in domains.into_iter().zip(inboxes).enumerate() {
        for user in domain.population.users() {
            roster.push((user.id.clone(), domain.id().clone(), position));
        }
        tracing::info!("Starting {}", domain.node);
        let state = Arc::new(RwLock::new(ServerState::new(domain)));
        server_tasks.push(tokio::spawn(serve(
            state,
            inbox,
            router.clone(),
            shutdown_rx.clone(),
        )));
    }

    let sessions = roster.into_iter().map(|(user, domain, home)| {
        let instruction = instructions.get(&domain, &user).cloned();
        let inbound = expected.get(&user).copied().unwrap_or(0);
        tokio::spawn(run_session(user, home, instruction, inbound, router.clone()))
    });
    let mut reports = Vec::new();
    for joined in futures_util::future::join_all(sessions).await {
        reports.push(joined??);
    }
    reports.sort_by(|a, b| a.user.cmp(&b.user));

    let distinguished = instructions.distinguished().cloned();
    let duplicate_attach = match &distinguished {
        Some(ins) => check_duplicate_attach(ins, &router).await?,
        None => None,
    };

    shutdown_tx.send(true)?;
    for task in server_tasks {
        task.await??;
    }

    let delivered: usize = reports.iter().map(|r| r.received.len()).sum();
    let mut rejected: BTreeMap<String, usize> = BTreeMap::new();
    for reply in reports.iter().flat_map(|r| &r.rejections) {
        *rejected.entry(reply.kind.to_string()).or_default() += 1;
    }

    Ok(ScenarioReport {
        domains: domain_count,
        users: reports.len(),
        instructions: instructions.len(),
        largest_frame_bits,
        delivered,
        rejected,
        distinguished: distinguished.map(|ins| (ins.sender_user, ins.receiver_user)),
        duplicate_attach,
        sessions: reports,
    })
}

/// User -> ring position of its home domain, across the whole network.
fn home_directory(domains: &[Domain]) -> IdentificationTable<tag::Vertex, usize> {
    domains
        .iter()
        .enumerate()
        .flat_map(|(i, d)| d.population.users().map(move |u| (u.id.clone(), i)))
        .collect()
}

async fn serve(
    state: SharedState,
    mut inbox: mpsc::UnboundedReceiver<Inbound>,
    router: Arc<Router>,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    loop {
        tokio::select! {
            inbound = inbox.recv() => {
                let Some(inbound) = inbound else { break };
                match inbound {
                    Inbound::Client { frame, reply } => {
                        let wire = match WireMessage::decode(&frame) {
                            Ok(w) => w,
                            Err(e) => {
                                tracing::warn!("Invalid frame: {}", e);
                                continue;
                            }
                        };
                        match wire {
                            WireMessage::Attach { user } => {
                                handle_attach(&state, &router, user, reply).await?;
                            }
                            WireMessage::Send(message) => {
                                handle_send(&state, &router, message, &reply).await?;
                            }
                            _ => {
                                tracing::warn!("Unexpected frame from client");
                            }
                        }
                    }
                    Inbound::Relay(transit) => {
                        handle_relay(&state, transit).await?;
                    }
                }
            }

            _ = shutdown.changed() => break,
        }
    }

    let s = state.read().await;
    tracing::debug!(
        domain = %s.node.id(),
        connected = s.population.connected_count(),
        pending = s.population.pending_count(),
        "Server stopped"
    );
    Ok(())
}

async fn handle_attach(
    state: &SharedState,
    router: &Router,
    user: VertexId,
    reply: Outbox,
) -> anyhow::Result<()> {
    let mut guard = state.write().await;
    let s = &mut *guard;
    let notification_id = s.next_notification_id();

    match s.population.admit(&user, notification_id, router.clock.now()) {
        Ok(config) => {
            send(&reply, &WireMessage::Configuration(config))?;
            for frame in s.held.remove(&user).unwrap_or_default() {
                forward(&reply, frame);
            }
            s.sessions.insert(user, reply);
        }
        Err(rejection) => {
            // ERROR_CONNECTION stays local; the client only sees the fatal error.
            tracing::warn!("{}", rejection.notification);
            send(&reply, &WireMessage::Fatal(rejection.fatal))?;
        }
    }
    Ok(())
}

async fn handle_send(
    state: &SharedState,
    router: &Router,
    message: Message,
    reply: &Outbox,
) -> anyhow::Result<()> {
    let routing = {
        let s = state.read().await;
        if s.is_session(&message.sender_id, reply) {
            validate_and_route(&message, &s.population, &router.directory, &router.policy)
        } else {
            tracing::debug!(
                id = %message.id,
                "send from a session not attached as {}",
                message.sender_id
            );
            Routing::Reject(message.error_sender(format!(
                "{} is not attached to this session",
                message.sender_id
            )))
        }
    };

    match routing {
        Routing::Deliver { transit, ack } => {
            if let Some(&home) = router.directory.get(&transit.receiver_id) {
                tracing::debug!("{}", transit);
                router.servers[home]
                    .send(Inbound::Relay(transit))
                    .map_err(|_| anyhow::anyhow!("domain server {home} stopped"))?;
            }
            send(reply, &WireMessage::Deliver(ack))
        }
        Routing::Reject(error) => send(reply, &WireMessage::Deliver(error)),
    }
}

async fn handle_relay(state: &SharedState, transit: Message) -> anyhow::Result<()> {
    let receiver = transit.receiver_id.clone();
    let frame = WireMessage::Deliver(transit).encode()?;

    let mut guard = state.write().await;
    let s = &mut *guard;
    match s.sessions.get(&receiver) {
        Some(outbox) => forward(outbox, frame),
        None => s.held.entry(receiver).or_default().push(frame),
    }
    Ok(())
}

async fn run_session(
    user: VertexId,
    home: usize,
    instruction: Option<Instruction>,
    inbound: usize,
    router: Arc<Router>,
) -> anyhow::Result<SessionReport> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut report = SessionReport::new(user.clone());
    let mut state = SessionState::Connecting;

    submit(&router, home, &WireMessage::Attach { user: user.clone() }, tx.clone())?;

    let mut awaiting_reply = false;
    while state != SessionState::Closed {
        if state == SessionState::Live && !awaiting_reply && report.received.len() >= inbound {
            break;
        }
        let frame = tokio::time::timeout(SESSION_TIMEOUT, rx.recv())
            .await?
            .ok_or_else(|| anyhow::anyhow!("Connection closed"))?;

        match WireMessage::decode(&frame)? {
            WireMessage::Configuration(config) => {
                tracing::debug!("{}", config);
                report.contacts = config.neighbors.size();
                state = SessionState::Live;

                if let Some(ins) = &instruction {
                    let message = ins.to_message(ins.message_id(0), router.clock.now());
                    submit(&router, home, &WireMessage::Send(message), tx.clone())?;
                    awaiting_reply = true;
                }
            }
            WireMessage::Deliver(message) => match message.kind {
                MessageType::Transit => report.received.push(message.content),
                MessageType::Ar => {
                    report.acked = true;
                    awaiting_reply = false;
                }
                kind if kind.is_error() => {
                    tracing::info!("{} rejected: {}", user, message.content);
                    report.rejections.push(message);
                    awaiting_reply = false;
                }
                _ => tracing::warn!("Unexpected message type {}", message.kind),
            },
            WireMessage::Fatal(fatal) => {
                tracing::warn!("{}: {}", user, fatal);
                report.fatal = Some(fatal);
                state = SessionState::Closed;
            }
            _ => tracing::warn!("Unexpected frame from server"),
        }
    }

    Ok(report)
}

/// Attach the distinguished sender a second time. The attach must be refused.
async fn check_duplicate_attach(
    instruction: &Instruction,
    router: &Router,
) -> anyhow::Result<Option<FatalError>> {
    let Some(&home) = router.directory.get(&instruction.sender_user) else {
        return Ok(None);
    };
    let (tx, mut rx) = mpsc::unbounded_channel();
    let attach = WireMessage::Attach {
        user: instruction.sender_user.clone(),
    };
    submit(router, home, &attach, tx)?;

    let frame = tokio::time::timeout(SESSION_TIMEOUT, rx.recv())
        .await?
        .ok_or_else(|| anyhow::anyhow!("Connection closed"))?;
    match WireMessage::decode(&frame)? {
        WireMessage::Fatal(fatal) => Ok(Some(fatal)),
        other => anyhow::bail!("duplicate attach was accepted: {other:?}"),
    }
}

fn submit(router: &Router, home: usize, wire: &WireMessage, reply: Outbox) -> anyhow::Result<()> {
    let frame = wire.encode()?;
    router.servers[home]
        .send(Inbound::Client { frame, reply })
        .map_err(|_| anyhow::anyhow!("domain server {home} stopped"))
}

fn send(outbox: &Outbox, wire: &WireMessage) -> anyhow::Result<()> {
    forward(outbox, wire.encode()?);
    Ok(())
}

fn forward(outbox: &Outbox, frame: String) {
    if outbox.send(frame).is_err() {
        tracing::debug!("Frame dropped: session closed");
    }
}
