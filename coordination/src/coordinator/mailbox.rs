//! Agent mailboxes and the messages they carry

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::Instant;

use super::stats::MessageStats;
use crate::types::{AgentId, Proposal, ProposalId, StateVersion, VoteChoice};

/// What a state request asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateQuery {
    /// The agent's current version of one key
    Key(String),
    /// Every version the agent holds above this version number
    Since(u64),
}

/// Votes an agent has heard of on one proposal, keyed by voter
pub type GossipView = BTreeMap<AgentId, VoteChoice>;

/// An agent's answer to one gossip round
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GossipReport {
    /// View held when the round began
    pub view: GossipView,
    /// Pushes the transport accepted this round
    pub pushed: usize,
}

/// Payloads carried between the coordinator and agents
#[derive(Debug, Clone)]
pub enum SwarmMessage {
    /// Application data sent agent to agent
    Direct(serde_json::Value),
    /// Cast a vote on `proposal` for `round` via `submit_vote`
    VoteRequest { proposal: Arc<Proposal>, round: u32 },
    /// Answer via `submit_state` with the same `request_id`
    StateRequest { request_id: String, query: StateQuery },
    /// Resolved state to adopt
    StateUpdate(StateVersion),
    /// A Raft log entry committed
    RaftCommit {
        proposal_id: ProposalId,
        term: u64,
        index: u64,
    },
    /// Push the current view on `proposal` to each of `peers`, then report
    /// via `submit_gossip` with the same `request_id`
    GossipRound {
        request_id: String,
        proposal: Arc<Proposal>,
        round: u32,
        peers: Vec<AgentId>,
    },
    /// A peer's view, pushed during `round`
    GossipPush {
        proposal_id: ProposalId,
        round: u32,
        view: GossipView,
    },
    /// Gossip on this proposal is over
    GossipDone { proposal_id: ProposalId },
}

impl SwarmMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Direct(_) => "direct",
            Self::VoteRequest { .. } => "vote_request",
            Self::StateRequest { .. } => "state_request",
            Self::StateUpdate(_) => "state_update",
            Self::RaftCommit { .. } => "raft_commit",
            Self::GossipRound { .. } => "gossip_round",
            Self::GossipPush { .. } => "gossip_push",
            Self::GossipDone { .. } => "gossip_done",
        }
    }
}

/// A message in flight
#[derive(Debug, Clone)]
pub struct Envelope {
    /// `None` for control-plane messages from the coordinator itself
    pub from: Option<AgentId>,
    pub to: AgentId,
    /// Topology hops taken, endpoints included
    pub path: Vec<AgentId>,
    pub message: SwarmMessage,
    pub sent_at: Instant,
}

/// Receiving half of an agent's mailbox
#[derive(Debug)]
pub struct AgentInbox {
    agent_id: AgentId,
    receiver: mpsc::Receiver<Envelope>,
    stats: Arc<MessageStats>,
}

impl AgentInbox {
    pub(crate) fn new(
        agent_id: AgentId,
        receiver: mpsc::Receiver<Envelope>,
        stats: Arc<MessageStats>,
    ) -> Self {
        Self {
            agent_id,
            receiver,
            stats,
        }
    }

    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    /// Next envelope; `None` once the agent is unregistered
    pub async fn recv(&mut self) -> Option<Envelope> {
        let envelope = self.receiver.recv().await?;
        self.stats
            .record_delivery(Instant::now().saturating_duration_since(envelope.sent_at));
        Some(envelope)
    }

    /// Non-blocking receive
    pub fn try_recv(&mut self) -> Option<Envelope> {
        let envelope = self.receiver.try_recv().ok()?;
        self.stats
            .record_delivery(Instant::now().saturating_duration_since(envelope.sent_at));
        Some(envelope)
    }
}

/// Create a bounded mailbox
pub(crate) fn mailbox(
    agent_id: AgentId,
    capacity: usize,
    stats: Arc<MessageStats>,
) -> (mpsc::Sender<Envelope>, AgentInbox) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (tx, AgentInbox::new(agent_id, rx, stats))
}
