//! Proposals, votes, and consensus results

use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::agent::AgentId;
use crate::error::{SwarmError, SwarmResult};

/// Identifier of a proposal
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProposalId(String);

impl ProposalId {
    /// Generate a new random proposal id
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ProposalId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ProposalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProposalId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Threshold presets for quorum voting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuorumPreset {
    Simple,
    Supermajority,
    Strong,
    Unanimous,
}

impl QuorumPreset {
    pub fn threshold(self) -> f64 {
        match self {
            Self::Simple => 0.51,
            Self::Supermajority => 0.66,
            Self::Strong => 0.75,
            Self::Unanimous => 1.0,
        }
    }
}

/// A question put to the swarm. Immutable once broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub proposal_id: ProposalId,
    pub payload: serde_json::Value,
    pub options: Vec<String>,
    /// Required approval fraction in `[0, 1]`
    pub threshold: f64,
    /// Window for a single vote-collection round
    pub timeout: Duration,
}

impl Proposal {
    /// Create a proposal with a simple-majority threshold and approve/reject options
    pub fn new(payload: serde_json::Value) -> Self {
        Self {
            proposal_id: ProposalId::new(),
            payload,
            options: vec!["approve".to_string(), "reject".to_string()],
            threshold: QuorumPreset::Simple.threshold(),
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_id(mut self, proposal_id: impl Into<ProposalId>) -> Self {
        self.proposal_id = proposal_id.into();
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_preset(mut self, preset: QuorumPreset) -> Self {
        self.threshold = preset.threshold();
        self
    }

    pub fn with_options(mut self, options: Vec<String>) -> Self {
        self.options = options;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Reject thresholds outside `[0, 1]`, empty options, and a zero round window
    pub fn validate(&self) -> SwarmResult<()> {
        if !self.threshold.is_finite() || !(0.0..=1.0).contains(&self.threshold) {
            return Err(SwarmError::malformed(
                &self.proposal_id,
                format!("threshold {} outside [0, 1]", self.threshold),
            ));
        }
        if self.options.is_empty() {
            return Err(SwarmError::malformed(&self.proposal_id, "no options"));
        }
        if self.options.iter().any(|o| o.trim().is_empty()) {
            return Err(SwarmError::malformed(&self.proposal_id, "blank option"));
        }
        if self.timeout.is_zero() {
            return Err(SwarmError::malformed(&self.proposal_id, "zero timeout"));
        }
        Ok(())
    }
}

impl From<String> for ProposalId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A single agent's choice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoteChoice {
    For,
    Against,
    Abstain,
}

impl std::fmt::Display for VoteChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::For => write!(f, "for"),
            Self::Against => write!(f, "against"),
            Self::Abstain => write!(f, "abstain"),
        }
    }
}

/// A vote cast by an agent in one round of a proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub agent_id: AgentId,
    pub proposal_id: ProposalId,
    pub choice: VoteChoice,
    pub round: u32,
}

impl Vote {
    pub fn new(
        agent_id: impl Into<AgentId>,
        proposal_id: ProposalId,
        choice: VoteChoice,
        round: u32,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            proposal_id,
            choice,
            round,
        }
    }
}

/// Terminal outcome of a proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approved,
    Rejected,
    /// Valid terminal state: the deadline passed before a decision was determined
    Timeout,
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

/// Vote counts by choice
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteTally {
    pub votes_for: usize,
    pub votes_against: usize,
    pub abstain: usize,
}

impl VoteTally {
    pub fn from_votes<'a>(votes: impl IntoIterator<Item = &'a Vote>) -> Self {
        let mut tally = Self::default();
        for vote in votes {
            tally.add(vote.choice);
        }
        tally
    }

    pub fn add(&mut self, choice: VoteChoice) {
        match choice {
            VoteChoice::For => self.votes_for += 1,
            VoteChoice::Against => self.votes_against += 1,
            VoteChoice::Abstain => self.abstain += 1,
        }
    }

    /// Votes that count toward the approval rate
    pub fn decisive(&self) -> usize {
        self.votes_for + self.votes_against
    }

    pub fn total(&self) -> usize {
        self.decisive() + self.abstain
    }

    /// `votes_for / (votes_for + votes_against)`; abstentions are excluded.
    /// `None` when no decisive vote was cast.
    pub fn approval_rate(&self) -> Option<f64> {
        match self.decisive() {
            0 => None,
            n => Some(self.votes_for as f64 / n as f64),
        }
    }

    /// Whether this tally meets `threshold`. A tally without decisive votes never does.
    pub fn meets(&self, threshold: f64) -> bool {
        self.approval_rate().is_some_and(|rate| rate >= threshold)
    }
}

/// Consensus algorithm family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmKind {
    Quorum,
    Raft,
    Byzantine,
    Gossip,
    Crdt,
}

impl AlgorithmKind {
    pub fn all() -> &'static [AlgorithmKind] {
        &[
            Self::Quorum,
            Self::Raft,
            Self::Byzantine,
            Self::Gossip,
            Self::Crdt,
        ]
    }
}

impl std::fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Quorum => write!(f, "quorum"),
            Self::Raft => write!(f, "raft"),
            Self::Byzantine => write!(f, "byzantine"),
            Self::Gossip => write!(f, "gossip"),
            Self::Crdt => write!(f, "crdt"),
        }
    }
}

impl std::str::FromStr for AlgorithmKind {
    type Err = SwarmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "quorum" => Ok(Self::Quorum),
            "raft" => Ok(Self::Raft),
            "byzantine" | "bft" => Ok(Self::Byzantine),
            "gossip" => Ok(Self::Gossip),
            "crdt" => Ok(Self::Crdt),
            other => Err(SwarmError::AlgorithmNotRegistered(other.to_string())),
        }
    }
}

/// Terminal, immutable result of a proposal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub proposal_id: ProposalId,
    pub algorithm: AlgorithmKind,
    pub decision: Decision,
    pub votes_for: usize,
    pub votes_against: usize,
    pub abstain: usize,
    pub participants: Vec<AgentId>,
    #[serde(default)]
    pub algorithm_metadata: serde_json::Map<String, serde_json::Value>,
    pub duration: Duration,
}

impl ConsensusResult {
    pub fn new(
        proposal_id: ProposalId,
        algorithm: AlgorithmKind,
        decision: Decision,
        tally: VoteTally,
        participants: Vec<AgentId>,
    ) -> Self {
        Self {
            proposal_id,
            algorithm,
            decision,
            votes_for: tally.votes_for,
            votes_against: tally.votes_against,
            abstain: tally.abstain,
            participants,
            algorithm_metadata: serde_json::Map::new(),
            duration: Duration::ZERO,
        }
    }

    /// Attach algorithm-specific detail
    pub fn with_metadata(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.algorithm_metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn tally(&self) -> VoteTally {
        VoteTally {
            votes_for: self.votes_for,
            votes_against: self.votes_against,
            abstain: self.abstain,
        }
    }

    pub fn is_approved(&self) -> bool {
        self.decision == Decision::Approved
    }
}
