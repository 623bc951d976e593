//! Core data model for swarm coordination
//!
//! - [`agent`]: agent identity, lifecycle status, and derived heartbeat health
//! - [`proposal`]: proposals, votes, and terminal consensus results
//! - [`state`]: versioned state replicated across agents

pub mod agent;
pub mod proposal;
pub mod state;

pub use agent::{
    Agent, AgentId, AgentMetadata, AgentSnapshot, AgentStatus, HealthState, HealthSummary,
    SwarmId, TopologyRole,
};
pub use proposal::{
    AlgorithmKind, ConsensusResult, Decision, Proposal, ProposalId, QuorumPreset, Vote,
    VoteChoice, VoteTally,
};
pub use state::{now_millis, StateValue, StateVersion};
