//! Swarm error types
//!
//! A single typed error taxonomy shared by the coordinator, the consensus
//! algorithms, and the state synchronizer. Timeouts that are valid terminal
//! outcomes (`Decision::Timeout`) are *not* errors; the `ConsensusTimeout`
//! and `SyncTimeout` variants are reserved for call sites where no partial
//! result can be produced.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::topology::TopologyError;
use crate::types::{AgentId, AgentStatus, ProposalId, SwarmId};

/// Result type alias for swarm operations
pub type SwarmResult<T> = Result<T, SwarmError>;

/// Errors surfaced by the coordination core
#[derive(Error, Debug)]
pub enum SwarmError {
    /// Operation referenced an agent that is not registered
    #[error("Unknown agent: {0}")]
    UnknownAgent(AgentId),

    /// Operation referenced a swarm this component does not serve
    #[error("Unknown swarm: {0}")]
    UnknownSwarm(SwarmId),

    /// No usable path to the target agent
    #[error("Agent {to} unreachable from {from}: {reason}")]
    Unreachable {
        from: AgentId,
        to: AgentId,
        reason: String,
    },

    /// Consensus could not produce even a partial result before the deadline
    #[error("Consensus on {proposal_id} timed out after {elapsed_ms}ms")]
    ConsensusTimeout {
        proposal_id: ProposalId,
        elapsed_ms: u64,
    },

    /// Not enough responders to synchronize state within the window
    #[error("Sync of '{state_key}' timed out: {responded}/{required} responders")]
    SyncTimeout {
        state_key: String,
        responded: usize,
        required: usize,
    },

    /// The algorithm's participation precondition does not hold
    #[error("Insufficient participants for {algorithm}: have {have}, need {need}")]
    InsufficientParticipants {
        algorithm: String,
        have: usize,
        need: usize,
    },

    /// Proposal failed validation
    #[error("Malformed proposal {proposal_id}: {reason}")]
    MalformedProposal {
        proposal_id: ProposalId,
        reason: String,
    },

    /// Agent status change not permitted by the state machine
    #[error("Invalid status transition for {agent_id}: {from} -> {to}")]
    InvalidTransition {
        agent_id: AgentId,
        from: AgentStatus,
        to: AgentStatus,
    },

    /// No implementation registered for the requested algorithm
    #[error("Consensus algorithm not registered: {0}")]
    AlgorithmNotRegistered(String),

    /// Topology shape violation
    #[error("Topology error: {0}")]
    Topology(#[from] TopologyError),

    /// No agent, provider, or local log holds the requested key
    #[error("State not found: {0}")]
    StateNotFound(String),

    /// MemoryProvider failure
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl SwarmError {
    /// Create an unreachable error
    pub fn unreachable(from: &AgentId, to: &AgentId, reason: impl Into<String>) -> Self {
        Self::Unreachable {
            from: from.clone(),
            to: to.clone(),
            reason: reason.into(),
        }
    }

    /// Create a malformed proposal error
    pub fn malformed(proposal_id: &ProposalId, reason: impl Into<String>) -> Self {
        Self::MalformedProposal {
            proposal_id: proposal_id.clone(),
            reason: reason.into(),
        }
    }

    /// Create an insufficient participants error
    pub fn insufficient(algorithm: impl Into<String>, have: usize, need: usize) -> Self {
        Self::InsufficientParticipants {
            algorithm: algorithm.into(),
            have,
            need,
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownAgent(_) => "UNKNOWN_AGENT",
            Self::UnknownSwarm(_) => "UNKNOWN_SWARM",
            Self::Unreachable { .. } => "UNREACHABLE",
            Self::ConsensusTimeout { .. } => "CONSENSUS_TIMEOUT",
            Self::SyncTimeout { .. } => "SYNC_TIMEOUT",
            Self::InsufficientParticipants { .. } => "INSUFFICIENT_PARTICIPANTS",
            Self::MalformedProposal { .. } => "MALFORMED_PROPOSAL",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::AlgorithmNotRegistered(_) => "ALGORITHM_NOT_REGISTERED",
            Self::Topology(_) => "TOPOLOGY",
            Self::StateNotFound(_) => "STATE_NOT_FOUND",
            Self::Persistence(_) => "PERSISTENCE",
            Self::Config { .. } => "CONFIG",
        }
    }

    /// Check if this error is retryable (transient failure)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Unreachable { .. }
                | Self::ConsensusTimeout { .. }
                | Self::SyncTimeout { .. }
                | Self::Persistence(_)
        )
    }

    /// Get recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            Self::UnknownAgent(_) => "Register the agent before addressing it.",
            Self::UnknownSwarm(_) => "Use the swarm id reported by the coordinator.",
            Self::Unreachable { .. } => {
                "Retry after the topology stabilizes or re-home agents routed through a failed hop."
            }
            Self::ConsensusTimeout { .. } => "Retry with a longer timeout.",
            Self::SyncTimeout { .. } => {
                "Retry once more agents are healthy, or lower the sync quorum."
            }
            Self::InsufficientParticipants { .. } => {
                "Register more agents or choose an algorithm with weaker participation requirements."
            }
            Self::MalformedProposal { .. } => {
                "Use a threshold within [0, 1] and at least one option."
            }
            Self::InvalidTransition { .. } => {
                "Failed agents must be re-registered before they accept work."
            }
            Self::AlgorithmNotRegistered(_) => "Register the algorithm with the ConsensusManager.",
            Self::Topology(_) => "Inspect get_topology_info and switch topology if needed.",
            Self::StateNotFound(_) => "Write the key on at least one agent before synchronizing it.",
            Self::Persistence(_) => "Retry the write; the resolved state is still held in memory.",
            Self::Config { .. } => "Fix the configuration value and restart.",
        }
    }

    /// Convert into a serializable error for external collaborators
    pub fn to_structured(&self) -> StructuredError {
        let mut err = StructuredError::new(self.code(), self.to_string(), self.recovery_suggestion());
        if self.is_retryable() {
            err = err.retryable();
        }
        match self {
            Self::UnknownAgent(id) => err.with_context("agent_id", id.to_string()),
            Self::Unreachable { from, to, .. } => err
                .with_context("from", from.to_string())
                .with_context("to", to.to_string()),
            Self::ConsensusTimeout { proposal_id, .. }
            | Self::MalformedProposal { proposal_id, .. } => {
                err.with_context("proposal_id", proposal_id.to_string())
            }
            Self::SyncTimeout { state_key, .. } | Self::StateNotFound(state_key) => {
                err.with_context("state_key", state_key.clone())
            }
            _ => err,
        }
    }
}

/// Structured error response for collaborators that cannot match on `SwarmError`.
///
/// ```json
/// {
///   "code": "UNREACHABLE",
///   "message": "Agent b unreachable from a: hop hub failed",
///   "recovery_action": "Retry after the topology stabilizes ...",
///   "context": { "from": "a", "to": "b" },
///   "retryable": true
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Machine-readable error code
    pub code: String,

    /// Human-readable error message
    pub message: String,

    /// Actionable recovery instruction
    pub recovery_action: String,

    /// Relevant context for debugging and recovery
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,

    /// Whether this error is retryable (transient failure)
    #[serde(default)]
    pub retryable: bool,
}

impl StructuredError {
    /// Create a new structured error
    pub fn new(
        code: impl Into<String>,
        message: impl Into<String>,
        recovery_action: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            recovery_action: recovery_action.into(),
            context: HashMap::new(),
            retryable: false,
        }
    }

    /// Add context key-value pair
    pub fn with_context(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Mark as retryable
    pub fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }
}

impl std::fmt::Display for StructuredError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for StructuredError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        let a = AgentId::new("a");
        let b = AgentId::new("b");
        assert!(SwarmError::unreachable(&a, &b, "no route").is_retryable());
        assert!(!SwarmError::UnknownAgent(a.clone()).is_retryable());
        assert!(!SwarmError::insufficient("byzantine", 3, 4).is_retryable());
        assert!(SwarmError::SyncTimeout {
            state_key: "cfg".to_string(),
            responded: 1,
            required: 3,
        }
        .is_retryable());
    }

    #[test]
    fn test_structured_error_context() {
        let a = AgentId::new("worker-1");
        let hub = AgentId::new("hub");
        let structured = SwarmError::unreachable(&a, &hub, "hop failed").to_structured();

        assert_eq!(structured.code, "UNREACHABLE");
        assert!(structured.retryable);
        assert_eq!(structured.context["from"], "worker-1");
        assert_eq!(structured.context["to"], "hub");

        let json = serde_json::to_value(&structured).unwrap();
        assert_eq!(json["code"], "UNREACHABLE");
    }

    #[test]
    fn test_malformed_proposal_display() {
        let id = ProposalId::from("p-1");
        let err = SwarmError::malformed(&id, "threshold 1.5 outside [0, 1]");
        assert_eq!(
            err.to_string(),
            "Malformed proposal p-1: threshold 1.5 outside [0, 1]"
        );
        assert_eq!(err.code(), "MALFORMED_PROPOSAL");
    }
}
