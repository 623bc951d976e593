//! Event types for swarm coordination
//!
//! These events are the outbound metrics/observability surface of the
//! coordinator. Nothing in the core depends on them being received.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::topology::TopologyKind;
use crate::types::{
    AgentId, AgentStatus, AlgorithmKind, Decision, HealthState, ProposalId, SwarmId,
};

/// All swarm coordination events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SwarmEvent {
    /// An agent joined, or re-joined after failing
    AgentRegistered {
        swarm_id: SwarmId,
        agent_id: AgentId,
        revived: bool,
        timestamp: DateTime<Utc>,
    },

    /// An agent left the swarm
    AgentUnregistered {
        swarm_id: SwarmId,
        agent_id: AgentId,
        timestamp: DateTime<Utc>,
    },

    /// Lifecycle status changed
    AgentStatusChanged {
        agent_id: AgentId,
        from: AgentStatus,
        to: AgentStatus,
        timestamp: DateTime<Utc>,
    },

    /// Heartbeat scan reclassified an agent
    AgentHealthChanged {
        agent_id: AgentId,
        from: HealthState,
        to: HealthState,
        timestamp: DateTime<Utc>,
    },

    /// A message reached the target mailbox
    MessageDelivered {
        from: AgentId,
        to: AgentId,
        hops: usize,
        timestamp: DateTime<Utc>,
    },

    /// A message could not be delivered
    MessageUndeliverable {
        from: AgentId,
        to: AgentId,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Topology strategy (or Adaptive delegate) changed
    TopologySwitched {
        from: TopologyKind,
        to: TopologyKind,
        agent_count: usize,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A consensus run began
    ConsensusStarted {
        proposal_id: ProposalId,
        algorithm: AlgorithmKind,
        participants: usize,
        timestamp: DateTime<Utc>,
    },

    /// A consensus run reached a terminal decision
    ConsensusCompleted {
        proposal_id: ProposalId,
        algorithm: AlgorithmKind,
        decision: Decision,
        votes_for: usize,
        votes_against: usize,
        abstain: usize,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A Raft election produced a leader
    LeaderElected {
        agent_id: AgentId,
        term: u64,
        timestamp: DateTime<Utc>,
    },

    /// Byzantine voting caught an agent voting inconsistently
    AgentFlaggedMalicious {
        agent_id: AgentId,
        proposal_id: ProposalId,
        timestamp: DateTime<Utc>,
    },

    /// A state key was resolved and broadcast
    StateSynchronized {
        state_key: String,
        version: u64,
        responders: usize,
        divergent: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// The memory provider rejected a write
    PersistFailed {
        state_key: String,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl SwarmEvent {
    /// Get the timestamp of this event
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            SwarmEvent::AgentRegistered { timestamp, .. } => *timestamp,
            SwarmEvent::AgentUnregistered { timestamp, .. } => *timestamp,
            SwarmEvent::AgentStatusChanged { timestamp, .. } => *timestamp,
            SwarmEvent::AgentHealthChanged { timestamp, .. } => *timestamp,
            SwarmEvent::MessageDelivered { timestamp, .. } => *timestamp,
            SwarmEvent::MessageUndeliverable { timestamp, .. } => *timestamp,
            SwarmEvent::TopologySwitched { timestamp, .. } => *timestamp,
            SwarmEvent::ConsensusStarted { timestamp, .. } => *timestamp,
            SwarmEvent::ConsensusCompleted { timestamp, .. } => *timestamp,
            SwarmEvent::LeaderElected { timestamp, .. } => *timestamp,
            SwarmEvent::AgentFlaggedMalicious { timestamp, .. } => *timestamp,
            SwarmEvent::StateSynchronized { timestamp, .. } => *timestamp,
            SwarmEvent::PersistFailed { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            SwarmEvent::AgentRegistered { .. } => "agent_registered",
            SwarmEvent::AgentUnregistered { .. } => "agent_unregistered",
            SwarmEvent::AgentStatusChanged { .. } => "agent_status_changed",
            SwarmEvent::AgentHealthChanged { .. } => "agent_health_changed",
            SwarmEvent::MessageDelivered { .. } => "message_delivered",
            SwarmEvent::MessageUndeliverable { .. } => "message_undeliverable",
            SwarmEvent::TopologySwitched { .. } => "topology_switched",
            SwarmEvent::ConsensusStarted { .. } => "consensus_started",
            SwarmEvent::ConsensusCompleted { .. } => "consensus_completed",
            SwarmEvent::LeaderElected { .. } => "leader_elected",
            SwarmEvent::AgentFlaggedMalicious { .. } => "agent_flagged_malicious",
            SwarmEvent::StateSynchronized { .. } => "state_synchronized",
            SwarmEvent::PersistFailed { .. } => "persist_failed",
        }
    }

    /// Get the agent ID if this event is agent-scoped
    pub fn agent_id(&self) -> Option<&AgentId> {
        match self {
            SwarmEvent::AgentRegistered { agent_id, .. } => Some(agent_id),
            SwarmEvent::AgentUnregistered { agent_id, .. } => Some(agent_id),
            SwarmEvent::AgentStatusChanged { agent_id, .. } => Some(agent_id),
            SwarmEvent::AgentHealthChanged { agent_id, .. } => Some(agent_id),
            SwarmEvent::MessageDelivered { to, .. } => Some(to),
            SwarmEvent::MessageUndeliverable { to, .. } => Some(to),
            SwarmEvent::LeaderElected { agent_id, .. } => Some(agent_id),
            SwarmEvent::AgentFlaggedMalicious { agent_id, .. } => Some(agent_id),
            _ => None,
        }
    }

    /// Get the proposal ID if this event is proposal-scoped
    pub fn proposal_id(&self) -> Option<&ProposalId> {
        match self {
            SwarmEvent::ConsensusStarted { proposal_id, .. } => Some(proposal_id),
            SwarmEvent::ConsensusCompleted { proposal_id, .. } => Some(proposal_id),
            SwarmEvent::AgentFlaggedMalicious { proposal_id, .. } => Some(proposal_id),
            _ => None,
        }
    }

    /// Duration carried by timed events
    pub fn duration_ms(&self) -> Option<u64> {
        match self {
            SwarmEvent::TopologySwitched { duration_ms, .. } => Some(*duration_ms),
            SwarmEvent::ConsensusCompleted { duration_ms, .. } => Some(*duration_ms),
            SwarmEvent::StateSynchronized { duration_ms, .. } => Some(*duration_ms),
            _ => None,
        }
    }

    /// Flat record for metrics collaborators
    pub fn metric_record(&self) -> MetricRecord {
        MetricRecord {
            event_type: self.event_type().to_string(),
            agent_id: self.agent_id().cloned(),
            duration_ms: self.duration_ms(),
            proposal_id: self.proposal_id().cloned(),
            timestamp: self.timestamp(),
        }
    }
}

/// `{event_type, agent_id, duration, proposal_id}` record emitted for metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub event_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposal_id: Option<ProposalId>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = SwarmEvent::LeaderElected {
            agent_id: AgentId::new("a"),
            term: 3,
            timestamp: Utc::now(),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"leader_elected\""));
        let parsed: SwarmEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.event_type(), "leader_elected");
    }

    #[test]
    fn test_metric_record() {
        let event = SwarmEvent::ConsensusCompleted {
            proposal_id: ProposalId::from("p-1"),
            algorithm: AlgorithmKind::Quorum,
            decision: Decision::Approved,
            votes_for: 3,
            votes_against: 1,
            abstain: 0,
            duration_ms: 42,
            timestamp: Utc::now(),
        };

        let record = event.metric_record();
        assert_eq!(record.event_type, "consensus_completed");
        assert_eq!(record.proposal_id, Some(ProposalId::from("p-1")));
        assert_eq!(record.duration_ms, Some(42));
        assert_eq!(record.agent_id, None);

        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("agent_id").is_none());
    }
}
