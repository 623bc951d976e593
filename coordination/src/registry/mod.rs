//! Agent registry: identity, lifecycle status, and heartbeat health
//!
//! Tracks which agents are registered, their status state machine, and the
//! heartbeat age that drives health classification. The registry is the
//! sole owner of `Agent` records; topologies and protocols refer to agents
//! only by id.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::error::{SwarmError, SwarmResult};
use crate::types::{
    Agent, AgentId, AgentMetadata, AgentSnapshot, AgentStatus, HealthState, HealthSummary,
    TopologyRole,
};

/// How a `register` call was applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationOutcome {
    /// Fresh registration
    New,
    /// A Failed agent re-registered and is Active again
    Revived,
    /// Already registered and not Failed; nothing changed
    AlreadyRegistered,
}

impl RegistrationOutcome {
    /// Whether the call changed the registry
    pub fn is_change(self) -> bool {
        !matches!(self, Self::AlreadyRegistered)
    }
}

/// Health change observed by a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthChange {
    pub agent_id: AgentId,
    pub from: HealthState,
    pub to: HealthState,
    /// Status moved to Failed as a consequence
    pub failed: bool,
}

/// Registry of all agents in one swarm
#[derive(Debug)]
pub struct AgentRegistry {
    agents: HashMap<AgentId, Agent>,
    heartbeat_interval: Duration,
    next_sequence: u64,
}

impl AgentRegistry {
    pub fn new(heartbeat_interval: Duration) -> Self {
        Self {
            agents: HashMap::new(),
            heartbeat_interval,
            next_sequence: 0,
        }
    }

    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    /// Register an agent. Idempotent for live agents; revives Failed ones.
    pub fn register(
        &mut self,
        id: AgentId,
        metadata: AgentMetadata,
        now: Instant,
    ) -> RegistrationOutcome {
        if let Some(agent) = self.agents.get_mut(&id) {
            if agent.status != AgentStatus::Failed {
                return RegistrationOutcome::AlreadyRegistered;
            }
            agent.status = AgentStatus::Active;
            agent.role = metadata.role.clone();
            agent.metadata = metadata;
            agent.last_heartbeat = now;
            agent.last_heartbeat_at = Utc::now();
            agent.last_health = HealthState::Healthy;
            return RegistrationOutcome::Revived;
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.agents
            .insert(id.clone(), Agent::new(id, metadata, now, sequence));
        RegistrationOutcome::New
    }

    pub fn unregister(&mut self, id: &AgentId) -> Option<Agent> {
        self.agents.remove(id)
    }

    pub fn get(&self, id: &AgentId) -> Option<&Agent> {
        self.agents.get(id)
    }

    pub fn contains(&self, id: &AgentId) -> bool {
        self.agents.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// All ids in registration order
    pub fn ids(&self) -> Vec<AgentId> {
        let mut agents: Vec<&Agent> = self.agents.values().collect();
        agents.sort_by_key(|a| a.sequence);
        agents.into_iter().map(|a| a.id.clone()).collect()
    }

    /// Record a heartbeat. Older timestamps than the last one are ignored,
    /// and a Failed agent stays Failed until it re-registers.
    pub fn record_heartbeat(&mut self, id: &AgentId, at: Instant) -> SwarmResult<()> {
        let agent = self
            .agents
            .get_mut(id)
            .ok_or_else(|| SwarmError::UnknownAgent(id.clone()))?;
        if agent.status == AgentStatus::Failed {
            return Ok(());
        }
        if at > agent.last_heartbeat {
            agent.last_heartbeat = at;
            agent.last_heartbeat_at = Utc::now();
        }
        Ok(())
    }

    /// Caller-initiated status change, checked against the state machine.
    /// Returns the previous status.
    pub fn transition(&mut self, id: &AgentId, to: AgentStatus) -> SwarmResult<AgentStatus> {
        let agent = self
            .agents
            .get_mut(id)
            .ok_or_else(|| SwarmError::UnknownAgent(id.clone()))?;
        let from = agent.status;
        if !from.can_transition_to(to) {
            return Err(SwarmError::InvalidTransition {
                agent_id: id.clone(),
                from,
                to,
            });
        }
        if from == AgentStatus::Busy && to != AgentStatus::Busy {
            agent.tasks_completed += 1;
        }
        agent.status = to;
        Ok(from)
    }

    /// Reclassify every agent's health at `now`. Agents whose health reaches
    /// Failed are marked Failed. Returns only the agents whose health changed.
    pub fn scan(&mut self, now: Instant) -> Vec<HealthChange> {
        let interval = self.heartbeat_interval;
        let mut changes = Vec::new();
        for agent in self.agents.values_mut() {
            if agent.status == AgentStatus::Failed {
                continue;
            }
            let health = agent.health(now, interval);
            if health == agent.last_health {
                continue;
            }
            let failed = health == HealthState::Failed;
            if failed {
                agent.status = AgentStatus::Failed;
            }
            changes.push(HealthChange {
                agent_id: agent.id.clone(),
                from: agent.last_health,
                to: health,
                failed,
            });
            agent.last_health = health;
        }
        changes.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        changes
    }

    pub fn health_summary(&self, now: Instant) -> HealthSummary {
        let mut summary = HealthSummary::default();
        for agent in self.agents.values() {
            let health = if agent.status == AgentStatus::Failed {
                HealthState::Failed
            } else {
                agent.health(now, self.heartbeat_interval)
            };
            summary.record(health);
        }
        summary
    }

    /// Agents expected to answer requests, in registration order
    pub fn responsive(&self, now: Instant) -> Vec<AgentId> {
        let mut agents: Vec<&Agent> = self
            .agents
            .values()
            .filter(|a| a.is_responsive(now, self.heartbeat_interval))
            .collect();
        agents.sort_by_key(|a| a.sequence);
        agents.into_iter().map(|a| a.id.clone()).collect()
    }

    /// Agents not marked Failed, in registration order
    pub fn active(&self) -> Vec<AgentId> {
        let mut agents: Vec<&Agent> = self
            .agents
            .values()
            .filter(|a| a.status != AgentStatus::Failed)
            .collect();
        agents.sort_by_key(|a| a.sequence);
        agents.into_iter().map(|a| a.id.clone()).collect()
    }

    pub fn set_topology_role(&mut self, id: &AgentId, role: TopologyRole) {
        if let Some(agent) = self.agents.get_mut(id) {
            agent.topology_role = role;
        }
    }

    pub fn snapshot(&self, id: &AgentId, now: Instant) -> SwarmResult<AgentSnapshot> {
        self.agents
            .get(id)
            .map(|a| a.snapshot(now, self.heartbeat_interval))
            .ok_or_else(|| SwarmError::UnknownAgent(id.clone()))
    }
}
