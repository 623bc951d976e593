//! Agent identity, lifecycle status, and heartbeat-derived health

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use uuid::Uuid;

/// Identifier of an agent, chosen by the external caller that registers it
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for AgentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Unique identifier for a swarm (one coordinator instance)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SwarmId(pub Uuid);

impl SwarmId {
    /// Generate a new random `SwarmId`.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SwarmId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SwarmId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of an agent.
///
/// ```text
/// Active ⇄ Busy          (task assignment / completion)
/// Active, Busy → Idle    (no task)
/// Idle → Active, Busy
/// any → Failed           (heartbeat scan only)
/// Failed → Active        (re-registration only)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Active,
    Idle,
    Busy,
    Failed,
}

impl AgentStatus {
    /// Whether a caller-initiated transition to `to` is permitted.
    ///
    /// Transitions into and out of `Failed` are owned by the heartbeat scan
    /// and re-registration respectively, so they are never caller-initiated.
    pub fn can_transition_to(self, to: AgentStatus) -> bool {
        use AgentStatus::*;
        match (self, to) {
            (from, to) if from == to => from != Failed,
            (Active, Busy) | (Busy, Active) => true,
            (Active, Idle) | (Busy, Idle) => true,
            (Idle, Active) | (Idle, Busy) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Idle => write!(f, "idle"),
            Self::Busy => write!(f, "busy"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Health derived purely from heartbeat age
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    /// Heard from within one interval
    Healthy,
    /// One interval missed
    Degraded,
    /// Two intervals missed
    Critical,
    /// Three intervals missed
    Failed,
}

impl HealthState {
    /// Classify a heartbeat age against the configured interval.
    pub fn from_age(age: Duration, interval: Duration) -> Self {
        if age <= interval {
            Self::Healthy
        } else if age <= interval * 2 {
            Self::Degraded
        } else if age <= interval * 3 {
            Self::Critical
        } else {
            Self::Failed
        }
    }

    /// Whether an agent in this state is expected to answer requests.
    pub fn is_responsive(self) -> bool {
        matches!(self, Self::Healthy | Self::Degraded)
    }
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Critical => write!(f, "critical"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Counts of agents per health state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSummary {
    pub healthy: usize,
    pub degraded: usize,
    pub critical: usize,
    pub failed: usize,
}

impl HealthSummary {
    pub fn record(&mut self, health: HealthState) {
        match health {
            HealthState::Healthy => self.healthy += 1,
            HealthState::Degraded => self.degraded += 1,
            HealthState::Critical => self.critical += 1,
            HealthState::Failed => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.healthy + self.degraded + self.critical + self.failed
    }

    /// Worst health present, if any agent is tracked
    pub fn worst(&self) -> Option<HealthState> {
        if self.failed > 0 {
            Some(HealthState::Failed)
        } else if self.critical > 0 {
            Some(HealthState::Critical)
        } else if self.degraded > 0 {
            Some(HealthState::Degraded)
        } else if self.healthy > 0 {
            Some(HealthState::Healthy)
        } else {
            None
        }
    }
}

/// Position an agent occupies in the active topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopologyRole {
    /// Fully connected mesh member
    Peer,
    /// Star center
    Hub,
    /// Star leaf
    Spoke,
    /// Tree root
    Root,
    /// Interior tree node at the given depth
    Branch { depth: usize },
    /// Tree leaf at the given depth
    Leaf { depth: usize },
    /// Ring member
    RingMember,
    /// Not yet placed in a topology
    Unassigned,
}

impl std::fmt::Display for TopologyRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Peer => write!(f, "peer"),
            Self::Hub => write!(f, "hub"),
            Self::Spoke => write!(f, "spoke"),
            Self::Root => write!(f, "root"),
            Self::Branch { depth } => write!(f, "branch@{}", depth),
            Self::Leaf { depth } => write!(f, "leaf@{}", depth),
            Self::RingMember => write!(f, "ring_member"),
            Self::Unassigned => write!(f, "unassigned"),
        }
    }
}

/// Caller-supplied description of an agent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentMetadata {
    /// Functional role (e.g. "coder", "reviewer")
    pub role: String,
    /// Advertised capabilities
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Free-form labels
    #[serde(default)]
    pub labels: HashMap<String, String>,
}

impl AgentMetadata {
    pub fn new(role: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            ..Self::default()
        }
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.push(capability.into());
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// A registered agent. Owned exclusively by the `AgentRegistry`.
#[derive(Debug, Clone)]
pub struct Agent {
    pub id: AgentId,
    pub role: String,
    pub status: AgentStatus,
    pub metadata: AgentMetadata,
    /// Monotonic time of the last heartbeat
    pub last_heartbeat: Instant,
    /// Wall-clock time of the last heartbeat, for reporting
    pub last_heartbeat_at: DateTime<Utc>,
    pub registered_at: DateTime<Utc>,
    pub topology_role: TopologyRole,
    /// Health observed by the most recent scan
    pub last_health: HealthState,
    pub tasks_completed: u64,
    /// Registration order, used to keep topology rebuilds stable
    pub(crate) sequence: u64,
}

impl Agent {
    pub fn new(id: AgentId, metadata: AgentMetadata, now: Instant, sequence: u64) -> Self {
        let wall = Utc::now();
        Self {
            id,
            role: metadata.role.clone(),
            status: AgentStatus::Active,
            metadata,
            last_heartbeat: now,
            last_heartbeat_at: wall,
            registered_at: wall,
            topology_role: TopologyRole::Unassigned,
            last_health: HealthState::Healthy,
            tasks_completed: 0,
            sequence,
        }
    }

    /// Health at `now` given the heartbeat interval
    pub fn health(&self, now: Instant, interval: Duration) -> HealthState {
        HealthState::from_age(now.saturating_duration_since(self.last_heartbeat), interval)
    }

    /// Whether the agent should be asked to participate in a protocol round
    pub fn is_responsive(&self, now: Instant, interval: Duration) -> bool {
        self.status != AgentStatus::Failed && self.health(now, interval).is_responsive()
    }

    pub fn snapshot(&self, now: Instant, interval: Duration) -> AgentSnapshot {
        let age = now.saturating_duration_since(self.last_heartbeat);
        AgentSnapshot {
            id: self.id.clone(),
            role: self.role.clone(),
            status: self.status,
            health: HealthState::from_age(age, interval),
            topology_role: self.topology_role,
            heartbeat_age_ms: age.as_millis() as u64,
            last_heartbeat_at: self.last_heartbeat_at,
            registered_at: self.registered_at,
            tasks_completed: self.tasks_completed,
            metadata: self.metadata.clone(),
        }
    }
}

/// Read-only view of an agent returned by `get_agent_status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub id: AgentId,
    pub role: String,
    pub status: AgentStatus,
    pub health: HealthState,
    pub topology_role: TopologyRole,
    pub heartbeat_age_ms: u64,
    pub last_heartbeat_at: DateTime<Utc>,
    pub registered_at: DateTime<Utc>,
    pub tasks_completed: u64,
    pub metadata: AgentMetadata,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_thresholds() {
        let interval = Duration::from_millis(100);
        assert_eq!(
            HealthState::from_age(Duration::from_millis(0), interval),
            HealthState::Healthy
        );
        assert_eq!(
            HealthState::from_age(Duration::from_millis(100), interval),
            HealthState::Healthy
        );
        assert_eq!(
            HealthState::from_age(Duration::from_millis(150), interval),
            HealthState::Degraded
        );
        assert_eq!(
            HealthState::from_age(Duration::from_millis(250), interval),
            HealthState::Critical
        );
        assert_eq!(
            HealthState::from_age(Duration::from_millis(301), interval),
            HealthState::Failed
        );
    }

    #[test]
    fn test_status_transitions() {
        use AgentStatus::*;
        assert!(Active.can_transition_to(Busy));
        assert!(Busy.can_transition_to(Active));
        assert!(Busy.can_transition_to(Idle));
        assert!(Idle.can_transition_to(Busy));
        assert!(!Active.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Active));
        assert!(!Failed.can_transition_to(Failed));
    }

    #[test]
    fn test_health_summary_worst() {
        let mut summary = HealthSummary::default();
        assert_eq!(summary.worst(), None);
        summary.record(HealthState::Healthy);
        summary.record(HealthState::Critical);
        assert_eq!(summary.worst(), Some(HealthState::Critical));
        assert_eq!(summary.total(), 2);
    }

    #[test]
    fn test_agent_id_serializes_transparently() {
        let id = AgentId::new("worker-7");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"worker-7\"");
    }
}
