//! Metric-driven topology switching

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{build, Topology, TopologyKind, TopologyResult, DEFAULT_BRANCHING};
use crate::types::{AgentId, TopologyRole};

/// Dominant communication pattern of the swarm's current work
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadType {
    #[default]
    General,
    /// Stage-to-stage handoff
    Pipeline,
    /// One-to-many fan-out
    Broadcast,
}

/// Inputs to adaptive topology selection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TopologyMetrics {
    pub agent_count: usize,
    /// Messages per second
    pub message_rate: f64,
    pub avg_latency: Duration,
    pub workload: WorkloadType,
}

/// Agent count above which a tree replaces flat shapes
pub const HIERARCHY_AGENT_THRESHOLD: usize = 10;
/// Agent count below which a busy swarm goes full mesh
pub const MESH_AGENT_CEILING: usize = 5;
/// Message rate above which a small swarm goes full mesh
pub const MESH_RATE_THRESHOLD: f64 = 100.0;

/// Pick a shape from metrics. Rules apply in order; the first match wins.
pub fn select_kind(metrics: &TopologyMetrics) -> TopologyKind {
    if metrics.agent_count > HIERARCHY_AGENT_THRESHOLD {
        TopologyKind::Hierarchical
    } else if metrics.workload == WorkloadType::Pipeline {
        TopologyKind::Ring
    } else if metrics.agent_count < MESH_AGENT_CEILING && metrics.message_rate > MESH_RATE_THRESHOLD
    {
        TopologyKind::Mesh
    } else {
        TopologyKind::Star
    }
}

/// Wraps a concrete topology and swaps it when `evaluate` selects a different shape
#[derive(Debug)]
pub struct AdaptiveTopology {
    delegate: Box<dyn Topology>,
    branching: usize,
    switches: u64,
    last_switch: Option<Duration>,
}

impl AdaptiveTopology {
    /// Starts as a star, the shape selected for an idle swarm
    pub fn new(branching: usize) -> Self {
        Self {
            delegate: build(TopologyKind::Star, branching),
            branching,
            switches: 0,
            last_switch: None,
        }
    }

    pub fn switch_count(&self) -> u64 {
        self.switches
    }

    /// Wall time the most recent switch took
    pub fn last_switch_duration(&self) -> Option<Duration> {
        self.last_switch
    }

    fn switch_to(&mut self, kind: TopologyKind) -> TopologyResult<()> {
        let started = Instant::now();
        let agents = self.delegate.agents();
        let mut next = build(kind, self.branching);
        for id in &agents {
            next.add_agent(id.clone())?;
        }
        let from = self.delegate.kind();
        self.delegate = next;
        self.switches += 1;
        let elapsed = started.elapsed();
        self.last_switch = Some(elapsed);
        info!(
            from = %from,
            to = %kind,
            agents = agents.len(),
            elapsed_us = elapsed.as_micros() as u64,
            "Adaptive topology switched"
        );
        Ok(())
    }
}

impl Default for AdaptiveTopology {
    fn default() -> Self {
        Self::new(DEFAULT_BRANCHING)
    }
}

impl Topology for AdaptiveTopology {
    fn kind(&self) -> TopologyKind {
        TopologyKind::Adaptive
    }

    fn active_kind(&self) -> TopologyKind {
        self.delegate.kind()
    }

    fn add_agent(&mut self, id: AgentId) -> TopologyResult<()> {
        self.delegate.add_agent(id)
    }

    fn remove_agent(&mut self, id: &AgentId) -> TopologyResult<()> {
        self.delegate.remove_agent(id)
    }

    fn neighbors(&self, id: &AgentId) -> Vec<AgentId> {
        self.delegate.neighbors(id)
    }

    fn route(&self, from: &AgentId, to: &AgentId) -> Vec<AgentId> {
        self.delegate.route(from, to)
    }

    fn agents(&self) -> Vec<AgentId> {
        self.delegate.agents()
    }

    fn edges(&self) -> Vec<(AgentId, AgentId)> {
        self.delegate.edges()
    }

    fn role_of(&self, id: &AgentId) -> Option<TopologyRole> {
        self.delegate.role_of(id)
    }

    fn contains(&self, id: &AgentId) -> bool {
        self.delegate.contains(id)
    }

    fn len(&self) -> usize {
        self.delegate.len()
    }

    fn connection_count(&self) -> usize {
        self.delegate.connection_count()
    }

    fn evaluate(&mut self, metrics: &TopologyMetrics) -> TopologyResult<Option<TopologyKind>> {
        let wanted = select_kind(metrics);
        if wanted == self.delegate.kind() {
            debug!(kind = %wanted, agents = metrics.agent_count, "Adaptive topology unchanged");
            return Ok(None);
        }
        self.switch_to(wanted)?;
        Ok(Some(wanted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(agent_count: usize, message_rate: f64, workload: WorkloadType) -> TopologyMetrics {
        TopologyMetrics {
            agent_count,
            message_rate,
            avg_latency: Duration::from_millis(5),
            workload,
        }
    }

    #[test]
    fn test_selection_rules_in_order() {
        use WorkloadType::*;
        assert_eq!(select_kind(&metrics(11, 500.0, Pipeline)), TopologyKind::Hierarchical);
        assert_eq!(select_kind(&metrics(6, 0.0, Pipeline)), TopologyKind::Ring);
        assert_eq!(select_kind(&metrics(4, 101.0, General)), TopologyKind::Mesh);
        assert_eq!(select_kind(&metrics(4, 100.0, General)), TopologyKind::Star);
        assert_eq!(select_kind(&metrics(8, 500.0, Broadcast)), TopologyKind::Star);
    }

    #[test]
    fn test_switch_preserves_agents_in_order() {
        let mut adaptive = AdaptiveTopology::default();
        let ids: Vec<AgentId> = (0..20).map(|i| AgentId::new(format!("a{}", i))).collect();
        for id in &ids {
            adaptive.add_agent(id.clone()).unwrap();
        }
        assert_eq!(adaptive.active_kind(), TopologyKind::Star);

        let switched = adaptive
            .evaluate(&metrics(20, 0.0, WorkloadType::General))
            .unwrap();
        assert_eq!(switched, Some(TopologyKind::Hierarchical));
        assert_eq!(adaptive.agents(), ids);
        assert!(adaptive.is_connected());
        assert!(adaptive.last_switch_duration().unwrap() < Duration::from_millis(100));

        let again = adaptive
            .evaluate(&metrics(20, 0.0, WorkloadType::General))
            .unwrap();
        assert_eq!(again, None);
        assert_eq!(adaptive.switch_count(), 1);
    }
}
