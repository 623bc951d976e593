//! Agent connectivity topologies
//!
//! A topology owns only agent ids; the `AgentRegistry` owns the agents. The
//! edge set is derived from the strategy's internal shape and recomputed on
//! every join, leave, and switch, so it is always connected and satisfies
//! the shape constraint of the active strategy.
//!
//! | Kind | Edges | Route length |
//! |------|-------|--------------|
//! | Mesh | complete graph | 1 hop |
//! | Star | hub to every spoke | ≤ 2 hops |
//! | Hierarchical | breadth-first k-ary tree | ≤ 2 × depth |
//! | Ring | one cycle | ≤ n / 2 |
//! | Adaptive | whichever delegate the metrics select | delegate's |

pub mod adaptive;
pub mod graph;
pub mod hierarchical;
pub mod mesh;
pub mod ring;
pub mod star;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{AgentId, HealthSummary, TopologyRole};

pub use adaptive::{AdaptiveTopology, TopologyMetrics, WorkloadType};
pub use graph::EdgeGraph;
pub use hierarchical::HierarchicalTopology;
pub use mesh::MeshTopology;
pub use ring::RingTopology;
pub use star::StarTopology;

/// Default fan-out of the hierarchical tree
pub const DEFAULT_BRANCHING: usize = 3;

/// Errors from topology mutations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
    #[error("Agent already in topology: {0}")]
    DuplicateAgent(AgentId),

    #[error("Agent not in topology: {0}")]
    UnknownAgent(AgentId),

    /// Internal structure no longer satisfies the topology's shape
    #[error("Shape violation: {0}")]
    ShapeViolation(String),
}

/// Result type alias for topology operations
pub type TopologyResult<T> = Result<T, TopologyError>;

/// Topology strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopologyKind {
    Mesh,
    Star,
    Hierarchical,
    Ring,
    Adaptive,
}

impl std::fmt::Display for TopologyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mesh => write!(f, "mesh"),
            Self::Star => write!(f, "star"),
            Self::Hierarchical => write!(f, "hierarchical"),
            Self::Ring => write!(f, "ring"),
            Self::Adaptive => write!(f, "adaptive"),
        }
    }
}

impl std::str::FromStr for TopologyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mesh" => Ok(Self::Mesh),
            "star" => Ok(Self::Star),
            "hierarchical" | "tree" => Ok(Self::Hierarchical),
            "ring" => Ok(Self::Ring),
            "adaptive" => Ok(Self::Adaptive),
            other => Err(format!("unknown topology: {}", other)),
        }
    }
}

/// Connectivity strategy over agent ids
pub trait Topology: Send + Sync + std::fmt::Debug {
    fn kind(&self) -> TopologyKind;

    /// Strategy currently shaping the edges. Differs from `kind()` only for Adaptive.
    fn active_kind(&self) -> TopologyKind {
        self.kind()
    }

    fn add_agent(&mut self, id: AgentId) -> TopologyResult<()>;

    fn remove_agent(&mut self, id: &AgentId) -> TopologyResult<()>;

    /// Directly connected agents; empty for unknown ids
    fn neighbors(&self, id: &AgentId) -> Vec<AgentId>;

    /// Hop path from `from` to `to`, both endpoints included.
    ///
    /// `[from]` when `from == to`; empty when either side is unknown.
    fn route(&self, from: &AgentId, to: &AgentId) -> Vec<AgentId>;

    /// Member ids in insertion order
    fn agents(&self) -> Vec<AgentId>;

    /// Undirected edge list, each edge once
    fn edges(&self) -> Vec<(AgentId, AgentId)>;

    fn role_of(&self, id: &AgentId) -> Option<TopologyRole>;

    fn contains(&self, id: &AgentId) -> bool {
        self.agents().iter().any(|a| a == id)
    }

    fn len(&self) -> usize {
        self.agents().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn connection_count(&self) -> usize {
        self.edges().len()
    }

    fn is_connected(&self) -> bool {
        EdgeGraph::build(&self.agents(), &self.edges()).is_connected()
    }

    /// Re-evaluate the shape from observed metrics. Returns the newly active
    /// kind when a switch happened. Only Adaptive switches.
    fn evaluate(&mut self, _metrics: &TopologyMetrics) -> TopologyResult<Option<TopologyKind>> {
        Ok(None)
    }
}

/// Create an empty topology of `kind`
pub fn build(kind: TopologyKind, branching: usize) -> Box<dyn Topology> {
    match kind {
        TopologyKind::Mesh => Box::new(MeshTopology::new()),
        TopologyKind::Star => Box::new(StarTopology::new()),
        TopologyKind::Hierarchical => Box::new(HierarchicalTopology::new(branching)),
        TopologyKind::Ring => Box::new(RingTopology::new()),
        TopologyKind::Adaptive => Box::new(AdaptiveTopology::new(branching)),
    }
}

/// Create a topology of `kind` holding `agents` in the given order
pub fn rebuild(
    kind: TopologyKind,
    branching: usize,
    agents: &[AgentId],
) -> TopologyResult<Box<dyn Topology>> {
    let mut topology = build(kind, branching);
    for id in agents {
        topology.add_agent(id.clone())?;
    }
    Ok(topology)
}

/// Read-only topology summary returned by `get_topology_info`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopologyInfo {
    pub kind: TopologyKind,
    /// Delegate shape when `kind` is Adaptive
    pub active_kind: TopologyKind,
    pub agent_count: usize,
    pub connection_count: usize,
    pub connected: bool,
    pub health_summary: HealthSummary,
}
