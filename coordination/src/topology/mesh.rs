//! Fully connected mesh

use super::{Topology, TopologyError, TopologyKind, TopologyResult};
use crate::types::{AgentId, TopologyRole};

/// Every agent connected to every other. O(n²) edges.
#[derive(Debug, Default)]
pub struct MeshTopology {
    agents: Vec<AgentId>,
}

impl MeshTopology {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Topology for MeshTopology {
    fn kind(&self) -> TopologyKind {
        TopologyKind::Mesh
    }

    fn add_agent(&mut self, id: AgentId) -> TopologyResult<()> {
        if self.agents.contains(&id) {
            return Err(TopologyError::DuplicateAgent(id));
        }
        self.agents.push(id);
        Ok(())
    }

    fn remove_agent(&mut self, id: &AgentId) -> TopologyResult<()> {
        let pos = self
            .agents
            .iter()
            .position(|a| a == id)
            .ok_or_else(|| TopologyError::UnknownAgent(id.clone()))?;
        self.agents.remove(pos);
        Ok(())
    }

    fn neighbors(&self, id: &AgentId) -> Vec<AgentId> {
        if !self.contains(id) {
            return Vec::new();
        }
        self.agents.iter().filter(|a| *a != id).cloned().collect()
    }

    fn route(&self, from: &AgentId, to: &AgentId) -> Vec<AgentId> {
        if !self.contains(from) || !self.contains(to) {
            return Vec::new();
        }
        if from == to {
            return vec![from.clone()];
        }
        vec![from.clone(), to.clone()]
    }

    fn agents(&self) -> Vec<AgentId> {
        self.agents.clone()
    }

    fn edges(&self) -> Vec<(AgentId, AgentId)> {
        let mut edges = Vec::with_capacity(self.agents.len() * self.agents.len() / 2);
        for (i, a) in self.agents.iter().enumerate() {
            for b in &self.agents[i + 1..] {
                edges.push((a.clone(), b.clone()));
            }
        }
        edges
    }

    fn role_of(&self, id: &AgentId) -> Option<TopologyRole> {
        self.contains(id).then_some(TopologyRole::Peer)
    }

    fn contains(&self, id: &AgentId) -> bool {
        self.agents.contains(id)
    }

    fn len(&self) -> usize {
        self.agents.len()
    }

    fn connection_count(&self) -> usize {
        let n = self.agents.len();
        n * n.saturating_sub(1) / 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mesh_edges_and_routes() {
        let mut mesh = MeshTopology::new();
        for i in 0..5 {
            mesh.add_agent(AgentId::new(format!("m{}", i))).unwrap();
        }
        assert_eq!(mesh.connection_count(), 10);
        assert_eq!(mesh.edges().len(), 10);
        assert_eq!(mesh.neighbors(&AgentId::new("m0")).len(), 4);
        assert_eq!(mesh.route(&AgentId::new("m1"), &AgentId::new("m3")).len(), 2);
    }
}
