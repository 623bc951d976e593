//! petgraph view over a derived edge list

use std::collections::HashMap;

use petgraph::algo::{astar, connected_components};
use petgraph::graph::{NodeIndex, UnGraph};

use crate::types::AgentId;

/// Undirected graph built from a topology's agents and edges
#[derive(Debug)]
pub struct EdgeGraph {
    graph: UnGraph<AgentId, ()>,
    index: HashMap<AgentId, NodeIndex>,
}

impl EdgeGraph {
    /// Edges naming an agent outside `agents` are ignored
    pub fn build(agents: &[AgentId], edges: &[(AgentId, AgentId)]) -> Self {
        let mut graph = UnGraph::with_capacity(agents.len(), edges.len());
        let mut index = HashMap::with_capacity(agents.len());
        for id in agents {
            let node = graph.add_node(id.clone());
            index.insert(id.clone(), node);
        }
        for (a, b) in edges {
            if let (Some(&na), Some(&nb)) = (index.get(a), index.get(b)) {
                graph.add_edge(na, nb, ());
            }
        }
        Self { graph, index }
    }

    /// Empty and single-node graphs count as connected
    pub fn is_connected(&self) -> bool {
        self.graph.node_count() <= 1 || connected_components(&self.graph) == 1
    }

    /// Fewest-hop path, endpoints included; empty when unreachable
    pub fn shortest_path(&self, from: &AgentId, to: &AgentId) -> Vec<AgentId> {
        let (Some(&start), Some(&goal)) = (self.index.get(from), self.index.get(to)) else {
            return Vec::new();
        };
        astar(&self.graph, start, |n| n == goal, |_| 1u32, |_| 0)
            .map(|(_, path)| path.into_iter().map(|n| self.graph[n].clone()).collect())
            .unwrap_or_default()
    }

    pub fn degree(&self, id: &AgentId) -> usize {
        self.index
            .get(id)
            .map(|&n| self.graph.neighbors(n).count())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnected_graph() {
        let a = AgentId::new("a");
        let b = AgentId::new("b");
        let c = AgentId::new("c");
        let graph = EdgeGraph::build(&[a.clone(), b.clone(), c.clone()], &[(a.clone(), b.clone())]);

        assert!(!graph.is_connected());
        assert!(graph.shortest_path(&a, &c).is_empty());
        assert_eq!(graph.shortest_path(&a, &b), vec![a.clone(), b.clone()]);
        assert_eq!(graph.degree(&c), 0);
    }

    #[test]
    fn test_shortest_path_through_chain() {
        let ids: Vec<AgentId> = ["a", "b", "c", "d"].iter().map(|s| AgentId::new(*s)).collect();
        let edges: Vec<_> = ids.windows(2).map(|w| (w[0].clone(), w[1].clone())).collect();
        let graph = EdgeGraph::build(&ids, &edges);

        assert!(graph.is_connected());
        assert_eq!(graph.shortest_path(&ids[0], &ids[3]), ids);
    }
}
