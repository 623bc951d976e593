//! Breadth-first tree

use std::collections::HashMap;

use super::{Topology, TopologyError, TopologyKind, TopologyResult};
use crate::types::{AgentId, TopologyRole};

/// Complete k-ary tree laid out breadth-first over insertion order.
///
/// Slot `i` has parent `(i - 1) / k` and children `k*i + 1 ..= k*i + k`, so
/// the structure is recomputed implicitly whenever an agent leaves.
#[derive(Debug)]
pub struct HierarchicalTopology {
    branching: usize,
    agents: Vec<AgentId>,
    index: HashMap<AgentId, usize>,
}

impl HierarchicalTopology {
    pub fn new(branching: usize) -> Self {
        Self {
            branching: branching.max(1),
            agents: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn branching(&self) -> usize {
        self.branching
    }

    fn parent(&self, slot: usize) -> Option<usize> {
        (slot > 0).then(|| (slot - 1) / self.branching)
    }

    fn children(&self, slot: usize) -> impl Iterator<Item = usize> {
        let first = self.branching * slot + 1;
        let end = (first + self.branching).min(self.agents.len());
        first.min(end)..end
    }

    fn depth(&self, mut slot: usize) -> usize {
        let mut depth = 0;
        while let Some(parent) = self.parent(slot) {
            slot = parent;
            depth += 1;
        }
        depth
    }

    /// Height of the tree (0 for a lone root)
    pub fn max_depth(&self) -> usize {
        self.agents.len().checked_sub(1).map_or(0, |last| self.depth(last))
    }

    pub fn parent_of(&self, id: &AgentId) -> Option<&AgentId> {
        let slot = *self.index.get(id)?;
        self.parent(slot).map(|p| &self.agents[p])
    }

    fn reindex(&mut self) {
        self.index = self
            .agents
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();
    }
}

impl Topology for HierarchicalTopology {
    fn kind(&self) -> TopologyKind {
        TopologyKind::Hierarchical
    }

    fn add_agent(&mut self, id: AgentId) -> TopologyResult<()> {
        if self.index.contains_key(&id) {
            return Err(TopologyError::DuplicateAgent(id));
        }
        self.index.insert(id.clone(), self.agents.len());
        self.agents.push(id);
        Ok(())
    }

    fn remove_agent(&mut self, id: &AgentId) -> TopologyResult<()> {
        let slot = self
            .index
            .get(id)
            .copied()
            .ok_or_else(|| TopologyError::UnknownAgent(id.clone()))?;
        self.agents.remove(slot);
        self.reindex();
        Ok(())
    }

    fn neighbors(&self, id: &AgentId) -> Vec<AgentId> {
        let Some(&slot) = self.index.get(id) else {
            return Vec::new();
        };
        self.parent(slot)
            .into_iter()
            .chain(self.children(slot))
            .map(|i| self.agents[i].clone())
            .collect()
    }

    fn route(&self, from: &AgentId, to: &AgentId) -> Vec<AgentId> {
        let (Some(&start), Some(&goal)) = (self.index.get(from), self.index.get(to)) else {
            return Vec::new();
        };

        // Parents always sit at a lower slot, so lifting the larger side
        // converges on the lowest common ancestor.
        let mut up = Vec::new();
        let mut down = Vec::new();
        let (mut a, mut b) = (start, goal);
        while a != b {
            if a > b {
                up.push(a);
                a = (a - 1) / self.branching;
            } else {
                down.push(b);
                b = (b - 1) / self.branching;
            }
        }

        up.into_iter()
            .chain(std::iter::once(a))
            .chain(down.into_iter().rev())
            .map(|i| self.agents[i].clone())
            .collect()
    }

    fn agents(&self) -> Vec<AgentId> {
        self.agents.clone()
    }

    fn edges(&self) -> Vec<(AgentId, AgentId)> {
        (1..self.agents.len())
            .map(|i| {
                let parent = (i - 1) / self.branching;
                (self.agents[parent].clone(), self.agents[i].clone())
            })
            .collect()
    }

    fn role_of(&self, id: &AgentId) -> Option<TopologyRole> {
        let slot = *self.index.get(id)?;
        if slot == 0 {
            return Some(TopologyRole::Root);
        }
        let depth = self.depth(slot);
        if self.children(slot).next().is_some() {
            Some(TopologyRole::Branch { depth })
        } else {
            Some(TopologyRole::Leaf { depth })
        }
    }

    fn contains(&self, id: &AgentId) -> bool {
        self.index.contains_key(id)
    }

    fn len(&self) -> usize {
        self.agents.len()
    }

    fn connection_count(&self) -> usize {
        self.agents.len().saturating_sub(1)
    }
}
