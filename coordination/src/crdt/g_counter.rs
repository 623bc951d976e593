//! Grow-only counter

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::Crdt;
use crate::types::AgentId;

/// Counter that only increases. Each agent owns one slot; merge takes the
/// per-agent maximum and the value is the sum of all slots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GCounter {
    counts: BTreeMap<AgentId, u64>,
}

impl GCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, agent: &AgentId, by: u64) {
        let slot = self.counts.entry(agent.clone()).or_insert(0);
        *slot = slot.saturating_add(by);
    }

    pub fn value(&self) -> u64 {
        self.counts
            .values()
            .fold(0u64, |acc, n| acc.saturating_add(*n))
    }

    /// Contribution of a single agent
    pub fn count_of(&self, agent: &AgentId) -> u64 {
        self.counts.get(agent).copied().unwrap_or(0)
    }
}

impl Crdt for GCounter {
    fn merge(&self, other: &Self) -> Self {
        let mut counts = self.counts.clone();
        for (agent, n) in &other.counts {
            let slot = counts.entry(agent.clone()).or_insert(0);
            *slot = (*slot).max(*n);
        }
        Self { counts }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_takes_per_agent_max() {
        let a = AgentId::new("a");
        let b = AgentId::new("b");

        let mut left = GCounter::new();
        left.increment(&a, 3);
        left.increment(&b, 1);

        let mut right = GCounter::new();
        right.increment(&a, 2);
        right.increment(&b, 4);

        let merged = left.merge(&right);
        assert_eq!(merged.count_of(&a), 3);
        assert_eq!(merged.count_of(&b), 4);
        assert_eq!(merged.value(), 7);
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        let a = AgentId::new("a");
        let b = AgentId::new("b");
        let base = GCounter::new();

        let mut on_a = base.clone();
        on_a.increment(&a, 1);
        let mut on_b = base.clone();
        on_b.increment(&b, 1);

        assert_eq!(on_a.merge(&on_b).value(), 2);
    }
}
