//! Vector clocks for causal ordering

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::Crdt;
use crate::types::AgentId;

/// Causal relation between two clocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockOrdering {
    Before,
    After,
    Equal,
    Concurrent,
}

/// Per-agent event counters. Missing entries read as zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorClock {
    entries: BTreeMap<AgentId, u64>,
}

impl VectorClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, agent: &AgentId) -> u64 {
        let slot = self.entries.entry(agent.clone()).or_insert(0);
        *slot += 1;
        *slot
    }

    pub fn get(&self, agent: &AgentId) -> u64 {
        self.entries.get(agent).copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(|n| *n == 0)
    }

    /// Compare `self` against `other`
    pub fn compare(&self, other: &Self) -> ClockOrdering {
        let mut less = false;
        let mut greater = false;
        for agent in self.entries.keys().chain(other.entries.keys()) {
            match self.get(agent).cmp(&other.get(agent)) {
                Ordering::Less => less = true,
                Ordering::Greater => greater = true,
                Ordering::Equal => {}
            }
            if less && greater {
                return ClockOrdering::Concurrent;
            }
        }
        match (less, greater) {
            (false, false) => ClockOrdering::Equal,
            (true, false) => ClockOrdering::Before,
            (false, true) => ClockOrdering::After,
            (true, true) => ClockOrdering::Concurrent,
        }
    }

    /// Strictly happened-after `other`
    pub fn dominates(&self, other: &Self) -> bool {
        self.compare(other) == ClockOrdering::After
    }

    /// Stable encoding in agent order, used as a last-resort tie-break
    pub fn canonical(&self) -> String {
        serde_json::to_string(&self.entries).unwrap_or_default()
    }
}

impl Crdt for VectorClock {
    fn merge(&self, other: &Self) -> Self {
        let mut entries = self.entries.clone();
        for (agent, n) in &other.entries {
            let slot = entries.entry(agent.clone()).or_insert(0);
            *slot = (*slot).max(*n);
        }
        Self { entries }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare() {
        let a = AgentId::new("a");
        let b = AgentId::new("b");

        let mut c1 = VectorClock::new();
        c1.increment(&a);
        let mut c2 = c1.clone();
        c2.increment(&b);

        assert_eq!(c1.compare(&c2), ClockOrdering::Before);
        assert_eq!(c2.compare(&c1), ClockOrdering::After);
        assert!(c2.dominates(&c1));
        assert_eq!(c1.compare(&c1.clone()), ClockOrdering::Equal);

        let mut c3 = c1.clone();
        c3.increment(&a);
        assert_eq!(c2.compare(&c3), ClockOrdering::Concurrent);
        assert!(!c2.dominates(&c3));
    }

    #[test]
    fn test_merge_dominates_both() {
        let a = AgentId::new("a");
        let b = AgentId::new("b");

        let mut left = VectorClock::new();
        left.increment(&a);
        let mut right = VectorClock::new();
        right.increment(&b);

        let merged = left.merge(&right);
        assert!(merged.dominates(&left));
        assert!(merged.dominates(&right));
    }
}
