//! Increment/decrement counter

use serde::{Deserialize, Serialize};

use super::{Crdt, GCounter};
use crate::types::AgentId;

/// Counter supporting decrements, built from two grow-only counters merged
/// independently.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PNCounter {
    increments: GCounter,
    decrements: GCounter,
}

impl PNCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, agent: &AgentId, by: u64) {
        self.increments.increment(agent, by);
    }

    pub fn decrement(&mut self, agent: &AgentId, by: u64) {
        self.decrements.increment(agent, by);
    }

    pub fn value(&self) -> i64 {
        let up = i64::try_from(self.increments.value()).unwrap_or(i64::MAX);
        let down = i64::try_from(self.decrements.value()).unwrap_or(i64::MAX);
        up.saturating_sub(down)
    }
}

impl Crdt for PNCounter {
    fn merge(&self, other: &Self) -> Self {
        Self {
            increments: self.increments.merge(&other.increments),
            decrements: self.decrements.merge(&other.decrements),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_can_go_negative() {
        let a = AgentId::new("a");
        let mut counter = PNCounter::new();
        counter.increment(&a, 2);
        counter.decrement(&a, 5);
        assert_eq!(counter.value(), -3);
    }

    #[test]
    fn test_merge_keeps_both_sides() {
        let a = AgentId::new("a");
        let b = AgentId::new("b");

        let mut left = PNCounter::new();
        left.increment(&a, 10);
        let mut right = PNCounter::new();
        right.decrement(&b, 4);

        let merged = left.merge(&right);
        assert_eq!(merged.value(), 6);
        assert_eq!(merged, right.merge(&left));
    }
}
