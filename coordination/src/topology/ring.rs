//! Doubly linked ring over an index arena

use std::collections::HashMap;

use super::{Topology, TopologyError, TopologyKind, TopologyResult};
use crate::types::{AgentId, TopologyRole};

#[derive(Debug, Clone)]
struct RingSlot {
    id: AgentId,
    next: usize,
    prev: usize,
}

/// Single cycle through all members.
///
/// Slots live in an arena and link by index, so join and leave are O(1):
/// a new agent is spliced between the last member and `head`, and a leaving
/// agent's neighbors are linked to each other.
#[derive(Debug, Default)]
pub struct RingTopology {
    slots: Vec<Option<RingSlot>>,
    free: Vec<usize>,
    index: HashMap<AgentId, usize>,
    /// Oldest member; traversal starts here
    head: Option<usize>,
}

impl RingTopology {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, i: usize) -> TopologyResult<&RingSlot> {
        self.slots
            .get(i)
            .and_then(Option::as_ref)
            .ok_or_else(|| TopologyError::ShapeViolation(format!("dangling ring link {}", i)))
    }

    fn slot_mut(&mut self, i: usize) -> TopologyResult<&mut RingSlot> {
        self.slots
            .get_mut(i)
            .and_then(Option::as_mut)
            .ok_or_else(|| TopologyError::ShapeViolation(format!("dangling ring link {}", i)))
    }

    fn allocate(&mut self, slot: RingSlot) -> usize {
        match self.free.pop() {
            Some(i) => {
                self.slots[i] = Some(slot);
                i
            }
            None => {
                self.slots.push(Some(slot));
                self.slots.len() - 1
            }
        }
    }

    /// Slot indices from `start` to `until` following `next` (or `prev`)
    fn walk(&self, start: usize, forward: bool, until: usize) -> Option<Vec<usize>> {
        let mut path = vec![start];
        let mut at = start;
        for _ in 0..self.index.len() {
            if at == until {
                return Some(path);
            }
            let slot = self.slot(at).ok()?;
            at = if forward { slot.next } else { slot.prev };
            path.push(at);
        }
        (at == until).then_some(path)
    }

    fn successor(&self, id: &AgentId) -> Option<&AgentId> {
        let i = *self.index.get(id)?;
        let next = self.slot(i).ok()?.next;
        self.slot(next).ok().map(|s| &s.id)
    }

    fn predecessor(&self, id: &AgentId) -> Option<&AgentId> {
        let i = *self.index.get(id)?;
        let prev = self.slot(i).ok()?.prev;
        self.slot(prev).ok().map(|s| &s.id)
    }

    /// Whether `next` links form exactly one cycle through every member and
    /// every `prev` link mirrors a `next` link
    pub fn is_single_cycle(&self) -> bool {
        let Some(head) = self.head else {
            return self.index.is_empty();
        };
        let mut at = head;
        let mut seen = 0;
        loop {
            let Ok(slot) = self.slot(at) else {
                return false;
            };
            match self.slot(slot.next) {
                Ok(next) if next.prev == at => {}
                _ => return false,
            }
            seen += 1;
            at = slot.next;
            if at == head {
                break;
            }
            if seen > self.index.len() {
                return false;
            }
        }
        seen == self.index.len()
    }
}

impl Topology for RingTopology {
    fn kind(&self) -> TopologyKind {
        TopologyKind::Ring
    }

    fn add_agent(&mut self, id: AgentId) -> TopologyResult<()> {
        if self.index.contains_key(&id) {
            return Err(TopologyError::DuplicateAgent(id));
        }

        let Some(head) = self.head else {
            let i = self.allocate(RingSlot {
                id: id.clone(),
                next: 0,
                prev: 0,
            });
            let slot = self.slot_mut(i)?;
            slot.next = i;
            slot.prev = i;
            self.index.insert(id, i);
            self.head = Some(i);
            return Ok(());
        };

        let last = self.slot(head)?.prev;
        let i = self.allocate(RingSlot {
            id: id.clone(),
            next: head,
            prev: last,
        });
        self.slot_mut(last)?.next = i;
        self.slot_mut(head)?.prev = i;
        self.index.insert(id, i);
        Ok(())
    }

    fn remove_agent(&mut self, id: &AgentId) -> TopologyResult<()> {
        let i = self
            .index
            .remove(id)
            .ok_or_else(|| TopologyError::UnknownAgent(id.clone()))?;
        let slot = self.slots[i]
            .take()
            .ok_or_else(|| TopologyError::ShapeViolation(format!("dangling ring link {}", i)))?;
        self.free.push(i);

        if slot.next == i {
            self.head = None;
            return Ok(());
        }
        self.slot_mut(slot.prev)?.next = slot.next;
        self.slot_mut(slot.next)?.prev = slot.prev;
        if self.head == Some(i) {
            self.head = Some(slot.next);
        }
        Ok(())
    }

    fn neighbors(&self, id: &AgentId) -> Vec<AgentId> {
        let mut out = Vec::with_capacity(2);
        for neighbor in [self.successor(id), self.predecessor(id)].into_iter().flatten() {
            if neighbor != id && !out.contains(neighbor) {
                out.push(neighbor.clone());
            }
        }
        out
    }

    fn route(&self, from: &AgentId, to: &AgentId) -> Vec<AgentId> {
        let (Some(&start), Some(&goal)) = (self.index.get(from), self.index.get(to)) else {
            return Vec::new();
        };
        let forward = self.walk(start, true, goal);
        let backward = self.walk(start, false, goal);
        let path = match (forward, backward) {
            (Some(f), Some(b)) if b.len() < f.len() => b,
            (Some(f), _) => f,
            (None, Some(b)) => b,
            (None, None) => return Vec::new(),
        };
        path.into_iter()
            .filter_map(|i| self.slot(i).ok().map(|s| s.id.clone()))
            .collect()
    }

    fn agents(&self) -> Vec<AgentId> {
        let Some(head) = self.head else {
            return Vec::new();
        };
        let mut out = Vec::with_capacity(self.index.len());
        let mut at = head;
        for _ in 0..self.index.len() {
            let Ok(slot) = self.slot(at) else {
                break;
            };
            out.push(slot.id.clone());
            at = slot.next;
            if at == head {
                break;
            }
        }
        out
    }

    fn edges(&self) -> Vec<(AgentId, AgentId)> {
        let agents = self.agents();
        match agents.len() {
            0 | 1 => Vec::new(),
            2 => vec![(agents[0].clone(), agents[1].clone())],
            n => (0..n)
                .map(|i| (agents[i].clone(), agents[(i + 1) % n].clone()))
                .collect(),
        }
    }

    fn role_of(&self, id: &AgentId) -> Option<TopologyRole> {
        self.index.contains_key(id).then_some(TopologyRole::RingMember)
    }

    fn contains(&self, id: &AgentId) -> bool {
        self.index.contains_key(id)
    }

    fn len(&self) -> usize {
        self.index.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(n: usize) -> RingTopology {
        let mut r = RingTopology::new();
        for i in 0..n {
            r.add_agent(AgentId::new(format!("r{}", i))).unwrap();
        }
        r
    }

    #[test]
    fn test_insert_splices_between_last_and_first() {
        let r = ring(4);
        assert!(r.is_single_cycle());
        assert_eq!(r.successor(&AgentId::new("r3")), Some(&AgentId::new("r0")));
        assert_eq!(r.predecessor(&AgentId::new("r0")), Some(&AgentId::new("r3")));
        assert_eq!(r.connection_count(), 4);
    }

    #[test]
    fn test_route_takes_shorter_direction() {
        let r = ring(8);
        let path = r.route(&AgentId::new("r1"), &AgentId::new("r7"));
        let names: Vec<&str> = path.iter().map(|a| a.as_str()).collect();
        assert_eq!(names, vec!["r1", "r0", "r7"]);

        for i in 0..8 {
            let path = r.route(&AgentId::new("r0"), &AgentId::new(format!("r{}", i)));
            assert!(path.len() - 1 <= 4);
        }
    }

    #[test]
    fn test_removal_keeps_single_cycle_and_reuses_slots() {
        let mut r = ring(6);
        r.remove_agent(&AgentId::new("r0")).unwrap();
        r.remove_agent(&AgentId::new("r3")).unwrap();
        assert!(r.is_single_cycle());
        assert_eq!(r.agents().first(), Some(&AgentId::new("r1")));

        r.add_agent(AgentId::new("r6")).unwrap();
        assert!(r.is_single_cycle());
        assert_eq!(r.slots.len(), 6);
        assert_eq!(r.successor(&AgentId::new("r6")), Some(&AgentId::new("r1")));
    }

    #[test]
    fn test_small_rings() {
        let mut r = ring(2);
        assert_eq!(r.neighbors(&AgentId::new("r0")), vec![AgentId::new("r1")]);
        assert_eq!(r.connection_count(), 1);
        r.remove_agent(&AgentId::new("r1")).unwrap();
        assert!(r.neighbors(&AgentId::new("r0")).is_empty());
        assert!(r.is_single_cycle());
        r.remove_agent(&AgentId::new("r0")).unwrap();
        assert!(r.is_single_cycle());
        assert!(r.agents().is_empty());
    }
}
