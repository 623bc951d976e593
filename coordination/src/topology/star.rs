//! Hub-and-spoke star

use tracing::warn;

use super::{Topology, TopologyError, TopologyKind, TopologyResult};
use crate::types::{AgentId, TopologyRole};

/// One hub connected to every spoke. The hub is the oldest member; when it
/// leaves, the next oldest takes over.
#[derive(Debug, Default)]
pub struct StarTopology {
    /// `agents[0]` is the hub
    agents: Vec<AgentId>,
}

impl StarTopology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hub(&self) -> Option<&AgentId> {
        self.agents.first()
    }
}

impl Topology for StarTopology {
    fn kind(&self) -> TopologyKind {
        TopologyKind::Star
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
        if pos == 0 {
            if let Some(new_hub) = self.agents.first() {
                warn!(old_hub = %id, new_hub = %new_hub, "Star hub removed, re-homing spokes");
            }
        }
        Ok(())
    }

    fn neighbors(&self, id: &AgentId) -> Vec<AgentId> {
        match self.hub() {
            Some(hub) if hub == id => self.agents[1..].to_vec(),
            Some(hub) if self.contains(id) => vec![hub.clone()],
            _ => Vec::new(),
        }
    }

    fn route(&self, from: &AgentId, to: &AgentId) -> Vec<AgentId> {
        let Some(hub) = self.hub() else {
            return Vec::new();
        };
        if !self.contains(from) || !self.contains(to) {
            return Vec::new();
        }
        if from == to {
            vec![from.clone()]
        } else if from == hub || to == hub {
            vec![from.clone(), to.clone()]
        } else {
            vec![from.clone(), hub.clone(), to.clone()]
        }
    }

    fn agents(&self) -> Vec<AgentId> {
        self.agents.clone()
    }

    fn edges(&self) -> Vec<(AgentId, AgentId)> {
        match self.agents.split_first() {
            Some((hub, spokes)) => spokes.iter().map(|s| (hub.clone(), s.clone())).collect(),
            None => Vec::new(),
        }
    }

    fn role_of(&self, id: &AgentId) -> Option<TopologyRole> {
        match self.hub() {
            Some(hub) if hub == id => Some(TopologyRole::Hub),
            _ if self.contains(id) => Some(TopologyRole::Spoke),
            _ => None,
        }
    }

    fn contains(&self, id: &AgentId) -> bool {
        self.agents.contains(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spoke_route_goes_through_hub() {
        let mut star = StarTopology::new();
        for name in ["hub", "s1", "s2"] {
            star.add_agent(AgentId::new(name)).unwrap();
        }
        assert_eq!(
            star.route(&AgentId::new("s1"), &AgentId::new("s2")),
            vec![AgentId::new("s1"), AgentId::new("hub"), AgentId::new("s2")]
        );
        assert_eq!(star.role_of(&AgentId::new("hub")), Some(TopologyRole::Hub));
        assert_eq!(star.connection_count(), 2);
    }

    #[test]
    fn test_hub_removal_rehomes_to_next_oldest() {
        let mut star = StarTopology::new();
        for name in ["hub", "s1", "s2", "s3"] {
            star.add_agent(AgentId::new(name)).unwrap();
        }
        star.remove_agent(&AgentId::new("hub")).unwrap();

        assert_eq!(star.hub(), Some(&AgentId::new("s1")));
        assert_eq!(star.neighbors(&AgentId::new("s3")), vec![AgentId::new("s1")]);
        assert!(star.is_connected());
    }
}
