//! Event bus for swarm coordination
//!
//! Provides pub/sub messaging using Tokio broadcast channels. Publishing
//! never blocks and never fails the publisher; slow subscribers lag.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

use super::types::SwarmEvent;
use crate::types::{AgentId, ProposalId};

/// Channel capacity for broadcast
const CHANNEL_CAPACITY: usize = 256;

/// Shared reference to EventBus
pub type SharedEventBus = Arc<EventBus>;

/// Event bus with broadcast channels
pub struct EventBus {
    /// Broadcast sender for publishing events
    sender: broadcast::Sender<SwarmEvent>,
}

impl EventBus {
    /// Create a new event bus
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Create a shared reference to this event bus
    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    /// Publish an event to all subscribers. Returns the number of receivers.
    pub fn publish(&self, event: SwarmEvent) -> usize {
        let event_type = event.event_type();
        match self.sender.send(event) {
            Ok(count) => {
                debug!(event_type, receivers = count, "Event published");
                count
            }
            Err(_) => {
                // No receivers is OK
                debug!(event_type, "Event published (no receivers)");
                0
            }
        }
    }

    /// Subscribe to receive events
    pub fn subscribe(&self) -> broadcast::Receiver<SwarmEvent> {
        self.sender.subscribe()
    }

    /// Get the number of current subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Check if the bus has any subscribers
    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// Event filter for selective subscription
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Filter by agent ID
    pub agent_id: Option<AgentId>,
    /// Filter by proposal ID
    pub proposal_id: Option<ProposalId>,
    /// Filter by event types
    pub event_types: Option<Vec<String>>,
}

impl EventFilter {
    /// Create a new empty filter (matches all events)
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by agent ID
    pub fn agent(mut self, agent_id: impl Into<AgentId>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    /// Filter by proposal ID
    pub fn proposal(mut self, proposal_id: impl Into<ProposalId>) -> Self {
        self.proposal_id = Some(proposal_id.into());
        self
    }

    /// Filter by event types
    pub fn types(mut self, event_types: Vec<&str>) -> Self {
        self.event_types = Some(event_types.into_iter().map(String::from).collect());
        self
    }

    /// Check if an event matches this filter.
    ///
    /// Events without an agent (or proposal) scope pass that part of the filter.
    pub fn matches(&self, event: &SwarmEvent) -> bool {
        if let (Some(want), Some(got)) = (&self.agent_id, event.agent_id()) {
            if want != got {
                return false;
            }
        }

        if let (Some(want), Some(got)) = (&self.proposal_id, event.proposal_id()) {
            if want != got {
                return false;
            }
        }

        if let Some(ref types) = self.event_types {
            if !types.iter().any(|t| t == event.event_type()) {
                return false;
            }
        }

        true
    }
}

/// Filtered event receiver that only yields matching events
pub struct FilteredReceiver {
    receiver: broadcast::Receiver<SwarmEvent>,
    filter: EventFilter,
}

impl FilteredReceiver {
    /// Create a new filtered receiver
    pub fn new(receiver: broadcast::Receiver<SwarmEvent>, filter: EventFilter) -> Self {
        Self { receiver, filter }
    }

    /// Receive the next matching event
    pub async fn recv(&mut self) -> Result<SwarmEvent, broadcast::error::RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.filter.matches(&event) {
                return Ok(event);
            }
        }
    }
}

/// Extension trait for subscribing with filters
pub trait EventBusExt {
    /// Subscribe with a filter
    fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver;
}

impl EventBusExt for EventBus {
    fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver {
        FilteredReceiver::new(self.subscribe(), filter)
    }
}

impl EventBusExt for SharedEventBus {
    fn subscribe_filtered(&self, filter: EventFilter) -> FilteredReceiver {
        FilteredReceiver::new(self.subscribe(), filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AlgorithmKind, Decision};
    use chrono::Utc;

    fn completed(proposal: &str) -> SwarmEvent {
        SwarmEvent::ConsensusCompleted {
            proposal_id: ProposalId::from(proposal),
            algorithm: AlgorithmKind::Quorum,
            decision: Decision::Approved,
            votes_for: 3,
            votes_against: 1,
            abstain: 0,
            duration_ms: 10,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();

        assert_eq!(bus.publish(completed("p-1")), 1);

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.event_type(), "consensus_completed");
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        assert!(!bus.has_subscribers());
        assert_eq!(bus.publish(completed("p-1")), 0);
    }

    #[test]
    fn test_event_filter() {
        let filter = EventFilter::new()
            .agent("a")
            .types(vec!["leader_elected", "agent_flagged_malicious"]);

        let matching = SwarmEvent::LeaderElected {
            agent_id: AgentId::new("a"),
            term: 2,
            timestamp: Utc::now(),
        };
        let other_agent = SwarmEvent::LeaderElected {
            agent_id: AgentId::new("b"),
            term: 2,
            timestamp: Utc::now(),
        };

        assert!(filter.matches(&matching));
        assert!(!filter.matches(&other_agent));
        assert!(!filter.matches(&completed("p-1")));
    }

    #[tokio::test]
    async fn test_filtered_receiver() {
        let bus = EventBus::new().shared();
        let mut filtered = bus.subscribe_filtered(EventFilter::new().proposal("target"));

        let publisher = bus.clone();
        tokio::spawn(async move {
            publisher.publish(completed("other"));
            publisher.publish(completed("target"));
        });

        let event = filtered.recv().await.unwrap();
        assert_eq!(event.proposal_id(), Some(&ProposalId::from("target")));
    }
}
