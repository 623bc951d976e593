//! Swarm coordination and consensus engine
//!
//! This library provides:
//! - Topology-aware routing between agents (mesh, star, hierarchical, ring, adaptive)
//! - An agent registry with heartbeat-driven health tracking
//! - Pluggable consensus: quorum, Raft-style leader commit, Byzantine-tolerant
//!   voting, gossip propagation, and CRDT merge
//! - Conflict resolution and full/delta state synchronization
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use swarm_coordination::{
//!     AgentMetadata, AgentWorker, AlgorithmKind, InMemoryProvider, Proposal, SimulatedAgent,
//!     SwarmConfig, SwarmEngine, VotePolicy,
//! };
//!
//! # async fn run() -> swarm_coordination::SwarmResult<()> {
//! let engine = SwarmEngine::new(SwarmConfig::default(), Arc::new(InMemoryProvider::new()))?;
//! engine.start();
//!
//! let coordinator = engine.coordinator().clone();
//! for name in ["a", "b", "c"] {
//!     coordinator.register_agent(name, AgentMetadata::new("worker")).await;
//!     if let Some(inbox) = coordinator.take_inbox(&name.into()).await {
//!         let agent = SimulatedAgent::new(name, VotePolicy::default());
//!         AgentWorker::spawn(coordinator.clone(), inbox, agent, None);
//!     }
//! }
//!
//! let proposal = Proposal::new(serde_json::json!({"action": "deploy"}));
//! let result = engine
//!     .request_consensus(proposal, AlgorithmKind::Quorum, None)
//!     .await?;
//! println!("{}", result.decision);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod consensus;
pub mod coordinator;
pub mod crdt;
pub mod engine;
pub mod error;
pub mod events;
pub mod otel;
pub mod registry;
pub mod resolver;
pub mod sync;
pub mod topology;
pub mod types;
pub mod worker;

pub use config::{ByzantineConfig, GossipConfig, RaftConfig, SwarmConfig, SyncConfig};
pub use consensus::{
    AlgorithmStats, ByzantineConsensus, ConsensusAlgorithm, ConsensusContext, ConsensusManager,
    CrdtConsensus, GossipConsensus, QuorumConsensus, RaftConsensus,
};
pub use coordinator::{
    AgentInbox, Envelope, SharedCoordinator, StateQuery, SwarmCoordinator, SwarmMessage,
};
pub use crdt::{CrdtType, CrdtValue};
pub use engine::SwarmEngine;
pub use error::{StructuredError, SwarmError, SwarmResult};
pub use events::{EventBus, EventBusExt, EventFilter, SharedEventBus, SwarmEvent};
pub use registry::AgentRegistry;
pub use resolver::{ConflictResolver, ResolutionStrategy};
pub use sync::{InMemoryProvider, MemoryProvider, StateSynchronizer, SyncReport};
pub use topology::{Topology, TopologyInfo, TopologyKind};
pub use types::{
    AgentId, AgentMetadata, AgentSnapshot, AgentStatus, AlgorithmKind, ConsensusResult, Decision,
    HealthState, Proposal, ProposalId, StateValue, StateVersion, SwarmId, Vote, VoteChoice,
};
pub use worker::{AgentBehavior, AgentWorker, SimulatedAgent, VotePolicy};
