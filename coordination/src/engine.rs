//! Swarm engine - one handle over coordinator, consensus, and sync

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

use crate::config::SwarmConfig;
use crate::consensus::{
    ByzantineConsensus, ConsensusManager, CrdtConsensus, GossipConsensus, QuorumConsensus,
    RaftConsensus,
};
use crate::coordinator::{SharedCoordinator, SwarmCoordinator};
use crate::error::SwarmResult;
use crate::events::{EventBus, SharedEventBus};
use crate::sync::{MemoryProvider, StateSynchronizer, SyncReport};
use crate::types::{AlgorithmKind, ConsensusResult, Proposal, StateVersion, SwarmId};

/// Background tasks aborted when dropped
#[derive(Debug, Default)]
struct BackgroundTasks(Mutex<Vec<JoinHandle<()>>>);

impl BackgroundTasks {
    fn push(&self, handle: JoinHandle<()>) {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).push(handle);
    }

    fn is_empty(&self) -> bool {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).is_empty()
    }

    fn abort_all(&self) {
        for handle in self.0.lock().unwrap_or_else(|e| e.into_inner()).drain(..) {
            handle.abort();
        }
    }
}

impl Drop for BackgroundTasks {
    fn drop(&mut self) {
        self.abort_all();
    }
}

/// The coordinator with every standard algorithm registered and a
/// synchronizer attached
#[derive(Debug)]
pub struct SwarmEngine {
    coordinator: SharedCoordinator,
    consensus: ConsensusManager,
    synchronizer: StateSynchronizer,
    raft: Arc<RaftConsensus>,
    crdt: Arc<CrdtConsensus>,
    tasks: BackgroundTasks,
}

impl SwarmEngine {
    pub fn new(config: SwarmConfig, provider: Arc<dyn MemoryProvider>) -> SwarmResult<Self> {
        Self::with_event_bus(config, EventBus::new().shared(), provider)
    }

    pub fn with_event_bus(
        config: SwarmConfig,
        event_bus: SharedEventBus,
        provider: Arc<dyn MemoryProvider>,
    ) -> SwarmResult<Self> {
        let coordinator = SwarmCoordinator::new(config, event_bus)?.shared();
        let algorithms = coordinator.config().clone();

        let raft = Arc::new(RaftConsensus::new(algorithms.raft.clone()));
        let crdt = Arc::new(CrdtConsensus::new());

        let consensus = ConsensusManager::new(coordinator.clone());
        consensus.register_algorithm(AlgorithmKind::Quorum, Arc::new(QuorumConsensus::new()));
        consensus.register_algorithm(AlgorithmKind::Raft, raft.clone());
        consensus.register_algorithm(
            AlgorithmKind::Byzantine,
            Arc::new(ByzantineConsensus::new(algorithms.byzantine.clone())),
        );
        consensus.register_algorithm(
            AlgorithmKind::Gossip,
            Arc::new(GossipConsensus::new(algorithms.gossip.clone())),
        );
        consensus.register_algorithm(AlgorithmKind::Crdt, crdt.clone());

        let synchronizer = StateSynchronizer::new(coordinator.clone(), provider);
        info!(swarm_id = %coordinator.swarm_id(), topology = %algorithms.topology, "Swarm engine created");

        Ok(Self {
            coordinator,
            consensus,
            synchronizer,
            raft,
            crdt,
            tasks: BackgroundTasks::default(),
        })
    }

    /// Start the heartbeat monitor and the Raft ticker. Idempotent.
    pub fn start(&self) {
        if !self.tasks.is_empty() {
            return;
        }
        self.tasks.push(self.coordinator.spawn_heartbeat_monitor());
        self.tasks.push(self.raft.spawn_ticker(self.coordinator.clone()));
    }

    /// Stop background tasks
    pub fn shutdown(&self) {
        self.tasks.abort_all();
    }

    pub fn swarm_id(&self) -> SwarmId {
        self.coordinator.swarm_id()
    }

    pub fn coordinator(&self) -> &SharedCoordinator {
        &self.coordinator
    }

    pub fn consensus(&self) -> &ConsensusManager {
        &self.consensus
    }

    pub fn synchronizer(&self) -> &StateSynchronizer {
        &self.synchronizer
    }

    pub fn raft(&self) -> &Arc<RaftConsensus> {
        &self.raft
    }

    pub fn crdt(&self) -> &Arc<CrdtConsensus> {
        &self.crdt
    }

    pub async fn request_consensus(
        &self,
        proposal: Proposal,
        kind: AlgorithmKind,
        timeout: Option<Duration>,
    ) -> SwarmResult<ConsensusResult> {
        self.consensus.request_consensus(proposal, kind, timeout).await
    }

    pub async fn synchronize_swarm_state(
        &self,
        swarm_id: SwarmId,
        state_key: &str,
    ) -> SwarmResult<StateVersion> {
        self.synchronizer.synchronize(swarm_id, state_key).await
    }

    pub async fn synchronize_with_report(
        &self,
        swarm_id: SwarmId,
        state_key: &str,
    ) -> SwarmResult<SyncReport> {
        self.synchronizer
            .synchronize_with_report(swarm_id, state_key)
            .await
    }

    pub async fn delta_sync(
        &self,
        swarm_id: SwarmId,
        since_version: u64,
    ) -> SwarmResult<Vec<StateVersion>> {
        self.synchronizer.delta_sync(swarm_id, since_version).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::InMemoryProvider;

    #[tokio::test]
    async fn test_registers_every_algorithm() {
        let engine = SwarmEngine::new(SwarmConfig::default(), Arc::new(InMemoryProvider::new())).unwrap();
        for &kind in AlgorithmKind::all() {
            assert!(engine.consensus().is_registered(kind), "{kind} missing");
        }
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let engine = SwarmEngine::new(SwarmConfig::default(), Arc::new(InMemoryProvider::new())).unwrap();
        engine.start();
        engine.start();
        assert_eq!(engine.tasks.0.lock().unwrap().len(), 2);
        engine.shutdown();
        assert!(engine.tasks.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_swarm_rejected() {
        let engine = SwarmEngine::new(SwarmConfig::default(), Arc::new(InMemoryProvider::new())).unwrap();
        let err = engine
            .synchronize_swarm_state(SwarmId::new(), "cfg")
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::SwarmError::UnknownSwarm(_)));
    }
}
