//! Shared helpers for spinning up simulated swarms

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use swarm_coordination::otel;
use swarm_coordination::worker::SharedReplica;
use swarm_coordination::{
    AgentId, AgentMetadata, AgentWorker, InMemoryProvider, MemoryProvider, SimulatedAgent,
    SwarmConfig, SwarmEngine, VotePolicy,
};
use tokio::task::JoinHandle;

/// An engine plus the workers serving its agents
pub struct Swarm {
    pub engine: SwarmEngine,
    pub workers: BTreeMap<AgentId, JoinHandle<()>>,
    pub replicas: BTreeMap<AgentId, SharedReplica>,
}

impl Swarm {
    pub fn new(config: SwarmConfig) -> Self {
        Self::with_provider(config, Arc::new(InMemoryProvider::new()))
    }

    pub fn with_provider(config: SwarmConfig, provider: Arc<dyn MemoryProvider>) -> Self {
        otel::init_test_tracing();
        Self {
            engine: SwarmEngine::new(config, provider).expect("valid config"),
            workers: BTreeMap::new(),
            replicas: BTreeMap::new(),
        }
    }

    /// Register `agent` and start serving its inbox
    pub async fn join(&mut self, agent: SimulatedAgent, id: &str, heartbeat: Option<Duration>) {
        let id = AgentId::new(id);
        let coordinator = self.engine.coordinator().clone();
        coordinator
            .register_agent(id.clone(), AgentMetadata::new("test"))
            .await;
        let inbox = coordinator.take_inbox(&id).await.expect("fresh inbox");
        self.replicas.insert(id.clone(), agent.replica());
        self.workers.insert(
            id,
            AgentWorker::spawn(coordinator, inbox, agent, heartbeat),
        );
    }

    /// Agents named `agent-0..` with the given policies
    pub async fn spawn(config: SwarmConfig, policies: &[VotePolicy], heartbeat: Option<Duration>) -> Self {
        let mut swarm = Self::new(config);
        for (i, policy) in policies.iter().enumerate() {
            let id = format!("agent-{}", i);
            swarm
                .join(SimulatedAgent::new(id.as_str(), policy.clone()), &id, heartbeat)
                .await;
        }
        swarm
    }

    /// Stop an agent's worker, silencing its votes and heartbeats
    pub fn kill(&mut self, id: &AgentId) {
        if let Some(worker) = self.workers.remove(id) {
            worker.abort();
        }
    }

    pub fn replica(&self, id: &str) -> SharedReplica {
        self.replicas[&AgentId::new(id)].clone()
    }
}

impl Drop for Swarm {
    fn drop(&mut self) {
        for worker in self.workers.values() {
            worker.abort();
        }
    }
}

/// Poll `check` every 5 ms until it holds or `limit` passes
pub async fn eventually(limit: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}
