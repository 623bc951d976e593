//! Swarm coordinator - agent lifecycle, routing, and control-plane collection
//!
//! The coordinator owns the registry, the active topology, and one bounded
//! mailbox per agent. Agent-to-agent messages are routed over the topology
//! and refused when any hop on the path has failed. Consensus algorithms and
//! the state synchronizer talk to agents through the control plane
//! (`collect_votes`, `collect_states`, `gossip_round`, `broadcast_system`),
//! which addresses mailboxes directly. Gossip pushes between agents use the
//! routed path like any other agent message.
//!
//! Locks are always taken in the order registry → topology → mailboxes →
//! pending inboxes, and never held across a mailbox send that could block.

mod collector;
mod mailbox;
mod stats;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use crate::config::SwarmConfig;
use crate::error::{SwarmError, SwarmResult};
use crate::events::{SharedEventBus, SwarmEvent};
use crate::otel;
use crate::registry::{AgentRegistry, HealthChange, RegistrationOutcome};
use crate::topology::{self, Topology, TopologyInfo, TopologyKind, TopologyMetrics, WorkloadType};
use crate::types::{
    AgentId, AgentMetadata, AgentSnapshot, AgentStatus, Proposal, ProposalId, StateVersion,
    SwarmId, TopologyRole, Vote,
};

use collector::Collectors;
pub use mailbox::{AgentInbox, Envelope, GossipReport, GossipView, StateQuery, SwarmMessage};
pub use stats::{MessageStats, MessageStatsSnapshot};

/// Shared reference to a coordinator
pub type SharedCoordinator = Arc<SwarmCoordinator>;

/// Votes gathered for one round
#[derive(Debug, Clone, Default)]
pub struct VoteCollection {
    /// First vote per agent, sorted by agent id
    pub votes: Vec<Vote>,
    /// Participants whose mailbox accepted the request
    pub requested: Vec<AgentId>,
    /// The window closed before every requested agent answered
    pub timed_out: bool,
}

impl VoteCollection {
    pub fn missing(&self) -> usize {
        self.requested.len().saturating_sub(self.votes.len())
    }
}

/// State responses gathered for one request
#[derive(Debug, Clone, Default)]
pub struct StateCollection {
    /// One entry per responding agent, sorted by agent id
    pub responses: Vec<(AgentId, Vec<StateVersion>)>,
    pub requested: Vec<AgentId>,
    pub timed_out: bool,
}

impl StateCollection {
    /// Every version returned, in responder order
    pub fn versions(&self) -> impl Iterator<Item = &StateVersion> {
        self.responses.iter().flat_map(|(_, versions)| versions.iter())
    }
}

/// Reports gathered for one gossip round
#[derive(Debug, Clone, Default)]
pub struct GossipCollection {
    /// One report per responding agent, sorted by agent id
    pub reports: Vec<(AgentId, GossipReport)>,
    pub requested: Vec<AgentId>,
    pub timed_out: bool,
}

/// Coordinates agents of one swarm
pub struct SwarmCoordinator {
    swarm_id: SwarmId,
    config: SwarmConfig,
    registry: RwLock<AgentRegistry>,
    topology: RwLock<Box<dyn Topology>>,
    mailboxes: RwLock<HashMap<AgentId, mpsc::Sender<Envelope>>>,
    /// Inboxes created at registration and not yet claimed by a runtime
    pending_inboxes: Mutex<HashMap<AgentId, AgentInbox>>,
    workload: RwLock<WorkloadType>,
    votes: Collectors<(ProposalId, u32), Vote>,
    states: Collectors<String, (AgentId, Vec<StateVersion>)>,
    gossip: Collectors<String, (AgentId, GossipReport)>,
    event_bus: SharedEventBus,
    stats: Arc<MessageStats>,
}

impl SwarmCoordinator {
    /// Create a coordinator with the configured initial topology
    pub fn new(config: SwarmConfig, event_bus: SharedEventBus) -> SwarmResult<Self> {
        config.validate()?;
        let topology = topology::build(config.topology, config.branching_factor);
        Ok(Self {
            swarm_id: SwarmId::new(),
            registry: RwLock::new(AgentRegistry::new(config.heartbeat_interval())),
            topology: RwLock::new(topology),
            mailboxes: RwLock::new(HashMap::new()),
            pending_inboxes: Mutex::new(HashMap::new()),
            workload: RwLock::new(WorkloadType::default()),
            votes: Collectors::new(),
            states: Collectors::new(),
            gossip: Collectors::new(),
            event_bus,
            stats: Arc::new(MessageStats::new()),
            config,
        })
    }

    /// Create a shared reference to this coordinator
    pub fn shared(self) -> SharedCoordinator {
        Arc::new(self)
    }

    pub fn swarm_id(&self) -> SwarmId {
        self.swarm_id
    }

    pub fn config(&self) -> &SwarmConfig {
        &self.config
    }

    pub fn event_bus(&self) -> &SharedEventBus {
        &self.event_bus
    }

    pub fn message_stats(&self) -> MessageStatsSnapshot {
        self.stats.snapshot(Instant::now())
    }

    // =========================================================================
    // Agent Lifecycle
    // =========================================================================

    /// Register an agent. Returns true when the agent is new or was revived
    /// from Failed, false when it was already registered.
    pub async fn register_agent(&self, id: impl Into<AgentId>, metadata: AgentMetadata) -> bool {
        let id = id.into();
        let now = Instant::now();

        let outcome = {
            let mut registry = self.registry.write().await;
            let outcome = registry.register(id.clone(), metadata, now);
            if !outcome.is_change() {
                return false;
            }

            let mut topology = self.topology.write().await;
            if outcome == RegistrationOutcome::New {
                if let Err(e) = topology.add_agent(id.clone()) {
                    warn!(agent_id = %id, error = %e, "Topology rejected new agent");
                }
            }
            refresh_roles(&mut registry, topology.as_ref());

            let (tx, inbox) =
                mailbox::mailbox(id.clone(), self.config.mailbox_capacity, self.stats.clone());
            self.mailboxes.write().await.insert(id.clone(), tx);
            self.pending_inboxes.lock().await.insert(id.clone(), inbox);
            outcome
        };

        let revived = outcome == RegistrationOutcome::Revived;
        info!(agent_id = %id, revived, "Agent registered");
        self.event_bus.publish(SwarmEvent::AgentRegistered {
            swarm_id: self.swarm_id,
            agent_id: id,
            revived,
            timestamp: Utc::now(),
        });
        true
    }

    /// Hand the agent's mailbox receiver to its runtime. Available once per registration.
    pub async fn take_inbox(&self, id: &AgentId) -> Option<AgentInbox> {
        self.pending_inboxes.lock().await.remove(id)
    }

    /// Remove an agent. Closing its mailbox ends the agent's runtime loop.
    pub async fn unregister_agent(&self, id: &AgentId) -> bool {
        {
            let mut registry = self.registry.write().await;
            if registry.unregister(id).is_none() {
                return false;
            }
            let mut topology = self.topology.write().await;
            if let Err(e) = topology.remove_agent(id) {
                warn!(agent_id = %id, error = %e, "Agent missing from topology");
            }
            refresh_roles(&mut registry, topology.as_ref());
            self.mailboxes.write().await.remove(id);
            self.pending_inboxes.lock().await.remove(id);
        }

        info!(agent_id = %id, "Agent unregistered");
        self.event_bus.publish(SwarmEvent::AgentUnregistered {
            swarm_id: self.swarm_id,
            agent_id: id.clone(),
            timestamp: Utc::now(),
        });
        true
    }

    pub async fn update_agent_heartbeat(&self, id: &AgentId, at: Instant) -> SwarmResult<()> {
        self.registry.write().await.record_heartbeat(id, at)
    }

    /// Record a heartbeat at the current instant
    pub async fn heartbeat(&self, id: &AgentId) -> SwarmResult<()> {
        self.update_agent_heartbeat(id, Instant::now()).await
    }

    /// Caller-initiated status change (task assignment, completion, idling)
    pub async fn transition_agent(&self, id: &AgentId, to: AgentStatus) -> SwarmResult<()> {
        let from = self.registry.write().await.transition(id, to)?;
        if from != to {
            debug!(agent_id = %id, %from, %to, "Agent status changed");
            self.event_bus.publish(SwarmEvent::AgentStatusChanged {
                agent_id: id.clone(),
                from,
                to,
                timestamp: Utc::now(),
            });
        }
        Ok(())
    }

    pub async fn get_agent_status(&self, id: &AgentId) -> SwarmResult<AgentSnapshot> {
        self.registry.read().await.snapshot(id, Instant::now())
    }

    /// All registered ids in registration order
    pub async fn agent_ids(&self) -> Vec<AgentId> {
        self.registry.read().await.ids()
    }

    /// Agents not marked Failed
    pub async fn active_agents(&self) -> Vec<AgentId> {
        self.registry.read().await.active()
    }

    /// Agents whose heartbeat is Healthy or Degraded
    pub async fn responsive_agents(&self) -> Vec<AgentId> {
        self.registry.read().await.responsive(Instant::now())
    }

    // =========================================================================
    // Messaging
    // =========================================================================

    /// Route a message from one agent to another over the active topology
    pub async fn send_message(
        &self,
        from: &AgentId,
        to: &AgentId,
        message: SwarmMessage,
    ) -> SwarmResult<()> {
        match self.deliver(from, to, message).await {
            Ok(hops) => {
                debug!(%from, %to, hops, "Message delivered");
                self.event_bus.publish(SwarmEvent::MessageDelivered {
                    from: from.clone(),
                    to: to.clone(),
                    hops,
                    timestamp: Utc::now(),
                });
                Ok(())
            }
            Err(SwarmError::Unreachable { reason, .. }) => {
                debug!(%from, %to, %reason, "Message undeliverable");
                self.event_bus.publish(SwarmEvent::MessageUndeliverable {
                    from: from.clone(),
                    to: to.clone(),
                    reason: reason.clone(),
                    timestamp: Utc::now(),
                });
                Err(SwarmError::unreachable(from, to, reason))
            }
            Err(e) => Err(e),
        }
    }

    /// Returns the hop count on success
    async fn deliver(
        &self,
        from: &AgentId,
        to: &AgentId,
        message: SwarmMessage,
    ) -> SwarmResult<usize> {
        let registry = self.registry.read().await;
        if !registry.contains(from) {
            return Err(SwarmError::UnknownAgent(from.clone()));
        }
        let target = registry
            .get(to)
            .ok_or_else(|| SwarmError::UnknownAgent(to.clone()))?;
        if target.status == AgentStatus::Failed {
            return Err(SwarmError::unreachable(from, to, "target failed"));
        }

        let topology = self.topology.read().await;
        let path = topology.route(from, to);
        if path.is_empty() {
            return Err(SwarmError::unreachable(from, to, "no route"));
        }
        if path.len() > 2 {
            for hop in &path[1..path.len() - 1] {
                let hop_failed = registry
                    .get(hop)
                    .map_or(true, |a| a.status == AgentStatus::Failed);
                if hop_failed {
                    return Err(SwarmError::unreachable(
                        from,
                        to,
                        format!("hop {} failed", hop),
                    ));
                }
            }
        }
        let hops = path.len().saturating_sub(1);

        let mailboxes = self.mailboxes.read().await;
        let sender = mailboxes
            .get(to)
            .ok_or_else(|| SwarmError::unreachable(from, to, "mailbox closed"))?;
        let now = Instant::now();
        let envelope = Envelope {
            from: Some(from.clone()),
            to: to.clone(),
            path,
            message,
            sent_at: now,
        };
        push(sender, envelope).map_err(|reason| SwarmError::unreachable(from, to, reason))?;
        self.stats.record_sent(now);
        Ok(hops)
    }

    /// Send to every registered agent except the sender and `exclude`.
    /// Returns how many deliveries succeeded.
    pub async fn broadcast_message(
        &self,
        from: &AgentId,
        message: SwarmMessage,
        exclude: &HashSet<AgentId>,
    ) -> SwarmResult<usize> {
        let targets: Vec<AgentId> = {
            let registry = self.registry.read().await;
            if !registry.contains(from) {
                return Err(SwarmError::UnknownAgent(from.clone()));
            }
            registry
                .ids()
                .into_iter()
                .filter(|id| id != from && !exclude.contains(id))
                .collect()
        };

        let mut delivered = 0;
        for to in &targets {
            match self.send_message(from, to, message.clone()).await {
                Ok(()) => delivered += 1,
                Err(e) => debug!(%from, %to, error = %e, "Broadcast delivery skipped"),
            }
        }
        Ok(delivered)
    }

    /// Control-plane send straight to a mailbox, bypassing topology routing.
    /// Failed agents are skipped.
    pub async fn send_system(&self, to: &AgentId, message: SwarmMessage) -> bool {
        let registry = self.registry.read().await;
        let live = registry
            .get(to)
            .is_some_and(|a| a.status != AgentStatus::Failed);
        if !live {
            return false;
        }
        let mailboxes = self.mailboxes.read().await;
        let Some(sender) = mailboxes.get(to) else {
            return false;
        };
        let now = Instant::now();
        let envelope = Envelope {
            from: None,
            to: to.clone(),
            path: vec![to.clone()],
            message,
            sent_at: now,
        };
        match push(sender, envelope) {
            Ok(()) => {
                self.stats.record_sent(now);
                true
            }
            Err(reason) => {
                debug!(agent_id = %to, reason, "Control message dropped");
                false
            }
        }
    }

    /// Control-plane broadcast to every agent not marked Failed
    pub async fn broadcast_system(&self, message: SwarmMessage) -> usize {
        let targets = self.active_agents().await;
        let mut delivered = 0;
        for to in &targets {
            if self.send_system(to, message.clone()).await {
                delivered += 1;
            }
        }
        delivered
    }

    // =========================================================================
    // Topology
    // =========================================================================

    pub async fn get_topology_info(&self) -> TopologyInfo {
        let registry = self.registry.read().await;
        let topology = self.topology.read().await;
        TopologyInfo {
            kind: topology.kind(),
            active_kind: topology.active_kind(),
            agent_count: topology.len(),
            connection_count: topology.connection_count(),
            connected: topology.is_connected(),
            health_summary: registry.health_summary(Instant::now()),
        }
    }

    /// Hop path between two agents on the active topology
    pub async fn route(&self, from: &AgentId, to: &AgentId) -> Vec<AgentId> {
        self.topology.read().await.route(from, to)
    }

    pub async fn neighbors(&self, id: &AgentId) -> Vec<AgentId> {
        self.topology.read().await.neighbors(id)
    }

    /// Replace the topology strategy, keeping agents in their original order
    pub async fn switch_topology(&self, kind: TopologyKind) -> SwarmResult<()> {
        let (from, to, agent_count, duration_ms) = {
            let mut registry = self.registry.write().await;
            let mut topology = self.topology.write().await;
            let from = topology.active_kind();
            let agents = topology.agents();

            let span = otel::topology_switch_span(
                &from.to_string(),
                &kind.to_string(),
                agents.len(),
            );
            let _enter = span.enter();
            let started = std::time::Instant::now();
            *topology = topology::rebuild(kind, self.config.branching_factor, &agents)?;
            refresh_roles(&mut registry, topology.as_ref());
            let duration_ms = started.elapsed().as_millis() as u64;
            otel::record_topology_switch(&span, duration_ms);
            (from, topology.active_kind(), agents.len(), duration_ms)
        };

        info!(%from, %to, agent_count, duration_ms, "Topology switched");
        self.event_bus.publish(SwarmEvent::TopologySwitched {
            from,
            to,
            agent_count,
            duration_ms,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Declare the dominant workload for adaptive evaluation
    pub async fn set_workload(&self, workload: WorkloadType) {
        *self.workload.write().await = workload;
    }

    /// Feed current metrics to the topology. Returns the new active kind if an
    /// Adaptive topology switched.
    pub async fn evaluate_topology(&self) -> SwarmResult<Option<TopologyKind>> {
        let workload = *self.workload.read().await;
        let now = Instant::now();

        let switched = {
            let mut registry = self.registry.write().await;
            let mut topology = self.topology.write().await;
            let metrics = TopologyMetrics {
                agent_count: registry.active().len(),
                message_rate: self.stats.rate(now),
                avg_latency: self.stats.avg_latency(),
                workload,
            };
            let from = topology.active_kind();
            let started = std::time::Instant::now();
            let switched = topology.evaluate(&metrics)?;
            if switched.is_some() {
                refresh_roles(&mut registry, topology.as_ref());
            }
            switched.map(|to| (from, to, topology.len(), started.elapsed().as_millis() as u64))
        };

        let Some((from, to, agent_count, duration_ms)) = switched else {
            return Ok(None);
        };
        let span = otel::topology_switch_span(&from.to_string(), &to.to_string(), agent_count);
        otel::record_topology_switch(&span, duration_ms);
        self.event_bus.publish(SwarmEvent::TopologySwitched {
            from,
            to,
            agent_count,
            duration_ms,
            timestamp: Utc::now(),
        });
        Ok(Some(to))
    }

    // =========================================================================
    // Control Plane Collection
    // =========================================================================

    /// Ask `participants` to vote on one round and wait up to `window`.
    ///
    /// Returns whatever arrived; `timed_out` is set when the window closed
    /// first. Agents whose mailbox refuses the request are not waited on.
    pub async fn collect_votes(
        &self,
        proposal: Arc<Proposal>,
        round: u32,
        participants: &[AgentId],
        window: Duration,
    ) -> VoteCollection {
        let proposal_id = proposal.proposal_id.clone();
        let span = otel::vote_round_span(proposal_id.as_str(), round, participants.len());
        let key = (proposal_id, round);
        let (_guard, mut rx) = self
            .votes
            .open(key.clone(), participants.iter().cloned().collect());

        let mut collection = async {
            let deadline = Instant::now() + window;
            let mut requested = Vec::with_capacity(participants.len());
            for agent in participants {
                let request = SwarmMessage::VoteRequest {
                    proposal: proposal.clone(),
                    round,
                };
                if self.send_system(agent, request).await {
                    requested.push(agent.clone());
                } else {
                    self.votes.forget(&key, agent);
                }
            }

            let mut votes = Vec::with_capacity(requested.len());
            let mut timed_out = false;
            while votes.len() < requested.len() {
                match tokio::time::timeout_at(deadline, rx.recv()).await {
                    Ok(Some(vote)) => votes.push(vote),
                    Ok(None) => break,
                    Err(_) => {
                        timed_out = true;
                        break;
                    }
                }
            }
            VoteCollection {
                votes,
                requested,
                timed_out,
            }
        }
        .instrument(span.clone())
        .await;

        collection
            .votes
            .sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        otel::record_vote_round(&span, collection.votes.len(), collection.timed_out);
        collection
    }

    /// Deliver a vote for an open round. Returns false if the round is closed,
    /// the agent was not asked, or it already voted.
    pub fn submit_vote(&self, vote: Vote) -> bool {
        let key = (vote.proposal_id.clone(), vote.round);
        let agent = vote.agent_id.clone();
        self.votes.submit(&key, &agent, vote)
    }

    /// Ask `participants` for state and wait up to `window`
    pub async fn collect_states(
        &self,
        query: StateQuery,
        participants: &[AgentId],
        window: Duration,
    ) -> StateCollection {
        let request_id = Uuid::new_v4().to_string();
        let (_guard, mut rx) = self
            .states
            .open(request_id.clone(), participants.iter().cloned().collect());

        let deadline = Instant::now() + window;
        let mut requested = Vec::with_capacity(participants.len());
        for agent in participants {
            let request = SwarmMessage::StateRequest {
                request_id: request_id.clone(),
                query: query.clone(),
            };
            if self.send_system(agent, request).await {
                requested.push(agent.clone());
            } else {
                self.states.forget(&request_id, agent);
            }
        }

        let mut responses = Vec::with_capacity(requested.len());
        let mut timed_out = false;
        while responses.len() < requested.len() {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some(response)) => responses.push(response),
                Ok(None) => break,
                Err(_) => {
                    timed_out = true;
                    break;
                }
            }
        }
        responses.sort_by(|a, b| a.0.cmp(&b.0));
        StateCollection {
            responses,
            requested,
            timed_out,
        }
    }

    /// Deliver an agent's answer to a state request
    pub fn submit_state(&self, request_id: &str, from: &AgentId, versions: Vec<StateVersion>) -> bool {
        self.states
            .submit(&request_id.to_string(), from, (from.clone(), versions))
    }

    /// Run one gossip round. Each agent in `assignments` pushes its view to
    /// the listed peers over the topology and reports the view it started
    /// the round with; waits up to `window` for the reports.
    pub async fn gossip_round(
        &self,
        proposal: Arc<Proposal>,
        round: u32,
        assignments: Vec<(AgentId, Vec<AgentId>)>,
        window: Duration,
    ) -> GossipCollection {
        let request_id = Uuid::new_v4().to_string();
        let (_guard, mut rx) = self.gossip.open(
            request_id.clone(),
            assignments.iter().map(|(id, _)| id.clone()).collect(),
        );

        let deadline = Instant::now() + window;
        let mut requested = Vec::with_capacity(assignments.len());
        for (agent, peers) in assignments {
            let request = SwarmMessage::GossipRound {
                request_id: request_id.clone(),
                proposal: proposal.clone(),
                round,
                peers,
            };
            if self.send_system(&agent, request).await {
                requested.push(agent);
            } else {
                self.gossip.forget(&request_id, &agent);
            }
        }

        let mut reports = Vec::with_capacity(requested.len());
        let mut timed_out = false;
        while reports.len() < requested.len() {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some(report)) => reports.push(report),
                Ok(None) => break,
                Err(_) => {
                    timed_out = true;
                    break;
                }
            }
        }
        reports.sort_by(|a, b| a.0.cmp(&b.0));
        debug!(
            proposal_id = %proposal.proposal_id,
            round,
            reports = reports.len(),
            timed_out,
            "Gossip round collected"
        );
        GossipCollection {
            reports,
            requested,
            timed_out,
        }
    }

    /// Deliver an agent's report for a gossip round
    pub fn submit_gossip(&self, request_id: &str, from: &AgentId, report: GossipReport) -> bool {
        self.gossip
            .submit(&request_id.to_string(), from, (from.clone(), report))
    }

    // =========================================================================
    // Health Monitoring
    // =========================================================================

    /// Reclassify heartbeat health, mark silent agents Failed, and let an
    /// Adaptive topology re-evaluate
    pub async fn scan_heartbeats(&self) -> Vec<HealthChange> {
        let changes = self.registry.write().await.scan(Instant::now());
        for change in &changes {
            if change.failed {
                warn!(agent_id = %change.agent_id, "Agent marked failed after missed heartbeats");
            } else {
                debug!(
                    agent_id = %change.agent_id,
                    from = %change.from,
                    to = %change.to,
                    "Agent health changed"
                );
            }
            self.event_bus.publish(SwarmEvent::AgentHealthChanged {
                agent_id: change.agent_id.clone(),
                from: change.from,
                to: change.to,
                timestamp: Utc::now(),
            });
        }

        let adaptive = self.topology.read().await.kind() == TopologyKind::Adaptive;
        if adaptive {
            if let Err(e) = self.evaluate_topology().await {
                warn!(error = %e, "Adaptive topology evaluation failed");
            }
        }
        changes
    }

    /// Scan heartbeats every `heartbeat_scan_interval` until the coordinator is dropped
    pub fn spawn_heartbeat_monitor(self: &Arc<Self>) -> JoinHandle<()> {
        let coordinator: Weak<Self> = Arc::downgrade(self);
        let period = self.config.heartbeat_scan_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(coordinator) = coordinator.upgrade() else {
                    break;
                };
                coordinator.scan_heartbeats().await;
            }
            debug!("Heartbeat monitor stopped");
        })
    }
}

impl std::fmt::Debug for SwarmCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwarmCoordinator")
            .field("swarm_id", &self.swarm_id)
            .finish_non_exhaustive()
    }
}

fn refresh_roles(registry: &mut AgentRegistry, topology: &dyn Topology) {
    for id in registry.ids() {
        let role = topology.role_of(&id).unwrap_or(TopologyRole::Unassigned);
        registry.set_topology_role(&id, role);
    }
}

fn push(sender: &mpsc::Sender<Envelope>, envelope: Envelope) -> Result<(), &'static str> {
    sender.try_send(envelope).map_err(|e| match e {
        mpsc::error::TrySendError::Full(_) => "mailbox full",
        mpsc::error::TrySendError::Closed(_) => "mailbox closed",
    })
}
