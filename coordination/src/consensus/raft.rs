//! Raft-style leader election and log replication
//!
//! Each registered agent is represented by a [`RaftNode`] holding its term,
//! role, vote, and in-memory log. An agent takes part only while its
//! heartbeat is Healthy or Degraded; a leader whose agent stops
//! heartbeating stops sending Raft heartbeats, so followers time out and
//! elect a successor with a strictly higher term.
//!
//! All node state lives behind one `tokio::sync::Mutex`. Every operation is
//! a short synchronous step under the lock; waiting happens outside it.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::{ConsensusAlgorithm, ConsensusContext};
use crate::config::RaftConfig;
use crate::coordinator::{SharedCoordinator, SwarmCoordinator, SwarmMessage};
use crate::error::{SwarmError, SwarmResult};
use crate::events::SwarmEvent;
use crate::otel;
use crate::types::{AgentId, AlgorithmKind, ConsensusResult, Decision, Proposal, ProposalId, VoteTally};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RaftRole {
    Follower,
    Candidate,
    Leader,
}

/// One replicated log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub term: u64,
    /// 1-based position in the log
    pub index: u64,
    pub proposal_id: ProposalId,
}

#[derive(Debug, Clone)]
struct RaftNode {
    term: u64,
    role: RaftRole,
    voted_for: Option<AgentId>,
    log: Vec<LogEntry>,
    commit_index: u64,
    last_contact: Instant,
    election_timeout: Duration,
}

impl RaftNode {
    fn new(now: Instant, election_timeout: Duration) -> Self {
        Self {
            term: 0,
            role: RaftRole::Follower,
            voted_for: None,
            log: Vec::new(),
            commit_index: 0,
            last_contact: now,
            election_timeout,
        }
    }

    /// `(term, index)` of the last entry
    fn last_log(&self) -> (u64, u64) {
        self.log.last().map_or((0, 0), |e| (e.term, e.index))
    }

    fn expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.last_contact) >= self.election_timeout
    }

    /// Adopt a newer term seen from a peer
    fn observe_term(&mut self, term: u64) {
        if term > self.term {
            self.term = term;
            self.role = RaftRole::Follower;
            self.voted_for = None;
        }
    }

    /// Copy the leader's log past the longest matching prefix
    fn replicate_from(&mut self, leader_log: &[LogEntry]) {
        let mut matched = self.log.len().min(leader_log.len());
        while matched > 0 && self.log[matched - 1].term != leader_log[matched - 1].term {
            matched -= 1;
        }
        self.log.truncate(matched);
        self.log.extend_from_slice(&leader_log[matched..]);
    }
}

/// Read-only view of one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaftNodeView {
    pub term: u64,
    pub role: RaftRole,
    pub voted_for: Option<AgentId>,
    pub log_len: usize,
    pub commit_index: u64,
}

#[derive(Debug)]
struct Cluster {
    nodes: BTreeMap<AgentId, RaftNode>,
    leader: Option<AgentId>,
    last_heartbeat_sent: Option<Instant>,
    rng: StdRng,
}

impl Cluster {
    fn draw_timeout(&mut self, config: &RaftConfig) -> Duration {
        let base = config.election_timeout_ms.max(1);
        Duration::from_millis(self.rng.gen_range(base..base * 2))
    }

    fn majority(&self) -> usize {
        self.nodes.len() / 2 + 1
    }

    /// Add nodes for new members and drop nodes for departed ones
    fn sync_membership(&mut self, members: &[AgentId], now: Instant, config: &RaftConfig) {
        let keep: HashSet<&AgentId> = members.iter().collect();
        self.nodes.retain(|id, _| keep.contains(id));
        if self
            .leader
            .as_ref()
            .is_some_and(|leader| !self.nodes.contains_key(leader))
        {
            self.leader = None;
        }
        for id in members {
            if !self.nodes.contains_key(id) {
                let timeout = self.draw_timeout(config);
                self.nodes.insert(id.clone(), RaftNode::new(now, timeout));
            }
        }
    }

    /// The leader if its agent is alive and it still holds the role
    fn live_leader(&self, alive: &HashSet<AgentId>) -> Option<(AgentId, u64)> {
        let leader = self.leader.as_ref()?;
        let node = self.nodes.get(leader)?;
        (node.role == RaftRole::Leader && alive.contains(leader)).then(|| (leader.clone(), node.term))
    }

    /// Leader heartbeat (empty append) to every live follower.
    /// Returns false if the leader discovered a newer term and stepped down.
    fn send_heartbeats(&mut self, leader: &AgentId, alive: &HashSet<AgentId>, now: Instant) -> bool {
        let Some(leader_node) = self.nodes.get(leader) else {
            return false;
        };
        let term = leader_node.term;
        let log = leader_node.log.clone();
        let commit = leader_node.commit_index;

        let mut newer_term = None;
        for (id, node) in self.nodes.iter_mut() {
            if id == leader || !alive.contains(id) {
                continue;
            }
            if node.term > term {
                newer_term = Some(newer_term.map_or(node.term, |t: u64| t.max(node.term)));
                continue;
            }
            node.observe_term(term);
            node.role = RaftRole::Follower;
            node.last_contact = now;
            node.replicate_from(&log);
            node.commit_index = node.commit_index.max(commit.min(node.log.len() as u64));
        }

        if let Some(newer) = newer_term {
            if let Some(node) = self.nodes.get_mut(leader) {
                node.observe_term(newer);
                node.last_contact = now;
            }
            self.leader = None;
            warn!(%leader, term, newer, "Leader stepped down on newer term");
            return false;
        }
        self.last_heartbeat_sent = Some(now);
        true
    }

    /// Run one election for `candidate`. Returns the vote count and whether it won.
    fn run_election(
        &mut self,
        candidate: &AgentId,
        alive: &HashSet<AgentId>,
        now: Instant,
        config: &RaftConfig,
    ) -> (u64, usize, bool) {
        let timeout = self.draw_timeout(config);
        let Some(node) = self.nodes.get_mut(candidate) else {
            return (0, 0, false);
        };
        node.term += 1;
        node.role = RaftRole::Candidate;
        node.voted_for = Some(candidate.clone());
        node.last_contact = now;
        node.election_timeout = timeout;
        let term = node.term;
        let candidate_log = node.last_log();

        let mut votes = 1;
        let mut newer_term = None;
        for (id, peer) in self.nodes.iter_mut() {
            if id == candidate || !alive.contains(id) {
                continue;
            }
            if peer.term > term {
                newer_term = Some(peer.term);
                break;
            }
            peer.observe_term(term);
            let log_ok = candidate_log >= peer.last_log();
            let free = peer.voted_for.as_ref().map_or(true, |v| v == candidate);
            if log_ok && free {
                peer.voted_for = Some(candidate.clone());
                peer.last_contact = now;
                votes += 1;
            }
        }

        if let Some(newer) = newer_term {
            if let Some(node) = self.nodes.get_mut(candidate) {
                node.observe_term(newer);
            }
            return (term, votes, false);
        }

        let won = votes >= self.majority();
        if won {
            if let Some(node) = self.nodes.get_mut(candidate) {
                node.role = RaftRole::Leader;
            }
            self.leader = Some(candidate.clone());
            self.last_heartbeat_sent = None;
        }
        (term, votes, won)
    }
}

/// Leader-based consensus: a proposal is approved once the leader commits it
pub struct RaftConsensus {
    config: RaftConfig,
    cluster: Mutex<Cluster>,
}

impl RaftConsensus {
    /// Election timeouts are seeded from `config.seed` when set
    pub fn new(config: RaftConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::with_rng(config, rng)
    }

    /// Deterministic election timeouts
    pub fn with_seed(config: RaftConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: RaftConfig, rng: StdRng) -> Self {
        Self {
            config,
            cluster: Mutex::new(Cluster {
                nodes: BTreeMap::new(),
                leader: None,
                last_heartbeat_sent: None,
                rng,
            }),
        }
    }

    pub fn config(&self) -> &RaftConfig {
        &self.config
    }

    /// Current leader and its term, if one is established
    pub async fn leader(&self) -> Option<(AgentId, u64)> {
        let cluster = self.cluster.lock().await;
        let leader = cluster.leader.clone()?;
        let node = cluster.nodes.get(&leader)?;
        (node.role == RaftRole::Leader).then_some((leader, node.term))
    }

    pub async fn node(&self, id: &AgentId) -> Option<RaftNodeView> {
        let cluster = self.cluster.lock().await;
        cluster.nodes.get(id).map(|node| RaftNodeView {
            term: node.term,
            role: node.role,
            voted_for: node.voted_for.clone(),
            log_len: node.log.len(),
            commit_index: node.commit_index,
        })
    }

    /// Advance the cluster one step: sync membership, send leader heartbeats
    /// when due, and run an election for the first follower whose timer expired.
    pub async fn tick(&self, coordinator: &SwarmCoordinator) -> Option<(AgentId, u64)> {
        let members = coordinator.active_agents().await;
        let alive: HashSet<AgentId> = coordinator.responsive_agents().await.into_iter().collect();
        let now = Instant::now();

        let mut cluster = self.cluster.lock().await;
        cluster.sync_membership(&members, now, &self.config);

        if let Some((leader, _)) = cluster.live_leader(&alive) {
            let due = cluster.last_heartbeat_sent.map_or(true, |sent| {
                now.saturating_duration_since(sent) >= self.config.heartbeat_interval()
            });
            if due {
                cluster.send_heartbeats(&leader, &alive, now);
            }
        }

        let candidate = cluster
            .nodes
            .iter()
            .filter(|(id, node)| {
                alive.contains(*id) && node.role != RaftRole::Leader && node.expired(now)
            })
            .min_by_key(|(id, node)| (node.last_contact + node.election_timeout, (*id).clone()))
            .map(|(id, _)| id.clone());

        if let Some(candidate) = candidate {
            let next_term = cluster.nodes.get(&candidate).map_or(1, |n| n.term + 1);
            let span = otel::election_span(candidate.as_str(), next_term);
            let (term, votes, won) = cluster.run_election(&candidate, &alive, now, &self.config);
            otel::record_election_result(&span, won, votes);
            if won {
                cluster.send_heartbeats(&candidate, &alive, now);
                info!(leader = %candidate, term, votes, "Leader elected");
                coordinator.event_bus().publish(SwarmEvent::LeaderElected {
                    agent_id: candidate.clone(),
                    term,
                    timestamp: Utc::now(),
                });
            } else {
                debug!(%candidate, term, votes, "Election lost");
            }
        }

        cluster.live_leader(&alive)
    }

    /// Tick every `tick_interval` until this instance is dropped
    pub fn spawn_ticker(self: &Arc<Self>, coordinator: SharedCoordinator) -> JoinHandle<()> {
        let raft: Weak<Self> = Arc::downgrade(self);
        let coordinator = Arc::downgrade(&coordinator);
        let period = self.config.tick_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let (Some(raft), Some(coordinator)) = (raft.upgrade(), coordinator.upgrade()) else {
                    break;
                };
                raft.tick(&coordinator).await;
            }
        })
    }

    /// Append on the leader and replicate to live followers.
    /// Returns the committed entry and the acknowledging agents.
    async fn append(
        &self,
        leader: &AgentId,
        proposal_id: &ProposalId,
        alive: &HashSet<AgentId>,
    ) -> Option<(LogEntry, Vec<AgentId>)> {
        let now = Instant::now();
        let mut cluster = self.cluster.lock().await;
        let majority = cluster.majority();
        let reachable = cluster.nodes.keys().filter(|id| alive.contains(*id)).count();
        if reachable < majority {
            return None;
        }

        let leader_node = cluster.nodes.get_mut(leader)?;
        if leader_node.role != RaftRole::Leader {
            return None;
        }
        let entry = LogEntry {
            term: leader_node.term,
            index: leader_node.log.len() as u64 + 1,
            proposal_id: proposal_id.clone(),
        };
        leader_node.log.push(entry.clone());

        if !cluster.send_heartbeats(leader, alive, now) {
            return None;
        }
        let acks: Vec<AgentId> = cluster
            .nodes
            .iter()
            .filter(|(id, node)| {
                alive.contains(*id)
                    && node.log.get(entry.index as usize - 1).is_some_and(|e| e.term == entry.term)
            })
            .map(|(id, _)| id.clone())
            .collect();
        if acks.len() < majority {
            return None;
        }

        for (id, node) in cluster.nodes.iter_mut() {
            if acks.contains(id) {
                node.commit_index = node.commit_index.max(entry.index);
            }
        }
        Some((entry, acks))
    }
}

impl std::fmt::Debug for RaftConsensus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RaftConsensus")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ConsensusAlgorithm for RaftConsensus {
    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::Raft
    }

    async fn propose(
        &self,
        ctx: &ConsensusContext,
        proposal: Arc<Proposal>,
    ) -> SwarmResult<ConsensusResult> {
        let coordinator = &ctx.coordinator;
        let members = coordinator.active_agents().await.len();
        let alive = coordinator.responsive_agents().await.len();
        let need = members / 2 + 1;
        if members == 0 || alive < need {
            return Err(SwarmError::insufficient("raft", alive, need.max(1)));
        }

        let mut attempts = 0u32;
        loop {
            attempts += 1;
            if let Some((leader, _)) = self.tick(coordinator).await {
                let alive: HashSet<AgentId> =
                    coordinator.responsive_agents().await.into_iter().collect();
                if let Some((entry, acks)) = self.append(&leader, &proposal.proposal_id, &alive).await {
                    let notified = coordinator
                        .broadcast_system(SwarmMessage::RaftCommit {
                            proposal_id: entry.proposal_id.clone(),
                            term: entry.term,
                            index: entry.index,
                        })
                        .await;
                    info!(
                        proposal_id = %proposal.proposal_id,
                        %leader,
                        term = entry.term,
                        index = entry.index,
                        acks = acks.len(),
                        "Entry committed"
                    );
                    let tally = VoteTally {
                        votes_for: acks.len(),
                        ..VoteTally::default()
                    };
                    return Ok(ConsensusResult::new(
                        proposal.proposal_id.clone(),
                        AlgorithmKind::Raft,
                        Decision::Approved,
                        tally,
                        acks,
                    )
                    .with_metadata("leader", leader.to_string())
                    .with_metadata("term", entry.term)
                    .with_metadata("index", entry.index)
                    .with_metadata("notified", notified)
                    .with_metadata("attempts", attempts));
                }
            }

            let next = Instant::now() + self.config.tick_interval();
            if next >= ctx.deadline {
                break;
            }
            tokio::time::sleep_until(next).await;
        }

        debug!(proposal_id = %proposal.proposal_id, attempts, "No commit before deadline");
        let leader = self.leader().await;
        let mut result = ConsensusResult::new(
            proposal.proposal_id.clone(),
            AlgorithmKind::Raft,
            Decision::Timeout,
            VoteTally::default(),
            Vec::new(),
        )
        .with_metadata("attempts", attempts);
        if let Some((leader, term)) = leader {
            result = result
                .with_metadata("leader", leader.to_string())
                .with_metadata("term", term);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<AgentId> {
        names.iter().map(|n| AgentId::new(*n)).collect()
    }

    fn cluster(names: &[&str], now: Instant) -> Cluster {
        let mut cluster = Cluster {
            nodes: BTreeMap::new(),
            leader: None,
            last_heartbeat_sent: None,
            rng: StdRng::seed_from_u64(7),
        };
        cluster.sync_membership(&ids(names), now, &RaftConfig::default());
        cluster
    }

    #[test]
    fn test_election_needs_majority() {
        let now = Instant::now();
        let config = RaftConfig::default();
        let mut c = cluster(&["a", "b", "c", "d", "e"], now);

        let alive: HashSet<AgentId> = ids(&["a", "b"]).into_iter().collect();
        let (term, votes, won) = c.run_election(&AgentId::new("a"), &alive, now, &config);
        assert_eq!((term, votes, won), (1, 2, false));

        let alive: HashSet<AgentId> = ids(&["a", "b", "c"]).into_iter().collect();
        let (term, votes, won) = c.run_election(&AgentId::new("b"), &alive, now, &config);
        assert_eq!(term, 2);
        assert_eq!(votes, 3);
        assert!(won);
        assert_eq!(c.leader, Some(AgentId::new("b")));
    }

    #[test]
    fn test_stale_log_cannot_win() {
        let now = Instant::now();
        let config = RaftConfig::default();
        let mut c = cluster(&["a", "b", "c"], now);
        let entry = LogEntry {
            term: 1,
            index: 1,
            proposal_id: ProposalId::from("p-1"),
        };
        for id in ["b", "c"] {
            let node = c.nodes.get_mut(&AgentId::new(id)).unwrap();
            node.term = 1;
            node.log.push(entry.clone());
        }
        let alive: HashSet<AgentId> = ids(&["a", "b", "c"]).into_iter().collect();
        let (_, votes, won) = c.run_election(&AgentId::new("a"), &alive, now, &config);
        assert_eq!(votes, 1);
        assert!(!won);
    }

    #[test]
    fn test_replication_truncates_conflicting_suffix() {
        let now = Instant::now();
        let mut node = RaftNode::new(now, Duration::from_millis(150));
        let entry = |term, index, id: &str| LogEntry {
            term,
            index,
            proposal_id: ProposalId::from(id),
        };
        node.log = vec![entry(1, 1, "x"), entry(1, 2, "stale")];
        let leader_log = vec![entry(1, 1, "x"), entry(2, 2, "y"), entry(2, 3, "z")];
        node.replicate_from(&leader_log);
        assert_eq!(node.log, leader_log);
    }

    #[test]
    fn test_heartbeat_from_stale_leader_is_rejected() {
        let now = Instant::now();
        let config = RaftConfig::default();
        let mut c = cluster(&["a", "b", "c"], now);
        let alive: HashSet<AgentId> = ids(&["a", "b", "c"]).into_iter().collect();
        let a = AgentId::new("a");
        assert!(c.run_election(&a, &alive, now, &config).2);

        c.nodes.get_mut(&AgentId::new("b")).unwrap().term = 5;
        assert!(!c.send_heartbeats(&a, &alive, now));
        assert_eq!(c.leader, None);
        let old = c.nodes.get(&a).unwrap();
        assert_eq!(old.role, RaftRole::Follower);
        assert_eq!(old.term, 5);
    }
}
