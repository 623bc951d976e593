//! Agent runtime
//!
//! [`AgentWorker`] drains an agent's inbox and answers control-plane
//! requests on its behalf. What it answers is decided by an
//! [`AgentBehavior`]; [`SimulatedAgent`] is the in-process behavior used by
//! the simulator and the tests. Gossip views are kept by the worker itself,
//! so every behavior takes part in gossip the same way.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::Interval;
use tracing::{debug, trace};

use crate::coordinator::{
    AgentInbox, Envelope, GossipReport, GossipView, SharedCoordinator, StateQuery, SwarmMessage,
};
use crate::types::{now_millis, AgentId, Proposal, ProposalId, StateValue, StateVersion, Vote, VoteChoice};

/// How an agent reacts to what arrives in its inbox
pub trait AgentBehavior: Send + 'static {
    /// Vote to cast, or `None` to stay silent
    fn on_vote_request(&mut self, proposal: &Proposal, round: u32) -> Option<VoteChoice>;

    /// Versions held that match `query`
    fn on_state_request(&mut self, query: &StateQuery) -> Vec<StateVersion>;

    fn on_state_update(&mut self, version: StateVersion);

    fn on_commit(&mut self, _proposal_id: &ProposalId, _term: u64, _index: u64) {}

    fn on_message(&mut self, _from: Option<&AgentId>, _payload: &serde_json::Value) {}
}

/// Voting behavior of a simulated agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VotePolicy {
    /// Same answer every time
    Always(VoteChoice),
    /// For, Against, For, ... across requests
    Alternating,
    /// Never votes
    Silent,
    /// Answers in order; the last entry repeats
    Sequence(Vec<Option<VoteChoice>>),
}

impl Default for VotePolicy {
    fn default() -> Self {
        Self::Always(VoteChoice::For)
    }
}

impl VotePolicy {
    /// Answer to the `n`th request (0-based)
    pub fn answer(&self, n: usize) -> Option<VoteChoice> {
        match self {
            Self::Always(choice) => Some(*choice),
            Self::Alternating if n % 2 == 0 => Some(VoteChoice::For),
            Self::Alternating => Some(VoteChoice::Against),
            Self::Silent => None,
            Self::Sequence(answers) => answers.get(n).or(answers.last()).copied().flatten(),
        }
    }
}

/// What a simulated agent holds
#[derive(Debug, Default, Clone)]
pub struct Replica {
    pub entries: BTreeMap<String, StateVersion>,
    /// Committed Raft entries in arrival order
    pub commits: Vec<(ProposalId, u64, u64)>,
    pub messages: usize,
}

impl Replica {
    /// Adopt `version` unless a newer one is already held
    pub fn apply(&mut self, version: StateVersion) -> bool {
        match self.entries.get(&version.state_key) {
            Some(current) if current.version > version.version => false,
            _ => {
                self.entries.insert(version.state_key.clone(), version);
                true
            }
        }
    }
}

pub type SharedReplica = Arc<Mutex<Replica>>;

/// In-process agent with a vote policy and a local replica
#[derive(Debug)]
pub struct SimulatedAgent {
    agent_id: AgentId,
    policy: VotePolicy,
    replica: SharedReplica,
    vote_requests: usize,
}

impl SimulatedAgent {
    pub fn new(agent_id: impl Into<AgentId>, policy: VotePolicy) -> Self {
        Self {
            agent_id: agent_id.into(),
            policy,
            replica: Arc::new(Mutex::new(Replica::default())),
            vote_requests: 0,
        }
    }

    /// Seed the replica with an existing version
    pub fn with_state(self, version: StateVersion) -> Self {
        self.lock().apply(version);
        self
    }

    /// Handle for inspecting the replica after the worker took ownership
    pub fn replica(&self) -> SharedReplica {
        self.replica.clone()
    }

    /// Write a new local version of `state_key`
    pub fn write(&self, state_key: &str, value: StateValue) -> StateVersion {
        let mut replica = self.lock();
        let version = match replica.entries.get(state_key) {
            Some(current) => current.next(value, now_millis(), &self.agent_id),
            None => StateVersion::new(state_key, value, 1, now_millis(), self.agent_id.clone()),
        };
        replica.entries.insert(state_key.to_string(), version.clone());
        version
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Replica> {
        self.replica.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl AgentBehavior for SimulatedAgent {
    fn on_vote_request(&mut self, _proposal: &Proposal, _round: u32) -> Option<VoteChoice> {
        let answer = self.policy.answer(self.vote_requests);
        self.vote_requests += 1;
        answer
    }

    fn on_state_request(&mut self, query: &StateQuery) -> Vec<StateVersion> {
        let replica = self.lock();
        match query {
            StateQuery::Key(key) => replica.entries.get(key).cloned().into_iter().collect(),
            StateQuery::Since(since) => replica
                .entries
                .values()
                .filter(|v| v.version > *since)
                .cloned()
                .collect(),
        }
    }

    fn on_state_update(&mut self, version: StateVersion) {
        self.lock().apply(version);
    }

    fn on_commit(&mut self, proposal_id: &ProposalId, term: u64, index: u64) {
        self.lock().commits.push((proposal_id.clone(), term, index));
    }

    fn on_message(&mut self, _from: Option<&AgentId>, _payload: &serde_json::Value) {
        self.lock().messages += 1;
    }
}

/// Finished gossip runs remembered so late pushes are dropped
const FINISHED_GOSSIP: usize = 64;

#[derive(Debug, Default)]
struct GossipState {
    view: GossipView,
    /// Own vote already consulted
    seeded: bool,
    /// Pushes received but sent in a round this agent has not moved past
    held: Vec<(u32, GossipView)>,
}

/// One agent's gossip views, per proposal.
///
/// A push sent in round `r` becomes visible when the agent begins round
/// `r + 1`, so every agent spreads exactly what it knew when the round began.
#[derive(Debug, Default)]
pub struct GossipViews {
    active: HashMap<ProposalId, GossipState>,
    finished: VecDeque<ProposalId>,
}

impl GossipViews {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept a peer's push. Ignored once the run is over.
    pub fn receive(&mut self, proposal_id: &ProposalId, round: u32, view: GossipView) {
        if self.finished.contains(proposal_id) {
            return;
        }
        self.active
            .entry(proposal_id.clone())
            .or_default()
            .held
            .push((round, view));
    }

    /// Begin `round` and return the view to report and spread. `own_vote`
    /// is asked once per proposal for this agent's own choice.
    pub fn begin_round(
        &mut self,
        proposal_id: &ProposalId,
        round: u32,
        agent_id: &AgentId,
        own_vote: impl FnOnce() -> Option<VoteChoice>,
    ) -> GossipView {
        let state = self.active.entry(proposal_id.clone()).or_default();
        if !state.seeded {
            state.seeded = true;
            if let Some(choice) = own_vote() {
                state.view.insert(agent_id.clone(), choice);
            }
        }

        let (ready, later): (Vec<_>, Vec<_>) = std::mem::take(&mut state.held)
            .into_iter()
            .partition(|(sent, _)| *sent < round);
        state.held = later;
        for (_, view) in ready {
            for (origin, choice) in view {
                state.view.entry(origin).or_insert(choice);
            }
        }
        state.view.clone()
    }

    pub fn view(&self, proposal_id: &ProposalId) -> Option<&GossipView> {
        self.active.get(proposal_id).map(|state| &state.view)
    }

    /// Drop the view for a finished run
    pub fn finish(&mut self, proposal_id: &ProposalId) {
        self.active.remove(proposal_id);
        if !self.finished.contains(proposal_id) {
            if self.finished.len() == FINISHED_GOSSIP {
                self.finished.pop_front();
            }
            self.finished.push_back(proposal_id.clone());
        }
    }
}

/// Task that serves one agent's inbox
pub struct AgentWorker;

impl AgentWorker {
    /// Serve `inbox` until the agent is unregistered or the task is aborted.
    /// With `heartbeat` set the worker also reports liveness on that period.
    pub fn spawn<B: AgentBehavior>(
        coordinator: SharedCoordinator,
        mut inbox: AgentInbox,
        mut behavior: B,
        heartbeat: Option<Duration>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let agent_id = inbox.agent_id().clone();
            let mut gossip = GossipViews::new();
            let mut beat = heartbeat.map(tokio::time::interval);
            loop {
                tokio::select! {
                    envelope = inbox.recv() => match envelope {
                        Some(envelope) => {
                            handle(&coordinator, &agent_id, &mut behavior, &mut gossip, envelope).await
                        }
                        None => break,
                    },
                    _ = tick(&mut beat) => {
                        if let Err(e) = coordinator.heartbeat(&agent_id).await {
                            debug!(agent_id = %agent_id, error = %e, "Heartbeat rejected");
                        }
                    }
                }
            }
            debug!(agent_id = %agent_id, "Agent worker stopped");
        })
    }
}

async fn tick(beat: &mut Option<Interval>) {
    match beat {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn handle<B: AgentBehavior>(
    coordinator: &SharedCoordinator,
    agent_id: &AgentId,
    behavior: &mut B,
    gossip: &mut GossipViews,
    envelope: Envelope,
) {
    trace!(agent_id = %agent_id, kind = envelope.message.kind(), "Envelope received");
    match envelope.message {
        SwarmMessage::VoteRequest { proposal, round } => {
            if let Some(choice) = behavior.on_vote_request(&proposal, round) {
                let vote = Vote::new(agent_id.clone(), proposal.proposal_id.clone(), choice, round);
                coordinator.submit_vote(vote);
            }
        }
        SwarmMessage::StateRequest { request_id, query } => {
            let versions = behavior.on_state_request(&query);
            coordinator.submit_state(&request_id, agent_id, versions);
        }
        SwarmMessage::StateUpdate(version) => behavior.on_state_update(version),
        SwarmMessage::RaftCommit {
            proposal_id,
            term,
            index,
        } => behavior.on_commit(&proposal_id, term, index),
        SwarmMessage::Direct(payload) => behavior.on_message(envelope.from.as_ref(), &payload),
        SwarmMessage::GossipRound {
            request_id,
            proposal,
            round,
            peers,
        } => {
            let view = gossip.begin_round(&proposal.proposal_id, round, agent_id, || {
                behavior.on_vote_request(&proposal, round)
            });
            let mut pushed = 0;
            for peer in &peers {
                let push = SwarmMessage::GossipPush {
                    proposal_id: proposal.proposal_id.clone(),
                    round,
                    view: view.clone(),
                };
                match coordinator.send_message(agent_id, peer, push).await {
                    Ok(()) => pushed += 1,
                    Err(e) => debug!(agent_id = %agent_id, peer = %peer, error = %e, "Gossip push failed"),
                }
            }
            coordinator.submit_gossip(&request_id, agent_id, GossipReport { view, pushed });
        }
        SwarmMessage::GossipPush {
            proposal_id,
            round,
            view,
        } => gossip.receive(&proposal_id, round, view),
        SwarmMessage::GossipDone { proposal_id } => gossip.finish(&proposal_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use VoteChoice::*;

    #[test]
    fn test_vote_policies() {
        assert_eq!(VotePolicy::Always(Against).answer(5), Some(Against));
        assert_eq!(VotePolicy::Alternating.answer(0), Some(For));
        assert_eq!(VotePolicy::Alternating.answer(1), Some(Against));
        assert_eq!(VotePolicy::Silent.answer(0), None);

        let sequence = VotePolicy::Sequence(vec![Some(For), None, Some(Abstain)]);
        assert_eq!(sequence.answer(1), None);
        assert_eq!(sequence.answer(2), Some(Abstain));
        assert_eq!(sequence.answer(9), Some(Abstain));
        assert_eq!(VotePolicy::Sequence(vec![]).answer(0), None);
    }

    #[test]
    fn test_replica_keeps_newest_version() {
        let agent = SimulatedAgent::new("a", VotePolicy::default());
        let first = agent.write("cfg", StateValue::plain("v1"));
        let second = agent.write("cfg", StateValue::plain("v2"));
        assert_eq!(second.version, first.version + 1);

        let mut agent = agent;
        agent.on_state_update(first);
        let held = agent.on_state_request(&StateQuery::Key("cfg".into()));
        assert_eq!(held, vec![second]);
    }

    #[test]
    fn test_since_query_filters_by_version() {
        let mut agent = SimulatedAgent::new("a", VotePolicy::default())
            .with_state(StateVersion::new("old", StateValue::plain(1), 1, 10, "a"))
            .with_state(StateVersion::new("new", StateValue::plain(2), 5, 20, "a"));
        let changed = agent.on_state_request(&StateQuery::Since(3));
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].state_key, "new");
    }

    fn view(entries: &[(&str, VoteChoice)]) -> GossipView {
        entries
            .iter()
            .map(|(id, choice)| (AgentId::new(*id), *choice))
            .collect()
    }

    #[test]
    fn test_gossip_pushes_wait_for_the_next_round() {
        let proposal_id = ProposalId::new();
        let me = AgentId::new("a");
        let mut gossip = GossipViews::new();

        // Round 1 push from a faster peer arrives before our own round 1
        gossip.receive(&proposal_id, 1, view(&[("b", Against)]));
        let first = gossip.begin_round(&proposal_id, 1, &me, || Some(For));
        assert_eq!(first, view(&[("a", For)]));

        let second = gossip.begin_round(&proposal_id, 2, &me, || panic!("own vote asked twice"));
        assert_eq!(second, view(&[("a", For), ("b", Against)]));
    }

    #[test]
    fn test_gossip_merge_keeps_first_choice_per_voter() {
        let proposal_id = ProposalId::new();
        let me = AgentId::new("a");
        let mut gossip = GossipViews::new();
        gossip.begin_round(&proposal_id, 1, &me, || Some(For));

        gossip.receive(&proposal_id, 1, view(&[("a", Against), ("c", For)]));
        let merged = gossip.begin_round(&proposal_id, 2, &me, || None);
        assert_eq!(merged, view(&[("a", For), ("c", For)]));
    }

    #[test]
    fn test_gossip_finish_drops_view_and_late_pushes() {
        let proposal_id = ProposalId::new();
        let mut gossip = GossipViews::new();
        gossip.begin_round(&proposal_id, 1, &AgentId::new("a"), || Some(For));
        gossip.finish(&proposal_id);
        assert!(gossip.view(&proposal_id).is_none());

        gossip.receive(&proposal_id, 1, view(&[("b", For)]));
        assert!(gossip.view(&proposal_id).is_none());
    }

    #[test]
    fn test_silent_agent_still_relays() {
        let proposal_id = ProposalId::new();
        let me = AgentId::new("quiet");
        let mut gossip = GossipViews::new();
        assert!(gossip.begin_round(&proposal_id, 1, &me, || None).is_empty());
        gossip.receive(&proposal_id, 1, view(&[("b", For)]));
        assert_eq!(gossip.begin_round(&proposal_id, 2, &me, || None), view(&[("b", For)]));
    }
}
