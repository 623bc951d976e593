//! OpenTelemetry-Compatible Span Helpers
//!
//! Provides structured `tracing` span builders for the coordination core.
//! All spans use dot-notation field names compatible with OpenTelemetry
//! semantic conventions.
//!
//! # Span Hierarchy
//!
//! ```text
//! swarm.consensus              (one per request_consensus)
//!   ├─ swarm.vote_round        (one per vote collection round)
//!   └─ swarm.election          (Raft election started while waiting for a leader)
//! swarm.sync                   (one per synchronize / delta_sync)
//! swarm.topology_switch        (explicit switch or adaptive re-evaluation)
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use swarm_coordination::otel;
//!
//! let span = otel::consensus_span("p-1", "quorum", 4);
//! let guard = span.enter();
//! // ... collect votes ...
//! otel::record_consensus_result(&span, "approved", 3, 1, 42);
//! drop(guard);
//! ```

use tracing::Span;

// ── Span Name Constants ──────────────────────────────────────────────

/// One consensus request end-to-end.
pub const SPAN_CONSENSUS: &str = "swarm.consensus";

/// One vote collection round.
pub const SPAN_VOTE_ROUND: &str = "swarm.vote_round";

/// State synchronization of one key or one delta.
pub const SPAN_SYNC: &str = "swarm.sync";

/// Topology strategy change.
pub const SPAN_TOPOLOGY_SWITCH: &str = "swarm.topology_switch";

/// Raft leader election.
pub const SPAN_ELECTION: &str = "swarm.election";

// ── Field Name Constants ─────────────────────────────────────────────
// Using OpenTelemetry-style dot notation for structured export.

pub const FIELD_PROPOSAL_ID: &str = "swarm.proposal.id";
pub const FIELD_ALGORITHM: &str = "swarm.consensus.algorithm";
pub const FIELD_PARTICIPANTS: &str = "swarm.consensus.participants";
pub const FIELD_DECISION: &str = "swarm.consensus.decision";
pub const FIELD_VOTES_FOR: &str = "swarm.vote.for";
pub const FIELD_VOTES_AGAINST: &str = "swarm.vote.against";
pub const FIELD_ROUND: &str = "swarm.vote.round";
pub const FIELD_REQUESTED: &str = "swarm.vote.requested";
pub const FIELD_RECEIVED: &str = "swarm.vote.received";
pub const FIELD_TIMED_OUT: &str = "swarm.timed_out";
pub const FIELD_STATE_KEY: &str = "swarm.state.key";
pub const FIELD_STATE_VERSION: &str = "swarm.state.version";
pub const FIELD_REQUIRED: &str = "swarm.sync.required";
pub const FIELD_RESPONDERS: &str = "swarm.sync.responders";
pub const FIELD_DIVERGENT: &str = "swarm.sync.divergent";
pub const FIELD_FROM_TOPOLOGY: &str = "swarm.topology.from";
pub const FIELD_TO_TOPOLOGY: &str = "swarm.topology.to";
pub const FIELD_AGENT_COUNT: &str = "swarm.agent_count";
pub const FIELD_CANDIDATE: &str = "swarm.election.candidate";
pub const FIELD_TERM: &str = "swarm.election.term";
pub const FIELD_WON: &str = "swarm.election.won";
pub const FIELD_DURATION_MS: &str = "swarm.duration_ms";

// ── Span Builders ────────────────────────────────────────────────────

/// Create a root span for one consensus request.
///
/// Fields filled later via [`record_consensus_result`]: decision, vote counts, duration.
pub fn consensus_span(proposal_id: &str, algorithm: &str, participants: usize) -> Span {
    tracing::info_span!(
        "swarm.consensus",
        "swarm.proposal.id" = %proposal_id,
        "swarm.consensus.algorithm" = %algorithm,
        "swarm.consensus.participants" = participants,
        "swarm.consensus.decision" = tracing::field::Empty,
        "swarm.vote.for" = tracing::field::Empty,
        "swarm.vote.against" = tracing::field::Empty,
        "swarm.duration_ms" = tracing::field::Empty,
    )
}

/// Record the final result on a consensus span.
pub fn record_consensus_result(
    span: &Span,
    decision: &str,
    votes_for: usize,
    votes_against: usize,
    duration_ms: u64,
) {
    span.record("swarm.consensus.decision", decision);
    span.record("swarm.vote.for", votes_for);
    span.record("swarm.vote.against", votes_against);
    span.record("swarm.duration_ms", duration_ms);
}

/// Create a span for one vote collection round.
pub fn vote_round_span(proposal_id: &str, round: u32, requested: usize) -> Span {
    tracing::debug_span!(
        "swarm.vote_round",
        "swarm.proposal.id" = %proposal_id,
        "swarm.vote.round" = round,
        "swarm.vote.requested" = requested,
        "swarm.vote.received" = tracing::field::Empty,
        "swarm.timed_out" = tracing::field::Empty,
    )
}

/// Record how a vote round ended.
pub fn record_vote_round(span: &Span, received: usize, timed_out: bool) {
    span.record("swarm.vote.received", received);
    span.record("swarm.timed_out", timed_out);
}

/// Create a span for synchronizing one state key (or a delta when `state_key` is `*`).
pub fn sync_span(state_key: &str, required: usize) -> Span {
    tracing::info_span!(
        "swarm.sync",
        "swarm.state.key" = %state_key,
        "swarm.sync.required" = required,
        "swarm.sync.responders" = tracing::field::Empty,
        "swarm.sync.divergent" = tracing::field::Empty,
        "swarm.state.version" = tracing::field::Empty,
        "swarm.duration_ms" = tracing::field::Empty,
    )
}

/// Record the outcome of a sync.
pub fn record_sync_result(
    span: &Span,
    responders: usize,
    divergent: bool,
    version: u64,
    duration_ms: u64,
) {
    span.record("swarm.sync.responders", responders);
    span.record("swarm.sync.divergent", divergent);
    span.record("swarm.state.version", version);
    span.record("swarm.duration_ms", duration_ms);
}

/// Create a span for a topology switch.
pub fn topology_switch_span(from: &str, to: &str, agent_count: usize) -> Span {
    tracing::info_span!(
        "swarm.topology_switch",
        "swarm.topology.from" = %from,
        "swarm.topology.to" = %to,
        "swarm.agent_count" = agent_count,
        "swarm.duration_ms" = tracing::field::Empty,
    )
}

/// Record how long a topology switch took.
pub fn record_topology_switch(span: &Span, duration_ms: u64) {
    span.record("swarm.duration_ms", duration_ms);
}

/// Create a span for a Raft election.
pub fn election_span(candidate: &str, term: u64) -> Span {
    tracing::info_span!(
        "swarm.election",
        "swarm.election.candidate" = %candidate,
        "swarm.election.term" = term,
        "swarm.election.won" = tracing::field::Empty,
        "swarm.vote.received" = tracing::field::Empty,
    )
}

/// Record the election outcome.
pub fn record_election_result(span: &Span, won: bool, votes: usize) {
    span.record("swarm.election.won", won);
    span.record("swarm.vote.received", votes);
}

// ── Test Support ─────────────────────────────────────────────────────

/// Install a test-writer subscriber once per process so spans are enabled
/// and log output is captured by the test harness.
///
/// Honors `RUST_LOG`; defaults to `info`.
pub fn init_test_tracing() {
    use std::sync::Once;
    use tracing_subscriber::EnvFilter;

    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}
