//! Swarm simulator
//!
//! Spins up simulated agents, puts one proposal to them, then synchronizes
//! one deliberately divergent state key and prints what happened.
//!
//! # Usage
//!
//! ```bash
//! # Five agents voting by quorum over a mesh
//! swarm-sim --agents 5
//!
//! # Byzantine voting with one equivocating agent, JSON output
//! swarm-sim --agents 4 --algorithm byzantine --malicious 1 --json
//!
//! # Settings from a file, overridden by flags
//! RUST_LOG=swarm_coordination=debug swarm-sim --config swarm.toml --topology ring
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;

use swarm_coordination::{
    AgentMetadata, AgentWorker, AlgorithmKind, InMemoryProvider, Proposal, SimulatedAgent,
    StateValue, StateVersion, SwarmConfig, SwarmEngine, TopologyKind, VoteChoice, VotePolicy,
};

/// State key the simulator seeds with conflicting values
const SYNC_KEY: &str = "swarm-config";

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of simulated agents
    #[arg(long, default_value_t = 5)]
    agents: usize,

    /// Topology: mesh, star, hierarchical, ring, adaptive (overrides config)
    #[arg(long)]
    topology: Option<TopologyKind>,

    /// Consensus algorithm: quorum, raft, byzantine, gossip, crdt
    #[arg(long, default_value = "quorum")]
    algorithm: AlgorithmKind,

    /// Required approval fraction
    #[arg(long, default_value_t = 0.51)]
    threshold: f64,

    /// Agents that vote inconsistently across rounds
    #[arg(long, default_value_t = 0)]
    malicious: usize,

    /// Agents that vote against
    #[arg(long, default_value_t = 0)]
    against: usize,

    /// Overall consensus deadline in milliseconds (overrides config)
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// TOML config file; `SWARM_*` environment variables apply on top
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the result as JSON
    #[arg(long, default_value_t = false)]
    json: bool,
}

impl Args {
    fn policy(&self, index: usize) -> VotePolicy {
        if index < self.malicious {
            VotePolicy::Alternating
        } else if index < self.malicious + self.against {
            VotePolicy::Always(VoteChoice::Against)
        } else {
            VotePolicy::Always(VoteChoice::For)
        }
    }

    fn proposal(&self) -> Proposal {
        let payload = match self.algorithm {
            AlgorithmKind::Crdt => json!({
                "state_key": "visits",
                "value": { "type": "g_counter", "state": { "counts": { "agent-0": 1 } } }
            }),
            _ => json!({ "action": "simulate", "agents": self.agents }),
        };
        Proposal::new(payload).with_threshold(self.threshold)
    }
}

fn load_config(args: &Args) -> Result<SwarmConfig> {
    let mut config = match &args.config {
        Some(path) => SwarmConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => SwarmConfig::from_env(),
    };
    if let Some(kind) = args.topology {
        config.topology = kind;
    }
    if let Some(ms) = args.timeout_ms {
        config.default_consensus_timeout_ms = ms;
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("swarm_coordination=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if args.agents == 0 {
        anyhow::bail!("--agents must be at least 1");
    }
    let config = load_config(&args)?;
    let heartbeat = config.heartbeat_interval();
    let engine = SwarmEngine::new(config, Arc::new(InMemoryProvider::new()))?;
    engine.start();

    let coordinator = engine.coordinator().clone();
    let mut workers = Vec::with_capacity(args.agents);
    for i in 0..args.agents {
        let id = format!("agent-{}", i);
        coordinator
            .register_agent(id.as_str(), AgentMetadata::new("simulated"))
            .await;
        let inbox = coordinator
            .take_inbox(&id.as_str().into())
            .await
            .with_context(|| format!("Inbox for {} already taken", id))?;
        let seeded = StateVersion::new(
            SYNC_KEY,
            StateValue::plain(format!("v{}", i % 2)),
            1,
            100 + i as u64,
            id.as_str(),
        );
        let agent = SimulatedAgent::new(id.as_str(), args.policy(i)).with_state(seeded);
        workers.push(AgentWorker::spawn(coordinator.clone(), inbox, agent, Some(heartbeat)));
    }
    tracing::info!(agents = args.agents, algorithm = %args.algorithm, "Simulated agents running");

    let timeout = args.timeout_ms.map(Duration::from_millis);
    let consensus = engine
        .request_consensus(args.proposal(), args.algorithm, timeout)
        .await
        .context("Consensus request failed")?;
    let sync = engine
        .synchronize_with_report(engine.swarm_id(), SYNC_KEY)
        .await
        .context("State synchronization failed")?;
    let topology = coordinator.get_topology_info().await;
    let messages = coordinator.message_stats();

    if args.json {
        let report = json!({
            "swarm_id": engine.swarm_id().to_string(),
            "topology": topology,
            "consensus": consensus,
            "sync": sync,
            "messages": {
                "total_sent": messages.total_sent,
                "total_received": messages.total_received,
                "message_rate": messages.message_rate,
                "avg_latency_us": messages.avg_latency.as_micros() as u64,
            },
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "Topology: {} ({} agents, {} connections)",
            topology.kind, topology.agent_count, topology.connection_count
        );
        println!(
            "Consensus [{}]: {} (for {}, against {}, abstain {}) in {} ms",
            consensus.algorithm,
            consensus.decision,
            consensus.votes_for,
            consensus.votes_against,
            consensus.abstain,
            consensus.duration.as_millis()
        );
        println!(
            "Sync '{}': version {} from {}/{} responders{}",
            SYNC_KEY,
            sync.resolved.version,
            sync.responders,
            sync.required,
            if sync.divergent { ", divergence resolved" } else { "" }
        );
        println!(
            "Messages: {} sent, {} received",
            messages.total_sent, messages.total_received
        );
    }

    engine.shutdown();
    for worker in workers {
        worker.abort();
    }
    Ok(())
}
