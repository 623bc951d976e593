//! Integration tests for state synchronization
//!
//! Agents are seeded with their own copies of a key; the synchronizer has
//! to collect, resolve, push back, and persist.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{eventually, Swarm};
use serde_json::json;
use swarm_coordination::crdt::LwwRegister;
use swarm_coordination::{
    AgentId, AgentMetadata, CrdtValue, EventBusExt, EventFilter, MemoryProvider, SimulatedAgent,
    StateValue, StateVersion, SwarmConfig, SwarmError, SwarmEvent, SwarmResult, SyncConfig,
    VotePolicy,
};

fn agent(id: &str) -> SimulatedAgent {
    SimulatedAgent::new(id, VotePolicy::default())
}

fn register(value: &str, timestamp: u64, writer: &str) -> StateVersion {
    let register = LwwRegister::new(json!(value), timestamp, AgentId::new(writer));
    StateVersion::new(
        "cfg",
        StateValue::Crdt(CrdtValue::LwwRegister(register)),
        1,
        timestamp,
        writer,
    )
}

fn plain(key: &str, value: &str, version: u64, timestamp: u64, writer: &str) -> StateVersion {
    StateVersion::new(key, StateValue::plain(value), version, timestamp, writer)
}

/// Provider whose writes always fail
struct FailingProvider;

#[async_trait]
impl MemoryProvider for FailingProvider {
    async fn put(&self, _state_key: &str, _version: &StateVersion) -> SwarmResult<()> {
        Err(SwarmError::Persistence("disk full".to_string()))
    }

    async fn get(&self, _state_key: &str) -> SwarmResult<Option<StateVersion>> {
        Ok(None)
    }
}

/// Test: concurrent register writes at t=100 and t=105 resolve to the later one
#[tokio::test]
async fn test_lww_register_later_write_wins() {
    let mut swarm = Swarm::new(SwarmConfig::default());
    swarm.join(agent("a").with_state(register("v1", 100, "a")), "a", None).await;
    swarm.join(agent("b").with_state(register("v2", 105, "b")), "b", None).await;
    swarm.join(agent("c"), "c", None).await;

    let swarm_id = swarm.engine.swarm_id();
    let report = swarm
        .engine
        .synchronize_with_report(swarm_id, "cfg")
        .await
        .unwrap();

    assert_eq!(report.resolved.value.observed(), json!("v2"));
    assert!(report.divergent);
    assert_eq!(report.resolved.version, 2);
    assert_eq!(report.responders, 3);
    assert_eq!(report.required, 2);
    assert!(report.persisted);

    let stored = swarm
        .engine
        .synchronizer()
        .provider()
        .get("cfg")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored, report.resolved);

    for id in ["a", "b", "c"] {
        let replica = swarm.replica(id);
        let adopted = eventually(Duration::from_secs(1), || {
            replica
                .lock()
                .unwrap()
                .entries
                .get("cfg")
                .is_some_and(|v| v.version == 2 && v.value.observed() == json!("v2"))
        })
        .await;
        assert!(adopted, "{} never adopted the resolved value", id);
    }
}

/// Test: agreeing copies keep their version
#[tokio::test]
async fn test_agreeing_copies_are_not_bumped() {
    let mut swarm = Swarm::new(SwarmConfig::default());
    swarm.join(agent("a").with_state(plain("cfg", "v1", 3, 100, "a")), "a", None).await;
    swarm.join(agent("b").with_state(plain("cfg", "v1", 3, 100, "a")), "b", None).await;

    let report = swarm
        .engine
        .synchronize_with_report(swarm.engine.swarm_id(), "cfg")
        .await
        .unwrap();
    assert!(!report.divergent);
    assert_eq!(report.version_gap, 0);
    assert_eq!(report.resolved.version, 3);
}

/// Test: a lagging agent is reported as a version gap and catches up
#[tokio::test]
async fn test_version_gap_detected() {
    let mut swarm = Swarm::new(SwarmConfig::default());
    swarm.join(agent("a").with_state(plain("cfg", "old", 1, 100, "a")), "a", None).await;
    swarm.join(agent("b").with_state(plain("cfg", "new", 4, 200, "b")), "b", None).await;

    let report = swarm
        .engine
        .synchronize_with_report(swarm.engine.swarm_id(), "cfg")
        .await
        .unwrap();
    assert!(report.divergent);
    assert_eq!(report.version_gap, 3);
    assert_eq!(report.resolved.value.observed(), json!("new"));
    assert_eq!(report.resolved.version, 5);

    let replica = swarm.replica("a");
    assert!(
        eventually(Duration::from_secs(1), || {
            replica.lock().unwrap().entries["cfg"].version == 5
        })
        .await
    );
}

/// Test: a failing provider is reported, not fatal
#[tokio::test]
async fn test_persist_failure_is_reported() {
    let mut swarm = Swarm::with_provider(SwarmConfig::default(), Arc::new(FailingProvider));
    swarm.join(agent("a").with_state(plain("cfg", "v1", 1, 100, "a")), "a", None).await;
    let mut events = swarm
        .engine
        .coordinator()
        .event_bus()
        .subscribe_filtered(EventFilter::new().types(vec!["persist_failed"]));

    let report = swarm
        .engine
        .synchronize_with_report(swarm.engine.swarm_id(), "cfg")
        .await
        .unwrap();
    assert!(!report.persisted);
    assert!(report.persist_error.unwrap().contains("disk full"));
    assert_eq!(report.resolved.value.observed(), json!("v1"));

    match events.recv().await.unwrap() {
        SwarmEvent::PersistFailed { state_key, .. } => assert_eq!(state_key, "cfg"),
        other => panic!("unexpected event {:?}", other),
    }
}

/// Test: agents that never answer give SyncTimeout after the window
#[tokio::test(start_paused = true)]
async fn test_missing_quorum_times_out() {
    let config = SwarmConfig {
        sync: SyncConfig {
            window_ms: 100,
            ..SyncConfig::default()
        },
        ..SwarmConfig::default()
    };
    let mut swarm = Swarm::new(config);
    swarm.join(agent("a").with_state(plain("cfg", "v1", 1, 100, "a")), "a", None).await;
    for id in ["mute-1", "mute-2", "mute-3"] {
        // Registered without a worker: nobody drains the inbox
        swarm
            .engine
            .coordinator()
            .register_agent(id, AgentMetadata::new("test"))
            .await;
    }

    let err = swarm
        .engine
        .synchronize_swarm_state(swarm.engine.swarm_id(), "cfg")
        .await
        .unwrap_err();
    match err {
        SwarmError::SyncTimeout {
            responded,
            required,
            ..
        } => {
            assert_eq!(responded, 1);
            assert_eq!(required, 2);
        }
        other => panic!("unexpected error {:?}", other),
    }
}

/// Test: a key nobody holds is reported as missing
#[tokio::test]
async fn test_unknown_key_not_found() {
    let mut swarm = Swarm::new(SwarmConfig::default());
    swarm.join(agent("a"), "a", None).await;
    let err = swarm
        .engine
        .synchronize_swarm_state(swarm.engine.swarm_id(), "nope")
        .await
        .unwrap_err();
    assert!(matches!(err, SwarmError::StateNotFound(key) if key == "nope"));
}

/// Test: delta sync returns only keys changed after the given version
#[tokio::test]
async fn test_delta_sync_returns_newer_versions() {
    let mut swarm = Swarm::new(SwarmConfig::default());
    swarm
        .join(
            agent("a")
                .with_state(plain("stale", "x", 1, 100, "a"))
                .with_state(plain("fresh", "y", 5, 200, "a")),
            "a",
            None,
        )
        .await;
    swarm
        .join(agent("b").with_state(plain("fresh", "z", 6, 300, "b")), "b", None)
        .await;

    let changes = swarm
        .engine
        .delta_sync(swarm.engine.swarm_id(), 2)
        .await
        .unwrap();
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].state_key, "fresh");
    assert_eq!(changes[0].value.observed(), json!("z"));

    assert!(swarm
        .engine
        .delta_sync(swarm.engine.swarm_id(), 6)
        .await
        .unwrap()
        .is_empty());
}

/// Test: several keys synchronize concurrently
#[tokio::test]
async fn test_synchronize_all_keys() {
    let mut swarm = Swarm::new(SwarmConfig::default());
    swarm
        .join(
            agent("a")
                .with_state(plain("one", "1", 1, 100, "a"))
                .with_state(plain("two", "2", 1, 100, "a")),
            "a",
            None,
        )
        .await;

    let keys = vec!["one".to_string(), "two".to_string(), "three".to_string()];
    let results = swarm
        .engine
        .synchronizer()
        .synchronize_all(swarm.engine.swarm_id(), &keys)
        .await;
    assert_eq!(results.len(), 3);
    assert!(results[0].1.is_ok());
    assert!(results[1].1.is_ok());
    assert!(matches!(results[2].1, Err(SwarmError::StateNotFound(_))));
    assert!(swarm.engine.synchronizer().resolved("one").await.is_some());
}
