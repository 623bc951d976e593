//! Integration tests for topology switching through the coordinator

use serde_json::json;
use swarm_coordination::topology::{rebuild, EdgeGraph, WorkloadType, DEFAULT_BRANCHING};
use swarm_coordination::{
    AgentId, AgentMetadata, EventBus, EventBusExt, EventFilter, SwarmConfig, SwarmCoordinator,
    SwarmError, SwarmEvent, SwarmMessage, TopologyKind,
};

async fn coordinator(kind: TopologyKind, agents: usize) -> SwarmCoordinator {
    let config = SwarmConfig {
        topology: kind,
        ..SwarmConfig::default()
    };
    let coordinator = SwarmCoordinator::new(config, EventBus::new().shared()).unwrap();
    for i in 0..agents {
        coordinator
            .register_agent(format!("agent-{}", i), AgentMetadata::new("worker"))
            .await;
    }
    coordinator
}

/// Test: switching 11 agents from Mesh to Hierarchical keeps them all connected
#[tokio::test]
async fn test_mesh_to_hierarchical_with_eleven_agents() {
    let coordinator = coordinator(TopologyKind::Mesh, 11).await;
    let before = coordinator.get_topology_info().await;
    assert_eq!(before.connection_count, 55);

    let mut switched = coordinator
        .event_bus()
        .subscribe_filtered(EventFilter::new().types(vec!["topology_switched"]));
    coordinator
        .switch_topology(TopologyKind::Hierarchical)
        .await
        .unwrap();

    let info = coordinator.get_topology_info().await;
    assert_eq!(info.kind, TopologyKind::Hierarchical);
    assert_eq!(info.agent_count, 11);
    assert_eq!(info.connection_count, 10);
    assert!(info.connected);
    assert_eq!(coordinator.agent_ids().await.len(), 11);

    match switched.recv().await.unwrap() {
        SwarmEvent::TopologySwitched { from, to, agent_count, .. } => {
            assert_eq!(from, TopologyKind::Mesh);
            assert_eq!(to, TopologyKind::Hierarchical);
            assert_eq!(agent_count, 11);
        }
        other => panic!("unexpected event {:?}", other),
    }
}

/// Test: messages still arrive after a switch, over the new route
#[tokio::test]
async fn test_delivery_after_switch_to_ring() {
    let coordinator = coordinator(TopologyKind::Mesh, 6).await;
    coordinator.switch_topology(TopologyKind::Ring).await.unwrap();

    let from = AgentId::new("agent-0");
    let to = AgentId::new("agent-3");
    let route = coordinator.route(&from, &to).await;
    assert_eq!(route.len(), 4);

    let mut inbox = coordinator.take_inbox(&to).await.unwrap();
    coordinator
        .send_message(&from, &to, SwarmMessage::Direct(json!("ping")))
        .await
        .unwrap();
    let envelope = inbox.recv().await.unwrap();
    assert_eq!(envelope.path, route);
    assert_eq!(envelope.from, Some(from));
}

/// Test: adaptive evaluation follows agent count and workload
#[tokio::test]
async fn test_adaptive_follows_metrics() {
    let coordinator = coordinator(TopologyKind::Adaptive, 4).await;
    assert_eq!(
        coordinator.get_topology_info().await.active_kind,
        TopologyKind::Star
    );

    coordinator.set_workload(WorkloadType::Pipeline).await;
    assert_eq!(
        coordinator.evaluate_topology().await.unwrap(),
        Some(TopologyKind::Ring)
    );
    assert_eq!(coordinator.evaluate_topology().await.unwrap(), None);

    for i in 4..11 {
        coordinator
            .register_agent(format!("agent-{}", i), AgentMetadata::new("worker"))
            .await;
    }
    assert_eq!(
        coordinator.evaluate_topology().await.unwrap(),
        Some(TopologyKind::Hierarchical)
    );
    let info = coordinator.get_topology_info().await;
    assert_eq!(info.kind, TopologyKind::Adaptive);
    assert_eq!(info.active_kind, TopologyKind::Hierarchical);
    assert!(info.connected);
}

/// Test: unknown sender is a caller error
#[tokio::test]
async fn test_send_from_unknown_agent() {
    let coordinator = coordinator(TopologyKind::Star, 3).await;
    let err = coordinator
        .send_message(
            &AgentId::new("ghost"),
            &AgentId::new("agent-0"),
            SwarmMessage::Direct(json!(null)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, SwarmError::UnknownAgent(_)));
}

/// Test: every strategy routes along a fewest-hop path of its own edge set
#[test]
fn test_routes_are_shortest_paths_over_edges() {
    let ids: Vec<AgentId> = (0..9).map(|i| AgentId::new(format!("agent-{}", i))).collect();
    for kind in [
        TopologyKind::Mesh,
        TopologyKind::Star,
        TopologyKind::Hierarchical,
        TopologyKind::Ring,
        TopologyKind::Adaptive,
    ] {
        let topology = rebuild(kind, DEFAULT_BRANCHING, &ids).unwrap();
        let graph = EdgeGraph::build(&topology.agents(), &topology.edges());
        for from in &ids {
            for to in &ids {
                let route = topology.route(from, to);
                let shortest = graph.shortest_path(from, to);
                assert_eq!(route.first(), Some(from), "{kind}");
                assert_eq!(route.last(), Some(to), "{kind}");
                assert_eq!(route.len(), shortest.len(), "{kind}: {from} -> {to}");
            }
        }
    }
}
