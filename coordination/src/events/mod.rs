//! Event-driven observability for the swarm
//!
//! # Architecture
//!
//! 1. **Event Types** (`types.rs`): the `SwarmEvent` enum covering agent
//!    lifecycle, message delivery, topology switches, consensus runs, and
//!    state synchronization, plus the flat `MetricRecord` view.
//!
//! 2. **Event Bus** (`bus.rs`): Tokio broadcast-based pub/sub with
//!    filtered subscriptions.
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ Coordinator  │────▶│  Event Bus   │────▶│  Subscribers │
//! │  Consensus   │     │  (broadcast) │     │   (metrics)  │
//! │  Sync        │     └──────────────┘     └──────────────┘
//! └──────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use swarm_coordination::events::{EventBus, EventBusExt, EventFilter};
//!
//! let bus = EventBus::new().shared();
//! let mut elections = bus.subscribe_filtered(EventFilter::new().types(vec!["leader_elected"]));
//! let event = elections.recv().await?;
//! println!("{}", serde_json::to_string(&event.metric_record())?);
//! ```

pub mod bus;
pub mod types;

// Re-export core types
pub use bus::{EventBus, EventBusExt, EventFilter, FilteredReceiver, SharedEventBus};
pub use types::{MetricRecord, SwarmEvent};
