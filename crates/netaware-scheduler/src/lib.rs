//! Netaware Scheduler - network-aware pod placement
//!
//! This crate provides:
//! - Pod admission from cluster watch events into a bounded queue
//! - A node registry kept current by a node watch
//! - Weighted multi-criteria node scoring
//! - Binding pods to nodes and recording scheduling events

// Allow unused assignments for diagnostic fields - they're used by the thiserror/miette macros
#![allow(unused_assignments)]

pub mod admission;
pub mod cluster;
pub mod commit;
pub mod error;
pub mod filter;
pub mod mock;
pub mod queue;
pub mod registry;
pub mod scheduler;
pub mod score;
pub mod types;

// Re-export commonly used types
pub use admission::{run_pod_watch, PodAdmission};
pub use cluster::{ClusterClient, KubeClusterClient};
pub use commit::PlacementCommitter;
pub use error::{Result, SchedulerError};
pub use mock::MockClusterClient;
pub use queue::{pod_queue, PodQueueReceiver, PodQueueSender, DEFAULT_QUEUE_CAPACITY};
pub use registry::{run_node_watch, NodeRegistry};
pub use scheduler::{Scheduler, SchedulerConfig, SCHEDULER_NAME};
pub use score::{PriorityScorer, ScoreOutcome};
pub use types::{BindingRecord, PendingPod, PodPhase};
