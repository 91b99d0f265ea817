use crate::cluster::ClusterClient;
use crate::commit::PlacementCommitter;
use crate::queue::{PodQueueReceiver, DEFAULT_QUEUE_CAPACITY};
use crate::registry::NodeRegistry;
use crate::score::PriorityScorer;
use crate::types::{BindingRecord, PendingPod};
use crate::{Result, SchedulerError};
use k8s_openapi::api::core::v1::Node;
use netaware_telemetry::{
    Collection, CollectorConfig, TargetConfig, TelemetryCollector, TelemetryError,
    TelemetrySource, TelemetryTarget,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Name pods must declare in `spec.schedulerName` to be placed by this scheduler
pub const SCHEDULER_NAME: &str = "netAwareScheduler";

/// Configuration for the scheduler
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub scheduler_name: String,
    /// How telemetry endpoints are derived from nodes
    pub targets: TargetConfig,
    pub collector: CollectorConfig,
    /// Capacity of the pending pod queue
    pub queue_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            scheduler_name: SCHEDULER_NAME.to_string(),
            targets: TargetConfig::default(),
            collector: CollectorConfig::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Network-aware pod scheduler.
///
/// Takes pods off the queue one at a time, collects fresh telemetry for every
/// known node, scores the nodes and commits the winner.
pub struct Scheduler {
    config: SchedulerConfig,
    registry: NodeRegistry,
    collector: TelemetryCollector,
    scorer: PriorityScorer,
    committer: PlacementCommitter,
    queue: PodQueueReceiver,
}

impl Scheduler {
    /// Create a new scheduler
    pub fn new(
        config: SchedulerConfig,
        registry: NodeRegistry,
        telemetry: Arc<dyn TelemetrySource>,
        cluster: Arc<dyn ClusterClient>,
        queue: PodQueueReceiver,
    ) -> Self {
        Self {
            collector: TelemetryCollector::new(telemetry, config.collector.clone()),
            committer: PlacementCommitter::new(cluster, config.scheduler_name.clone()),
            scorer: PriorityScorer::default(),
            config,
            registry,
            queue,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Run the scheduling loop until cancelled or every producer is gone.
    ///
    /// A decision in progress is finished before cancellation is observed.
    pub async fn run(mut self, token: CancellationToken) {
        info!("Starting scheduler {}", self.config.scheduler_name);

        loop {
            let pod = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    info!("Scheduler shutting down");
                    break;
                }
                pod = self.queue.next() => match pod {
                    Some(pod) => pod,
                    None => {
                        info!("Pod queue closed, scheduler stopping");
                        break;
                    }
                }
            };

            self.process(pod).await;
        }
    }

    /// Decide one pod, report a failure and release it from the queue
    async fn process(&self, pod: PendingPod) {
        match self.schedule_pod(&pod).await {
            Ok(record) => {
                info!("Scheduled pod {} to node {}", record.pod.key(), record.node_name);
            }
            Err(e) => {
                error!("Failed to schedule pod {}: {}", pod.key(), e);
                self.committer.report_failure(&pod, &e).await;
            }
        }

        self.queue.release(&pod.uid).await;
    }

    /// Make and commit one placement decision
    pub async fn schedule_pod(&self, pod: &PendingPod) -> Result<BindingRecord> {
        let nodes = self.registry.snapshot();
        if nodes.is_empty() {
            return Err(SchedulerError::no_eligible_node(
                pod.key(),
                "no nodes are registered",
            ));
        }

        debug!("Scheduling pod {} across {} nodes", pod.key(), nodes.len());

        let (targets, excluded) = self.resolve_targets(&nodes);
        let mut collection = self.collector.collect(targets).await;
        for (node_name, e) in excluded {
            collection.exclude(node_name, e);
        }

        let outcome = self.scorer.score(&collection.snapshots).ok_or_else(|| {
            SchedulerError::no_eligible_node(pod.key(), describe_failures(&collection))
        })?;

        info!(
            "Selected node {} for pod {} with score {}/{}",
            outcome.winner,
            pod.key(),
            outcome.score,
            self.scorer.total_weight()
        );

        self.committer.commit(pod, &outcome.winner).await
    }

    /// Resolve a telemetry target per node; nodes without one are excluded
    fn resolve_targets(
        &self,
        nodes: &[Arc<Node>],
    ) -> (Vec<TelemetryTarget>, Vec<(String, TelemetryError)>) {
        let mut targets = Vec::with_capacity(nodes.len());
        let mut excluded = Vec::new();

        for node in nodes {
            match TelemetryTarget::from_node(node, &self.config.targets) {
                Ok(target) => targets.push(target),
                Err(e) => {
                    let node_name = node.metadata.name.clone().unwrap_or_default();
                    warn!("Excluding node {}: {}", node_name, e);
                    excluded.push((node_name, e));
                }
            }
        }

        (targets, excluded)
    }
}

fn describe_failures(collection: &Collection) -> String {
    if collection.failures.is_empty() {
        return "no node earned a score".to_string();
    }

    let nodes: Vec<&str> = collection.failures.keys().map(String::as_str).collect();
    format!("no usable telemetry from nodes {}", nodes.join(", "))
}
