use crate::cluster::ClusterClient;
use crate::types::{BindingRecord, PendingPod, PodPhase};
use crate::{Result, SchedulerError};
use chrono::Utc;
use k8s_openapi::api::core::v1::{Event, EventSource, ObjectReference};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use std::sync::Arc;
use tracing::{debug, info, warn};

fn involved_object(pod: &PendingPod) -> ObjectReference {
    ObjectReference {
        api_version: Some("v1".to_string()),
        kind: Some("Pod".to_string()),
        name: Some(pod.name.clone()),
        namespace: Some(pod.namespace.clone()),
        uid: Some(pod.uid.clone()),
        ..Default::default()
    }
}

fn pod_event(
    pod: &PendingPod,
    scheduler_name: &str,
    type_: &str,
    reason: &str,
    message: String,
) -> Event {
    let now = Time(Utc::now());

    Event {
        metadata: ObjectMeta {
            generate_name: Some(format!("{}-", pod.name)),
            namespace: Some(pod.namespace.clone()),
            ..Default::default()
        },
        involved_object: involved_object(pod),
        reason: Some(reason.to_string()),
        message: Some(message),
        type_: Some(type_.to_string()),
        count: Some(1),
        first_timestamp: Some(now.clone()),
        last_timestamp: Some(now),
        source: Some(EventSource {
            component: Some(scheduler_name.to_string()),
            ..Default::default()
        }),
        reporting_component: Some(scheduler_name.to_string()),
        ..Default::default()
    }
}

/// `Normal/Scheduled` event announcing a placement
pub fn scheduled_event(pod: &PendingPod, node_name: &str, scheduler_name: &str) -> Event {
    pod_event(
        pod,
        scheduler_name,
        "Normal",
        "Scheduled",
        format!("Successfully assigned {} to {}", pod.key(), node_name),
    )
}

/// `Warning/FailedScheduling` event explaining why a pod stays unscheduled
pub fn failed_scheduling_event(
    pod: &PendingPod,
    error: &SchedulerError,
    scheduler_name: &str,
) -> Event {
    pod_event(
        pod,
        scheduler_name,
        "Warning",
        "FailedScheduling",
        format!("{}: {}", error.event_reason(), error),
    )
}

/// Commits placement decisions: bind first, then announce
pub struct PlacementCommitter {
    client: Arc<dyn ClusterClient>,
    scheduler_name: String,
}

impl PlacementCommitter {
    pub fn new(client: Arc<dyn ClusterClient>, scheduler_name: impl Into<String>) -> Self {
        Self {
            client,
            scheduler_name: scheduler_name.into(),
        }
    }

    pub fn scheduler_name(&self) -> &str {
        &self.scheduler_name
    }

    /// Bind `pod` to `node_name` and record a `Scheduled` event.
    ///
    /// No event is written when the bind fails. An event failure after a
    /// successful bind does not undo the placement.
    pub async fn commit(&self, pod: &PendingPod, node_name: &str) -> Result<BindingRecord> {
        let key = pod.key();
        debug!("Pod {} phase {} -> {}", key, PodPhase::Pending, PodPhase::Binding);

        if let Err(e) = self.client.bind_pod(pod, node_name).await {
            debug!("Pod {} phase {} -> {}", key, PodPhase::Binding, PodPhase::Failed);
            return Err(e);
        }

        info!("Bound pod {} to node {}", key, node_name);
        debug!("Pod {} phase {} -> {}", key, PodPhase::Binding, PodPhase::Bound);

        let event = scheduled_event(pod, node_name, &self.scheduler_name);
        let message = event.message.clone().unwrap_or_default();
        let timestamp = event
            .first_timestamp
            .as_ref()
            .map(|t| t.0)
            .unwrap_or_else(Utc::now);
        let event_recorded = match self.client.create_event(pod, &event).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Pod {} is bound but its Scheduled event was not recorded: {}", key, e);
                false
            }
        };

        Ok(BindingRecord {
            pod: pod.clone(),
            node_name: node_name.to_string(),
            message,
            timestamp,
            event_recorded,
        })
    }

    /// Best-effort `FailedScheduling` event
    pub async fn report_failure(&self, pod: &PendingPod, error: &SchedulerError) {
        let event = failed_scheduling_event(pod, error, &self.scheduler_name);
        if let Err(e) = self.client.create_event(pod, &event).await {
            warn!("Failed to record FailedScheduling event for pod {}: {}", pod.key(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockClusterClient;

    fn pending(name: &str) -> PendingPod {
        PendingPod {
            namespace: "default".to_string(),
            name: name.to_string(),
            uid: format!("uid-{}", name),
        }
    }

    #[test]
    fn test_scheduled_event_shape() {
        let event = scheduled_event(&pending("nginx"), "raspiworker0", "netAwareScheduler");

        assert_eq!(event.reason.as_deref(), Some("Scheduled"));
        assert_eq!(event.type_.as_deref(), Some("Normal"));
        assert_eq!(event.count, Some(1));
        assert_eq!(
            event.message.as_deref(),
            Some("Successfully assigned default/nginx to raspiworker0")
        );
        assert_eq!(event.metadata.generate_name.as_deref(), Some("nginx-"));
        assert_eq!(event.metadata.namespace.as_deref(), Some("default"));
        assert_eq!(event.involved_object.kind.as_deref(), Some("Pod"));
        assert_eq!(event.involved_object.uid.as_deref(), Some("uid-nginx"));
        assert_eq!(
            event.source.as_ref().and_then(|s| s.component.as_deref()),
            Some("netAwareScheduler")
        );
        assert!(event.first_timestamp.is_some());
    }

    #[tokio::test]
    async fn test_commit_binds_then_announces() {
        let cluster = Arc::new(MockClusterClient::new());
        let committer = PlacementCommitter::new(cluster.clone(), "netAwareScheduler");

        let record = committer.commit(&pending("nginx"), "raspiworker0").await.unwrap();

        assert_eq!(record.node_name, "raspiworker0");
        assert!(record.event_recorded);
        assert_eq!(cluster.bindings().await.len(), 1);
        let events = cluster.events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].reason.as_deref(), Some("Scheduled"));
        assert_eq!(events[0].first_timestamp.as_ref().map(|t| t.0), Some(record.timestamp));
        assert_eq!(events[0].last_timestamp.as_ref().map(|t| t.0), Some(record.timestamp));
    }

    #[tokio::test]
    async fn test_failed_bind_writes_no_event() {
        let cluster = Arc::new(MockClusterClient::new());
        cluster.fail_binds("pods \"nginx\" not found").await;
        let committer = PlacementCommitter::new(cluster.clone(), "netAwareScheduler");

        let err = committer
            .commit(&pending("nginx"), "raspiworker0")
            .await
            .unwrap_err();

        assert!(matches!(err, SchedulerError::BindFailed { .. }));
        assert!(cluster.events().await.is_empty());
    }

    #[tokio::test]
    async fn test_event_failure_keeps_binding() {
        let cluster = Arc::new(MockClusterClient::new());
        cluster.fail_events("forbidden").await;
        let committer = PlacementCommitter::new(cluster.clone(), "netAwareScheduler");

        let record = committer.commit(&pending("nginx"), "raspiworker0").await.unwrap();

        assert!(!record.event_recorded);
        assert_eq!(cluster.bindings().await.len(), 1);
    }

    #[tokio::test]
    async fn test_second_bind_is_rejected() {
        let cluster = Arc::new(MockClusterClient::new());
        let committer = PlacementCommitter::new(cluster.clone(), "netAwareScheduler");

        committer.commit(&pending("nginx"), "node1").await.unwrap();
        let err = committer.commit(&pending("nginx"), "node2").await.unwrap_err();

        assert!(matches!(err, SchedulerError::BindFailed { .. }));
        let bindings = cluster.bindings().await;
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].node_name, "node1");
    }

    #[tokio::test]
    async fn test_report_failure() {
        let cluster = Arc::new(MockClusterClient::new());
        let committer = PlacementCommitter::new(cluster.clone(), "netAwareScheduler");
        let error = SchedulerError::no_eligible_node("default/nginx", "no node produced telemetry");

        committer.report_failure(&pending("nginx"), &error).await;

        let events = cluster.events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].reason.as_deref(), Some("FailedScheduling"));
        assert_eq!(events[0].type_.as_deref(), Some("Warning"));
        assert!(events[0]
            .message
            .as_deref()
            .unwrap()
            .starts_with("NoEligibleNode"));
    }
}
