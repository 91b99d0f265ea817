use crate::types::PendingPod;
use crate::{Result, SchedulerError};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Binding, Event, ObjectReference, Pod};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::PostParams;
use kube::{Api, Client};
use tracing::debug;

/// Writes that commit a placement decision to the cluster
#[async_trait]
pub trait ClusterClient: Send + Sync {
    /// Bind a pod to a node
    async fn bind_pod(&self, pod: &PendingPod, node_name: &str) -> Result<()>;

    /// Record an event in the pod's namespace
    async fn create_event(&self, pod: &PendingPod, event: &Event) -> Result<()>;
}

/// Cluster client backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

/// Binding of a pod to a node, as posted to the pod's `binding` subresource
pub fn binding_for(pod: &PendingPod, node_name: &str) -> Binding {
    Binding {
        metadata: ObjectMeta {
            name: Some(pod.name.clone()),
            namespace: Some(pod.namespace.clone()),
            uid: Some(pod.uid.clone()),
            ..Default::default()
        },
        target: ObjectReference {
            api_version: Some("v1".to_string()),
            kind: Some("Node".to_string()),
            name: Some(node_name.to_string()),
            ..Default::default()
        },
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    async fn bind_pod(&self, pod: &PendingPod, node_name: &str) -> Result<()> {
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), &pod.namespace);
        let body = serde_json::to_vec(&binding_for(pod, node_name))
            .map_err(|e| SchedulerError::bind_failed(pod.key(), node_name, e.to_string()))?;

        debug!("Posting binding of pod {} to node {}", pod.key(), node_name);

        pods.create_subresource::<serde_json::Value>(
            "binding",
            &pod.name,
            &PostParams::default(),
            body,
        )
        .await
        .map_err(|e| SchedulerError::bind_failed(pod.key(), node_name, e.to_string()))?;

        Ok(())
    }

    async fn create_event(&self, pod: &PendingPod, event: &Event) -> Result<()> {
        let events: Api<Event> = Api::namespaced(self.client.clone(), &pod.namespace);

        events
            .create(&PostParams::default(), event)
            .await
            .map_err(|e| SchedulerError::event_failed(pod.key(), e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binding_targets_node() {
        let pod = PendingPod {
            namespace: "default".to_string(),
            name: "nginx".to_string(),
            uid: "uid-1".to_string(),
        };

        let binding = binding_for(&pod, "raspiworker0");

        assert_eq!(binding.metadata.name.as_deref(), Some("nginx"));
        assert_eq!(binding.metadata.namespace.as_deref(), Some("default"));
        assert_eq!(binding.target.kind.as_deref(), Some("Node"));
        assert_eq!(binding.target.api_version.as_deref(), Some("v1"));
        assert_eq!(binding.target.name.as_deref(), Some("raspiworker0"));

        let json = serde_json::to_value(&binding).unwrap();
        assert_eq!(json["kind"], "Binding");
        assert_eq!(json["target"]["name"], "raspiworker0");
    }
}
