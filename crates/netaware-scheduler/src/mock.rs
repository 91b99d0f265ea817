use crate::cluster::ClusterClient;
use crate::types::PendingPod;
use crate::{Result, SchedulerError};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Event;
use std::collections::HashSet;
use tokio::sync::RwLock;
use tracing::debug;

/// A binding accepted by the mock cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockBinding {
    pub pod: PendingPod,
    pub node_name: String,
}

/// In-memory cluster for testing the commit path without an API server.
///
/// Like the real API server it refuses to bind a pod twice.
#[derive(Default)]
pub struct MockClusterClient {
    bindings: RwLock<Vec<MockBinding>>,
    bound_uids: RwLock<HashSet<String>>,
    events: RwLock<Vec<Event>>,
    fail_binds: RwLock<Option<String>>,
    fail_events: RwLock<Option<String>>,
}

impl MockClusterClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every following bind with `message`
    pub async fn fail_binds(&self, message: impl Into<String>) {
        *self.fail_binds.write().await = Some(message.into());
    }

    /// Reject every following event with `message`
    pub async fn fail_events(&self, message: impl Into<String>) {
        *self.fail_events.write().await = Some(message.into());
    }

    pub async fn bindings(&self) -> Vec<MockBinding> {
        self.bindings.read().await.clone()
    }

    pub async fn events(&self) -> Vec<Event> {
        self.events.read().await.clone()
    }
}

#[async_trait]
impl ClusterClient for MockClusterClient {
    async fn bind_pod(&self, pod: &PendingPod, node_name: &str) -> Result<()> {
        if let Some(message) = self.fail_binds.read().await.clone() {
            return Err(SchedulerError::bind_failed(pod.key(), node_name, message));
        }

        if !self.bound_uids.write().await.insert(pod.uid.clone()) {
            return Err(SchedulerError::bind_failed(
                pod.key(),
                node_name,
                "pod is already assigned to a node",
            ));
        }

        debug!("Mock: bound pod {} to {}", pod.key(), node_name);
        self.bindings.write().await.push(MockBinding {
            pod: pod.clone(),
            node_name: node_name.to_string(),
        });
        Ok(())
    }

    async fn create_event(&self, pod: &PendingPod, event: &Event) -> Result<()> {
        if let Some(message) = self.fail_events.read().await.clone() {
            return Err(SchedulerError::event_failed(pod.key(), message));
        }

        debug!(
            "Mock: event {} for pod {}",
            event.reason.as_deref().unwrap_or(""),
            pod.key()
        );
        self.events.write().await.push(event.clone());
        Ok(())
    }
}
