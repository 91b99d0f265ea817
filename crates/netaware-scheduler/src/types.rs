use crate::{Result, SchedulerError};
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Pod;
use std::fmt;

/// A pod waiting for a placement decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPod {
    pub namespace: String,
    pub name: String,
    pub uid: String,
}

impl PendingPod {
    /// Extract the pod identity, rejecting payloads that lack one
    pub fn from_pod(pod: &Pod) -> Result<Self> {
        let name = pod
            .metadata
            .name
            .clone()
            .ok_or_else(|| SchedulerError::malformed_event("pod has no name"))?;
        let namespace = pod.metadata.namespace.clone().ok_or_else(|| {
            SchedulerError::malformed_event(format!("pod {} has no namespace", name))
        })?;
        let uid = pod.metadata.uid.clone().ok_or_else(|| {
            SchedulerError::malformed_event(format!("pod {}/{} has no uid", namespace, name))
        })?;

        Ok(Self {
            namespace,
            name,
            uid,
        })
    }

    /// `namespace/name`
    pub fn key(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

/// Placement state of a pod as seen by the scheduling loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodPhase {
    Pending,
    Binding,
    Bound,
    Failed,
}

impl fmt::Display for PodPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PodPhase::Pending => write!(f, "Pending"),
            PodPhase::Binding => write!(f, "Binding"),
            PodPhase::Bound => write!(f, "Bound"),
            PodPhase::Failed => write!(f, "Failed"),
        }
    }
}

/// A committed placement decision
#[derive(Debug, Clone)]
pub struct BindingRecord {
    pub pod: PendingPod,
    pub node_name: String,
    /// Human-readable message attached to the `Scheduled` event
    pub message: String,
    pub timestamp: DateTime<Utc>,
    /// Whether the `Scheduled` event was accepted by the cluster
    pub event_recorded: bool,
}

/// Result of evaluating an admission predicate against a pod
#[derive(Debug, Clone)]
pub struct AdmissionResult {
    /// Whether the pod passed the predicate
    pub admitted: bool,
    /// Reason for rejection (if any)
    pub reason: Option<String>,
}

impl AdmissionResult {
    /// Create a passing admission result
    pub fn admit() -> Self {
        Self {
            admitted: true,
            reason: None,
        }
    }

    /// Create a rejecting admission result
    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            admitted: false,
            reason: Some(reason.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_pod(name: Option<&str>, namespace: Option<&str>, uid: Option<&str>) -> Pod {
        let mut pod = Pod::default();
        pod.metadata.name = name.map(str::to_string);
        pod.metadata.namespace = namespace.map(str::to_string);
        pod.metadata.uid = uid.map(str::to_string);
        pod
    }

    #[test]
    fn test_pending_pod_from_pod() {
        let pod = create_test_pod(Some("nginx"), Some("default"), Some("uid-1"));
        let pending = PendingPod::from_pod(&pod).unwrap();

        assert_eq!(pending.key(), "default/nginx");
        assert_eq!(pending.uid, "uid-1");
    }

    #[test]
    fn test_pending_pod_requires_identity() {
        for pod in [
            create_test_pod(None, Some("default"), Some("uid-1")),
            create_test_pod(Some("nginx"), None, Some("uid-1")),
            create_test_pod(Some("nginx"), Some("default"), None),
        ] {
            assert!(matches!(
                PendingPod::from_pod(&pod),
                Err(SchedulerError::MalformedEvent { .. })
            ));
        }
    }

    #[test]
    fn test_admission_result() {
        let pass = AdmissionResult::admit();
        assert!(pass.admitted);
        assert!(pass.reason.is_none());

        let fail = AdmissionResult::reject("already bound to node1");
        assert!(!fail.admitted);
        assert_eq!(fail.reason, Some("already bound to node1".to_string()));
    }
}
