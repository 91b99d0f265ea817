use crate::types::AdmissionResult;
use k8s_openapi::api::core::v1::Pod;

/// Predicate deciding whether a pod event belongs to this scheduler
pub trait AdmissionPredicate: Send + Sync {
    /// Evaluate the predicate for a pod
    fn admit(&self, pod: &Pod) -> AdmissionResult;

    /// Name of the predicate
    fn name(&self) -> &str;
}

/// Pod has no node assignment yet
pub struct Unassigned;

impl AdmissionPredicate for Unassigned {
    fn admit(&self, pod: &Pod) -> AdmissionResult {
        match pod
            .spec
            .as_ref()
            .and_then(|s| s.node_name.as_deref())
            .filter(|n| !n.is_empty())
        {
            Some(node) => AdmissionResult::reject(format!("already assigned to node {}", node)),
            None => AdmissionResult::admit(),
        }
    }

    fn name(&self) -> &str {
        "Unassigned"
    }
}

/// Pod declares this scheduler as its scheduler
pub struct SchedulerNameMatch {
    scheduler_name: String,
}

impl SchedulerNameMatch {
    pub fn new(scheduler_name: impl Into<String>) -> Self {
        Self {
            scheduler_name: scheduler_name.into(),
        }
    }
}

impl AdmissionPredicate for SchedulerNameMatch {
    fn admit(&self, pod: &Pod) -> AdmissionResult {
        let declared = pod
            .spec
            .as_ref()
            .and_then(|s| s.scheduler_name.as_deref())
            .unwrap_or("default-scheduler");

        if declared == self.scheduler_name {
            AdmissionResult::admit()
        } else {
            AdmissionResult::reject(format!("owned by scheduler {}", declared))
        }
    }

    fn name(&self) -> &str {
        "SchedulerNameMatch"
    }
}

/// Pod is not being deleted
pub struct NotTerminating;

impl AdmissionPredicate for NotTerminating {
    fn admit(&self, pod: &Pod) -> AdmissionResult {
        if pod.metadata.deletion_timestamp.is_some() {
            AdmissionResult::reject("pod is terminating")
        } else {
            AdmissionResult::admit()
        }
    }

    fn name(&self) -> &str {
        "NotTerminating"
    }
}

/// Get default admission predicates
pub fn default_predicates(scheduler_name: &str) -> Vec<Box<dyn AdmissionPredicate>> {
    vec![
        Box::new(Unassigned),
        Box::new(SchedulerNameMatch::new(scheduler_name)),
        Box::new(NotTerminating),
    ]
}
