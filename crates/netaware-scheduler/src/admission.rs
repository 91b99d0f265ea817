use crate::filter::{default_predicates, AdmissionPredicate};
use crate::queue::PodQueueSender;
use crate::types::PendingPod;
use crate::{Result, SchedulerError};
use futures_util::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Turns pod watch events into queued pending pods
pub struct PodAdmission {
    predicates: Vec<Box<dyn AdmissionPredicate>>,
    queue: PodQueueSender,
}

impl PodAdmission {
    /// Admission with the default predicates for `scheduler_name`
    pub fn new(scheduler_name: &str, queue: PodQueueSender) -> Self {
        Self::with_predicates(default_predicates(scheduler_name), queue)
    }

    pub fn with_predicates(
        predicates: Vec<Box<dyn AdmissionPredicate>>,
        queue: PodQueueSender,
    ) -> Self {
        Self { predicates, queue }
    }

    /// Evaluate one observed pod and enqueue it if every predicate admits it.
    ///
    /// Returns whether the pod was enqueued. Waits while the queue is full.
    pub async fn handle(&self, pod: &Pod) -> Result<bool> {
        for predicate in &self.predicates {
            let result = predicate.admit(pod);
            if !result.admitted {
                debug!(
                    "Pod {} not admitted by {}: {}",
                    pod.metadata.name.as_deref().unwrap_or("unknown"),
                    predicate.name(),
                    result.reason.as_deref().unwrap_or("rejected")
                );
                return Ok(false);
            }
        }

        let pending = PendingPod::from_pod(pod)?;
        let key = pending.key();
        let enqueued = self.queue.enqueue(pending).await?;

        if enqueued {
            info!("Pod {} queued for scheduling", key);
        } else {
            debug!("Pod {} is already queued", key);
        }

        Ok(enqueued)
    }
}

/// Watch unassigned pods and feed admitted ones into the queue until
/// cancelled or the queue closes
pub async fn run_pod_watch(client: Client, admission: PodAdmission, token: CancellationToken) {
    let pods: Api<Pod> = Api::all(client);
    let config = watcher::Config::default().fields("spec.nodeName=");
    let stream = watcher(pods, config).default_backoff().applied_objects();
    futures_util::pin_mut!(stream);

    info!("Pod watch started");

    loop {
        let pod = tokio::select! {
            _ = token.cancelled() => {
                info!("Pod watch shutting down");
                return;
            }
            item = stream.next() => match item {
                Some(Ok(pod)) => pod,
                Some(Err(e)) => {
                    warn!("Pod watch error: {}", e);
                    continue;
                }
                None => {
                    warn!("Pod watch stream ended");
                    return;
                }
            }
        };

        // Blocking on a full queue must not outlive shutdown
        let handled = tokio::select! {
            _ = token.cancelled() => {
                info!("Pod watch shutting down");
                return;
            }
            handled = admission.handle(&pod) => handled,
        };

        match handled {
            Ok(_) => {}
            Err(SchedulerError::QueueClosed) => {
                info!("Pod queue closed, stopping pod watch");
                return;
            }
            Err(e) => warn!("Dropping pod event: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::pod_queue;

    fn create_test_pod(name: &str, scheduler_name: &str) -> Pod {
        let mut pod = Pod::default();
        pod.metadata.name = Some(name.to_string());
        pod.metadata.namespace = Some("default".to_string());
        pod.metadata.uid = Some(format!("uid-{}", name));
        pod.spec = Some(Default::default());
        pod.spec.as_mut().unwrap().scheduler_name = Some(scheduler_name.to_string());
        pod
    }

    #[tokio::test]
    async fn test_admits_own_pods() {
        let (tx, mut rx) = pod_queue(10);
        let admission = PodAdmission::new("netAwareScheduler", tx);

        let enqueued = admission
            .handle(&create_test_pod("nginx", "netAwareScheduler"))
            .await
            .unwrap();

        assert!(enqueued);
        let pending = rx.next().await.unwrap();
        assert_eq!(pending.key(), "default/nginx");
        assert_eq!(pending.uid, "uid-nginx");
    }

    #[tokio::test]
    async fn test_ignores_foreign_and_assigned_pods() {
        let (tx, rx) = pod_queue(10);
        let admission = PodAdmission::new("netAwareScheduler", tx);

        let foreign = create_test_pod("foreign", "default-scheduler");
        assert!(!admission.handle(&foreign).await.unwrap());

        let mut assigned = create_test_pod("assigned", "netAwareScheduler");
        assigned.spec.as_mut().unwrap().node_name = Some("raspiworker0".to_string());
        assert!(!admission.handle(&assigned).await.unwrap());

        assert!(rx.is_empty());
    }

    #[tokio::test]
    async fn test_repeated_events_enqueue_once() {
        let (tx, rx) = pod_queue(10);
        let admission = PodAdmission::new("netAwareScheduler", tx);
        let pod = create_test_pod("nginx", "netAwareScheduler");

        assert!(admission.handle(&pod).await.unwrap());
        assert!(!admission.handle(&pod).await.unwrap());
        assert_eq!(rx.len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_pod_is_an_error() {
        let (tx, rx) = pod_queue(10);
        let admission = PodAdmission::new("netAwareScheduler", tx);

        let mut pod = create_test_pod("nginx", "netAwareScheduler");
        pod.metadata.uid = None;

        let err = admission.handle(&pod).await.unwrap_err();
        assert!(matches!(err, SchedulerError::MalformedEvent { .. }));
        assert!(rx.is_empty());
    }

    #[tokio::test]
    async fn test_closed_queue_is_reported() {
        let (tx, rx) = pod_queue(10);
        drop(rx);
        let admission = PodAdmission::new("netAwareScheduler", tx);

        let err = admission
            .handle(&create_test_pod("nginx", "netAwareScheduler"))
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::QueueClosed));
    }
}
