use crate::types::PendingPod;
use crate::{Result, SchedulerError};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Default capacity of the pod queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 300;

/// Create a bounded FIFO of pending pods shared between any number of
/// producers and the single scheduling loop.
///
/// The queue remembers which pod UIDs it holds until the consumer releases
/// them, so repeated watch events for the same pod enqueue it only once.
pub fn pod_queue(capacity: usize) -> (PodQueueSender, PodQueueReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let queued = Arc::new(Mutex::new(HashSet::new()));

    (
        PodQueueSender {
            tx,
            queued: queued.clone(),
        },
        PodQueueReceiver { rx, queued },
    )
}

/// Producer half of the pod queue
#[derive(Clone)]
pub struct PodQueueSender {
    tx: mpsc::Sender<PendingPod>,
    queued: Arc<Mutex<HashSet<String>>>,
}

impl PodQueueSender {
    /// Enqueue a pod, waiting while the queue is full.
    ///
    /// Returns `Ok(false)` if the pod is already queued or being decided.
    pub async fn enqueue(&self, pod: PendingPod) -> Result<bool> {
        if !self.queued.lock().await.insert(pod.uid.clone()) {
            return Ok(false);
        }

        if let Err(mpsc::error::SendError(pod)) = self.tx.send(pod).await {
            self.queued.lock().await.remove(&pod.uid);
            return Err(SchedulerError::QueueClosed);
        }

        Ok(true)
    }
}

/// Consumer half of the pod queue
pub struct PodQueueReceiver {
    rx: mpsc::Receiver<PendingPod>,
    queued: Arc<Mutex<HashSet<String>>>,
}

impl PodQueueReceiver {
    /// Next pod in arrival order, or `None` once every sender is gone
    pub async fn next(&mut self) -> Option<PendingPod> {
        self.rx.recv().await
    }

    /// Forget a pod once its decision is finished so a later event can
    /// admit it again
    pub async fn release(&self, uid: &str) {
        self.queued.lock().await.remove(uid);
    }

    /// Number of pods waiting in the queue
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
