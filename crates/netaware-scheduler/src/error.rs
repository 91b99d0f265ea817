// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Scheduler error type
#[derive(Error, Debug, Diagnostic)]
pub enum SchedulerError {
    /// Watch payload that cannot be turned into a pending pod
    #[error("Malformed pod event: {reason}")]
    #[diagnostic(
        code(scheduler::malformed_event),
        help("The event is dropped; the pod will be considered again on its next update")
    )]
    MalformedEvent {
        reason: String,
    },

    /// No node produced usable telemetry
    #[error("No eligible node found for pod {pod_name}: {reason}")]
    #[diagnostic(
        code(scheduler::no_eligible_node),
        help("Check that node exporters are reachable and benchmark results exist for the nodes")
    )]
    NoEligibleNode {
        pod_name: String,
        reason: String,
    },

    /// The cluster rejected the binding
    #[error("Failed to bind pod {pod_name} to node {node_name}: {message}")]
    #[diagnostic(
        code(scheduler::bind_failed),
        help("The pod stays unscheduled; it may already be bound or may have been deleted")
    )]
    BindFailed {
        pod_name: String,
        node_name: String,
        message: String,
    },

    /// The cluster rejected an event
    #[error("Failed to create event for pod {pod_name}: {message}")]
    #[diagnostic(
        code(scheduler::event_failed),
        help("Check that the scheduler's service account may create events")
    )]
    EventFailed {
        pod_name: String,
        message: String,
    },

    /// The scheduling loop has gone away
    #[error("Pod queue is closed")]
    #[diagnostic(
        code(scheduler::queue_closed),
        help("The scheduling loop has stopped; this is expected during shutdown")
    )]
    QueueClosed,
}

/// Result type for scheduler operations
pub type Result<T> = std::result::Result<T, SchedulerError>;

impl SchedulerError {
    /// Create a MalformedEvent error
    pub fn malformed_event(reason: impl Into<String>) -> Self {
        Self::MalformedEvent {
            reason: reason.into(),
        }
    }

    /// Create a NoEligibleNode error
    pub fn no_eligible_node(pod_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NoEligibleNode {
            pod_name: pod_name.into(),
            reason: reason.into(),
        }
    }

    /// Create a BindFailed error
    pub fn bind_failed(
        pod_name: impl Into<String>,
        node_name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::BindFailed {
            pod_name: pod_name.into(),
            node_name: node_name.into(),
            message: message.into(),
        }
    }

    /// Create an EventFailed error
    pub fn event_failed(pod_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::EventFailed {
            pod_name: pod_name.into(),
            message: message.into(),
        }
    }

    /// Reason string used on the `FailedScheduling` event
    pub fn event_reason(&self) -> &'static str {
        match self {
            Self::NoEligibleNode { .. } => "NoEligibleNode",
            Self::BindFailed { .. } => "BindFailed",
            Self::EventFailed { .. } => "EventFailed",
            Self::MalformedEvent { .. } => "MalformedEvent",
            Self::QueueClosed => "QueueClosed",
        }
    }
}
