//! Netaware Telemetry - per-node resource and network readings
//!
//! This crate provides:
//! - A tokenizer for the node exporter exposition format
//! - A reader for network benchmark result files
//! - Telemetry target resolution from node labels, annotations and addresses
//! - Bounded, deadline-aware collection of per-node snapshots

// Allow unused assignments for diagnostic fields - they're used by the thiserror/miette macros
#![allow(unused_assignments)]

pub mod benchmark;
pub mod collector;
pub mod error;
pub mod exposition;
pub mod mock;
pub mod snapshot;
pub mod source;
pub mod target;

// Re-export commonly used types
pub use collector::{Collection, CollectorConfig, TelemetryCollector};
pub use error::{Result, TelemetryError};
pub use exposition::{Exposition, Sample};
pub use mock::{MockReading, MockTelemetrySource};
pub use snapshot::NodeMetricsSnapshot;
pub use source::{HttpTelemetrySource, TelemetrySource};
pub use target::{NodeClass, TargetConfig, TelemetryTarget};
