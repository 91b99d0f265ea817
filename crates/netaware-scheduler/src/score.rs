use netaware_telemetry::NodeMetricsSnapshot;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Node name to accumulated score, iterated in node-name order
pub type PriorityTable = BTreeMap<String, u32>;

/// Which end of a criterion's range is preferred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    LowerIsBetter,
    HigherIsBetter,
}

impl Direction {
    fn improves(&self, candidate: f64, best: f64) -> bool {
        match self {
            Direction::LowerIsBetter => candidate < best,
            Direction::HigherIsBetter => candidate > best,
        }
    }
}

/// A single scoring criterion. The node with the best reading is awarded the
/// criterion's full weight; no other node receives anything for it.
pub trait Criterion: Send + Sync {
    /// Name of the criterion
    fn name(&self) -> &str;

    /// Points awarded to the winning node
    fn weight(&self) -> u32;

    fn direction(&self) -> Direction;

    /// The node's reading, or `None` if the node does not compete on this
    /// criterion
    fn reading(&self, snapshot: &NodeMetricsSnapshot) -> Option<f64>;
}

/// Lowest average CPU scaling frequency
pub struct CpuFrequency;

impl Criterion for CpuFrequency {
    fn name(&self) -> &str {
        "CpuFrequency"
    }

    fn weight(&self) -> u32 {
        3
    }

    fn direction(&self) -> Direction {
        Direction::LowerIsBetter
    }

    fn reading(&self, snapshot: &NodeMetricsSnapshot) -> Option<f64> {
        Some(snapshot.cpu_frequency_hertz)
    }
}

/// Lowest occupied memory percentage
pub struct OccupiedMemory;

impl Criterion for OccupiedMemory {
    fn name(&self) -> &str {
        "OccupiedMemory"
    }

    fn weight(&self) -> u32 {
        2
    }

    fn direction(&self) -> Direction {
        Direction::LowerIsBetter
    }

    fn reading(&self, snapshot: &NodeMetricsSnapshot) -> Option<f64> {
        Some(snapshot.occupied_memory_percentage)
    }
}

/// Fewest packets transmitted
pub struct PacketsSent;

impl Criterion for PacketsSent {
    fn name(&self) -> &str {
        "PacketsSent"
    }

    fn weight(&self) -> u32 {
        1
    }

    fn direction(&self) -> Direction {
        Direction::LowerIsBetter
    }

    fn reading(&self, snapshot: &NodeMetricsSnapshot) -> Option<f64> {
        snapshot.network_packets_sent.map(|p| p as f64)
    }
}

/// Fewest packets received
pub struct PacketsReceived;

impl Criterion for PacketsReceived {
    fn name(&self) -> &str {
        "PacketsReceived"
    }

    fn weight(&self) -> u32 {
        1
    }

    fn direction(&self) -> Direction {
        Direction::LowerIsBetter
    }

    fn reading(&self, snapshot: &NodeMetricsSnapshot) -> Option<f64> {
        snapshot.network_packets_received.map(|p| p as f64)
    }
}

/// Highest benchmarked receive bandwidth
pub struct NetworkBandwidth;

impl Criterion for NetworkBandwidth {
    fn name(&self) -> &str {
        "NetworkBandwidth"
    }

    fn weight(&self) -> u32 {
        3
    }

    fn direction(&self) -> Direction {
        Direction::HigherIsBetter
    }

    fn reading(&self, snapshot: &NodeMetricsSnapshot) -> Option<f64> {
        snapshot.network_bandwidth_bps
    }
}

/// Fewest in-flight disk I/Os. Idle disks (zero in flight) do not compete.
pub struct DiskIoInFlight;

impl Criterion for DiskIoInFlight {
    fn name(&self) -> &str {
        "DiskIoInFlight"
    }

    fn weight(&self) -> u32 {
        1
    }

    fn direction(&self) -> Direction {
        Direction::LowerIsBetter
    }

    fn reading(&self, snapshot: &NodeMetricsSnapshot) -> Option<f64> {
        snapshot.disk_io_now.filter(|io| *io != 0).map(|io| io as f64)
    }
}

/// Get default scoring criteria
pub fn default_criteria() -> Vec<Box<dyn Criterion>> {
    vec![
        Box::new(CpuFrequency),
        Box::new(OccupiedMemory),
        Box::new(PacketsSent),
        Box::new(PacketsReceived),
        Box::new(NetworkBandwidth),
        Box::new(DiskIoInFlight),
    ]
}

/// One criterion's weight going to one node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Award {
    pub criterion: String,
    pub node_name: String,
    pub weight: u32,
}

/// Outcome of scoring one decision
#[derive(Debug, Clone)]
pub struct ScoreOutcome {
    pub winner: String,
    pub score: u32,
    pub table: PriorityTable,
    pub awards: Vec<Award>,
}

/// Additive multi-criteria scorer.
///
/// Nodes are always visited in name order and a node only displaces the
/// current best on a strict improvement, so ties go to the lexicographically
/// smallest node name and the outcome does not depend on input order.
pub struct PriorityScorer {
    criteria: Vec<Box<dyn Criterion>>,
}

impl Default for PriorityScorer {
    fn default() -> Self {
        Self::new(default_criteria())
    }
}

impl PriorityScorer {
    pub fn new(criteria: Vec<Box<dyn Criterion>>) -> Self {
        Self { criteria }
    }

    /// Sum of all criteria weights
    pub fn total_weight(&self) -> u32 {
        self.criteria.iter().map(|c| c.weight()).sum()
    }

    /// Node with the best reading for one criterion, if any node competes
    pub fn optimal_node<'a>(
        criterion: &dyn Criterion,
        snapshots: &'a BTreeMap<String, NodeMetricsSnapshot>,
    ) -> Option<&'a str> {
        let direction = criterion.direction();
        let mut best: Option<(&'a str, f64)> = None;

        for (node_name, snapshot) in snapshots {
            let Some(value) = criterion.reading(snapshot).filter(|v| !v.is_nan()) else {
                continue;
            };
            match best {
                Some((_, best_value)) if !direction.improves(value, best_value) => {}
                _ => best = Some((node_name.as_str(), value)),
            }
        }

        best.map(|(node_name, _)| node_name)
    }

    /// Score every node that produced a snapshot and pick the winner.
    ///
    /// Returns `None` when there is no snapshot or no node earned any points.
    pub fn score(&self, snapshots: &BTreeMap<String, NodeMetricsSnapshot>) -> Option<ScoreOutcome> {
        let mut table: PriorityTable = snapshots.keys().map(|name| (name.clone(), 0)).collect();
        let mut awards = Vec::with_capacity(self.criteria.len());

        for criterion in &self.criteria {
            match Self::optimal_node(criterion.as_ref(), snapshots) {
                Some(node_name) => {
                    debug!(
                        "Criterion {} awards {} to node {}",
                        criterion.name(),
                        criterion.weight(),
                        node_name
                    );
                    if let Some(score) = table.get_mut(node_name) {
                        *score += criterion.weight();
                    }
                    awards.push(Award {
                        criterion: criterion.name().to_string(),
                        node_name: node_name.to_string(),
                        weight: criterion.weight(),
                    });
                }
                None => debug!("Criterion {} has no competing node", criterion.name()),
            }
        }

        let mut winner: Option<(&str, u32)> = None;
        for (node_name, score) in &table {
            if winner.map_or(true, |(_, best)| *score > best) {
                winner = Some((node_name.as_str(), *score));
            }
        }

        let (winner, score) = match winner {
            Some((name, score)) if score > 0 => (name.to_string(), score),
            _ => return None,
        };

        info!("Priority table {:?}, selected node {} with score {}", table, winner, score);

        Some(ScoreOutcome {
            winner,
            score,
            table,
            awards,
        })
    }
}
