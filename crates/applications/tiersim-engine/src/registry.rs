//! Node registry
//!
//! The reference deployment has five nodes across three tiers. All
//! per-node behaviour (baseline capacity, failure classification,
//! reliability, criticality, cascade dependencies) is plain table lookup
//! keyed by [`NodeId`].
//!
//! ```text
//!              CLOUD1
//!             /      \
//!         CORE1 ---- CORE2
//!           |  \    /  |
//!           |   \  /   |
//!         EDGE1 ---- EDGE2
//! ```

use crate::error::SimulationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a simulated node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeId {
    /// Edge node with the best network reliability
    Edge1,
    /// Memory-constrained edge node
    Edge2,
    /// Fastest core node, Byzantine-prone
    Core1,
    /// Second core node
    Core2,
    /// High-capacity cloud node
    Cloud1,
}

impl NodeId {
    /// Every node in registry order
    pub const ALL: [NodeId; 5] = [
        NodeId::Edge1,
        NodeId::Edge2,
        NodeId::Core1,
        NodeId::Core2,
        NodeId::Cloud1,
    ];

    /// Canonical upper-case name
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeId::Edge1 => "EDGE1",
            NodeId::Edge2 => "EDGE2",
            NodeId::Core1 => "CORE1",
            NodeId::Core2 => "CORE2",
            NodeId::Cloud1 => "CLOUD1",
        }
    }

    /// Deployment tier
    pub fn tier(&self) -> Tier {
        match self {
            NodeId::Edge1 | NodeId::Edge2 => Tier::Edge,
            NodeId::Core1 | NodeId::Core2 => Tier::Core,
            NodeId::Cloud1 => Tier::Cloud,
        }
    }

    /// Baseline capacity and performance characteristics
    pub fn baseline_metrics(&self) -> NodeMetrics {
        match self {
            NodeId::Edge1 => NodeMetrics::new(12.0, 500.0, 0.10, 45.0, 8.0, 150, 8.0),
            NodeId::Edge2 => NodeMetrics::new(15.0, 470.0, 0.20, 50.0, 4.5, 100, 12.0),
            NodeId::Core1 => NodeMetrics::new(8.0, 1000.0, 0.05, 60.0, 12.0, 250, 5.0),
            NodeId::Core2 => NodeMetrics::new(10.0, 950.0, 0.08, 55.0, 10.0, 200, 10.0),
            NodeId::Cloud1 => NodeMetrics::new(22.0, 1250.0, 0.15, 72.0, 16.0, 300, 15.0),
        }
    }

    /// The failure mode this node is classified under
    pub fn failure_type(&self) -> FailureType {
        match self {
            NodeId::Edge1 | NodeId::Core2 => FailureType::Crash,
            NodeId::Edge2 | NodeId::Cloud1 => FailureType::Omission,
            NodeId::Core1 => FailureType::Byzantine,
        }
    }

    /// Link reliability used by the packet-loss model
    pub fn network_reliability(&self) -> f64 {
        match self {
            NodeId::Edge1 => 0.99,
            NodeId::Edge2 => 0.97,
            NodeId::Core1 => 0.95,
            NodeId::Core2 => 0.98,
            NodeId::Cloud1 => 0.96,
        }
    }

    /// How predictable the node's failures are, used when picking
    /// migration destinations
    pub fn migration_reliability(&self) -> f64 {
        match self {
            NodeId::Edge1 => 0.9,
            NodeId::Edge2 => 0.7,
            NodeId::Core1 => 0.6,
            NodeId::Core2 => 0.8,
            NodeId::Cloud1 => 0.7,
        }
    }

    /// Static importance; multi-node recovery restores higher values first
    pub fn criticality(&self) -> f64 {
        match self {
            NodeId::Core1 => 0.95,
            NodeId::Core2 => 0.90,
            NodeId::Cloud1 => 0.75,
            NodeId::Edge1 => 0.70,
            NodeId::Edge2 => 0.65,
        }
    }

    /// Nodes whose availability depends on this one
    pub fn dependents(&self) -> &'static [NodeId] {
        match self {
            NodeId::Core1 | NodeId::Core2 => &[NodeId::Edge1, NodeId::Edge2],
            NodeId::Cloud1 => &[NodeId::Core1, NodeId::Core2],
            NodeId::Edge1 | NodeId::Edge2 => &[],
        }
    }

    /// Default weighted-round-robin weight:
    /// `(throughput / latency) / 100`, discounted by failure type
    pub fn default_weight(&self) -> f64 {
        let metrics = self.baseline_metrics();
        let factor = match self.failure_type() {
            FailureType::Crash => 0.9,
            FailureType::Omission => 0.8,
            FailureType::Byzantine => 0.7,
            FailureType::NetworkPartition => 0.5,
        };
        metrics.throughput_mbps / metrics.latency_ms / 100.0 * factor
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeId {
    type Err = SimulationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeId::ALL
            .into_iter()
            .find(|node| node.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| SimulationError::UnknownNode(s.to_string()))
    }
}

/// Deployment tier of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Close to clients
    Edge,
    /// Aggregation layer
    Core,
    /// Remote, high capacity
    Cloud,
}

impl Tier {
    fn rank(self) -> u8 {
        match self {
            Tier::Edge => 0,
            Tier::Core => 1,
            Tier::Cloud => 2,
        }
    }

    /// Delay multiplier for a link between two tiers
    pub fn topology_factor(self, other: Tier) -> f64 {
        match (self.min_rank(other), self.max_rank(other)) {
            (a, b) if a == b => 0.8,
            (0, 1) => 1.0,
            (1, 2) => 1.2,
            _ => 1.5,
        }
    }

    /// Closeness score: 1.0 same tier, 0.7 adjacent, 0.4 distant
    pub fn proximity(self, other: Tier) -> f64 {
        match self.rank().abs_diff(other.rank()) {
            0 => 1.0,
            1 => 0.7,
            _ => 0.4,
        }
    }

    fn min_rank(self, other: Tier) -> u8 {
        self.rank().min(other.rank())
    }

    fn max_rank(self, other: Tier) -> u8 {
        self.rank().max(other.rank())
    }
}

/// Failure classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureType {
    /// Node stops responding entirely
    Crash,
    /// Node drops some messages
    Omission,
    /// Node may respond incorrectly
    Byzantine,
    /// Node is unreachable from the majority
    NetworkPartition,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureType::Crash => "CRASH",
            FailureType::Omission => "OMISSION",
            FailureType::Byzantine => "BYZANTINE",
            FailureType::NetworkPartition => "NETWORK_PARTITION",
        };
        f.write_str(name)
    }
}

/// Baseline capacity of a node
///
/// Read-only during a run. Current utilization lives in
/// [`LoadDistribution`](crate::state::LoadDistribution).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeMetrics {
    /// Intrinsic latency (ms)
    pub latency_ms: f64,

    /// Throughput (Mbps)
    pub throughput_mbps: f64,

    /// Packet loss (%)
    pub packet_loss_pct: f64,

    /// CPU capacity (%)
    pub cpu_capacity: f64,

    /// Memory capacity (GB)
    pub memory_capacity_gb: f64,

    /// Transaction capacity (tx/s)
    pub transaction_capacity: u32,

    /// Lock contention baseline (%)
    pub lock_contention_pct: f64,
}

impl NodeMetrics {
    /// Create a metrics record
    pub fn new(
        latency_ms: f64,
        throughput_mbps: f64,
        packet_loss_pct: f64,
        cpu_capacity: f64,
        memory_capacity_gb: f64,
        transaction_capacity: u32,
        lock_contention_pct: f64,
    ) -> Self {
        Self {
            latency_ms,
            throughput_mbps,
            packet_loss_pct,
            cpu_capacity,
            memory_capacity_gb,
            transaction_capacity,
            lock_contention_pct,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_roundtrip_names() {
        for node in NodeId::ALL {
            assert_eq!(node.as_str().parse::<NodeId>().unwrap(), node);
        }
        assert_eq!("core1".parse::<NodeId>().unwrap(), NodeId::Core1);
        assert!("EDGE3".parse::<NodeId>().is_err());
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&NodeId::Cloud1).unwrap();
        assert_eq!(json, "\"CLOUD1\"");

        let json = serde_json::to_string(&FailureType::NetworkPartition).unwrap();
        assert_eq!(json, "\"NETWORK_PARTITION\"");
    }

    #[test]
    fn test_topology_factors() {
        assert_eq!(Tier::Edge.topology_factor(Tier::Edge), 0.8);
        assert_eq!(Tier::Core.topology_factor(Tier::Edge), 1.0);
        assert_eq!(Tier::Cloud.topology_factor(Tier::Core), 1.2);
        assert_eq!(Tier::Edge.topology_factor(Tier::Cloud), 1.5);
    }

    #[test]
    fn test_proximity() {
        assert_eq!(Tier::Core.proximity(Tier::Core), 1.0);
        assert_eq!(Tier::Edge.proximity(Tier::Core), 0.7);
        assert_eq!(Tier::Cloud.proximity(Tier::Edge), 0.4);
    }

    #[test]
    fn test_dependents_never_include_self() {
        for node in NodeId::ALL {
            assert!(!node.dependents().contains(&node));
        }
        assert!(NodeId::Edge1.dependents().is_empty());
        assert_eq!(NodeId::Cloud1.dependents(), &[NodeId::Core1, NodeId::Core2]);
    }

    #[test]
    fn test_criticality_order() {
        let mut nodes = NodeId::ALL.to_vec();
        nodes.sort_by(|a, b| b.criticality().total_cmp(&a.criticality()));
        assert_eq!(nodes[0], NodeId::Core1, "Byzantine-prone core node is most critical");
        assert_eq!(nodes[4], NodeId::Edge2);
    }

    #[test]
    fn test_default_weights() {
        // CORE1: 1000 / 8 / 100 * 0.7
        assert!((NodeId::Core1.default_weight() - 0.875).abs() < 1e-9);
        // EDGE1: 500 / 12 / 100 * 0.9
        assert!((NodeId::Edge1.default_weight() - 0.375).abs() < 1e-9);
    }
}
