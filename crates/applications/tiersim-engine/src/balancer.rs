//! Request admission and load-balancing strategies
//!
//! ## Strategies
//!
//! - **WeightedRoundRobin**: hash the request id over a node list where each
//!   node appears `max(1, weight × 10)` times
//! - **LeastConnections**: fewest hosted services among available nodes
//! - **ResourceAware** (default): best headroom/performance/priority score
//!   among nodes that can fit the request, falling back to the least-loaded
//!   node when none can
//!
//! A request is rejected outright when no node is available or the chosen
//! node is failed. There is no queueing and no retry.

use crate::error::SimulationError;
use crate::registry::NodeId;
use crate::state::SimulationState;
use crate::types::ServiceRequest;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Load-balancing strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancingStrategy {
    /// Deterministic hash over a weight-expanded node list
    WeightedRoundRobin,

    /// Node hosting the fewest services
    LeastConnections,

    /// Highest headroom/performance score among nodes that fit
    #[default]
    ResourceAware,
}

impl LoadBalancingStrategy {
    /// Every strategy
    pub const ALL: [LoadBalancingStrategy; 3] = [
        LoadBalancingStrategy::WeightedRoundRobin,
        LoadBalancingStrategy::LeastConnections,
        LoadBalancingStrategy::ResourceAware,
    ];

    /// CLI name
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadBalancingStrategy::WeightedRoundRobin => "weighted-round-robin",
            LoadBalancingStrategy::LeastConnections => "least-connections",
            LoadBalancingStrategy::ResourceAware => "resource-aware",
        }
    }

    /// Name used on the bridge wire
    pub fn wire_name(&self) -> &'static str {
        match self {
            LoadBalancingStrategy::WeightedRoundRobin => "WEIGHTED_ROUND_ROBIN",
            LoadBalancingStrategy::LeastConnections => "LEAST_CONNECTIONS",
            LoadBalancingStrategy::ResourceAware => "RESOURCE_AWARE",
        }
    }
}

impl fmt::Display for LoadBalancingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoadBalancingStrategy {
    type Err = SimulationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        LoadBalancingStrategy::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == normalized)
            .ok_or_else(|| SimulationError::UnknownStrategy(s.to_string()))
    }
}

/// Why a request was not admitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectionReason {
    /// Every node is failed
    NoAvailableNode,

    /// The chosen node is inside a failure window
    NodeFailed(NodeId),

    /// The chosen node cannot fit the request
    InsufficientCapacity(NodeId),
}

/// Result of admitting one request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdmissionOutcome {
    /// Placed on `node`
    Admitted {
        /// Hosting node
        node: NodeId,
    },

    /// Dropped
    Rejected(RejectionReason),
}

impl AdmissionOutcome {
    /// Hosting node, if admitted
    pub fn node(&self) -> Option<NodeId> {
        match self {
            AdmissionOutcome::Admitted { node } => Some(*node),
            AdmissionOutcome::Rejected(_) => None,
        }
    }
}

/// Selects nodes for incoming requests
#[derive(Debug, Clone)]
pub struct LoadBalancer {
    strategy: LoadBalancingStrategy,
    weights: BTreeMap<NodeId, f64>,
    enforce_capacity: bool,
}

impl Default for LoadBalancer {
    fn default() -> Self {
        Self::new(LoadBalancingStrategy::default())
    }
}

impl LoadBalancer {
    /// Create a balancer with default node weights
    pub fn new(strategy: LoadBalancingStrategy) -> Self {
        Self {
            strategy,
            weights: NodeId::ALL.into_iter().map(|n| (n, n.default_weight())).collect(),
            enforce_capacity: true,
        }
    }

    /// Allow or forbid admissions that exceed the chosen node's capacity
    pub fn with_capacity_enforcement(mut self, enforce: bool) -> Self {
        self.enforce_capacity = enforce;
        self
    }

    /// Active strategy
    pub fn strategy(&self) -> LoadBalancingStrategy {
        self.strategy
    }

    /// Switch strategy
    pub fn set_strategy(&mut self, strategy: LoadBalancingStrategy) {
        self.strategy = strategy;
    }

    /// Current node weights
    pub fn weights(&self) -> &BTreeMap<NodeId, f64> {
        &self.weights
    }

    /// Weight of one node
    pub fn weight(&self, node: NodeId) -> f64 {
        self.weights.get(&node).copied().unwrap_or(0.0)
    }

    /// Replace weights for the given nodes
    pub fn update_node_weights(&mut self, weights: &BTreeMap<NodeId, f64>) {
        for (node, weight) in weights {
            self.weights.insert(*node, weight.max(0.0));
        }
    }

    /// Admit a request, optionally honouring an externally chosen node
    pub fn admit(
        &self,
        request: &ServiceRequest,
        state: &SimulationState,
        hint: Option<NodeId>,
    ) -> AdmissionOutcome {
        let Some(node) = hint.or_else(|| self.select_node(request, state)) else {
            return AdmissionOutcome::Rejected(RejectionReason::NoAvailableNode);
        };

        if !state.is_available(node) {
            return AdmissionOutcome::Rejected(RejectionReason::NodeFailed(node));
        }

        if self.enforce_capacity && !state.load(node).with(&request.demand).fits(&state.metrics(node)) {
            return AdmissionOutcome::Rejected(RejectionReason::InsufficientCapacity(node));
        }

        AdmissionOutcome::Admitted { node }
    }

    /// Pick a node for `request` with the active strategy
    ///
    /// Returns `None` if no node is available.
    pub fn select_node(&self, request: &ServiceRequest, state: &SimulationState) -> Option<NodeId> {
        let available = state.available_nodes();
        if available.is_empty() {
            return None;
        }

        match self.strategy {
            LoadBalancingStrategy::WeightedRoundRobin => self.select_weighted(request, &available),
            LoadBalancingStrategy::LeastConnections => self.select_least_connections(state, &available),
            LoadBalancingStrategy::ResourceAware => self.select_resource_aware(request, state, &available),
        }
    }

    fn select_weighted(&self, request: &ServiceRequest, available: &[NodeId]) -> Option<NodeId> {
        let expanded: Vec<NodeId> = available
            .iter()
            .flat_map(|node| {
                let copies = ((self.weight(*node) * 10.0) as usize).max(1);
                std::iter::repeat_n(*node, copies)
            })
            .collect();

        let mut hasher = DefaultHasher::new();
        request.id.hash(&mut hasher);
        let index = (hasher.finish() as usize) % expanded.len();
        Some(expanded[index])
    }

    fn select_least_connections(&self, state: &SimulationState, available: &[NodeId]) -> Option<NodeId> {
        let counts = state.allocation_counts();
        available
            .iter()
            .copied()
            .min_by_key(|node| counts.get(node).copied().unwrap_or(0))
    }

    fn select_resource_aware(
        &self,
        request: &ServiceRequest,
        state: &SimulationState,
        available: &[NodeId],
    ) -> Option<NodeId> {
        let mut best: Option<(NodeId, f64)> = None;

        for node in available {
            let metrics = state.metrics(*node);
            let after = state.load(*node).with(&request.demand);
            if !after.fits(&metrics) {
                continue;
            }

            let capacity = after.utilization(&metrics).headroom_score();
            let performance =
                self.weight(*node) * (1.0 / metrics.latency_ms) * (metrics.throughput_mbps / 1000.0);
            let priority_bonus = request.priority as f64 / 10.0;
            let score = 0.6 * capacity + 0.3 * performance + 0.1 * priority_bonus;

            if best.is_none_or(|(_, top)| score > top) {
                best = Some((*node, score));
            }
        }

        best.map(|(node, _)| node).or_else(|| {
            // Nothing fits: least summed utilization
            available
                .iter()
                .copied()
                .min_by(|a, b| state.utilization(*a).sum().total_cmp(&state.utilization(*b).sum()))
        })
    }
}
