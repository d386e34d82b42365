//! Shared simulation state
//!
//! [`SimulationState`] is owned by the engine and mutated only inside a
//! tick's commit phase. Policy modules receive `&SimulationState` and
//! return decisions; they never hold a copy between ticks.

use crate::error::{Result, SimulationError};
use crate::registry::{NodeId, NodeMetrics};
use crate::types::{FailureScenario, MigrationEvent, ResourceDemand};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Current resource usage on one node
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeLoad {
    /// CPU in use (%)
    pub cpu: f64,

    /// Memory in use (GB)
    pub memory_gb: f64,

    /// Transactions in use (tx/s)
    pub transactions: u32,
}

impl NodeLoad {
    /// Add a service's footprint
    pub fn add(&mut self, demand: &ResourceDemand) {
        self.cpu += demand.cpu;
        self.memory_gb += demand.memory_gb;
        self.transactions += demand.transactions;
    }

    /// Remove a service's footprint, never going below zero
    pub fn remove(&mut self, demand: &ResourceDemand) {
        self.cpu = (self.cpu - demand.cpu).max(0.0);
        self.memory_gb = (self.memory_gb - demand.memory_gb).max(0.0);
        self.transactions = self.transactions.saturating_sub(demand.transactions);
    }

    /// Load with `demand` added
    pub fn with(&self, demand: &ResourceDemand) -> NodeLoad {
        let mut load = *self;
        load.add(demand);
        load
    }

    /// Usage as a fraction of `capacity` on each dimension
    pub fn utilization(&self, capacity: &NodeMetrics) -> Utilization {
        Utilization {
            cpu: ratio(self.cpu, capacity.cpu_capacity),
            memory: ratio(self.memory_gb, capacity.memory_capacity_gb),
            transactions: ratio(self.transactions as f64, capacity.transaction_capacity as f64),
        }
    }

    /// Whether this load still fits within `capacity` on every dimension
    pub fn fits(&self, capacity: &NodeMetrics) -> bool {
        self.cpu <= capacity.cpu_capacity
            && self.memory_gb <= capacity.memory_capacity_gb
            && self.transactions <= capacity.transaction_capacity
    }
}

fn ratio(used: f64, capacity: f64) -> f64 {
    if capacity <= 0.0 { 1.0 } else { used / capacity }
}

/// Per-dimension utilization ratios (1.0 = at capacity)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Utilization {
    /// CPU ratio
    pub cpu: f64,
    /// Memory ratio
    pub memory: f64,
    /// Transaction ratio
    pub transactions: f64,
}

impl Utilization {
    /// Largest ratio across dimensions
    pub fn max(&self) -> f64 {
        self.cpu.max(self.memory).max(self.transactions)
    }

    /// Mean ratio across dimensions
    pub fn mean(&self) -> f64 {
        (self.cpu + self.memory + self.transactions) / 3.0
    }

    /// Sum of ratios
    pub fn sum(&self) -> f64 {
        self.cpu + self.memory + self.transactions
    }

    /// Headroom score weighted 0.4 CPU / 0.3 memory / 0.3 transactions
    pub fn headroom_score(&self) -> f64 {
        (1.0 - self.cpu) * 0.4 + (1.0 - self.memory) * 0.3 + (1.0 - self.transactions) * 0.3
    }
}

/// Cluster-wide load picture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadDistribution {
    /// Current usage per node
    pub loads: BTreeMap<NodeId, NodeLoad>,

    /// `1 - min(1, cv(cpu loads))`
    pub load_balance_index: f64,

    /// Services admitted so far
    pub total_services: usize,

    /// Successful migrations so far
    pub migration_count: usize,

    /// Simulation time of the last recompute
    pub last_update: f64,
}

impl Default for LoadDistribution {
    fn default() -> Self {
        Self {
            loads: NodeId::ALL.into_iter().map(|n| (n, NodeLoad::default())).collect(),
            load_balance_index: 1.0,
            total_services: 0,
            migration_count: 0,
            last_update: 0.0,
        }
    }
}

impl LoadDistribution {
    /// Current load on a node
    pub fn load(&self, node: NodeId) -> NodeLoad {
        self.loads.get(&node).copied().unwrap_or_default()
    }

    /// CPU usage per node
    pub fn cpu_distribution(&self) -> BTreeMap<NodeId, f64> {
        self.loads.iter().map(|(n, l)| (*n, l.cpu)).collect()
    }

    /// Memory usage per node
    pub fn memory_distribution(&self) -> BTreeMap<NodeId, f64> {
        self.loads.iter().map(|(n, l)| (*n, l.memory_gb)).collect()
    }

    /// Transaction usage per node
    pub fn transaction_distribution(&self) -> BTreeMap<NodeId, u32> {
        self.loads.iter().map(|(n, l)| (*n, l.transactions)).collect()
    }

    /// Recompute the balance index from current CPU loads
    pub fn recompute_index(&mut self, now: f64) {
        let cpu: Vec<f64> = self.loads.values().map(|l| l.cpu).collect();
        self.load_balance_index = load_balance_index(&cpu);
        self.last_update = now;
    }
}

/// `1 - min(1, stddev / mean)` with population variance
///
/// Exactly 1.0 for uniform (including all-zero) input.
pub fn load_balance_index(values: &[f64]) -> f64 {
    let Some(first) = values.first() else {
        return 1.0;
    };
    if values.iter().all(|v| v == first) {
        return 1.0;
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if mean <= 0.0 {
        return 1.0;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let cv = variance.sqrt() / mean;
    (1.0 - cv.min(1.0)).clamp(0.0, 1.0)
}

/// Everything the tick loop mutates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationState {
    /// Simulation clock (seconds)
    pub current_time: f64,

    /// Ticks committed so far
    pub tick: u64,

    /// Nodes able to take work
    pub active_nodes: BTreeSet<NodeId>,

    /// Nodes inside a failure window
    pub failed_nodes: BTreeSet<NodeId>,

    /// Baseline capacity per node
    pub node_metrics: BTreeMap<NodeId, NodeMetrics>,

    /// Current utilization
    pub load_distribution: LoadDistribution,

    /// Service id to hosting node
    pub service_allocations: BTreeMap<String, NodeId>,

    /// Service id to its resource footprint
    pub service_demands: BTreeMap<String, ResourceDemand>,

    /// Append-only failure history
    pub failures: Vec<FailureScenario>,

    /// Append-only migration history
    pub migrations: Vec<MigrationEvent>,
}

impl SimulationState {
    /// Fresh state with every node active
    pub fn new(node_metrics: BTreeMap<NodeId, NodeMetrics>) -> Self {
        Self {
            current_time: 0.0,
            tick: 0,
            active_nodes: NodeId::ALL.into_iter().collect(),
            failed_nodes: BTreeSet::new(),
            node_metrics,
            load_distribution: LoadDistribution::default(),
            service_allocations: BTreeMap::new(),
            service_demands: BTreeMap::new(),
            failures: Vec::new(),
            migrations: Vec::new(),
        }
    }

    /// Whether a node can take work
    pub fn is_available(&self, node: NodeId) -> bool {
        self.active_nodes.contains(&node) && !self.failed_nodes.contains(&node)
    }

    /// Available nodes in registry order
    pub fn available_nodes(&self) -> Vec<NodeId> {
        self.active_nodes
            .iter()
            .copied()
            .filter(|n| !self.failed_nodes.contains(n))
            .collect()
    }

    /// Baseline capacity of a node
    pub fn metrics(&self, node: NodeId) -> NodeMetrics {
        self.node_metrics
            .get(&node)
            .copied()
            .unwrap_or_else(|| node.baseline_metrics())
    }

    /// Current load on a node
    pub fn load(&self, node: NodeId) -> NodeLoad {
        self.load_distribution.load(node)
    }

    /// Current utilization ratios of a node
    pub fn utilization(&self, node: NodeId) -> Utilization {
        self.load(node).utilization(&self.metrics(node))
    }

    /// Service ids hosted on a node, in id order
    pub fn services_on(&self, node: NodeId) -> Vec<String> {
        self.service_allocations
            .iter()
            .filter(|(_, n)| **n == node)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Number of services hosted per node
    pub fn allocation_counts(&self) -> BTreeMap<NodeId, usize> {
        let mut counts: BTreeMap<NodeId, usize> = NodeId::ALL.into_iter().map(|n| (n, 0)).collect();
        for node in self.service_allocations.values() {
            *counts.entry(*node).or_default() += 1;
        }
        counts
    }

    /// Place a newly admitted service
    pub fn place_service(&mut self, id: &str, node: NodeId, demand: ResourceDemand) {
        self.service_allocations.insert(id.to_string(), node);
        self.service_demands.insert(id.to_string(), demand);
        if let Some(load) = self.load_distribution.loads.get_mut(&node) {
            load.add(&demand);
        }
        self.load_distribution.total_services += 1;
    }

    /// Move an existing service and its load; returns the previous node
    pub fn move_service(&mut self, id: &str, to: NodeId) -> Option<NodeId> {
        let from = self.service_allocations.get(id).copied()?;
        if from == to {
            return Some(from);
        }
        let demand = self.service_demands.get(id).copied().unwrap_or_default();
        if let Some(load) = self.load_distribution.loads.get_mut(&from) {
            load.remove(&demand);
        }
        if let Some(load) = self.load_distribution.loads.get_mut(&to) {
            load.add(&demand);
        }
        self.service_allocations.insert(id.to_string(), to);
        Some(from)
    }

    /// Mark a node failed
    pub fn mark_failed(&mut self, node: NodeId) {
        self.active_nodes.remove(&node);
        self.failed_nodes.insert(node);
    }

    /// Mark a node active again
    pub fn mark_active(&mut self, node: NodeId) {
        self.failed_nodes.remove(&node);
        self.active_nodes.insert(node);
    }

    /// Check the tick-boundary invariants
    pub fn check_invariants(&self) -> Result<()> {
        if let Some(node) = self.active_nodes.intersection(&self.failed_nodes).next() {
            return Err(SimulationError::invariant(format!(
                "{} is both active and failed",
                node
            )));
        }
        for node in NodeId::ALL {
            if !self.active_nodes.contains(&node) && !self.failed_nodes.contains(&node) {
                return Err(SimulationError::invariant(format!(
                    "{} is neither active nor failed",
                    node
                )));
            }
        }
        let index = self.load_distribution.load_balance_index;
        if !(0.0..=1.0).contains(&index) {
            return Err(SimulationError::invariant(format!(
                "load balance index {} out of range",
                index
            )));
        }
        Ok(())
    }

    /// Point-in-time summary for dashboards
    pub fn performance_summary(&self) -> PerformanceSummary {
        PerformanceSummary {
            current_time: self.current_time,
            active_node_count: self.active_nodes.len(),
            failed_node_count: self.failed_nodes.len(),
            total_services: self.load_distribution.total_services,
            load_balance_index: self.load_distribution.load_balance_index,
            migration_count: self.load_distribution.migration_count,
            cpu_distribution: self.load_distribution.cpu_distribution(),
            memory_distribution: self.load_distribution.memory_distribution(),
        }
    }
}

/// Compact view of the state, safe to hand to other tasks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    /// Simulation clock (seconds)
    pub current_time: f64,

    /// Active node count
    pub active_node_count: usize,

    /// Failed node count
    pub failed_node_count: usize,

    /// Services admitted so far
    pub total_services: usize,

    /// Current balance index
    pub load_balance_index: f64,

    /// Successful migrations so far
    pub migration_count: usize,

    /// CPU usage per node
    pub cpu_distribution: BTreeMap<NodeId, f64>,

    /// Memory usage per node
    pub memory_distribution: BTreeMap<NodeId, f64>,
}
