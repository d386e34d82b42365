//! Redundancy planning and failover
//!
//! Turns externally supplied risk assessments into replication groups, then
//! executes failover when a node drops out:
//!
//! ```text
//! RiskAssessment ──► strategy table ──► ReplicationGroup (risk ≥ 0.70)
//!                                            │
//! node fails ──► locate group ──► score live replicas ──► draw downtime/success
//!                                                              │
//!                                  promote replica, reassign services (on success)
//! ```
//!
//! ## Strategy table
//!
//! | risk        | condition         | strategy      |
//! |-------------|-------------------|---------------|
//! | ≥ 0.85      | Byzantine         | N-way         |
//! | ≥ 0.85      | otherwise         | active-active |
//! | ≥ 0.70      | > 2 dependents    | active-active |
//! | ≥ 0.70      | otherwise         | active-passive|
//! | ≥ 0.50      |                   | active-passive|
//! | below       |                   | geographic    |
//!
//! Multi-node failures recover in descending static criticality. Partition
//! scenarios are only tracked here; reconciling state across the split is
//! out of this module's hands.

use crate::registry::{FailureType, NodeId};
use crate::rng::{self, RandomSource};
use crate::state::{NodeLoad, SimulationState};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};
use uuid::Uuid;

/// How a replication group keeps its members in sync
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RedundancyStrategy {
    /// All members serve; fastest failover
    ActiveActive,
    /// Standby replicas take over
    ActivePassive,
    /// Quorum across N replicas
    NWayReplication,
    /// Replicas in a distant location
    GeographicRedundancy,
}

impl RedundancyStrategy {
    /// Failover downtime bounds `(low, high)` seconds
    pub fn downtime_range(&self) -> (f64, f64) {
        match self {
            RedundancyStrategy::ActiveActive => (0.5, 2.0),
            RedundancyStrategy::ActivePassive => (2.0, 10.0),
            RedundancyStrategy::NWayReplication => (5.0, 15.0),
            RedundancyStrategy::GeographicRedundancy => (10.0, 30.0),
        }
    }

    /// Probability that a failover succeeds
    pub fn success_rate(&self) -> f64 {
        match self {
            RedundancyStrategy::ActiveActive => 0.98,
            RedundancyStrategy::ActivePassive => 0.95,
            RedundancyStrategy::NWayReplication => 0.92,
            RedundancyStrategy::GeographicRedundancy => 0.90,
        }
    }
}

/// Consistency guarantee of a replication group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsistencyLevel {
    /// Linearizable
    Strong,
    /// Causally ordered
    Causal,
    /// Converges eventually
    Eventual,
}

impl ConsistencyLevel {
    /// Level required to tolerate a failure type
    pub fn for_failure_type(failure_type: FailureType) -> Self {
        match failure_type {
            FailureType::Byzantine => ConsistencyLevel::Strong,
            FailureType::Omission => ConsistencyLevel::Causal,
            FailureType::Crash | FailureType::NetworkPartition => ConsistencyLevel::Eventual,
        }
    }
}

/// Who triggered a failover
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FailoverMode {
    /// Triggered by the engine on failure
    #[default]
    Automatic,
    /// Triggered by an operator-approved policy
    SemiAutomatic,
    /// Triggered by hand
    Manual,
}

/// Risk profile of one node, produced outside this crate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Assessed node
    pub node: NodeId,

    /// Risk in `[0, 1]`
    pub risk_score: f64,

    /// Most likely failure type
    pub failure_type: FailureType,

    /// Business criticality in `[0, 1]`
    #[serde(default)]
    pub criticality: f64,

    /// Nodes affected if this one fails
    #[serde(default)]
    pub dependent_nodes: Vec<NodeId>,

    /// Probability of cascading
    #[serde(default)]
    pub cascade_risk: f64,

    /// Free-text suggestions
    #[serde(default)]
    pub mitigation_strategies: Vec<String>,
}

impl RiskAssessment {
    /// Create an assessment with no dependents
    pub fn new(node: NodeId, risk_score: f64, failure_type: FailureType) -> Self {
        Self {
            node,
            risk_score,
            failure_type,
            criticality: node.criticality(),
            dependent_nodes: Vec::new(),
            cascade_risk: 0.0,
            mitigation_strategies: Vec::new(),
        }
    }

    /// Set dependent nodes
    pub fn with_dependents(mut self, dependents: Vec<NodeId>) -> Self {
        self.dependent_nodes = dependents;
        self
    }
}

/// Primary plus replicas sharing a strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicationGroup {
    /// `replication_group_<NODE>`
    pub group_id: String,

    /// Serving node
    pub primary: NodeId,

    /// Standby or co-serving nodes; never contains `primary`
    pub replicas: BTreeSet<NodeId>,

    /// Redundancy strategy
    pub strategy: RedundancyStrategy,

    /// Replica count requested
    pub replication_factor: usize,

    /// Consistency guarantee
    pub consistency: ConsistencyLevel,

    /// Simulation time of the last sync (seconds)
    pub last_sync_time: f64,
}

impl ReplicationGroup {
    /// Primary followed by replicas
    pub fn all_nodes(&self) -> Vec<NodeId> {
        std::iter::once(self.primary)
            .chain(self.replicas.iter().copied())
            .collect()
    }

    /// Whether `node` is a member
    pub fn contains(&self, node: NodeId) -> bool {
        self.primary == node || self.replicas.contains(&node)
    }
}

/// Audit record of one failover attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailoverEvent {
    /// Unique id
    pub event_id: Uuid,

    /// Node that failed
    pub failed_node: NodeId,

    /// Replica chosen to take over, if any was eligible
    pub failover_node: Option<NodeId>,

    /// Trigger
    pub mode: FailoverMode,

    /// Group strategy
    pub strategy: RedundancyStrategy,

    /// Simulation time the failover began (seconds)
    pub start_time: f64,

    /// Simulation time service resumed (seconds)
    pub completion_time: f64,

    /// Whether the takeover succeeded
    pub success: bool,

    /// Services reassigned to a live group member
    pub services_migrated: Vec<String>,

    /// Member each migrated service landed on
    #[serde(default)]
    pub placements: BTreeMap<String, NodeId>,

    /// Services no live member could fit; handed back to admission
    #[serde(default)]
    pub services_unplaced: Vec<String>,

    /// Service interruption (seconds)
    pub downtime: f64,

    /// Human-readable summary
    pub reason: String,
}

/// Result of requesting a failover
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FailoverOutcome {
    /// An attempt was made and recorded
    Completed(FailoverEvent),

    /// The node has no replication group
    NotApplicable {
        /// Node requested
        node: NodeId,
        /// Why nothing happened
        reason: String,
    },
}

impl FailoverOutcome {
    /// The recorded event, if an attempt was made
    pub fn event(&self) -> Option<&FailoverEvent> {
        match self {
            FailoverOutcome::Completed(event) => Some(event),
            FailoverOutcome::NotApplicable { .. } => None,
        }
    }
}

/// Several nodes failing together, optionally with a partition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiNodeFailureScenario {
    /// Unique id
    pub scenario_id: Uuid,

    /// Nodes taken down
    pub failed_nodes: Vec<NodeId>,

    /// Failure type per node
    pub failure_types: BTreeMap<NodeId, FailureType>,

    /// Simulation time the failures begin (seconds)
    pub start_time: f64,

    /// Outage length (seconds)
    pub duration: f64,

    /// Whether this is a network partition
    pub is_partition: bool,

    /// Groups of mutually reachable nodes
    pub partition_groups: Vec<Vec<NodeId>>,
}

/// Tunables for [`RedundancyFailoverManager`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedundancyConfig {
    /// Risk at or above which a node gets three replicas
    pub critical_risk_threshold: f64,

    /// Risk at or above which a node gets a replication group
    pub high_risk_threshold: f64,

    /// Risk at or above which active-passive is chosen
    pub medium_risk_threshold: f64,

    /// Outage bounds for multi-node failures `(low, high)` seconds
    pub multi_failure_duration_range: (f64, f64),

    /// Duration bounds for partitions `(low, high)` seconds
    pub partition_duration_range: (f64, f64),

    /// Upper bound on partition groups
    pub max_partition_groups: usize,
}

impl Default for RedundancyConfig {
    fn default() -> Self {
        Self {
            critical_risk_threshold: 0.85,
            high_risk_threshold: 0.70,
            medium_risk_threshold: 0.50,
            multi_failure_duration_range: (30.0, 300.0),
            partition_duration_range: (60.0, 300.0),
            max_partition_groups: 3,
        }
    }
}

/// Aggregate view of redundancy activity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RedundancyStatistics {
    /// Replication groups configured
    pub replication_groups: usize,
    /// Failover attempts
    pub total_failovers: usize,
    /// Successful failovers
    pub successful_failovers: usize,
    /// Failed failovers
    pub failed_failovers: usize,
    /// Mean downtime of successful failovers (seconds)
    pub average_downtime: f64,
    /// Multi-node failure scenarios simulated
    pub multi_node_failures: usize,
    /// Partitions simulated
    pub total_partitions: usize,
    /// Partitions still tracked
    pub active_partitions: usize,
    /// Groups each node belongs to
    pub groups_by_node: BTreeMap<NodeId, usize>,
    /// Strategy selected per assessed node
    pub strategies: BTreeMap<NodeId, RedundancyStrategy>,
}

/// Configures replication and executes failover
#[derive(Debug, Clone, Default)]
pub struct RedundancyFailoverManager {
    config: RedundancyConfig,
    strategies: BTreeMap<NodeId, RedundancyStrategy>,
    groups: BTreeMap<String, ReplicationGroup>,
    failover_history: Vec<FailoverEvent>,
    multi_node_failures: Vec<MultiNodeFailureScenario>,
    active_partitions: BTreeMap<Uuid, MultiNodeFailureScenario>,
    total_partitions: usize,
}

impl RedundancyFailoverManager {
    /// Create a manager with default thresholds
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a manager with custom thresholds
    pub fn with_config(config: RedundancyConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Pick a redundancy strategy for one assessment
    pub fn select_strategy(&self, risk: &RiskAssessment) -> RedundancyStrategy {
        let c = &self.config;
        if risk.risk_score >= c.critical_risk_threshold {
            if risk.failure_type == FailureType::Byzantine {
                RedundancyStrategy::NWayReplication
            } else {
                RedundancyStrategy::ActiveActive
            }
        } else if risk.risk_score >= c.high_risk_threshold {
            if risk.dependent_nodes.len() > 2 {
                RedundancyStrategy::ActiveActive
            } else {
                RedundancyStrategy::ActivePassive
            }
        } else if risk.risk_score >= c.medium_risk_threshold {
            RedundancyStrategy::ActivePassive
        } else {
            RedundancyStrategy::GeographicRedundancy
        }
    }

    /// Replica count for a risk score
    pub fn replication_factor(&self, risk_score: f64) -> usize {
        if risk_score >= self.config.critical_risk_threshold {
            3
        } else if risk_score >= self.config.high_risk_threshold {
            2
        } else {
            1
        }
    }

    /// Configure strategies and replication groups from risk input
    ///
    /// Groups are created for nodes at or above the high-risk threshold;
    /// configuring a node again replaces its group.
    pub fn configure_redundancy(
        &mut self,
        risks: &[RiskAssessment],
        now: f64,
        rng: &mut dyn RandomSource,
    ) -> BTreeMap<NodeId, RedundancyStrategy> {
        let mut selected = BTreeMap::new();
        for risk in risks {
            let strategy = self.select_strategy(risk);
            selected.insert(risk.node, strategy);
            self.strategies.insert(risk.node, strategy);

            if risk.risk_score >= self.config.high_risk_threshold {
                let group = self.build_group(risk, strategy, now, rng);
                info!(
                    "Replication group {} ({:?}): primary {}, replicas {:?}",
                    group.group_id, strategy, group.primary, group.replicas
                );
                self.groups.insert(group.group_id.clone(), group);
            }
        }
        selected
    }

    fn build_group(
        &self,
        risk: &RiskAssessment,
        strategy: RedundancyStrategy,
        now: f64,
        rng: &mut dyn RandomSource,
    ) -> ReplicationGroup {
        let factor = self.replication_factor(risk.risk_score);
        let (different, same): (Vec<NodeId>, Vec<NodeId>) = NodeId::ALL
            .into_iter()
            .filter(|n| *n != risk.node)
            .partition(|n| n.failure_type() != risk.failure_type);

        let mut replicas: BTreeSet<NodeId> = rng::sample(rng, &different, factor).into_iter().collect();
        if replicas.len() < factor {
            let missing = factor - replicas.len();
            replicas.extend(rng::sample(rng, &same, missing));
        }

        ReplicationGroup {
            group_id: format!("replication_group_{}", risk.node),
            primary: risk.node,
            replicas,
            strategy,
            replication_factor: factor,
            consistency: ConsistencyLevel::for_failure_type(risk.failure_type),
            last_sync_time: now,
        }
    }

    /// Group that should handle a failure of `node`
    ///
    /// The group the node is primary of wins over groups listing it as a
    /// replica.
    pub fn group_for(&self, node: NodeId) -> Option<&ReplicationGroup> {
        self.groups
            .values()
            .find(|g| g.primary == node)
            .or_else(|| self.groups.values().find(|g| g.replicas.contains(&node)))
    }

    /// All groups keyed by id
    pub fn groups(&self) -> &BTreeMap<String, ReplicationGroup> {
        &self.groups
    }

    /// Strategy selected for a node, if it was assessed
    pub fn strategy_for(&self, node: NodeId) -> Option<RedundancyStrategy> {
        self.strategies.get(&node).copied()
    }

    /// Every failover attempt so far
    pub fn failover_history(&self) -> &[FailoverEvent] {
        &self.failover_history
    }

    /// Every multi-node failure simulated so far
    pub fn multi_node_failures(&self) -> &[MultiNodeFailureScenario] {
        &self.multi_node_failures
    }

    /// Partitions still tracked
    pub fn active_partitions(&self) -> &BTreeMap<Uuid, MultiNodeFailureScenario> {
        &self.active_partitions
    }

    /// Suitability of `node` as a failover target
    ///
    /// `0.3 × cpu headroom + 0.3 × memory headroom + 0.2 × latency score
    /// + 0.2 × throughput score`, latency and throughput normalized by the
    /// cluster maximum.
    pub fn failover_score(&self, state: &SimulationState, node: NodeId) -> f64 {
        let util = state.utilization(node);
        let metrics = state.metrics(node);
        let max_latency = state
            .node_metrics
            .values()
            .map(|m| m.latency_ms)
            .fold(metrics.latency_ms, f64::max);
        let max_throughput = state
            .node_metrics
            .values()
            .map(|m| m.throughput_mbps)
            .fold(metrics.throughput_mbps, f64::max);

        0.3 * (1.0 - util.cpu).max(0.0)
            + 0.3 * (1.0 - util.memory).max(0.0)
            + 0.2 * (1.0 - metrics.latency_ms / max_latency)
            + 0.2 * (metrics.throughput_mbps / max_throughput)
    }

    /// Fail over from `failed` to the best live member of its group
    ///
    /// Returns [`FailoverOutcome::NotApplicable`] when the node has no
    /// group. Every attempt, including one with no eligible replica, is
    /// recorded. On success the failover node is promoted (if `failed` was
    /// primary) and the event maps each service of `failed` to the live
    /// member with room for it. Services no member can hold are listed in
    /// `services_unplaced` for the caller to re-admit.
    pub fn failover(
        &mut self,
        failed: NodeId,
        state: &SimulationState,
        mode: FailoverMode,
        rng: &mut dyn RandomSource,
    ) -> FailoverOutcome {
        let now = state.current_time;
        let Some(group) = self.group_for(failed).cloned() else {
            return FailoverOutcome::NotApplicable {
                node: failed,
                reason: format!("{} has no replication group", failed),
            };
        };

        let mut candidates: Vec<(NodeId, f64)> = group
            .all_nodes()
            .into_iter()
            .filter(|n| *n != failed && state.is_available(*n))
            .map(|n| (n, self.failover_score(state, n)))
            .collect();
        candidates.sort_by(|a, b| b.1.total_cmp(&a.1));

        let Some(&(target, _)) = candidates.first() else {
            warn!("Failover of {} impossible: no live member in {}", failed, group.group_id);
            let event = FailoverEvent {
                event_id: Uuid::new_v4(),
                failed_node: failed,
                failover_node: None,
                mode,
                strategy: group.strategy,
                start_time: now,
                completion_time: now,
                success: false,
                services_migrated: Vec::new(),
                placements: BTreeMap::new(),
                services_unplaced: Vec::new(),
                downtime: 0.0,
                reason: format!("no eligible replica in {}", group.group_id),
            };
            self.failover_history.push(event.clone());
            return FailoverOutcome::Completed(event);
        };

        let (low, high) = group.strategy.downtime_range();
        let downtime = rng.uniform(low, high);
        let success = rng.chance(group.strategy.success_rate());

        let (placements, services_unplaced) = if success {
            let members: Vec<NodeId> = candidates.iter().map(|(n, _)| *n).collect();
            place_services(state, failed, &members)
        } else {
            (BTreeMap::new(), Vec::new())
        };
        let services_migrated: Vec<String> = placements.keys().cloned().collect();
        if success && group.primary == failed {
            if let Some(stored) = self.groups.get_mut(&group.group_id) {
                stored.replicas.remove(&target);
                stored.replicas.insert(failed);
                stored.primary = target;
                stored.last_sync_time = now + downtime;
            }
        }

        if success {
            info!(
                "Failover {} -> {} in {:.1}s ({} services)",
                failed,
                target,
                downtime,
                services_migrated.len()
            );
            if !services_unplaced.is_empty() {
                warn!(
                    "Group {} cannot absorb {} services of {}",
                    group.group_id,
                    services_unplaced.len(),
                    failed
                );
            }
        } else {
            warn!("Failover {} -> {} failed after {:.1}s", failed, target, downtime);
        }

        let event = FailoverEvent {
            event_id: Uuid::new_v4(),
            failed_node: failed,
            failover_node: Some(target),
            mode,
            strategy: group.strategy,
            start_time: now,
            completion_time: now + downtime,
            success,
            services_migrated,
            placements,
            services_unplaced,
            downtime,
            reason: format!("{:?} failover via {}", group.strategy, group.group_id),
        };
        self.failover_history.push(event.clone());
        FailoverOutcome::Completed(event)
    }

    /// Order in which failed nodes are restored: most critical first
    pub fn recovery_order(nodes: &[NodeId]) -> Vec<NodeId> {
        let mut ordered = nodes.to_vec();
        ordered.sort_by(|a, b| b.criticality().total_cmp(&a.criticality()));
        ordered
    }

    /// Split `nodes` into 2..=max random groups of near-equal size
    ///
    /// The last group takes any remainder.
    pub fn partition_groups(&self, nodes: &[NodeId], rng: &mut dyn RandomSource) -> Vec<Vec<NodeId>> {
        if nodes.len() < 2 {
            return vec![nodes.to_vec()];
        }
        let max_groups = self.config.max_partition_groups.clamp(2, nodes.len());
        let count = rng.int_inclusive(2, max_groups as u32) as usize;

        let mut shuffled = nodes.to_vec();
        rng::shuffle(rng, &mut shuffled);

        let size = shuffled.len() / count;
        (0..count)
            .map(|i| {
                let start = i * size;
                let end = if i + 1 == count { shuffled.len() } else { start + size };
                shuffled[start..end].to_vec()
            })
            .collect()
    }

    /// Pick `count` live nodes to fail together
    ///
    /// Returns `None` if no node is available. With `include_partition`,
    /// the surviving nodes are also split into partition groups.
    pub fn simulate_multi_node_failure(
        &mut self,
        count: usize,
        include_partition: bool,
        state: &SimulationState,
        rng: &mut dyn RandomSource,
    ) -> Option<MultiNodeFailureScenario> {
        let available = state.available_nodes();
        if available.is_empty() || count == 0 {
            return None;
        }

        let failed_nodes = rng::sample(rng, &available, count);
        let failure_types = failed_nodes.iter().map(|n| (*n, n.failure_type())).collect();
        let (low, high) = self.config.multi_failure_duration_range;
        let duration = rng.uniform(low, high);

        let partition_groups = if include_partition {
            let survivors: Vec<NodeId> = available
                .iter()
                .copied()
                .filter(|n| !failed_nodes.contains(n))
                .collect();
            if survivors.len() >= 2 {
                self.partition_groups(&survivors, rng)
            } else {
                Vec::new()
            }
        } else {
            Vec::new()
        };

        let scenario = MultiNodeFailureScenario {
            scenario_id: Uuid::new_v4(),
            failed_nodes,
            failure_types,
            start_time: state.current_time,
            duration,
            is_partition: include_partition,
            partition_groups,
        };
        info!(
            "Multi-node failure: {:?} for {:.0}s",
            scenario.failed_nodes, scenario.duration
        );
        self.multi_node_failures.push(scenario.clone());
        Some(scenario)
    }

    /// Split live nodes into groups; all but the largest are cut off
    ///
    /// Returns `None` with fewer than two live nodes.
    pub fn simulate_network_partition(
        &mut self,
        state: &SimulationState,
        rng: &mut dyn RandomSource,
    ) -> Option<MultiNodeFailureScenario> {
        let available = state.available_nodes();
        if available.len() < 2 {
            return None;
        }

        let groups = self.partition_groups(&available, rng);
        let majority = groups
            .iter()
            .enumerate()
            .fold(0, |best, (i, g)| if g.len() > groups[best].len() { i } else { best });

        let failed_nodes: Vec<NodeId> = groups
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != majority)
            .flat_map(|(_, g)| g.iter().copied())
            .collect();
        let failure_types = failed_nodes
            .iter()
            .map(|n| (*n, FailureType::NetworkPartition))
            .collect();
        let (low, high) = self.config.partition_duration_range;

        let scenario = MultiNodeFailureScenario {
            scenario_id: Uuid::new_v4(),
            failed_nodes,
            failure_types,
            start_time: state.current_time,
            duration: rng.uniform(low, high),
            is_partition: true,
            partition_groups: groups,
        };
        info!(
            "Network partition: majority {:?}, isolated {:?}",
            scenario.partition_groups[majority], scenario.failed_nodes
        );
        self.total_partitions += 1;
        self.active_partitions.insert(scenario.scenario_id, scenario.clone());
        Some(scenario)
    }

    /// Stop tracking a partition; returns whether it was tracked
    pub fn recover_partition(&mut self, scenario_id: Uuid) -> bool {
        self.active_partitions.remove(&scenario_id).is_some()
    }

    /// Tracked partitions whose duration has run out by `now`
    pub fn expired_partitions(&self, now: f64) -> Vec<Uuid> {
        self.active_partitions
            .values()
            .filter(|s| now >= s.start_time + s.duration)
            .map(|s| s.scenario_id)
            .collect()
    }

    /// Aggregate view of groups, failovers and scenarios
    pub fn statistics(&self) -> RedundancyStatistics {
        let successful: Vec<&FailoverEvent> = self.failover_history.iter().filter(|e| e.success).collect();
        let average_downtime = if successful.is_empty() {
            0.0
        } else {
            successful.iter().map(|e| e.downtime).sum::<f64>() / successful.len() as f64
        };

        let mut groups_by_node = BTreeMap::new();
        for group in self.groups.values() {
            for node in group.all_nodes() {
                *groups_by_node.entry(node).or_default() += 1;
            }
        }

        RedundancyStatistics {
            replication_groups: self.groups.len(),
            total_failovers: self.failover_history.len(),
            successful_failovers: successful.len(),
            failed_failovers: self.failover_history.len() - successful.len(),
            average_downtime,
            multi_node_failures: self.multi_node_failures.len(),
            total_partitions: self.total_partitions,
            active_partitions: self.active_partitions.len(),
            groups_by_node,
            strategies: self.strategies.clone(),
        }
    }

    /// Forget every group, strategy and record
    pub fn reset(&mut self) {
        self.strategies.clear();
        self.groups.clear();
        self.failover_history.clear();
        self.multi_node_failures.clear();
        self.active_partitions.clear();
        self.total_partitions = 0;
    }
}

/// Spread the services of `failed` over `members`, best member first
///
/// Each service goes to the first member whose load, including what this
/// failover already placed there, still fits its capacity. Services no
/// member can take are returned separately.
fn place_services(
    state: &SimulationState,
    failed: NodeId,
    members: &[NodeId],
) -> (BTreeMap<String, NodeId>, Vec<String>) {
    let mut projected: Vec<(NodeId, NodeLoad)> = members.iter().map(|n| (*n, state.load(*n))).collect();
    let mut placements = BTreeMap::new();
    let mut unplaced = Vec::new();

    for service in state.services_on(failed) {
        let demand = state.service_demands.get(&service).copied().unwrap_or_default();
        let slot = projected
            .iter_mut()
            .find(|(node, load)| load.with(&demand).fits(&state.metrics(*node)));
        match slot {
            Some((node, load)) => {
                load.add(&demand);
                placements.insert(service, *node);
            }
            None => unplaced.push(service),
        }
    }
    (placements, unplaced)
}
