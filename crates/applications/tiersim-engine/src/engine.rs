//! Simulation orchestrator
//!
//! [`SimulationEngine`] owns the [`SimulationState`] and every policy
//! module. Policy modules only read the state and return proposals; the
//! engine applies them in a fixed order inside one commit per tick:
//!
//! ```text
//! plan_tick:   draw the request batch
//! commit_tick: advance clock
//!              → admit requests (load balancer, optional external hints)
//!              → inject failures, refresh failed/active sets
//!              → migrate services off overloaded nodes
//!              → fail over nodes that just failed (most critical first)
//!              → expire network conditions and partitions
//!              → recompute balance index, append history
//! ```
//!
//! Splitting a tick in two lets an async caller consult an external
//! selector between the phases without holding the state lock.

use crate::balancer::{AdmissionOutcome, LoadBalancer, LoadBalancingStrategy, RejectionReason};
use crate::config::SimulationConfig;
use crate::error::Result;
use crate::failure::{FailureInjector, FailureStatistics, failure_statistics};
use crate::migration::{AdaptiveMigrationEngine, MigrationStatistics};
use crate::network::{LinkStatistics, NetworkDelaySimulator};
use crate::redundancy::{
    FailoverEvent, FailoverMode, FailoverOutcome, MultiNodeFailureScenario, RedundancyFailoverManager,
    RedundancyStatistics, RedundancyStrategy, RiskAssessment,
};
use crate::registry::{FailureType, NodeId};
use crate::rng::{RandomSource, SeededRandom};
use crate::state::{PerformanceSummary, SimulationState};
use crate::types::{FailureScenario, ServiceRequest};
use crate::workload::RequestGenerator;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Requests drawn for the next tick, before anything is committed
#[derive(Debug, Clone, PartialEq)]
pub struct TickPlan {
    /// Tick number being planned
    pub tick: u64,

    /// Simulation time the tick advances to (seconds)
    pub time: f64,

    /// Requests arriving this tick
    pub requests: Vec<ServiceRequest>,
}

/// What happened during one committed tick
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    /// Tick number
    pub tick: u64,
    /// Simulation time after the tick (seconds)
    pub time: f64,
    /// Requests admitted
    pub admitted: usize,
    /// Requests rejected
    pub rejected: usize,
    /// Nodes that entered a failure window
    pub failed: Vec<NodeId>,
    /// Nodes that left their failure window
    pub recovered: Vec<NodeId>,
    /// Migration attempts
    pub migrations: usize,
    /// Failover attempts
    pub failovers: usize,
}

/// Final metrics of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationResult {
    /// Requests generated
    pub total_requests: u64,
    /// Requests admitted
    pub successful_requests: u64,
    /// Requests rejected
    pub failed_requests: u64,
    /// Mean response time of admitted requests (seconds)
    pub average_response_time: f64,
    /// Migration attempts
    pub total_migrations: usize,
    /// Migrations that moved their service
    pub successful_migrations: usize,
    /// Migrations that did not
    pub failed_migrations: usize,
    /// Failover attempts
    pub total_failovers: usize,
    /// Failovers that reassigned services
    pub successful_failovers: usize,
    /// Every failover attempt in order
    pub failover_events: Vec<FailoverEvent>,
    /// CPU load over CPU capacity per node (`0.0..=1.0` while capacity
    /// is enforced), one sample per tick
    pub node_utilization_history: BTreeMap<NodeId, Vec<f64>>,
    /// Balance index, one sample per tick
    pub load_balance_index_history: Vec<f64>,
    /// Length of each closed failure window (seconds)
    pub failure_recovery_times: Vec<f64>,
    /// Simulated time covered (seconds)
    pub simulation_duration: f64,
    /// State after the last tick
    pub final_state: SimulationState,
}

/// Single-owner, tick-driven simulation of the cluster
pub struct SimulationEngine {
    config: SimulationConfig,
    state: SimulationState,
    generator: RequestGenerator,
    balancer: LoadBalancer,
    network: NetworkDelaySimulator,
    failures: FailureInjector,
    migration: AdaptiveMigrationEngine,
    redundancy: RedundancyFailoverManager,
    rng: Box<dyn RandomSource>,

    // Metrics
    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
    response_time_total: f64,
    node_utilization_history: BTreeMap<NodeId, Vec<f64>>,
    load_balance_index_history: Vec<f64>,
    failure_recovery_times: Vec<f64>,
}

impl SimulationEngine {
    /// Create an engine seeded from `config.seed`
    pub fn new(config: SimulationConfig) -> Result<Self> {
        let rng = Box::new(SeededRandom::new(config.seed));
        Self::with_random(config, rng)
    }

    /// Create an engine drawing from the given random source
    pub fn with_random(config: SimulationConfig, rng: Box<dyn RandomSource>) -> Result<Self> {
        config.validate()?;
        let metrics = config.resolved_node_metrics();

        Ok(Self {
            state: SimulationState::new(metrics.clone()),
            generator: RequestGenerator::new(config.workload.clone()),
            balancer: LoadBalancer::new(config.strategy).with_capacity_enforcement(config.enforce_capacity),
            network: NetworkDelaySimulator::with_config(metrics, config.network.clone()),
            failures: FailureInjector::with_config(config.failure.clone()),
            migration: AdaptiveMigrationEngine::with_config(config.migration.clone()),
            redundancy: RedundancyFailoverManager::with_config(config.redundancy.clone()),
            rng,
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
            response_time_total: 0.0,
            node_utilization_history: NodeId::ALL.into_iter().map(|n| (n, Vec::new())).collect(),
            load_balance_index_history: Vec::new(),
            failure_recovery_times: Vec::new(),
            config,
        })
    }

    /// Configuration the engine was built with
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Read-only view of the live state
    pub fn state(&self) -> &SimulationState {
        &self.state
    }

    /// Owned snapshot of the state
    pub fn current_state(&self) -> SimulationState {
        self.state.clone()
    }

    /// Compact snapshot for dashboards
    pub fn performance_summary(&self) -> PerformanceSummary {
        self.state.performance_summary()
    }

    /// Whether the configured duration has been simulated
    pub fn is_finished(&self) -> bool {
        self.state.tick >= self.config.total_ticks()
    }

    /// Active load-balancing strategy
    pub fn strategy(&self) -> LoadBalancingStrategy {
        self.balancer.strategy()
    }

    /// Switch load-balancing strategy
    pub fn set_strategy(&mut self, strategy: LoadBalancingStrategy) {
        info!("Load-balancing strategy: {} -> {}", self.balancer.strategy(), strategy);
        self.balancer.set_strategy(strategy);
    }

    /// Replace weighted-round-robin weights for the given nodes
    pub fn update_node_weights(&mut self, weights: &BTreeMap<NodeId, f64>) {
        self.balancer.update_node_weights(weights);
    }

    /// Run one full tick with the internal strategy only
    pub fn tick(&mut self) -> TickReport {
        let plan = self.plan_tick();
        self.commit_tick(plan, Vec::new())
    }

    /// Run ticks until the configured duration is reached
    pub fn run_to_completion(&mut self) -> SimulationResult {
        while !self.is_finished() {
            self.tick();
        }
        self.result()
    }

    /// Draw the next tick's requests without touching the state
    pub fn plan_tick(&mut self) -> TickPlan {
        let tick = self.state.tick + 1;
        let time = tick as f64 * self.config.time_step;
        let requests = self.generator.generate(time, tick, self.rng.as_mut());
        TickPlan { tick, time, requests }
    }

    /// Apply a planned tick
    ///
    /// `hints[i]` optionally names the node chosen externally for
    /// `plan.requests[i]`; missing or `None` entries use the internal
    /// strategy.
    pub fn commit_tick(&mut self, plan: TickPlan, hints: Vec<Option<NodeId>>) -> TickReport {
        self.state.current_time = plan.time;
        self.state.tick = plan.tick;
        let now = plan.time;

        let mut report = TickReport {
            tick: plan.tick,
            time: now,
            ..Default::default()
        };

        // Admission
        for (i, request) in plan.requests.iter().enumerate() {
            let hint = hints.get(i).copied().flatten();
            if self.admit(request, hint) {
                report.admitted += 1;
            } else {
                report.rejected += 1;
            }
        }

        // Failure injection
        if self.config.failure_injection_enabled {
            let scenarios = self.failures.evaluate(&self.state, self.rng.as_mut());
            self.apply_injected_partitions(&scenarios);
            self.state.failures.extend(scenarios);
        }
        let (failed, recovered) = self.refresh_node_status();

        // Migration
        if self.config.adaptive_migration_enabled {
            let events = self.migration.evaluate(&self.state, self.rng.as_mut());
            report.migrations = events.len();
            for event in &events {
                if event.success && self.state.move_service(&event.service_id, event.destination).is_some() {
                    self.state.load_distribution.migration_count += 1;
                }
            }
            self.state.migrations.extend(events);
        }

        // Failover, most critical node first
        if self.config.automatic_failover {
            for node in RedundancyFailoverManager::recovery_order(&failed) {
                if self.apply_failover(node, FailoverMode::Automatic).event().is_some() {
                    report.failovers += 1;
                }
            }
        }

        // Network housekeeping
        self.network.cleanup_expired_conditions(now);
        for record in self.network.expired_partitions(now) {
            self.network.restore_partition(&record.nodes, record.start_time);
        }
        for scenario_id in self.redundancy.expired_partitions(now) {
            self.redundancy.recover_partition(scenario_id);
        }

        self.record_history();
        debug_assert!(
            self.state.check_invariants().is_ok(),
            "state invariants broken at tick {}",
            plan.tick
        );

        report.failed = failed;
        report.recovered = recovered;
        debug!(
            tick = report.tick,
            admitted = report.admitted,
            rejected = report.rejected,
            lbi = self.state.load_distribution.load_balance_index,
            "Tick committed"
        );
        report
    }

    fn admit(&mut self, request: &ServiceRequest, hint: Option<NodeId>) -> bool {
        self.total_requests += 1;
        match self.balancer.admit(request, &self.state, hint) {
            AdmissionOutcome::Admitted { node } => {
                self.state.place_service(&request.id, node, request.demand);
                let response_time = self.response_time(node);
                self.response_time_total += response_time;
                self.successful_requests += 1;
                true
            }
            AdmissionOutcome::Rejected(reason) => {
                self.failed_requests += 1;
                match reason {
                    RejectionReason::NodeFailed(node) => {
                        warn!("Request {} rejected: {} is failed", request.id, node)
                    }
                    other => debug!("Request {} rejected: {:?}", request.id, other),
                }
                false
            }
        }
    }

    fn response_time(&mut self, node: NodeId) -> f64 {
        let base = self.state.metrics(node).latency_ms / 1000.0;
        if self.config.network_delay_enabled {
            base + self
                .network
                .delay_to_node(node, self.state.current_time, self.rng.as_mut())
        } else {
            (base + self.rng.uniform(-0.002, 0.002)).max(0.001)
        }
    }

    fn apply_injected_partitions(&mut self, scenarios: &[FailureScenario]) {
        let isolated: BTreeSet<NodeId> = scenarios
            .iter()
            .filter(|s| s.failure_type == FailureType::NetworkPartition)
            .map(|s| s.node)
            .collect();
        if let Some(first) = scenarios
            .iter()
            .find(|s| s.failure_type == FailureType::NetworkPartition)
        {
            self.network
                .simulate_partition(&isolated, first.duration, self.state.current_time);
        }
    }

    /// Recompute the failed set from the failure history
    ///
    /// Returns `(newly failed, newly recovered)`. Windows that closed get
    /// their recovery time stamped.
    fn refresh_node_status(&mut self) -> (Vec<NodeId>, Vec<NodeId>) {
        let now = self.state.current_time;
        let mut down = BTreeSet::new();
        let mut closed = Vec::new();

        for failure in self.state.failures.iter_mut() {
            if failure.is_active_at(now) {
                down.insert(failure.node);
            } else if failure.recovery_time.is_none() && failure.has_expired(now) {
                failure.recovery_time = Some(now);
                closed.push((failure.node, now - failure.start_time));
            }
        }

        for (node, elapsed) in closed {
            self.failure_recovery_times.push(elapsed);
            if !down.contains(&node) {
                self.failures.record_recovery(node, now);
            }
        }

        let mut failed = Vec::new();
        let mut recovered = Vec::new();
        for node in NodeId::ALL {
            if down.contains(&node) {
                if !self.state.failed_nodes.contains(&node) {
                    self.state.mark_failed(node);
                    failed.push(node);
                }
            } else if self.state.failed_nodes.contains(&node) {
                self.state.mark_active(node);
                info!("✅ {} recovered at t={:.1}", node, now);
                recovered.push(node);
            }
        }
        for node in &failed {
            warn!("❌ {} failed at t={:.1}", node, now);
        }
        (failed, recovered)
    }

    fn record_history(&mut self) {
        let now = self.state.current_time;
        self.state.load_distribution.recompute_index(now);
        self.load_balance_index_history
            .push(self.state.load_distribution.load_balance_index);

        for node in NodeId::ALL {
            let cpu = self.state.load(node).cpu;
            self.migration.record_load_sample(node, now, cpu);
            self.node_utilization_history
                .entry(node)
                .or_default()
                .push(self.state.utilization(node).cpu);
        }
    }

    fn apply_failover(&mut self, node: NodeId, mode: FailoverMode) -> FailoverOutcome {
        let outcome = self
            .redundancy
            .failover(node, &self.state, mode, self.rng.as_mut());

        if let FailoverOutcome::Completed(event) = &outcome {
            if event.success {
                for (service, target) in &event.placements {
                    self.state.move_service(service, *target);
                }
                for service in &event.services_unplaced {
                    self.readmit_service(service, node);
                }
            }
        }
        outcome
    }

    /// Send a service stranded on `failed` back through admission
    ///
    /// A rejected service stays where it is until the node recovers.
    fn readmit_service(&mut self, service: &str, failed: NodeId) {
        let Some(demand) = self.state.service_demands.get(service).copied() else {
            return;
        };
        let request = ServiceRequest::new(service, demand, 10, self.state.current_time);
        match self.balancer.admit(&request, &self.state, None) {
            AdmissionOutcome::Admitted { node } => {
                self.state.move_service(service, node);
                info!("Re-admitted {} from {} onto {}", service, failed, node);
            }
            AdmissionOutcome::Rejected(reason) => {
                warn!("{} stays on {}: {:?}", service, failed, reason);
            }
        }
    }

    /// Schedule a failure window on `node`
    ///
    /// The node's status is refreshed immediately, so a window starting at
    /// or before the current time takes effect without waiting for a tick.
    pub fn inject_failure(
        &mut self,
        node: NodeId,
        failure_type: FailureType,
        duration: f64,
        severity: f64,
        start_time: f64,
    ) -> FailureScenario {
        let scenario = self
            .failures
            .inject_specific_failure(node, failure_type, duration, severity, start_time);
        self.state.failures.push(scenario.clone());

        let (failed, _) = self.refresh_node_status();
        if self.config.automatic_failover {
            for node in RedundancyFailoverManager::recovery_order(&failed) {
                self.apply_failover(node, FailoverMode::Automatic);
            }
        }
        scenario
    }

    /// Configure redundancy from externally computed risk
    pub fn configure_redundancy(&mut self, risks: &[RiskAssessment]) -> BTreeMap<NodeId, RedundancyStrategy> {
        self.redundancy
            .configure_redundancy(risks, self.state.current_time, self.rng.as_mut())
    }

    /// Fail over `node` now and reassign its services on success
    pub fn failover(&mut self, node: NodeId, mode: FailoverMode) -> FailoverOutcome {
        self.apply_failover(node, mode)
    }

    /// Take `count` live nodes down together
    ///
    /// Each node gets its own failure window with its static failure type
    /// and the profile's typical severity. Failover is left to
    /// [`recover_multi_node_failure`](Self::recover_multi_node_failure).
    pub fn simulate_multi_node_failure(
        &mut self,
        count: usize,
        include_partition: bool,
    ) -> Option<MultiNodeFailureScenario> {
        let scenario = self.redundancy.simulate_multi_node_failure(
            count,
            include_partition,
            &self.state,
            self.rng.as_mut(),
        )?;

        for node in &scenario.failed_nodes {
            let failure_type = scenario
                .failure_types
                .get(node)
                .copied()
                .unwrap_or_else(|| node.failure_type());
            self.state.failures.push(FailureScenario::new(
                *node,
                failure_type,
                scenario.start_time,
                scenario.duration,
                self.failures.profile(*node).typical_severity(),
            ));
        }
        self.refresh_node_status();
        Some(scenario)
    }

    /// Fail over every node of a multi-node failure, most critical first
    pub fn recover_multi_node_failure(&mut self, scenario: &MultiNodeFailureScenario) -> Vec<FailoverOutcome> {
        let order = RedundancyFailoverManager::recovery_order(&scenario.failed_nodes);
        info!("Recovering {:?} in order {:?}", scenario.failed_nodes, order);
        order
            .into_iter()
            .map(|node| self.apply_failover(node, FailoverMode::SemiAutomatic))
            .collect()
    }

    /// Partition the live nodes; everything outside the majority fails
    pub fn simulate_network_partition(&mut self) -> Option<MultiNodeFailureScenario> {
        let scenario = self
            .redundancy
            .simulate_network_partition(&self.state, self.rng.as_mut())?;

        let isolated: BTreeSet<NodeId> = scenario.failed_nodes.iter().copied().collect();
        self.network
            .simulate_partition(&isolated, scenario.duration, scenario.start_time);
        let severity = self.config.failure.partition_severity;
        for node in &scenario.failed_nodes {
            self.state.failures.push(FailureScenario::new(
                *node,
                FailureType::NetworkPartition,
                scenario.start_time,
                scenario.duration,
                severity,
            ));
        }
        self.refresh_node_status();
        Some(scenario)
    }

    /// Lift a partition from the delay model and stop tracking it
    ///
    /// Failure windows already recorded run their course.
    pub fn recover_network_partition(&mut self, scenario_id: Uuid) -> bool {
        if let Some(scenario) = self.redundancy.active_partitions().get(&scenario_id) {
            let isolated: BTreeSet<NodeId> = scenario.failed_nodes.iter().copied().collect();
            self.network.restore_partition(&isolated, scenario.start_time);
        }
        self.redundancy.recover_partition(scenario_id)
    }

    /// Degrade every link for `duration` seconds starting now
    pub fn inject_network_condition(
        &mut self,
        congestion_level: f64,
        duration: f64,
        packet_loss_rate: f64,
        jitter_multiplier: f64,
    ) {
        self.network.inject_network_condition(
            congestion_level,
            duration,
            packet_loss_rate,
            jitter_multiplier,
            self.state.current_time,
        );
    }

    /// Sample one delay between two nodes at the current time
    pub fn network_delay(&mut self, source: NodeId, destination: NodeId) -> f64 {
        self.network
            .delay(source, destination, self.state.current_time, self.rng.as_mut())
    }

    /// Failure history summary
    pub fn failure_statistics(&self) -> FailureStatistics {
        failure_statistics(&self.state.failures)
    }

    /// Migration history summary
    pub fn migration_statistics(&self) -> MigrationStatistics {
        self.migration.statistics(&self.state.migrations)
    }

    /// Redundancy summary
    pub fn redundancy_statistics(&self) -> RedundancyStatistics {
        self.redundancy.statistics()
    }

    /// Per-link delay statistics
    pub fn network_statistics(&self) -> Vec<LinkStatistics> {
        self.network.statistics()
    }

    /// Redundancy manager, for inspecting groups
    pub fn redundancy(&self) -> &RedundancyFailoverManager {
        &self.redundancy
    }

    /// Collect final metrics
    pub fn result(&self) -> SimulationResult {
        let migrations = self.migration_statistics();
        let failovers = self.redundancy.failover_history();
        SimulationResult {
            total_requests: self.total_requests,
            successful_requests: self.successful_requests,
            failed_requests: self.failed_requests,
            average_response_time: if self.successful_requests > 0 {
                self.response_time_total / self.successful_requests as f64
            } else {
                0.0
            },
            total_migrations: migrations.total_migrations,
            successful_migrations: migrations.successful_migrations,
            failed_migrations: migrations.failed_migrations,
            total_failovers: failovers.len(),
            successful_failovers: failovers.iter().filter(|e| e.success).count(),
            failover_events: failovers.to_vec(),
            node_utilization_history: self.node_utilization_history.clone(),
            load_balance_index_history: self.load_balance_index_history.clone(),
            failure_recovery_times: self.failure_recovery_times.clone(),
            simulation_duration: self.state.current_time,
            final_state: self.state.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::ScriptedRandom;

    fn quiet_config() -> SimulationConfig {
        SimulationConfig::default()
            .with_failure_injection(false)
            .with_network_delay(false)
            .with_adaptive_migration(false)
            .with_request_rate(0.0)
            .with_duration(60.0)
    }

    #[test]
    fn test_rejects_invalid_config() {
        assert!(SimulationEngine::new(SimulationConfig::default().with_time_step(0.0)).is_err());
    }

    #[test]
    fn test_tick_advances_clock() {
        let mut engine = SimulationEngine::new(quiet_config()).unwrap();
        let report = engine.tick();
        assert_eq!(report.tick, 1);
        assert_eq!(engine.state().current_time, 1.0);
        assert_eq!(engine.result().load_balance_index_history, vec![1.0]);
        assert!(!engine.is_finished());

        let result = engine.run_to_completion();
        assert_eq!(result.simulation_duration, 60.0);
        assert_eq!(result.load_balance_index_history.len(), 60);
    }

    #[test]
    fn test_requests_are_admitted_and_counted() {
        let config = quiet_config().with_request_rate(8.0);
        let mut engine = SimulationEngine::new(config).unwrap();
        for _ in 0..20 {
            engine.tick();
        }
        let result = engine.result();
        assert!(result.total_requests > 0, "workload should generate requests");
        assert_eq!(result.total_requests, result.successful_requests + result.failed_requests);
        assert_eq!(
            result.final_state.service_allocations.len() as u64,
            result.successful_requests
        );
        assert!(result.average_response_time >= 0.001);
    }

    #[test]
    fn test_utilization_history_records_cpu_ratio() {
        let mut engine = SimulationEngine::new(quiet_config()).unwrap();
        engine
            .state
            .place_service("svc", NodeId::Edge1, crate::types::ResourceDemand::new(9.0, 1.0, 5));
        engine.tick();
        engine.tick();

        let history = engine.result().node_utilization_history;
        // 9 of EDGE1's 45 CPU
        assert_eq!(history[&NodeId::Edge1], vec![0.2, 0.2]);
        assert_eq!(history[&NodeId::Cloud1], vec![0.0, 0.0]);
    }

    #[test]
    fn test_hint_overrides_internal_choice() {
        let mut engine = SimulationEngine::new(quiet_config()).unwrap();
        let plan = TickPlan {
            tick: 1,
            time: 1.0,
            requests: vec![ServiceRequest::new(
                "svc",
                crate::types::ResourceDemand::new(5.0, 1.0, 1),
                5,
                1.0,
            )],
        };
        let report = engine.commit_tick(plan, vec![Some(NodeId::Cloud1)]);
        assert_eq!(report.admitted, 1);
        assert_eq!(engine.state().service_allocations["svc"], NodeId::Cloud1);
    }

    #[test]
    fn test_failed_hint_is_rejected() {
        let mut engine = SimulationEngine::new(quiet_config()).unwrap();
        engine.inject_failure(NodeId::Edge2, FailureType::Omission, 100.0, 0.5, 0.0);
        assert!(engine.state().failed_nodes.contains(&NodeId::Edge2));

        let plan = TickPlan {
            tick: 1,
            time: 1.0,
            requests: vec![ServiceRequest::new(
                "svc",
                crate::types::ResourceDemand::new(5.0, 1.0, 1),
                5,
                1.0,
            )],
        };
        let report = engine.commit_tick(plan, vec![Some(NodeId::Edge2)]);
        assert_eq!(report.rejected, 1);
        assert_eq!(engine.result().failed_requests, 1);
    }

    #[test]
    fn test_automatic_failover_moves_services() {
        let mut engine =
            SimulationEngine::with_random(quiet_config(), Box::new(ScriptedRandom::new(vec![0.3, 0.0]))).unwrap();
        engine.configure_redundancy(&[RiskAssessment::new(NodeId::Core1, 0.9, FailureType::Byzantine)]);
        engine
            .state
            .place_service("svc", NodeId::Core1, crate::types::ResourceDemand::new(10.0, 1.0, 5));

        engine.inject_failure(NodeId::Core1, FailureType::Byzantine, 30.0, 0.9, 0.0);
        let history = engine.redundancy().failover_history();
        assert_eq!(history.len(), 1);
        let event = &history[0];
        assert!(event.success);

        let target = event.failover_node.unwrap();
        assert_ne!(target, NodeId::Core1);
        assert_eq!(engine.state().service_allocations["svc"], target);
        assert_eq!(engine.state().load(target).cpu, 10.0);
        assert_eq!(engine.state().load(NodeId::Core1).cpu, 0.0);
    }

    #[test]
    fn test_failover_respects_member_capacity() {
        let mut engine = SimulationEngine::with_random(quiet_config(), Box::new(ScriptedRandom::constant(0.0))).unwrap();
        // An omission-typed CORE2 only differs from EDGE1 and CORE1
        engine.configure_redundancy(&[RiskAssessment::new(NodeId::Core2, 0.75, FailureType::Omission)]);
        let demand = crate::types::ResourceDemand::new;
        engine.state.place_service("edge-base", NodeId::Edge1, demand(21.0, 1.0, 5));
        engine.state.place_service("core-base", NodeId::Core1, demand(20.0, 1.0, 5));
        engine.state.place_service("a", NodeId::Core2, demand(30.0, 1.0, 5));
        engine.state.place_service("b", NodeId::Core2, demand(25.0, 1.0, 5));

        engine.inject_failure(NodeId::Core2, FailureType::Omission, 30.0, 0.5, 0.0);
        let event = engine.redundancy().failover_history()[0].clone();
        assert!(event.success);
        assert_eq!(event.placements["a"], NodeId::Core1);
        assert_eq!(event.services_unplaced, vec!["b".to_string()]);

        // Neither member has room for "b"; admission finds it a node
        let state = engine.state();
        assert_eq!(state.service_allocations["a"], NodeId::Core1);
        let readmitted = state.service_allocations["b"];
        assert!([NodeId::Edge2, NodeId::Cloud1].contains(&readmitted), "b landed on {}", readmitted);
        assert!(state.services_on(NodeId::Core2).is_empty());
        for node in NodeId::ALL {
            assert!(state.load(node).fits(&state.metrics(node)), "{} over capacity", node);
        }
    }

    #[test]
    fn test_successful_migration_moves_allocation() {
        let config = quiet_config().with_adaptive_migration(true);
        let mut engine = SimulationEngine::with_random(config, Box::new(ScriptedRandom::constant(0.0))).unwrap();
        let demand = crate::types::ResourceDemand::new;
        engine.state.place_service("a", NodeId::Edge2, demand(20.0, 1.0, 5));
        engine.state.place_service("b", NodeId::Edge2, demand(25.0, 1.0, 5));

        let report = engine.tick();
        assert_eq!(report.migrations, 2);
        let state = engine.state();
        assert_eq!(state.migrations.len(), 2);
        for event in &state.migrations {
            assert!(event.success);
            assert_eq!(event.source, NodeId::Edge2);
            assert_ne!(event.destination, NodeId::Edge2);
            assert_eq!(state.service_allocations[&event.service_id], event.destination);
        }
        assert_eq!(state.load(NodeId::Edge2).cpu, 0.0);
        assert_eq!(state.load_distribution.migration_count, 2);
    }

    #[test]
    fn test_failed_migration_keeps_allocation() {
        let config = quiet_config().with_adaptive_migration(true);
        let mut engine = SimulationEngine::with_random(config, Box::new(ScriptedRandom::constant(0.99))).unwrap();
        let demand = crate::types::ResourceDemand::new;
        engine.state.place_service("a", NodeId::Edge2, demand(20.0, 1.0, 5));
        engine.state.place_service("b", NodeId::Edge2, demand(25.0, 1.0, 5));

        let report = engine.tick();
        assert_eq!(report.migrations, 2);
        let state = engine.state();
        assert!(state.migrations.iter().all(|e| !e.success));
        assert_eq!(state.service_allocations["a"], NodeId::Edge2);
        assert_eq!(state.service_allocations["b"], NodeId::Edge2);
        assert_eq!(state.load(NodeId::Edge2).cpu, 45.0);
        assert_eq!(state.load_distribution.migration_count, 0);
    }

    #[test]
    fn test_network_partition_round_trip() {
        let mut engine = SimulationEngine::new(quiet_config()).unwrap();
        let scenario = engine.simulate_network_partition().unwrap();
        assert!(!scenario.failed_nodes.is_empty());
        for node in &scenario.failed_nodes {
            assert!(engine.state().failed_nodes.contains(node));
        }
        assert_eq!(engine.network.partitions().len(), 1);

        assert!(engine.recover_network_partition(scenario.scenario_id));
        assert!(engine.network.partitions().is_empty());
        assert!(!engine.recover_network_partition(scenario.scenario_id));
    }

    #[test]
    fn test_expired_partition_is_dropped_everywhere() {
        let mut engine = SimulationEngine::new(quiet_config().with_duration(400.0)).unwrap();
        let scenario = engine.simulate_network_partition().unwrap();
        assert_eq!(engine.redundancy_statistics().active_partitions, 1);

        let end = scenario.start_time + scenario.duration;
        while engine.state().current_time < end {
            engine.tick();
            if engine.state().current_time < end {
                assert_eq!(engine.redundancy_statistics().active_partitions, 1);
            }
        }
        assert!(engine.network.partitions().is_empty());
        let stats = engine.redundancy_statistics();
        assert_eq!(stats.active_partitions, 0);
        assert_eq!(stats.total_partitions, 1);
        assert!(!engine.recover_network_partition(scenario.scenario_id));
    }

    #[test]
    fn test_network_condition_expires() {
        let config = quiet_config().with_network_delay(true);
        let mut engine = SimulationEngine::new(config).unwrap();
        engine.inject_network_condition(0.5, 3.0, 0.0, 1.0);
        assert_eq!(engine.network.active_conditions(0.0).len(), 1);

        for _ in 0..3 {
            engine.tick();
        }
        assert!(engine.network.active_conditions(engine.state().current_time).is_empty());
        assert!(engine.network_delay(NodeId::Edge1, NodeId::Cloud1) >= 0.001);
    }

    #[test]
    fn test_strategy_switch() {
        let mut engine = SimulationEngine::new(quiet_config()).unwrap();
        assert_eq!(engine.strategy(), LoadBalancingStrategy::ResourceAware);
        engine.set_strategy(LoadBalancingStrategy::LeastConnections);
        assert_eq!(engine.strategy(), LoadBalancingStrategy::LeastConnections);
    }
}
