//! Adaptive service migration
//!
//! Relieves overloaded nodes by moving their services to underloaded ones.
//! Each service moves through a small state machine:
//!
//! ```text
//!            success                 completion            cooldown elapsed
//! Eligible ──────────► Migrating ─────────────► InCooldown ────────────────► Eligible
//!     ▲   │
//!     └───┘ failure (no cooldown charged)
//! ```
//!
//! The engine only reads [`SimulationState`]; it returns [`MigrationEvent`]s
//! and the caller applies successful ones to the allocation table.

use crate::registry::NodeId;
use crate::rng::RandomSource;
use crate::state::{NodeLoad, SimulationState, Utilization};
use crate::types::{MigrationEvent, ResourceDemand};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use tracing::{debug, info};

/// Tunables for [`AdaptiveMigrationEngine`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Utilization ratio above which a dimension is overloaded
    pub overload_threshold: f64,

    /// Utilization ratio below which every dimension must sit for a node to
    /// be underloaded
    pub underload_threshold: f64,

    /// Seconds a service must wait after a successful migration
    pub cooldown_secs: f64,

    /// Maximum migrations in flight
    pub max_concurrent: usize,

    /// Probability that an attempt succeeds
    pub success_rate: f64,

    /// Completion time bounds `(low, high)` seconds
    pub duration_range: (f64, f64),

    /// Rolling window for the load trend (seconds)
    pub trend_window_secs: f64,

    /// Samples used for the load trend
    pub trend_samples: usize,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            overload_threshold: 0.8,
            underload_threshold: 0.5,
            cooldown_secs: 30.0,
            max_concurrent: 3,
            success_rate: 0.95,
            duration_range: (1.0, 10.0),
            trend_window_secs: 300.0,
            trend_samples: 10,
        }
    }
}

/// Where a service sits in the migration state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceMigrationState {
    /// May be migrated
    Eligible,
    /// Recently migrated, waiting out the cooldown
    InCooldown,
    /// Move in progress
    Migrating,
}

/// A planned move, before the outcome is drawn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationDecision {
    /// Service to move
    pub service_id: String,

    /// Overloaded node
    pub source: NodeId,

    /// Best-scoring underloaded node
    pub destination: NodeId,

    /// `0.7 × overload severity + 0.3 × load trend`
    pub priority: f64,

    /// Score of the chosen destination
    pub destination_score: f64,

    /// Fraction of the source's CPU and memory the move frees
    pub estimated_benefit: f64,

    /// Human-readable cause
    pub reason: String,
}

/// Aggregate view of a migration history
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MigrationStatistics {
    /// Attempts
    pub total_migrations: usize,
    /// Successful attempts
    pub successful_migrations: usize,
    /// Failed attempts
    pub failed_migrations: usize,
    /// `successful / total`
    pub success_rate: f64,
    /// Moves still in flight
    pub active_migrations: usize,
    /// Attempts per source node
    pub by_source: BTreeMap<NodeId, usize>,
    /// Attempts per destination node
    pub by_destination: BTreeMap<NodeId, usize>,
}

/// Detects imbalance and relocates services
#[derive(Debug, Clone, Default)]
pub struct AdaptiveMigrationEngine {
    config: MigrationConfig,
    last_migration: BTreeMap<String, f64>,
    in_flight: BTreeMap<String, f64>,
    load_history: BTreeMap<NodeId, VecDeque<(f64, f64)>>,
}

impl AdaptiveMigrationEngine {
    /// Create an engine with default tunables
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine with custom tunables
    pub fn with_config(config: MigrationConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Current configuration
    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Record a CPU load sample for trend estimation
    pub fn record_load_sample(&mut self, node: NodeId, now: f64, cpu: f64) {
        let window = self.config.trend_window_secs;
        let samples = self.load_history.entry(node).or_default();
        samples.push_back((now, cpu));
        while samples.front().is_some_and(|(t, _)| now - t > window) {
            samples.pop_front();
        }
    }

    /// Normalized CPU trend of a node in `[0, 1]`
    ///
    /// Slope over the last samples in the rolling window; falling load
    /// counts as zero.
    pub fn load_trend(&self, node: NodeId) -> f64 {
        let Some(samples) = self.load_history.get(&node) else {
            return 0.0;
        };
        let recent: Vec<f64> = samples
            .iter()
            .rev()
            .take(self.config.trend_samples)
            .map(|(_, cpu)| *cpu)
            .collect();
        if recent.len() < 2 {
            return 0.0;
        }
        // `recent` is newest first
        let slope = (recent[0] - recent[recent.len() - 1]) / recent.len() as f64;
        (slope / 10.0).clamp(0.0, 1.0)
    }

    /// State of a service at `now`
    pub fn service_state(&self, service_id: &str, now: f64) -> ServiceMigrationState {
        if self.in_flight.get(service_id).is_some_and(|done| *done > now) {
            return ServiceMigrationState::Migrating;
        }
        if self
            .last_migration
            .get(service_id)
            .is_some_and(|start| now - start < self.config.cooldown_secs)
        {
            return ServiceMigrationState::InCooldown;
        }
        ServiceMigrationState::Eligible
    }

    /// Moves currently in flight
    pub fn active_migrations(&self) -> usize {
        self.in_flight.len()
    }

    /// Finish moves whose completion time has passed; returns their ids
    pub fn complete_due(&mut self, now: f64) -> Vec<String> {
        let done: Vec<String> = self
            .in_flight
            .iter()
            .filter(|(_, completion)| **completion <= now)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &done {
            self.in_flight.remove(id);
        }
        done
    }

    /// Finish a move early
    pub fn complete_migration(&mut self, service_id: &str) -> bool {
        self.in_flight.remove(service_id).is_some()
    }

    fn is_overloaded(&self, util: &Utilization) -> bool {
        let t = self.config.overload_threshold;
        util.cpu > t || util.memory > t || util.transactions > t
    }

    fn is_underloaded(&self, util: &Utilization) -> bool {
        let t = self.config.underload_threshold;
        util.cpu < t && util.memory < t && util.transactions < t
    }

    /// Available nodes over the overload threshold on any dimension
    pub fn overloaded_nodes(&self, state: &SimulationState) -> Vec<NodeId> {
        state
            .available_nodes()
            .into_iter()
            .filter(|n| self.is_overloaded(&state.utilization(*n)))
            .collect()
    }

    /// Available nodes under the underload threshold on every dimension
    pub fn underloaded_nodes(&self, state: &SimulationState) -> Vec<NodeId> {
        state
            .available_nodes()
            .into_iter()
            .filter(|n| self.is_underloaded(&state.utilization(*n)))
            .collect()
    }

    fn overload_severity(&self, util: &Utilization) -> f64 {
        let t = self.config.overload_threshold;
        let span = (1.0 - t).max(f64::EPSILON);
        ((util.max() - t) / span).clamp(0.0, 1.0)
    }

    /// Score for moving `demand` to `destination` while it carries `load`
    ///
    /// `0.4 × capacity + 0.3 × performance + 0.2 × reliability + 0.1 × proximity`,
    /// or `None` if the destination cannot fit the service.
    pub fn destination_score(
        &self,
        state: &SimulationState,
        demand: &ResourceDemand,
        load: &NodeLoad,
        source: NodeId,
        destination: NodeId,
    ) -> Option<f64> {
        let metrics = state.metrics(destination);
        let after = load.with(demand);
        if !after.fits(&metrics) {
            return None;
        }

        let capacity = after.utilization(&metrics).headroom_score();
        let performance = (1.0 / metrics.latency_ms) * (metrics.throughput_mbps / 1000.0);
        let reliability = destination.migration_reliability();
        let proximity = source.tier().proximity(destination.tier());

        Some(0.4 * capacity + 0.3 * performance + 0.2 * reliability + 0.1 * proximity)
    }

    /// Plan moves for the current state, highest priority first
    ///
    /// Read-only: nothing is executed and no bookkeeping changes. Each
    /// destination is scored against its load plus every move already
    /// planned onto it, so the whole plan fits even if all of it succeeds.
    pub fn plan(&self, state: &SimulationState) -> Vec<MigrationDecision> {
        let now = state.current_time;
        let overloaded = self.overloaded_nodes(state);
        let underloaded = self.underloaded_nodes(state);
        if overloaded.is_empty() || underloaded.is_empty() {
            return Vec::new();
        }

        let mut projected: BTreeMap<NodeId, NodeLoad> = underloaded.iter().map(|n| (*n, state.load(*n))).collect();
        let mut decisions = Vec::new();
        for source in overloaded {
            let util = state.utilization(source);
            let priority = 0.7 * self.overload_severity(&util) + 0.3 * self.load_trend(source);
            let source_metrics = state.metrics(source);

            for service_id in state.services_on(source) {
                if self.service_state(&service_id, now) != ServiceMigrationState::Eligible {
                    continue;
                }

                let demand = state.service_demands.get(&service_id).copied().unwrap_or_default();
                let mut best: Option<(NodeId, f64)> = None;
                for destination in underloaded.iter().copied().filter(|d| *d != source) {
                    let load = projected.get(&destination).copied().unwrap_or_default();
                    let Some(score) = self.destination_score(state, &demand, &load, source, destination) else {
                        continue;
                    };
                    if best.is_none_or(|(_, top)| score > top) {
                        best = Some((destination, score));
                    }
                }
                let Some((destination, destination_score)) = best else {
                    continue;
                };
                if let Some(load) = projected.get_mut(&destination) {
                    load.add(&demand);
                }

                let estimated_benefit = (demand.cpu / source_metrics.cpu_capacity
                    + demand.memory_gb / source_metrics.memory_capacity_gb)
                    / 2.0;

                decisions.push(MigrationDecision {
                    service_id,
                    source,
                    destination,
                    priority,
                    destination_score,
                    estimated_benefit,
                    reason: format!(
                        "{} overloaded (cpu {:.0}%, mem {:.0}%, tx {:.0}%)",
                        source,
                        util.cpu * 100.0,
                        util.memory * 100.0,
                        util.transactions * 100.0
                    ),
                });
            }
        }

        decisions.sort_by(|a, b| b.priority.total_cmp(&a.priority));
        decisions
    }

    /// Plan and execute this tick's migrations
    ///
    /// # Arguments
    /// - `state`: Snapshot to evaluate against (read-only)
    /// - `rng`: Source for the success and duration draws
    ///
    /// # Returns
    /// Every attempt made, in execution order. The caller moves services for
    /// the successful ones.
    ///
    /// # Algorithm
    /// 1. Retire in-flight moves whose completion time has passed
    /// 2. Skip entirely if the concurrency cap is reached
    /// 3. Plan decisions, highest priority first
    /// 4. Draw success per decision until the cap is hit; successes start the
    ///    cooldown and occupy a slot, failures charge nothing
    pub fn evaluate(&mut self, state: &SimulationState, rng: &mut dyn RandomSource) -> Vec<MigrationEvent> {
        let now = state.current_time;
        self.complete_due(now);

        if self.in_flight.len() >= self.config.max_concurrent {
            debug!("Migration skipped: {} moves in flight", self.in_flight.len());
            return Vec::new();
        }

        let mut events = Vec::new();
        for decision in self.plan(state) {
            if self.in_flight.len() >= self.config.max_concurrent {
                break;
            }
            events.push(self.execute(decision, now, rng));
        }
        events
    }

    fn execute(&mut self, decision: MigrationDecision, now: f64, rng: &mut dyn RandomSource) -> MigrationEvent {
        let success = rng.chance(self.config.success_rate);
        let completion_time = if success {
            let (low, high) = self.config.duration_range;
            let completion = now + rng.uniform(low, high);
            self.in_flight.insert(decision.service_id.clone(), completion);
            self.last_migration.insert(decision.service_id.clone(), now);
            info!(
                "Migrating {} {} -> {} (priority {:.2})",
                decision.service_id, decision.source, decision.destination, decision.priority
            );
            Some(completion)
        } else {
            info!(
                "Migration of {} {} -> {} failed",
                decision.service_id, decision.source, decision.destination
            );
            None
        };

        MigrationEvent {
            service_id: decision.service_id,
            source: decision.source,
            destination: decision.destination,
            start_time: now,
            completion_time,
            success,
            reason: decision.reason,
        }
    }

    /// Summarise a migration history
    pub fn statistics(&self, history: &[MigrationEvent]) -> MigrationStatistics {
        let successful = history.iter().filter(|e| e.success).count();
        let mut stats = MigrationStatistics {
            total_migrations: history.len(),
            successful_migrations: successful,
            failed_migrations: history.len() - successful,
            success_rate: if history.is_empty() {
                0.0
            } else {
                successful as f64 / history.len() as f64
            },
            active_migrations: self.in_flight.len(),
            ..Default::default()
        };
        for event in history {
            *stats.by_source.entry(event.source).or_default() += 1;
            *stats.by_destination.entry(event.destination).or_default() += 1;
        }
        stats
    }

    /// Clear cooldowns, in-flight moves and load history
    pub fn reset(&mut self) {
        self.last_migration.clear();
        self.in_flight.clear();
        self.load_history.clear();
    }
}
