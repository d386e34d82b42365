//! Simulation configuration
//!
//! Every tunable has a default matching the reference deployment, so
//! `SimulationConfig::default()` is a complete, valid configuration.

use crate::balancer::LoadBalancingStrategy;
use crate::bridge::BridgeConfig;
use crate::error::{Result, SimulationError};
use crate::failure::FailureInjectorConfig;
use crate::migration::MigrationConfig;
use crate::network::NetworkConfig;
use crate::redundancy::RedundancyConfig;
use crate::registry::{NodeId, NodeMetrics};
use crate::workload::WorkloadConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Top-level configuration of one simulation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Virtual time to simulate (seconds)
    pub simulation_duration: f64,

    /// Virtual time advanced per tick (seconds)
    pub time_step: f64,

    /// Wall-clock pause between ticks; zero runs unpaced
    #[serde(with = "duration_millis")]
    pub tick_interval: Duration,

    /// Inject random node failures
    pub failure_injection_enabled: bool,

    /// Model network delay in response times
    pub network_delay_enabled: bool,

    /// Run the adaptive migration engine
    pub adaptive_migration_enabled: bool,

    /// Route node selection through the external bridge
    pub bridge_enabled: bool,

    /// Fail over newly failed nodes that have a replication group
    pub automatic_failover: bool,

    /// Reject admissions that would exceed node capacity
    pub enforce_capacity: bool,

    /// Initial load-balancing strategy
    pub strategy: LoadBalancingStrategy,

    /// Seed for the random source
    pub seed: u64,

    /// Synthetic workload shape
    pub workload: WorkloadConfig,

    /// Failure injection tunables
    pub failure: FailureInjectorConfig,

    /// Migration tunables
    pub migration: MigrationConfig,

    /// Network model tunables
    pub network: NetworkConfig,

    /// Redundancy tunables
    pub redundancy: RedundancyConfig,

    /// External bridge process
    pub bridge: BridgeConfig,

    /// Baseline capacity overrides; missing nodes use the registry table
    #[serde(default)]
    pub node_metrics: BTreeMap<NodeId, NodeMetrics>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            simulation_duration: 300.0,
            time_step: 1.0,
            tick_interval: Duration::from_millis(100),
            failure_injection_enabled: true,
            network_delay_enabled: true,
            adaptive_migration_enabled: true,
            bridge_enabled: false,
            automatic_failover: true,
            enforce_capacity: true,
            strategy: LoadBalancingStrategy::default(),
            seed: 42,
            workload: WorkloadConfig::default(),
            failure: FailureInjectorConfig::default(),
            migration: MigrationConfig::default(),
            network: NetworkConfig::default(),
            redundancy: RedundancyConfig::default(),
            bridge: BridgeConfig::default(),
            node_metrics: BTreeMap::new(),
        }
    }
}

impl SimulationConfig {
    /// Set the simulated duration
    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.simulation_duration = seconds;
        self
    }

    /// Set the virtual time step
    pub fn with_time_step(mut self, seconds: f64) -> Self {
        self.time_step = seconds;
        self
    }

    /// Set the wall-clock tick interval
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Set the initial strategy
    pub fn with_strategy(mut self, strategy: LoadBalancingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the random seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the mean requests per tick
    pub fn with_request_rate(mut self, rate: f64) -> Self {
        self.workload.base_rate = rate;
        self
    }

    /// Enable or disable failure injection
    pub fn with_failure_injection(mut self, enabled: bool) -> Self {
        self.failure_injection_enabled = enabled;
        self
    }

    /// Enable or disable network delay modelling
    pub fn with_network_delay(mut self, enabled: bool) -> Self {
        self.network_delay_enabled = enabled;
        self
    }

    /// Enable or disable adaptive migration
    pub fn with_adaptive_migration(mut self, enabled: bool) -> Self {
        self.adaptive_migration_enabled = enabled;
        self
    }

    /// Enable or disable automatic failover
    pub fn with_automatic_failover(mut self, enabled: bool) -> Self {
        self.automatic_failover = enabled;
        self
    }

    /// Enable the bridge with the given process settings
    pub fn with_bridge(mut self, bridge: BridgeConfig) -> Self {
        self.bridge_enabled = true;
        self.bridge = bridge;
        self
    }

    /// Baseline capacity per node, overrides applied
    pub fn resolved_node_metrics(&self) -> BTreeMap<NodeId, NodeMetrics> {
        NodeId::ALL
            .into_iter()
            .map(|n| {
                let metrics = self
                    .node_metrics
                    .get(&n)
                    .copied()
                    .unwrap_or_else(|| n.baseline_metrics());
                (n, metrics)
            })
            .collect()
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if !(self.simulation_duration > 0.0) {
            return Err(SimulationError::config("simulation duration must be positive"));
        }
        if !(self.time_step > 0.0) {
            return Err(SimulationError::config("time step must be positive"));
        }
        if self.workload.base_rate < 0.0 {
            return Err(SimulationError::config("request rate must not be negative"));
        }
        if self.failure.network_partition_probability < 0.0 {
            return Err(SimulationError::config("partition rate must not be negative"));
        }

        let probabilities = [
            ("cascade probability", self.failure.cascade_probability),
            ("migration success rate", self.migration.success_rate),
            ("overload threshold", self.migration.overload_threshold),
            ("underload threshold", self.migration.underload_threshold),
        ];
        for (name, value) in probabilities {
            if !(0.0..=1.0).contains(&value) {
                return Err(SimulationError::config(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }

        for (node, profile) in &self.failure.profiles {
            if profile.base_rate_per_hour < 0.0 {
                return Err(SimulationError::config(format!(
                    "failure rate for {} must not be negative",
                    node
                )));
            }
        }
        for (node, metrics) in self.resolved_node_metrics() {
            if metrics.latency_ms <= 0.0 || metrics.cpu_capacity <= 0.0 || metrics.memory_capacity_gb <= 0.0 {
                return Err(SimulationError::config(format!(
                    "capacity of {} must be positive",
                    node
                )));
            }
        }
        Ok(())
    }

    /// Number of ticks the run lasts
    pub fn total_ticks(&self) -> u64 {
        (self.simulation_duration / self.time_step).ceil() as u64
    }
}

pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = SimulationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.total_ticks(), 300);
        assert!(!config.bridge_enabled, "bridge is opt-in");
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(SimulationConfig::default().with_duration(0.0).validate().is_err());
        assert!(SimulationConfig::default().with_time_step(-1.0).validate().is_err());
        assert!(SimulationConfig::default().with_request_rate(-2.0).validate().is_err());

        let mut config = SimulationConfig::default();
        config.migration.success_rate = 1.5;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("migration success rate"));
    }

    #[test]
    fn test_metric_overrides() {
        let mut config = SimulationConfig::default();
        let mut big = NodeId::Edge2.baseline_metrics();
        big.memory_capacity_gb = 64.0;
        config.node_metrics.insert(NodeId::Edge2, big);

        let resolved = config.resolved_node_metrics();
        assert_eq!(resolved.len(), 5);
        assert_eq!(resolved[&NodeId::Edge2].memory_capacity_gb, 64.0);
        assert_eq!(resolved[&NodeId::Edge1], NodeId::Edge1.baseline_metrics());
    }

    #[test]
    fn test_tick_interval_serializes_as_millis() {
        let config = SimulationConfig::default().with_tick_interval(Duration::from_millis(250));
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["tick_interval"], 250);

        let back: SimulationConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back.tick_interval, Duration::from_millis(250));
    }
}
