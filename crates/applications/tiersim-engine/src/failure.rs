//! Probabilistic failure injection
//!
//! Each tick every active node is given a chance to fail according to its
//! [`FailureProfile`]. The hourly base rate becomes a per-second
//! probability, scaled up by load and down for freshly recovered nodes:
//!
//! ```text
//! p = rate / 3600 × (1 + min(load_factor, 2)) × min(1, since_recovery / 300)
//! ```
//!
//! Injected failures may cascade to dependents (core → edge, cloud → core)
//! as delayed, shorter and weaker secondary failures. Independently, a rare
//! random partition cuts the smaller side of a shuffled split off from the
//! rest.
//!
//! The injector only proposes [`FailureScenario`]s. Moving nodes between the
//! active and failed sets is the engine's job.

use crate::registry::{FailureType, NodeId};
use crate::rng::{self, RandomSource};
use crate::state::SimulationState;
use crate::types::FailureScenario;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

/// Failure behaviour of one node
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FailureProfile {
    /// Failure mode
    pub failure_type: FailureType,

    /// Expected failures per hour at zero load
    pub base_rate_per_hour: f64,

    /// Mean outage length (seconds)
    pub mean_duration_secs: f64,

    /// Severity bounds `(low, high)`
    pub severity_range: (f64, f64),
}

impl FailureProfile {
    /// Reference profile for a node
    pub fn for_node(node: NodeId) -> Self {
        let (base_rate_per_hour, mean_duration_secs, severity_range) = match node {
            NodeId::Edge1 => (0.10, 30.0, (0.8, 1.0)),
            NodeId::Edge2 => (0.15, 45.0, (0.3, 0.7)),
            NodeId::Core1 => (0.05, 120.0, (0.9, 1.0)),
            NodeId::Core2 => (0.08, 25.0, (0.7, 0.9)),
            NodeId::Cloud1 => (0.12, 60.0, (0.4, 0.8)),
        };
        Self {
            failure_type: node.failure_type(),
            base_rate_per_hour,
            mean_duration_secs,
            severity_range,
        }
    }

    /// Midpoint of the severity range
    pub fn typical_severity(&self) -> f64 {
        (self.severity_range.0 + self.severity_range.1) / 2.0
    }
}

/// Tunables for [`FailureInjector`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureInjectorConfig {
    /// Per-node profiles
    pub profiles: BTreeMap<NodeId, FailureProfile>,

    /// Chance that an injected failure cascades
    pub cascade_probability: f64,

    /// Random partitions per hour
    pub network_partition_probability: f64,

    /// Window after recovery during which failure odds ramp up (seconds)
    pub recovery_protection_secs: f64,

    /// Shortest injected outage (seconds)
    pub min_duration_secs: f64,

    /// Longest injected outage (seconds)
    pub max_duration_secs: f64,

    /// Cap on the load factor
    pub max_load_factor: f64,

    /// Delay before a cascaded failure starts `(low, high)` seconds
    pub cascade_delay_range: (f64, f64),

    /// Cascaded duration as a fraction of the trigger's
    pub cascade_duration_factor: f64,

    /// Cascaded severity as a fraction of the trigger's
    pub cascade_severity_factor: f64,

    /// Severity of random partitions
    pub partition_severity: f64,

    /// Duration of random partitions `(low, high)` seconds
    pub partition_duration_range: (f64, f64),
}

impl Default for FailureInjectorConfig {
    fn default() -> Self {
        Self {
            profiles: NodeId::ALL
                .into_iter()
                .map(|n| (n, FailureProfile::for_node(n)))
                .collect(),
            cascade_probability: 0.2,
            network_partition_probability: 0.05,
            recovery_protection_secs: 300.0,
            min_duration_secs: 5.0,
            max_duration_secs: 600.0,
            max_load_factor: 2.0,
            cascade_delay_range: (5.0, 30.0),
            cascade_duration_factor: 0.7,
            cascade_severity_factor: 0.6,
            partition_severity: 0.5,
            partition_duration_range: (60.0, 300.0),
        }
    }
}

impl FailureInjectorConfig {
    /// Replace one node's profile
    pub fn with_profile(mut self, node: NodeId, profile: FailureProfile) -> Self {
        self.profiles.insert(node, profile);
        self
    }

    /// Set the cascade probability
    pub fn with_cascade_probability(mut self, probability: f64) -> Self {
        self.cascade_probability = probability;
        self
    }

    /// Set the hourly partition probability
    pub fn with_partition_probability(mut self, per_hour: f64) -> Self {
        self.network_partition_probability = per_hour;
        self
    }
}

/// Aggregate view of a failure history
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FailureStatistics {
    /// Number of scenarios
    pub total_failures: usize,

    /// Count per failure type
    pub by_type: BTreeMap<FailureType, usize>,

    /// Count per node
    pub by_node: BTreeMap<NodeId, usize>,

    /// Mean outage length (seconds)
    pub average_duration: f64,

    /// Mean severity
    pub average_severity: f64,
}

/// Summarise a failure history
pub fn failure_statistics(failures: &[FailureScenario]) -> FailureStatistics {
    if failures.is_empty() {
        return FailureStatistics::default();
    }

    let mut stats = FailureStatistics {
        total_failures: failures.len(),
        ..Default::default()
    };
    for failure in failures {
        *stats.by_type.entry(failure.failure_type).or_default() += 1;
        *stats.by_node.entry(failure.node).or_default() += 1;
    }
    let n = failures.len() as f64;
    stats.average_duration = failures.iter().map(|f| f.duration).sum::<f64>() / n;
    stats.average_severity = failures.iter().map(|f| f.severity).sum::<f64>() / n;
    stats
}

/// Proposes node failures each tick
#[derive(Debug, Clone, Default)]
pub struct FailureInjector {
    config: FailureInjectorConfig,
    last_recovery: BTreeMap<NodeId, f64>,
}

impl FailureInjector {
    /// Create an injector with the reference profiles
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an injector with custom tunables
    pub fn with_config(config: FailureInjectorConfig) -> Self {
        Self {
            config,
            last_recovery: BTreeMap::new(),
        }
    }

    /// Current configuration
    pub fn config(&self) -> &FailureInjectorConfig {
        &self.config
    }

    /// Profile for a node
    pub fn profile(&self, node: NodeId) -> FailureProfile {
        self.config
            .profiles
            .get(&node)
            .copied()
            .unwrap_or_else(|| FailureProfile::for_node(node))
    }

    /// Note that `node` left its failure window at `now`
    pub fn record_recovery(&mut self, node: NodeId, now: f64) {
        self.last_recovery.insert(node, now);
    }

    /// Per-tick failure probability for an active node
    pub fn failure_probability(&self, node: NodeId, state: &SimulationState) -> f64 {
        let profile = self.profile(node);
        let per_second = profile.base_rate_per_hour / 3600.0;

        let load_factor = state
            .utilization(node)
            .mean()
            .clamp(0.0, self.config.max_load_factor);
        let mut probability = per_second * (1.0 + load_factor);

        if let Some(recovered) = self.last_recovery.get(&node) {
            let since = state.current_time - recovered;
            if since < self.config.recovery_protection_secs {
                probability *= (since / self.config.recovery_protection_secs).max(0.0);
            }
        }
        probability
    }

    /// Propose this tick's failures, cascades and partitions
    pub fn evaluate(
        &self,
        state: &SimulationState,
        rng: &mut dyn RandomSource,
    ) -> Vec<FailureScenario> {
        let now = state.current_time;
        let mut failing: BTreeSet<NodeId> = BTreeSet::new();
        let mut primary = Vec::new();

        for node in state.available_nodes() {
            let probability = self.failure_probability(node, state);
            if !rng.chance(probability) {
                continue;
            }
            let profile = self.profile(node);
            let duration = rng
                .exponential(profile.mean_duration_secs)
                .clamp(self.config.min_duration_secs, self.config.max_duration_secs);
            let severity = rng.uniform(profile.severity_range.0, profile.severity_range.1);

            info!(
                "Injected {} failure on {} for {:.1}s (severity {:.2})",
                profile.failure_type, node, duration, severity
            );
            failing.insert(node);
            primary.push(FailureScenario::new(
                node,
                profile.failure_type,
                now,
                duration,
                severity,
            ));
        }

        let mut created = Vec::new();
        for trigger in &primary {
            if rng.chance(self.config.cascade_probability) {
                let cascades = self.cascading_failures(trigger, state, &failing, rng);
                failing.extend(cascades.iter().map(|f| f.node));
                created.extend(cascades);
            }
        }
        primary.extend(created);

        primary.extend(self.random_partition(state, rng));
        primary
    }

    /// Secondary failures a trigger causes on its dependents
    ///
    /// Dependents already failed, or in `failing`, are skipped.
    pub fn cascading_failures(
        &self,
        trigger: &FailureScenario,
        state: &SimulationState,
        failing: &BTreeSet<NodeId>,
        rng: &mut dyn RandomSource,
    ) -> Vec<FailureScenario> {
        let (delay_low, delay_high) = self.config.cascade_delay_range;
        let mut cascades = Vec::new();

        for dependent in trigger.node.dependents() {
            if state.failed_nodes.contains(dependent) || failing.contains(dependent) {
                continue;
            }
            let delay = rng.uniform(delay_low, delay_high);
            let cascade = FailureScenario::new(
                *dependent,
                self.profile(*dependent).failure_type,
                trigger.start_time + delay,
                trigger.duration * self.config.cascade_duration_factor,
                trigger.severity * self.config.cascade_severity_factor,
            );
            info!(
                "Cascading failure {} -> {} in {:.1}s",
                trigger.node, dependent, delay
            );
            cascades.push(cascade);
        }
        cascades
    }

    fn random_partition(
        &self,
        state: &SimulationState,
        rng: &mut dyn RandomSource,
    ) -> Vec<FailureScenario> {
        if !rng.chance(self.config.network_partition_probability / 3600.0) {
            return Vec::new();
        }

        let mut nodes = NodeId::ALL.to_vec();
        rng::shuffle(rng, &mut nodes);
        let cut = rng.int_inclusive(1, nodes.len() as u32 - 1) as usize;
        let (left, right) = nodes.split_at(cut);
        let isolated = if left.len() <= right.len() { left } else { right };

        let (low, high) = self.config.partition_duration_range;
        let duration = rng.uniform(low, high);
        let now = state.current_time;

        let scenarios: Vec<_> = isolated
            .iter()
            .filter(|n| !state.failed_nodes.contains(*n))
            .map(|n| {
                FailureScenario::new(
                    *n,
                    FailureType::NetworkPartition,
                    now,
                    duration,
                    self.config.partition_severity,
                )
            })
            .collect();

        if !scenarios.is_empty() {
            info!(
                "Random network partition isolating {:?} for {:.0}s",
                scenarios.iter().map(|s| s.node).collect::<Vec<_>>(),
                duration
            );
        }
        scenarios
    }

    /// Build a scenario for a manually chosen failure
    pub fn inject_specific_failure(
        &self,
        node: NodeId,
        failure_type: FailureType,
        duration: f64,
        severity: f64,
        start_time: f64,
    ) -> FailureScenario {
        info!(
            "Manual {} failure on {} at t={:.1} for {:.1}s",
            failure_type, node, start_time, duration
        );
        FailureScenario::new(node, failure_type, start_time, duration.max(0.0), severity)
    }

    /// Forget recovery timestamps
    pub fn reset(&mut self) {
        self.last_recovery.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::{ScriptedRandom, SeededRandom};
    use crate::types::ResourceDemand;

    fn state() -> SimulationState {
        SimulationState::new(NodeId::ALL.into_iter().map(|n| (n, n.baseline_metrics())).collect())
    }

    fn silent_profile(node: NodeId) -> FailureProfile {
        FailureProfile {
            base_rate_per_hour: 0.0,
            ..FailureProfile::for_node(node)
        }
    }

    /// Only `node` can fail; no random partitions
    fn only(node: NodeId) -> FailureInjector {
        let mut config = FailureInjectorConfig::default().with_partition_probability(0.0);
        for other in NodeId::ALL.into_iter().filter(|n| *n != node) {
            config = config.with_profile(other, silent_profile(other));
        }
        FailureInjector::with_config(config)
    }

    #[test]
    fn test_reference_profiles() {
        let core1 = FailureProfile::for_node(NodeId::Core1);
        assert_eq!(core1.failure_type, FailureType::Byzantine);
        assert_eq!(core1.mean_duration_secs, 120.0);
        assert_eq!(core1.severity_range, (0.9, 1.0));

        let edge2 = FailureProfile::for_node(NodeId::Edge2);
        assert_eq!(edge2.failure_type, FailureType::Omission);
        assert_eq!(edge2.base_rate_per_hour, 0.15);
    }

    #[test]
    fn test_probability_scales_with_load() {
        let injector = FailureInjector::new();
        let mut state = state();
        let idle = injector.failure_probability(NodeId::Edge1, &state);
        assert!((idle - 0.1 / 3600.0).abs() < 1e-15);

        // Exactly at capacity on every dimension doubles the odds
        state.place_service("full", NodeId::Edge1, ResourceDemand::new(45.0, 8.0, 150));
        let full = injector.failure_probability(NodeId::Edge1, &state);
        assert!((full - 2.0 * idle).abs() < 1e-15);

        // Load factor is capped at 2
        state.place_service("more", NodeId::Edge1, ResourceDemand::new(90.0, 16.0, 300));
        let capped = injector.failure_probability(NodeId::Edge1, &state);
        assert!((capped - 3.0 * idle).abs() < 1e-15);
    }

    #[test]
    fn test_recovery_protection() {
        let mut injector = FailureInjector::new();
        let mut state = state();
        state.current_time = 250.0;
        let unprotected = injector.failure_probability(NodeId::Core2, &state);

        injector.record_recovery(NodeId::Core2, 100.0);
        let protected = injector.failure_probability(NodeId::Core2, &state);
        assert!((protected - unprotected * 0.5).abs() < 1e-15);

        state.current_time = 400.0;
        assert_eq!(injector.failure_probability(NodeId::Core2, &state), unprotected);

        injector.reset();
        state.current_time = 101.0;
        assert_eq!(injector.failure_probability(NodeId::Core2, &state), unprotected);
    }

    #[test]
    fn test_injection_and_cascade() {
        let injector = only(NodeId::Cloud1);
        let mut state = state();
        state.current_time = 100.0;

        // Zero draws: every chance succeeds, durations clamp to the minimum
        let mut rng = ScriptedRandom::constant(0.0);
        let failures = injector.evaluate(&state, &mut rng);

        let trigger = &failures[0];
        assert_eq!(trigger.node, NodeId::Cloud1);
        assert_eq!(trigger.failure_type, FailureType::Omission);
        assert_eq!(trigger.duration, 5.0);
        assert_eq!(trigger.severity, 0.4);
        assert_eq!(trigger.start_time, 100.0);

        let cascades = &failures[1..];
        assert_eq!(cascades.len(), 2);
        for cascade in cascades {
            assert!(NodeId::Cloud1.dependents().contains(&cascade.node));
            assert_ne!(cascade.node, trigger.node);
            assert!(cascade.severity < trigger.severity);
            assert!(cascade.duration < trigger.duration);
            assert_eq!(cascade.start_time, 105.0);
            assert_eq!(cascade.failure_type, cascade.node.failure_type());
        }
    }

    #[test]
    fn test_cascade_skips_failed_dependents() {
        let injector = FailureInjector::new();
        let mut state = state();
        state.mark_failed(NodeId::Edge1);

        let trigger = FailureScenario::new(NodeId::Core1, FailureType::Byzantine, 0.0, 100.0, 1.0);
        let mut rng = SeededRandom::new(5);
        let cascades = injector.cascading_failures(&trigger, &state, &BTreeSet::new(), &mut rng);
        assert_eq!(cascades.len(), 1);
        assert_eq!(cascades[0].node, NodeId::Edge2);
        assert!((cascades[0].duration - 70.0).abs() < 1e-9);
        assert!((cascades[0].severity - 0.6).abs() < 1e-9);
        assert!((5.0..30.0).contains(&cascades[0].start_time));

        let failing: BTreeSet<_> = [NodeId::Edge2].into_iter().collect();
        let cascades = injector.cascading_failures(&trigger, &state, &failing, &mut rng);
        assert!(cascades.is_empty());
    }

    #[test]
    fn test_edge_failures_never_cascade() {
        let injector = only(NodeId::Edge1);
        let state = state();
        let mut rng = ScriptedRandom::constant(0.0);
        let failures = injector.evaluate(&state, &mut rng);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].node, NodeId::Edge1);
    }

    #[test]
    fn test_failed_nodes_not_reinjected() {
        let injector = only(NodeId::Edge1);
        let mut state = state();
        state.mark_failed(NodeId::Edge1);
        let mut rng = ScriptedRandom::constant(0.0);
        assert!(injector.evaluate(&state, &mut rng).is_empty());
    }

    #[test]
    fn test_random_partition_isolates_smaller_side() {
        let mut config = FailureInjectorConfig::default().with_partition_probability(3600.0);
        for node in NodeId::ALL {
            config = config.with_profile(node, silent_profile(node));
        }
        let injector = FailureInjector::with_config(config);
        let state = state();

        for seed in 0..20 {
            let mut rng = SeededRandom::new(seed);
            let failures = injector.evaluate(&state, &mut rng);
            assert!(!failures.is_empty() && failures.len() <= 2);
            for failure in &failures {
                assert_eq!(failure.failure_type, FailureType::NetworkPartition);
                assert_eq!(failure.severity, 0.5);
                assert!((60.0..300.0).contains(&failure.duration));
            }
        }
    }

    #[test]
    fn test_inject_specific_failure() {
        let injector = FailureInjector::new();
        let failure = injector.inject_specific_failure(NodeId::Edge1, FailureType::Crash, 10.0, 0.8, 5.0);
        assert_eq!(failure.node, NodeId::Edge1);
        assert_eq!(failure.end_time(), 15.0);
        assert!(failure.recovery_time.is_none());
    }

    #[test]
    fn test_failure_statistics() {
        let failures = vec![
            FailureScenario::new(NodeId::Edge1, FailureType::Crash, 0.0, 10.0, 0.8),
            FailureScenario::new(NodeId::Edge1, FailureType::Crash, 20.0, 30.0, 0.6),
            FailureScenario::new(NodeId::Core1, FailureType::Byzantine, 5.0, 20.0, 1.0),
        ];
        let stats = failure_statistics(&failures);
        assert_eq!(stats.total_failures, 3);
        assert_eq!(stats.by_type[&FailureType::Crash], 2);
        assert_eq!(stats.by_node[&NodeId::Core1], 1);
        assert!((stats.average_duration - 20.0).abs() < 1e-9);
        assert!((stats.average_severity - 0.8).abs() < 1e-9);

        assert_eq!(failure_statistics(&[]).total_failures, 0);
    }
}
