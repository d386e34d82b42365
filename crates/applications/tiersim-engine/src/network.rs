//! Network delay model
//!
//! Point-to-point delay between nodes is simulated, never measured:
//!
//! ```text
//! delay = base(src, dst) ± jitter
//!       × (1 + congestion × (max_multiplier − 1))   for each active condition
//!       ± condition jitter × jitter_multiplier
//!       + retry penalty                             on a packet-loss draw
//! ```
//!
//! Base delay between distinct nodes is the mean of their intrinsic
//! latencies scaled by the tier topology factor. Partitions inflate base
//! delay and loss towards the partitioned nodes until restored explicitly.

use crate::registry::{NodeId, NodeMetrics};
use crate::rng::RandomSource;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Tunables for the delay model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Loopback delay (ms)
    pub same_node_delay_ms: f64,

    /// Loopback jitter (ms)
    pub same_node_jitter_ms: f64,

    /// Loopback loss probability
    pub same_node_loss_rate: f64,

    /// Jitter as a fraction of base delay
    pub jitter_fraction: f64,

    /// Scale applied to `(1 - r_src * r_dst) * topology` for loss
    pub loss_scale: f64,

    /// Cap on link loss probability
    pub max_loss_rate: f64,

    /// Delay added when a loss is drawn (seconds)
    pub retry_penalty_secs: f64,

    /// Lower bound on any returned delay (seconds)
    pub min_delay_secs: f64,

    /// Delay multiplier at congestion level 1.0
    pub max_congestion_multiplier: f64,

    /// Extra jitter bound per active condition (seconds)
    pub condition_jitter_secs: f64,

    /// Base delay multiplier towards partitioned nodes
    pub partition_delay_multiplier: f64,

    /// Loss probability towards partitioned nodes
    pub partition_loss_rate: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            same_node_delay_ms: 0.1,
            same_node_jitter_ms: 0.05,
            same_node_loss_rate: 0.0001,
            jitter_fraction: 0.1,
            loss_scale: 0.1,
            max_loss_rate: 0.05,
            retry_penalty_secs: 0.05,
            min_delay_secs: 0.001,
            max_congestion_multiplier: 2.0,
            condition_jitter_secs: 0.002,
            partition_delay_multiplier: 100.0,
            partition_loss_rate: 0.9,
        }
    }
}

/// Delay characteristics of one directed link
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinkProfile {
    /// Base one-way delay (ms)
    pub base_delay_ms: f64,

    /// Jitter bound (ms)
    pub jitter_ms: f64,

    /// Loss probability
    pub packet_loss_rate: f64,
}

/// Transient degradation applied to every link while active
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkCondition {
    /// Congestion in `[0, 1]`
    pub congestion_level: f64,

    /// Extra loss probability
    pub packet_loss_rate: f64,

    /// Scale on the extra jitter bound
    pub jitter_multiplier: f64,

    /// Simulation time the condition starts (seconds)
    pub start_time: f64,

    /// How long it lasts (seconds)
    pub duration: f64,
}

impl NetworkCondition {
    /// Whether the condition applies at `now`
    pub fn is_active_at(&self, now: f64) -> bool {
        self.start_time <= now && now < self.start_time + self.duration
    }
}

/// A partition applied to the delay model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionRecord {
    /// Nodes unreachable from the rest
    pub nodes: BTreeSet<NodeId>,

    /// Simulation time the partition began (seconds)
    pub start_time: f64,

    /// Intended length (seconds); the caller restores it
    pub duration: f64,
}

/// Observed delay statistics for one directed link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkStatistics {
    /// Sending node
    pub source: NodeId,
    /// Receiving node
    pub destination: NodeId,
    /// Number of samples
    pub count: usize,
    /// Mean delay (seconds)
    pub avg_delay: f64,
    /// Minimum delay (seconds)
    pub min_delay: f64,
    /// Maximum delay (seconds)
    pub max_delay: f64,
    /// `max - min` (seconds)
    pub jitter: f64,
}

/// Simulates delay, jitter and loss between nodes
#[derive(Debug, Clone)]
pub struct NetworkDelaySimulator {
    config: NetworkConfig,
    metrics: BTreeMap<NodeId, NodeMetrics>,
    links: BTreeMap<(NodeId, NodeId), LinkProfile>,
    conditions: Vec<NetworkCondition>,
    partitions: Vec<PartitionRecord>,
    history: BTreeMap<(NodeId, NodeId), Vec<f64>>,
}

impl NetworkDelaySimulator {
    /// Create a simulator over the given node baselines
    pub fn new(metrics: BTreeMap<NodeId, NodeMetrics>) -> Self {
        Self::with_config(metrics, NetworkConfig::default())
    }

    /// Create a simulator with custom tunables
    pub fn with_config(metrics: BTreeMap<NodeId, NodeMetrics>, config: NetworkConfig) -> Self {
        let mut sim = Self {
            config,
            metrics,
            links: BTreeMap::new(),
            conditions: Vec::new(),
            partitions: Vec::new(),
            history: BTreeMap::new(),
        };
        sim.rebuild_links();
        sim
    }

    /// Current profile of a directed link
    pub fn link(&self, source: NodeId, destination: NodeId) -> LinkProfile {
        self.links
            .get(&(source, destination))
            .copied()
            .unwrap_or_else(|| self.baseline_link(source, destination))
    }

    /// Sample the delay from `source` to `destination` in seconds
    pub fn delay(
        &mut self,
        source: NodeId,
        destination: NodeId,
        now: f64,
        rng: &mut dyn RandomSource,
    ) -> f64 {
        let link = self.link(source, destination);
        let jitter = link.jitter_ms / 1000.0;
        let mut delay = link.base_delay_ms / 1000.0 + rng.uniform(-jitter, jitter);
        let mut loss = link.packet_loss_rate;

        let congestion_span = self.config.max_congestion_multiplier - 1.0;
        let extra_jitter = self.config.condition_jitter_secs;
        for condition in self.conditions.iter().filter(|c| c.is_active_at(now)) {
            delay *= 1.0 + condition.congestion_level * congestion_span;
            delay += rng.uniform(-extra_jitter, extra_jitter) * condition.jitter_multiplier;
            loss += condition.packet_loss_rate;
        }

        delay = delay.max(self.config.min_delay_secs);
        if rng.chance(loss.min(1.0)) {
            delay += self.config.retry_penalty_secs;
        }

        self.history
            .entry((source, destination))
            .or_default()
            .push(delay);
        delay
    }

    /// Delay from the client ingress (EDGE1) to `destination`
    pub fn delay_to_node(&mut self, destination: NodeId, now: f64, rng: &mut dyn RandomSource) -> f64 {
        self.delay(NodeId::Edge1, destination, now, rng)
    }

    /// Add a transient network condition starting at `now`
    pub fn inject_network_condition(
        &mut self,
        congestion_level: f64,
        duration: f64,
        packet_loss_rate: f64,
        jitter_multiplier: f64,
        now: f64,
    ) {
        let condition = NetworkCondition {
            congestion_level: congestion_level.clamp(0.0, 1.0),
            packet_loss_rate: packet_loss_rate.clamp(0.0, 1.0),
            jitter_multiplier: jitter_multiplier.max(0.0),
            start_time: now,
            duration,
        };
        debug!(
            congestion = condition.congestion_level,
            duration, "Injected network condition"
        );
        self.conditions.push(condition);
    }

    /// Conditions that apply at `now`
    pub fn active_conditions(&self, now: f64) -> Vec<&NetworkCondition> {
        self.conditions.iter().filter(|c| c.is_active_at(now)).collect()
    }

    /// Drop conditions whose window has passed; returns how many were removed
    pub fn cleanup_expired_conditions(&mut self, now: f64) -> usize {
        let before = self.conditions.len();
        self.conditions.retain(|c| now < c.start_time + c.duration);
        before - self.conditions.len()
    }

    /// Cut `nodes` off from everyone else
    ///
    /// Stays in effect until [`restore_partition`](Self::restore_partition).
    pub fn simulate_partition(&mut self, nodes: &BTreeSet<NodeId>, duration: f64, now: f64) {
        if nodes.is_empty() {
            return;
        }
        info!("Network partition isolating {:?} for {:.0}s", nodes, duration);
        self.partitions.push(PartitionRecord {
            nodes: nodes.clone(),
            start_time: now,
            duration,
        });
        self.rebuild_links();
    }

    /// Lift the partition applied to exactly `nodes` at `start_time`
    ///
    /// Other partitions over the same nodes stay in effect.
    pub fn restore_partition(&mut self, nodes: &BTreeSet<NodeId>, start_time: f64) -> bool {
        let Some(index) = self
            .partitions
            .iter()
            .position(|p| &p.nodes == nodes && p.start_time == start_time)
        else {
            return false;
        };
        self.partitions.remove(index);
        info!("Network partition restored for {:?}", nodes);
        self.rebuild_links();
        true
    }

    /// Partitions whose intended duration has elapsed by `now`
    pub fn expired_partitions(&self, now: f64) -> Vec<PartitionRecord> {
        self.partitions
            .iter()
            .filter(|p| now >= p.start_time + p.duration)
            .cloned()
            .collect()
    }

    /// Partitions currently applied
    pub fn partitions(&self) -> &[PartitionRecord] {
        &self.partitions
    }

    /// Per-link statistics over every recorded sample
    pub fn statistics(&self) -> Vec<LinkStatistics> {
        self.history
            .iter()
            .filter(|(_, samples)| !samples.is_empty())
            .map(|((source, destination), samples)| {
                let min = samples.iter().copied().fold(f64::INFINITY, f64::min);
                let max = samples.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                LinkStatistics {
                    source: *source,
                    destination: *destination,
                    count: samples.len(),
                    avg_delay: samples.iter().sum::<f64>() / samples.len() as f64,
                    min_delay: min,
                    max_delay: max,
                    jitter: max - min,
                }
            })
            .collect()
    }

    /// Clear history, conditions and partitions
    pub fn reset(&mut self) {
        self.history.clear();
        self.conditions.clear();
        self.partitions.clear();
        self.rebuild_links();
    }

    fn baseline_link(&self, source: NodeId, destination: NodeId) -> LinkProfile {
        if source == destination {
            return LinkProfile {
                base_delay_ms: self.config.same_node_delay_ms,
                jitter_ms: self.config.same_node_jitter_ms,
                packet_loss_rate: self.config.same_node_loss_rate,
            };
        }

        let latency = |n: NodeId| {
            self.metrics
                .get(&n)
                .map(|m| m.latency_ms)
                .unwrap_or_else(|| n.baseline_metrics().latency_ms)
        };
        let topology = source.tier().topology_factor(destination.tier());
        let base = (latency(source) + latency(destination)) / 2.0 * topology;
        let reliability = source.network_reliability() * destination.network_reliability();
        let loss = ((1.0 - reliability) * self.config.loss_scale * topology).min(self.config.max_loss_rate);

        LinkProfile {
            base_delay_ms: base,
            jitter_ms: base * self.config.jitter_fraction,
            packet_loss_rate: loss,
        }
    }

    fn rebuild_links(&mut self) {
        let mut links = BTreeMap::new();
        for source in NodeId::ALL {
            for destination in NodeId::ALL {
                let mut link = self.baseline_link(source, destination);
                let cut = self
                    .partitions
                    .iter()
                    .any(|p| !p.nodes.contains(&source) && p.nodes.contains(&destination));
                if cut {
                    link.base_delay_ms *= self.config.partition_delay_multiplier;
                    link.packet_loss_rate = self.config.partition_loss_rate;
                }
                links.insert((source, destination), link);
            }
        }
        self.links = links;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::{ScriptedRandom, SeededRandom};

    fn simulator() -> NetworkDelaySimulator {
        NetworkDelaySimulator::new(NodeId::ALL.into_iter().map(|n| (n, n.baseline_metrics())).collect())
    }

    #[test]
    fn test_baseline_links() {
        let sim = simulator();

        // Same tier: (12 + 15) / 2 * 0.8
        let link = sim.link(NodeId::Edge1, NodeId::Edge2);
        assert!((link.base_delay_ms - 10.8).abs() < 1e-9);
        assert!((link.jitter_ms - 1.08).abs() < 1e-9);

        // Edge to cloud: (12 + 22) / 2 * 1.5
        let link = sim.link(NodeId::Edge1, NodeId::Cloud1);
        assert!((link.base_delay_ms - 25.5).abs() < 1e-9);

        let link = sim.link(NodeId::Core1, NodeId::Core1);
        assert_eq!(link.base_delay_ms, 0.1);
        assert_eq!(link.packet_loss_rate, 0.0001);
    }

    #[test]
    fn test_loss_capped() {
        let sim = simulator();
        for source in NodeId::ALL {
            for destination in NodeId::ALL {
                assert!(sim.link(source, destination).packet_loss_rate <= 0.05);
            }
        }
    }

    #[test]
    fn test_delay_floor() {
        let mut sim = simulator();
        // Lowest jitter draw on loopback, no loss
        let mut rng = ScriptedRandom::new(vec![0.0, 0.99]);
        let delay = sim.delay(NodeId::Core1, NodeId::Core1, 0.0, &mut rng);
        assert_eq!(delay, 0.001);
    }

    #[test]
    fn test_loss_adds_retry_penalty() {
        let mut sim = simulator();
        // Mid jitter draw then a loss draw
        let mut rng = ScriptedRandom::new(vec![0.5, 0.0]);
        let delay = sim.delay(NodeId::Edge1, NodeId::Edge2, 0.0, &mut rng);
        assert!((delay - (0.0108 + 0.05)).abs() < 1e-9);
    }

    #[test]
    fn test_congestion_multiplies_delay() {
        let mut sim = simulator();
        sim.inject_network_condition(1.0, 60.0, 0.0, 0.0, 0.0);

        let mut rng = ScriptedRandom::new(vec![0.5, 0.5, 0.99]);
        let delay = sim.delay(NodeId::Edge1, NodeId::Edge2, 10.0, &mut rng);
        assert!((delay - 0.0216).abs() < 1e-9, "full congestion doubles the delay");

        assert_eq!(sim.active_conditions(59.0).len(), 1);
        assert_eq!(sim.cleanup_expired_conditions(60.0), 1);
        assert!(sim.active_conditions(10.0).is_empty());
    }

    #[test]
    fn test_partition_requires_explicit_restore() {
        let mut sim = simulator();
        let nodes: BTreeSet<_> = [NodeId::Cloud1].into_iter().collect();
        let before = sim.link(NodeId::Core1, NodeId::Cloud1);

        sim.simulate_partition(&nodes, 30.0, 0.0);
        let cut = sim.link(NodeId::Core1, NodeId::Cloud1);
        assert!((cut.base_delay_ms - before.base_delay_ms * 100.0).abs() < 1e-9);
        assert_eq!(cut.packet_loss_rate, 0.9);

        // Traffic from the partitioned side is not inflated
        assert_eq!(
            sim.link(NodeId::Cloud1, NodeId::Core1),
            simulator().link(NodeId::Cloud1, NodeId::Core1)
        );

        // Expiry is only reported, never applied
        let expired = sim.expired_partitions(45.0);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].nodes, nodes);
        assert_eq!(sim.link(NodeId::Core1, NodeId::Cloud1), cut);

        assert!(!sim.restore_partition(&nodes, 5.0));
        assert!(sim.restore_partition(&nodes, 0.0));
        assert_eq!(sim.link(NodeId::Core1, NodeId::Cloud1), before);
        assert!(!sim.restore_partition(&nodes, 0.0));
    }

    #[test]
    fn test_restore_keeps_newer_partition_on_same_nodes() {
        let mut sim = simulator();
        let nodes: BTreeSet<_> = [NodeId::Edge2].into_iter().collect();
        sim.simulate_partition(&nodes, 10.0, 0.0);
        sim.simulate_partition(&nodes, 60.0, 8.0);
        let cut = sim.link(NodeId::Core1, NodeId::Edge2);

        let expired = sim.expired_partitions(12.0);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].start_time, 0.0);

        assert!(sim.restore_partition(&expired[0].nodes, expired[0].start_time));
        assert_eq!(sim.partitions().len(), 1);
        assert_eq!(sim.partitions()[0].start_time, 8.0);
        assert_eq!(sim.link(NodeId::Core1, NodeId::Edge2), cut);
    }

    #[test]
    fn test_statistics_and_reset() {
        let mut sim = simulator();
        let mut rng = SeededRandom::new(11);
        for i in 0..20 {
            sim.delay_to_node(NodeId::Core2, i as f64, &mut rng);
        }

        let stats = sim.statistics();
        assert_eq!(stats.len(), 1);
        let link = &stats[0];
        assert_eq!((link.source, link.destination), (NodeId::Edge1, NodeId::Core2));
        assert_eq!(link.count, 20);
        assert!(link.min_delay >= 0.001);
        assert!(link.min_delay <= link.avg_delay && link.avg_delay <= link.max_delay);
        assert!((link.jitter - (link.max_delay - link.min_delay)).abs() < 1e-12);

        sim.reset();
        assert!(sim.statistics().is_empty());
    }
}
