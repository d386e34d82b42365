//! Synthetic request generation
//!
//! Arrivals follow a daily sinusoid around a base rate; each tick draws an
//! exponential count around the current mean.

use crate::rng::RandomSource;
use crate::types::{ResourceDemand, ServiceRequest};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Seconds in a simulated day
const DAY_SECS: f64 = 86_400.0;

/// Shape of generated requests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkloadConfig {
    /// Mean requests per tick at the daily midpoint
    pub base_rate: f64,

    /// Amplitude of the daily cycle as a fraction of the base rate
    pub daily_amplitude: f64,

    /// CPU requirement bounds (%)
    pub cpu_range: (f64, f64),

    /// Memory requirement bounds (GB)
    pub memory_range: (f64, f64),

    /// Transaction requirement bounds (tx/s, inclusive)
    pub transaction_range: (u32, u32),
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            base_rate: 5.0,
            daily_amplitude: 0.5,
            cpu_range: (5.0, 25.0),
            memory_range: (0.5, 3.0),
            transaction_range: (1, 10),
        }
    }
}

/// Generates each tick's batch of service requests
#[derive(Debug, Clone, Default)]
pub struct RequestGenerator {
    config: WorkloadConfig,
}

impl RequestGenerator {
    /// Create a generator
    pub fn new(config: WorkloadConfig) -> Self {
        Self { config }
    }

    /// Mean arrivals for a tick at simulation time `t`
    pub fn arrival_rate(&self, t: f64) -> f64 {
        let phase = 2.0 * PI * (t.rem_euclid(DAY_SECS)) / DAY_SECS;
        self.config.base_rate * (1.0 + self.config.daily_amplitude * phase.sin())
    }

    /// Draw the requests arriving at time `t` during tick `tick`
    pub fn generate(&self, t: f64, tick: u64, rng: &mut dyn RandomSource) -> Vec<ServiceRequest> {
        let rate = self.arrival_rate(t);
        if rate <= 0.0 {
            return Vec::new();
        }

        let count = rng.exponential(rate).floor() as usize;
        let (cpu_low, cpu_high) = self.config.cpu_range;
        let (mem_low, mem_high) = self.config.memory_range;
        let (tx_low, tx_high) = self.config.transaction_range;

        (0..count)
            .map(|i| {
                let demand = ResourceDemand::new(
                    rng.uniform(cpu_low, cpu_high),
                    rng.uniform(mem_low, mem_high),
                    rng.int_inclusive(tx_low, tx_high),
                );
                let priority = rng.int_inclusive(1, 10) as u8;
                ServiceRequest::new(format!("service_{}_{}", tick, i), demand, priority, t)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::{ScriptedRandom, SeededRandom};

    #[test]
    fn test_daily_cycle() {
        let generator = RequestGenerator::default();
        assert!((generator.arrival_rate(0.0) - 5.0).abs() < 1e-9);
        assert!((generator.arrival_rate(DAY_SECS / 4.0) - 7.5).abs() < 1e-9);
        assert!((generator.arrival_rate(DAY_SECS * 0.75) - 2.5).abs() < 1e-9);
        assert!((generator.arrival_rate(DAY_SECS) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_rate_generates_nothing() {
        let generator = RequestGenerator::new(WorkloadConfig {
            base_rate: 0.0,
            ..Default::default()
        });
        let mut rng = ScriptedRandom::constant(0.9);
        assert!(generator.generate(10.0, 1, &mut rng).is_empty());
        assert_eq!(rng.draws(), 0, "no entropy consumed when idle");
    }

    #[test]
    fn test_requests_within_bounds() {
        let generator = RequestGenerator::default();
        let mut rng = SeededRandom::new(99);
        let mut seen = 0;
        for tick in 0..50 {
            for request in generator.generate(tick as f64, tick, &mut rng) {
                seen += 1;
                assert!(request.id.starts_with(&format!("service_{}_", tick)));
                assert!((5.0..25.0).contains(&request.demand.cpu));
                assert!((0.5..3.0).contains(&request.demand.memory_gb));
                assert!((1..=10).contains(&request.demand.transactions));
                assert!((1..=10).contains(&request.priority));
                assert_eq!(request.created_at, tick as f64);
            }
        }
        assert!(seen > 0);
    }
}
