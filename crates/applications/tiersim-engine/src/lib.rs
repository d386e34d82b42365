//! # Tiersim Engine
//!
//! Tick-driven simulation of load distribution, failure and recovery across
//! a small heterogeneous cluster (two edge, two core, one cloud node).
//!
//! ## Architecture
//!
//! ```text
//! SimulationRunner (tokio)           LoadBalancerBridge (optional)
//! └── SimulationEngine  ◄──────────  selectNode hints
//!     ├── SimulationState      (single owner, committed once per tick)
//!     ├── LoadBalancer         admission: WRR / least-connections / resource-aware
//!     ├── FailureInjector      random failures, cascades, partitions
//!     ├── NetworkDelaySimulator
//!     ├── AdaptiveMigrationEngine
//!     └── RedundancyFailoverManager
//! ```
//!
//! Policy modules read the state and return proposals; only the engine
//! writes. Every randomized decision draws from an injected
//! [`RandomSource`], so a seed reproduces a run and tests can script
//! exact outcomes.
//!
//! ## Example
//!
//! ```no_run
//! use tiersim_engine::{SimulationConfig, SimulationEngine};
//!
//! let config = SimulationConfig::default().with_duration(120.0).with_seed(7);
//! let mut engine = SimulationEngine::new(config)?;
//! let result = engine.run_to_completion();
//! println!("{} of {} requests admitted", result.successful_requests, result.total_requests);
//! # Ok::<(), tiersim_engine::SimulationError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod balancer;
pub mod bridge;
pub mod config;
pub mod engine;
pub mod error;
pub mod failure;
pub mod migration;
pub mod network;
pub mod redundancy;
pub mod registry;
pub mod rng;
pub mod runner;
pub mod state;
pub mod types;
pub mod workload;

// ============================================================================
// Public exports - Orchestration
// ============================================================================

// Engine and background runner
pub use engine::{SimulationEngine, SimulationResult, TickPlan, TickReport};
pub use runner::SimulationRunner;

// Configuration
pub use config::SimulationConfig;

// Error handling
pub use error::{BridgeError, Result, SimulationError};

// ============================================================================
// Public exports - Model
// ============================================================================

// Node registry
pub use registry::{FailureType, NodeId, NodeMetrics, Tier};

// State and records
pub use state::{LoadDistribution, PerformanceSummary, SimulationState, load_balance_index};
pub use types::{FailureScenario, MigrationEvent, ResourceDemand, ServiceRequest};

// Randomness
pub use rng::{RandomSource, ScriptedRandom, SeededRandom};

// ============================================================================
// Public exports - Policies
// ============================================================================

pub use balancer::{AdmissionOutcome, LoadBalancer, LoadBalancingStrategy, RejectionReason};
pub use failure::{FailureInjector, FailureInjectorConfig, FailureProfile, FailureStatistics};
pub use migration::{AdaptiveMigrationEngine, MigrationConfig, MigrationDecision, MigrationStatistics};
pub use network::{NetworkConfig, NetworkDelaySimulator};
pub use redundancy::{
    ConsistencyLevel, FailoverEvent, FailoverMode, FailoverOutcome, MultiNodeFailureScenario, RedundancyConfig,
    RedundancyFailoverManager, RedundancyStatistics, RedundancyStrategy, ReplicationGroup, RiskAssessment,
};
pub use workload::{RequestGenerator, WorkloadConfig};

// External bridge
pub use bridge::{BridgeConfig, LoadBalancerBridge, TrafficPattern, TrafficPatternType};
