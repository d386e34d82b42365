//! Core records shared by the policy modules

use crate::registry::{FailureType, NodeId};
use serde::{Deserialize, Serialize};

/// Resource footprint of a service
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceDemand {
    /// CPU (%)
    pub cpu: f64,

    /// Memory (GB)
    pub memory_gb: f64,

    /// Transactions per second
    pub transactions: u32,
}

impl ResourceDemand {
    /// Create a demand record
    pub fn new(cpu: f64, memory_gb: f64, transactions: u32) -> Self {
        Self {
            cpu,
            memory_gb,
            transactions,
        }
    }
}

/// A unit of demand generated once and consumed by admission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRequest {
    /// Unique service identifier
    pub id: String,

    /// Required resources
    pub demand: ResourceDemand,

    /// Priority (1-10, higher is more important)
    pub priority: u8,

    /// Simulation time of creation (seconds)
    pub created_at: f64,
}

impl ServiceRequest {
    /// Create a request
    pub fn new(id: impl Into<String>, demand: ResourceDemand, priority: u8, created_at: f64) -> Self {
        Self {
            id: id.into(),
            demand,
            priority: priority.clamp(1, 10),
            created_at,
        }
    }
}

/// A failure window on one node
///
/// Active while `start_time <= now < start_time + duration`; the engine
/// stamps `recovery_time` once when the window closes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureScenario {
    /// Failed node
    pub node: NodeId,

    /// Failure classification
    pub failure_type: FailureType,

    /// Simulation time the failure begins (seconds)
    pub start_time: f64,

    /// Outage length (seconds)
    pub duration: f64,

    /// Severity in `[0, 1]`
    pub severity: f64,

    /// Simulation time the node left the failed window
    pub recovery_time: Option<f64>,
}

impl FailureScenario {
    /// Create an open failure window
    pub fn new(
        node: NodeId,
        failure_type: FailureType,
        start_time: f64,
        duration: f64,
        severity: f64,
    ) -> Self {
        Self {
            node,
            failure_type,
            start_time,
            duration,
            severity: severity.clamp(0.0, 1.0),
            recovery_time: None,
        }
    }

    /// End of the failure window
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }

    /// Whether the window covers `now`
    pub fn is_active_at(&self, now: f64) -> bool {
        self.start_time <= now && now < self.end_time()
    }

    /// Whether the window has ended by `now`
    pub fn has_expired(&self, now: f64) -> bool {
        now >= self.end_time()
    }
}

/// One migration attempt, successful or not
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationEvent {
    /// Service being moved
    pub service_id: String,

    /// Node the service was on
    pub source: NodeId,

    /// Node the service was moved to (or would have been)
    pub destination: NodeId,

    /// Simulation time the attempt started (seconds)
    pub start_time: f64,

    /// Simulation time the move completes (successful attempts only)
    pub completion_time: Option<f64>,

    /// Whether the move succeeded
    pub success: bool,

    /// Why the migration was attempted
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_window_is_half_open() {
        let failure = FailureScenario::new(NodeId::Edge1, FailureType::Crash, 10.0, 10.0, 0.8);
        assert!(!failure.is_active_at(9.9));
        assert!(failure.is_active_at(10.0));
        assert!(failure.is_active_at(19.9));
        assert!(!failure.is_active_at(20.0));
        assert!(failure.has_expired(20.0));
    }

    #[test]
    fn test_request_priority_clamped() {
        let req = ServiceRequest::new("svc", ResourceDemand::new(10.0, 1.0, 2), 42, 0.0);
        assert_eq!(req.priority, 10);
    }

    #[test]
    fn test_severity_clamped() {
        let failure = FailureScenario::new(NodeId::Core1, FailureType::Byzantine, 0.0, 5.0, 1.7);
        assert_eq!(failure.severity, 1.0);
    }
}
