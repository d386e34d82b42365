//! Error types for the simulation engine
//!
//! Policy outcomes (rejected admissions, failed migrations, failed failovers)
//! are recorded values, not errors. The variants here cover configuration,
//! lookup and runtime plumbing only.

use std::time::Duration;
use thiserror::Error;

/// Simulation result type
pub type Result<T> = std::result::Result<T, SimulationError>;

/// Errors that can occur while configuring or driving a simulation
#[derive(Error, Debug)]
pub enum SimulationError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Node identifier not present in the registry
    #[error("Unknown node: {0}")]
    UnknownNode(String),

    /// Load-balancing strategy name not recognised
    #[error("Unknown load-balancing strategy: {0}")]
    UnknownStrategy(String),

    /// A state invariant was violated at a tick boundary
    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    /// The runner was started twice
    #[error("Simulation is already running")]
    AlreadyRunning,

    /// A control call needed a running simulation
    #[error("Simulation is not running")]
    NotRunning,

    /// The background tick task failed
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// External load-balancer bridge error
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SimulationError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invariant violation error
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    /// Create a runtime error
    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::Runtime(msg.into())
    }
}

/// Errors raised by the out-of-process load-balancer bridge
///
/// Every one of these is soft: callers log it and fall back to the
/// internal strategy.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Bridge disabled or marked unavailable after an earlier failure
    #[error("Bridge unavailable")]
    Unavailable,

    /// The bridge process did not answer in time
    #[error("Bridge call timed out after {0:?}")]
    Timeout(Duration),

    /// The bridge process exited with a non-zero status
    #[error("Bridge process exited with status {0}")]
    ExitStatus(i32),

    /// The response could not be parsed or lacked a required field
    #[error("Malformed bridge response: {0}")]
    Malformed(String),

    /// The bridge answered `{"success": false, "error": ...}`
    #[error("Bridge rejected request: {0}")]
    Rejected(String),

    /// Spawning or talking to the process failed
    #[error("Bridge IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Create a malformed-response error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::Malformed(msg.into())
    }
}
