//! Background tick loop
//!
//! [`SimulationRunner`] drives a [`SimulationEngine`] on a tokio task,
//! pacing ticks with a wall-clock interval. The engine sits behind a
//! `RwLock`; snapshot readers take the read lock and get owned copies, so
//! they never observe a half-committed tick.
//!
//! ## Tick with a bridge
//!
//! ```text
//! write lock: plan_tick, clone state
//! no lock:    bridge.updateNodeMetrics, bridge.selectNode per request
//! write lock: commit_tick(plan, hints)
//! ```
//!
//! Any bridge error leaves the remaining hints empty and the internal
//! strategy places those requests.

use crate::balancer::LoadBalancingStrategy;
use crate::bridge::{LoadBalancerBridge, TrafficPattern};
use crate::config::SimulationConfig;
use crate::engine::{SimulationEngine, SimulationResult, TickPlan};
use crate::error::{BridgeError, Result, SimulationError};
use crate::redundancy::{FailoverMode, FailoverOutcome, RedundancyStrategy, RiskAssessment};
use crate::registry::{FailureType, NodeId};
use crate::state::{PerformanceSummary, SimulationState};
use futures::Stream;
use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Runs a simulation in the background
pub struct SimulationRunner {
    engine: Arc<RwLock<SimulationEngine>>,
    bridge: Option<Arc<LoadBalancerBridge>>,
    tick_interval: Duration,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl SimulationRunner {
    /// Build a runner from configuration
    ///
    /// The bridge is created only when `bridge_enabled` is set.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        let bridge = config
            .bridge_enabled
            .then(|| LoadBalancerBridge::from_config(&config.bridge));
        let engine = SimulationEngine::new(config)?;
        Ok(Self::with_engine(engine, bridge))
    }

    /// Build a runner around an existing engine
    pub fn with_engine(engine: SimulationEngine, bridge: Option<LoadBalancerBridge>) -> Self {
        let tick_interval = engine.config().tick_interval;
        Self {
            engine: Arc::new(RwLock::new(engine)),
            bridge: bridge.map(Arc::new),
            tick_interval,
            cancel: CancellationToken::new(),
            handle: None,
        }
    }

    /// Spawn the tick loop
    pub fn start(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Err(SimulationError::AlreadyRunning);
        }
        info!("🚀 Starting simulation (tick interval {:?})", self.tick_interval);
        self.handle = Some(tokio::spawn(run_loop(
            self.engine.clone(),
            self.bridge.clone(),
            self.cancel.clone(),
            self.tick_interval,
        )));
        Ok(())
    }

    /// Whether the loop is still ticking
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Cancel the loop and collect the result
    ///
    /// A tick in progress is committed before the loop exits.
    pub async fn stop(&mut self) -> Result<SimulationResult> {
        let handle = self.handle.take().ok_or(SimulationError::NotRunning)?;
        info!("🛑 Stopping simulation");
        self.cancel.cancel();
        handle
            .await
            .map_err(|e| SimulationError::runtime(format!("tick loop panicked: {}", e)))?;
        self.shutdown_bridge().await;
        Ok(self.engine.read().await.result())
    }

    /// Wait for the configured duration to elapse and collect the result
    pub async fn wait(&mut self) -> Result<SimulationResult> {
        let handle = self.handle.take().ok_or(SimulationError::NotRunning)?;
        handle
            .await
            .map_err(|e| SimulationError::runtime(format!("tick loop panicked: {}", e)))?;
        self.shutdown_bridge().await;
        Ok(self.engine.read().await.result())
    }

    async fn shutdown_bridge(&self) {
        if let Some(bridge) = self.bridge.as_ref().filter(|b| b.is_available()) {
            if let Err(e) = bridge.shutdown().await {
                warn!("Bridge shutdown failed: {}", e);
            }
        }
    }

    /// Shared handle to the engine
    pub fn engine(&self) -> Arc<RwLock<SimulationEngine>> {
        self.engine.clone()
    }

    /// Owned snapshot of the state
    pub async fn current_state(&self) -> SimulationState {
        self.engine.read().await.current_state()
    }

    /// Compact snapshot for dashboards
    pub async fn performance_summary(&self) -> PerformanceSummary {
        self.engine.read().await.performance_summary()
    }

    /// Stream of summaries every `interval` until the run ends or is stopped
    pub fn snapshot_stream(&self, interval: Duration) -> Pin<Box<dyn Stream<Item = PerformanceSummary> + Send>> {
        let engine = self.engine.clone();
        let cancel = self.cancel.clone();
        let period = interval.max(Duration::from_millis(1));

        Box::pin(async_stream::stream! {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let (summary, finished) = {
                    let engine = engine.read().await;
                    (engine.performance_summary(), engine.is_finished())
                };
                yield summary;
                if finished {
                    break;
                }
            }
        })
    }

    /// Switch strategy locally and on the bridge
    pub async fn set_strategy(&self, strategy: LoadBalancingStrategy) {
        self.engine.write().await.set_strategy(strategy);
        if let Some(bridge) = self.bridge.as_ref().filter(|b| b.is_available()) {
            if let Err(e) = bridge.set_strategy(strategy).await {
                warn!("Bridge did not take strategy {}: {}", strategy, e);
            }
        }
    }

    /// Replace weighted-round-robin weights
    pub async fn update_node_weights(&self, weights: &BTreeMap<NodeId, f64>) {
        self.engine.write().await.update_node_weights(weights);
    }

    /// Configure redundancy from externally computed risk
    pub async fn configure_redundancy(&self, risks: &[RiskAssessment]) -> BTreeMap<NodeId, RedundancyStrategy> {
        self.engine.write().await.configure_redundancy(risks)
    }

    /// Fail over a node immediately
    pub async fn trigger_failover(&self, node: NodeId, mode: FailoverMode) -> FailoverOutcome {
        self.engine.write().await.failover(node, mode)
    }

    /// Schedule a failure window
    pub async fn inject_failure(
        &self,
        node: NodeId,
        failure_type: FailureType,
        duration: f64,
        severity: f64,
        start_time: f64,
    ) {
        self.engine
            .write()
            .await
            .inject_failure(node, failure_type, duration, severity, start_time);
    }

    /// Report a traffic change to the bridge
    pub async fn notify_traffic_fluctuation(&self, pattern: &TrafficPattern) -> std::result::Result<(), BridgeError> {
        match &self.bridge {
            Some(bridge) => bridge.handle_traffic_fluctuation(pattern).await,
            None => Err(BridgeError::Unavailable),
        }
    }
}

impl Drop for SimulationRunner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_loop(
    engine: Arc<RwLock<SimulationEngine>>,
    bridge: Option<Arc<LoadBalancerBridge>>,
    cancel: CancellationToken,
    tick_interval: Duration,
) {
    if let Some(bridge) = &bridge {
        match bridge.ping().await {
            Ok(()) => {
                info!("🔌 Load-balancer bridge connected");
                let strategy = engine.read().await.strategy();
                if let Err(e) = bridge.set_strategy(strategy).await {
                    warn!("Bridge did not take strategy {}: {}", strategy, e);
                }
            }
            Err(e) => {
                warn!("Bridge ping failed ({}), falling back to internal strategy", e);
                bridge.mark_unavailable();
            }
        }
    }

    let mut ticker = (!tick_interval.is_zero()).then(|| {
        let mut ticker = tokio::time::interval(tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });

    loop {
        if engine.read().await.is_finished() {
            info!("✅ Simulation finished");
            break;
        }

        match ticker.as_mut() {
            Some(ticker) => {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
            }
            None => {
                if cancel.is_cancelled() {
                    break;
                }
                tokio::task::yield_now().await;
            }
        }

        let active_bridge = bridge.as_ref().filter(|b| b.is_available());
        let (plan, snapshot) = {
            let mut engine = engine.write().await;
            let plan = engine.plan_tick();
            let snapshot = active_bridge.map(|_| engine.current_state());
            (plan, snapshot)
        };

        let hints = match (active_bridge, snapshot) {
            (Some(bridge), Some(state)) => external_hints(bridge, &state, &plan).await,
            _ => Vec::new(),
        };

        let report = engine.write().await.commit_tick(plan, hints);
        debug!(
            tick = report.tick,
            admitted = report.admitted,
            rejected = report.rejected,
            "Tick done"
        );
    }
}

/// Ask the bridge for a node per request; stops at the first error
async fn external_hints(bridge: &LoadBalancerBridge, state: &SimulationState, plan: &TickPlan) -> Vec<Option<NodeId>> {
    let mut hints = Vec::with_capacity(plan.requests.len());
    if let Err(e) = bridge.update_node_metrics(state).await {
        debug!("Skipping bridge placement: {}", e);
        return hints;
    }

    for request in &plan.requests {
        match bridge.select_node(request).await {
            Ok(node) => hints.push(Some(node)),
            Err(e) => {
                debug!("Bridge placement of {} failed: {}", request.id, e);
                break;
            }
        }
    }
    hints
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::tests::FakeTransport;
    use crate::bridge::{BridgeResponse, TrafficPatternType};
    use futures::StreamExt;
    use serde_json::json;

    fn fast_config() -> SimulationConfig {
        SimulationConfig::default()
            .with_tick_interval(Duration::ZERO)
            .with_duration(50.0)
            .with_seed(11)
    }

    #[tokio::test]
    async fn test_runs_to_completion() {
        let mut runner = SimulationRunner::new(fast_config()).unwrap();
        runner.start().unwrap();
        let result = runner.wait().await.unwrap();

        assert_eq!(result.simulation_duration, 50.0);
        assert_eq!(result.load_balance_index_history.len(), 50);
        assert!(!runner.is_running());
    }

    #[tokio::test]
    async fn test_start_twice_and_stop_without_start() {
        let mut runner = SimulationRunner::new(fast_config()).unwrap();
        assert!(matches!(runner.stop().await, Err(SimulationError::NotRunning)));

        runner.start().unwrap();
        assert!(matches!(runner.start(), Err(SimulationError::AlreadyRunning)));
        runner.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_mid_run() {
        let config = fast_config()
            .with_duration(100_000.0)
            .with_tick_interval(Duration::from_millis(1));
        let mut runner = SimulationRunner::new(config).unwrap();
        runner.start().unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let result = runner.stop().await.unwrap();
        assert!(result.simulation_duration < 100_000.0);
        let state = runner.current_state().await;
        assert!(state.check_invariants().is_ok());
        assert_eq!(state.current_time, result.simulation_duration);
    }

    #[tokio::test]
    async fn test_snapshot_stream_ends_with_run() {
        let mut runner = SimulationRunner::new(fast_config()).unwrap();
        let stream = runner.snapshot_stream(Duration::from_millis(1));
        runner.start().unwrap();

        let summaries: Vec<PerformanceSummary> = stream.collect().await;
        assert!(!summaries.is_empty());
        let last = summaries.last().unwrap();
        assert_eq!(last.current_time, 50.0);
        assert_eq!(last.active_node_count + last.failed_node_count, 5);
        runner.wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_bridge_hints_place_requests() {
        let transport = FakeTransport::default();
        transport.always_select(NodeId::Cloud1);
        let config = fast_config()
            .with_duration(5.0)
            .with_request_rate(50.0)
            .with_failure_injection(false)
            .with_adaptive_migration(false);
        let engine = SimulationEngine::new(config).unwrap();
        let mut runner = SimulationRunner::with_engine(engine, Some(LoadBalancerBridge::new(transport.clone())));

        runner.start().unwrap();
        let result = runner.wait().await.unwrap();
        let placed: Vec<NodeId> = result.final_state.service_allocations.values().copied().collect();
        assert!(!placed.is_empty(), "bridge placements should be admitted");
        assert!(placed.iter().all(|n| *n == NodeId::Cloud1));

        let actions = transport.actions();
        assert_eq!(&actions[..3], &["ping", "setStrategy", "updateNodeMetrics"]);
        assert_eq!(actions.last().map(String::as_str), Some("shutdown"));
    }

    #[tokio::test]
    async fn test_unreachable_bridge_falls_back() {
        let transport = FakeTransport::default();
        transport.push(Err(BridgeError::Timeout(Duration::from_secs(30))));
        let config = fast_config().with_duration(10.0).with_failure_injection(false);
        let engine = SimulationEngine::new(config).unwrap();
        let mut runner = SimulationRunner::with_engine(engine, Some(LoadBalancerBridge::new(transport.clone())));

        runner.start().unwrap();
        let result = runner.wait().await.unwrap();
        assert!(result.total_requests > 0);
        assert_eq!(transport.actions(), vec!["ping"], "no calls after the failed ping");

        let pattern = TrafficPattern {
            pattern_type: TrafficPatternType::Burst,
            intensity: 1.5,
            duration: 10.0,
            start_time: 0.0,
        };
        assert!(matches!(
            runner.notify_traffic_fluctuation(&pattern).await,
            Err(BridgeError::Unavailable)
        ));
    }

    #[tokio::test]
    async fn test_control_calls_reach_engine() {
        let transport = FakeTransport::default();
        transport.push(Ok(BridgeResponse::failure("unsupported")));
        let engine = SimulationEngine::new(fast_config()).unwrap();
        let runner = SimulationRunner::with_engine(engine, Some(LoadBalancerBridge::new(transport.clone())));

        runner.set_strategy(LoadBalancingStrategy::WeightedRoundRobin).await;
        assert_eq!(
            runner.engine().read().await.strategy(),
            LoadBalancingStrategy::WeightedRoundRobin
        );
        assert_eq!(transport.actions(), vec!["setStrategy"]);

        let strategies = runner
            .configure_redundancy(&[RiskAssessment::new(NodeId::Cloud1, 0.8, FailureType::Omission)])
            .await;
        assert_eq!(strategies[&NodeId::Cloud1], RedundancyStrategy::ActivePassive);

        // EDGE2 shares CLOUD1's failure type, so it is never one of its replicas
        runner
            .inject_failure(NodeId::Edge2, FailureType::Omission, 20.0, 0.5, 0.0)
            .await;
        assert_eq!(runner.performance_summary().await.failed_node_count, 1);

        let outcome = runner.trigger_failover(NodeId::Edge2, FailoverMode::Manual).await;
        assert!(matches!(outcome, FailoverOutcome::NotApplicable { .. }));
    }
}
