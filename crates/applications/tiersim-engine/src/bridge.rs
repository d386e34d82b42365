//! External load-balancer bridge
//!
//! Lets an out-of-process load balancer choose nodes in place of the
//! internal strategies. Each call is one JSON request/response exchange:
//!
//! ```json
//! {"action": "selectNode", "data": {"serviceId": "service_3_0", "cpuRequirement": 12.5, ...}}
//! ```
//!
//! ```json
//! {"success": true, "selectedNode": "CORE1"}
//! {"success": false, "error": "no nodes registered"}
//! ```
//!
//! The default transport spawns the configured program with `--stdin`,
//! writes the request and reads the response from stdout.
//!
//! ## Degradation
//!
//! Bridge errors are never fatal. A transport failure (spawn error,
//! timeout, non-zero exit, unparseable output) marks the bridge
//! unavailable and later calls fail fast with [`BridgeError::Unavailable`]
//! until a [`ping`](LoadBalancerBridge::ping) succeeds. Callers fall back to
//! the internal strategy.

use crate::balancer::LoadBalancingStrategy;
use crate::error::BridgeError;
use crate::registry::NodeId;
use crate::state::SimulationState;
use crate::types::ServiceRequest;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Default time allowed for one bridge call
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// How to launch the bridge process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Executable
    pub program: String,

    /// Arguments placed before `--stdin`
    pub args: Vec<String>,

    /// Time allowed per call
    #[serde(with = "crate::config::duration_millis")]
    pub timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            program: "node".to_string(),
            args: vec!["load-balancer-bridge.js".to_string()],
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl BridgeConfig {
    /// Build from a shell-style command line (`program arg1 arg2`)
    pub fn from_command_line(command: &str) -> Option<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
            ..Default::default()
        })
    }

    /// Set the per-call timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Bridge actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeAction {
    /// Push current node metrics
    UpdateNodeMetrics,
    /// Choose a node for one request
    SelectNode,
    /// Switch the bridge's strategy
    SetStrategy,
    /// Fetch the bridge's load picture
    GetMetrics,
    /// Report a traffic change
    HandleTrafficFluctuation,
    /// Liveness check
    Ping,
    /// Fetch bridge status
    GetStatus,
    /// Stop the bridge
    Shutdown,
}

impl BridgeAction {
    /// Name on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            BridgeAction::UpdateNodeMetrics => "updateNodeMetrics",
            BridgeAction::SelectNode => "selectNode",
            BridgeAction::SetStrategy => "setStrategy",
            BridgeAction::GetMetrics => "getMetrics",
            BridgeAction::HandleTrafficFluctuation => "handleTrafficFluctuation",
            BridgeAction::Ping => "ping",
            BridgeAction::GetStatus => "getStatus",
            BridgeAction::Shutdown => "shutdown",
        }
    }
}

/// One request on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeRequest {
    /// camelCase action name
    pub action: String,

    /// Action payload
    #[serde(default)]
    pub data: Value,
}

/// One response on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeResponse {
    /// Whether the action succeeded
    pub success: bool,

    /// Failure description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Remaining top-level fields
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl BridgeResponse {
    /// Successful response carrying `payload`
    pub fn ok(payload: Map<String, Value>) -> Self {
        Self {
            success: true,
            error: None,
            payload,
        }
    }

    /// Failed response
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            payload: Map::new(),
        }
    }

    fn into_result(self) -> Result<Self, BridgeError> {
        if self.success {
            Ok(self)
        } else {
            Err(BridgeError::Rejected(
                self.error.unwrap_or_else(|| "unspecified error".to_string()),
            ))
        }
    }

    fn field<T: DeserializeOwned>(&self, key: &str) -> Result<T, BridgeError> {
        let value = self
            .payload
            .get(key)
            .cloned()
            .ok_or_else(|| BridgeError::malformed(format!("missing field `{}`", key)))?;
        serde_json::from_value(value).map_err(|e| BridgeError::malformed(format!("field `{}`: {}", key, e)))
    }
}

/// Node metrics as the bridge expects them
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireNodeMetrics {
    /// Latency (ms)
    pub latency: f64,
    /// Throughput (Mbps)
    pub throughput: f64,
    /// Packet loss (%)
    pub packet_loss: f64,
    /// CPU in use (%)
    pub cpu_utilization: f64,
    /// Memory in use (GB)
    pub memory_usage: f64,
    /// Transactions in use (tx/s)
    pub transactions_per_sec: u32,
    /// Lock contention (%)
    pub lock_contention: f64,
    /// Simulation time of the sample (seconds)
    pub timestamp: f64,
}

impl WireNodeMetrics {
    /// Current metrics of `node`
    pub fn from_state(state: &SimulationState, node: NodeId) -> Self {
        let metrics = state.metrics(node);
        let load = state.load(node);
        Self {
            latency: metrics.latency_ms,
            throughput: metrics.throughput_mbps,
            packet_loss: metrics.packet_loss_pct,
            cpu_utilization: load.cpu,
            memory_usage: load.memory_gb,
            transactions_per_sec: load.transactions,
            lock_contention: metrics.lock_contention_pct,
            timestamp: state.current_time,
        }
    }
}

/// Service request as the bridge expects it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireServiceRequest {
    /// Service id
    pub service_id: String,
    /// CPU (%)
    pub cpu_requirement: f64,
    /// Memory (GB)
    pub memory_requirement: f64,
    /// Transactions (tx/s)
    pub transaction_load: u32,
    /// Priority 1-10
    pub priority: u8,
    /// Creation time (seconds)
    pub timestamp: f64,
}

impl From<&ServiceRequest> for WireServiceRequest {
    fn from(request: &ServiceRequest) -> Self {
        Self {
            service_id: request.id.clone(),
            cpu_requirement: request.demand.cpu,
            memory_requirement: request.demand.memory_gb,
            transaction_load: request.demand.transactions,
            priority: request.priority,
            timestamp: request.created_at,
        }
    }
}

/// Shape of a traffic change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrafficPatternType {
    /// Sudden spike
    Burst,
    /// Sustained level
    Steady,
    /// Falling off
    Declining,
}

/// Traffic change reported to the bridge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficPattern {
    /// Kind of change
    pub pattern_type: TrafficPatternType,
    /// Relative intensity
    pub intensity: f64,
    /// Length (seconds)
    pub duration: f64,
    /// Simulation time it starts (seconds)
    pub start_time: f64,
}

/// Load picture reported by the bridge
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeMetrics {
    /// Load per node as the bridge sees it
    #[serde(default)]
    pub node_loads: BTreeMap<NodeId, f64>,
    /// Bridge-side balance index
    #[serde(default)]
    pub load_balance_index: f64,
    /// Requests routed by the bridge
    #[serde(default)]
    pub total_requests: u64,
}

/// Bridge self-description
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeStatus {
    /// Whether the bridge has node metrics
    #[serde(default)]
    pub initialized: bool,
    /// Active strategy name
    #[serde(default)]
    pub strategy: Option<String>,
    /// Nodes known to the bridge
    #[serde(default)]
    pub node_count: usize,
}

/// Moves one request to the bridge and back
pub trait BridgeTransport: Send + Sync {
    /// Perform one exchange
    fn call<'a>(&'a self, request: &'a BridgeRequest) -> BoxFuture<'a, Result<BridgeResponse, BridgeError>>;
}

/// Spawns the bridge program once per call
#[derive(Debug, Clone)]
pub struct ProcessTransport {
    config: BridgeConfig,
}

impl ProcessTransport {
    /// Create a transport for the given program
    pub fn new(config: BridgeConfig) -> Self {
        Self { config }
    }

    async fn exchange(&self, request: &BridgeRequest) -> Result<BridgeResponse, BridgeError> {
        let mut payload = serde_json::to_vec(request).map_err(|e| BridgeError::malformed(e.to_string()))?;
        payload.push(b'\n');

        let mut child = Command::new(&self.config.program)
            .args(&self.config.args)
            .arg("--stdin")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            // The process may answer and exit without reading everything
            if let Err(e) = stdin.write_all(&payload).await {
                if e.kind() != std::io::ErrorKind::BrokenPipe {
                    return Err(e.into());
                }
            }
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(BridgeError::ExitStatus(output.status.code().unwrap_or(-1)));
        }
        if output.stdout.iter().all(u8::is_ascii_whitespace) {
            return Err(BridgeError::malformed("empty response"));
        }
        serde_json::from_slice(&output.stdout).map_err(|e| BridgeError::malformed(e.to_string()))
    }
}

impl BridgeTransport for ProcessTransport {
    fn call<'a>(&'a self, request: &'a BridgeRequest) -> BoxFuture<'a, Result<BridgeResponse, BridgeError>> {
        Box::pin(async move {
            tokio::time::timeout(self.config.timeout, self.exchange(request))
                .await
                .map_err(|_| BridgeError::Timeout(self.config.timeout))?
        })
    }
}

/// Client for the external load balancer
pub struct LoadBalancerBridge {
    transport: Box<dyn BridgeTransport>,
    available: AtomicBool,
}

impl LoadBalancerBridge {
    /// Create a bridge over any transport
    pub fn new(transport: impl BridgeTransport + 'static) -> Self {
        Self {
            transport: Box::new(transport),
            available: AtomicBool::new(true),
        }
    }

    /// Create a bridge that spawns the configured process
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self::new(ProcessTransport::new(config.clone()))
    }

    /// Whether calls are currently attempted
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Stop attempting calls until the next successful ping
    pub fn mark_unavailable(&self) {
        if self.available.swap(false, Ordering::SeqCst) {
            warn!("⚠️  Load-balancer bridge unavailable, using internal strategy");
        }
    }

    async fn send(&self, action: BridgeAction, data: Value) -> Result<BridgeResponse, BridgeError> {
        let request = BridgeRequest {
            action: action.as_str().to_string(),
            data,
        };
        match self.transport.call(&request).await {
            Ok(response) => response.into_result(),
            Err(e) => {
                warn!("Bridge {} failed: {}", action.as_str(), e);
                self.mark_unavailable();
                Err(e)
            }
        }
    }

    async fn request(&self, action: BridgeAction, data: Value) -> Result<BridgeResponse, BridgeError> {
        if !self.is_available() {
            return Err(BridgeError::Unavailable);
        }
        self.send(action, data).await
    }

    /// Liveness check; a success makes the bridge available again
    pub async fn ping(&self) -> Result<(), BridgeError> {
        self.send(BridgeAction::Ping, json!({})).await?;
        if !self.available.swap(true, Ordering::SeqCst) {
            info!("🔌 Load-balancer bridge available again");
        }
        Ok(())
    }

    /// Push every node's current metrics
    pub async fn update_node_metrics(&self, state: &SimulationState) -> Result<(), BridgeError> {
        let metrics: BTreeMap<NodeId, WireNodeMetrics> = NodeId::ALL
            .into_iter()
            .map(|n| (n, WireNodeMetrics::from_state(state, n)))
            .collect();
        self.request(BridgeAction::UpdateNodeMetrics, json!({ "nodeMetrics": metrics }))
            .await
            .map(|_| ())
    }

    /// Ask the bridge to place one request
    pub async fn select_node(&self, request: &ServiceRequest) -> Result<NodeId, BridgeError> {
        let wire = serde_json::to_value(WireServiceRequest::from(request))
            .map_err(|e| BridgeError::malformed(e.to_string()))?;
        let response = self.request(BridgeAction::SelectNode, wire).await?;
        let name: String = response.field("selectedNode")?;
        let node = name
            .parse::<NodeId>()
            .map_err(|_| BridgeError::malformed(format!("unknown node `{}`", name)))?;
        debug!("Bridge placed {} on {}", request.id, node);
        Ok(node)
    }

    /// Switch the bridge's strategy
    pub async fn set_strategy(&self, strategy: LoadBalancingStrategy) -> Result<(), BridgeError> {
        self.request(BridgeAction::SetStrategy, json!({ "strategy": strategy.wire_name() }))
            .await
            .map(|_| ())
    }

    /// Fetch the bridge's load picture
    pub async fn get_metrics(&self) -> Result<BridgeMetrics, BridgeError> {
        self.request(BridgeAction::GetMetrics, json!({}))
            .await?
            .field("metrics")
    }

    /// Report a traffic change
    pub async fn handle_traffic_fluctuation(&self, pattern: &TrafficPattern) -> Result<(), BridgeError> {
        let data = serde_json::to_value(pattern).map_err(|e| BridgeError::malformed(e.to_string()))?;
        self.request(BridgeAction::HandleTrafficFluctuation, data)
            .await
            .map(|_| ())
    }

    /// Fetch bridge status
    pub async fn get_status(&self) -> Result<BridgeStatus, BridgeError> {
        self.request(BridgeAction::GetStatus, json!({}))
            .await?
            .field("status")
    }

    /// Stop the bridge; no further calls are attempted
    pub async fn shutdown(&self) -> Result<(), BridgeError> {
        let result = self.request(BridgeAction::Shutdown, json!({})).await.map(|_| ());
        self.available.store(false, Ordering::SeqCst);
        result
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    /// Replays canned responses and records requests
    #[derive(Clone, Default)]
    pub(crate) struct FakeTransport {
        pub requests: Arc<Mutex<Vec<BridgeRequest>>>,
        pub responses: Arc<Mutex<VecDeque<Result<BridgeResponse, BridgeError>>>>,
        /// Answer every `selectNode` with this node instead of the queue
        pub selection: Arc<Mutex<Option<NodeId>>>,
    }

    impl FakeTransport {
        pub fn push(&self, response: Result<BridgeResponse, BridgeError>) {
            self.responses.lock().unwrap().push_back(response);
        }

        pub fn push_ok(&self, payload: Value) {
            let map = match payload {
                Value::Object(map) => map,
                _ => Map::new(),
            };
            self.push(Ok(BridgeResponse::ok(map)));
        }

        pub fn always_select(&self, node: NodeId) {
            *self.selection.lock().unwrap() = Some(node);
        }

        pub fn actions(&self) -> Vec<String> {
            self.requests.lock().unwrap().iter().map(|r| r.action.clone()).collect()
        }
    }

    impl BridgeTransport for FakeTransport {
        fn call<'a>(&'a self, request: &'a BridgeRequest) -> BoxFuture<'a, Result<BridgeResponse, BridgeError>> {
            self.requests.lock().unwrap().push(request.clone());
            let selection = *self.selection.lock().unwrap();
            if let (Some(node), "selectNode") = (selection, request.action.as_str()) {
                let mut payload = Map::new();
                payload.insert("selectedNode".to_string(), json!(node));
                return Box::pin(async move { Ok(BridgeResponse::ok(payload)) });
            }
            let response = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(BridgeResponse::ok(Map::new())));
            Box::pin(async move { response })
        }
    }

    fn request() -> ServiceRequest {
        ServiceRequest::new("service_1_0", crate::types::ResourceDemand::new(12.5, 1.5, 4), 7, 1.0)
    }

    #[test]
    fn test_wire_format() {
        let wire = serde_json::to_value(WireServiceRequest::from(&request())).unwrap();
        assert_eq!(wire["serviceId"], "service_1_0");
        assert_eq!(wire["cpuRequirement"], 12.5);
        assert_eq!(wire["transactionLoad"], 4);

        let response: BridgeResponse = serde_json::from_str(r#"{"success": true, "selectedNode": "CORE1"}"#).unwrap();
        assert!(response.success);
        assert_eq!(response.payload["selectedNode"], "CORE1");

        let pattern = TrafficPattern {
            pattern_type: TrafficPatternType::Burst,
            intensity: 2.0,
            duration: 30.0,
            start_time: 10.0,
        };
        let json = serde_json::to_value(&pattern).unwrap();
        assert_eq!(json["patternType"], "BURST");
        assert_eq!(json["startTime"], 10.0);
    }

    #[tokio::test]
    async fn test_select_node() {
        let transport = FakeTransport::default();
        transport.push_ok(json!({ "selectedNode": "CORE1" }));
        let bridge = LoadBalancerBridge::new(transport.clone());

        let node = bridge.select_node(&request()).await.unwrap();
        assert_eq!(node, NodeId::Core1);
        assert_eq!(transport.actions(), vec!["selectNode"]);
        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests[0].data["priority"], 7);
    }

    #[tokio::test]
    async fn test_rejection_keeps_bridge_available() {
        let transport = FakeTransport::default();
        transport.push(Ok(BridgeResponse::failure("no nodes registered")));
        let bridge = LoadBalancerBridge::new(transport);

        let err = bridge.select_node(&request()).await.unwrap_err();
        assert!(matches!(err, BridgeError::Rejected(ref msg) if msg == "no nodes registered"));
        assert!(bridge.is_available());
    }

    #[tokio::test]
    async fn test_malformed_answer() {
        let transport = FakeTransport::default();
        transport.push_ok(json!({ "selectedNode": "NODE9" }));
        transport.push_ok(json!({}));
        let bridge = LoadBalancerBridge::new(transport);

        assert!(matches!(bridge.select_node(&request()).await, Err(BridgeError::Malformed(_))));
        assert!(matches!(bridge.select_node(&request()).await, Err(BridgeError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_transport_failure_degrades_until_ping() {
        let transport = FakeTransport::default();
        transport.push(Err(BridgeError::Timeout(Duration::from_secs(30))));
        let bridge = LoadBalancerBridge::new(transport.clone());

        assert!(matches!(
            bridge.set_strategy(LoadBalancingStrategy::LeastConnections).await,
            Err(BridgeError::Timeout(_))
        ));
        assert!(!bridge.is_available());

        // Fails fast without touching the transport
        assert!(matches!(bridge.get_status().await, Err(BridgeError::Unavailable)));
        assert_eq!(transport.actions().len(), 1);

        bridge.ping().await.unwrap();
        assert!(bridge.is_available());
        assert_eq!(transport.actions(), vec!["setStrategy", "ping"]);
    }

    #[tokio::test]
    async fn test_metrics_and_status() {
        let transport = FakeTransport::default();
        transport.push_ok(json!({
            "metrics": {"nodeLoads": {"EDGE1": 0.4, "CLOUD1": 0.1}, "loadBalanceIndex": 0.8}
        }));
        transport.push_ok(json!({ "status": {"initialized": true, "strategy": "RESOURCE_AWARE", "nodeCount": 5} }));
        let bridge = LoadBalancerBridge::new(transport.clone());

        let metrics = bridge.get_metrics().await.unwrap();
        assert_eq!(metrics.node_loads[&NodeId::Edge1], 0.4);
        assert_eq!(metrics.load_balance_index, 0.8);
        assert_eq!(metrics.total_requests, 0);

        let status = bridge.get_status().await.unwrap();
        assert!(status.initialized);
        assert_eq!(status.node_count, 5);

        bridge.shutdown().await.unwrap();
        assert!(!bridge.is_available());
        assert_eq!(transport.actions(), vec!["getMetrics", "getStatus", "shutdown"]);
    }

    #[tokio::test]
    async fn test_update_node_metrics_payload() {
        let transport = FakeTransport::default();
        let bridge = LoadBalancerBridge::new(transport.clone());
        let mut state = SimulationState::new(NodeId::ALL.into_iter().map(|n| (n, n.baseline_metrics())).collect());
        state.place_service("svc", NodeId::Core2, crate::types::ResourceDemand::new(20.0, 2.0, 10));

        bridge.update_node_metrics(&state).await.unwrap();
        let requests = transport.requests.lock().unwrap();
        let sent = &requests[0];
        assert_eq!(sent.action, "updateNodeMetrics");
        assert_eq!(sent.data["nodeMetrics"]["CORE2"]["cpuUtilization"], 20.0);
        assert_eq!(sent.data["nodeMetrics"]["EDGE1"]["latency"], 12.0);
    }

    #[test]
    fn test_config_from_command_line() {
        let config = BridgeConfig::from_command_line("node bridge.js --verbose").unwrap();
        assert_eq!(config.program, "node");
        assert_eq!(config.args, vec!["bridge.js", "--verbose"]);
        assert!(BridgeConfig::from_command_line("   ").is_none());
    }

    #[tokio::test]
    async fn test_process_transport_missing_program() {
        let transport = ProcessTransport::new(BridgeConfig {
            program: "/nonexistent/tiersim-bridge".to_string(),
            args: Vec::new(),
            timeout: Duration::from_secs(5),
        });
        let request = BridgeRequest {
            action: "ping".to_string(),
            data: json!({}),
        };
        assert!(matches!(transport.call(&request).await, Err(BridgeError::Io(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_transport_round_trip() {
        let script = r#"read line; echo '{"success": true, "selectedNode": "EDGE2"}'"#;
        let bridge = LoadBalancerBridge::from_config(&BridgeConfig {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            timeout: Duration::from_secs(5),
        });
        assert_eq!(bridge.select_node(&request()).await.unwrap(), NodeId::Edge2);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_transport_exit_status_and_timeout() {
        let failing = ProcessTransport::new(BridgeConfig {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), "exit 3".to_string()],
            timeout: Duration::from_secs(5),
        });
        let request = BridgeRequest {
            action: "ping".to_string(),
            data: json!({}),
        };
        assert!(matches!(failing.call(&request).await, Err(BridgeError::ExitStatus(3))));

        let slow = ProcessTransport::new(BridgeConfig {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), "sleep 5".to_string()],
            timeout: Duration::from_millis(100),
        });
        assert!(matches!(slow.call(&request).await, Err(BridgeError::Timeout(_))));
    }
}
