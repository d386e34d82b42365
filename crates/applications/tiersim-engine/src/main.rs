//! Tiersim - cluster load, failure and recovery simulator
//!
//! ## Usage
//!
//! ```bash
//! # Five-minute run with the default resource-aware strategy
//! tiersim
//!
//! # Unpaced run, weighted round robin, results to JSON
//! tiersim --tick-interval-ms 0 --strategy weighted-round-robin --output results.json
//!
//! # Route placement through the external load balancer
//! tiersim --bridge-command "node load-balancer-bridge.js"
//!
//! # Take two nodes down together and fail them over
//! tiersim --risk-file risks.json multi-failure --nodes 2
//!
//! # Split the cluster and report the isolated side
//! tiersim partition
//! ```

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use serde::Serialize;
use std::fs;
use std::time::Duration;
use tiersim_engine::{
    BridgeConfig, FailoverOutcome, LoadBalancingStrategy, MultiNodeFailureScenario, NodeId, RiskAssessment,
    SimulationConfig, SimulationEngine, SimulationResult, SimulationRunner,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Tiersim: heterogeneous cluster simulation
#[derive(Parser)]
#[command(name = "tiersim")]
#[command(about = "Simulate load balancing, failures and failover on an edge/core/cloud cluster", long_about = None)]
struct Cli {
    /// Simulated duration (seconds)
    #[arg(short, long, global = true, default_value_t = 300.0)]
    duration: f64,

    /// Virtual time per tick (seconds)
    #[arg(long, global = true, default_value_t = 1.0)]
    time_step: f64,

    /// Wall-clock pause between ticks (milliseconds, 0 = unpaced)
    #[arg(long, global = true, default_value_t = 100)]
    tick_interval_ms: u64,

    /// Load-balancing strategy
    #[arg(short, long, global = true, default_value = "resource-aware")]
    strategy: LoadBalancingStrategy,

    /// Random seed
    #[arg(long, global = true, default_value_t = 42)]
    seed: u64,

    /// Mean requests per tick
    #[arg(short, long, global = true)]
    request_rate: Option<f64>,

    /// Disable random failure injection
    #[arg(long, global = true)]
    no_failures: bool,

    /// Ignore network delay in response times
    #[arg(long, global = true)]
    no_network_delay: bool,

    /// Disable adaptive migration
    #[arg(long, global = true)]
    no_migration: bool,

    /// Disable automatic failover
    #[arg(long, global = true)]
    no_failover: bool,

    /// JSON file with risk assessments used to configure redundancy
    #[arg(long, global = true)]
    risk_file: Option<String>,

    /// External load balancer command line (enables the bridge)
    #[arg(long, global = true)]
    bridge_command: Option<String>,

    /// Bridge call timeout (seconds)
    #[arg(long, global = true, default_value_t = tiersim_engine::bridge::DEFAULT_TIMEOUT_SECS)]
    bridge_timeout: u64,

    /// Write the results as JSON to this path
    #[arg(short, long, global = true)]
    output: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full simulation (default)
    Run,

    /// Fail several nodes at once, then recover them in criticality order
    MultiFailure {
        /// Nodes to take down
        #[arg(short, long, default_value_t = 2)]
        nodes: usize,

        /// Also split the network around the failed nodes
        #[arg(long)]
        partition: bool,
    },

    /// Partition the network and report the isolated nodes
    Partition,
}

/// JSON document written by `--output`
#[derive(Serialize)]
struct RunReport<'a> {
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    config: &'a SimulationConfig,
    result: &'a SimulationResult,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tiersim_engine=info,tiersim=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = build_config(&cli)?;
    let risks = match &cli.risk_file {
        Some(path) => load_risks(path)?,
        None => Vec::new(),
    };

    match cli.command.as_ref().unwrap_or(&Commands::Run) {
        Commands::Run => run_simulation(&cli, config, &risks).await,
        Commands::MultiFailure { nodes, partition } => run_multi_failure(config, &risks, *nodes, *partition),
        Commands::Partition => run_partition(config, &risks),
    }
}

fn build_config(cli: &Cli) -> anyhow::Result<SimulationConfig> {
    let mut config = SimulationConfig::default()
        .with_duration(cli.duration)
        .with_time_step(cli.time_step)
        .with_tick_interval(Duration::from_millis(cli.tick_interval_ms))
        .with_strategy(cli.strategy)
        .with_seed(cli.seed)
        .with_failure_injection(!cli.no_failures)
        .with_network_delay(!cli.no_network_delay)
        .with_adaptive_migration(!cli.no_migration)
        .with_automatic_failover(!cli.no_failover);

    if let Some(rate) = cli.request_rate {
        config = config.with_request_rate(rate);
    }
    if let Some(command) = &cli.bridge_command {
        let bridge = BridgeConfig::from_command_line(command)
            .context("--bridge-command must name a program")?
            .with_timeout(Duration::from_secs(cli.bridge_timeout));
        config = config.with_bridge(bridge);
    }

    config.validate()?;
    Ok(config)
}

fn load_risks(path: &str) -> anyhow::Result<Vec<RiskAssessment>> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading risk file {}", path))?;
    let risks: Vec<RiskAssessment> =
        serde_json::from_str(&raw).with_context(|| format!("parsing risk file {}", path))?;
    info!("📋 Loaded {} risk assessments from {}", risks.len(), path);
    Ok(risks)
}

async fn run_simulation(cli: &Cli, config: SimulationConfig, risks: &[RiskAssessment]) -> anyhow::Result<()> {
    print_banner("Tiersim Cluster Simulation");
    print_configuration(&config);

    let started_at = Utc::now();
    let mut runner = SimulationRunner::new(config.clone())?;
    if !risks.is_empty() {
        let strategies = runner.configure_redundancy(risks).await;
        for (node, strategy) in &strategies {
            info!("🛡️  {} protected with {:?}", node, strategy);
        }
    }
    runner.start()?;

    let mut snapshots = runner.snapshot_stream(Duration::from_secs(5));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    loop {
        tokio::select! {
            next = snapshots.next() => match next {
                Some(summary) => info!(
                    "⏱️  t={:.0}s active={} failed={} services={} LBI={:.3}",
                    summary.current_time,
                    summary.active_node_count,
                    summary.failed_node_count,
                    summary.total_services,
                    summary.load_balance_index,
                ),
                None => break,
            },
            _ = &mut ctrl_c => {
                warn!("⚠️  Interrupted, stopping simulation");
                interrupted = true;
                break;
            }
        }
    }

    let result = if interrupted {
        runner.stop().await?
    } else {
        runner.wait().await?
    };
    let finished_at = Utc::now();

    print_results(&result);

    if let Some(output_path) = &cli.output {
        println!("\nWriting results to {}...", output_path);
        let report = RunReport {
            started_at,
            finished_at,
            config: &config,
            result: &result,
        };
        let json = serde_json::to_string_pretty(&report)?;
        fs::write(output_path, json).with_context(|| format!("writing {}", output_path))?;
        println!("  Results saved");
    }

    println!("\n✅ Simulation complete!\n");
    Ok(())
}

fn run_multi_failure(
    config: SimulationConfig,
    risks: &[RiskAssessment],
    nodes: usize,
    partition: bool,
) -> anyhow::Result<()> {
    print_banner("Multi-Node Failure Drill");
    let mut engine = prepare_engine(config, risks)?;

    let Some(scenario) = engine.simulate_multi_node_failure(nodes, partition) else {
        println!("Not enough live nodes to fail {} at once", nodes);
        return Ok(());
    };
    print_scenario(&scenario);

    println!("\nRecovery (most critical first):");
    let outcomes = engine.recover_multi_node_failure(&scenario);
    print_outcomes(&outcomes);
    print_redundancy_statistics(&engine)?;
    Ok(())
}

fn run_partition(config: SimulationConfig, risks: &[RiskAssessment]) -> anyhow::Result<()> {
    print_banner("Network Partition Drill");
    let mut engine = prepare_engine(config, risks)?;

    let Some(scenario) = engine.simulate_network_partition() else {
        println!("Too few live nodes to partition");
        return Ok(());
    };
    print_scenario(&scenario);

    let recovered = engine.recover_network_partition(scenario.scenario_id);
    println!("\nPartition {} lifted: {}", scenario.scenario_id, recovered);
    print_redundancy_statistics(&engine)?;
    Ok(())
}

/// Engine with redundancy in place and one tick of traffic admitted
fn prepare_engine(config: SimulationConfig, risks: &[RiskAssessment]) -> anyhow::Result<SimulationEngine> {
    let config = config.with_failure_injection(false);
    let mut engine = SimulationEngine::new(config)?;

    let risks = if risks.is_empty() {
        default_risks()
    } else {
        risks.to_vec()
    };
    engine.configure_redundancy(&risks);
    engine.tick();
    Ok(engine)
}

/// Every node assessed at its criticality, enough to give each a group
fn default_risks() -> Vec<RiskAssessment> {
    NodeId::ALL
        .into_iter()
        .map(|node| RiskAssessment::new(node, node.criticality().max(0.7), node.failure_type()))
        .collect()
}

fn print_banner(title: &str) {
    println!("\n╔══════════════════════════════════════════════════════════╗");
    println!("║  {:<56}║", title);
    println!("╚══════════════════════════════════════════════════════════╝\n");
}

fn print_configuration(config: &SimulationConfig) {
    println!("Configuration:");
    println!("  Duration:           {}s ({} ticks)", config.simulation_duration, config.total_ticks());
    println!("  Time step:          {}s", config.time_step);
    println!("  Tick interval:      {:?}", config.tick_interval);
    println!("  Strategy:           {}", config.strategy);
    println!("  Request rate:       {}/tick", config.workload.base_rate);
    println!("  Seed:               {}", config.seed);
    println!("  Failure injection:  {}", config.failure_injection_enabled);
    println!("  Network delay:      {}", config.network_delay_enabled);
    println!("  Migration:          {}", config.adaptive_migration_enabled);
    println!("  Auto failover:      {}", config.automatic_failover);
    if config.bridge_enabled {
        println!("  Bridge:             {} {}", config.bridge.program, config.bridge.args.join(" "));
    }
    println!();
}

fn print_results(result: &SimulationResult) {
    print_banner("Results");

    println!("{:<10} {:>10} {:>10} {:>10} {:>10}", "Node", "Avg CPU", "Peak CPU", "Memory", "Services");
    println!("{}", "-".repeat(54));
    let state = &result.final_state;
    let allocations = state.allocation_counts();
    for node in NodeId::ALL {
        let history = result
            .node_utilization_history
            .get(&node)
            .map(Vec::as_slice)
            .unwrap_or_default();
        let average = if history.is_empty() {
            0.0
        } else {
            history.iter().sum::<f64>() / history.len() as f64
        };
        let peak = history.iter().copied().fold(0.0, f64::max);
        println!(
            "{:<10} {:>9.1}% {:>9.1}% {:>8.1}GB {:>10}",
            node.as_str(),
            average * 100.0,
            peak * 100.0,
            state.load(node).memory_gb,
            allocations.get(&node).copied().unwrap_or(0),
        );
    }

    println!("\n{}", "-".repeat(54));
    let success_pct = if result.total_requests > 0 {
        result.successful_requests as f64 / result.total_requests as f64 * 100.0
    } else {
        0.0
    };
    println!(
        "Requests:       {}/{} admitted ({:.1}%)",
        result.successful_requests, result.total_requests, success_pct
    );
    println!("Avg response:   {:.1} ms", result.average_response_time * 1000.0);
    println!(
        "Migrations:     {}/{} succeeded",
        result.successful_migrations, result.total_migrations
    );
    println!(
        "Failovers:      {}/{} succeeded",
        result.successful_failovers, result.total_failovers
    );
    let final_lbi = result.load_balance_index_history.last().copied().unwrap_or(0.0);
    println!("Final LBI:      {:.3}", final_lbi);
    if !result.failure_recovery_times.is_empty() {
        let mean = result.failure_recovery_times.iter().sum::<f64>() / result.failure_recovery_times.len() as f64;
        println!(
            "Recoveries:     {} (mean {:.1}s)",
            result.failure_recovery_times.len(),
            mean
        );
    }
}

fn print_scenario(scenario: &MultiNodeFailureScenario) {
    println!("Scenario {}", scenario.scenario_id);
    println!(
        "  Start {:.1}s, duration {:.1}s, partition: {}",
        scenario.start_time, scenario.duration, scenario.is_partition
    );
    for node in &scenario.failed_nodes {
        let failure_type = scenario.failure_types.get(node).copied().unwrap_or(node.failure_type());
        println!("  ✗ {:<8} {}", node.as_str(), failure_type);
    }
    if !scenario.partition_groups.is_empty() {
        println!("  Groups:");
        for group in &scenario.partition_groups {
            let names: Vec<&str> = group.iter().map(NodeId::as_str).collect();
            println!("    [{}]", names.join(", "));
        }
    }
}

fn print_outcomes(outcomes: &[FailoverOutcome]) {
    for outcome in outcomes {
        match outcome {
            FailoverOutcome::Completed(event) => {
                let target = event.failover_node.map(|n| n.as_str()).unwrap_or("-");
                let mark = if event.success { "✓" } else { "✗" };
                println!(
                    "  {} {:<8} -> {:<8} {:>6.1}s downtime, {} services, {} re-admitted",
                    mark,
                    event.failed_node.as_str(),
                    target,
                    event.downtime,
                    event.services_migrated.len(),
                    event.services_unplaced.len()
                );
            }
            FailoverOutcome::NotApplicable { node, reason } => {
                println!("  - {:<8} {}", node.as_str(), reason);
            }
        }
    }
}

fn print_redundancy_statistics(engine: &SimulationEngine) -> anyhow::Result<()> {
    println!("\nRedundancy:");
    println!("{}", redundancy_statistics_json(engine)?);
    Ok(())
}

fn redundancy_statistics_json(engine: &SimulationEngine) -> anyhow::Result<String> {
    let stats = engine.redundancy_statistics();
    Ok(serde_json::to_string_pretty(&stats)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redundancy_statistics_json() {
        let config = SimulationConfig::default().with_failure_injection(false);
        let mut engine = SimulationEngine::new(config).unwrap();
        engine.configure_redundancy(&[RiskAssessment::new(
            NodeId::Core1,
            0.9,
            tiersim_engine::FailureType::Byzantine,
        )]);

        let json = redundancy_statistics_json(&engine).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["replication_groups"].as_u64(), Some(1));
        assert_eq!(value["active_partitions"].as_u64(), Some(0));
    }
}
