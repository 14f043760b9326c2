//! # GeoEye CLI Entry Point
//!
//! Main binary for the GeoEye cluster coordination core. Registers the nodes
//! given on the command line and probes, selects from, or watches them.
//!
//! ## Usage
//!
//! ```bash
//! # Probe up to three nodes concurrently (outputs raw JSON)
//! geoeye probe -n 10.0.0.1:8000 -n 10.0.0.2:8000 -n 10.0.0.3:8000
//!
//! # Show how six consecutive uploads would be spread (JSON lines)
//! geoeye select -n 10.0.0.1:8000 -n 10.0.0.2:8000 -c 6 -o upload
//!
//! # Keep probing, refresh heartbeats and report the healthy set until Ctrl-C
//! geoeye watch -n 10.0.0.1:8000 -n 10.0.0.2:8000 --node-timeout 30
//! ```
//!
//! ## Address Format
//!
//! Nodes are given as `host:port` without a scheme:
//! - ✅ `10.0.0.1:8000`
//! - ✅ `storage-1.internal:8000`
//! - ❌ `http://10.0.0.1:8000`

use anyhow::Result;
use argh::FromArgs;
use geoeye_cli::{parse_node_addrs, refresh_heartbeats};
use geoeye_cluster::{ClusterConfig, ClusterManager, SweepListener, SweepReport, TcpProbe};
use std::sync::Arc;
use std::time::Duration;

/// Main CLI structure parsed from command-line arguments.
#[derive(FromArgs)]
/// GeoEye - cluster coordination for satellite image storage nodes
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

/// Available CLI subcommands.
///
/// - **Probe**: one concurrent reachability check (JSON output)
/// - **Select**: round-robin selections (JSON lines)
/// - **Watch**: long-running health loop
#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Probe(ProbeArgs),
    Select(SelectArgs),
    Watch(WatchArgs),
}

#[derive(FromArgs)]
#[argh(subcommand, name = "probe")]
/// probe nodes for TCP reachability
struct ProbeArgs {
    /// node address as host:port (can be specified multiple times)
    #[argh(option, short = 'n', long = "node")]
    nodes: Vec<String>,

    /// how many nodes to probe concurrently
    #[argh(option, long = "max-concurrency", default = "3")]
    max_concurrency: usize,

    /// connect timeout per node in milliseconds
    #[argh(option, long = "timeout-ms", default = "2000")]
    timeout_ms: u64,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "select")]
/// print round-robin node selections
struct SelectArgs {
    /// node address as host:port (can be specified multiple times)
    #[argh(option, short = 'n', long = "node")]
    nodes: Vec<String>,

    /// number of selections to make
    #[argh(option, short = 'c', long = "count", default = "1")]
    count: usize,

    /// operation name attached to each selection in the logs
    #[argh(option, short = 'o', long = "operation", default = "\"default\".into()")]
    operation: String,
}

#[derive(FromArgs)]
#[argh(subcommand, name = "watch")]
/// probe nodes periodically and report the healthy set
struct WatchArgs {
    /// node address as host:port (can be specified multiple times)
    #[argh(option, short = 'n', long = "node")]
    nodes: Vec<String>,

    /// seconds without a successful probe before a node is demoted
    #[argh(option, long = "node-timeout", default = "30")]
    node_timeout: u64,

    /// seconds between two health sweeps (and probe rounds)
    #[argh(option, long = "health-check-interval", default = "10")]
    health_check_interval: u64,

    /// connect timeout per node in milliseconds
    #[argh(option, long = "timeout-ms", default = "2000")]
    timeout_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // probe and select print JSON on stdout, so only warnings are logged by
    // default; logs always go to stderr
    let default_level = match cli.command {
        Commands::Watch(_) => "info",
        Commands::Probe(_) | Commands::Select(_) => "warn",
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Probe(args) => run_probe(args).await,
        Commands::Select(args) => run_select(args).await,
        Commands::Watch(args) => run_watch(args).await,
    }
}

async fn run_probe(args: ProbeArgs) -> Result<()> {
    let nodes = parse_node_addrs(&args.nodes)?;
    let config = ClusterConfig {
        max_concurrency: args.max_concurrency,
        ..Default::default()
    };
    let cluster = ClusterManager::with_config(nodes, config).await?;

    let probe = Arc::new(TcpProbe::new(Duration::from_millis(args.timeout_ms)));
    let outcomes = cluster.dispatch(probe, ()).await;
    cluster.shutdown().await;

    println!("{}", serde_json::to_string(&outcomes?)?);
    Ok(())
}

async fn run_select(args: SelectArgs) -> Result<()> {
    let nodes = parse_node_addrs(&args.nodes)?;
    let cluster = ClusterManager::new(nodes).await?;

    for _ in 0..args.count {
        let node = cluster.select_node(&args.operation).await?;
        println!("{}", serde_json::to_string(&node)?);
    }

    cluster.shutdown().await;
    Ok(())
}

async fn run_watch(args: WatchArgs) -> Result<()> {
    let nodes = parse_node_addrs(&args.nodes)?;
    let config = ClusterConfig {
        node_timeout: Duration::from_secs(args.node_timeout),
        health_check_interval: Duration::from_secs(args.health_check_interval),
        ..Default::default()
    };
    let listener: SweepListener = Arc::new(|report: &SweepReport| {
        tracing::debug!(
            "Health sweep examined {} node(s), demoted {}",
            report.examined,
            report.demoted.len()
        );
    });
    let cluster =
        ClusterManager::with_sweep_listener(nodes, config.clone(), Some(listener)).await?;

    tracing::info!(
        "Watching {} node(s) every {}s",
        cluster.node_count().await,
        args.health_check_interval
    );

    let probe = TcpProbe::new(Duration::from_millis(args.timeout_ms));
    let mut ticker = tokio::time::interval(config.health_check_interval);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                tracing::info!("Received Ctrl-C, shutting down");
                break;
            }
            _ = ticker.tick() => {
                refresh_heartbeats(&cluster, &probe).await;
                report_healthy(&cluster).await?;
            }
        }
    }

    cluster.shutdown().await;
    Ok(())
}

async fn report_healthy(cluster: &ClusterManager) -> Result<()> {
    match cluster.get_healthy_nodes(1).await {
        Ok(nodes) => {
            let addrs: Vec<String> = nodes.iter().map(|n| n.addr()).collect();
            println!("{}", serde_json::to_string(&addrs)?);
        }
        Err(e) => tracing::warn!("{}", e),
    }
    Ok(())
}
