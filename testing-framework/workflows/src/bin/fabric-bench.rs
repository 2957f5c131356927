use std::{path::PathBuf, process, sync::Arc, time::Duration};

use anyhow::{Context as _, Result, anyhow};
use clap::Parser;
use fabric_bench_config::NetworkConfig;
use fabric_bench_core::{
    FabricConnector, FabricRequest, IS_DEBUG_TRACING, ProcessRole,
    network::gateway::GatewayClientFactory,
    scenario::{Runner, ScenarioBuilder},
    topology::NetworkTopology,
};
use fabric_bench_workflows::ScenarioBuilderExt as _;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser, Debug)]
#[command(about = "Drive a benchmark round against a Fabric-style gateway")]
struct Args {
    /// Network configuration file; falls back to FABRIC_BENCH_NETWORK_CONFIG.
    #[arg(long)]
    network: Option<PathBuf>,
    /// Overrides the gateway declared in the network configuration.
    #[arg(long)]
    gateway: Option<String>,
    /// Create and join channels, then install contracts before the round.
    #[arg(long)]
    manager: bool,
    #[arg(long, default_value_t = 0)]
    worker: u64,
    #[arg(long)]
    contract: String,
    #[arg(long)]
    function: String,
    /// Contract arguments; `{index}` is replaced by the request number.
    #[arg(long = "arg")]
    args: Vec<String>,
    /// Evaluate instead of submitting.
    #[arg(long)]
    query: bool,
    #[arg(long, default_value_t = 10)]
    count: usize,
    /// Requests per second.
    #[arg(long)]
    rate: Option<f64>,
    #[arg(long, default_value_t = 60)]
    duration_secs: u64,
    /// Minimum success ratio the round must reach.
    #[arg(long)]
    min_success: Option<f64>,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let args = Args::parse();
    if let Err(err) = run(args).await {
        warn!("benchmark round failed: {err:#}");
        process::exit(1);
    }
}

fn init_tracing() {
    let filter = fabric_bench_env::fabric_bench_log()
        .or_else(fabric_bench_env::rust_log)
        .map_or_else(
            || EnvFilter::new(if *IS_DEBUG_TRACING { "debug" } else { "info" }),
            EnvFilter::new,
        );
    let _ = fmt().with_env_filter(filter).with_target(true).try_init();
}

async fn run(args: Args) -> Result<()> {
    let path = args
        .network
        .clone()
        .or_else(fabric_bench_env::fabric_bench_network_config)
        .ok_or_else(|| anyhow!("no network configuration given (--network)"))?;

    let config = NetworkConfig::load_from_file(&path)
        .with_context(|| format!("failed to load network configuration from {}", path.display()))?;

    let gateway = args
        .gateway
        .clone()
        .or_else(fabric_bench_env::fabric_bench_gateway_url)
        .or_else(|| config.gateway.clone())
        .ok_or_else(|| anyhow!("no gateway url configured"))?;

    let settings = config.fabric.clone().with_env_overrides();
    info!(
        network = %config.name,
        gateway = %gateway,
        worker = args.worker,
        manager = args.manager,
        "preparing fabric connector"
    );

    let connector = Arc::new(FabricConnector::new(
        settings,
        Arc::new(NetworkTopology::new(config)),
        Arc::new(GatewayClientFactory::new(gateway)),
        args.worker,
    ));

    let role = if args.manager {
        ProcessRole::Manager
    } else {
        ProcessRole::Worker
    };
    connector
        .init(role)
        .await
        .context("connector initialization failed")?;
    if args.manager {
        connector
            .install_smart_contract()
            .await
            .context("contract installation failed")?;
    }

    let template = if args.query {
        FabricRequest::query(&args.contract, &args.function)
    } else {
        FabricRequest::invoke(&args.contract, &args.function)
    }
    .with_arguments(args.args.iter().cloned());

    let mut builder = ScenarioBuilder::new()
        .with_run_duration(Duration::from_secs(args.duration_secs))
        .transactions_with(|flow| {
            let flow = flow.request(template).count(args.count);
            match args.rate {
                Some(rate) => flow.rate(rate),
                None => flow,
            }
        });
    if let Some(min_success) = args.min_success {
        builder = builder.expect_success_rate(min_success);
    }
    let mut scenario = builder.build().context("building benchmark round failed")?;

    let runner = Runner::prepare(Arc::clone(&connector), &scenario, 0)
        .await
        .context("acquiring connector context failed")?;
    let summary = runner
        .run(&mut scenario)
        .await
        .context("benchmark round failed")?;

    let stats = connector.stats();
    println!(
        "requests: {} succeeded: {} failed: {} verified: {} mean latency: {} (submitted {}, finished {})",
        summary.total,
        summary.succeeded,
        summary.failed,
        summary.verified,
        summary
            .mean_latency_ms
            .map_or_else(|| "n/a".to_owned(), |ms| format!("{ms:.1} ms")),
        stats.submitted,
        stats.finished,
    );

    Ok(())
}
