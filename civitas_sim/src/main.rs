//! Civitas Simulator CLI
//!
//! Runs deterministic session scenarios, or an interactive operator console
//! on the real clock.

use civitas_core::{CivitasConfig, TelemetryTicker};
use civitas_env::TokioContext;
use civitas_sim::scenarios::ScenarioId;
use civitas_sim::{ScenarioResult, ScenarioRunner, SimSession};
use clap::Parser;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Civitas Deterministic Simulation CLI
#[derive(Parser, Debug)]
#[command(name = "civitas-sim")]
#[command(about = "Run deterministic session scenarios for Civitas", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario to run (cache_warmup, ttl_expiry, capacity_eviction, tier_partition,
    /// ordered_dispatch, gpu_drift, saturation, reset_recovery, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of consecutive seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export session frames to a JSON file (single scenario only)
    #[arg(long)]
    export: Option<PathBuf>,

    /// Interactive operator console on the real clock
    #[arg(short, long)]
    interactive: bool,
}

fn load_config(path: Option<&PathBuf>) -> CivitasConfig {
    let Some(path) = path else {
        return CivitasConfig::default();
    };
    match CivitasConfig::from_json_file(path) {
        Ok(config) => {
            info!("Loaded configuration from {}", path.display());
            config
        }
        Err(e) => {
            eprintln!("Error: {}: {}", path.display(), e);
            std::process::exit(2);
        }
    }
}

/// Reads prompts from stdin; a leading `!` routes to the reasoning tier.
async fn run_interactive(config: CivitasConfig) {
    let context = TokioContext::shared();
    let session = match SimSession::new(context.clone(), &config) {
        Ok(session) => session,
        Err(e) => {
            error!("Session setup failed: {}", e);
            std::process::exit(2);
        }
    };
    let mut ticker = TelemetryTicker::start(
        context,
        session.store(),
        config.simulation.tick_interval(),
    );

    println!("Civitas operator console. Prefix with '!' for the reasoning tier, 'quit' to exit.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("stdin closed: {}", e);
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "quit" || line == "exit" {
            break;
        }

        let (message, boosted) = match line.strip_prefix('!') {
            Some(rest) => (rest.trim(), true),
            None => (line, false),
        };

        match session.ask(message, boosted).await {
            Ok(turn) => {
                let m = turn.response.metrics;
                println!("{}", turn.response.text);
                println!(
                    "  [{}] {:.0} ms{} | cost {:.6} | {} call(s) applied",
                    turn.response.model_id,
                    m.total_latency_ms,
                    if m.cached { " (cached)" } else { "" },
                    turn.response.cost_estimate,
                    turn.dispatch.applied_count(),
                );
                let state = session.snapshot();
                println!(
                    "  {}/7 districts active | backbone {} | overrides {}",
                    state.active_count(),
                    state.routing_backbone,
                    if state.simulation_active { "on" } else { "off" }
                );
            }
            Err(e) => println!("{}", e.user_message()),
        }
    }

    ticker.stop();
    session.orchestrator().cache().dispose();
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    let config = load_config(args.config.as_ref());

    if args.interactive {
        run_interactive(config).await;
        return;
    }

    if !args.json {
        info!("Civitas Simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    // Parse scenarios
    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        vec![args.scenario.parse().unwrap_or_else(|e| {
            eprintln!("Error: {}", e);
            eprintln!("Available scenarios (or 'all'):");
            eprint!("{}", ScenarioId::catalogue());
            std::process::exit(1);
        })]
    };

    // Determine base seed
    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(42)
    } else {
        args.seed
    };

    // Handle --export mode
    if let Some(export_path) = &args.export {
        if scenarios.len() > 1 {
            eprintln!("Error: --export only supports a single scenario, not 'all'");
            std::process::exit(1);
        }

        let runner = ScenarioRunner::new(base_seed).with_config(config);
        let (result, export) = runner.run_with_export(scenarios[0]).await;

        if let Err(e) = export.write_to_file(export_path) {
            error!("Failed to write export: {:?}", e);
            std::process::exit(1);
        }
        info!("Exported {} frames to {}", export.frames.len(), export_path.display());

        if result.passed {
            info!("✓ {} (seed={}) PASSED", result.scenario, base_seed);
        } else {
            error!(
                "✗ {} FAILED: {}",
                result.scenario,
                result.failure_reason.as_deref().unwrap_or("unknown")
            );
            std::process::exit(1);
        }
        return;
    }

    // Run simulations
    let mut all_results: Vec<ScenarioResult> = Vec::new();
    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);
        let runner = ScenarioRunner::new(seed).with_config(config.clone());

        for scenario in &scenarios {
            let result = runner.run(*scenario).await;

            if !args.json {
                if result.passed {
                    info!("✓ {} (seed={}) PASSED", scenario.name(), seed);
                } else {
                    error!(
                        "✗ {} (seed={}) FAILED: {}",
                        scenario.name(),
                        seed,
                        result.failure_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }

            all_results.push(result);
        }
    }

    // Summary
    let total = all_results.len();
    let failed_count = all_results.iter().filter(|r| !r.passed).count();
    let passed = total - failed_count;

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": passed,
            "failed": failed_count,
            "results": all_results,
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(out) => println!("{}", out),
            Err(e) => error!("Failed to serialize summary: {}", e),
        }
    } else {
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        if failed_count == 0 {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed_count, total);
            for result in all_results.iter().filter(|r| !r.passed) {
                error!(
                    "  - {} seed={}: {}",
                    result.scenario,
                    result.seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }
    }

    // Exit with proper code for CI
    if failed_count > 0 {
        std::process::exit(1);
    }
}
