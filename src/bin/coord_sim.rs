use clap::Parser;
use coordsim_rs::config::SimConfig;
use coordsim_rs::interface::{DurationController, SimulatorAction};
use coordsim_rs::io::{NetworkDefaults, ResultWriter, read_network, read_sf_file};
use coordsim_rs::params::SimulatorParams;
use coordsim_rs::trace::read_trace;
use coordsim_rs::{Result, SimError};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(
    name = "coord-sim",
    about = "Flow-level SFC coordination simulator (full placement, local processing)"
)]
struct Args {
    /// GraphML network topology
    #[arg(long)]
    network: PathBuf,

    /// SF/SFC YAML file
    #[arg(long)]
    sf: PathBuf,

    /// Simulation config YAML file
    #[arg(long)]
    config: PathBuf,

    /// Total simulated time (ms)
    #[arg(long)]
    duration: f64,

    /// Random seed
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Directory of named resource functions (<name>.yaml)
    #[arg(long)]
    resource_functions: Option<PathBuf>,

    /// Write placements.csv, metrics.csv, runtimes.csv and drop_reasons.csv here
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Node capacity used when the GraphML node has no NodeCap
    #[arg(long, default_value_t = 10.0)]
    node_cap: f64,

    /// Link capacity used when the GraphML edge has no LinkFwdCap/LinkBkwdCap
    #[arg(long, default_value_t = 1000.0)]
    link_cap: f64,

    /// Disable logging
    #[arg(long)]
    quiet: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let default_filter = if args.quiet { "off" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_file(true)
        .with_line_number(true)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    match run(&args) {
        Ok(summary) => {
            println!("{summary}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "仿真失败");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<String> {
    if !(args.duration > 0.0) {
        return Err(SimError::InvalidInput(format!(
            "--duration must be positive, got {}",
            args.duration
        )));
    }
    let defaults = NetworkDefaults {
        node_cap: args.node_cap,
        link_cap: args.link_cap,
    };
    let network = read_network(&args.network, defaults)?;
    let (sf_list, sfc_list) = read_sf_file(&args.sf, args.resource_functions.as_deref())?;
    let config = SimConfig::load(&args.config)?;
    let trace = match &config.trace_path {
        Some(path) => read_trace(path)?,
        None => Vec::new(),
    };
    let run_duration = config.run_duration;
    let params = SimulatorParams::new(network, sf_list, sfc_list, config, args.seed)?.with_trace(trace)?;
    let baseline = SimulatorAction::full_placement_local_schedule(&params);

    let mut controller = DurationController::new(params);
    if let Some(dir) = &args.output_dir {
        controller = controller.with_writer(ResultWriter::create(dir)?);
    }
    controller.init()?;

    let runs = (args.duration / run_duration).ceil() as u64;
    info!(runs, run_duration, seed = args.seed, "开始运行");
    let mut state = None;
    for _ in 0..runs {
        state = Some(controller.apply(baseline.clone())?);
    }
    controller.simulator().check_invariants()?;

    let stats = match state {
        Some(s) => s.network_stats,
        None => controller.simulator().metrics().stats(),
    };
    serde_json::to_string(&stats).map_err(|e| SimError::InvalidInput(e.to_string()))
}
