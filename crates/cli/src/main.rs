use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use plant::{JsonLinesSink, PlantConfig, SimulationClock};
use tracing::info;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "CRAC_SIM_LOG";

#[derive(Clone, Debug, ValueEnum)]
enum Preset {
    Baseline,
    RisingLoad,
    LeadFailure,
}

impl Preset {
    fn config(&self) -> PlantConfig {
        match self {
            Preset::Baseline => PlantConfig::baseline(),
            Preset::RisingLoad => PlantConfig::rising_load(),
            Preset::LeadFailure => PlantConfig::lead_failure(),
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "crac-plant-sim",
    version,
    about = "Data hall cooling plant simulation with lead/lag staging and alarms"
)]
struct Args {
    /// YAML plant configuration; takes precedence over --preset
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(value_enum, long, default_value = "baseline")]
    preset: Preset,

    /// Override a configuration value, e.g. --set pid.kp=60 --set units[0].cop=3.2
    #[arg(long = "set", value_name = "KEY=VALUE")]
    overrides: Vec<String>,

    /// Simulated duration in seconds (defaults to the configuration's)
    #[arg(long)]
    seconds: Option<f64>,

    /// RNG seed for deterministic sensor noise
    #[arg(long)]
    seed: Option<u64>,

    /// Write every N-th snapshot (ticks with events are always written)
    #[arg(long, default_value_t = 1)]
    every: u64,

    /// Log as JSON instead of human-readable text
    #[arg(long)]
    json_logs: bool,

    /// Print the effective configuration as YAML and exit
    #[arg(long)]
    print_config: bool,
}

/// Logs go to stderr; stdout carries telemetry. `CRAC_SIM_LOG` wins over
/// `RUST_LOG`, and the default is `info`.
fn init_tracing(json: bool) {
    let filter = match std::env::var(LOG_ENV) {
        Ok(directive) => EnvFilter::try_new(directive).unwrap_or_else(|err| {
            eprintln!("invalid {LOG_ENV} directive ({err}); defaulting to info");
            EnvFilter::new("info")
        }),
        Err(_) => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.json_logs);

    let mut config = match &args.config {
        Some(path) => PlantConfig::load(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => args.preset.config(),
    };
    config
        .apply_overrides(&args.overrides)
        .context("applying --set overrides")?;
    if let Some(seconds) = args.seconds {
        config.simulation.duration_s = seconds;
    }
    if let Some(seed) = args.seed {
        config.simulation.seed = seed;
    }

    if args.print_config {
        print!("{}", config.to_yaml_string()?);
        return Ok(());
    }

    let mut clock = SimulationClock::new(config).context("building plant")?;

    let stdout = io::stdout();
    let mut sink = JsonLinesSink::new(BufWriter::new(stdout.lock())).every(args.every);
    let summary = clock.run(&mut sink).context("running simulation")?;
    sink.into_inner().flush().context("flushing telemetry")?;

    info!(summary = %serde_json::to_string(&summary)?, "summary");
    Ok(())
}
