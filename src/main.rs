use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use snn_stdp::experiment::burst::{run_burst_experiment, BurstConfig};
use snn_stdp::experiment::sweep::{run_sweep, SweepConfig};
use snn_stdp::SnnResult;

/// Simulate a leaky integrate-and-fire neuron whose input synapses learn
/// through spike-timing-dependent plasticity
#[derive(Parser)]
#[command(name = "snn-stdp", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sweep the firing rate of the excitatory inputs and report the output
    /// firing rate and the final weight distribution for each rate
    Sweep {
        /// JSON configuration file (defaults are used for missing fields)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// excitatory input rates in Hz, overriding the configuration
        #[arg(short, long, value_delimiter = ',')]
        rates: Vec<f64>,
        #[arg(short, long)]
        seed: Option<u64>,
        /// write the full result as JSON to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Feed bursts of spikes with random latencies until the weights reach a
    /// steady state, and report the weights as a function of the latency
    Burst {
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(short, long)]
        seed: Option<u64>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Write the default configuration of an experiment to a JSON file
    Defaults {
        #[arg(value_enum)]
        experiment: Experiment,
        path: PathBuf,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum Experiment {
    Sweep,
    Burst,
}

fn load_config<T: DeserializeOwned + Default>(path: Option<&Path>) -> SnnResult<T> {
    match path {
        Some(path) => {
            let read = fs::read_to_string(path)?;
            Ok(serde_json::from_str(&read)?)
        }
        None => Ok(T::default()),
    }
}

fn write_json<T: Serialize>(value: &T, path: &Path) -> SnnResult<()> {
    fs::write(path, serde_json::to_string_pretty(value)?)?;
    info!(path = %path.display(), "result written");
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Sweep {
            config,
            rates,
            seed,
            output,
        } => {
            let mut config: SweepConfig = load_config(config.as_deref())?;
            if !rates.is_empty() {
                config.excitatory_rates_hz = rates;
            }
            if let Some(seed) = seed {
                config.seed = seed;
            }

            let result = run_sweep(&config)?;
            result.print();
            if let Some(path) = output {
                write_json(&result, &path)?;
            }
        }
        Command::Burst {
            config,
            seed,
            output,
        } => {
            let mut config: BurstConfig = load_config(config.as_deref())?;
            if let Some(seed) = seed {
                config.seed = seed;
            }

            let result = run_burst_experiment(&config)?;
            result.print();
            if let Some(path) = output {
                write_json(&result, &path)?;
            }
        }
        Command::Defaults { experiment, path } => match experiment {
            Experiment::Sweep => write_json(&SweepConfig::default(), &path)?,
            Experiment::Burst => write_json(&BurstConfig::default(), &path)?,
        },
    }

    Ok(())
}
