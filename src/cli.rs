//! Command-line interface definition

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// Command-line interface for memsentinel
#[derive(Parser)]
#[command(name = "memsentinel")]
#[command(about = "Runtime memory health monitor", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the monitor, then print the final reports
    Run {
        /// TOML config file; defaults to MEMSENTINEL_CONFIG_PATH or the environment preset
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// How long to monitor, e.g. "30s" or "5m"
        #[arg(short, long, default_value = "30s", value_parser = parse_duration)]
        duration: Duration,

        /// Sample a synthetic heap instead of this process (steady, leak, spiky, sawtooth)
        #[arg(long)]
        simulate: Option<String>,

        /// Baseline size of the simulated heap in MB
        #[arg(long, default_value = "400")]
        base_mb: f64,

        /// Seed for the simulated heap
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Preset used when no config file is given
        #[arg(short, long)]
        environment: Option<String>,

        #[arg(short, long, value_enum, default_value = "markdown")]
        format: OutputFormat,
    },

    /// Configuration helpers
    Config {
        /// Print the default configuration as TOML
        #[arg(long)]
        print_default: bool,

        /// Preset to print (development, testing, production)
        #[arg(short, long, default_value = "development")]
        environment: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Markdown,
    Json,
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(value).map_err(|e| e.to_string())
}
