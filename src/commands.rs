//! Command implementations for the CLI

use crate::cli::OutputFormat;
use chrono::Utc;
use memsentinel::{
    Config, Environment, HostCollaborators, MemoryHealthMonitor, Result, SimulatedHost,
    SimulatedMetricsProvider, SimulationProfile,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

pub struct RunOptions {
    pub duration: Duration,
    pub simulate: Option<String>,
    pub base_mb: f64,
    pub seed: u64,
    pub format: OutputFormat,
}

/// Resolve configuration for `run`: explicit file, then explicit preset,
/// then the environment
pub fn resolve_config(path: Option<&PathBuf>, environment: Option<&str>) -> Result<Config> {
    match (path, environment) {
        (Some(path), _) => {
            let mut config = Config::load_from_file(path)?;
            config.override_from_env()?;
            config.validate()?;
            Ok(config)
        }
        (None, Some(environment)) => {
            let mut config = Config::default_for_environment(environment.parse()?);
            config.override_from_env()?;
            config.validate()?;
            Ok(config)
        }
        (None, None) => Config::load(),
    }
}

pub async fn run_command(config: Config, options: RunOptions) -> Result<()> {
    let mut builder = MemoryHealthMonitor::builder(config);

    if let Some(profile) = &options.simulate {
        let profile: SimulationProfile = profile.parse()?;
        info!(?profile, base_mb = options.base_mb, "Sampling a simulated heap");
        let provider = Arc::new(SimulatedMetricsProvider::new(
            profile,
            options.base_mb,
            options.seed,
        ));
        let host = HostCollaborators::simulated(Arc::new(SimulatedHost::new(Arc::clone(&provider))));
        builder = builder.provider(provider).host(host);
    }

    let monitor = builder.build()?;
    let mut events = monitor.subscribe();
    let listener = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => info!(kind = event.kind(), "Monitor event"),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event listener lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    monitor.start().await?;
    info!(duration = ?options.duration, "Monitoring");
    tokio::time::sleep(options.duration).await;

    // One last advisory pass so the report reflects the whole run
    if let Err(e) = monitor.run_advisory_pass(Utc::now()).await {
        warn!("Final advisory pass failed: {}", e);
    }
    monitor.stop().await;
    listener.abort();

    let analysis = monitor.analysis_report();
    let optimization = monitor.optimization_report().await;
    debug!(events = ?monitor.event_stats(), "Run finished");

    match options.format {
        OutputFormat::Markdown => {
            println!("{}", analysis.to_markdown());
            println!("{}", optimization.to_markdown());
        }
        OutputFormat::Json => {
            let combined = serde_json::json!({
                "analysis": analysis,
                "optimization": optimization,
            });
            println!("{}", serde_json::to_string_pretty(&combined)?);
        }
    }

    Ok(())
}

pub fn config_command(print_default: bool, environment: &str) -> Result<()> {
    let environment: Environment = environment.parse()?;
    if print_default {
        print!("{}", Config::default_for_environment(environment).to_toml()?);
    } else {
        println!("Nothing to do; pass --print-default to print the {} preset", environment);
    }
    Ok(())
}
