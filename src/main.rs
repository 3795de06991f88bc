use memsentinel::{init_logging, Result};

mod cli;
mod commands;

use cli::{Cli, Commands};
use commands::RunOptions;

#[tokio::main]
async fn main() -> Result<()> {
    use clap::Parser;

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            duration,
            simulate,
            base_mb,
            seed,
            environment,
            format,
        } => {
            let mut resolved = commands::resolve_config(config.as_ref(), environment.as_deref())?;
            if cli.verbose {
                resolved.logging.level = "debug".to_string();
            }
            init_logging(&resolved.logging)?;

            let options = RunOptions {
                duration,
                simulate,
                base_mb,
                seed,
                format,
            };
            commands::run_command(resolved, options).await?;
        }

        Commands::Config {
            print_default,
            environment,
        } => {
            commands::config_command(print_default, &environment)?;
        }
    }

    Ok(())
}
