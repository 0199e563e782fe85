//! keyneg daemon entry point.

mod cli;

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use keyneg::{Config, Core};

use cli::{Cli, Commands};

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Console filter respects RUST_LOG, with the CLI flag as fallback.
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(cli.log_level.to_string()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Some(Commands::Run { config }) => {
            let config = Config::load(&config)
                .with_context(|| format!("failed to load config from {}", config.display()))?;
            let core = Core::new(&config)?;
            core.run();
            Ok(())
        }
        Some(Commands::GenerateConfig) => {
            println!("{}", serde_json::to_string_pretty(&Config::sample())?);
            Ok(())
        }
        None => {
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
            Ok(())
        }
    }
}
