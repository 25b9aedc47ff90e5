//! `chain` command-line entry point

mod cli;
mod commands;
mod config;

use crate::cli::Cli;
use crate::commands::UsageError;
use crate::config::NodeConfig;
use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(cli: &Cli) -> Result<NodeConfig> {
    let mut config = NodeConfig::load(cli.config.as_deref())
        .map_err(|err| UsageError::Config(err.to_string()))?;
    if let Some(node_id) = &cli.node_id {
        config = config.with_node_id(node_id.clone());
    }
    if let Some(data_dir) = &cli.data_dir {
        config = config.with_data_dir(data_dir.clone());
    }
    config.validate().map_err(UsageError::Config)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err:#}");
            return ExitCode::from(commands::exit_code(&err));
        }
    };
    init_logging(&config.log_level);

    match commands::run(cli.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = commands::exit_code(&err);
            if code == 1 {
                eprintln!("error: {err:#}");
            } else {
                eprintln!("fatal: {err:#}");
            }
            ExitCode::from(code)
        }
    }
}
