//! Bonsai CLI - storefront 3D pipeline client

mod commands;
mod logging;

use anyhow::Result;
use bonsai_frontend_common::ClientConfig;
use clap::{Parser, ValueEnum};
use commands::Commands;
use std::path::PathBuf;
use tracing::{Level, error, info};

#[derive(Parser)]
#[command(name = "bonsai")]
#[command(about = "Submit photogrammetry jobs to a Bonsai storefront")]
#[command(version)]
struct Cli {
    /// Set logging level
    #[arg(short = 'l', long, global = true, default_value = "info")]
    log_level: LogLevel,

    /// Configuration file (TOML, YAML or JSON)
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    /// Storefront backend URL
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Artifact server URL
    #[arg(long, global = true)]
    artifact_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn client_config(&self) -> Result<ClientConfig> {
        let mut config = match &self.config {
            Some(path) => ClientConfig::load_from_file(path)?,
            None => ClientConfig::load()?,
        };
        if let Some(url) = &self.base_url {
            config.base_url.clone_from(url);
        }
        if let Some(url) = &self.artifact_url {
            config.artifact_url.clone_from(url);
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.log_level.clone().into())?;

    let config = cli.client_config()?;
    info!(
        base_url = %config.base_url,
        artifact_url = %config.artifact_url,
        "Starting Bonsai CLI"
    );

    match cli.command.execute(config).await {
        Ok(()) => {
            info!("Command completed successfully");
        }
        Err(e) => {
            error!("Command failed: {e:#}");
            std::process::exit(1);
        }
    }

    Ok(())
}

#[derive(Clone, Debug, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for Level {
    fn from(log_level: LogLevel) -> Self {
        match log_level {
            LogLevel::Error => Self::ERROR,
            LogLevel::Warn => Self::WARN,
            LogLevel::Info => Self::INFO,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Trace => Self::TRACE,
        }
    }
}
