mod config;
mod logging;
mod statsd;

use clap::{Args, Parser, Subcommand};
use config::{Config, ConfigError};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(version, about = "Simple Analytics edge runtime and settings API")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Serve the analytics routes in front of the site origin
    Edge(ServiceArgs),
    /// Serve the settings API
    Settings(ServiceArgs),
}

#[derive(Args)]
struct ServiceArgs {
    #[arg(long)]
    config_path: PathBuf,
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Init(String),
    #[error("could not start runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error("edge failed: {0}")]
    Edge(#[from] edge::errors::EdgeError),
    #[error("settings api failed: {0}")]
    Settings(#[from] settings::SettingsError),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "exiting");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: CliCommand) -> Result<(), CliError> {
    let (ServiceArgs { config_path }, name) = match &command {
        CliCommand::Edge(args) => (args, "edge"),
        CliCommand::Settings(args) => (args, "settings"),
    };
    let config = Config::from_file(config_path)?;

    let _sentry_guard =
        logging::init_logging(config.common.logging.as_ref()).map_err(CliError::Init)?;

    if let Some(metrics_config) = &config.common.metrics {
        let defs = match &command {
            CliCommand::Edge(_) => edge::metrics_defs::ALL_METRICS,
            CliCommand::Settings(_) => settings::metrics_defs::ALL_METRICS,
        };
        statsd::init_metrics(metrics_config, defs).map_err(CliError::Init)?;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    tracing::info!("starting {name}");
    match command {
        CliCommand::Edge(_) => {
            let edge_config = config.edge.ok_or(ConfigError::MissingSection("edge"))?;
            runtime.block_on(edge::run(edge_config))?;
        }
        CliCommand::Settings(_) => {
            let settings_config = config
                .settings
                .ok_or(ConfigError::MissingSection("settings"))?;
            runtime.block_on(settings::run(settings_config))?;
        }
    }
    Ok(())
}
