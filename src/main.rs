//! Canopy CLI entry point.

use clap::Parser;

use canopy::cli::commands;
use canopy::cli::{handle_error, load_config, Cli, Commands};
use canopy::domain::models::LoggingConfig;
use canopy::infrastructure::logging::LoggerImpl;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run(args) => {
            let config = match load_config(cli.config.as_deref()) {
                Ok(config) => config,
                Err(err) => handle_error(&err, cli.json),
            };
            let _logger = init_logging(&config.logging);
            commands::run::execute(args, config, cli.json).await
        }
        Commands::Config(args) => {
            let _logger = init_logging(&LoggingConfig::default());
            commands::config::execute(args, cli.config.as_deref(), cli.json)
        }
    };

    if let Err(err) = result {
        handle_error(&err, cli.json);
    }
}

fn init_logging(config: &LoggingConfig) -> Option<LoggerImpl> {
    match LoggerImpl::init(config) {
        Ok(logger) => Some(logger),
        Err(err) => {
            eprintln!("warning: logging disabled: {err:#}");
            None
        }
    }
}
