//! Configuration CLI commands.

use std::path::Path;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;

use crate::cli::load_config;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Check the configuration against its allowed ranges
    Validate,
}

#[derive(Debug, Serialize)]
pub struct ConfigShowOutput {
    pub source: String,
    pub config: Config,
}

impl CommandOutput for ConfigShowOutput {
    fn to_human(&self) -> String {
        let body = serde_yaml::to_string(&self.config).unwrap_or_default();
        format!("# source: {}\n{}", self.source, body.trim_end())
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[derive(Debug, Serialize)]
pub struct ConfigValidateOutput {
    pub valid: bool,
    pub source: String,
}

impl CommandOutput for ConfigValidateOutput {
    fn to_human(&self) -> String {
        format!("Configuration is valid ({})", self.source)
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

fn describe_source(path: Option<&Path>) -> String {
    path.map_or_else(
        || "defaults + .canopy/*.yaml + CANOPY_* env".to_string(),
        |p| p.display().to_string(),
    )
}

pub fn execute(args: ConfigArgs, path: Option<&Path>, json_mode: bool) -> Result<()> {
    let source = describe_source(path);
    match args.command {
        ConfigCommands::Show => {
            let config = load_config(path)?;
            output(&ConfigShowOutput { source, config }, json_mode);
        }
        ConfigCommands::Validate => {
            load_config(path).context("Configuration is invalid")?;
            output(
                &ConfigValidateOutput {
                    valid: true,
                    source,
                },
                json_mode,
            );
        }
    }
    Ok(())
}
