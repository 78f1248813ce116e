use std::path::Path;

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Configuration error types
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid {field}: {value}. Must be greater than 0")]
    MustBePositive { field: &'static str, value: u64 },

    #[error("Invalid max_parallel_agents: {0}. Must be between 1 and 20")]
    InvalidMaxParallelAgents(usize),

    #[error("Invalid {field}: {value}. Must be at most 10")]
    TooManyRetries { field: &'static str, value: u32 },

    #[error("Invalid loop_repeat_threshold: {threshold}. Must be between 1 and loop_window - 1 ({window})")]
    InvalidLoopThreshold { threshold: usize, window: usize },

    #[error("Invalid {field}: {value}. Must be between 0.0 and 1.0")]
    ThresholdOutOfRange { field: &'static str, value: f64 },

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must not exceed max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .canopy/config.yaml (project config)
    /// 3. .canopy/local.yaml (local overrides, optional)
    /// 4. Environment variables (CANOPY_* prefix, `__` separates nesting)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".canopy/config.yaml"))
            .merge(Yaml::file(".canopy/local.yaml"))
            .merge(Env::prefixed("CANOPY_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, still honoring `CANOPY_*`
    /// environment overrides.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        if !path.exists() {
            anyhow::bail!("Config file not found: {}", path.display());
        }

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed("CANOPY_").split("__"))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let resources = &config.resources;
        positive("resources.token_budget", resources.token_budget)?;
        positive(
            "resources.session_timeout_secs",
            resources.session_timeout_secs,
        )?;
        if !(1..=20).contains(&resources.max_parallel_agents) {
            return Err(ConfigError::InvalidMaxParallelAgents(
                resources.max_parallel_agents,
            ));
        }
        positive(
            "resources.max_iterations",
            u64::from(resources.max_iterations),
        )?;
        positive(
            "resources.max_queue_length",
            resources.max_queue_length as u64,
        )?;

        let execution = &config.execution;
        positive(
            "execution.max_tree_depth",
            execution.max_tree_depth as u64,
        )?;
        positive(
            "execution.branching_factor",
            execution.branching_factor as u64,
        )?;
        at_most_ten(
            "execution.decomposition_retries",
            execution.decomposition_retries,
        )?;

        let convergence = &config.convergence;
        positive("convergence.loop_window", convergence.loop_window as u64)?;
        if convergence.loop_repeat_threshold == 0
            || convergence.loop_repeat_threshold >= convergence.loop_window
        {
            return Err(ConfigError::InvalidLoopThreshold {
                threshold: convergence.loop_repeat_threshold,
                window: convergence.loop_window,
            });
        }
        unit_interval(
            "convergence.consensus_threshold",
            convergence.consensus_threshold,
        )?;
        unit_interval(
            "convergence.goal_satisfaction_threshold",
            convergence.goal_satisfaction_threshold,
        )?;

        let human = &config.human;
        positive(
            "human.escalation_timeout_secs",
            human.escalation_timeout_secs,
        )?;
        positive("human.max_wait_secs", human.max_wait_secs)?;
        positive("human.poll_interval_ms", human.poll_interval_ms)?;

        let handlers = &config.handlers;
        positive("handlers.task_timeout_secs", handlers.task_timeout_secs)?;
        at_most_ten("handlers.retry.max_retries", handlers.retry.max_retries)?;
        positive(
            "handlers.retry.initial_backoff_ms",
            handlers.retry.initial_backoff_ms,
        )?;
        positive(
            "handlers.retry.max_backoff_ms",
            handlers.retry.max_backoff_ms,
        )?;
        if handlers.retry.initial_backoff_ms > handlers.retry.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                handlers.retry.initial_backoff_ms,
                handlers.retry.max_backoff_ms,
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        Ok(())
    }
}

const fn positive(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::MustBePositive { field, value });
    }
    Ok(())
}

const fn at_most_ten(field: &'static str, value: u32) -> Result<(), ConfigError> {
    if value > 10 {
        return Err(ConfigError::TooManyRetries { field, value });
    }
    Ok(())
}

fn unit_interval(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::ThresholdOutOfRange { field, value });
    }
    Ok(())
}
