#![allow(clippy::result_large_err)]

use super::RunnerConfig;
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use std::env;
use std::path::Path;

/// Prefix for variables copied into the workflow `$env` map.
pub const ENV_PASSTHROUGH_PREFIX: &str = "WORKFLOW_RUNNER_ENV_";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load config from a directory (dir/workflow-runner.toml)
    /// Environment variables override config file values
    pub fn load_from_dir(dir: &Path) -> Result<RunnerConfig, AppError> {
        Self::load(Some(&dir.join("workflow-runner.toml")))
    }

    /// Load config from an optional file, falling back to defaults, then apply env overrides.
    pub fn load(path: Option<&Path>) -> Result<RunnerConfig, AppError> {
        let from_file = match path {
            Some(path) => Self::load_from_file(path)?,
            None => None,
        };
        let mut config = from_file.unwrap_or_default();
        Self::apply_env_overrides(&mut config);
        Ok(config)
    }

    /// Load config from specific file path
    /// Returns Ok(None) if file doesn't exist
    pub fn load_from_file(path: &Path) -> Result<Option<RunnerConfig>, AppError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            AppError::new(
                ErrorCategory::IoError,
                format!("Failed to read config file {}: {}", path.display(), e),
            )
        })?;

        let config: RunnerConfig = toml::from_str(&content).map_err(|e| {
            AppError::new(
                ErrorCategory::ConfigurationError,
                format!("Failed to parse config file {}: {}", path.display(), e),
            )
            .with_code("WFG-CONF-001")
        })?;

        Ok(Some(config))
    }

    fn apply_env_overrides(config: &mut RunnerConfig) {
        if let Some(value) = parse_env::<usize>("WORKFLOW_RUNNER_MAX_HISTORY_LENGTH") {
            config.engine.max_history_length = value;
        }
        if let Some(value) = parse_env::<usize>("WORKFLOW_RUNNER_MAX_CONTINUATIONS") {
            config.engine.max_continuations = value;
        }
        if let Some(value) = parse_env::<usize>("WORKFLOW_RUNNER_MAX_TASK_ITERATIONS") {
            config.engine.max_task_iterations = value;
        }

        if let Ok(timeout) = env::var("WORKFLOW_RUNNER_ACTIVITY_TIMEOUT") {
            config.activity.start_to_close_timeout = timeout;
        }
        if let Some(value) = parse_env::<u32>("WORKFLOW_RUNNER_ACTIVITY_MAX_ATTEMPTS") {
            config.activity.maximum_attempts = value;
        }

        if let Ok(user_agent) = env::var("WORKFLOW_RUNNER_HTTP_USER_AGENT") {
            config.http.user_agent = user_agent;
        }

        for (key, value) in env::vars() {
            if let Some(name) = key.strip_prefix(ENV_PASSTHROUGH_PREFIX) {
                if !name.is_empty() {
                    config.env.insert(name.to_string(), value);
                }
            }
        }
    }

    /// Get documentation for supported environment variables
    pub fn env_var_documentation() -> &'static [&'static str] {
        &[
            "WORKFLOW_RUNNER_MAX_HISTORY_LENGTH - History length that triggers continuation (default: 10000, 0 disables)",
            "WORKFLOW_RUNNER_MAX_CONTINUATIONS - Maximum continuations per execution (default: 100)",
            "WORKFLOW_RUNNER_MAX_TASK_ITERATIONS - Maximum task visits per task list (default: 1000)",
            "WORKFLOW_RUNNER_ACTIVITY_TIMEOUT - Default start-to-close timeout for calls (default: 5m)",
            "WORKFLOW_RUNNER_ACTIVITY_MAX_ATTEMPTS - Default retry attempts for calls (default: 5)",
            "WORKFLOW_RUNNER_HTTP_USER_AGENT - User agent sent by the HTTP backend",
            "WORKFLOW_RUNNER_ENV_<NAME> - Exposed to expressions as $env.<NAME>",
        ]
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|raw| raw.trim().parse::<T>().ok())
}
