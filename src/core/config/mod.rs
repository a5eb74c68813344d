use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Runner configuration loaded from workflow-runner.toml
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RunnerConfig {
    /// Graph walking limits
    #[serde(default)]
    pub engine: EngineConfig,

    /// Defaults applied to every external call
    #[serde(default)]
    pub activity: ActivityConfig,

    /// HTTP client settings for the local backend
    #[serde(default)]
    pub http: HttpConfig,

    /// Values exposed to expressions as `$env`
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// History length that triggers a continuation; 0 disables it
    #[serde(default = "default_max_history_length")]
    pub max_history_length: usize,

    #[serde(default = "default_max_continuations")]
    pub max_continuations: usize,

    /// Upper bound on task visits inside a single task list
    #[serde(default = "default_max_task_iterations")]
    pub max_task_iterations: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityConfig {
    #[serde(default = "default_start_to_close_timeout")]
    pub start_to_close_timeout: String,

    #[serde(default = "default_initial_interval")]
    pub initial_interval: String,

    #[serde(default = "default_backoff_coefficient")]
    pub backoff_coefficient: f64,

    #[serde(default = "default_maximum_interval")]
    pub maximum_interval: String,

    #[serde(default = "default_maximum_attempts")]
    pub maximum_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout: String,
}

fn default_max_history_length() -> usize {
    10_000
}

fn default_max_continuations() -> usize {
    100
}

fn default_max_task_iterations() -> usize {
    1_000
}

fn default_start_to_close_timeout() -> String {
    "5m".to_string()
}

fn default_initial_interval() -> String {
    "1s".to_string()
}

fn default_backoff_coefficient() -> f64 {
    2.0
}

fn default_maximum_interval() -> String {
    "1m".to_string()
}

fn default_maximum_attempts() -> u32 {
    5
}

fn default_user_agent() -> String {
    format!("workflow-runner/{}", crate::VERSION)
}

fn default_request_timeout() -> String {
    "30s".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_history_length: default_max_history_length(),
            max_continuations: default_max_continuations(),
            max_task_iterations: default_max_task_iterations(),
        }
    }
}

impl Default for ActivityConfig {
    fn default() -> Self {
        ActivityConfig {
            start_to_close_timeout: default_start_to_close_timeout(),
            initial_interval: default_initial_interval(),
            backoff_coefficient: default_backoff_coefficient(),
            maximum_interval: default_maximum_interval(),
            maximum_attempts: default_maximum_attempts(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            user_agent: default_user_agent(),
            request_timeout: default_request_timeout(),
        }
    }
}

impl HttpConfig {
    pub fn request_timeout(&self) -> Option<Duration> {
        humantime::parse_duration(&self.request_timeout).ok()
    }
}

pub mod loader;
pub mod validation;

pub use loader::ConfigLoader;
pub use validation::ConfigValidator;
