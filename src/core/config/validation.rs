#![allow(clippy::result_large_err)]

use super::RunnerConfig;
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;

pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate configuration rules
    pub fn validate(config: &RunnerConfig) -> Result<(), AppError> {
        if config.engine.max_task_iterations == 0 {
            return Err(invalid("engine.max_task_iterations must be >= 1"));
        }

        for (field, raw) in [
            (
                "activity.start_to_close_timeout",
                &config.activity.start_to_close_timeout,
            ),
            ("activity.initial_interval", &config.activity.initial_interval),
            ("activity.maximum_interval", &config.activity.maximum_interval),
            ("http.request_timeout", &config.http.request_timeout),
        ] {
            humantime::parse_duration(raw)
                .map_err(|err| invalid(format!("{} '{}' is not a duration: {}", field, raw, err)))?;
        }

        if config.activity.backoff_coefficient < 1.0 {
            return Err(invalid("activity.backoff_coefficient must be >= 1.0"));
        }

        if config.activity.maximum_attempts == 0 {
            return Err(invalid("activity.maximum_attempts must be >= 1"));
        }

        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> AppError {
    AppError::new(ErrorCategory::ConfigurationError, message).with_code("WFG-CONF-002")
}
