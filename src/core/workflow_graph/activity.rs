#![allow(clippy::result_large_err)] // Retry loop hands back the last AppError unchanged.

use crate::core::config::ActivityConfig;
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use rand::Rng;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Metadata key holding per-document or per-task activity options.
pub const ACTIVITY_OPTIONS_KEY: &str = "activityOptions";

/// Retry schedule for one external call.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    pub backoff_coefficient: f64,
    pub maximum_interval: Duration,
    pub maximum_attempts: u32,
    /// Error codes that stop retrying immediately.
    pub non_retryable_error_types: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActivityOptions {
    pub start_to_close_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for ActivityOptions {
    fn default() -> Self {
        ActivityOptions {
            start_to_close_timeout: Duration::from_secs(300),
            retry: RetryPolicy {
                initial_interval: Duration::from_secs(1),
                backoff_coefficient: 2.0,
                maximum_interval: Duration::from_secs(60),
                maximum_attempts: 5,
                non_retryable_error_types: Vec::new(),
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawActivityOptions {
    start_to_close_timeout: Option<String>,
    retry_policy: Option<RawRetryPolicy>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawRetryPolicy {
    initial_interval: Option<String>,
    backoff_coefficient: Option<f64>,
    maximum_interval: Option<String>,
    maximum_attempts: Option<u32>,
    #[serde(default)]
    non_retryable_error_types: Vec<String>,
}

fn options_error(message: impl Into<String>) -> AppError {
    AppError::new(ErrorCategory::ConfigurationError, message).with_code("WFG-COMP-006")
}

fn duration(field: &str, raw: &str) -> Result<Duration, AppError> {
    humantime::parse_duration(raw.trim())
        .map_err(|err| options_error(format!("{} '{}' is not a duration: {}", field, raw, err)))
}

impl ActivityOptions {
    pub fn from_config(config: &ActivityConfig) -> Result<Self, AppError> {
        Ok(ActivityOptions {
            start_to_close_timeout: duration(
                "activity.start_to_close_timeout",
                &config.start_to_close_timeout,
            )?,
            retry: RetryPolicy {
                initial_interval: duration("activity.initial_interval", &config.initial_interval)?,
                backoff_coefficient: config.backoff_coefficient,
                maximum_interval: duration("activity.maximum_interval", &config.maximum_interval)?,
                maximum_attempts: config.maximum_attempts.max(1),
                non_retryable_error_types: Vec::new(),
            },
        })
    }

    /// Document-level `timeout.after` replaces the start-to-close timeout.
    pub fn with_document_timeout(mut self, after: Option<&str>) -> Result<Self, AppError> {
        if let Some(after) = after {
            self.start_to_close_timeout = duration("timeout.after", after)?;
        }
        Ok(self)
    }

    /// Overlay `metadata.activityOptions`, if present. Absent fields keep their current value.
    pub fn overlay_metadata(mut self, metadata: &Map<String, Value>) -> Result<Self, AppError> {
        let Some(raw) = metadata.get(ACTIVITY_OPTIONS_KEY) else {
            return Ok(self);
        };
        let parsed: RawActivityOptions = serde_json::from_value(raw.clone())
            .map_err(|err| options_error(format!("invalid activityOptions: {}", err)))?;

        if let Some(timeout) = parsed.start_to_close_timeout {
            self.start_to_close_timeout = duration("startToCloseTimeout", &timeout)?;
        }
        if let Some(policy) = parsed.retry_policy {
            if let Some(interval) = policy.initial_interval {
                self.retry.initial_interval = duration("initialInterval", &interval)?;
            }
            if let Some(coefficient) = policy.backoff_coefficient {
                if coefficient < 1.0 {
                    return Err(options_error("backoffCoefficient must be >= 1.0"));
                }
                self.retry.backoff_coefficient = coefficient;
            }
            if let Some(interval) = policy.maximum_interval {
                self.retry.maximum_interval = duration("maximumInterval", &interval)?;
            }
            if let Some(attempts) = policy.maximum_attempts {
                if attempts == 0 {
                    return Err(options_error("maximumAttempts must be >= 1"));
                }
                self.retry.maximum_attempts = attempts;
            }
            if !policy.non_retryable_error_types.is_empty() {
                self.retry.non_retryable_error_types = policy.non_retryable_error_types;
            }
        }
        Ok(self)
    }

    /// Resolve options for one task: config, then document timeout, then
    /// document metadata, then task metadata.
    pub fn resolve(
        defaults: &ActivityOptions,
        document_timeout: Option<&str>,
        document_metadata: &Map<String, Value>,
        task_metadata: &Map<String, Value>,
    ) -> Result<Self, AppError> {
        defaults
            .clone()
            .with_document_timeout(document_timeout)?
            .overlay_metadata(document_metadata)?
            .overlay_metadata(task_metadata)
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, without jitter.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let scaled = self.initial_interval.as_secs_f64() * self.backoff_coefficient.powi(exponent);
        let capped = scaled.min(self.maximum_interval.as_secs_f64()).max(0.0);
        Duration::from_secs_f64(capped)
    }

    fn stops_on(&self, err: &AppError) -> bool {
        !err.is_retryable() || self.non_retryable_error_types.iter().any(|code| code == &err.code)
    }
}

/// Run `op` until it succeeds, fails terminally, exhausts attempts, or `cancel` fires.
///
/// Each attempt is bounded by the start-to-close timeout; a timed-out attempt is
/// retryable. `op` receives the 1-based attempt number.
pub async fn with_retry<T, F, Fut>(
    options: &ActivityOptions,
    cancel: &CancellationToken,
    label: &str,
    mut op: F,
) -> Result<T, AppError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let policy = &options.retry;
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let outcome = tokio::select! {
            _ = cancel.cancelled() => return Err(cancelled(label)),
            result = tokio::time::timeout(options.start_to_close_timeout, op(attempt)) => result,
        };
        let err = match outcome {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) => err,
            Err(_) => AppError::new(
                ErrorCategory::TimeoutError,
                format!(
                    "{} timed out after {}",
                    label,
                    humantime::format_duration(options.start_to_close_timeout)
                ),
            )
            .with_code("WFG-EXEC-002"),
        };

        if policy.stops_on(&err) {
            return Err(err);
        }
        if attempt >= policy.maximum_attempts {
            tracing::warn!(call = label, attempts = attempt, error = %err, "retries exhausted");
            let mut exhausted = err;
            exhausted.message = format!(
                "{} (failed after {} attempts)",
                exhausted.message, attempt
            );
            return Err(exhausted.non_retryable());
        }

        let base = policy.delay_after(attempt);
        let jitter_ms = (base.as_millis() as u64) / 10;
        let delay = if jitter_ms > 0 {
            base + Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        } else {
            base
        };
        tracing::debug!(
            call = label,
            attempt,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "retrying external call"
        );
        tokio::select! {
            _ = cancel.cancelled() => return Err(cancelled(label)),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

fn cancelled(label: &str) -> AppError {
    AppError::new(
        ErrorCategory::CancelledError,
        format!("{} cancelled", label),
    )
    .with_code("WFG-EXEC-003")
}
