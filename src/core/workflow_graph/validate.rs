//! Validation-only mode: the full convert, parse, validate, and compile pipeline
//! with no backend attached and no I/O performed.

#![allow(clippy::result_large_err)] // Pipeline stages return AppError so categories decide Invalid vs Failed.

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use crate::core::workflow_graph::compiler::{compile_definition, CompileOptions};
use crate::core::workflow_graph::converter;
use crate::core::workflow_graph::definition::WorkflowSpec;
use crate::core::workflow_graph::schema::WorkflowDefinition;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::panic::{catch_unwind, AssertUnwindSafe};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationState {
    Valid,
    /// The specification has user-fixable problems.
    Invalid,
    /// Validation itself could not complete.
    Failed,
}

impl ValidationState {
    pub fn as_str(self) -> &'static str {
        match self {
            ValidationState::Valid => "VALID",
            ValidationState::Invalid => "INVALID",
            ValidationState::Failed => "FAILED",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub state: ValidationState,
    /// Canonical DSL; empty unless the state is `Valid`.
    pub yaml: String,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub validated_at: DateTime<Utc>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.state == ValidationState::Valid
    }

    /// A rejection the user can fix, such as a specification that does not decode.
    pub fn invalid(error: impl Into<String>) -> Self {
        Self::rejected(ValidationState::Invalid, error.into())
    }

    /// A rejection caused by the runner itself, such as an unreadable file.
    pub fn failed(error: impl Into<String>) -> Self {
        Self::rejected(ValidationState::Failed, error.into())
    }

    fn valid(yaml: String, warnings: Vec<String>) -> Self {
        ValidationResult {
            state: ValidationState::Valid,
            yaml,
            errors: Vec::new(),
            warnings,
            validated_at: Utc::now(),
        }
    }

    fn rejected(state: ValidationState, error: String) -> Self {
        ValidationResult {
            state,
            yaml: String::new(),
            errors: vec![error],
            warnings: Vec::new(),
            validated_at: Utc::now(),
        }
    }

    fn from_error(err: &AppError) -> Self {
        let state = match err.category {
            ErrorCategory::InternalError | ErrorCategory::SerializationError => {
                ValidationState::Failed
            }
            _ => ValidationState::Invalid,
        };
        let mut message = err.message.clone();
        if let Some(task) = err.context.get("task") {
            if !message.contains(task.as_str()) {
                message = format!("task '{}': {}", task, message);
            }
        }
        Self::rejected(state, message)
    }
}

/// Validate a typed specification end to end.
pub fn validate(spec: Option<&WorkflowSpec>) -> ValidationResult {
    let Some(spec) = spec else {
        return ValidationResult::rejected(
            ValidationState::Failed,
            "workflow spec cannot be nil".to_string(),
        );
    };
    guarded(|| {
        let yaml = converter::convert_to_yaml(Some(spec))?;
        check_yaml(&yaml)
    })
}

/// Validate an already-serialized DSL document.
pub fn validate_yaml(text: &str) -> ValidationResult {
    guarded(|| check_yaml(text))
}

fn guarded<F>(pipeline: F) -> ValidationResult
where
    F: FnOnce() -> Result<ValidationResult, AppError>,
{
    match catch_unwind(AssertUnwindSafe(pipeline)) {
        Ok(Ok(result)) => result,
        Ok(Err(err)) => {
            tracing::debug!(code = %err.code, error = %err, "workflow rejected");
            ValidationResult::from_error(&err)
        }
        Err(panic) => {
            let detail = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(panic = %detail, "validation panicked");
            ValidationResult::rejected(
                ValidationState::Failed,
                format!("internal error during validation: {}", detail),
            )
        }
    }
}

fn check_yaml(text: &str) -> Result<ValidationResult, AppError> {
    let definition = WorkflowDefinition::parse(text)?;
    definition.validate()?;
    compile_definition(&definition, CompileOptions::validation_only())?;

    let mut warnings = Vec::new();
    if definition.schedule.is_some() {
        warnings.push(format!(
            "schedule for '{}' is valid but is installed only when the workflow is registered",
            definition.document.identity()
        ));
    }
    Ok(ValidationResult::valid(definition.to_yaml()?, warnings))
}
