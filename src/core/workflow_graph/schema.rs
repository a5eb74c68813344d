#![allow(clippy::result_large_err)] // Workflow schema APIs return AppError to preserve structured validation context without boxing.

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use crate::core::workflow_graph::tasks::{decode_task_list, encode_task_list, TaskEntry, TaskKind};
use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// DSL versions this crate can compile.
pub const SUPPORTED_DSL: &str = ">=1.0.0, <2.0.0";

const TOP_LEVEL_KEYS: [&str; 5] = ["document", "schedule", "timeout", "metadata", "do"];

/// Immutable header of a workflow definition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct WorkflowDocument {
    #[serde(default)]
    pub dsl: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl WorkflowDocument {
    /// Schedule and registry identity: `<namespace>-<name>`.
    pub fn identity(&self) -> String {
        format!("{}-{}", self.namespace, self.name)
    }
}

/// Recurrence for a whole workflow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduleSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub every: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
}

impl ScheduleSpec {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.after.is_some() {
            return Err(schedule_error("schedule.after not supported"));
        }
        match (&self.cron, &self.every) {
            (Some(_), Some(_)) => Err(schedule_error(
                "schedule must set only one of cron or every",
            )),
            (None, None) => Err(schedule_error("schedule must set cron or every")),
            (Some(cron), None) => cron
                .parse::<croner::Cron>()
                .map(|_| ())
                .map_err(|err| schedule_error(format!("invalid cron expression '{}': {}", cron, err))),
            (None, Some(every)) => match humantime::parse_duration(every.trim()) {
                Ok(interval) if !interval.is_zero() => Ok(()),
                Ok(_) => Err(schedule_error("schedule.every must be greater than zero")),
                Err(err) => Err(schedule_error(format!(
                    "invalid schedule interval '{}': {}",
                    every, err
                ))),
            },
        }
    }
}

fn schedule_error(message: impl Into<String>) -> AppError {
    AppError::new(ErrorCategory::ValidationError, message).with_code("WFG-SCHED-001")
}

/// A parsed DSL workflow definition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowDefinition {
    pub document: WorkflowDocument,
    pub schedule: Option<ScheduleSpec>,
    /// Document-level `timeout.after`.
    pub timeout: Option<String>,
    /// Document metadata; `activityOptions` here apply to every call.
    pub metadata: Map<String, Value>,
    pub tasks: Vec<TaskEntry>,
}

/// Parse a YAML (or JSON) DSL document.
pub fn parse(text: &str) -> Result<WorkflowDefinition, AppError> {
    WorkflowDefinition::parse(text)
}

pub fn load_workflow(path: &Path) -> Result<WorkflowDefinition, AppError> {
    WorkflowDefinition::load_from_file(path)
}

impl WorkflowDefinition {
    pub fn parse(text: &str) -> Result<Self, AppError> {
        let raw: Value = serde_yaml::from_str(text).map_err(|err| {
            AppError::new(
                ErrorCategory::ConfigurationError,
                format!("failed to parse workflow document: {}", err),
            )
            .with_code("WFG-DSL-002")
        })?;
        Self::from_value(&raw)
    }

    pub fn load_from_file(path: &Path) -> Result<Self, AppError> {
        let text = fs::read_to_string(path).map_err(|err| {
            AppError::new(
                ErrorCategory::IoError,
                format!("failed to read {}: {}", path.display(), err),
            )
        })?;
        Self::parse(&text)
    }

    pub fn from_value(raw: &Value) -> Result<Self, AppError> {
        let root = raw.as_object().ok_or_else(|| {
            AppError::new(
                ErrorCategory::ConfigurationError,
                "workflow document must be a map",
            )
            .with_code("WFG-DSL-002")
        })?;
        if let Some(key) = root.keys().find(|key| !TOP_LEVEL_KEYS.contains(&key.as_str())) {
            return Err(AppError::new(
                ErrorCategory::ConfigurationError,
                format!("unknown top-level key '{}'", key),
            )
            .with_code("WFG-DSL-002"));
        }

        let document: WorkflowDocument =
            serde_json::from_value(root.get("document").cloned().unwrap_or(Value::Null))
                .map_err(|err| {
                    AppError::new(
                        ErrorCategory::ConfigurationError,
                        format!("invalid document header: {}", err),
                    )
                    .with_code("WFG-DSL-002")
                })?;
        if !document.dsl.trim().is_empty() {
            check_dsl_version(&document.dsl)?;
        }

        let schedule = match root.get("schedule") {
            None | Some(Value::Null) => None,
            Some(raw) => Some(serde_json::from_value::<ScheduleSpec>(raw.clone()).map_err(
                |err| {
                    AppError::new(
                        ErrorCategory::ConfigurationError,
                        format!("invalid schedule: {}", err),
                    )
                    .with_code("WFG-DSL-002")
                },
            )?),
        };

        let timeout = match root.get("timeout") {
            None | Some(Value::Null) => None,
            Some(Value::Object(timeout)) => match timeout.get("after") {
                Some(Value::String(after)) if timeout.len() == 1 => Some(after.clone()),
                _ => {
                    return Err(AppError::new(
                        ErrorCategory::ConfigurationError,
                        "timeout must be a map with a single 'after' duration",
                    )
                    .with_code("WFG-DSL-002"))
                }
            },
            Some(_) => {
                return Err(AppError::new(
                    ErrorCategory::ConfigurationError,
                    "timeout must be a map with a single 'after' duration",
                )
                .with_code("WFG-DSL-002"))
            }
        };

        let metadata = match root.get("metadata") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(_) => {
                return Err(AppError::new(
                    ErrorCategory::ConfigurationError,
                    "metadata must be a map",
                )
                .with_code("WFG-DSL-002"))
            }
        };

        let tasks = match root.get("do") {
            None | Some(Value::Null) => Vec::new(),
            Some(list) => decode_task_list(list, "do")?,
        };

        Ok(WorkflowDefinition {
            document,
            schedule,
            timeout,
            metadata,
            tasks,
        })
    }

    pub fn to_value(&self) -> Value {
        let mut root = Map::new();
        root.insert(
            "document".to_string(),
            serde_json::to_value(&self.document).unwrap_or(Value::Null),
        );
        if let Some(schedule) = &self.schedule {
            root.insert(
                "schedule".to_string(),
                serde_json::to_value(schedule).unwrap_or(Value::Null),
            );
        }
        if let Some(after) = &self.timeout {
            let mut timeout = Map::new();
            timeout.insert("after".to_string(), Value::String(after.clone()));
            root.insert("timeout".to_string(), Value::Object(timeout));
        }
        if !self.metadata.is_empty() {
            root.insert("metadata".to_string(), Value::Object(self.metadata.clone()));
        }
        root.insert("do".to_string(), encode_task_list(&self.tasks));
        Value::Object(root)
    }

    /// Canonical YAML: sorted keys, optional fields left out.
    pub fn to_yaml(&self) -> Result<String, AppError> {
        serde_yaml::to_string(&self.to_value()).map_err(|err| {
            AppError::new(
                ErrorCategory::SerializationError,
                format!("failed to serialize workflow: {}", err),
            )
            .with_code("WFG-DSL-007")
        })
    }

    /// Structural checks. Per-kind consistency is left to the compiler.
    pub fn validate(&self) -> Result<(), AppError> {
        for (field, value) in [
            ("document.dsl", &self.document.dsl),
            ("document.namespace", &self.document.namespace),
            ("document.name", &self.document.name),
            ("document.version", &self.document.version),
        ] {
            if value.trim().is_empty() {
                return Err(AppError::new(
                    ErrorCategory::ValidationError,
                    format!("{} is required", field),
                )
                .with_code("WFG-DSL-003"));
            }
        }

        if self.tasks.is_empty() {
            return Err(AppError::new(
                ErrorCategory::ValidationError,
                "workflow must have at least one task",
            )
            .with_code("WFG-DSL-004"));
        }

        validate_task_list(&self.tasks, "do")?;

        if let Some(schedule) = &self.schedule {
            schedule.validate()?;
        }
        if let Some(after) = &self.timeout {
            humantime::parse_duration(after.trim()).map_err(|err| {
                AppError::new(
                    ErrorCategory::ValidationError,
                    format!("timeout.after '{}' is not a duration: {}", after, err),
                )
                .with_code("WFG-DSL-003")
            })?;
        }
        Ok(())
    }
}

fn check_dsl_version(raw: &str) -> Result<(), AppError> {
    let unsupported = || {
        AppError::new(
            ErrorCategory::UnsupportedDsl,
            format!(
                "unsupported DSL version '{}', expected {}",
                raw, SUPPORTED_DSL
            ),
        )
        .with_code("WFG-DSL-001")
    };
    let requirement = VersionReq::parse(SUPPORTED_DSL).map_err(|err| {
        AppError::new(
            ErrorCategory::InternalError,
            format!("invalid DSL requirement: {}", err),
        )
    })?;
    let version = parse_dsl_version(raw).ok_or_else(unsupported)?;
    if requirement.matches(&version) {
        Ok(())
    } else {
        Err(unsupported())
    }
}

/// Accepts `1`, `1.0` and `1.0.0` spellings.
fn parse_dsl_version(raw: &str) -> Option<Version> {
    let trimmed = raw.trim().trim_start_matches('v');
    let padded = match trimmed.split('.').count() {
        1 => format!("{}.0.0", trimmed),
        2 => format!("{}.0", trimmed),
        _ => trimmed.to_string(),
    };
    Version::parse(&padded).ok()
}

fn validate_task_list(tasks: &[TaskEntry], scope: &str) -> Result<(), AppError> {
    let mut names = HashSet::new();
    for entry in tasks {
        if entry.name.trim().is_empty() {
            return Err(AppError::new(
                ErrorCategory::ValidationError,
                format!("task name is required in {}", scope),
            )
            .with_code("WFG-DSL-005"));
        }
        if !names.insert(entry.name.as_str()) {
            return Err(AppError::new(
                ErrorCategory::ValidationError,
                format!("duplicate task name '{}' in {}", entry.name, scope),
            )
            .with_code("WFG-DSL-005"));
        }
    }

    for entry in tasks {
        let mut targets: Vec<&str> = entry.task.then.iter().filter_map(|t| t.target()).collect();
        if let TaskKind::Switch(cases) = &entry.task.kind {
            targets.extend(
                cases
                    .iter()
                    .filter_map(|case| case.then.as_ref().and_then(|t| t.target())),
            );
        }
        if let Some(missing) = targets.into_iter().find(|target| !names.contains(target)) {
            return Err(AppError::new(
                ErrorCategory::ValidationError,
                format!(
                    "task '{}' flows to '{}', which is not a task in {}",
                    entry.name, missing, scope
                ),
            )
            .with_code("WFG-DSL-006"));
        }

        for (label, nested) in entry.task.kind.nested_lists() {
            validate_task_list(nested, &format!("{} > {} {}", scope, entry.name, label))?;
        }
    }
    Ok(())
}
