#![allow(clippy::result_large_err)] // Schedule store APIs propagate AppError with WFG-SCHED codes.

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use crate::core::workflow_graph::schema::{ScheduleSpec, WorkflowDefinition};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleTrigger {
    Cron(String),
    Interval(Duration),
}

/// An installed recurring schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleRecord {
    /// `<namespace>-<name>`.
    pub id: String,
    /// Workflow started on every tick.
    pub workflow: String,
    pub task_queue: String,
    pub trigger: ScheduleTrigger,
    pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn list(&self) -> Result<Vec<ScheduleRecord>, AppError>;
    async fn create(&self, record: ScheduleRecord) -> Result<(), AppError>;
    async fn delete(&self, id: &str) -> Result<(), AppError>;
}

/// Process-local schedule store.
#[derive(Debug, Default)]
pub struct InMemoryScheduleStore {
    schedules: DashMap<String, ScheduleRecord>,
}

impl InMemoryScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<ScheduleRecord> {
        self.schedules.get(id).map(|entry| entry.value().clone())
    }
}

#[async_trait]
impl ScheduleStore for InMemoryScheduleStore {
    async fn list(&self) -> Result<Vec<ScheduleRecord>, AppError> {
        let mut records: Vec<ScheduleRecord> = self
            .schedules
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    async fn create(&self, record: ScheduleRecord) -> Result<(), AppError> {
        if self.schedules.contains_key(&record.id) {
            return Err(AppError::new(
                ErrorCategory::ValidationError,
                format!("schedule '{}' already exists", record.id),
            )
            .with_code("WFG-SCHED-002"));
        }
        self.schedules.insert(record.id.clone(), record);
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), AppError> {
        self.schedules.remove(id);
        Ok(())
    }
}

/// Translate a schedule spec into its trigger.
pub fn trigger_for(spec: &ScheduleSpec) -> Result<ScheduleTrigger, AppError> {
    spec.validate()?;
    match (&spec.cron, &spec.every) {
        (Some(cron), _) => Ok(ScheduleTrigger::Cron(cron.trim().to_string())),
        (None, Some(every)) => humantime::parse_duration(every.trim())
            .map(ScheduleTrigger::Interval)
            .map_err(|err| {
                AppError::new(ErrorCategory::ValidationError, err.to_string())
                    .with_code("WFG-SCHED-001")
            }),
        (None, None) => Err(AppError::new(
            ErrorCategory::ValidationError,
            "schedule must set cron or every",
        )
        .with_code("WFG-SCHED-001")),
    }
}

/// Replace whatever is installed under the workflow's identity with its current schedule.
///
/// Prior schedules are always deleted first; a definition without a schedule leaves
/// nothing installed and returns `None`.
pub async fn register_schedule(
    store: &dyn ScheduleStore,
    definition: &WorkflowDefinition,
) -> Result<Option<ScheduleRecord>, AppError> {
    let id = definition.document.identity();
    let trigger = definition.schedule.as_ref().map(trigger_for).transpose()?;

    for existing in store.list().await? {
        if existing.id == id {
            tracing::info!(schedule = %id, "removing prior schedule");
            store.delete(&existing.id).await?;
        }
    }

    let Some(trigger) = trigger else {
        return Ok(None);
    };
    let record = ScheduleRecord {
        id: id.clone(),
        workflow: definition.document.name.clone(),
        task_queue: definition.document.namespace.clone(),
        trigger,
        created_at: Utc::now(),
    };
    store.create(record.clone()).await?;
    tracing::info!(schedule = %id, workflow = %record.workflow, "installed schedule");
    Ok(Some(record))
}
