use crate::core::types::ExecutionPhase;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Mutex;
use uuid::Uuid;

/// One phase transition of an execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusUpdate {
    pub execution_id: Uuid,
    pub workflow: String,
    pub phase: ExecutionPhase,
    /// Set on `Failed` only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub at: DateTime<Utc>,
}

impl StatusUpdate {
    pub fn new(execution_id: Uuid, workflow: &str, phase: ExecutionPhase) -> Self {
        StatusUpdate {
            execution_id,
            workflow: workflow.to_string(),
            phase,
            error: None,
            at: Utc::now(),
        }
    }

    pub fn failed(execution_id: Uuid, workflow: &str, error: String) -> Self {
        StatusUpdate {
            error: Some(error),
            ..Self::new(execution_id, workflow, ExecutionPhase::Failed)
        }
    }
}

/// Receives execution phase transitions.
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn report(&self, update: StatusUpdate);
}

/// Writes every transition to the tracing subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingStatusSink;

#[async_trait]
impl StatusSink for TracingStatusSink {
    async fn report(&self, update: StatusUpdate) {
        match &update.error {
            Some(error) => tracing::error!(
                execution_id = %update.execution_id,
                workflow = %update.workflow,
                phase = update.phase.as_str(),
                error = %error,
                "workflow status"
            ),
            None => tracing::info!(
                execution_id = %update.execution_id,
                workflow = %update.workflow,
                phase = update.phase.as_str(),
                "workflow status"
            ),
        }
    }
}

/// Keeps every transition in memory.
#[derive(Debug, Default)]
pub struct RecordingStatusSink {
    updates: Mutex<Vec<StatusUpdate>>,
}

impl RecordingStatusSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updates(&self) -> Vec<StatusUpdate> {
        self.updates
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn phases(&self) -> Vec<ExecutionPhase> {
        self.updates().into_iter().map(|update| update.phase).collect()
    }

    pub fn terminal_count(&self) -> usize {
        self.updates()
            .iter()
            .filter(|update| update.phase.is_terminal())
            .count()
    }
}

#[async_trait]
impl StatusSink for RecordingStatusSink {
    async fn report(&self, update: StatusUpdate) {
        if let Ok(mut guard) = self.updates.lock() {
            guard.push(update);
        }
    }
}
