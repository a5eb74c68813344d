//! In-process [`ExecutionBackend`] used by the CLI and the test suite.

#![allow(clippy::result_large_err)] // Backend calls return AppError so retry classification survives.

use crate::core::config::RunnerConfig;
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use crate::core::workflow_graph::backend::{
    ChildWorkflowRequest, ExecutionBackend, GrpcInvoker, GrpcRequest, HttpRequest, HttpResponse,
    ListenRequest,
};
use crate::core::workflow_graph::compiler::{compile_definition, CompileOptions};
use crate::core::workflow_graph::executor::WorkflowExecutor;
use crate::core::workflow_graph::http::HttpClient;
use crate::core::workflow_graph::schema::WorkflowDefinition;
use crate::core::workflow_graph::search_attributes::SearchAttributeUpdate;
use crate::core::workflow_graph::tasks::ListenMode;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

pub struct LocalBackend {
    this: Weak<LocalBackend>,
    http: HttpClient,
    grpc: Option<Arc<dyn GrpcInvoker>>,
    options: CompileOptions,
    workflows: DashMap<String, WorkflowDefinition>,
    events: Mutex<Vec<Value>>,
    event_arrived: Notify,
    search_attributes: DashMap<String, Value>,
}

impl std::fmt::Debug for LocalBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalBackend")
            .field("workflows", &self.workflows.len())
            .field("grpc", &self.grpc.is_some())
            .finish()
    }
}

impl LocalBackend {
    pub fn new(config: &RunnerConfig) -> Result<Arc<Self>, AppError> {
        Self::with_grpc(config, None)
    }

    /// Backend whose gRPC calls go through `invoker`.
    pub fn with_grpc(
        config: &RunnerConfig,
        invoker: Option<Arc<dyn GrpcInvoker>>,
    ) -> Result<Arc<Self>, AppError> {
        let http = HttpClient::new(&config.http)?;
        let options = CompileOptions::from_config(config)?;
        Ok(Arc::new_cyclic(|this| LocalBackend {
            this: this.clone(),
            http,
            grpc: invoker,
            options,
            workflows: DashMap::new(),
            events: Mutex::new(Vec::new()),
            event_arrived: Notify::new(),
            search_attributes: DashMap::new(),
        }))
    }

    /// Make a definition available to `run` tasks under its document name.
    pub fn register_workflow(&self, definition: WorkflowDefinition) {
        tracing::debug!(workflow = %definition.document.name, "registered child workflow");
        self.workflows
            .insert(definition.document.name.clone(), definition);
    }

    /// Deliver an event to current or future listeners.
    pub fn publish_event(&self, event: Value) {
        if let Ok(mut log) = self.events.lock() {
            log.push(event);
        }
        self.event_arrived.notify_waiters();
    }

    pub fn pending_events(&self) -> usize {
        self.events.lock().map(|log| log.len()).unwrap_or(0)
    }

    pub fn search_attribute(&self, name: &str) -> Option<Value> {
        self.search_attributes
            .get(name)
            .map(|entry| entry.value().clone())
    }

    pub fn search_attributes(&self) -> BTreeMap<String, Value> {
        self.search_attributes
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Consume logged events against the filters still waiting. True once the mode is satisfied.
    fn take_matches(&self, mode: ListenMode, filters: &[Value], matched: &mut [Option<Value>]) -> bool {
        let Ok(mut log) = self.events.lock() else {
            return false;
        };
        let mut index = 0;
        while index < log.len() {
            let slot = filters.iter().enumerate().position(|(i, filter)| {
                matched.get(i).map(Option::is_none).unwrap_or(false)
                    && event_matches(filter, &log[index])
            });
            match slot {
                Some(slot) => {
                    matched[slot] = Some(log.remove(index));
                    if mode != ListenMode::All {
                        return true;
                    }
                }
                None => index += 1,
            }
        }
        matched.iter().all(Option::is_some)
    }
}

/// A filter matches when every field under its `with` (or the filter itself) equals the event's.
pub fn event_matches(filter: &Value, event: &Value) -> bool {
    subset(filter.get("with").unwrap_or(filter), event)
}

fn subset(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Object(expected), Value::Object(actual)) => expected
            .iter()
            .all(|(key, value)| actual.get(key).map(|got| subset(value, got)).unwrap_or(false)),
        _ => expected == actual,
    }
}

fn cancelled(what: &str) -> AppError {
    AppError::new(ErrorCategory::CancelledError, format!("{} cancelled", what))
        .with_code("WFG-EXEC-003")
}

#[async_trait]
impl ExecutionBackend for LocalBackend {
    async fn call_http(
        &self,
        request: &HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, AppError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(cancelled("http call")),
            response = self.http.send(request) => response,
        }
    }

    async fn call_grpc(
        &self,
        request: &GrpcRequest,
        cancel: &CancellationToken,
    ) -> Result<Value, AppError> {
        let Some(invoker) = &self.grpc else {
            return Err(AppError::new(
                ErrorCategory::ConfigurationError,
                format!(
                    "no gRPC invoker configured for {}/{}",
                    request.service.name, request.method
                ),
            )
            .with_code("WFG-GRPC-001")
            .non_retryable());
        };
        tokio::select! {
            _ = cancel.cancelled() => Err(cancelled("grpc call")),
            response = invoker.invoke(request) => response,
        }
    }

    async fn sleep(&self, duration: Duration, cancel: &CancellationToken) -> Result<(), AppError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(cancelled("wait")),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    async fn listen(
        &self,
        request: &ListenRequest,
        cancel: &CancellationToken,
    ) -> Result<Value, AppError> {
        let deadline = tokio::time::Instant::now() + request.timeout;
        let mut matched: Vec<Option<Value>> = vec![None; request.events.len()];
        loop {
            let notified = self.event_arrived.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.take_matches(request.mode, &request.events, &mut matched) {
                let mut received = matched.into_iter().flatten();
                return Ok(match request.mode {
                    ListenMode::All => Value::Array(received.collect()),
                    ListenMode::One | ListenMode::Any => received.next().unwrap_or(Value::Null),
                });
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(cancelled("listen")),
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(AppError::new(
                        ErrorCategory::TimeoutError,
                        format!(
                            "no matching event within {}",
                            humantime::format_duration(request.timeout)
                        ),
                    )
                    .with_code("WFG-EXEC-007")
                    .non_retryable());
                }
                _ = &mut notified => {}
            }
        }
    }

    async fn run_workflow(
        &self,
        request: &ChildWorkflowRequest,
        cancel: &CancellationToken,
    ) -> Result<Value, AppError> {
        let definition = self
            .workflows
            .get(&request.workflow)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                AppError::new(
                    ErrorCategory::ValidationError,
                    format!("child workflow '{}' is not registered", request.workflow),
                )
                .with_code("WFG-EXEC-008")
            })?;
        let backend: Arc<dyn ExecutionBackend> = self.this.upgrade().ok_or_else(|| {
            AppError::new(ErrorCategory::InternalError, "local backend dropped")
                .with_code("WFG-EXEC-009")
        })?;
        let graph = compile_definition(&definition, self.options.clone().with_backend(backend))?;
        let executor = WorkflowExecutor::new(Arc::new(graph))?;

        if !request.await_completion {
            let input = request.input.clone();
            let workflow = request.workflow.clone();
            tokio::spawn(async move {
                if let Err(err) = executor.execute(input).await {
                    tracing::warn!(workflow = %workflow, error = %err, "detached child workflow failed");
                }
            });
            return Ok(Value::Null);
        }

        let outcome = executor
            .execute_with_cancel(request.input.clone(), cancel.child_token())
            .await?;
        Ok(outcome.output)
    }

    async fn upsert_search_attributes(
        &self,
        updates: &[SearchAttributeUpdate],
    ) -> Result<(), AppError> {
        for update in updates {
            match &update.value {
                Some(value) => {
                    self.search_attributes
                        .insert(update.name.clone(), value.to_json());
                }
                None => {
                    self.search_attributes.remove(&update.name);
                }
            }
        }
        tracing::debug!(count = updates.len(), "upserted search attributes");
        Ok(())
    }
}
