#![allow(clippy::result_large_err)] // Executor returns AppError to preserve full diagnostic context through nested task lists.

use crate::core::error::AppError;
use crate::core::types::{ErrorCategory, ExecutionPhase};
use crate::core::workflow_graph::activity::with_retry;
use crate::core::workflow_graph::backend::{
    ChildWorkflowRequest, ExecutionBackend, GrpcRequest, HttpRequest, ListenRequest,
};
use crate::core::workflow_graph::compiler::{
    CompiledKind, CompiledTask, ExecutableGraph, ResolvedFlow,
};
use crate::core::workflow_graph::fork::{join_branches, JoinPolicy};
use crate::core::workflow_graph::http::{check_status, scalar_to_string, shape_output};
use crate::core::workflow_graph::search_attributes;
use crate::core::workflow_graph::state::ExecutionState;
use crate::core::workflow_graph::status::{StatusSink, StatusUpdate, TracingStatusSink};
use crate::core::workflow_graph::tasks::{GrpcService, TaskKindTag};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Result of a finished execution.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub execution_id: Uuid,
    pub output: Value,
    pub state: ExecutionState,
    /// Times the execution restarted with fresh history.
    pub continuations: usize,
    /// History length of the final run.
    pub history_length: usize,
}

/// Drives an [`ExecutableGraph`] to completion on its backend.
pub struct WorkflowExecutor {
    graph: Arc<ExecutableGraph>,
    backend: Arc<dyn ExecutionBackend>,
    sink: Arc<dyn StatusSink>,
}

impl std::fmt::Debug for WorkflowExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowExecutor")
            .field("graph", &self.graph)
            .finish()
    }
}

impl WorkflowExecutor {
    pub fn new(graph: Arc<ExecutableGraph>) -> Result<Self, AppError> {
        let backend = graph.backend().cloned().ok_or_else(|| {
            AppError::new(
                ErrorCategory::ConfigurationError,
                format!(
                    "workflow '{}' was compiled without a backend and cannot run",
                    graph.document.name
                ),
            )
            .with_code("WFG-EXEC-001")
            .with_suggestion("Compile with CompileOptions::with_backend")
        })?;
        Ok(WorkflowExecutor {
            graph,
            backend,
            sink: Arc::new(TracingStatusSink),
        })
    }

    pub fn with_status_sink(mut self, sink: Arc<dyn StatusSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn graph(&self) -> &Arc<ExecutableGraph> {
        &self.graph
    }

    pub async fn execute(&self, input: Value) -> Result<ExecutionOutcome, AppError> {
        self.execute_with_cancel(input, CancellationToken::new())
            .await
    }

    /// Run the graph, reporting Pending, InProgress, and exactly one terminal phase.
    pub async fn execute_with_cancel(
        &self,
        input: Value,
        cancel: CancellationToken,
    ) -> Result<ExecutionOutcome, AppError> {
        let execution_id = Uuid::new_v4();
        let workflow = self.graph.document.name.clone();
        self.sink
            .report(StatusUpdate::new(execution_id, &workflow, ExecutionPhase::Pending))
            .await;

        let mut state = ExecutionState::new(input, self.graph.env.clone());
        self.sink
            .report(StatusUpdate::new(
                execution_id,
                &workflow,
                ExecutionPhase::InProgress,
            ))
            .await;
        tracing::info!(execution_id = %execution_id, workflow = %workflow, "workflow started");

        match self.drive(execution_id, &mut state, &cancel).await {
            Ok((continuations, history_length)) => {
                self.sink
                    .report(StatusUpdate::new(
                        execution_id,
                        &workflow,
                        ExecutionPhase::Completed,
                    ))
                    .await;
                tracing::info!(
                    execution_id = %execution_id,
                    workflow = %workflow,
                    continuations,
                    "workflow completed"
                );
                Ok(ExecutionOutcome {
                    execution_id,
                    output: state.output.clone(),
                    state,
                    continuations,
                    history_length,
                })
            }
            Err(err) => {
                self.sink
                    .report(StatusUpdate::failed(execution_id, &workflow, err.to_string()))
                    .await;
                Err(err)
            }
        }
    }

    async fn drive(
        &self,
        execution_id: Uuid,
        state: &mut ExecutionState,
        cancel: &CancellationToken,
    ) -> Result<(usize, usize), AppError> {
        let mut continuations = 0usize;
        loop {
            let ctx = RunContext {
                graph: Arc::clone(&self.graph),
                backend: Arc::clone(&self.backend),
                history: Arc::new(AtomicUsize::new(0)),
                cancel: cancel.clone(),
            };
            state.restore_continuation();

            let outcome = run_list(&ctx, &self.graph.tasks, state, 0).await?;
            match outcome {
                ListOutcome::Completed => return Ok((continuations, ctx.history_length())),
                ListOutcome::Continued(task_id) => {
                    continuations += 1;
                    if continuations > self.graph.max_continuations {
                        return Err(AppError::new(
                            ErrorCategory::InternalError,
                            format!(
                                "execution exceeded {} continuations",
                                self.graph.max_continuations
                            ),
                        )
                        .with_code("WFG-EXEC-006"));
                    }
                    tracing::info!(
                        execution_id = %execution_id,
                        task_id = %task_id,
                        history = ctx.history_length(),
                        "continuing as new"
                    );
                    self.sink
                        .report(StatusUpdate::new(
                            execution_id,
                            &self.graph.document.name,
                            ExecutionPhase::ContinuedAsNew,
                        ))
                        .await;
                    // The carried state crosses the restart as an independent copy.
                    *state = state.clone();
                }
            }
        }
    }
}

/// Run a graph once, reporting through the tracing sink.
pub async fn execute_workflow(
    graph: Arc<ExecutableGraph>,
    input: Value,
) -> Result<ExecutionOutcome, AppError> {
    WorkflowExecutor::new(graph)?.execute(input).await
}

#[derive(Clone)]
struct RunContext {
    graph: Arc<ExecutableGraph>,
    backend: Arc<dyn ExecutionBackend>,
    history: Arc<AtomicUsize>,
    cancel: CancellationToken,
}

impl RunContext {
    fn with_cancel(&self, cancel: CancellationToken) -> Self {
        RunContext {
            cancel,
            ..self.clone()
        }
    }

    fn record_history(&self) {
        self.history.fetch_add(1, Ordering::SeqCst);
    }

    fn history_length(&self) -> usize {
        self.history.load(Ordering::SeqCst)
    }

    fn check_cancelled(&self) -> Result<(), AppError> {
        if self.cancel.is_cancelled() {
            return Err(AppError::new(ErrorCategory::CancelledError, "execution cancelled")
                .with_code("WFG-EXEC-003"));
        }
        Ok(())
    }
}

enum ListOutcome {
    Completed,
    /// Stopped ahead of the given task id so the execution can restart.
    Continued(String),
}

struct TaskResult {
    value: Value,
    /// Overrides the task's own `then`, set by a matching switch case.
    flow: Option<ResolvedFlow>,
}

impl TaskResult {
    fn value(value: Value) -> Self {
        TaskResult { value, flow: None }
    }
}

fn run_list<'a>(
    ctx: &'a RunContext,
    tasks: &'a [CompiledTask],
    state: &'a mut ExecutionState,
    depth: usize,
) -> BoxFuture<'a, Result<ListOutcome, AppError>> {
    async move {
        let engine = Arc::clone(ctx.graph.engine());
        let max_history = ctx.graph.max_history_length;
        let mut resume = if depth == 0 {
            state.continue_from.take()
        } else {
            None
        };
        let mut index = 0usize;
        let mut visits = 0usize;

        while let Some(task) = tasks.get(index) {
            ctx.check_cancelled()?;

            if depth == 0 && max_history > 0 && ctx.history_length() > max_history {
                state.mark_continuation(&task.id);
                return Ok(ListOutcome::Continued(task.id.clone()));
            }

            if let Some(target) = &resume {
                if *target == task.id {
                    resume = None;
                } else if task.tag() != TaskKindTag::Listen {
                    tracing::debug!(task_id = %task.id, resume_at = %target, "skipping ahead of resume point");
                    index += 1;
                    continue;
                }
            }

            visits += 1;
            if visits > ctx.graph.max_task_iterations {
                return Err(AppError::new(
                    ErrorCategory::ValidationError,
                    format!(
                        "task list exceeded {} task visits",
                        ctx.graph.max_task_iterations
                    ),
                )
                .with_code("WFG-EXEC-004")
                .in_task(&task.name));
            }

            ctx.record_history();
            state.set_current_task(&task.name);

            if !engine
                .check_condition(task.condition.as_deref(), state)
                .map_err(|err| err.in_task(&task.name))?
            {
                tracing::debug!(task = %task.name, task_id = %task.id, "guard false, skipping");
                index += 1;
                continue;
            }

            upsert_search_attributes(ctx, task, state)
                .await
                .map_err(|err| err.in_task(&task.name))?;

            tracing::debug!(task = %task.name, task_id = %task.id, kind = %task.tag(), "running task");
            let result = run_task(ctx, task, state, depth)
                .await
                .map_err(|err| err.in_task(&task.name))?;

            state.output = result.value;
            if let Some(transform) = &task.output {
                state.output = engine
                    .traverse_and_evaluate(transform, state)
                    .map_err(|err| err.in_task(&task.name))?;
            }
            if let Some(export) = &task.export {
                let exported = engine
                    .traverse_and_evaluate(export, state)
                    .map_err(|err| err.in_task(&task.name))?;
                state.merge_export(&task.name, exported);
            }

            match result.flow.unwrap_or(task.flow) {
                ResolvedFlow::Next => index += 1,
                ResolvedFlow::End | ResolvedFlow::Exit => break,
                ResolvedFlow::Jump(target) => index = target,
            }
        }
        Ok(ListOutcome::Completed)
    }
    .boxed()
}

async fn upsert_search_attributes(
    ctx: &RunContext,
    task: &CompiledTask,
    state: &ExecutionState,
) -> Result<(), AppError> {
    if task.search_attributes.is_empty() {
        return Ok(());
    }
    let engine = ctx.graph.engine();
    let mut updates = Vec::with_capacity(task.search_attributes.len());
    for spec in &task.search_attributes {
        let value = engine.traverse_and_evaluate(&spec.value, state)?;
        updates.push(search_attributes::project(&spec.name, spec.attr_type, &value)?);
    }
    ctx.backend.upsert_search_attributes(&updates).await
}

fn run_task<'a>(
    ctx: &'a RunContext,
    task: &'a CompiledTask,
    state: &'a mut ExecutionState,
    depth: usize,
) -> BoxFuture<'a, Result<TaskResult, AppError>> {
    async move {
        let engine = Arc::clone(ctx.graph.engine());
        match &task.kind {
            CompiledKind::Set(values) => {
                let evaluated = engine.traverse_and_evaluate(&Value::Object(values.clone()), state)?;
                if let Value::Object(entries) = &evaluated {
                    state.add_data(entries.clone());
                }
                Ok(TaskResult::value(evaluated))
            }

            CompiledKind::HttpCall(http) => {
                let request = HttpRequest {
                    method: http.method.trim().to_ascii_uppercase(),
                    uri: scalar_to_string(&engine.evaluate(&http.endpoint, state)?),
                    headers: evaluate_strings(&engine, &http.headers, state)?,
                    query: evaluate_strings(&engine, &http.query, state)?,
                    body: match &http.body {
                        Some(body) => Some(engine.traverse_and_evaluate(body, state)?),
                        None => None,
                    },
                    timeout: http.timeout_seconds.map(Duration::from_secs),
                };
                let label = format!("{} {}", request.method, request.uri);
                let backend = &ctx.backend;
                let cancel = &ctx.cancel;
                let request_ref = &request;
                let response = with_retry(&task.activity, cancel, &label, |attempt| {
                    ctx.record_history();
                    tracing::debug!(task = %task.name, attempt, "http attempt");
                    async move {
                        let response = backend.call_http(request_ref, cancel).await?;
                        check_status(request_ref, &response)?;
                        Ok(response)
                    }
                })
                .await?;
                let shaped = shape_output(http.output, &request, &response);
                state.set_data(&task.name, shaped.clone());
                Ok(TaskResult::value(shaped))
            }

            CompiledKind::GrpcCall(grpc) => {
                let request = GrpcRequest {
                    service: GrpcService {
                        name: scalar_to_string(&engine.evaluate(&grpc.service.name, state)?),
                        host: grpc.service.host.clone(),
                        port: grpc.service.port,
                    },
                    method: scalar_to_string(&engine.evaluate(&grpc.method, state)?),
                    request: match &grpc.request {
                        Some(payload) => engine.traverse_and_evaluate(payload, state)?,
                        None => Value::Object(Map::new()),
                    },
                };
                let label = format!("{}/{}", request.service.name, request.method);
                let backend = &ctx.backend;
                let cancel = &ctx.cancel;
                let request_ref = &request;
                let value = with_retry(&task.activity, cancel, &label, |attempt| {
                    ctx.record_history();
                    tracing::debug!(task = %task.name, attempt, "grpc attempt");
                    async move { backend.call_grpc(request_ref, cancel).await }
                })
                .await?;
                state.set_data(&task.name, value.clone());
                Ok(TaskResult::value(value))
            }

            CompiledKind::Switch { cases, default } => {
                for case in cases {
                    if engine.check_condition(Some(case.when.as_str()), state)? {
                        tracing::debug!(task = %task.name, case = ?case.name, "switch case matched");
                        return Ok(switch_result(state, case.flow));
                    }
                }
                match default {
                    Some(flow) => Ok(switch_result(state, *flow)),
                    None => Ok(TaskResult::value(state.output.clone())),
                }
            }

            CompiledKind::For {
                each,
                at,
                collection,
                while_condition,
                body,
            } => {
                let evaluated = engine.traverse_and_evaluate(collection, state)?;
                let items = iteration_items(evaluated)?;
                let mut last = Value::Null;
                for (position, item) in items {
                    let mut iteration = state.clone();
                    iteration.set_data(each, item);
                    iteration.set_data(at, position);
                    if let Some(condition) = while_condition {
                        if !engine.check_condition(Some(condition.as_str()), &iteration)? {
                            break;
                        }
                    }
                    run_list(ctx, body, &mut iteration, depth + 1).await?;
                    last = iteration.output;
                }
                Ok(TaskResult::value(last))
            }

            CompiledKind::Fork { compete, branches } => {
                let names: Vec<String> = branches.iter().map(|b| b.name.clone()).collect();
                let parent_state: &ExecutionState = state;
                let outcome = join_branches(
                    JoinPolicy::from_compete(*compete),
                    &ctx.cancel,
                    &names,
                    |index, handle| {
                        let branch_ctx = ctx.with_cancel(handle.token());
                        let body = branches
                            .get(index)
                            .map(|branch| Arc::clone(&branch.body));
                        let mut branch_state = parent_state.branch_clone();
                        let branch = handle.name.clone();
                        async move {
                            let Some(body) = body else {
                                return Ok(Value::Null);
                            };
                            tracing::debug!(branch = %branch, "fork branch running");
                            run_list(&branch_ctx, &body, &mut branch_state, depth + 1).await?;
                            Ok(branch_state.output)
                        }
                    },
                )
                .await?;
                if !outcome.cancelled.is_empty() {
                    tracing::debug!(
                        task = %task.name,
                        winner = ?outcome.winner,
                        cancelled = ?outcome.cancelled,
                        "race losers cancelled"
                    );
                }
                Ok(TaskResult::value(outcome.output))
            }

            CompiledKind::Try { body, catch } => {
                let attempt = run_list(ctx, body, state, depth + 1).await;
                match attempt {
                    Ok(_) => Ok(TaskResult::value(state.output.clone())),
                    Err(err) if err.category == ErrorCategory::CancelledError => Err(err),
                    Err(err) => {
                        let Some(catch) = catch else {
                            return Err(err);
                        };
                        tracing::debug!(task = %task.name, error = %err, "caught task failure");
                        state.set_data(&catch.as_name, err.to_value());
                        run_list(ctx, &catch.body, state, depth + 1).await?;
                        Ok(TaskResult::value(state.output.clone()))
                    }
                }
            }

            CompiledKind::Listen {
                mode,
                events,
                timeout,
            } => {
                ctx.record_history();
                let request = ListenRequest {
                    mode: *mode,
                    events: events.clone(),
                    timeout: *timeout,
                };
                let event = ctx.backend.listen(&request, &ctx.cancel).await?;
                Ok(TaskResult::value(event))
            }

            CompiledKind::Wait(duration) => {
                ctx.record_history();
                ctx.backend.sleep(*duration, &ctx.cancel).await?;
                Ok(TaskResult::value(state.output.clone()))
            }

            CompiledKind::Raise(raise) => {
                let title = match &raise.title {
                    Some(title) => scalar_to_string(&engine.evaluate(title, state)?),
                    None => raise.error_type.clone(),
                };
                let detail = match &raise.message {
                    Some(message) => scalar_to_string(&engine.evaluate(message, state)?),
                    None => title.clone(),
                };
                let mut err = AppError::new(ErrorCategory::TaskError, detail.clone())
                    .with_code("WFG-RAISE-001")
                    .non_retryable();
                err.add_context("type", &raise.error_type);
                err.add_context("title", &title);
                err.add_context("detail", &detail);
                if let Some(status) = raise.status {
                    err.add_context("status", &status.to_string());
                }
                Err(err)
            }

            CompiledKind::Run(run) => {
                ctx.record_history();
                let input = match &run.input {
                    Some(input) => engine.traverse_and_evaluate(input, state)?,
                    None => Value::Null,
                };
                let request = ChildWorkflowRequest {
                    workflow: run.workflow.clone(),
                    input,
                    await_completion: run.await_completion,
                };
                let result = ctx.backend.run_workflow(&request, &ctx.cancel).await?;
                Ok(TaskResult::value(if run.await_completion {
                    result
                } else {
                    Value::Null
                }))
            }
        }
    }
    .boxed()
}

fn switch_result(state: &ExecutionState, flow: ResolvedFlow) -> TaskResult {
    TaskResult {
        value: state.output.clone(),
        flow: match flow {
            ResolvedFlow::Next => None,
            other => Some(other),
        },
    }
}

fn evaluate_strings(
    engine: &crate::core::workflow_graph::expression::ExpressionEngine,
    values: &Map<String, Value>,
    state: &ExecutionState,
) -> Result<BTreeMap<String, String>, AppError> {
    values
        .iter()
        .map(|(key, value)| {
            let evaluated = engine.traverse_and_evaluate(value, state)?;
            Ok((key.clone(), scalar_to_string(&evaluated)))
        })
        .collect()
}

/// `(position, item)` pairs for a for-loop collection.
fn iteration_items(collection: Value) -> Result<Vec<(Value, Value)>, AppError> {
    match collection {
        Value::Array(items) => Ok(items
            .into_iter()
            .enumerate()
            .map(|(index, item)| (Value::from(index), item))
            .collect()),
        Value::Object(map) => Ok(map
            .into_iter()
            .map(|(key, item)| (Value::String(key), item))
            .collect()),
        Value::Number(number) => match number.as_u64() {
            Some(count) => Ok((0..count).map(|i| (Value::from(i), Value::from(i))).collect()),
            None => Err(not_iterable(&Value::Number(number))),
        },
        other => Err(not_iterable(&other)),
    }
}

fn not_iterable(value: &Value) -> AppError {
    AppError::new(
        ErrorCategory::ExpressionError,
        format!(
            "for collection must be a list, map, or non-negative integer, got {}",
            value
        ),
    )
    .with_code("WFG-EXEC-005")
    .non_retryable()
}
