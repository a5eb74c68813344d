#![allow(clippy::result_large_err)] // Conversion surfaces AppError so validation can classify user errors by category.

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use crate::core::workflow_graph::definition::{
    CatchConfig, DocumentSpec, ForkBranchConfig, TaskConfig, TaskSpec, WorkflowSpec,
};
use crate::core::workflow_graph::schema::{WorkflowDefinition, WorkflowDocument};
use crate::core::workflow_graph::tasks::{
    Catch, FlowDirective, Fork, ForkBranch, ForLoop, GrpcCall, GrpcService, HttpCall,
    HttpOutputMode, Listen, Raise, RunWorkflow, SwitchCase, TaskEntry, TaskKind, TaskKindTag,
    TryCatch, WaitDuration, WorkflowTask, DEFAULT_AT, DEFAULT_CATCH_AS, DEFAULT_EACH,
};
use serde_json::Value;
use thiserror::Error;

/// DSL version stamped on documents that leave `dsl` empty.
pub const DEFAULT_DSL_VERSION: &str = "1.0.0";

/// Ways a user-supplied specification can fail to convert.
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("workflow spec cannot be nil")]
    NilSpec,
    #[error("workflow document cannot be nil")]
    NilDocument,
    #[error("workflow must have at least one task")]
    NoTasks,
    #[error("task name is required")]
    MissingTaskName,
    #[error("failed to unmarshal task '{task}' config: {source}")]
    Payload {
        task: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("task '{task}': unknown output mode '{mode}'")]
    OutputMode { task: String, mode: String },
    #[error("CALL_ACTIVITY not yet implemented")]
    CallActivityNotImplemented,
}

impl ConversionError {
    pub fn code(&self) -> &'static str {
        match self {
            ConversionError::NilSpec => "WFG-CONV-001",
            ConversionError::NilDocument => "WFG-CONV-002",
            ConversionError::NoTasks => "WFG-CONV-003",
            ConversionError::MissingTaskName => "WFG-CONV-004",
            ConversionError::Payload { .. } | ConversionError::OutputMode { .. } => "WFG-CONV-005",
            ConversionError::CallActivityNotImplemented => "WFG-CONV-006",
        }
    }
}

impl From<ConversionError> for AppError {
    fn from(err: ConversionError) -> Self {
        let code = err.code();
        AppError::new(ErrorCategory::ValidationError, err.to_string()).with_code(code)
    }
}

/// Convert a typed workflow specification into a DSL definition.
pub fn convert(spec: Option<&WorkflowSpec>) -> Result<WorkflowDefinition, AppError> {
    let spec = spec.ok_or(ConversionError::NilSpec)?;
    let document = spec.document.as_ref().ok_or(ConversionError::NilDocument)?;
    if spec.tasks.is_empty() {
        return Err(ConversionError::NoTasks.into());
    }

    let tasks = convert_tasks(&spec.tasks)?;
    tracing::debug!(
        workflow = %document.name,
        namespace = %document.namespace,
        tasks = tasks.len(),
        "converted workflow spec"
    );
    Ok(WorkflowDefinition {
        document: convert_document(document),
        schedule: document.schedule.clone(),
        timeout: non_empty(document.timeout.as_deref()),
        metadata: document.metadata.clone(),
        tasks,
    })
}

/// Convert and render canonical YAML.
pub fn convert_to_yaml(spec: Option<&WorkflowSpec>) -> Result<String, AppError> {
    convert(spec)?.to_yaml()
}

fn convert_document(document: &DocumentSpec) -> WorkflowDocument {
    let dsl = if document.dsl.trim().is_empty() {
        DEFAULT_DSL_VERSION.to_string()
    } else {
        document.dsl.clone()
    };
    WorkflowDocument {
        dsl,
        namespace: document.namespace.clone(),
        name: document.name.clone(),
        version: document.version.clone(),
        description: document.description.clone(),
    }
}

fn convert_tasks(tasks: &[TaskSpec]) -> Result<Vec<TaskEntry>, ConversionError> {
    tasks.iter().map(convert_task).collect()
}

fn convert_task(spec: &TaskSpec) -> Result<TaskEntry, ConversionError> {
    if spec.name.trim().is_empty() {
        return Err(ConversionError::MissingTaskName);
    }
    if spec.kind == TaskKindTag::CallActivity {
        return Err(ConversionError::CallActivityNotImplemented);
    }

    let config = spec
        .decode_config()
        .map_err(|source| ConversionError::Payload {
            task: spec.name.clone(),
            source,
        })?;

    let mut task = WorkflowTask::new(TaskKind::Set(Default::default()));
    task.metadata = spec.metadata.clone();
    task.kind = convert_kind(&spec.name, config, &mut task)?;

    task.condition = non_empty(spec.condition.as_deref());
    task.export = spec
        .export
        .as_ref()
        .map(|export| export.as_value.clone())
        .filter(|value| !is_empty_value(value));
    task.then = spec
        .flow
        .as_ref()
        .and_then(|flow| non_empty(Some(flow.then.as_str())))
        .map(|then| FlowDirective::parse(&then));

    Ok(TaskEntry::new(spec.name.clone(), task))
}

fn convert_kind(
    name: &str,
    config: TaskConfig,
    task: &mut WorkflowTask,
) -> Result<TaskKind, ConversionError> {
    Ok(match config {
        TaskConfig::Set(set) => TaskKind::Set(set.variables),
        TaskConfig::HttpCall(http) => {
            let output = match non_empty(Some(http.output.as_str())) {
                None => HttpOutputMode::Content,
                Some(mode) => HttpOutputMode::parse(&mode).ok_or(ConversionError::OutputMode {
                    task: name.to_string(),
                    mode,
                })?,
            };
            TaskKind::HttpCall(HttpCall {
                method: http.method,
                endpoint: http.endpoint.uri,
                headers: http.headers,
                query: http.query,
                body: http.body.filter(|body| !is_empty_value(body)),
                output,
                timeout_seconds: (http.timeout_seconds > 0).then_some(http.timeout_seconds),
            })
        }
        TaskConfig::GrpcCall(grpc) => TaskKind::GrpcCall(GrpcCall {
            service: GrpcService {
                name: grpc.service.name,
                host: non_empty(Some(grpc.service.host.as_str())),
                port: (grpc.service.port > 0).then_some(grpc.service.port),
            },
            method: grpc.method,
            request: grpc.request.filter(|request| !is_empty_value(request)),
        }),
        TaskConfig::Switch(switch) => TaskKind::Switch(
            switch
                .cases
                .into_iter()
                .map(|case| SwitchCase {
                    name: non_empty(Some(case.name.as_str())),
                    when: non_empty(Some(case.when.as_str())),
                    then: non_empty(Some(case.then.as_str())).map(|then| FlowDirective::parse(&then)),
                })
                .collect(),
        ),
        TaskConfig::For(for_config) => TaskKind::For(ForLoop {
            each: non_empty(Some(for_config.each.as_str()))
                .unwrap_or_else(|| DEFAULT_EACH.to_string()),
            at: non_empty(Some(for_config.at.as_str())).unwrap_or_else(|| DEFAULT_AT.to_string()),
            collection: for_config.collection,
            while_condition: non_empty(Some(for_config.while_condition.as_str())),
            tasks: convert_tasks(&for_config.tasks)?,
        }),
        TaskConfig::Fork(fork) => TaskKind::Fork(Fork {
            compete: fork.compete,
            branches: fork
                .branches
                .iter()
                .map(convert_branch)
                .collect::<Result<_, _>>()?,
        }),
        TaskConfig::Try(try_config) => TaskKind::Try(TryCatch {
            tasks: convert_tasks(&try_config.tasks)?,
            catch: try_config.catch.as_ref().map(convert_catch).transpose()?,
        }),
        TaskConfig::Listen(listen) => {
            if let Some(timeout) = non_empty(Some(listen.timeout.as_str())) {
                task.metadata
                    .insert("timeout".to_string(), Value::String(timeout));
            }
            TaskKind::Listen(Listen {
                mode: listen.to.mode,
                events: listen.to.events,
            })
        }
        TaskConfig::Wait(wait) => match non_empty(Some(wait.duration.as_str())) {
            Some(text) => TaskKind::Wait(WaitDuration::Text(text)),
            None => TaskKind::Wait(WaitDuration::Seconds(wait.seconds)),
        },
        TaskConfig::Raise(raise) => TaskKind::Raise(Raise {
            error_type: raise.error,
            title: non_empty(Some(raise.title.as_str())),
            message: non_empty(Some(raise.message.as_str())),
            status: (raise.status > 0).then_some(raise.status),
        }),
        TaskConfig::Run(run) => TaskKind::Run(RunWorkflow {
            workflow: run.workflow,
            input: run.input.filter(|input| !is_empty_value(input)),
            await_completion: run.await_completion,
        }),
        TaskConfig::CallActivity(_) => return Err(ConversionError::CallActivityNotImplemented),
    })
}

fn convert_branch(branch: &ForkBranchConfig) -> Result<ForkBranch, ConversionError> {
    Ok(ForkBranch {
        name: branch.name.clone(),
        tasks: convert_tasks(&branch.tasks)?,
    })
}

fn convert_catch(catch: &CatchConfig) -> Result<Catch, ConversionError> {
    Ok(Catch {
        as_name: non_empty(Some(catch.as_name.as_str()))
            .unwrap_or_else(|| DEFAULT_CATCH_AS.to_string()),
        tasks: convert_tasks(&catch.tasks)?,
    })
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
