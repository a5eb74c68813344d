#![allow(clippy::result_large_err)] // Compiler returns AppError so validation can separate user errors from internal ones.

use crate::core::config::RunnerConfig;
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use crate::core::workflow_graph::activity::ActivityOptions;
use crate::core::workflow_graph::backend::ExecutionBackend;
use crate::core::workflow_graph::expression::{static_truth, ExpressionEngine, FunctionTable};
use crate::core::workflow_graph::schema::{WorkflowDefinition, WorkflowDocument};
use crate::core::workflow_graph::search_attributes::{self, SearchAttributeSpec};
use crate::core::workflow_graph::tasks::{
    self, FlowDirective, GrpcCall, GrpcService, HttpCall, HttpOutputMode, ListenMode, Raise,
    RunWorkflow, TaskEntry, TaskKind, TaskKindTag, WaitDuration, WorkflowTask,
};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Error types a Raise task may use besides a URI.
pub const RAISE_ERROR_TYPES: [&str; 8] = [
    "validation",
    "authentication",
    "communication",
    "authorization",
    "configuration",
    "expression",
    "runtime",
    "timeout",
];

/// Listen timeout when `metadata.timeout` is absent.
pub const DEFAULT_LISTEN_TIMEOUT: Duration = Duration::from_secs(60);

/// Inputs that shape a compiled graph.
#[derive(Clone)]
pub struct CompileOptions {
    /// `None` compiles for validation only.
    pub backend: Option<Arc<dyn ExecutionBackend>>,
    pub env: Map<String, Value>,
    /// History length that triggers a continuation; 0 disables it.
    pub max_history_length: usize,
    pub max_continuations: usize,
    pub max_task_iterations: usize,
    pub defaults: ActivityOptions,
    pub document_timeout: Option<String>,
    pub document_metadata: Map<String, Value>,
    pub functions: FunctionTable,
}

impl fmt::Debug for CompileOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompileOptions")
            .field("validation_only", &self.backend.is_none())
            .field("max_history_length", &self.max_history_length)
            .field("max_continuations", &self.max_continuations)
            .field("max_task_iterations", &self.max_task_iterations)
            .field("defaults", &self.defaults)
            .finish()
    }
}

impl CompileOptions {
    pub fn validation_only() -> Self {
        let engine = crate::core::config::EngineConfig::default();
        CompileOptions {
            backend: None,
            env: Map::new(),
            max_history_length: engine.max_history_length,
            max_continuations: engine.max_continuations,
            max_task_iterations: engine.max_task_iterations,
            defaults: ActivityOptions::default(),
            document_timeout: None,
            document_metadata: Map::new(),
            functions: FunctionTable::with_defaults(),
        }
    }

    pub fn from_config(config: &RunnerConfig) -> Result<Self, AppError> {
        Ok(CompileOptions {
            env: config
                .env
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
            max_history_length: config.engine.max_history_length,
            max_continuations: config.engine.max_continuations,
            max_task_iterations: config.engine.max_task_iterations.max(1),
            defaults: ActivityOptions::from_config(&config.activity)?,
            ..Self::validation_only()
        })
    }

    pub fn with_backend(mut self, backend: Arc<dyn ExecutionBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_env(mut self, env: Map<String, Value>) -> Self {
        self.env.extend(env);
        self
    }

    pub fn is_validation_only(&self) -> bool {
        self.backend.is_none()
    }
}

/// Control transfer after a task, resolved to sibling indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedFlow {
    Next,
    End,
    Exit,
    Jump(usize),
}

#[derive(Debug, Clone)]
pub struct CompiledTask {
    pub name: String,
    /// `<name>-<index>`; continuation markers refer to it.
    pub id: String,
    pub condition: Option<String>,
    pub export: Option<Value>,
    pub output: Option<Value>,
    pub flow: ResolvedFlow,
    pub search_attributes: Vec<SearchAttributeSpec>,
    pub activity: ActivityOptions,
    pub kind: CompiledKind,
}

impl CompiledTask {
    pub fn tag(&self) -> TaskKindTag {
        self.kind.tag()
    }
}

#[derive(Debug, Clone)]
pub struct CompiledCase {
    pub name: Option<String>,
    pub when: String,
    pub flow: ResolvedFlow,
}

#[derive(Debug, Clone)]
pub struct CompiledBranch {
    pub name: String,
    pub body: Arc<[CompiledTask]>,
}

#[derive(Debug, Clone)]
pub struct CompiledCatch {
    pub as_name: String,
    pub body: Arc<[CompiledTask]>,
}

#[derive(Debug, Clone)]
pub enum CompiledKind {
    Set(Map<String, Value>),
    HttpCall(HttpCall),
    GrpcCall(GrpcCall),
    Switch {
        cases: Vec<CompiledCase>,
        default: Option<ResolvedFlow>,
    },
    For {
        each: String,
        at: String,
        collection: Value,
        while_condition: Option<String>,
        body: Arc<[CompiledTask]>,
    },
    Fork {
        compete: bool,
        branches: Vec<CompiledBranch>,
    },
    Try {
        body: Arc<[CompiledTask]>,
        catch: Option<CompiledCatch>,
    },
    Listen {
        mode: ListenMode,
        events: Vec<Value>,
        timeout: Duration,
    },
    Wait(Duration),
    Raise(Raise),
    Run(RunWorkflow),
}

impl CompiledKind {
    pub fn tag(&self) -> TaskKindTag {
        match self {
            CompiledKind::Set(_) => TaskKindTag::Set,
            CompiledKind::HttpCall(_) => TaskKindTag::HttpCall,
            CompiledKind::GrpcCall(_) => TaskKindTag::GrpcCall,
            CompiledKind::Switch { .. } => TaskKindTag::Switch,
            CompiledKind::For { .. } => TaskKindTag::For,
            CompiledKind::Fork { .. } => TaskKindTag::Fork,
            CompiledKind::Try { .. } => TaskKindTag::Try,
            CompiledKind::Listen { .. } => TaskKindTag::Listen,
            CompiledKind::Wait(_) => TaskKindTag::Wait,
            CompiledKind::Raise(_) => TaskKindTag::Raise,
            CompiledKind::Run(_) => TaskKindTag::Run,
        }
    }
}

/// Compiled workflow, ready to execute when a backend was supplied.
pub struct ExecutableGraph {
    pub document: WorkflowDocument,
    pub tasks: Arc<[CompiledTask]>,
    pub env: Map<String, Value>,
    pub max_history_length: usize,
    pub max_continuations: usize,
    pub max_task_iterations: usize,
    engine: Arc<ExpressionEngine>,
    backend: Option<Arc<dyn ExecutionBackend>>,
}

impl fmt::Debug for ExecutableGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutableGraph")
            .field("document", &self.document)
            .field("tasks", &self.tasks.len())
            .field("executable", &self.backend.is_some())
            .finish()
    }
}

impl ExecutableGraph {
    pub fn engine(&self) -> &Arc<ExpressionEngine> {
        &self.engine
    }

    pub fn backend(&self) -> Option<&Arc<dyn ExecutionBackend>> {
        self.backend.as_ref()
    }

    pub fn is_executable(&self) -> bool {
        self.backend.is_some()
    }

    /// Number of compiled tasks, nested lists included.
    pub fn task_count(&self) -> usize {
        fn count(tasks: &[CompiledTask]) -> usize {
            tasks
                .iter()
                .map(|task| {
                    1 + match &task.kind {
                        CompiledKind::For { body, .. } => count(body),
                        CompiledKind::Fork { branches, .. } => {
                            branches.iter().map(|branch| count(&branch.body)).sum()
                        }
                        CompiledKind::Try { body, catch } => {
                            count(body) + catch.as_ref().map(|c| count(&c.body)).unwrap_or(0)
                        }
                        _ => 0,
                    }
                })
                .sum()
        }
        count(&self.tasks)
    }
}

/// Compile a parsed definition, layering its timeout and metadata into the options.
pub fn compile_definition(
    definition: &WorkflowDefinition,
    mut options: CompileOptions,
) -> Result<ExecutableGraph, AppError> {
    options.document_timeout = definition.timeout.clone();
    options.document_metadata = definition.metadata.clone();
    compile(&definition.tasks, &definition.document, options)
}

/// Compile a task list into an executable graph.
pub fn compile(
    tasks: &[TaskEntry],
    document: &WorkflowDocument,
    options: CompileOptions,
) -> Result<ExecutableGraph, AppError> {
    let engine = Arc::new(ExpressionEngine::new(options.functions.clone()));
    let no_metadata = Map::new();
    ActivityOptions::resolve(
        &options.defaults,
        options.document_timeout.as_deref(),
        &options.document_metadata,
        &no_metadata,
    )?;

    let compiler = Compiler {
        engine: &engine,
        defaults: &options.defaults,
        document_timeout: options.document_timeout.as_deref(),
        document_metadata: &options.document_metadata,
    };
    let compiled = compiler.compile_list(tasks, "do")?;
    tracing::debug!(
        workflow = %document.name,
        tasks = compiled.len(),
        validation_only = options.backend.is_none(),
        "compiled workflow graph"
    );

    Ok(ExecutableGraph {
        document: document.clone(),
        tasks: compiled.into(),
        env: options.env,
        max_history_length: options.max_history_length,
        max_continuations: options.max_continuations,
        max_task_iterations: options.max_task_iterations.max(1),
        engine,
        backend: options.backend,
    })
}

/// Confirm every declared task kind is reachable from the DSL decoder and back.
pub fn verify_handlers() -> Result<(), AppError> {
    check_kind_table(&TaskKindTag::ALL, tasks::kind_keys())
}

fn check_kind_table(tags: &[TaskKindTag], keys: &[&str]) -> Result<(), AppError> {
    if let Some(key) = keys
        .iter()
        .find(|key| !tags.iter().any(|tag| tag.dsl_key() == **key))
    {
        return Err(handler_error(format!("kind key '{}' decodes to no task kind", key)));
    }
    for &tag in tags {
        if !keys.contains(&tag.dsl_key()) {
            return Err(handler_error(format!(
                "task kind {} uses kind key '{}' which the decoder does not recognise",
                tag,
                tag.dsl_key()
            )));
        }
        let encoded = tasks::encode_task(&WorkflowTask::new(sample_kind(tag)));
        let decoded = tasks::decode_task("handler-check", &encoded).map_err(|err| {
            handler_error(format!("task kind {} does not decode: {}", tag, err))
        })?;
        if decoded.kind.tag() != tag {
            return Err(handler_error(format!(
                "task kind {} decodes as {}",
                tag,
                decoded.kind.tag()
            )));
        }
    }
    Ok(())
}

fn handler_error(message: String) -> AppError {
    AppError::new(ErrorCategory::InternalError, message).with_code("WFG-COMP-000")
}

fn sample_kind(tag: TaskKindTag) -> TaskKind {
    match tag {
        TaskKindTag::Set => TaskKind::Set(Map::new()),
        TaskKindTag::HttpCall => TaskKind::HttpCall(HttpCall {
            method: "GET".into(),
            endpoint: String::new(),
            headers: Map::new(),
            query: Map::new(),
            body: None,
            output: HttpOutputMode::Content,
            timeout_seconds: None,
        }),
        TaskKindTag::GrpcCall => TaskKind::GrpcCall(GrpcCall {
            service: GrpcService {
                name: String::new(),
                host: None,
                port: None,
            },
            method: String::new(),
            request: None,
        }),
        TaskKindTag::Switch => TaskKind::Switch(Vec::new()),
        TaskKindTag::For => TaskKind::For(crate::core::workflow_graph::tasks::ForLoop {
            each: String::new(),
            at: String::new(),
            collection: Value::Null,
            while_condition: None,
            tasks: Vec::new(),
        }),
        TaskKindTag::Fork => TaskKind::Fork(crate::core::workflow_graph::tasks::Fork {
            compete: false,
            branches: Vec::new(),
        }),
        TaskKindTag::Try => TaskKind::Try(crate::core::workflow_graph::tasks::TryCatch {
            tasks: Vec::new(),
            catch: None,
        }),
        TaskKindTag::Listen => TaskKind::Listen(crate::core::workflow_graph::tasks::Listen {
            mode: ListenMode::One,
            events: vec![Value::String("handler.check".into())],
        }),
        TaskKindTag::Wait => TaskKind::Wait(WaitDuration::Seconds(0)),
        TaskKindTag::Raise => TaskKind::Raise(Raise {
            error_type: String::new(),
            title: None,
            message: None,
            status: None,
        }),
        TaskKindTag::Run => TaskKind::Run(RunWorkflow {
            workflow: String::new(),
            input: None,
            await_completion: true,
        }),
        TaskKindTag::CallActivity => TaskKind::CallActivity(Value::Null),
    }
}

fn compile_error(code: &str, message: impl Into<String>) -> AppError {
    AppError::new(ErrorCategory::ValidationError, message).with_code(code)
}

struct Compiler<'a> {
    engine: &'a ExpressionEngine,
    defaults: &'a ActivityOptions,
    document_timeout: Option<&'a str>,
    document_metadata: &'a Map<String, Value>,
}

impl<'a> Compiler<'a> {
    fn compile_list(&self, tasks: &[TaskEntry], scope: &str) -> Result<Vec<CompiledTask>, AppError> {
        let mut names: HashMap<&str, usize> = HashMap::new();
        for (index, entry) in tasks.iter().enumerate() {
            if names.insert(entry.name.as_str(), index).is_some() {
                return Err(compile_error(
                    "WFG-COMP-001",
                    format!("duplicate task name '{}' in {}", entry.name, scope),
                ));
            }
        }

        tasks
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                self.compile_task(entry, index, &names, scope)
                    .map_err(|err| err.in_task(&entry.name))
            })
            .collect()
    }

    fn resolve_flow(
        &self,
        directive: Option<&FlowDirective>,
        names: &HashMap<&str, usize>,
        task: &str,
    ) -> Result<ResolvedFlow, AppError> {
        match directive {
            None | Some(FlowDirective::Continue) => Ok(ResolvedFlow::Next),
            Some(FlowDirective::End) => Ok(ResolvedFlow::End),
            Some(FlowDirective::Exit) => Ok(ResolvedFlow::Exit),
            Some(FlowDirective::Goto(target)) => names
                .get(target.as_str())
                .map(|index| ResolvedFlow::Jump(*index))
                .ok_or_else(|| {
                    compile_error(
                        "WFG-COMP-002",
                        format!("task '{}': then target '{}' not found", task, target),
                    )
                }),
        }
    }

    fn compile_task(
        &self,
        entry: &TaskEntry,
        index: usize,
        names: &HashMap<&str, usize>,
        scope: &str,
    ) -> Result<CompiledTask, AppError> {
        let task = &entry.task;
        if let Some(condition) = &task.condition {
            self.engine.check_syntax(condition)?;
        }
        for value in task.export.iter().chain(task.output.iter()) {
            self.engine.check_nested_syntax(value)?;
        }

        let search_attributes = search_attributes::parse_specs(&task.metadata)?;
        for spec in &search_attributes {
            self.engine.check_nested_syntax(&spec.value)?;
        }
        let activity = ActivityOptions::resolve(
            self.defaults,
            self.document_timeout,
            self.document_metadata,
            &task.metadata,
        )?;
        let flow = self.resolve_flow(task.then.as_ref(), names, &entry.name)?;
        let nested_scope = format!("{} > {}", scope, entry.name);

        let kind = match &task.kind {
            TaskKind::Set(values) => self.compile_set(values)?,
            TaskKind::HttpCall(http) => self.compile_http(http)?,
            TaskKind::GrpcCall(grpc) => self.compile_grpc(grpc)?,
            TaskKind::Switch(cases) => self.compile_switch(cases, names, &entry.name)?,
            TaskKind::For(for_loop) => self.compile_for(for_loop, &nested_scope)?,
            TaskKind::Fork(fork) => self.compile_fork(fork, &nested_scope)?,
            TaskKind::Try(try_catch) => self.compile_try(try_catch, &nested_scope)?,
            TaskKind::Listen(listen) => self.compile_listen(listen, &task.metadata)?,
            TaskKind::Wait(duration) => self.compile_wait(duration)?,
            TaskKind::Raise(raise) => self.compile_raise(raise)?,
            TaskKind::Run(run) => self.compile_run(run)?,
            TaskKind::CallActivity(_) => {
                return Err(compile_error(
                    "WFG-COMP-011",
                    "CALL_ACTIVITY not implemented",
                ))
            }
        };

        Ok(CompiledTask {
            name: entry.name.clone(),
            id: format!("{}-{}", entry.name, index),
            condition: task.condition.clone(),
            export: task.export.clone(),
            output: task.output.clone(),
            flow,
            search_attributes,
            activity,
            kind,
        })
    }

    fn compile_set(&self, values: &Map<String, Value>) -> Result<CompiledKind, AppError> {
        for value in values.values() {
            self.engine.check_nested_syntax(value)?;
        }
        Ok(CompiledKind::Set(values.clone()))
    }

    fn compile_http(&self, http: &HttpCall) -> Result<CompiledKind, AppError> {
        if http.method.trim().is_empty() {
            return Err(compile_error("WFG-COMP-005", "http call needs a method"));
        }
        if http.endpoint.trim().is_empty() {
            return Err(compile_error("WFG-COMP-005", "http call needs an endpoint"));
        }
        self.engine.check_syntax(&http.endpoint)?;
        for value in http.headers.values().chain(http.query.values()) {
            self.engine.check_nested_syntax(value)?;
        }
        if let Some(body) = &http.body {
            self.engine.check_nested_syntax(body)?;
        }
        Ok(CompiledKind::HttpCall(http.clone()))
    }

    fn compile_grpc(&self, grpc: &GrpcCall) -> Result<CompiledKind, AppError> {
        if grpc.service.name.trim().is_empty() || grpc.method.trim().is_empty() {
            return Err(compile_error(
                "WFG-COMP-005",
                "grpc call needs a service name and a method",
            ));
        }
        self.engine.check_syntax(&grpc.service.name)?;
        self.engine.check_syntax(&grpc.method)?;
        if let Some(request) = &grpc.request {
            self.engine.check_nested_syntax(request)?;
        }
        Ok(CompiledKind::GrpcCall(grpc.clone()))
    }

    fn compile_switch(
        &self,
        cases: &[crate::core::workflow_graph::tasks::SwitchCase],
        names: &HashMap<&str, usize>,
        task: &str,
    ) -> Result<CompiledKind, AppError> {
        let defaults: Vec<_> = cases.iter().filter(|case| case.is_default()).collect();
        if defaults.len() > 1 {
            return Err(compile_error(
                "WFG-COMP-003",
                format!("switch '{}' has more than one default case", task),
            ));
        }

        let mut compiled = Vec::new();
        let mut reachable = false;
        for case in cases.iter().filter(|case| !case.is_default()) {
            let when = case.when.clone().unwrap_or_default();
            self.engine.check_syntax(&when)?;
            if static_truth(&when) != Some(false) {
                reachable = true;
            }
            compiled.push(CompiledCase {
                name: case.name.clone(),
                flow: self.resolve_flow(case.then.as_ref(), names, task)?,
                when,
            });
        }

        let default = match defaults.first() {
            Some(case) => Some(self.resolve_flow(case.then.as_ref(), names, task)?),
            None => None,
        };
        if default.is_none() && !reachable {
            return Err(compile_error(
                "WFG-COMP-004",
                format!(
                    "switch '{}' can never match: no case can be true and there is no default",
                    task
                ),
            ));
        }
        Ok(CompiledKind::Switch {
            cases: compiled,
            default,
        })
    }

    fn compile_for(
        &self,
        for_loop: &crate::core::workflow_graph::tasks::ForLoop,
        scope: &str,
    ) -> Result<CompiledKind, AppError> {
        if for_loop.each.trim().is_empty() || for_loop.at.trim().is_empty() {
            return Err(compile_error(
                "WFG-COMP-005",
                "for loop needs non-empty each and at names",
            ));
        }
        self.engine.check_nested_syntax(&for_loop.collection)?;
        if let Some(condition) = &for_loop.while_condition {
            self.engine.check_syntax(condition)?;
        }
        Ok(CompiledKind::For {
            each: for_loop.each.clone(),
            at: for_loop.at.clone(),
            collection: for_loop.collection.clone(),
            while_condition: for_loop.while_condition.clone(),
            body: self.compile_list(&for_loop.tasks, scope)?.into(),
        })
    }

    fn compile_fork(
        &self,
        fork: &crate::core::workflow_graph::tasks::Fork,
        scope: &str,
    ) -> Result<CompiledKind, AppError> {
        if fork.branches.is_empty() {
            return Err(compile_error("WFG-COMP-007", "fork needs at least one branch"));
        }
        let mut seen = HashSet::new();
        let mut branches = Vec::with_capacity(fork.branches.len());
        for branch in &fork.branches {
            if !seen.insert(branch.name.as_str()) {
                return Err(compile_error(
                    "WFG-COMP-007",
                    format!("duplicate fork branch '{}'", branch.name),
                ));
            }
            branches.push(CompiledBranch {
                name: branch.name.clone(),
                body: self
                    .compile_list(&branch.tasks, &format!("{} branch {}", scope, branch.name))?
                    .into(),
            });
        }
        Ok(CompiledKind::Fork {
            compete: fork.compete,
            branches,
        })
    }

    fn compile_try(
        &self,
        try_catch: &crate::core::workflow_graph::tasks::TryCatch,
        scope: &str,
    ) -> Result<CompiledKind, AppError> {
        if try_catch.tasks.is_empty() {
            return Err(compile_error("WFG-COMP-005", "try needs at least one task"));
        }
        let catch = match &try_catch.catch {
            Some(catch) => Some(CompiledCatch {
                as_name: catch.as_name.clone(),
                body: self
                    .compile_list(&catch.tasks, &format!("{} catch", scope))?
                    .into(),
            }),
            None => None,
        };
        Ok(CompiledKind::Try {
            body: self.compile_list(&try_catch.tasks, scope)?.into(),
            catch,
        })
    }

    fn compile_listen(
        &self,
        listen: &crate::core::workflow_graph::tasks::Listen,
        metadata: &Map<String, Value>,
    ) -> Result<CompiledKind, AppError> {
        if listen.events.is_empty() {
            return Err(compile_error("WFG-COMP-008", "listen needs at least one event"));
        }
        let timeout = match metadata.get("timeout") {
            None | Some(Value::Null) => DEFAULT_LISTEN_TIMEOUT,
            Some(Value::String(raw)) => humantime::parse_duration(raw.trim()).map_err(|err| {
                compile_error(
                    "WFG-COMP-008",
                    format!("listen timeout '{}' is not a duration: {}", raw, err),
                )
            })?,
            Some(_) => {
                return Err(compile_error(
                    "WFG-COMP-008",
                    "listen metadata.timeout must be a duration string",
                ))
            }
        };
        Ok(CompiledKind::Listen {
            mode: listen.mode,
            events: listen.events.clone(),
            timeout,
        })
    }

    fn compile_wait(&self, duration: &WaitDuration) -> Result<CompiledKind, AppError> {
        duration.to_duration().map(CompiledKind::Wait).map_err(|err| {
            compile_error("WFG-COMP-009", format!("invalid wait duration: {}", err))
        })
    }

    fn compile_raise(&self, raise: &Raise) -> Result<CompiledKind, AppError> {
        let error_type = raise.error_type.trim();
        let known = RAISE_ERROR_TYPES.contains(&error_type);
        if !known && url::Url::parse(error_type).is_err() {
            return Err(compile_error(
                "WFG-COMP-012",
                format!(
                    "raise error type '{}' must be one of {} or a URI",
                    raise.error_type,
                    RAISE_ERROR_TYPES.join(", ")
                ),
            ));
        }
        for text in raise.title.iter().chain(raise.message.iter()) {
            self.engine.check_syntax(text)?;
        }
        Ok(CompiledKind::Raise(raise.clone()))
    }

    fn compile_run(&self, run: &RunWorkflow) -> Result<CompiledKind, AppError> {
        if run.workflow.trim().is_empty() {
            return Err(compile_error("WFG-COMP-010", "run task needs a workflow name"));
        }
        if let Some(input) = &run.input {
            self.engine.check_nested_syntax(input)?;
        }
        Ok(CompiledKind::Run(run.clone()))
    }
}
