#![allow(clippy::result_large_err)] // Task decoding returns AppError so parse failures carry codes and the offending task name.

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;

/// Closed set of task kinds understood by the compiler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskKindTag {
    Set,
    HttpCall,
    GrpcCall,
    Switch,
    For,
    Fork,
    Try,
    Listen,
    Wait,
    Raise,
    Run,
    CallActivity,
}

impl TaskKindTag {
    pub const ALL: [TaskKindTag; 12] = [
        TaskKindTag::Set,
        TaskKindTag::HttpCall,
        TaskKindTag::GrpcCall,
        TaskKindTag::Switch,
        TaskKindTag::For,
        TaskKindTag::Fork,
        TaskKindTag::Try,
        TaskKindTag::Listen,
        TaskKindTag::Wait,
        TaskKindTag::Raise,
        TaskKindTag::Run,
        TaskKindTag::CallActivity,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TaskKindTag::Set => "SET",
            TaskKindTag::HttpCall => "HTTP_CALL",
            TaskKindTag::GrpcCall => "GRPC_CALL",
            TaskKindTag::Switch => "SWITCH",
            TaskKindTag::For => "FOR",
            TaskKindTag::Fork => "FORK",
            TaskKindTag::Try => "TRY",
            TaskKindTag::Listen => "LISTEN",
            TaskKindTag::Wait => "WAIT",
            TaskKindTag::Raise => "RAISE",
            TaskKindTag::Run => "RUN",
            TaskKindTag::CallActivity => "CALL_ACTIVITY",
        }
    }

    /// Kind key the DSL decoder dispatches this tag on.
    pub fn dsl_key(self) -> &'static str {
        match self {
            TaskKindTag::Set => "set",
            TaskKindTag::HttpCall | TaskKindTag::GrpcCall | TaskKindTag::CallActivity => "call",
            TaskKindTag::Switch => "switch",
            TaskKindTag::For => "for",
            TaskKindTag::Fork => "fork",
            TaskKindTag::Try => "try",
            TaskKindTag::Listen => "listen",
            TaskKindTag::Wait => "wait",
            TaskKindTag::Raise => "raise",
            TaskKindTag::Run => "run",
        }
    }
}

impl fmt::Display for TaskKindTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where control goes after a task finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowDirective {
    Continue,
    End,
    Exit,
    Goto(String),
}

impl FlowDirective {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "continue" => FlowDirective::Continue,
            "end" => FlowDirective::End,
            "exit" => FlowDirective::Exit,
            other => FlowDirective::Goto(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            FlowDirective::Continue => "continue",
            FlowDirective::End => "end",
            FlowDirective::Exit => "exit",
            FlowDirective::Goto(target) => target.as_str(),
        }
    }

    /// Sibling task named by the directive, if it names one.
    pub fn target(&self) -> Option<&str> {
        match self {
            FlowDirective::Goto(target) => Some(target.as_str()),
            _ => None,
        }
    }
}

/// One `{name: body}` entry of a task list.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskEntry {
    pub name: String,
    pub task: WorkflowTask,
}

impl TaskEntry {
    pub fn new(name: impl Into<String>, task: WorkflowTask) -> Self {
        TaskEntry {
            name: name.into(),
            task,
        }
    }
}

/// Fields shared by every task kind plus the kind body.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowTask {
    pub condition: Option<String>,
    pub export: Option<Value>,
    pub output: Option<Value>,
    pub then: Option<FlowDirective>,
    pub metadata: Map<String, Value>,
    pub kind: TaskKind,
}

impl WorkflowTask {
    pub fn new(kind: TaskKind) -> Self {
        WorkflowTask {
            condition: None,
            export: None,
            output: None,
            then: None,
            metadata: Map::new(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TaskKind {
    Set(Map<String, Value>),
    HttpCall(HttpCall),
    GrpcCall(GrpcCall),
    Switch(Vec<SwitchCase>),
    For(ForLoop),
    Fork(Fork),
    Try(TryCatch),
    Listen(Listen),
    Wait(WaitDuration),
    Raise(Raise),
    Run(RunWorkflow),
    CallActivity(Value),
}

impl TaskKind {
    pub fn tag(&self) -> TaskKindTag {
        match self {
            TaskKind::Set(_) => TaskKindTag::Set,
            TaskKind::HttpCall(_) => TaskKindTag::HttpCall,
            TaskKind::GrpcCall(_) => TaskKindTag::GrpcCall,
            TaskKind::Switch(_) => TaskKindTag::Switch,
            TaskKind::For(_) => TaskKindTag::For,
            TaskKind::Fork(_) => TaskKindTag::Fork,
            TaskKind::Try(_) => TaskKindTag::Try,
            TaskKind::Listen(_) => TaskKindTag::Listen,
            TaskKind::Wait(_) => TaskKindTag::Wait,
            TaskKind::Raise(_) => TaskKindTag::Raise,
            TaskKind::Run(_) => TaskKindTag::Run,
            TaskKind::CallActivity(_) => TaskKindTag::CallActivity,
        }
    }

    /// Nested task lists with a label used in diagnostics.
    pub fn nested_lists(&self) -> Vec<(String, &[TaskEntry])> {
        match self {
            TaskKind::For(for_loop) => vec![("do".to_string(), for_loop.tasks.as_slice())],
            TaskKind::Fork(fork) => fork
                .branches
                .iter()
                .map(|branch| (format!("branch '{}'", branch.name), branch.tasks.as_slice()))
                .collect(),
            TaskKind::Try(try_catch) => {
                let mut lists = vec![("try".to_string(), try_catch.tasks.as_slice())];
                if let Some(catch) = &try_catch.catch {
                    lists.push(("catch".to_string(), catch.tasks.as_slice()));
                }
                lists
            }
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HttpOutputMode {
    #[default]
    Content,
    Response,
    Raw,
}

impl HttpOutputMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "content" => Some(HttpOutputMode::Content),
            "response" => Some(HttpOutputMode::Response),
            "raw" => Some(HttpOutputMode::Raw),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HttpOutputMode::Content => "content",
            HttpOutputMode::Response => "response",
            HttpOutputMode::Raw => "raw",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpCall {
    pub method: String,
    pub endpoint: String,
    pub headers: Map<String, Value>,
    pub query: Map<String, Value>,
    pub body: Option<Value>,
    pub output: HttpOutputMode,
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GrpcService {
    pub name: String,
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GrpcCall {
    pub service: GrpcService,
    pub method: String,
    pub request: Option<Value>,
}

/// A switch case; one without `when` is the default.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    pub name: Option<String>,
    pub when: Option<String>,
    pub then: Option<FlowDirective>,
}

impl SwitchCase {
    pub fn is_default(&self) -> bool {
        self.when.is_none()
    }
}

pub const DEFAULT_EACH: &str = "item";
pub const DEFAULT_AT: &str = "index";
pub const DEFAULT_CATCH_AS: &str = "error";

#[derive(Debug, Clone, PartialEq)]
pub struct ForLoop {
    pub each: String,
    pub at: String,
    pub collection: Value,
    pub while_condition: Option<String>,
    pub tasks: Vec<TaskEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForkBranch {
    pub name: String,
    pub tasks: Vec<TaskEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fork {
    pub compete: bool,
    pub branches: Vec<ForkBranch>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Catch {
    pub as_name: String,
    pub tasks: Vec<TaskEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TryCatch {
    pub tasks: Vec<TaskEntry>,
    pub catch: Option<Catch>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListenMode {
    One,
    Any,
    All,
}

impl ListenMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ListenMode::One => "one",
            ListenMode::Any => "any",
            ListenMode::All => "all",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "one" => Some(ListenMode::One),
            "any" => Some(ListenMode::Any),
            "all" => Some(ListenMode::All),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Listen {
    pub mode: ListenMode,
    pub events: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WaitDuration {
    Seconds(u64),
    Text(String),
}

impl WaitDuration {
    pub fn to_duration(&self) -> Result<Duration, String> {
        match self {
            WaitDuration::Seconds(seconds) => Ok(Duration::from_secs(*seconds)),
            WaitDuration::Text(text) => {
                humantime::parse_duration(text.trim()).map_err(|err| err.to_string())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Raise {
    pub error_type: String,
    pub title: Option<String>,
    pub message: Option<String>,
    pub status: Option<u16>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunWorkflow {
    pub workflow: String,
    pub input: Option<Value>,
    pub await_completion: bool,
}

const KIND_KEYS: [&str; 10] = [
    "set", "call", "switch", "for", "fork", "try", "listen", "wait", "raise", "run",
];
/// Kind keys recognised by [`decode_task`].
pub fn kind_keys() -> &'static [&'static str] {
    &KIND_KEYS
}

const COMMON_KEYS: [&str; 5] = ["if", "export", "output", "then", "metadata"];

fn malformed(task: &str, detail: impl fmt::Display) -> AppError {
    AppError::new(
        ErrorCategory::ConfigurationError,
        format!("task '{}': {}", task, detail),
    )
    .with_code("WFG-DSL-002")
}

fn object<'a>(value: &'a Value, task: &str, field: &str) -> Result<&'a Map<String, Value>, AppError> {
    value
        .as_object()
        .ok_or_else(|| malformed(task, format!("'{}' must be a map", field)))
}

fn reject_unknown(
    map: &Map<String, Value>,
    allowed: &[&str],
    task: &str,
    field: &str,
) -> Result<(), AppError> {
    match map.keys().find(|key| !allowed.contains(&key.as_str())) {
        Some(key) => Err(malformed(task, format!("unknown key '{}' in {}", key, field))),
        None => Ok(()),
    }
}

fn opt_string(
    map: &Map<String, Value>,
    key: &str,
    task: &str,
) -> Result<Option<String>, AppError> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => Ok(Some(text.clone())),
        Some(Value::Bool(flag)) => Ok(Some(flag.to_string())),
        Some(Value::Number(number)) => Ok(Some(number.to_string())),
        Some(_) => Err(malformed(task, format!("'{}' must be a string", key))),
    }
}

fn required_string(map: &Map<String, Value>, key: &str, task: &str) -> Result<String, AppError> {
    opt_string(map, key, task)?.ok_or_else(|| malformed(task, format!("'{}' is required", key)))
}

fn opt_map(
    map: &Map<String, Value>,
    key: &str,
    task: &str,
) -> Result<Map<String, Value>, AppError> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(value) => object(value, task, key).cloned(),
    }
}

fn unwrap_as(map: &Map<String, Value>, key: &str, task: &str) -> Result<Option<Value>, AppError> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => {
            let inner = object(value, task, key)?;
            reject_unknown(inner, &["as"], task, key)?;
            Ok(inner.get("as").cloned())
        }
    }
}

/// Decode a `do`-style task list.
pub fn decode_task_list(value: &Value, scope: &str) -> Result<Vec<TaskEntry>, AppError> {
    let items = value.as_array().ok_or_else(|| {
        AppError::new(
            ErrorCategory::ConfigurationError,
            format!("{} must be a list of tasks", scope),
        )
        .with_code("WFG-DSL-002")
    })?;

    let mut entries = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let map = match item.as_object() {
            Some(map) if map.len() == 1 => map,
            _ => {
                return Err(AppError::new(
                    ErrorCategory::ConfigurationError,
                    format!(
                        "{} entry {} must be a single-key map of task name to task body",
                        scope, index
                    ),
                )
                .with_code("WFG-DSL-002"))
            }
        };
        for (name, body) in map {
            entries.push(TaskEntry::new(name.clone(), decode_task(name, body)?));
        }
    }
    Ok(entries)
}

/// Decode one task body.
pub fn decode_task(name: &str, body: &Value) -> Result<WorkflowTask, AppError> {
    let map = object(body, name, "task body")?;

    let kinds: Vec<&str> = KIND_KEYS
        .iter()
        .copied()
        .filter(|key| map.contains_key(*key))
        .collect();
    let kind_key = match kinds.as_slice() {
        [single] => *single,
        [] => return Err(malformed(name, "unknown task kind: no recognised kind key")),
        many => {
            return Err(malformed(
                name,
                format!("declares more than one kind: {}", many.join(", ")),
            ))
        }
    };

    let extra: &[&str] = match kind_key {
        "call" => &["with"],
        "for" => &["while", "do"],
        "try" => &["catch"],
        _ => &[],
    };
    if let Some(key) = map.keys().find(|key| {
        let key = key.as_str();
        key != kind_key && !COMMON_KEYS.contains(&key) && !extra.contains(&key)
    }) {
        return Err(malformed(name, format!("unknown key '{}'", key)));
    }

    let kind = decode_kind(name, kind_key, map)?;

    let then = opt_string(map, "then", name)?.map(|raw| FlowDirective::parse(&raw));
    let metadata = opt_map(map, "metadata", name)?;

    Ok(WorkflowTask {
        condition: opt_string(map, "if", name)?,
        export: unwrap_as(map, "export", name)?,
        output: unwrap_as(map, "output", name)?,
        then,
        metadata,
        kind,
    })
}

fn decode_kind(name: &str, kind_key: &str, map: &Map<String, Value>) -> Result<TaskKind, AppError> {
    let body = map.get(kind_key).unwrap_or(&Value::Null);
    match kind_key {
        "set" => Ok(TaskKind::Set(object(body, name, "set")?.clone())),
        "call" => decode_call(name, body, map.get("with")),
        "switch" => decode_switch(name, body),
        "for" => decode_for(name, body, map),
        "fork" => decode_fork(name, body),
        "try" => decode_try(name, body, map.get("catch")),
        "listen" => decode_listen(name, body),
        "wait" => decode_wait(name, body),
        "raise" => decode_raise(name, body),
        "run" => decode_run(name, body),
        other => Err(malformed(name, format!("unknown task kind '{}'", other))),
    }
}

fn decode_call(name: &str, call: &Value, with: Option<&Value>) -> Result<TaskKind, AppError> {
    let call_type = call
        .as_str()
        .ok_or_else(|| malformed(name, "'call' must be a string"))?;
    match call_type {
        "http" => {
            let with = object(with.unwrap_or(&Value::Null), name, "with")?;
            reject_unknown(
                with,
                &["method", "endpoint", "headers", "query", "body", "output", "timeout_seconds"],
                name,
                "with",
            )?;
            let endpoint = match with.get("endpoint") {
                Some(Value::String(uri)) => uri.clone(),
                Some(Value::Object(endpoint)) => {
                    reject_unknown(endpoint, &["uri"], name, "endpoint")?;
                    required_string(endpoint, "uri", name)?
                }
                _ => return Err(malformed(name, "'endpoint' is required")),
            };
            let output = match opt_string(with, "output", name)? {
                None => HttpOutputMode::Content,
                Some(raw) => HttpOutputMode::parse(&raw)
                    .ok_or_else(|| malformed(name, format!("unknown output mode '{}'", raw)))?,
            };
            let timeout_seconds = match with.get("timeout_seconds") {
                None | Some(Value::Null) => None,
                Some(value) => Some(
                    value
                        .as_u64()
                        .ok_or_else(|| malformed(name, "'timeout_seconds' must be an integer"))?,
                ),
            };
            Ok(TaskKind::HttpCall(HttpCall {
                method: required_string(with, "method", name)?,
                endpoint,
                headers: opt_map(with, "headers", name)?,
                query: opt_map(with, "query", name)?,
                body: with.get("body").filter(|body| !body.is_null()).cloned(),
                output,
                timeout_seconds,
            }))
        }
        "grpc" => {
            let with = object(with.unwrap_or(&Value::Null), name, "with")?;
            reject_unknown(with, &["service", "method", "request"], name, "with")?;
            let service = match with.get("service") {
                Some(Value::String(service)) => GrpcService {
                    name: service.clone(),
                    host: None,
                    port: None,
                },
                Some(Value::Object(service)) => {
                    reject_unknown(service, &["name", "host", "port"], name, "service")?;
                    let port = match service.get("port") {
                        None | Some(Value::Null) => None,
                        Some(port) => Some(
                            port.as_u64()
                                .and_then(|port| u16::try_from(port).ok())
                                .ok_or_else(|| malformed(name, "'port' must be a valid port"))?,
                        ),
                    };
                    GrpcService {
                        name: required_string(service, "name", name)?,
                        host: opt_string(service, "host", name)?,
                        port,
                    }
                }
                _ => return Err(malformed(name, "'service' is required")),
            };
            Ok(TaskKind::GrpcCall(GrpcCall {
                service,
                method: required_string(with, "method", name)?,
                request: with.get("request").filter(|r| !r.is_null()).cloned(),
            }))
        }
        "activity" => Ok(TaskKind::CallActivity(with.cloned().unwrap_or(Value::Null))),
        other => Err(malformed(name, format!("unknown task kind 'call: {}'", other))),
    }
}

fn decode_switch(name: &str, body: &Value) -> Result<TaskKind, AppError> {
    let switch = object(body, name, "switch")?;
    reject_unknown(switch, &["cases"], name, "switch")?;
    let mut cases = Vec::new();
    if let Some(raw_cases) = switch.get("cases") {
        let raw_cases = raw_cases
            .as_array()
            .ok_or_else(|| malformed(name, "'cases' must be a list"))?;
        for raw in raw_cases {
            let case = object(raw, name, "case")?;
            reject_unknown(case, &["name", "when", "then"], name, "case")?;
            cases.push(SwitchCase {
                name: opt_string(case, "name", name)?,
                when: opt_string(case, "when", name)?,
                then: opt_string(case, "then", name)?.map(|raw| FlowDirective::parse(&raw)),
            });
        }
    }
    Ok(TaskKind::Switch(cases))
}

fn decode_for(name: &str, body: &Value, task: &Map<String, Value>) -> Result<TaskKind, AppError> {
    let spec = object(body, name, "for")?;
    reject_unknown(spec, &["in", "each", "at"], name, "for")?;
    let collection = spec
        .get("in")
        .cloned()
        .ok_or_else(|| malformed(name, "'for.in' is required"))?;
    let tasks = decode_task_list(
        task.get("do").unwrap_or(&Value::Array(Vec::new())),
        &format!("task '{}' do", name),
    )?;
    Ok(TaskKind::For(ForLoop {
        each: opt_string(spec, "each", name)?.unwrap_or_else(|| DEFAULT_EACH.to_string()),
        at: opt_string(spec, "at", name)?.unwrap_or_else(|| DEFAULT_AT.to_string()),
        collection,
        while_condition: opt_string(task, "while", name)?,
        tasks,
    }))
}

fn decode_fork(name: &str, body: &Value) -> Result<TaskKind, AppError> {
    let spec = object(body, name, "fork")?;
    reject_unknown(spec, &["compete", "branches"], name, "fork")?;
    let compete = match spec.get("compete") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(_) => return Err(malformed(name, "'compete' must be a boolean")),
    };
    let raw_branches = spec
        .get("branches")
        .and_then(Value::as_array)
        .ok_or_else(|| malformed(name, "'fork.branches' must be a list"))?;
    let mut branches = Vec::with_capacity(raw_branches.len());
    for raw in raw_branches {
        let branch = object(raw, name, "branch")?;
        reject_unknown(branch, &["name", "do"], name, "branch")?;
        let branch_name = required_string(branch, "name", name)?;
        let tasks = decode_task_list(
            branch.get("do").unwrap_or(&Value::Array(Vec::new())),
            &format!("task '{}' branch '{}'", name, branch_name),
        )?;
        branches.push(ForkBranch {
            name: branch_name,
            tasks,
        });
    }
    Ok(TaskKind::Fork(Fork { compete, branches }))
}

fn decode_try(name: &str, body: &Value, catch: Option<&Value>) -> Result<TaskKind, AppError> {
    let tasks = decode_task_list(body, &format!("task '{}' try", name))?;
    let catch = match catch {
        None | Some(Value::Null) => None,
        Some(raw) => {
            let spec = object(raw, name, "catch")?;
            reject_unknown(spec, &["as", "do"], name, "catch")?;
            Some(Catch {
                as_name: opt_string(spec, "as", name)?
                    .unwrap_or_else(|| DEFAULT_CATCH_AS.to_string()),
                tasks: decode_task_list(
                    spec.get("do").unwrap_or(&Value::Array(Vec::new())),
                    &format!("task '{}' catch", name),
                )?,
            })
        }
    };
    Ok(TaskKind::Try(TryCatch { tasks, catch }))
}

fn decode_listen(name: &str, body: &Value) -> Result<TaskKind, AppError> {
    let spec = object(body, name, "listen")?;
    reject_unknown(spec, &["to"], name, "listen")?;
    let to = object(spec.get("to").unwrap_or(&Value::Null), name, "listen.to")?;
    reject_unknown(to, &["one", "any", "all"], name, "listen.to")?;
    let (key, events) = match to.iter().next() {
        Some(entry) if to.len() == 1 => entry,
        _ => {
            return Err(malformed(
                name,
                "'listen.to' must hold exactly one of one, any or all",
            ))
        }
    };
    let mode = ListenMode::parse(key)
        .ok_or_else(|| malformed(name, format!("unknown listen mode '{}'", key)))?;
    let events = match (mode, events) {
        (ListenMode::One, Value::Array(_)) => {
            return Err(malformed(name, "'listen.to.one' takes a single event"))
        }
        (ListenMode::One, event) => vec![event.clone()],
        (_, Value::Array(events)) => events.clone(),
        (_, _) => return Err(malformed(name, format!("'listen.to.{}' must be a list", key))),
    };
    Ok(TaskKind::Listen(Listen { mode, events }))
}

fn decode_wait(name: &str, body: &Value) -> Result<TaskKind, AppError> {
    match body {
        Value::Number(number) => number
            .as_u64()
            .map(|seconds| TaskKind::Wait(WaitDuration::Seconds(seconds)))
            .ok_or_else(|| malformed(name, "'wait' seconds must be a non-negative integer")),
        Value::String(text) => Ok(TaskKind::Wait(WaitDuration::Text(text.clone()))),
        _ => Err(malformed(name, "'wait' must be seconds or a duration string")),
    }
}

fn decode_raise(name: &str, body: &Value) -> Result<TaskKind, AppError> {
    let spec = object(body, name, "raise")?;
    reject_unknown(spec, &["error", "title", "message", "status"], name, "raise")?;
    let status = match spec.get("status") {
        None | Some(Value::Null) => None,
        Some(value) => Some(
            value
                .as_u64()
                .and_then(|status| u16::try_from(status).ok())
                .ok_or_else(|| malformed(name, "'status' must be an integer"))?,
        ),
    };
    Ok(TaskKind::Raise(Raise {
        error_type: required_string(spec, "error", name)?,
        title: opt_string(spec, "title", name)?,
        message: opt_string(spec, "message", name)?,
        status,
    }))
}

fn decode_run(name: &str, body: &Value) -> Result<TaskKind, AppError> {
    let spec = object(body, name, "run")?;
    reject_unknown(spec, &["workflow", "with", "await"], name, "run")?;
    let await_completion = match spec.get("await") {
        None | Some(Value::Null) => true,
        Some(Value::Bool(flag)) => *flag,
        Some(_) => return Err(malformed(name, "'await' must be a boolean")),
    };
    Ok(TaskKind::Run(RunWorkflow {
        workflow: opt_string(spec, "workflow", name)?.unwrap_or_default(),
        input: spec.get("with").filter(|input| !input.is_null()).cloned(),
        await_completion,
    }))
}

/// Encode a task list in canonical form: optional fields and defaults are left out.
pub fn encode_task_list(tasks: &[TaskEntry]) -> Value {
    Value::Array(
        tasks
            .iter()
            .map(|entry| {
                let mut wrapper = Map::new();
                wrapper.insert(entry.name.clone(), encode_task(&entry.task));
                Value::Object(wrapper)
            })
            .collect(),
    )
}

fn wrap_as(value: &Value) -> Value {
    let mut map = Map::new();
    map.insert("as".to_string(), value.clone());
    Value::Object(map)
}

fn insert_str(map: &mut Map<String, Value>, key: &str, value: &str) {
    map.insert(key.to_string(), Value::String(value.to_string()));
}

pub fn encode_task(task: &WorkflowTask) -> Value {
    let mut body = Map::new();
    if let Some(condition) = &task.condition {
        insert_str(&mut body, "if", condition);
    }
    if let Some(export) = &task.export {
        body.insert("export".to_string(), wrap_as(export));
    }
    if let Some(output) = &task.output {
        body.insert("output".to_string(), wrap_as(output));
    }
    if let Some(then) = &task.then {
        insert_str(&mut body, "then", then.as_str());
    }
    if !task.metadata.is_empty() {
        body.insert("metadata".to_string(), Value::Object(task.metadata.clone()));
    }

    match &task.kind {
        TaskKind::Set(values) => {
            body.insert("set".to_string(), Value::Object(values.clone()));
        }
        TaskKind::HttpCall(http) => {
            let mut with = Map::new();
            insert_str(&mut with, "method", &http.method);
            let mut endpoint = Map::new();
            insert_str(&mut endpoint, "uri", &http.endpoint);
            with.insert("endpoint".to_string(), Value::Object(endpoint));
            if !http.headers.is_empty() {
                with.insert("headers".to_string(), Value::Object(http.headers.clone()));
            }
            if !http.query.is_empty() {
                with.insert("query".to_string(), Value::Object(http.query.clone()));
            }
            if let Some(payload) = &http.body {
                with.insert("body".to_string(), payload.clone());
            }
            if http.output != HttpOutputMode::Content {
                insert_str(&mut with, "output", http.output.as_str());
            }
            if let Some(timeout) = http.timeout_seconds {
                with.insert("timeout_seconds".to_string(), Value::from(timeout));
            }
            insert_str(&mut body, "call", "http");
            body.insert("with".to_string(), Value::Object(with));
        }
        TaskKind::GrpcCall(grpc) => {
            let mut with = Map::new();
            let service = if grpc.service.host.is_none() && grpc.service.port.is_none() {
                Value::String(grpc.service.name.clone())
            } else {
                let mut service = Map::new();
                insert_str(&mut service, "name", &grpc.service.name);
                if let Some(host) = &grpc.service.host {
                    insert_str(&mut service, "host", host);
                }
                if let Some(port) = grpc.service.port {
                    service.insert("port".to_string(), Value::from(port));
                }
                Value::Object(service)
            };
            with.insert("service".to_string(), service);
            insert_str(&mut with, "method", &grpc.method);
            if let Some(request) = &grpc.request {
                with.insert("request".to_string(), request.clone());
            }
            insert_str(&mut body, "call", "grpc");
            body.insert("with".to_string(), Value::Object(with));
        }
        TaskKind::Switch(cases) => {
            let cases: Vec<Value> = cases
                .iter()
                .map(|case| {
                    let mut encoded = Map::new();
                    if let Some(name) = &case.name {
                        insert_str(&mut encoded, "name", name);
                    }
                    if let Some(when) = &case.when {
                        insert_str(&mut encoded, "when", when);
                    }
                    if let Some(then) = &case.then {
                        insert_str(&mut encoded, "then", then.as_str());
                    }
                    Value::Object(encoded)
                })
                .collect();
            let mut switch = Map::new();
            switch.insert("cases".to_string(), Value::Array(cases));
            body.insert("switch".to_string(), Value::Object(switch));
        }
        TaskKind::For(for_loop) => {
            let mut spec = Map::new();
            spec.insert("in".to_string(), for_loop.collection.clone());
            if for_loop.each != DEFAULT_EACH {
                insert_str(&mut spec, "each", &for_loop.each);
            }
            if for_loop.at != DEFAULT_AT {
                insert_str(&mut spec, "at", &for_loop.at);
            }
            body.insert("for".to_string(), Value::Object(spec));
            if let Some(condition) = &for_loop.while_condition {
                insert_str(&mut body, "while", condition);
            }
            body.insert("do".to_string(), encode_task_list(&for_loop.tasks));
        }
        TaskKind::Fork(fork) => {
            let branches: Vec<Value> = fork
                .branches
                .iter()
                .map(|branch| {
                    let mut encoded = Map::new();
                    insert_str(&mut encoded, "name", &branch.name);
                    encoded.insert("do".to_string(), encode_task_list(&branch.tasks));
                    Value::Object(encoded)
                })
                .collect();
            let mut spec = Map::new();
            spec.insert("branches".to_string(), Value::Array(branches));
            if fork.compete {
                spec.insert("compete".to_string(), Value::Bool(true));
            }
            body.insert("fork".to_string(), Value::Object(spec));
        }
        TaskKind::Try(try_catch) => {
            body.insert("try".to_string(), encode_task_list(&try_catch.tasks));
            if let Some(catch) = &try_catch.catch {
                let mut spec = Map::new();
                if catch.as_name != DEFAULT_CATCH_AS {
                    insert_str(&mut spec, "as", &catch.as_name);
                }
                if !catch.tasks.is_empty() {
                    spec.insert("do".to_string(), encode_task_list(&catch.tasks));
                }
                body.insert("catch".to_string(), Value::Object(spec));
            }
        }
        TaskKind::Listen(listen) => {
            let events = match (listen.mode, listen.events.as_slice()) {
                (ListenMode::One, [event]) => event.clone(),
                _ => Value::Array(listen.events.clone()),
            };
            let mut to = Map::new();
            to.insert(listen.mode.as_str().to_string(), events);
            let mut spec = Map::new();
            spec.insert("to".to_string(), Value::Object(to));
            body.insert("listen".to_string(), Value::Object(spec));
        }
        TaskKind::Wait(duration) => {
            let encoded = match duration {
                WaitDuration::Seconds(seconds) => Value::from(*seconds),
                WaitDuration::Text(text) => Value::String(text.clone()),
            };
            body.insert("wait".to_string(), encoded);
        }
        TaskKind::Raise(raise) => {
            let mut spec = Map::new();
            insert_str(&mut spec, "error", &raise.error_type);
            if let Some(title) = &raise.title {
                insert_str(&mut spec, "title", title);
            }
            if let Some(message) = &raise.message {
                insert_str(&mut spec, "message", message);
            }
            if let Some(status) = raise.status {
                spec.insert("status".to_string(), Value::from(status));
            }
            body.insert("raise".to_string(), Value::Object(spec));
        }
        TaskKind::Run(run) => {
            let mut spec = Map::new();
            insert_str(&mut spec, "workflow", &run.workflow);
            if let Some(input) = &run.input {
                spec.insert("with".to_string(), input.clone());
            }
            if !run.await_completion {
                spec.insert("await".to_string(), Value::Bool(false));
            }
            body.insert("run".to_string(), Value::Object(spec));
        }
        TaskKind::CallActivity(with) => {
            insert_str(&mut body, "call", "activity");
            if !with.is_null() {
                body.insert("with".to_string(), with.clone());
            }
        }
    }
    Value::Object(body)
}
