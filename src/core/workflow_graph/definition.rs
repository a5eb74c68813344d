//! Strongly-typed workflow specification accepted by the converter.
//!
//! A [`TaskSpec`] carries its kind-specific payload as opaque JSON; each kind
//! has exactly one config struct it must decode into. Unknown fields are rejected.

use crate::core::workflow_graph::schema::ScheduleSpec;
use crate::core::workflow_graph::tasks::{ListenMode, TaskKindTag};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<DocumentSpec>,
    #[serde(default)]
    pub tasks: Vec<TaskSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentSpec {
    #[serde(default)]
    pub dsl: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<ScheduleSpec>,
    /// Document-wide `timeout.after` duration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    #[serde(default)]
    pub name: String,
    pub kind: TaskKindTag,
    #[serde(default)]
    pub task_config: Value,
    #[serde(default, rename = "if", skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export: Option<ExportSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow: Option<FlowSpec>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl TaskSpec {
    pub fn new(name: impl Into<String>, kind: TaskKindTag, task_config: Value) -> Self {
        TaskSpec {
            name: name.into(),
            kind,
            task_config,
            condition: None,
            export: None,
            flow: None,
            metadata: Map::new(),
        }
    }

    pub fn with_export(mut self, expression: impl Into<Value>) -> Self {
        self.export = Some(ExportSpec {
            as_value: expression.into(),
        });
        self
    }

    pub fn with_then(mut self, then: impl Into<String>) -> Self {
        self.flow = Some(FlowSpec { then: then.into() });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportSpec {
    #[serde(rename = "as")]
    pub as_value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowSpec {
    #[serde(default)]
    pub then: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetTaskConfig {
    #[serde(default)]
    pub variables: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpEndpointConfig {
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpCallTaskConfig {
    pub method: String,
    pub endpoint: HttpEndpointConfig,
    #[serde(default)]
    pub headers: Map<String, Value>,
    #[serde(default)]
    pub query: Map<String, Value>,
    #[serde(default)]
    pub body: Option<Value>,
    #[serde(default)]
    pub timeout_seconds: u64,
    /// `content`, `response` or `raw`.
    #[serde(default)]
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GrpcServiceConfig {
    pub name: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GrpcCallTaskConfig {
    pub service: GrpcServiceConfig,
    pub method: String,
    #[serde(default)]
    pub request: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SwitchCaseConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub when: String,
    #[serde(default)]
    pub then: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SwitchTaskConfig {
    #[serde(default)]
    pub cases: Vec<SwitchCaseConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForTaskConfig {
    #[serde(rename = "in")]
    pub collection: Value,
    #[serde(default)]
    pub each: String,
    #[serde(default)]
    pub at: String,
    #[serde(default, rename = "while")]
    pub while_condition: String,
    #[serde(default, rename = "do")]
    pub tasks: Vec<TaskSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForkBranchConfig {
    pub name: String,
    #[serde(default, rename = "do")]
    pub tasks: Vec<TaskSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForkTaskConfig {
    #[serde(default)]
    pub branches: Vec<ForkBranchConfig>,
    #[serde(default)]
    pub compete: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatchConfig {
    #[serde(default, rename = "as")]
    pub as_name: String,
    #[serde(default, rename = "do")]
    pub tasks: Vec<TaskSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TryTaskConfig {
    #[serde(default, rename = "try")]
    pub tasks: Vec<TaskSpec>,
    #[serde(default)]
    pub catch: Option<CatchConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListenToConfig {
    pub mode: ListenMode,
    #[serde(default)]
    pub events: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListenTaskConfig {
    pub to: ListenToConfig,
    /// Carried into task metadata as `timeout`.
    #[serde(default)]
    pub timeout: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WaitTaskConfig {
    #[serde(default)]
    pub seconds: u64,
    #[serde(default)]
    pub duration: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RaiseTaskConfig {
    pub error: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: u16,
}

fn default_await() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunTaskConfig {
    pub workflow: String,
    #[serde(default)]
    pub input: Option<Value>,
    #[serde(default = "default_await", rename = "await")]
    pub await_completion: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CallActivityTaskConfig {
    #[serde(default)]
    pub activity: String,
    #[serde(default)]
    pub input: Value,
}

/// A decoded, kind-specific task payload.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskConfig {
    Set(SetTaskConfig),
    HttpCall(HttpCallTaskConfig),
    GrpcCall(GrpcCallTaskConfig),
    Switch(SwitchTaskConfig),
    For(ForTaskConfig),
    Fork(ForkTaskConfig),
    Try(TryTaskConfig),
    Listen(ListenTaskConfig),
    Wait(WaitTaskConfig),
    Raise(RaiseTaskConfig),
    Run(RunTaskConfig),
    CallActivity(CallActivityTaskConfig),
}

fn decode<T: serde::de::DeserializeOwned>(raw: &Value) -> Result<T, serde_json::Error> {
    // A missing payload decodes like an empty one.
    match raw {
        Value::Null => serde_json::from_value(Value::Object(Map::new())),
        other => serde_json::from_value(other.clone()),
    }
}

impl TaskSpec {
    /// Decode `task_config` into the struct owned by `kind`.
    pub fn decode_config(&self) -> Result<TaskConfig, serde_json::Error> {
        let raw = &self.task_config;
        Ok(match self.kind {
            TaskKindTag::Set => TaskConfig::Set(decode(raw)?),
            TaskKindTag::HttpCall => TaskConfig::HttpCall(decode(raw)?),
            TaskKindTag::GrpcCall => TaskConfig::GrpcCall(decode(raw)?),
            TaskKindTag::Switch => TaskConfig::Switch(decode(raw)?),
            TaskKindTag::For => TaskConfig::For(decode(raw)?),
            TaskKindTag::Fork => TaskConfig::Fork(decode(raw)?),
            TaskKindTag::Try => TaskConfig::Try(decode(raw)?),
            TaskKindTag::Listen => TaskConfig::Listen(decode(raw)?),
            TaskKindTag::Wait => TaskConfig::Wait(decode(raw)?),
            TaskKindTag::Raise => TaskConfig::Raise(decode(raw)?),
            TaskKindTag::Run => TaskConfig::Run(decode(raw)?),
            TaskKindTag::CallActivity => TaskConfig::CallActivity(decode(raw)?),
        })
    }
}
