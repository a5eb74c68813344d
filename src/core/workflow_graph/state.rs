use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key under `data` that carries the resume point across a continuation.
pub const CONTINUE_AS_NEW_MARKER: &str = "__continue_as_new_from__";

/// Mutable record threaded through one execution.
///
/// `Clone` is written out field by field and copies every nested map and list,
/// so a clone handed to a fork branch or loop iteration never shares structure
/// with its parent.
#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionState {
    /// Exports of finished tasks, keyed by task name.
    pub context: Value,
    pub data: Map<String, Value>,
    pub env: Map<String, Value>,
    pub input: Value,
    pub output: Value,
    /// Task id a continued execution resumes from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continue_from: Option<String>,
}

impl Clone for ExecutionState {
    fn clone(&self) -> Self {
        ExecutionState {
            context: deep_clone_value(&self.context),
            data: deep_clone_map(&self.data),
            env: deep_clone_map(&self.env),
            input: deep_clone_value(&self.input),
            output: deep_clone_value(&self.output),
            continue_from: self.continue_from.as_ref().map(|id| id.to_string()),
        }
    }
}

impl ExecutionState {
    pub fn new(input: Value, env: Map<String, Value>) -> Self {
        ExecutionState {
            context: Value::Object(Map::new()),
            data: Map::new(),
            env,
            input,
            output: Value::Null,
            continue_from: None,
        }
    }

    /// Clone intended for a concurrent branch: independent and with `output` cleared.
    pub fn branch_clone(&self) -> Self {
        let mut branch = self.clone();
        branch.output = Value::Null;
        branch
    }

    /// Shallow-merge top-level keys into `data`.
    pub fn add_data(&mut self, entries: Map<String, Value>) {
        for (key, value) in entries {
            self.data.insert(key, value);
        }
    }

    pub fn set_data(&mut self, key: &str, value: Value) {
        self.data.insert(key.to_string(), value);
    }

    /// Record the running task under `data.task.name`.
    pub fn set_current_task(&mut self, name: &str) {
        let mut task = Map::new();
        task.insert("name".to_string(), Value::String(name.to_string()));
        self.data.insert("task".to_string(), Value::Object(task));
    }

    /// Merge a task export into `context` under the task name.
    pub fn merge_export(&mut self, task: &str, export: Value) {
        let context = std::mem::take(&mut self.context);
        let mut map = match context {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut preserved = Map::new();
                preserved.insert("__previous_context".to_string(), other);
                preserved
            }
        };
        map.insert(task.to_string(), export);
        self.context = Value::Object(map);
    }

    /// Store the resume marker ahead of a continuation.
    pub fn mark_continuation(&mut self, task_id: &str) {
        self.continue_from = Some(task_id.to_string());
        self.data.insert(
            CONTINUE_AS_NEW_MARKER.to_string(),
            Value::String(task_id.to_string()),
        );
    }

    /// Move a carried resume marker out of `data` into `continue_from`.
    pub fn restore_continuation(&mut self) -> Option<String> {
        match self.data.remove(CONTINUE_AS_NEW_MARKER) {
            Some(Value::String(task_id)) => {
                self.continue_from = Some(task_id.clone());
                Some(task_id)
            }
            Some(other) => {
                self.data.insert(CONTINUE_AS_NEW_MARKER.to_string(), other);
                None
            }
            None => None,
        }
    }

    /// Root object exposed to expressions. Always a fresh copy.
    pub fn get_as_map(&self) -> Map<String, Value> {
        let mut root = Map::new();
        root.insert("context".to_string(), deep_clone_value(&self.context));
        root.insert("data".to_string(), Value::Object(deep_clone_map(&self.data)));
        root.insert("env".to_string(), Value::Object(deep_clone_map(&self.env)));
        root.insert("input".to_string(), deep_clone_value(&self.input));
        root.insert("output".to_string(), deep_clone_value(&self.output));
        root
    }
}

pub fn deep_clone_value(value: &Value) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::Bool(flag) => Value::Bool(*flag),
        Value::Number(number) => Value::Number(number.clone()),
        Value::String(text) => Value::String(text.as_str().to_string()),
        Value::Array(items) => Value::Array(items.iter().map(deep_clone_value).collect()),
        Value::Object(map) => Value::Object(deep_clone_map(map)),
    }
}

pub fn deep_clone_map(map: &Map<String, Value>) -> Map<String, Value> {
    let mut copy = Map::new();
    for (key, value) in map {
        copy.insert(key.to_string(), deep_clone_value(value));
    }
    copy
}
