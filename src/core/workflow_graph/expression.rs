#![allow(clippy::result_large_err)] // Expression APIs return AppError so callers keep codes and retryability intact.

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use crate::core::workflow_graph::state::ExecutionState;
use indexmap::IndexMap;
use regex::Regex;
use rhai::{Array, Dynamic, Engine, Map, Scope, AST};
use serde_json::{Map as JsonMap, Number, Value};
use std::fmt;
use std::sync::{Arc, OnceLock};

/// Root variables bound into every expression scope.
pub const ROOT_VARIABLES: [&str; 5] = ["context", "data", "env", "input", "output"];

/// Zero-argument helper callable from expressions.
pub type ExprFunction = Arc<dyn Fn() -> Value + Send + Sync>;

/// Helpers made available to expressions. The table is handed to the engine at
/// construction so each execution decides what it exposes.
#[derive(Clone, Default)]
pub struct FunctionTable {
    functions: IndexMap<String, ExprFunction>,
}

impl fmt::Debug for FunctionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.functions.keys()).finish()
    }
}

impl FunctionTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// `uuid()` and `now()`.
    pub fn with_defaults() -> Self {
        Self::empty()
            .register("uuid", || Value::String(uuid::Uuid::new_v4().to_string()))
            .register("now", || Value::String(chrono::Utc::now().to_rfc3339()))
    }

    pub fn register<F>(mut self, name: &str, function: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.functions.insert(name.to_string(), Arc::new(function));
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }
}

/// Expression evaluation engine using a locked-down Rhai configuration.
pub struct ExpressionEngine {
    engine: Engine,
    functions: FunctionTable,
}

impl Default for ExpressionEngine {
    fn default() -> Self {
        Self::new(FunctionTable::with_defaults())
    }
}

impl fmt::Debug for ExpressionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExpressionEngine")
            .field("functions", &self.functions)
            .finish()
    }
}

impl ExpressionEngine {
    pub fn new(functions: FunctionTable) -> Self {
        let mut engine = Engine::new_raw();
        engine.set_max_operations(50_000);
        engine.set_max_call_levels(64);
        engine.set_max_expr_depths(64, 64);
        engine.on_print(|_| {});
        engine.on_debug(|_, _, _| {});
        for (name, function) in &functions.functions {
            let function = Arc::clone(function);
            engine.register_fn(name.as_str(), move || to_dynamic(&function()));
        }
        ExpressionEngine { engine, functions }
    }

    pub fn functions(&self) -> &FunctionTable {
        &self.functions
    }

    /// True when the whole string is wrapped as `${ ... }`.
    pub fn is_runtime_expression(text: &str) -> bool {
        expression_body(text).is_some()
    }

    /// Compile a wrapped expression without running it. Plain strings are accepted as literals.
    pub fn check_syntax(&self, text: &str) -> Result<(), AppError> {
        match expression_body(text) {
            None => Ok(()),
            Some(body) => self.compile(body).map(|_| ()),
        }
    }

    fn compile(&self, body: &str) -> Result<AST, AppError> {
        let source = prepare_source(body)?;
        self.engine.compile(&source).map_err(|err| {
            AppError::new(
                ErrorCategory::ExpressionError,
                format!("expression compile error in '{}': {}", body, err),
            )
            .with_code("WFG-EXPR-001")
        })
    }

    /// Evaluate `text` against the state. Strings that are not wrapped as
    /// runtime expressions are returned verbatim.
    pub fn evaluate(&self, text: &str, state: &ExecutionState) -> Result<Value, AppError> {
        let Some(body) = expression_body(text) else {
            return Ok(Value::String(text.to_string()));
        };
        let ast = self.compile(body)?;
        let mut scope = build_scope(state);
        let result = self
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, &ast)
            .map_err(|err| {
                AppError::new(
                    ErrorCategory::ExpressionError,
                    format!("expression execution error in '{}': {}", body, err),
                )
                .with_code("WFG-EXPR-001")
            })?;
        Ok(from_dynamic(result))
    }

    /// Walk maps and lists, evaluating every string leaf.
    pub fn traverse_and_evaluate(
        &self,
        value: &Value,
        state: &ExecutionState,
    ) -> Result<Value, AppError> {
        match value {
            Value::String(text) => self.evaluate(text, state),
            Value::Object(map) => {
                let mut resolved = JsonMap::new();
                for (key, child) in map {
                    resolved.insert(key.clone(), self.traverse_and_evaluate(child, state)?);
                }
                Ok(Value::Object(resolved))
            }
            Value::Array(items) => {
                let mut collection = Vec::with_capacity(items.len());
                for item in items {
                    collection.push(self.traverse_and_evaluate(item, state)?);
                }
                Ok(Value::Array(collection))
            }
            other => Ok(other.clone()),
        }
    }

    /// Check every wrapped string inside a nested value.
    pub fn check_nested_syntax(&self, value: &Value) -> Result<(), AppError> {
        match value {
            Value::String(text) => self.check_syntax(text),
            Value::Object(map) => map.values().try_for_each(|v| self.check_nested_syntax(v)),
            Value::Array(items) => items.iter().try_for_each(|v| self.check_nested_syntax(v)),
            _ => Ok(()),
        }
    }

    /// Evaluate an `if`/`when` guard. Absent guards pass.
    pub fn check_condition(
        &self,
        condition: Option<&str>,
        state: &ExecutionState,
    ) -> Result<bool, AppError> {
        let Some(condition) = condition else {
            return Ok(true);
        };
        let result = self.evaluate(condition, state)?;
        truthiness(&result).ok_or_else(|| {
            AppError::new(
                ErrorCategory::ConfigurationError,
                format!(
                    "condition '{}' must resolve to a boolean or \"true\"/\"1\" string, got {}",
                    condition,
                    type_name(&result)
                ),
            )
            .with_code("WFG-EXPR-002")
            .non_retryable()
        })
    }
}

/// Truth value of a guard known without evaluation, if any.
pub fn static_truth(condition: &str) -> Option<bool> {
    if ExpressionEngine::is_runtime_expression(condition) {
        return None;
    }
    truthiness(&Value::String(condition.to_string()))
}

fn truthiness(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::String(text) => Some(text.eq_ignore_ascii_case("true") || text == "1"),
        _ => None,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn sigil_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\$(context|data|env|input|output)\b").ok())
        .as_ref()
}

fn expression_body(text: &str) -> Option<&str> {
    text.trim()
        .strip_prefix("${")
        .and_then(|rest| rest.strip_suffix('}'))
}

fn prepare_source(body: &str) -> Result<String, AppError> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err(
            AppError::new(ErrorCategory::ExpressionError, "expression produced no result: empty body")
                .with_code("WFG-EXPR-001"),
        );
    }
    Ok(match sigil_pattern() {
        Some(pattern) => pattern.replace_all(trimmed, "$1").into_owned(),
        None => trimmed.to_string(),
    })
}

fn build_scope(state: &ExecutionState) -> Scope<'static> {
    let root = state.get_as_map();
    let mut scope = Scope::new();
    for name in ROOT_VARIABLES {
        let value = root.get(name).cloned().unwrap_or(Value::Null);
        scope.push_dynamic(name, to_dynamic(&value));
    }
    scope
}

fn to_dynamic(value: &Value) -> Dynamic {
    match value {
        Value::Null => Dynamic::UNIT,
        Value::Bool(b) => Dynamic::from(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Dynamic::from(i)
            } else if let Some(f) = n.as_f64() {
                Dynamic::from(f)
            } else {
                Dynamic::from(0_i64)
            }
        }
        Value::String(s) => Dynamic::from(s.clone()),
        Value::Array(items) => {
            let arr: Array = items.iter().map(to_dynamic).collect();
            Dynamic::from_array(arr)
        }
        Value::Object(map) => {
            let mut rhai_map = Map::new();
            for (key, value) in map {
                rhai_map.insert(key.into(), to_dynamic(value));
            }
            Dynamic::from_map(rhai_map)
        }
    }
}

fn from_dynamic(value: Dynamic) -> Value {
    if value.is_unit() {
        return Value::Null;
    }
    if let Some(b) = value.clone().try_cast::<bool>() {
        return Value::Bool(b);
    }
    if let Some(i) = value.clone().try_cast::<i64>() {
        return Value::Number(Number::from(i));
    }
    if let Some(f) = value.clone().try_cast::<f64>() {
        if let Some(num) = Number::from_f64(f) {
            return Value::Number(num);
        }
    }
    if let Some(s) = value.clone().try_cast::<String>() {
        return Value::String(s);
    }
    if let Some(c) = value.clone().try_cast::<char>() {
        return Value::String(c.to_string());
    }
    if let Some(arr) = value.clone().try_cast::<Array>() {
        return Value::Array(arr.into_iter().map(from_dynamic).collect());
    }
    if let Some(map) = value.clone().try_cast::<Map>() {
        let mut json_map = JsonMap::new();
        for (key, value) in map {
            json_map.insert(key.into(), from_dynamic(value));
        }
        return Value::Object(json_map);
    }
    Value::Null
}
