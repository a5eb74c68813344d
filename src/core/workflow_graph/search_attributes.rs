#![allow(clippy::result_large_err)] // Projection errors carry WFG-SA codes through AppError.

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Task metadata key holding `{name: {type, value}}` search attribute specs.
pub const SEARCH_ATTRIBUTES_KEY: &str = "searchAttributes";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchAttributeType {
    Bool,
    Datetime,
    Text,
    Keyword,
    Keywordlist,
    Int,
    Double,
}

impl SearchAttributeType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "bool" => Some(SearchAttributeType::Bool),
            "datetime" => Some(SearchAttributeType::Datetime),
            "text" => Some(SearchAttributeType::Text),
            "keyword" => Some(SearchAttributeType::Keyword),
            "keywordlist" => Some(SearchAttributeType::Keywordlist),
            "int" => Some(SearchAttributeType::Int),
            "double" => Some(SearchAttributeType::Double),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SearchAttributeType::Bool => "bool",
            SearchAttributeType::Datetime => "datetime",
            SearchAttributeType::Text => "text",
            SearchAttributeType::Keyword => "keyword",
            SearchAttributeType::Keywordlist => "keywordlist",
            SearchAttributeType::Int => "int",
            SearchAttributeType::Double => "double",
        }
    }
}

impl fmt::Display for SearchAttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed search attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchAttributeValue {
    Bool(bool),
    Datetime(DateTime<Utc>),
    Text(String),
    Keyword(String),
    KeywordList(Vec<String>),
    Int(i64),
    Double(f64),
}

impl SearchAttributeValue {
    pub fn to_json(&self) -> Value {
        match self {
            SearchAttributeValue::Bool(flag) => Value::Bool(*flag),
            SearchAttributeValue::Datetime(at) => Value::String(at.to_rfc3339()),
            SearchAttributeValue::Text(text) | SearchAttributeValue::Keyword(text) => {
                Value::String(text.clone())
            }
            SearchAttributeValue::KeywordList(items) => {
                Value::Array(items.iter().cloned().map(Value::String).collect())
            }
            SearchAttributeValue::Int(number) => Value::from(*number),
            SearchAttributeValue::Double(number) => Value::from(*number),
        }
    }
}

/// One attribute change. `value: None` clears the attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchAttributeUpdate {
    pub name: String,
    pub value: Option<SearchAttributeValue>,
}

/// Declared spec, value still unevaluated.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchAttributeSpec {
    pub name: String,
    pub attr_type: SearchAttributeType,
    pub value: Value,
}

/// Read `metadata.searchAttributes`, checking shape and types without evaluating values.
pub fn parse_specs(metadata: &Map<String, Value>) -> Result<Vec<SearchAttributeSpec>, AppError> {
    let Some(raw) = metadata.get(SEARCH_ATTRIBUTES_KEY) else {
        return Ok(Vec::new());
    };
    let entries = raw.as_object().ok_or_else(|| {
        shape_error("metadata.searchAttributes must be a map of name to {type, value}")
    })?;

    let mut specs = Vec::with_capacity(entries.len());
    for (name, entry) in entries {
        let entry = entry
            .as_object()
            .ok_or_else(|| shape_error(format!("search attribute '{}' must be a map", name)))?;
        if let Some(key) = entry.keys().find(|key| *key != "type" && *key != "value") {
            return Err(shape_error(format!(
                "search attribute '{}' has unknown key '{}'",
                name, key
            )));
        }
        let raw_type = entry
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| shape_error(format!("search attribute '{}' needs a type", name)))?;
        let attr_type = SearchAttributeType::parse(raw_type).ok_or_else(|| {
            shape_error(format!(
                "search attribute '{}' has unknown type '{}'",
                name, raw_type
            ))
        })?;
        specs.push(SearchAttributeSpec {
            name: name.clone(),
            attr_type,
            value: entry.get("value").cloned().unwrap_or(Value::Null),
        });
    }
    Ok(specs)
}

/// Type an evaluated value. Null clears; strings are parsed into the declared type.
pub fn project(
    name: &str,
    attr_type: SearchAttributeType,
    value: &Value,
) -> Result<SearchAttributeUpdate, AppError> {
    if value.is_null() {
        return Ok(SearchAttributeUpdate {
            name: name.to_string(),
            value: None,
        });
    }

    let typed = match (attr_type, value) {
        (SearchAttributeType::Bool, Value::Bool(flag)) => Some(SearchAttributeValue::Bool(*flag)),
        (SearchAttributeType::Bool, Value::String(text)) => {
            match text.trim().to_ascii_lowercase().as_str() {
                "true" => Some(SearchAttributeValue::Bool(true)),
                "false" => Some(SearchAttributeValue::Bool(false)),
                _ => None,
            }
        }
        (SearchAttributeType::Datetime, Value::String(text)) => {
            DateTime::parse_from_rfc3339(text.trim())
                .ok()
                .map(|at| SearchAttributeValue::Datetime(at.with_timezone(&Utc)))
        }
        (SearchAttributeType::Text, Value::String(text)) => {
            Some(SearchAttributeValue::Text(text.clone()))
        }
        (SearchAttributeType::Keyword, Value::String(text)) => {
            Some(SearchAttributeValue::Keyword(text.clone()))
        }
        (SearchAttributeType::Keywordlist, Value::Array(items)) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string))
            .collect::<Option<Vec<_>>>()
            .map(SearchAttributeValue::KeywordList),
        (SearchAttributeType::Int, Value::Number(number)) => {
            number.as_i64().map(SearchAttributeValue::Int)
        }
        (SearchAttributeType::Int, Value::String(text)) => {
            text.trim().parse::<i64>().ok().map(SearchAttributeValue::Int)
        }
        (SearchAttributeType::Double, Value::Number(number)) => {
            number.as_f64().map(SearchAttributeValue::Double)
        }
        (SearchAttributeType::Double, Value::String(text)) => {
            text.trim().parse::<f64>().ok().map(SearchAttributeValue::Double)
        }
        _ => None,
    };

    typed
        .map(|value| SearchAttributeUpdate {
            name: name.to_string(),
            value: Some(value),
        })
        .ok_or_else(|| {
            AppError::new(
                ErrorCategory::ValidationError,
                format!(
                    "search attribute '{}': invalid type, expected {} but got {}",
                    name, attr_type, value
                ),
            )
            .with_code("WFG-SA-002")
        })
}

fn shape_error(message: impl Into<String>) -> AppError {
    AppError::new(ErrorCategory::ConfigurationError, message).with_code("WFG-SA-001")
}
