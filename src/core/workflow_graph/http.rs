#![allow(clippy::result_large_err)] // HTTP helpers return AppError so status codes map onto retry classification.

use crate::core::config::HttpConfig;
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use crate::core::workflow_graph::backend::{HttpRequest, HttpResponse};
use crate::core::workflow_graph::tasks::HttpOutputMode;
use base64::Engine as _;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

/// reqwest-backed client used by the local backend.
#[derive(Clone)]
pub struct HttpClient {
    http: reqwest::Client,
}

impl HttpClient {
    /// Redirects are not followed: a 3xx reaches the caller as a terminal status.
    pub fn new(config: &HttpConfig) -> Result<Self, AppError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::none());
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(|err| {
            AppError::new(
                ErrorCategory::ConfigurationError,
                format!("failed to build HTTP client: {}", err),
            )
            .with_code("WFG-HTTP-003")
        })?;
        Ok(HttpClient { http })
    }

    pub async fn send(&self, request: &HttpRequest) -> Result<HttpResponse, AppError> {
        let method = reqwest::Method::from_bytes(request.method.as_bytes()).map_err(|_| {
            AppError::new(
                ErrorCategory::ExternalCallError,
                format!("invalid HTTP method '{}'", request.method),
            )
            .with_code("WFG-HTTP-002")
            .non_retryable()
        })?;
        let url = reqwest::Url::parse(&request.uri).map_err(|err| {
            AppError::new(
                ErrorCategory::ExternalCallError,
                format!("invalid endpoint '{}': {}", request.uri, err),
            )
            .with_code("WFG-HTTP-002")
            .non_retryable()
        })?;

        let mut builder = self.http.request(method, url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !request.query.is_empty() {
            let pairs: Vec<(&str, &str)> = request
                .query
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect();
            builder = builder.query(&pairs);
        }
        match &request.body {
            None => {}
            Some(Value::String(text)) => builder = builder.body(text.clone()),
            Some(payload) => builder = builder.json(payload),
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder.send().await.map_err(|err| {
            AppError::new(
                ErrorCategory::ExternalCallError,
                format!("{} {} failed: {}", request.method, request.uri, err),
            )
            .with_code("WFG-HTTP-001")
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = response.bytes().await.map_err(|err| {
            AppError::new(
                ErrorCategory::ExternalCallError,
                format!("failed to read response body from {}: {}", request.uri, err),
            )
            .with_code("WFG-HTTP-001")
        })?;

        Ok(HttpResponse {
            status,
            headers,
            body: body.to_vec(),
        })
    }
}

/// 2xx passes. 3xx and 4xx are terminal; 5xx may be retried.
pub fn check_status(request: &HttpRequest, response: &HttpResponse) -> Result<(), AppError> {
    if (200..300).contains(&response.status) {
        return Ok(());
    }
    let detail = String::from_utf8_lossy(&response.body);
    let mut err = AppError::new(
        ErrorCategory::ExternalCallError,
        format!(
            "{} {} returned status {}{}",
            request.method,
            request.uri,
            response.status,
            if detail.trim().is_empty() {
                String::new()
            } else {
                format!(": {}", detail.trim())
            }
        ),
    )
    .with_code(format!("WFG-HTTP-{}", response.status));
    err.add_context("status", &response.status.to_string());
    err.add_context("type", "communication");
    if response.status < 500 {
        err = err.non_retryable();
    }
    Err(err)
}

/// Parsed JSON body, falling back to the body as text.
pub fn parse_content(response: &HttpResponse) -> Value {
    if response.body.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&response.body)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&response.body).into_owned()))
}

/// Shape a response according to the task's output mode.
pub fn shape_output(mode: HttpOutputMode, request: &HttpRequest, response: &HttpResponse) -> Value {
    match mode {
        HttpOutputMode::Content => parse_content(response),
        HttpOutputMode::Raw => Value::String(
            base64::engine::general_purpose::STANDARD.encode(&response.body),
        ),
        HttpOutputMode::Response => json!({
            "request": {
                "method": request.method,
                "uri": request.uri,
                "headers": string_map(&request.headers),
            },
            "statusCode": response.status,
            "headers": string_map(&response.headers),
            "content": parse_content(response),
        }),
    }
}

fn string_map(map: &BTreeMap<String, String>) -> Value {
    Value::Object(
        map.iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect::<Map<String, Value>>(),
    )
}

/// Render an evaluated header or query value as a string.
pub fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
