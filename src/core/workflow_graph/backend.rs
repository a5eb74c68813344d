//! Seam between the graph walker and the durable-execution substrate.
//!
//! Everything non-deterministic goes through [`ExecutionBackend`]: external
//! calls, timers, child workflows, events and search metadata.

#![allow(clippy::result_large_err)] // Backend calls return AppError so retry classification survives the trait boundary.

use crate::core::error::AppError;
use crate::core::workflow_graph::search_attributes::SearchAttributeUpdate;
use crate::core::workflow_graph::tasks::{GrpcService, ListenMode};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: String,
    pub uri: String,
    pub headers: BTreeMap<String, String>,
    pub query: BTreeMap<String, String>,
    pub body: Option<Value>,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GrpcRequest {
    pub service: GrpcService,
    pub method: String,
    pub request: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListenRequest {
    pub mode: ListenMode,
    /// Event filters, passed through untouched.
    pub events: Vec<Value>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChildWorkflowRequest {
    pub workflow: String,
    pub input: Value,
    pub await_completion: bool,
}

#[async_trait]
pub trait ExecutionBackend: Send + Sync {
    /// One attempt of an HTTP call. Any status is a successful attempt here;
    /// classification happens in the caller.
    async fn call_http(
        &self,
        request: &HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse, AppError>;

    async fn call_grpc(
        &self,
        request: &GrpcRequest,
        cancel: &CancellationToken,
    ) -> Result<Value, AppError>;

    async fn sleep(&self, duration: Duration, cancel: &CancellationToken) -> Result<(), AppError>;

    async fn listen(
        &self,
        request: &ListenRequest,
        cancel: &CancellationToken,
    ) -> Result<Value, AppError>;

    /// Start a child workflow. Detached children resolve to `Value::Null`.
    async fn run_workflow(
        &self,
        request: &ChildWorkflowRequest,
        cancel: &CancellationToken,
    ) -> Result<Value, AppError>;

    async fn upsert_search_attributes(
        &self,
        updates: &[SearchAttributeUpdate],
    ) -> Result<(), AppError>;
}

/// Performs gRPC calls for the local backend.
#[async_trait]
pub trait GrpcInvoker: Send + Sync {
    async fn invoke(&self, request: &GrpcRequest) -> Result<Value, AppError>;
}
