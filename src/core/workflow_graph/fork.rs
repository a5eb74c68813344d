//! Fan-out/fan-in coordination for fork tasks.
//!
//! Branches run as detached tokio tasks and report back over an `mpsc`
//! channel. Only the coordinator holds the [`CancellableBranchSet`], so
//! cancellation is always sent from one place and at most once per branch.

#![allow(clippy::result_large_err)] // Join results carry AppError so branch failures keep their codes.

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::future::Future;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinPolicy {
    /// Every branch finishes; any failure fails the fork afterwards.
    WaitForAll,
    /// First success wins; the rest are cancelled.
    Race,
}

impl JoinPolicy {
    pub fn from_compete(compete: bool) -> Self {
        if compete {
            JoinPolicy::Race
        } else {
            JoinPolicy::WaitForAll
        }
    }
}

/// One in-flight branch.
#[derive(Debug, Clone)]
pub struct BranchHandle {
    pub name: String,
    pub execution_id: Uuid,
    cancel: CancellationToken,
}

impl BranchHandle {
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Named handles for the branches still running.
#[derive(Debug, Default)]
pub struct CancellableBranchSet {
    handles: IndexMap<String, BranchHandle>,
}

impl CancellableBranchSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a branch whose token is a child of `parent`.
    pub fn insert(&mut self, name: &str, parent: &CancellationToken) -> BranchHandle {
        let handle = BranchHandle {
            name: name.to_string(),
            execution_id: Uuid::new_v4(),
            cancel: parent.child_token(),
        };
        self.handles.insert(name.to_string(), handle.clone());
        handle
    }

    /// Drop a branch that has finished on its own.
    pub fn remove(&mut self, name: &str) -> Option<BranchHandle> {
        self.handles.shift_remove(name)
    }

    /// Cancel and drop every branch except `keep`. Returns the names cancelled.
    pub fn cancel_others(&mut self, keep: &str) -> Vec<String> {
        let names: Vec<String> = self
            .handles
            .keys()
            .filter(|name| name.as_str() != keep)
            .cloned()
            .collect();
        for name in &names {
            if let Some(handle) = self.handles.shift_remove(name) {
                handle.cancel.cancel();
            }
        }
        names
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handles.keys().map(String::as_str)
    }
}

#[derive(Debug)]
pub struct ForkOutcome {
    /// `{branch: output}` when waiting for all, the winner's output in a race.
    pub output: Value,
    pub winner: Option<String>,
    /// Branches that received a cancellation from the coordinator.
    pub cancelled: Vec<String>,
}

struct BranchReport {
    index: usize,
    name: String,
    result: Result<Value, AppError>,
}

/// Spawn one task per branch and join them under `policy`.
///
/// `start` builds the future for a branch from its handle. The future owns
/// everything it touches; branch state never flows back except through the
/// returned value.
pub async fn join_branches<F, Fut>(
    policy: JoinPolicy,
    parent: &CancellationToken,
    branch_names: &[String],
    mut start: F,
) -> Result<ForkOutcome, AppError>
where
    F: FnMut(usize, &BranchHandle) -> Fut,
    Fut: Future<Output = Result<Value, AppError>> + Send + 'static,
{
    if branch_names.is_empty() {
        return Err(AppError::new(ErrorCategory::ValidationError, "fork has no branches")
            .with_code("WFG-FORK-003"));
    }

    let (tx, mut rx) = mpsc::channel::<BranchReport>(branch_names.len());
    let mut set = CancellableBranchSet::new();

    for (index, name) in branch_names.iter().enumerate() {
        let handle = set.insert(name, parent);
        tracing::debug!(branch = %name, execution_id = %handle.execution_id, "starting fork branch");
        let future = start(index, &handle);
        let tx = tx.clone();
        let name = name.clone();
        tokio::spawn(async move {
            let result = future.await;
            // The receiver is gone once a race has been decided.
            let _ = tx.send(BranchReport { index, name, result }).await;
        });
    }
    drop(tx);

    match policy {
        JoinPolicy::WaitForAll => wait_for_all(&mut rx, &mut set, branch_names.len()).await,
        JoinPolicy::Race => race(&mut rx, &mut set).await,
    }
}

async fn wait_for_all(
    rx: &mut mpsc::Receiver<BranchReport>,
    set: &mut CancellableBranchSet,
    total: usize,
) -> Result<ForkOutcome, AppError> {
    let mut results: Vec<Option<(String, Result<Value, AppError>)>> =
        (0..total).map(|_| None).collect();
    while let Some(report) = rx.recv().await {
        set.remove(&report.name);
        if let Some(slot) = results.get_mut(report.index) {
            *slot = Some((report.name, report.result));
        }
    }

    let mut output = Map::new();
    let mut failures = Vec::new();
    for (name, result) in results.into_iter().flatten() {
        match result {
            Ok(value) => {
                output.insert(name, value);
            }
            Err(err) => failures.push(format!("{}: {}", name, err.message)),
        }
    }

    if !failures.is_empty() {
        return Err(AppError::new(
            ErrorCategory::TaskError,
            format!(
                "{} of {} fork branches failed: {}",
                failures.len(),
                total,
                failures.join("; ")
            ),
        )
        .with_code("WFG-FORK-001"));
    }
    Ok(ForkOutcome {
        output: Value::Object(output),
        winner: None,
        cancelled: Vec::new(),
    })
}

async fn race(
    rx: &mut mpsc::Receiver<BranchReport>,
    set: &mut CancellableBranchSet,
) -> Result<ForkOutcome, AppError> {
    let mut failures = Vec::new();
    while let Some(report) = rx.recv().await {
        set.remove(&report.name);
        match report.result {
            Ok(value) => {
                let cancelled = set.cancel_others(&report.name);
                tracing::debug!(
                    winner = %report.name,
                    cancelled = cancelled.len(),
                    "fork race decided"
                );
                return Ok(ForkOutcome {
                    output: value,
                    winner: Some(report.name),
                    cancelled,
                });
            }
            Err(err) => {
                tracing::debug!(branch = %report.name, error = %err, "fork branch lost by failing");
                failures.push(format!("{}: {}", report.name, err.message));
            }
        }
    }
    Err(AppError::new(
        ErrorCategory::TaskError,
        format!("every competing branch failed: {}", failures.join("; ")),
    )
    .with_code("WFG-FORK-002"))
}
