use serde::{Deserialize, Serialize};

/// Lifecycle phase reported for a workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionPhase {
    #[default]
    Pending,
    InProgress,
    /// Restarted with fresh history; never terminal.
    ContinuedAsNew,
    Completed,
    Failed,
}

impl ExecutionPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, ExecutionPhase::Completed | ExecutionPhase::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionPhase::Pending => "PENDING",
            ExecutionPhase::InProgress => "IN_PROGRESS",
            ExecutionPhase::ContinuedAsNew => "CONTINUED_AS_NEW",
            ExecutionPhase::Completed => "COMPLETED",
            ExecutionPhase::Failed => "FAILED",
        }
    }
}

/// Error category enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    ConfigurationError,
    ValidationError,
    UnsupportedDsl,
    ExpressionError,
    ExternalCallError,
    TimeoutError,
    TaskError,
    CancelledError,
    SerializationError,
    IoError,
    InternalError,
}

impl ErrorCategory {
    /// Whether failures of this category are retried by default.
    pub fn default_retryable(self) -> bool {
        matches!(
            self,
            ErrorCategory::ExternalCallError | ErrorCategory::TimeoutError
        )
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Error severity enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Error,
    Warning,
    Info,
}
