//! Workflow DSL compiler and execution engine.

pub mod activity;
pub mod backend;
pub mod compiler;
pub mod converter;
pub mod definition;
pub mod executor;
pub mod expression;
pub mod fork;
pub mod http;
pub mod local_backend;
pub mod schedule;
pub mod schema;
pub mod search_attributes;
pub mod state;
pub mod status;
pub mod tasks;
pub mod validate;

pub use compiler::{compile, compile_definition, verify_handlers, CompileOptions, ExecutableGraph};
pub use converter::{convert, convert_to_yaml};
pub use definition::{DocumentSpec, TaskSpec, WorkflowSpec};
pub use executor::{execute_workflow, ExecutionOutcome, WorkflowExecutor};
pub use local_backend::LocalBackend;
pub use schema::{WorkflowDefinition, WorkflowDocument};
pub use state::ExecutionState;
pub use validate::{validate, validate_yaml, ValidationResult, ValidationState};
