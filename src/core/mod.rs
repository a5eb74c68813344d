pub mod config;
pub mod error;
pub mod types;
pub mod workflow_graph;

pub use config::{ConfigLoader, ConfigValidator, RunnerConfig};
pub use error::AppError;
pub use types::*;
