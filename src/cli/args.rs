use clap::{Args, ValueEnum};
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    #[default]
    Text,
    Json,
}

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Workflow specification to check (YAML or JSON)
    #[arg(value_name = "SPEC")]
    pub spec: PathBuf,

    /// Treat the input as an already-converted DSL document
    #[arg(long)]
    pub dsl: bool,

    /// Report format
    #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

#[derive(Args, Debug)]
pub struct ConvertArgs {
    /// Workflow specification to convert (YAML or JSON)
    #[arg(value_name = "SPEC")]
    pub spec: PathBuf,

    /// Write the DSL here instead of stdout
    #[arg(long, short, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// DSL document to execute
    #[arg(value_name = "WORKFLOW")]
    pub workflow: PathBuf,

    /// Workflow input as a JSON value
    #[arg(long, value_name = "JSON", default_value = "{}")]
    pub input: String,

    /// Extra `$env` entries (repeatable)
    #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    pub env: Vec<(String, String)>,

    /// DSL documents made available to `run` tasks (repeatable)
    #[arg(long = "child", value_name = "WORKFLOW")]
    pub children: Vec<PathBuf>,
}

/// Split `KEY=VALUE`; the value may itself contain `=`.
pub fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}
