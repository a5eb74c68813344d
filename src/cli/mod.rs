pub mod args;
pub mod commands;

pub use args::{ConvertArgs, ReportFormat, RunArgs, ValidateArgs};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{name} {version}\n\
{about-with-newline}\n\
USAGE:\n    {usage}\n\
\nOPTIONS:\n{options}\n\
WORKFLOW COMMANDS:\n{subcommands}\n";

#[derive(Parser, Debug)]
#[command(name = "workflow-runner")]
#[command(version = crate::VERSION)]
#[command(about = "Compile and run declarative workflow documents")]
#[command(help_template = HELP_TEMPLATE)]
#[command(
    after_long_help = "Typical flow: validate a specification, convert it to DSL, then run the DSL locally."
)]
pub struct Args {
    /// Runner configuration file (TOML)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory holding logging.toml
    #[arg(long, global = true, value_name = "DIR")]
    pub log_config_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(
        about = "Pre-flight check a workflow specification",
        long_about = "Validate converts, parses, and compiles the specification without a backend and reports VALID, INVALID, or FAILED.",
        after_help = "Example:\n    workflow-runner validate ./order.yaml --format json"
    )]
    Validate(ValidateArgs),
    #[command(
        about = "Convert a specification into canonical DSL",
        long_about = "Convert renders the typed specification as the canonical DSL YAML document.",
        after_help = "Example:\n    workflow-runner convert ./order.yaml --output order.dsl.yaml"
    )]
    Convert(ConvertArgs),
    #[command(
        about = "Execute a DSL document on the local backend",
        long_about = "Run compiles the DSL document against the in-process backend, executes it, and prints the final output as JSON.",
        after_help = "Example:\n    workflow-runner run ./order.dsl.yaml --input '{\"id\": 7}' --env REGION=eu"
    )]
    Run(RunArgs),
}

/// Dispatch a parsed command. Returns the process exit code.
pub async fn run(args: Args) -> crate::Result<i32> {
    match args.command {
        Command::Validate(validate_args) => commands::validate(validate_args),
        Command::Convert(convert_args) => commands::convert(convert_args),
        Command::Run(run_args) => commands::run(run_args, args.config.as_deref()).await,
    }
}
