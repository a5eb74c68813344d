use crate::{
    cli::args::{ConvertArgs, ReportFormat, RunArgs, ValidateArgs},
    core::{
        workflow_graph::{
            compile_definition, convert_to_yaml, status::TracingStatusSink,
            validate as validate_spec, validate_yaml, CompileOptions, LocalBackend,
            ValidationResult, WorkflowDefinition, WorkflowExecutor, WorkflowSpec,
        },
        ConfigLoader, ConfigValidator,
    },
    Result,
};
use anyhow::{anyhow, Context};
use serde_json::{Map, Value};
use std::{fs, path::Path, sync::Arc};
use tokio_util::sync::CancellationToken;

/// Read a typed specification; `.json` files are parsed as JSON, everything else as YAML.
pub fn load_spec(path: &Path) -> Result<WorkflowSpec> {
    let content = read_spec(path)?;
    parse_spec(path, &content)
}

fn read_spec(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .with_context(|| format!("failed to read specification {}", path.display()))
}

fn parse_spec(path: &Path, content: &str) -> Result<WorkflowSpec> {
    let is_json = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let spec = if is_json {
        serde_json::from_str(content)
            .with_context(|| format!("invalid JSON specification {}", path.display()))?
    } else {
        serde_yaml::from_str(content)
            .with_context(|| format!("invalid YAML specification {}", path.display()))?
    };
    Ok(spec)
}

pub fn validate(args: ValidateArgs) -> Result<i32> {
    let result = if args.dsl {
        let text = fs::read_to_string(&args.spec)
            .with_context(|| format!("failed to read workflow {}", args.spec.display()))?;
        validate_yaml(&text)
    } else {
        match read_spec(&args.spec) {
            Err(err) => {
                tracing::warn!(path = %args.spec.display(), error = %err, "specification unreadable");
                ValidationResult::failed(format!("{:#}", err))
            }
            Ok(content) => match parse_spec(&args.spec, &content) {
                Ok(spec) => validate_spec(Some(&spec)),
                Err(err) => ValidationResult::invalid(format!("{:#}", err)),
            },
        }
    };
    print_report(&result, args.format)?;
    Ok(if result.is_valid() { 0 } else { 1 })
}

fn print_report(result: &ValidationResult, format: ReportFormat) -> Result<()> {
    match format {
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(result)?),
        ReportFormat::Text => {
            println!("state: {}", result.state.as_str());
            for error in &result.errors {
                println!("error: {}", error);
            }
            for warning in &result.warnings {
                println!("warning: {}", warning);
            }
        }
    }
    Ok(())
}

pub fn convert(args: ConvertArgs) -> Result<i32> {
    let spec = load_spec(&args.spec)?;
    let yaml = convert_to_yaml(Some(&spec))?;
    match args.output {
        Some(path) => {
            fs::write(&path, &yaml)
                .with_context(|| format!("failed to write {}", path.display()))?;
            tracing::info!(output = %path.display(), "wrote workflow DSL");
        }
        None => print!("{}", yaml),
    }
    Ok(0)
}

pub async fn run(args: RunArgs, config_path: Option<&Path>) -> Result<i32> {
    let config = ConfigLoader::load(config_path)?;
    ConfigValidator::validate(&config)?;

    let input: Value = serde_json::from_str(&args.input)
        .map_err(|err| anyhow!("--input is not valid JSON: {}", err))?;
    let definition = WorkflowDefinition::load_from_file(&args.workflow)?;
    definition.validate()?;

    let backend = LocalBackend::new(&config)?;
    for child in &args.children {
        let child = WorkflowDefinition::load_from_file(child)?;
        child.validate()?;
        backend.register_workflow(child);
    }

    let env: Map<String, Value> = args
        .env
        .into_iter()
        .map(|(key, value)| (key, Value::String(value)))
        .collect();
    let options = CompileOptions::from_config(&config)?
        .with_env(env)
        .with_backend(backend);
    let graph = compile_definition(&definition, options)?;
    let executor =
        WorkflowExecutor::new(Arc::new(graph))?.with_status_sink(Arc::new(TracingStatusSink));

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling workflow");
            on_interrupt.cancel();
        }
    });

    let outcome = executor.execute_with_cancel(input, cancel).await?;
    tracing::info!(
        execution_id = %outcome.execution_id,
        continuations = outcome.continuations,
        history = outcome.history_length,
        "workflow finished"
    );
    println!("{}", serde_json::to_string_pretty(&outcome.output)?);
    Ok(0)
}
