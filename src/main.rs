use clap::Parser;
use workflow_runner::{
    cli::{self, Args},
    core::workflow_graph::verify_handlers,
    logging::{self, LoggingConfig},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let logging_config = LoggingConfig::load(args.log_config_dir.as_deref())?;
    let guard = logging::init(&logging_config)?;

    verify_handlers()?;

    let code = cli::run(args).await?;
    if code != 0 {
        drop(guard);
        std::process::exit(code);
    }
    Ok(())
}
