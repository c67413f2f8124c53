mod config;
mod error;
mod report;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use capability::ScriptedProvider;
use clap::{Parser, Subcommand};
use runtime::{Engine, FnTask, NoCancelledDependencies, Operation, TaskError};
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Config;
use error::{Error, Result};
use report::Report;

const CONFIG_FILE: &str = "preflight.toml";

#[derive(Parser)]
#[command(name = "preflight")]
#[command(about = "Gate an operation on capability checks", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = CONFIG_FILE)]
    config: PathBuf,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Authorize capabilities as needed, then run the operation
    Run,
    /// Check capabilities without prompting; the operation does no work
    Check,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(&cli.config)?;
    info!(path = %cli.config.display(), capabilities = config.capabilities.len(), "config loaded");

    let check_only = matches!(cli.command, Some(Commands::Check));
    let providers: Vec<Arc<ScriptedProvider>> = config
        .capabilities
        .iter()
        .map(|capability| Arc::new(capability.provider()))
        .collect();

    let operation = build_operation(&config, &providers, check_only);
    let engine = Engine::new(config.engine.clone())?;
    let outcome = engine.run(operation).await;
    let report = Report::new(&outcome, &providers);

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.render());
    }

    if report.succeeded {
        Ok(())
    } else {
        Err(Error::NotCompleted {
            name: report.operation.name,
        })
    }
}

fn build_operation(
    config: &Config,
    providers: &[Arc<ScriptedProvider>],
    check_only: bool,
) -> Operation {
    let work_ms = if check_only {
        0
    } else {
        config.operation.work_ms
    };
    let name = config.operation.name.clone();
    let work = FnTask::new(name, move |_| async move {
        tokio::time::sleep(Duration::from_millis(work_ms)).await;
        Ok::<(), TaskError>(())
    });

    let mut operation = Operation::new(Arc::new(work));
    for (capability, provider) in config.capabilities.iter().zip(providers) {
        let condition = capability.condition(Arc::clone(provider), !check_only);
        operation = operation.with_condition(condition);
    }
    if config.operation.require_no_cancelled_dependencies {
        operation = operation.with_condition(Arc::new(NoCancelledDependencies));
    }
    if let Some(timeout_ms) = config.operation.timeout_ms {
        operation = operation.with_timeout(Duration::from_millis(timeout_ms));
    }
    operation
}
