//! Reflex CLI: feeds one finding event through the containment dispatcher.
//!
//! The event document is read from a file or stdin, every finding in it is
//! dispatched, and the fixed response document is printed to stdout.

use anyhow::Context;
use clap::Parser;
use reflex_core::config::LogFormat;
use reflex_core::{
    ConfigResolver, Dispatcher, DryRunGateway, FindingBatch, HandlerRegistry, ParameterCache,
    ReflexConfig, StaticParameterSource, WorkflowContext,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Reflex: automated containment for command-and-control findings
#[derive(Parser, Debug)]
#[command(name = "reflex", version, about, long_about = None)]
struct Cli {
    /// Event document to process (reads stdin if omitted)
    event: Option<PathBuf>,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let config = reflex_core::load_config(cli.config.as_deref(), None)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    let _guard = init_tracing(&config, log_filter(cli.verbose, cli.quiet))?;

    let raw = read_event(cli.event.as_deref()).await?;
    let batch = FindingBatch::parse(&raw)?;
    tracing::info!(findings = batch.len(), "Received finding event");

    let dispatcher = build_dispatcher(&config);
    let response = dispatcher.dispatch(&batch).await;

    println!("{}", serde_json::to_string(&response)?);
    Ok(())
}

fn log_filter(verbose: u8, quiet: bool) -> &'static str {
    match verbose {
        0 if quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Stderr logging in the configured format, plus an optional daily-rotated
/// JSON file. The returned guard must live until the process exits.
fn init_tracing(config: &ReflexConfig, filter: &str) -> anyhow::Result<Option<WorkerGuard>> {
    let env_filter =
        || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let stderr_layer: Box<dyn Layer<Registry> + Send + Sync> = match config.logging.format {
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed(),
    };

    let (file_layer, guard) = match &config.logging.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("cannot create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "reflex.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_filter(EnvFilter::new("debug"));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr_layer.with_filter(env_filter()))
        .with(file_layer)
        .init();

    Ok(guard)
}

async fn read_event(path: Option<&Path>) -> anyhow::Result<String> {
    match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("cannot read event file {}", path.display())),
        None => {
            let mut raw = String::new();
            tokio::io::stdin()
                .read_to_string(&mut raw)
                .await
                .context("cannot read event from stdin")?;
            Ok(raw)
        }
    }
}

/// Wire the dry-run gateway and the config-backed parameter source into a
/// dispatcher with the built-in workflows.
fn build_dispatcher(config: &ReflexConfig) -> Dispatcher {
    let source = Arc::new(StaticParameterSource::new(config.parameters.clone()));
    let resolver = ConfigResolver::new(source, Arc::new(ParameterCache::new()));
    let context = WorkflowContext::new(
        Arc::new(DryRunGateway::new()),
        resolver,
        config.containment.clone(),
    );
    Dispatcher::new(HandlerRegistry::with_defaults(), context)
}
