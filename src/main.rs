//! GPT Buddy - wake word voice assistant
//!
//! Listens for the wake word, routes what it hears to a local command or the
//! conversational backend, and answers with speech and a generated image.

use anyhow::{Context, Result};
use clap::Parser;
use gptbuddy::adapter;
use gptbuddy::config::{self, Config};
use gptbuddy::controller::{Services, SessionController};
use gptbuddy::daemon;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Config file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Event source: "console" or "speechd"
    #[arg(short, long)]
    adapter: Option<String>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let config_path = args.config.clone().unwrap_or_else(config::config_path);
    let mut config = Config::load_from(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    if let Some(adapter) = args.adapter {
        config.adapter = adapter;
    }

    // Setup logging
    let level = if args.verbose { "debug" } else { config.log_level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🤖 GPT Buddy v{} starting...", env!("CARGO_PKG_VERSION"));
    info!("📄 Config: {:?}", config_path);

    config.validate()?;
    let services = Services::from_config(&config)?;
    daemon::startup_checks(&config, &services).await?;

    let mut controller = SessionController::new(&config, services)?;
    controller.show_startup_image().await;
    let mut adapter = adapter::create_adapter(&config).await?;
    let shutdown = daemon::shutdown_signal()?;

    let result = daemon::run(&mut controller, adapter.as_mut(), shutdown).await;
    drop(adapter);

    let report = controller.shutdown().await;
    if let Err(e) = result {
        error!("❌ Stopped on fatal error: {}", e);
        return Ok(ExitCode::FAILURE);
    }

    info!("👋 Goodbye");
    Ok(ExitCode::from(report.exit_code()))
}
