//! Scheduled follow-up
//!
//! Meant for cron: continues the persisted conversation with a fixed prompt
//! and shows the resulting image without speaking.

use anyhow::{Context, Result};
use clap::Parser;
use gptbuddy::config::{self, Config};
use gptbuddy::controller::{DispatchOutcome, Services, SessionController, SpeechMode};
use gptbuddy::session::SessionStore;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Send the scheduled prompt to the current conversation")]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Config file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Prompt to send instead of the configured one
    #[arg(short, long)]
    prompt: Option<String>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let config_path = args.config.clone().unwrap_or_else(config::config_path);
    let config = Config::load_from(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;

    let level = if args.verbose { "debug" } else { config.log_level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    config.validate()?;
    if SessionStore::new(&config.state_file).load()?.is_none() {
        error!("❌ No saved session at {:?}; talk to GPT Buddy first", config.state_file);
        return Ok(ExitCode::FAILURE);
    }

    let services = Services::from_config(&config)?;
    let mut controller = SessionController::new(&config, services)?;

    let prompt = args.prompt.unwrap_or_else(|| config.scheduled_image_prompt.clone());
    info!("⏰ Scheduled prompt: '{}'", prompt);

    match controller.converse(&prompt, SpeechMode::Disabled).await {
        Ok(DispatchOutcome::ConversationQueued { image, .. }) => {
            info!("🎨 Waiting for image task {}", image)
        }
        Ok(other) => warn!("⚠️ Unexpected outcome: {:?}", other),
        Err(e) => {
            error!("❌ Scheduled exchange failed: {}", e);
            controller.shutdown().await;
            return Ok(ExitCode::FAILURE);
        }
    }

    let report = controller.wait_for_tasks(config.network_timeout() * 2).await;
    let finished = report.is_clean();
    let shutdown = controller.shutdown().await;
    if !finished || shutdown.exit_code() != 0 {
        warn!("⚠️ Image task did not finish in time");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
