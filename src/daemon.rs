//! Main loop
//!
//! Feeds adapter events into the controller, enforces the utterance
//! deadline and stops when the shutdown token fires.

use crate::adapter::{AdapterEvent, WakeAdapter};
use crate::config::Config;
use crate::controller::{DispatchOutcome, Services, SessionController};
use crate::error::{BuddyError, BuddyResult};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

enum Tick {
    Shutdown,
    Deadline,
    Event(Option<AdapterEvent>),
}

async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Run until the adapter is exhausted, a fatal error occurs, or `shutdown` fires
pub async fn run(
    controller: &mut SessionController,
    adapter: &mut dyn WakeAdapter,
    shutdown: CancellationToken,
) -> BuddyResult<()> {
    info!("🚀 Waiting for wake word ({})...", adapter.name());

    loop {
        let deadline = controller.listen_deadline();
        let tick = tokio::select! {
            biased;
            _ = shutdown.cancelled() => Tick::Shutdown,
            _ = until(deadline) => Tick::Deadline,
            event = adapter.next_event() => Tick::Event(event?),
        };

        match tick {
            Tick::Shutdown => {
                info!("🛑 Shutdown requested");
                break;
            }
            Tick::Deadline => {
                adapter.stop_capture().await?;
                if let Err(e) = controller.handle_timeout() {
                    debug!("Deadline ignored: {}", e);
                }
            }
            Tick::Event(None) => {
                info!("📭 {} has no more input", adapter.name());
                break;
            }
            Tick::Event(Some(AdapterEvent::WakeDetected)) => match controller.handle_wake().await {
                Ok(_) => adapter.start_capture().await?,
                Err(BuddyError::ShuttingDown) => break,
                Err(e) => debug!("Wake ignored: {}", e),
            },
            Tick::Event(Some(AdapterEvent::RecognitionFailed)) => {
                adapter.stop_capture().await?;
                if let Err(e) = controller.handle_recognition_failed() {
                    debug!("Recognition failure ignored: {}", e);
                }
            }
            Tick::Event(Some(AdapterEvent::PhraseRecognized(utterance))) => {
                adapter.stop_capture().await?;
                match controller.handle_utterance(&utterance.text).await {
                    Ok(outcome) => log_outcome(&outcome),
                    Err(e) => debug!("Utterance ignored: {}", e),
                }
            }
        }
    }
    Ok(())
}

fn log_outcome(outcome: &DispatchOutcome) {
    match outcome {
        DispatchOutcome::Failed(e) => warn!("⚠️ Exchange failed: {}", e),
        DispatchOutcome::ConversationQueued { speech, image, .. } => {
            info!("📬 Reply queued (speech: {:?}, image: {})", speech, image)
        }
        other => info!("📬 {:?}", other),
    }
}

/// Token cancelled on SIGINT or SIGTERM
pub fn shutdown_signal() -> BuddyResult<CancellationToken> {
    let token = CancellationToken::new();
    let trigger = token.clone();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("📡 Received SIGINT"),
                _ = sigterm.recv() => info!("📡 Received SIGTERM"),
            }
            trigger.cancel();
        });
    }

    #[cfg(not(unix))]
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("📡 Received Ctrl-C");
        }
        trigger.cancel();
    });

    Ok(token)
}

/// Create working directories and check remote services. Only directory
/// creation can fail; unreachable services are logged.
pub async fn startup_checks(config: &Config, services: &Services) -> BuddyResult<()> {
    for dir in config.required_dirs() {
        if !dir.exists() {
            info!("📁 Creating {:?}", dir);
            std::fs::create_dir_all(dir).map_err(|e| {
                error!("❌ Cannot create {:?}: {}", dir, e);
                BuddyError::Config(format!("cannot create {}: {}", dir.display(), e))
            })?;
        }
    }

    let (backend_ok, providers) = futures::join!(
        services.backend.health_check(),
        services.studio.health_check()
    );
    if backend_ok {
        info!("✅ {} reachable", services.backend.name());
    } else {
        warn!("⚠️ {} is not reachable", services.backend.name());
    }
    for (name, ok) in providers {
        if ok {
            info!("✅ {} reachable", name);
        } else {
            warn!("⚠️ {} is not reachable", name);
        }
    }
    Ok(())
}
