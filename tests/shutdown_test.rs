use gptbuddy::controller::{DispatchOutcome, SessionState};
use gptbuddy::error::BuddyError;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

mod common;
use common::mock_services::{MockImageProvider, PresenterCall};
use common::TestContext;

#[tokio::test]
async fn test_shutdown_reports_abandoned_task() {
    let mut ctx = TestContext::new();
    ctx.hosted = Arc::new(MockImageProvider::stalling_on("mock-hosted", "stuck"));
    let mut controller = ctx.controller();

    assert_ok!(controller.handle_wake().await);
    let quick = match assert_ok!(controller.handle_utterance("make picture about a quick fox").await) {
        DispatchOutcome::ImageQueued(id) => id,
        other => panic!("unexpected {:?}", other),
    };
    assert_ok!(controller.handle_wake().await);
    let stuck = match assert_ok!(controller.handle_utterance("make picture about a stuck fox").await) {
        DispatchOutcome::ImageQueued(id) => id,
        other => panic!("unexpected {:?}", other),
    };

    // Let the quick task write its file
    tokio::time::sleep(Duration::from_millis(300)).await;

    let started = std::time::Instant::now();
    let report = controller.shutdown().await;
    let grace = ctx.config.shutdown_grace();

    assert_eq!(report.completed, vec![quick]);
    assert_eq!(report.abandoned, vec![stuck]);
    assert_ne!(report.exit_code(), 0);
    assert!(started.elapsed() < grace + Duration::from_secs(1));

    // The finished image is absorbed; the stuck one left nothing behind
    let files = ctx.saved_images();
    assert_eq!(files.len(), 1);
    assert_eq!(
        controller
            .session()
            .and_then(|s| s.last_generated_image_path.clone()),
        Some(files[0].clone())
    );
    assert_eq!(
        ctx.presenter.get_calls().last(),
        Some(&PresenterCall::Cleared)
    );
}

#[tokio::test]
async fn test_clean_shutdown_exits_zero() {
    let ctx = TestContext::new();
    let mut controller = ctx.controller();

    assert_ok!(controller.handle_wake().await);
    assert_ok!(controller.handle_utterance("nevermind").await);

    let report = controller.shutdown().await;
    assert!(report.abandoned.is_empty());
    assert_eq!(report.exit_code(), 0);
}

#[tokio::test]
async fn test_no_wake_after_shutdown() {
    let ctx = TestContext::new();
    let mut controller = ctx.controller();

    controller.shutdown().await;
    assert!(!controller.is_accepting());
    let err = assert_err!(controller.handle_wake().await);
    assert!(matches!(err, BuddyError::ShuttingDown));
    assert_eq!(controller.state(), SessionState::Idle);
}

#[tokio::test]
async fn test_shutdown_persists_session() {
    let ctx = TestContext::new();
    let mut controller = ctx.controller();

    assert_ok!(controller.handle_wake().await);
    assert_ok!(controller.handle_utterance("make picture about a sunrise").await);
    controller.shutdown().await;

    let stored = gptbuddy::session::SessionStore::new(&ctx.config.state_file)
        .load()
        .expect("load")
        .expect("session");
    assert_eq!(stored.last_prompt.as_deref(), Some("a sunrise"));
}
