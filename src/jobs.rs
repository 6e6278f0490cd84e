//! Bodies of the background tasks
//!
//! Each job checks for cancellation between stages. An image job that is
//! cancelled before its file is written leaves nothing behind. One cancelled
//! after the write keeps the file in the gallery but still ends as
//! cancelled, so it never becomes the session's last image.

use crate::error::{BuddyError, BuddyResult};
use crate::gallery::Gallery;
use crate::imaging::{ImageRequest, ImageStudio, ProviderKind};
use crate::notify::Notifier;
use crate::presenter::Presenter;
use crate::tasks::{TaskContext, TaskOutput};
use crate::tts::SpeechSynthesizer;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Generate, store, and show one image
pub struct ImageJob {
    pub studio: ImageStudio,
    pub gallery: Gallery,
    pub presenter: Arc<dyn Presenter>,
    pub provider: ProviderKind,
    pub request: ImageRequest,
    /// Display waits for this (speech playback in the same exchange)
    pub after: Option<oneshot::Receiver<()>>,
    /// Highest task id displayed so far, shared by all image jobs
    pub newest_shown: Arc<AtomicU64>,
}

pub async fn run_image(ctx: TaskContext, job: ImageJob) -> BuddyResult<TaskOutput> {
    ctx.checkpoint("before image request")?;
    let raw = job
        .studio
        .fetch(job.provider, &job.request)
        .await
        .map_err(|e| BuddyError::TaskFailure(format!("image generation failed: {:#}", e)))?;

    ctx.checkpoint("after image request")?;
    let image = job
        .studio
        .normalize(raw)
        .await
        .map_err(|e| BuddyError::TaskFailure(format!("{:#}", e)))?;

    ctx.checkpoint("before write")?;
    let saved = job.gallery.store(&image.png, ctx.id().0).await?;

    if let Some(after) = job.after {
        debug!("Task {} waiting for speech to finish", ctx.id());
        tokio::select! {
            // A dropped sender means speech failed; show the image anyway
            _ = after => {}
            _ = ctx.cancelled() => {}
        }
    }

    if ctx.is_cancelled() {
        info!("🛑 Task {} cancelled after saving {:?}, not displaying", ctx.id(), saved.path);
        return Err(BuddyError::Cancelled);
    }

    let seq = ctx.id().0;
    let shown = if job.newest_shown.fetch_max(seq, Ordering::SeqCst) > seq {
        info!("⏭️ Task {} finished after a newer image, not displaying", ctx.id());
        false
    } else {
        match job.presenter.display_image(&saved.path).await {
            Ok(()) => true,
            Err(e) => {
                warn!("⚠️ Could not display {:?}: {}", saved.path, e);
                false
            }
        }
    };

    Ok(TaskOutput::Image {
        path: saved.path,
        prompt: job.request.prompt,
        shown,
    })
}

/// Synthesize and play a reply
pub struct SpeechJob {
    pub speech: Arc<dyn SpeechSynthesizer>,
    pub presenter: Arc<dyn Presenter>,
    pub cache_dir: PathBuf,
    pub text: String,
    /// Fired once playback ends
    pub done: Option<oneshot::Sender<()>>,
}

pub async fn run_speech(ctx: TaskContext, job: SpeechJob) -> BuddyResult<TaskOutput> {
    ctx.checkpoint("before synthesis")?;
    let audio = job
        .speech
        .synthesize(&job.text)
        .await
        .map_err(|e| BuddyError::TaskFailure(format!("speech synthesis failed: {:#}", e)))?;

    ctx.checkpoint("after synthesis")?;
    tokio::fs::create_dir_all(&job.cache_dir).await?;
    let file = job.cache_dir.join(format!(
        "reply-{}-{}.{}",
        ctx.id().0,
        uuid::Uuid::new_v4(),
        job.speech.extension()
    ));
    tokio::fs::write(&file, &audio).await?;

    let played = job.presenter.play_audio(&file).await;
    if let Err(e) = tokio::fs::remove_file(&file).await {
        debug!("Could not remove {:?}: {}", file, e);
    }
    played?;

    if let Some(done) = job.done {
        let _ = done.send(());
    }
    Ok(TaskOutput::Spoken)
}

/// Forward an image through the notifier
pub struct NotifyJob {
    pub notifier: Arc<dyn Notifier>,
    pub attachment: PathBuf,
    pub title: String,
    pub body: String,
}

pub async fn run_notify(ctx: TaskContext, job: NotifyJob) -> BuddyResult<TaskOutput> {
    ctx.checkpoint("before send")?;
    job.notifier
        .send(&job.title, &job.body, &job.attachment)
        .await
        .map_err(|e| BuddyError::TaskFailure(format!("{} failed: {:#}", job.notifier.name(), e)))?;
    Ok(TaskOutput::Notified)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::ImageProvider;
    use crate::tasks::{TaskKind, TaskRunner, TaskStatus};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::path::Path;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::Instant;

    #[derive(Debug)]
    enum Reply {
        Png,
        Garbage,
        Error,
    }

    #[derive(Debug)]
    struct Provider(Reply);

    #[async_trait]
    impl ImageProvider for Provider {
        async fn generate(&self, _request: &ImageRequest) -> Result<Vec<u8>> {
            match self.0 {
                Reply::Png => {
                    let img = image::DynamicImage::ImageRgb8(image::RgbImage::new(4, 3));
                    let mut out = Vec::new();
                    img.write_to(&mut out, image::ImageOutputFormat::Png)?;
                    Ok(out)
                }
                Reply::Garbage => Ok(b"<html>502 Bad Gateway</html>".to_vec()),
                Reply::Error => Err(anyhow::anyhow!("connection refused")),
            }
        }

        fn name(&self) -> &str {
            "test-provider"
        }
    }

    #[derive(Debug, Default)]
    struct Screen {
        shown: Mutex<Vec<PathBuf>>,
        played: Mutex<Vec<PathBuf>>,
    }

    #[async_trait]
    impl Presenter for Screen {
        async fn play_audio(&self, path: &Path) -> BuddyResult<()> {
            self.played.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }

        async fn display_image(&self, path: &Path) -> BuddyResult<()> {
            self.shown.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }
    }

    #[derive(Debug)]
    struct BrokenSpeech;

    #[async_trait]
    impl SpeechSynthesizer for BrokenSpeech {
        async fn synthesize(&self, _text: &str) -> Result<Vec<u8>> {
            Err(anyhow::anyhow!("quota exceeded"))
        }

        fn name(&self) -> &str {
            "broken"
        }
    }

    fn image_job(
        dir: &Path,
        reply: Reply,
        screen: &Arc<Screen>,
        after: Option<oneshot::Receiver<()>>,
        newest_shown: &Arc<AtomicU64>,
    ) -> ImageJob {
        ImageJob {
            studio: ImageStudio::new(Arc::new(Provider(reply)), None, 8, 6),
            gallery: Gallery::new(dir),
            presenter: screen.clone(),
            provider: ProviderKind::Hosted,
            request: ImageRequest::new("a red fox"),
            after,
            newest_shown: newest_shown.clone(),
        }
    }

    fn dir_entries(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .expect("read_dir")
            .map(|e| e.expect("entry").file_name().to_string_lossy().to_string())
            .collect()
    }

    async fn join(runner: &mut TaskRunner) -> Vec<TaskStatus> {
        let report = runner.join_all(Instant::now() + Duration::from_secs(5)).await;
        assert!(report.is_clean());
        report.completed.into_iter().map(|t| t.status).collect()
    }

    #[tokio::test]
    async fn test_failed_generation_leaves_no_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let screen = Arc::new(Screen::default());
        let newest = Arc::new(AtomicU64::new(0));
        let mut runner = TaskRunner::new();

        for reply in [Reply::Error, Reply::Garbage] {
            let job = image_job(dir.path(), reply, &screen, None, &newest);
            runner.submit(TaskKind::ImageGeneration, move |ctx| run_image(ctx, job));
        }

        let statuses = join(&mut runner).await;
        assert_eq!(statuses.len(), 2);
        assert!(statuses.iter().all(|s| matches!(s, TaskStatus::Failed(_))));
        // Not even a hidden .part file
        assert!(dir_entries(dir.path()).is_empty());
        assert!(screen.shown.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_while_waiting_for_speech_is_not_a_result() {
        let dir = tempfile::tempdir().expect("tempdir");
        let screen = Arc::new(Screen::default());
        let newest = Arc::new(AtomicU64::new(0));
        let (done, gate) = oneshot::channel();
        let mut runner = TaskRunner::new();

        let job = image_job(dir.path(), Reply::Png, &screen, Some(gate), &newest);
        runner.submit(TaskKind::ImageGeneration, move |ctx| run_image(ctx, job));

        // Let the image reach the gate
        for _ in 0..100 {
            if !dir_entries(dir.path()).iter().all(|n| n.starts_with('.')) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        runner.cancel_all();

        let statuses = join(&mut runner).await;
        assert_eq!(statuses, vec![TaskStatus::Cancelled]);
        assert!(screen.shown.lock().unwrap().is_empty());
        assert_eq!(dir_entries(dir.path()).len(), 1);
        drop(done);
    }

    #[tokio::test]
    async fn test_older_image_does_not_replace_newer_on_screen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let screen = Arc::new(Screen::default());
        let newest = Arc::new(AtomicU64::new(0));
        let (older_done, older_gate) = oneshot::channel();
        let mut runner = TaskRunner::new();

        let older = image_job(dir.path(), Reply::Png, &screen, Some(older_gate), &newest);
        runner.submit(TaskKind::ImageGeneration, move |ctx| run_image(ctx, older));
        let newer = image_job(dir.path(), Reply::Png, &screen, None, &newest);
        runner.submit(TaskKind::ImageGeneration, move |ctx| run_image(ctx, newer));

        // The newer task is shown first, then the older one is released
        for _ in 0..100 {
            if !screen.shown.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let _ = older_done.send(());

        let statuses = join(&mut runner).await;
        let shown_flags: Vec<bool> = statuses
            .iter()
            .map(|s| match s {
                TaskStatus::Finished(TaskOutput::Image { shown, .. }) => *shown,
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(shown_flags, vec![false, true]);
        assert_eq!(screen.shown.lock().unwrap().len(), 1);
        assert_eq!(newest.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_image_still_shown_when_speech_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let screen = Arc::new(Screen::default());
        let newest = Arc::new(AtomicU64::new(0));
        let (done, gate) = oneshot::channel();
        let mut runner = TaskRunner::new();

        let speech = SpeechJob {
            speech: Arc::new(BrokenSpeech),
            presenter: screen.clone(),
            cache_dir: dir.path().join("speech"),
            text: "Foxes are clever.".to_string(),
            done: Some(done),
        };
        runner.submit(TaskKind::SpeechSynthesis, move |ctx| run_speech(ctx, speech));
        let job = image_job(&dir.path().join("images"), Reply::Png, &screen, Some(gate), &newest);
        std::fs::create_dir_all(dir.path().join("images")).expect("mkdir");
        runner.submit(TaskKind::ImageGeneration, move |ctx| run_image(ctx, job));

        let statuses = join(&mut runner).await;
        assert!(matches!(statuses[0], TaskStatus::Failed(_)));
        assert!(matches!(
            statuses[1],
            TaskStatus::Finished(TaskOutput::Image { shown: true, .. })
        ));
        assert!(screen.played.lock().unwrap().is_empty());
        assert_eq!(screen.shown.lock().unwrap().len(), 1);
    }
}
