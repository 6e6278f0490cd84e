//! Session controller
//!
//! Owns the listening mode, the persisted [`Session`] and the task runner.
//! Every dispatch ends back in [`SessionState::Idle`], whatever the outcome.

use crate::assistant::{ConversationBackend, ConverseRequest, OpenAiAssistant};
use crate::commands::{classify, sanitize, Intent};
use crate::config::Config;
use crate::error::{BuddyError, BuddyResult};
use crate::gallery::{Gallery, RandomPick};
use crate::imaging::{ImageRequest, ImageStudio, ProviderKind};
use crate::jobs::{self, ImageJob, NotifyJob, SpeechJob};
use crate::notify::{AppriseNotifier, Notifier};
use crate::presenter::{Cues, FramebufferPresenter, Presenter};
use crate::session::{Session, SessionStore};
use crate::tasks::{FinishedTask, JoinReport, TaskId, TaskKind, TaskOutput, TaskRunner, TaskStatus};
use crate::tts::{self, SpeechSynthesizer};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Listening,
    Dispatching,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    WakeDetected,
    PhraseRecognized,
    RecognitionFailed,
    ListenTimeout,
    DispatchFinished,
}

impl SessionState {
    pub const ALL: [SessionState; 3] = [
        SessionState::Idle,
        SessionState::Listening,
        SessionState::Dispatching,
    ];
}

impl SessionEvent {
    pub const ALL: [SessionEvent; 5] = [
        SessionEvent::WakeDetected,
        SessionEvent::PhraseRecognized,
        SessionEvent::RecognitionFailed,
        SessionEvent::ListenTimeout,
        SessionEvent::DispatchFinished,
    ];
}

/// The transition table. Pairs not listed are rejected.
pub fn transition(state: SessionState, event: SessionEvent) -> BuddyResult<SessionState> {
    use SessionEvent::*;
    use SessionState::*;

    match (state, event) {
        (Idle, WakeDetected) => Ok(Listening),
        (Listening, PhraseRecognized) => Ok(Dispatching),
        (Listening, RecognitionFailed) | (Listening, ListenTimeout) => Ok(Idle),
        (Dispatching, DispatchFinished) => Ok(Idle),
        (state, event) => Err(BuddyError::InvalidTransition { state, event }),
    }
}

/// Whether a conversation turn also speaks its reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechMode {
    Enabled,
    Disabled,
}

/// What a dispatched utterance produced
#[derive(Debug)]
pub enum DispatchOutcome {
    /// Blank after sanitizing; treated as a recognition failure
    NotRecognized,
    Cancelled,
    Shown(PathBuf),
    NoImagesAvailable,
    Sent { image: PathBuf, task: TaskId },
    NothingToSend,
    NoPreviousPrompt,
    ImageQueued(TaskId),
    ConversationQueued {
        reply: String,
        speech: Option<TaskId>,
        image: TaskId,
    },
    Failed(BuddyError),
}

/// Result of [`SessionController::shutdown`]
#[derive(Debug, Default)]
pub struct ShutdownReport {
    pub completed: Vec<TaskId>,
    pub abandoned: Vec<TaskId>,
}

impl ShutdownReport {
    /// 0 when every task was joined, 1 otherwise
    pub fn exit_code(&self) -> u8 {
        if self.abandoned.is_empty() {
            0
        } else {
            1
        }
    }
}

/// External collaborators
#[derive(Debug, Clone)]
pub struct Services {
    pub backend: Arc<dyn ConversationBackend>,
    pub studio: ImageStudio,
    pub speech: Arc<dyn SpeechSynthesizer>,
    pub presenter: Arc<dyn Presenter>,
    pub notifier: Arc<dyn Notifier>,
}

impl Services {
    /// Build the production collaborators
    pub fn from_config(config: &Config) -> BuddyResult<Self> {
        Ok(Self {
            backend: Arc::new(OpenAiAssistant::new(config)?),
            studio: ImageStudio::from_config(config)?,
            speech: tts::create_engine(config)?,
            presenter: Arc::new(FramebufferPresenter::new(config)?),
            notifier: Arc::new(AppriseNotifier::new(config)),
        })
    }
}

pub struct SessionController {
    state: SessionState,
    session: Option<Session>,
    store: SessionStore,
    gallery: Gallery,
    runner: TaskRunner,
    services: Services,
    cues: Cues,
    config: Config,
    /// Image currently on screen, as far as the controller knows
    current_display: Option<PathBuf>,
    /// Highest image task id that reached the display
    newest_shown: Arc<AtomicU64>,
    listen_deadline: Option<Instant>,
    accepting: bool,
}

impl SessionController {
    pub fn new(config: &Config, services: Services) -> BuddyResult<Self> {
        let store = SessionStore::new(&config.state_file);
        let session = store.load()?;
        let current_display = session
            .as_ref()
            .and_then(|s| s.last_generated_image_path.clone());

        Ok(Self {
            state: SessionState::Idle,
            session,
            store,
            gallery: Gallery::new(&config.saved_images_dir),
            runner: TaskRunner::new(),
            services,
            cues: Cues::from_config(config),
            config: config.clone(),
            current_display,
            newest_shown: Arc::new(AtomicU64::new(0)),
            listen_deadline: None,
            accepting: true,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn gallery(&self) -> &Gallery {
        &self.gallery
    }

    pub fn listen_deadline(&self) -> Option<Instant> {
        self.listen_deadline
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting
    }

    /// Tasks submitted and not yet absorbed
    pub fn pending_tasks(&self) -> usize {
        self.runner.len()
    }

    fn advance(&mut self, event: SessionEvent) -> BuddyResult<()> {
        let next = transition(self.state, event)?;
        debug!("State {:?} --{:?}--> {:?}", self.state, event, next);
        self.state = next;
        Ok(())
    }

    fn ensure_session(&mut self) -> &mut Session {
        if self.session.is_none() {
            let session = Session::new();
            info!("🆕 New session {}", session.session_id);
            if let Err(e) = self.store.save(&session) {
                warn!("⚠️ Could not persist new session: {}", e);
            }
            self.session = Some(session);
        }
        self.session.get_or_insert_with(Session::new)
    }

    fn persist(&self) {
        if let Some(session) = &self.session {
            if let Err(e) = self.store.save(session) {
                warn!("⚠️ Could not persist session: {}", e);
            }
        }
    }

    async fn cue(&self, path: Option<&Path>) {
        let Some(path) = path else { return };
        if let Err(e) = self.services.presenter.play_audio(path).await {
            debug!("Cue {:?} not played: {}", path, e);
        }
    }

    async fn show(&mut self, path: &Path) -> BuddyResult<()> {
        self.services.presenter.display_image(path).await?;
        self.current_display = Some(path.to_path_buf());
        Ok(())
    }

    /// Show a status image; failure is only logged
    async fn show_status(&self, path: &Path) {
        if let Err(e) = self.services.presenter.display_image(path).await {
            debug!("Status image {:?} not shown: {}", path, e);
        }
    }

    /// Wake event: Idle -> Listening. Returns the utterance deadline.
    pub async fn handle_wake(&mut self) -> BuddyResult<Instant> {
        if !self.accepting {
            return Err(BuddyError::ShuttingDown);
        }
        self.advance(SessionEvent::WakeDetected)?;
        info!("👂 Wake word detected, listening...");

        self.absorb_finished().await;
        self.ensure_session();

        self.cue(self.cues.random_wake()).await;
        self.show_status(&self.cues.listening_image).await;

        // The window opens once the cue has finished playing
        let deadline = Instant::now() + self.config.phrase_time_limit();
        self.listen_deadline = Some(deadline);
        Ok(deadline)
    }

    /// Put something on screen before the first wake: a random saved image,
    /// or the listening picture when there is none. Failure is only logged.
    pub async fn show_startup_image(&mut self) -> Option<PathBuf> {
        let pick = match self.gallery.random_excluding(None) {
            Ok(pick) => pick,
            Err(e) => {
                warn!("⚠️ Could not list saved images: {}", e);
                RandomPick::Empty
            }
        };
        match pick {
            RandomPick::Picked(image) | RandomPick::OnlyCurrent(image) => {
                match self.show(&image.path).await {
                    Ok(()) => {
                        info!("🖼️ Showing {:?}", image.path);
                        Some(image.path)
                    }
                    Err(e) => {
                        warn!("⚠️ Could not show {:?}: {}", image.path, e);
                        None
                    }
                }
            }
            RandomPick::Empty => {
                self.show_status(&self.cues.listening_image).await;
                None
            }
        }
    }

    /// Listening -> Idle without dispatch
    pub fn handle_recognition_failed(&mut self) -> BuddyResult<()> {
        self.advance(SessionEvent::RecognitionFailed)?;
        self.listen_deadline = None;
        info!("🤷 Speech not recognized, back to idle");
        Ok(())
    }

    /// Utterance deadline passed: Listening -> Idle
    pub fn handle_timeout(&mut self) -> BuddyResult<()> {
        self.advance(SessionEvent::ListenTimeout)?;
        self.listen_deadline = None;
        info!("⏰ No speech before the deadline, back to idle");
        Ok(())
    }

    /// Recognized text: Listening -> Dispatching -> Idle
    pub async fn handle_utterance(&mut self, text: &str) -> BuddyResult<DispatchOutcome> {
        let utterance = sanitize(text);
        if utterance.is_empty() {
            self.handle_recognition_failed()?;
            return Ok(DispatchOutcome::NotRecognized);
        }

        self.advance(SessionEvent::PhraseRecognized)?;
        self.listen_deadline = None;
        info!("🗣️ Heard: '{}'", utterance);

        let intent = match classify(&utterance) {
            Ok(intent) => intent,
            Err(e) => {
                info!("{}, treating it as conversation", e);
                Intent::Converse { text: utterance }
            }
        };
        debug!("Intent: {}", intent.name());

        self.absorb_finished().await;
        let outcome = match self.dispatch(intent).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("⚠️ Dispatch failed: {}", e);
                DispatchOutcome::Failed(e)
            }
        };

        self.advance(SessionEvent::DispatchFinished)?;
        Ok(outcome)
    }

    async fn dispatch(&mut self, intent: Intent) -> BuddyResult<DispatchOutcome> {
        match intent {
            Intent::Cancel => {
                self.cue(self.cues.random_acknowledge()).await;
                let last = self
                    .session
                    .as_ref()
                    .and_then(|s| s.last_generated_image_path.clone());
                if let Some(path) = last {
                    if let Err(e) = self.show(&path).await {
                        debug!("Could not restore last image: {}", e);
                    }
                }
                Ok(DispatchOutcome::Cancelled)
            }

            Intent::SendLast => {
                let last = self
                    .session
                    .as_ref()
                    .and_then(|s| s.last_generated_image_path.clone())
                    .filter(|p| p.exists());
                let Some(image) = last else {
                    info!("📭 No generated image to send");
                    self.cue(self.cues.random_acknowledge()).await;
                    return Ok(DispatchOutcome::NothingToSend);
                };

                self.show(&image).await?;
                self.cue(Some(&self.cues.sending)).await;

                let body = self
                    .session
                    .as_ref()
                    .and_then(|s| s.last_prompt.clone())
                    .unwrap_or_default();
                let job = NotifyJob {
                    notifier: self.services.notifier.clone(),
                    attachment: image.clone(),
                    title: "GPT Buddy".to_string(),
                    body,
                };
                let task = self
                    .runner
                    .submit(TaskKind::Notification, move |ctx| jobs::run_notify(ctx, job))
                    .id();
                Ok(DispatchOutcome::Sent { image, task })
            }

            Intent::ShowRandom => {
                let current = self.current_display.clone();
                match self.gallery.random_excluding(current.as_deref())? {
                    RandomPick::Empty => {
                        info!("🖼️ No saved images available");
                        self.cue(self.cues.random_acknowledge()).await;
                        Ok(DispatchOutcome::NoImagesAvailable)
                    }
                    RandomPick::OnlyCurrent(image) | RandomPick::Picked(image) => {
                        self.show(&image.path).await?;
                        Ok(DispatchOutcome::Shown(image.path))
                    }
                }
            }

            Intent::MakeAnother => {
                let Some(prompt) = self.session.as_ref().and_then(|s| s.last_prompt.clone())
                else {
                    info!("🎨 Nothing to remix yet");
                    self.cue(self.cues.random_acknowledge()).await;
                    return Ok(DispatchOutcome::NoPreviousPrompt);
                };
                self.cue(self.cues.random_acknowledge()).await;
                let request = ImageRequest::new(prompt).with_style(&self.config.remix_style);
                let id = self.submit_image(ProviderKind::Local, request, None);
                Ok(DispatchOutcome::ImageQueued(id))
            }

            Intent::GenerateImage { prompt, provider } => {
                self.ensure_session().last_prompt = Some(prompt.clone());
                self.persist();
                self.cue(self.cues.random_acknowledge()).await;

                let mut request = ImageRequest::new(prompt);
                if provider == ProviderKind::Local {
                    request = request.with_style(&self.config.default_style);
                }
                let id = self.submit_image(provider, request, None);
                Ok(DispatchOutcome::ImageQueued(id))
            }

            Intent::Converse { text } => self.converse(&text, SpeechMode::Enabled).await,
        }
    }

    fn submit_image(
        &mut self,
        provider: ProviderKind,
        request: ImageRequest,
        after: Option<oneshot::Receiver<()>>,
    ) -> TaskId {
        let job = ImageJob {
            studio: self.services.studio.clone(),
            gallery: self.gallery.clone(),
            presenter: self.services.presenter.clone(),
            provider,
            request,
            after,
            newest_shown: self.newest_shown.clone(),
        };
        self.runner
            .submit(TaskKind::ImageGeneration, move |ctx| jobs::run_image(ctx, job))
            .id()
    }

    /// One conversation turn. The backend wait is bounded; on timeout no
    /// task is submitted.
    pub async fn converse(&mut self, text: &str, speech: SpeechMode) -> BuddyResult<DispatchOutcome> {
        let session = self.ensure_session();
        let request = ConverseRequest {
            session_id: session.session_id.clone(),
            thread_id: session.thread_id.clone(),
            text: text.to_string(),
        };

        let limit = self.config.assistant_timeout();
        let deadline = Instant::now() + limit;
        info!("💬 Asking {}...", self.services.backend.name());

        // The thinking cue plays while the backend works, within the same limit
        let thinking = async {
            self.show_status(&self.cues.thinking_image).await;
            if speech == SpeechMode::Enabled {
                self.cue(Some(&self.cues.thinking)).await;
            }
        };
        let (answer, cue_done) = tokio::join!(
            tokio::time::timeout_at(deadline, self.services.backend.converse(&request)),
            tokio::time::timeout_at(deadline, thinking)
        );
        if cue_done.is_err() {
            debug!("Thinking cue cut short by the backend deadline");
        }

        let reply = match answer {
            Err(_) => {
                warn!("⏰ {} did not answer within {:?}", self.services.backend.name(), limit);
                return Err(BuddyError::BackendTimeout(limit));
            }
            Ok(Err(e)) => return Err(BuddyError::Backend(format!("{:#}", e))),
            Ok(Ok(reply)) => reply,
        };
        info!("🤖 Reply: {}", reply.reply_text);

        self.ensure_session().thread_id = Some(reply.thread_id.clone());
        self.persist();

        let (speech_task, gate) = match speech {
            SpeechMode::Enabled => {
                let (done, gate) = oneshot::channel();
                let job = SpeechJob {
                    speech: self.services.speech.clone(),
                    presenter: self.services.presenter.clone(),
                    cache_dir: self.config.speech_cache_dir.clone(),
                    text: reply.reply_text.clone(),
                    done: Some(done),
                };
                let id = self
                    .runner
                    .submit(TaskKind::SpeechSynthesis, move |ctx| jobs::run_speech(ctx, job))
                    .id();
                (Some(id), Some(gate))
            }
            SpeechMode::Disabled => (None, None),
        };

        let prompt = format!(
            "{}\n{}\n{}",
            self.config.assistant_image_prompt, text, reply.reply_text
        );
        let image = self.submit_image(ProviderKind::Hosted, ImageRequest::new(prompt), gate);

        Ok(DispatchOutcome::ConversationQueued {
            reply: reply.reply_text,
            speech: speech_task,
            image,
        })
    }

    async fn absorb_finished(&mut self) {
        let finished = self.runner.reap().await;
        self.absorb(&finished);
    }

    /// Fold finished task results into the session
    fn absorb(&mut self, finished: &[FinishedTask]) {
        let mut changed = false;
        for task in finished {
            match &task.status {
                TaskStatus::Finished(TaskOutput::Image {
                    path,
                    prompt,
                    shown,
                }) => {
                    let Some(session) = self.session.as_mut() else {
                        continue;
                    };
                    if session.record_image(path.clone(), task.id.0) {
                        debug!("Task {} produced {:?} for '{}'", task.id, path, prompt);
                        changed = true;
                    }
                    if *shown {
                        self.current_display = Some(path.clone());
                    }
                }
                TaskStatus::Finished(_) => {}
                TaskStatus::Cancelled => debug!("Task {} was cancelled", task.id),
                TaskStatus::Failed(e) => debug!("Task {} failed: {}", task.id, e),
            }
        }
        if changed {
            self.persist();
        }
    }

    /// Wait up to `limit` for outstanding tasks and absorb their results
    pub async fn wait_for_tasks(&mut self, limit: Duration) -> JoinReport {
        let report = self.runner.join_all(Instant::now() + limit).await;
        self.absorb(&report.completed);
        report
    }

    /// Stop accepting wakes, cancel and join tasks, release the display
    pub async fn shutdown(&mut self) -> ShutdownReport {
        info!("🛑 Shutting down session controller...");
        self.accepting = false;
        self.listen_deadline = None;

        self.runner.cancel_all();
        let grace = self.config.shutdown_grace();
        let report = self.runner.join_all(Instant::now() + grace).await;
        self.absorb(&report.completed);
        self.persist();

        if let Err(e) = self.services.presenter.clear().await {
            warn!("⚠️ Could not release display: {}", e);
        }

        let report = ShutdownReport {
            completed: report.completed.iter().map(|t| t.id).collect(),
            abandoned: report.abandoned,
        };
        if report.abandoned.is_empty() {
            info!("✅ All {} task(s) joined", report.completed.len());
        } else {
            warn!(
                "⚠️ {} task(s) abandoned after {:?}: {:?}",
                report.abandoned.len(),
                grace,
                report.abandoned
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let mut state = SessionState::Idle;
        state = transition(state, SessionEvent::WakeDetected).expect("wake");
        assert_eq!(state, SessionState::Listening);
        state = transition(state, SessionEvent::PhraseRecognized).expect("phrase");
        assert_eq!(state, SessionState::Dispatching);
        state = transition(state, SessionEvent::DispatchFinished).expect("done");
        assert_eq!(state, SessionState::Idle);
    }

    #[test]
    fn test_wake_while_listening_is_rejected() {
        let err = transition(SessionState::Listening, SessionEvent::WakeDetected)
            .expect_err("rejected");
        assert!(matches!(
            err,
            BuddyError::InvalidTransition {
                state: SessionState::Listening,
                event: SessionEvent::WakeDetected
            }
        ));
    }

    #[test]
    fn test_shutdown_exit_code() {
        assert_eq!(ShutdownReport::default().exit_code(), 0);
        let report = ShutdownReport {
            completed: vec![TaskId(1)],
            abandoned: vec![TaskId(2)],
        };
        assert_eq!(report.exit_code(), 1);
    }
}
