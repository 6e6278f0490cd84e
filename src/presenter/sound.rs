//! Sound engine for audio output
//!
//! Uses a channel-based architecture to handle rodio's non-Send stream.
//! The engine spawns a dedicated audio thread that owns the playback infrastructure.

use crate::error::{BuddyError, BuddyResult};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use tracing::{error, info, warn};

/// Commands sent to the audio thread
enum AudioCommand {
    PlayWait(PathBuf, mpsc::Sender<Result<(), String>>),
    Stop,
}

/// Thread-safe handle to the sound engine
#[derive(Clone)]
pub struct SoundEngine {
    sender: mpsc::Sender<AudioCommand>,
}

impl std::fmt::Debug for SoundEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoundEngine").finish()
    }
}

impl SoundEngine {
    pub fn new() -> BuddyResult<Self> {
        let (sender, receiver) = mpsc::channel::<AudioCommand>();

        thread::Builder::new()
            .name("gptbuddy-audio".to_string())
            .spawn(move || Self::audio_thread(receiver))?;

        Ok(Self { sender })
    }

    fn audio_thread(receiver: mpsc::Receiver<AudioCommand>) {
        use rodio::OutputStream;

        let (stream, stream_handle) = match OutputStream::try_default() {
            Ok(s) => s,
            Err(e) => {
                warn!("🔇 Failed to initialize audio output: {}", e);
                // Answer callers so nobody waits on a dead thread
                while let Ok(cmd) = receiver.recv() {
                    if let AudioCommand::PlayWait(_, resp) = cmd {
                        let _ = resp.send(Err(format!("No audio output: {}", e)));
                    }
                }
                return;
            }
        };

        // Keep stream alive
        let _stream = stream;
        let mut sink = match rodio::Sink::try_new(&stream_handle) {
            Ok(s) => s,
            Err(e) => {
                error!("❌ Failed to create audio sink: {}", e);
                return;
            }
        };

        info!("🔊 Audio thread started");

        while let Ok(cmd) = receiver.recv() {
            match cmd {
                AudioCommand::PlayWait(path, resp) => {
                    info!("🔊 Playing file (blocking): {:?}", path);
                    let result = Self::queue_file(&sink, &path).map_err(|e| {
                        error!("❌ Audio playback failed for {:?}: {}", path, e);
                        e.to_string()
                    });
                    if result.is_ok() {
                        sink.sleep_until_end();
                    }
                    let _ = resp.send(result);
                }
                AudioCommand::Stop => {
                    info!("🛑 Stopping all playback");
                    sink.stop();
                    // A stopped sink cannot play again
                    if let Ok(new_sink) = rodio::Sink::try_new(&stream_handle) {
                        sink = new_sink;
                    }
                }
            }
        }

        info!("🔇 Audio thread stopped");
    }

    fn queue_file(sink: &rodio::Sink, path: &Path) -> anyhow::Result<()> {
        use rodio::Decoder;
        use std::fs::File;
        use std::io::BufReader;

        if !path.exists() {
            anyhow::bail!("Audio file not found: {:?}", path);
        }

        let file = File::open(path)?;
        let source = Decoder::new(BufReader::new(file))?;
        sink.append(source);
        Ok(())
    }

    /// Play a single audio file and wait for completion (Sync/Blocking)
    pub fn play_file_sync<P: Into<PathBuf>>(&self, path: P) -> BuddyResult<()> {
        let (tx, rx) = mpsc::channel();
        self.sender
            .send(AudioCommand::PlayWait(path.into(), tx))
            .map_err(|e| BuddyError::Presentation(format!("Audio thread disconnected: {}", e)))?;

        match rx.recv() {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(BuddyError::Presentation(e)),
            Err(_) => Err(BuddyError::Presentation(
                "Audio thread stopped during playback".to_string(),
            )),
        }
    }

    /// Stop all current playback and clear queue
    pub fn stop(&self) -> BuddyResult<()> {
        self.sender
            .send(AudioCommand::Stop)
            .map_err(|e| BuddyError::Presentation(format!("Audio thread disconnected: {}", e)))
    }
}
