//! Managed image directory
//!
//! Generated images are written to a unique hidden temp file and renamed into
//! place, so a reader never sees a partial file. Every path under the
//! directory is built by [`Gallery::image_path`].

use crate::error::BuddyResult;
use chrono::{DateTime, Local};
use rand::seq::SliceRandom;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// An image file in the managed directory
#[derive(Debug, Clone, PartialEq)]
pub struct SavedImage {
    pub path: PathBuf,
    pub created_at: DateTime<Local>,
}

/// Result of picking a random image to show
#[derive(Debug, Clone, PartialEq)]
pub enum RandomPick {
    /// The directory has no images
    Empty,
    /// The only image is the one already on screen
    OnlyCurrent(SavedImage),
    Picked(SavedImage),
}

#[derive(Debug, Clone)]
pub struct Gallery {
    dir: PathBuf,
}

impl Gallery {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the directory if missing
    pub fn ensure(&self) -> BuddyResult<()> {
        if !self.dir.exists() {
            warn!("📁 Image directory {:?} not found, creating it", self.dir);
            std::fs::create_dir_all(&self.dir)?;
        }
        Ok(())
    }

    /// Path of `file_name` inside the managed directory. Any directory part of
    /// `file_name` is dropped.
    pub fn image_path(&self, file_name: &str) -> PathBuf {
        let name = Path::new(file_name)
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        self.dir.join(name)
    }

    /// File name for an image produced by task `seq` at `created`. Task ids
    /// restart with each process, so `tag` keeps names from colliding.
    pub fn file_name_for(created: &DateTime<Local>, seq: u64, tag: &str) -> String {
        format!("{}-{}-{}.png", created.format("%Y%m%d-%H%M%S"), seq, tag)
    }

    fn temp_path(&self) -> PathBuf {
        self.image_path(&format!(".{}.png.part", uuid::Uuid::new_v4()))
    }

    /// Write `png` for task `seq` and rename it into place
    pub async fn store(&self, png: &[u8], seq: u64) -> BuddyResult<SavedImage> {
        let created_at = Local::now();
        let tag = uuid::Uuid::new_v4().simple().to_string();
        let final_path = self.image_path(&Self::file_name_for(&created_at, seq, &tag[..8]));
        let tmp = self.temp_path();

        if let Err(e) = tokio::fs::write(&tmp, png).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&tmp, &final_path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        info!("💾 Image saved to {:?}", final_path);
        Ok(SavedImage {
            path: final_path,
            created_at,
        })
    }

    /// All finished images, oldest name first. A missing directory is empty.
    pub fn list(&self) -> BuddyResult<Vec<SavedImage>> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut images = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') || !is_image_name(&name) {
                continue;
            }
            let metadata = entry.metadata()?;
            if !metadata.is_file() {
                continue;
            }
            let created_at = metadata
                .modified()
                .map(DateTime::<Local>::from)
                .unwrap_or_else(|_| Local::now());
            images.push(SavedImage {
                path: self.image_path(&name),
                created_at,
            });
        }

        images.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(images)
    }

    /// Pick a random image, avoiding `current` when another one exists
    pub fn random_excluding(&self, current: Option<&Path>) -> BuddyResult<RandomPick> {
        let images = self.list()?;
        if images.is_empty() {
            return Ok(RandomPick::Empty);
        }

        let (others, current_images): (Vec<SavedImage>, Vec<SavedImage>) = images
            .into_iter()
            .partition(|img| Some(img.path.as_path()) != current);

        let mut rng = rand::thread_rng();
        match others.choose(&mut rng) {
            Some(img) => {
                debug!("  - Randomly picked: {:?}", img.path);
                Ok(RandomPick::Picked(img.clone()))
            }
            None => Ok(current_images
                .into_iter()
                .next()
                .map(RandomPick::OnlyCurrent)
                .unwrap_or(RandomPick::Empty)),
        }
    }
}

fn is_image_name(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}
