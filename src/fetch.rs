//! Turning a source URL into a playable local file.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;
use rustube::{Id, Video};
use tracing::{debug, info, warn};

use crate::{config::Config, error::FetchError, source::SourceRef};

/// Downloads a track and returns where it was stored.
///
/// Implementations may take a long time; callers run them off the
/// decision path.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, source: &SourceRef) -> Result<PathBuf, FetchError>;
}

/// Fetches the best audio-only stream of a YouTube video via `rustube`.
pub struct YouTubeFetcher {
    download_dir: PathBuf,
    attempts: u32,
    connect_timeout: Duration,
}

impl YouTubeFetcher {
    /// Creates the download directory if needed.
    pub fn new(
        download_dir: impl Into<PathBuf>,
        attempts: u32,
        connect_timeout: Duration,
    ) -> Result<Self, FetchError> {
        let download_dir = download_dir.into();
        std::fs::create_dir_all(&download_dir)?;
        Ok(Self {
            download_dir,
            attempts: attempts.max(1),
            connect_timeout,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, FetchError> {
        Self::new(
            config.download_dir.clone(),
            config.fetch_retries.saturating_add(1),
            config.fetch_timeout(),
        )
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    async fn download_once(&self, source: &SourceRef) -> Result<PathBuf, FetchError> {
        let id = Id::from_raw(source.as_str())
            .map_err(|e| FetchError::InvalidUrl(e.to_string()))?
            .into_owned();
        let video_id = id.as_str().to_string();

        debug!("Fetching video info for {}", video_id);
        let video = tokio::time::timeout(self.connect_timeout, Video::from_id(id))
            .await
            .map_err(|_| FetchError::Timeout(self.connect_timeout.as_secs()))?
            .map_err(|e| FetchError::YouTube(format!("Failed to get video info: {}", e)))?;

        // Prefer mp4 audio: it decodes without extra codecs.
        let stream = video
            .streams()
            .iter()
            .filter(|s| s.includes_audio_track && !s.includes_video_track)
            .max_by_key(|s| (s.mime.essence_str() == "audio/mp4", s.bitrate.unwrap_or(0)))
            .ok_or(FetchError::NoAudioStream)?;

        let extension = if stream.mime.essence_str() == "audio/mp4" {
            "m4a"
        } else {
            "webm"
        };
        info!(
            "Selected audio stream for {}: type={}, bitrate={:?}",
            video_id,
            stream.mime.essence_str(),
            stream.bitrate
        );

        let target = self.download_dir.join(format!("{}.{}", video_id, extension));
        let partial = target.with_extension("part");
        stream
            .download_to(&partial)
            .await
            .map_err(|e| FetchError::YouTube(format!("Failed to download audio: {}", e)))?;
        tokio::fs::rename(&partial, &target).await?;
        Ok(target)
    }
}

#[async_trait]
impl Fetcher for YouTubeFetcher {
    async fn fetch(&self, source: &SourceRef) -> Result<PathBuf, FetchError> {
        let mut attempt = 1;
        loop {
            match self.download_once(source).await {
                Ok(path) => {
                    info!("Downloaded {} to {:?}", source, path);
                    return Ok(path);
                }
                Err(e) if e.is_transient() && attempt < self.attempts => {
                    warn!(
                        "Download attempt {}/{} for {} failed: {}",
                        attempt, self.attempts, source, e
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
