use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, BotError>;

/// Errors surfaced by the jukebox. Every variant ends up as a chat reply.
#[derive(Debug, Error)]
pub enum BotError {
    #[error("Not a valid YouTube link: {0}")]
    InvalidSource(String),
    #[error("The queue is full (max {max}).")]
    QueueFull { max: usize },
    #[error("Download failed: {0}")]
    Fetch(#[from] FetchError),
    #[error("Cannot connect to the voice channel: {0}")]
    Connection(String),
    #[error("Playback error: {0}")]
    Playback(String),
    #[error("Join a voice channel first.")]
    NotInVoiceChannel,
    #[error("Not connected.")]
    NotConnected,
    #[error("Nothing is playing right now.")]
    NothingPlaying,
    #[error("Nothing is paused.")]
    NothingPaused,
    #[error("The player is not running.")]
    ControllerClosed,
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Audio processing error: {0}")]
    AudioProcessing(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cache store error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Symphonia probe/decode error: {0}")]
    Symphonia(#[from] symphonia::core::errors::Error),
    #[error("Resampling error: {0}")]
    Resampling(#[from] rubato::ResampleError),
    #[error("Resampler setup error: {0}")]
    ResamplerConstruction(#[from] rubato::ResamplerConstructionError),
}

/// Failures of the fetch-and-store step.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("YouTube error: {0}")]
    YouTube(String),
    #[error("No suitable audio-only stream found")]
    NoAudioStream,
    #[error("Timed out after {0}s")]
    Timeout(u64),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    /// Whether another attempt could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::YouTube(_) | FetchError::Timeout(_) | FetchError::Io(_))
    }
}
