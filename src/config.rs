//! Runtime configuration.
//!
//! Every setting can come from the command line or from a `TOD_*`
//! environment variable.

use std::{path::PathBuf, time::Duration};

use clap::Parser;

use crate::error::{BotError, Result};

/// Frame durations accepted by voice codecs.
const FRAME_DURATIONS_MS: [u32; 4] = [10, 20, 40, 60];

#[derive(Parser, Debug, Clone)]
#[command(name = "tod-jukebox")]
#[command(about = "Queue YouTube tracks and play them into a voice channel")]
#[command(version)]
pub struct Config {
    /// JSON file mapping source URLs to downloaded files
    #[arg(long, default_value = "songs.json", env = "TOD_CACHE_FILE")]
    pub cache_file: PathBuf,

    /// Directory downloaded tracks are written to
    #[arg(long, default_value = "downloads", env = "TOD_DOWNLOAD_DIR")]
    pub download_dir: PathBuf,

    /// Maximum number of tracks waiting behind the current one
    #[arg(long, default_value_t = 10, env = "TOD_MAX_QUEUE_LENGTH")]
    pub max_queue_length: usize,

    /// Prefix marking a chat message as a command
    #[arg(long, default_value = "!", env = "TOD_COMMAND_PREFIX")]
    pub command_prefix: String,

    /// Extra download attempts after a transient failure
    #[arg(long, default_value_t = 3, env = "TOD_FETCH_RETRIES")]
    pub fetch_retries: u32,

    /// Timeout of a single download attempt, in seconds
    #[arg(long, default_value_t = 15, env = "TOD_FETCH_TIMEOUT_SECS")]
    pub fetch_timeout_secs: u64,

    /// Output sample rate sent to the voice channel
    #[arg(long, default_value_t = 48_000, env = "TOD_SAMPLE_RATE")]
    pub sample_rate: u32,

    /// Output channel count (1 = mono, 2 = stereo)
    #[arg(long, default_value_t = 1, env = "TOD_CHANNELS")]
    pub channels: usize,

    /// Duration of one outgoing audio frame, in milliseconds
    #[arg(long, default_value_t = 20, env = "TOD_FRAME_MS")]
    pub frame_ms: u32,

    /// Voice channel the console user sits in
    #[arg(long, env = "TOD_VOICE_CHANNEL")]
    pub voice_channel: Option<String>,

    /// File or FIFO receiving raw s16le PCM; audio is discarded when unset
    #[arg(long, env = "TOD_PCM_OUTPUT")]
    pub pcm_output: Option<PathBuf>,

    /// Also write logs to this file
    #[arg(long, env = "TOD_LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.max_queue_length == 0 {
            return Err(BotError::InvalidConfig(
                "max-queue-length must be at least 1".to_string(),
            ));
        }
        if !(1..=2).contains(&self.channels) {
            return Err(BotError::InvalidConfig(format!(
                "channels must be 1 or 2, got {}",
                self.channels
            )));
        }
        if !FRAME_DURATIONS_MS.contains(&self.frame_ms) {
            return Err(BotError::InvalidConfig(format!(
                "frame-ms must be one of {:?}, got {}",
                FRAME_DURATIONS_MS, self.frame_ms
            )));
        }
        if self.sample_rate == 0 {
            return Err(BotError::InvalidConfig(
                "sample-rate must be positive".to_string(),
            ));
        }
        if self.command_prefix.is_empty() {
            return Err(BotError::InvalidConfig(
                "command-prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["tod-jukebox"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults_match_the_bot() {
        let config = parse(&[]);
        assert_eq!(config.max_queue_length, 10);
        assert_eq!(config.cache_file, PathBuf::from("songs.json"));
        assert_eq!(config.fetch_retries, 3);
        assert_eq!(config.fetch_timeout(), Duration::from_secs(15));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_bad_values() {
        assert!(parse(&["--max-queue-length", "0"]).validate().is_err());
        assert!(parse(&["--channels", "6"]).validate().is_err());
        assert!(parse(&["--frame-ms", "25"]).validate().is_err());
        assert!(parse(&["--command-prefix", ""]).validate().is_err());
    }
}
