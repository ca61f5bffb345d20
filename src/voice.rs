//! The voice channel the bot plays into.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    thread,
};

use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::{
    audio::{self, AudioOutput, OutputFormat, PlayerControl},
    error::{BotError, Result},
};

/// Called exactly once when a track ends, is stopped, or fails.
///
/// It runs on whatever thread the connection streams from, so it must
/// only hand the event over, never act on it.
pub type CompletionHook = Box<dyn FnOnce(Option<BotError>) + Send + 'static>;

#[async_trait]
pub trait VoiceConnection: Send {
    async fn connect(&mut self, channel: &str) -> Result<()>;

    async fn move_to(&mut self, channel: &str) -> Result<()>;

    /// Leaves the channel, stopping any playback.
    async fn disconnect(&mut self) -> Result<()>;

    fn channel(&self) -> Option<&str>;

    fn is_connected(&self) -> bool {
        self.channel().is_some()
    }

    /// Starts streaming `file`; `on_complete` fires when it ends.
    fn play(&mut self, file: &Path, on_complete: CompletionHook) -> Result<()>;

    fn pause(&mut self) -> Result<()>;

    fn resume(&mut self) -> Result<()>;

    /// Stops the current track. Its completion hook still fires.
    fn stop(&mut self);

    fn is_playing(&self) -> bool;

    fn is_paused(&self) -> bool;
}

/// Streams decoded PCM from a dedicated thread per track.
pub struct StreamingVoice {
    channel: Option<String>,
    output: AudioOutput,
    format: OutputFormat,
    current: Option<Arc<PlayerControl>>,
}

impl StreamingVoice {
    pub fn new(output: AudioOutput, format: OutputFormat) -> Self {
        Self {
            channel: None,
            output,
            format,
            current: None,
        }
    }

    fn active(&self) -> Option<&Arc<PlayerControl>> {
        self.current.as_ref().filter(|control| !control.is_finished())
    }
}

#[async_trait]
impl VoiceConnection for StreamingVoice {
    async fn connect(&mut self, channel: &str) -> Result<()> {
        info!("Joining voice channel '{}'", channel);
        self.channel = Some(channel.to_string());
        Ok(())
    }

    async fn move_to(&mut self, channel: &str) -> Result<()> {
        if self.channel.as_deref() != Some(channel) {
            info!("Moving to voice channel '{}'", channel);
            self.channel = Some(channel.to_string());
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.stop();
        if let Some(channel) = self.channel.take() {
            info!("Left voice channel '{}'", channel);
        }
        Ok(())
    }

    fn channel(&self) -> Option<&str> {
        self.channel.as_deref()
    }

    fn play(&mut self, file: &Path, on_complete: CompletionHook) -> Result<()> {
        if self.channel.is_none() {
            return Err(BotError::NotConnected);
        }
        if self.active().is_some() {
            return Err(BotError::Playback("Already playing a track".to_string()));
        }

        let control = Arc::new(PlayerControl::default());
        let thread_control = Arc::clone(&control);
        let output = self.output.clone();
        let format = self.format;
        let path: PathBuf = file.to_path_buf();

        thread::Builder::new()
            .name("voice-stream".to_string())
            .spawn(move || {
                let result = output
                    .open()
                    .map_err(BotError::from)
                    .and_then(|mut sink| audio::stream_file(&path, format, sink.as_mut(), &thread_control));
                thread_control.mark_finished();
                match result {
                    Ok(()) => {
                        debug!("Stream thread for {:?} finished", path);
                        on_complete(None);
                    }
                    Err(e) => {
                        error!("Error during playback of {:?}: {}", path, e);
                        on_complete(Some(e));
                    }
                }
            })?;

        self.current = Some(control);
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        let control = self.active().ok_or(BotError::NothingPlaying)?;
        control.pause();
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        let control = self.active().ok_or(BotError::NothingPaused)?;
        control.resume();
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(control) = self.current.take() {
            control.stop();
        }
    }

    fn is_playing(&self) -> bool {
        self.active().is_some_and(|control| !control.is_paused())
    }

    fn is_paused(&self) -> bool {
        self.active().is_some_and(|control| control.is_paused())
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::mpsc, time::Duration};

    use super::*;

    #[tokio::test]
    async fn refuses_to_play_while_disconnected() {
        let mut voice = StreamingVoice::new(AudioOutput::Discard, OutputFormat::default());
        let result = voice.play(Path::new("whatever.m4a"), Box::new(|_| {}));
        assert!(matches!(result, Err(BotError::NotConnected)));
    }

    #[tokio::test]
    async fn unreadable_file_reports_through_the_hook() {
        let mut voice = StreamingVoice::new(AudioOutput::Discard, OutputFormat::default());
        voice.connect("general").await.unwrap();

        let (tx, rx) = mpsc::channel();
        voice
            .play(
                Path::new("/nonexistent/track.m4a"),
                Box::new(move |error| {
                    tx.send(error.is_some()).unwrap();
                }),
            )
            .unwrap();

        let failed = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(failed);
    }

    #[tokio::test]
    async fn disconnect_forgets_the_channel() {
        let mut voice = StreamingVoice::new(AudioOutput::Discard, OutputFormat::default());
        voice.connect("general").await.unwrap();
        voice.move_to("music").await.unwrap();
        assert_eq!(voice.channel(), Some("music"));
        voice.disconnect().await.unwrap();
        assert!(!voice.is_connected());
        assert!(!voice.is_playing());
    }
}
