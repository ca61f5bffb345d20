//! Playback state for one voice connection.
//!
//! A [`PlaybackSession`] owns everything the decision path mutates: the
//! playback state, the pending queue, the download cache and the voice
//! connection. It is only ever touched from the controller task.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use tracing::{debug, error, info, warn};

use crate::{
    cache::TrackCache,
    error::{BotError, Result},
    queue::TrackQueue,
    source::SourceRef,
    voice::{CompletionHook, VoiceConnection},
};

/// Identifies one start attempt. Completion signals carry it back so a
/// late signal from an older track cannot advance the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ticket(u64);

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NowPlaying {
    pub ticket: Ticket,
    pub source: SourceRef,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Idle,
    Playing(NowPlaying),
    Paused(NowPlaying),
}

impl PlaybackState {
    pub fn now_playing(&self) -> Option<&NowPlaying> {
        match self {
            PlaybackState::Idle => None,
            PlaybackState::Playing(track) | PlaybackState::Paused(track) => Some(track),
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, PlaybackState::Idle)
    }
}

pub struct PlaybackSession {
    state: PlaybackState,
    /// Start attempt waiting for its file.
    loading: Option<Ticket>,
    next_ticket: u64,
    /// Bumped by every stop; work started before it must not restart playback.
    generation: u64,
    queue: TrackQueue,
    cache: TrackCache,
    voice: Box<dyn VoiceConnection>,
}

impl PlaybackSession {
    pub fn new(queue: TrackQueue, cache: TrackCache, voice: Box<dyn VoiceConnection>) -> Self {
        Self {
            state: PlaybackState::Idle,
            loading: None,
            next_ticket: 0,
            generation: 0,
            queue,
            cache,
            voice,
        }
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    /// Playing, paused, or about to start.
    pub fn is_active(&self) -> bool {
        !self.state.is_idle() || self.loading.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn queue(&self) -> &TrackQueue {
        &self.queue
    }

    pub fn queue_mut(&mut self) -> &mut TrackQueue {
        &mut self.queue
    }

    pub fn cache(&self) -> &TrackCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut TrackCache {
        &mut self.cache
    }

    pub fn voice(&self) -> &dyn VoiceConnection {
        self.voice.as_ref()
    }

    /// Joins `channel`, or moves there if already connected elsewhere.
    pub async fn join(&mut self, channel: &str) -> Result<()> {
        let current = self.voice.channel().map(str::to_owned);
        let result = match current.as_deref() {
            None => self.voice.connect(channel).await,
            Some(current) if current == channel => Ok(()),
            Some(_) => self.voice.move_to(channel).await,
        };
        result.map_err(|e| match e {
            BotError::Connection(_) => e,
            other => BotError::Connection(other.to_string()),
        })
    }

    /// Reserves a ticket for a track that will start once its file is ready.
    pub fn begin_loading(&mut self) -> Ticket {
        self.next_ticket += 1;
        let ticket = Ticket(self.next_ticket);
        self.loading = Some(ticket);
        debug!("Loading {}", ticket);
        ticket
    }

    pub fn is_loading(&self, ticket: Ticket) -> bool {
        self.loading == Some(ticket)
    }

    pub fn cancel_loading(&mut self, ticket: Ticket) {
        if self.is_loading(ticket) {
            self.loading = None;
        }
    }

    /// Starts `source` from `path`. Only valid while idle.
    pub fn start(
        &mut self,
        ticket: Ticket,
        source: SourceRef,
        path: PathBuf,
        on_complete: CompletionHook,
    ) -> Result<()> {
        if !self.state.is_idle() {
            return Err(BotError::Playback("Another track is already playing".to_string()));
        }
        self.cancel_loading(ticket);
        self.voice.play(&path, on_complete).map_err(|e| match e {
            BotError::Playback(_) => e,
            other => BotError::Playback(other.to_string()),
        })?;
        info!("Now playing {} from {:?} ({})", source, path, ticket);
        self.state = PlaybackState::Playing(NowPlaying { ticket, source, path });
        Ok(())
    }

    pub fn pause(&mut self) -> Result<()> {
        let PlaybackState::Playing(track) = &self.state else {
            return Err(BotError::NothingPlaying);
        };
        let track = track.clone();
        self.voice.pause()?;
        self.state = PlaybackState::Paused(track);
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        let PlaybackState::Paused(track) = &self.state else {
            return Err(BotError::NothingPaused);
        };
        let track = track.clone();
        self.voice.resume()?;
        self.state = PlaybackState::Playing(track);
        Ok(())
    }

    /// Stops the current track. The queue advances once the completion
    /// signal comes back, not here.
    pub fn skip(&mut self) -> Result<SourceRef> {
        let PlaybackState::Playing(track) = &self.state else {
            return Err(BotError::NothingPlaying);
        };
        let source = track.source.clone();
        self.voice.stop();
        Ok(source)
    }

    /// Disconnects and clears the queue, from any state.
    pub async fn stop(&mut self) -> Result<()> {
        if !self.voice.is_connected() && !self.is_active() {
            return Err(BotError::NotConnected);
        }
        self.voice.disconnect().await?;
        self.queue.clear();
        self.loading = None;
        self.state = PlaybackState::Idle;
        self.generation += 1;
        Ok(())
    }

    /// Leaves the voice channel once nothing is left to play.
    pub async fn disconnect(&mut self) -> Result<()> {
        if self.voice.is_connected() {
            self.voice.disconnect().await?;
        }
        Ok(())
    }

    /// Handles the end of the track identified by `ticket`.
    ///
    /// Its file is reclaimed either way. Returns whether it was the current
    /// track, in which case the session is now idle and the queue should
    /// advance.
    pub fn finish(&mut self, ticket: Ticket, path: &Path) -> bool {
        let current = self
            .state
            .now_playing()
            .is_some_and(|track| track.ticket == ticket);
        if current {
            self.state = PlaybackState::Idle;
        } else {
            debug!("Ignoring completion of stale track {}", ticket);
        }
        self.reclaim(path);
        current
    }

    /// Deletes a played file that the cache owns. Failures are logged only.
    fn reclaim(&mut self, path: &Path) {
        if self.state.now_playing().is_some_and(|track| track.path == path) {
            debug!("Keeping {:?}, it is playing again", path);
            return;
        }
        if !self.cache.holds_path(path) {
            return;
        }
        match std::fs::remove_file(path) {
            Ok(()) => debug!("Deleted played file {:?}", path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => error!("Failed to delete {:?}: {}", path, e),
        }
        if let Err(e) = self.cache.remove_path(path) {
            warn!("Failed to persist cache after removing {:?}: {}", path, e);
        }
    }
}
