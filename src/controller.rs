//! The decision path.
//!
//! A single task owns the [`PlaybackSession`] and processes one
//! [`Message`] at a time: chat commands, finished downloads and track
//! completion signals. Downloads run in their own tasks and the voice
//! connection signals completion from its own thread; both only post a
//! message here.

use std::{path::PathBuf, sync::Arc};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, warn};

use crate::{
    command::{self, Command},
    error::{BotError, FetchError, Result},
    fetch::Fetcher,
    router::FetchJob,
    session::{PlaybackSession, Ticket},
    source::SourceRef,
};

/// Where a command came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Origin {
    /// Text channel replies go to.
    pub text_channel: String,
    /// Voice channel the requester is in, if any.
    pub voice_channel: Option<String>,
}

/// A chat message for the transport to deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub channel: String,
    pub text: String,
}

pub enum Message {
    Command {
        command: Command,
        origin: Origin,
    },
    Fetched {
        job: FetchJob,
        result: std::result::Result<PathBuf, FetchError>,
    },
    TrackFinished {
        ticket: Ticket,
        source: SourceRef,
        path: PathBuf,
        error: Option<BotError>,
    },
    Shutdown,
}

/// Cloneable entry point into the controller's mailbox.
#[derive(Clone)]
pub struct ControllerHandle {
    tx: UnboundedSender<Message>,
}

impl ControllerHandle {
    pub fn submit(&self, command: Command, origin: Origin) -> Result<()> {
        self.tx
            .send(Message::Command { command, origin })
            .map_err(|_| BotError::ControllerClosed)
    }

    /// Asks the controller to disconnect and exit.
    pub fn shutdown(&self) -> Result<()> {
        self.tx
            .send(Message::Shutdown)
            .map_err(|_| BotError::ControllerClosed)
    }
}

pub struct Controller {
    pub(crate) session: PlaybackSession,
    pub(crate) fetcher: Arc<dyn Fetcher>,
    prefix: String,
    mailbox: UnboundedReceiver<Message>,
    pub(crate) sender: UnboundedSender<Message>,
    replies: UnboundedSender<Reply>,
    /// Origin of the request that started the current run of tracks.
    pub(crate) last_origin: Option<Origin>,
}

impl Controller {
    pub fn new(
        session: PlaybackSession,
        fetcher: Arc<dyn Fetcher>,
        prefix: impl Into<String>,
        replies: UnboundedSender<Reply>,
    ) -> (Self, ControllerHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let controller = Self {
            session,
            fetcher,
            prefix: prefix.into(),
            mailbox: rx,
            sender: tx.clone(),
            replies,
            last_origin: None,
        };
        (controller, ControllerHandle { tx })
    }

    pub fn session(&self) -> &PlaybackSession {
        &self.session
    }

    /// Processes messages until shutdown.
    pub async fn run(mut self) {
        info!("Controller started");
        while self.step().await {}
        info!("Controller finished");
    }

    /// Waits for the next message and handles it. Returns `false` on shutdown.
    pub async fn step(&mut self) -> bool {
        match self.mailbox.recv().await {
            Some(Message::Shutdown) | None => {
                self.shutdown().await;
                false
            }
            Some(message) => {
                self.handle(message).await;
                true
            }
        }
    }

    async fn handle(&mut self, message: Message) {
        match message {
            Message::Command { command, origin } => self.handle_command(command, origin).await,
            Message::Fetched { job, result } => self.on_fetched(job, result).await,
            Message::TrackFinished {
                ticket,
                source,
                path,
                error,
            } => self.on_track_finished(ticket, source, path, error).await,
            Message::Shutdown => {}
        }
    }

    async fn handle_command(&mut self, command: Command, origin: Origin) {
        debug!("Handling {:?} from '{}'", command, origin.text_channel);
        let channel = origin.text_channel.as_str();
        match command {
            Command::Play(link) if link.is_empty() => {
                let usage = format!("Please provide a YouTube link after `{}play`.", self.prefix);
                self.reply(channel, usage);
            }
            Command::Play(link) => {
                if let Err(e) = self.handle_play_request(&link, &origin).await {
                    warn!("Rejected play request for '{}': {}", link, e);
                    self.reply(channel, e.to_string());
                }
            }
            Command::Queue => {
                let text = self.queue_listing();
                self.reply(channel, text);
            }
            Command::Skip => match self.session.skip() {
                Ok(source) => {
                    info!("Skipping {}", source);
                    self.reply(channel, "Skipping the track...");
                }
                Err(e) => self.reply(channel, e.to_string()),
            },
            Command::Stop => match self.session.stop().await {
                Ok(()) => {
                    info!("Stopped playback and cleared the queue");
                    self.reply(channel, "Disconnected.");
                }
                Err(e) => self.reply(channel, e.to_string()),
            },
            Command::Clear => {
                self.session.queue_mut().clear();
                self.reply(channel, "The queue has been cleared.");
            }
            Command::Pause => match self.session.pause() {
                Ok(()) => self.reply(channel, "Playback paused."),
                Err(e) => self.reply(channel, e.to_string()),
            },
            Command::Resume => match self.session.resume() {
                Ok(()) => self.reply(channel, "Playback resumed."),
                Err(e) => self.reply(channel, e.to_string()),
            },
            Command::Help => {
                let help = command::help_text(&self.prefix);
                self.reply(channel, help);
            }
            Command::Unknown(name) => {
                debug!("Unknown command '{}'", name);
                let text = command::unknown_text(&self.prefix);
                self.reply(channel, text);
            }
        }
    }

    fn queue_listing(&self) -> String {
        let pending = self.session.queue().snapshot();
        if pending.is_empty() {
            return "The queue is empty.".to_string();
        }
        let mut text = String::from("Queue:");
        for (i, source) in pending.iter().enumerate() {
            text.push_str(&format!("\n{}. {}", i + 1, source));
        }
        text
    }

    async fn on_track_finished(
        &mut self,
        ticket: Ticket,
        source: SourceRef,
        path: PathBuf,
        error: Option<BotError>,
    ) {
        let current = self.session.finish(ticket, &path);
        if let Some(e) = error {
            error!("Playback of {} failed: {}", source, e);
            if current {
                let text = match e {
                    BotError::Playback(_) => e.to_string(),
                    other => BotError::Playback(other.to_string()).to_string(),
                };
                let channel = self.announce_channel();
                self.reply(&channel, text);
            }
        } else {
            info!("Finished playback of {}", source);
        }
        if current {
            self.advance().await;
        }
    }

    /// Starts the next playable queue entry, or leaves once the queue is empty.
    pub(crate) async fn advance(&mut self) {
        let origin = self.last_origin.clone().unwrap_or_default();
        while let Some(next) = self.session.queue_mut().dequeue() {
            let ticket = self.session.begin_loading();
            let generation = self.session.generation();
            let job = FetchJob::advance(next, origin.clone(), ticket, generation);
            let Some(path) = self.resolve(&job) else {
                // The download reports back through the mailbox.
                return;
            };
            match self.start_track(ticket, job.source, path, &origin) {
                Ok(()) => return,
                Err(e) => {
                    self.session.cancel_loading(ticket);
                    error!("Could not start queued track: {}", e);
                    self.reply(&origin.text_channel, e.to_string());
                }
            }
        }
        info!("Queue finished");
        self.reply(&origin.text_channel, "Queue finished.");
        if let Err(e) = self.session.disconnect().await {
            warn!("Error leaving the voice channel: {}", e);
        }
    }

    async fn shutdown(&mut self) {
        info!("Shutting down controller");
        match self.session.stop().await {
            Ok(()) | Err(BotError::NotConnected) => {}
            Err(e) => warn!("Error during voice disconnect: {}", e),
        }
    }

    fn announce_channel(&self) -> String {
        self.last_origin
            .as_ref()
            .map(|origin| origin.text_channel.clone())
            .unwrap_or_default()
    }

    pub(crate) fn reply(&self, channel: &str, text: impl Into<String>) {
        let reply = Reply {
            channel: channel.to_string(),
            text: text.into(),
        };
        if self.replies.send(reply).is_err() {
            debug!("Reply dropped, transport is gone");
        }
    }
}
