//! Play requests: validation, cache-or-fetch, and the play/enqueue decision.

use std::{path::PathBuf, sync::Arc};

use tracing::{debug, error, info, warn};

use crate::{
    controller::{Controller, Message, Origin},
    error::{BotError, FetchError, Result},
    queue::QueueFull,
    session::Ticket,
    source::SourceRef,
    voice::CompletionHook,
};

/// What to do with a track once its file is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// Play it as soon as it is ready.
    Start(Ticket),
    /// Next queue entry, picked by the completion path.
    Advance(Ticket),
    /// Append it to the queue.
    Enqueue,
}

/// A track on its way to a local file.
#[derive(Debug, Clone)]
pub struct FetchJob {
    pub(crate) source: SourceRef,
    pub(crate) origin: Origin,
    pub(crate) intent: Intent,
    /// Session generation when the request was accepted.
    pub(crate) generation: u64,
}

impl FetchJob {
    pub(crate) fn advance(
        source: SourceRef,
        origin: Origin,
        ticket: Ticket,
        generation: u64,
    ) -> Self {
        Self {
            source,
            origin,
            intent: Intent::Advance(ticket),
            generation,
        }
    }

    pub fn source(&self) -> &SourceRef {
        &self.source
    }

    pub fn intent(&self) -> Intent {
        self.intent
    }
}

impl Controller {
    /// Handles `play <link>`. Errors are rejections made before any side effect.
    pub(crate) async fn handle_play_request(&mut self, link: &str, origin: &Origin) -> Result<()> {
        let voice_channel = origin
            .voice_channel
            .as_deref()
            .ok_or(BotError::NotInVoiceChannel)?;
        let source = SourceRef::parse(link)?;

        if self.session.is_active() {
            let queue = self.session.queue();
            if queue.is_full() {
                return Err(BotError::QueueFull {
                    max: queue.capacity(),
                });
            }
            let job = FetchJob {
                source,
                origin: origin.clone(),
                intent: Intent::Enqueue,
                generation: self.session.generation(),
            };
            if let Some(path) = self.resolve(&job) {
                self.settle(job, path).await;
            }
            return Ok(());
        }

        self.session.join(voice_channel).await?;
        self.last_origin = Some(origin.clone());
        let ticket = self.session.begin_loading();
        let job = FetchJob {
            source,
            origin: origin.clone(),
            intent: Intent::Start(ticket),
            generation: self.session.generation(),
        };
        if let Some(path) = self.resolve(&job) {
            self.reply(&origin.text_channel, "Playing a previously downloaded track!");
            self.settle(job, path).await;
        }
        Ok(())
    }

    /// Returns the cached file for the job, or starts downloading it and
    /// returns `None`; the result then arrives as [`Message::Fetched`].
    pub(crate) fn resolve(&self, job: &FetchJob) -> Option<PathBuf> {
        if let Some(path) = self.session.cache().lookup(&job.source) {
            debug!("Cache hit for {}: {:?}", job.source, path);
            return Some(path);
        }

        let notice = match job.intent {
            Intent::Enqueue => "Downloading the track for the queue...",
            Intent::Start(_) | Intent::Advance(_) => "Downloading the track...",
        };
        self.reply(&job.origin.text_channel, notice);

        let fetcher = Arc::clone(&self.fetcher);
        let mailbox = self.sender.clone();
        let job = job.clone();
        tokio::spawn(async move {
            debug!("Fetching {}", job.source);
            let result = fetcher.fetch(&job.source).await;
            if mailbox.send(Message::Fetched { job, result }).is_err() {
                warn!("Controller is gone, dropping download result");
            }
        });
        None
    }

    pub(crate) async fn on_fetched(
        &mut self,
        job: FetchJob,
        result: std::result::Result<PathBuf, FetchError>,
    ) {
        let path = match result {
            Ok(path) => path,
            Err(e) => {
                error!("Download of {} failed: {}", job.source, e);
                self.reply(&job.origin.text_channel, BotError::from(e).to_string());
                let pending_start = match job.intent {
                    Intent::Start(ticket) | Intent::Advance(ticket) => self.session.is_loading(ticket),
                    Intent::Enqueue => false,
                };
                if pending_start {
                    self.abandon(job.intent).await;
                }
                return;
            }
        };

        if let Err(e) = self.session.cache_mut().insert(job.source.clone(), path.clone()) {
            warn!("Failed to persist cache entry for {}: {}", job.source, e);
        }
        self.settle(job, path).await;
    }

    /// Acts on a job whose file is ready.
    async fn settle(&mut self, job: FetchJob, path: PathBuf) {
        let FetchJob {
            source,
            origin,
            intent,
            generation,
        } = job;

        if intent == Intent::Enqueue && generation != self.session.generation() {
            info!("{} is downloaded, but playback was stopped meanwhile", source);
            let text = format!("Downloaded {}, but playback was stopped meanwhile.", source);
            self.reply(&origin.text_channel, text);
            return;
        }

        match intent {
            Intent::Start(ticket) | Intent::Advance(ticket) => {
                if !self.session.is_loading(ticket) {
                    info!("{} is ready, but playback was stopped meanwhile", source);
                    return;
                }
                if let Err(e) = self.start_track(ticket, source, path, &origin) {
                    error!("Could not start playback: {}", e);
                    self.reply(&origin.text_channel, e.to_string());
                    self.abandon(intent).await;
                }
            }
            Intent::Enqueue if self.session.is_active() => {
                let queue = self.session.queue_mut();
                match queue.try_enqueue(source.clone()) {
                    Ok(()) => {
                        let text = format!(
                            "Added to the queue ({}/{}): {}",
                            queue.len(),
                            queue.capacity(),
                            source
                        );
                        info!("Queued {}", source);
                        self.reply(&origin.text_channel, text);
                    }
                    Err(QueueFull) => {
                        let max = queue.capacity();
                        warn!("Queue filled up while {} was downloading", source);
                        self.reply(&origin.text_channel, BotError::QueueFull { max }.to_string());
                    }
                }
            }
            Intent::Enqueue => {
                // Everything ahead of it finished during the download.
                let Some(channel) = origin.voice_channel.clone() else {
                    self.reply(&origin.text_channel, BotError::NotInVoiceChannel.to_string());
                    return;
                };
                if let Err(e) = self.session.join(&channel).await {
                    self.reply(&origin.text_channel, e.to_string());
                    return;
                }
                self.last_origin = Some(origin.clone());
                let ticket = self.session.begin_loading();
                if let Err(e) = self.start_track(ticket, source, path, &origin) {
                    self.session.cancel_loading(ticket);
                    error!("Could not start playback: {}", e);
                    self.reply(&origin.text_channel, e.to_string());
                }
            }
        }
    }

    /// Gives up on a start attempt without stranding the queue behind it.
    async fn abandon(&mut self, intent: Intent) {
        match intent {
            Intent::Advance(ticket) => {
                self.session.cancel_loading(ticket);
                self.advance().await;
            }
            Intent::Start(ticket) => {
                self.session.cancel_loading(ticket);
                if !self.session.queue().is_empty() {
                    self.advance().await;
                }
            }
            Intent::Enqueue => {}
        }
    }

    /// Hands `path` to the voice connection; completion comes back as
    /// [`Message::TrackFinished`].
    pub(crate) fn start_track(
        &mut self,
        ticket: Ticket,
        source: SourceRef,
        path: PathBuf,
        origin: &Origin,
    ) -> Result<()> {
        let mailbox = self.sender.clone();
        let finished_source = source.clone();
        let finished_path = path.clone();
        let on_complete: CompletionHook = Box::new(move |error| {
            let finished = Message::TrackFinished {
                ticket,
                source: finished_source,
                path: finished_path,
                error,
            };
            if mailbox.send(finished).is_err() {
                debug!("Controller is gone, completion of {} dropped", ticket);
            }
        });

        self.session.start(ticket, source.clone(), path, on_complete)?;
        self.reply(&origin.text_channel, format!("Now playing: {}", source));
        Ok(())
    }
}
