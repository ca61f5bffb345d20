#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use tempfile::TempDir;
use tod_jukebox::{
    BotError, CompletionHook, Controller, ControllerHandle, Command, FetchError, Fetcher, Origin,
    PlaybackSession, Reply, Result, SourceRef, TrackCache, TrackQueue, VoiceConnection,
};
use tokio::sync::mpsc::{self, UnboundedReceiver};

/// Voice connection that records calls and lets tests end tracks.
#[derive(Default)]
pub struct VoiceLog {
    pub events: Vec<String>,
    pub channel: Option<String>,
    pub hook: Option<CompletionHook>,
    pub playing: Option<PathBuf>,
    pub paused: bool,
    pub refuse_connect: bool,
}

/// Clones share the log; the channel belongs to the copy the session owns.
#[derive(Clone, Default)]
pub struct FakeVoice {
    pub log: Arc<Mutex<VoiceLog>>,
    channel: Option<String>,
}

impl FakeVoice {
    pub fn events(&self) -> Vec<String> {
        self.log.lock().unwrap().events.clone()
    }

    pub fn connected_to(&self) -> Option<String> {
        self.log.lock().unwrap().channel.clone()
    }

    pub fn playing(&self) -> Option<PathBuf> {
        self.log.lock().unwrap().playing.clone()
    }

    /// Ends the current track as if it had played to the end.
    pub fn finish_track(&self) {
        self.end_track(None);
    }

    /// Ends the current track with a streaming error.
    pub fn fail_track(&self, reason: &str) {
        self.end_track(Some(BotError::Playback(reason.to_string())));
    }

    fn end_track(&self, error: Option<BotError>) {
        let hook = {
            let mut log = self.log.lock().unwrap();
            log.playing = None;
            log.paused = false;
            log.hook.take()
        };
        let hook = hook.expect("no track is playing");
        std::thread::spawn(move || hook(error)).join().unwrap();
    }

    fn fire_stop(&self) {
        let hook = {
            let mut log = self.log.lock().unwrap();
            log.playing = None;
            log.paused = false;
            log.hook.take()
        };
        if let Some(hook) = hook {
            std::thread::spawn(move || hook(None)).join().unwrap();
        }
    }
}

#[async_trait]
impl VoiceConnection for FakeVoice {
    async fn connect(&mut self, channel: &str) -> Result<()> {
        let mut log = self.log.lock().unwrap();
        if log.refuse_connect {
            return Err(BotError::Connection("channel is full".to_string()));
        }
        log.events.push(format!("connect:{channel}"));
        log.channel = Some(channel.to_string());
        self.channel = Some(channel.to_string());
        Ok(())
    }

    async fn move_to(&mut self, channel: &str) -> Result<()> {
        let mut log = self.log.lock().unwrap();
        log.events.push(format!("move:{channel}"));
        log.channel = Some(channel.to_string());
        self.channel = Some(channel.to_string());
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.log.lock().unwrap().events.push("disconnect".to_string());
        self.fire_stop();
        self.log.lock().unwrap().channel = None;
        self.channel = None;
        Ok(())
    }

    fn channel(&self) -> Option<&str> {
        self.channel.as_deref()
    }

    fn play(&mut self, file: &Path, on_complete: CompletionHook) -> Result<()> {
        let mut log = self.log.lock().unwrap();
        log.events.push(format!(
            "play:{}",
            file.file_name().unwrap().to_string_lossy()
        ));
        log.playing = Some(file.to_path_buf());
        log.hook = Some(on_complete);
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        let mut log = self.log.lock().unwrap();
        log.events.push("pause".to_string());
        log.paused = true;
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        let mut log = self.log.lock().unwrap();
        log.events.push("resume".to_string());
        log.paused = false;
        Ok(())
    }

    fn stop(&mut self) {
        self.log.lock().unwrap().events.push("stop".to_string());
        self.fire_stop();
    }

    fn is_playing(&self) -> bool {
        let log = self.log.lock().unwrap();
        log.playing.is_some() && !log.paused
    }

    fn is_paused(&self) -> bool {
        let log = self.log.lock().unwrap();
        log.playing.is_some() && log.paused
    }
}

/// Fetcher that writes a small file per source and counts calls.
#[derive(Clone)]
pub struct FakeFetcher {
    dir: PathBuf,
    pub calls: Arc<Mutex<HashMap<String, usize>>>,
    pub failing: Arc<Mutex<HashSet<String>>>,
}

impl FakeFetcher {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            calls: Arc::default(),
            failing: Arc::default(),
        }
    }

    pub fn calls(&self, url: &str) -> usize {
        self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn fail(&self, url: &str) {
        self.failing.lock().unwrap().insert(url.to_string());
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, source: &SourceRef) -> std::result::Result<PathBuf, FetchError> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(source.as_str().to_string())
            .or_default() += 1;
        if self.failing.lock().unwrap().contains(source.as_str()) {
            return Err(FetchError::YouTube("video unavailable".to_string()));
        }
        let id = source.as_str().rsplit('/').next().unwrap_or("track");
        let path = self.dir.join(format!("{id}.m4a"));
        tokio::fs::write(&path, b"fake audio").await?;
        Ok(path)
    }
}

pub struct Harness {
    pub controller: Controller,
    pub handle: ControllerHandle,
    pub replies: UnboundedReceiver<Reply>,
    pub voice: FakeVoice,
    pub fetcher: FakeFetcher,
    pub dir: TempDir,
}

impl Harness {
    pub fn new(max_queue: usize) -> Self {
        Self::with_cached(max_queue, &[])
    }

    /// Starts with `(url, file name)` pairs already downloaded and cached.
    pub fn with_cached(max_queue: usize, cached: &[(&str, &str)]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let downloads = dir.path().join("downloads");
        std::fs::create_dir_all(&downloads).unwrap();

        let mut seed = TrackCache::load(dir.path().join("songs.json"));
        for (url, name) in cached {
            let path = downloads.join(name);
            std::fs::write(&path, b"cached audio").unwrap();
            seed.insert(SourceRef::parse(url).unwrap(), path).unwrap();
        }

        let voice = FakeVoice::default();
        let fetcher = FakeFetcher::new(&downloads);
        let session = PlaybackSession::new(
            TrackQueue::new(max_queue),
            TrackCache::load(dir.path().join("songs.json")),
            Box::new(voice.clone()),
        );
        let (reply_tx, replies) = mpsc::unbounded_channel();
        let (controller, handle) =
            Controller::new(session, Arc::new(fetcher.clone()), "!", reply_tx);

        Self {
            controller,
            handle,
            replies,
            voice,
            fetcher,
            dir,
        }
    }

    pub fn store(&self) -> PathBuf {
        self.dir.path().join("songs.json")
    }

    pub fn origin() -> Origin {
        Origin {
            text_channel: "music-text".to_string(),
            voice_channel: Some("general".to_string()),
        }
    }

    /// Sends a chat command and processes it.
    pub async fn command(&mut self, line: &str) {
        let command = Command::parse(line, "!").expect("not a command");
        self.handle.submit(command, Self::origin()).unwrap();
        assert!(self.controller.step().await);
    }

    /// Processes one queued message (a download result or completion).
    pub async fn step(&mut self) {
        assert!(self.controller.step().await);
    }

    pub fn drain_replies(&mut self) -> Vec<String> {
        let mut texts = Vec::new();
        while let Ok(reply) = self.replies.try_recv() {
            texts.push(reply.text);
        }
        texts
    }

    pub fn download(&self, name: &str) -> PathBuf {
        self.dir.path().join("downloads").join(name)
    }
}
