//! A chat bot that plays YouTube tracks into a voice channel, one at a time.
//!
//! Requests go through a single [`controller::Controller`] task that owns
//! the playback state, the bounded queue and the download cache.
//! Downloads and audio streaming run elsewhere and report back to it
//! through its mailbox.

pub mod audio;
pub mod cache;
pub mod command;
pub mod config;
pub mod console;
pub mod controller;
pub mod error;
pub mod fetch;
pub mod queue;
pub mod router;
pub mod session;
pub mod source;
pub mod voice;

pub use cache::TrackCache;
pub use command::Command;
pub use config::Config;
pub use controller::{Controller, ControllerHandle, Origin, Reply};
pub use error::{BotError, FetchError, Result};
pub use fetch::{Fetcher, YouTubeFetcher};
pub use queue::TrackQueue;
pub use session::{PlaybackSession, PlaybackState};
pub use source::SourceRef;
pub use voice::{CompletionHook, StreamingVoice, VoiceConnection};
