use std::{fs::OpenOptions, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use tod_jukebox::{
    audio::{AudioOutput, OutputFormat},
    console::{self, ConsoleTransport},
    Config, Controller, PlaybackSession, StreamingVoice, TrackCache, TrackQueue, YouTubeFetcher,
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::mpsc,
};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();
    init_tracing(&config)?;
    config.validate()?;

    tracing::info!("Loading track cache from {:?}", config.cache_file);
    let cache = TrackCache::load(&config.cache_file);
    tracing::info!("{} cached tracks", cache.len());

    let fetcher = YouTubeFetcher::from_config(&config)
        .with_context(|| format!("Failed to prepare download directory {:?}", config.download_dir))?;
    let voice = StreamingVoice::new(
        AudioOutput::from_config(&config),
        OutputFormat::from_config(&config),
    );
    tracing::info!(
        "Audio output: {:?} ({}Hz, {}ch, {}ms frames)",
        AudioOutput::from_config(&config),
        config.sample_rate,
        config.channels,
        config.frame_ms
    );

    let session = PlaybackSession::new(
        TrackQueue::new(config.max_queue_length),
        cache,
        Box::new(voice),
    );
    let (reply_tx, reply_rx) = mpsc::unbounded_channel();
    let (controller, handle) = Controller::new(
        session,
        Arc::new(fetcher),
        config.command_prefix.clone(),
        reply_tx,
    );

    let controller_task = tokio::spawn(controller.run());
    let printer_task = tokio::spawn(console::print_replies(reply_rx));
    let console = ConsoleTransport::new(config.command_prefix.clone(), config.voice_channel.clone());

    match &config.voice_channel {
        Some(channel) => tracing::info!("Console user is in voice channel '{}'", channel),
        None => tracing::warn!("No voice channel configured, play requests will be refused"),
    }

    // --- Main Event Loop ---
    tracing::info!("Entering main event loop. Type `{}help` for commands.", config.command_prefix);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if let Err(e) = console.dispatch(&line, &handle) {
                        tracing::error!("Error handling chat line: {}", e);
                        break;
                    }
                }
                Ok(None) => {
                    tracing::info!("Input closed, shutting down...");
                    break;
                }
                Err(e) => {
                    tracing::error!("Error reading input: {}", e);
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, initiating shutdown...");
                break;
            }
        }
    }

    // --- Disconnect Gracefully ---
    if let Err(e) = handle.shutdown() {
        tracing::warn!("Controller already stopped: {}", e);
    }
    drop(handle);
    controller_task.await.context("Controller task failed")?;
    printer_task.await.context("Reply printer failed")?;
    tracing::info!("Disconnected. Application exiting.");
    Ok(())
}

fn init_tracing(config: &Config) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "tod_jukebox=info".into());

    let file_layer = match &config.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {:?}", path))?;
            Some(fmt::layer().with_ansi(false).with_writer(Arc::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(())
}
