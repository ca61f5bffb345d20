//! Decoding a downloaded file into paced PCM frames.
//!
//! The file is decoded with symphonia, mixed to the output channel count,
//! resampled with rubato when the rates differ, cut into fixed-duration
//! i16 frames and handed to a [`FrameSink`] at real-time speed.

use std::{
    fs::{File, OpenOptions},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering},
    thread,
    time::{Duration, Instant},
};

use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};
use symphonia::core::{
    audio::SampleBuffer,
    codecs::{DecoderOptions, CODEC_TYPE_NULL},
    errors::Error as SymphoniaError,
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};
use tracing::{debug, info, warn};

use crate::{
    config::Config,
    error::{BotError, Result},
};

/// Input frames handed to the resampler per call.
const RESAMPLER_CHUNK: usize = 1024;

/// Shape of the PCM stream sent to the voice channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputFormat {
    pub sample_rate: u32,
    pub channels: usize,
    pub frame_ms: u32,
}

impl OutputFormat {
    pub fn from_config(config: &Config) -> Self {
        Self {
            sample_rate: config.sample_rate,
            channels: config.channels,
            frame_ms: config.frame_ms,
        }
    }

    /// Interleaved samples per frame.
    pub fn frame_samples(&self) -> usize {
        (self.sample_rate as usize * self.frame_ms as usize / 1000) * self.channels
    }

    pub fn frame_duration(&self) -> Duration {
        Duration::from_millis(u64::from(self.frame_ms))
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            channels: 1,
            frame_ms: 20,
        }
    }
}

/// Receives interleaved i16 frames.
pub trait FrameSink: Send {
    fn write_frame(&mut self, frame: &[i16]) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Drops every frame. Playback still runs at real-time pace.
pub struct NullSink;

impl FrameSink for NullSink {
    fn write_frame(&mut self, _frame: &[i16]) -> io::Result<()> {
        Ok(())
    }
}

/// Writes frames as raw little-endian s16 PCM.
pub struct PcmWriterSink<W: Write + Send> {
    writer: W,
    bytes: Vec<u8>,
}

impl<W: Write + Send> PcmWriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            bytes: Vec::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send> FrameSink for PcmWriterSink<W> {
    fn write_frame(&mut self, frame: &[i16]) -> io::Result<()> {
        self.bytes.clear();
        for sample in frame {
            self.bytes.extend_from_slice(&sample.to_le_bytes());
        }
        self.writer.write_all(&self.bytes)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Where decoded audio goes. A fresh sink is opened for every track.
#[derive(Debug, Clone, Default)]
pub enum AudioOutput {
    #[default]
    Discard,
    /// Append raw PCM to a file or FIFO.
    Pcm(PathBuf),
}

impl AudioOutput {
    pub fn from_config(config: &Config) -> Self {
        match &config.pcm_output {
            Some(path) => AudioOutput::Pcm(path.clone()),
            None => AudioOutput::Discard,
        }
    }

    pub fn open(&self) -> io::Result<Box<dyn FrameSink>> {
        match self {
            AudioOutput::Discard => Ok(Box::new(NullSink)),
            AudioOutput::Pcm(path) => {
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                Ok(Box::new(PcmWriterSink::new(BufWriter::new(file))))
            }
        }
    }
}

/// Flags shared between the voice connection and the streaming thread.
#[derive(Debug, Default)]
pub struct PlayerControl {
    paused: AtomicBool,
    stopped: AtomicBool,
    finished: AtomicBool,
}

impl PlayerControl {
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::SeqCst);
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn mark_finished(&self) {
        self.finished.store(true, Ordering::SeqCst);
    }
}

/// Sleeps so frames leave at the rate they play back.
struct Pacer {
    frame: Duration,
    started: Instant,
    sent: u32,
}

impl Pacer {
    fn new(frame: Duration) -> Self {
        Self {
            frame,
            started: Instant::now(),
            sent: 0,
        }
    }

    fn wait(&mut self) {
        self.sent += 1;
        let due = self.started + self.frame * self.sent;
        let now = Instant::now();
        if due > now {
            thread::sleep(due - now);
        }
    }

    fn restart(&mut self) {
        self.started = Instant::now();
        self.sent = 0;
    }
}

/// Mixes, resamples and frames decoded audio.
struct FramePipeline {
    format: OutputFormat,
    resampler: Option<SincFixedIn<f32>>,
    pending: Vec<Vec<f32>>,
    interleaved: Vec<i16>,
}

impl FramePipeline {
    fn new(input_rate: u32, format: OutputFormat) -> Result<Self> {
        let resampler = if input_rate != format.sample_rate {
            info!(
                "Resampling required: Input {}Hz -> Target {}Hz/{}ch",
                input_rate, format.sample_rate, format.channels
            );
            let params = SincInterpolationParameters {
                sinc_len: 128,
                f_cutoff: 0.95,
                oversampling_factor: 128,
                interpolation: SincInterpolationType::Linear,
                window: WindowFunction::BlackmanHarris2,
            };
            Some(SincFixedIn::<f32>::new(
                f64::from(format.sample_rate) / f64::from(input_rate),
                2.0,
                params,
                RESAMPLER_CHUNK,
                format.channels,
            )?)
        } else {
            debug!("Input rate matches target rate, no resampling needed");
            None
        };
        Ok(Self {
            format,
            resampler,
            pending: vec![Vec::new(); format.channels],
            interleaved: Vec::new(),
        })
    }

    /// Accepts interleaved f32 samples with `in_channels` channels.
    fn push(&mut self, samples: &[f32], in_channels: usize) -> Result<()> {
        if in_channels == 0 {
            return Ok(());
        }
        let out_channels = self.format.channels;
        for frame in samples.chunks_exact(in_channels) {
            if out_channels == 1 {
                let mixed = frame.iter().sum::<f32>() / in_channels as f32;
                self.pending[0].push(mixed);
            } else {
                for (c, lane) in self.pending.iter_mut().enumerate() {
                    lane.push(frame[c.min(in_channels - 1)]);
                }
            }
        }
        self.drain(false)
    }

    /// Moves pending samples through the resampler into `interleaved`.
    fn drain(&mut self, at_end: bool) -> Result<()> {
        let Some(resampler) = self.resampler.as_mut() else {
            let lanes = std::mem::replace(&mut self.pending, vec![Vec::new(); self.format.channels]);
            interleave_into(&lanes, &mut self.interleaved);
            return Ok(());
        };

        loop {
            let needed = resampler.input_frames_next();
            let available = self.pending[0].len();
            if available >= needed {
                let chunk: Vec<&[f32]> = self.pending.iter().map(|lane| &lane[..needed]).collect();
                let out = resampler.process(&chunk, None)?;
                interleave_into(&out, &mut self.interleaved);
                for lane in &mut self.pending {
                    lane.drain(..needed);
                }
            } else {
                if at_end && available > 0 {
                    let chunk: Vec<&[f32]> = self.pending.iter().map(|lane| lane.as_slice()).collect();
                    let out = resampler.process_partial(Some(chunk.as_slice()), None)?;
                    interleave_into(&out, &mut self.interleaved);
                    for lane in &mut self.pending {
                        lane.clear();
                    }
                }
                return Ok(());
            }
        }
    }

    /// Pops one full frame, if available.
    fn next_frame(&mut self) -> Option<Vec<i16>> {
        let size = self.format.frame_samples();
        if self.interleaved.len() < size {
            return None;
        }
        Some(self.interleaved.drain(..size).collect())
    }

    /// The leftover samples padded with silence to a whole frame.
    fn last_frame(&mut self) -> Option<Vec<i16>> {
        if self.interleaved.is_empty() {
            return None;
        }
        let mut frame: Vec<i16> = self.interleaved.drain(..).collect();
        frame.resize(self.format.frame_samples(), 0);
        Some(frame)
    }
}

fn interleave_into(lanes: &[Vec<f32>], out: &mut Vec<i16>) {
    let frames = lanes.first().map_or(0, Vec::len);
    out.reserve(frames * lanes.len());
    for i in 0..frames {
        for lane in lanes {
            out.push((lane[i].clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16);
        }
    }
}

/// Sends one frame, then honours pause and stop requests.
///
/// Returns `false` once playback was stopped.
fn emit(
    frame: &[i16],
    sink: &mut dyn FrameSink,
    pacer: &mut Pacer,
    control: &PlayerControl,
) -> Result<bool> {
    sink.write_frame(frame)?;
    pacer.wait();
    if control.is_paused() {
        debug!("Playback paused");
        while control.is_paused() && !control.is_stopped() {
            thread::sleep(pacer.frame);
        }
        pacer.restart();
    }
    Ok(!control.is_stopped())
}

/// Streams `path` into `sink` until it ends or `control` is stopped.
///
/// Blocks the calling thread for the duration of the track.
pub fn stream_file(
    path: &Path,
    format: OutputFormat,
    sink: &mut dyn FrameSink,
    control: &PlayerControl,
) -> Result<()> {
    let source = Box::new(File::open(path)?);
    let mss = MediaSourceStream::new(source, Default::default());
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut reader = probed.format;

    let track = reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL && t.codec_params.sample_rate.is_some())
        .ok_or_else(|| BotError::AudioProcessing("No supported audio track found".to_string()))?;
    let track_id = track.id;
    let params = track.codec_params.clone();
    let input_rate = params
        .sample_rate
        .ok_or_else(|| BotError::AudioProcessing("Missing sample rate".to_string()))?;

    let mut decoder = symphonia::default::get_codecs().make(&params, &DecoderOptions::default())?;
    let mut pipeline = FramePipeline::new(input_rate, format)?;
    let mut pacer = Pacer::new(format.frame_duration());

    info!("Streaming {:?} ({}Hz source)", path, input_rate);

    loop {
        if control.is_stopped() {
            debug!("Stop requested for {:?}", path);
            sink.flush()?;
            return Ok(());
        }

        let packet = match reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref err)) if err.kind() == io::ErrorKind::UnexpectedEof => {
                debug!("Reached end of audio stream");
                break;
            }
            Err(SymphoniaError::ResetRequired) => {
                warn!("Decoder reset required, ending track early");
                break;
            }
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                let mut samples = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                samples.copy_interleaved_ref(decoded);
                pipeline.push(samples.samples(), spec.channels.count())?;
            }
            Err(SymphoniaError::DecodeError(e)) => {
                warn!("Recoverable decode error: {}", e);
                continue;
            }
            Err(e) => return Err(e.into()),
        }

        while let Some(frame) = pipeline.next_frame() {
            if !emit(&frame, sink, &mut pacer, control)? {
                sink.flush()?;
                return Ok(());
            }
        }
    }

    pipeline.drain(true)?;
    while let Some(frame) = pipeline.next_frame() {
        if !emit(&frame, sink, &mut pacer, control)? {
            sink.flush()?;
            return Ok(());
        }
    }
    if let Some(frame) = pipeline.last_frame() {
        emit(&frame, sink, &mut pacer, control)?;
    }
    sink.flush()?;
    Ok(())
}
