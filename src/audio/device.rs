// Live microphone and speaker through cpal
//
// A cpal stream is not Send on every platform, so each one is built and
// kept on its own thread. The thread holds the stream until its stop
// channel fires or the owning device is dropped.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::backend::{AudioFrame, CaptureBackend, CaptureConfig};
use super::codec::PcmBuffer;
use super::file::resample_linear;
use super::playback::{OutputDevice, SegmentId};
use crate::error::{CaptureError, PlaybackError};

// ============================================================================
// Stream threads
// ============================================================================

struct StreamThread {
    stop: std_mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl StreamThread {
    /// Build a stream on a fresh thread. The receiver resolves once the
    /// stream is playing or failed to start.
    fn spawn<T, E, F>(build: F) -> (Self, oneshot::Receiver<Result<T, E>>)
    where
        F: FnOnce() -> Result<(Stream, T), E> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop, stop_rx) = std_mpsc::channel::<()>();

        let handle = std::thread::spawn(move || match build() {
            Ok((stream, value)) => {
                if ready_tx.send(Ok(value)).is_ok() {
                    // Returns on stop or when the sender is dropped
                    let _ = stop_rx.recv();
                }
                drop(stream);
            }
            Err(e) => {
                let _ = ready_tx.send(Err(e));
            }
        });

        (Self { stop, handle }, ready_rx)
    }

    fn stop(self) {
        let _ = self.stop.send(());
        if self.handle.join().is_err() {
            warn!("Audio stream thread panicked");
        }
    }
}

// ============================================================================
// Capture
// ============================================================================

/// Cuts a live sample stream into fixed-size mono frames at the capture rate
pub struct FrameChunker {
    native_rate: u32,
    config: CaptureConfig,
    pending: Vec<f32>,
    emitted: u64,
}

impl FrameChunker {
    pub fn new(native_rate: u32, config: CaptureConfig) -> Self {
        Self {
            native_rate,
            pending: Vec::with_capacity(config.frame_size * 2),
            config,
            emitted: 0,
        }
    }

    /// Feed interleaved device samples; returns every frame they complete
    pub fn push(&mut self, interleaved: &[f32], channels: usize) -> Vec<AudioFrame> {
        let channels = channels.max(1);
        let mono: Vec<f32> = interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect();
        if mono.is_empty() {
            return Vec::new();
        }

        if self.native_rate == self.config.sample_rate {
            self.pending.extend_from_slice(&mono);
        } else {
            self.pending.extend(resample_linear(
                &mono,
                self.native_rate,
                self.config.sample_rate,
            ));
        }

        let frame_size = self.config.frame_size;
        let mut frames = Vec::new();
        while self.pending.len() >= frame_size {
            let samples: Vec<f32> = self.pending.drain(..frame_size).collect();
            frames.push(AudioFrame {
                samples,
                sample_rate: self.config.sample_rate,
                channels: 1,
                timestamp_ms: self.emitted * frame_size as u64 * 1000
                    / self.config.sample_rate as u64,
            });
            self.emitted += 1;
        }
        frames
    }
}

/// Capture backend reading the system microphone
pub struct CpalCaptureBackend {
    device_name: Option<String>,
    config: CaptureConfig,
    stream: Option<StreamThread>,
}

impl CpalCaptureBackend {
    /// `device_name` of `None` picks the host's default input
    pub fn new(device_name: Option<String>, config: CaptureConfig) -> Self {
        Self {
            device_name,
            config,
            stream: None,
        }
    }
}

#[async_trait::async_trait]
impl CaptureBackend for CpalCaptureBackend {
    async fn open(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError> {
        if self.stream.is_some() {
            return Err(CaptureError::AlreadyStreaming);
        }
        self.config.validate()?;

        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let device_name = self.device_name.clone();
        let config = self.config.clone();

        let (thread, ready) =
            StreamThread::spawn(move || build_capture_stream(device_name.as_deref(), config, tx));

        match ready.await {
            Ok(Ok(native_rate)) => {
                info!(
                    "Microphone open at {}Hz, framing {} samples at {}Hz",
                    native_rate, self.config.frame_size, self.config.sample_rate
                );
                self.stream = Some(thread);
                Ok(rx)
            }
            Ok(Err(e)) => {
                thread.stop();
                Err(e)
            }
            Err(_) => {
                thread.stop();
                Err(CaptureError::DeviceUnavailable(
                    "capture thread exited before the stream started".to_string(),
                ))
            }
        }
    }

    async fn close(&mut self) {
        if let Some(thread) = self.stream.take() {
            thread.stop();
            info!("Microphone released");
        }
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    fn name(&self) -> &str {
        self.device_name.as_deref().unwrap_or("default microphone")
    }
}

fn build_capture_stream(
    device_name: Option<&str>,
    config: CaptureConfig,
    frames: mpsc::Sender<AudioFrame>,
) -> Result<(Stream, u32), CaptureError> {
    let host = cpal::default_host();

    let device = match device_name {
        Some(name) => host
            .input_devices()
            .map_err(|e| {
                CaptureError::DeviceUnavailable(format!("failed to enumerate input devices: {}", e))
            })?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| CaptureError::DeviceUnavailable(format!("input device not found: {}", name)))?,
        None => host
            .default_input_device()
            .ok_or_else(|| CaptureError::DeviceUnavailable("no default input device".to_string()))?,
    };

    let supported = device.default_input_config().map_err(|e| {
        CaptureError::DeviceUnavailable(format!("failed to read input config: {}", e))
    })?;
    let sample_format = supported.sample_format();
    let stream_config: StreamConfig = supported.config();
    let native_rate = stream_config.sample_rate.0;

    debug!(
        "Input config: {}Hz, {} channels, {:?}",
        native_rate, stream_config.channels, sample_format
    );

    let chunker = FrameChunker::new(native_rate, config);
    let stream = match sample_format {
        SampleFormat::F32 => input_stream::<f32>(&device, &stream_config, chunker, frames)?,
        SampleFormat::I16 => input_stream::<i16>(&device, &stream_config, chunker, frames)?,
        SampleFormat::U16 => input_stream::<u16>(&device, &stream_config, chunker, frames)?,
        other => {
            return Err(CaptureError::DeviceUnavailable(format!(
                "unsupported input sample format: {:?}",
                other
            )))
        }
    };

    stream.play().map_err(|e| {
        CaptureError::PermissionDenied(format!("failed to start input stream: {}", e))
    })?;

    Ok((stream, native_rate))
}

fn input_stream<T>(
    device: &cpal::Device,
    stream_config: &StreamConfig,
    mut chunker: FrameChunker,
    frames: mpsc::Sender<AudioFrame>,
) -> Result<Stream, CaptureError>
where
    T: SizedSample + Send + 'static,
    f32: FromSample<T>,
{
    let channels = stream_config.channels as usize;

    device
        .build_input_stream(
            stream_config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                let samples: Vec<f32> = data.iter().map(|&s| f32::from_sample(s)).collect();
                for frame in chunker.push(&samples, channels) {
                    if frames.try_send(frame).is_err() {
                        debug!("Capture channel full or closed, dropping frame");
                    }
                }
            },
            |err| error!("Audio input stream error: {}", err),
            None,
        )
        .map_err(|e| CaptureError::PermissionDenied(format!("failed to build input stream: {}", e)))
}

// ============================================================================
// Output
// ============================================================================

struct MixSegment {
    id: SegmentId,
    start_frame: u64,
    samples: Vec<f32>,
}

impl MixSegment {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

/// Sums scheduled mono segments into device-sized blocks
#[derive(Default)]
pub struct SegmentMixer {
    segments: Vec<MixSegment>,
}

impl SegmentMixer {
    pub fn add(&mut self, id: SegmentId, start_frame: u64, samples: Vec<f32>) {
        self.segments.push(MixSegment {
            id,
            start_frame,
            samples,
        });
    }

    /// Drop a segment; false when it already finished
    pub fn remove(&mut self, id: SegmentId) -> bool {
        let before = self.segments.len();
        self.segments.retain(|s| s.id != id);
        self.segments.len() != before
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Add every segment overlapping `first_frame..first_frame + out.len()`
    /// into `out`. Segments that end inside the block are forgotten.
    pub fn render(&mut self, first_frame: u64, out: &mut [f32]) {
        let end_frame = first_frame + out.len() as u64;

        for segment in &self.segments {
            let from = segment.start_frame.max(first_frame);
            let to = segment.end_frame().min(end_frame);
            for frame in from..to {
                out[(frame - first_frame) as usize] +=
                    segment.samples[(frame - segment.start_frame) as usize];
            }
        }

        self.segments.retain(|s| s.end_frame() > end_frame);
    }
}

#[derive(Default)]
struct OutputShared {
    mixer: Mutex<SegmentMixer>,
    frames_played: AtomicU64,
}

impl OutputShared {
    fn mixer(&self) -> MutexGuard<'_, SegmentMixer> {
        self.mixer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Output device playing through the system speaker
///
/// The clock counts frames the stream callback has handed to the device, so
/// it starts at zero and stands still while the device is starved.
pub struct CpalOutputDevice {
    shared: Arc<OutputShared>,
    sample_rate: u32,
    next_id: SegmentId,
    stream: Option<StreamThread>,
}

impl CpalOutputDevice {
    /// Open `device_name`, or the host's default output when `None`
    pub async fn open(device_name: Option<String>) -> Result<Self, PlaybackError> {
        let shared = Arc::new(OutputShared::default());
        let callback_shared = Arc::clone(&shared);

        let (thread, ready) = StreamThread::spawn(move || {
            build_output_stream(device_name.as_deref(), callback_shared)
        });

        match ready.await {
            Ok(Ok(sample_rate)) => {
                info!("Audio output open at {}Hz", sample_rate);
                Ok(Self {
                    shared,
                    sample_rate,
                    next_id: 0,
                    stream: Some(thread),
                })
            }
            Ok(Err(e)) => {
                thread.stop();
                Err(e)
            }
            Err(_) => {
                thread.stop();
                Err(PlaybackError::Device(
                    "output thread exited before the stream started".to_string(),
                ))
            }
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Stop the stream; later `start` calls fail
    pub fn close(&mut self) {
        if let Some(thread) = self.stream.take() {
            thread.stop();
            info!("Audio output closed");
        }
    }
}

impl OutputDevice for CpalOutputDevice {
    fn current_time(&self) -> f64 {
        self.shared.frames_played.load(Ordering::Acquire) as f64 / self.sample_rate as f64
    }

    fn start(&mut self, buffer: &PcmBuffer, at: f64) -> Result<SegmentId, PlaybackError> {
        if self.stream.is_none() {
            return Err(PlaybackError::Device("output stream is closed".to_string()));
        }

        let mono = buffer.downmix();
        let samples = if buffer.sample_rate == self.sample_rate || mono.is_empty() {
            mono
        } else {
            resample_linear(&mono, buffer.sample_rate, self.sample_rate)
        };

        let start_frame = (at.max(0.0) * self.sample_rate as f64).round() as u64;
        self.next_id += 1;
        let id = self.next_id;
        self.shared.mixer().add(id, start_frame, samples);

        Ok(id)
    }

    fn stop(&mut self, id: SegmentId) {
        if !self.shared.mixer().remove(id) {
            debug!("Segment {} already finished", id);
        }
    }
}

fn build_output_stream(
    device_name: Option<&str>,
    shared: Arc<OutputShared>,
) -> Result<(Stream, u32), PlaybackError> {
    let host = cpal::default_host();

    let device = match device_name {
        Some(name) => host
            .output_devices()
            .map_err(|e| PlaybackError::Device(format!("failed to enumerate output devices: {}", e)))?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .ok_or_else(|| PlaybackError::Device(format!("output device not found: {}", name)))?,
        None => host
            .default_output_device()
            .ok_or_else(|| PlaybackError::Device("no default output device".to_string()))?,
    };

    let supported = device
        .default_output_config()
        .map_err(|e| PlaybackError::Device(format!("failed to read output config: {}", e)))?;
    let sample_format = supported.sample_format();
    let stream_config: StreamConfig = supported.config();

    debug!(
        "Output config: {}Hz, {} channels, {:?}",
        stream_config.sample_rate.0, stream_config.channels, sample_format
    );

    let stream = match sample_format {
        SampleFormat::F32 => output_stream::<f32>(&device, &stream_config, shared)?,
        SampleFormat::I16 => output_stream::<i16>(&device, &stream_config, shared)?,
        SampleFormat::U16 => output_stream::<u16>(&device, &stream_config, shared)?,
        other => {
            return Err(PlaybackError::Device(format!(
                "unsupported output sample format: {:?}",
                other
            )))
        }
    };

    stream
        .play()
        .map_err(|e| PlaybackError::Device(format!("failed to start output stream: {}", e)))?;

    Ok((stream, stream_config.sample_rate.0))
}

fn output_stream<T>(
    device: &cpal::Device,
    stream_config: &StreamConfig,
    shared: Arc<OutputShared>,
) -> Result<Stream, PlaybackError>
where
    T: SizedSample + FromSample<f32> + Send + 'static,
{
    let channels = (stream_config.channels as usize).max(1);
    let mut block: Vec<f32> = Vec::new();

    device
        .build_output_stream(
            stream_config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let frames = data.len() / channels;
                block.clear();
                block.resize(frames, 0.0);

                let first_frame = shared.frames_played.load(Ordering::Acquire);
                shared.mixer().render(first_frame, &mut block);

                for (frame, &sample) in data.chunks_mut(channels).zip(&block) {
                    frame.fill(T::from_sample(sample.clamp(-1.0, 1.0)));
                }
                shared
                    .frames_played
                    .fetch_add(frames as u64, Ordering::Release);
            },
            |err| error!("Audio output stream error: {}", err),
            None,
        )
        .map_err(|e| PlaybackError::Device(format!("failed to build output stream: {}", e)))
}
