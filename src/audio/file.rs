use anyhow::{Context, Result};
use hound::WavReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::backend::{AudioFrame, CaptureBackend, CaptureConfig};
use crate::error::CaptureError;

pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path).context("Failed to open WAV file")?;

        let spec = reader.spec();
        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Average all channels into normalized mono samples
    pub fn to_mono_f32(&self) -> Vec<f32> {
        let channels = self.channels.max(1) as usize;
        self.samples
            .chunks(channels)
            .map(|frame| {
                let sum: f32 = frame.iter().map(|&s| s as f32 / 32768.0).sum();
                sum / frame.len() as f32
            })
            .collect()
    }

    /// Mono samples at `target_rate`, linearly interpolated when the file
    /// rate differs
    pub fn mono_at_rate(&self, target_rate: u32) -> Vec<f32> {
        let mono = self.to_mono_f32();
        if self.sample_rate == target_rate || mono.is_empty() {
            return mono;
        }
        resample_linear(&mono, self.sample_rate, target_rate)
    }
}

pub(crate) fn resample_linear(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = (input.len() as f64 / ratio).floor() as usize;
    let last = input.len() - 1;

    (0..out_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let idx = pos.floor() as usize;
            let frac = (pos - idx as f64) as f32;
            let a = input[idx.min(last)];
            let b = input[(idx + 1).min(last)];
            a + (b - a) * frac
        })
        .collect()
}

/// Capture backend that plays a WAV file as if it were the microphone
///
/// The file is converted to mono at the configured rate and cut into
/// fixed-size frames; the last frame is zero-padded. When `paced` is set,
/// frames are released at real-time cadence.
pub struct WavFileBackend {
    path: PathBuf,
    config: CaptureConfig,
    paced: bool,
    running: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl WavFileBackend {
    pub fn new(path: impl Into<PathBuf>, config: CaptureConfig) -> Self {
        Self {
            path: path.into(),
            config,
            paced: true,
            running: Arc::new(AtomicBool::new(false)),
            task: None,
        }
    }

    /// Emit frames as fast as the receiver takes them
    pub fn unpaced(mut self) -> Self {
        self.paced = false;
        self
    }

    fn load_frames(&self) -> Result<Vec<Vec<f32>>, CaptureError> {
        if !self.path.exists() {
            return Err(CaptureError::DeviceUnavailable(format!(
                "no input at {}",
                self.path.display()
            )));
        }

        let audio = AudioFile::open(&self.path).map_err(|e| {
            let denied = e
                .chain()
                .filter_map(|cause| cause.downcast_ref::<hound::Error>())
                .any(|err| {
                    matches!(err, hound::Error::IoError(io)
                        if io.kind() == std::io::ErrorKind::PermissionDenied)
                });
            if denied {
                CaptureError::PermissionDenied(format!("{:#}", e))
            } else {
                CaptureError::DeviceUnavailable(format!("{:#}", e))
            }
        })?;

        let frame_size = self.config.frame_size;
        let frames = audio
            .mono_at_rate(self.config.sample_rate)
            .chunks(frame_size)
            .map(|chunk| {
                let mut frame = chunk.to_vec();
                frame.resize(frame_size, 0.0);
                frame
            })
            .collect();

        Ok(frames)
    }
}

#[async_trait::async_trait]
impl CaptureBackend for WavFileBackend {
    async fn open(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError> {
        if self.running.load(Ordering::SeqCst) {
            return Err(CaptureError::AlreadyStreaming);
        }

        self.config.validate()?;
        let frames = self.load_frames()?;
        info!(
            "WAV capture opened: {} ({} frames of {} samples)",
            self.path.display(),
            frames.len(),
            self.config.frame_size
        );

        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let running = Arc::clone(&self.running);
        running.store(true, Ordering::SeqCst);

        let sample_rate = self.config.sample_rate;
        let frame_ms = self.config.frame_duration().as_millis() as u64;
        let pace = self.paced.then(|| self.config.frame_duration());

        self.task = Some(tokio::spawn(async move {
            let mut ticker = pace.map(tokio::time::interval);

            for (index, samples) in frames.into_iter().enumerate() {
                if let Some(ticker) = ticker.as_mut() {
                    ticker.tick().await;
                }
                if !running.load(Ordering::SeqCst) {
                    break;
                }

                let frame = AudioFrame {
                    samples,
                    sample_rate,
                    channels: 1,
                    timestamp_ms: index as u64 * frame_ms,
                };

                if tx.send(frame).await.is_err() {
                    debug!("Capture receiver dropped, stopping WAV source");
                    break;
                }
            }

            running.store(false, Ordering::SeqCst);
            debug!("WAV source exhausted");
        }));

        Ok(rx)
    }

    async fn close(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(task) = self.task.take() {
            task.abort();
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!("WAV capture task failed: {}", e);
                }
            }
            info!("WAV capture closed: {}", self.path.display());
        }
    }

    fn is_open(&self) -> bool {
        self.task.is_some()
    }

    fn name(&self) -> &str {
        "WAV file"
    }
}
