// Headless output device: renders scheduled segments into a WAV timeline
//
// Segments are kept at their scheduled offsets. Stopping a segment truncates
// it at the stop time. `RenderedTimeline::write_wav` mixes everything down
// to 16-bit mono.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{info, warn};

use super::codec::PcmBuffer;
use super::playback::{OutputDevice, SegmentId};
use crate::error::PlaybackError;

#[derive(Debug, Clone)]
struct RenderedSegment {
    id: SegmentId,
    start_at: f64,
    samples: Vec<f32>,
    stopped_at: Option<f64>,
}

#[derive(Debug, Default)]
struct Timeline {
    segments: Vec<RenderedSegment>,
    next_id: SegmentId,
}

/// Shared view of what a `WavRenderOutput` has played
#[derive(Debug, Clone)]
pub struct RenderedTimeline {
    inner: Arc<Mutex<Timeline>>,
    sample_rate: u32,
}

impl RenderedTimeline {
    pub fn segment_count(&self) -> usize {
        self.lock().segments.len()
    }

    /// Mix every segment into one mono track
    pub fn mixdown(&self) -> Vec<f32> {
        let timeline = self.lock();
        let rate = self.sample_rate as f64;

        let offset_of = |secs: f64| (secs * rate).round() as usize;

        let total = timeline
            .segments
            .iter()
            .map(|s| offset_of(s.start_at) + s.samples.len())
            .max()
            .unwrap_or(0);

        let mut track = vec![0.0f32; total];
        for segment in &timeline.segments {
            let start = offset_of(segment.start_at);
            let playable = match segment.stopped_at {
                Some(stop) => offset_of(stop).saturating_sub(start).min(segment.samples.len()),
                None => segment.samples.len(),
            };
            for (i, sample) in segment.samples[..playable].iter().enumerate() {
                track[start + i] += sample;
            }
        }

        track
    }

    /// Write the mixdown as a 16-bit mono WAV file
    pub fn write_wav(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();
        let track = self.mixdown();

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut writer = hound::WavWriter::create(path, spec)
            .with_context(|| format!("Failed to create WAV file: {:?}", path))?;

        for &sample in &track {
            let value = (sample * 32768.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(value)
                .context("Failed to write sample to WAV")?;
        }

        writer.finalize().context("Failed to finalize WAV file")?;

        info!(
            "Rendered playback to {} ({} samples, {:.1}s)",
            path.display(),
            track.len(),
            track.len() as f64 / self.sample_rate as f64
        );

        Ok(track.len())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Timeline> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Output device whose clock is wall time since creation
pub struct WavRenderOutput {
    timeline: RenderedTimeline,
    origin: Instant,
}

impl WavRenderOutput {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            timeline: RenderedTimeline {
                inner: Arc::new(Mutex::new(Timeline::default())),
                sample_rate,
            },
            origin: Instant::now(),
        }
    }

    pub fn timeline(&self) -> RenderedTimeline {
        self.timeline.clone()
    }
}

impl OutputDevice for WavRenderOutput {
    fn current_time(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    fn start(&mut self, buffer: &PcmBuffer, at: f64) -> Result<SegmentId, PlaybackError> {
        if buffer.sample_rate != self.timeline.sample_rate {
            return Err(PlaybackError::Device(format!(
                "segment rate {}Hz does not match output rate {}Hz",
                buffer.sample_rate, self.timeline.sample_rate
            )));
        }

        let samples = buffer.downmix();

        let mut timeline = self.timeline.lock();
        timeline.next_id += 1;
        let id = timeline.next_id;
        timeline.segments.push(RenderedSegment {
            id,
            start_at: at,
            samples,
            stopped_at: None,
        });

        Ok(id)
    }

    fn stop(&mut self, id: SegmentId) {
        let now = self.current_time();
        let mut timeline = self.timeline.lock();

        match timeline.segments.iter_mut().find(|s| s.id == id) {
            Some(segment) => {
                segment.stopped_at.get_or_insert(now);
            }
            None => warn!("Stop requested for unknown segment {}", id),
        }
    }
}
