//! Gapless playback scheduling
//!
//! Inbound segments arrive whenever the network delivers them. The scheduler
//! keeps a cursor on the output clock so each segment starts exactly where
//! the previous one ends, or immediately if the queue has drained.

use std::collections::BTreeMap;
use tracing::{debug, info};

use super::codec::PcmBuffer;
use crate::error::PlaybackError;

pub type SegmentId = u64;

/// Audio sink with its own monotonic clock (seconds)
pub trait OutputDevice: Send {
    /// Current time on the output clock
    fn current_time(&self) -> f64;

    /// Begin playing `buffer` at `at` seconds on the output clock
    fn start(&mut self, buffer: &PcmBuffer, at: f64) -> Result<SegmentId, PlaybackError>;

    /// Silence a segment immediately
    fn stop(&mut self, id: SegmentId);
}

/// A segment handed to the device and not yet reaped or cancelled
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledSegment {
    pub id: SegmentId,
    pub start_at: f64,
    pub duration: f64,
}

impl ScheduledSegment {
    pub fn end(&self) -> f64 {
        self.start_at + self.duration
    }
}

pub struct PlaybackScheduler {
    device: Box<dyn OutputDevice>,
    cursor: f64,
    active: BTreeMap<SegmentId, ScheduledSegment>,
}

impl PlaybackScheduler {
    pub fn new(device: Box<dyn OutputDevice>) -> Self {
        Self {
            device,
            cursor: 0.0,
            active: BTreeMap::new(),
        }
    }

    /// Time on the device clock
    pub fn clock_now(&self) -> f64 {
        self.device.current_time()
    }

    /// Next free start time
    pub fn cursor(&self) -> f64 {
        self.cursor
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Queue `buffer` behind everything already scheduled.
    ///
    /// The segment starts at `max(cursor, clock_now)`. The cursor only moves
    /// when the device accepted the segment.
    pub fn schedule(
        &mut self,
        buffer: &PcmBuffer,
        clock_now: f64,
    ) -> Result<ScheduledSegment, PlaybackError> {
        let start_at = self.cursor.max(clock_now);
        let duration = buffer.duration_secs();

        let id = self.device.start(buffer, start_at)?;
        self.cursor = start_at + duration;

        let segment = ScheduledSegment {
            id,
            start_at,
            duration,
        };
        self.active.insert(id, segment);

        debug!(
            "Scheduled segment {} at {:.3}s for {:.3}s (cursor {:.3}s)",
            id, start_at, duration, self.cursor
        );

        Ok(segment)
    }

    /// Schedule against the device's own clock
    pub fn schedule_now(&mut self, buffer: &PcmBuffer) -> Result<ScheduledSegment, PlaybackError> {
        let now = self.clock_now();
        self.schedule(buffer, now)
    }

    /// Forget segments that finished playing by `now`
    pub fn reap(&mut self, now: f64) -> usize {
        let before = self.active.len();
        self.active.retain(|_, segment| segment.end() > now);
        before - self.active.len()
    }

    /// Silence every active segment and rewind the cursor. Idempotent.
    pub fn stop_all(&mut self) {
        if !self.active.is_empty() {
            info!("Stopping {} active playback segment(s)", self.active.len());
        }

        for id in std::mem::take(&mut self.active).into_keys() {
            self.device.stop(id);
        }
        self.cursor = 0.0;
    }
}
