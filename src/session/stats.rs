use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Externally visible lifecycle phase of the voice session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Connecting,
    Active,
    /// Teardown in progress
    Closing,
}

/// Statistics about the current (or last) voice session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub phase: SessionPhase,

    /// When the session became active
    pub started_at: Option<DateTime<Utc>>,

    /// Seconds since `started_at`
    pub duration_secs: f64,

    /// Captured frames handed to the transport
    pub frames_sent: u64,

    /// Model audio segments queued for playback
    pub segments_scheduled: u64,

    /// Segments currently playing or waiting to play
    pub active_segments: usize,

    /// Inbound chunks that failed to decode
    pub decode_failures: u64,

    /// Outbound payloads dropped by the pending queue
    pub dropped_payloads: u64,
}
