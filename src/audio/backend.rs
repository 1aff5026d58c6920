use tokio::sync::mpsc;

use crate::error::CaptureError;

/// One fixed-size slice of captured audio (normalized f32, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Samples in [-1.0, 1.0]
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

/// Configuration for capture backends
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Sample rate the remote model expects
    pub sample_rate: u32,
    /// Samples per frame (the platform buffering granularity)
    pub frame_size: usize,
    /// Frames buffered between the device and the pipeline
    pub channel_capacity: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000, // Live input rate
            frame_size: 4096,
            channel_capacity: 32,
        }
    }
}

impl CaptureConfig {
    /// Reject settings no device can stream at
    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.sample_rate == 0 {
            return Err(CaptureError::DeviceUnavailable(
                "sample rate must be non-zero".to_string(),
            ));
        }
        if self.frame_size == 0 {
            return Err(CaptureError::DeviceUnavailable(
                "frame size must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Wall-clock duration of one frame. Only meaningful after `validate`.
    pub fn frame_duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs_f64(self.frame_size as f64 / self.sample_rate as f64)
    }
}

/// Microphone-like capture source
///
/// `open` is where permission is requested; a denied or missing device fails
/// with a typed error and the backend stays closed.
#[async_trait::async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Acquire the device and start producing frames on the returned channel
    async fn open(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError>;

    /// Release the device. Safe to call when already closed.
    async fn close(&mut self);

    /// Check if the device is currently held
    fn is_open(&self) -> bool;

    /// Backend name for logging
    fn name(&self) -> &str;
}
