//! Microphone capture pipeline
//!
//! Stopped -> RequestingPermission -> Streaming -> Stopped.
//!
//! Every frame the backend produces is encoded and handed to the sink exactly
//! once, in capture order. Sends are fire-and-forget.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::backend::CaptureBackend;
use super::codec::{encode, EncodedPayload};
use crate::error::CaptureError;

/// Receiver of encoded frames (the transport, in production)
pub trait FrameSink: Send + Sync {
    fn send(&self, payload: EncodedPayload);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Stopped,
    RequestingPermission,
    Streaming,
}

pub struct CapturePipeline {
    backend: Box<dyn CaptureBackend>,
    state: CaptureState,
    forward_task: Option<JoinHandle<()>>,
    frames_forwarded: Arc<AtomicU64>,
}

impl CapturePipeline {
    pub fn new(backend: Box<dyn CaptureBackend>) -> Self {
        Self {
            backend,
            state: CaptureState::Stopped,
            forward_task: None,
            frames_forwarded: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    pub fn frames_forwarded(&self) -> u64 {
        self.frames_forwarded.load(Ordering::SeqCst)
    }

    /// Acquire the input device and start forwarding frames to `sink`.
    ///
    /// On failure the pipeline stays `Stopped`.
    pub async fn start(&mut self, sink: Arc<dyn FrameSink>) -> Result<(), CaptureError> {
        if self.state != CaptureState::Stopped {
            return Err(CaptureError::AlreadyStreaming);
        }

        info!("Requesting capture device: {}", self.backend.name());
        self.state = CaptureState::RequestingPermission;

        let mut frames = match self.backend.open().await {
            Ok(rx) => rx,
            Err(e) => {
                warn!("Capture start failed: {}", e);
                self.state = CaptureState::Stopped;
                return Err(e);
            }
        };

        let forwarded = Arc::clone(&self.frames_forwarded);
        self.forward_task = Some(tokio::spawn(async move {
            while let Some(frame) = frames.recv().await {
                let payload = EncodedPayload::pcm(encode(&frame.samples), frame.sample_rate);
                sink.send(payload);

                let count = forwarded.fetch_add(1, Ordering::SeqCst) + 1;
                if count % 100 == 0 {
                    debug!("Forwarded {} capture frames", count);
                }
            }
            debug!("Capture frame stream ended");
        }));

        self.state = CaptureState::Streaming;
        info!("Capture streaming");

        Ok(())
    }

    /// Wait until the backend stops producing frames and every frame has
    /// been forwarded. Returns immediately when not streaming.
    pub async fn drained(&mut self) {
        if let Some(task) = self.forward_task.as_mut() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!("Capture forwarding task failed: {}", e);
                }
            }
            self.forward_task = None;
        }
    }

    /// Disconnect the frame pipeline and release the device. Idempotent.
    pub async fn stop(&mut self) {
        if self.state == CaptureState::Stopped && self.forward_task.is_none() {
            return;
        }

        if let Some(task) = self.forward_task.take() {
            task.abort();
        }
        self.backend.close().await;
        self.state = CaptureState::Stopped;

        info!(
            "Capture stopped ({} frames forwarded)",
            self.frames_forwarded.load(Ordering::SeqCst)
        );
    }
}
