// Integration tests for the capture pipeline
//
// Frames from a capture backend must reach the sink once each, in order,
// encoded as 16-bit PCM.

use async_trait::async_trait;
use parkeasy::audio::{
    decode, AudioFrame, CaptureBackend, CaptureConfig, CapturePipeline, CaptureState,
    EncodedPayload, FrameSink, WavFileBackend,
};
use parkeasy::error::CaptureError;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Emits a fixed list of frames, then ends the stream
struct ScriptedBackend {
    frames: Vec<AudioFrame>,
    open: bool,
}

impl ScriptedBackend {
    fn new(frames: Vec<AudioFrame>) -> Self {
        Self {
            frames,
            open: false,
        }
    }
}

#[async_trait]
impl CaptureBackend for ScriptedBackend {
    async fn open(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError> {
        let (tx, rx) = mpsc::channel(self.frames.len().max(1));
        for frame in self.frames.drain(..) {
            tx.send(frame).await.unwrap();
        }
        self.open = true;
        Ok(rx)
    }

    async fn close(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

struct DeniedBackend;

#[async_trait]
impl CaptureBackend for DeniedBackend {
    async fn open(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError> {
        Err(CaptureError::PermissionDenied("user said no".to_string()))
    }

    async fn close(&mut self) {}

    fn is_open(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "denied"
    }
}

#[derive(Default)]
struct RecordingSink {
    payloads: Mutex<Vec<EncodedPayload>>,
}

impl FrameSink for RecordingSink {
    fn send(&self, payload: EncodedPayload) {
        self.payloads.lock().unwrap().push(payload);
    }
}

fn frame(samples: Vec<f32>, index: u64) -> AudioFrame {
    AudioFrame {
        samples,
        sample_rate: 16000,
        channels: 1,
        timestamp_ms: index * 256,
    }
}

fn write_wav(path: &std::path::Path, samples: &[i16], sample_rate: u32, channels: u16) {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for &s in samples {
        writer.write_sample(s).unwrap();
    }
    writer.finalize().unwrap();
}

#[tokio::test]
async fn test_silent_frames_are_sent_once_each() {
    let frames = (0..3).map(|i| frame(vec![0.0; 4096], i)).collect();
    let mut pipeline = CapturePipeline::new(Box::new(ScriptedBackend::new(frames)));
    let sink = Arc::new(RecordingSink::default());

    pipeline.start(sink.clone()).await.unwrap();
    assert_eq!(pipeline.state(), CaptureState::Streaming);
    pipeline.drained().await;

    let payloads = sink.payloads.lock().unwrap();
    assert_eq!(payloads.len(), 3);
    for payload in payloads.iter() {
        assert_eq!(payload.mime_type, "audio/pcm;rate=16000");
        let buffer = decode(&payload.data, 16000, 1).unwrap();
        assert_eq!(buffer.frame_count(), 4096);
        assert!(buffer.channels[0].iter().all(|&s| s == 0.0));
    }
    assert_eq!(pipeline.frames_forwarded(), 3);
}

#[tokio::test]
async fn test_frames_keep_capture_order() {
    let frames = (0..5).map(|i| frame(vec![i as f32 * 0.1; 8], i)).collect();
    let mut pipeline = CapturePipeline::new(Box::new(ScriptedBackend::new(frames)));
    let sink = Arc::new(RecordingSink::default());

    pipeline.start(sink.clone()).await.unwrap();
    pipeline.drained().await;

    let firsts: Vec<f32> = sink
        .payloads
        .lock()
        .unwrap()
        .iter()
        .map(|p| decode(&p.data, 16000, 1).unwrap().channels[0][0])
        .collect();

    for pair in firsts.windows(2) {
        assert!(pair[0] < pair[1], "frames out of order: {:?}", firsts);
    }
}

#[tokio::test]
async fn test_permission_denied_leaves_pipeline_stopped() {
    let mut pipeline = CapturePipeline::new(Box::new(DeniedBackend));
    let sink = Arc::new(RecordingSink::default());

    let result = pipeline.start(sink.clone()).await;
    assert!(matches!(result, Err(CaptureError::PermissionDenied(_))));
    assert_eq!(pipeline.state(), CaptureState::Stopped);
    assert!(sink.payloads.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_second_start_is_rejected_and_stop_is_idempotent() {
    let mut pipeline = CapturePipeline::new(Box::new(ScriptedBackend::new(vec![])));
    let sink = Arc::new(RecordingSink::default());

    pipeline.start(sink.clone()).await.unwrap();
    assert_eq!(
        pipeline.start(sink.clone()).await,
        Err(CaptureError::AlreadyStreaming)
    );

    pipeline.stop().await;
    pipeline.stop().await;
    assert_eq!(pipeline.state(), CaptureState::Stopped);
}

#[tokio::test]
async fn test_wav_backend_frames_file_at_target_rate() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("question.wav");
    // 0.5s of 16kHz stereo, both channels at half scale
    write_wav(&path, &vec![16384i16; 16000], 16000, 2);

    let config = CaptureConfig {
        frame_size: 1024,
        ..Default::default()
    };
    let backend = WavFileBackend::new(&path, config).unpaced();
    let mut pipeline = CapturePipeline::new(Box::new(backend));
    let sink = Arc::new(RecordingSink::default());

    pipeline.start(sink.clone()).await.unwrap();
    pipeline.drained().await;

    // 8000 mono samples in frames of 1024 -> 8 frames, the last one padded
    let payloads = sink.payloads.lock().unwrap();
    assert_eq!(payloads.len(), 8);

    let first = decode(&payloads[0].data, 16000, 1).unwrap();
    assert!((first.channels[0][0] - 0.5).abs() < 1e-3);

    let last = decode(&payloads[7].data, 16000, 1).unwrap();
    assert_eq!(last.frame_count(), 1024);
    assert_eq!(*last.channels[0].last().unwrap(), 0.0);
}

#[tokio::test]
async fn test_wav_backend_missing_file_is_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let mut backend = WavFileBackend::new(dir.path().join("nope.wav"), CaptureConfig::default());

    let result = backend.open().await;
    assert!(matches!(result, Err(CaptureError::DeviceUnavailable(_))));
    assert!(!backend.is_open());
}

#[tokio::test]
async fn test_wav_backend_rejects_zero_rate_and_frame_size() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("question.wav");
    write_wav(&path, &[0i16; 1600], 16000, 1);

    for config in [
        CaptureConfig {
            sample_rate: 0,
            ..Default::default()
        },
        CaptureConfig {
            frame_size: 0,
            ..Default::default()
        },
    ] {
        let mut pipeline = CapturePipeline::new(Box::new(WavFileBackend::new(&path, config)));
        let sink = Arc::new(RecordingSink::default());

        let result = pipeline.start(sink).await;
        assert!(matches!(result, Err(CaptureError::DeviceUnavailable(_))));
        assert_eq!(pipeline.state(), CaptureState::Stopped);
    }
}
