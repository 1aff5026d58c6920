// Integration tests for the voice session lifecycle
//
// The controller is driven against a scripted transport, a scripted capture
// backend and a recording output device so every transition is observable.

use async_trait::async_trait;
use parkeasy::audio::{
    encode, AudioFrame, CaptureBackend, CapturePipeline, CaptureState, EncodedPayload,
    OutputDevice, PcmBuffer, PlaybackScheduler, SegmentId,
};
use parkeasy::error::{CaptureError, PlaybackError, TransportError};
use parkeasy::live::{
    Connection, LiveConfig, ServerContent, Transport, TransportEvent, TransportLink,
};
use parkeasy::session::{
    SessionConfig, SessionController, SessionPhase, VoiceSessionHandle,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

// ============================================================================
// Test doubles
// ============================================================================

#[derive(Default)]
struct ScriptedLink {
    sent: Mutex<Vec<EncodedPayload>>,
    closed: AtomicBool,
}

impl TransportLink for ScriptedLink {
    fn send(&self, payload: EncodedPayload) {
        self.sent.lock().unwrap().push(payload);
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Hands out connections and keeps their event senders for the test
#[derive(Default)]
struct ScriptedTransport {
    connections: Mutex<Vec<(Arc<ScriptedLink>, mpsc::Sender<TransportEvent>)>>,
    refuse: bool,
}

impl ScriptedTransport {
    fn last(&self) -> (Arc<ScriptedLink>, mpsc::Sender<TransportEvent>) {
        self.connections
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no connection made")
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn connect(&self, _config: &LiveConfig) -> Result<Connection, TransportError> {
        if self.refuse {
            return Err(TransportError::Connect("refused".to_string()));
        }

        let link = Arc::new(ScriptedLink::default());
        let (tx, rx) = mpsc::channel(16);
        self.connections.lock().unwrap().push((link.clone(), tx));

        Ok(Connection { link, events: rx })
    }
}

/// Microphone that yields `frames` silent frames, or refuses permission
struct ScriptedMic {
    frames: usize,
    deny: bool,
    open: bool,
}

impl ScriptedMic {
    fn frames(frames: usize) -> Self {
        Self {
            frames,
            deny: false,
            open: false,
        }
    }

    fn denied() -> Self {
        Self {
            frames: 0,
            deny: true,
            open: false,
        }
    }
}

#[async_trait]
impl CaptureBackend for ScriptedMic {
    async fn open(&mut self) -> Result<mpsc::Receiver<AudioFrame>, CaptureError> {
        if self.deny {
            return Err(CaptureError::PermissionDenied("blocked".to_string()));
        }

        let (tx, rx) = mpsc::channel(self.frames.max(1));
        for i in 0..self.frames {
            tx.send(AudioFrame {
                samples: vec![0.0; 4096],
                sample_rate: 16000,
                channels: 1,
                timestamp_ms: i as u64 * 256,
            })
            .await
            .unwrap();
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
        "scripted mic"
    }
}

#[derive(Default)]
struct OutputLog {
    now: f64,
    started: Vec<(SegmentId, f64, f64)>,
    stopped: Vec<SegmentId>,
}

/// Output device with a hand-driven clock
struct RecordingOutput {
    log: Arc<Mutex<OutputLog>>,
    next_id: SegmentId,
}

impl OutputDevice for RecordingOutput {
    fn current_time(&self) -> f64 {
        self.log.lock().unwrap().now
    }

    fn start(&mut self, buffer: &PcmBuffer, at: f64) -> Result<SegmentId, PlaybackError> {
        self.next_id += 1;
        self.log
            .lock()
            .unwrap()
            .started
            .push((self.next_id, at, buffer.duration_secs()));
        Ok(self.next_id)
    }

    fn stop(&mut self, id: SegmentId) {
        self.log.lock().unwrap().stopped.push(id);
    }
}

struct Rig {
    controller: SessionController,
    transport: Arc<ScriptedTransport>,
    output: Arc<Mutex<OutputLog>>,
}

fn rig(mic: ScriptedMic) -> Rig {
    let transport = Arc::new(ScriptedTransport::default());
    let output = Arc::new(Mutex::new(OutputLog::default()));

    let controller = SessionController::new(
        SessionConfig::default(),
        transport.clone(),
        CapturePipeline::new(Box::new(mic)),
        PlaybackScheduler::new(Box::new(RecordingOutput {
            log: output.clone(),
            next_id: 0,
        })),
    );

    Rig {
        controller,
        transport,
        output,
    }
}

/// 0.1s of 24kHz mono model audio
fn model_audio() -> TransportEvent {
    TransportEvent::Message(ServerContent::audio(
        encode(&[0.25; 2400]),
        "audio/pcm;rate=24000".to_string(),
    ))
}

async fn activate(rig: &mut Rig) -> Arc<ScriptedLink> {
    rig.controller.toggle().await;
    let (link, _) = rig.transport.last();
    rig.controller.handle_event(TransportEvent::Open).await;
    assert_eq!(rig.controller.phase(), SessionPhase::Active);
    link
}

// ============================================================================
// Controller
// ============================================================================

#[tokio::test]
async fn test_toggle_twice_while_connecting_returns_to_idle() {
    let mut rig = rig(ScriptedMic::frames(0));

    rig.controller.toggle().await;
    assert_eq!(rig.controller.phase(), SessionPhase::Connecting);

    rig.controller.toggle().await;
    assert_eq!(rig.controller.phase(), SessionPhase::Idle);

    let (link, _) = rig.transport.last();
    assert!(link.is_closed());
    assert_eq!(rig.controller.capture_state(), CaptureState::Stopped);
}

#[tokio::test]
async fn test_open_starts_capture_and_frames_reach_the_link() {
    let mut rig = rig(ScriptedMic::frames(3));
    let link = activate(&mut rig).await;

    assert_eq!(rig.controller.capture_state(), CaptureState::Streaming);

    tokio::time::timeout(Duration::from_secs(2), async {
        while link.sent.lock().unwrap().len() < 3 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("frames were not forwarded");

    let sent = link.sent.lock().unwrap();
    assert_eq!(sent.len(), 3);
    assert!(sent.iter().all(|p| p.mime_type == "audio/pcm;rate=16000"));
}

#[tokio::test]
async fn test_remote_close_while_active_tears_everything_down() {
    let mut rig = rig(ScriptedMic::frames(1));
    let link = activate(&mut rig).await;
    rig.controller.handle_event(model_audio()).await;
    assert_eq!(rig.controller.playback().active_count(), 1);

    let (_, events) = rig.transport.last();
    events.send(TransportEvent::Close).await.unwrap();
    assert!(rig.controller.pump().await);

    assert_eq!(rig.controller.phase(), SessionPhase::Idle);
    assert_eq!(rig.controller.playback().active_count(), 0);
    assert_eq!(rig.controller.capture_state(), CaptureState::Stopped);
    assert!(link.is_closed());
    assert_eq!(rig.output.lock().unwrap().stopped.len(), 1);

    // Idle: nothing left to pump
    assert!(!rig.controller.pump().await);
}

#[tokio::test]
async fn test_dropped_event_channel_reads_as_close() {
    let mut rig = rig(ScriptedMic::frames(0));
    activate(&mut rig).await;

    rig.transport.connections.lock().unwrap().clear();
    assert!(rig.controller.pump().await);
    assert_eq!(rig.controller.phase(), SessionPhase::Idle);
}

#[tokio::test]
async fn test_transport_error_stops_session() {
    let mut rig = rig(ScriptedMic::frames(0));
    let link = activate(&mut rig).await;

    rig.controller
        .handle_event(TransportEvent::Error("socket reset".to_string()))
        .await;

    assert_eq!(rig.controller.phase(), SessionPhase::Idle);
    assert!(link.is_closed());
}

#[tokio::test]
async fn test_inbound_audio_is_scheduled_back_to_back() {
    let mut rig = rig(ScriptedMic::frames(0));
    activate(&mut rig).await;

    rig.controller.handle_event(model_audio()).await;
    rig.controller.handle_event(model_audio()).await;
    rig.output.lock().unwrap().now = 0.05;
    rig.controller.handle_event(model_audio()).await;

    let log = rig.output.lock().unwrap();
    let starts: Vec<f64> = log.started.iter().map(|&(_, at, _)| at).collect();
    assert_eq!(starts.len(), 3);
    assert!((starts[0] - 0.0).abs() < 1e-9);
    assert!((starts[1] - 0.1).abs() < 1e-9);
    assert!((starts[2] - 0.2).abs() < 1e-9);
    assert!((rig.controller.playback().cursor() - 0.3).abs() < 1e-9);
    assert_eq!(rig.controller.stats().segments_scheduled, 3);
}

#[tokio::test]
async fn test_playback_restarts_at_clock_after_gap() {
    let mut rig = rig(ScriptedMic::frames(0));
    activate(&mut rig).await;

    rig.controller.handle_event(model_audio()).await;
    rig.output.lock().unwrap().now = 2.0;
    rig.controller.handle_event(model_audio()).await;

    let log = rig.output.lock().unwrap();
    assert!((log.started[1].1 - 2.0).abs() < 1e-9);
    // The first segment ended before the second arrived
    assert_eq!(rig.controller.playback().active_count(), 1);
}

#[tokio::test]
async fn test_audio_outside_active_is_ignored() {
    let mut rig = rig(ScriptedMic::frames(0));

    rig.controller.handle_event(model_audio()).await;
    rig.controller.toggle().await;
    rig.controller.handle_event(model_audio()).await;

    assert!(rig.output.lock().unwrap().started.is_empty());
    assert_eq!(rig.controller.phase(), SessionPhase::Connecting);
}

#[tokio::test]
async fn test_undecodable_audio_is_counted_not_fatal() {
    let mut rig = rig(ScriptedMic::frames(0));
    activate(&mut rig).await;

    rig.controller
        .handle_event(TransportEvent::Message(ServerContent::audio(
            "not base64!".to_string(),
            "audio/pcm;rate=24000".to_string(),
        )))
        .await;
    // Three bytes cannot hold whole 16-bit samples
    rig.controller
        .handle_event(TransportEvent::Message(ServerContent::audio(
            "AAAA".to_string(),
            "audio/pcm;rate=24000".to_string(),
        )))
        .await;

    let stats = rig.controller.stats();
    assert_eq!(stats.phase, SessionPhase::Active);
    assert_eq!(stats.decode_failures, 2);
    assert_eq!(stats.segments_scheduled, 0);
}

#[tokio::test]
async fn test_permission_denied_on_open_ends_session() {
    let mut rig = rig(ScriptedMic::denied());

    rig.controller.toggle().await;
    let (link, _) = rig.transport.last();
    rig.controller.handle_event(TransportEvent::Open).await;

    assert_eq!(rig.controller.phase(), SessionPhase::Idle);
    assert_eq!(rig.controller.capture_state(), CaptureState::Stopped);
    assert!(link.is_closed());
}

#[tokio::test]
async fn test_refused_connect_stays_idle() {
    let transport = Arc::new(ScriptedTransport {
        refuse: true,
        ..Default::default()
    });
    let mut controller = SessionController::new(
        SessionConfig::default(),
        transport,
        CapturePipeline::new(Box::new(ScriptedMic::frames(0))),
        PlaybackScheduler::new(Box::new(RecordingOutput {
            log: Arc::new(Mutex::new(OutputLog::default())),
            next_id: 0,
        })),
    );

    controller.toggle().await;
    assert_eq!(controller.phase(), SessionPhase::Idle);
}

#[tokio::test]
async fn test_stop_when_idle_is_a_no_op() {
    let mut rig = rig(ScriptedMic::frames(0));
    let mut phases = rig.controller.subscribe();

    rig.controller.stop().await;
    rig.controller.stop().await;

    assert_eq!(rig.controller.phase(), SessionPhase::Idle);
    assert_eq!(*phases.borrow_and_update(), SessionPhase::Idle);
    assert!(rig.transport.connections.lock().unwrap().is_empty());
}

// ============================================================================
// Handle
// ============================================================================

#[tokio::test]
async fn test_handle_runs_session_from_its_own_task() -> anyhow::Result<()> {
    let rig = rig(ScriptedMic::frames(2));
    let transport = rig.transport.clone();
    let (handle, task) = VoiceSessionHandle::spawn(rig.controller);

    assert_eq!(handle.toggle().await?, SessionPhase::Connecting);

    let (link, events) = transport.last();
    events.send(TransportEvent::Open).await?;
    tokio::time::timeout(Duration::from_secs(2), handle.wait_for(SessionPhase::Active)).await??;

    events.send(model_audio()).await?;
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            if handle.stats().await.unwrap().segments_scheduled == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
    })
    .await?;

    assert_eq!(handle.stop().await?, SessionPhase::Idle);
    assert!(link.is_closed());

    let stats = handle.stats().await?;
    assert_eq!(stats.phase, SessionPhase::Idle);
    assert!(stats.started_at.is_some());

    drop(handle);
    task.await?;
    Ok(())
}
