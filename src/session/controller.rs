use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use super::config::SessionConfig;
use super::stats::{SessionPhase, SessionStats};
use crate::audio::{codec, CapturePipeline, CaptureState, PlaybackScheduler};
use crate::live::{LinkSink, ServerContent, Transport, TransportEvent, TransportLink};

/// Session lifecycle, carrying only what each state may use
///
/// Transport operations need a link, and only `Connecting` and `Active`
/// have one.
pub enum SessionState {
    Idle,
    Connecting {
        link: Arc<dyn TransportLink>,
        events: mpsc::Receiver<TransportEvent>,
    },
    Active {
        link: Arc<dyn TransportLink>,
        events: mpsc::Receiver<TransportEvent>,
        started_at: DateTime<Utc>,
    },
}

impl SessionState {
    fn phase(&self) -> SessionPhase {
        match self {
            SessionState::Idle => SessionPhase::Idle,
            SessionState::Connecting { .. } => SessionPhase::Connecting,
            SessionState::Active { .. } => SessionPhase::Active,
        }
    }

    fn link(&self) -> Option<&Arc<dyn TransportLink>> {
        match self {
            SessionState::Idle => None,
            SessionState::Connecting { link, .. } | SessionState::Active { link, .. } => Some(link),
        }
    }
}

/// Coordinates capture, transport and playback for one voice session at a time
pub struct SessionController {
    config: SessionConfig,
    transport: Arc<dyn Transport>,
    capture: CapturePipeline,
    playback: PlaybackScheduler,
    state: SessionState,
    phase_tx: watch::Sender<SessionPhase>,
    last_started_at: Option<DateTime<Utc>>,
    frames_at_start: u64,
    segments_scheduled: u64,
    decode_failures: u64,
    dropped_payloads: u64,
}

impl SessionController {
    pub fn new(
        config: SessionConfig,
        transport: Arc<dyn Transport>,
        capture: CapturePipeline,
        playback: PlaybackScheduler,
    ) -> Self {
        let (phase_tx, _) = watch::channel(SessionPhase::Idle);

        Self {
            config,
            transport,
            capture,
            playback,
            state: SessionState::Idle,
            phase_tx,
            last_started_at: None,
            frames_at_start: 0,
            segments_scheduled: 0,
            decode_failures: 0,
            dropped_payloads: 0,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase()
    }

    /// Watch phase changes (including the transient `Closing`)
    pub fn subscribe(&self) -> watch::Receiver<SessionPhase> {
        self.phase_tx.subscribe()
    }

    pub fn capture_state(&self) -> CaptureState {
        self.capture.state()
    }

    pub fn playback(&self) -> &PlaybackScheduler {
        &self.playback
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, SessionState::Idle)
    }

    /// Start a session when idle, tear it down otherwise
    pub async fn toggle(&mut self) {
        if self.is_idle() {
            self.connect().await;
        } else {
            self.stop().await;
        }
    }

    async fn connect(&mut self) {
        info!("Voice session connecting");
        self.publish(SessionPhase::Connecting);

        match self.transport.connect(&self.config.live).await {
            Ok(connection) => {
                self.state = SessionState::Connecting {
                    link: connection.link,
                    events: connection.events,
                };
            }
            Err(e) => {
                error!("Failed to start voice session: {}", e);
                self.state = SessionState::Idle;
                self.publish(SessionPhase::Idle);
            }
        }
    }

    /// Stop capture, close the link, silence playback. Safe from any state.
    pub async fn stop(&mut self) {
        let previous = std::mem::replace(&mut self.state, SessionState::Idle);
        let was_idle = matches!(previous, SessionState::Idle);

        if !was_idle {
            info!("Voice session stopping (was {:?})", previous.phase());
            self.publish(SessionPhase::Closing);
        }

        self.capture.stop().await;

        if let Some(link) = previous.link() {
            self.dropped_payloads += link.dropped_payloads();
            link.close();
        }

        self.playback.stop_all();

        if !was_idle {
            info!("Voice session idle");
        }
        self.publish(SessionPhase::Idle);
    }

    /// Wait for the next transport event. `None` when idle.
    ///
    /// A transport that goes away without saying so reads as `Close`.
    pub async fn next_event(&mut self) -> Option<TransportEvent> {
        let events = match &mut self.state {
            SessionState::Idle => return None,
            SessionState::Connecting { events, .. } | SessionState::Active { events, .. } => events,
        };

        Some(events.recv().await.unwrap_or(TransportEvent::Close))
    }

    /// Process one event from the current connection
    pub async fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Open => self.on_open().await,
            TransportEvent::Message(content) => self.on_message(&content),
            TransportEvent::Close => {
                if !self.is_idle() {
                    info!("Remote closed the voice session");
                    self.stop().await;
                }
            }
            TransportEvent::Error(e) => {
                error!("Live API error: {}", e);
                self.stop().await;
            }
        }
    }

    /// Wait for and handle one event. Returns false when idle.
    pub async fn pump(&mut self) -> bool {
        match self.next_event().await {
            Some(event) => {
                self.handle_event(event).await;
                true
            }
            None => false,
        }
    }

    async fn on_open(&mut self) {
        let link = match &self.state {
            SessionState::Connecting { link, .. } => Arc::clone(link),
            _ => {
                debug!("Ignoring open event outside of Connecting");
                return;
            }
        };

        self.frames_at_start = self.capture.frames_forwarded();

        if let Err(e) = self.capture.start(Arc::new(LinkSink::new(link))).await {
            warn!("Microphone unavailable, ending voice session: {}", e);
            self.stop().await;
            return;
        }

        let previous = std::mem::replace(&mut self.state, SessionState::Idle);
        if let SessionState::Connecting { link, events } = previous {
            let started_at = Utc::now();
            self.last_started_at = Some(started_at);
            self.state = SessionState::Active {
                link,
                events,
                started_at,
            };
            info!("Voice session active");
            self.publish(SessionPhase::Active);
        }
    }

    fn on_message(&mut self, content: &ServerContent) {
        if !matches!(self.state, SessionState::Active { .. }) {
            debug!("Ignoring server content outside of Active");
            return;
        }

        let Some(audio) = content.inline_audio() else {
            return;
        };

        let buffer = match codec::decode(
            &audio.data,
            self.config.output_sample_rate,
            self.config.output_channels,
        ) {
            Ok(buffer) => buffer,
            Err(e) => {
                self.decode_failures += 1;
                warn!("Dropping undecodable model audio: {}", e);
                return;
            }
        };

        let now = self.playback.clock_now();
        self.playback.reap(now);

        match self.playback.schedule(&buffer, now) {
            Ok(_) => self.segments_scheduled += 1,
            Err(e) => warn!("Playback failed: {}", e),
        }
    }

    pub fn stats(&self) -> SessionStats {
        let started_at = match &self.state {
            SessionState::Active { started_at, .. } => Some(*started_at),
            _ => self.last_started_at,
        };
        let duration_secs = match &self.state {
            SessionState::Active { started_at, .. } => {
                Utc::now().signed_duration_since(*started_at).num_milliseconds() as f64 / 1000.0
            }
            _ => 0.0,
        };
        let live_drops = self.state.link().map(|l| l.dropped_payloads()).unwrap_or(0);

        SessionStats {
            phase: self.phase(),
            started_at,
            duration_secs,
            frames_sent: self.capture.frames_forwarded() - self.frames_at_start,
            segments_scheduled: self.segments_scheduled,
            active_segments: self.playback.active_count(),
            decode_failures: self.decode_failures,
            dropped_payloads: self.dropped_payloads + live_drops,
        }
    }

    fn publish(&self, phase: SessionPhase) {
        self.phase_tx.send_replace(phase);
    }
}
