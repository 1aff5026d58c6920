// Gemini Live transport over WebSocket
//
// One task per connection owns the socket. Outbound audio goes through a
// bounded channel that doubles as the pending queue: nothing is read from it
// until the server acknowledges `setup`, so early frames wait there in order.
// When the channel is full the newest payload is dropped.

use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use super::messages::{
    ClientMessage, Content, InlineData, LiveGenerationConfig, PrebuiltVoiceConfig, RealtimeInput,
    ServerMessage, Setup, SpeechConfig, VoiceConfig,
};
use super::transport::{Connection, LiveConfig, Transport, TransportEvent, TransportLink};
use crate::audio::EncodedPayload;
use crate::error::TransportError;

pub const DEFAULT_LIVE_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Transport that talks to the Gemini Live bidirectional streaming API
pub struct GeminiLiveTransport {
    endpoint: String,
    api_key: Option<String>,
    pending_capacity: usize,
}

impl GeminiLiveTransport {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>, pending_capacity: usize) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key,
            pending_capacity: pending_capacity.max(1),
        }
    }

    fn url(&self) -> Result<String, TransportError> {
        let key = self
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| TransportError::Connect("no API key configured".to_string()))?;
        Ok(format!("{}?key={}", self.endpoint, key))
    }
}

pub fn setup_message(config: &LiveConfig) -> ClientMessage {
    let model = if config.model.starts_with("models/") {
        config.model.clone()
    } else {
        format!("models/{}", config.model)
    };

    ClientMessage::Setup(Setup {
        model,
        generation_config: LiveGenerationConfig {
            response_modalities: vec![config.response_modality.clone()],
            speech_config: SpeechConfig {
                voice_config: VoiceConfig {
                    prebuilt_voice_config: PrebuiltVoiceConfig {
                        voice_name: config.voice_name.clone(),
                    },
                },
            },
        },
        system_instruction: Content::text(config.system_instruction.clone()),
    })
}

pub fn realtime_input(payload: EncodedPayload) -> ClientMessage {
    ClientMessage::RealtimeInput(RealtimeInput {
        media_chunks: vec![InlineData {
            mime_type: payload.mime_type,
            data: payload.data,
        }],
    })
}

#[async_trait::async_trait]
impl Transport for GeminiLiveTransport {
    async fn connect(&self, config: &LiveConfig) -> Result<Connection, TransportError> {
        let url = self.url()?;
        let setup = serde_json::to_string(&setup_message(config))
            .map_err(|e| TransportError::Protocol(e.to_string()))?;

        let (outbound_tx, outbound_rx) = mpsc::channel(self.pending_capacity);
        let (events_tx, events_rx) = mpsc::channel(64);

        let link = Arc::new(GeminiLink {
            outbound: outbound_tx,
            close_requested: Arc::new(Notify::new()),
            closed: Arc::new(AtomicBool::new(false)),
            dropped: AtomicU64::new(0),
        });

        info!("Dialing Gemini Live ({})", config.model);

        let driver = ConnectionDriver {
            url,
            setup,
            outbound: outbound_rx,
            close_requested: Arc::clone(&link.close_requested),
            closed: Arc::clone(&link.closed),
            events: events_tx,
        };
        tokio::spawn(driver.run());

        Ok(Connection {
            link,
            events: events_rx,
        })
    }
}

struct GeminiLink {
    outbound: mpsc::Sender<EncodedPayload>,
    close_requested: Arc<Notify>,
    closed: Arc<AtomicBool>,
    dropped: AtomicU64,
}

impl GeminiLink {
    /// Queue one payload for the driver; a full queue drops it
    fn enqueue(&self, payload: EncodedPayload) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }

        match self.outbound.try_send(payload) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::SeqCst) + 1;
                warn!("Outbound audio queue full, dropped payload ({} total)", dropped);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(TransportError::Closed),
        }
    }
}

impl TransportLink for GeminiLink {
    fn send(&self, payload: EncodedPayload) {
        if let Err(e) = self.enqueue(payload) {
            debug!("Outbound audio ignored: {}", e);
        }
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!("Closing Gemini Live connection");
            self.close_requested.notify_one();
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn dropped_payloads(&self) -> u64 {
        self.dropped.load(Ordering::SeqCst)
    }
}

struct ConnectionDriver {
    url: String,
    setup: String,
    outbound: mpsc::Receiver<EncodedPayload>,
    close_requested: Arc<Notify>,
    closed: Arc<AtomicBool>,
    events: mpsc::Sender<TransportEvent>,
}

impl ConnectionDriver {
    async fn run(mut self) {
        if let Err(e) = self.drive().await {
            error!("Gemini Live connection failed: {}", e);
            let _ = self.events.send(TransportEvent::Error(e.to_string())).await;
        }

        self.closed.store(true, Ordering::SeqCst);
        let _ = self.events.send(TransportEvent::Close).await;
        info!("Gemini Live connection ended");
    }

    async fn drive(&mut self) -> Result<(), TransportError> {
        let (socket, _response) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let (mut sink, mut stream) = socket.split();

        sink.send(Message::Text(self.setup.clone()))
            .await
            .map_err(|e| TransportError::Protocol(e.to_string()))?;

        // Wait for the setup acknowledgement
        loop {
            tokio::select! {
                _ = self.close_requested.notified() => {
                    let _ = sink.send(Message::Close(None)).await;
                    return Ok(());
                }
                msg = stream.next() => {
                    match read_server_message(msg)? {
                        Inbound::Message(m) if m.setup_complete.is_some() => break,
                        Inbound::Message(_) | Inbound::Ignored => continue,
                        Inbound::Closed => return Ok(()),
                    }
                }
            }
        }

        info!("Gemini Live session open");
        if self.events.send(TransportEvent::Open).await.is_err() {
            let _ = sink.send(Message::Close(None)).await;
            return Ok(());
        }

        loop {
            tokio::select! {
                _ = self.close_requested.notified() => {
                    let _ = sink.send(Message::Close(None)).await;
                    return Ok(());
                }
                payload = self.outbound.recv() => {
                    let Some(payload) = payload else {
                        let _ = sink.send(Message::Close(None)).await;
                        return Ok(());
                    };
                    let text = serde_json::to_string(&realtime_input(payload))
                        .map_err(|e| TransportError::Protocol(e.to_string()))?;
                    sink.send(Message::Text(text))
                        .await
                        .map_err(|e| TransportError::Protocol(e.to_string()))?;
                }
                msg = stream.next() => {
                    match read_server_message(msg)? {
                        Inbound::Message(m) => {
                            if m.go_away.is_some() {
                                warn!("Server announced disconnect (goAway)");
                            }
                            if let Some(content) = m.server_content {
                                if self.events.send(TransportEvent::Message(content)).await.is_err() {
                                    return Ok(());
                                }
                            }
                        }
                        Inbound::Ignored => {}
                        Inbound::Closed => return Ok(()),
                    }
                }
            }
        }
    }
}

enum Inbound {
    Message(ServerMessage),
    Ignored,
    Closed,
}

fn read_server_message(
    msg: Option<Result<Message, tokio_tungstenite::tungstenite::Error>>,
) -> Result<Inbound, TransportError> {
    let bytes = match msg {
        None | Some(Ok(Message::Close(_))) => return Ok(Inbound::Closed),
        Some(Err(e)) => return Err(TransportError::Protocol(e.to_string())),
        Some(Ok(Message::Text(text))) => text.into_bytes(),
        Some(Ok(Message::Binary(bytes))) => bytes,
        Some(Ok(_)) => return Ok(Inbound::Ignored),
    };

    serde_json::from_slice::<ServerMessage>(&bytes)
        .map(Inbound::Message)
        .map_err(|e| TransportError::Protocol(format!("malformed server message: {}", e)))
}
