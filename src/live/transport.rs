use std::sync::Arc;
use tokio::sync::mpsc;

use super::messages::ServerContent;
use crate::audio::{EncodedPayload, FrameSink};
use crate::error::TransportError;

/// What to ask of the remote voice model when connecting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveConfig {
    /// Model identifier without the `models/` prefix
    pub model: String,
    /// Requested response modality (always audio for voice sessions)
    pub response_modality: String,
    /// Prebuilt voice name
    pub voice_name: String,
    pub system_instruction: String,
}

/// Events delivered by an open connection, in arrival order
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Remote acknowledged the session; audio may flow
    Open,
    /// One model-turn update, possibly carrying audio
    Message(ServerContent),
    /// Remote ended the session
    Close,
    /// Transport-level failure; the connection is unusable
    Error(String),
}

/// Sending half of a connection
pub trait TransportLink: Send + Sync {
    /// Queue one encoded chunk. Never blocks; may drop when the queue is full.
    fn send(&self, payload: EncodedPayload);

    /// Ask the remote to end the session. Idempotent.
    fn close(&self);

    fn is_closed(&self) -> bool;

    /// Payloads dropped because the outbound queue was full
    fn dropped_payloads(&self) -> u64 {
        0
    }
}

/// A dialing or open connection
pub struct Connection {
    pub link: Arc<dyn TransportLink>,
    pub events: mpsc::Receiver<TransportEvent>,
}

/// Factory for connections to the remote voice service
///
/// `connect` returns as soon as dialing has begun. The `Open` event arrives
/// on the connection's event channel once the remote accepts the session;
/// failures after that point arrive as `Error` followed by `Close`.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, config: &LiveConfig) -> Result<Connection, TransportError>;
}

/// Adapts a transport link to the capture pipeline's sink
pub struct LinkSink {
    link: Arc<dyn TransportLink>,
}

impl LinkSink {
    pub fn new(link: Arc<dyn TransportLink>) -> Self {
        Self { link }
    }
}

impl FrameSink for LinkSink {
    fn send(&self, payload: EncodedPayload) {
        if !self.link.is_closed() {
            self.link.send(payload);
        }
    }
}
