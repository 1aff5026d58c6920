//! Streaming link to the remote voice model
//!
//! - `transport` defines the connection contract used by the session
//! - `websocket` implements it against the Gemini Live API
//! - `messages` holds the JSON wire types

pub mod messages;
pub mod transport;
pub mod websocket;

pub use messages::{InlineData, ServerContent};
pub use transport::{Connection, LinkSink, LiveConfig, Transport, TransportEvent, TransportLink};
pub use websocket::GeminiLiveTransport;
