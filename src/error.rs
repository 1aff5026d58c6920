//! Error types for the voice session and its collaborators
//!
//! Each enum covers one failure family. Boundary code absorbs these and turns
//! them into a state transition or a fallback value; none of them is meant to
//! reach the HTTP layer as a crash.

use thiserror::Error;

/// Microphone acquisition failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// The user (or the OS) refused access to the input device
    #[error("Microphone permission denied: {0}")]
    PermissionDenied(String),

    /// No usable input device
    #[error("Capture device unavailable: {0}")]
    DeviceUnavailable(String),

    /// `start()` called while frames are already flowing
    #[error("Capture pipeline is already streaming")]
    AlreadyStreaming,
}

/// Inbound audio that could not be turned into a playable buffer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Invalid base64 payload: {0}")]
    InvalidEncoding(String),

    #[error("Payload length {len} is not a multiple of {channels} channel(s) x 2 bytes")]
    MisalignedLength { len: usize, channels: u16 },

    #[error("Channel count must be at least 1")]
    ZeroChannels,
}

/// Connection-level failures of the streaming transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Failed to connect: {0}")]
    Connect(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Connection closed")]
    Closed,
}

/// Failures of the request/response content services
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Service returned no content")]
    Empty,

    #[error("No API key configured")]
    MissingCredential,
}

/// Output device failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("Audio output error: {0}")]
    Device(String),
}

/// Reward marketplace failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RewardError {
    #[error("Reward not found: {0}")]
    UnknownReward(String),

    #[error("Insufficient points: need {cost}, have {available}")]
    InsufficientPoints { cost: u32, available: u32 },
}

/// Spot report failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReportError {
    #[error("Lot not found: {0}")]
    UnknownLot(String),
}
