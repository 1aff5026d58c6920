//! Voice session management
//!
//! This module provides the `SessionController` that manages:
//! - The Idle -> Connecting -> Active -> Idle lifecycle
//! - Starting capture once the remote session opens
//! - Scheduling inbound model audio for playback
//! - Teardown on user stop, remote close or transport error

mod config;
mod controller;
mod handle;
mod stats;

pub use config::SessionConfig;
pub use controller::{SessionController, SessionState};
pub use handle::VoiceSessionHandle;
pub use stats::{SessionPhase, SessionStats};
