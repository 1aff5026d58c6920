use crate::assistant::ParkingAssistant;
use crate::campus::Campus;
use crate::session::VoiceSessionHandle;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Lots, profile and notifications
    pub campus: Campus,

    pub assistant: ParkingAssistant,

    /// Present only when a capture source is configured
    pub voice: Option<VoiceSessionHandle>,
}

impl AppState {
    pub fn new(campus: Campus, assistant: ParkingAssistant) -> Self {
        Self {
            campus,
            assistant,
            voice: None,
        }
    }

    pub fn with_voice(mut self, voice: VoiceSessionHandle) -> Self {
        self.voice = Some(voice);
        self
    }
}
