pub mod assistant;
pub mod audio;
pub mod campus;
pub mod config;
pub mod error;
pub mod http;
pub mod live;
pub mod session;

pub use assistant::{ContentModel, GeminiClient, ParkingAssistant};
pub use audio::{
    AudioFile, AudioFrame, CaptureBackend, CaptureConfig, CapturePipeline, EncodedPayload,
    OutputDevice, PcmBuffer, PlaybackScheduler, WavFileBackend, WavRenderOutput,
};
pub use campus::{Campus, ParkingLot};
pub use config::Config;
pub use http::{create_router, AppState};
pub use live::{GeminiLiveTransport, Transport, TransportEvent, TransportLink};
pub use session::{SessionConfig, SessionController, SessionPhase, SessionStats, VoiceSessionHandle};
