pub mod backend;
pub mod capture;
pub mod codec;
#[cfg(feature = "cpal")]
pub mod device;
pub mod file;
pub mod output;
pub mod playback;

pub use backend::{AudioFrame, CaptureBackend, CaptureConfig};
pub use capture::{CapturePipeline, CaptureState, FrameSink};
pub use codec::{decode, encode, EncodedPayload, PcmBuffer};
#[cfg(feature = "cpal")]
pub use device::{CpalCaptureBackend, CpalOutputDevice};
pub use file::{AudioFile, WavFileBackend};
pub use output::{RenderedTimeline, WavRenderOutput};
pub use playback::{OutputDevice, PlaybackScheduler, ScheduledSegment, SegmentId};
