// PCM codec for the voice link
//
// Outbound: f32 samples in [-1.0, 1.0] -> i16 little-endian -> base64.
// Inbound:  base64 -> i16 little-endian (interleaved) -> per-channel f32.

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::DecodeError;

/// Scale between normalized floats and 16-bit integers
const PCM_SCALE: f32 = 32768.0;

/// A base64 audio chunk plus its MIME metadata, ready for the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedPayload {
    /// Base64-encoded little-endian i16 PCM
    pub data: String,
    /// e.g. `audio/pcm;rate=16000`
    pub mime_type: String,
}

impl EncodedPayload {
    pub fn pcm(data: String, sample_rate: u32) -> Self {
        Self {
            data,
            mime_type: pcm_mime_type(sample_rate),
        }
    }
}

pub fn pcm_mime_type(sample_rate: u32) -> String {
    format!("audio/pcm;rate={}", sample_rate)
}

/// Decoded audio, one sample vector per channel
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    pub channels: Vec<Vec<f32>>,
    pub sample_rate: u32,
}

impl PcmBuffer {
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            channels: vec![samples],
            sample_rate,
        }
    }

    /// Samples per channel
    pub fn frame_count(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }

    pub fn channel_count(&self) -> u16 {
        self.channels.len() as u16
    }

    /// Average of all channels, frame by frame
    pub fn downmix(&self) -> Vec<f32> {
        let channels = self.channels.len().max(1) as f32;
        (0..self.frame_count())
            .map(|i| self.channels.iter().map(|c| c[i]).sum::<f32>() / channels)
            .collect()
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count() as f64 / self.sample_rate as f64
    }
}

/// Quantize samples to little-endian i16 bytes.
///
/// Values are scaled by 32768 and truncated toward zero; out-of-range input
/// saturates at the i16 bounds.
pub fn samples_to_pcm_bytes(samples: &[f32]) -> Vec<u8> {
    samples
        .iter()
        .flat_map(|&s| ((s * PCM_SCALE) as i16).to_le_bytes())
        .collect()
}

/// Encode one captured frame into the transport's text-safe form
pub fn encode(samples: &[f32]) -> String {
    base64::engine::general_purpose::STANDARD.encode(samples_to_pcm_bytes(samples))
}

/// Decode an inbound base64 chunk into a per-channel float buffer.
///
/// Fails when the byte length is not a whole number of interleaved frames.
pub fn decode(data: &str, sample_rate: u32, channels: u16) -> Result<PcmBuffer, DecodeError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| DecodeError::InvalidEncoding(e.to_string()))?;

    pcm_bytes_to_buffer(&bytes, sample_rate, channels)
}

/// De-interleave little-endian i16 bytes into a float buffer
pub fn pcm_bytes_to_buffer(
    bytes: &[u8],
    sample_rate: u32,
    channels: u16,
) -> Result<PcmBuffer, DecodeError> {
    if channels == 0 {
        return Err(DecodeError::ZeroChannels);
    }

    let stride = channels as usize * 2;
    if bytes.len() % stride != 0 {
        return Err(DecodeError::MisalignedLength {
            len: bytes.len(),
            channels,
        });
    }

    let frame_count = bytes.len() / stride;
    let mut out = vec![Vec::with_capacity(frame_count); channels as usize];

    for frame in bytes.chunks_exact(stride) {
        for (channel, sample) in frame.chunks_exact(2).enumerate() {
            let value = i16::from_le_bytes([sample[0], sample[1]]);
            out[channel].push(value as f32 / PCM_SCALE);
        }
    }

    Ok(PcmBuffer {
        channels: out,
        sample_rate,
    })
}
