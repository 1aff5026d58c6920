use crate::live::LiveConfig;

/// Configuration for a voice session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// What to request from the remote model
    pub live: LiveConfig,

    /// Sample rate of inbound model audio (Live replies at 24kHz)
    pub output_sample_rate: u32,

    /// Channel count of inbound model audio
    pub output_channels: u16,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            live: LiveConfig {
                model: "gemini-2.5-flash-native-audio-preview-09-2025".to_string(),
                response_modality: "AUDIO".to_string(),
                voice_name: "Zephyr".to_string(),
                system_instruction: "You are a hands-free parking assistant for university students. \
                    Help them report spots or find parking while they are driving. \
                    Keep responses brief and helpful."
                    .to_string(),
            },
            output_sample_rate: 24000,
            output_channels: 1,
        }
    }
}
