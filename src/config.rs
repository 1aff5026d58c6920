use anyhow::{bail, Result};
use serde::Deserialize;
use std::time::Duration;

use crate::live::websocket::DEFAULT_LIVE_ENDPOINT;
use crate::live::LiveConfig;
use crate::session::SessionConfig;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Credential for the voice and content services
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub voice: VoiceConfig,
    #[serde(default)]
    pub assistant: AssistantConfig,
    #[serde(default)]
    pub campus: CampusConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "parkeasy".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub endpoint: String,
    pub model: String,
    pub voice_name: String,
    pub system_instruction: String,
    pub input_sample_rate: u32,
    pub output_sample_rate: u32,
    pub output_channels: u16,
    /// Samples per captured frame
    pub frame_size: usize,
    /// Outbound payloads held while the session is connecting
    pub pending_capacity: usize,
    /// WAV file standing in for the microphone when serving
    pub input_wav: Option<String>,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            endpoint: DEFAULT_LIVE_ENDPOINT.to_string(),
            model: session.live.model,
            voice_name: session.live.voice_name,
            system_instruction: session.live.system_instruction,
            input_sample_rate: 16000,
            output_sample_rate: session.output_sample_rate,
            output_channels: session.output_channels,
            frame_size: 4096,
            pending_capacity: 64,
            input_wav: None,
        }
    }
}

impl VoiceConfig {
    fn validate(&self) -> Result<()> {
        if self.input_sample_rate == 0 || self.output_sample_rate == 0 {
            bail!("voice sample rates must be non-zero");
        }
        if self.frame_size == 0 {
            bail!("voice.frame_size must be non-zero");
        }
        if self.output_channels == 0 {
            bail!("voice.output_channels must be non-zero");
        }
        Ok(())
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            live: LiveConfig {
                model: self.model.clone(),
                response_modality: "AUDIO".to_string(),
                voice_name: self.voice_name.clone(),
                system_instruction: self.system_instruction.clone(),
            },
            output_sample_rate: self.output_sample_rate,
            output_channels: self.output_channels,
        }
    }

    pub fn capture_config(&self) -> crate::audio::CaptureConfig {
        crate::audio::CaptureConfig {
            sample_rate: self.input_sample_rate,
            frame_size: self.frame_size,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    pub endpoint: String,
    /// Chat advice, predictions and event alerts
    pub text_model: String,
    /// Maps-grounded amenity lookups
    pub grounded_model: String,
    /// Badge artwork
    pub image_model: String,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            text_model: "gemini-3-flash-preview".to_string(),
            grounded_model: "gemini-2.5-flash".to_string(),
            image_model: "gemini-2.5-flash-image".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CampusConfig {
    pub tick_interval_secs: u64,
    /// Chance that a lot's availability moves on each tick
    pub change_probability: f64,
    pub notification_ttl_secs: u64,
    pub notification_limit: usize,
}

impl Default for CampusConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 10,
            change_probability: 0.2,
            notification_ttl_secs: 4,
            notification_limit: 3,
        }
    }
}

impl CampusConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs.max(1))
    }

    pub fn notification_ttl(&self) -> Duration {
        Duration::from_secs(self.notification_ttl_secs)
    }
}

impl Config {
    /// Load `path` (extension optional) layered under `PARKEASY__*` variables
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("PARKEASY").separator("__"))
            .build()?;

        let mut cfg: Config = settings.try_deserialize()?;
        cfg.fill_api_key_from_env();
        cfg.voice.validate()?;
        Ok(cfg)
    }

    /// Parse a TOML document (no environment layering)
    pub fn from_toml(toml: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?;

        let cfg: Config = settings.try_deserialize()?;
        cfg.voice.validate()?;
        Ok(cfg)
    }

    fn fill_api_key_from_env(&mut self) {
        if self.api_key.as_deref().map_or(true, str::is_empty) {
            self.api_key = ["API_KEY", "GEMINI_API_KEY"]
                .iter()
                .find_map(|name| std::env::var(name).ok().filter(|v| !v.is_empty()));
        }
    }
}
