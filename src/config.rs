use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::tutor::DEFAULT_ENDPOINT;
use crate::avatar::Gender;
use crate::error::{Error, Result};
use crate::voice::endpoint::EndpointConfig;
use crate::voice::synth::DEFAULT_PROGRAM;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Tutor backend `POST` URL
    pub endpoint: String,
    /// Directory holding `models/` and `animations/`
    pub asset_root: PathBuf,
    /// `male` or `female`; empty means ask at startup
    pub default_avatar: String,
    pub groq_api_key: String,
    pub stt_model: String,
    pub tts_program: String,
    pub silence_threshold: f32,
    pub trailing_silence_ms: u64,
    pub no_speech_timeout_ms: u64,
    pub max_utterance_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        let endpoint = EndpointConfig::default();
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            asset_root: PathBuf::from("assets"),
            default_avatar: String::new(),
            groq_api_key: String::new(),
            stt_model: "whisper-large-v3-turbo".to_string(),
            tts_program: DEFAULT_PROGRAM.to_string(),
            silence_threshold: endpoint.threshold,
            trailing_silence_ms: endpoint.trailing_silence.as_millis() as u64,
            no_speech_timeout_ms: endpoint.no_speech_timeout.as_millis() as u64,
            max_utterance_ms: endpoint.max_utterance.as_millis() as u64,
        }
    }
}

impl Config {
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("teacherbot");
        config_dir.join("config.toml")
    }

    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Read `path`, falling back to defaults (written back on first run).
    pub fn load_from(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(config) => {
                        log::info!("Loaded config from {}", path.display());
                        return config.with_env_fallback();
                    }
                    Err(e) => {
                        log::warn!("Failed to parse config: {}. Using defaults.", e);
                    }
                },
                Err(e) => {
                    log::warn!("Failed to read config: {}. Using defaults.", e);
                }
            }
            return Config::default().with_env_fallback();
        }

        let config = Config::default();
        if let Err(e) = config.save_to(path) {
            log::warn!("Could not write default config: {}", e);
        }
        config.with_env_fallback()
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, contents)?;
        log::info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Use env vars as fallback if config keys are empty
    fn with_env_fallback(mut self) -> Self {
        if self.groq_api_key.is_empty() {
            if let Ok(key) = std::env::var("GROQ_API_KEY") {
                self.groq_api_key = key;
            }
        }
        if let Ok(endpoint) = std::env::var("TEACHERBOT_ENDPOINT") {
            if self.endpoint == DEFAULT_ENDPOINT && !endpoint.is_empty() {
                self.endpoint = endpoint;
            }
        }
        self
    }

    pub fn default_avatar(&self) -> Option<Gender> {
        let tag = self.default_avatar.trim().to_ascii_lowercase();
        if tag.is_empty() {
            None
        } else {
            Some(Gender::from_tag(&tag))
        }
    }

    pub fn endpointing(&self) -> EndpointConfig {
        EndpointConfig {
            threshold: self.silence_threshold,
            trailing_silence: Duration::from_millis(self.trailing_silence_ms),
            no_speech_timeout: Duration::from_millis(self.no_speech_timeout_ms),
            max_utterance: Duration::from_millis(self.max_utterance_ms),
        }
    }
}
