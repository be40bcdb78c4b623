//! TOML configuration file loading
//!
//! Supports `~/.config/omni/voice-assistant/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.
//! Secrets and `PULSE_SERVER` are never read from this file, they only come from the
//! environment.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::Result;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssistantConfigFile {
    /// Azure OpenAI settings (non-secret)
    #[serde(default)]
    pub openai: OpenAiFileConfig,

    /// Whisper transcription settings
    #[serde(default)]
    pub transcription: TranscriptionFileConfig,

    /// Chat completion settings
    #[serde(default)]
    pub chat: ChatFileConfig,

    /// Speech synthesis settings
    #[serde(default)]
    pub tts: TtsFileConfig,

    /// Azure Speech service settings (non-secret)
    #[serde(default)]
    pub speech: SpeechFileConfig,

    /// Recording/playback settings
    #[serde(default)]
    pub audio: AudioFileConfig,

    /// HTTP client settings
    #[serde(default)]
    pub http: HttpFileConfig,
}

/// Azure OpenAI resource
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpenAiFileConfig {
    /// Resource base URL
    pub endpoint: Option<String>,
    /// API version pin (e.g. "2024-05-01-preview")
    pub api_version: Option<String>,
}

/// Whisper transcription configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TranscriptionFileConfig {
    /// Whisper deployment name
    pub model: Option<String>,
    /// Language hint (ISO 639-1, e.g. "en")
    pub language: Option<String>,
}

/// Chat completion configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChatFileConfig {
    /// Chat deployment name
    pub model: Option<String>,
    /// System prompt sent first in every request
    pub system_prompt: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub frequency_penalty: Option<f32>,
    pub presence_penalty: Option<f32>,
    /// Number of history messages kept between turns
    pub history_limit: Option<usize>,
}

/// Speech synthesis configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TtsFileConfig {
    /// "azure-speech" or "openai"
    pub backend: Option<String>,
    /// Azure OpenAI TTS deployment name
    pub model: Option<String>,
    /// Azure OpenAI TTS voice (e.g. "alloy")
    pub voice: Option<String>,
}

/// Azure Speech service configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpeechFileConfig {
    /// Service region (e.g. "eastus")
    pub region: Option<String>,
    /// Neural voice name
    pub voice_name: Option<String>,
    /// Full endpoint override (defaults to the regional endpoint)
    pub endpoint: Option<String>,
}

/// Recording/playback configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AudioFileConfig {
    /// Upper bound on a single recording, in seconds
    pub max_duration_secs: Option<f64>,
    /// Trailing silence that ends a recording, in seconds
    pub max_silence_secs: Option<f64>,
    /// WebRTC VAD aggressiveness (0-3)
    pub vad_mode: Option<u8>,
}

/// HTTP client configuration
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpFileConfig {
    /// Per-request timeout in seconds
    pub timeout_secs: Option<u64>,
}

/// Load the TOML config file from the standard path
///
/// Returns `AssistantConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> AssistantConfigFile {
    let Some(path) = config_file_path() else {
        return AssistantConfigFile::default();
    };

    if !path.exists() {
        return AssistantConfigFile::default();
    }

    match load_config_file_from(&path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to load config file, using defaults"
            );
            AssistantConfigFile::default()
        }
    }
}

/// Load a config file from an explicit path
///
/// Unlike [`load_config_file`], a missing or malformed file is an error here
///
/// # Errors
///
/// Returns error if the file cannot be read or parsed
pub fn load_config_file_from(path: &Path) -> Result<AssistantConfigFile> {
    let content = std::fs::read_to_string(path)?;
    let config = toml::from_str(&content)?;
    tracing::info!(path = %path.display(), "loaded config file");
    Ok(config)
}

/// Return the config file path: `~/.config/omni/voice-assistant/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| {
        d.config_dir()
            .join("omni")
            .join("voice-assistant")
            .join("config.toml")
    })
}
