//! Session configuration
//!
//! Resolves the environment-variable contract (plus the optional TOML
//! overlay) into a [`Config`] that is loaded once and never mutated by the
//! pipeline. Each stage asks for its own validated settings
//! ([`Config::transcription`], [`Config::chat`], [`Config::synthesis`]) and
//! fails with the name of the first missing variable.

pub mod file;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::{Error, Result};

use self::file::AssistantConfigFile;

/// Environment variable names
pub mod vars {
    pub const AZURE_OPENAI_ENDPOINT: &str = "AZURE_OPENAI_ENDPOINT";
    pub const AZURE_OPENAI_API_KEY: &str = "AZURE_OPENAI_API_KEY";
    pub const AZURE_API_VERSION: &str = "AZURE_API_VERSION";
    pub const MODEL_NAME: &str = "MODEL_NAME";
    pub const WHISPER_MODEL_NAME: &str = "WHISPER_MODEL_NAME";
    pub const TTS_MODEL_NAME: &str = "TTS_MODEL_NAME";
    pub const TTS_VOICE_NAME: &str = "TTS_VOICE_NAME";
    pub const AZURE_SPEECH_KEY: &str = "AZURE_SPEECH_KEY";
    pub const AZURE_SPEECH_REGION: &str = "AZURE_SPEECH_REGION";
    pub const VOICE_NAME: &str = "VOICE_NAME";
    pub const PULSE_SERVER: &str = "PULSE_SERVER";
    pub const TTS_BACKEND: &str = "TTS_BACKEND";
}

/// One entry of the environment contract
#[derive(Debug, Clone, Copy)]
pub struct VarInfo {
    pub name: &'static str,
    pub role: &'static str,
    pub secret: bool,
}

/// Every variable the assistant reads, in display order
pub const ENV_CONTRACT: &[VarInfo] = &[
    VarInfo {
        name: vars::AZURE_OPENAI_ENDPOINT,
        role: "chat completion service base URL",
        secret: false,
    },
    VarInfo {
        name: vars::AZURE_OPENAI_API_KEY,
        role: "chat completion service credential",
        secret: true,
    },
    VarInfo {
        name: vars::AZURE_API_VERSION,
        role: "API version pin for chat service",
        secret: false,
    },
    VarInfo {
        name: vars::MODEL_NAME,
        role: "chat model identifier",
        secret: false,
    },
    VarInfo {
        name: vars::WHISPER_MODEL_NAME,
        role: "transcription model identifier",
        secret: false,
    },
    VarInfo {
        name: vars::TTS_MODEL_NAME,
        role: "speech-synthesis model identifier",
        secret: false,
    },
    VarInfo {
        name: vars::TTS_VOICE_NAME,
        role: "voice selection for TTS model",
        secret: false,
    },
    VarInfo {
        name: vars::AZURE_SPEECH_KEY,
        role: "Azure Speech service credential",
        secret: true,
    },
    VarInfo {
        name: vars::AZURE_SPEECH_REGION,
        role: "Azure Speech service region",
        secret: false,
    },
    VarInfo {
        name: vars::VOICE_NAME,
        role: "voice selection for Azure Speech service",
        secret: false,
    },
    VarInfo {
        name: vars::PULSE_SERVER,
        role: "audio server socket address",
        secret: false,
    },
    VarInfo {
        name: vars::TTS_BACKEND,
        role: "synthesis backend (azure-speech | openai)",
        secret: false,
    },
];

/// Azure Speech voice used when `VOICE_NAME` is unset
pub const DEFAULT_VOICE_NAME: &str = "zh-CN-XiaoxiaoMultilingualNeural";

/// System prompt used when none is configured
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant. Please respond naturally in \
    the language used by the user, utilizing human-like expressions and emotions. Show \
    understanding, empathy, and adaptability. Avoid disclosing your AI identity.";

/// Which service turns chat responses into audio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TtsBackend {
    /// Azure Speech REST API with SSML (`AZURE_SPEECH_*`, `VOICE_NAME`)
    #[default]
    AzureSpeech,
    /// Azure OpenAI audio/speech deployment (`TTS_MODEL_NAME`, `TTS_VOICE_NAME`)
    OpenAi,
}

impl FromStr for TtsBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "azure-speech" | "azure_speech" | "azure" | "speech" => Ok(Self::AzureSpeech),
            "openai" | "azure-openai" => Ok(Self::OpenAi),
            other => Err(Error::InvalidVar {
                key: vars::TTS_BACKEND,
                reason: format!("unknown backend '{other}', expected 'azure-speech' or 'openai'"),
            }),
        }
    }
}

impl fmt::Display for TtsBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AzureSpeech => "azure-speech",
            Self::OpenAi => "openai",
        })
    }
}

/// Resolved session configuration
#[derive(Debug)]
pub struct Config {
    /// Azure OpenAI resource and deployments
    pub openai: OpenAiConfig,

    /// Azure Speech service
    pub speech: SpeechConfig,

    /// Recording configuration
    pub audio: AudioConfig,

    /// Chat completion parameters
    pub chat: ChatConfig,

    /// Selected synthesis backend
    pub tts_backend: TtsBackend,

    /// Per-request HTTP timeout
    pub http_timeout: Duration,
}

/// Azure OpenAI settings as found in the environment (unvalidated)
#[derive(Debug, Default)]
pub struct OpenAiConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<SecretString>,
    pub api_version: Option<String>,
    /// Chat deployment (`MODEL_NAME`)
    pub chat_model: Option<String>,
    /// Whisper deployment (`WHISPER_MODEL_NAME`)
    pub whisper_model: Option<String>,
    /// TTS deployment (`TTS_MODEL_NAME`)
    pub tts_model: Option<String>,
    /// TTS voice (`TTS_VOICE_NAME`)
    pub tts_voice: Option<String>,
    /// Whisper language hint
    pub language: Option<String>,
}

/// Azure Speech settings as found in the environment (unvalidated)
#[derive(Debug)]
pub struct SpeechConfig {
    pub key: Option<SecretString>,
    pub region: Option<String>,
    pub voice_name: String,
    pub endpoint: Option<String>,
}

/// Recording configuration
#[derive(Debug, Clone)]
pub struct AudioConfig {
    /// `PULSE_SERVER`, read by the audio backend itself
    pub pulse_server: Option<String>,
    /// Upper bound on a single recording
    pub max_duration: Duration,
    /// Trailing silence that ends a recording
    pub max_silence: Duration,
    /// WebRTC VAD aggressiveness (0-3)
    pub vad_mode: u8,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            pulse_server: None,
            max_duration: Duration::from_secs(60),
            max_silence: Duration::from_secs(1),
            vad_mode: 3,
        }
    }
}

impl AudioConfig {
    /// Filesystem path of the PulseAudio socket, if `PULSE_SERVER` names one
    #[must_use]
    pub fn pulse_socket_path(&self) -> Option<PathBuf> {
        let server = self.pulse_server.as_deref()?;
        let path = server.strip_prefix("unix:").unwrap_or(server);
        path.starts_with('/').then(|| PathBuf::from(path))
    }

    /// Log where audio will be routed and warn about a dangling socket
    pub fn log_audio_server(&self) {
        match (&self.pulse_server, self.pulse_socket_path()) {
            (Some(server), Some(path)) if !path.exists() => {
                tracing::warn!(pulse_server = %server, "PULSE_SERVER socket does not exist");
            }
            (Some(server), _) => tracing::debug!(pulse_server = %server, "using audio server"),
            (None, _) => tracing::debug!("using default audio server"),
        }
    }
}

/// Chat completion parameters
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub system_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
    /// Number of history messages kept between turns
    pub history_limit: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_tokens: 4096,
            temperature: 0.7,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            history_limit: 20,
        }
    }
}

/// Validated Azure OpenAI resource (endpoint, credential, API version)
#[derive(Debug)]
pub struct AzureOpenAiResource {
    pub endpoint: Url,
    pub api_key: SecretString,
    pub api_version: String,
}

impl AzureOpenAiResource {
    /// URL of an operation on a deployment, e.g. `chat/completions`
    #[must_use]
    pub fn deployment_url(&self, deployment: &str, operation: &str) -> String {
        format!(
            "{}/openai/deployments/{deployment}/{operation}?api-version={}",
            self.endpoint.as_str().trim_end_matches('/'),
            self.api_version
        )
    }
}

/// Everything the transcription stage needs
#[derive(Debug)]
pub struct TranscriptionSettings {
    pub resource: AzureOpenAiResource,
    pub model: String,
    pub language: Option<String>,
    pub timeout: Duration,
}

/// Everything the chat stage needs
#[derive(Debug)]
pub struct ChatSettings {
    pub resource: AzureOpenAiResource,
    pub model: String,
    pub params: ChatConfig,
    pub timeout: Duration,
}

/// Everything the synthesis stage needs, per backend
#[derive(Debug)]
pub enum SynthesisSettings {
    AzureSpeech(AzureSpeechSettings),
    OpenAi(OpenAiTtsSettings),
}

/// Azure Speech synthesis settings
#[derive(Debug)]
pub struct AzureSpeechSettings {
    pub key: SecretString,
    pub region: String,
    pub voice_name: String,
    pub endpoint: String,
    pub timeout: Duration,
}

/// Azure OpenAI TTS settings
#[derive(Debug)]
pub struct OpenAiTtsSettings {
    pub resource: AzureOpenAiResource,
    pub model: String,
    pub voice: String,
    pub timeout: Duration,
}

/// Presence of one contract variable, for reporting
#[derive(Debug, Clone)]
pub struct VarReport {
    pub info: VarInfo,
    /// Display value; secrets are masked
    pub value: Option<String>,
    /// Whether the selected backend needs it
    pub required: bool,
}

/// Load a `.env` file into the process environment
///
/// Variables already set in the environment win. With no explicit path a
/// missing `.env` is fine; an explicit path must exist.
///
/// # Errors
///
/// Returns error if the file exists but cannot be parsed, or an explicit path is missing
pub fn load_dotenv(path: Option<&Path>) -> Result<Option<PathBuf>> {
    let loaded = match path {
        Some(p) => dotenvy::from_path(p).map(|()| p.to_path_buf()),
        None => dotenvy::dotenv(),
    };

    match loaded {
        Ok(p) => {
            tracing::debug!(path = %p.display(), "loaded .env file");
            Ok(Some(p))
        }
        Err(e) if e.not_found() && path.is_none() => {
            tracing::debug!("no .env file found");
            Ok(None)
        }
        Err(e) => Err(Error::Config(format!("failed to load .env file: {e}"))),
    }
}

/// Trim a value, treating empty strings as absent
fn trimmed(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

/// Read a variable, treating empty values as absent
fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    trimmed(lookup(key).as_deref())
}

/// Read a variable, falling back to the config file; empty values are absent in both
fn layered<F>(lookup: &F, key: &str, file_value: Option<&str>) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    non_empty(lookup, key).or_else(|| trimmed(file_value))
}

fn duration_secs(key: &'static str, secs: f64, allow_zero: bool) -> Result<Duration> {
    let valid = secs.is_finite() && if allow_zero { secs >= 0.0 } else { secs > 0.0 };
    if !valid {
        return Err(Error::InvalidVar {
            key,
            reason: format!("expected a positive number of seconds, got {secs}"),
        });
    }
    Ok(Duration::from_secs_f64(secs))
}

impl Config {
    /// Load configuration from the process environment and the default config file
    ///
    /// # Errors
    ///
    /// Returns error if a present value is invalid
    pub fn from_env() -> Result<Self> {
        Self::from_sources(|k| std::env::var(k).ok(), &file::load_config_file())
    }

    /// Load configuration from the process environment and an explicit config file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be loaded or a present value is invalid
    pub fn from_env_with_file(path: &Path) -> Result<Self> {
        let fc = file::load_config_file_from(path)?;
        Self::from_sources(|k| std::env::var(k).ok(), &fc)
    }

    /// Build configuration from a variable lookup and a parsed config file
    ///
    /// Precedence: lookup > file > default. Missing variables are not an
    /// error here; they surface when a stage asks for its settings.
    ///
    /// # Errors
    ///
    /// Returns error if a present value is invalid
    pub fn from_sources<F>(lookup: F, fc: &AssistantConfigFile) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let openai = OpenAiConfig {
            endpoint: layered(
                &lookup,
                vars::AZURE_OPENAI_ENDPOINT,
                fc.openai.endpoint.as_deref(),
            ),
            api_key: non_empty(&lookup, vars::AZURE_OPENAI_API_KEY).map(SecretString::from),
            api_version: layered(
                &lookup,
                vars::AZURE_API_VERSION,
                fc.openai.api_version.as_deref(),
            ),
            chat_model: layered(&lookup, vars::MODEL_NAME, fc.chat.model.as_deref()),
            whisper_model: layered(
                &lookup,
                vars::WHISPER_MODEL_NAME,
                fc.transcription.model.as_deref(),
            ),
            tts_model: layered(&lookup, vars::TTS_MODEL_NAME, fc.tts.model.as_deref()),
            tts_voice: layered(&lookup, vars::TTS_VOICE_NAME, fc.tts.voice.as_deref()),
            language: trimmed(fc.transcription.language.as_deref()),
        };

        let speech = SpeechConfig {
            key: non_empty(&lookup, vars::AZURE_SPEECH_KEY).map(SecretString::from),
            region: layered(
                &lookup,
                vars::AZURE_SPEECH_REGION,
                fc.speech.region.as_deref(),
            ),
            voice_name: layered(&lookup, vars::VOICE_NAME, fc.speech.voice_name.as_deref())
                .unwrap_or_else(|| DEFAULT_VOICE_NAME.to_string()),
            endpoint: trimmed(fc.speech.endpoint.as_deref()),
        };

        let defaults = AudioConfig::default();
        let vad_mode = fc.audio.vad_mode.unwrap_or(defaults.vad_mode);
        if vad_mode > 3 {
            return Err(Error::InvalidVar {
                key: "audio.vad_mode",
                reason: format!("expected 0-3, got {vad_mode}"),
            });
        }
        let audio = AudioConfig {
            pulse_server: non_empty(&lookup, vars::PULSE_SERVER),
            max_duration: match fc.audio.max_duration_secs {
                Some(secs) => duration_secs("audio.max_duration_secs", secs, false)?,
                None => defaults.max_duration,
            },
            max_silence: match fc.audio.max_silence_secs {
                Some(secs) => duration_secs("audio.max_silence_secs", secs, true)?,
                None => defaults.max_silence,
            },
            vad_mode,
        };

        let chat_defaults = ChatConfig::default();
        let chat = ChatConfig {
            system_prompt: fc
                .chat
                .system_prompt
                .clone()
                .unwrap_or(chat_defaults.system_prompt),
            max_tokens: fc.chat.max_tokens.unwrap_or(chat_defaults.max_tokens),
            temperature: fc.chat.temperature.unwrap_or(chat_defaults.temperature),
            top_p: fc.chat.top_p.unwrap_or(chat_defaults.top_p),
            frequency_penalty: fc
                .chat
                .frequency_penalty
                .unwrap_or(chat_defaults.frequency_penalty),
            presence_penalty: fc
                .chat
                .presence_penalty
                .unwrap_or(chat_defaults.presence_penalty),
            history_limit: fc.chat.history_limit.unwrap_or(chat_defaults.history_limit),
        };
        if !(0.0..=2.0).contains(&chat.temperature) {
            return Err(Error::InvalidVar {
                key: "chat.temperature",
                reason: format!("expected 0.0-2.0, got {}", chat.temperature),
            });
        }

        let tts_backend = match layered(&lookup, vars::TTS_BACKEND, fc.tts.backend.as_deref()) {
            Some(s) => s.parse()?,
            None => TtsBackend::default(),
        };

        let http_timeout = match fc.http.timeout_secs {
            Some(0) => {
                return Err(Error::InvalidVar {
                    key: "http.timeout_secs",
                    reason: "expected a positive number of seconds, got 0".to_string(),
                });
            }
            Some(secs) => Duration::from_secs(secs),
            None => Duration::from_secs(60),
        };

        Ok(Self {
            openai,
            speech,
            audio,
            chat,
            tts_backend,
            http_timeout,
        })
    }

    /// Validated Azure OpenAI resource shared by transcription, chat and OpenAI TTS
    ///
    /// # Errors
    ///
    /// Returns `MissingVar`/`InvalidVar` for the first unusable variable
    pub fn openai_resource(&self) -> Result<AzureOpenAiResource> {
        let raw = self
            .openai
            .endpoint
            .as_deref()
            .ok_or(Error::MissingVar(vars::AZURE_OPENAI_ENDPOINT))?;
        let endpoint = Url::parse(raw).map_err(|e| Error::InvalidVar {
            key: vars::AZURE_OPENAI_ENDPOINT,
            reason: e.to_string(),
        })?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(Error::InvalidVar {
                key: vars::AZURE_OPENAI_ENDPOINT,
                reason: format!("unsupported scheme '{}'", endpoint.scheme()),
            });
        }

        let api_key = self
            .openai
            .api_key
            .as_ref()
            .ok_or(Error::MissingVar(vars::AZURE_OPENAI_API_KEY))?;
        let api_version = self
            .openai
            .api_version
            .clone()
            .ok_or(Error::MissingVar(vars::AZURE_API_VERSION))?;

        Ok(AzureOpenAiResource {
            endpoint,
            api_key: SecretString::from(api_key.expose_secret().to_owned()),
            api_version,
        })
    }

    /// Settings for the transcription stage
    ///
    /// # Errors
    ///
    /// Returns `MissingVar` naming the first missing variable
    pub fn transcription(&self) -> Result<TranscriptionSettings> {
        let resource = self.openai_resource()?;
        let model = self
            .openai
            .whisper_model
            .clone()
            .ok_or(Error::MissingVar(vars::WHISPER_MODEL_NAME))?;

        Ok(TranscriptionSettings {
            resource,
            model,
            language: self.openai.language.clone(),
            timeout: self.http_timeout,
        })
    }

    /// Settings for the chat stage
    ///
    /// # Errors
    ///
    /// Returns `MissingVar` naming the first missing variable
    pub fn chat(&self) -> Result<ChatSettings> {
        let resource = self.openai_resource()?;
        let model = self
            .openai
            .chat_model
            .clone()
            .ok_or(Error::MissingVar(vars::MODEL_NAME))?;

        Ok(ChatSettings {
            resource,
            model,
            params: self.chat.clone(),
            timeout: self.http_timeout,
        })
    }

    /// Settings for the synthesis stage of the selected backend
    ///
    /// # Errors
    ///
    /// Returns `MissingVar` naming the first missing variable
    pub fn synthesis(&self) -> Result<SynthesisSettings> {
        match self.tts_backend {
            TtsBackend::AzureSpeech => {
                let key = self
                    .speech
                    .key
                    .as_ref()
                    .ok_or(Error::MissingVar(vars::AZURE_SPEECH_KEY))?;
                let region = self
                    .speech
                    .region
                    .clone()
                    .ok_or(Error::MissingVar(vars::AZURE_SPEECH_REGION))?;
                let endpoint = self.speech.endpoint.clone().unwrap_or_else(|| {
                    format!("https://{region}.tts.speech.microsoft.com/cognitiveservices/v1")
                });

                Ok(SynthesisSettings::AzureSpeech(AzureSpeechSettings {
                    key: SecretString::from(key.expose_secret().to_owned()),
                    region,
                    voice_name: self.speech.voice_name.clone(),
                    endpoint,
                    timeout: self.http_timeout,
                }))
            }
            TtsBackend::OpenAi => {
                let resource = self.openai_resource()?;
                let model = self
                    .openai
                    .tts_model
                    .clone()
                    .ok_or(Error::MissingVar(vars::TTS_MODEL_NAME))?;
                let voice = self
                    .openai
                    .tts_voice
                    .clone()
                    .ok_or(Error::MissingVar(vars::TTS_VOICE_NAME))?;

                Ok(SynthesisSettings::OpenAi(OpenAiTtsSettings {
                    resource,
                    model,
                    voice,
                    timeout: self.http_timeout,
                }))
            }
        }
    }

    /// Check every stage in pipeline order, failing on the first problem
    ///
    /// # Errors
    ///
    /// Returns the first `MissingVar`/`InvalidVar` encountered
    pub fn validate(&self) -> Result<()> {
        self.transcription()?;
        self.chat()?;
        self.synthesis()?;
        Ok(())
    }

    /// Names of the variables the selected backend requires
    #[must_use]
    pub fn required_vars(&self) -> Vec<&'static str> {
        let mut required = vec![
            vars::AZURE_OPENAI_ENDPOINT,
            vars::AZURE_OPENAI_API_KEY,
            vars::AZURE_API_VERSION,
            vars::WHISPER_MODEL_NAME,
            vars::MODEL_NAME,
        ];
        match self.tts_backend {
            TtsBackend::AzureSpeech => {
                required.extend([vars::AZURE_SPEECH_KEY, vars::AZURE_SPEECH_REGION]);
            }
            TtsBackend::OpenAi => required.extend([vars::TTS_MODEL_NAME, vars::TTS_VOICE_NAME]),
        }
        required
    }

    /// Every required variable that is currently absent
    #[must_use]
    pub fn missing_vars(&self) -> Vec<&'static str> {
        self.required_vars()
            .into_iter()
            .filter(|name| self.raw_value(name).is_none())
            .collect()
    }

    /// Presence report for the whole contract, secrets masked
    #[must_use]
    pub fn var_report(&self) -> Vec<VarReport> {
        let required = self.required_vars();
        ENV_CONTRACT
            .iter()
            .map(|info| VarReport {
                info: *info,
                value: self
                    .raw_value(info.name)
                    .map(|v| if info.secret { mask(&v) } else { v }),
                required: required.contains(&info.name),
            })
            .collect()
    }

    /// Resolved value behind a contract variable
    fn raw_value(&self, name: &str) -> Option<String> {
        match name {
            vars::AZURE_OPENAI_ENDPOINT => self.openai.endpoint.clone(),
            vars::AZURE_OPENAI_API_KEY => self
                .openai
                .api_key
                .as_ref()
                .map(|k| k.expose_secret().to_owned()),
            vars::AZURE_API_VERSION => self.openai.api_version.clone(),
            vars::MODEL_NAME => self.openai.chat_model.clone(),
            vars::WHISPER_MODEL_NAME => self.openai.whisper_model.clone(),
            vars::TTS_MODEL_NAME => self.openai.tts_model.clone(),
            vars::TTS_VOICE_NAME => self.openai.tts_voice.clone(),
            vars::AZURE_SPEECH_KEY => self
                .speech
                .key
                .as_ref()
                .map(|k| k.expose_secret().to_owned()),
            vars::AZURE_SPEECH_REGION => self.speech.region.clone(),
            vars::VOICE_NAME => Some(self.speech.voice_name.clone()),
            vars::PULSE_SERVER => self.audio.pulse_server.clone(),
            vars::TTS_BACKEND => Some(self.tts_backend.to_string()),
            _ => None,
        }
    }
}

/// Mask a secret, keeping the last four characters
fn mask(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{tail}")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn full_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            (vars::AZURE_OPENAI_ENDPOINT, "https://example.openai.azure.com/"),
            (vars::AZURE_OPENAI_API_KEY, "mock-api-key-123456"),
            (vars::AZURE_API_VERSION, "2024-05-01-preview"),
            (vars::MODEL_NAME, "chat-model"),
            (vars::WHISPER_MODEL_NAME, "whisper"),
            (vars::TTS_MODEL_NAME, "tts"),
            (vars::TTS_VOICE_NAME, "alloy"),
            (vars::AZURE_SPEECH_KEY, "speech-key-abcdef"),
            (vars::AZURE_SPEECH_REGION, "eastus"),
            (vars::VOICE_NAME, "en-US-JennyNeural"),
        ])
    }

    fn load(env: &HashMap<&'static str, &'static str>) -> Config {
        Config::from_sources(
            |k| env.get(k).map(ToString::to_string),
            &AssistantConfigFile::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_complete_environment() {
        let config = load(&full_env());

        config.validate().unwrap();
        assert!(config.missing_vars().is_empty());

        let chat = config.chat().unwrap();
        assert_eq!(chat.model, "chat-model");
        assert_eq!(
            chat.resource.deployment_url(&chat.model, "chat/completions"),
            "https://example.openai.azure.com/openai/deployments/chat-model/chat/completions?api-version=2024-05-01-preview"
        );

        let stt = config.transcription().unwrap();
        assert_eq!(stt.model, "whisper");

        let SynthesisSettings::AzureSpeech(tts) = config.synthesis().unwrap() else {
            panic!("expected azure speech backend");
        };
        assert_eq!(tts.voice_name, "en-US-JennyNeural");
        assert_eq!(
            tts.endpoint,
            "https://eastus.tts.speech.microsoft.com/cognitiveservices/v1"
        );
    }

    #[test]
    fn test_each_missing_variable_is_named() {
        let required = [
            vars::AZURE_OPENAI_ENDPOINT,
            vars::AZURE_OPENAI_API_KEY,
            vars::AZURE_API_VERSION,
            vars::MODEL_NAME,
            vars::WHISPER_MODEL_NAME,
            vars::AZURE_SPEECH_KEY,
            vars::AZURE_SPEECH_REGION,
        ];

        for name in required {
            let mut env = full_env();
            env.remove(name);
            let config = load(&env);

            match config.validate() {
                Err(Error::MissingVar(missing)) => assert_eq!(missing, name),
                other => panic!("expected MissingVar({name}), got {other:?}"),
            }
            assert_eq!(config.missing_vars(), vec![name]);
        }
    }

    #[test]
    fn test_empty_value_counts_as_missing() {
        let mut env = full_env();
        env.insert(vars::AZURE_OPENAI_API_KEY, "   ");
        let config = load(&env);

        assert!(matches!(
            config.chat(),
            Err(Error::MissingVar(vars::AZURE_OPENAI_API_KEY))
        ));
    }

    #[test]
    fn test_missing_stage_vars_only_fail_that_stage() {
        let mut env = full_env();
        env.remove(vars::AZURE_SPEECH_KEY);
        let config = load(&env);

        assert!(config.transcription().is_ok());
        assert!(config.chat().is_ok());
        assert!(matches!(
            config.synthesis(),
            Err(Error::MissingVar(vars::AZURE_SPEECH_KEY))
        ));
    }

    #[test]
    fn test_invalid_endpoint() {
        let mut env = full_env();
        env.insert(vars::AZURE_OPENAI_ENDPOINT, "not a url");
        let config = load(&env);
        assert!(matches!(
            config.transcription(),
            Err(Error::InvalidVar { key: vars::AZURE_OPENAI_ENDPOINT, .. })
        ));

        env.insert(vars::AZURE_OPENAI_ENDPOINT, "ftp://example.com");
        let config = load(&env);
        assert!(matches!(
            config.chat(),
            Err(Error::InvalidVar { key: vars::AZURE_OPENAI_ENDPOINT, .. })
        ));
    }

    #[test]
    fn test_openai_backend_requires_tts_model_and_voice() {
        let mut env = full_env();
        env.insert(vars::TTS_BACKEND, "openai");
        env.remove(vars::AZURE_SPEECH_KEY);
        env.remove(vars::TTS_VOICE_NAME);
        let config = load(&env);

        assert_eq!(config.tts_backend, TtsBackend::OpenAi);
        assert!(matches!(
            config.synthesis(),
            Err(Error::MissingVar(vars::TTS_VOICE_NAME))
        ));
        assert_eq!(config.missing_vars(), vec![vars::TTS_VOICE_NAME]);
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let mut env = full_env();
        env.insert(vars::TTS_BACKEND, "festival");
        let result = Config::from_sources(
            |k| env.get(k).map(ToString::to_string),
            &AssistantConfigFile::default(),
        );
        assert!(matches!(
            result,
            Err(Error::InvalidVar { key: vars::TTS_BACKEND, .. })
        ));
    }

    #[test]
    fn test_voice_name_default() {
        let mut env = full_env();
        env.remove(vars::VOICE_NAME);
        let config = load(&env);
        assert_eq!(config.speech.voice_name, DEFAULT_VOICE_NAME);
    }

    #[test]
    fn test_environment_overrides_file() {
        let fc: AssistantConfigFile = toml::from_str(
            r#"
            [chat]
            model = "from-file"
            max_tokens = 256

            [transcription]
            model = "whisper-file"
            language = "en"
            "#,
        )
        .unwrap();
        let env = full_env();
        let config =
            Config::from_sources(|k| env.get(k).map(ToString::to_string), &fc).unwrap();

        assert_eq!(config.openai.chat_model.as_deref(), Some("chat-model"));
        assert_eq!(config.openai.whisper_model.as_deref(), Some("whisper"));
        assert_eq!(config.openai.language.as_deref(), Some("en"));
        assert_eq!(config.chat.max_tokens, 256);
    }

    #[test]
    fn test_file_fills_gaps() {
        let fc: AssistantConfigFile = toml::from_str(
            r#"
            [openai]
            endpoint = "https://file.openai.azure.com"
            api_version = "2024-06-01"
            "#,
        )
        .unwrap();
        let mut env = full_env();
        env.remove(vars::AZURE_OPENAI_ENDPOINT);
        env.remove(vars::AZURE_API_VERSION);
        let config =
            Config::from_sources(|k| env.get(k).map(ToString::to_string), &fc).unwrap();

        let resource = config.openai_resource().unwrap();
        assert_eq!(resource.endpoint.host_str(), Some("file.openai.azure.com"));
        assert_eq!(resource.api_version, "2024-06-01");
    }

    #[test]
    fn test_empty_file_values_count_as_missing() {
        let fc: AssistantConfigFile = toml::from_str(
            r#"
            [chat]
            model = ""

            [speech]
            region = "   "
            "#,
        )
        .unwrap();
        let mut env = full_env();
        env.remove(vars::MODEL_NAME);
        env.remove(vars::AZURE_SPEECH_REGION);
        let config =
            Config::from_sources(|k| env.get(k).map(ToString::to_string), &fc).unwrap();

        assert!(matches!(
            config.chat(),
            Err(Error::MissingVar(vars::MODEL_NAME))
        ));
        assert!(matches!(
            config.synthesis(),
            Err(Error::MissingVar(vars::AZURE_SPEECH_REGION))
        ));
        assert_eq!(
            config.missing_vars(),
            vec![vars::MODEL_NAME, vars::AZURE_SPEECH_REGION]
        );
    }

    #[test]
    fn test_file_values_are_trimmed() {
        let fc: AssistantConfigFile =
            toml::from_str("[chat]\nmodel = \"  gpt-4o \"\n").unwrap();
        let mut env = full_env();
        env.remove(vars::MODEL_NAME);
        let config =
            Config::from_sources(|k| env.get(k).map(ToString::to_string), &fc).unwrap();

        assert_eq!(config.chat().unwrap().model, "gpt-4o");
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let fc: AssistantConfigFile = toml::from_str("[http]\ntimeout_secs = 0\n").unwrap();
        let result = Config::from_sources(|_| None, &fc);
        assert!(matches!(
            result,
            Err(Error::InvalidVar { key: "http.timeout_secs", .. })
        ));

        let fc: AssistantConfigFile = toml::from_str("[http]\ntimeout_secs = 5\n").unwrap();
        let config = Config::from_sources(|_| None, &fc).unwrap();
        assert_eq!(config.http_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_audio_limits() {
        let fc: AssistantConfigFile =
            toml::from_str("[audio]\nmax_duration_secs = 0.0\n").unwrap();
        let result = Config::from_sources(|_| None, &fc);
        assert!(matches!(
            result,
            Err(Error::InvalidVar { key: "audio.max_duration_secs", .. })
        ));

        let fc: AssistantConfigFile = toml::from_str("[audio]\nvad_mode = 7\n").unwrap();
        assert!(Config::from_sources(|_| None, &fc).is_err());
    }

    #[test]
    fn test_secrets_are_masked() {
        let config = load(&full_env());

        let debug = format!("{config:?}");
        assert!(!debug.contains("mock-api-key-123456"));

        let report = config.var_report();
        let key = report
            .iter()
            .find(|r| r.info.name == vars::AZURE_OPENAI_API_KEY)
            .unwrap();
        assert_eq!(key.value.as_deref(), Some("****3456"));
        assert!(key.required);

        let pulse = report
            .iter()
            .find(|r| r.info.name == vars::PULSE_SERVER)
            .unwrap();
        assert!(pulse.value.is_none());
        assert!(!pulse.required);
    }

    #[test]
    fn test_pulse_socket_path() {
        let mut audio = AudioConfig {
            pulse_server: Some("unix:/tmp/pulse-socket".to_string()),
            ..AudioConfig::default()
        };
        assert_eq!(
            audio.pulse_socket_path(),
            Some(PathBuf::from("/tmp/pulse-socket"))
        );

        audio.pulse_server = Some("tcp:localhost:4713".to_string());
        assert_eq!(audio.pulse_socket_path(), None);

        audio.pulse_server = None;
        assert_eq!(audio.pulse_socket_path(), None);
    }

    #[test]
    fn test_explicit_dotenv_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_dotenv(Some(&dir.path().join("nope.env"))).is_err());
    }
}
