//! Text-to-speech via Azure Speech (SSML) or an Azure OpenAI TTS deployment

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use secrecy::{ExposeSecret, SecretString};

use crate::config::{
    AzureOpenAiResource, AzureSpeechSettings, OpenAiTtsSettings, SynthesisSettings,
};
use crate::error::Service;
use crate::http::{build_client, network_error, send};
use crate::{Error, Result};

/// Output format requested from Azure Speech
const AZURE_OUTPUT_FORMAT: &str = "riff-24khz-16bit-mono-pcm";

/// A complete `<speak><voice>…</voice></speak>` document
static SSML_DOCUMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?s)^\s*<speak version=["']1\.0["'] xmlns=["']http://www\.w3\.org/2001/10/synthesis["'] xml:lang=["'][a-zA-Z-]+["']>\s*<voice name=["'][\w-]+["']>.*</voice>\s*</speak>\s*$"#,
    )
    .expect("valid regex")
});

/// Encoding of synthesized audio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    Wav,
    Mp3,
}

impl AudioFormat {
    /// File extension without the dot
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Wav => "wav",
            Self::Mp3 => "mp3",
        }
    }
}

/// Encoded audio returned by a synthesizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedAudio {
    pub data: Vec<u8>,
    pub format: AudioFormat,
}

impl SynthesizedAudio {
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Turns response text into audio
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text`
    ///
    /// # Errors
    ///
    /// Returns error if the text is empty or the service call fails
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}

/// Build the synthesizer for the configured backend
///
/// # Errors
///
/// Returns error if the HTTP client cannot be built
pub fn synthesizer_from_settings(
    settings: SynthesisSettings,
) -> Result<Box<dyn SpeechSynthesizer>> {
    Ok(match settings {
        SynthesisSettings::AzureSpeech(s) => Box::new(AzureSpeechSynthesizer::new(s)?),
        SynthesisSettings::OpenAi(s) => Box::new(OpenAiSpeechSynthesizer::new(s)?),
    })
}

/// Whether `text` already is a complete SSML document
#[must_use]
pub fn is_ssml(text: &str) -> bool {
    SSML_DOCUMENT.is_match(text)
}

/// Wrap plain text in an SSML document for `voice`
///
/// Complete SSML documents are returned unchanged.
#[must_use]
pub fn to_ssml(text: &str, voice: &str) -> String {
    if is_ssml(text) {
        return text.to_string();
    }
    format!(
        "<speak version='1.0' xmlns='http://www.w3.org/2001/10/synthesis' xml:lang='en-US'>\
         <voice name='{}'>{}</voice></speak>",
        escape_xml(voice),
        escape_xml(text)
    )
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

fn require_text(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(Error::Tts("nothing to synthesize".to_string()));
    }
    Ok(())
}

fn require_audio(data: Vec<u8>, format: AudioFormat) -> Result<SynthesizedAudio> {
    if data.is_empty() {
        return Err(Error::Tts("service returned no audio".to_string()));
    }
    tracing::debug!(audio_bytes = data.len(), ?format, "synthesis complete");
    Ok(SynthesizedAudio { data, format })
}

/// Read the audio body of a successful synthesis response
async fn read_audio(response: reqwest::Response) -> Result<Vec<u8>> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| network_error(Service::Synthesis, e))?;
    Ok(bytes.to_vec())
}

/// Azure Speech REST client
pub struct AzureSpeechSynthesizer {
    client: reqwest::Client,
    key: SecretString,
    endpoint: String,
    voice_name: String,
}

impl AzureSpeechSynthesizer {
    /// Create a synthesizer from validated settings
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(settings: AzureSpeechSettings) -> Result<Self> {
        tracing::debug!(
            region = %settings.region,
            voice = %settings.voice_name,
            "azure speech synthesizer"
        );
        Ok(Self {
            client: build_client(settings.timeout)?,
            key: settings.key,
            endpoint: settings.endpoint,
            voice_name: settings.voice_name,
        })
    }

    /// Override the service URL
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl SpeechSynthesizer for AzureSpeechSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio> {
        require_text(text)?;
        let ssml = to_ssml(text, &self.voice_name);

        let request = self
            .client
            .post(&self.endpoint)
            .header("Ocp-Apim-Subscription-Key", self.key.expose_secret())
            .header(reqwest::header::CONTENT_TYPE, "application/ssml+xml")
            .header("X-Microsoft-OutputFormat", AZURE_OUTPUT_FORMAT)
            .body(ssml);
        let response = send(Service::Synthesis, request).await?;

        require_audio(read_audio(response).await?, AudioFormat::Wav)
    }

    fn name(&self) -> &'static str {
        "azure-speech"
    }
}

#[derive(serde::Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
}

/// Azure OpenAI audio/speech client
pub struct OpenAiSpeechSynthesizer {
    client: reqwest::Client,
    resource: AzureOpenAiResource,
    model: String,
    voice: String,
}

impl OpenAiSpeechSynthesizer {
    /// Create a synthesizer from validated settings
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(settings: OpenAiTtsSettings) -> Result<Self> {
        Ok(Self {
            client: build_client(settings.timeout)?,
            resource: settings.resource,
            model: settings.model,
            voice: settings.voice,
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiSpeechSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio> {
        require_text(text)?;

        let body = SpeechRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            response_format: "mp3",
        };

        let request = self
            .client
            .post(self.resource.deployment_url(&self.model, "audio/speech"))
            .header("api-key", self.resource.api_key.expose_secret())
            .json(&body);
        let response = send(Service::Synthesis, request).await?;

        require_audio(read_audio(response).await?, AudioFormat::Mp3)
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}
