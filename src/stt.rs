//! Speech-to-text via an Azure OpenAI Whisper deployment

use std::path::Path;

use async_trait::async_trait;
use secrecy::ExposeSecret;

use crate::config::{AzureOpenAiResource, TranscriptionSettings};
use crate::error::Service;
use crate::http::{build_client, network_error, send};
use crate::{Error, Result};

/// Response from the Whisper transcription API
#[derive(serde::Deserialize)]
struct WhisperResponse {
    text: String,
}

/// Audio payload handed to a transcriber
#[derive(Debug, Clone)]
pub struct AudioInput {
    /// Encoded audio bytes
    pub data: Vec<u8>,
    /// File name sent with the upload; its extension tells the service the format
    pub file_name: String,
    /// MIME type of `data`
    pub mime: &'static str,
}

impl AudioInput {
    /// Wrap WAV bytes (e.g. from [`crate::voice::Recording::to_wav_bytes`])
    #[must_use]
    pub fn wav(data: Vec<u8>) -> Self {
        Self {
            data,
            file_name: "audio.wav".to_string(),
            mime: "audio/wav",
        }
    }

    /// Read an audio file from disk, guessing the MIME type from its extension
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or is empty
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        if data.is_empty() {
            return Err(Error::Stt(format!("{} is empty", path.display())));
        }

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let mime = match ext.as_str() {
            "mp3" | "mpga" | "mpeg" => "audio/mpeg",
            "m4a" | "mp4" => "audio/mp4",
            "ogg" | "oga" => "audio/ogg",
            "webm" => "audio/webm",
            "flac" => "audio/flac",
            _ => "audio/wav",
        };
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.wav")
            .to_string();

        Ok(Self {
            data,
            file_name,
            mime,
        })
    }
}

/// Turns recorded audio into text
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe one utterance, returning the trimmed transcript
    ///
    /// # Errors
    ///
    /// Returns error if the service call fails
    async fn transcribe(&self, audio: &AudioInput) -> Result<String>;
}

/// Azure OpenAI Whisper client
pub struct WhisperTranscriber {
    client: reqwest::Client,
    resource: AzureOpenAiResource,
    model: String,
    language: Option<String>,
}

impl WhisperTranscriber {
    /// Create a transcriber from validated settings
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(settings: TranscriptionSettings) -> Result<Self> {
        Ok(Self {
            client: build_client(settings.timeout)?,
            resource: settings.resource,
            model: settings.model,
            language: settings.language,
        })
    }

    fn url(&self) -> String {
        self.resource
            .deployment_url(&self.model, "audio/transcriptions")
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(&self, audio: &AudioInput) -> Result<String> {
        if audio.data.is_empty() {
            return Err(Error::Stt("no audio to transcribe".to_string()));
        }
        tracing::debug!(
            audio_bytes = audio.data.len(),
            model = %self.model,
            "starting Whisper transcription"
        );

        let mut form = reqwest::multipart::Form::new().part(
            "file",
            reqwest::multipart::Part::bytes(audio.data.clone())
                .file_name(audio.file_name.clone())
                .mime_str(audio.mime)
                .map_err(|e| Error::Stt(e.to_string()))?,
        );
        if let Some(language) = &self.language {
            form = form.text("language", language.clone());
        }

        let request = self
            .client
            .post(self.url())
            .header("api-key", self.resource.api_key.expose_secret())
            .multipart(form);
        let response = send(Service::Transcription, request).await?;

        let result: WhisperResponse = response
            .json()
            .await
            .map_err(|e| network_error(Service::Transcription, e))?;

        let transcript = result.text.trim().to_string();
        tracing::info!(transcript = %transcript, "transcription complete");
        Ok(transcript)
    }
}
