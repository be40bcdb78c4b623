//! Turn orchestration: record → transcribe → complete → synthesize → play
//!
//! Stages run strictly in order. The first failure ends the turn and is
//! returned unchanged; nothing is retried.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::Result;
use crate::chat::{AzureChatClient, ChatCompleter, Conversation};
use crate::config::Config;
use crate::stt::{AudioInput, Transcriber, WhisperTranscriber};
use crate::tts::{SpeechSynthesizer, SynthesizedAudio, synthesizer_from_settings};
use crate::voice::{AudioPlayback, Recording, VoiceRecorder};

/// Produces one utterance per call
///
/// Audio devices are not `Send`, so neither are these futures.
#[async_trait(?Send)]
pub trait AudioSource {
    /// Record until a stop condition is reached
    ///
    /// # Errors
    ///
    /// Returns error if the input device fails
    async fn record(&mut self) -> Result<Recording>;
}

/// Plays synthesized audio
#[async_trait(?Send)]
pub trait AudioSink {
    /// Play `audio` to completion
    ///
    /// # Errors
    ///
    /// Returns error if decoding or the output device fails
    async fn play(&mut self, audio: &SynthesizedAudio) -> Result<()>;
}

#[async_trait(?Send)]
impl AudioSource for VoiceRecorder {
    async fn record(&mut self) -> Result<Recording> {
        VoiceRecorder::record(self).await
    }
}

/// Default output device, opened per playback
#[derive(Debug, Default, Clone, Copy)]
pub struct Speaker;

#[async_trait(?Send)]
impl AudioSink for Speaker {
    async fn play(&mut self, audio: &SynthesizedAudio) -> Result<()> {
        AudioPlayback::new()?.play_audio(audio).await
    }
}

/// Result of one completed turn
#[derive(Debug, Clone)]
pub struct Turn {
    pub transcript: String,
    pub response: String,
    pub audio: SynthesizedAudio,
}

/// How a turn ended
#[derive(Debug, Clone)]
pub enum TurnOutcome {
    /// Nothing was said; chat and synthesis were skipped
    Silent,
    /// All four stages ran
    Completed(Turn),
}

impl TurnOutcome {
    #[must_use]
    pub const fn turn(&self) -> Option<&Turn> {
        match self {
            Self::Silent => None,
            Self::Completed(turn) => Some(turn),
        }
    }
}

/// The assistant pipeline
pub struct Pipeline {
    source: Box<dyn AudioSource>,
    transcriber: Box<dyn Transcriber>,
    chat: Box<dyn ChatCompleter>,
    synthesizer: Box<dyn SpeechSynthesizer>,
    sink: Box<dyn AudioSink>,
    conversation: Conversation,
    save_dir: Option<PathBuf>,
}

impl Pipeline {
    /// Assemble a pipeline from its stages
    #[must_use]
    pub fn new(
        source: Box<dyn AudioSource>,
        transcriber: Box<dyn Transcriber>,
        chat: Box<dyn ChatCompleter>,
        synthesizer: Box<dyn SpeechSynthesizer>,
        sink: Box<dyn AudioSink>,
        conversation: Conversation,
    ) -> Self {
        Self {
            source,
            transcriber,
            chat,
            synthesizer,
            sink,
            conversation,
            save_dir: None,
        }
    }

    /// Build every stage from configuration
    ///
    /// All settings are resolved before any device is touched, so a missing
    /// variable fails here rather than after recording.
    ///
    /// # Errors
    ///
    /// Returns the first configuration error in stage order
    pub fn from_config(config: &Config) -> Result<Self> {
        let transcriber = WhisperTranscriber::new(config.transcription()?)?;
        let chat = AzureChatClient::new(config.chat()?)?;
        let synthesizer = synthesizer_from_settings(config.synthesis()?)?;

        tracing::info!(
            chat_model = %chat.model(),
            tts = synthesizer.name(),
            "pipeline ready"
        );

        Ok(Self::new(
            Box::new(VoiceRecorder::new(&config.audio)),
            Box::new(transcriber),
            Box::new(chat),
            synthesizer,
            Box::new(Speaker),
            Conversation::from_config(&config.chat),
        ))
    }

    /// Write captured and synthesized audio into `dir`
    #[must_use]
    pub fn with_save_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.save_dir = Some(dir.into());
        self
    }

    /// Dialogue retained so far
    #[must_use]
    pub const fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Run one turn
    ///
    /// # Errors
    ///
    /// Returns the first stage failure
    #[allow(clippy::future_not_send)]
    pub async fn run_turn(&mut self) -> Result<TurnOutcome> {
        let recording = self.source.record().await?;
        if recording.is_silent() {
            tracing::info!("no speech detected");
            return Ok(TurnOutcome::Silent);
        }

        let wav = recording.to_wav_bytes()?;
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S%.3f").to_string();
        self.save(&format!("{stamp}-input.wav"), &wav).await?;

        let transcript = self.transcriber.transcribe(&AudioInput::wav(wav)).await?;
        if transcript.trim().is_empty() {
            tracing::info!("empty transcript");
            return Ok(TurnOutcome::Silent);
        }

        let prompt = self.conversation.prompt_for(&transcript);
        let response = self.chat.complete(&prompt).await?;

        let audio = self.synthesizer.synthesize(&response).await?;
        self.save(
            &format!("{stamp}-response.{}", audio.format.extension()),
            &audio.data,
        )
        .await?;

        self.sink.play(&audio).await?;
        self.conversation.record(&transcript, &response);

        Ok(TurnOutcome::Completed(Turn {
            transcript,
            response,
            audio,
        }))
    }

    /// Run `turns` turns back to back, keeping the dialogue history
    ///
    /// # Errors
    ///
    /// Returns the first failure; earlier outcomes are discarded
    #[allow(clippy::future_not_send)]
    pub async fn run(&mut self, turns: usize) -> Result<Vec<TurnOutcome>> {
        let mut outcomes = Vec::with_capacity(turns);
        for turn in 1..=turns {
            tracing::info!(turn, of = turns, "starting turn");
            outcomes.push(self.run_turn().await?);
        }
        Ok(outcomes)
    }

    async fn save(&self, name: &str, data: &[u8]) -> Result<()> {
        let Some(dir) = &self.save_dir else {
            return Ok(());
        };
        write_audio(dir, name, data).await
    }
}

async fn write_audio(dir: &Path, name: &str, data: &[u8]) -> Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(name);
    tokio::fs::write(&path, data).await?;
    tracing::debug!(path = %path.display(), bytes = data.len(), "saved audio");
    Ok(())
}
