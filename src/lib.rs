//! Voice Assistant - speak to an Azure OpenAI chat model, hear it answer
//!
//! One turn runs four stages strictly in order:
//!
//! ```text
//! ┌────────────┐   ┌────────────┐   ┌────────────┐   ┌────────────┐
//! │  Recorder  │──▶│  Whisper   │──▶│    Chat    │──▶│    TTS     │──▶ speaker
//! │ (cpal+VAD) │   │   (STT)    │   │ completion │   │ (SSML/mp3) │
//! └────────────┘   └────────────┘   └────────────┘   └────────────┘
//! ```
//!
//! Settings come from environment variables (optionally via `.env`) with an
//! optional TOML overlay; see [`config`].

pub mod chat;
pub mod config;
pub mod error;
pub mod http;
pub mod pipeline;
pub mod stt;
pub mod tts;
pub mod voice;

pub use chat::{AzureChatClient, ChatCompleter, ChatMessage, Conversation, Role};
pub use config::{Config, TtsBackend};
pub use error::{Error, Result, Service};
pub use pipeline::{AudioSink, AudioSource, Pipeline, Speaker, Turn, TurnOutcome};
pub use stt::{AudioInput, Transcriber, WhisperTranscriber};
pub use tts::{
    AudioFormat, AzureSpeechSynthesizer, OpenAiSpeechSynthesizer, SpeechSynthesizer,
    SynthesizedAudio,
};
