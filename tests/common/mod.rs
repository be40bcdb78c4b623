//! Shared test utilities

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use voice_assistant::chat::ChatMessage;
use voice_assistant::voice::{
    EnergyClassifier, FRAME_SAMPLES, FrameRecorder, Recording, RecordingLimits, SAMPLE_RATE,
};
use voice_assistant::{
    AudioFormat, AudioInput, AudioSink, AudioSource, ChatCompleter, Error, Result,
    SpeechSynthesizer, SynthesizedAudio, Transcriber,
};

/// Generate a 16-bit sine wave at the capture rate
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn generate_sine_samples(frequency: f32, duration_secs: f32, amplitude: f32) -> Vec<i16> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            (amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin() * 32767.0) as i16
        })
        .collect()
}

/// Generate silence at the capture rate
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn generate_silence(duration_secs: f32) -> Vec<i16> {
    vec![0; (SAMPLE_RATE as f32 * duration_secs) as usize]
}

/// Build a recording by running samples through the energy classifier
pub fn recording_from(samples: &[i16]) -> Recording {
    let limits = RecordingLimits {
        max_duration: Duration::from_secs(600),
        max_silence: Duration::from_secs(600),
    };
    let mut recorder = FrameRecorder::new(EnergyClassifier::default(), limits, SAMPLE_RATE);
    for frame in samples.chunks_exact(FRAME_SAMPLES) {
        recorder.push_frame(frame).expect("energy classifier never fails");
    }
    recorder.finish()
}

/// One second of tone: always classified as speech
pub fn speech_recording() -> Recording {
    recording_from(&generate_sine_samples(440.0, 1.0, 0.5))
}

/// Half a second of silence: never classified as speech
pub fn silent_recording() -> Recording {
    recording_from(&generate_silence(0.5))
}

/// Ordered record of which stage ran, shared by all fakes of one pipeline
#[derive(Clone, Default)]
pub struct StageLog(Arc<Mutex<Vec<String>>>);

impl StageLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Hands out scripted recordings
pub struct ScriptedSource {
    pub recordings: VecDeque<Result<Recording>>,
    pub log: StageLog,
}

impl ScriptedSource {
    pub fn new(recordings: Vec<Result<Recording>>, log: &StageLog) -> Self {
        Self {
            recordings: recordings.into(),
            log: log.clone(),
        }
    }
}

#[async_trait(?Send)]
impl AudioSource for ScriptedSource {
    async fn record(&mut self) -> Result<Recording> {
        self.log.push("record");
        self.recordings
            .pop_front()
            .unwrap_or_else(|| Err(Error::Audio("script exhausted".to_string())))
    }
}

/// Returns a fixed transcript, or an error
pub struct FakeTranscriber {
    pub transcript: std::result::Result<String, String>,
    pub log: StageLog,
}

#[async_trait]
impl Transcriber for FakeTranscriber {
    async fn transcribe(&self, audio: &AudioInput) -> Result<String> {
        assert_eq!(&audio.data[0..4], b"RIFF", "transcriber expects WAV input");
        self.log.push("transcribe");
        self.transcript.clone().map_err(Error::Stt)
    }
}

/// Echoes the last user message and remembers every prompt it saw
pub struct FakeChat {
    pub prompts: Arc<Mutex<Vec<Vec<ChatMessage>>>>,
    pub fail: bool,
    pub log: StageLog,
}

impl FakeChat {
    pub fn new(log: &StageLog) -> Self {
        Self {
            prompts: Arc::default(),
            fail: false,
            log: log.clone(),
        }
    }
}

#[async_trait]
impl ChatCompleter for FakeChat {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        self.log.push("complete");
        self.prompts.lock().unwrap().push(messages.to_vec());
        if self.fail {
            return Err(Error::Chat("completion returned no content".to_string()));
        }
        let last = messages.last().map(|m| m.content.as_str()).unwrap_or_default();
        Ok(format!("you said: {last}"))
    }
}

/// Produces a few bytes of fake MP3
pub struct FakeSynthesizer {
    pub log: StageLog,
}

#[async_trait]
impl SpeechSynthesizer for FakeSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio> {
        self.log.push("synthesize");
        Ok(SynthesizedAudio {
            data: text.as_bytes().to_vec(),
            format: AudioFormat::Mp3,
        })
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Collects everything it is asked to play
pub struct RecordingSink {
    pub played: Arc<Mutex<Vec<SynthesizedAudio>>>,
    pub log: StageLog,
}

impl RecordingSink {
    pub fn new(log: &StageLog) -> Self {
        Self {
            played: Arc::default(),
            log: log.clone(),
        }
    }
}

#[async_trait(?Send)]
impl AudioSink for RecordingSink {
    async fn play(&mut self, audio: &SynthesizedAudio) -> Result<()> {
        self.log.push("play");
        self.played.lock().unwrap().push(audio.clone());
        Ok(())
    }
}
