//! Voice processing module
//!
//! Handles microphone capture, voice activity detection, recording and
//! playback. Remote STT and TTS live in [`crate::stt`] and [`crate::tts`].

mod capture;
mod playback;
mod recorder;
mod vad;

pub use capture::{AudioCapture, SAMPLE_RATE, f32_to_i16, samples_to_wav};
pub use playback::{AudioPlayback, PLAYBACK_SAMPLE_RATE, decode_audio, resample};
pub use recorder::{
    FRAME_SAMPLES, FrameAssembler, FrameRecorder, Recording, RecordingGate, RecordingLimits,
    StopReason, VoiceRecorder, record_stream,
};
pub use vad::{
    ENERGY_THRESHOLD, EnergyClassifier, SpeechClassifier, WebRtcClassifier, calculate_energy,
};
