//! Speech/non-speech classification of audio frames

use webrtc_vad::{SampleRate, Vad, VadMode};

use crate::{Error, Result};

/// Minimum RMS energy (normalized) to consider a frame speech
pub const ENERGY_THRESHOLD: f32 = 0.03;

/// Decides whether a single frame contains speech
pub trait SpeechClassifier {
    /// Classify one frame of 16-bit mono samples
    ///
    /// # Errors
    ///
    /// Returns error if the frame cannot be classified (e.g. wrong length)
    fn is_speech(&mut self, frame: &[i16]) -> Result<bool>;

    /// Classifier name for logging
    fn name(&self) -> &'static str;
}

/// WebRTC voice activity detector
///
/// Accepts 10, 20 or 30 ms frames at 16kHz.
pub struct WebRtcClassifier {
    vad: Vad,
}

impl WebRtcClassifier {
    /// Create a detector with aggressiveness 0 (least) to 3 (most)
    #[must_use]
    pub fn new(mode: u8) -> Self {
        let mode = match mode {
            0 => VadMode::Quality,
            1 => VadMode::LowBitrate,
            2 => VadMode::Aggressive,
            _ => VadMode::VeryAggressive,
        };

        Self {
            vad: Vad::new_with_rate_and_mode(SampleRate::Rate16kHz, mode),
        }
    }
}

impl SpeechClassifier for WebRtcClassifier {
    fn is_speech(&mut self, frame: &[i16]) -> Result<bool> {
        self.vad.is_voice_segment(frame).map_err(|()| {
            Error::Audio(format!("VAD rejected frame of {} samples", frame.len()))
        })
    }

    fn name(&self) -> &'static str {
        "webrtc"
    }
}

/// Energy threshold detector, no model involved
#[derive(Debug, Clone, Copy)]
pub struct EnergyClassifier {
    threshold: f32,
}

impl EnergyClassifier {
    /// Create a detector with a custom RMS threshold
    #[must_use]
    pub const fn new(threshold: f32) -> Self {
        Self { threshold }
    }
}

impl Default for EnergyClassifier {
    fn default() -> Self {
        Self::new(ENERGY_THRESHOLD)
    }
}

impl SpeechClassifier for EnergyClassifier {
    fn is_speech(&mut self, frame: &[i16]) -> Result<bool> {
        Ok(calculate_energy(frame) > self.threshold)
    }

    fn name(&self) -> &'static str {
        "energy"
    }
}

/// Calculate RMS energy of 16-bit samples, normalized to [0.0, 1.0]
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn calculate_energy(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples
        .iter()
        .map(|&s| {
            let v = f32::from(s) / 32768.0;
            v * v
        })
        .sum();
    (sum_squares / samples.len() as f32).sqrt()
}
