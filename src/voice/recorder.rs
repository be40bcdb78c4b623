//! Voice-activity-gated recording
//!
//! Audio is cut into 10 ms frames (160 samples at 16kHz). Every frame is
//! classified and kept; recording stops once the run of consecutive
//! non-speech frames covers `max_silence`, or the recording reaches
//! `max_duration`.

use std::time::Duration;

use tokio::sync::mpsc;

use super::capture::{AudioCapture, SAMPLE_RATE, samples_to_wav};
use super::vad::{SpeechClassifier, WebRtcClassifier};
use crate::config::AudioConfig;
use crate::{Error, Result};

/// Samples per VAD frame (10 ms at 16kHz)
pub const FRAME_SAMPLES: usize = 160;

/// How long the input device may stay quiet before it is considered dead
const NO_AUDIO_TIMEOUT: Duration = Duration::from_secs(2);

/// Why a recording ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Trailing silence reached `max_silence`
    Silence,
    /// Recording reached `max_duration`
    MaxDuration,
    /// Input ended before either limit
    InputClosed,
}

/// Stop conditions for a recording
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordingLimits {
    pub max_duration: Duration,
    pub max_silence: Duration,
}

impl Default for RecordingLimits {
    fn default() -> Self {
        Self {
            max_duration: Duration::from_secs(60),
            max_silence: Duration::from_secs(1),
        }
    }
}

impl From<&AudioConfig> for RecordingLimits {
    fn from(config: &AudioConfig) -> Self {
        Self {
            max_duration: config.max_duration,
            max_silence: config.max_silence,
        }
    }
}

/// Whole frames covered by `duration`, rounded up or down
///
/// The duration is first rounded to the microsecond so values parsed from
/// decimal seconds land on the frame count their decimal form implies.
fn frames_in(duration: Duration, sample_rate: u32, round_up: bool) -> usize {
    const MICROS_PER_SEC: u128 = 1_000_000;

    let micros = (duration.as_nanos() + 500) / 1_000;
    let scaled = micros * u128::from(sample_rate);
    let per_frame = FRAME_SAMPLES as u128 * MICROS_PER_SEC;
    let frames = if round_up {
        scaled.div_ceil(per_frame)
    } else {
        scaled / per_frame
    };
    usize::try_from(frames).unwrap_or(usize::MAX)
}

/// Frame-level stop logic, independent of any audio source
#[derive(Debug, Clone)]
pub struct RecordingGate {
    silent_frames_to_stop: usize,
    max_frames: usize,
    silent_run: usize,
    frames: usize,
    speech_frames: usize,
}

impl RecordingGate {
    /// Create a gate for the given limits at `sample_rate`
    #[must_use]
    pub fn new(limits: RecordingLimits, sample_rate: u32) -> Self {
        Self {
            silent_frames_to_stop: frames_in(limits.max_silence, sample_rate, false),
            max_frames: frames_in(limits.max_duration, sample_rate, true).max(1),
            silent_run: 0,
            frames: 0,
            speech_frames: 0,
        }
    }

    /// Account for one frame, returning a reason once recording should stop
    pub fn push(&mut self, is_speech: bool) -> Option<StopReason> {
        if is_speech {
            self.silent_run = 0;
            self.speech_frames += 1;
        } else {
            self.silent_run += 1;
        }
        self.frames += 1;

        if self.silent_run >= self.silent_frames_to_stop {
            Some(StopReason::Silence)
        } else if self.frames >= self.max_frames {
            Some(StopReason::MaxDuration)
        } else {
            None
        }
    }

    /// Frames accounted so far
    #[must_use]
    pub const fn frames(&self) -> usize {
        self.frames
    }

    /// Frames classified as speech so far
    #[must_use]
    pub const fn speech_frames(&self) -> usize {
        self.speech_frames
    }
}

/// A finished recording: mono 16-bit PCM plus VAD statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recording {
    samples: Vec<i16>,
    sample_rate: u32,
    frames: usize,
    speech_frames: usize,
    stop_reason: StopReason,
}

impl Recording {
    /// Raw samples
    #[must_use]
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of complete frames recorded
    #[must_use]
    pub const fn frames(&self) -> usize {
        self.frames
    }

    /// Number of frames classified as speech
    #[must_use]
    pub const fn speech_frames(&self) -> usize {
        self.speech_frames
    }

    #[must_use]
    pub const fn stop_reason(&self) -> StopReason {
        self.stop_reason
    }

    /// True when no frame contained speech
    #[must_use]
    pub const fn is_silent(&self) -> bool {
        self.speech_frames == 0
    }

    /// Length of the recording
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }

    /// Concatenate the samples as little-endian 16-bit PCM
    #[must_use]
    pub fn to_pcm_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    /// Encode as a WAV file (44-byte header + PCM data)
    ///
    /// # Errors
    ///
    /// Returns error if WAV encoding fails
    pub fn to_wav_bytes(&self) -> Result<Vec<u8>> {
        samples_to_wav(&self.samples, self.sample_rate)
    }
}

/// Splits arbitrarily sized sample chunks into fixed-size frames
#[derive(Debug, Default)]
pub struct FrameAssembler {
    pending: Vec<i16>,
}

impl FrameAssembler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add samples and return every complete frame now available
    pub fn push(&mut self, chunk: &[i16]) -> Vec<Vec<i16>> {
        self.pending.extend_from_slice(chunk);

        let complete = self.pending.len() / FRAME_SAMPLES * FRAME_SAMPLES;
        let frames = self.pending[..complete]
            .chunks_exact(FRAME_SAMPLES)
            .map(<[i16]>::to_vec)
            .collect();
        self.pending.drain(..complete);
        frames
    }

    /// Samples waiting for a full frame
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// Accumulates classified frames until the gate says stop
pub struct FrameRecorder<C> {
    classifier: C,
    gate: RecordingGate,
    samples: Vec<i16>,
    sample_rate: u32,
    stop_reason: Option<StopReason>,
}

impl<C: SpeechClassifier> FrameRecorder<C> {
    #[must_use]
    pub fn new(classifier: C, limits: RecordingLimits, sample_rate: u32) -> Self {
        Self {
            classifier,
            gate: RecordingGate::new(limits, sample_rate),
            samples: Vec::new(),
            sample_rate,
            stop_reason: None,
        }
    }

    /// Classify and keep one frame
    ///
    /// Frames pushed after the recording stopped are ignored.
    ///
    /// # Errors
    ///
    /// Returns error if the classifier fails
    pub fn push_frame(&mut self, frame: &[i16]) -> Result<Option<StopReason>> {
        if self.stop_reason.is_some() {
            return Ok(self.stop_reason);
        }

        let is_speech = self.classifier.is_speech(frame)?;
        self.samples.extend_from_slice(frame);
        self.stop_reason = self.gate.push(is_speech);

        if let Some(reason) = self.stop_reason {
            tracing::debug!(
                ?reason,
                frames = self.gate.frames(),
                speech_frames = self.gate.speech_frames(),
                "recording stopped"
            );
        }
        Ok(self.stop_reason)
    }

    /// Whether a stop condition was reached
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.stop_reason.is_some()
    }

    /// Finish and hand over the recording
    #[must_use]
    pub fn finish(self) -> Recording {
        Recording {
            samples: self.samples,
            sample_rate: self.sample_rate,
            frames: self.gate.frames(),
            speech_frames: self.gate.speech_frames(),
            stop_reason: self.stop_reason.unwrap_or(StopReason::InputClosed),
        }
    }
}

/// Drive a frame recorder from a stream of sample chunks
///
/// Ends when the gate stops, or when the sender side closes. A chunk gap
/// longer than two seconds is treated as a dead input device.
///
/// # Errors
///
/// Returns error if the device stalls or classification fails
pub async fn record_stream<C: SpeechClassifier>(
    rx: &mut mpsc::UnboundedReceiver<Vec<i16>>,
    classifier: C,
    limits: RecordingLimits,
) -> Result<Recording> {
    let mut recorder = FrameRecorder::new(classifier, limits, SAMPLE_RATE);
    let mut assembler = FrameAssembler::new();

    while !recorder.is_finished() {
        let chunk = match tokio::time::timeout(NO_AUDIO_TIMEOUT, rx.recv()).await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(_) => {
                return Err(Error::Audio(format!(
                    "no audio received from input device for {}s",
                    NO_AUDIO_TIMEOUT.as_secs()
                )));
            }
        };

        for frame in assembler.push(&chunk) {
            if recorder.push_frame(&frame)?.is_some() {
                break;
            }
        }
    }

    Ok(recorder.finish())
}

/// Records one utterance from the microphone
#[derive(Debug, Clone)]
pub struct VoiceRecorder {
    limits: RecordingLimits,
    vad_mode: u8,
    audio: AudioConfig,
}

impl VoiceRecorder {
    /// Create a recorder from the audio configuration
    #[must_use]
    pub fn new(audio: &AudioConfig) -> Self {
        Self {
            limits: RecordingLimits::from(audio),
            vad_mode: audio.vad_mode,
            audio: audio.clone(),
        }
    }

    /// Stop conditions in use
    #[must_use]
    pub const fn limits(&self) -> RecordingLimits {
        self.limits
    }

    /// Open the input device, record until a stop condition, release the device
    ///
    /// # Errors
    ///
    /// Returns error if the device is unavailable or stalls
    #[allow(clippy::future_not_send)]
    pub async fn record(&self) -> Result<Recording> {
        self.audio.log_audio_server();

        let mut capture = AudioCapture::new()?;
        let mut rx = capture.start()?;
        tracing::info!("start recording");

        let classifier = WebRtcClassifier::new(self.vad_mode);
        let result = record_stream(&mut rx, classifier, self.limits).await;
        capture.stop();

        let recording = result?;
        tracing::info!(
            duration_ms = recording.duration().as_millis(),
            speech_frames = recording.speech_frames(),
            reason = ?recording.stop_reason(),
            "recording complete"
        );
        Ok(recording)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::vad::EnergyClassifier;

    fn limits(max_duration_ms: u64, max_silence_ms: u64) -> RecordingLimits {
        RecordingLimits {
            max_duration: Duration::from_millis(max_duration_ms),
            max_silence: Duration::from_millis(max_silence_ms),
        }
    }

    #[test]
    fn test_gate_stops_after_silence() {
        // 1s of silence = 100 frames
        let mut gate = RecordingGate::new(limits(60_000, 1_000), SAMPLE_RATE);
        for _ in 0..99 {
            assert_eq!(gate.push(false), None);
        }
        assert_eq!(gate.push(false), Some(StopReason::Silence));
        assert_eq!(gate.frames(), 100);
    }

    #[test]
    fn test_gate_speech_resets_silence() {
        let mut gate = RecordingGate::new(limits(60_000, 100), SAMPLE_RATE);
        for _ in 0..9 {
            assert_eq!(gate.push(false), None);
        }
        assert_eq!(gate.push(true), None);
        for _ in 0..9 {
            assert_eq!(gate.push(false), None);
        }
        assert_eq!(gate.push(false), Some(StopReason::Silence));
        assert_eq!(gate.speech_frames(), 1);
    }

    #[test]
    fn test_gate_stops_at_max_duration() {
        let mut gate = RecordingGate::new(limits(500, 1_000), SAMPLE_RATE);
        for _ in 0..49 {
            assert_eq!(gate.push(true), None);
        }
        assert_eq!(gate.push(true), Some(StopReason::MaxDuration));
    }

    #[test]
    fn test_gate_frame_counts_follow_decimal_seconds() {
        // 0.7f32 is slightly under 0.7 and 0.3f32 slightly over 0.3
        let gate = RecordingGate::new(
            RecordingLimits {
                max_duration: Duration::from_secs_f32(0.3),
                max_silence: Duration::from_secs_f32(0.7),
            },
            SAMPLE_RATE,
        );
        assert_eq!(gate.silent_frames_to_stop, 70);
        assert_eq!(gate.max_frames, 30);
    }

    #[test]
    fn test_gate_limits_from_config_file() {
        use crate::config::Config;
        use crate::config::file::AssistantConfigFile;

        let fc: AssistantConfigFile = toml::from_str(
            r#"
            [audio]
            max_silence_secs = 0.7
            max_duration_secs = 0.3
            "#,
        )
        .unwrap();
        let config = Config::from_sources(|_| None, &fc).unwrap();

        let mut gate = RecordingGate::new(RecordingLimits::from(&config.audio), SAMPLE_RATE);
        assert_eq!(gate.silent_frames_to_stop, 70);
        for _ in 0..29 {
            assert_eq!(gate.push(true), None);
        }
        assert_eq!(gate.push(true), Some(StopReason::MaxDuration));
    }

    #[test]
    fn test_assembler_carries_remainder() {
        let mut assembler = FrameAssembler::new();
        assert!(assembler.push(&[1; 100]).is_empty());
        let frames = assembler.push(&[2; 300]);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0][..100], [1; 100]);
        assert_eq!(frames[0][100..], [2; 60]);
        assert_eq!(assembler.pending(), 80);
    }

    #[test]
    fn test_pcm_bytes_concatenate_little_endian() {
        let mut recorder =
            FrameRecorder::new(EnergyClassifier::default(), limits(60_000, 1_000), SAMPLE_RATE);
        let mut frame = vec![0i16; FRAME_SAMPLES];
        frame[0] = 0x0201;
        frame[1] = 0x0403;
        recorder.push_frame(&frame).unwrap();

        let recording = recorder.finish();
        let pcm = recording.to_pcm_bytes();
        assert_eq!(pcm.len(), FRAME_SAMPLES * 2);
        assert_eq!(&pcm[..4], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(recording.stop_reason(), StopReason::InputClosed);
        assert!(recording.is_silent());
    }

    #[test]
    fn test_wav_bytes_length() {
        let mut recorder =
            FrameRecorder::new(EnergyClassifier::default(), limits(60_000, 1_000), SAMPLE_RATE);
        recorder.push_frame(&[0x0201; FRAME_SAMPLES]).unwrap();

        let wav = recorder.finish().to_wav_bytes().unwrap();
        assert_eq!(wav.len(), 44 + FRAME_SAMPLES * 2);
    }

    #[tokio::test]
    async fn test_record_stream_times_out_without_audio() {
        let (_tx, mut rx) = mpsc::unbounded_channel::<Vec<i16>>();

        let result = record_stream(&mut rx, EnergyClassifier::default(), limits(1_000, 500)).await;
        assert!(matches!(result, Err(Error::Audio(_))));
    }
}
