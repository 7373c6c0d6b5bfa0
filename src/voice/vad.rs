//! Energy-based voice activity detection
//!
//! Splits an audio stream into utterances using RMS energy: speech starts
//! once enough loud audio has accumulated and ends after a run of silence.
//! Segments are force-closed at the maximum utterance duration.

use std::time::Duration;

use futures::StreamExt;

use crate::pipeline::{
    AudioFrame, AudioSegment, AudioStream, SpeechEvent, SpeechEventStream, VoiceActivityDetector,
};

/// Tuning for [`EnergyVad`]
#[derive(Debug, Clone, PartialEq)]
pub struct VadConfig {
    /// Minimum RMS energy to count a frame as speech
    pub energy_threshold: f32,
    /// Speech needed before `SpeechStarted` fires
    pub min_speech: Duration,
    /// Trailing silence that ends an utterance
    pub silence: Duration,
    /// Hard cap on a single utterance
    pub max_utterance: Duration,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            energy_threshold: 0.03,
            min_speech: Duration::from_millis(300),
            silence: Duration::from_millis(500),
            max_utterance: Duration::from_secs(15),
        }
    }
}

/// State of the segment tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadState {
    /// Waiting for speech
    Idle,
    /// Loud audio seen, not yet long enough to count
    Pending,
    /// `SpeechStarted` emitted, capturing the utterance
    Speaking,
}

/// Frame-by-frame speech boundary tracker
#[derive(Debug)]
pub struct SegmentTracker {
    config: VadConfig,
    state: VadState,
    buffer: Vec<f32>,
    sample_rate: u32,
    speech_samples: usize,
    silence_samples: usize,
}

impl SegmentTracker {
    /// Create a tracker
    #[must_use]
    pub const fn new(config: VadConfig) -> Self {
        Self {
            config,
            state: VadState::Idle,
            buffer: Vec::new(),
            sample_rate: crate::pipeline::INPUT_SAMPLE_RATE,
            speech_samples: 0,
            silence_samples: 0,
        }
    }

    /// Feed one frame, returning any boundary events it completes
    pub fn process(&mut self, frame: &AudioFrame) -> Vec<SpeechEvent> {
        let energy = calculate_energy(&frame.samples);
        let is_speech = energy > self.config.energy_threshold;
        let mut events = Vec::new();

        match self.state {
            VadState::Idle => {
                if is_speech {
                    self.state = VadState::Pending;
                    self.sample_rate = frame.sample_rate;
                    self.buffer.clear();
                    self.buffer.extend_from_slice(&frame.samples);
                    self.speech_samples = frame.samples.len();
                    self.silence_samples = 0;
                    tracing::trace!(energy, "possible speech");
                    self.check_started(&mut events);
                }
            }
            VadState::Pending | VadState::Speaking => {
                self.buffer.extend_from_slice(&frame.samples);
                if is_speech {
                    self.speech_samples += frame.samples.len();
                    self.silence_samples = 0;
                } else {
                    self.silence_samples += frame.samples.len();
                }

                if self.state == VadState::Pending {
                    self.check_started(&mut events);
                }

                let silence_limit = samples_for(self.config.silence, self.sample_rate);
                let max_samples = samples_for(self.config.max_utterance, self.sample_rate);

                if self.state == VadState::Speaking
                    && (self.silence_samples > silence_limit || self.buffer.len() >= max_samples)
                {
                    tracing::debug!(
                        samples = self.buffer.len(),
                        forced = self.buffer.len() >= max_samples,
                        "speech segment complete"
                    );
                    events.push(SpeechEvent::SpeechEnded(self.take_segment()));
                } else if self.state == VadState::Pending && self.silence_samples > silence_limit {
                    tracing::trace!("blip discarded");
                    self.reset();
                }
            }
        }

        events
    }

    fn check_started(&mut self, events: &mut Vec<SpeechEvent>) {
        if self.speech_samples >= samples_for(self.config.min_speech, self.sample_rate) {
            self.state = VadState::Speaking;
            tracing::debug!("speech started");
            events.push(SpeechEvent::SpeechStarted);
        }
    }

    fn take_segment(&mut self) -> AudioSegment {
        let segment = AudioSegment {
            samples: std::mem::take(&mut self.buffer),
            sample_rate: self.sample_rate,
        };
        self.reset();
        segment
    }

    /// Reset to idle, dropping any partial utterance
    pub fn reset(&mut self) {
        self.state = VadState::Idle;
        self.buffer.clear();
        self.speech_samples = 0;
        self.silence_samples = 0;
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> VadState {
        self.state
    }

    /// Audio buffered for the current utterance
    #[must_use]
    pub fn buffered(&self) -> &[f32] {
        &self.buffer
    }
}

/// Voice activity detector driven by [`SegmentTracker`]
#[derive(Debug, Clone, Default)]
pub struct EnergyVad {
    config: VadConfig,
}

impl EnergyVad {
    /// Create a detector
    #[must_use]
    pub const fn new(config: VadConfig) -> Self {
        Self { config }
    }
}

impl VoiceActivityDetector for EnergyVad {
    fn detect_speech_boundaries(&self, audio: AudioStream) -> SpeechEventStream {
        let mut tracker = SegmentTracker::new(self.config.clone());
        audio
            .flat_map(move |frame| futures::stream::iter(tracker.process(&frame)))
            .boxed()
    }
}

#[allow(clippy::cast_possible_truncation)]
fn samples_for(duration: Duration, sample_rate: u32) -> usize {
    (duration.as_millis() * u128::from(sample_rate) / 1000) as usize
}

/// Calculate RMS energy of audio samples
#[allow(clippy::cast_precision_loss)]
fn calculate_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loud(ms: usize) -> AudioFrame {
        AudioFrame::new(vec![0.3; ms * 16])
    }

    fn quiet(ms: usize) -> AudioFrame {
        AudioFrame::new(vec![0.0; ms * 16])
    }

    #[test]
    fn test_energy_calculation() {
        assert!(calculate_energy(&[0.0; 100]) < 0.001);
        assert!(calculate_energy(&[0.5; 100]) > 0.4);
        assert!(calculate_energy(&[]).abs() < f32::EPSILON);
    }

    #[test]
    fn blip_never_starts_speech() {
        let mut tracker = SegmentTracker::new(VadConfig::default());
        assert!(tracker.process(&loud(100)).is_empty());
        assert_eq!(tracker.state(), VadState::Pending);
        assert!(tracker.process(&quiet(600)).is_empty());
        assert_eq!(tracker.state(), VadState::Idle);
    }

    #[test]
    fn speech_then_silence_yields_segment() {
        let mut tracker = SegmentTracker::new(VadConfig::default());
        assert_eq!(tracker.process(&loud(400)), vec![SpeechEvent::SpeechStarted]);

        let events = tracker.process(&quiet(600));
        let [SpeechEvent::SpeechEnded(segment)] = events.as_slice() else {
            panic!("expected one SpeechEnded, got {events:?}");
        };
        assert_eq!(segment.samples.len(), 1000 * 16);
        assert_eq!(tracker.state(), VadState::Idle);
    }

    #[test]
    fn long_utterance_is_force_closed() {
        let config = VadConfig {
            max_utterance: Duration::from_secs(1),
            ..VadConfig::default()
        };
        let mut tracker = SegmentTracker::new(config);
        let mut ended = 0;
        for _ in 0..12 {
            ended += tracker
                .process(&loud(100))
                .iter()
                .filter(|e| matches!(e, SpeechEvent::SpeechEnded(_)))
                .count();
        }
        assert_eq!(ended, 1);
    }

    #[tokio::test]
    async fn detector_streams_events() {
        let frames = vec![quiet(100), loud(400), quiet(600)];
        let audio = futures::stream::iter(frames).boxed();
        let events: Vec<SpeechEvent> = EnergyVad::default()
            .detect_speech_boundaries(audio)
            .collect()
            .await;

        assert_eq!(events.len(), 2);
        assert_eq!(events[0], SpeechEvent::SpeechStarted);
        assert!(matches!(events[1], SpeechEvent::SpeechEnded(_)));
    }
}
