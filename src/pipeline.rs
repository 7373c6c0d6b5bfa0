//! Speech pipeline capabilities
//!
//! The session controller talks to four independently replaceable
//! collaborators: voice-activity detection, speech-to-text, a language
//! model and text-to-speech. Each is a trait object so any provider can be
//! swapped in without touching the controller.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::chat::ChatSnapshot;
use crate::functions::{FunctionCall, FunctionDefinition};
use crate::{Error, Result};

/// Sample rate for inbound speech (16kHz mono)
pub const INPUT_SAMPLE_RATE: u32 = 16_000;

/// Sample rate for synthesized speech (24kHz mono)
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

/// A frame of inbound audio, f32 samples in [-1.0, 1.0]
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioFrame {
    /// Frame at the default input rate
    #[must_use]
    pub const fn new(samples: Vec<f32>) -> Self {
        Self {
            samples,
            sample_rate: INPUT_SAMPLE_RATE,
        }
    }
}

/// A complete utterance captured between speech boundaries
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSegment {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioSegment {
    /// Length of the segment
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }
}

/// A chunk of synthesized audio, signed 16-bit PCM
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

/// Inbound audio from a room
pub type AudioStream = BoxStream<'static, AudioFrame>;

/// Speech boundary and transcript events
pub type SpeechEventStream = BoxStream<'static, SpeechEvent>;

/// Synthesized audio, possibly failing mid-stream
pub type SynthesisStream = BoxStream<'static, Result<AudioChunk>>;

/// Produced by VAD/STT, consumed by the session controller
#[derive(Debug, Clone, PartialEq)]
pub enum SpeechEvent {
    /// Voice activity began
    SpeechStarted,
    /// Voice activity ended; carries the captured utterance
    SpeechEnded(AudioSegment),
    /// Partial transcript from a streaming recognizer
    InterimTranscript(String),
    /// Final transcript from a streaming recognizer
    FinalTranscript(String),
}

/// Discriminant of a [`SpeechEvent`], for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechEventKind {
    SpeechStarted,
    SpeechEnded,
    InterimTranscript,
    FinalTranscript,
}

impl SpeechEvent {
    /// Event kind without payload
    #[must_use]
    pub const fn kind(&self) -> SpeechEventKind {
        match self {
            Self::SpeechStarted => SpeechEventKind::SpeechStarted,
            Self::SpeechEnded(_) => SpeechEventKind::SpeechEnded,
            Self::InterimTranscript(_) => SpeechEventKind::InterimTranscript,
            Self::FinalTranscript(_) => SpeechEventKind::FinalTranscript,
        }
    }
}

/// Model output: text, or a request to call a function
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Completion {
    pub text: String,
    pub function_call: Option<FunctionCall>,
}

impl Completion {
    /// Plain text reply
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            function_call: None,
        }
    }

    /// Function call request
    #[must_use]
    pub fn call(call: FunctionCall) -> Self {
        Self {
            text: String::new(),
            function_call: Some(call),
        }
    }
}

/// Segments raw audio into speech events
pub trait VoiceActivityDetector: Send + Sync {
    /// Lazily turn an audio stream into speech boundary events
    ///
    /// The returned stream ends when the audio stream ends. Call again for
    /// each new connection.
    fn detect_speech_boundaries(&self, audio: AudioStream) -> SpeechEventStream;
}

/// Converts an utterance to text
#[async_trait]
pub trait SpeechToText: Send + Sync {
    /// Transcribe a captured utterance
    ///
    /// # Errors
    ///
    /// Returns `Error::Transcription` if the recognizer fails
    async fn transcribe(&self, segment: &AudioSegment) -> Result<String>;
}

/// Produces the assistant's next move
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Complete the conversation
    ///
    /// # Errors
    ///
    /// Returns `Error::Model` if the model call fails
    async fn complete(
        &self,
        chat: &ChatSnapshot,
        functions: &[FunctionDefinition],
    ) -> Result<Completion>;
}

/// Converts text to audio
#[async_trait]
pub trait TextToSpeech: Send + Sync {
    /// Start synthesizing `text`
    ///
    /// # Errors
    ///
    /// Returns `Error::Synthesis` if the request cannot be started
    async fn synthesize(&self, text: &str) -> Result<SynthesisStream>;
}

/// Speech-to-text stand-in for sessions whose rooms deliver transcripts
pub struct NoSpeechToText;

#[async_trait]
impl SpeechToText for NoSpeechToText {
    async fn transcribe(&self, _segment: &AudioSegment) -> Result<String> {
        Err(Error::Transcription(
            "no speech-to-text provider configured".to_string(),
        ))
    }
}

/// The four capabilities a session needs
#[derive(Clone)]
pub struct SpeechPipeline {
    pub vad: Arc<dyn VoiceActivityDetector>,
    pub stt: Arc<dyn SpeechToText>,
    pub llm: Arc<dyn LanguageModel>,
    pub tts: Arc<dyn TextToSpeech>,
}

impl SpeechPipeline {
    /// Bundle the four capabilities
    pub fn new(
        vad: Arc<dyn VoiceActivityDetector>,
        stt: Arc<dyn SpeechToText>,
        llm: Arc<dyn LanguageModel>,
        tts: Arc<dyn TextToSpeech>,
    ) -> Self {
        Self { vad, stt, llm, tts }
    }
}
