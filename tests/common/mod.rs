//! Shared test utilities: scripted collaborators and a recording room

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, stream};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use voxloop::chat::{ChatSnapshot, Role};
use voxloop::functions::{FunctionCall, FunctionDefinition};
use voxloop::pipeline::{
    AudioChunk, AudioSegment, Completion, INPUT_SAMPLE_RATE, LanguageModel, OUTPUT_SAMPLE_RATE,
    SpeechEvent, SpeechPipeline, SpeechToText, SynthesisStream, TextToSpeech,
};
use voxloop::session::{AudioOutput, Room, RoomInput};
use voxloop::voice::{EnergyVad, VadConfig};
use voxloop::{ChatContext, Error, Result, SessionConfig};

/// Long enough to look hung next to any test timeout
pub const HANG: Duration = Duration::from_secs(3600);

/// Session config with no greeting and short timeouts
#[must_use]
pub fn test_config() -> SessionConfig {
    SessionConfig {
        system_prompt: "You are a test assistant.".to_string(),
        greeting: String::new(),
        max_utterance: Duration::from_secs(5),
        transcribe_timeout: Duration::from_secs(2),
        think_timeout: Duration::from_secs(2),
        synthesize_timeout: Duration::from_secs(2),
        max_function_depth: 3,
        ..SessionConfig::default()
    }
}

/// Let the session task run until it is idle
///
/// Tests run with a paused clock, so this returns once every task is parked.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// A short utterance
#[must_use]
pub fn segment() -> AudioSegment {
    AudioSegment {
        samples: vec![0.2; 4_800],
        sample_rate: INPUT_SAMPLE_RATE,
    }
}

/// Texts of every turn with `role`
#[must_use]
pub fn texts(chat: &ChatContext, role: Role) -> Vec<String> {
    chat.snapshot()
        .iter()
        .filter(|t| t.role == role)
        .map(|t| t.text.clone())
        .collect()
}

/// Speech-to-text that replays a script
#[derive(Default)]
pub struct ScriptedStt {
    script: Mutex<VecDeque<SttStep>>,
    calls: Mutex<usize>,
}

pub enum SttStep {
    Text(&'static str),
    Fail,
    Hang,
}

impl ScriptedStt {
    pub fn new(steps: impl IntoIterator<Item = SttStep>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(steps.into_iter().collect()),
            calls: Mutex::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl SpeechToText for ScriptedStt {
    async fn transcribe(&self, _segment: &AudioSegment) -> Result<String> {
        *self.calls.lock().unwrap() += 1;
        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(SttStep::Text(text)) => Ok(text.to_string()),
            Some(SttStep::Hang) => {
                tokio::time::sleep(HANG).await;
                Ok(String::new())
            }
            Some(SttStep::Fail) | None => Err(Error::Transcription("scripted failure".into())),
        }
    }
}

/// Language model that replays a script
pub struct ScriptedLlm {
    script: Mutex<VecDeque<LlmStep>>,
    /// Returned forever once the script runs out
    repeat: Option<Completion>,
    seen: Mutex<Vec<ChatSnapshot>>,
}

pub enum LlmStep {
    Reply(Completion),
    Fail,
    Hang,
}

impl LlmStep {
    pub fn text(text: &str) -> Self {
        Self::Reply(Completion::text(text))
    }

    pub fn call(name: &str, arguments: serde_json::Value) -> Self {
        Self::Reply(Completion::call(FunctionCall::new(name, arguments)))
    }
}

impl ScriptedLlm {
    pub fn new(steps: impl IntoIterator<Item = LlmStep>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(steps.into_iter().collect()),
            repeat: None,
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn repeating(completion: Completion) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            repeat: Some(completion),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    /// Snapshot lengths the model was called with
    pub fn snapshot_lens(&self) -> Vec<usize> {
        self.seen.lock().unwrap().iter().map(ChatSnapshot::len).collect()
    }
}

#[async_trait]
impl LanguageModel for ScriptedLlm {
    async fn complete(
        &self,
        chat: &ChatSnapshot,
        _functions: &[FunctionDefinition],
    ) -> Result<Completion> {
        self.seen.lock().unwrap().push(chat.clone());
        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(LlmStep::Reply(completion)) => Ok(completion),
            Some(LlmStep::Fail) => Err(Error::Model("scripted failure".into())),
            Some(LlmStep::Hang) => {
                tokio::time::sleep(HANG).await;
                Err(Error::Model("woke from hang".into()))
            }
            None => self
                .repeat
                .clone()
                .ok_or_else(|| Error::Model("script exhausted".into())),
        }
    }
}

/// Text-to-speech with a fixed behavior
pub enum FakeTts {
    /// Two chunks, then done
    Quick,
    /// One chunk, then never finishes
    Stall,
    /// Synthesis cannot start
    Fail,
}

fn chunk() -> AudioChunk {
    AudioChunk {
        samples: vec![0; 240],
        sample_rate: OUTPUT_SAMPLE_RATE,
    }
}

#[async_trait]
impl TextToSpeech for FakeTts {
    async fn synthesize(&self, _text: &str) -> Result<SynthesisStream> {
        match self {
            Self::Quick => Ok(stream::iter([Ok::<_, Error>(chunk()), Ok(chunk())]).boxed()),
            Self::Stall => Ok(stream::iter([Ok::<_, Error>(chunk())]).chain(stream::pending()).boxed()),
            Self::Fail => Err(Error::Synthesis("scripted failure".into())),
        }
    }
}

/// Build a pipeline from fakes
pub fn pipeline(
    stt: Arc<dyn SpeechToText>,
    llm: Arc<dyn LanguageModel>,
    tts: FakeTts,
) -> SpeechPipeline {
    SpeechPipeline::new(
        Arc::new(EnergyVad::new(VadConfig::default())),
        stt,
        llm,
        Arc::new(tts),
    )
}

/// What the room's output saw
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEvent {
    Begin(String),
    Write(usize),
    Finish,
    Abort,
    Close,
}

/// Shared view of a [`RecordingOutput`]
#[derive(Debug, Clone, Default)]
pub struct OutputLog(Arc<Mutex<Vec<OutputEvent>>>);

impl OutputLog {
    pub fn events(&self) -> Vec<OutputEvent> {
        self.0.lock().unwrap().clone()
    }

    /// Texts passed to `begin`, in order
    pub fn spoken(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                OutputEvent::Begin(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, event: &OutputEvent) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }
}

/// Output that records every call
pub struct RecordingOutput(OutputLog);

#[async_trait]
impl AudioOutput for RecordingOutput {
    async fn begin(&mut self, text: &str) -> Result<()> {
        self.0.0.lock().unwrap().push(OutputEvent::Begin(text.to_string()));
        Ok(())
    }

    async fn write(&mut self, chunk: AudioChunk) -> Result<()> {
        self.0.0.lock().unwrap().push(OutputEvent::Write(chunk.samples.len()));
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        self.0.0.lock().unwrap().push(OutputEvent::Finish);
        Ok(())
    }

    async fn abort(&mut self) {
        self.0.0.lock().unwrap().push(OutputEvent::Abort);
    }

    async fn close(&mut self) {
        self.0.0.lock().unwrap().push(OutputEvent::Close);
    }
}

/// Room fed by a channel of speech events
pub fn event_room() -> (Room, mpsc::UnboundedSender<SpeechEvent>, OutputLog) {
    let (tx, rx) = mpsc::unbounded_channel();
    let log = OutputLog::default();
    let room = Room::new(
        "test",
        RoomInput::Events(UnboundedReceiverStream::new(rx).boxed()),
        Box::new(RecordingOutput(log.clone())),
    );
    (room, tx, log)
}

/// Room fed by raw audio frames, held open after the frames run out
pub fn audio_room(frames: Vec<voxloop::pipeline::AudioFrame>) -> (Room, OutputLog) {
    let log = OutputLog::default();
    let room = Room::new(
        "audio",
        RoomInput::Audio(stream::iter(frames).chain(stream::pending()).boxed()),
        Box::new(RecordingOutput(log.clone())),
    );
    (room, log)
}
