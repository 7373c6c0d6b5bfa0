//! The per-room turn loop
//!
//! One task per connected room drives the chat through
//! listen → transcribe → think → speak. Every suspension point races the
//! close signal, so closing the handle cancels whatever is in flight.
//! While speaking, the inbound event stream is raced against playback and a
//! new `SpeechStarted` cuts the playback off (barge-in).

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::json;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::room::{AudioOutput, Room, RoomInput};
use super::state::SessionState;
use crate::chat::{ChatContext, Role};
use crate::config::SessionConfig;
use crate::functions::{FunctionCall, FunctionDefinition, FunctionRegistry};
use crate::pipeline::{AudioSegment, Completion, SpeechEvent, SpeechEventStream, SpeechPipeline};
use crate::{Error, Result};

/// Extra time the detector gets to close a long utterance itself in audio rooms
const UTTERANCE_GRACE: Duration = Duration::from_millis(500);

/// How a piece of speech ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechOutcome {
    /// All audio was delivered
    Completed,
    /// The user started speaking over it
    Interrupted,
    /// Synthesis or output failed; the rest was dropped
    Failed,
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// The session was closed while waiting
#[derive(Debug, Clone, Copy)]
struct Closed;

type Flow<T = ()> = std::result::Result<T, Closed>;

enum Command {
    Say {
        text: String,
        allow_interruptions: bool,
        reply: oneshot::Sender<Result<SpeechOutcome>>,
    },
}

/// Builds sessions from shared collaborators
#[derive(Clone)]
pub struct SessionController {
    config: SessionConfig,
    pipeline: SpeechPipeline,
    functions: Arc<FunctionRegistry>,
}

impl SessionController {
    /// Create a controller
    pub fn new(
        config: SessionConfig,
        pipeline: SpeechPipeline,
        functions: Arc<FunctionRegistry>,
    ) -> Self {
        Self {
            config,
            pipeline,
            functions,
        }
    }

    /// Start a session in `room` on a new task
    ///
    /// Each call creates an independent session with its own chat context.
    #[must_use]
    pub fn start(&self, room: Room) -> SessionHandle {
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        let (command_tx, command_rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let (events, utterance_limit) = match room.input {
            RoomInput::Audio(audio) => (
                self.pipeline.vad.detect_speech_boundaries(audio),
                self.config.max_utterance + UTTERANCE_GRACE,
            ),
            RoomInput::Events(events) => (events, self.config.max_utterance),
        };

        let session = Session {
            chat: ChatContext::with_system_prompt(&self.config.system_prompt),
            config: self.config.clone(),
            pipeline: self.pipeline.clone(),
            functions: Arc::clone(&self.functions),
            state: state_tx,
            cancel: cancel.clone(),
            events,
            output: room.output,
            commands: command_rx,
            utterance: Utterance::default(),
            utterance_limit,
        };

        let span = tracing::info_span!("session", room = %room.name);
        let task = tokio::spawn(session.run().instrument(span));

        SessionHandle {
            commands: command_tx,
            state: state_rx,
            cancel,
            task,
        }
    }
}

/// Host-side control of a running session
#[derive(Debug)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<SessionState>,
    cancel: CancellationToken,
    task: JoinHandle<ChatContext>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Say { text, .. } => f.debug_struct("Say").field("text", text).finish_non_exhaustive(),
        }
    }
}

impl SessionHandle {
    /// Speak `text` as the assistant and wait until it has been played
    ///
    /// Queued until the session is listening. With `allow_interruptions` the
    /// user can cut it off like any model reply.
    ///
    /// # Errors
    ///
    /// Returns `Error::SessionClosed` if the session ends first
    pub async fn say(
        &self,
        text: impl Into<String>,
        allow_interruptions: bool,
    ) -> Result<SpeechOutcome> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Say {
                text: text.into(),
                allow_interruptions,
                reply,
            })
            .await
            .map_err(|_| Error::SessionClosed)?;
        response.await.map_err(|_| Error::SessionClosed)?
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Receiver that observes state changes
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Ask the session to close; in-flight work is cancelled
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Wait for the session to end and take its chat context
    ///
    /// # Errors
    ///
    /// Returns `Error::Room` if the session task panicked
    pub async fn join(self) -> Result<ChatContext> {
        self.task
            .await
            .map_err(|e| Error::Room(format!("session task failed: {e}")))
    }

    /// Close and wait
    ///
    /// # Errors
    ///
    /// Returns `Error::Room` if the session task panicked
    pub async fn shutdown(self) -> Result<ChatContext> {
        self.close();
        self.join().await
    }
}

/// The utterance currently being captured
#[derive(Debug, Default)]
struct Utterance {
    started: Option<Instant>,
    interim: Option<String>,
}

impl Utterance {
    fn begin(&mut self) {
        self.started = Some(Instant::now());
        self.interim = None;
    }

    fn clear(&mut self) -> Option<String> {
        self.started = None;
        self.interim.take()
    }

    fn deadline(&self, limit: Duration) -> Option<Instant> {
        self.started.map(|at| at + limit)
    }

    const fn is_open(&self) -> bool {
        self.started.is_some()
    }
}

enum Wake {
    Cancelled,
    Command(Command),
    Event(Option<SpeechEvent>),
    UtteranceTimeout,
    Greeting,
}

enum Race {
    Played(Result<()>),
    BargeIn,
    Closed,
}

struct Session {
    config: SessionConfig,
    pipeline: SpeechPipeline,
    functions: Arc<FunctionRegistry>,
    chat: ChatContext,
    state: watch::Sender<SessionState>,
    cancel: CancellationToken,
    events: SpeechEventStream,
    output: Box<dyn AudioOutput>,
    commands: mpsc::Receiver<Command>,
    utterance: Utterance,
    /// Time an utterance may stay open before it is closed here
    utterance_limit: Duration,
}

/// Race `fut` against close, bounded by `limit`
async fn stage<T>(
    cancel: &CancellationToken,
    stage: &'static str,
    limit: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Flow<Result<T>> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(Closed),
        result = tokio::time::timeout(limit, fut) => Ok(result.unwrap_or_else(|_| {
            Err(Error::Timeout {
                stage,
                millis: millis(limit),
            })
        })),
    }
}

impl Session {
    async fn run(mut self) -> ChatContext {
        tracing::info!(functions = self.functions.len(), "session started");
        self.transition(SessionState::Listening);

        let mut greeting_at = (!self.config.greeting.trim().is_empty())
            .then(|| Instant::now() + self.config.greeting_delay);

        loop {
            let deadline = self.utterance.deadline(self.utterance_limit);
            // Host speech waits until the user's utterance has been handled
            let floor_free = !self.utterance.is_open();
            let now = Instant::now();

            let wake = tokio::select! {
                biased;
                () = self.cancel.cancelled() => Wake::Cancelled,
                Some(command) = self.commands.recv(), if floor_free => Wake::Command(command),
                event = self.events.next() => Wake::Event(event),
                () = tokio::time::sleep_until(deadline.unwrap_or(now)), if deadline.is_some() => {
                    Wake::UtteranceTimeout
                }
                () = tokio::time::sleep_until(greeting_at.unwrap_or(now)), if floor_free && greeting_at.is_some() => {
                    Wake::Greeting
                }
            };

            let flow = match wake {
                Wake::Cancelled => break,
                Wake::Event(None) => {
                    tracing::info!("room input ended");
                    break;
                }
                Wake::Event(Some(event)) => self.on_event(event).await,
                Wake::Command(Command::Say {
                    text,
                    allow_interruptions,
                    reply,
                }) => {
                    let flow = self.say(&text, allow_interruptions).await;
                    let _ = reply.send(flow.map_err(|Closed| Error::SessionClosed));
                    flow.map(|_| ())
                }
                Wake::UtteranceTimeout => self.on_utterance_timeout().await,
                Wake::Greeting => {
                    greeting_at = None;
                    if self.chat.snapshot().last_with_role(Role::User).is_some() {
                        tracing::debug!("user spoke first, greeting skipped");
                        Ok(())
                    } else {
                        let greeting = self.config.greeting.clone();
                        self.say(&greeting, true).await.map(|_| ())
                    }
                }
            };

            if flow.is_err() {
                break;
            }
        }

        self.output.close().await;
        self.transition(SessionState::Closed);
        tracing::info!(turns = self.chat.len(), "session closed");
        self.chat
    }

    fn transition(&self, next: SessionState) {
        let current = *self.state.borrow();
        if current.can_transition_to(next) {
            tracing::debug!(from = %current, to = %next, "state transition");
        } else {
            tracing::error!(from = %current, to = %next, "unexpected state transition");
        }
        self.state.send_replace(next);
    }

    async fn on_event(&mut self, event: SpeechEvent) -> Flow {
        tracing::trace!(kind = ?event.kind(), "speech event");
        match event {
            SpeechEvent::SpeechStarted => {
                self.utterance.begin();
                Ok(())
            }
            SpeechEvent::InterimTranscript(text) => {
                if self.utterance.is_open() {
                    self.utterance.interim = Some(text);
                }
                Ok(())
            }
            SpeechEvent::SpeechEnded(segment) => {
                if !self.utterance.is_open() {
                    tracing::warn!("speech ended without a start, utterance dropped");
                    return Ok(());
                }
                self.utterance.clear();
                self.transcribe(segment).await
            }
            SpeechEvent::FinalTranscript(text) => {
                self.utterance.clear();
                self.transition(SessionState::Transcribing);
                self.accept_transcript(text).await
            }
        }
    }

    async fn on_utterance_timeout(&mut self) -> Flow {
        let limit_ms = millis(self.config.max_utterance);
        match self.utterance.clear() {
            Some(interim) if !interim.trim().is_empty() => {
                tracing::info!(limit_ms, "max utterance reached, using interim transcript");
                self.transition(SessionState::Transcribing);
                self.accept_transcript(interim).await
            }
            _ => {
                tracing::warn!(limit_ms, "max utterance reached without a transcript, dropped");
                Ok(())
            }
        }
    }

    async fn transcribe(&mut self, segment: AudioSegment) -> Flow {
        self.transition(SessionState::Transcribing);
        tracing::debug!(duration_ms = millis(segment.duration()), "transcribing");

        let result = stage(
            &self.cancel,
            "transcribe",
            self.config.transcribe_timeout,
            self.pipeline.stt.transcribe(&segment),
        )
        .await?;

        match result {
            Ok(text) => self.accept_transcript(text).await,
            Err(e) => {
                tracing::warn!(error = %e, "transcription failed, utterance dropped");
                self.transition(SessionState::Listening);
                Ok(())
            }
        }
    }

    /// Transcribing → Thinking → Speaking, or back to Listening
    async fn accept_transcript(&mut self, text: String) -> Flow {
        let text = text.trim();
        if text.is_empty() {
            tracing::debug!("empty transcript dropped");
            self.transition(SessionState::Listening);
            return Ok(());
        }

        tracing::info!(transcript = %text, "user said");
        self.transition(SessionState::Thinking);
        self.chat.append(Role::User, text);

        match self.think().await? {
            Some(reply) => {
                self.chat.append(Role::Assistant, reply.as_str());
                self.speak(&reply, true).await.map(|_| ())
            }
            None => {
                self.transition(SessionState::Listening);
                Ok(())
            }
        }
    }

    /// Run the model until it produces text, dispatching function calls
    async fn think(&mut self) -> Flow<Option<String>> {
        let definitions = self.functions.definitions();
        let mut depth = 0;

        loop {
            let completion = match self.complete(&definitions).await? {
                Ok(completion) => completion,
                Err(e) => {
                    tracing::error!(error = %e, "model failed twice, using fallback reply");
                    return Ok(Some(self.config.model_fallback.clone()));
                }
            };

            let Some(call) = completion.function_call else {
                let text = completion.text.trim();
                if text.is_empty() {
                    tracing::debug!("model returned no text");
                    return Ok(None);
                }
                return Ok(Some(text.to_string()));
            };

            if depth >= self.config.max_function_depth {
                let error = Error::ChainDepthExceeded(self.config.max_function_depth);
                tracing::warn!(error = %error, function = %call.name, "function chain cut off");
                return Ok(Some(self.config.depth_fallback.clone()));
            }
            depth += 1;

            let Some(result) = self.dispatch(&call).await? else {
                return Ok(Some(self.config.depth_fallback.clone()));
            };
            self.chat.append_function_result(call, result);
            self.transition(SessionState::Thinking);
        }
    }

    /// One model call, retried once on failure
    async fn complete(&mut self, definitions: &[FunctionDefinition]) -> Flow<Result<Completion>> {
        let snapshot = self.chat.snapshot();
        let limit = self.config.think_timeout;

        let first = stage(
            &self.cancel,
            "think",
            limit,
            self.pipeline.llm.complete(&snapshot, definitions),
        )
        .await?;

        match first {
            Ok(completion) => Ok(Ok(completion)),
            Err(e) => {
                tracing::warn!(error = %e, "model call failed, retrying");
                stage(
                    &self.cancel,
                    "think",
                    limit,
                    self.pipeline.llm.complete(&snapshot, definitions),
                )
                .await
            }
        }
    }

    /// Run a requested function
    ///
    /// Handler failures become an error payload for the model. A call the
    /// registry rejects yields `None` and nothing is appended.
    async fn dispatch(&mut self, call: &FunctionCall) -> Flow<Option<String>> {
        tracing::info!(function = %call.name, call_id = %call.id, "calling function");

        let result = stage(
            &self.cancel,
            "dispatch",
            self.config.think_timeout,
            self.functions.dispatch(&call.name, call.arguments.clone()),
        )
        .await?;

        Ok(match result {
            Ok(value) => Some(value.to_string()),
            Err(e @ (Error::UnknownFunction(_) | Error::InvalidArguments { .. })) => {
                tracing::error!(
                    function = %call.name,
                    category = ?e.category(),
                    error = %e,
                    "model made an invalid call, chain ended"
                );
                None
            }
            Err(e) => {
                tracing::warn!(function = %call.name, error = %e, "function failed");
                Some(json!({ "error": e.to_string() }).to_string())
            }
        })
    }

    /// Host-initiated speech
    async fn say(&mut self, text: &str, allow_interruptions: bool) -> Flow<SpeechOutcome> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(SpeechOutcome::Completed);
        }
        self.chat.append(Role::Assistant, text);
        self.speak(text, allow_interruptions).await
    }

    /// Synthesize and play `text`, racing the user for the floor
    async fn speak(&mut self, text: &str, allow_interruptions: bool) -> Flow<SpeechOutcome> {
        self.transition(SessionState::Speaking);
        tracing::info!(text, allow_interruptions, "speaking");

        let race = {
            let tts = Arc::clone(&self.pipeline.tts);
            let limit = self.config.synthesize_timeout;
            let output = &mut self.output;
            let events = &mut self.events;
            let cancel = &self.cancel;

            let playback = async move {
                let mut audio = tokio::time::timeout(limit, tts.synthesize(text))
                    .await
                    .map_err(|_| Error::Timeout {
                        stage: "synthesize",
                        millis: millis(limit),
                    })??;
                output.begin(text).await?;
                while let Some(chunk) = audio.next().await {
                    output.write(chunk?).await?;
                }
                output.finish().await
            };
            tokio::pin!(playback);

            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break Race::Closed,
                    event = events.next(), if allow_interruptions => match event {
                        Some(SpeechEvent::SpeechStarted) => break Race::BargeIn,
                        Some(SpeechEvent::SpeechEnded(_)) => {
                            tracing::warn!("speech ended without a start while speaking, utterance dropped");
                        }
                        Some(other) => tracing::debug!(kind = ?other.kind(), "event ignored while speaking"),
                        None => break Race::Closed,
                    },
                    result = &mut playback => break Race::Played(result),
                }
            }
        };

        match race {
            Race::Played(Ok(())) => {
                self.transition(SessionState::Listening);
                Ok(SpeechOutcome::Completed)
            }
            Race::Played(Err(e)) => {
                self.output.abort().await;
                tracing::warn!(error = %e, "speech failed, returning to listening");
                self.transition(SessionState::Listening);
                Ok(SpeechOutcome::Failed)
            }
            Race::BargeIn => {
                self.output.abort().await;
                tracing::info!("speech interrupted by user");
                self.transition(SessionState::Interrupted);
                self.transition(SessionState::Listening);
                self.utterance.begin();
                Ok(SpeechOutcome::Interrupted)
            }
            Race::Closed => {
                self.output.abort().await;
                Err(Closed)
            }
        }
    }
}
