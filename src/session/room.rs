//! Rooms: where a session's audio comes from and goes to

use async_trait::async_trait;

use crate::Result;
use crate::pipeline::{AudioChunk, AudioStream, SpeechEventStream};

/// Inbound side of a room
pub enum RoomInput {
    /// Raw audio, segmented by the session's VAD
    Audio(AudioStream),
    /// Speech events already produced upstream (hosted VAD or streaming STT)
    Events(SpeechEventStream),
}

/// Outbound speech sink
///
/// One utterance is `begin`, any number of `write`s, then `finish` or
/// `abort`. `abort` must discard anything not yet played.
#[async_trait]
pub trait AudioOutput: Send {
    /// Start a new utterance
    async fn begin(&mut self, text: &str) -> Result<()>;

    /// Queue a chunk of the current utterance
    async fn write(&mut self, chunk: AudioChunk) -> Result<()>;

    /// Flush and wait until the utterance has played
    async fn finish(&mut self) -> Result<()>;

    /// Stop the current utterance immediately
    async fn abort(&mut self);

    /// Release the output; called once when the session ends
    async fn close(&mut self) {}
}

/// A connected room
pub struct Room {
    /// Name used in logs
    pub name: String,
    pub input: RoomInput,
    pub output: Box<dyn AudioOutput>,
}

impl Room {
    /// Assemble a room from its parts
    pub fn new(name: impl Into<String>, input: RoomInput, output: Box<dyn AudioOutput>) -> Self {
        Self {
            name: name.into(),
            input,
            output,
        }
    }
}

impl std::fmt::Debug for Room {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let input = match self.input {
            RoomInput::Audio(_) => "audio",
            RoomInput::Events(_) => "events",
        };
        f.debug_struct("Room")
            .field("name", &self.name)
            .field("input", &input)
            .finish_non_exhaustive()
    }
}

/// Source of rooms
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect to a room
    ///
    /// # Errors
    ///
    /// Returns `Error::Room` if the connection cannot be established
    async fn connect(&self) -> Result<Room>;
}
