//! Text console room
//!
//! Each non-empty input line is treated as one finished utterance; replies
//! are printed instead of played. Typing `exit`, `quit` or `bye` ends the
//! session.

use async_trait::async_trait;
use futures::{StreamExt, stream};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio_stream::wrappers::LinesStream;

use super::room::{AudioOutput, Room, RoomInput, Transport};
use crate::Result;
use crate::pipeline::{AudioChunk, SpeechEvent, SpeechEventStream};

const EXIT_WORDS: [&str; 3] = ["exit", "quit", "bye"];

/// Whether `line` asks to leave
#[must_use]
pub fn is_exit(line: &str) -> bool {
    let word = line.trim().trim_end_matches(['.', '!']);
    EXIT_WORDS.iter().any(|w| word.eq_ignore_ascii_case(w))
}

/// Turn input lines into speech events
///
/// The stream ends at end of input or on an exit word.
pub fn line_events<R>(reader: R) -> SpeechEventStream
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    LinesStream::new(reader.lines())
        .filter_map(|line| async move {
            match line {
                Ok(line) => Some(line),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to read input line");
                    None
                }
            }
        })
        .take_while(|line| std::future::ready(!is_exit(line)))
        .filter(|line| std::future::ready(!line.trim().is_empty()))
        .flat_map(|line| {
            stream::iter([
                SpeechEvent::SpeechStarted,
                SpeechEvent::FinalTranscript(line),
            ])
        })
        .boxed()
}

/// Prints assistant speech as text
pub struct ConsoleOutput<W> {
    writer: W,
}

impl<W> ConsoleOutput<W> {
    pub const fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Recover the writer
    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W> AudioOutput for ConsoleOutput<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn begin(&mut self, text: &str) -> Result<()> {
        self.writer
            .write_all(format!("Assistant: {text}\n").as_bytes())
            .await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn write(&mut self, _chunk: AudioChunk) -> Result<()> {
        Ok(())
    }

    async fn finish(&mut self) -> Result<()> {
        Ok(())
    }

    async fn abort(&mut self) {
        tracing::debug!("console speech interrupted");
    }
}

/// Stdin/stdout room
#[derive(Debug, Default)]
pub struct ConsoleTransport;

#[async_trait]
impl Transport for ConsoleTransport {
    async fn connect(&self) -> Result<Room> {
        Ok(Room::new(
            "console",
            RoomInput::Events(line_events(BufReader::new(tokio::io::stdin()))),
            Box::new(ConsoleOutput::new(tokio::io::stdout())),
        ))
    }
}
