//! Session states and the transitions allowed between them

use std::fmt;

/// Where a session is in its turn loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    /// Created, not yet consuming input
    #[default]
    Idle,
    /// Waiting for the user to speak
    Listening,
    /// Converting a captured utterance to text
    Transcribing,
    /// Waiting on the model or running functions
    Thinking,
    /// Playing synthesized speech
    Speaking,
    /// Speech was cut off by the user
    Interrupted,
    /// Disconnected; no further events are processed
    Closed,
}

impl SessionState {
    /// Lowercase name for logs
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Listening => "listening",
            Self::Transcribing => "transcribing",
            Self::Thinking => "thinking",
            Self::Speaking => "speaking",
            Self::Interrupted => "interrupted",
            Self::Closed => "closed",
        }
    }

    /// Whether the turn loop may move from `self` to `next`
    ///
    /// `Closed` is reachable from every state and leads nowhere.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        use SessionState::{
            Closed, Idle, Interrupted, Listening, Speaking, Thinking, Transcribing,
        };

        match (self, next) {
            (Closed, _) => false,
            (_, Closed)
            | (Idle | Interrupted, Listening)
            | (Listening, Transcribing | Speaking)
            | (Transcribing, Thinking | Listening)
            | (Thinking, Thinking | Speaking | Listening)
            | (Speaking, Listening | Interrupted) => true,
            _ => false,
        }
    }

    /// Whether the session has ended
    #[must_use]
    pub const fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
