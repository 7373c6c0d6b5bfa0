//! Voice sessions
//!
//! A [`SessionController`] owns the shared collaborators; each connected
//! [`Room`] gets its own session task, chat context and state.

pub mod console;
mod controller;
mod room;
mod state;

pub use controller::{SessionController, SessionHandle, SpeechOutcome};
pub use room::{AudioOutput, Room, RoomInput, Transport};
pub use state::SessionState;
