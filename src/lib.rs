//! voxloop - Voice assistant session loop
//!
//! This library provides:
//! - A per-room session state machine (listen, transcribe, think, speak)
//!   with barge-in, stage timeouts and function calling
//! - Pluggable speech pipeline capabilities (VAD, STT, LLM, TTS)
//! - OpenAI-compatible providers and an offline similarity model
//! - A zone temperature controller exposed as functions and over HTTP
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                      Rooms                           │
//! │        Audio input  │  Event input  │  Console       │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │               Session controller                     │
//! │   State machine  │  ChatContext  │  Functions        │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                Speech pipeline                       │
//! │      VAD  │  STT  │  LLM  │  TTS                     │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod chat;
pub mod config;
pub mod error;
pub mod functions;
pub mod llm;
pub mod pipeline;
pub mod session;
pub mod thermostat;
pub mod voice;

pub use chat::{ChatContext, ChatSnapshot, Role, Turn};
pub use config::{Config, SessionConfig};
pub use error::{Error, ErrorCategory, Result};
pub use functions::{FunctionCall, FunctionDescriptor, FunctionRegistry};
pub use pipeline::{SpeechEvent, SpeechPipeline};
pub use session::{SessionController, SessionHandle, SessionState, SpeechOutcome};
pub use thermostat::{Thermostat, Zone};
