//! Voice processing module
//!
//! Energy VAD, WAV encoding, and OpenAI-compatible STT/TTS providers.

mod stt;
mod tts;
mod vad;
mod wav;

pub use stt::{DEFAULT_BASE_URL, WhisperStt};
pub use tts::{OpenAiTts, TextOnlySpeech};
pub use vad::{EnergyVad, SegmentTracker, VadConfig, VadState};
pub use wav::{pcm_to_wav, samples_to_wav, segment_to_wav, wav_to_segment};
