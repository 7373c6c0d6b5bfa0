//! TOML configuration file loading
//!
//! Supports `~/.config/voxloop/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VoxloopConfigFile {
    /// Turn loop tuning
    #[serde(default)]
    pub session: SessionFileConfig,

    /// Speech-to-text and text-to-speech
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// Language model selection
    #[serde(default)]
    pub llm: LlmFileConfig,

    /// Temperature API server
    #[serde(default)]
    pub server: ServerFileConfig,

    /// API keys for external services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,
}

/// Session configuration
#[derive(Debug, Default, Deserialize)]
pub struct SessionFileConfig {
    pub max_utterance_ms: Option<u64>,
    pub max_function_depth: Option<usize>,
    pub transcribe_timeout_ms: Option<u64>,
    pub think_timeout_ms: Option<u64>,
    pub synthesize_timeout_ms: Option<u64>,
    pub system_prompt: Option<String>,
    pub greeting: Option<String>,
    pub greeting_delay_ms: Option<u64>,
}

/// Voice processing configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// STT model (e.g. "whisper-1")
    pub stt_model: Option<String>,

    /// TTS model (e.g. "tts-1")
    pub tts_model: Option<String>,

    /// TTS voice identifier (e.g. "alloy")
    pub tts_voice: Option<String>,

    /// TTS speed multiplier
    pub tts_speed: Option<f32>,

    /// VAD energy threshold
    pub vad_threshold: Option<f32>,

    /// Trailing silence that ends an utterance, in ms
    pub vad_silence_ms: Option<u64>,

    /// Speech needed before an utterance starts, in ms
    pub vad_min_speech_ms: Option<u64>,
}

/// LLM-related configuration
#[derive(Debug, Default, Deserialize)]
pub struct LlmFileConfig {
    /// "local" or "openai"
    pub provider: Option<String>,

    /// Model identifier (e.g. "gpt-4o-mini")
    pub model: Option<String>,

    pub max_tokens: Option<u32>,
}

/// Server configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// Temperature API port
    pub port: Option<u16>,
}

/// API keys configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub openai: Option<String>,
    pub openai_base_url: Option<String>,
}

/// Load the config file from its default location
///
/// Returns `VoxloopConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> VoxloopConfigFile {
    config_file_path().map_or_else(VoxloopConfigFile::default, |path| load_from(&path))
}

/// Load a config file from an explicit path
///
/// Missing or malformed files fall back to defaults with a warning.
pub fn load_from(path: &Path) -> VoxloopConfigFile {
    if !path.exists() {
        return VoxloopConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                VoxloopConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            VoxloopConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/voxloop/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("voxloop").join("config.toml"))
}
