//! Configuration management for voxloop

pub mod file;

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::voice::{DEFAULT_BASE_URL, VadConfig};
use crate::{Error, Result};

use file::VoxloopConfigFile;

/// Default system prompt for the assistant
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a smart voice assistant designed to interact with users through voice. \
     Provide brief, clear, and concise responses, avoiding complex or unpronounceable punctuation.";

/// Default greeting spoken when a session starts
pub const DEFAULT_GREETING: &str = "Hello! How can I assist you today?";

/// voxloop configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Turn loop settings handed to each session
    pub session: SessionConfig,

    /// Voice processing configuration
    pub voice: VoiceConfig,

    /// Language model configuration
    pub llm: LlmConfig,

    /// Temperature API server configuration
    pub server: ServerConfig,

    /// API keys
    pub api_keys: ApiKeys,
}

/// Settings for one session's turn loop
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Longest utterance before it is force-closed
    pub max_utterance: Duration,

    /// Function calls allowed per user turn
    pub max_function_depth: usize,

    pub transcribe_timeout: Duration,

    /// Limit on each model call and each function dispatch
    pub think_timeout: Duration,

    /// Limit on starting synthesis
    pub synthesize_timeout: Duration,

    /// Seeds the chat context; empty for none
    pub system_prompt: String,

    /// Spoken once after `greeting_delay`; empty for none
    pub greeting: String,

    pub greeting_delay: Duration,

    /// Assistant reply after the model fails twice
    pub model_fallback: String,

    /// Assistant reply when a function chain is cut off or a call is rejected
    pub depth_fallback: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_utterance: Duration::from_secs(15),
            max_function_depth: 5,
            transcribe_timeout: Duration::from_secs(10),
            think_timeout: Duration::from_secs(20),
            synthesize_timeout: Duration::from_secs(10),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            greeting: DEFAULT_GREETING.to_string(),
            greeting_delay: Duration::from_secs(1),
            model_fallback: "I'm having trouble right now".to_string(),
            depth_fallback: "Sorry, I couldn't finish that request.".to_string(),
        }
    }
}

/// Voice processing configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// STT model (e.g. "whisper-1")
    pub stt_model: String,

    /// TTS model (e.g. "tts-1")
    pub tts_model: String,

    /// TTS voice identifier
    pub tts_voice: String,

    /// TTS speed multiplier (0.25 to 4.0)
    pub tts_speed: f32,

    /// VAD energy threshold
    pub vad_threshold: f32,

    /// Trailing silence that ends an utterance
    pub vad_silence: Duration,

    /// Speech needed before an utterance starts
    pub vad_min_speech: Duration,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            stt_model: "whisper-1".to_string(),
            tts_model: "tts-1".to_string(),
            tts_voice: "alloy".to_string(),
            tts_speed: 1.0,
            vad_threshold: VadConfig::default().energy_threshold,
            vad_silence: VadConfig::default().silence,
            vad_min_speech: VadConfig::default().min_speech,
        }
    }
}

/// Which language model answers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LlmProvider {
    /// Offline similarity model
    #[default]
    Local,
    /// OpenAI-compatible chat completions
    OpenAi,
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Local => "local",
            Self::OpenAi => "openai",
        })
    }
}

impl FromStr for LlmProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "openai" => Ok(Self::OpenAi),
            other => Err(Error::Config(format!(
                "unknown llm provider '{other}' (expected local or openai)"
            ))),
        }
    }
}

/// Language model configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: LlmProvider,

    /// Model identifier for chat completions
    pub model: String,

    pub max_tokens: Option<u32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Local,
            model: "gpt-4o-mini".to_string(),
            max_tokens: None,
        }
    }
}

/// Temperature API server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8000 }
    }
}

/// API keys for external services
#[derive(Debug, Clone)]
pub struct ApiKeys {
    /// `OpenAI` API key (for Whisper, chat and TTS)
    pub openai: Option<SecretString>,

    /// Base URL of the OpenAI-compatible server
    pub openai_base_url: String,
}

impl Default for ApiKeys {
    fn default() -> Self {
        Self {
            openai: None,
            openai_base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl ApiKeys {
    /// `OpenAI` key, or a configuration error naming what needed it
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if no key is configured
    pub fn require_openai(&self, purpose: &str) -> Result<SecretString> {
        self.openai
            .clone()
            .filter(|k| !k.expose_secret().is_empty())
            .ok_or_else(|| Error::Config(format!("OPENAI_API_KEY required for {purpose}")))
    }
}

fn millis(value: Option<u64>) -> Option<Duration> {
    value.map(Duration::from_millis)
}

impl Config {
    /// Load configuration from `.env`, the config file and the environment
    ///
    /// # Errors
    ///
    /// Returns error if the resulting configuration is invalid
    pub fn load() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }

        let fc = file::load_config_file();
        let config = Self::from_sources(fc, |key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Merge a config file with environment lookups (env > toml > default)
    pub fn from_sources(fc: VoxloopConfigFile, env: impl Fn(&str) -> Option<String>) -> Self {
        let env_parse = |key: &str| env(key).and_then(|s| s.trim().parse::<u64>().ok());
        let defaults = Self::default();

        let session = SessionConfig {
            max_utterance: millis(env_parse("VOXLOOP_MAX_UTTERANCE_MS"))
                .or(millis(fc.session.max_utterance_ms))
                .unwrap_or(defaults.session.max_utterance),
            max_function_depth: env("VOXLOOP_MAX_FUNCTION_DEPTH")
                .and_then(|s| s.trim().parse().ok())
                .or(fc.session.max_function_depth)
                .unwrap_or(defaults.session.max_function_depth),
            transcribe_timeout: millis(env_parse("VOXLOOP_TRANSCRIBE_TIMEOUT_MS"))
                .or(millis(fc.session.transcribe_timeout_ms))
                .unwrap_or(defaults.session.transcribe_timeout),
            think_timeout: millis(env_parse("VOXLOOP_THINK_TIMEOUT_MS"))
                .or(millis(fc.session.think_timeout_ms))
                .unwrap_or(defaults.session.think_timeout),
            synthesize_timeout: millis(env_parse("VOXLOOP_SYNTHESIZE_TIMEOUT_MS"))
                .or(millis(fc.session.synthesize_timeout_ms))
                .unwrap_or(defaults.session.synthesize_timeout),
            system_prompt: env("VOXLOOP_SYSTEM_PROMPT")
                .or(fc.session.system_prompt)
                .unwrap_or(defaults.session.system_prompt),
            greeting: env("VOXLOOP_GREETING")
                .or(fc.session.greeting)
                .unwrap_or(defaults.session.greeting),
            greeting_delay: millis(fc.session.greeting_delay_ms)
                .unwrap_or(defaults.session.greeting_delay),
            ..defaults.session
        };

        let voice = VoiceConfig {
            stt_model: env("VOXLOOP_STT_MODEL")
                .or(fc.voice.stt_model)
                .unwrap_or(defaults.voice.stt_model),
            tts_model: env("VOXLOOP_TTS_MODEL")
                .or(fc.voice.tts_model)
                .unwrap_or(defaults.voice.tts_model),
            tts_voice: env("VOXLOOP_TTS_VOICE")
                .or(fc.voice.tts_voice)
                .unwrap_or(defaults.voice.tts_voice),
            tts_speed: fc.voice.tts_speed.unwrap_or(defaults.voice.tts_speed),
            vad_threshold: fc.voice.vad_threshold.unwrap_or(defaults.voice.vad_threshold),
            vad_silence: millis(fc.voice.vad_silence_ms).unwrap_or(defaults.voice.vad_silence),
            vad_min_speech: millis(fc.voice.vad_min_speech_ms)
                .unwrap_or(defaults.voice.vad_min_speech),
        };

        let provider = env("VOXLOOP_LLM_PROVIDER")
            .or(fc.llm.provider)
            .and_then(|p| match p.parse::<LlmProvider>() {
                Ok(provider) => Some(provider),
                Err(e) => {
                    tracing::warn!(error = %e, "ignoring llm provider setting");
                    None
                }
            })
            .unwrap_or(defaults.llm.provider);

        let llm = LlmConfig {
            provider,
            model: env("VOXLOOP_LLM_MODEL")
                .or(fc.llm.model)
                .unwrap_or(defaults.llm.model),
            max_tokens: fc.llm.max_tokens,
        };

        let server = ServerConfig {
            port: env("VOXLOOP_PORT")
                .and_then(|s| s.trim().parse().ok())
                .or(fc.server.port)
                .unwrap_or(defaults.server.port),
        };

        let api_keys = ApiKeys {
            openai: env("OPENAI_API_KEY")
                .or(fc.api_keys.openai)
                .map(SecretString::from),
            openai_base_url: env("OPENAI_BASE_URL")
                .or(fc.api_keys.openai_base_url)
                .unwrap_or(defaults.api_keys.openai_base_url),
        };

        Self {
            session,
            voice,
            llm,
            server,
            api_keys,
        }
    }

    /// Check ranges that would otherwise wedge or loop a session
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` describing the first invalid setting
    pub fn validate(&self) -> Result<()> {
        let s = &self.session;
        if s.max_function_depth == 0 {
            return Err(Error::Config(
                "max_function_depth must be at least 1".to_string(),
            ));
        }
        for (name, value) in [
            ("max_utterance", s.max_utterance),
            ("transcribe_timeout", s.transcribe_timeout),
            ("think_timeout", s.think_timeout),
            ("synthesize_timeout", s.synthesize_timeout),
        ] {
            if value.is_zero() {
                return Err(Error::Config(format!("{name} must be non-zero")));
            }
        }
        if !(0.25..=4.0).contains(&self.voice.tts_speed) {
            return Err(Error::Config(format!(
                "tts_speed {} out of range 0.25..=4.0",
                self.voice.tts_speed
            )));
        }
        if !(0.0..1.0).contains(&self.voice.vad_threshold) {
            return Err(Error::Config(format!(
                "vad_threshold {} out of range 0.0..1.0",
                self.voice.vad_threshold
            )));
        }
        Ok(())
    }

    /// Detector settings derived from voice and session config
    #[must_use]
    pub fn vad_config(&self) -> VadConfig {
        VadConfig {
            energy_threshold: self.voice.vad_threshold,
            min_speech: self.voice.vad_min_speech,
            silence: self.voice.vad_silence,
            max_utterance: self.session.max_utterance,
        }
    }
}
