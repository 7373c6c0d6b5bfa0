//! Text-to-speech (TTS) processing

use async_trait::async_trait;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};

use super::stt::DEFAULT_BASE_URL;
use crate::pipeline::{AudioChunk, OUTPUT_SAMPLE_RATE, SynthesisStream, TextToSpeech};
use crate::{Error, Result};

/// Synthesizes speech with an OpenAI-compatible speech endpoint
///
/// Requests raw PCM (24kHz, 16-bit little-endian mono) so audio can be
/// streamed to the room as it arrives.
pub struct OpenAiTts {
    client: reqwest::Client,
    api_key: SecretString,
    voice: String,
    speed: f32,
    model: String,
    base_url: String,
}

impl OpenAiTts {
    /// Create a new TTS instance using `OpenAI`
    ///
    /// # Errors
    ///
    /// Returns error if API key is missing
    pub fn new(api_key: SecretString, model: String, voice: String, speed: f32) -> Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config("OpenAI API key required for TTS".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            voice,
            speed,
            model,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Point at a different OpenAI-compatible server
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl TextToSpeech for OpenAiTts {
    async fn synthesize(&self, text: &str) -> Result<SynthesisStream> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f32,
            response_format: &'a str,
        }

        let request = TtsRequest {
            model: &self.model,
            input: text,
            voice: &self.voice,
            speed: self.speed,
            response_format: "pcm",
        };

        tracing::debug!(chars = text.len(), voice = %self.voice, "starting synthesis");

        let response = self
            .client
            .post(format!("{}/audio/speech", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Synthesis(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Synthesis(format!("OpenAI TTS error {status}: {body}")));
        }

        let mut decoder = PcmDecoder::default();
        let stream = response.bytes_stream().map(move |bytes| {
            let bytes = bytes.map_err(|e| Error::Synthesis(e.to_string()))?;
            Ok(AudioChunk {
                samples: decoder.push(&bytes),
                sample_rate: OUTPUT_SAMPLE_RATE,
            })
        });

        Ok(stream.boxed())
    }
}

/// Reassembles little-endian i16 samples split across network chunks
#[derive(Debug, Default)]
struct PcmDecoder {
    carry: Option<u8>,
}

impl PcmDecoder {
    fn push(&mut self, bytes: &[u8]) -> Vec<i16> {
        let mut samples = Vec::with_capacity(bytes.len() / 2 + 1);
        let mut rest = bytes;

        if let Some(low) = self.carry.take() {
            match rest.split_first() {
                Some((&high, tail)) => {
                    samples.push(i16::from_le_bytes([low, high]));
                    rest = tail;
                }
                None => {
                    self.carry = Some(low);
                    return samples;
                }
            }
        }

        let mut pairs = rest.chunks_exact(2);
        samples.extend(pairs.by_ref().map(|p| i16::from_le_bytes([p[0], p[1]])));
        self.carry = pairs.remainder().first().copied();
        samples
    }
}

/// Speech output for text-only rooms
///
/// Produces no audio; the room renders the utterance text itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextOnlySpeech;

#[async_trait]
impl TextToSpeech for TextOnlySpeech {
    async fn synthesize(&self, _text: &str) -> Result<SynthesisStream> {
        Ok(futures::stream::empty().boxed())
    }
}
