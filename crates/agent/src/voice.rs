//! Speech collaborators for the voice gateway. Signal processing happens in
//! an external service; this side only moves raw audio over HTTP.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use freddie_core::config::VoiceConfig;

const SAMPLE_RATE_HEADER: &str = "x-sample-rate";
const CHANNELS_HEADER: &str = "x-channels";
const SPEECH_TIMEOUT_SECS: u64 = 30;

/// Raw PCM audio plus the metadata needed to interpret it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AudioBuffer {
    pub bytes: Vec<u8>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioBuffer {
    pub fn new(bytes: Vec<u8>, sample_rate: u32, channels: u16) -> Result<Self, SpeechError> {
        if bytes.is_empty() {
            return Err(SpeechError::InvalidAudio("audio body is empty".to_string()));
        }
        if sample_rate == 0 || channels == 0 {
            return Err(SpeechError::InvalidAudio(
                "sample_rate and channels must be positive".to_string(),
            ));
        }
        Ok(Self { bytes, sample_rate, channels })
    }
}

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("voice support is disabled")]
    Disabled,
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("speech service rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("no speech was recognized")]
    EmptyTranscript,
    #[error("invalid audio: {0}")]
    InvalidAudio(String),
    #[error("speech client misconfigured: {0}")]
    Configuration(String),
}

impl SpeechError {
    /// Failures on the caller's side of the contract.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::EmptyTranscript | Self::InvalidAudio(_))
    }
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &AudioBuffer) -> Result<String, SpeechError>;
}

#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<AudioBuffer, SpeechError>;
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[derive(Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    voice: &'a str,
    sample_rate: u32,
}

/// Transcription takes the raw audio body with rate and channel headers and
/// answers `{"text": ...}`. Synthesis takes `{text, voice, sample_rate}` and
/// answers raw mono audio.
pub struct HttpSpeechClient {
    client: Client,
    transcription_url: String,
    synthesis_url: String,
    api_key: Option<SecretString>,
    voice: String,
    output_sample_rate: u32,
}

impl HttpSpeechClient {
    pub fn new(config: &VoiceConfig) -> Result<Self, SpeechError> {
        let transcription_url = config.transcription_url.clone().ok_or_else(|| {
            SpeechError::Configuration("voice.transcription_url is not set".to_string())
        })?;
        let synthesis_url = config.synthesis_url.clone().ok_or_else(|| {
            SpeechError::Configuration("voice.synthesis_url is not set".to_string())
        })?;
        let client = Client::builder().timeout(Duration::from_secs(SPEECH_TIMEOUT_SECS)).build()?;

        Ok(Self {
            client,
            transcription_url,
            synthesis_url,
            api_key: config.api_key.clone(),
            voice: config.voice.clone(),
            output_sample_rate: config.output_sample_rate,
        })
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(api_key) => request.bearer_auth(api_key.expose_secret()),
            None => request,
        }
    }
}

async fn rejected(response: reqwest::Response) -> SpeechError {
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    SpeechError::Rejected { status, message }
}

#[async_trait]
impl Transcriber for HttpSpeechClient {
    async fn transcribe(&self, audio: &AudioBuffer) -> Result<String, SpeechError> {
        let request = self
            .client
            .post(&self.transcription_url)
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .header(SAMPLE_RATE_HEADER, audio.sample_rate.to_string())
            .header(CHANNELS_HEADER, audio.channels.to_string())
            .body(audio.bytes.clone());
        let response = self.authorize(request).send().await?;
        if !response.status().is_success() {
            return Err(rejected(response).await);
        }

        let body: TranscriptionResponse = response.json().await?;
        let text = body.text.trim().to_string();
        if text.is_empty() {
            return Err(SpeechError::EmptyTranscript);
        }
        Ok(text)
    }
}

#[async_trait]
impl Synthesizer for HttpSpeechClient {
    async fn synthesize(&self, text: &str) -> Result<AudioBuffer, SpeechError> {
        let payload =
            SynthesisRequest { text, voice: &self.voice, sample_rate: self.output_sample_rate };
        let request = self.client.post(&self.synthesis_url).json(&payload);
        let response = self.authorize(request).send().await?;
        if !response.status().is_success() {
            return Err(rejected(response).await);
        }

        let sample_rate = response
            .headers()
            .get(SAMPLE_RATE_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok())
            .unwrap_or(self.output_sample_rate);
        let bytes = response.bytes().await?.to_vec();
        Ok(AudioBuffer { bytes, sample_rate, channels: 1 })
    }
}

/// Both halves of the voice pipeline.
#[derive(Clone)]
pub struct SpeechPipeline {
    pub transcriber: Arc<dyn Transcriber>,
    pub synthesizer: Arc<dyn Synthesizer>,
}

/// `None` when voice is disabled.
pub fn build_speech(config: &VoiceConfig) -> Result<Option<SpeechPipeline>, SpeechError> {
    if !config.enabled {
        return Ok(None);
    }
    let client = Arc::new(HttpSpeechClient::new(config)?);
    Ok(Some(SpeechPipeline { transcriber: client.clone(), synthesizer: client }))
}
