use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AgentError;

/// Speech-to-text and text-to-speech. Audio is passed through as opaque bytes.
#[async_trait]
pub trait VoiceBridge: Send + Sync {
    async fn transcribe(&self, audio: Vec<u8>) -> Result<String, AgentError>;

    /// Returns `audio/mpeg` bytes.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, AgentError>;
}

/// OpenAI-compatible `/audio/transcriptions` and `/audio/speech`.
pub struct HttpVoiceBridge {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    transcription_model: String,
    speech_model: String,
    voice: String,
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'a str,
}

impl HttpVoiceBridge {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        transcription_model: impl Into<String>,
        speech_model: impl Into<String>,
        voice: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, AgentError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            transcription_model: transcription_model.into(),
            speech_model: speech_model.into(),
            voice: voice.into(),
        })
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

#[async_trait]
impl VoiceBridge for HttpVoiceBridge {
    async fn transcribe(&self, audio: Vec<u8>) -> Result<String, AgentError> {
        if audio.is_empty() {
            return Err(AgentError::EmptyResponse("empty audio upload".to_string()));
        }
        debug!(bytes = audio.len(), model = %self.transcription_model, "Transcribing audio");

        let form = Form::new()
            .text("model", self.transcription_model.clone())
            .part("file", Part::bytes(audio).file_name("query.wav"));

        let response = self
            .authorized(
                self.client
                    .post(format!("{}/audio/transcriptions", self.base_url))
                    .multipart(form),
            )
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(AgentError::from_response("voice_stt", response).await);
        }

        let body: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Parse(format!("transcription response: {e}")))?;
        let text = body.text.trim().to_string();
        if text.is_empty() {
            return Err(AgentError::EmptyResponse("voice_stt".to_string()));
        }
        Ok(text)
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, AgentError> {
        debug!(chars = text.len(), model = %self.speech_model, "Synthesizing speech");

        let response = self
            .authorized(
                self.client
                    .post(format!("{}/audio/speech", self.base_url))
                    .json(&SpeechRequest {
                        model: &self.speech_model,
                        input: text,
                        voice: &self.voice,
                        response_format: "mp3",
                    }),
            )
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(AgentError::from_response("voice_tts", response).await);
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Err(AgentError::EmptyResponse("voice_tts".to_string()));
        }
        Ok(bytes.to_vec())
    }
}
