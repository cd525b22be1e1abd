use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::TranscriptionConfig;
use crate::transcript::{ChunkTranscription, Word};

/// Failure classes of the external transcription service.
///
/// The worker pool branches on [`TranscribeError::is_transient`]: transient
/// failures are retried with backoff, everything else aborts the pipeline
/// invocation immediately.
#[derive(Debug, Error)]
pub enum TranscribeError {
    /// Transport-level failure: could not connect, connection dropped,
    /// request timed out.
    #[error("could not reach transcription service: {0}")]
    Connectivity(#[source] reqwest::Error),

    /// HTTP 429 from the service.
    #[error("transcription service rate limited the request")]
    RateLimited,

    /// HTTP 5xx from the service.
    #[error("transcription service error ({status}): {message}")]
    Service { status: u16, message: String },

    /// Any other non-2xx status. The request itself is wrong (bad key, bad
    /// model, payload too large), so retrying cannot help.
    #[error("transcription request rejected ({status}): {message}")]
    Api { status: u16, message: String },

    /// The request could not be assembled locally. Nothing was sent, so
    /// retrying cannot help.
    #[error("failed to build transcription request: {0}")]
    Request(String),

    /// The service answered 2xx but the body does not match the contract.
    #[error("malformed transcription response: {0}")]
    InvalidResponse(String),

    /// Local failure reading the chunk audio. An unreadable artifact is a
    /// fatal pipeline error, not a service hiccup.
    #[error("failed to read chunk audio: {0}")]
    Io(#[from] std::io::Error),
}

impl TranscribeError {
    /// Whether a retry is expected to help.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TranscribeError::Connectivity(_)
                | TranscribeError::RateLimited
                | TranscribeError::Service { .. }
        )
    }

    /// Map an HTTP status + body onto the failure taxonomy.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            429 => TranscribeError::RateLimited,
            500..=599 => TranscribeError::Service { status, message },
            _ => TranscribeError::Api { status, message },
        }
    }
}

/// Boundary to the external speech-to-text service.
///
/// One chunk in, one chunk transcription out, with word-level timestamps
/// relative to the submitted chunk's own start.
#[async_trait]
pub trait TranscriptionService: Send + Sync {
    async fn transcribe_chunk(
        &self,
        audio_path: &Path,
        language: Option<&str>,
    ) -> Result<ChunkTranscription, TranscribeError>;
}

/// OpenAI-compatible transcription API client.
///
/// Uploads chunk audio as multipart form data and requests the verbose JSON
/// response with word timestamp granularity. All representational
/// normalization happens here; the rest of the pipeline only ever sees
/// [`ChunkTranscription`].
pub struct OpenAiTranscriber {
    config: TranscriptionConfig,
    client: reqwest::Client,
}

impl OpenAiTranscriber {
    pub fn new(config: TranscriptionConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self { config, client })
    }
}

#[async_trait]
impl TranscriptionService for OpenAiTranscriber {
    async fn transcribe_chunk(
        &self,
        audio_path: &Path,
        language: Option<&str>,
    ) -> Result<ChunkTranscription, TranscribeError> {
        let api_key = self.config.api_key.as_deref().ok_or_else(|| {
            // validate() catches this before the pipeline starts; this is the backstop
            TranscribeError::Api {
                status: 401,
                message: "transcription API key not configured".to_string(),
            }
        })?;

        info!("🎤 Transcribing chunk: {}", audio_path.display());

        let audio_data = tokio::fs::read(audio_path).await?;
        let file_name = audio_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "chunk.flac".to_string());

        let mut form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio_data)
                    .file_name(file_name)
                    .mime_str("audio/flac")
                    .map_err(|e| TranscribeError::Request(e.to_string()))?,
            )
            .text("model", self.config.model.clone())
            .text("response_format", "verbose_json")
            .text("timestamp_granularities[]", "word");

        if let Some(language) = language {
            form = form.text("language", language.to_string());
        }

        let response = self
            .client
            .post(&self.config.api_endpoint)
            .header("Authorization", format!("Bearer {}", api_key))
            .multipart(form)
            .send()
            .await
            .map_err(TranscribeError::Connectivity)?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(TranscribeError::from_status(status.as_u16(), message));
        }

        let body = response
            .text()
            .await
            .map_err(TranscribeError::Connectivity)?;

        let transcription = parse_verbose_response(&body)?;
        debug!(
            "✅ Chunk transcribed: {} words, {} characters",
            transcription.words.len(),
            transcription.text.len()
        );

        Ok(transcription)
    }
}

#[derive(Debug, Deserialize)]
struct VerboseResponse {
    text: String,
    #[serde(default)]
    words: Vec<VerboseWord>,
}

#[derive(Debug, Deserialize)]
struct VerboseWord {
    word: String,
    start: f64,
    end: f64,
}

/// Parse the service's verbose JSON body into the pipeline's one result type.
fn parse_verbose_response(body: &str) -> Result<ChunkTranscription, TranscribeError> {
    let response: VerboseResponse = serde_json::from_str(body)
        .map_err(|e| TranscribeError::InvalidResponse(e.to_string()))?;

    Ok(ChunkTranscription {
        text: response.text,
        words: response
            .words
            .into_iter()
            .map(|w| Word {
                word: w.word,
                start: w.start,
                end: w.end,
            })
            .collect(),
    })
}
