//! Text-generation backend contract and its HTTP implementation.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, warn};

use mentor_core::config::BackendConfig;
use mentor_core::types::{ConceptCard, DeepDive, WeaknessReport};

use crate::error::ChatError;
use crate::types::{ChatRequest, ConceptRequest, TranscriptRequest};

/// Incremental reply text. Ends when the stream yields `None`.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, ChatError>> + Send>>;

/// Fallback message when a failed response carries no `error` field.
const GENERIC_FAILURE: &str = "Failed to get response";

/// Operations offered by the text-generation service.
#[async_trait]
pub trait MentorBackend: Send + Sync {
    /// Open a streamed free-form reply.
    async fn stream_chat(&self, request: ChatRequest) -> Result<TextStream, ChatError>;

    async fn explain_concept(&self, request: ConceptRequest) -> Result<ConceptCard, ChatError>;

    async fn analyze_weakness(
        &self,
        request: TranscriptRequest,
    ) -> Result<WeaknessReport, ChatError>;

    async fn deep_dive(&self, request: TranscriptRequest) -> Result<DeepDive, ChatError>;

    /// Optional summarization used for session titles. `None` means the
    /// caller should truncate instead.
    async fn summarize_title(&self, _text: &str) -> Result<Option<String>, ChatError> {
        Ok(None)
    }
}

// =============================================================================
// HTTP backend
// =============================================================================

/// JSON-over-HTTP client for the mentor endpoints.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    config: BackendConfig,
}

impl HttpBackend {
    pub fn new(config: BackendConfig) -> Result<Self, ChatError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ChatError::Transport(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, ChatError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let url = self.url(path);
        debug!(url = %url, "POST");

        let response = self
            .client
            .post(&url)
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .json(body)
            .send()
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))?;

        let success = response.status().is_success();
        let value: serde_json::Value = match response.json().await {
            Ok(value) => value,
            Err(e) if success => return Err(ChatError::MalformedPayload(e.to_string())),
            Err(_) => return Err(ChatError::Backend(GENERIC_FAILURE.to_string())),
        };
        decode_payload(success, value)
    }
}

#[async_trait]
impl MentorBackend for HttpBackend {
    async fn stream_chat(&self, request: ChatRequest) -> Result<TextStream, ChatError> {
        let url = self.url(&self.config.chat_path);
        debug!(url = %url, turns = request.turns.len(), "Opening chat stream");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let value = response
                .json::<serde_json::Value>()
                .await
                .unwrap_or(serde_json::Value::Null);
            return Err(ChatError::Backend(error_field(&value).unwrap_or_else(
                || GENERIC_FAILURE.to_string(),
            )));
        }

        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(async move {
            let mut body = response.bytes_stream();
            let mut decoder = Utf8ChunkDecoder::default();
            while let Some(chunk) = body.next().await {
                let item = chunk
                    .map(|bytes| decoder.push(&bytes))
                    .map_err(|e| ChatError::StreamInterrupted(e.to_string()));
                let failed = item.is_err();
                if tx.send(item).await.is_err() {
                    debug!("Chat stream receiver dropped");
                    return;
                }
                if failed {
                    warn!("Chat stream ended with a transport error");
                    return;
                }
            }
            let tail = decoder.finish();
            if !tail.is_empty() {
                let _ = tx.send(Ok(tail)).await;
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn explain_concept(&self, request: ConceptRequest) -> Result<ConceptCard, ChatError> {
        self.post_json(&self.config.concept_path, &request).await
    }

    async fn analyze_weakness(
        &self,
        request: TranscriptRequest,
    ) -> Result<WeaknessReport, ChatError> {
        self.post_json(&self.config.weakness_path, &request).await
    }

    async fn deep_dive(&self, request: TranscriptRequest) -> Result<DeepDive, ChatError> {
        self.post_json(&self.config.deep_dive_path, &request).await
    }
}

fn error_field(value: &serde_json::Value) -> Option<String> {
    value
        .get("error")
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

/// Turn a single-shot response body into the expected payload.
///
/// An `error` field is a failure even on a success status. A body missing
/// required fields is a malformed payload.
pub fn decode_payload<T: DeserializeOwned>(
    success: bool,
    value: serde_json::Value,
) -> Result<T, ChatError> {
    if let Some(message) = error_field(&value) {
        return Err(ChatError::Backend(message));
    }
    if !success {
        return Err(ChatError::Backend(GENERIC_FAILURE.to_string()));
    }
    serde_json::from_value(value).map_err(|e| ChatError::MalformedPayload(e.to_string()))
}

// =============================================================================
// UTF-8 chunk decoding
// =============================================================================

/// Decodes a byte stream into text without splitting code points.
///
/// An incomplete sequence at the end of a chunk is held until the next one.
/// Invalid bytes become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8ChunkDecoder {
    pending: Vec<u8>,
}

impl Utf8ChunkDecoder {
    pub fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        // Incomplete trailing sequence: wait for more bytes.
                        None => {
                            self.pending.drain(..valid);
                            break;
                        }
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                    }
                }
            }
        }

        out
    }

    /// Flush whatever is left at end of stream.
    pub fn finish(&mut self) -> String {
        let tail = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        tail
    }
}
