//! LLM provider capability boundary.
//!
//! Concrete providers live outside the core; the pipeline only ever talks
//! to the [`LlmClient`] trait. Absence of the capability degrades
//! gracefully — the verification phase is skipped with an advisory.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::core::errors::{Result, WardenError};

/// One completion request, already sanitized by the verification helper.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// User prompt with sanitized interpolations
    pub prompt: String,

    /// Static system prompt
    pub system: String,

    /// Optional provider-specific model override
    pub model: Option<String>,
}

impl CompletionRequest {
    /// Build a request with the default model.
    pub fn new(prompt: impl Into<String>, system: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: system.into(),
            model: None,
        }
    }
}

/// One chunk of a streamed completion.
#[derive(Debug, Clone, PartialEq)]
pub enum LlmChunk {
    /// A fragment of response text
    Text(String),

    /// A chunk the provider adapter could not decode; skipped, never fatal
    Malformed(String),

    /// The provider's terminal marker
    Done,
}

/// Capability trait for language-model providers.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Request a full completion.
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;

    /// True when the provider supports SSE-style streaming.
    fn supports_streaming(&self) -> bool {
        false
    }

    /// Request a streamed completion. Stream items are chunks; an `Err`
    /// item means the stream failed mid-response and the caller should
    /// fall back to a non-streaming call.
    async fn stream(
        &self,
        _request: &CompletionRequest,
    ) -> Result<BoxStream<'static, Result<LlmChunk>>> {
        Err(WardenError::capability_unavailable(
            "llm_stream",
            "provider does not support streaming",
        ))
    }
}

/// Accumulate a chunk stream into response text.
///
/// Malformed chunks are skipped; accumulation stops at the terminal
/// marker. A stream-level `Err` aborts accumulation and surfaces to the
/// caller so it can retry without streaming.
pub async fn collect_stream(
    mut stream: BoxStream<'static, Result<LlmChunk>>,
) -> Result<String> {
    use futures::StreamExt;

    let mut text = String::new();
    while let Some(item) = stream.next().await {
        match item? {
            LlmChunk::Text(fragment) => text.push_str(&fragment),
            LlmChunk::Malformed(reason) => {
                tracing::debug!("skipping malformed stream chunk: {reason}");
            }
            LlmChunk::Done => break,
        }
    }
    Ok(text)
}
