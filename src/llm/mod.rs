// SPDX-License-Identifier: MIT
//! Chat-completion transport: wire shapes for Ollama and OpenAI-compatible
//! endpoints, plus the retry schedule with enforced per-attempt deadlines.

pub mod client;

pub use client::{ConnectionTest, HttpChatClient};

use crate::config::{AiConfig, RetryConfig};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("AI_UNAVAILABLE: request failed: {0}")]
    Http(String),
    #[error("AI_UNAVAILABLE: endpoint returned {status}: {body}")]
    BadStatus { status: u16, body: String },
    #[error("AI_UNAVAILABLE: attempt timed out after {0}s")]
    Timeout(u64),
    #[error("AI_UNAVAILABLE: malformed response: {0}")]
    MalformedResponse(String),
    /// The operation was superseded or reset. Never retried.
    #[error("request cancelled")]
    Cancelled,
}

impl LlmError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, LlmError::Cancelled)
    }
}

/// One user turn: instruction text plus raw base64 PNG payloads.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub text: String,
    /// Base64-encoded PNG bytes, without the data-URL prefix. The transport
    /// wraps them in whatever shape the provider expects.
    pub images: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub system: String,
    pub messages: Vec<ChatMessage>,
}

/// Seam between the processing pipeline and the HTTP client, so the pipeline
/// can be driven by a scripted fake in tests.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send one chat-completion request and return the assistant's text.
    ///
    /// `deadline` is the enforced request timeout for this attempt; retrying
    /// is the caller's job ([`complete_with_retry`]).
    async fn complete(
        &self,
        config: &AiConfig,
        request: &ChatRequest,
        deadline: Duration,
    ) -> Result<String, LlmError>;
}

/// Run `transport.complete` under the retry schedule.
///
/// Up to `retry.max_retries` retries after the initial attempt, on any error
/// except cancellation. The per-attempt deadline starts at
/// `initial_timeout_secs` and doubles per failed attempt, capped at
/// `max_timeout_secs`; it is enforced here as a hard `tokio` timeout in
/// addition to whatever the transport applies. Between attempts a short
/// backoff sleeps, starting at `backoff_ms` and doubling.
pub async fn complete_with_retry(
    transport: &dyn ChatTransport,
    config: &AiConfig,
    retry: &RetryConfig,
    request: &ChatRequest,
) -> Result<String, LlmError> {
    let max_deadline = Duration::from_secs(retry.max_timeout_secs);
    let mut deadline = Duration::from_secs(retry.initial_timeout_secs).min(max_deadline);
    let mut backoff = Duration::from_millis(retry.backoff_ms);
    let mut last_err: Option<LlmError> = None;

    for attempt in 1..=retry.max_retries + 1 {
        if attempt > 1 {
            tokio::time::sleep(backoff).await;
            backoff *= 2;
        }

        let result = match tokio::time::timeout(deadline, transport.complete(config, request, deadline)).await
        {
            Ok(r) => r,
            Err(_elapsed) => Err(LlmError::Timeout(deadline.as_secs())),
        };

        match result {
            Ok(text) => {
                if attempt > 1 {
                    debug!(attempt, "model call succeeded after retry");
                }
                return Ok(text);
            }
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                warn!(
                    attempt,
                    max = retry.max_retries + 1,
                    deadline_secs = deadline.as_secs(),
                    err = %e,
                    "model call failed"
                );
                deadline = (deadline * 2).min(max_deadline);
                last_err = Some(e);
            }
        }
    }

    // The loop always records an error before falling through.
    Err(last_err.unwrap_or_else(|| LlmError::Http("no attempts made".to_string())))
}
