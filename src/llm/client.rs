// SPDX-License-Identifier: MIT
// HttpChatClient — reqwest transport speaking the Ollama-native and
// OpenAI-compatible chat wire shapes, plus the endpoint probes behind
// ai.testConnection and ai.listModels.

use crate::config::{AiConfig, AiProvider};
use crate::llm::{ChatRequest, ChatTransport, LlmError};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tracing::debug;

pub struct HttpChatClient {
    client: reqwest::Client,
}

impl Default for HttpChatClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpChatClient {
    pub fn new() -> Self {
        Self {
            // Per-request timeouts come from the retry schedule; no global one.
            client: reqwest::Client::new(),
        }
    }

    fn chat_url(config: &AiConfig) -> String {
        let base = config.base_url.trim_end_matches('/');
        match config.provider {
            AiProvider::Ollama => format!("{base}/api/chat"),
            AiProvider::Openai => format!("{base}/v1/chat/completions"),
            // Custom endpoints are assumed to point at the completions route.
            AiProvider::Custom => config.base_url.clone(),
        }
    }

    fn apply_auth(config: &AiConfig, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &config.api_key {
            Some(key) if !key.is_empty() => req.bearer_auth(key),
            _ => req,
        }
    }

    async fn post_chat(
        &self,
        config: &AiConfig,
        body: &Value,
        deadline: Duration,
    ) -> Result<Value, LlmError> {
        let url = Self::chat_url(config);
        debug!(url = %url, provider = ?config.provider, "sending chat completion request");

        let req = self.client.post(&url).timeout(deadline).json(body);
        let response = Self::apply_auth(config, req)
            .send()
            .await
            .map_err(classify_reqwest_error(deadline))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::BadStatus {
                status: status.as_u16(),
                body: truncate(&body, 512),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| LlmError::MalformedResponse(e.to_string()))
    }
}

#[async_trait]
impl ChatTransport for HttpChatClient {
    async fn complete(
        &self,
        config: &AiConfig,
        request: &ChatRequest,
        deadline: Duration,
    ) -> Result<String, LlmError> {
        let body = match config.provider {
            AiProvider::Ollama => ollama_body(config, request),
            AiProvider::Openai | AiProvider::Custom => openai_body(config, request),
        };

        let reply = self.post_chat(config, &body, deadline).await?;

        let content = match config.provider {
            // {"message": {"content": "..."}}
            AiProvider::Ollama => reply.pointer("/message/content"),
            // {"choices": [{"message": {"content": "..."}}]}
            AiProvider::Openai | AiProvider::Custom => {
                reply.pointer("/choices/0/message/content")
            }
        };

        content
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                LlmError::MalformedResponse("no assistant content in response".to_string())
            })
    }
}

// ─── Request bodies ──────────────────────────────────────────────────────────

#[derive(Serialize)]
struct OllamaMessage<'a> {
    role: &'static str,
    content: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<&'a str>,
}

/// Ollama-native: images ride as a bare base64 array on the message.
fn ollama_body(config: &AiConfig, request: &ChatRequest) -> Value {
    let mut messages = vec![OllamaMessage {
        role: "system",
        content: &request.system,
        images: vec![],
    }];
    for m in &request.messages {
        messages.push(OllamaMessage {
            role: "user",
            content: &m.text,
            images: m.images.iter().map(String::as_str).collect(),
        });
    }
    json!({
        "model": config.model,
        "messages": messages,
        "stream": false,
        "options": {
            "temperature": config.temperature,
            "num_predict": config.max_tokens,
        },
    })
}

/// OpenAI-compatible: multimodal content parts with image_url data URLs.
fn openai_body(config: &AiConfig, request: &ChatRequest) -> Value {
    let mut messages = vec![json!({ "role": "system", "content": request.system })];
    for m in &request.messages {
        let mut parts = vec![json!({ "type": "text", "text": m.text })];
        for image in &m.images {
            parts.push(json!({
                "type": "image_url",
                "image_url": { "url": format!("data:image/png;base64,{image}") },
            }));
        }
        messages.push(json!({ "role": "user", "content": parts }));
    }
    json!({
        "model": config.model,
        "messages": messages,
        "temperature": config.temperature,
        "max_tokens": config.max_tokens,
        "stream": false,
    })
}

// ─── Endpoint probes ─────────────────────────────────────────────────────────

/// Result of an `ai.testConnection` probe.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionTest {
    pub ok: bool,
    pub latency_ms: u64,
    /// Models the endpoint advertises, when it exposes an inventory route.
    pub models: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HttpChatClient {
    /// Lightweight reachability probe: Ollama `/api/tags`, OpenAI-style
    /// `/v1/models`, custom → GET of the configured URL.
    pub async fn test_connection(&self, config: &AiConfig) -> ConnectionTest {
        let started = Instant::now();
        match self.fetch_models(config).await {
            Ok(models) => ConnectionTest {
                ok: true,
                latency_ms: started.elapsed().as_millis() as u64,
                models,
                error: None,
            },
            Err(e) => ConnectionTest {
                ok: false,
                latency_ms: started.elapsed().as_millis() as u64,
                models: vec![],
                error: Some(e.to_string()),
            },
        }
    }

    /// Model inventory from the configured endpoint.
    pub async fn list_models(&self, config: &AiConfig) -> Result<Vec<String>, LlmError> {
        self.fetch_models(config).await
    }

    async fn fetch_models(&self, config: &AiConfig) -> Result<Vec<String>, LlmError> {
        let deadline = Duration::from_secs(10);
        let base = config.base_url.trim_end_matches('/');
        let url = match config.provider {
            AiProvider::Ollama => format!("{base}/api/tags"),
            AiProvider::Openai => format!("{base}/v1/models"),
            AiProvider::Custom => config.base_url.clone(),
        };

        let req = self.client.get(&url).timeout(deadline);
        let response = Self::apply_auth(config, req)
            .send()
            .await
            .map_err(classify_reqwest_error(deadline))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::BadStatus {
                status: status.as_u16(),
                body: truncate(&body, 512),
            });
        }

        // Custom endpoints only prove reachability; there is no inventory
        // route to parse.
        if matches!(config.provider, AiProvider::Custom) {
            return Ok(vec![]);
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| LlmError::MalformedResponse(e.to_string()))?;

        let models = match config.provider {
            // {"models": [{"name": "..."}]}
            AiProvider::Ollama => body
                .get("models")
                .and_then(Value::as_array)
                .map(|arr| {
                    arr.iter()
                        .filter_map(|m| m.get("name").and_then(Value::as_str))
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            // {"data": [{"id": "..."}]}
            _ => body
                .get("data")
                .and_then(Value::as_array)
                .map(|arr| {
                    arr.iter()
                        .filter_map(|m| m.get("id").and_then(Value::as_str))
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        };
        Ok(models)
    }
}

fn classify_reqwest_error(deadline: Duration) -> impl Fn(reqwest::Error) -> LlmError {
    move |e| {
        if e.is_timeout() {
            LlmError::Timeout(deadline.as_secs())
        } else {
            LlmError::Http(e.to_string())
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &s[..end])
    }
}
