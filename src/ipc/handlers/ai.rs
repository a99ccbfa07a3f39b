//! RPC handlers for `ai.*` methods — the settings surface for the model
//! endpoint. The daemon owns the configuration; clients read and write it
//! here, and `ai.setConfig` persists to config.toml so it survives restarts.

use crate::config::{save_ai_config, AiConfig, AiProvider};
use crate::AppContext;
use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};

/// `ai.testConnection` — probe the configured endpoint.
/// Returns `{ ok, latencyMs, models, error? }`.
pub async fn test_connection(_params: Value, ctx: &AppContext) -> Result<Value> {
    let config = ctx.ai.read().await.clone();
    let result = ctx.chat.test_connection(&config).await;
    Ok(serde_json::to_value(result)?)
}

/// `ai.listModels` — model inventory from the configured endpoint.
pub async fn list_models(_params: Value, ctx: &AppContext) -> Result<Value> {
    let config = ctx.ai.read().await.clone();
    let models = ctx.chat.list_models(&config).await?;
    Ok(json!({ "models": models }))
}

/// `ai.getConfig` — current settings. The API key itself is not echoed back,
/// only whether one is set.
pub async fn get_config(_params: Value, ctx: &AppContext) -> Result<Value> {
    let config = ctx.ai.read().await.clone();
    Ok(json!({
        "provider": config.provider,
        "baseUrl": config.base_url,
        "model": config.model,
        "apiKeySet": config.api_key.as_deref().is_some_and(|k| !k.is_empty()),
        "temperature": config.temperature,
        "maxTokens": config.max_tokens
    }))
}

/// Partial settings patch for `ai.setConfig`. Absent fields keep their
/// current values; `apiKey: ""` clears the stored key.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AiConfigPatch {
    provider: Option<AiProvider>,
    base_url: Option<String>,
    model: Option<String>,
    api_key: Option<String>,
    temperature: Option<f64>,
    max_tokens: Option<u32>,
}

/// `ai.setConfig` — merge the patch into the live config and persist it.
pub async fn set_config(params: Value, ctx: &AppContext) -> Result<Value> {
    let patch: AiConfigPatch = serde_json::from_value(params)?;

    let updated: AiConfig = {
        let mut guard = ctx.ai.write().await;
        if let Some(provider) = patch.provider {
            guard.provider = provider;
        }
        if let Some(base_url) = patch.base_url {
            guard.base_url = base_url;
        }
        if let Some(model) = patch.model {
            guard.model = model;
        }
        if let Some(api_key) = patch.api_key {
            guard.api_key = if api_key.is_empty() {
                None
            } else {
                Some(api_key)
            };
        }
        if let Some(temperature) = patch.temperature {
            guard.temperature = temperature;
        }
        if let Some(max_tokens) = patch.max_tokens {
            guard.max_tokens = max_tokens;
        }
        guard.clone()
    };

    save_ai_config(&ctx.config.data_dir, &updated)?;
    Ok(json!({ "saved": true }))
}
