//! RPC handlers for `process.*` methods.

use crate::AppContext;
use anyhow::Result;
use serde_json::{json, Value};

/// `process.run` — start the pipeline for the active view.
///
/// Returns immediately; progress arrives as `processing.*` notifications.
/// `started:false` means the active queue was empty
/// (`processing.noScreenshots` was broadcast).
pub async fn run(_params: Value, ctx: &AppContext) -> Result<Value> {
    let started = ctx.processor.process().await;
    Ok(json!({ "started": started }))
}

/// `process.cancel` — abort the in-flight operation. Safe when idle.
pub async fn cancel(_params: Value, ctx: &AppContext) -> Result<Value> {
    ctx.processor.cancel_all().await;
    Ok(json!({ "cancelled": true }))
}
