//! RPC handlers for `queue.*` methods.

use crate::AppContext;
use anyhow::Result;
use serde_json::{json, Value};

/// `queue.list` — main-queue paths, oldest first.
pub async fn list(_params: Value, ctx: &AppContext) -> Result<Value> {
    Ok(json!({ "paths": ctx.screenshots.list_main().await }))
}

/// `queue.listExtra` — debug-queue paths, oldest first.
pub async fn list_extra(_params: Value, ctx: &AppContext) -> Result<Value> {
    Ok(json!({ "paths": ctx.screenshots.list_extra().await }))
}

/// `queue.current` — the queue behind the active view.
pub async fn current(_params: Value, ctx: &AppContext) -> Result<Value> {
    Ok(json!({
        "view": ctx.window.view().await,
        "paths": ctx.screenshots.current().await
    }))
}

/// `queue.reset` — unlink everything in both queues. Removal failures are
/// reported, not fatal.
pub async fn reset(_params: Value, ctx: &AppContext) -> Result<Value> {
    let report = ctx.screenshots.clear_all().await;
    Ok(json!({
        "removed": report.removed.len(),
        "failures": report
            .failures
            .iter()
            .map(|f| json!({ "path": f.path, "error": f.error }))
            .collect::<Vec<_>>()
    }))
}
