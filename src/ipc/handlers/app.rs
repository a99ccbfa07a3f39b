//! RPC handler for `app.reset` — return the whole daemon to its initial
//! state: cancel in-flight work, drop both queues, back to the Queue view.

use crate::window::View;
use crate::AppContext;
use anyhow::Result;
use serde_json::{json, Value};

pub async fn reset(_params: Value, ctx: &AppContext) -> Result<Value> {
    ctx.processor.reset().await;
    let report = ctx.screenshots.clear_all().await;
    ctx.window.set_view(View::Queue).await;
    ctx.broadcaster.broadcast("app.resetDone", json!({}));
    Ok(json!({
        "removed": report.removed.len(),
        "failures": report.failures.len()
    }))
}
