use crate::AppContext;
use anyhow::Result;
use serde_json::{json, Value};

pub async fn ping(_params: Value, _ctx: &AppContext) -> Result<Value> {
    Ok(json!({ "pong": true }))
}

pub async fn status(_params: Value, ctx: &AppContext) -> Result<Value> {
    let uptime = ctx.started_at.elapsed().as_secs();
    let window = ctx.window.state().await;
    let pending_update = ctx.updater.pending_update().await.map(|u| u.version);
    Ok(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "uptime": uptime,
        "port": ctx.config.port,
        "view": window.view,
        "visible": window.visible,
        "queued": ctx.screenshots.list_main().await.len(),
        "queuedExtra": ctx.screenshots.list_extra().await.len(),
        "processing": ctx.processor.is_busy().await,
        "pendingUpdate": pending_update
    }))
}

pub async fn check_update(_params: Value, ctx: &AppContext) -> Result<Value> {
    let check = ctx.updater.check().await?;
    Ok(json!({
        "current": check.current,
        "latest": check.latest,
        "available": check.available
    }))
}

pub async fn download_update(_params: Value, ctx: &AppContext) -> Result<Value> {
    match ctx.updater.download_latest().await? {
        Some(update) => Ok(json!({
            "downloaded": true,
            "version": update.version,
            "path": update.path
        })),
        None => Ok(json!({ "downloaded": false })),
    }
}
