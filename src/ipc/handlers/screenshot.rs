//! RPC handlers for `screenshot.*` methods.
//!
//! `screenshot.take`    — capture into the active queue
//! `screenshot.delete`  — remove one capture (queue entry first, then file)
//! `screenshot.preview` — base64 data-URL of a queued capture

use crate::AppContext;
use anyhow::Result;
use serde_json::{json, Value};
use std::path::PathBuf;

fn path_param(params: &Value) -> Result<PathBuf> {
    params
        .get("path")
        .and_then(Value::as_str)
        .map(PathBuf::from)
        .ok_or_else(|| anyhow::anyhow!("missing field: path"))
}

/// `screenshot.take` — hide the overlay, grab the screen, enqueue.
/// Returns `{ path, queued }`; the capture is also broadcast as
/// `screenshot.taken`.
pub async fn take(_params: Value, ctx: &AppContext) -> Result<Value> {
    let path = ctx.screenshots.take_screenshot().await?;
    Ok(json!({
        "path": path,
        "queued": ctx.screenshots.current().await.len()
    }))
}

/// `screenshot.delete` — params `{ path }`.
///
/// `success:false` means the path was not in the active queue (including a
/// repeat delete); only a real unlink failure is an error.
pub async fn delete(params: Value, ctx: &AppContext) -> Result<Value> {
    let path = path_param(&params)?;
    match ctx.screenshots.delete(&path).await {
        Ok(success) => Ok(json!({ "success": success })),
        Err(e) => Ok(json!({ "success": false, "error": e.to_string() })),
    }
}

/// `screenshot.preview` — params `{ path }`, returns `{ preview }` with a
/// `data:image/png;base64,` URL.
pub async fn preview(params: Value, ctx: &AppContext) -> Result<Value> {
    let path = path_param(&params)?;
    let preview = ctx.screenshots.preview(&path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            anyhow::anyhow!("SCREENSHOT_NOT_FOUND: {}", path.display())
        } else {
            anyhow::anyhow!(e)
        }
    })?;
    Ok(json!({ "preview": preview }))
}
