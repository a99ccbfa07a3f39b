//! RPC handlers for `system.*` methods — opening URLs in the user's browser.

use crate::AppContext;
use anyhow::Result;
use serde_json::{json, Value};
use tracing::info;

/// Web settings page for account management.
const SETTINGS_PORTAL_URL: &str = "https://glimpsed.app/settings";

/// `system.openExternal` — params `{ url }`. Only http(s) URLs are accepted;
/// anything else (file:, javascript:, custom schemes) is rejected.
pub async fn open_external(params: Value, ctx: &AppContext) -> Result<Value> {
    let url = params
        .get("url")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("missing field: url"))?;
    open_url(url, ctx).await?;
    Ok(json!({ "opened": true }))
}

/// `system.openSettingsPortal` — open the account settings page.
pub async fn open_settings_portal(_params: Value, ctx: &AppContext) -> Result<Value> {
    open_url(SETTINGS_PORTAL_URL, ctx).await?;
    Ok(json!({ "opened": true }))
}

async fn open_url(url: &str, _ctx: &AppContext) -> Result<()> {
    if !(url.starts_with("https://") || url.starts_with("http://")) {
        anyhow::bail!("invalid params: only http(s) URLs can be opened");
    }
    info!(url = %url, "opening external URL");

    let mut cmd = opener_command(url);
    let status = cmd.status().await?;
    if !status.success() {
        anyhow::bail!("browser opener exited with {status}");
    }
    Ok(())
}

#[cfg(target_os = "macos")]
fn opener_command(url: &str) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new("open");
    cmd.arg(url);
    cmd
}

#[cfg(target_os = "windows")]
fn opener_command(url: &str) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new("cmd");
    // "start" needs an empty title argument when the URL is quoted.
    cmd.args(["/C", "start", "", url]);
    cmd
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn opener_command(url: &str) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new("xdg-open");
    cmd.arg(url);
    cmd
}
