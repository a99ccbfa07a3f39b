//! RPC handler for `shortcuts.list` — the declarative keymap the UI shell
//! registers with the OS. Every entry names the RPC method a press maps to.

use crate::AppContext;
use anyhow::Result;
use serde_json::{json, Value};

pub async fn list(_params: Value, _ctx: &AppContext) -> Result<Value> {
    Ok(json!({ "bindings": crate::shortcuts::bindings() }))
}
