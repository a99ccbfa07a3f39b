//! RPC handler for `auth.pkceVerifier` — OAuth PKCE material for shells that
//! drive a browser sign-in flow.

use crate::ipc::auth::PkcePair;
use crate::AppContext;
use anyhow::Result;
use serde_json::{json, Value};

/// Generate a fresh verifier/challenge pair, remember it as current, and
/// return it. Each call regenerates.
pub async fn pkce_verifier(_params: Value, ctx: &AppContext) -> Result<Value> {
    let pair = PkcePair::generate();
    let response = json!({
        "verifier": pair.verifier,
        "challenge": pair.challenge,
        "method": "S256"
    });
    *ctx.pkce.lock().await = Some(pair);
    Ok(response)
}
