//! RPC handlers for `window.*` methods. Every mutation also goes out as a
//! `window.stateChanged` notification, so the response body is a courtesy
//! for the caller.

use crate::window::Direction;
use crate::AppContext;
use anyhow::Result;
use serde_json::{json, Value};

/// `window.toggle` — flip overlay visibility.
pub async fn toggle(_params: Value, ctx: &AppContext) -> Result<Value> {
    let state = ctx.window.toggle().await;
    Ok(serde_json::to_value(state)?)
}

/// `window.move` — params `{ direction: "left"|"right"|"up"|"down" }`.
pub async fn r#move(params: Value, ctx: &AppContext) -> Result<Value> {
    let direction: Direction = params
        .get("direction")
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("missing field: direction"))
        .and_then(|v| serde_json::from_value(v).map_err(Into::into))?;
    let state = ctx.window.nudge(direction).await;
    Ok(serde_json::to_value(state)?)
}

/// `window.setDimensions` — params `{ width, height }`, the shell's measured
/// content size.
pub async fn set_dimensions(params: Value, ctx: &AppContext) -> Result<Value> {
    let width = params
        .get("width")
        .and_then(Value::as_u64)
        .ok_or_else(|| anyhow::anyhow!("missing field: width"))?;
    let height = params
        .get("height")
        .and_then(Value::as_u64)
        .ok_or_else(|| anyhow::anyhow!("missing field: height"))?;
    let state = ctx.window.set_dimensions(width as u32, height as u32).await;
    Ok(serde_json::to_value(state)?)
}

/// `window.state` — current state, for shells resyncing after reconnect.
pub async fn state(_params: Value, ctx: &AppContext) -> Result<Value> {
    Ok(serde_json::to_value(ctx.window.state().await)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_param_parses_lowercase() {
        let d: Direction = serde_json::from_value(json!("left")).unwrap();
        assert!(matches!(d, Direction::Left));
        assert!(serde_json::from_value::<Direction>(json!("sideways")).is_err());
    }
}
