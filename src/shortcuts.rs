// SPDX-License-Identifier: MIT
//! Declarative keymap for the UI shell.
//!
//! The daemon cannot register OS-global shortcuts itself; instead it publishes
//! this table over `shortcuts.list` and the shell registers each accelerator,
//! invoking the named RPC method on press. Every bound action is therefore
//! exactly one RPC call.

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Binding {
    /// Electron-style accelerator string, e.g. "CommandOrControl+H".
    pub accelerator: &'static str,
    /// Human-readable action label for the shell's settings panel.
    pub action: &'static str,
    /// JSON-RPC method the shell should invoke.
    pub method: &'static str,
    /// Fixed params for the call, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// The full keymap, in display order.
pub fn bindings() -> Vec<Binding> {
    vec![
        Binding {
            accelerator: "CommandOrControl+H",
            action: "Take screenshot",
            method: "screenshot.take",
            params: None,
        },
        Binding {
            accelerator: "CommandOrControl+Enter",
            action: "Process screenshots",
            method: "process.run",
            params: None,
        },
        Binding {
            accelerator: "CommandOrControl+R",
            action: "Reset",
            method: "app.reset",
            params: None,
        },
        Binding {
            accelerator: "CommandOrControl+Left",
            action: "Move window left",
            method: "window.move",
            params: Some(serde_json::json!({ "direction": "left" })),
        },
        Binding {
            accelerator: "CommandOrControl+Right",
            action: "Move window right",
            method: "window.move",
            params: Some(serde_json::json!({ "direction": "right" })),
        },
        Binding {
            accelerator: "CommandOrControl+Up",
            action: "Move window up",
            method: "window.move",
            params: Some(serde_json::json!({ "direction": "up" })),
        },
        Binding {
            accelerator: "CommandOrControl+Down",
            action: "Move window down",
            method: "window.move",
            params: Some(serde_json::json!({ "direction": "down" })),
        },
        Binding {
            accelerator: "CommandOrControl+B",
            action: "Toggle window visibility",
            method: "window.toggle",
            params: None,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_binding_has_a_unique_accelerator() {
        let b = bindings();
        let mut accels: Vec<_> = b.iter().map(|x| x.accelerator).collect();
        accels.sort();
        accels.dedup();
        assert_eq!(accels.len(), b.len());
    }

    #[test]
    fn move_bindings_carry_direction_params() {
        for b in bindings().iter().filter(|b| b.method == "window.move") {
            let dir = b.params.as_ref().and_then(|p| p.get("direction"));
            assert!(dir.is_some(), "{} missing direction", b.accelerator);
        }
    }
}
