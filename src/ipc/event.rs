use serde_json::Value;
use tokio::sync::broadcast;

/// Broadcasts JSON-RPC notification strings to all connected WebSocket clients.
///
/// Everything the daemon pushes to the UI shell flows through here: window
/// state changes, screenshot captures, pipeline stage events, update events.
#[derive(Clone)]
pub struct EventBroadcaster {
    tx: broadcast::Sender<String>,
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBroadcaster {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self { tx }
    }

    /// Send a JSON-RPC notification to all connected clients.
    pub fn broadcast(&self, method: &str, params: Value) {
        let notification = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params
        });
        // Ignore errors — no subscribers is fine
        let _ = self
            .tx
            .send(serde_json::to_string(&notification).unwrap_or_default());
    }

    /// Subscribe to all broadcast events.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_reaches_all_subscribers() {
        let b = EventBroadcaster::new();
        let mut rx1 = b.subscribe();
        let mut rx2 = b.subscribe();

        b.broadcast("window.stateChanged", serde_json::json!({ "visible": false }));

        for rx in [&mut rx1, &mut rx2] {
            let raw = rx.recv().await.unwrap();
            let v: Value = serde_json::from_str(&raw).unwrap();
            assert_eq!(v["jsonrpc"], "2.0");
            assert_eq!(v["method"], "window.stateChanged");
            assert_eq!(v["params"]["visible"], false);
        }
    }

    #[test]
    fn broadcast_without_subscribers_is_a_noop() {
        let b = EventBroadcaster::new();
        b.broadcast("screenshot.taken", serde_json::json!({}));
    }
}
