//! Minimal WebSocket JSON-RPC client backing the one-shot CLI subcommands.
//!
//! `glimpsed status` and friends open a socket, authenticate, issue a single
//! call, and hang up. Event notifications pushed on the same socket are
//! skipped by request id.

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context as _, Result};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

const RPC_TIMEOUT: Duration = Duration::from_secs(5);

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct DaemonClient {
    port: u16,
    token: String,
}

impl DaemonClient {
    pub fn new(port: u16, token: String) -> Self {
        Self { port, token }
    }

    /// Connect, authenticate, issue one call, and return its result.
    pub async fn call_once(&self, method: &str, params: Value) -> Result<Value> {
        let mut conn = Connection::open(self.port).await?;
        conn.request("daemon.auth", json!({ "token": self.token }))
            .await
            .context("daemon rejected the auth token")?;
        conn.request(method, params).await
    }
}

/// An open socket with a running request id.
struct Connection {
    socket: Socket,
    next_id: u64,
}

impl Connection {
    async fn open(port: u16) -> Result<Self> {
        let url = format!("ws://127.0.0.1:{port}");
        let (socket, _) = tokio::time::timeout(RPC_TIMEOUT, connect_async(&url))
            .await
            .context("timed out connecting to daemon")?
            .context("failed to connect to daemon WebSocket")?;
        Ok(Self { socket, next_id: 1 })
    }

    /// Send one request frame and wait for the matching response.
    async fn request(&mut self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id;
        self.next_id += 1;

        let frame = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        self.socket
            .send(Message::Text(frame.to_string()))
            .await
            .context("failed to send request")?;

        loop {
            let msg = tokio::time::timeout(RPC_TIMEOUT, self.socket.next())
                .await
                .context("timed out waiting for daemon response")?
                .context("daemon closed the connection")?
                .context("WebSocket error")?;

            let Message::Text(text) = msg else { continue };
            let reply: Value = serde_json::from_str(&text)?;
            if reply.get("id").and_then(Value::as_u64) != Some(id) {
                // Broadcast notification interleaved with the response.
                continue;
            }
            if let Some(err) = reply.get("error") {
                bail!("daemon RPC error: {err}");
            }
            return Ok(reply["result"].clone());
        }
    }
}

/// Read the auth token from the daemon's data directory.
///
/// Fails when the file does not exist (daemon never started).
pub fn read_auth_token(data_dir: &Path) -> Result<String> {
    let path = data_dir.join("auth_token");
    let token = std::fs::read_to_string(&path).with_context(|| {
        format!(
            "could not read auth token at {} — start the daemon once to create it",
            path.display()
        )
    })?;
    Ok(token.trim().to_owned())
}
