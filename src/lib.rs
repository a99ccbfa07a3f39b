// SPDX-License-Identifier: MIT
//! glimpsed — a local daemon that captures screenshots of coding problems,
//! sends them to a vision model, and pushes extracted problems, solutions,
//! and debug analyses to a thin overlay UI over JSON-RPC.

pub mod capture;
pub mod cli;
pub mod config;
pub mod doctor;
pub mod ipc;
pub mod llm;
pub mod processing;
pub mod shortcuts;
pub mod update;
pub mod window;

// Re-export auth so main.rs can use glimpsed::auth directly.
pub use ipc::auth;

use std::sync::Arc;

use capture::ScreenshotManager;
use config::{AiConfig, GlimpseConfig};
use ipc::auth::PkcePair;
use ipc::event::EventBroadcaster;
use llm::HttpChatClient;
use processing::Processor;
use update::Updater;
use window::WindowTracker;

/// Shared application state passed to every RPC handler and background task.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<GlimpseConfig>,
    /// Live `[ai]` settings — written by `ai.setConfig` and the config-file
    /// watcher, read per model call.
    pub ai: Arc<tokio::sync::RwLock<AiConfig>>,
    pub broadcaster: Arc<EventBroadcaster>,
    pub screenshots: Arc<ScreenshotManager>,
    pub processor: Arc<Processor>,
    pub window: Arc<WindowTracker>,
    /// HTTP client behind `ai.testConnection` / `ai.listModels`.
    pub chat: Arc<HttpChatClient>,
    /// Release checker behind `daemon.checkUpdate` / `daemon.downloadUpdate`.
    pub updater: Arc<Updater>,
    /// Local WebSocket auth token.  Every new connection must send a
    /// `daemon.auth` RPC with this token before any other method call.
    /// Empty string means auth is disabled (not recommended).
    pub auth_token: String,
    /// Current PKCE verifier, regenerated by each `auth.pkceVerifier` call.
    pub pkce: Arc<tokio::sync::Mutex<Option<PkcePair>>>,
    pub started_at: std::time::Instant,
}
