use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

const DEFAULT_PORT: u16 = 4512;

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

// ─── AiConfig ─────────────────────────────────────────────────────────────────

/// Which wire shape the chat endpoint speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AiProvider {
    /// Ollama-native `POST {base}/api/chat`.
    Ollama,
    /// OpenAI-compatible `POST {base}/v1/chat/completions`.
    Openai,
    /// User-supplied URL, used verbatim with the OpenAI wire shape.
    Custom,
}

/// Model endpoint configuration (`[ai]` in config.toml).
///
/// The daemon is authoritative for these settings: clients read and write
/// them over `ai.getConfig` / `ai.setConfig`, and edits to config.toml are
/// hot-reloaded without a restart.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AiConfig {
    pub provider: AiProvider,
    /// Base URL of the endpoint, e.g. "http://localhost:11434".
    /// For `provider = "custom"` this is the full chat-completions URL.
    pub base_url: String,
    /// Model identifier sent in the request body.
    pub model: String,
    /// Sent as `Authorization: Bearer <key>` when present.
    pub api_key: Option<String>,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            provider: AiProvider::Ollama,
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.2-vision".to_string(),
            api_key: None,
            temperature: 0.2,
            max_tokens: 4096,
        }
    }
}

// ─── CaptureConfig ────────────────────────────────────────────────────────────

/// Screenshot capture timing (`[capture]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Delay between hiding the overlay and invoking the capture tool, so the
    /// window is actually off-screen when the OS grabs the frame. Default: 100.
    pub settle_delay_ms: u64,
    /// Delay before re-showing the overlay after capture. Default: 50.
    pub reshow_delay_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: 100,
            reshow_delay_ms: 50,
        }
    }
}

// ─── RetryConfig ──────────────────────────────────────────────────────────────

/// Model-call retry schedule (`[retry]` in config.toml).
///
/// The per-attempt deadline starts at `initial_timeout_secs` and doubles on
/// each failed attempt, capped at `max_timeout_secs`. Between attempts a short
/// backoff sleeps, starting at `backoff_ms` and doubling.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the initial attempt (total attempts = max_retries + 1).
    pub max_retries: u32,
    pub initial_timeout_secs: u64,
    pub max_timeout_secs: u64,
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_timeout_secs: 30,
            max_timeout_secs: 120,
            backoff_ms: 500,
        }
    }
}

impl RetryConfig {
    /// A schedule suitable for quick unit tests (no real waiting).
    pub fn instant() -> Self {
        Self {
            max_retries: 3,
            initial_timeout_secs: 5,
            max_timeout_secs: 5,
            backoff_ms: 1,
        }
    }
}

// ─── WindowConfig ─────────────────────────────────────────────────────────────

/// Overlay window behavior (`[window]` in config.toml).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Pixels moved per `window.move` call. Default: 50.
    pub nudge_step: i32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self { nudge_step: 50 }
    }
}

// ─── TOML config file ─────────────────────────────────────────────────────────

/// `{data_dir}/config.toml` — all fields are optional overrides.
/// Priority: CLI / env var  >  TOML  >  built-in default.
#[derive(Deserialize, Serialize, Default)]
pub struct TomlConfig {
    /// WebSocket server port (default: 4512).
    port: Option<u16>,
    /// Log level filter string, e.g. "debug", "info,glimpsed=trace" (default: "info").
    log: Option<String>,
    /// Log output format: "pretty" (default, human-readable) | "json".
    log_format: Option<String>,
    /// Bind address for the WebSocket server (default: "127.0.0.1").
    bind_address: Option<String>,
    /// Auto-update policy: "auto" | "manual" | "never".
    update_policy: Option<String>,
    /// Model endpoint configuration (`[ai]`).
    ai: Option<AiConfig>,
    /// Capture timing (`[capture]`).
    capture: Option<CaptureConfig>,
    /// Model-call retry schedule (`[retry]`).
    retry: Option<RetryConfig>,
    /// Overlay window behavior (`[window]`).
    window: Option<WindowConfig>,
}

fn load_toml(data_dir: &Path) -> Option<TomlConfig> {
    let path = data_dir.join("config.toml");
    let contents = std::fs::read_to_string(&path).ok()?;
    match toml::from_str::<TomlConfig>(&contents) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            error!(path = %path.display(), err = %e, "failed to parse config.toml — using defaults");
            None
        }
    }
}

// ─── GlimpseConfig ────────────────────────────────────────────────────────────

/// Startup configuration. Everything here is fixed for the daemon's lifetime;
/// only the `[ai]` table has a live copy that [`ConfigWatcher`] reloads on
/// edit.
#[derive(Debug, Clone)]
pub struct GlimpseConfig {
    pub port: u16,
    pub data_dir: PathBuf,
    pub log: String,
    /// "pretty" (default) | "json".
    pub log_format: String,
    /// Bind address for the WebSocket server (GLIMPSED_BIND env var).
    pub bind_address: String,
    /// Auto-update policy: "auto" (default), "manual", or "never".
    pub update_policy: String,
    pub capture: CaptureConfig,
    pub retry: RetryConfig,
    pub window: WindowConfig,
    /// Initial `[ai]` table; the live copy is the `AppContext`'s RwLock.
    pub ai: AiConfig,
}

impl GlimpseConfig {
    /// Build config from CLI/env args + optional TOML file.
    ///
    /// Priority (highest to lowest):
    ///   1. CLI / env — passed as `Some(value)` from clap
    ///   2. TOML file at `{data_dir}/config.toml`
    ///   3. Built-in defaults
    pub fn new(
        port: Option<u16>,
        data_dir: Option<PathBuf>,
        log: Option<String>,
        bind_address: Option<String>,
    ) -> Self {
        let data_dir = data_dir.unwrap_or_else(default_data_dir);

        // Load TOML as the lowest-priority override layer
        let toml = load_toml(&data_dir).unwrap_or_default();

        let port = port.or(toml.port).unwrap_or(DEFAULT_PORT);
        let log = log.or(toml.log).unwrap_or_else(|| "info".to_string());

        let log_format = std::env::var("GLIMPSED_LOG_FORMAT")
            .ok()
            .filter(|s| !s.is_empty())
            .or(toml.log_format)
            .unwrap_or_else(|| "pretty".to_string());

        let bind_address = bind_address
            .or(std::env::var("GLIMPSED_BIND").ok().filter(|s| !s.is_empty()))
            .or(toml.bind_address)
            .unwrap_or_else(default_bind_address);

        let update_policy = std::env::var("GLIMPSED_UPDATE_POLICY")
            .ok()
            .filter(|s| !s.is_empty())
            .or(toml.update_policy)
            .unwrap_or_else(|| "auto".to_string());

        Self {
            port,
            data_dir,
            log,
            log_format,
            bind_address,
            update_policy,
            capture: toml.capture.unwrap_or_default(),
            retry: toml.retry.unwrap_or_default(),
            window: toml.window.unwrap_or_default(),
            ai: toml.ai.unwrap_or_default(),
        }
    }

    /// Directory for main-queue screenshots.
    pub fn screenshots_dir(&self) -> PathBuf {
        self.data_dir.join("screenshots")
    }

    /// Directory for debug-view (extra) screenshots.
    pub fn extra_screenshots_dir(&self) -> PathBuf {
        self.data_dir.join("extra_screenshots")
    }
}

/// Persist a new `[ai]` table into config.toml, preserving the other fields.
///
/// Used by `ai.setConfig`. The write also wakes the [`ConfigWatcher`], which
/// is harmless — it re-reads the same values.
pub fn save_ai_config(data_dir: &Path, ai: &AiConfig) -> anyhow::Result<()> {
    let path = data_dir.join("config.toml");
    let mut toml_cfg = load_toml(data_dir).unwrap_or_default();
    toml_cfg.ai = Some(ai.clone());
    let serialized = toml::to_string_pretty(&toml_cfg)?;
    std::fs::create_dir_all(data_dir)?;
    std::fs::write(&path, serialized)?;
    info!(path = %path.display(), "ai config persisted");
    Ok(())
}

// ─── Hot-reloadable config subset ─────────────────────────────────────────────

/// Watches `config.toml` for changes and reloads the `[ai]` table.
///
/// The watcher uses the `notify` crate (kqueue on macOS, inotify on Linux)
/// to detect file modifications. Port, bind address, and the capture/retry
/// tables are startup-only and require a restart.
pub struct ConfigWatcher {
    // Hold the watcher alive; dropping it stops the file watch.
    _watcher: notify_debouncer_full::Debouncer<
        notify_debouncer_full::notify::RecommendedWatcher,
        notify_debouncer_full::FileIdMap,
    >,
}

impl ConfigWatcher {
    /// Start watching `{data_dir}/config.toml`; reloaded `[ai]` values are
    /// written into `ai`.
    ///
    /// Returns `None` if the watcher could not be created (non-fatal; the
    /// daemon runs fine without hot-reload).
    pub fn start(data_dir: &Path, ai: Arc<RwLock<AiConfig>>) -> Option<Self> {
        let config_path = data_dir.join("config.toml");
        let config_path_clone = config_path.clone();
        let rt_handle = tokio::runtime::Handle::current();

        let watcher = notify_debouncer_full::new_debouncer(
            std::time::Duration::from_secs(2),
            None,
            move |result: notify_debouncer_full::DebounceEventResult| {
                if let Ok(events) = result {
                    // Only act on modify/create events
                    let relevant = events.iter().any(|e| {
                        use notify_debouncer_full::notify::EventKind;
                        matches!(e.event.kind, EventKind::Modify(_) | EventKind::Create(_))
                    });
                    if relevant {
                        let ai = ai.clone();
                        let path = config_path_clone.clone();
                        rt_handle.spawn(async move {
                            let Some(new_ai) = load_ai_config(&path) else {
                                return;
                            };
                            let mut guard = ai.write().await;
                            if guard.base_url != new_ai.base_url
                                || guard.model != new_ai.model
                                || guard.provider != new_ai.provider
                                || guard.api_key != new_ai.api_key
                            {
                                info!(
                                    base_url = %new_ai.base_url,
                                    model = %new_ai.model,
                                    "config.toml reloaded — ai settings updated"
                                );
                            }
                            *guard = new_ai;
                        });
                    }
                }
            },
        );

        match watcher {
            Ok(mut debouncer) => {
                use notify_debouncer_full::notify::Watcher as _;
                // Watch the data_dir (parent of config.toml) since watching a
                // non-existent file fails on some platforms.
                let watch_path = config_path.parent().unwrap_or_else(|| Path::new("."));
                if let Err(e) = debouncer.watcher().watch(
                    watch_path,
                    notify_debouncer_full::notify::RecursiveMode::NonRecursive,
                ) {
                    warn!("config watcher failed to start: {e} — hot-reload disabled");
                    return None;
                }
                info!(path = %config_path.display(), "config hot-reload watcher started");
                Some(Self {
                    _watcher: debouncer,
                })
            }
            Err(e) => {
                warn!("config watcher creation failed: {e} — hot-reload disabled");
                None
            }
        }
    }
}

/// Load only the `[ai]` table from config.toml.
fn load_ai_config(path: &Path) -> Option<AiConfig> {
    let toml = std::fs::read_to_string(path)
        .ok()
        .and_then(|s| toml::from_str::<TomlConfig>(&s).ok())?;
    Some(toml.ai.unwrap_or_default())
}

fn default_data_dir() -> PathBuf {
    if let Ok(v) = std::env::var("GLIMPSED_DATA_DIR") {
        return PathBuf::from(v);
    }
    #[cfg(target_os = "macos")]
    {
        // ~/Library/Application Support/glimpsed
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("glimpsed");
        }
    }
    #[cfg(target_os = "linux")]
    {
        // $XDG_DATA_HOME/glimpsed or ~/.local/share/glimpsed
        if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
            return PathBuf::from(xdg).join("glimpsed");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join(".local")
                .join("share")
                .join("glimpsed");
        }
    }
    #[cfg(target_os = "windows")]
    {
        // %APPDATA%\glimpsed
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join("glimpsed");
        }
    }
    // Fallback
    PathBuf::from(".glimpsed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let cfg = GlimpseConfig::new(None, Some(tmp.path().to_path_buf()), None, None);
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert_eq!(cfg.bind_address, "127.0.0.1");
        assert_eq!(cfg.retry.max_retries, 3);
        assert_eq!(cfg.capture.settle_delay_ms, 100);
        assert_eq!(cfg.window.nudge_step, 50);
        assert!(matches!(cfg.ai.provider, AiProvider::Ollama));
    }

    #[test]
    fn toml_overrides_defaults_and_cli_overrides_toml() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("config.toml"),
            r#"
port = 9000
log = "debug"

[ai]
provider = "openai"
base_url = "http://localhost:1234"
model = "qwen2-vl"

[window]
nudge_step = 25
"#,
        )
        .unwrap();

        let cfg = GlimpseConfig::new(None, Some(tmp.path().to_path_buf()), None, None);
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.log, "debug");
        assert!(matches!(cfg.ai.provider, AiProvider::Openai));
        assert_eq!(cfg.ai.model, "qwen2-vl");
        assert_eq!(cfg.window.nudge_step, 25);

        // CLI wins over TOML.
        let cfg = GlimpseConfig::new(Some(4600), Some(tmp.path().to_path_buf()), None, None);
        assert_eq!(cfg.port, 4600);
    }

    #[test]
    fn log_settings_layer_toml_under_cli() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("config.toml"),
            "log = \"warn\"\nlog_format = \"json\"\n",
        )
        .unwrap();

        let cfg = GlimpseConfig::new(None, Some(tmp.path().to_path_buf()), None, None);
        assert_eq!(cfg.log, "warn");
        assert_eq!(cfg.log_format, "json");

        // CLI / env wins over the file.
        let cfg = GlimpseConfig::new(
            None,
            Some(tmp.path().to_path_buf()),
            Some("debug".to_string()),
            None,
        );
        assert_eq!(cfg.log, "debug");
    }

    #[test]
    fn save_ai_config_round_trips_and_preserves_other_fields() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("config.toml"), "port = 7001\n").unwrap();

        let ai = AiConfig {
            provider: AiProvider::Custom,
            base_url: "https://example.test/v1/chat/completions".to_string(),
            model: "gpt-4o".to_string(),
            api_key: Some("sk-test".to_string()),
            temperature: 0.5,
            max_tokens: 2048,
        };
        save_ai_config(tmp.path(), &ai).unwrap();

        let cfg = GlimpseConfig::new(None, Some(tmp.path().to_path_buf()), None, None);
        assert_eq!(cfg.port, 7001, "unrelated fields must survive the write");
        assert!(matches!(cfg.ai.provider, AiProvider::Custom));
        assert_eq!(cfg.ai.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn malformed_toml_falls_back_to_defaults() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("config.toml"), "port = }{ not toml").unwrap();
        let cfg = GlimpseConfig::new(None, Some(tmp.path().to_path_buf()), None, None);
        assert_eq!(cfg.port, DEFAULT_PORT);
    }
}
