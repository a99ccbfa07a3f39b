// SPDX-License-Identifier: MIT

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use glimpsed::capture::{detect_capture_tool, OsGrabber, ScreenshotManager};
use glimpsed::cli::client::{read_auth_token, DaemonClient};
use glimpsed::config::{ConfigWatcher, GlimpseConfig};
use glimpsed::ipc::event::EventBroadcaster;
use glimpsed::llm::{ChatTransport, HttpChatClient};
use glimpsed::processing::Processor;
use glimpsed::window::WindowTracker;
use glimpsed::{auth, doctor, ipc, update, AppContext};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(
    name = "glimpsed",
    about = "Glimpse daemon — screenshot capture and AI problem solving for the overlay shell",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// JSON-RPC WebSocket server port
    #[arg(long, env = "GLIMPSED_PORT")]
    port: Option<u16>,

    /// Data directory for screenshots, config, and the auth token
    #[arg(long, env = "GLIMPSED_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "GLIMPSED_LOG")]
    log: Option<String>,

    /// Bind address for the WebSocket server (default: 127.0.0.1)
    #[arg(long, env = "GLIMPSED_BIND")]
    bind_address: Option<String>,

    /// Write logs to this file path (rotated daily). Optional.
    #[arg(long, env = "GLIMPSED_LOG_FILE")]
    log_file: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the daemon server (default when no subcommand given).
    ///
    /// Examples:
    ///   glimpsed serve
    ///   glimpsed
    Serve,
    /// Show daemon status (version, uptime, queue depth).
    ///
    /// Examples:
    ///   glimpsed status
    ///   glimpsed status --json
    Status {
        /// Print machine-readable JSON instead of a summary line.
        #[arg(long)]
        json: bool,
    },
    /// Print daemon logs (requires --log-file / GLIMPSED_LOG_FILE logging).
    ///
    /// Examples:
    ///   glimpsed logs
    ///   glimpsed logs -f
    ///   glimpsed logs -n 200 --filter warn
    Logs {
        /// Follow the log file and print new lines as they appear.
        #[arg(long, short = 'f')]
        follow: bool,
        /// Number of trailing lines to print (0 = all).
        #[arg(long, short = 'n', default_value_t = 100)]
        lines: u64,
        /// Minimum level to show (error, warn, info, debug, trace).
        #[arg(long)]
        filter: Option<String>,
    },
    /// Run pre-flight diagnostic checks and exit.
    ///
    /// Examples:
    ///   glimpsed doctor
    Doctor,
    /// Manage the daemon auth token.
    ///
    /// Examples:
    ///   glimpsed token show
    Token {
        #[command(subcommand)]
        cmd: TokenCmd,
    },
}

#[derive(Subcommand)]
enum TokenCmd {
    /// Print the auth token to stdout.
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        // The serve path resolves the full config first so the TOML `log` and
        // `log_format` keys participate in the CLI/env > TOML > default
        // layering before the subscriber goes up.
        None | Some(Command::Serve) => {
            let config = GlimpseConfig::new(args.port, args.data_dir, args.log, args.bind_address);
            let _file_guard =
                setup_logging(&config.log, args.log_file.as_deref(), &config.log_format);
            run_server(Arc::new(config)).await?;
        }
        Some(cmd) => {
            // One-shot subcommands print to stdout; keep tracing quiet unless
            // asked for otherwise.
            let log_level = args.log.as_deref().unwrap_or("error").to_owned();
            let log_format =
                std::env::var("GLIMPSED_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());
            let _file_guard = setup_logging(&log_level, args.log_file.as_deref(), &log_format);

            match cmd {
                Command::Serve => unreachable!("handled above"),
                Command::Doctor => {
                    let config = GlimpseConfig::new(args.port, args.data_dir, None, None);
                    let results = doctor::run_doctor(&config);
                    doctor::print_doctor_results(&results);
                    let failed = results.iter().filter(|r| !r.passed).count();
                    std::process::exit(if failed == 0 { 0 } else { 1 });
                }
                Command::Token { cmd } => {
                    let config = GlimpseConfig::new(None, args.data_dir, None, None);
                    match cmd {
                        TokenCmd::Show => run_token_show(&config)?,
                    }
                }
                Command::Status { json } => {
                    let config = GlimpseConfig::new(args.port, args.data_dir, None, None);
                    let exit_code = run_status(&config, json).await;
                    std::process::exit(exit_code);
                }
                Command::Logs {
                    follow,
                    lines,
                    filter,
                } => {
                    let config = GlimpseConfig::new(None, args.data_dir, None, None);
                    run_logs(&config, follow, lines, filter.as_deref())?;
                }
            }
        }
    }

    Ok(())
}

/// Initialize the tracing subscriber.
/// If `log_file` is set, logs go to both stdout and a daily-rolling file.
/// Returns a `WorkerGuard` that must stay alive for the process lifetime.
///
/// `log_format` may be `"pretty"` (default, human-readable compact format) or
/// `"json"` (structured JSON for log aggregators).
///
/// If the log directory cannot be created, falls back to stdout-only logging
/// with a warning — never panics.
fn setup_logging(
    log_level: &str,
    log_file: Option<&std::path::Path>,
    log_format: &str,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let use_json = log_format == "json";

    if let Some(path) = log_file {
        let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let filename = path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("glimpsed.log"));

        // Ensure the directory exists before tracing-appender tries to open it.
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!(
                "warn: could not create log directory '{}': {e} — falling back to stdout",
                dir.display()
            );
            if use_json {
                tracing_subscriber::fmt()
                    .json()
                    .with_env_filter(log_level)
                    .init();
            } else {
                tracing_subscriber::fmt()
                    .with_env_filter(log_level)
                    .compact()
                    .init();
            }
            return None;
        }

        let appender = tracing_appender::rolling::daily(dir, filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        if use_json {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().json())
                .with(fmt::layer().json().with_writer(non_blocking))
                .init();
        } else {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().compact())
                .with(fmt::layer().with_writer(non_blocking))
                .init();
        }

        Some(guard)
    } else if use_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(log_level)
            .init();
        None
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(log_level)
            .compact()
            .init();
        None
    }
}

// ── Panic hook + crash log ────────────────────────────────────────────────────

/// Install a custom panic hook that writes panic info + backtrace to
/// `{data_dir}/crash.log`. The crash log is checked and removed on the next
/// startup (`check_crash_log`).
fn install_panic_hook(data_dir: std::path::PathBuf) {
    let original = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        // Call the original hook first (prints to stderr).
        original(info);

        let crash_path = data_dir.join("crash.log");
        let msg = info
            .payload()
            .downcast_ref::<&str>()
            .copied()
            .or_else(|| info.payload().downcast_ref::<String>().map(|s| s.as_str()))
            .unwrap_or("unknown panic");

        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "unknown location".to_string());

        let backtrace = std::backtrace::Backtrace::capture();
        let content = format!(
            "glimpsed panic at {location}\n\
             message: {msg}\n\
             version: {}\n\
             backtrace:\n{backtrace:#}\n",
            env!("CARGO_PKG_VERSION")
        );

        // Best-effort write — if this fails, we can't do much.
        let _ = std::fs::write(&crash_path, &content);
    }));
}

/// Check for a crash log from the previous run, log it at error level, then
/// delete it.
fn check_crash_log(data_dir: &std::path::Path) {
    let crash_path = data_dir.join("crash.log");
    match std::fs::read_to_string(&crash_path) {
        Ok(content) => {
            tracing::error!(
                crash_report = %content.trim(),
                "previous daemon run ended with a panic — see crash report above"
            );
            let _ = std::fs::remove_file(&crash_path);
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(err = %e, "could not read crash.log");
        }
    }
}

// ── glimpsed status ───────────────────────────────────────────────────────────

async fn run_status(config: &GlimpseConfig, json: bool) -> i32 {
    let token = match read_auth_token(&config.data_dir) {
        Ok(t) => t,
        Err(_) => {
            if json {
                println!(r#"{{"status":"not_started"}}"#);
            } else {
                println!("glimpsed: never started (no auth token in data dir)");
            }
            return 1;
        }
    };

    let client = DaemonClient::new(config.port, token);
    match client.call_once("daemon.status", serde_json::json!({})).await {
        Ok(result) => {
            let version = result["version"].as_str().unwrap_or("?");
            let queued = result["queued"].as_u64().unwrap_or(0);
            let uptime_str = format_uptime(result["uptime"].as_u64().unwrap_or(0));

            if json {
                println!("{}", serde_json::to_string(&result).unwrap_or_default());
            } else {
                println!(
                    "glimpsed {version} — Running ({queued} queued screenshots, uptime {uptime_str})"
                );
            }
            0
        }
        Err(_) => {
            if json {
                println!(r#"{{"status":"not_running"}}"#);
            } else {
                println!("glimpsed: not running");
            }
            1
        }
    }
}

/// Format uptime seconds as "2h 14m" or "45m 3s".
fn format_uptime(secs: u64) -> String {
    let h = secs / 3600;
    let m = (secs % 3600) / 60;
    let s = secs % 60;
    if h > 0 {
        format!("{h}h {m}m")
    } else if m > 0 {
        format!("{m}m {s}s")
    } else {
        format!("{s}s")
    }
}

// ── glimpsed logs ─────────────────────────────────────────────────────────────

fn run_logs(config: &GlimpseConfig, follow: bool, lines: u64, filter: Option<&str>) -> Result<()> {
    use std::fs::File;
    use std::io::{Read, Seek, SeekFrom};

    // Resolve log path: GLIMPSED_LOG_FILE env → default {data_dir}/glimpsed.log
    let log_path = std::env::var("GLIMPSED_LOG_FILE")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| config.data_dir.join("glimpsed.log"));

    if !log_path.exists() {
        anyhow::bail!(
            "log file not found: {}\n  Start the daemon with --log-file (or GLIMPSED_LOG_FILE) first",
            log_path.display()
        );
    }

    let content = std::fs::read_to_string(&log_path)
        .with_context(|| format!("cannot read log file: {}", log_path.display()))?;

    let all_lines: Vec<&str> = content.lines().collect();
    let min_level = filter.map(|f| f.to_ascii_lowercase());

    // Apply level filter (heuristic: check for level strings in each line)
    let filtered: Vec<&&str> = if let Some(ref level) = min_level {
        let levels = log_level_order(level);
        all_lines
            .iter()
            .filter(|line| {
                let l = line.to_ascii_lowercase();
                levels.iter().any(|lvl| l.contains(lvl))
            })
            .collect()
    } else {
        all_lines.iter().collect()
    };

    // Print last N lines (0 = all)
    let start = if lines == 0 || lines as usize >= filtered.len() {
        0
    } else {
        filtered.len() - lines as usize
    };

    for line in &filtered[start..] {
        println!("{line}");
    }

    if !follow {
        return Ok(());
    }

    // Follow mode: poll file every 250ms, print new content as it appears
    let mut file = File::open(&log_path)
        .with_context(|| format!("cannot open log file: {}", log_path.display()))?;
    let mut pos = file
        .seek(SeekFrom::End(0))
        .context("cannot seek log file")?;

    loop {
        std::thread::sleep(std::time::Duration::from_millis(250));

        // Handle log rotation: if file shrunk, reopen from start
        let meta = std::fs::metadata(&log_path);
        let new_size = meta.map(|m| m.len()).unwrap_or(0);
        if new_size < pos {
            if let Ok(f) = File::open(&log_path) {
                file = f;
                pos = 0;
            }
        }

        file.seek(SeekFrom::Start(pos))
            .context("cannot seek log file")?;
        let mut buf = String::new();
        file.read_to_string(&mut buf)
            .context("cannot read log file")?;

        if !buf.is_empty() {
            let should_print = if let Some(ref level) = min_level {
                let levels = log_level_order(level);
                levels
                    .iter()
                    .any(|lvl| buf.to_ascii_lowercase().contains(lvl))
            } else {
                true
            };
            if should_print {
                print!("{buf}");
            }
            pos += buf.len() as u64;
        }
    }
}

/// Return all log levels at or above `min_level` (for line filtering).
fn log_level_order(min_level: &str) -> Vec<&'static str> {
    match min_level {
        "error" => vec!["error"],
        "warn" | "warning" => vec!["warn", "error"],
        "info" => vec!["info", "warn", "error"],
        "debug" => vec!["debug", "info", "warn", "error"],
        _ => vec!["trace", "debug", "info", "warn", "error"],
    }
}

// ── glimpsed token show ───────────────────────────────────────────────────────

fn run_token_show(config: &GlimpseConfig) -> Result<()> {
    let token_path = config.data_dir.join("auth_token");
    match std::fs::read_to_string(&token_path) {
        Ok(token) => {
            println!("{}", token.trim());
            Ok(())
        }
        Err(_) => {
            eprintln!("error: auth token not found at {}", token_path.display());
            eprintln!("       Is the daemon running? Start it with: glimpsed serve");
            std::process::exit(1);
        }
    }
}

// ── glimpsed serve ────────────────────────────────────────────────────────────

async fn run_server(config: Arc<GlimpseConfig>) -> Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "glimpsed starting");

    std::fs::create_dir_all(&config.data_dir).context("failed to create data directory")?;
    info!(
        data_dir = %config.data_dir.display(),
        port = config.port,
        "config loaded"
    );

    install_panic_hook(config.data_dir.clone());
    check_crash_log(&config.data_dir);

    match detect_capture_tool() {
        Some(tool) => info!(tool = %tool, "screen capture tool found"),
        None => warn!("no screen capture tool found — screenshot.take will fail"),
    }

    let auth_token = auth::get_or_create_token(&config.data_dir)
        .context("failed to create auth token")?;

    let broadcaster = Arc::new(EventBroadcaster::new());
    let window = Arc::new(WindowTracker::new(
        config.window.nudge_step,
        broadcaster.clone(),
    ));

    let screenshots = Arc::new(
        ScreenshotManager::new(
            Arc::new(OsGrabber),
            window.clone(),
            broadcaster.clone(),
            config.screenshots_dir(),
            config.extra_screenshots_dir(),
            &config.capture,
        )
        .context("failed to create screenshot queues")?,
    );

    let ai = Arc::new(tokio::sync::RwLock::new(config.ai.clone()));
    let chat = Arc::new(HttpChatClient::new());
    let processor = Arc::new(Processor::new(
        chat.clone() as Arc<dyn ChatTransport>,
        screenshots.clone(),
        window.clone(),
        broadcaster.clone(),
        ai.clone(),
        config.retry.clone(),
    ));

    let updater = Arc::new(update::spawn(config.clone(), broadcaster.clone()));

    // Keep the watcher alive for the daemon's lifetime; None = no hot-reload.
    let _config_watcher = ConfigWatcher::start(&config.data_dir, ai.clone());

    let ctx = Arc::new(AppContext {
        config,
        ai,
        broadcaster,
        screenshots,
        processor,
        window,
        chat,
        updater,
        auth_token,
        pkce: Arc::new(tokio::sync::Mutex::new(None)),
        started_at: std::time::Instant::now(),
    });

    ipc::run(ctx).await
}
