// SPDX-License-Identifier: MIT
//! doctor.rs — pre-flight diagnostic checks for `glimpsed doctor`.
//!
//! This module is self-contained and does NOT require AppContext.
//! It runs before the daemon starts, so it can catch configuration
//! problems before they cause confusing startup failures.

use crate::capture::detect_capture_tool;
use crate::config::GlimpseConfig;

/// The result of a single diagnostic check.
pub struct CheckResult {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
}

/// Run all diagnostic checks and return a list of results.
pub fn run_doctor(config: &GlimpseConfig) -> Vec<CheckResult> {
    vec![
        check_port_available(config.port),
        check_capture_tool(),
        check_data_dir_writable(config),
        check_disk_space(config),
        check_ai_endpoint_reachable(config),
    ]
}

// ─── Individual checks ────────────────────────────────────────────────────────

/// Check 1: the configured port is available (not in use by another process).
fn check_port_available(port: u16) -> CheckResult {
    let passed = std::net::TcpListener::bind(("127.0.0.1", port)).is_ok();
    CheckResult {
        name: "Port available",
        passed,
        detail: if passed {
            format!("port {port} is free")
        } else {
            format!("port {port} is in use — is another glimpsed running?")
        },
    }
}

/// Check 2: a screen capture tool exists for this platform.
fn check_capture_tool() -> CheckResult {
    match detect_capture_tool() {
        Some(tool) => CheckResult {
            name: "Capture tool",
            passed: true,
            detail: format!("using {tool}"),
        },
        None => CheckResult {
            name: "Capture tool",
            passed: false,
            detail: "no screen capture tool found — install gnome-screenshot, \
                     spectacle, grim, or ImageMagick"
                .to_string(),
        },
    }
}

/// Check 3: data directory is writable.
fn check_data_dir_writable(config: &GlimpseConfig) -> CheckResult {
    let dir = &config.data_dir;
    if let Err(e) = std::fs::create_dir_all(dir) {
        return CheckResult {
            name: "Data dir writable",
            passed: false,
            detail: format!("cannot create {}: {e}", dir.display()),
        };
    }
    let test_path = dir.join(".doctor_write_test");
    match std::fs::write(&test_path, b"ok") {
        Ok(_) => {
            let _ = std::fs::remove_file(&test_path);
            CheckResult {
                name: "Data dir writable",
                passed: true,
                detail: format!("{} is writable", dir.display()),
            }
        }
        Err(e) => CheckResult {
            name: "Data dir writable",
            passed: false,
            detail: format!("cannot write to {}: {e}", dir.display()),
        },
    }
}

/// Check 4: sufficient disk space for screenshots and update downloads
/// (> 100 MB).
fn check_disk_space(config: &GlimpseConfig) -> CheckResult {
    match available_disk_bytes(&config.data_dir) {
        Some(bytes) => {
            const WARN_THRESHOLD: u64 = 100 * 1024 * 1024; // 100 MB
            let passed = bytes > WARN_THRESHOLD;
            let detail = if bytes >= 1024 * 1024 * 1024 {
                format!("{:.1} GB free", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
            } else {
                format!("{:.0} MB free", bytes as f64 / (1024.0 * 1024.0))
            };
            CheckResult {
                name: "Disk space",
                passed,
                detail: if passed {
                    detail
                } else {
                    format!("low disk space: only {detail}")
                },
            }
        }
        None => CheckResult {
            name: "Disk space",
            passed: true, // assume ok if we cannot check
            detail: "could not determine disk space".to_string(),
        },
    }
}

/// Check 5: the configured AI endpoint accepts TCP connections.
fn check_ai_endpoint_reachable(config: &GlimpseConfig) -> CheckResult {
    use std::net::{TcpStream, ToSocketAddrs};
    use std::time::Duration;

    let name = "AI endpoint reachable";
    let Some(target) = host_port(&config.ai.base_url) else {
        return CheckResult {
            name,
            passed: false,
            detail: format!("cannot parse endpoint URL: {}", config.ai.base_url),
        };
    };

    let addr = match target.to_socket_addrs().ok().and_then(|mut a| a.next()) {
        Some(a) => a,
        None => {
            return CheckResult {
                name,
                passed: false,
                detail: format!("cannot resolve {target}"),
            }
        }
    };

    match TcpStream::connect_timeout(&addr, Duration::from_secs(5)) {
        Ok(_) => CheckResult {
            name,
            passed: true,
            detail: format!("{target} reachable"),
        },
        Err(e) => CheckResult {
            name,
            passed: false,
            detail: format!("cannot reach {target} — is the model server running? ({e})"),
        },
    }
}

/// Extract "host:port" from an http(s) URL, defaulting the port by scheme.
fn host_port(url: &str) -> Option<String> {
    let (default_port, rest) = if let Some(r) = url.strip_prefix("https://") {
        (443u16, r)
    } else if let Some(r) = url.strip_prefix("http://") {
        (80u16, r)
    } else {
        return None;
    };
    let authority = rest.split('/').next()?;
    if authority.is_empty() {
        return None;
    }
    if authority.contains(':') {
        Some(authority.to_string())
    } else {
        Some(format!("{authority}:{default_port}"))
    }
}

/// Return available bytes on the filesystem containing `path`.
///
/// Parses `df -Pk` output on Unix; other platforms report unknown.
fn available_disk_bytes(path: &std::path::Path) -> Option<u64> {
    #[cfg(unix)]
    {
        // POSIX-format output, 1024-byte blocks: the 4th column of the data
        // row is the available block count.
        let target = if path.exists() {
            path
        } else {
            path.parent().unwrap_or(std::path::Path::new("/"))
        };
        let out = std::process::Command::new("df")
            .arg("-Pk")
            .arg(target)
            .output()
            .ok()?;
        if !out.status.success() {
            return None;
        }
        let text = String::from_utf8_lossy(&out.stdout);
        let row = text.lines().nth(1)?;
        let available_kb: u64 = row.split_whitespace().nth(3)?.parse().ok()?;
        Some(available_kb * 1024)
    }
    #[cfg(not(unix))]
    {
        let _ = path;
        None
    }
}

// ─── Output formatting ────────────────────────────────────────────────────────

const RESET: &str = "\x1b[0m";
const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const BOLD: &str = "\x1b[1m";

/// Print a formatted table of check results to stdout.
pub fn print_doctor_results(results: &[CheckResult]) {
    println!();
    println!("{BOLD}glimpsed doctor — pre-flight checks{RESET}");
    println!("{}", "─".repeat(60));

    for r in results {
        let (symbol, color) = if r.passed { ("✓", GREEN) } else { ("✗", RED) };
        println!("  {color}{symbol}{RESET}  {:<24}  {}", r.name, r.detail);
    }

    println!("{}", "─".repeat(60));

    let failed = results.iter().filter(|r| !r.passed).count();
    if failed == 0 {
        println!("{GREEN}All checks passed.{RESET}");
    } else {
        println!("{RED}{failed} check(s) failed. See above for details.{RESET}");
    }
    println!();
}
