// SPDX-License-Identifier: MIT
// Full-screen capture via OS tooling.
//
// Strategy:
//   1. detect_capture_tool() probes for a usable binary on this platform.
//   2. grab() spawns it with the output path and waits with a timeout,
//      killing the child if it overruns.
//   3. The output file is verified to exist and be non-empty — some tools
//      exit 0 without writing anything (cancelled selection, missing
//      display), so exit status alone is not trusted.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// How long a capture subprocess may run before being killed.
const CAPTURE_TIMEOUT: Duration = Duration::from_secs(15);

/// Linux capture tools to probe, in preference order.
#[cfg(target_os = "linux")]
const CANDIDATE_TOOLS: &[&str] = &["gnome-screenshot", "spectacle", "grim", "import"];

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("CAPTURE_FAILED: no screen capture tool available on this platform")]
    NoTool,
    #[error("CAPTURE_FAILED: failed to spawn capture process: {0}")]
    Spawn(String),
    #[error("CAPTURE_FAILED: capture timed out after {0} seconds")]
    Timeout(u64),
    #[error("CAPTURE_FAILED: capture tool exited with {status}: {stderr}")]
    NonZeroExit { status: String, stderr: String },
    #[error("CAPTURE_FAILED: capture tool produced no output file")]
    NoOutput,
    #[error("CAPTURE_FAILED: {0}")]
    Io(#[from] std::io::Error),
}

/// Seam for screen capture so the processing pipeline and the IPC layer can
/// be tested without a display server.
#[async_trait]
pub trait Grabber: Send + Sync {
    /// Write a full-screen PNG to `dest`.
    async fn grab(&self, dest: &Path) -> Result<(), CaptureError>;
}

/// Production grabber shelling out to the platform capture tool.
pub struct OsGrabber;

#[async_trait]
impl Grabber for OsGrabber {
    async fn grab(&self, dest: &Path) -> Result<(), CaptureError> {
        let mut cmd = build_capture_command(dest)?;
        cmd.stdout(Stdio::null()).stderr(Stdio::piped());

        debug!(dest = %dest.display(), "spawning screen capture");

        let mut child = cmd.spawn().map_err(|e| CaptureError::Spawn(e.to_string()))?;

        let status = match timeout(CAPTURE_TIMEOUT, child.wait()).await {
            Err(_elapsed) => {
                // Kill the child to avoid a zombie holding the display.
                let _ = child.kill().await;
                warn!(secs = CAPTURE_TIMEOUT.as_secs(), "screen capture timed out");
                return Err(CaptureError::Timeout(CAPTURE_TIMEOUT.as_secs()));
            }
            Ok(res) => res.map_err(|e| CaptureError::Spawn(e.to_string()))?,
        };

        if !status.success() {
            let stderr = match child.stderr.take() {
                Some(mut s) => {
                    use tokio::io::AsyncReadExt;
                    let mut buf = String::new();
                    let _ = s.read_to_string(&mut buf).await;
                    buf.trim().to_string()
                }
                None => String::new(),
            };
            return Err(CaptureError::NonZeroExit {
                status: status.to_string(),
                stderr,
            });
        }

        // Exit 0 is not proof of a screenshot.
        let wrote_file = std::fs::metadata(dest).map(|m| m.len() > 0).unwrap_or(false);
        if !wrote_file {
            return Err(CaptureError::NoOutput);
        }
        Ok(())
    }
}

/// Name of the capture tool this platform would use, for diagnostics.
/// `None` means capture cannot work on this machine.
pub fn detect_capture_tool() -> Option<String> {
    #[cfg(target_os = "macos")]
    {
        // Ships with macOS.
        Some("screencapture".to_string())
    }
    #[cfg(target_os = "windows")]
    {
        Some("powershell".to_string())
    }
    #[cfg(target_os = "linux")]
    {
        CANDIDATE_TOOLS
            .iter()
            .find(|t| which_tool(t))
            .map(|t| (*t).to_string())
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows", target_os = "linux")))]
    {
        None
    }
}

fn build_capture_command(dest: &Path) -> Result<Command, CaptureError> {
    #[cfg(target_os = "macos")]
    {
        // -x: no camera sound.
        let mut cmd = Command::new("screencapture");
        cmd.arg("-x").arg(dest);
        Ok(cmd)
    }
    #[cfg(target_os = "windows")]
    {
        // System.Drawing CopyFromScreen over the virtual screen bounds.
        let script = format!(
            "Add-Type -AssemblyName System.Windows.Forms,System.Drawing; \
             $b = [System.Windows.Forms.SystemInformation]::VirtualScreen; \
             $bmp = New-Object System.Drawing.Bitmap $b.Width, $b.Height; \
             $g = [System.Drawing.Graphics]::FromImage($bmp); \
             $g.CopyFromScreen($b.X, $b.Y, 0, 0, $bmp.Size); \
             $bmp.Save('{}', [System.Drawing.Imaging.ImageFormat]::Png); \
             $g.Dispose(); $bmp.Dispose()",
            dest.display()
        );
        let mut cmd = Command::new("powershell");
        cmd.args(["-NoProfile", "-NonInteractive", "-Command", &script]);
        Ok(cmd)
    }
    #[cfg(target_os = "linux")]
    {
        let tool = detect_capture_tool().ok_or(CaptureError::NoTool)?;
        let mut cmd = Command::new(&tool);
        match tool.as_str() {
            "gnome-screenshot" => {
                cmd.arg("-f").arg(dest);
            }
            "spectacle" => {
                cmd.args(["-b", "-n", "-o"]).arg(dest);
            }
            "grim" => {
                cmd.arg(dest);
            }
            // ImageMagick: capture the root window.
            _ => {
                cmd.args(["-window", "root"]).arg(dest);
            }
        }
        Ok(cmd)
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows", target_os = "linux")))]
    {
        let _ = dest;
        Err(CaptureError::NoTool)
    }
}

/// Check if a binary is available on PATH using `which` semantics.
#[cfg(target_os = "linux")]
fn which_tool(binary: &str) -> bool {
    if let Ok(path_var) = std::env::var("PATH") {
        for dir in path_var.split(':') {
            let candidate = Path::new(dir).join(binary);
            if candidate.is_file() {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_errors_carry_the_failure_marker() {
        // The IPC layer classifies capture failures by this prefix.
        assert!(CaptureError::NoTool.to_string().starts_with("CAPTURE_FAILED"));
        assert!(CaptureError::Timeout(15)
            .to_string()
            .starts_with("CAPTURE_FAILED"));
        assert!(CaptureError::NoOutput
            .to_string()
            .starts_with("CAPTURE_FAILED"));
    }
}
