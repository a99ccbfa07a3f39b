//! Release checker.
//!
//! Checks GitHub Releases for newer versions and downloads the platform
//! binary into `{data_dir}/updates`, verified against the published SHA-256
//! checksum asset. The daemon never replaces or restarts itself; the
//! downloaded file is left for the installer (or the user) to apply.
//!
//! Process:
//! 1. Query `https://api.github.com/repos/glimpse-host/glimpsed/releases/latest`
//! 2. Compare tag vs `CARGO_PKG_VERSION` using semver
//! 3. If newer: broadcast `update.available`
//! 4. Under the `auto` policy (or on `daemon.downloadUpdate`): stream the
//!    asset, verify SHA-256, broadcast `update.downloaded`
//!
//! Update policy:
//! - "auto"   — check and download automatically (default)
//! - "manual" — check and broadcast only; `daemon.downloadUpdate` downloads
//! - "never"  — disable all update checks

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use semver::Version;
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::GlimpseConfig;
use crate::ipc::event::EventBroadcaster;

const RELEASES_URL: &str = "https://api.github.com/repos/glimpse-host/glimpsed/releases/latest";

// ─── GitHub API types ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GhRelease {
    tag_name: String,
    html_url: String,
    assets: Vec<GhAsset>,
}

#[derive(Debug, Deserialize)]
struct GhAsset {
    name: String,
    browser_download_url: String,
}

// ─── Update state ─────────────────────────────────────────────────────────────

/// Outcome of a version check.
#[derive(Debug, Clone)]
pub struct UpdateCheck {
    pub current: String,
    pub latest: String,
    pub available: bool,
}

/// A downloaded-and-verified update sitting in `{data_dir}/updates`.
#[derive(Debug, Clone)]
pub struct DownloadedUpdate {
    pub version: String,
    pub path: PathBuf,
}

// ─── Updater ─────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct Updater {
    config: Arc<GlimpseConfig>,
    broadcaster: Arc<EventBroadcaster>,
    downloaded: Arc<Mutex<Option<DownloadedUpdate>>>,
}

impl Updater {
    pub fn new(config: Arc<GlimpseConfig>, broadcaster: Arc<EventBroadcaster>) -> Self {
        Self {
            config,
            broadcaster,
            downloaded: Arc::new(Mutex::new(None)),
        }
    }

    /// Check GitHub Releases for a newer version.
    pub async fn check(&self) -> Result<UpdateCheck> {
        let current =
            Version::parse(env!("CARGO_PKG_VERSION")).context("invalid CARGO_PKG_VERSION")?;

        let release = self.fetch_latest_release().await?;
        let tag = release.tag_name.trim_start_matches('v').to_string();
        let latest = Version::parse(&tag).context("invalid release tag semver")?;

        Ok(UpdateCheck {
            available: latest > current,
            current: current.to_string(),
            latest: latest.to_string(),
        })
    }

    /// Check, broadcast `update.available` if newer, and download under the
    /// `auto` policy. Called on startup and every 24 hours.
    pub async fn check_and_maybe_download(&self) -> Result<()> {
        let policy = self.config.update_policy.as_str();

        if policy == "never" {
            debug!("update checks disabled by policy");
            return Ok(());
        }

        let check = self.check().await?;
        if !check.available {
            debug!(current = %check.current, "no update available");
            return Ok(());
        }

        info!(current = %check.current, latest = %check.latest, "update available");

        let release = self.fetch_latest_release().await?;
        self.broadcaster.broadcast(
            "update.available",
            json!({
                "current": check.current,
                "latest": check.latest,
                "releaseNotesUrl": release.html_url,
                "policy": policy,
            }),
        );

        if policy == "manual" {
            // Broadcast only; download waits for daemon.downloadUpdate.
            return Ok(());
        }

        self.download(&release, &check.latest).await?;
        Ok(())
    }

    /// Download the latest release if it is newer than the running version.
    /// Returns `None` when already up to date. Backs `daemon.downloadUpdate`.
    pub async fn download_latest(&self) -> Result<Option<DownloadedUpdate>> {
        let check = self.check().await?;
        if !check.available {
            return Ok(None);
        }
        let release = self.fetch_latest_release().await?;
        self.download(&release, &check.latest).await?;
        Ok(self.downloaded.lock().await.clone())
    }

    /// Info about an already-downloaded update, if any.
    pub async fn pending_update(&self) -> Option<DownloadedUpdate> {
        self.downloaded.lock().await.clone()
    }

    /// Stream the platform asset to `{data_dir}/updates` and verify SHA-256
    /// against the published checksum asset.
    async fn download(&self, release: &GhRelease, version: &str) -> Result<()> {
        let platform = current_platform();
        debug!(platform = %platform, "looking for release asset");

        let binary_asset = release
            .assets
            .iter()
            .find(|a| a.name == format!("glimpsed-{platform}"))
            .with_context(|| format!("no asset for platform {platform}"))?;

        let checksum_asset = release
            .assets
            .iter()
            .find(|a| a.name == format!("glimpsed-{platform}.sha256"))
            .with_context(|| format!("no checksum asset for platform {platform}"))?;

        let client = build_client()?;
        let checksum_text = client
            .get(&checksum_asset.browser_download_url)
            .send()
            .await?
            .text()
            .await?;
        let expected_hash = checksum_text
            .split_whitespace()
            .next()
            .unwrap_or("")
            .to_string();

        let updates_dir = self.config.data_dir.join("updates");
        tokio::fs::create_dir_all(&updates_dir)
            .await
            .context("failed to create updates dir")?;
        let dest = updates_dir.join(format!("glimpsed-{version}"));

        let mut file = tokio::fs::File::create(&dest)
            .await
            .context("failed to create update file")?;

        let mut response = client.get(&binary_asset.browser_download_url).send().await?;

        let mut hasher = Sha256::new();
        while let Some(chunk) = response.chunk().await? {
            hasher.update(&chunk);
            file.write_all(&chunk)
                .await
                .context("failed to write update chunk")?;
        }
        file.flush().await?;

        let actual_hash = hex::encode(hasher.finalize());
        if actual_hash != expected_hash {
            let _ = tokio::fs::remove_file(&dest).await;
            bail!("SHA256 mismatch: expected {expected_hash}, got {actual_hash}");
        }

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(&dest)?.permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&dest, perms)?;
        }

        info!(version = %version, path = %dest.display(), "update downloaded and verified");

        *self.downloaded.lock().await = Some(DownloadedUpdate {
            version: version.to_string(),
            path: dest.clone(),
        });

        self.broadcaster.broadcast(
            "update.downloaded",
            json!({ "version": version, "path": dest }),
        );
        Ok(())
    }

    async fn fetch_latest_release(&self) -> Result<GhRelease> {
        let client = build_client()?;
        let release: GhRelease = client
            .get(RELEASES_URL)
            .header(
                "User-Agent",
                format!("glimpsed/{}", env!("CARGO_PKG_VERSION")),
            )
            .send()
            .await
            .context("failed to fetch GitHub releases")?
            .error_for_status()
            .context("GitHub API error")?
            .json()
            .await
            .context("failed to parse GitHub release JSON")?;
        Ok(release)
    }
}

// ─── Spawn background task ────────────────────────────────────────────────────

/// Start the periodic update-check task.
///
/// Checks 10 s after startup, then every 24 hours. The returned handle backs
/// the `daemon.checkUpdate` / `daemon.downloadUpdate` RPC methods.
pub fn spawn(config: Arc<GlimpseConfig>, broadcaster: Arc<EventBroadcaster>) -> Updater {
    let updater = Updater::new(config, broadcaster);
    let updater_clone = updater.clone();

    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_secs(10)).await;

        if let Err(e) = updater_clone.check_and_maybe_download().await {
            warn!("update check failed: {e:#}");
        }

        let mut interval = tokio::time::interval(std::time::Duration::from_secs(24 * 60 * 60));
        interval.tick().await;
        loop {
            interval.tick().await;
            if let Err(e) = updater_clone.check_and_maybe_download().await {
                warn!("update check failed: {e:#}");
            }
        }
    });

    updater
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn build_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()
        .context("failed to build HTTP client")
}

/// Returns the platform string matching our release asset naming convention.
fn current_platform() -> &'static str {
    #[cfg(all(target_arch = "aarch64", target_os = "macos"))]
    return "aarch64-apple-darwin";

    #[cfg(all(target_arch = "x86_64", target_os = "macos"))]
    return "x86_64-apple-darwin";

    #[cfg(all(target_arch = "x86_64", target_os = "linux"))]
    return "x86_64-unknown-linux-gnu";

    #[cfg(all(target_arch = "aarch64", target_os = "linux"))]
    return "aarch64-unknown-linux-gnu";

    #[cfg(all(target_arch = "x86_64", target_os = "windows"))]
    return "x86_64-pc-windows-msvc";

    #[cfg(not(any(
        all(target_arch = "aarch64", target_os = "macos"),
        all(target_arch = "x86_64", target_os = "macos"),
        all(target_arch = "x86_64", target_os = "linux"),
        all(target_arch = "aarch64", target_os = "linux"),
        all(target_arch = "x86_64", target_os = "windows"),
    )))]
    return "unknown-platform";
}
