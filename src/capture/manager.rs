// SPDX-License-Identifier: MIT
// ScreenshotManager — owns the two bounded queues and drives capture around
// the overlay window: hide, settle, grab, enqueue, re-show.

use crate::capture::grabber::{CaptureError, Grabber};
use crate::capture::queue::{CleanupReport, ScreenshotQueue};
use crate::config::CaptureConfig;
use crate::ipc::event::EventBroadcaster;
use crate::window::{View, WindowTracker};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

struct Queues {
    main: ScreenshotQueue,
    extra: ScreenshotQueue,
}

impl Queues {
    /// The queue the current view writes to: Queue view uses the main queue,
    /// Problem/Solutions (debug) use the extra queue.
    fn active_mut(&mut self, view: View) -> &mut ScreenshotQueue {
        match view {
            View::Queue => &mut self.main,
            View::Problem | View::Solutions => &mut self.extra,
        }
    }

    fn active(&self, view: View) -> &ScreenshotQueue {
        match view {
            View::Queue => &self.main,
            View::Problem | View::Solutions => &self.extra,
        }
    }
}

pub struct ScreenshotManager {
    grabber: Arc<dyn Grabber>,
    window: Arc<WindowTracker>,
    broadcaster: Arc<EventBroadcaster>,
    queues: Mutex<Queues>,
    /// Serializes the whole hide → grab → re-show sequence; a second
    /// `take_screenshot` waits instead of re-showing the overlay mid-grab.
    capture_gate: Mutex<()>,
    settle_delay: Duration,
    reshow_delay: Duration,
}

impl ScreenshotManager {
    pub fn new(
        grabber: Arc<dyn Grabber>,
        window: Arc<WindowTracker>,
        broadcaster: Arc<EventBroadcaster>,
        main_dir: PathBuf,
        extra_dir: PathBuf,
        capture: &CaptureConfig,
    ) -> io::Result<Self> {
        Ok(Self {
            grabber,
            window,
            broadcaster,
            queues: Mutex::new(Queues {
                main: ScreenshotQueue::new(main_dir)?,
                extra: ScreenshotQueue::new(extra_dir)?,
            }),
            capture_gate: Mutex::new(()),
            settle_delay: Duration::from_millis(capture.settle_delay_ms),
            reshow_delay: Duration::from_millis(capture.reshow_delay_ms),
        })
    }

    /// Capture the screen into the active queue.
    ///
    /// The overlay is hidden for the duration and re-shown after
    /// `reshow_delay` on every exit path, success or failure. Broadcasts
    /// `screenshot.taken` with the new path and a data-URL preview.
    /// Concurrent calls are serialized; the overlay stays hidden until the
    /// in-flight grab finishes.
    pub async fn take_screenshot(&self) -> Result<PathBuf, CaptureError> {
        let _gate = self.capture_gate.lock().await;
        self.window.hide().await;
        tokio::time::sleep(self.settle_delay).await;

        let result = self.capture_into_queue().await;

        tokio::time::sleep(self.reshow_delay).await;
        self.window.show().await;

        let (path, bytes) = result?;
        self.broadcaster.broadcast(
            "screenshot.taken",
            serde_json::json!({
                "path": path,
                "preview": to_data_url(&bytes),
            }),
        );
        Ok(path)
    }

    async fn capture_into_queue(&self) -> Result<(PathBuf, Vec<u8>), CaptureError> {
        // Grab into a temp file first; only a verified capture enters the
        // queue directory.
        let tmp = tempfile::Builder::new()
            .prefix("glimpse-grab-")
            .suffix(".png")
            .tempfile()?;
        let tmp_path = tmp.path().to_path_buf();

        self.grabber.grab(&tmp_path).await?;
        let bytes = std::fs::read(&tmp_path)?;
        drop(tmp); // unlinks the temp file

        let view = self.window.view().await;
        let mut queues = self.queues.lock().await;
        let queue = queues.active_mut(view);

        let dest = queue.dir().join(format!("{}.png", Uuid::new_v4()));
        std::fs::write(&dest, &bytes)?;

        if let Some(evicted) = queue.push(dest.clone()) {
            info!(evicted = %evicted.path.display(), "queue full — oldest screenshot evicted");
            if let Some(e) = evicted.unlink_error {
                warn!(path = %evicted.path.display(), err = %e, "evicted file left on disk");
            }
        }

        Ok((dest, bytes))
    }

    /// Read `path` and return a `data:image/png;base64,...` URI.
    pub async fn preview(&self, path: &Path) -> io::Result<String> {
        let bytes = tokio::fs::read(path).await?;
        Ok(to_data_url(&bytes))
    }

    /// Remove `path` from the queue matching the current view and unlink it.
    ///
    /// Returns `Ok(true)` when the path was present and removed, `Ok(false)`
    /// when it was not in the active queue (a second call on the same path is
    /// a no-op), and `Err` only on a real unlink failure. The queue entry is
    /// dropped before the unlink so a vanished file still leaves cleanly.
    pub async fn delete(&self, path: &Path) -> io::Result<bool> {
        let view = self.window.view().await;
        let mut queues = self.queues.lock().await;
        if !queues.active_mut(view).remove(path) {
            return Ok(false);
        }
        drop(queues);

        match std::fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(true),
            Err(e) => Err(e),
        }
    }

    /// Screenshots in the queue for the current view, oldest first.
    pub async fn current(&self) -> Vec<PathBuf> {
        let view = self.window.view().await;
        self.queues.lock().await.active(view).paths()
    }

    pub async fn list_main(&self) -> Vec<PathBuf> {
        self.queues.lock().await.main.paths()
    }

    pub async fn list_extra(&self) -> Vec<PathBuf> {
        self.queues.lock().await.extra.paths()
    }

    /// Unlink everything in both queues, aggregating failures for the caller.
    pub async fn clear_all(&self) -> CleanupReport {
        let mut queues = self.queues.lock().await;
        let mut report = queues.main.clear();
        report.absorb(queues.extra.clear());
        if !report.is_clean() {
            warn!(failures = report.failures.len(), "queue cleanup left files behind");
        }
        report
    }
}

fn to_data_url(bytes: &[u8]) -> String {
    format!("data:image/png;base64,{}", BASE64.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    /// Writes a counter-stamped payload instead of invoking OS tooling.
    struct FakeGrabber {
        calls: AtomicU32,
    }

    impl FakeGrabber {
        fn new() -> Self {
            Self {
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Grabber for FakeGrabber {
        async fn grab(&self, dest: &Path) -> Result<(), CaptureError> {
            let n = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
            std::fs::write(dest, format!("capture-{n}"))?;
            Ok(())
        }
    }

    struct FailingGrabber;

    #[async_trait]
    impl Grabber for FailingGrabber {
        async fn grab(&self, _dest: &Path) -> Result<(), CaptureError> {
            Err(CaptureError::NoTool)
        }
    }

    fn manager_with(grabber: Arc<dyn Grabber>, tmp: &TempDir) -> (ScreenshotManager, Arc<WindowTracker>) {
        let broadcaster = Arc::new(EventBroadcaster::new());
        let window = Arc::new(WindowTracker::new(50, broadcaster.clone()));
        let capture = CaptureConfig {
            settle_delay_ms: 0,
            reshow_delay_ms: 0,
        };
        let mgr = ScreenshotManager::new(
            grabber,
            window.clone(),
            broadcaster,
            tmp.path().join("screenshots"),
            tmp.path().join("extra_screenshots"),
            &capture,
        )
        .unwrap();
        (mgr, window)
    }

    #[tokio::test]
    async fn three_captures_leave_second_and_third_on_disk_in_order() {
        let tmp = TempDir::new().unwrap();
        let (mgr, _window) = manager_with(Arc::new(FakeGrabber::new()), &tmp);

        let p1 = mgr.take_screenshot().await.unwrap();
        let p2 = mgr.take_screenshot().await.unwrap();
        let p3 = mgr.take_screenshot().await.unwrap();

        assert!(!p1.exists(), "oldest capture must be evicted and unlinked");
        assert!(p2.exists());
        assert!(p3.exists());
        assert_eq!(mgr.current().await, vec![p2.clone(), p3.clone()]);
        assert_eq!(std::fs::read(&p2).unwrap(), b"capture-2");
        assert_eq!(std::fs::read(&p3).unwrap(), b"capture-3");
    }

    #[tokio::test]
    async fn window_is_reshown_even_when_capture_fails() {
        let tmp = TempDir::new().unwrap();
        let (mgr, window) = manager_with(Arc::new(FailingGrabber), &tmp);

        assert!(window.state().await.visible);
        let err = mgr.take_screenshot().await.unwrap_err();
        assert!(matches!(err, CaptureError::NoTool));
        assert!(
            window.state().await.visible,
            "overlay must come back after a failed capture"
        );
        assert!(mgr.current().await.is_empty());
    }

    #[tokio::test]
    async fn debug_views_write_to_the_extra_queue() {
        let tmp = TempDir::new().unwrap();
        let (mgr, window) = manager_with(Arc::new(FakeGrabber::new()), &tmp);

        mgr.take_screenshot().await.unwrap();
        window.set_view(View::Solutions).await;
        let extra = mgr.take_screenshot().await.unwrap();

        assert_eq!(mgr.list_main().await.len(), 1);
        assert_eq!(mgr.list_extra().await, vec![extra]);
    }

    #[tokio::test]
    async fn delete_is_scoped_to_the_active_view_and_idempotent() {
        let tmp = TempDir::new().unwrap();
        let (mgr, window) = manager_with(Arc::new(FakeGrabber::new()), &tmp);

        let main_shot = mgr.take_screenshot().await.unwrap();
        window.set_view(View::Problem).await;
        let extra_shot = mgr.take_screenshot().await.unwrap();

        // Active queue is extra — the main-queue path is not deletable here.
        assert!(!mgr.delete(&main_shot).await.unwrap());
        assert!(main_shot.exists());

        assert!(mgr.delete(&extra_shot).await.unwrap());
        assert!(!extra_shot.exists());
        // Second call: gone from the queue, so success=false, no error.
        assert!(!mgr.delete(&extra_shot).await.unwrap());
    }

    #[tokio::test]
    async fn delete_tolerates_a_vanished_file() {
        let tmp = TempDir::new().unwrap();
        let (mgr, _window) = manager_with(Arc::new(FakeGrabber::new()), &tmp);

        let shot = mgr.take_screenshot().await.unwrap();
        std::fs::remove_file(&shot).unwrap();
        // Queue entry is dropped first; the missing file is not an error.
        assert!(mgr.delete(&shot).await.unwrap());
    }

    #[tokio::test]
    async fn clear_all_empties_both_queues() {
        let tmp = TempDir::new().unwrap();
        let (mgr, window) = manager_with(Arc::new(FakeGrabber::new()), &tmp);

        let a = mgr.take_screenshot().await.unwrap();
        window.set_view(View::Problem).await;
        let b = mgr.take_screenshot().await.unwrap();

        let report = mgr.clear_all().await;
        assert!(report.is_clean());
        assert_eq!(report.removed.len(), 2);
        assert!(!a.exists());
        assert!(!b.exists());
        assert!(mgr.list_main().await.is_empty());
        assert!(mgr.list_extra().await.is_empty());
    }

    #[tokio::test]
    async fn preview_returns_a_png_data_url() {
        let tmp = TempDir::new().unwrap();
        let (mgr, _window) = manager_with(Arc::new(FakeGrabber::new()), &tmp);

        let shot = mgr.take_screenshot().await.unwrap();
        let url = mgr.preview(&shot).await.unwrap();
        assert!(url.starts_with("data:image/png;base64,"));

        let missing = tmp.path().join("nope.png");
        assert!(mgr.preview(&missing).await.is_err());
    }

    /// Slow grabber that records whether the overlay was visible at the end
    /// of each grab.
    struct SlowGrabber {
        window: Arc<WindowTracker>,
        seen_visible: Arc<std::sync::Mutex<Vec<bool>>>,
    }

    #[async_trait]
    impl Grabber for SlowGrabber {
        async fn grab(&self, dest: &Path) -> Result<(), CaptureError> {
            tokio::time::sleep(Duration::from_millis(80)).await;
            let visible = self.window.state().await.visible;
            self.seen_visible.lock().unwrap().push(visible);
            std::fs::write(dest, b"slow-frame")?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn overlapping_captures_keep_the_overlay_hidden_during_each_grab() {
        let tmp = TempDir::new().unwrap();
        let broadcaster = Arc::new(EventBroadcaster::new());
        let window = Arc::new(WindowTracker::new(50, broadcaster.clone()));
        let seen_visible = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mgr = Arc::new(
            ScreenshotManager::new(
                Arc::new(SlowGrabber {
                    window: window.clone(),
                    seen_visible: seen_visible.clone(),
                }),
                window.clone(),
                broadcaster,
                tmp.path().join("screenshots"),
                tmp.path().join("extra_screenshots"),
                &CaptureConfig {
                    settle_delay_ms: 0,
                    reshow_delay_ms: 0,
                },
            )
            .unwrap(),
        );

        // Second capture arrives while the first grab is still in flight.
        let first = {
            let mgr = mgr.clone();
            tokio::spawn(async move { mgr.take_screenshot().await })
        };
        tokio::time::sleep(Duration::from_millis(40)).await;
        let second = {
            let mgr = mgr.clone();
            tokio::spawn(async move { mgr.take_screenshot().await })
        };

        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        let seen = seen_visible.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert!(
            seen.iter().all(|v| !v),
            "overlay must stay hidden while a grab is in flight: {seen:?}"
        );
        assert!(window.state().await.visible, "overlay comes back at the end");
    }

    #[tokio::test]
    async fn capture_broadcasts_screenshot_taken() {
        let tmp = TempDir::new().unwrap();
        let broadcaster = Arc::new(EventBroadcaster::new());
        let window = Arc::new(WindowTracker::new(50, broadcaster.clone()));
        let mgr = ScreenshotManager::new(
            Arc::new(FakeGrabber::new()),
            window,
            broadcaster.clone(),
            tmp.path().join("screenshots"),
            tmp.path().join("extra_screenshots"),
            &CaptureConfig {
                settle_delay_ms: 0,
                reshow_delay_ms: 0,
            },
        )
        .unwrap();

        let mut rx = broadcaster.subscribe();
        let path = mgr.take_screenshot().await.unwrap();

        // Skip the window.stateChanged frames from hide/show.
        loop {
            let raw = rx.recv().await.unwrap();
            let v: serde_json::Value = serde_json::from_str(&raw).unwrap();
            if v["method"] == "screenshot.taken" {
                assert_eq!(v["params"]["path"], path.to_str().unwrap());
                assert!(v["params"]["preview"]
                    .as_str()
                    .unwrap()
                    .starts_with("data:image/png;base64,"));
                break;
            }
        }
    }
}
