// SPDX-License-Identifier: MIT
//! Screenshot capture: bounded queues, OS capture subprocesses, and the
//! manager that ties them to the overlay window.

pub mod grabber;
pub mod manager;
pub mod queue;

pub use grabber::{detect_capture_tool, CaptureError, Grabber, OsGrabber};
pub use manager::ScreenshotManager;
pub use queue::{CleanupReport, ScreenshotQueue, MAX_QUEUE_LEN};
