// SPDX-License-Identifier: MIT
//! Overlay window state.
//!
//! The daemon is authoritative for position, size, visibility, and the active
//! view; the UI shell applies changes it receives via `window.stateChanged`
//! notifications and never mutates state on its own.

use crate::ipc::event::EventBroadcaster;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Which panel (and therefore which screenshot queue) is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    Queue,
    Problem,
    Solutions,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Left,
    Right,
    Up,
    Down,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowState {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
    pub visible: bool,
    pub view: View,
}

impl Default for WindowState {
    fn default() -> Self {
        Self {
            x: 0,
            y: 0,
            width: 600,
            height: 400,
            visible: true,
            view: View::Queue,
        }
    }
}

/// Mutex-guarded window state; every mutation is broadcast as
/// `window.stateChanged` so all connected shells stay in sync.
pub struct WindowTracker {
    state: Mutex<WindowState>,
    nudge_step: i32,
    broadcaster: Arc<EventBroadcaster>,
}

impl WindowTracker {
    pub fn new(nudge_step: i32, broadcaster: Arc<EventBroadcaster>) -> Self {
        Self {
            state: Mutex::new(WindowState::default()),
            nudge_step,
            broadcaster,
        }
    }

    pub async fn state(&self) -> WindowState {
        self.state.lock().await.clone()
    }

    pub async fn view(&self) -> View {
        self.state.lock().await.view
    }

    /// Flip visibility and return the new state.
    pub async fn toggle(&self) -> WindowState {
        let mut guard = self.state.lock().await;
        guard.visible = !guard.visible;
        let state = guard.clone();
        drop(guard);
        self.publish(&state);
        state
    }

    /// Hide the overlay (used around capture so the window is not in frame).
    pub async fn hide(&self) {
        let mut guard = self.state.lock().await;
        if !guard.visible {
            return;
        }
        guard.visible = false;
        let state = guard.clone();
        drop(guard);
        self.publish(&state);
    }

    pub async fn show(&self) {
        let mut guard = self.state.lock().await;
        if guard.visible {
            return;
        }
        guard.visible = true;
        let state = guard.clone();
        drop(guard);
        self.publish(&state);
    }

    /// Move the window one step in `direction`.
    pub async fn nudge(&self, direction: Direction) -> WindowState {
        let mut guard = self.state.lock().await;
        match direction {
            Direction::Left => guard.x -= self.nudge_step,
            Direction::Right => guard.x += self.nudge_step,
            Direction::Up => guard.y -= self.nudge_step,
            Direction::Down => guard.y += self.nudge_step,
        }
        let state = guard.clone();
        drop(guard);
        self.publish(&state);
        state
    }

    /// Record the shell's content measurements.
    pub async fn set_dimensions(&self, width: u32, height: u32) -> WindowState {
        let mut guard = self.state.lock().await;
        guard.width = width;
        guard.height = height;
        let state = guard.clone();
        drop(guard);
        self.publish(&state);
        state
    }

    pub async fn set_view(&self, view: View) -> WindowState {
        let mut guard = self.state.lock().await;
        guard.view = view;
        let state = guard.clone();
        drop(guard);
        self.publish(&state);
        state
    }

    fn publish(&self, state: &WindowState) {
        self.broadcaster.broadcast(
            "window.stateChanged",
            serde_json::to_value(state).unwrap_or_default(),
        );
    }
}
