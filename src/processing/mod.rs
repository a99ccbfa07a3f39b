// SPDX-License-Identifier: MIT
//! The screenshot → model → view-model pipeline.
//!
//! Behavior is keyed by the active view: Queue view runs extraction followed
//! by solution generation; Problem/Solutions views run debug analysis over
//! the extra queue. Stage transitions are broadcast as `processing.*`
//! notifications, and at most one operation is in flight at a time
//! ([`slot::OperationSlot`], cancel-replace).

pub mod model;
pub mod parse;
pub mod prompts;
pub mod slot;

pub use model::{events, DebugResult, ProblemInfo, Solution};
pub use parse::{parse_model_json, ModelOutput};

use crate::capture::ScreenshotManager;
use crate::config::{AiConfig, RetryConfig};
use crate::ipc::event::EventBroadcaster;
use crate::llm::{complete_with_retry, ChatTransport};
use crate::window::{View, WindowTracker};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::json;
use slot::OperationSlot;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

pub struct Processor {
    transport: Arc<dyn ChatTransport>,
    screenshots: Arc<ScreenshotManager>,
    window: Arc<WindowTracker>,
    broadcaster: Arc<EventBroadcaster>,
    ai: Arc<RwLock<AiConfig>>,
    retry: RetryConfig,
    slot: OperationSlot,
    /// Most recently extracted problem; context for solution and debug calls.
    problem: Mutex<Option<ProblemInfo>>,
}

impl Processor {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        screenshots: Arc<ScreenshotManager>,
        window: Arc<WindowTracker>,
        broadcaster: Arc<EventBroadcaster>,
        ai: Arc<RwLock<AiConfig>>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            transport,
            screenshots,
            window,
            broadcaster,
            ai,
            retry,
            slot: OperationSlot::new(),
            problem: Mutex::new(None),
        }
    }

    /// Kick off processing for the current view.
    ///
    /// Returns `false` (after broadcasting `processing.noScreenshots`) when
    /// the active queue is empty; otherwise the pipeline is spawned into the
    /// operation slot, superseding any in-flight run, and `true` is returned
    /// immediately.
    pub async fn process(self: &Arc<Self>) -> bool {
        let view = self.window.view().await;
        let shots = self.screenshots.current().await;
        if shots.is_empty() {
            self.broadcaster.broadcast(events::NO_SCREENSHOTS, json!({}));
            return false;
        }

        // The slot aborts any in-flight run before this task is spawned, so
        // two pipelines never emit events side by side.
        let this = self.clone();
        self.slot
            .replace_with(|| {
                tokio::spawn(async move {
                    match view {
                        View::Queue => this.run_initial(shots).await,
                        View::Problem | View::Solutions => this.run_debug(shots).await,
                    }
                })
            })
            .await;
        true
    }

    /// Abort the in-flight operation, if any. Idempotent.
    pub async fn cancel_all(&self) {
        self.slot.cancel().await;
    }

    pub async fn is_busy(&self) -> bool {
        self.slot.is_busy().await
    }

    /// Cancel and forget the extracted problem (part of `app.reset`).
    pub async fn reset(&self) {
        self.cancel_all().await;
        *self.problem.lock().await = None;
    }

    pub async fn current_problem(&self) -> Option<ProblemInfo> {
        self.problem.lock().await.clone()
    }

    // ─── Pipeline stages ─────────────────────────────────────────────────────

    async fn run_initial(&self, shots: Vec<PathBuf>) {
        self.broadcaster
            .broadcast(events::INITIAL_START, json!({ "screenshots": shots.len() }));

        let images = match read_images(&shots).await {
            Ok(i) => i,
            Err(e) => {
                warn!(err = %e, "failed to read queued screenshots");
                self.fail(events::INITIAL_SOLUTION_ERROR, &e.to_string());
                return;
            }
        };

        let config = self.ai.read().await.clone();

        // Stage 1: extract the problem statement.
        let reply = match complete_with_retry(
            self.transport.as_ref(),
            &config,
            &self.retry,
            &prompts::extraction_request(images),
        )
        .await
        {
            Ok(text) => text,
            Err(e) => {
                self.fail(events::INITIAL_SOLUTION_ERROR, &e.to_string());
                return;
            }
        };

        let out = parse_model_json::<ProblemInfo>(&reply);
        let structured = out.is_structured();
        if !structured {
            warn!("problem extraction reply was not structured — using placeholder");
        }
        let problem = out.unwrap_or_else_raw(|_| ProblemInfo::retry_placeholder());

        *self.problem.lock().await = Some(problem.clone());
        self.broadcaster.broadcast(
            events::PROBLEM_EXTRACTED,
            json!({ "problem": problem, "structured": structured }),
        );
        self.window.set_view(View::Problem).await;

        // Stage 2: generate a solution for it.
        let reply = match complete_with_retry(
            self.transport.as_ref(),
            &config,
            &self.retry,
            &prompts::solution_request(&problem),
        )
        .await
        {
            Ok(text) => text,
            Err(e) => {
                self.fail(events::INITIAL_SOLUTION_ERROR, &e.to_string());
                return;
            }
        };

        let out = parse_model_json::<Solution>(&reply);
        let structured = out.is_structured();
        let solution = out.unwrap_or_else_raw(Solution::from_raw);

        info!(structured, "solution ready");
        self.broadcaster.broadcast(
            events::SOLUTION_SUCCESS,
            json!({ "solution": solution, "structured": structured }),
        );
        self.window.set_view(View::Solutions).await;
    }

    async fn run_debug(&self, shots: Vec<PathBuf>) {
        self.broadcaster
            .broadcast(events::DEBUG_START, json!({ "screenshots": shots.len() }));

        let images = match read_images(&shots).await {
            Ok(i) => i,
            Err(e) => {
                warn!(err = %e, "failed to read extra screenshots");
                self.fail(events::DEBUG_ERROR, &e.to_string());
                return;
            }
        };

        let config = self.ai.read().await.clone();
        let problem = self.problem.lock().await.clone();

        let reply = match complete_with_retry(
            self.transport.as_ref(),
            &config,
            &self.retry,
            &prompts::debug_request(problem.as_ref(), images),
        )
        .await
        {
            Ok(text) => text,
            Err(e) => {
                self.fail(events::DEBUG_ERROR, &e.to_string());
                return;
            }
        };

        let out = parse_model_json::<DebugResult>(&reply);
        let structured = out.is_structured();
        let debug = out.unwrap_or_else_raw(DebugResult::from_raw);

        info!(structured, "debug analysis ready");
        self.broadcaster.broadcast(
            events::DEBUG_SUCCESS,
            json!({ "debug": debug, "structured": structured }),
        );
    }

    fn fail(&self, event: &str, error: &str) {
        self.broadcaster.broadcast(event, json!({ "error": error }));
    }
}

/// Read each screenshot into base64 (no data-URL prefix; the transport adds
/// whatever wrapping the provider needs).
async fn read_images(paths: &[PathBuf]) -> std::io::Result<Vec<String>> {
    let mut out = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = tokio::fs::read(path).await?;
        out.push(BASE64.encode(bytes));
    }
    Ok(out)
}
