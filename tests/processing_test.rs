//! Pipeline tests: drive a real Processor with a scripted chat transport and
//! assert the broadcast event sequence and view transitions.

use async_trait::async_trait;
use glimpsed::capture::{CaptureError, Grabber, ScreenshotManager};
use glimpsed::config::{AiConfig, CaptureConfig, RetryConfig};
use glimpsed::ipc::event::EventBroadcaster;
use glimpsed::llm::{ChatRequest, ChatTransport, LlmError};
use glimpsed::processing::Processor;
use glimpsed::window::{View, WindowTracker};
use serde_json::Value;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;

struct FakeGrabber;

#[async_trait]
impl Grabber for FakeGrabber {
    async fn grab(&self, dest: &Path) -> Result<(), CaptureError> {
        std::fs::write(dest, b"\x89PNG\r\n\x1a\nframe")?;
        Ok(())
    }
}

/// Replays a fixed sequence of replies, one per `complete` call.
struct ScriptedTransport {
    replies: tokio::sync::Mutex<VecDeque<Result<String, LlmError>>>,
}

impl ScriptedTransport {
    fn new(replies: Vec<Result<String, LlmError>>) -> Self {
        Self {
            replies: tokio::sync::Mutex::new(replies.into()),
        }
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn complete(
        &self,
        _config: &AiConfig,
        _request: &ChatRequest,
        _deadline: Duration,
    ) -> Result<String, LlmError> {
        self.replies
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::Http("script exhausted".to_string())))
    }
}

struct Rig {
    processor: Arc<Processor>,
    screenshots: Arc<ScreenshotManager>,
    window: Arc<WindowTracker>,
    broadcaster: Arc<EventBroadcaster>,
    _tmp: TempDir,
}

fn rig(replies: Vec<Result<String, LlmError>>) -> Rig {
    let tmp = TempDir::new().unwrap();
    let broadcaster = Arc::new(EventBroadcaster::new());
    let window = Arc::new(WindowTracker::new(50, broadcaster.clone()));
    let screenshots = Arc::new(
        ScreenshotManager::new(
            Arc::new(FakeGrabber),
            window.clone(),
            broadcaster.clone(),
            tmp.path().join("screenshots"),
            tmp.path().join("extra_screenshots"),
            &CaptureConfig {
                settle_delay_ms: 0,
                reshow_delay_ms: 0,
            },
        )
        .unwrap(),
    );
    let ai = Arc::new(tokio::sync::RwLock::new(AiConfig::default()));
    let processor = Arc::new(Processor::new(
        Arc::new(ScriptedTransport::new(replies)),
        screenshots.clone(),
        window.clone(),
        broadcaster.clone(),
        ai,
        RetryConfig::instant(),
    ));
    Rig {
        processor,
        screenshots,
        window,
        broadcaster,
        _tmp: tmp,
    }
}

/// Collect `processing.*` notifications until `last` arrives (5s budget).
async fn collect_until(rx: &mut broadcast::Receiver<String>, last: &str) -> Vec<(String, Value)> {
    let mut seen = Vec::new();
    loop {
        let raw = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap_or_else(|_| panic!("timed out before {last}; saw {seen:?}"))
            .unwrap();
        let v: Value = serde_json::from_str(&raw).unwrap();
        let method = v["method"].as_str().unwrap_or_default().to_string();
        if !method.starts_with("processing.") {
            continue;
        }
        let params = v["params"].clone();
        let done = method == last;
        seen.push((method, params));
        if done {
            return seen;
        }
    }
}

const PROBLEM_JSON: &str = r#"{"title":"Two Sum","description":"Find the pair.","difficulty":"easy"}"#;
const SOLUTION_JSON: &str =
    r#"{"approach":"hash map","complexity":{"time":"O(n)","space":"O(n)"},"code":"fn solve() {}","walkthrough":"one pass"}"#;
const DEBUG_JSON: &str = r#"{"issue":"off by one","fix":"use <=","explanation":"loop bound"}"#;

#[tokio::test]
async fn initial_flow_extracts_then_solves_and_advances_the_view() {
    let r = rig(vec![
        Ok(PROBLEM_JSON.to_string()),
        Ok(SOLUTION_JSON.to_string()),
    ]);
    r.screenshots.take_screenshot().await.unwrap();
    let mut rx = r.broadcaster.subscribe();

    assert!(r.processor.process().await);
    let events = collect_until(&mut rx, "processing.solutionSuccess").await;

    let methods: Vec<&str> = events.iter().map(|(m, _)| m.as_str()).collect();
    assert_eq!(
        methods,
        vec![
            "processing.initialStart",
            "processing.problemExtracted",
            "processing.solutionSuccess",
        ]
    );

    let (_, problem) = &events[1];
    assert_eq!(problem["structured"], true);
    assert_eq!(problem["problem"]["title"], "Two Sum");

    let (_, solution) = &events[2];
    assert_eq!(solution["structured"], true);
    assert_eq!(solution["solution"]["code"], "fn solve() {}");
    assert_eq!(solution["solution"]["complexity"]["time"], "O(n)");

    assert_eq!(r.window.view().await, View::Solutions);
    assert_eq!(
        r.processor.current_problem().await.unwrap().title,
        "Two Sum"
    );
}

#[tokio::test]
async fn fenced_reply_still_counts_as_structured() {
    let fenced = format!("```json\n{PROBLEM_JSON}\n```");
    let r = rig(vec![Ok(fenced), Ok(SOLUTION_JSON.to_string())]);
    r.screenshots.take_screenshot().await.unwrap();
    let mut rx = r.broadcaster.subscribe();

    assert!(r.processor.process().await);
    let events = collect_until(&mut rx, "processing.solutionSuccess").await;
    let (_, problem) = &events[1];
    assert_eq!(problem["structured"], true);
    assert_eq!(problem["problem"]["title"], "Two Sum");
}

#[tokio::test]
async fn prose_solution_reply_falls_back_to_raw_code() {
    let prose = "Sure! Just use a hash map and you're done.";
    let r = rig(vec![
        Ok(PROBLEM_JSON.to_string()),
        Ok(prose.to_string()),
    ]);
    r.screenshots.take_screenshot().await.unwrap();
    let mut rx = r.broadcaster.subscribe();

    assert!(r.processor.process().await);
    let events = collect_until(&mut rx, "processing.solutionSuccess").await;

    let (_, solution) = &events[2];
    assert_eq!(solution["structured"], false);
    // The reply is preserved verbatim, not discarded.
    assert_eq!(solution["solution"]["code"], prose);
}

#[tokio::test]
async fn unparseable_extraction_uses_the_retry_placeholder() {
    let r = rig(vec![
        Ok("I could not read the screenshot, sorry.".to_string()),
        Ok(SOLUTION_JSON.to_string()),
    ]);
    r.screenshots.take_screenshot().await.unwrap();
    let mut rx = r.broadcaster.subscribe();

    assert!(r.processor.process().await);
    let events = collect_until(&mut rx, "processing.solutionSuccess").await;
    let (_, problem) = &events[1];
    assert_eq!(problem["structured"], false);
    assert_eq!(problem["problem"]["title"], "Extraction failed");
}

#[tokio::test]
async fn transport_failure_surfaces_as_initial_solution_error() {
    // RetryConfig::instant allows 4 attempts; fail them all.
    let r = rig(vec![
        Err(LlmError::Http("connection refused".to_string())),
        Err(LlmError::Http("connection refused".to_string())),
        Err(LlmError::Http("connection refused".to_string())),
        Err(LlmError::Http("connection refused".to_string())),
    ]);
    r.screenshots.take_screenshot().await.unwrap();
    let mut rx = r.broadcaster.subscribe();

    assert!(r.processor.process().await);
    let events = collect_until(&mut rx, "processing.initialSolutionError").await;
    let (_, err) = events.last().unwrap();
    assert!(err["error"]
        .as_str()
        .unwrap()
        .contains("AI_UNAVAILABLE"));
    // The view stays on the queue for a retry.
    assert_eq!(r.window.view().await, View::Queue);
}

#[tokio::test]
async fn empty_queue_broadcasts_no_screenshots() {
    let r = rig(vec![]);
    let mut rx = r.broadcaster.subscribe();

    assert!(!r.processor.process().await);
    let events = collect_until(&mut rx, "processing.noScreenshots").await;
    assert_eq!(events.len(), 1);
}

#[tokio::test]
async fn debug_runs_on_the_extra_queue_with_problem_context() {
    let r = rig(vec![
        Ok(PROBLEM_JSON.to_string()),
        Ok(SOLUTION_JSON.to_string()),
        Ok(DEBUG_JSON.to_string()),
    ]);
    r.screenshots.take_screenshot().await.unwrap();
    let mut rx = r.broadcaster.subscribe();

    // First run: queue view → problem + solution.
    assert!(r.processor.process().await);
    collect_until(&mut rx, "processing.solutionSuccess").await;
    assert_eq!(r.window.view().await, View::Solutions);

    // Second run: solutions view → debug over the extra queue.
    r.screenshots.take_screenshot().await.unwrap();
    assert!(r.processor.process().await);
    let events = collect_until(&mut rx, "processing.debugSuccess").await;

    let methods: Vec<&str> = events.iter().map(|(m, _)| m.as_str()).collect();
    assert_eq!(
        methods,
        vec!["processing.debugStart", "processing.debugSuccess"]
    );
    let (_, debug) = events.last().unwrap();
    assert_eq!(debug["structured"], true);
    assert_eq!(debug["debug"]["issue"], "off by one");
}

#[tokio::test]
async fn prose_debug_reply_falls_back_to_raw_fix() {
    let prose = "Your loop stops one short; bump the bound and it passes.";
    let r = rig(vec![
        Ok(PROBLEM_JSON.to_string()),
        Ok(SOLUTION_JSON.to_string()),
        Ok(prose.to_string()),
    ]);
    r.screenshots.take_screenshot().await.unwrap();
    let mut rx = r.broadcaster.subscribe();

    assert!(r.processor.process().await);
    collect_until(&mut rx, "processing.solutionSuccess").await;
    assert_eq!(r.window.view().await, View::Solutions);

    r.screenshots.take_screenshot().await.unwrap();
    assert!(r.processor.process().await);
    let events = collect_until(&mut rx, "processing.debugSuccess").await;

    let (_, debug) = events.last().unwrap();
    assert_eq!(debug["structured"], false);
    // The unparsed reply lands verbatim in the fix field.
    assert_eq!(debug["debug"]["fix"], prose);
}

#[tokio::test]
async fn cancel_is_idempotent_and_reset_forgets_the_problem() {
    let r = rig(vec![
        Ok(PROBLEM_JSON.to_string()),
        Ok(SOLUTION_JSON.to_string()),
    ]);
    r.screenshots.take_screenshot().await.unwrap();
    let mut rx = r.broadcaster.subscribe();

    assert!(r.processor.process().await);
    collect_until(&mut rx, "processing.solutionSuccess").await;
    assert!(r.processor.current_problem().await.is_some());

    // Cancel with nothing in flight is a no-op, twice over.
    r.processor.cancel_all().await;
    r.processor.cancel_all().await;
    assert!(!r.processor.is_busy().await);

    r.processor.reset().await;
    assert!(r.processor.current_problem().await.is_none());
}

#[tokio::test]
async fn a_second_run_supersedes_a_stalled_one() {
    struct StallThenReply {
        first: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl ChatTransport for StallThenReply {
        async fn complete(
            &self,
            _config: &AiConfig,
            _request: &ChatRequest,
            _deadline: Duration,
        ) -> Result<String, LlmError> {
            if self.first.swap(false, std::sync::atomic::Ordering::SeqCst) {
                // First call hangs until aborted.
                std::future::pending::<()>().await;
                unreachable!();
            }
            Ok(PROBLEM_JSON.to_string())
        }
    }

    let tmp = TempDir::new().unwrap();
    let broadcaster = Arc::new(EventBroadcaster::new());
    let window = Arc::new(WindowTracker::new(50, broadcaster.clone()));
    let screenshots = Arc::new(
        ScreenshotManager::new(
            Arc::new(FakeGrabber),
            window.clone(),
            broadcaster.clone(),
            tmp.path().join("screenshots"),
            tmp.path().join("extra_screenshots"),
            &CaptureConfig {
                settle_delay_ms: 0,
                reshow_delay_ms: 0,
            },
        )
        .unwrap(),
    );
    let processor = Arc::new(Processor::new(
        Arc::new(StallThenReply {
            first: std::sync::atomic::AtomicBool::new(true),
        }),
        screenshots.clone(),
        window.clone(),
        broadcaster.clone(),
        Arc::new(tokio::sync::RwLock::new(AiConfig::default())),
        // One attempt, generous deadline: the stall is broken by supersession,
        // not by a timeout.
        RetryConfig {
            max_retries: 0,
            initial_timeout_secs: 60,
            max_timeout_secs: 60,
            backoff_ms: 1,
        },
    ));

    screenshots.take_screenshot().await.unwrap();
    assert!(processor.process().await);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(processor.is_busy().await);

    let mut rx = broadcaster.subscribe();
    assert!(processor.process().await);
    let events = collect_until(&mut rx, "processing.problemExtracted").await;
    let (_, problem) = events.last().unwrap();
    assert_eq!(problem["problem"]["title"], "Two Sum");
}
