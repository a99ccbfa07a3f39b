// SPDX-License-Identifier: MIT
// OperationSlot — the single concurrency primitive of the pipeline.
//
// At most one processing operation runs at a time; starting a new one aborts
// and replaces whatever is in flight (last-writer-wins). There is no queueing
// and no backpressure.

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Default)]
pub struct OperationSlot {
    current: Mutex<Option<JoinHandle<()>>>,
}

impl OperationSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort the current operation, then install the handle produced by
    /// `spawn` — all under the slot's lock, so the predecessor is aborted
    /// before the replacement task exists.
    pub async fn replace_with(&self, spawn: impl FnOnce() -> JoinHandle<()>) {
        let mut guard = self.current.lock().await;
        if let Some(old) = guard.take() {
            if !old.is_finished() {
                debug!("superseding in-flight operation");
            }
            old.abort();
        }
        *guard = Some(spawn());
    }

    /// Abort the current operation. Idempotent; a no-op when idle.
    pub async fn cancel(&self) {
        if let Some(handle) = self.current.lock().await.take() {
            handle.abort();
        }
    }

    pub async fn is_busy(&self) -> bool {
        self.current
            .lock()
            .await
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn cancel_is_idempotent_and_safe_when_idle() {
        let slot = OperationSlot::new();
        slot.cancel().await;
        slot.cancel().await;
        assert!(!slot.is_busy().await);
    }

    #[tokio::test]
    async fn replace_aborts_the_previous_operation() {
        let slot = OperationSlot::new();
        let finished = Arc::new(AtomicBool::new(false));

        let f = finished.clone();
        slot.replace_with(|| {
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                f.store(true, Ordering::Relaxed);
            })
        })
        .await;
        assert!(slot.is_busy().await);

        slot.replace_with(|| tokio::spawn(async {})).await;
        // The first task was aborted mid-sleep and never ran to completion.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!finished.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn cancel_aborts_in_flight_work() {
        let slot = OperationSlot::new();
        slot.replace_with(|| {
            tokio::spawn(async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            })
        })
        .await;
        assert!(slot.is_busy().await);
        slot.cancel().await;
        assert!(!slot.is_busy().await);
        // Second cancel after the abort is still fine.
        slot.cancel().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_replacements_leave_exactly_one_operation() {
        let slot = Arc::new(OperationSlot::new());

        let mut joins = Vec::new();
        for _ in 0..8 {
            let slot = slot.clone();
            joins.push(tokio::spawn(async move {
                slot.replace_with(|| tokio::spawn(std::future::pending::<()>()))
                    .await;
            }));
        }
        for j in joins {
            j.await.unwrap();
        }

        // Every loser was aborted inside the lock; only the last install runs.
        assert!(slot.is_busy().await);
        slot.cancel().await;
        assert!(!slot.is_busy().await);
    }
}
