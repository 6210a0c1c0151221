//! Fire-and-forget task primitive (C0d)
//!
//! Background work (extraction, categorization, description-embedding
//! persistence, access-log writes) is spawned without being awaited by
//! the caller. The orchestrator holds the last handle and drains it
//! under a capped timeout before starting the next write (spec.md
//! §4.7, §9 "fire-and-forget background work").

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;

/// A handle to a spawned background task. Dropping it without calling
/// [`BackgroundTask::drain`] simply lets the task run to completion
/// detached — fire-and-forget tasks are never cancelled when their
/// parent request ends (spec.md §5).
pub struct BackgroundTask {
    handle: JoinHandle<()>,
}

impl BackgroundTask {
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self { handle: tokio::spawn(future) }
    }

    /// Await completion with a capped timeout. Returns `true` if the
    /// task finished within the cap, `false` on timeout (the task
    /// keeps running detached; liveness beats complete drain).
    pub async fn drain(self, timeout: Duration) -> bool {
        match tokio::time::timeout(timeout, self.handle).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "background task panicked");
                true
            }
            Err(_) => {
                tracing::debug!("background task drain timed out, continuing");
                false
            }
        }
    }
}
