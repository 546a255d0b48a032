//! Concurrent execution of independent runs.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{watch, Semaphore};
use tracing::{info, warn};

use crate::error::{RunError, RunResult};
use crate::pipeline::{RemixPipeline, RunReport, RunRequest};

/// Runs many remixes at once, at most `max_concurrent_runs` at a time.
///
/// Every run goes through the same [`RemixPipeline`], so runs share one
/// credential pool per external service.
pub struct BatchExecutor {
    pipeline: Arc<RemixPipeline>,
    run_semaphore: Arc<Semaphore>,
    cancel_rx: watch::Receiver<bool>,
    shutdown_timeout: Duration,
}

impl BatchExecutor {
    pub fn new(
        pipeline: RemixPipeline,
        max_concurrent_runs: usize,
        cancel_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            run_semaphore: Arc::new(Semaphore::new(max_concurrent_runs.max(1))),
            cancel_rx,
            shutdown_timeout: Duration::from_secs(30),
        }
    }

    /// How long in-flight runs may keep going after cancellation before
    /// they are aborted.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Execute `requests` and return one result per request, in order.
    pub async fn run_all(&self, requests: Vec<RunRequest>) -> Vec<RunResult<RunReport>> {
        info!(
            runs = requests.len(),
            max_concurrent = self.run_semaphore.available_permits(),
            "Starting batch"
        );

        let handles: Vec<_> = requests
            .into_iter()
            .map(|request| {
                let pipeline = Arc::clone(&self.pipeline);
                let semaphore = Arc::clone(&self.run_semaphore);
                let cancel_rx = self.cancel_rx.clone();
                tokio::spawn(async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .map_err(|_| RunError::Cancelled)?;
                    pipeline.run(&request, cancel_rx).await
                })
            })
            .collect();
        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();

        let joined = join_all(handles);
        tokio::pin!(joined);

        let mut cancel_rx = self.cancel_rx.clone();
        let cancelled = async move {
            if cancel_rx.wait_for(|cancelled| *cancelled).await.is_err() {
                std::future::pending::<()>().await;
            }
        };

        let results = tokio::select! {
            results = &mut joined => results,
            _ = cancelled => {
                info!(
                    timeout_secs = self.shutdown_timeout.as_secs(),
                    "Cancellation requested, waiting for in-flight runs"
                );
                match tokio::time::timeout(self.shutdown_timeout, &mut joined).await {
                    Ok(results) => results,
                    Err(_) => {
                        warn!("Shutdown timeout reached, aborting remaining runs");
                        aborts.iter().for_each(|a| a.abort());
                        joined.await
                    }
                }
            }
        };

        results
            .into_iter()
            .map(|joined| match joined {
                Ok(result) => result,
                Err(e) if e.is_cancelled() => Err(RunError::Cancelled),
                Err(e) => Err(RunError::TaskFailed(e.to_string())),
            })
            .collect()
    }
}
