//! Best-effort buffered-count monitoring.

use crate::config::MonitorMode;
use crate::container::{Container, ContainerInner};
use crate::error::ComposeError;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
pub use tokio_util::sync::CancellationToken;

/// Errors surfaced by the monitor loop. Monitor failures never touch the
/// container's own fault state; they are reported here and end the loop.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum MonitorError {
    /// A buffered-count probe failed inside the loop.
    #[error("count probe failed: {0}")]
    Probe(#[from] ComposeError),
}

/// A running monitor loop.
///
/// The loop sleeps for the configured interval, then logs the container
/// total and per-block buffered counts, depending on which monitors the
/// configuration enables and on the quiet/verbose mode. It runs until the
/// cancellation token fires or a probe fails.
pub struct PerformanceMonitor {
    token: CancellationToken,
    errors: mpsc::UnboundedReceiver<MonitorError>,
    task: JoinHandle<()>,
}

impl PerformanceMonitor {
    /// Request the loop to stop at its next suspension point.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Receive the next monitor error. Resolves `None` once the loop has
    /// exited without (further) errors.
    pub async fn next_error(&mut self) -> Option<MonitorError> {
        self.errors.recv().await
    }

    /// True once the loop task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the loop task to exit.
    pub async fn join(self) {
        let _ = self.task.await;
    }
}

impl<I, O> Container<I, O> {
    /// Start the performance monitor loop for this container.
    ///
    /// The token is the loop's only stop signal besides a probe failure;
    /// the loop does not end just because the container completed.
    pub fn spawn_monitor(&self, token: CancellationToken) -> PerformanceMonitor {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(monitor_loop(
            Arc::clone(&self.inner),
            token.clone(),
            tx,
        ));
        PerformanceMonitor {
            token,
            errors: rx,
            task,
        }
    }
}

async fn monitor_loop(
    inner: Arc<ContainerInner>,
    token: CancellationToken,
    errors: mpsc::UnboundedSender<MonitorError>,
) {
    let interval = inner.config().monitor_interval.to_std();
    let verbose = inner.config().monitor_mode == MonitorMode::Verbose;
    let container_level = inner.config().container_monitor_enabled;
    let block_level = inner.config().block_monitor_enabled;

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }

        if container_level {
            match inner.total_buffered() {
                Ok(total) if total > 0 || verbose => {
                    tracing::info!(
                        container = %inner.name(),
                        buffered = total,
                        "container buffer level"
                    );
                }
                Ok(_) => {}
                Err(err) => {
                    let _ = errors.send(MonitorError::Probe(err));
                    return;
                }
            }
        }

        if block_level {
            for entry in inner.entries() {
                match entry.buffered() {
                    Ok(count) if count > 0 || verbose => {
                        tracing::info!(
                            container = %inner.name(),
                            block = %entry.block().name(),
                            buffered = count,
                            "block buffer level"
                        );
                    }
                    Ok(_) => {}
                    Err(err) => {
                        let _ = errors.send(MonitorError::Probe(err));
                        return;
                    }
                }
            }
        }
    }
}
