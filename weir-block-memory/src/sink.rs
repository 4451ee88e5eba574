//! A terminal collecting block.

use crate::lock;
use async_trait::async_trait;
use flow0::{
    Block, BoxError, CompletionCell, CompletionHandle, Fault, InputPort, Outcome, PushError,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// An input-only block that retains every item it is handed, with an
/// optional per-item handler whose error faults the block.
///
/// Completion semantics match [`StageBlock`](crate::StageBlock): seal plus
/// drain resolves success, a handler error resolves an original fault, a
/// forced fault stops the worker immediately.
pub struct SinkBlock<T> {
    name: String,
    tx: Mutex<Option<mpsc::UnboundedSender<T>>>,
    cell: Arc<CompletionCell>,
    buffered: Arc<AtomicUsize>,
    collected: Arc<Mutex<Vec<T>>>,
}

impl<T: Send + 'static> SinkBlock<T> {
    /// Collect every item.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Self::build(name.into(), None)
    }

    /// Run `handler` on each item before retaining it. A handler error
    /// faults the block with that error as the original cause.
    pub fn with_handler(
        name: impl Into<String>,
        handler: impl Fn(&T) -> Result<(), BoxError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Self::build(name.into(), Some(Arc::new(handler)))
    }

    #[allow(clippy::type_complexity)]
    fn build(
        name: String,
        handler: Option<Arc<dyn Fn(&T) -> Result<(), BoxError> + Send + Sync>>,
    ) -> Arc<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<T>();
        let cell = Arc::new(CompletionCell::new());
        let buffered = Arc::new(AtomicUsize::new(0));
        let collected: Arc<Mutex<Vec<T>>> = Arc::new(Mutex::new(Vec::new()));

        {
            let name = name.clone();
            let cell = Arc::clone(&cell);
            let buffered = Arc::clone(&buffered);
            let collected = Arc::clone(&collected);
            tokio::spawn(async move {
                let signal = cell.handle();
                loop {
                    tokio::select! {
                        biased;
                        _ = signal.wait() => break,
                        next = rx.recv() => match next {
                            Some(item) => {
                                buffered.fetch_sub(1, Ordering::Relaxed);
                                if let Some(handler) = &handler {
                                    if let Err(err) = handler(&item) {
                                        tracing::warn!(block = %name, error = %err, "sink handler failed");
                                        cell.resolve(Outcome::Faulted(Fault::original(err)));
                                        break;
                                    }
                                }
                                lock(&collected).push(item);
                            }
                            None => {
                                cell.resolve(Outcome::Success);
                                break;
                            }
                        }
                    }
                }
            });
        }

        Arc::new(Self {
            name,
            tx: Mutex::new(Some(tx)),
            cell,
            buffered,
            collected,
        })
    }

    /// Resolve the block as canceled. A no-op once terminal.
    pub fn cancel(&self) {
        self.cell.resolve(Outcome::Canceled);
    }
}

impl<T: Clone> SinkBlock<T> {
    /// Snapshot of everything collected so far.
    pub fn collected(&self) -> Vec<T> {
        lock(&self.collected).clone()
    }
}

impl<T: Send + 'static> Block for SinkBlock<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn completion(&self) -> CompletionHandle {
        self.cell.handle()
    }

    fn buffered_count(&self) -> usize {
        self.buffered.load(Ordering::Relaxed)
    }

    fn fault(&self, cause: Fault) {
        self.cell.resolve(Outcome::Faulted(cause));
    }
}

#[async_trait]
impl<T: Send + 'static> InputPort<T> for SinkBlock<T> {
    async fn push(&self, item: T) -> Result<(), PushError> {
        let tx = lock(&self.tx).clone();
        let Some(tx) = tx else {
            return Err(PushError::Closed);
        };
        self.buffered.fetch_add(1, Ordering::Relaxed);
        if tx.send(item).is_ok() {
            Ok(())
        } else {
            self.buffered.fetch_sub(1, Ordering::Relaxed);
            Err(PushError::Closed)
        }
    }

    fn complete(&self) {
        lock(&self.tx).take();
    }
}
