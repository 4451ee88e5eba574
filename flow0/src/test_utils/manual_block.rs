//! ManualBlock — a block whose completion is resolved by hand.

use crate::block::Block;
use crate::completion::{CompletionCell, CompletionHandle, Fault, Outcome};
use crate::error::BoxError;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A block with no queue and no worker. Tests resolve its completion
/// signal explicitly and set its buffered count directly, which makes
/// classification and aggregation paths deterministic to drive.
pub struct ManualBlock {
    name: String,
    cell: CompletionCell,
    buffered: AtomicUsize,
}

impl ManualBlock {
    /// Create a pending block.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            cell: CompletionCell::new(),
            buffered: AtomicUsize::new(0),
        })
    }

    /// Resolve the block as ran-to-completion.
    pub fn succeed(&self) -> bool {
        self.cell.resolve(Outcome::Success)
    }

    /// Resolve the block as faulted with an original cause.
    pub fn fail(&self, err: impl Into<BoxError>) -> bool {
        self.cell.resolve(Outcome::Faulted(Fault::original(err)))
    }

    /// Resolve the block as canceled.
    pub fn cancel(&self) -> bool {
        self.cell.resolve(Outcome::Canceled)
    }

    /// Set the value reported by [`Block::buffered_count`].
    pub fn set_buffered(&self, count: usize) {
        self.buffered.store(count, Ordering::Relaxed);
    }
}

impl Block for ManualBlock {
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
