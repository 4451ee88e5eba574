//! Discard accounting for items no link claimed.

use crate::lock;
use async_trait::async_trait;
use flow0::{Block, CompletionCell, CompletionHandle, Fault, InputPort, Outcome, PushError};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

/// Per-type discard counters, mutated only by the discard-sink path.
///
/// Like [`NameRegistry`](crate::NameRegistry), this is an explicit
/// process-lifetime service: the shared instance lives behind
/// [`GarbageRecorder::global`] and tests can inspect or reset it.
pub struct GarbageRecorder {
    counts: Mutex<HashMap<String, u64>>,
}

impl GarbageRecorder {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self {
            counts: Mutex::new(HashMap::new()),
        }
    }

    /// The process-wide recorder.
    pub fn global() -> &'static GarbageRecorder {
        static GLOBAL: OnceLock<GarbageRecorder> = OnceLock::new();
        GLOBAL.get_or_init(GarbageRecorder::new)
    }

    /// Count one discarded item under `type_name`.
    pub fn record(&self, type_name: &str) {
        *lock(&self.counts).entry(type_name.to_string()).or_insert(0) += 1;
    }

    /// Discards recorded under `type_name` so far.
    pub fn count(&self, type_name: &str) -> u64 {
        lock(&self.counts).get(type_name).copied().unwrap_or(0)
    }

    /// Snapshot of every counter.
    pub fn snapshot(&self) -> HashMap<String, u64> {
        lock(&self.counts).clone()
    }

    /// Forget every counter.
    pub fn reset(&self) {
        lock(&self.counts).clear();
    }
}

impl Default for GarbageRecorder {
    fn default() -> Self {
        Self::new()
    }
}

/// The discard sink: an input port that records each item in the global
/// [`GarbageRecorder`] and drops it.
pub struct NullSink<T> {
    name: String,
    classify: Box<dyn Fn(&T) -> &'static str + Send + Sync>,
    cell: CompletionCell,
}

impl<T: Send + 'static> NullSink<T> {
    /// Create a sink classifying items with `classify` (usually the item
    /// type's name).
    pub fn new(
        name: impl Into<String>,
        classify: impl Fn(&T) -> &'static str + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            classify: Box::new(classify),
            cell: CompletionCell::new(),
        })
    }
}

impl<T: Send + 'static> Block for NullSink<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn completion(&self) -> CompletionHandle {
        self.cell.handle()
    }

    fn buffered_count(&self) -> usize {
        0
    }

    fn fault(&self, cause: Fault) {
        self.cell.resolve(Outcome::Faulted(cause));
    }
}

#[async_trait]
impl<T: Send + 'static> InputPort<T> for NullSink<T> {
    async fn push(&self, item: T) -> Result<(), PushError> {
        let kind = (self.classify)(&item);
        GarbageRecorder::global().record(kind);
        tracing::trace!(sink = %self.name, kind, "discarded item");
        Ok(())
    }

    fn complete(&self) {
        self.cell.resolve(Outcome::Success);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_resets() {
        let recorder = GarbageRecorder::new();
        recorder.record("Widget");
        recorder.record("Widget");
        recorder.record("Gadget");
        assert_eq!(recorder.count("Widget"), 2);
        assert_eq!(recorder.count("Gadget"), 1);
        assert_eq!(recorder.snapshot().len(), 2);
        recorder.reset();
        assert_eq!(recorder.count("Widget"), 0);
    }
}
