#![deny(missing_docs)]
//! In-memory implementation of the flow0 block capabilities.
//!
//! Two primitives cover the composition layer's needs. [`StageBlock`] is a
//! one-in, one-out processing stage: a `tokio::sync::mpsc` queue (bounded
//! or unbounded), one worker task, a filter-map closure, and ordered
//! predicate-gated links on the output side where the first accepting link
//! claims each item. [`SinkBlock`] is the terminal collector.
//!
//! Both resolve their completion signal exactly once: success when the
//! input is sealed and the queue drains, an original fault when the
//! processing closure errs, or whatever a forced fault or cancel injects.
//! The worker races its queue against its own completion signal, so a
//! forced fault stops processing promptly instead of draining what is
//! left.

use std::sync::{Mutex, MutexGuard};

mod sink;
mod stage;

pub use sink::SinkBlock;
pub use stage::{StageBlock, StageFn};

/// Poison-tolerant lock: a panicked holder does not wedge the block.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
