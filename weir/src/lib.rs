#![deny(missing_docs)]
//! # weir — container composition for asynchronous block pipelines
//!
//! A container groups one or more blocks (the [`flow0`] processing
//! primitives) into a single logical component with one name and one
//! aggregate completion signal, and links containers into larger pipelines
//! while preserving failure isolation and backpressure.
//!
//! The hard part this crate owns is distributed-failure semantics with no
//! central coordinator: a fault anywhere stops exactly the right set of
//! still-running peers, exactly once, without being mistaken for a second
//! independent root cause, and without deadlocking the aggregate signal.
//! The mechanism is the `Original` / `Propagated` fault tag from `flow0`:
//! a genuine cause force-faults the container's whole fault domain with a
//! propagated marker, and the markers are classified as non-causes when
//! they come back around.
//!
//! ## Pieces
//!
//! | Piece | What it does |
//! |-------|--------------|
//! | [`Container`] | Registration, aggregation, fault propagation, ports |
//! | [`NameRegistry`] | Process-wide default container naming |
//! | Linking (`link_to`, `transform_and_link`, ...) | Cross-container fault/success protocol |
//! | [`GarbageRecorder`] | Per-type counters for the discard sink |
//! | [`PerformanceMonitor`] | Periodic buffered-count logging |
//!
//! Containers must be constructed and completed inside a Tokio runtime.
//! Logging goes through `tracing`; this crate installs no subscriber.

use std::sync::{Mutex, MutexGuard};

pub mod config;
pub mod container;
pub mod error;
pub mod garbage;
mod link;
pub mod monitor;
pub mod naming;

// Re-exports for convenience
pub use config::{ContainerConfig, DurationMs, MonitorMode};
pub use container::{
    BlockEntry, CleanupHook, CompletionCallback, Container, CountGetter,
};
pub use error::ComposeError;
pub use garbage::{GarbageRecorder, NullSink};
pub use monitor::{MonitorError, PerformanceMonitor};
pub use naming::NameRegistry;

/// Poison-tolerant lock: a panicked holder does not wedge the registry.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
