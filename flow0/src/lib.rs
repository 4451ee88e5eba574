//! # flow0 — capability traits for composable block pipelines
//!
//! This crate defines the boundary between a block engine (the thing that
//! queues and processes items) and the composition layer that groups blocks
//! into containers and pipelines.
//!
//! ## The Capabilities
//!
//! | Capability | Types | What it does |
//! |------------|-------|--------------|
//! | Control plane | [`Block`] | Completion, buffered count, forced fault |
//! | Data plane | [`InputPort`], [`OutputPort`] | Typed push / link routing |
//! | Completion | [`CompletionCell`], [`CompletionHandle`] | Resolve-once signal |
//! | Fault tagging | [`Fault`], [`PropagatedFault`] | Original vs injected cause |
//!
//! ## Design Principle
//!
//! Every trait is operation-defined, not mechanism-defined. `fault` means
//! "force this block terminal", not "abort a task"; `push` means "hand the
//! block one item under its backpressure", not "send on a channel". An
//! in-memory engine, a disk-spooling engine, and an engine that does not
//! exist yet all implement the same surface.
//!
//! ## Fault tagging
//!
//! Failures carry an explicit tag: [`Fault::Original`] for a genuine
//! first-seen cause, [`Fault::Propagated`] for a marker injected to stop
//! peers. Classification dispatches on the tag, never by downcasting the
//! error behind it. This is what lets a composition layer stop exactly the
//! right set of peers exactly once without mistaking its own markers for a
//! second root cause.

#![deny(missing_docs)]

pub mod block;
pub mod completion;
pub mod error;

#[cfg(feature = "test-utils")]
pub mod test_utils;

// Re-exports for convenience
pub use block::{Block, InputPort, LinkOptions, OutputPort, Predicate};
pub use completion::{
    Completion, CompletionCell, CompletionHandle, Fault, Outcome, PropagatedFault,
};
pub use error::{BoxError, PushError, SharedError};
