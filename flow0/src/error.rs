//! Error types for the block capability surface.

use thiserror::Error;

/// Type-erased error payload, the common currency for block failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Cloneable type-erased error cause. Faults fan out to many observers
/// (derived signals, aggregates, sibling containers), so causes are shared.
pub type SharedError = std::sync::Arc<dyn std::error::Error + Send + Sync>;

/// Errors from pushing an item into an input port.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum PushError {
    /// The input port was sealed, or the block already reached a
    /// terminal state and tore down its queue.
    #[error("input port closed")]
    Closed,

    /// Catch-all. Include context.
    #[error("{0}")]
    Other(#[from] BoxError),
}
