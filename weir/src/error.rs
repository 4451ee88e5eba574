//! Error types for the composition layer.

use flow0::PushError;
use thiserror::Error;

/// Usage errors. Caller misuse, always fatal to the call, never retried.
/// Distinct from fault classification, which lives in [`flow0::Fault`].
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum ComposeError {
    /// The same block handle was registered twice in one container.
    #[error("block {block} is already registered in container {container}")]
    DuplicateBlock {
        /// The container the registration was attempted on.
        container: String,
        /// The offending block.
        block: String,
    },

    /// Registration attempted after the completion signal was built.
    #[error("container {0} is frozen: its completion signal has been built")]
    RegistryFrozen(String),

    /// The completion signal was requested with no registered blocks.
    #[error("container {0} has no registered blocks")]
    NoBlockRegistered(String),

    /// An input-port operation on a container constructed without one.
    #[error("container {0} has no input port")]
    NoInputPort(String),

    /// An output-port operation on a container constructed without one.
    #[error("container {0} has no output port")]
    NoOutputPort(String),

    /// Feeding an item into the container's input port failed.
    #[error("push into container {container} failed: {source}")]
    Push {
        /// The container whose input port rejected the item.
        container: String,
        /// The underlying port error.
        #[source]
        source: PushError,
    },

    /// A buffered-count probe failed.
    #[error("buffered-count probe failed for block {block}: {message}")]
    CountProbe {
        /// The block whose count accessor failed.
        block: String,
        /// The accessor's error, rendered.
        message: String,
    },
}
