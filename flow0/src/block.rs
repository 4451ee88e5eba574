//! The Block capability — what the composition layer requires of an
//! asynchronous processing primitive.
//!
//! The capability is split in two. [`Block`] is the untyped control plane:
//! completion, buffered count, forced fault. It is what a container holds
//! (`Arc<dyn Block>` identity doubles as the registration key). The typed
//! data plane is [`InputPort`] and [`OutputPort`]; a primitive implements
//! whichever ports it has, and composition code asks for exactly the port
//! capability an operation needs.
//!
//! Every trait here is operation-defined, not mechanism-defined:
//! [`Block::fault`] means "force this block to a terminal faulted state",
//! not "close a channel" or "abort a task". How a primitive gets there is
//! its own concern, which is what keeps engines swappable.

use crate::completion::{CompletionHandle, Fault};
use crate::error::PushError;
use async_trait::async_trait;
use std::sync::Arc;

/// Predicate over borrowed items, shared between link routing and a
/// container's accumulated condition set.
pub type Predicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Options for a primitive block-to-block link.
pub struct LinkOptions<T> {
    /// When the source resolves cleanly, seal the target's input too.
    /// Fault and cancellation never propagate through a primitive link;
    /// that is the composition layer's job.
    pub propagate_completion_on_success: bool,

    /// Only items accepted by this predicate are claimed by the link.
    /// `None` claims everything offered.
    pub predicate: Option<Predicate<T>>,
}

impl<T> LinkOptions<T> {
    /// Link with success propagation enabled.
    pub fn propagate_on_success() -> Self {
        Self {
            propagate_completion_on_success: true,
            predicate: None,
        }
    }

    /// Attach a claiming predicate.
    pub fn with_predicate(mut self, predicate: Predicate<T>) -> Self {
        self.predicate = Some(predicate);
        self
    }
}

impl<T> Default for LinkOptions<T> {
    fn default() -> Self {
        Self {
            propagate_completion_on_success: false,
            predicate: None,
        }
    }
}

impl<T> std::fmt::Debug for LinkOptions<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkOptions")
            .field(
                "propagate_completion_on_success",
                &self.propagate_completion_on_success,
            )
            .field("predicate", &self.predicate.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// Control plane every block exposes, regardless of its item types.
pub trait Block: Send + Sync {
    /// Human-readable block name, used in logs and error messages.
    fn name(&self) -> &str;

    /// The block's raw completion signal.
    fn completion(&self) -> CompletionHandle;

    /// Best-effort count of items currently buffered inside the block.
    fn buffered_count(&self) -> usize;

    /// Force the block to a terminal faulted state with the given cause.
    ///
    /// MUST be a no-op if the block is already terminal, and MUST be safe
    /// to call concurrently and repeatedly. The composition layer leans on
    /// both guarantees when several triggers race to stop the same block.
    fn fault(&self, cause: Fault);
}

/// Typed receiving side of a block.
#[async_trait]
pub trait InputPort<T: Send + 'static>: Block {
    /// Enqueue one item, honoring the block's backpressure.
    async fn push(&self, item: T) -> Result<(), PushError>;

    /// Seal the input: no further items will arrive. The block runs to
    /// completion once its queue drains.
    fn complete(&self);
}

/// Typed producing side of a block.
pub trait OutputPort<T: Send + 'static>: Block {
    /// Route produced items to `target`.
    ///
    /// Links are consulted in registration order and an item is claimed by
    /// the first link whose predicate accepts it; an item one predicate
    /// rejected stays available to the links after it.
    fn link_to(&self, target: Arc<dyn InputPort<T>>, options: LinkOptions<T>);
}
