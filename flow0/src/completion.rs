//! Completion vocabulary — the shared language of block termination.
//!
//! These types are NOT a trait. They are the vocabulary every layer of a
//! pipeline speaks: a block resolves a [`Completion`] signal exactly once,
//! composition layers classify the resolution as an [`Outcome`], and
//! failures carry a [`Fault`] tag saying whether they are a genuine root
//! cause or a marker injected to stop peers.
//!
//! The signal itself is a [`CompletionCell`]/[`CompletionHandle`] pair built
//! on `tokio::sync::watch`. The watch channel gives the two properties the
//! composition layer depends on:
//!
//! - subscribe-or-fire-immediately: a continuation attached after the signal
//!   resolved still observes the terminal state, so attaching can never race
//!   a fast block into a lost wakeup;
//! - first-terminal-write-wins: a signal resolves at most once, so a forced
//!   fault landing after natural completion is a no-op.

use crate::error::{BoxError, SharedError};
use thiserror::Error;
use tokio::sync::watch;

/// Why a block was forced to a terminal state by the composition layer
/// rather than by its own processing. Injected markers are never treated
/// as a new root cause.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PropagatedFault {
    /// Another block in the same container (or its absorbed family) failed.
    #[error("another block in the container failed")]
    PeerBlockFailed,

    /// Another block in the same container was canceled.
    #[error("another block in the container was canceled")]
    PeerBlockCanceled,

    /// A container linked upstream or downstream of this one failed.
    #[error("a linked container failed")]
    LinkedContainerFailed,
}

/// A failure flowing through the composition layer, tagged with whether it
/// is a first-seen cause or an injected termination marker.
///
/// The tag is the dispatch mechanism: classification matches on the
/// variant, never on the concrete error type behind it. This enum is
/// deliberately exhaustive so downstream classifiers are forced to handle
/// both tags.
#[derive(Debug, Clone)]
pub enum Fault {
    /// A genuine failure raised by a block's own processing. At most one
    /// per container per failure episode is recorded as the root cause.
    Original(SharedError),

    /// A marker injected to force peers to a terminal state. Surfaces to
    /// awaiters so they observe failure, but never re-triggers propagation.
    Propagated(PropagatedFault),
}

impl Fault {
    /// Wrap an error as an original (first-seen) cause.
    pub fn original(err: impl Into<BoxError>) -> Self {
        Self::Original(SharedError::from(err.into()))
    }

    /// True if this fault was injected by the composition layer.
    pub fn is_propagated(&self) -> bool {
        matches!(self, Self::Propagated(_))
    }

    /// The root cause, if this fault carries one.
    pub fn original_cause(&self) -> Option<&SharedError> {
        match self {
            Self::Original(cause) => Some(cause),
            Self::Propagated(_) => None,
        }
    }
}

impl std::fmt::Display for Fault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Original(cause) => write!(f, "{cause}"),
            Self::Propagated(marker) => write!(f, "{marker}"),
        }
    }
}

impl std::error::Error for Fault {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Original(cause) => Some(cause.as_ref()),
            Self::Propagated(marker) => Some(marker),
        }
    }
}

/// Observable state of a completion signal.
#[derive(Debug, Clone, Default)]
pub enum Completion {
    /// Not yet terminal.
    #[default]
    Pending,
    /// Ran to completion.
    Done,
    /// Terminated with a failure.
    Faulted(Fault),
    /// Terminated by cancellation. Distinct from fault: it carries no cause.
    Canceled,
}

impl Completion {
    /// True once the signal can no longer change.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// The terminal resolution, if any.
    pub fn terminal(&self) -> Option<Outcome> {
        match self {
            Self::Pending => None,
            Self::Done => Some(Outcome::Success),
            Self::Faulted(fault) => Some(Outcome::Faulted(fault.clone())),
            Self::Canceled => Some(Outcome::Canceled),
        }
    }
}

/// Terminal resolution of a completion signal.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// The block processed everything it was given and finished cleanly.
    Success,
    /// The block failed, with the tagged cause.
    Faulted(Fault),
    /// The block was canceled.
    Canceled,
}

impl Outcome {
    /// True for the clean path.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// The fault, if this outcome is a failure.
    pub fn fault(&self) -> Option<&Fault> {
        match self {
            Self::Faulted(fault) => Some(fault),
            _ => None,
        }
    }
}

impl From<Outcome> for Completion {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Success => Completion::Done,
            Outcome::Faulted(fault) => Completion::Faulted(fault),
            Outcome::Canceled => Completion::Canceled,
        }
    }
}

/// Writer side of a completion signal. The first terminal write wins;
/// every later [`resolve`](CompletionCell::resolve) is a no-op.
#[derive(Debug)]
pub struct CompletionCell {
    tx: watch::Sender<Completion>,
}

impl CompletionCell {
    /// Create a pending signal.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Completion::Pending);
        Self { tx }
    }

    /// A reader handle for this signal.
    pub fn handle(&self) -> CompletionHandle {
        CompletionHandle {
            rx: self.tx.subscribe(),
        }
    }

    /// Resolve the signal. Returns false if it was already terminal.
    pub fn resolve(&self, outcome: Outcome) -> bool {
        self.tx.send_if_modified(|state| {
            if state.is_terminal() {
                false
            } else {
                *state = outcome.clone().into();
                true
            }
        })
    }
}

impl Default for CompletionCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Reader side of a completion signal. Cloneable; [`wait`] resumes
/// immediately when the signal is already terminal.
///
/// [`wait`]: CompletionHandle::wait
#[derive(Debug, Clone)]
pub struct CompletionHandle {
    rx: watch::Receiver<Completion>,
}

impl CompletionHandle {
    /// Current state, without waiting.
    pub fn peek(&self) -> Completion {
        self.rx.borrow().clone()
    }

    /// True once the signal resolved.
    pub fn is_terminal(&self) -> bool {
        self.rx.borrow().is_terminal()
    }

    /// Suspend until the signal resolves.
    ///
    /// A signal whose writer was dropped while still pending can never
    /// resolve; that is reported as [`Outcome::Canceled`].
    pub async fn wait(&self) -> Outcome {
        let mut rx = self.rx.clone();
        loop {
            if let Some(outcome) = rx.borrow_and_update().terminal() {
                return outcome;
            }
            if rx.changed().await.is_err() {
                return Outcome::Canceled;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_terminal_write_wins() {
        let cell = CompletionCell::new();
        assert!(cell.resolve(Outcome::Success));
        assert!(!cell.resolve(Outcome::Faulted(Fault::original("late"))));
        assert!(matches!(cell.handle().peek(), Completion::Done));
    }

    #[test]
    fn fault_tag_dispatch() {
        let fault = Fault::original("disk-full");
        assert!(!fault.is_propagated());
        assert_eq!(fault.original_cause().unwrap().to_string(), "disk-full");

        let marker = Fault::Propagated(PropagatedFault::PeerBlockFailed);
        assert!(marker.is_propagated());
        assert!(marker.original_cause().is_none());
    }

    #[tokio::test]
    async fn wait_fires_immediately_when_already_terminal() {
        let cell = CompletionCell::new();
        cell.resolve(Outcome::Canceled);
        let handle = cell.handle();
        assert!(matches!(handle.wait().await, Outcome::Canceled));
    }

    #[tokio::test]
    async fn wait_resumes_on_resolution() {
        let cell = CompletionCell::new();
        let handle = cell.handle();
        let waiter = tokio::spawn(async move { handle.wait().await });
        cell.resolve(Outcome::Faulted(Fault::original("boom")));
        let outcome = waiter.await.unwrap();
        assert_eq!(outcome.fault().unwrap().to_string(), "boom");
    }

    #[tokio::test]
    async fn dropped_cell_reports_cancellation() {
        let cell = CompletionCell::new();
        let handle = cell.handle();
        drop(cell);
        assert!(matches!(handle.wait().await, Outcome::Canceled));
    }
}
