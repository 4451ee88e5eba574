//! A single-stage processing block backed by an in-memory queue.

use crate::lock;
use async_trait::async_trait;
use flow0::{
    Block, BoxError, CompletionCell, CompletionHandle, Fault, InputPort, LinkOptions, Outcome,
    OutputPort, Predicate, PushError,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Processing closure: consume one item, produce zero or one output.
pub type StageFn<I, O> = dyn Fn(I) -> Result<Option<O>, BoxError> + Send + Sync;

struct LinkEntry<O> {
    target: Arc<dyn InputPort<O>>,
    predicate: Option<Predicate<O>>,
    propagate_on_success: bool,
}

enum Feed<I> {
    Bounded(mpsc::Sender<I>),
    Unbounded(mpsc::UnboundedSender<I>),
}

impl<I> Clone for Feed<I> {
    fn clone(&self) -> Self {
        match self {
            Self::Bounded(tx) => Self::Bounded(tx.clone()),
            Self::Unbounded(tx) => Self::Unbounded(tx.clone()),
        }
    }
}

enum FeedRx<I> {
    Bounded(mpsc::Receiver<I>),
    Unbounded(mpsc::UnboundedReceiver<I>),
}

impl<I> FeedRx<I> {
    async fn recv(&mut self) -> Option<I> {
        match self {
            Self::Bounded(rx) => rx.recv().await,
            Self::Unbounded(rx) => rx.recv().await,
        }
    }
}

/// An in-memory processing block: one input queue, one worker task, one
/// filter-map closure, ordered links on the output side.
///
/// Natural completion happens when the input is sealed and the queue has
/// drained. A closure error resolves the block faulted with an original
/// cause. A forced fault or cancel resolves the signal immediately; the
/// worker notices and stops without draining what is left.
pub struct StageBlock<I, O> {
    name: String,
    feed: Mutex<Option<Feed<I>>>,
    cell: Arc<CompletionCell>,
    buffered: Arc<AtomicUsize>,
    links: Arc<Mutex<Vec<LinkEntry<O>>>>,
}

impl<I: Send + 'static, O: Send + 'static> StageBlock<I, O> {
    /// Unbounded stage.
    pub fn new(
        name: impl Into<String>,
        process: impl Fn(I) -> Result<Option<O>, BoxError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Self::build(name.into(), None, Arc::new(process))
    }

    /// Bounded stage; `capacity` is the backpressure limit on `push`.
    pub fn bounded(
        name: impl Into<String>,
        capacity: usize,
        process: impl Fn(I) -> Result<Option<O>, BoxError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Self::build(name.into(), Some(capacity), Arc::new(process))
    }

    fn build(name: String, capacity: Option<usize>, process: Arc<StageFn<I, O>>) -> Arc<Self> {
        let (feed, rx) = match capacity {
            Some(capacity) => {
                let (tx, rx) = mpsc::channel(capacity);
                (Feed::Bounded(tx), FeedRx::Bounded(rx))
            }
            None => {
                let (tx, rx) = mpsc::unbounded_channel();
                (Feed::Unbounded(tx), FeedRx::Unbounded(rx))
            }
        };
        let cell = Arc::new(CompletionCell::new());
        let buffered = Arc::new(AtomicUsize::new(0));
        let links: Arc<Mutex<Vec<LinkEntry<O>>>> = Arc::new(Mutex::new(Vec::new()));

        tokio::spawn(worker(
            name.clone(),
            rx,
            process,
            Arc::clone(&cell),
            Arc::clone(&buffered),
            Arc::clone(&links),
        ));

        Arc::new(Self {
            name,
            feed: Mutex::new(Some(feed)),
            cell,
            buffered,
            links,
        })
    }

    /// Resolve the block as canceled. A no-op once terminal.
    pub fn cancel(&self) {
        self.cell.resolve(Outcome::Canceled);
    }
}

async fn worker<I: Send + 'static, O: Send + 'static>(
    name: String,
    mut rx: FeedRx<I>,
    process: Arc<StageFn<I, O>>,
    cell: Arc<CompletionCell>,
    buffered: Arc<AtomicUsize>,
    links: Arc<Mutex<Vec<LinkEntry<O>>>>,
) {
    let signal = cell.handle();
    loop {
        tokio::select! {
            biased;
            _ = signal.wait() => break,
            next = rx.recv() => match next {
                Some(item) => {
                    buffered.fetch_sub(1, Ordering::Relaxed);
                    match process(item) {
                        Ok(Some(output)) => offer(&name, &links, output).await,
                        Ok(None) => {}
                        Err(err) => {
                            tracing::warn!(block = %name, error = %err, "stage processing failed");
                            cell.resolve(Outcome::Faulted(Fault::original(err)));
                            break;
                        }
                    }
                }
                None => {
                    // Input sealed and queue drained.
                    if cell.resolve(Outcome::Success) {
                        let targets: Vec<Arc<dyn InputPort<O>>> = lock(&links)
                            .iter()
                            .filter(|link| link.propagate_on_success)
                            .map(|link| Arc::clone(&link.target))
                            .collect();
                        for target in targets {
                            target.complete();
                        }
                    }
                    break;
                }
            }
        }
    }
}

/// Offer an item to the links in order; the first accepting predicate
/// claims it.
async fn offer<O: Send + 'static>(name: &str, links: &Mutex<Vec<LinkEntry<O>>>, item: O) {
    let target = {
        let guard = lock(links);
        guard
            .iter()
            .find(|link| match &link.predicate {
                Some(predicate) => predicate(&item),
                None => true,
            })
            .map(|link| Arc::clone(&link.target))
    };
    match target {
        Some(target) => {
            if let Err(err) = target.push(item).await {
                tracing::warn!(
                    block = name,
                    target = target.name(),
                    error = %err,
                    "linked target rejected item"
                );
            }
        }
        None => {
            tracing::trace!(block = name, "no link claimed item; dropping");
        }
    }
}

impl<I: Send + 'static, O: Send + 'static> Block for StageBlock<I, O> {
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
impl<I: Send + 'static, O: Send + 'static> InputPort<I> for StageBlock<I, O> {
    async fn push(&self, item: I) -> Result<(), PushError> {
        let feed = lock(&self.feed).clone();
        let Some(feed) = feed else {
            return Err(PushError::Closed);
        };
        self.buffered.fetch_add(1, Ordering::Relaxed);
        let sent = match feed {
            Feed::Bounded(tx) => tx.send(item).await.is_ok(),
            Feed::Unbounded(tx) => tx.send(item).is_ok(),
        };
        if sent {
            Ok(())
        } else {
            self.buffered.fetch_sub(1, Ordering::Relaxed);
            Err(PushError::Closed)
        }
    }

    fn complete(&self) {
        lock(&self.feed).take();
    }
}

impl<I: Send + 'static, O: Send + 'static> OutputPort<O> for StageBlock<I, O> {
    fn link_to(&self, target: Arc<dyn InputPort<O>>, options: LinkOptions<O>) {
        lock(&self.links).push(LinkEntry {
            target,
            predicate: options.predicate,
            propagate_on_success: options.propagate_completion_on_success,
        });
    }
}
