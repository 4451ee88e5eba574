//! Containers — named composition units with one aggregate completion
//! signal.
//!
//! A container groups blocks registered during single-threaded
//! construction. Registering a block immediately wires a classification
//! continuation onto its raw completion signal, so propagation is live
//! before anything else can observe the block. The first successful read
//! of [`Container::completion`] snapshots the registry, freezes it, and
//! memoizes one aggregate signal over every block's derived signal.
//!
//! ## Derived signals and fault domains
//!
//! A block's raw outcome is classified into a derived signal: an original
//! fault stops every peer in the container's fault domain before the
//! derived signal resolves, a propagated marker surfaces without
//! re-triggering anything, and cancellation always escalates. The fault
//! domain is the container plus everything joined to it by
//! [`Container::absorb_child`], walked breadth-first, so a fault anywhere
//! in an absorbed family stops the whole family exactly once.
//!
//! Containers must be built and completed inside a Tokio runtime; both
//! registration and aggregation spawn continuations.

use crate::config::ContainerConfig;
use crate::error::ComposeError;
use crate::lock;
use crate::naming::NameRegistry;
use flow0::{
    Block, BoxError, CompletionCell, CompletionHandle, Fault, InputPort, LinkOptions, Outcome,
    OutputPort, Predicate, PropagatedFault, SharedError,
};
use futures::future::BoxFuture;
use std::sync::{Arc, Mutex, Weak};

/// Fallible accessor for a block's buffered count. The default accessor
/// asks the block directly; registrations may override it.
pub type CountGetter = Arc<dyn Fn() -> Result<usize, BoxError> + Send + Sync>;

/// Callback observing a block's raw terminal outcome. An error from the
/// callback is logged and, when the block itself produced no original
/// cause, becomes the original cause.
pub type CompletionCallback = Arc<dyn Fn(&Outcome) -> Result<(), BoxError> + Send + Sync>;

/// Post-completion cleanup hook. Runs exactly once, only on the fully
/// clean path, before the aggregate signal resolves.
pub type CleanupHook = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// One registered block: the handle, its count accessor, and the derived
/// completion signal the classification continuation feeds.
#[derive(Clone)]
pub struct BlockEntry {
    block: Arc<dyn Block>,
    count: CountGetter,
    derived: CompletionHandle,
}

impl BlockEntry {
    /// The registered block.
    pub fn block(&self) -> &Arc<dyn Block> {
        &self.block
    }

    /// The classified completion signal, distinct from the block's raw one.
    pub fn derived_completion(&self) -> &CompletionHandle {
        &self.derived
    }

    /// Probe the buffered count through the entry's accessor.
    pub fn buffered(&self) -> Result<usize, ComposeError> {
        (self.count)().map_err(|err| ComposeError::CountProbe {
            block: self.block.name().to_string(),
            message: err.to_string(),
        })
    }
}

impl std::fmt::Debug for BlockEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockEntry")
            .field("block", &self.block.name())
            .finish()
    }
}

#[derive(Default)]
struct RegistryState {
    entries: Vec<BlockEntry>,
    /// Some once the aggregate has been built; the registry is frozen
    /// from that point on.
    aggregate: Option<CompletionHandle>,
}

pub(crate) struct ContainerInner {
    name: String,
    config: ContainerConfig,
    state: Mutex<RegistryState>,
    /// First original cause of the current failure episode.
    original_cause: Mutex<Option<SharedError>>,
    /// Absorbed children, held strongly so an absorbed child's wiring
    /// outlives the child handle itself.
    children: Mutex<Vec<Arc<ContainerInner>>>,
    /// Containers that absorbed us.
    parents: Mutex<Vec<Weak<ContainerInner>>>,
    cleanup: Mutex<Option<CleanupHook>>,
}

impl ContainerInner {
    fn new(name: String, config: ContainerConfig) -> Arc<Self> {
        Arc::new(Self {
            name,
            config,
            state: Mutex::new(RegistryState::default()),
            original_cause: Mutex::new(None),
            children: Mutex::new(Vec::new()),
            parents: Mutex::new(Vec::new()),
            cleanup: Mutex::new(None),
        })
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn config(&self) -> &ContainerConfig {
        &self.config
    }

    pub(crate) fn entries(&self) -> Vec<BlockEntry> {
        lock(&self.state).entries.clone()
    }

    pub(crate) fn total_buffered(&self) -> Result<usize, ComposeError> {
        let mut total = 0usize;
        for entry in self.entries() {
            total += entry.buffered()?;
        }
        Ok(total)
    }

    /// True once the aggregate signal exists and has resolved. A container
    /// whose aggregate was never built is not terminal.
    pub(crate) fn is_terminal(&self) -> bool {
        lock(&self.state)
            .aggregate
            .as_ref()
            .is_some_and(CompletionHandle::is_terminal)
    }

    fn register(
        self: &Arc<Self>,
        block: Arc<dyn Block>,
        count: CountGetter,
        on_complete: Option<CompletionCallback>,
    ) -> Result<(), ComposeError> {
        {
            let mut state = lock(&self.state);
            if state.aggregate.is_some() {
                return Err(ComposeError::RegistryFrozen(self.name.clone()));
            }
            if state.entries.iter().any(|e| Arc::ptr_eq(&e.block, &block)) {
                return Err(ComposeError::DuplicateBlock {
                    container: self.name.clone(),
                    block: block.name().to_string(),
                });
            }
            let cell = CompletionCell::new();
            state.entries.push(BlockEntry {
                block: Arc::clone(&block),
                count,
                derived: cell.handle(),
            });
            // The classification continuation attaches to a watch-backed
            // signal, so a block that already completed still fires it.
            tokio::spawn(Self::classify(
                Arc::clone(self),
                block,
                cell,
                on_complete,
            ));
        }
        Ok(())
    }

    /// Classify one block's raw outcome into its derived signal, per the
    /// fault propagation rules.
    async fn classify(
        owner: Arc<Self>,
        block: Arc<dyn Block>,
        cell: CompletionCell,
        on_complete: Option<CompletionCallback>,
    ) {
        let outcome = block.completion().wait().await;

        let mut original: Option<SharedError> = match &outcome {
            Outcome::Faulted(Fault::Original(cause)) => Some(Arc::clone(cause)),
            _ => None,
        };

        if let Some(callback) = on_complete {
            if let Err(err) = callback(&outcome) {
                tracing::warn!(
                    container = %owner.name,
                    block = %block.name(),
                    error = %err,
                    "block completion callback failed"
                );
                if original.is_none() {
                    original = Some(SharedError::from(err));
                }
            }
        }

        match (original, outcome) {
            (Some(cause), _) => {
                // An original cause: stop every peer first. The aggregate
                // waits on the peers' derived signals, so faulting them
                // before resolving ours makes "fault implies aggregate
                // failure" a guarantee instead of a race.
                Self::fault_domain(
                    &owner,
                    Fault::Propagated(PropagatedFault::PeerBlockFailed),
                    Some(&cause),
                );
                cell.resolve(Outcome::Faulted(Fault::Original(cause)));
            }
            (None, Outcome::Faulted(fault)) => {
                // A propagated marker: surface failure downstream without
                // re-triggering the domain.
                cell.resolve(Outcome::Faulted(fault));
            }
            (None, Outcome::Canceled) => {
                Self::fault_domain(
                    &owner,
                    Fault::Propagated(PropagatedFault::PeerBlockCanceled),
                    None,
                );
                cell.resolve(Outcome::Canceled);
            }
            (None, Outcome::Success) => {
                cell.resolve(Outcome::Success);
            }
        }
    }

    /// Every container reachable from `start` over absorb edges, in both
    /// directions, cycle-safe.
    fn domain(start: &Arc<Self>) -> Vec<Arc<Self>> {
        let mut seen: Vec<Arc<Self>> = vec![Arc::clone(start)];
        let mut queue: Vec<Arc<Self>> = vec![Arc::clone(start)];
        while let Some(current) = queue.pop() {
            let mut neighbors: Vec<Arc<Self>> = lock(&current.children).clone();
            neighbors.extend(lock(&current.parents).iter().filter_map(Weak::upgrade));
            for neighbor in neighbors {
                if !seen.iter().any(|s| Arc::ptr_eq(s, &neighbor)) {
                    seen.push(Arc::clone(&neighbor));
                    queue.push(neighbor);
                }
            }
        }
        seen
    }

    /// Force-fault every not-yet-terminal block in the fault domain,
    /// recording `original` first-wins into each member on the way.
    ///
    /// Idempotent per block: forced fault on a terminal block is a no-op
    /// by the block contract, so concurrent and repeated calls are safe.
    pub(crate) fn fault_domain(start: &Arc<Self>, cause: Fault, original: Option<&SharedError>) {
        for member in Self::domain(start) {
            if let Some(cause) = original {
                member.record_original(cause);
            }
            member.fault_blocks(&cause);
        }
    }

    fn record_original(&self, cause: &SharedError) {
        let mut slot = lock(&self.original_cause);
        if slot.is_none() {
            *slot = Some(Arc::clone(cause));
        }
    }

    pub(crate) fn original_cause(&self) -> Option<SharedError> {
        lock(&self.original_cause).clone()
    }

    fn fault_blocks(&self, cause: &Fault) {
        tracing::warn!(container = %self.name, cause = %cause, "faulting container blocks");
        for entry in self.entries() {
            if !entry.block.completion().is_terminal() {
                entry.block.fault(cause.clone());
            }
        }
    }

    async fn aggregate(inner: Arc<Self>, entries: Vec<BlockEntry>, cell: CompletionCell) {
        let mut first_fault: Option<Fault> = None;
        let mut canceled = false;
        for entry in &entries {
            match entry.derived.wait().await {
                Outcome::Success => {}
                Outcome::Faulted(fault) => {
                    if first_fault.is_none() {
                        first_fault = Some(fault);
                    }
                }
                Outcome::Canceled => canceled = true,
            }
        }

        // Prefer the recorded original cause over whichever derived fault
        // happened to be observed first; propagated markers only surface
        // when the episode produced no original at all.
        if let Some(cause) = inner.original_cause() {
            tracing::warn!(container = %inner.name, cause = %cause, "container failed");
            cell.resolve(Outcome::Faulted(Fault::Original(cause)));
        } else if let Some(fault) = first_fault {
            tracing::warn!(container = %inner.name, cause = %fault, "container failed");
            cell.resolve(Outcome::Faulted(fault));
        } else if canceled {
            tracing::debug!(container = %inner.name, "container canceled");
            cell.resolve(Outcome::Canceled);
        } else {
            let hook = lock(&inner.cleanup).take();
            if let Some(hook) = hook {
                tracing::debug!(container = %inner.name, "running cleanup hook");
                hook().await;
            }
            tracing::debug!(container = %inner.name, "container completed");
            cell.resolve(Outcome::Success);
        }
    }
}

/// A named, composed processing unit.
///
/// `I` and `O` are the item types of the optional input and output ports.
/// Specialization is by which ports are present, not by a subtype ladder:
/// a plain grouping container carries neither port, a head-of-pipeline
/// source only an output, a tail sink only an input. Operations needing a
/// port the container was built without fail with
/// [`ComposeError::NoInputPort`] / [`ComposeError::NoOutputPort`].
pub struct Container<I = (), O = ()> {
    pub(crate) inner: Arc<ContainerInner>,
    pub(crate) input: Option<Arc<dyn InputPort<I>>>,
    pub(crate) output: Option<Arc<dyn OutputPort<O>>>,
    pub(crate) conditions: Mutex<Vec<Predicate<O>>>,
}

impl Container {
    /// Plain grouping container (no ports), named from the global
    /// [`NameRegistry`] as `kind` + counter.
    pub fn new(kind: &str, config: ContainerConfig) -> Self {
        Self::named(NameRegistry::global().next_name(kind), config)
    }

    /// Plain grouping container with an explicit name.
    pub fn named(name: impl Into<String>, config: ContainerConfig) -> Self {
        Self {
            inner: ContainerInner::new(name.into(), config),
            input: None,
            output: None,
            conditions: Mutex::new(Vec::new()),
        }
    }
}

impl<I: Send + 'static, O: Send + 'static> Container<I, O> {
    /// Container exposing both an input and an output port.
    pub fn pipeline(
        kind: &str,
        config: ContainerConfig,
        input: Arc<dyn InputPort<I>>,
        output: Arc<dyn OutputPort<O>>,
    ) -> Self {
        Self::pipeline_named(NameRegistry::global().next_name(kind), config, input, output)
    }

    /// Like [`Container::pipeline`], with an explicit name.
    pub fn pipeline_named(
        name: impl Into<String>,
        config: ContainerConfig,
        input: Arc<dyn InputPort<I>>,
        output: Arc<dyn OutputPort<O>>,
    ) -> Self {
        Self {
            inner: ContainerInner::new(name.into(), config),
            input: Some(input),
            output: Some(output),
            conditions: Mutex::new(Vec::new()),
        }
    }
}

impl<O: Send + 'static> Container<(), O> {
    /// Head-of-pipeline container: output port only.
    pub fn source(
        kind: &str,
        config: ContainerConfig,
        output: Arc<dyn OutputPort<O>>,
    ) -> Self {
        Self {
            inner: ContainerInner::new(NameRegistry::global().next_name(kind), config),
            input: None,
            output: Some(output),
            conditions: Mutex::new(Vec::new()),
        }
    }
}

impl<I: Send + 'static> Container<I, ()> {
    /// Tail-of-pipeline container: input port only.
    pub fn sink(kind: &str, config: ContainerConfig, input: Arc<dyn InputPort<I>>) -> Self {
        Self {
            inner: ContainerInner::new(NameRegistry::global().next_name(kind), config),
            input: Some(input),
            output: None,
            conditions: Mutex::new(Vec::new()),
        }
    }
}

impl<I, O> Container<I, O> {
    /// The container's display name.
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// The container's configuration.
    pub fn config(&self) -> &ContainerConfig {
        self.inner.config()
    }

    /// Register a block with the default count accessor and no completion
    /// callback.
    pub fn register(&self, block: Arc<dyn Block>) -> Result<(), ComposeError> {
        self.register_with(block, None, None)
    }

    /// Register a block.
    ///
    /// Wires the classification continuation onto the block's raw signal
    /// immediately, so no block can complete unobserved.
    ///
    /// # Errors
    ///
    /// [`ComposeError::DuplicateBlock`] if this exact handle is already
    /// registered here; [`ComposeError::RegistryFrozen`] if the completion
    /// signal has already been built.
    pub fn register_with(
        &self,
        block: Arc<dyn Block>,
        count: Option<CountGetter>,
        on_complete: Option<CompletionCallback>,
    ) -> Result<(), ComposeError> {
        let count = count.unwrap_or_else(|| {
            let block = Arc::clone(&block);
            Arc::new(move || Ok(block.buffered_count()))
        });
        self.inner.register(block, count, on_complete)
    }

    /// Copy another container's registered blocks into this one,
    /// flattening it into this container's registry, and join the two
    /// fault domains. The child's own completion signal keeps working as
    /// a sub-aggregate; this container aggregates over the union.
    ///
    /// # Errors
    ///
    /// Same rules as [`Container::register_with`], applied per copied
    /// entry.
    pub fn absorb_child<CI, CO>(&self, child: &Container<CI, CO>) -> Result<(), ComposeError> {
        let child_entries = child.inner.entries();
        {
            let mut state = lock(&self.inner.state);
            if state.aggregate.is_some() {
                return Err(ComposeError::RegistryFrozen(self.inner.name.clone()));
            }
            for entry in &child_entries {
                if state
                    .entries
                    .iter()
                    .any(|e| Arc::ptr_eq(&e.block, &entry.block))
                {
                    return Err(ComposeError::DuplicateBlock {
                        container: self.inner.name.clone(),
                        block: entry.block.name().to_string(),
                    });
                }
            }
            state.entries.extend(child_entries);
        }
        lock(&self.inner.children).push(Arc::clone(&child.inner));
        lock(&child.inner.parents).push(Arc::downgrade(&self.inner));
        Ok(())
    }

    /// The aggregate completion signal: resolves once every registered
    /// block's derived signal has resolved. Built on first read and
    /// memoized; the first successful read freezes the registry.
    ///
    /// # Errors
    ///
    /// [`ComposeError::NoBlockRegistered`] if nothing was registered. A
    /// failed read does not freeze the registry.
    pub fn completion(&self) -> Result<CompletionHandle, ComposeError> {
        let mut state = lock(&self.inner.state);
        if let Some(handle) = &state.aggregate {
            return Ok(handle.clone());
        }
        if state.entries.is_empty() {
            return Err(ComposeError::NoBlockRegistered(self.inner.name.clone()));
        }
        let entries = state.entries.clone();
        let cell = CompletionCell::new();
        let handle = cell.handle();
        state.aggregate = Some(handle.clone());
        drop(state);
        tokio::spawn(ContainerInner::aggregate(
            Arc::clone(&self.inner),
            entries,
            cell,
        ));
        Ok(handle)
    }

    /// Set the cleanup hook. Replaces any previous hook; runs only when
    /// every block completes cleanly.
    pub fn set_cleanup<F, Fut>(&self, hook: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        *lock(&self.inner.cleanup) = Some(Box::new(move || {
            let fut: BoxFuture<'static, ()> = Box::pin(hook());
            fut
        }));
    }

    /// Force-fault every not-yet-terminal block in this container's fault
    /// domain. Logs the cause. Safe to call concurrently and repeatedly;
    /// on an already-terminal container it does nothing.
    pub fn fault(&self, cause: Fault) {
        let original = cause.original_cause().cloned();
        ContainerInner::fault_domain(&self.inner, cause, original.as_ref());
    }

    /// The registered blocks, in registration order.
    pub fn blocks(&self) -> Vec<Arc<dyn Block>> {
        self.inner
            .entries()
            .into_iter()
            .map(|entry| entry.block)
            .collect()
    }

    /// The registered entries, in registration order, with their derived
    /// completion signals and count accessors.
    pub fn block_entries(&self) -> Vec<BlockEntry> {
        self.inner.entries()
    }

    /// Sum of every block's buffered count, through the registered
    /// accessors.
    ///
    /// # Errors
    ///
    /// [`ComposeError::CountProbe`] if an accessor fails.
    pub fn buffered_count(&self) -> Result<usize, ComposeError> {
        self.inner.total_buffered()
    }
}

impl<I: Send + 'static, O> Container<I, O> {
    pub(crate) fn input_port(&self) -> Result<Arc<dyn InputPort<I>>, ComposeError> {
        self.input
            .clone()
            .ok_or_else(|| ComposeError::NoInputPort(self.inner.name.clone()))
    }

    /// Feed a finite sequence of items into the input port, logging the
    /// count pulled. Does not seal the input; call
    /// [`Container::seal_input`] when no more items will come.
    pub async fn pull_from<T>(&self, items: T) -> Result<usize, ComposeError>
    where
        T: IntoIterator<Item = I>,
    {
        let input = self.input_port()?;
        let mut pulled = 0usize;
        for item in items {
            input
                .push(item)
                .await
                .map_err(|source| ComposeError::Push {
                    container: self.inner.name.clone(),
                    source,
                })?;
            pulled += 1;
        }
        tracing::info!(container = %self.inner.name, pulled, "pulled items into input port");
        Ok(pulled)
    }

    /// Seal the input port: no further items will arrive.
    pub fn seal_input(&self) -> Result<(), ComposeError> {
        self.input_port()?.complete();
        Ok(())
    }

    /// Link an external block's output into this container's input, with
    /// success propagation enabled on the primitive link.
    pub fn link_from(&self, source: &Arc<dyn OutputPort<I>>) -> Result<(), ComposeError> {
        let input = self.input_port()?;
        source.link_to(input, LinkOptions::propagate_on_success());
        Ok(())
    }
}
