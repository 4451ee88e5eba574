//! Linking containers into pipelines.
//!
//! A primitive link only moves items; completion never propagates through
//! it. Instead every container-to-container link wires two racing tasks:
//! Rule A drives the target from the source side (clean joint completion
//! seals the target's input, anything else faults the target's domain) and
//! Rule B drives the source from the target side (a failed target faults
//! the source's domain). A container that is already terminal is never
//! re-faulted.

use crate::container::{Container, ContainerInner};
use crate::error::ComposeError;
use crate::garbage::NullSink;
use crate::lock;
use crate::naming::NameRegistry;
use flow0::{
    Block, CompletionHandle, Fault, InputPort, LinkOptions, OutputPort, Predicate,
    PropagatedFault,
};
use std::sync::Arc;
use weir_block_memory::{StageBlock, StageFn};

impl<I, O: Send + 'static> Container<I, O> {
    pub(crate) fn output_port(&self) -> Result<Arc<dyn OutputPort<O>>, ComposeError> {
        self.output
            .clone()
            .ok_or_else(|| ComposeError::NoOutputPort(self.inner.name().to_string()))
    }

    /// Wire this container's output into `target`'s input.
    ///
    /// Freezes both containers' registries (their completion signals are
    /// built here if they were not already).
    pub fn link_to<TO>(&self, target: &Container<O, TO>) -> Result<(), ComposeError> {
        let output = self.output_port()?;
        let target_input = target.input_port()?;
        output.link_to(Arc::clone(&target_input), LinkOptions::default());
        self.wire_completion(output.completion(), target, target_input)
    }

    /// Insert a conversion stage between this container and `target`:
    /// `transform` is applied to every item `predicate` accepts; rejected
    /// items never reach the stage and stay available to other links on
    /// the same output.
    pub fn transform_and_link<U, TO, F, P>(
        &self,
        target: &Container<U, TO>,
        transform: F,
        predicate: P,
    ) -> Result<(), ComposeError>
    where
        U: Send + 'static,
        F: Fn(O) -> U + Send + Sync + 'static,
        P: Fn(&O) -> bool + Send + Sync + 'static,
    {
        self.filter_and_link(
            target,
            Arc::new(move |item| Ok(Some(transform(item)))),
            Arc::new(predicate),
        )
    }

    /// [`transform_and_link`](Container::transform_and_link) with a
    /// match-everything predicate.
    pub fn transform_and_link_all<U, TO, F>(
        &self,
        target: &Container<U, TO>,
        transform: F,
    ) -> Result<(), ComposeError>
    where
        U: Send + 'static,
        F: Fn(O) -> U + Send + Sync + 'static,
    {
        self.transform_and_link(target, transform, |_| true)
    }

    /// Route one case of the output type to `target`. The case function is
    /// both predicate and transform: items it maps to `Some` are claimed
    /// and converted, items it maps to `None` stay available to other
    /// links. This is the variant-dispatch form of
    /// [`transform_and_link`](Container::transform_and_link) for enum
    /// outputs.
    pub fn link_case<U, TO, F>(
        &self,
        target: &Container<U, TO>,
        case: F,
    ) -> Result<(), ComposeError>
    where
        U: Send + 'static,
        F: Fn(&O) -> Option<U> + Send + Sync + 'static,
    {
        let case = Arc::new(case);
        let predicate: Predicate<O> = {
            let case = Arc::clone(&case);
            Arc::new(move |item: &O| case(item).is_some())
        };
        self.filter_and_link(target, Arc::new(move |item: O| Ok(case(&item))), predicate)
    }

    /// Send everything no earlier predicate on this output claimed into
    /// the discard sink, recording each discarded item in the global
    /// [`GarbageRecorder`](crate::GarbageRecorder) under the output item
    /// type's name.
    pub fn link_left_to_null(&self) -> Result<(), ComposeError> {
        self.link_left_to_null_with(|_| std::any::type_name::<O>())
    }

    /// Like [`link_left_to_null`](Container::link_left_to_null), with a
    /// caller-supplied classifier (useful when the output is an enum and
    /// the variant name is the interesting key).
    pub fn link_left_to_null_with<C>(&self, classify: C) -> Result<(), ComposeError>
    where
        C: Fn(&O) -> &'static str + Send + Sync + 'static,
    {
        let output = self.output_port()?;
        let leftover: Predicate<O> = {
            let prior = lock(&self.conditions).clone();
            Arc::new(move |item| !prior.iter().any(|p| p(item)))
        };
        lock(&self.conditions).push(Arc::clone(&leftover));
        let sink = NullSink::new(format!("{}-null", self.name()), classify);
        output.link_to(
            sink,
            LinkOptions::propagate_on_success().with_predicate(leftover),
        );
        Ok(())
    }

    fn filter_and_link<U, TO>(
        &self,
        target: &Container<U, TO>,
        convert: Arc<StageFn<O, U>>,
        predicate: Predicate<O>,
    ) -> Result<(), ComposeError>
    where
        U: Send + 'static,
    {
        let output = self.output_port()?;
        lock(&self.conditions).push(Arc::clone(&predicate));

        let stage_name = NameRegistry::global().next_name(&format!("{}-convert", self.name()));
        let stage = StageBlock::new(stage_name, move |item| convert(item));

        let stage_input: Arc<dyn InputPort<O>> = {
            let stage = Arc::clone(&stage);
            stage
        };
        output.link_to(
            stage_input,
            LinkOptions::propagate_on_success().with_predicate(predicate),
        );

        // The conversion stage belongs to no container, so no domain fault
        // would ever reach it. Fault it by hand when the source ends
        // non-clean; otherwise Rule A's joint wait could never resolve.
        let source_done = self.completion()?;
        {
            let stage = Arc::clone(&stage);
            let source_done = source_done.clone();
            tokio::spawn(async move {
                if !source_done.wait().await.is_success() {
                    stage.fault(Fault::Propagated(PropagatedFault::PeerBlockFailed));
                }
            });
        }

        let target_input = target.input_port()?;
        stage.link_to(Arc::clone(&target_input), LinkOptions::default());
        self.wire_completion(stage.completion(), target, target_input)
    }

    /// Rule A and Rule B for one link; `source_block_done` is the source
    /// output block's own completion (the conversion stage's, when one is
    /// inserted).
    fn wire_completion<TI, TO>(
        &self,
        source_block_done: CompletionHandle,
        target: &Container<TI, TO>,
        target_input: Arc<dyn InputPort<TI>>,
    ) -> Result<(), ComposeError>
    where
        TI: Send + 'static,
    {
        let source_done = self.completion()?;
        let target_done = target.completion()?;

        // Rule A: drive the target from the source side.
        let target_inner = Arc::clone(&target.inner);
        tokio::spawn(async move {
            let block_outcome = source_block_done.wait().await;
            let container_outcome = source_done.wait().await;
            if block_outcome.is_success() && container_outcome.is_success() {
                target_input.complete();
            } else if !target_inner.is_terminal() {
                ContainerInner::fault_domain(
                    &target_inner,
                    Fault::Propagated(PropagatedFault::LinkedContainerFailed),
                    None,
                );
            }
        });

        // Rule B: drive the source from the target side.
        let source_inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            if !target_done.wait().await.is_success() && !source_inner.is_terminal() {
                ContainerInner::fault_domain(
                    &source_inner,
                    Fault::Propagated(PropagatedFault::LinkedContainerFailed),
                    None,
                );
            }
        });

        Ok(())
    }
}
