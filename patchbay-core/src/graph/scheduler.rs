//! Trigger Scheduler
//!
//! The scheduler decides when a component recomputes. It never calls a
//! listener itself; it only maintains an explicit work queue that the async
//! runtime drains.
//!
//! # Algorithm
//!
//! 1. `mark_trigger` is the single entry point for "this component's inputs
//!    may have changed".
//! 2. While a batch is open, requests are deduplicated into a pending set and
//!    replayed through `mark_trigger` when the outermost batch closes.
//! 3. Otherwise an auto-updatable component is pushed on the ready queue
//!    (once, however many times it is marked before it runs), and a component
//!    that opted out becomes congested until it is resolved.
//! 4. The drain takes waves: every ready component at the lowest level. A
//!    wave's members are independent of each other, so they run concurrently.
//!    Consumers of a component that is still running are held back, so they
//!    always run after their providers settled.
//!
//! Chains are re-derived lazily: a finished computation only marks the direct
//! consumers of values that actually changed.

use std::collections::{HashSet, VecDeque};

use indexmap::IndexSet;

use super::cache::{InputSnapshot, OutputObject};
use super::node::{ComponentId, NodeStatus, StatusKind};
use super::state::GraphState;
use crate::error::{GraphError, ListenerError, Result};

/// Status message of a node that declined an automatic recompute.
pub const CONGESTION_MESSAGE: &str = "congestion detected";

/// Work queue and suppression state of the trigger scheduler.
#[derive(Debug, Default)]
pub struct TriggerQueue {
    /// Nesting depth of open batches.
    batch_depth: u32,

    /// Components marked while a batch was open, in first-marked order.
    pending: IndexSet<ComponentId>,

    /// Components waiting to recompute.
    ready: VecDeque<ComponentId>,
    queued: HashSet<ComponentId>,

    /// Components whose listener is currently running.
    in_flight: HashSet<ComponentId>,

    /// Components waiting for a manual resolve.
    congested: HashSet<ComponentId>,

    /// Upper bound on a wave's size; `0` means unbounded.
    max_wave: usize,
}

impl TriggerQueue {
    pub fn new(max_wave: usize) -> Self {
        Self {
            max_wave,
            ..Self::default()
        }
    }

    pub fn begin_batch(&mut self) {
        self.batch_depth += 1;
    }

    /// Close one batch level. Returns the deduplicated pending set once the
    /// outermost batch closes.
    pub fn end_batch(&mut self) -> Option<Vec<ComponentId>> {
        match self.batch_depth {
            0 => {
                tracing::warn!("end_batch called without a matching begin_batch");
                None
            }
            1 => {
                self.batch_depth = 0;
                Some(self.pending.drain(..).collect())
            }
            _ => {
                self.batch_depth -= 1;
                None
            }
        }
    }

    pub fn is_batching(&self) -> bool {
        self.batch_depth > 0
    }

    pub fn batch_depth(&self) -> u32 {
        self.batch_depth
    }

    pub fn defer(&mut self, component: ComponentId) {
        self.pending.insert(component);
    }

    /// Push `component` on the ready queue. Returns false if already queued.
    pub fn enqueue(&mut self, component: ComponentId) -> bool {
        if !self.queued.insert(component) {
            return false;
        }
        self.ready.push_back(component);
        true
    }

    pub fn congest(&mut self, component: ComponentId) {
        self.congested.insert(component);
    }

    /// Clear congestion. Returns whether the component was congested.
    pub fn release(&mut self, component: ComponentId) -> bool {
        self.congested.remove(&component)
    }

    pub fn is_congested(&self, component: ComponentId) -> bool {
        self.congested.contains(&component)
    }

    /// Take `component` off the ready queue. Returns whether it was queued.
    pub fn dequeue(&mut self, component: ComponentId) -> bool {
        if !self.queued.remove(&component) {
            return false;
        }
        self.ready.retain(|c| *c != component);
        true
    }

    pub fn start(&mut self, component: ComponentId) {
        self.in_flight.insert(component);
    }

    pub fn finish(&mut self, component: ComponentId) {
        self.in_flight.remove(&component);
    }

    pub fn is_in_flight(&self, component: ComponentId) -> bool {
        self.in_flight.contains(&component)
    }

    pub fn running(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.in_flight.iter().copied()
    }

    /// Drop every trace of a removed component.
    pub fn forget(&mut self, component: ComponentId) {
        self.pending.shift_remove(&component);
        if self.queued.remove(&component) {
            self.ready.retain(|c| *c != component);
        }
        self.congested.remove(&component);
    }

    pub fn has_ready(&self) -> bool {
        !self.ready.is_empty()
    }

    /// Number of components waiting in the ready queue.
    pub fn ready_len(&self) -> usize {
        self.ready.len()
    }

    /// No queued work and nothing running.
    pub fn is_idle(&self) -> bool {
        self.ready.is_empty() && self.in_flight.is_empty()
    }

    /// Take the next wave: queued components at the lowest level, skipping
    /// ones still running. `level` returns `None` for components that no
    /// longer exist; those are dropped from the queue.
    ///
    /// Taken components are marked in flight.
    pub fn take_wave(&mut self, level: impl Fn(ComponentId) -> Option<u32>) -> Vec<ComponentId> {
        self.take_wave_holding(level, |_| false)
    }

    /// Like [`take_wave`](Self::take_wave), but components for which `held`
    /// returns true stay queued and do not count towards the lowest level.
    pub fn take_wave_holding(
        &mut self,
        level: impl Fn(ComponentId) -> Option<u32>,
        held: impl Fn(ComponentId) -> bool,
    ) -> Vec<ComponentId> {
        let mut min_level = None;
        let mut stale = Vec::new();
        for &component in &self.ready {
            if self.in_flight.contains(&component) {
                continue;
            }
            match level(component) {
                Some(_) if held(component) => {}
                Some(l) => min_level = Some(min_level.map_or(l, |m: u32| m.min(l))),
                None => stale.push(component),
            }
        }
        for component in stale {
            self.queued.remove(&component);
            self.ready.retain(|c| *c != component);
        }

        let Some(min_level) = min_level else {
            return Vec::new();
        };

        let mut wave = Vec::new();
        let mut rest = VecDeque::with_capacity(self.ready.len());
        while let Some(component) = self.ready.pop_front() {
            let full = self.max_wave != 0 && wave.len() >= self.max_wave;
            if !full
                && !self.in_flight.contains(&component)
                && !held(component)
                && level(component) == Some(min_level)
            {
                self.queued.remove(&component);
                self.in_flight.insert(component);
                wave.push(component);
            } else {
                rest.push_back(component);
            }
        }
        self.ready = rest;

        tracing::trace!(level = min_level, size = wave.len(), "took trigger wave");
        wave
    }
}

impl GraphState {
    /// Request a recompute of `component`.
    pub fn mark_trigger(&mut self, component: ComponentId) {
        let Some(node) = self.nodes.get(&component) else {
            tracing::trace!(%component, "ignoring trigger for removed component");
            return;
        };

        if self.queue.is_batching() {
            self.queue.defer(component);
        } else if node.auto_updatable {
            if self.queue.enqueue(component) {
                tracing::debug!(%component, "queued trigger");
            }
        } else {
            tracing::debug!(%component, "congestion detected");
            self.queue.congest(component);
            self.set_status(component, NodeStatus::new(StatusKind::Idle, CONGESTION_MESSAGE));
        }
    }

    /// Open a batch. Triggers requested until the matching
    /// [`end_batch`](Self::end_batch) are deduplicated.
    pub fn begin_batch(&mut self) {
        self.queue.begin_batch();
    }

    /// Close a batch, flushing pending triggers when it was the outermost.
    pub fn end_batch(&mut self) {
        if let Some(pending) = self.queue.end_batch() {
            for component in pending {
                self.mark_trigger(component);
            }
        }
    }

    /// Release a congested component and let it catch up.
    pub fn resolve(&mut self, component: ComponentId) -> Result<()> {
        let node = self
            .nodes
            .get_mut(&component)
            .ok_or(GraphError::UnknownComponent(component))?;
        node.auto_updatable = true;
        self.queue.release(component);
        self.mark_trigger(component);
        Ok(())
    }

    pub fn set_auto_updatable(&mut self, component: ComponentId, auto: bool) -> Result<()> {
        let node = self
            .nodes
            .get_mut(&component)
            .ok_or(GraphError::UnknownComponent(component))?;
        node.auto_updatable = auto;
        if auto && self.queue.release(component) {
            self.mark_trigger(component);
        }
        Ok(())
    }

    pub fn is_congested(&self, component: ComponentId) -> bool {
        self.queue.is_congested(component)
    }

    /// Take the next wave of components to recompute.
    ///
    /// Components downstream of a running listener are held back until it
    /// settles, so they see its new outputs and run once.
    pub fn take_wave(&mut self) -> Vec<ComponentId> {
        let held = self.downstream_of_running();
        let nodes = &self.nodes;
        self.queue.take_wave_holding(
            |component| nodes.get(&component).map(|n| n.level),
            |component| held.contains(&component),
        )
    }

    /// Every component that transitively consumes a running one.
    fn downstream_of_running(&self) -> HashSet<ComponentId> {
        let mut held = HashSet::new();
        let mut stack: Vec<_> = self.queue.running().collect();
        while let Some(component) = stack.pop() {
            let Some(node) = self.nodes.get(&component) else {
                continue;
            };
            for consumer in node.consumer_components() {
                if held.insert(consumer) {
                    stack.push(consumer);
                }
            }
        }
        held
    }

    /// First half of the trigger protocol, up to the listener call.
    ///
    /// Returns `None` when the component is gone or a required input has no
    /// provider; in the latter case the cached outputs stay untouched.
    pub fn begin_trigger(&mut self, component: ComponentId) -> Option<InputSnapshot> {
        let Some(node) = self.nodes.get(&component) else {
            self.queue.finish(component);
            return None;
        };

        let missing = node.missing_required().len();
        if missing > 0 {
            self.queue.finish(component);
            self.set_status(
                component,
                NodeStatus::new(
                    StatusKind::Error,
                    format!("missing {missing} parameter(s); last good output preserved"),
                ),
            );
            return None;
        }

        self.queue.dequeue(component);
        self.queue.start(component);
        self.set_status(component, NodeStatus::new(StatusKind::Processing, ""));
        Some(self.assemble_snapshot(component))
    }

    /// Second half of the trigger protocol, after the listener settled.
    ///
    /// Changed outputs are cached and their consumers marked. A failure only
    /// becomes the node's status.
    pub fn finish_trigger(
        &mut self,
        component: ComponentId,
        result: std::result::Result<OutputObject, ListenerError>,
    ) {
        self.queue.finish(component);
        if !self.nodes.contains_key(&component) {
            tracing::debug!(%component, "component removed while computing");
            return;
        }

        match result {
            Ok(output) => {
                let consumers = self.apply_outputs(component, output);
                let settled = self.settled_status(component);
                self.set_status(component, settled);
                if !consumers.is_empty() {
                    tracing::debug!(%component, consumers = consumers.len(), "propagating changed outputs");
                }
                for consumer in consumers {
                    self.mark_trigger(consumer);
                }
            }
            Err(err) => {
                tracing::warn!(%component, error = %err, "listener failed");
                self.set_status(component, NodeStatus::new(StatusKind::Error, err.reason));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: u64) -> ComponentId {
        ComponentId::from(raw)
    }

    #[test]
    fn enqueue_deduplicates() {
        let mut queue = TriggerQueue::new(0);
        assert!(queue.enqueue(id(1)));
        assert!(!queue.enqueue(id(1)));
        assert_eq!(queue.ready_len(), 1);
    }

    #[test]
    fn nested_batches_flush_once() {
        let mut queue = TriggerQueue::new(0);
        queue.begin_batch();
        queue.begin_batch();
        queue.defer(id(3));
        queue.defer(id(3));
        queue.defer(id(4));

        assert!(queue.end_batch().is_none());
        assert_eq!(queue.end_batch(), Some(vec![id(3), id(4)]));
        assert!(!queue.is_batching());
        assert!(queue.end_batch().is_none());
    }

    #[test]
    fn wave_takes_lowest_level_only() {
        let mut queue = TriggerQueue::new(0);
        for raw in [1, 2, 3] {
            queue.enqueue(id(raw));
        }
        let level = |c: ComponentId| Some(if c == id(2) { 1 } else { 0 });

        assert_eq!(queue.take_wave(level), vec![id(1), id(3)]);
        assert!(queue.is_in_flight(id(1)));
        assert_eq!(queue.take_wave(level), vec![id(2)]);
        assert!(!queue.has_ready());
        assert!(!queue.is_idle());

        for raw in [1, 2, 3] {
            queue.finish(id(raw));
        }
        assert!(queue.is_idle());
    }

    #[test]
    fn wave_skips_in_flight_and_drops_stale() {
        let mut queue = TriggerQueue::new(0);
        queue.enqueue(id(1));
        queue.enqueue(id(2));
        queue.start(id(1));

        let wave = queue.take_wave(|c| (c != id(2)).then_some(0));
        assert!(wave.is_empty());
        assert_eq!(queue.ready_len(), 1);
    }

    #[test]
    fn wave_size_is_capped() {
        let mut queue = TriggerQueue::new(2);
        for raw in [1, 2, 3] {
            queue.enqueue(id(raw));
        }
        assert_eq!(queue.take_wave(|_| Some(0)).len(), 2);
        assert_eq!(queue.take_wave(|_| Some(0)), vec![id(3)]);
    }

    #[test]
    fn held_components_wait_without_blocking_others() {
        let mut queue = TriggerQueue::new(0);
        queue.enqueue(id(1));
        queue.enqueue(id(2));
        let level = |c: ComponentId| Some(if c == id(2) { 1 } else { 0 });

        assert_eq!(queue.take_wave_holding(level, |c| c == id(1)), vec![id(2)]);
        assert_eq!(queue.ready_len(), 1);
        assert_eq!(queue.take_wave_holding(level, |_| false), vec![id(1)]);
    }

    #[test]
    fn dequeue_removes_only_queued() {
        let mut queue = TriggerQueue::new(0);
        queue.enqueue(id(1));
        queue.enqueue(id(2));

        assert!(queue.dequeue(id(1)));
        assert!(!queue.dequeue(id(1)));
        assert_eq!(queue.take_wave(|_| Some(0)), vec![id(2)]);
        assert!(queue.enqueue(id(1)));
    }

    #[test]
    fn forget_clears_all_state() {
        let mut queue = TriggerQueue::new(0);
        queue.enqueue(id(1));
        queue.congest(id(1));
        queue.begin_batch();
        queue.defer(id(1));

        queue.forget(id(1));
        assert!(!queue.has_ready());
        assert!(!queue.is_congested(id(1)));
        assert_eq!(queue.end_batch(), Some(vec![]));
    }
}
