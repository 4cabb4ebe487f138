//! Graph State
//!
//! `GraphState` is the single owner of everything the engine knows: the node
//! arena, the connection table, the output cache and the trigger queue. All
//! of its operations are synchronous; the async runtime wraps it in one mutex
//! and never holds that mutex across a listener call.
//!
//! Operations are spread over several files by concern (`params`,
//! `topology`, `cache`, `scheduler`, `snapshot`); this file holds the
//! struct, component lifecycle, status bookkeeping and strict mode.

use indexmap::IndexMap;
use serde_json::Value;

use super::cache::OutputCache;
use super::connection::{Connection, ConnectionId, ConnectionTable};
use super::node::{ComponentId, Node, NodeStatus, StatusKind};
use super::scheduler::TriggerQueue;
use crate::config::GraphConfig;
use crate::error::{GraphError, Result};
use crate::events::GraphEvent;

/// The complete, synchronously mutated state of a component graph.
#[derive(Debug)]
pub struct GraphState {
    pub(crate) nodes: IndexMap<ComponentId, Node>,
    pub(crate) connections: ConnectionTable,
    pub(crate) cache: OutputCache,
    pub(crate) queue: TriggerQueue,
    pub(crate) strict: bool,

    /// `auto_updatable` given to newly registered nodes.
    auto_update: bool,

    /// Notifications produced since the last `take_events`.
    outbox: Vec<GraphEvent>,
}

impl GraphState {
    pub fn new() -> Self {
        Self::with_config(&GraphConfig::default())
    }

    pub fn with_config(config: &GraphConfig) -> Self {
        Self {
            nodes: IndexMap::new(),
            connections: ConnectionTable::new(),
            cache: OutputCache::new(),
            queue: TriggerQueue::new(config.max_concurrent_triggers),
            strict: config.strict_mode,
            auto_update: config.auto_update,
            outbox: Vec::new(),
        }
    }

    /// Add a node for `component` and request its first computation.
    pub fn register(&mut self, component: ComponentId, name: impl Into<String>) -> Result<()> {
        if self.nodes.contains_key(&component) {
            return Err(GraphError::ComponentExists(component));
        }
        let name = name.into();
        tracing::debug!(%component, name = %name, "registering component");

        self.nodes
            .insert(component, Node::new(component, name.clone(), self.auto_update));
        self.emit(GraphEvent::ComponentRegistered { component, name });
        self.refresh_status(component);
        self.mark_trigger(component);
        Ok(())
    }

    /// Remove a component and everything that references it.
    ///
    /// Its connections are severed inside one batch, so each surviving
    /// consumer that lost a provider is triggered exactly once.
    pub fn remove_component(&mut self, component: ComponentId) -> Result<()> {
        if !self.nodes.contains_key(&component) {
            return Err(GraphError::UnknownComponent(component));
        }
        tracing::debug!(%component, "removing component");

        self.begin_batch();
        for spec in self.connections.touching(component) {
            if self.detach(&spec).is_some() {
                let other = if spec.input_component == component {
                    spec.output_component
                } else {
                    spec.input_component
                };
                self.refresh_status(other);
                self.mark_trigger(spec.input_component);
            }
        }
        self.nodes.shift_remove(&component);
        self.cache.remove_component(component);
        self.queue.forget(component);
        self.emit(GraphEvent::ComponentRemoved { component });
        self.end_batch();
        Ok(())
    }

    /// Update the diagnostic display name.
    pub fn rename(&mut self, component: ComponentId, name: impl Into<String>) -> Result<()> {
        let node = self
            .nodes
            .get_mut(&component)
            .ok_or(GraphError::UnknownComponent(component))?;
        let name = name.into();
        node.rename(name.clone());
        self.emit(GraphEvent::ComponentRenamed { component, name });
        Ok(())
    }

    pub fn contains(&self, component: ComponentId) -> bool {
        self.nodes.contains_key(&component)
    }

    pub fn node(&self, component: ComponentId) -> Option<&Node> {
        self.nodes.get(&component)
    }

    /// Registered components in registration order.
    pub fn component_ids(&self) -> Vec<ComponentId> {
        self.nodes.keys().copied().collect()
    }

    pub fn status(&self, component: ComponentId) -> Option<NodeStatus> {
        self.nodes.get(&component).map(|n| n.status.clone())
    }

    pub fn level(&self, component: ComponentId) -> Option<u32> {
        self.nodes.get(&component).map(|n| n.level)
    }

    pub fn cached_output(&self, component: ComponentId, param: &str) -> Option<Value> {
        self.cache.get(component, param).cloned()
    }

    pub fn connection(&self, id: ConnectionId) -> Option<Connection> {
        self.connections.get(id).cloned()
    }

    /// Components waiting to recompute.
    pub fn pending_count(&self) -> usize {
        self.queue.ready_len()
    }

    pub fn has_ready(&self) -> bool {
        self.queue.has_ready()
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_idle()
    }

    // ------------------------------------------------------------------
    // Strict mode
    // ------------------------------------------------------------------

    /// Enable type checking for future connections.
    ///
    /// Existing connections are checked by parameter *name*, while
    /// `add_connection` checks parameter *type*. The two disagree when a
    /// declared type differs from the name; that asymmetry is kept as is.
    pub fn restrict(&mut self) -> Result<()> {
        let count = self
            .connections
            .iter()
            .filter(|c| c.spec.input_param != c.spec.output_param)
            .count() as u32;
        if count > 0 {
            return Err(GraphError::StrictViolations { count });
        }
        self.strict = true;
        Ok(())
    }

    pub fn unstrict(&mut self) {
        self.strict = false;
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    // ------------------------------------------------------------------
    // Status and notifications
    // ------------------------------------------------------------------

    pub(crate) fn set_status(&mut self, component: ComponentId, status: NodeStatus) {
        let Some(node) = self.nodes.get_mut(&component) else {
            return;
        };
        if node.status == status {
            return;
        }
        node.status = status.clone();
        self.emit(GraphEvent::StatusChanged { component, status });
    }

    /// `Connected` when any edge touches the node, `Idle` otherwise.
    pub(crate) fn settled_status(&self, component: ComponentId) -> NodeStatus {
        let connected = self
            .nodes
            .get(&component)
            .is_some_and(Node::has_connections);
        if connected {
            NodeStatus::new(StatusKind::Connected, "")
        } else {
            NodeStatus::new(StatusKind::Idle, "")
        }
    }

    /// Status pass after a successful mutation.
    ///
    /// Clears a previous validation error; leaves running and congested
    /// nodes alone.
    pub(crate) fn refresh_status(&mut self, component: ComponentId) {
        let Some(node) = self.nodes.get(&component) else {
            return;
        };
        if node.status.kind == StatusKind::Processing || self.queue.is_congested(component) {
            return;
        }
        let settled = self.settled_status(component);
        self.set_status(component, settled);
    }

    pub(crate) fn emit(&mut self, event: GraphEvent) {
        self.outbox.push(event);
    }

    /// Take the notifications produced since the last call.
    pub fn take_events(&mut self) -> Vec<GraphEvent> {
        std::mem::take(&mut self.outbox)
    }
}

impl Default for GraphState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ParamKind, ParamOptions};

    fn id(raw: u64) -> ComponentId {
        ComponentId::from(raw)
    }

    /// Drain the queue as the runtime would, without calling listeners.
    fn settle(state: &mut GraphState) {
        loop {
            let wave = state.take_wave();
            if wave.is_empty() {
                break;
            }
            for component in wave {
                state.queue.finish(component);
            }
        }
    }

    #[test]
    fn register_twice_fails() {
        let mut state = GraphState::new();
        state.register(id(1), "a").unwrap();
        assert!(matches!(
            state.register(id(1), "a"),
            Err(GraphError::ComponentExists(_))
        ));
    }

    #[test]
    fn register_queues_first_trigger_and_settles_idle() {
        let mut state = GraphState::new();
        state.register(id(1), "a").unwrap();

        assert_eq!(state.pending_count(), 1);
        assert_eq!(state.status(id(1)).unwrap().kind, StatusKind::Idle);
        assert!(matches!(
            state.take_events().first(),
            Some(GraphEvent::ComponentRegistered { .. })
        ));
    }

    #[test]
    fn remove_component_cascades() {
        let mut state = GraphState::new();
        for raw in 1..=3 {
            state.register(id(raw), format!("c{raw}")).unwrap();
            state
                .add_param(id(raw), "in", ParamOptions::new(), ParamKind::Input)
                .unwrap();
            state
                .add_param(id(raw), "out", ParamOptions::new(), ParamKind::Output)
                .unwrap();
        }
        state.add_connection((id(2), "in"), (id(1), "out")).unwrap();
        state.add_connection((id(3), "in"), (id(2), "out")).unwrap();
        settle(&mut state);

        state.remove_component(id(2)).unwrap();

        assert!(!state.contains(id(2)));
        assert!(state.connections().is_empty());
        assert!(state.is_isolated(id(1)));
        assert_eq!(state.level(id(3)), Some(0));
        assert_eq!(state.take_wave(), vec![id(3)]);
    }

    #[test]
    fn restrict_counts_name_mismatches() {
        let mut state = GraphState::new();
        for raw in 1..=2 {
            state.register(id(raw), "c").unwrap();
            state
                .add_param(id(raw), "x", ParamOptions::new(), ParamKind::Input)
                .unwrap();
            state
                .add_param(id(raw), "y", ParamOptions::new().ty("x"), ParamKind::Output)
                .unwrap();
        }
        // Same type, different names: accepted live, counted by restrict.
        state.add_connection((id(2), "x"), (id(1), "y")).unwrap();

        assert!(matches!(
            state.restrict(),
            Err(GraphError::StrictViolations { count: 1 })
        ));
        assert!(!state.is_strict());

        state.unstrict();
        assert!(!state.is_strict());
    }

    #[test]
    fn rename_emits_event() {
        let mut state = GraphState::new();
        state.register(id(1), "old").unwrap();
        state.take_events();

        state.rename(id(1), "new").unwrap();
        assert_eq!(state.node(id(1)).unwrap().name(), "new");
        assert_eq!(
            state.take_events(),
            vec![GraphEvent::ComponentRenamed {
                component: id(1),
                name: "new".into()
            }]
        );
    }
}
