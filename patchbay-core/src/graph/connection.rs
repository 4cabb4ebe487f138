//! Connection Table
//!
//! The flat set of directed edges between an output parameter and an input
//! parameter. Each edge is unique per 4-tuple and carries a stable
//! [`ConnectionId`] used by external layers and by the batching machinery.
//!
//! The table only records edges; the matching provider/consumer
//! back-references on the nodes are maintained by the topology engine.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::node::{ComponentId, Endpoint};

/// Opaque, stable handle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// The identifying 4-tuple of a connection.
///
/// This is also the persisted form of an edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionSpec {
    pub input_component: ComponentId,
    pub input_param: String,
    pub output_component: ComponentId,
    pub output_param: String,
}

impl ConnectionSpec {
    /// Build a spec from the consuming and producing endpoints.
    pub fn new(input: impl Into<Endpoint>, output: impl Into<Endpoint>) -> Self {
        let input = input.into();
        let output = output.into();
        Self {
            input_component: input.component,
            input_param: input.param,
            output_component: output.component,
            output_param: output.param,
        }
    }

    pub fn input(&self) -> Endpoint {
        Endpoint::new(self.input_component, self.input_param.clone())
    }

    pub fn output(&self) -> Endpoint {
        Endpoint::new(self.output_component, self.output_param.clone())
    }

    pub fn touches(&self, component: ComponentId) -> bool {
        self.input_component == component || self.output_component == component
    }
}

impl fmt::Display for ConnectionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} -> {}.{}",
            self.output_component, self.output_param, self.input_component, self.input_param
        )
    }
}

/// A live edge in the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub id: ConnectionId,
    #[serde(flatten)]
    pub spec: ConnectionSpec,
}

/// Ordered edge storage, indexed by id and by 4-tuple.
#[derive(Debug, Default)]
pub struct ConnectionTable {
    connections: IndexMap<ConnectionId, Connection>,
    by_spec: HashMap<ConnectionSpec, ConnectionId>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an edge, reusing `id` when the caller is re-adding it.
    ///
    /// The caller guarantees the spec is not already present.
    pub fn insert(&mut self, spec: ConnectionSpec, id: Option<ConnectionId>) -> ConnectionId {
        let id = id.unwrap_or_default();
        self.by_spec.insert(spec.clone(), id);
        self.connections.insert(id, Connection { id, spec });
        id
    }

    /// Remove the edge matching `spec`, keeping the order of the others.
    pub fn remove(&mut self, spec: &ConnectionSpec) -> Option<Connection> {
        let id = self.by_spec.remove(spec)?;
        self.connections.shift_remove(&id)
    }

    pub fn find(&self, spec: &ConnectionSpec) -> Option<&Connection> {
        self.by_spec
            .get(spec)
            .and_then(|id| self.connections.get(id))
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    pub fn contains(&self, spec: &ConnectionSpec) -> bool {
        self.by_spec.contains_key(spec)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    /// Edges with `component` on either side.
    pub fn touching(&self, component: ComponentId) -> Vec<ConnectionSpec> {
        self.iter()
            .filter(|c| c.spec.touches(component))
            .map(|c| c.spec.clone())
            .collect()
    }

    pub fn references(&self, component: ComponentId) -> bool {
        self.iter().any(|c| c.spec.touches(component))
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
