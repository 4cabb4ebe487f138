//! Graph Nodes
//!
//! This module defines the per-component node stored in the graph arena:
//! its parameter maps, level, auto-update flag and observational status.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Parameter name meaning "any/untyped single-slot passthrough".
pub const WILDCARD: &str = "_";

/// Stable identifier of a component.
///
/// The id is owned by the external component; the graph only stores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentId(u64);

impl ComponentId {
    /// Generate a new unique component ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for ComponentId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<u64> for ComponentId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One side of a connection: a component and one of its parameter names.
///
/// Converting a bare [`ComponentId`] yields the wildcard parameter `_`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub component: ComponentId,
    pub param: String,
}

impl Endpoint {
    pub fn new(component: ComponentId, param: impl Into<String>) -> Self {
        let param = param.into();
        Self {
            component,
            param: if param.is_empty() {
                WILDCARD.to_string()
            } else {
                param
            },
        }
    }
}

impl From<ComponentId> for Endpoint {
    fn from(component: ComponentId) -> Self {
        Self::new(component, WILDCARD)
    }
}

impl From<(ComponentId, &str)> for Endpoint {
    fn from((component, param): (ComponentId, &str)) -> Self {
        Self::new(component, param)
    }
}

impl From<(ComponentId, String)> for Endpoint {
    fn from((component, param): (ComponentId, String)) -> Self {
        Self::new(component, param)
    }
}

/// Whether a parameter is consumed or produced by its component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    Input,
    Output,
}

impl fmt::Display for ParamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => f.write_str("input"),
            Self::Output => f.write_str("output"),
        }
    }
}

/// An input parameter and the outputs currently feeding it.
#[derive(Debug, Clone)]
pub struct InputParam {
    pub ty: String,
    /// Maximum number of providers; `0` means unlimited.
    pub limit: u32,
    pub required: bool,
    /// `(component, output_param)` pairs, in connection order.
    pub providers: SmallVec<[Endpoint; 2]>,
}

impl InputParam {
    /// Whether another provider may be attached.
    pub fn has_capacity(&self) -> bool {
        self.limit == 0 || self.providers.len() < self.limit as usize
    }
}

/// An output parameter and the inputs it feeds.
#[derive(Debug, Clone)]
pub struct OutputParam {
    pub ty: String,
    /// `(component, input_param)` pairs, in connection order.
    pub consumers: SmallVec<[Endpoint; 2]>,
}

/// Coarse node state, purely observational.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    Connected,
    Idle,
    Error,
    Processing,
    Unknown,
}

/// Node status plus a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
    pub kind: StatusKind,
    pub message: String,
}

impl NodeStatus {
    pub fn new(kind: StatusKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind == StatusKind::Error
    }
}

impl Default for NodeStatus {
    fn default() -> Self {
        Self::new(StatusKind::Unknown, "")
    }
}

/// A registered component in the dependency graph.
#[derive(Debug)]
pub struct Node {
    id: ComponentId,

    /// Display name, diagnostic only.
    name: String,

    pub(crate) inputs: IndexMap<String, InputParam>,
    pub(crate) outputs: IndexMap<String, OutputParam>,

    /// Longest dependency-path length ending at this node.
    pub(crate) level: u32,

    /// When false, upstream changes congest the node instead of recomputing it.
    pub(crate) auto_updatable: bool,

    pub(crate) status: NodeStatus,
}

impl Node {
    pub fn new(id: ComponentId, name: impl Into<String>, auto_updatable: bool) -> Self {
        Self {
            id,
            name: name.into(),
            inputs: IndexMap::new(),
            outputs: IndexMap::new(),
            level: 0,
            auto_updatable,
            status: NodeStatus::default(),
        }
    }

    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn is_auto_updatable(&self) -> bool {
        self.auto_updatable
    }

    pub fn status(&self) -> &NodeStatus {
        &self.status
    }

    pub fn inputs(&self) -> &IndexMap<String, InputParam> {
        &self.inputs
    }

    pub fn outputs(&self) -> &IndexMap<String, OutputParam> {
        &self.outputs
    }

    pub fn has_param(&self, name: &str, kind: ParamKind) -> bool {
        match kind {
            ParamKind::Input => self.inputs.contains_key(name),
            ParamKind::Output => self.outputs.contains_key(name),
        }
    }

    /// Components feeding any input of this node, deduplicated, in order.
    pub fn provider_components(&self) -> Vec<ComponentId> {
        let mut seen = Vec::new();
        for provider in self.inputs.values().flat_map(|p| p.providers.iter()) {
            if !seen.contains(&provider.component) {
                seen.push(provider.component);
            }
        }
        seen
    }

    /// Components consuming any output of this node, deduplicated, in order.
    pub fn consumer_components(&self) -> Vec<ComponentId> {
        let mut seen = Vec::new();
        for consumer in self.outputs.values().flat_map(|p| p.consumers.iter()) {
            if !seen.contains(&consumer.component) {
                seen.push(consumer.component);
            }
        }
        seen
    }

    /// Required inputs that currently have no provider.
    pub fn missing_required(&self) -> Vec<&str> {
        self.inputs
            .iter()
            .filter(|(_, p)| p.required && p.providers.is_empty())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn has_connections(&self) -> bool {
        self.inputs.values().any(|p| !p.providers.is_empty())
            || self.outputs.values().any(|p| !p.consumers.is_empty())
    }
}
