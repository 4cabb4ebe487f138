//! Error types for the graph engine.
//!
//! Validation failures from connection and parameter mutations are returned
//! to the caller as [`GraphError`]. A [`ListenerError`] never reaches the
//! caller of a trigger; it is recorded as the failing node's status.

use thiserror::Error;

use crate::graph::{ComponentId, ConnectionId, ParamKind};

/// Result type alias using [`GraphError`].
pub type Result<T> = std::result::Result<T, GraphError>;

/// Errors returned by graph mutations and snapshot codecs.
#[derive(Debug, Error)]
pub enum GraphError {
    /// The component was never registered (or has been removed).
    #[error("unknown component {0}")]
    UnknownComponent(ComponentId),

    /// A component with this id is already registered.
    #[error("component {0} is already registered")]
    ComponentExists(ComponentId),

    /// A connection endpoint references a missing component or parameter.
    #[error("unknown endpoint {component}.{param} ({kind})")]
    UnknownEndpoint {
        component: ComponentId,
        param: String,
        kind: ParamKind,
    },

    /// The input parameter already has its maximum number of providers.
    #[error("input {component}.{param} already has {limit} provider(s)")]
    LimitReached {
        component: ComponentId,
        param: String,
        limit: u32,
    },

    /// Strict mode rejected an edge between differently typed parameters.
    #[error("type mismatch: output type '{output_type}' cannot feed input type '{input_type}'")]
    TypeMismatch {
        input_type: String,
        output_type: String,
    },

    /// The edge would close a directed cycle.
    #[error("connecting {output} -> {input} would create a cycle")]
    CycleDetected {
        input: ComponentId,
        output: ComponentId,
    },

    /// The parameter already exists for that kind.
    #[error("{kind} parameter {component}.{param} already exists")]
    ParamExists {
        component: ComponentId,
        param: String,
        kind: ParamKind,
    },

    /// The parameter does not exist for that kind.
    #[error("{kind} parameter {component}.{param} not found")]
    ParamNotFound {
        component: ComponentId,
        param: String,
        kind: ParamKind,
    },

    /// No connection matches the given endpoints.
    #[error("no connection {output_component}.{output_param} -> {input_component}.{input_param}")]
    ConnectionNotFound {
        input_component: ComponentId,
        input_param: String,
        output_component: ComponentId,
        output_param: String,
    },

    /// No connection carries the given id.
    #[error("unknown connection {0}")]
    UnknownConnection(ConnectionId),

    /// Strict mode could not be enabled because existing edges violate it.
    #[error("{count} existing connection(s) violate strict mode")]
    StrictViolations { count: u32 },

    #[error("JSON snapshot error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("MessagePack encode error: {0}")]
    MsgpackEncode(#[from] rmp_serde::encode::Error),

    #[error("MessagePack decode error: {0}")]
    MsgpackDecode(#[from] rmp_serde::decode::Error),

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
}

impl GraphError {
    /// Whether this error marks the endpoint nodes as `Error`.
    ///
    /// Only the type and cycle gates flag the nodes; the other validation
    /// failures leave node status alone.
    pub fn flags_endpoints(&self) -> bool {
        matches!(self, Self::TypeMismatch { .. } | Self::CycleDetected { .. })
    }
}

/// Failure reported by a component's listener.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct ListenerError {
    pub reason: String,
}

impl ListenerError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl From<String> for ListenerError {
    fn from(reason: String) -> Self {
        Self { reason }
    }
}

impl From<&str> for ListenerError {
    fn from(reason: &str) -> Self {
        Self::new(reason)
    }
}
