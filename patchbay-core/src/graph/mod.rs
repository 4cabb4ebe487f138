//! Dependency Graph
//!
//! This module implements the component dependency graph: the node arena,
//! the connection table, the output cache and the synchronous half of the
//! trigger scheduler. Everything here is plain data mutated through
//! [`GraphState`]; the async runtime in [`crate::runtime`] drives it.
//!
//! # Overview
//!
//! The graph is a directed acyclic graph where:
//!
//! - Nodes represent registered components and their named parameters
//! - Edges run from an output parameter (provider) to an input parameter
//!   (consumer)
//!
//! When a component's outputs change, its consumers are queued for
//! recomputation. The runtime drains that queue level by level, so a
//! consumer always observes its providers' settled values.
//!
//! # Design Decisions
//!
//! 1. Nodes live in one arena keyed by [`ComponentId`]; edges refer to
//!    nodes by id, never by pointer.
//!
//! 2. Every edge is stored three times: in the [`ConnectionTable`], as a
//!    provider on the input parameter and as a consumer on the output
//!    parameter. The topology engine keeps the three in step.
//!
//! 3. Levels are maintained eagerly, which keeps cycle checks cheap and
//!    gives the scheduler its execution order for free.

mod cache;
mod connection;
mod node;
mod params;
mod scheduler;
mod snapshot;
mod state;
mod topology;

pub use cache::{value_changed, InputSnapshot, InputValue, OutputCache, OutputObject};
pub use connection::{Connection, ConnectionId, ConnectionSpec, ConnectionTable};
pub use node::{
    ComponentId, Endpoint, InputParam, Node, NodeStatus, OutputParam, ParamKind, StatusKind,
    WILDCARD,
};
pub use params::{ParamDecl, ParamInfo, ParamOptions};
pub use scheduler::{TriggerQueue, CONGESTION_MESSAGE};
pub use snapshot::{RestoreReport, TopologySnapshot};
pub use state::GraphState;
pub use topology::types_compatible;
