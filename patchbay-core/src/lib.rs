//! Patchbay Core
//!
//! This crate provides the reactive dependency-graph engine behind Patchbay.
//! Independent components expose named input and output parameters; the
//! engine wires them together and keeps their values flowing. It implements:
//!
//! - Connection validation (arity limits, strict type checks, acyclicity)
//! - Incremental level maintenance for topological execution order
//! - Per-parameter output caching with change detection
//! - A trigger scheduler with batching and congestion control
//! - Topology snapshots in JSON and MessagePack
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: synchronous graph state (nodes, connections, cache, scheduler queue)
//! - `runtime`: the async [`Graph`](runtime::Graph) handle that runs listeners
//! - `events`: notifications for rendering and UI adapters
//! - `config`: engine settings, loadable from TOML
//! - `error`: error types
//!
//! # Example
//!
//! ```rust,ignore
//! use patchbay_core::graph::{OutputObject, ParamKind, ParamOptions};
//! use patchbay_core::runtime::{Component, ComponentHandle, Graph};
//!
//! let graph = Graph::new();
//!
//! let source = ComponentHandle::new("source");
//! let sink = ComponentHandle::new("sink");
//! let (a, b) = (source.id(), sink.id());
//!
//! graph.register(source, |_| async {
//!     let mut out = OutputObject::new();
//!     out.insert("value".into(), 42.into());
//!     Ok(out)
//! })?;
//! graph.register(sink, |input| async move {
//!     println!("received {:?}", input["value"]);
//!     Ok(OutputObject::new())
//! })?;
//!
//! graph.add_param(a, "value", ParamOptions::new(), ParamKind::Output)?;
//! graph.add_param(b, "value", ParamOptions::new(), ParamKind::Input)?;
//! graph.add_connection((b, "value"), (a, "value"))?;
//!
//! graph.run_until_idle().await;
//! // prints: received [InputValue { param: "value", value: Number(42) }]
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod graph;
pub mod runtime;

pub use config::GraphConfig;
pub use error::{GraphError, ListenerError, Result};
pub use events::{ChannelEventSink, EventSink, GraphEvent, NullEventSink, VecEventSink};
pub use runtime::Graph;
