//! Async Runtime
//!
//! This module drives a [`GraphState`](crate::graph::GraphState) from async
//! code: it owns the registered listeners, runs them when the scheduler says
//! so and follows component lifecycles.
//!
//! # Concepts
//!
//! ## Components
//!
//! A component is an opaque unit of computation with named input and output
//! parameters. The graph only keeps a [`Component`] handle for its id, name
//! and lifecycle notifications.
//!
//! ## Listeners
//!
//! A [`Listener`] is the component's computation: an async call from an input
//! snapshot to an output object. It is the only place the runtime awaits.
//!
//! ## Batches
//!
//! A [`BatchGuard`] groups mutations so that every affected component is
//! triggered once when the guard drops.

mod batch;
mod component;
mod engine;
mod listener;

pub use batch::BatchGuard;
pub use component::{Component, ComponentEvent, ComponentHandle};
pub use engine::Graph;
pub use listener::{Listener, ListenerResult};
