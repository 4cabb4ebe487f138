//! Component handles and lifecycle notifications.
//!
//! The graph never owns a component's computation, only a handle to it.
//! Components that can be destroyed or renamed from the outside announce it
//! over a broadcast channel; the graph subscribes on registration.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::graph::ComponentId;

/// Capacity of a [`ComponentHandle`]'s lifecycle channel.
const LIFECYCLE_CAPACITY: usize = 16;

/// Lifecycle notifications published by a component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComponentEvent {
    Created,
    /// The component is going away; the graph removes its node.
    Removing,
    Renamed(String),
}

/// A component as seen by the graph.
pub trait Component: Send + Sync {
    fn id(&self) -> ComponentId;

    /// Display name, diagnostic only.
    fn name(&self) -> String;

    /// A fresh subscription to the component's lifecycle events, if it has
    /// any.
    fn lifecycle(&self) -> Option<broadcast::Receiver<ComponentEvent>> {
        None
    }
}

/// Ready-made [`Component`] with a lifecycle channel.
pub struct ComponentHandle {
    id: ComponentId,
    name: Mutex<String>,
    events: broadcast::Sender<ComponentEvent>,
}

impl ComponentHandle {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Self::with_id(ComponentId::new(), name)
    }

    pub fn with_id(id: ComponentId, name: impl Into<String>) -> Arc<Self> {
        let (events, _) = broadcast::channel(LIFECYCLE_CAPACITY);
        Arc::new(Self {
            id,
            name: Mutex::new(name.into()),
            events,
        })
    }

    pub fn rename(&self, name: impl Into<String>) {
        let name = name.into();
        *self.name.lock() = name.clone();
        self.publish(ComponentEvent::Renamed(name));
    }

    /// Announce that the component is being destroyed.
    pub fn destroy(&self) {
        self.publish(ComponentEvent::Removing);
    }

    fn publish(&self, event: ComponentEvent) {
        if self.events.send(event).is_err() {
            tracing::trace!(component = %self.id, "no lifecycle subscribers");
        }
    }
}

impl Component for ComponentHandle {
    fn id(&self) -> ComponentId {
        self.id
    }

    fn name(&self) -> String {
        self.name.lock().clone()
    }

    fn lifecycle(&self) -> Option<broadcast::Receiver<ComponentEvent>> {
        Some(self.events.subscribe())
    }
}
