//! Graph notifications for rendering and UI adapters.
//!
//! The engine queues a [`GraphEvent`] for every observable mutation while it
//! holds its state lock, then hands the queue to the installed [`EventSink`]
//! once the lock is released. Sinks may therefore call back into the graph.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::graph::{ComponentId, Connection, NodeStatus};

/// Events emitted after graph mutations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum GraphEvent {
    /// An edge was added (or re-added by an idempotent replace).
    #[serde(rename_all = "camelCase")]
    ConnectionAdded { connection: Connection },

    /// An edge was removed.
    #[serde(rename_all = "camelCase")]
    ConnectionRemoved { connection: Connection },

    /// A node's status or status message changed.
    #[serde(rename_all = "camelCase")]
    StatusChanged {
        component: ComponentId,
        status: NodeStatus,
    },

    /// A parameter was added to or removed from a node.
    #[serde(rename_all = "camelCase")]
    ParamChanged { component: ComponentId },

    #[serde(rename_all = "camelCase")]
    ComponentRegistered { component: ComponentId, name: String },

    #[serde(rename_all = "camelCase")]
    ComponentRemoved { component: ComponentId },

    #[serde(rename_all = "camelCase")]
    ComponentRenamed { component: ComponentId, name: String },
}

impl GraphEvent {
    /// The component this event is primarily about, if any.
    pub fn component(&self) -> Option<ComponentId> {
        match self {
            Self::ConnectionAdded { connection } | Self::ConnectionRemoved { connection } => {
                Some(connection.spec.input_component)
            }
            Self::StatusChanged { component, .. }
            | Self::ParamChanged { component }
            | Self::ComponentRegistered { component, .. }
            | Self::ComponentRemoved { component }
            | Self::ComponentRenamed { component, .. } => Some(*component),
        }
    }
}

/// Error when delivering an event fails.
#[derive(Debug, Clone, Error)]
#[error("event error: {message}")]
pub struct EventError {
    pub message: String,
}

impl EventError {
    pub fn channel_closed() -> Self {
        Self {
            message: "channel closed".to_string(),
        }
    }
}

/// Receiver of graph notifications.
///
/// This abstracts over the transport to the renderer (direct call, channel,
/// FFI bridge) so the engine can be embedded anywhere.
pub trait EventSink: Send + Sync {
    /// Deliver one event. Failures are logged by the engine and otherwise
    /// ignored; they never roll back the mutation that produced the event.
    fn send(&self, event: GraphEvent) -> Result<(), EventError>;
}

/// A sink that discards all events.
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn send(&self, _event: GraphEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// A sink that collects events in memory.
///
/// Mostly useful in tests to assert on what a mutation announced.
#[derive(Default)]
pub struct VecEventSink {
    events: Mutex<Vec<GraphEvent>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<GraphEvent> {
        self.events.lock().clone()
    }

    /// Remove and return everything collected so far.
    pub fn drain(&self) -> Vec<GraphEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for VecEventSink {
    fn send(&self, event: GraphEvent) -> Result<(), EventError> {
        self.events.lock().push(event);
        Ok(())
    }
}

/// A sink forwarding events over an unbounded tokio channel.
pub struct ChannelEventSink {
    tx: mpsc::UnboundedSender<GraphEvent>,
}

impl ChannelEventSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<GraphEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelEventSink {
    fn send(&self, event: GraphEvent) -> Result<(), EventError> {
        self.tx.send(event).map_err(|_| EventError::channel_closed())
    }
}
