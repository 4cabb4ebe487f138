//! Batch guard.
//!
//! While a batch is open, trigger requests are collected instead of queued,
//! so a component touched by several mutations recomputes once.
//!
//! # Implementation
//!
//! Batches nest with a depth counter inside the graph state. The guard opens
//! one level when created and closes it when dropped, so an early return or
//! a `?` inside the batch still flushes it.

use super::engine::Graph;

/// Guard that closes a batch when dropped.
#[must_use = "the batch closes as soon as the guard is dropped"]
pub struct BatchGuard {
    graph: Graph,
}

impl BatchGuard {
    pub(crate) fn open(graph: &Graph) -> Self {
        graph.begin_batch();
        Self {
            graph: graph.clone(),
        }
    }
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        self.graph.end_batch();
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ListenerError;
    use crate::graph::{ComponentId, InputSnapshot, OutputObject};
    use crate::runtime::{ComponentHandle, Graph};

    #[test]
    fn guard_defers_until_dropped() {
        let graph = Graph::new();
        {
            let _outer = graph.batch();
            {
                let _inner = graph.batch();
                let handle = ComponentHandle::with_id(ComponentId::from(1), "a");
                let listener =
                    |_: InputSnapshot| async { Ok::<_, ListenerError>(OutputObject::new()) };
                graph.register(handle, listener).unwrap();
            }
            assert_eq!(graph.pending_count(), 0);
        }
        assert_eq!(graph.pending_count(), 1);
    }
}
