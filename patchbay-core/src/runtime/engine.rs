//! Graph Runtime
//!
//! [`Graph`] is the handle an application holds. It couples the synchronous
//! [`GraphState`] with the registered listeners and drives recomputation.
//!
//! # How It Works
//!
//! 1. Every mutation locks the state, applies the change and collects the
//!    resulting notifications and trigger requests.
//!
//! 2. The lock is released, then notifications go to the event sink and a
//!    waiting driver is woken if work became ready.
//!
//! 3. A drain (`run_until_idle`, or the task started by `spawn_driver`)
//!    takes waves of ready components, lowest level first, and keeps their
//!    listeners running concurrently in a `FuturesUnordered`. A listener call
//!    is the only point where the runtime suspends, and the state lock is
//!    never held across it.
//!
//! 4. When a listener settles, changed outputs are cached and their
//!    consumers queued, and the drain takes the next wave at once. Consumers
//!    of a listener that is still running are held back, so a hung listener
//!    stalls only its own downstream.
//!
//! # Thread Safety
//!
//! `Graph` is cheap to clone and can be shared across tasks. Listener and
//! component tables are `DashMap`s so that the drain can look a listener up
//! without touching the state lock.

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use futures_util::stream::{FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;

use super::batch::BatchGuard;
use super::component::{Component, ComponentEvent};
use super::listener::Listener;
use crate::config::GraphConfig;
use crate::error::{ListenerError, Result};
use crate::events::{EventSink, GraphEvent, NullEventSink};
use crate::graph::{
    ComponentId, Connection, ConnectionId, Endpoint, GraphState, NodeStatus, ParamInfo, ParamKind,
    ParamOptions, RestoreReport, TopologySnapshot,
};

struct Inner {
    state: Mutex<GraphState>,
    listeners: DashMap<ComponentId, Arc<dyn Listener>>,
    components: DashMap<ComponentId, Arc<dyn Component>>,
    sink: Arc<dyn EventSink>,
    wakeup: Arc<Notify>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        // Lets a parked driver observe that the graph is gone.
        self.wakeup.notify_one();
    }
}

/// Shared handle to a component graph.
#[derive(Clone)]
pub struct Graph {
    inner: Arc<Inner>,
}

impl Graph {
    pub fn new() -> Self {
        Self::with_config(GraphConfig::default())
    }

    pub fn with_config(config: GraphConfig) -> Self {
        Self::with_sink(config, Arc::new(NullEventSink))
    }

    pub fn with_sink(config: GraphConfig, sink: Arc<dyn EventSink>) -> Self {
        tracing::debug!(?config, "creating graph");
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(GraphState::with_config(&config)),
                listeners: DashMap::new(),
                components: DashMap::new(),
                sink,
                wakeup: Arc::new(Notify::new()),
            }),
        }
    }

    /// Run `f` under the state lock, then deliver what it produced.
    fn mutate<R>(&self, f: impl FnOnce(&mut GraphState) -> R) -> R {
        let (result, events, ready) = {
            let mut state = self.inner.state.lock();
            let result = f(&mut state);
            (result, state.take_events(), state.has_ready())
        };
        self.deliver(events);
        if ready {
            self.inner.wakeup.notify_one();
        }
        result
    }

    fn read<R>(&self, f: impl FnOnce(&GraphState) -> R) -> R {
        f(&self.inner.state.lock())
    }

    fn deliver(&self, events: Vec<GraphEvent>) {
        for event in events {
            if let Err(err) = self.inner.sink.send(event) {
                tracing::warn!(error = %err, "failed to deliver graph event");
            }
        }
    }

    // ------------------------------------------------------------------
    // Components
    // ------------------------------------------------------------------

    /// Register a component with its listener and queue its first run.
    ///
    /// If the component publishes lifecycle events and a tokio runtime is
    /// available, the graph follows them: `Removing` removes the component,
    /// `Renamed` updates its display name.
    pub fn register<L>(&self, component: Arc<dyn Component>, listener: L) -> Result<()>
    where
        L: Listener + 'static,
    {
        let id = component.id();
        let name = component.name();
        let lifecycle = component.lifecycle();

        self.mutate(|state| -> Result<()> {
            state.register(id, name)?;
            self.inner.listeners.insert(id, Arc::new(listener));
            self.inner.components.insert(id, component);
            Ok(())
        })?;

        if let Some(events) = lifecycle {
            self.follow_lifecycle(id, events);
        }
        Ok(())
    }

    fn follow_lifecycle(&self, id: ComponentId, mut events: broadcast::Receiver<ComponentEvent>) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(component = %id, "no tokio runtime, lifecycle events will be ignored");
            return;
        };
        let graph = Arc::downgrade(&self.inner);

        runtime.spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(component = %id, skipped, "lifecycle events lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                let Some(graph) = Graph::upgrade(&graph) else {
                    break;
                };
                let removing = event == ComponentEvent::Removing;
                if let Err(err) = graph.handle_component_event(id, event) {
                    tracing::debug!(component = %id, error = %err, "ignored lifecycle event");
                }
                if removing {
                    break;
                }
            }
        });
    }

    fn upgrade(inner: &Weak<Inner>) -> Option<Self> {
        inner.upgrade().map(|inner| Self { inner })
    }

    /// Apply one lifecycle event of a registered component.
    pub fn handle_component_event(&self, id: ComponentId, event: ComponentEvent) -> Result<()> {
        match event {
            ComponentEvent::Created => Ok(()),
            ComponentEvent::Removing => self.remove_component(id),
            ComponentEvent::Renamed(name) => self.mutate(|state| state.rename(id, name)),
        }
    }

    /// Remove a component, its connections, cached outputs and listener.
    pub fn remove_component(&self, id: ComponentId) -> Result<()> {
        self.mutate(|state| -> Result<()> {
            state.remove_component(id)?;
            self.inner.listeners.remove(&id);
            self.inner.components.remove(&id);
            Ok(())
        })
    }

    pub fn is_registered(&self, id: ComponentId) -> bool {
        self.read(|state| state.contains(id))
    }

    pub fn component(&self, id: ComponentId) -> Option<Arc<dyn Component>> {
        self.inner.components.get(&id).map(|c| Arc::clone(c.value()))
    }

    pub fn component_ids(&self) -> Vec<ComponentId> {
        self.read(GraphState::component_ids)
    }

    // ------------------------------------------------------------------
    // Parameters
    // ------------------------------------------------------------------

    pub fn add_param(
        &self,
        component: ComponentId,
        name: &str,
        options: ParamOptions,
        kind: ParamKind,
    ) -> Result<()> {
        self.mutate(|state| state.add_param(component, name, options, kind))
    }

    pub fn has_param(&self, component: ComponentId, name: &str, kind: ParamKind) -> bool {
        self.read(|state| state.has_param(component, name, kind))
    }

    pub fn remove_param(&self, component: ComponentId, name: &str, kind: ParamKind) -> Result<()> {
        self.mutate(|state| state.remove_param(component, name, kind))
    }

    pub fn all_params(&self, component: ComponentId) -> Result<Vec<ParamInfo>> {
        self.read(|state| state.all_params(component))
    }

    // ------------------------------------------------------------------
    // Connections
    // ------------------------------------------------------------------

    pub fn add_connection(
        &self,
        input: impl Into<Endpoint>,
        output: impl Into<Endpoint>,
    ) -> Result<ConnectionId> {
        let (input, output) = (input.into(), output.into());
        self.mutate(|state| state.add_connection(input, output))
    }

    pub fn remove_connection(
        &self,
        input: impl Into<Endpoint>,
        output: impl Into<Endpoint>,
    ) -> Result<()> {
        let (input, output) = (input.into(), output.into());
        self.mutate(|state| state.remove_connection(input, output))
    }

    pub fn remove_connection_by_id(&self, id: ConnectionId) -> Result<()> {
        self.mutate(|state| state.remove_connection_by_id(id))
    }

    pub fn remove_input_providers(&self, component: ComponentId, param: &str) -> Result<()> {
        self.mutate(|state| state.remove_input_providers(component, param))
    }

    pub fn remove_all_input_providers(&self, component: ComponentId) -> Result<()> {
        self.mutate(|state| state.remove_all_input_providers(component))
    }

    pub fn is_isolated(&self, component: ComponentId) -> bool {
        self.read(|state| state.is_isolated(component))
    }

    pub fn connections(&self) -> Vec<Connection> {
        self.read(GraphState::connections)
    }

    pub fn connection(&self, id: ConnectionId) -> Option<Connection> {
        self.read(|state| state.connection(id))
    }

    // ------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------

    /// Request a recompute of `component`.
    pub fn mark_trigger(&self, component: ComponentId) {
        self.mutate(|state| state.mark_trigger(component));
    }

    pub fn begin_batch(&self) {
        self.mutate(GraphState::begin_batch);
    }

    pub fn end_batch(&self) {
        self.mutate(GraphState::end_batch);
    }

    /// Open a batch that closes when the guard is dropped.
    pub fn batch(&self) -> BatchGuard {
        BatchGuard::open(self)
    }

    pub fn resolve(&self, component: ComponentId) -> Result<()> {
        self.mutate(|state| state.resolve(component))
    }

    pub fn set_auto_updatable(&self, component: ComponentId, auto: bool) -> Result<()> {
        self.mutate(|state| state.set_auto_updatable(component, auto))
    }

    /// Recompute one component now and queue the consumers of whatever
    /// changed.
    pub async fn trigger(&self, component: ComponentId) {
        let Some(input) = self.mutate(|state| state.begin_trigger(component)) else {
            return;
        };

        let listener = self
            .inner
            .listeners
            .get(&component)
            .map(|l| Arc::clone(l.value()));
        let result = match listener {
            Some(listener) => listener.call(input).await,
            None => Err(ListenerError::new("no listener registered")),
        };

        self.mutate(|state| state.finish_trigger(component, result));
    }

    /// Drain the work queue until no component is ready and no listener
    /// started here is still running.
    ///
    /// New work is taken whenever any listener settles or a trigger is
    /// requested, so a slow listener only delays its own consumers. Work
    /// taken by another drain running concurrently is not awaited.
    pub async fn run_until_idle(&self) {
        let mut running = FuturesUnordered::new();
        loop {
            let wave = self.mutate(GraphState::take_wave);
            if !wave.is_empty() {
                tracing::trace!(size = wave.len(), running = running.len(), "starting wave");
            }
            running.extend(wave.into_iter().map(|component| self.trigger(component)));
            if running.is_empty() {
                break;
            }

            tokio::select! {
                _ = running.next() => {}
                _ = self.inner.wakeup.notified() => {}
            }
        }
    }

    /// Drain the queue in the background whenever work becomes ready.
    ///
    /// The task holds only a weak reference and ends once every `Graph`
    /// handle is dropped.
    pub fn spawn_driver(&self) -> JoinHandle<()> {
        let graph = Arc::downgrade(&self.inner);
        let wakeup = Arc::clone(&self.inner.wakeup);

        tokio::spawn(async move {
            while let Some(handle) = Graph::upgrade(&graph) {
                handle.run_until_idle().await;
                drop(handle);
                wakeup.notified().await;
            }
            tracing::debug!("graph dropped, driver stopped");
        })
    }

    pub fn pending_count(&self) -> usize {
        self.read(GraphState::pending_count)
    }

    /// Nothing queued and no listener running.
    pub fn is_idle(&self) -> bool {
        self.read(GraphState::is_idle)
    }

    pub fn is_congested(&self, component: ComponentId) -> bool {
        self.read(|state| state.is_congested(component))
    }

    // ------------------------------------------------------------------
    // Strict mode
    // ------------------------------------------------------------------

    pub fn restrict(&self) -> Result<()> {
        self.mutate(GraphState::restrict)
    }

    pub fn unstrict(&self) {
        self.mutate(GraphState::unstrict);
    }

    pub fn is_strict(&self) -> bool {
        self.read(GraphState::is_strict)
    }

    // ------------------------------------------------------------------
    // Introspection and persistence
    // ------------------------------------------------------------------

    pub fn status(&self, component: ComponentId) -> Option<NodeStatus> {
        self.read(|state| state.status(component))
    }

    pub fn level(&self, component: ComponentId) -> Option<u32> {
        self.read(|state| state.level(component))
    }

    pub fn cached_output(&self, component: ComponentId, param: &str) -> Option<serde_json::Value> {
        self.read(|state| state.cached_output(component, param))
    }

    pub fn snapshot(&self) -> TopologySnapshot {
        self.read(GraphState::snapshot)
    }

    pub fn restore(&self, snapshot: &TopologySnapshot) -> RestoreReport {
        self.mutate(|state| state.restore(snapshot))
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{InputSnapshot, OutputObject, StatusKind};
    use crate::runtime::ComponentHandle;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn constant(value: i64) -> impl Listener {
        move |_: InputSnapshot| async move {
            let mut out = OutputObject::new();
            out.insert("out".into(), json!(value));
            Ok::<_, ListenerError>(out)
        }
    }

    #[tokio::test]
    async fn trigger_caches_outputs() {
        let graph = Graph::new();
        let source = ComponentHandle::new("source");
        let id = source.id();
        graph.register(source, constant(7)).unwrap();
        graph
            .add_param(id, "out", ParamOptions::new(), ParamKind::Output)
            .unwrap();

        graph.run_until_idle().await;

        assert_eq!(graph.cached_output(id, "out"), Some(json!(7)));
        assert_eq!(graph.status(id).unwrap().kind, StatusKind::Idle);
        assert!(graph.is_idle());
    }

    #[tokio::test]
    async fn unchanged_output_does_not_propagate() {
        let graph = Graph::new();
        let source = ComponentHandle::new("source");
        let sink = ComponentHandle::new("sink");
        let (a, b) = (source.id(), sink.id());

        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        graph.register(source, constant(1)).unwrap();
        graph
            .register(sink, move |_: InputSnapshot| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, ListenerError>(OutputObject::new()) }
            })
            .unwrap();
        graph.add_param(a, "out", ParamOptions::new(), ParamKind::Output).unwrap();
        graph.add_param(b, "in", ParamOptions::new(), ParamKind::Input).unwrap();
        graph.add_connection((b, "in"), (a, "out")).unwrap();
        graph.run_until_idle().await;
        let settled = runs.load(Ordering::SeqCst);

        // Same scalar again: the sink is not re-run.
        graph.mark_trigger(a);
        graph.run_until_idle().await;
        assert_eq!(runs.load(Ordering::SeqCst), settled);
    }

    #[tokio::test]
    async fn lifecycle_removal_is_followed() {
        let graph = Graph::new();
        let handle = ComponentHandle::new("ephemeral");
        let id = handle.id();
        graph.register(handle.clone(), constant(0)).unwrap();

        handle.destroy();
        for _ in 0..100 {
            if !graph.is_registered(id) {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(!graph.is_registered(id));
        assert!(graph.component(id).is_none());
    }

    #[tokio::test]
    async fn driver_stops_with_the_graph() {
        let graph = Graph::new();
        let driver = graph.spawn_driver();
        drop(graph);
        driver.await.unwrap();
    }
}
