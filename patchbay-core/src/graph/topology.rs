//! Topology Engine
//!
//! Validates and applies edge mutations, keeps every node's level current and
//! answers reachability queries.
//!
//! # Levels
//!
//! `level(n) = 0` without providers, else `1 + max(level(p))`. After any edge
//! change at a node's inputs its level is recomputed from its providers, and
//! the change is pushed forward to consumers until levels stop moving. Levels
//! therefore strictly increase along every edge.
//!
//! # Cycle check
//!
//! Adding `output -> input` closes a cycle iff `output` is already reachable
//! from `input` along consumer edges. Because levels strictly increase along
//! edges, nothing at a level `>= level(output)` (other than `output` itself)
//! can reach `output`, which prunes the search to the band between the two
//! levels and answers immediately when `level(input) > level(output)`.

use std::collections::{HashSet, VecDeque};

use super::connection::{Connection, ConnectionId, ConnectionSpec};
use super::node::{ComponentId, Endpoint, NodeStatus, ParamKind, StatusKind, WILDCARD};
use super::state::GraphState;
use crate::error::{GraphError, Result};
use crate::events::GraphEvent;

/// Whether an edge between the two types passes the strict gate.
pub fn types_compatible(input_type: &str, output_type: &str) -> bool {
    input_type == WILDCARD || output_type == WILDCARD || input_type == output_type
}

impl GraphState {
    /// Connect `output` to `input`. Parameter names default to `_`.
    ///
    /// Checks run in order and stop at the first failure: both endpoints
    /// exist, the input has capacity, types match (strict mode only), then
    /// acyclicity. Re-adding an existing edge replaces it in place and keeps
    /// its id.
    pub fn add_connection(
        &mut self,
        input: impl Into<Endpoint>,
        output: impl Into<Endpoint>,
    ) -> Result<ConnectionId> {
        self.connect(ConnectionSpec::new(input, output))
    }

    pub fn connect(&mut self, spec: ConnectionSpec) -> Result<ConnectionId> {
        let (has_capacity, limit, input_type) = {
            let input = self.input_param(&spec.input())?;
            (input.has_capacity(), input.limit, input.ty.clone())
        };
        let output_type = self.output_type(&spec.output())?;

        if !has_capacity {
            return Err(GraphError::LimitReached {
                component: spec.input_component,
                param: spec.input_param.clone(),
                limit,
            });
        }

        if self.strict && !types_compatible(&input_type, &output_type) {
            return Err(self.reject(
                &spec,
                GraphError::TypeMismatch {
                    input_type,
                    output_type,
                },
            ));
        }

        let reused = match self.connections.find(&spec).map(|c| c.id) {
            Some(id) => {
                tracing::trace!(connection = %spec, "replacing identical connection");
                self.detach(&spec);
                Some(id)
            }
            None => None,
        };

        if reused.is_none() && self.would_create_cycle(spec.input_component, spec.output_component) {
            return Err(self.reject(
                &spec,
                GraphError::CycleDetected {
                    input: spec.input_component,
                    output: spec.output_component,
                },
            ));
        }

        let id = self.attach(spec.clone(), reused);
        tracing::debug!(connection = %spec, %id, "connected");
        self.refresh_status(spec.input_component);
        self.refresh_status(spec.output_component);
        self.mark_trigger(spec.input_component);
        Ok(id)
    }

    /// Remove one edge and re-trigger its input side.
    pub fn remove_connection(
        &mut self,
        input: impl Into<Endpoint>,
        output: impl Into<Endpoint>,
    ) -> Result<()> {
        let spec = ConnectionSpec::new(input, output);
        self.input_param(&spec.input())?;
        self.output_type(&spec.output())?;

        if self.detach(&spec).is_none() {
            return Err(GraphError::ConnectionNotFound {
                input_component: spec.input_component,
                input_param: spec.input_param,
                output_component: spec.output_component,
                output_param: spec.output_param,
            });
        }
        tracing::debug!(connection = %spec, "disconnected");
        self.refresh_status(spec.input_component);
        self.refresh_status(spec.output_component);
        self.mark_trigger(spec.input_component);
        Ok(())
    }

    pub fn remove_connection_by_id(&mut self, id: ConnectionId) -> Result<()> {
        let spec = self
            .connections
            .get(id)
            .map(|c| c.spec.clone())
            .ok_or(GraphError::UnknownConnection(id))?;
        self.remove_connection(spec.input(), spec.output())
    }

    /// Sever every provider of one input parameter, triggering it once.
    pub fn remove_input_providers(&mut self, component: ComponentId, param: &str) -> Result<()> {
        let providers = self.input_param(&Endpoint::new(component, param))?.providers.clone();

        self.begin_batch();
        for provider in providers {
            let spec = ConnectionSpec::new(Endpoint::new(component, param), provider);
            if self.detach(&spec).is_some() {
                self.refresh_status(spec.output_component);
                self.mark_trigger(component);
            }
        }
        self.refresh_status(component);
        self.end_batch();
        Ok(())
    }

    /// Sever every provider of every input of `component`.
    pub fn remove_all_input_providers(&mut self, component: ComponentId) -> Result<()> {
        let params: Vec<String> = self
            .nodes
            .get(&component)
            .ok_or(GraphError::UnknownComponent(component))?
            .inputs
            .keys()
            .cloned()
            .collect();

        self.begin_batch();
        for param in params {
            self.remove_input_providers(component, &param)?;
        }
        self.end_batch();
        Ok(())
    }

    /// Sever every consumer of one output parameter, triggering each
    /// consumer once.
    pub(crate) fn remove_output_consumers(&mut self, component: ComponentId, param: &str) {
        let consumers = match self.nodes.get(&component).and_then(|n| n.outputs.get(param)) {
            Some(output) => output.consumers.clone(),
            None => return,
        };

        self.begin_batch();
        for consumer in consumers {
            let spec = ConnectionSpec::new(consumer, Endpoint::new(component, param));
            if self.detach(&spec).is_some() {
                self.refresh_status(spec.input_component);
                self.mark_trigger(spec.input_component);
            }
        }
        self.refresh_status(component);
        self.end_batch();
    }

    /// No connection references `component`.
    pub fn is_isolated(&self, component: ComponentId) -> bool {
        !self.connections.references(component)
    }

    /// Snapshot of all connections in insertion order.
    pub fn connections(&self) -> Vec<Connection> {
        self.connections.iter().cloned().collect()
    }

    /// Whether adding `output -> input` would close a directed cycle.
    pub fn would_create_cycle(&self, input: ComponentId, output: ComponentId) -> bool {
        if input == output {
            return true;
        }
        let (Some(start), Some(target)) = (self.nodes.get(&input), self.nodes.get(&output)) else {
            return false;
        };
        let target_level = target.level;
        if start.level > target_level {
            return false;
        }

        let mut visited = HashSet::new();
        let mut stack = vec![input];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get(&current) else {
                continue;
            };
            for next in node.consumer_components() {
                if next == output {
                    tracing::trace!(%input, %output, "cycle found");
                    return true;
                }
                let below_target = self
                    .nodes
                    .get(&next)
                    .is_some_and(|n| n.level < target_level);
                if below_target && visited.insert(next) {
                    stack.push(next);
                }
            }
        }
        false
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn input_param(&self, endpoint: &Endpoint) -> Result<&super::node::InputParam> {
        self.nodes
            .get(&endpoint.component)
            .and_then(|n| n.inputs.get(&endpoint.param))
            .ok_or_else(|| GraphError::UnknownEndpoint {
                component: endpoint.component,
                param: endpoint.param.clone(),
                kind: ParamKind::Input,
            })
    }

    fn output_type(&self, endpoint: &Endpoint) -> Result<String> {
        self.nodes
            .get(&endpoint.component)
            .and_then(|n| n.outputs.get(&endpoint.param))
            .map(|p| p.ty.clone())
            .ok_or_else(|| GraphError::UnknownEndpoint {
                component: endpoint.component,
                param: endpoint.param.clone(),
                kind: ParamKind::Output,
            })
    }

    /// Flag both endpoints of a rejected edge and hand the error back.
    fn reject(&mut self, spec: &ConnectionSpec, err: GraphError) -> GraphError {
        tracing::debug!(connection = %spec, error = %err, "connection rejected");
        if err.flags_endpoints() {
            let status = NodeStatus::new(StatusKind::Error, err.to_string());
            self.set_status(spec.input_component, status.clone());
            self.set_status(spec.output_component, status);
        }
        err
    }

    /// Record an edge in the table and on both nodes.
    fn attach(&mut self, spec: ConnectionSpec, id: Option<ConnectionId>) -> ConnectionId {
        if let Some(input) = self
            .nodes
            .get_mut(&spec.input_component)
            .and_then(|n| n.inputs.get_mut(&spec.input_param))
        {
            input.providers.push(spec.output());
        }
        if let Some(output) = self
            .nodes
            .get_mut(&spec.output_component)
            .and_then(|n| n.outputs.get_mut(&spec.output_param))
        {
            output.consumers.push(spec.input());
        }

        let id = self.connections.insert(spec.clone(), id);
        self.refresh_levels(spec.input_component);
        if let Some(connection) = self.connections.get(id).cloned() {
            self.emit(GraphEvent::ConnectionAdded { connection });
        }
        id
    }

    /// Remove an edge from the table and from both nodes.
    pub(crate) fn detach(&mut self, spec: &ConnectionSpec) -> Option<Connection> {
        let connection = self.connections.remove(spec)?;

        let provider = spec.output();
        if let Some(input) = self
            .nodes
            .get_mut(&spec.input_component)
            .and_then(|n| n.inputs.get_mut(&spec.input_param))
        {
            input.providers.retain(|p| *p != provider);
        }
        let consumer = spec.input();
        if let Some(output) = self
            .nodes
            .get_mut(&spec.output_component)
            .and_then(|n| n.outputs.get_mut(&spec.output_param))
        {
            output.consumers.retain(|c| *c != consumer);
        }

        self.refresh_levels(spec.input_component);
        self.emit(GraphEvent::ConnectionRemoved {
            connection: connection.clone(),
        });
        Some(connection)
    }

    /// Recompute the level of `start` and push changes downstream.
    fn refresh_levels(&mut self, start: ComponentId) {
        let mut work = VecDeque::from([start]);
        while let Some(component) = work.pop_front() {
            let Some(node) = self.nodes.get(&component) else {
                continue;
            };
            let level = node
                .provider_components()
                .iter()
                .filter_map(|p| self.nodes.get(p))
                .map(|p| p.level + 1)
                .max()
                .unwrap_or(0);
            if level == node.level {
                continue;
            }
            let consumers = node.consumer_components();
            if let Some(node) = self.nodes.get_mut(&component) {
                node.level = level;
            }
            work.extend(consumers);
        }
    }
}
