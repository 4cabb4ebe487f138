//! Topology persistence.
//!
//! A snapshot stores only the connection 4-tuples and the strict flag.
//! Components and their parameters belong to the embedding application,
//! which must re-register them before restoring.

use serde::{Deserialize, Serialize};

use super::connection::ConnectionSpec;
use super::state::GraphState;
use crate::error::{GraphError, Result};

/// Persisted form of a graph's wiring.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologySnapshot {
    pub connections: Vec<ConnectionSpec>,
    #[serde(default)]
    pub strict_mode: bool,
}

impl TopologySnapshot {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(source: &str) -> Result<Self> {
        Ok(serde_json::from_str(source)?)
    }

    pub fn to_msgpack(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(self)?)
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}

/// Outcome of [`GraphState::restore`].
#[derive(Debug, Default)]
pub struct RestoreReport {
    pub restored: usize,
    /// Connections that could not be re-added, with the reason.
    pub failed: Vec<(ConnectionSpec, String)>,
    /// Set when the snapshot asked for strict mode but the restored
    /// connections violate it.
    pub strict_violations: Option<u32>,
}

impl RestoreReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.strict_violations.is_none()
    }
}

impl GraphState {
    pub fn snapshot(&self) -> TopologySnapshot {
        TopologySnapshot {
            connections: self.connections.iter().map(|c| c.spec.clone()).collect(),
            strict_mode: self.strict,
        }
    }

    /// Replay a snapshot's connections on top of the current graph.
    ///
    /// Connections are added in one batch with strict mode off, so each
    /// affected component recomputes once. Strict mode is re-applied at the
    /// end. Individual failures are collected, not returned.
    pub fn restore(&mut self, snapshot: &TopologySnapshot) -> RestoreReport {
        let mut report = RestoreReport::default();
        self.strict = false;

        self.begin_batch();
        for spec in &snapshot.connections {
            match self.connect(spec.clone()) {
                Ok(_) => report.restored += 1,
                Err(err) => {
                    tracing::warn!(connection = %spec, error = %err, "could not restore connection");
                    report.failed.push((spec.clone(), err.to_string()));
                }
            }
        }
        self.end_batch();

        if snapshot.strict_mode {
            if let Err(GraphError::StrictViolations { count }) = self.restrict() {
                report.strict_violations = Some(count);
            }
        }

        tracing::debug!(
            restored = report.restored,
            failed = report.failed.len(),
            "restored topology"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ComponentId, ParamKind, ParamOptions};

    fn id(raw: u64) -> ComponentId {
        ComponentId::from(raw)
    }

    fn pair() -> GraphState {
        let mut state = GraphState::new();
        state.register(id(1), "source").unwrap();
        state.register(id(2), "sink").unwrap();
        state
            .add_param(id(1), "value", ParamOptions::new(), ParamKind::Output)
            .unwrap();
        state
            .add_param(id(2), "value", ParamOptions::new(), ParamKind::Input)
            .unwrap();
        state
    }

    #[test]
    fn json_snapshot_restores_wiring() {
        let mut original = pair();
        original.add_connection((id(2), "value"), (id(1), "value")).unwrap();
        original.restrict().unwrap();
        let json = original.snapshot().to_json().unwrap();

        let mut restored = pair();
        let report = restored.restore(&TopologySnapshot::from_json(&json).unwrap());

        assert!(report.is_clean());
        assert_eq!(report.restored, 1);
        assert!(restored.is_strict());
        assert_eq!(restored.level(id(2)), Some(1));
    }

    #[test]
    fn msgpack_keeps_field_names() {
        let snapshot = TopologySnapshot {
            connections: vec![ConnectionSpec::new((id(2), "in"), (id(1), "out"))],
            strict_mode: false,
        };
        let bytes = snapshot.to_msgpack().unwrap();
        assert_eq!(TopologySnapshot::from_msgpack(&bytes).unwrap(), snapshot);
    }

    #[test]
    fn unknown_endpoints_are_reported() {
        let mut state = pair();
        let snapshot = TopologySnapshot {
            connections: vec![
                ConnectionSpec::new((id(2), "value"), (id(1), "value")),
                ConnectionSpec::new((id(2), "value"), (id(7), "value")),
            ],
            strict_mode: false,
        };

        let report = state.restore(&snapshot);
        assert_eq!(report.restored, 1);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0.output_component, id(7));
    }
}
