//! Output Cache
//!
//! Last-known value per `(component, output parameter)`. The cache is written
//! only after a successful computation and read when a consumer's input
//! snapshot is assembled.
//!
//! # Change detection
//!
//! Listeners hand back a fresh output object on every run, so a value only
//! counts as unchanged when it is a scalar (null, bool, number, string) equal
//! to the cached one. Arrays and objects are new values every time and always
//! propagate. This is identity semantics, not deep equality.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::node::{ComponentId, WILDCARD};
use super::state::GraphState;

/// Output object returned by a listener: output parameter name to value.
pub type OutputObject = serde_json::Map<String, Value>;

/// One value delivered to an input parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputValue {
    /// Name of the provider's output parameter.
    pub param: String,
    pub value: Value,
}

/// Input handed to a listener: input parameter name to its provider values.
pub type InputSnapshot = IndexMap<String, Vec<InputValue>>;

/// Whether `new` should replace `old` and propagate downstream.
pub fn value_changed(old: Option<&Value>, new: &Value) -> bool {
    match old {
        Some(old) if is_scalar(old) && is_scalar(new) => old != new,
        _ => true,
    }
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

/// Per-component output values.
#[derive(Debug, Default)]
pub struct OutputCache {
    values: HashMap<ComponentId, IndexMap<String, Value>>,
}

impl OutputCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, component: ComponentId, param: &str) -> Option<&Value> {
        self.values.get(&component).and_then(|m| m.get(param))
    }

    /// Store `value` if it differs from the cached one. Returns whether it did.
    pub fn update(&mut self, component: ComponentId, param: &str, value: Value) -> bool {
        let slot = self.values.entry(component).or_default();
        if !value_changed(slot.get(param), &value) {
            return false;
        }
        slot.insert(param.to_string(), value);
        true
    }

    pub fn remove(&mut self, component: ComponentId, param: &str) -> Option<Value> {
        self.values
            .get_mut(&component)
            .and_then(|m| m.shift_remove(param))
    }

    pub fn remove_component(&mut self, component: ComponentId) {
        self.values.remove(&component);
    }

    /// Number of cached `(component, param)` entries.
    pub fn len(&self) -> usize {
        self.values.values().map(IndexMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl GraphState {
    /// Build the input snapshot of `component` from the current cache.
    ///
    /// Providers without a cached value contribute `null`. The wildcard input
    /// `_` gathers every output parameter of every provider bound to it.
    pub fn assemble_snapshot(&self, component: ComponentId) -> InputSnapshot {
        let mut snapshot = InputSnapshot::new();
        let Some(node) = self.nodes.get(&component) else {
            return snapshot;
        };

        for (name, input) in &node.inputs {
            let mut values = Vec::with_capacity(input.providers.len());
            if name == WILDCARD {
                let mut seen = Vec::new();
                for provider in &input.providers {
                    if seen.contains(&provider.component) {
                        continue;
                    }
                    seen.push(provider.component);
                    let Some(source) = self.nodes.get(&provider.component) else {
                        continue;
                    };
                    for out_name in source.outputs.keys() {
                        values.push(self.cached_input(provider.component, out_name));
                    }
                }
            } else {
                for provider in &input.providers {
                    values.push(self.cached_input(provider.component, &provider.param));
                }
            }
            snapshot.insert(name.clone(), values);
        }

        snapshot
    }

    fn cached_input(&self, component: ComponentId, param: &str) -> InputValue {
        InputValue {
            param: param.to_string(),
            value: self.cache.get(component, param).cloned().unwrap_or(Value::Null),
        }
    }

    /// Merge a listener's output into the cache.
    ///
    /// Only declared output parameters are considered. Returns the distinct
    /// consumer components that observe at least one changed value.
    pub(crate) fn apply_outputs(
        &mut self,
        component: ComponentId,
        mut output: OutputObject,
    ) -> Vec<ComponentId> {
        let Some(node) = self.nodes.get(&component) else {
            return Vec::new();
        };

        let mut changed = Vec::new();
        for name in node.outputs.keys() {
            if let Some(value) = output.remove(name) {
                if self.cache.update(component, name, value) {
                    changed.push(name.as_str());
                }
            }
        }
        if changed.is_empty() {
            return Vec::new();
        }

        let mut consumers = Vec::new();
        for (name, param) in &node.outputs {
            let changed_here = changed.contains(&name.as_str());
            for consumer in &param.consumers {
                // A wildcard input reads every output of this node.
                let observes = changed_here || consumer.param == WILDCARD;
                if observes && !consumers.contains(&consumer.component) {
                    consumers.push(consumer.component);
                }
            }
        }
        consumers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalars_compare_by_value() {
        assert!(!value_changed(Some(&json!(1)), &json!(1)));
        assert!(value_changed(Some(&json!(1)), &json!(2)));
        assert!(!value_changed(Some(&json!("a")), &json!("a")));
        assert!(value_changed(Some(&Value::Null), &json!(false)));
    }

    #[test]
    fn composites_always_change() {
        assert!(value_changed(Some(&json!([1, 2])), &json!([1, 2])));
        assert!(value_changed(Some(&json!({"a": 1})), &json!({"a": 1})));
    }

    #[test]
    fn first_value_is_a_change() {
        assert!(value_changed(None, &Value::Null));
    }

    #[test]
    fn update_reports_changes_only() {
        let mut cache = OutputCache::new();
        let id = ComponentId::from(1);

        assert!(cache.update(id, "out", json!(3)));
        assert!(!cache.update(id, "out", json!(3)));
        assert!(cache.update(id, "out", json!(4)));
        assert_eq!(cache.get(id, "out"), Some(&json!(4)));
        assert_eq!(cache.len(), 1);

        cache.remove_component(id);
        assert!(cache.is_empty());
    }
}
