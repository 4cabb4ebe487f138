//! Parameter Registry
//!
//! Per-node input and output parameter definitions. Removing a parameter
//! severs its connections first, so the connection table never keeps a
//! dangling provider or consumer.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::node::{ComponentId, InputParam, OutputParam, ParamKind, WILDCARD};
use super::state::GraphState;
use crate::error::{GraphError, Result};
use crate::events::GraphEvent;

/// Optional settings for a new parameter.
///
/// Unset fields default to `type = name`, `limit = 0` (unlimited) and
/// `required = false`. Output parameters ignore `limit` and `required`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamOptions {
    #[serde(rename = "type")]
    pub ty: Option<String>,
    pub limit: Option<u32>,
    pub required: Option<bool>,
}

impl ParamOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ty(mut self, ty: impl Into<String>) -> Self {
        self.ty = Some(ty.into());
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = Some(required);
        self
    }
}

/// Declared shape of a parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ParamDecl {
    Input {
        #[serde(rename = "type")]
        ty: String,
        limit: u32,
        required: bool,
    },
    Output {
        #[serde(rename = "type")]
        ty: String,
    },
}

/// A parameter as reported by [`GraphState::all_params`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamInfo {
    pub name: String,
    #[serde(flatten)]
    pub decl: ParamDecl,
}

impl ParamInfo {
    pub fn kind(&self) -> ParamKind {
        match self.decl {
            ParamDecl::Input { .. } => ParamKind::Input,
            ParamDecl::Output { .. } => ParamKind::Output,
        }
    }

    pub fn ty(&self) -> &str {
        match &self.decl {
            ParamDecl::Input { ty, .. } | ParamDecl::Output { ty } => ty,
        }
    }

    pub fn limit(&self) -> Option<u32> {
        match self.decl {
            ParamDecl::Input { limit, .. } => Some(limit),
            ParamDecl::Output { .. } => None,
        }
    }

    pub fn required(&self) -> Option<bool> {
        match self.decl {
            ParamDecl::Input { required, .. } => Some(required),
            ParamDecl::Output { .. } => None,
        }
    }
}

fn param_name(name: &str) -> &str {
    if name.is_empty() {
        WILDCARD
    } else {
        name
    }
}

impl GraphState {
    pub fn add_param(
        &mut self,
        component: ComponentId,
        name: &str,
        options: ParamOptions,
        kind: ParamKind,
    ) -> Result<()> {
        let name = param_name(name);
        let node = self
            .nodes
            .get_mut(&component)
            .ok_or(GraphError::UnknownComponent(component))?;
        if node.has_param(name, kind) {
            return Err(GraphError::ParamExists {
                component,
                param: name.to_string(),
                kind,
            });
        }

        let ty = options.ty.unwrap_or_else(|| name.to_string());
        match kind {
            ParamKind::Input => {
                node.inputs.insert(
                    name.to_string(),
                    InputParam {
                        ty,
                        limit: options.limit.unwrap_or(0),
                        required: options.required.unwrap_or(false),
                        providers: SmallVec::new(),
                    },
                );
            }
            ParamKind::Output => {
                node.outputs.insert(
                    name.to_string(),
                    OutputParam {
                        ty,
                        consumers: SmallVec::new(),
                    },
                );
            }
        }

        tracing::debug!(%component, param = name, %kind, "added parameter");
        self.emit(GraphEvent::ParamChanged { component });
        Ok(())
    }

    pub fn has_param(&self, component: ComponentId, name: &str, kind: ParamKind) -> bool {
        self.nodes
            .get(&component)
            .is_some_and(|n| n.has_param(param_name(name), kind))
    }

    /// Remove a parameter after severing every connection through it.
    pub fn remove_param(&mut self, component: ComponentId, name: &str, kind: ParamKind) -> Result<()> {
        let name = param_name(name);
        let node = self
            .nodes
            .get(&component)
            .ok_or(GraphError::UnknownComponent(component))?;
        if !node.has_param(name, kind) {
            return Err(GraphError::ParamNotFound {
                component,
                param: name.to_string(),
                kind,
            });
        }

        match kind {
            ParamKind::Input => {
                self.remove_input_providers(component, name)?;
                if let Some(node) = self.nodes.get_mut(&component) {
                    node.inputs.shift_remove(name);
                }
            }
            ParamKind::Output => {
                self.remove_output_consumers(component, name);
                if let Some(node) = self.nodes.get_mut(&component) {
                    node.outputs.shift_remove(name);
                }
                self.cache.remove(component, name);
            }
        }

        tracing::debug!(%component, param = name, %kind, "removed parameter");
        self.emit(GraphEvent::ParamChanged { component });
        Ok(())
    }

    /// Inputs first, then outputs, each in declaration order.
    pub fn all_params(&self, component: ComponentId) -> Result<Vec<ParamInfo>> {
        let node = self
            .nodes
            .get(&component)
            .ok_or(GraphError::UnknownComponent(component))?;

        let inputs = node.inputs.iter().map(|(name, p)| ParamInfo {
            name: name.clone(),
            decl: ParamDecl::Input {
                ty: p.ty.clone(),
                limit: p.limit,
                required: p.required,
            },
        });
        let outputs = node.outputs.iter().map(|(name, p)| ParamInfo {
            name: name.clone(),
            decl: ParamDecl::Output { ty: p.ty.clone() },
        });
        Ok(inputs.chain(outputs).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with(raw: u64) -> (GraphState, ComponentId) {
        let mut state = GraphState::new();
        let id = ComponentId::from(raw);
        state.register(id, "node").unwrap();
        (state, id)
    }

    #[test]
    fn defaults_follow_the_name() {
        let (mut state, id) = state_with(1);
        state
            .add_param(id, "text", ParamOptions::new(), ParamKind::Input)
            .unwrap();
        state
            .add_param(id, "_", ParamOptions::new(), ParamKind::Output)
            .unwrap();

        let params = state.all_params(id).unwrap();
        assert_eq!(params[0].ty(), "text");
        assert_eq!(params[0].limit(), Some(0));
        assert_eq!(params[0].required(), Some(false));
        assert_eq!(params[1].ty(), "_");
        assert_eq!(params[1].kind(), ParamKind::Output);
        assert_eq!(params[1].limit(), None);
    }

    #[test]
    fn duplicate_param_is_rejected_per_kind() {
        let (mut state, id) = state_with(1);
        state
            .add_param(id, "x", ParamOptions::new(), ParamKind::Input)
            .unwrap();

        assert!(matches!(
            state.add_param(id, "x", ParamOptions::new(), ParamKind::Input),
            Err(GraphError::ParamExists { .. })
        ));
        // Same name on the other side is fine.
        state
            .add_param(id, "x", ParamOptions::new(), ParamKind::Output)
            .unwrap();
        assert!(state.has_param(id, "x", ParamKind::Output));
    }

    #[test]
    fn removing_missing_param_fails() {
        let (mut state, id) = state_with(1);
        assert!(matches!(
            state.remove_param(id, "nope", ParamKind::Output),
            Err(GraphError::ParamNotFound { .. })
        ));
    }

    #[test]
    fn removing_output_severs_consumers() {
        let (mut state, a) = state_with(1);
        let b = ComponentId::from(2);
        state.register(b, "b").unwrap();
        state
            .add_param(a, "out", ParamOptions::new(), ParamKind::Output)
            .unwrap();
        state
            .add_param(b, "in", ParamOptions::new(), ParamKind::Input)
            .unwrap();
        state.add_connection((b, "in"), (a, "out")).unwrap();

        state.remove_param(a, "out", ParamKind::Output).unwrap();

        assert!(state.connections().is_empty());
        assert!(state.node(b).unwrap().inputs()["in"].providers.is_empty());
        assert!(!state.has_param(a, "out", ParamKind::Output));
    }

    #[test]
    fn options_deserialize_with_type_key() {
        let options: ParamOptions =
            serde_json::from_str(r#"{"type": "int", "limit": 1}"#).unwrap();
        assert_eq!(options, ParamOptions::new().ty("int").limit(1));
    }
}
