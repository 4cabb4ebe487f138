//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Settings applied when a graph is created.
///
/// Every field has a default, so a partial TOML table is enough:
///
/// ```toml
/// strict_mode = true
/// max_concurrent_triggers = 8
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Start in strict mode (type-checked connections).
    pub strict_mode: bool,

    /// `auto_updatable` flag of newly registered components.
    pub auto_update: bool,

    /// Maximum number of listeners run concurrently in one wave. `0` means
    /// no limit.
    pub max_concurrent_triggers: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            strict_mode: false,
            auto_update: true,
            max_concurrent_triggers: 0,
        }
    }
}

impl GraphConfig {
    pub fn from_toml_str(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }
}
