use serde::{Deserialize, Serialize};

use crate::error::PolyResult;

/// Knobs for a code-generation session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PolyConfig {
    /// Prefix of reabstraction thunk symbols; a per-session counter is appended.
    pub thunk_prefix: String,

    /// Prefix of protocol witness thunk symbols.
    pub witness_prefix: String,

    /// Prefix of vtable override thunk symbols.
    pub override_prefix: String,

    /// Log every function installed into the module at trace level.
    pub dump_functions: bool,
}

impl Default for PolyConfig {
    fn default() -> Self {
        Self {
            thunk_prefix: "reabstraction_thunk_".to_string(),
            witness_prefix: "protocol_witness_".to_string(),
            override_prefix: "vtable_thunk_".to_string(),
            dump_functions: false,
        }
    }
}

impl PolyConfig {
    pub fn from_toml(source: &str) -> PolyResult<Self> {
        Ok(toml::from_str(source)?)
    }
}
