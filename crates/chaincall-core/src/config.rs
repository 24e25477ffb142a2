//! Endpoint configuration.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::error::AggregateError;
use crate::presets::{Preset, PresetRegistry};

/// Where aggregate calls go: a named preset, or an explicit URL and
/// aggregator address.
///
/// Both JSON shapes are accepted:
///
/// ```json
/// { "preset": "ethereum" }
/// { "rpcUrl": "http://localhost:8545", "multicallAddress": "0x…" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Endpoint {
    Custom {
        #[serde(rename = "rpcUrl", alias = "rpc_url")]
        rpc_url: String,
        #[serde(rename = "multicallAddress", alias = "multicall_address")]
        multicall_address: Address,
    },
    Preset {
        preset: String,
    },
}

impl Endpoint {
    pub fn preset(name: impl Into<String>) -> Self {
        Self::Preset { preset: name.into() }
    }

    pub fn custom(rpc_url: impl Into<String>, multicall_address: Address) -> Self {
        Self::Custom {
            rpc_url: rpc_url.into(),
            multicall_address,
        }
    }

    /// Resolve to a concrete URL and aggregator address.
    pub fn resolve(&self, presets: &PresetRegistry) -> Result<Preset, AggregateError> {
        match self {
            Self::Custom {
                rpc_url,
                multicall_address,
            } => Ok(Preset {
                rpc_url: rpc_url.clone(),
                multicall_address: *multicall_address,
            }),
            Self::Preset { preset } => presets.resolve(preset).cloned(),
        }
    }
}
