//! Built-in network presets.
//!
//! A preset names an RPC endpoint and the aggregator contract deployed on
//! that network. The table is an ordinary value handed to the executor, so
//! callers can extend or replace it without touching global state.

use alloy_primitives::{address, Address};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::AggregateError;

/// The aggregator deployment shared by every built-in network.
pub const MULTICALL3: Address = address!("ca11bde05977b3631167028862be2a173976ca11");

/// Endpoint and aggregator address for one network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preset {
    pub rpc_url: String,
    pub multicall_address: Address,
}

/// Immutable name → [`Preset`] table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PresetRegistry {
    presets: IndexMap<String, Preset>,
}

impl PresetRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The networks shipped with the library.
    pub fn builtin() -> Self {
        let table = [
            ("ethereum", "https://cloudflare-eth.com"),
            ("kovan", "https://kovan.poa.network"),
            ("rinkeby", "https://rpc.ankr.com/eth_rinkeby"),
            ("goerli", "https://rpc.ankr.com/eth_goerli"),
            ("ropsten", "https://rpc.ankr.com/eth_ropsten"),
            ("xdai", "https://rpc.gnosischain.com"),
            ("bsc", "https://bsc-dataseed.binance.org"),
        ];
        table
            .into_iter()
            .fold(Self::empty(), |reg, (name, url)| {
                reg.with_preset(
                    name,
                    Preset {
                        rpc_url: url.to_string(),
                        multicall_address: MULTICALL3,
                    },
                )
            })
    }

    /// Add or replace a preset.
    pub fn with_preset(mut self, name: impl Into<String>, preset: Preset) -> Self {
        self.presets.insert(name.into(), preset);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Preset> {
        self.presets.get(name)
    }

    /// Look up `name`, failing with [`AggregateError::UnknownPreset`].
    pub fn resolve(&self, name: &str) -> Result<&Preset, AggregateError> {
        self.get(name).ok_or_else(|| AggregateError::UnknownPreset {
            name: name.to_string(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Preset)> {
        self.presets.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_networks() {
        let reg = PresetRegistry::builtin();
        let names: Vec<_> = reg.iter().map(|(n, _)| n).collect();
        assert_eq!(
            names,
            vec!["ethereum", "kovan", "rinkeby", "goerli", "ropsten", "xdai", "bsc"]
        );
        assert_eq!(reg.resolve("bsc").unwrap().multicall_address, MULTICALL3);
    }

    #[test]
    fn unknown_preset() {
        let err = PresetRegistry::builtin().resolve("moonbase").unwrap_err();
        assert_eq!(err.to_string(), "Unknown preset moonbase");
    }

    #[test]
    fn custom_preset_overrides_builtin() {
        let reg = PresetRegistry::builtin().with_preset(
            "ethereum",
            Preset {
                rpc_url: "http://localhost:8545".into(),
                multicall_address: Address::repeat_byte(0x42),
            },
        );
        assert_eq!(reg.len(), 7);
        assert_eq!(reg.resolve("ethereum").unwrap().rpc_url, "http://localhost:8545");
    }
}
