//! Built-in network presets.
//!
//! Addresses are the canonical Olas deployments; endpoints are public defaults that
//! operators are expected to override in the configuration file.

use crate::{NetworkConfig, DEFAULT_BURST, DEFAULT_RATE};
use chainpilot_core::Address;
use std::collections::BTreeMap;

/// Contract key for the service registry.
pub const SERVICE_REGISTRY: &str = "service_registry";
/// Contract key for the service registry token utility.
pub const SERVICE_REGISTRY_TOKEN_UTILITY: &str = "service_registry_token_utility";
/// Contract key for the service manager.
pub const SERVICE_MANAGER: &str = "service_manager";
/// Contract key for the Safe multisig implementation used at deployment.
pub const MULTISIG_IMPLEMENTATION: &str = "multisig_implementation";

fn table(entries: &[(&str, &str)]) -> BTreeMap<String, Address> {
    entries
        .iter()
        .filter_map(|(name, address)| address.parse().ok().map(|a| (name.to_string(), a)))
        .collect()
}

/// Returns the preset for a well-known network name.
#[must_use]
pub fn preset(name: &str) -> Option<NetworkConfig> {
    match name.to_ascii_lowercase().as_str() {
        "gnosis" => Some(gnosis()),
        "ethereum" => Some(ethereum()),
        "base" => Some(base()),
        _ => None,
    }
}

/// Gnosis chain.
#[must_use]
pub fn gnosis() -> NetworkConfig {
    NetworkConfig {
        name: "gnosis".to_string(),
        rpc_urls: vec![
            "https://rpc.gnosischain.com".to_string(),
            "https://gnosis-rpc.publicnode.com".to_string(),
        ],
        chain_id: 100,
        native_symbol: "xDAI".to_string(),
        tokens: table(&[
            ("OLAS", "0xcE11e14225575945b8E6Dc0D4F2dD4C570f79d9f"),
            ("WXDAI", "0xe91D153E0b41518A2Ce8Dd3D7944Fa863463a97d"),
            ("USDC", "0x2a22f9c3b484c3629090FeED35F17Ff8F88f76F0"),
            ("SDAI", "0xaf204776c7245bF4147c2612BF6e5972Ee483701"),
            ("EURE", "0x420CA0f9B9b604cE0fd9C18EF134C705e5Fa3430"),
        ]),
        contracts: table(&[
            (SERVICE_REGISTRY, "0x9338b5153AE39BB89f50468E608eD9d764B755fD"),
            (
                SERVICE_REGISTRY_TOKEN_UTILITY,
                "0xa45E64d13A30a51b91ae0eb182e88a40e9b18eD8",
            ),
            (SERVICE_MANAGER, "0x068a4f0946cF8c7f9C1B58a3b5243Ac8843bf473"),
            (MULTISIG_IMPLEMENTATION, "0x3C1fF68f5aa342D296d4DEe4Bb1cACCA912D95fE"),
        ]),
        rate: DEFAULT_RATE,
        burst: DEFAULT_BURST,
        min_priority_fee: 1,
    }
}

/// Ethereum mainnet.
#[must_use]
pub fn ethereum() -> NetworkConfig {
    NetworkConfig {
        name: "ethereum".to_string(),
        rpc_urls: vec!["https://ethereum-rpc.publicnode.com".to_string()],
        chain_id: 1,
        native_symbol: "ETH".to_string(),
        tokens: table(&[("OLAS", "0x0001A500A6B18995B03f44bb040A5fFc28E45CB0")]),
        contracts: table(&[
            (SERVICE_REGISTRY, "0x48b6F34dDAf31f94086BFB45e69e0618DDe3677b"),
            (SERVICE_MANAGER, "0x9C14948a39a9c1A58e3f94639908F0076FA715C6"),
        ]),
        rate: DEFAULT_RATE,
        burst: DEFAULT_BURST,
        min_priority_fee: 1,
    }
}

/// Base.
#[must_use]
pub fn base() -> NetworkConfig {
    NetworkConfig {
        name: "base".to_string(),
        rpc_urls: vec!["https://mainnet.base.org".to_string()],
        chain_id: 8453,
        native_symbol: "ETH".to_string(),
        tokens: table(&[("OLAS", "0x54330d28ca3357F294334BDC454a032e7f353416")]),
        contracts: table(&[
            (SERVICE_REGISTRY, "0x3841C312061daB948332A78F042Ec61Ad09fc3D8"),
            (SERVICE_MANAGER, "0xF36183B106692DeD8b6e3B2B7347C9665f8a09B1"),
        ]),
        rate: DEFAULT_RATE,
        burst: DEFAULT_BURST,
        min_priority_fee: 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_have_complete_tables() {
        let gnosis = gnosis();
        assert_eq!(gnosis.tokens.len(), 5);
        assert_eq!(gnosis.contracts.len(), 4);
        assert!(gnosis.token_address("olas").is_some());
        assert_eq!(ethereum().contracts.len(), 2);
        assert_eq!(base().chain_id, 8453);
        assert!(preset("Gnosis").is_some());
        assert!(preset("polygon").is_none());
    }
}
