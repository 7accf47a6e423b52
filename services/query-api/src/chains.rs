use std::collections::BTreeMap;

use crate::error::{QueryError, QueryResult};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainInfo {
    pub rpc_endpoint: String,
    pub numeric_id: String,
    pub display_name: String,
}

impl ChainInfo {
    pub fn new(
        rpc_endpoint: impl Into<String>,
        numeric_id: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            rpc_endpoint: rpc_endpoint.into(),
            numeric_id: numeric_id.into(),
            display_name: display_name.into(),
        }
    }
}

// (chain id, rpc endpoint, hex id, display name)
const BUILTIN_CHAINS: [(&str, &str, &str, &str); 3] = [
    ("1", "https://eth.llamarpc.com", "01", "Ethereum Mainnet"),
    ("137", "https://polygon-rpc.com", "89", "Polygon Mainnet"),
    ("56", "https://bsc-rpc.publicnode.com", "38", "Binance Smart Chain"),
];

/// Read-only lookup from chain id to node endpoint.
#[derive(Clone, Debug)]
pub struct ChainRegistry {
    chains: BTreeMap<String, ChainInfo>,
}

impl ChainRegistry {
    pub fn builtin() -> Self {
        Self::from_entries(BUILTIN_CHAINS.iter().map(|(id, rpc, numeric, name)| {
            (id.to_string(), ChainInfo::new(*rpc, *numeric, *name))
        }))
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (String, ChainInfo)>) -> Self {
        Self {
            chains: entries.into_iter().collect(),
        }
    }

    pub fn resolve(&self, chain_id: &str) -> QueryResult<&ChainInfo> {
        self.chains
            .get(chain_id)
            .ok_or_else(|| QueryError::UnsupportedChain(chain_id.to_string()))
    }

    pub fn chain_ids(&self) -> impl Iterator<Item = &str> {
        self.chains.keys().map(String::as_str)
    }
}

impl Default for ChainRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
