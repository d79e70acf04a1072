//! RPC endpoint configuration
//!
//! Resolution order, per chain:
//! 1. Per-chain env vars (BASE_RPC_URL, ARBITRUM_RPC_URL, etc.) - highest priority
//! 2. Provider API keys (ALCHEMY_API_KEY, then INFURA_API_KEY)
//! 3. Public RPC fallbacks - rate limited, for testing only
//!
//! ```bash
//! export BASE_RPC_URL="https://base-mainnet.g.alchemy.com/v2/YOUR_KEY"
//! # or
//! export ALCHEMY_API_KEY="YOUR_KEY"
//! ```

use std::collections::HashMap;

/// RPC URLs indexed by chain ID
#[derive(Debug, Clone, Default)]
pub struct RpcConfig {
    urls: HashMap<u64, String>,
}

/// Chain ID constants
pub mod chains {
    pub const ETHEREUM: u64 = 1;
    pub const ARBITRUM: u64 = 42161;
    pub const BASE: u64 = 8453;
    pub const BASE_SEPOLIA: u64 = 84532;
}

/// Everything needed to resolve one chain's endpoint
struct ChainEndpoints {
    chain_id: u64,
    name: &'static str,
    env_var: &'static str,
    alchemy: Option<&'static str>,
    infura: Option<&'static str>,
    public: &'static str,
}

const KNOWN_CHAINS: &[ChainEndpoints] = &[
    ChainEndpoints {
        chain_id: chains::BASE,
        name: "Base",
        env_var: "BASE_RPC_URL",
        alchemy: Some("base-mainnet"),
        infura: Some("base-mainnet"),
        public: "https://mainnet.base.org",
    },
    ChainEndpoints {
        chain_id: chains::BASE_SEPOLIA,
        name: "Base Sepolia",
        env_var: "BASE_SEPOLIA_RPC_URL",
        alchemy: Some("base-sepolia"),
        infura: Some("base-sepolia"),
        public: "https://sepolia.base.org",
    },
    ChainEndpoints {
        chain_id: chains::ARBITRUM,
        name: "Arbitrum",
        env_var: "ARBITRUM_RPC_URL",
        alchemy: Some("arb-mainnet"),
        infura: Some("arbitrum-mainnet"),
        public: "https://arb1.arbitrum.io/rpc",
    },
    ChainEndpoints {
        chain_id: chains::ETHEREUM,
        name: "Ethereum",
        env_var: "ETH_RPC_URL",
        alchemy: Some("eth-mainnet"),
        infura: Some("mainnet"),
        public: "https://eth.llamarpc.com",
    },
];

const ALCHEMY_API_KEY: &str = "ALCHEMY_API_KEY";
const INFURA_API_KEY: &str = "INFURA_API_KEY";

impl RpcConfig {
    /// Resolve RPC URLs from the environment
    pub fn from_env() -> Self {
        Self::resolve(|name| std::env::var(name).ok())
    }

    /// Resolve with an injected variable lookup
    fn resolve(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let alchemy = lookup(ALCHEMY_API_KEY);
        let infura = lookup(INFURA_API_KEY);
        let mut urls = HashMap::new();

        for chain in KNOWN_CHAINS {
            let url = if let Some(url) = lookup(chain.env_var) {
                tracing::debug!("Using {} for {}", chain.env_var, chain.name);
                url
            } else if let (Some(key), Some(sub)) = (&alchemy, chain.alchemy) {
                format!("https://{}.g.alchemy.com/v2/{}", sub, key)
            } else if let (Some(key), Some(sub)) = (&infura, chain.infura) {
                format!("https://{}.infura.io/v3/{}", sub, key)
            } else {
                tracing::warn!(
                    "No RPC configured for {}, using public RPC (rate limited)",
                    chain.name
                );
                chain.public.to_string()
            };
            urls.insert(chain.chain_id, url);
        }

        Self { urls }
    }

    /// Create with explicit RPC URLs
    pub fn with_urls(urls: HashMap<u64, String>) -> Self {
        Self { urls }
    }

    /// RPC URL for a chain
    pub fn get(&self, chain_id: u64) -> Option<&str> {
        self.urls.get(&chain_id).map(|s| s.as_str())
    }

    pub fn chains(&self) -> impl Iterator<Item = &u64> {
        self.urls.keys()
    }

    pub fn has_chain(&self, chain_id: u64) -> bool {
        self.urls.contains_key(&chain_id)
    }
}

/// Human-readable name of a known chain
pub fn chain_name(chain_id: u64) -> Option<&'static str> {
    KNOWN_CHAINS
        .iter()
        .find(|c| c.chain_id == chain_id)
        .map(|c| c.name)
}
