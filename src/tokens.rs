//! Collateral token registry
//!
//! Metadata for the ERC-20 tokens market groups are collateralised with, used
//! to render and parse human-readable amounts. Unknown tokens are still
//! usable; they are just shown in raw units.

use crate::config::rpc::chains;
use alloy::primitives::{address, Address, U256};
use std::collections::HashMap;

/// Token metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenInfo {
    pub symbol: &'static str,
    pub decimals: u8,
}

/// Well-known collateral addresses per chain
pub mod addresses {
    use super::*;

    // === Base ===
    pub const USDC_BASE: Address = address!("833589fcd6edb6e08f4c7c32d4f71b54bda02913");
    pub const WETH_BASE: Address = address!("4200000000000000000000000000000000000006");
    pub const WSTETH_BASE: Address = address!("c1cba3fcea344f92d9239c08c0568f6f2f0ee452");

    // === Arbitrum ===
    pub const USDC_ARB: Address = address!("af88d065e77c8cc2239327c5edb3a432268e5831");
    pub const WETH_ARB: Address = address!("82af49447d8a07e3bd95bd0d56f35241523fbab1");

    // === Ethereum Mainnet ===
    pub const USDC_ETH: Address = address!("a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48");
    pub const WSTETH_ETH: Address = address!("7f39c581f595b53c5cb19bd0b3f8da6c935e2ca0");
}

pub struct TokenRegistry {
    tokens: HashMap<(u64, Address), TokenInfo>,
}

impl TokenRegistry {
    pub fn new() -> Self {
        use addresses::*;

        let known = [
            (chains::BASE, USDC_BASE, "USDC", 6),
            (chains::BASE, WETH_BASE, "WETH", 18),
            (chains::BASE, WSTETH_BASE, "wstETH", 18),
            (chains::ARBITRUM, USDC_ARB, "USDC", 6),
            (chains::ARBITRUM, WETH_ARB, "WETH", 18),
            (chains::ETHEREUM, USDC_ETH, "USDC", 6),
            (chains::ETHEREUM, WSTETH_ETH, "wstETH", 18),
        ];

        let tokens = known
            .into_iter()
            .map(|(chain, address, symbol, decimals)| {
                ((chain, address), TokenInfo { symbol, decimals })
            })
            .collect();

        Self { tokens }
    }

    pub fn get(&self, chain_id: u64, address: &Address) -> Option<&TokenInfo> {
        self.tokens.get(&(chain_id, *address))
    }

    /// Render `amount` with the token's symbol, or raw units when unknown
    pub fn display(&self, chain_id: u64, address: &Address, amount: U256) -> String {
        match self.get(chain_id, address) {
            Some(info) => format!(
                "{} {}",
                format_units(amount, info.decimals.into()),
                info.symbol
            ),
            None => format!("{} (raw units of {})", amount, address),
        }
    }
}

impl Default for TokenRegistry {
    fn default() -> Self {
        Self::new()
    }
}

static REGISTRY: std::sync::OnceLock<TokenRegistry> = std::sync::OnceLock::new();

/// Global token registry
pub fn registry() -> &'static TokenRegistry {
    REGISTRY.get_or_init(TokenRegistry::new)
}

/// Format a raw amount with `decimals` fractional digits, trailing zeros trimmed
pub fn format_units(value: U256, decimals: u32) -> String {
    if value.is_zero() {
        return "0".to_string();
    }

    let divisor = U256::from(10).pow(U256::from(decimals));
    let whole = value / divisor;
    let remainder = value % divisor;

    if remainder.is_zero() {
        return whole.to_string();
    }

    let remainder_str = format!("{:0>width$}", remainder.to_string(), width = decimals as usize);
    let trimmed = remainder_str.trim_end_matches('0');
    format!("{}.{}", whole, trimmed)
}

/// Parse a decimal string like "12.5" into raw units.
///
/// Rejects more fractional digits than `decimals` rather than rounding.
pub fn parse_units(value: &str, decimals: u32) -> Option<U256> {
    let value = value.trim();
    let (whole, fraction) = value.split_once('.').unwrap_or((value, ""));
    if (whole.is_empty() && fraction.is_empty()) || fraction.len() > decimals as usize {
        return None;
    }
    if !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
        return None;
    }

    let scale = U256::from(10).pow(U256::from(decimals));
    let whole = if whole.is_empty() {
        U256::ZERO
    } else {
        U256::from_str_radix(whole, 10).ok()?
    };
    let fraction = if fraction.is_empty() {
        U256::ZERO
    } else {
        let padded = format!("{:0<width$}", fraction, width = decimals as usize);
        U256::from_str_radix(&padded, 10).ok()?
    };

    whole.checked_mul(scale)?.checked_add(fraction)
}
