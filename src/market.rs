//! Market data from the protocol's GraphQL API
//!
//! Read-only: resolves a market to the contract addresses intents need.
//! Nothing here is ever written back.

use crate::intent::MarketRef;
use crate::{Error, Result};
use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

const MARKET_QUERY: &str = r#"
    query GetMarketData($chainId: Int!, $address: String!, $marketId: Int!) {
        markets(chainId: $chainId, marketAddress: $address, marketId: $marketId) {
            id
            marketId
            question
            startTimestamp
            endTimestamp
            settled
            poolAddress
            baseAssetMinPriceTick
            baseAssetMaxPriceTick
            marketGroup {
                address
                chainId
                question
                baseTokenName
                quoteTokenName
                collateralAsset
            }
        }
    }
"#;

/// Market group a market belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketGroupInfo {
    pub address: Address,
    pub chain_id: u64,
    pub question: Option<String>,
    pub base_token_name: Option<String>,
    pub quote_token_name: Option<String>,
    pub collateral_asset: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketInfo {
    pub market_id: u64,
    pub question: Option<String>,
    pub start_timestamp: Option<u64>,
    pub end_timestamp: Option<u64>,
    #[serde(default)]
    pub settled: bool,
    pub pool_address: Option<Address>,
    pub base_asset_min_price_tick: Option<i32>,
    pub base_asset_max_price_tick: Option<i32>,
    pub market_group: MarketGroupInfo,
}

impl MarketInfo {
    pub fn market_ref(&self) -> MarketRef {
        MarketRef {
            chain_id: self.market_group.chain_id,
            address: self.market_group.address,
            market_id: U256::from(self.market_id),
            collateral_asset: self.market_group.collateral_asset,
        }
    }

    /// Whether trades can still be placed (assuming `now` is unix seconds)
    pub fn is_open(&self, now: u64) -> bool {
        !self.settled && self.end_timestamp.map_or(true, |end| now < end)
    }
}

/// Source of market metadata
#[async_trait]
pub trait MarketSource: Send + Sync {
    async fn market(&self, chain_id: u64, address: Address, market_id: u64) -> Result<MarketInfo>;
}

#[derive(Debug, Deserialize)]
struct GraphQLResponse {
    data: Option<Value>,
    errors: Option<Vec<Value>>,
}

/// `MarketSource` over the protocol's GraphQL endpoint
pub struct GraphqlMarketSource {
    client: Client,
    endpoint: String,
}

impl GraphqlMarketSource {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    async fn query(&self, query: &str, variables: Value) -> Result<Value> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&json!({
                "query": query,
                "variables": variables
            }))
            .send()
            .await?
            .error_for_status()?;

        let result: GraphQLResponse = response.json().await?;
        into_data(result)
    }
}

fn into_data(result: GraphQLResponse) -> Result<Value> {
    if let Some(errors) = result.errors.filter(|e| !e.is_empty()) {
        return Err(Error::Market(format!("GraphQL errors: {:?}", errors)));
    }
    result
        .data
        .ok_or_else(|| Error::Market("No data in GraphQL response".to_string()))
}

fn first_market(data: Value) -> Result<MarketInfo> {
    let markets: Vec<MarketInfo> = serde_json::from_value(
        data.get("markets")
            .cloned()
            .ok_or_else(|| Error::Market("Response has no 'markets' field".to_string()))?,
    )?;
    markets
        .into_iter()
        .next()
        .ok_or_else(|| Error::Market("Market not found".to_string()))
}

#[async_trait]
impl MarketSource for GraphqlMarketSource {
    async fn market(&self, chain_id: u64, address: Address, market_id: u64) -> Result<MarketInfo> {
        let variables = json!({
            "chainId": chain_id,
            "address": address.to_string().to_lowercase(),
            "marketId": market_id,
        });

        tracing::debug!(chain_id, %address, market_id, "Querying market");
        let market = first_market(self.query(MARKET_QUERY, variables).await?)?;

        if market.market_group.chain_id != chain_id {
            return Err(Error::Market(format!(
                "Market group reports chain {} but {} was requested",
                market.market_group.chain_id, chain_id
            )));
        }
        Ok(market)
    }
}
