use crate::contracts::{chain_id_from_node, middleware_error};
use crate::error::BoxError;
use crate::provider::{FeeData, FeeOracle};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use ethers::providers::Middleware;
use ethers::types::U256;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Applies a basis-point multiplier (10_000 = 1.0x) to both fee fields.
pub fn apply_multiplier(fees: FeeData, bps: u64) -> FeeData {
    let bps = U256::from(bps.max(1));
    let scale = |v: U256| v.saturating_mul(bps) / U256::from(10_000u64);
    FeeData {
        max_fee_per_gas: scale(fees.max_fee_per_gas),
        max_priority_fee_per_gas: scale(fees.max_priority_fee_per_gas),
    }
}

/// EIP-1559 fees from the node the builder already talks to.
#[derive(Debug, Clone)]
pub struct ProviderFeeOracle<M> {
    client: Arc<M>,
    multiplier_bps: u64,
}

impl<M> ProviderFeeOracle<M> {
    pub fn new(client: Arc<M>, multiplier_bps: u64) -> Self {
        Self {
            client,
            multiplier_bps,
        }
    }
}

#[async_trait]
impl<M: Middleware + 'static> FeeOracle for ProviderFeeOracle<M> {
    async fn fee_data(&self, chain_id: u64) -> Result<FeeData, BoxError> {
        let connected =
            chain_id_from_node(self.client.get_chainid().await.map_err(middleware_error)?)?;
        if connected != chain_id {
            return Err(format!(
                "fee oracle is connected to chain {connected}, fees requested for chain {chain_id}"
            )
            .into());
        }

        let (max_fee_per_gas, max_priority_fee_per_gas) = self
            .client
            .estimate_eip1559_fees(None)
            .await
            .map_err(middleware_error)?;

        let fees = apply_multiplier(
            FeeData {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            },
            self.multiplier_bps,
        );
        if self.multiplier_bps != 10_000 {
            tracing::debug!(
                bps = self.multiplier_bps,
                max_fee_per_gas = %fees.max_fee_per_gas,
                max_priority_fee_per_gas = %fees.max_priority_fee_per_gas,
                "gas multiplier applied"
            );
        }
        Ok(fees)
    }
}

/// Which tier of a gas-station response to use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GasSpeed {
    SafeLow,
    #[default]
    Standard,
    Fast,
}

impl GasSpeed {
    fn key(self) -> &'static str {
        match self {
            GasSpeed::SafeLow => "safeLow",
            GasSpeed::Standard => "standard",
            GasSpeed::Fast => "fast",
        }
    }
}

/// Fee data from an HTTP gas station (Polygon gas station v2 response shape),
/// keyed by chain id.
///
/// Response example:
///   { "safeLow": { "maxPriorityFee": 30.0, "maxFee": 30.1 }, "standard": { ... }, "fast": { ... } }
/// Values are in gwei.
#[derive(Debug, Clone)]
pub struct GasStationClient {
    urls: HashMap<u64, String>,
    speed: GasSpeed,
    multiplier_bps: u64,
    http: reqwest::Client,
}

impl GasStationClient {
    pub fn new(urls: HashMap<u64, String>) -> Self {
        Self {
            urls,
            speed: GasSpeed::default(),
            multiplier_bps: 10_000,
            http: reqwest::Client::new(),
        }
    }

    pub fn with_speed(mut self, speed: GasSpeed) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_multiplier_bps(mut self, bps: u64) -> Self {
        self.multiplier_bps = bps;
        self
    }

    async fn fetch(&self, chain_id: u64) -> Result<FeeData> {
        let url = self
            .urls
            .get(&chain_id)
            .ok_or_else(|| anyhow!("no gas station configured for chain {chain_id}"))?;

        let resp = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;

        let status = resp.status();
        let body: Value = resp.json().await.context("failed to decode JSON")?;

        if !status.is_success() {
            return Err(anyhow!("HTTP {}: {}", status, body));
        }

        let fees = parse_gas_station_response(&body, self.speed)?;
        Ok(apply_multiplier(fees, self.multiplier_bps))
    }
}

#[async_trait]
impl FeeOracle for GasStationClient {
    async fn fee_data(&self, chain_id: u64) -> Result<FeeData, BoxError> {
        Ok(self.fetch(chain_id).await?)
    }
}

fn parse_gas_station_response(body: &Value, speed: GasSpeed) -> Result<FeeData> {
    let tier = body
        .get(speed.key())
        .ok_or_else(|| anyhow!("missing {} tier in gas station response", speed.key()))?;

    let max_fee_per_gas = gwei_field(tier, "maxFee")?;
    let max_priority_fee_per_gas = gwei_field(tier, "maxPriorityFee")?;

    if max_priority_fee_per_gas > max_fee_per_gas {
        tracing::warn!(
            %max_fee_per_gas,
            %max_priority_fee_per_gas,
            "gas station priority fee exceeds max fee"
        );
    }

    Ok(FeeData {
        max_fee_per_gas,
        max_priority_fee_per_gas,
    })
}

fn gwei_field(tier: &Value, key: &str) -> Result<U256> {
    let gwei = tier
        .get(key)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| anyhow!("missing or invalid field {key}"))?;
    if !gwei.is_finite() || gwei < 0.0 {
        bail!("invalid {key}: {gwei}");
    }
    let wei = ethers::utils::parse_units(format!("{:.9}", gwei), "gwei")
        .with_context(|| format!("invalid {key}: {gwei}"))?;
    Ok(wei.into())
}
