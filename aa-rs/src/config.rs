use crate::gas::DEFAULT_BASE_VERIFICATION_GAS_LIMIT;
use anyhow::{anyhow, Context, Result};
use ethers::types::{Address, U256};
use serde::Deserialize;
use std::{env, fs, path::Path};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfigRaw {
    pub chain_id: u64,
    pub rpc: String,
    #[serde(default)]
    pub rpc_env_var: Option<String>,
    pub entry_point: String,
    pub factory: String,
    #[serde(default)]
    pub gas_station_url: Option<String>,
    #[serde(default)]
    pub base_verification_gas_limit: Option<u64>,
    #[serde(default)]
    pub gas_multiplier_bps: Option<u64>,
}

/// Per-network settings: where to talk to, which contracts, and gas policy.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub chain_id: u64,
    pub rpc_url: String,
    pub entry_point: Address,
    pub factory: Address,
    pub gas_station_url: Option<String>,
    pub base_verification_gas_limit: U256,
    pub gas_multiplier_bps: u64,
}

pub fn load_network_config(path: &Path, rpc_override: Option<String>) -> Result<NetworkConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read network config at {}", path.display()))?;
    parse_network_config(&raw, rpc_override)
        .with_context(|| format!("failed to parse network config at {}", path.display()))
}

pub fn parse_network_config(raw: &str, rpc_override: Option<String>) -> Result<NetworkConfig> {
    let raw: NetworkConfigRaw = serde_json::from_str(raw)?;

    let rpc_url = if let Some(rpc) = rpc_override {
        rpc
    } else if let Some(env_var) = raw.rpc_env_var.clone() {
        env::var(&env_var).unwrap_or(raw.rpc.clone())
    } else {
        raw.rpc.clone()
    };

    if rpc_url.contains("alchemy.com/v2/") || rpc_url.contains("infura.io/v3/") {
        tracing::warn!("RPC URL looks like it may contain an API key; consider rpcEnvVar instead of committing it.");
    }

    let entry_point = parse_addr(&raw.entry_point).context("invalid entryPoint address")?;
    let factory = parse_addr(&raw.factory).context("invalid factory address")?;

    let gas_multiplier_bps = raw.gas_multiplier_bps.unwrap_or(10_000);
    if gas_multiplier_bps == 0 {
        tracing::warn!("gasMultiplierBps of 0 would zero out fees; clamping to 1");
    }

    Ok(NetworkConfig {
        chain_id: raw.chain_id,
        rpc_url,
        entry_point,
        factory,
        gas_station_url: raw.gas_station_url,
        base_verification_gas_limit: U256::from(
            raw.base_verification_gas_limit
                .unwrap_or(DEFAULT_BASE_VERIFICATION_GAS_LIMIT),
        ),
        gas_multiplier_bps: gas_multiplier_bps.max(1),
    })
}

pub fn parse_addr(s: &str) -> Result<Address> {
    s.parse::<Address>().map_err(|e| anyhow!("{e}"))
}
