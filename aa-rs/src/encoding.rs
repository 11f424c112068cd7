use crate::types::{BuildRequest, Call, UserOperation};
use anyhow::{anyhow, bail, Context, Result};
use ethers::types::{Address, Bytes, H256, U256};

pub fn fmt_address(addr: Address) -> String {
    format!("0x{}", hex::encode(addr.as_bytes()))
}

pub fn fmt_h256(h: H256) -> String {
    format!("0x{}", hex::encode(h.as_bytes()))
}

/// JSON-RPC "quantity" encoding.
pub fn fmt_u256(v: U256) -> String {
    if v.is_zero() {
        "0x0".to_string()
    } else {
        format!("0x{:x}", v)
    }
}

pub fn fmt_bytes(b: &Bytes) -> String {
    format!("0x{}", hex::encode(b.as_ref()))
}

/// The `eth_sendUserOperation` wire shape.
pub fn user_op_to_json(op: &UserOperation) -> serde_json::Value {
    serde_json::json!({
        "sender": fmt_address(op.sender),
        "nonce": fmt_u256(op.nonce),
        "initCode": fmt_bytes(&op.init_code),
        "callData": fmt_bytes(&op.call_data),
        "callGasLimit": fmt_u256(op.call_gas_limit),
        "verificationGasLimit": fmt_u256(op.verification_gas_limit),
        "preVerificationGas": fmt_u256(op.pre_verification_gas),
        "maxFeePerGas": fmt_u256(op.max_fee_per_gas),
        "maxPriorityFeePerGas": fmt_u256(op.max_priority_fee_per_gas),
        "paymasterAndData": fmt_bytes(&op.paymaster_and_data),
        "signature": fmt_bytes(&op.signature),
    })
}

pub fn parse_u256_quantity(s: &str) -> Result<U256> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    if s.is_empty() {
        return Ok(U256::zero());
    }
    Ok(U256::from_str_radix(s, 16)?)
}

/// Decimal or `0x`-prefixed hex. Negative values are rejected outright.
pub fn parse_u256(s: &str) -> Result<U256> {
    let s = s.trim();
    if s.starts_with('-') {
        bail!("negative value not allowed: {s}");
    }
    if s.starts_with("0x") {
        return parse_u256_quantity(s);
    }
    U256::from_dec_str(s).map_err(|e| anyhow!("invalid integer {s:?}: {e}"))
}

pub fn parse_bytes(s: &str) -> Result<Bytes> {
    let s = s.trim();
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(s).with_context(|| format!("invalid hex {s:?}"))?;
    Ok(Bytes::from(bytes))
}

pub fn parse_h256(s: &str) -> Result<H256> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(s)?;
    if bytes.len() != 32 {
        bail!("expected 32-byte hex, got {} bytes", bytes.len());
    }
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&bytes);
    Ok(H256(arr))
}

/// Parses `<to>,<value>[,<data>[,<gasLimit>]]`.
pub fn parse_call(s: &str) -> Result<Call> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    if parts.len() < 2 || parts.len() > 4 {
        bail!("expected <to>,<value>[,<data>[,<gasLimit>]], got {s:?}");
    }

    let to = parts[0]
        .parse::<Address>()
        .map_err(|e| anyhow!("invalid call target {:?}: {e}", parts[0]))?;
    let value = parse_u256(parts[1]).context("invalid call value")?;
    let data = match parts.get(2) {
        Some(d) if !d.is_empty() => parse_bytes(d).context("invalid call data")?,
        _ => Bytes::default(),
    };

    let mut call = Call::new(to, value, data);
    if let Some(g) = parts.get(3) {
        call = call.gas_limit(parse_u256(g).context("invalid call gas limit")?);
    }
    Ok(call)
}

/// Parses the `--call` / `--nonce` flags into a request. Only single-call
/// requests are accepted, so a batch fails here before any RPC is made.
pub fn parse_build_request(calls: &[String], nonce: Option<&str>) -> Result<BuildRequest> {
    if calls.len() != 1 {
        bail!(
            "exactly one --call is supported per user operation, got {}",
            calls.len()
        );
    }
    let mut request = BuildRequest::single(parse_call(&calls[0])?);
    if let Some(nonce) = nonce {
        request = request.nonce(parse_u256(nonce).context("invalid --nonce")?);
    }
    Ok(request)
}
