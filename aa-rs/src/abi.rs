//! Static contract interfaces (SimpleAccount / SimpleAccountFactory / EntryPoint v0.6)
//! and the revert selectors we know how to decode.

use ethers::abi::{self, ParamType, Token};
use ethers::contract::Lazy;
use std::collections::HashMap;

pub mod account {
    use ethers::contract::abigen;

    // eth-infinitism SimpleAccount v0.6. Only the surface the builder touches.
    abigen!(
        SimpleAccount,
        r#"[
            function execute(address dest, uint256 value, bytes func)
            function getNonce() view returns (uint256)
        ]"#
    );
}

pub mod factory {
    use ethers::contract::abigen;

    abigen!(
        SimpleAccountFactory,
        r#"[
            function createAccount(address owner, uint256 salt) returns (address ret)
            function getAddress(address owner, uint256 salt) view returns (address)
        ]"#
    );
}

pub mod entry_point {
    use ethers::contract::abigen;

    // JSON form: the human-readable parser cannot take a tuple parameter. No
    // `internalType` on the struct, so the binding takes the plain 11-tuple from
    // `UserOperation::as_abi_tuple`.
    abigen!(
        EntryPoint,
        r#"[{"inputs":[{"components":[{"name":"sender","type":"address"},{"name":"nonce","type":"uint256"},{"name":"initCode","type":"bytes"},{"name":"callData","type":"bytes"},{"name":"callGasLimit","type":"uint256"},{"name":"verificationGasLimit","type":"uint256"},{"name":"preVerificationGas","type":"uint256"},{"name":"maxFeePerGas","type":"uint256"},{"name":"maxPriorityFeePerGas","type":"uint256"},{"name":"paymasterAndData","type":"bytes"},{"name":"signature","type":"bytes"}],"name":"userOp","type":"tuple"}],"name":"getUserOpHash","outputs":[{"name":"","type":"bytes32"}],"stateMutability":"view","type":"function"}]"#
    );
}

/// selector -> (error name, parameter types)
static REVERTS: Lazy<HashMap<[u8; 4], (&'static str, Vec<ParamType>)>> = Lazy::new(|| {
    [
        ("Error", vec![ParamType::String]),
        ("FailedOp", vec![ParamType::Uint(256), ParamType::String]),
        ("SignatureValidationFailed", vec![ParamType::Address]),
        ("SenderAddressResult", vec![ParamType::Address]),
    ]
    .into_iter()
    .map(|(name, params)| {
        let args: Vec<String> = params.iter().map(|p| p.to_string()).collect();
        let signature = format!("{}({})", name, args.join(","));
        (ethers::utils::id(signature), (name, params))
    })
    .collect()
});

/// Decodes revert data from the entry point / account / `require` into a readable
/// string. Returns `None` for unknown selectors or malformed payloads.
pub fn decode_revert(data: &[u8]) -> Option<String> {
    if data.len() < 4 {
        return None;
    }
    let mut selector = [0u8; 4];
    selector.copy_from_slice(&data[..4]);
    let (name, params) = REVERTS.get(&selector)?;
    let tokens = abi::decode(params, &data[4..]).ok()?;

    // Plain `require(cond, "msg")` reverts read better without the wrapper.
    if *name == "Error" {
        if let [Token::String(msg)] = tokens.as_slice() {
            return Some(msg.clone());
        }
    }

    let args: Vec<String> = tokens.iter().map(fmt_token).collect();
    Some(format!("{}({})", name, args.join(", ")))
}

fn fmt_token(token: &Token) -> String {
    match token {
        Token::String(s) => s.clone(),
        Token::Uint(v) => v.to_string(),
        Token::Address(a) => format!("{a:?}"),
        other => other.to_string(),
    }
}
