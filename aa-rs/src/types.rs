use ethers::abi::{self, Token};
use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::keccak256;

/// ERC-4337 UserOperation (EntryPoint v0.6 layout).
///
/// Note: EntryPoint v0.7 uses a *different* packed struct layout.
///
/// The builder never sets `paymaster_and_data`; `signature` stays empty until
/// [`UserOperation::with_signature`] attaches one.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserOperation {
    pub sender: Address,
    pub nonce: U256,
    pub init_code: Bytes,
    pub call_data: Bytes,
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub paymaster_and_data: Bytes,
    pub signature: Bytes,
}

impl UserOperation {
    /// Returns a tuple matching the Solidity struct layout, suitable for
    /// calling `EntryPoint.getUserOpHash((...))`.
    #[allow(clippy::type_complexity)]
    pub fn as_abi_tuple(
        &self,
    ) -> (
        Address,
        U256,
        Bytes,
        Bytes,
        U256,
        U256,
        U256,
        U256,
        U256,
        Bytes,
        Bytes,
    ) {
        (
            self.sender,
            self.nonce,
            self.init_code.clone(),
            self.call_data.clone(),
            self.call_gas_limit,
            self.verification_gas_limit,
            self.pre_verification_gas,
            self.max_fee_per_gas,
            self.max_priority_fee_per_gas,
            self.paymaster_and_data.clone(),
            self.signature.clone(),
        )
    }

    /// Same operation with `signature` replaced. Every other field is untouched.
    pub fn with_signature(mut self, signature: Bytes) -> Self {
        self.signature = signature;
        self
    }

    pub fn is_signed(&self) -> bool {
        !self.signature.as_ref().is_empty()
    }

    /// ABI encoding of all fields, as they would appear in `handleOps` calldata.
    pub fn pack(&self) -> Bytes {
        let tokens = vec![
            Token::Address(self.sender),
            Token::Uint(self.nonce),
            Token::Bytes(self.init_code.to_vec()),
            Token::Bytes(self.call_data.to_vec()),
            Token::Uint(self.call_gas_limit),
            Token::Uint(self.verification_gas_limit),
            Token::Uint(self.pre_verification_gas),
            Token::Uint(self.max_fee_per_gas),
            Token::Uint(self.max_priority_fee_per_gas),
            Token::Bytes(self.paymaster_and_data.to_vec()),
            Token::Bytes(self.signature.to_vec()),
        ];
        abi::encode(&tokens).into()
    }

    /// `UserOperationLib.pack` from EntryPoint v0.6: dynamic fields are replaced by
    /// their keccak256 and the signature is left out.
    pub fn pack_without_signature(&self) -> Bytes {
        let tokens = vec![
            Token::Address(self.sender),
            Token::Uint(self.nonce),
            Token::FixedBytes(keccak256(&self.init_code).to_vec()),
            Token::FixedBytes(keccak256(&self.call_data).to_vec()),
            Token::Uint(self.call_gas_limit),
            Token::Uint(self.verification_gas_limit),
            Token::Uint(self.pre_verification_gas),
            Token::Uint(self.max_fee_per_gas),
            Token::Uint(self.max_priority_fee_per_gas),
            Token::FixedBytes(keccak256(&self.paymaster_and_data).to_vec()),
        ];
        abi::encode(&tokens).into()
    }

    /// Computes `EntryPoint.getUserOpHash` locally:
    /// `keccak256(abi.encode(keccak256(pack), entryPoint, chainId))`.
    pub fn hash(&self, entry_point: Address, chain_id: u64) -> H256 {
        let inner = keccak256(self.pack_without_signature());
        let encoded = abi::encode(&[
            Token::FixedBytes(inner.to_vec()),
            Token::Address(entry_point),
            Token::Uint(U256::from(chain_id)),
        ]);
        H256::from(keccak256(encoded))
    }
}

/// One call the smart account should execute.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Call {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
    /// Explicit call gas limit. `None` (or zero) means "estimate it".
    pub gas_limit: Option<U256>,
}

impl Call {
    pub fn new(to: Address, value: U256, data: Bytes) -> Self {
        Self {
            to,
            value,
            data,
            gas_limit: None,
        }
    }

    pub fn gas_limit(mut self, gas_limit: U256) -> Self {
        self.gas_limit = Some(gas_limit);
        self
    }

    /// The explicit gas limit, if one was supplied and is non-zero.
    pub fn explicit_gas_limit(&self) -> Option<U256> {
        self.gas_limit.filter(|g| !g.is_zero())
    }
}

/// Input to [`crate::UserOperationBuilder::build_unsigned_operation`].
///
/// Only single-call requests are buildable; `calls` is a list so that batch
/// requests can be rejected explicitly rather than silently truncated.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BuildRequest {
    pub calls: Vec<Call>,
    /// Caller-supplied nonce. When absent the account's current nonce is used.
    pub nonce: Option<U256>,
}

impl BuildRequest {
    pub fn single(call: Call) -> Self {
        Self {
            calls: vec![call],
            nonce: None,
        }
    }

    pub fn batch(calls: Vec<Call>) -> Self {
        Self { calls, nonce: None }
    }

    pub fn nonce(mut self, nonce: U256) -> Self {
        self.nonce = Some(nonce);
        self
    }
}
