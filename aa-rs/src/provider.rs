//! Capabilities the builder needs from the outside world.
//!
//! Each trait is deliberately narrow so it can be backed by an ethers
//! [`Middleware`](ethers::providers::Middleware) (see [`crate::contracts`]), a remote
//! service, or a stub in tests.

use crate::error::BoxError;
use crate::types::UserOperation;
use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256, U256};
use std::sync::Arc;

/// Read-only chain queries.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Deployed bytecode at `address` (empty if none).
    async fn get_code(&self, address: Address) -> Result<Bytes, BoxError>;

    /// Gas estimate for a simulated call `from -> to` carrying `data`.
    async fn estimate_call_gas(
        &self,
        from: Address,
        to: Address,
        data: Bytes,
    ) -> Result<U256, BoxError>;

    /// Gas estimate for a call to `to` carrying `data` with no explicit sender.
    async fn estimate_deployment_gas(&self, to: Address, data: Bytes) -> Result<U256, BoxError>;

    async fn chain_id(&self) -> Result<u64, BoxError>;
}

/// The smart-account factory (`SimpleAccountFactory`).
#[async_trait]
pub trait FactoryContract: Send + Sync {
    fn address(&self) -> Address;

    /// Counterfactual account address for `(owner, index)`.
    async fn account_address(&self, owner: Address, index: U256) -> Result<Address, BoxError>;

    /// Calldata for the factory's deployment entry point.
    fn create_account_calldata(&self, owner: Address, index: U256) -> Result<Bytes, BoxError>;
}

/// Binds an account address to a handle on its contract interface.
pub trait AccountConnector: Send + Sync {
    fn connect(&self, account: Address) -> Arc<dyn AccountContract>;
}

/// A (possibly not yet deployed) smart account.
#[async_trait]
pub trait AccountContract: Send + Sync {
    fn address(&self) -> Address;

    /// Calldata for the account's generic `execute(dest, value, func)`.
    fn encode_execute(&self, to: Address, value: U256, data: Bytes) -> Result<Bytes, BoxError>;

    /// Current nonce. Only meaningful once the account is deployed.
    async fn nonce(&self) -> Result<U256, BoxError>;
}

#[async_trait]
pub trait EntryPointContract: Send + Sync {
    fn address(&self) -> Address;

    /// Canonical hash the account owner must sign.
    async fn user_operation_hash(&self, op: &UserOperation) -> Result<H256, BoxError>;
}

/// EIP-1559 fee parameters for a user operation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FeeData {
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
}

#[async_trait]
pub trait FeeOracle: Send + Sync {
    async fn fee_data(&self, chain_id: u64) -> Result<FeeData, BoxError>;
}

/// Pure function of an unsigned operation.
pub trait PreVerificationGasEstimator: Send + Sync {
    fn estimate(&self, op: &UserOperation) -> U256;
}

#[async_trait]
pub trait UserOperationSigner: Send + Sync {
    fn address(&self) -> Address;

    async fn sign_hash(&self, hash: H256) -> Result<Bytes, BoxError>;
}
