//! Collaborator implementations backed by an ethers [`Middleware`].

use crate::abi::{
    account::SimpleAccount, decode_revert, entry_point::EntryPoint,
    factory::SimpleAccountFactory,
};
use crate::error::BoxError;
use crate::provider::{
    AccountConnector, AccountContract, ChainClient, EntryPointContract, FactoryContract,
};
use crate::types::UserOperation;
use async_trait::async_trait;
use ethers::contract::ContractError;
use ethers::providers::{Middleware, MiddlewareError};
use ethers::types::{
    transaction::eip2718::TypedTransaction, Address, Bytes, Eip1559TransactionRequest, H256, U256,
};
use std::sync::Arc;

/// Boxes a contract error, replacing known revert payloads with their decoded reason.
pub(crate) fn contract_error<M: Middleware + 'static>(err: ContractError<M>) -> BoxError {
    if let Some(reason) = err.as_revert().and_then(|data| decode_revert(data)) {
        return format!("execution reverted: {reason}").into();
    }
    Box::new(err)
}

/// Boxes a provider error, decoding JSON-RPC revert data when present.
pub(crate) fn middleware_error<E: MiddlewareError + 'static>(err: E) -> BoxError {
    let reason = err
        .as_error_response()
        .and_then(|resp| resp.as_revert_data())
        .and_then(|data| decode_revert(&data));
    match reason {
        Some(reason) => format!("execution reverted: {reason}").into(),
        None => Box::new(err),
    }
}

/// Narrows a node-reported chain id, rejecting values that do not fit in a `u64`.
pub(crate) fn chain_id_from_node(id: U256) -> Result<u64, BoxError> {
    u64::try_from(id)
        .map_err(|_| -> BoxError { format!("chain id {id} does not fit in u64").into() })
}

#[derive(Debug, Clone)]
pub struct ProviderChain<M> {
    client: Arc<M>,
}

impl<M> ProviderChain<M> {
    pub fn new(client: Arc<M>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<M: Middleware + 'static> ChainClient for ProviderChain<M> {
    async fn get_code(&self, address: Address) -> Result<Bytes, BoxError> {
        self.client
            .get_code(address, None)
            .await
            .map_err(middleware_error)
    }

    async fn estimate_call_gas(
        &self,
        from: Address,
        to: Address,
        data: Bytes,
    ) -> Result<U256, BoxError> {
        let tx: TypedTransaction = Eip1559TransactionRequest::new()
            .from(from)
            .to(to)
            .data(data)
            .into();
        self.client
            .estimate_gas(&tx, None)
            .await
            .map_err(middleware_error)
    }

    async fn estimate_deployment_gas(&self, to: Address, data: Bytes) -> Result<U256, BoxError> {
        let tx: TypedTransaction = Eip1559TransactionRequest::new().to(to).data(data).into();
        self.client
            .estimate_gas(&tx, None)
            .await
            .map_err(middleware_error)
    }

    async fn chain_id(&self) -> Result<u64, BoxError> {
        let id = self.client.get_chainid().await.map_err(middleware_error)?;
        chain_id_from_node(id)
    }
}

#[derive(Debug, Clone)]
pub struct SimpleAccountFactoryHandle<M> {
    contract: SimpleAccountFactory<M>,
}

impl<M: Middleware> SimpleAccountFactoryHandle<M> {
    pub fn new(address: Address, client: Arc<M>) -> Self {
        Self {
            contract: SimpleAccountFactory::new(address, client),
        }
    }
}

#[async_trait]
impl<M: Middleware + 'static> FactoryContract for SimpleAccountFactoryHandle<M> {
    fn address(&self) -> Address {
        self.contract.address()
    }

    async fn account_address(&self, owner: Address, index: U256) -> Result<Address, BoxError> {
        self.contract
            .get_address(owner, index)
            .call()
            .await
            .map_err(contract_error)
    }

    fn create_account_calldata(&self, owner: Address, index: U256) -> Result<Bytes, BoxError> {
        self.contract
            .create_account(owner, index)
            .calldata()
            .ok_or_else(|| "failed to build createAccount calldata".into())
    }
}

/// Hands out [`SimpleAccountHandle`]s sharing one client.
#[derive(Debug, Clone)]
pub struct SimpleAccountConnector<M> {
    client: Arc<M>,
}

impl<M> SimpleAccountConnector<M> {
    pub fn new(client: Arc<M>) -> Self {
        Self { client }
    }
}

impl<M: Middleware + 'static> AccountConnector for SimpleAccountConnector<M> {
    fn connect(&self, account: Address) -> Arc<dyn AccountContract> {
        Arc::new(SimpleAccountHandle {
            contract: SimpleAccount::new(account, self.client.clone()),
        })
    }
}

#[derive(Debug, Clone)]
pub struct SimpleAccountHandle<M> {
    contract: SimpleAccount<M>,
}

#[async_trait]
impl<M: Middleware + 'static> AccountContract for SimpleAccountHandle<M> {
    fn address(&self) -> Address {
        self.contract.address()
    }

    fn encode_execute(&self, to: Address, value: U256, data: Bytes) -> Result<Bytes, BoxError> {
        self.contract
            .execute(to, value, data)
            .calldata()
            .ok_or_else(|| "failed to build execute calldata".into())
    }

    async fn nonce(&self) -> Result<U256, BoxError> {
        self.contract
            .get_nonce()
            .call()
            .await
            .map_err(contract_error)
    }
}

#[derive(Debug, Clone)]
pub struct EntryPointHandle<M> {
    contract: EntryPoint<M>,
}

impl<M: Middleware> EntryPointHandle<M> {
    pub fn new(address: Address, client: Arc<M>) -> Self {
        Self {
            contract: EntryPoint::new(address, client),
        }
    }
}

#[async_trait]
impl<M: Middleware + 'static> EntryPointContract for EntryPointHandle<M> {
    fn address(&self) -> Address {
        self.contract.address()
    }

    async fn user_operation_hash(&self, op: &UserOperation) -> Result<H256, BoxError> {
        let hash = self
            .contract
            .get_user_op_hash(op.as_abi_tuple())
            .call()
            .await
            .map_err(contract_error)?;
        Ok(H256::from(hash))
    }
}

/// Computes the v0.6 hash locally instead of asking the chain.
///
/// Useful when the entry point is trusted to be the canonical implementation and
/// an extra `eth_call` per operation is not wanted.
#[derive(Debug, Clone, Copy)]
pub struct OfflineEntryPoint {
    address: Address,
    chain_id: u64,
}

impl OfflineEntryPoint {
    pub fn new(address: Address, chain_id: u64) -> Self {
        Self { address, chain_id }
    }
}

#[async_trait]
impl EntryPointContract for OfflineEntryPoint {
    fn address(&self) -> Address {
        self.address
    }

    async fn user_operation_hash(&self, op: &UserOperation) -> Result<H256, BoxError> {
        Ok(op.hash(self.address, self.chain_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::account::ExecuteCall;
    use crate::abi::entry_point::GetUserOpHashCall;
    use crate::abi::factory::CreateAccountCall;
    use ethers::abi::{AbiDecode, AbiEncode};
    use ethers::providers::{Http, Provider};

    fn offline_client() -> Arc<Provider<Http>> {
        // Never contacted: only used for calldata encoding.
        Arc::new(Provider::<Http>::try_from("http://127.0.0.1:8545").unwrap())
    }

    #[test]
    fn execute_calldata_round_trips_through_binding() {
        let account = SimpleAccountConnector::new(offline_client())
            .connect(Address::repeat_byte(0xaa));
        let to = Address::repeat_byte(0x22);
        let data = Bytes::from(vec![0xde, 0xad, 0xbe, 0xef]);

        let calldata = account
            .encode_execute(to, U256::from(5u64), data.clone())
            .unwrap();
        let decoded = ExecuteCall::decode(&calldata).unwrap();

        assert_eq!(decoded.dest, to);
        assert_eq!(decoded.value, U256::from(5u64));
        assert_eq!(decoded.func, data);
    }

    #[test]
    fn create_account_calldata_carries_owner_and_salt() {
        let factory =
            SimpleAccountFactoryHandle::new(Address::repeat_byte(0xfa), offline_client());
        let owner = Address::repeat_byte(0x01);

        let calldata = factory
            .create_account_calldata(owner, U256::from(9u64))
            .unwrap();
        let decoded = CreateAccountCall::decode(&calldata).unwrap();

        assert_eq!(decoded.owner, owner);
        assert_eq!(decoded.salt, U256::from(9u64));
        assert_eq!(factory.address(), Address::repeat_byte(0xfa));
    }

    #[tokio::test]
    async fn offline_entry_point_matches_local_hash() {
        let ep = Address::repeat_byte(0xee);
        let op = UserOperation {
            sender: Address::repeat_byte(0x11),
            nonce: U256::one(),
            ..Default::default()
        };
        let offline = OfflineEntryPoint::new(ep, 84532);
        assert_eq!(
            offline.user_operation_hash(&op).await.unwrap(),
            op.hash(ep, 84532)
        );
        assert_eq!(EntryPointContract::address(&offline), ep);
    }

    #[test]
    fn get_user_op_hash_call_carries_the_full_tuple() {
        let op = UserOperation {
            sender: Address::repeat_byte(0x11),
            nonce: U256::from(3u64),
            init_code: Bytes::from(vec![0xfa; 24]),
            call_data: Bytes::from(vec![0xb6, 0x1d, 0x27, 0xf6]),
            call_gas_limit: U256::from(42_000u64),
            verification_gas_limit: U256::from(350_000u64),
            pre_verification_gas: U256::from(47_000u64),
            max_fee_per_gas: U256::from(10u64),
            max_priority_fee_per_gas: U256::from(1u64),
            paymaster_and_data: Bytes::default(),
            signature: Bytes::from(vec![0x1b; 65]),
        };

        let encoded = GetUserOpHashCall {
            user_op: op.as_abi_tuple(),
        }
        .encode();
        assert_eq!(
            &encoded[..4],
            &ethers::utils::id(
                "getUserOpHash((address,uint256,bytes,bytes,uint256,uint256,uint256,uint256,uint256,bytes,bytes))"
            )
        );

        let decoded = GetUserOpHashCall::decode(&encoded).unwrap();
        assert_eq!(decoded.user_op, op.as_abi_tuple());
    }

    #[test]
    fn oversized_chain_id_is_an_error() {
        assert_eq!(chain_id_from_node(U256::from(84532u64)).unwrap(), 84532);
        let err = chain_id_from_node(U256::from(u64::MAX) + 1).unwrap_err();
        assert!(err.to_string().contains("does not fit in u64"));
    }
}
