//! Recording stub collaborators for builder tests.

use crate::builder::{BuilderConfig, Collaborators, UserOperationBuilder};
use crate::error::BoxError;
use crate::provider::{
    AccountConnector, AccountContract, ChainClient, EntryPointContract, FactoryContract, FeeData,
    FeeOracle, PreVerificationGasEstimator, UserOperationSigner,
};
use crate::types::UserOperation;
use async_trait::async_trait;
use ethers::types::{Address, Bytes, H160, H256, U256};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub(crate) const OWNER: Address = H160([0x01; 20]);
pub(crate) const FACTORY: Address = H160([0xfa; 20]);
pub(crate) const ACCOUNT: Address = H160([0xaa; 20]);
pub(crate) const ENTRY_POINT: Address = H160([0xee; 20]);
pub(crate) const CHAIN_ID: u64 = 11155111;
pub(crate) const CREATION_GAS: u64 = 250_000;
pub(crate) const ESTIMATED_CALL_GAS: u64 = 42_000;
pub(crate) const PRE_VERIFICATION_GAS: u64 = 47_000;

/// Shared, ordered log of collaborator invocations.
#[derive(Debug, Default)]
pub(crate) struct Recorder {
    calls: Mutex<Vec<&'static str>>,
}

impl Recorder {
    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }

    pub(crate) fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, call: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == call).count()
    }
}

pub(crate) struct StubChain {
    recorder: Arc<Recorder>,
    deployed: AtomicBool,
    call_requests: Mutex<Vec<(Address, Address, Bytes)>>,
    deployment_requests: Mutex<Vec<(Address, Bytes)>>,
}

impl StubChain {
    pub(crate) fn set_deployed(&self, deployed: bool) {
        self.deployed.store(deployed, Ordering::SeqCst);
    }

    pub(crate) fn call_requests(&self) -> Vec<(Address, Address, Bytes)> {
        self.call_requests.lock().unwrap().clone()
    }

    pub(crate) fn deployment_requests(&self) -> Vec<(Address, Bytes)> {
        self.deployment_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainClient for StubChain {
    async fn get_code(&self, _address: Address) -> Result<Bytes, BoxError> {
        self.recorder.record("chain.get_code");
        if self.deployed.load(Ordering::SeqCst) {
            Ok(Bytes::from(vec![0x60, 0x80, 0x60, 0x40]))
        } else {
            Ok(Bytes::default())
        }
    }

    async fn estimate_call_gas(
        &self,
        from: Address,
        to: Address,
        data: Bytes,
    ) -> Result<U256, BoxError> {
        self.recorder.record("chain.estimate_call_gas");
        self.call_requests.lock().unwrap().push((from, to, data));
        Ok(U256::from(ESTIMATED_CALL_GAS))
    }

    async fn estimate_deployment_gas(&self, to: Address, data: Bytes) -> Result<U256, BoxError> {
        self.recorder.record("chain.estimate_deployment_gas");
        self.deployment_requests.lock().unwrap().push((to, data));
        Ok(U256::from(CREATION_GAS))
    }

    async fn chain_id(&self) -> Result<u64, BoxError> {
        self.recorder.record("chain.chain_id");
        Ok(CHAIN_ID)
    }
}

pub(crate) struct StubFactory {
    recorder: Arc<Recorder>,
    indexes: Mutex<Vec<U256>>,
}

impl StubFactory {
    pub(crate) fn indexes(&self) -> Vec<U256> {
        self.indexes.lock().unwrap().clone()
    }
}

#[async_trait]
impl FactoryContract for StubFactory {
    fn address(&self) -> Address {
        FACTORY
    }

    async fn account_address(&self, _owner: Address, index: U256) -> Result<Address, BoxError> {
        self.recorder.record("factory.account_address");
        self.indexes.lock().unwrap().push(index);
        Ok(ACCOUNT)
    }

    fn create_account_calldata(&self, owner: Address, index: U256) -> Result<Bytes, BoxError> {
        self.recorder.record("factory.create_account_calldata");
        self.indexes.lock().unwrap().push(index);
        // createAccount(address,uint256) selector followed by the raw arguments
        let mut v = vec![0x5f, 0xbf, 0xb9, 0xcf];
        v.extend_from_slice(owner.as_bytes());
        let mut word = [0u8; 32];
        index.to_big_endian(&mut word);
        v.extend_from_slice(&word);
        Ok(Bytes::from(v))
    }
}

pub(crate) struct StubAccounts {
    recorder: Arc<Recorder>,
    nonce: u64,
}

impl AccountConnector for StubAccounts {
    fn connect(&self, account: Address) -> Arc<dyn AccountContract> {
        self.recorder.record("accounts.connect");
        Arc::new(StubAccount {
            recorder: self.recorder.clone(),
            address: account,
            nonce: self.nonce,
        })
    }
}

struct StubAccount {
    recorder: Arc<Recorder>,
    address: Address,
    nonce: u64,
}

#[async_trait]
impl AccountContract for StubAccount {
    fn address(&self) -> Address {
        self.address
    }

    fn encode_execute(&self, to: Address, value: U256, data: Bytes) -> Result<Bytes, BoxError> {
        self.recorder.record("account.encode_execute");
        let mut v = vec![0xb6, 0x1d, 0x27, 0xf6];
        v.extend_from_slice(to.as_bytes());
        let mut word = [0u8; 32];
        value.to_big_endian(&mut word);
        v.extend_from_slice(&word);
        v.extend_from_slice(data.as_ref());
        Ok(Bytes::from(v))
    }

    async fn nonce(&self) -> Result<U256, BoxError> {
        self.recorder.record("account.nonce");
        Ok(U256::from(self.nonce))
    }
}

pub(crate) struct StubEntryPoint {
    recorder: Arc<Recorder>,
}

#[async_trait]
impl EntryPointContract for StubEntryPoint {
    fn address(&self) -> Address {
        ENTRY_POINT
    }

    async fn user_operation_hash(&self, op: &UserOperation) -> Result<H256, BoxError> {
        self.recorder.record("entry_point.user_operation_hash");
        Ok(op.hash(ENTRY_POINT, CHAIN_ID))
    }
}

pub(crate) struct StubFees {
    recorder: Arc<Recorder>,
    failing: AtomicBool,
    requested: Mutex<Vec<u64>>,
}

impl StubFees {
    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub(crate) fn requested_chain_ids(&self) -> Vec<u64> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl FeeOracle for StubFees {
    async fn fee_data(&self, chain_id: u64) -> Result<FeeData, BoxError> {
        self.recorder.record("fees.fee_data");
        self.requested.lock().unwrap().push(chain_id);
        if self.failing.load(Ordering::SeqCst) {
            return Err("fee service unavailable".into());
        }
        Ok(FeeData {
            max_fee_per_gas: U256::from(10u64),
            max_priority_fee_per_gas: U256::from(1u64),
        })
    }
}

pub(crate) struct StubPreVerificationGas {
    recorder: Arc<Recorder>,
    last_seen: Mutex<Option<UserOperation>>,
}

impl StubPreVerificationGas {
    pub(crate) fn last_seen(&self) -> Option<UserOperation> {
        self.last_seen.lock().unwrap().clone()
    }
}

impl PreVerificationGasEstimator for StubPreVerificationGas {
    fn estimate(&self, op: &UserOperation) -> U256 {
        self.recorder.record("pre_verification_gas.estimate");
        *self.last_seen.lock().unwrap() = Some(op.clone());
        U256::from(PRE_VERIFICATION_GAS)
    }
}

pub(crate) struct StubSigner {
    signed: Mutex<Vec<H256>>,
}

impl StubSigner {
    pub(crate) fn signed_hashes(&self) -> Vec<H256> {
        self.signed.lock().unwrap().clone()
    }
}

#[async_trait]
impl UserOperationSigner for StubSigner {
    fn address(&self) -> Address {
        OWNER
    }

    async fn sign_hash(&self, hash: H256) -> Result<Bytes, BoxError> {
        self.signed.lock().unwrap().push(hash);
        // not a real signature; 65 bytes derived from the hash
        let mut sig = hash.as_bytes().to_vec();
        sig.extend_from_slice(hash.as_bytes());
        sig.push(27);
        Ok(Bytes::from(sig))
    }
}

/// One set of stubs sharing a [`Recorder`].
pub(crate) struct Stubs {
    pub owner: Address,
    pub recorder: Arc<Recorder>,
    pub chain: Arc<StubChain>,
    pub factory: Arc<StubFactory>,
    pub accounts: Arc<StubAccounts>,
    pub entry_point: Arc<StubEntryPoint>,
    pub fees: Arc<StubFees>,
    pub pre_verification_gas: Arc<StubPreVerificationGas>,
    pub signer: StubSigner,
}

impl Default for Stubs {
    /// Undeployed account.
    fn default() -> Self {
        Self::new(false, 0)
    }
}

impl Stubs {
    /// Deployed account whose on-chain nonce is `nonce`.
    pub(crate) fn deployed(nonce: u64) -> Self {
        Self::new(true, nonce)
    }

    fn new(deployed: bool, nonce: u64) -> Self {
        let recorder = Arc::new(Recorder::default());
        Self {
            owner: OWNER,
            chain: Arc::new(StubChain {
                recorder: recorder.clone(),
                deployed: AtomicBool::new(deployed),
                call_requests: Mutex::new(Vec::new()),
                deployment_requests: Mutex::new(Vec::new()),
            }),
            factory: Arc::new(StubFactory {
                recorder: recorder.clone(),
                indexes: Mutex::new(Vec::new()),
            }),
            accounts: Arc::new(StubAccounts {
                recorder: recorder.clone(),
                nonce,
            }),
            entry_point: Arc::new(StubEntryPoint {
                recorder: recorder.clone(),
            }),
            fees: Arc::new(StubFees {
                recorder: recorder.clone(),
                failing: AtomicBool::new(false),
                requested: Mutex::new(Vec::new()),
            }),
            pre_verification_gas: Arc::new(StubPreVerificationGas {
                recorder: recorder.clone(),
                last_seen: Mutex::new(None),
            }),
            signer: StubSigner {
                signed: Mutex::new(Vec::new()),
            },
            recorder,
        }
    }

    pub(crate) fn builder(&self) -> UserOperationBuilder {
        self.builder_with(BuilderConfig::new(self.owner))
    }

    pub(crate) fn builder_with(&self, config: BuilderConfig) -> UserOperationBuilder {
        UserOperationBuilder::new(
            config,
            Collaborators {
                chain: self.chain.clone(),
                factory: self.factory.clone(),
                accounts: self.accounts.clone(),
                entry_point: self.entry_point.clone(),
                fees: self.fees.clone(),
                pre_verification_gas: self.pre_verification_gas.clone(),
            },
        )
    }
}
