use crate::error::{BuilderError, BuilderResult, Step};
use crate::gas::DEFAULT_BASE_VERIFICATION_GAS_LIMIT;
use crate::provider::{
    AccountConnector, AccountContract, ChainClient, EntryPointContract, FactoryContract,
    FeeOracle, PreVerificationGasEstimator, UserOperationSigner,
};
use crate::types::{BuildRequest, Call, UserOperation};
use ethers::types::{Address, Bytes, H256, U256};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Length of the factory address prefix in `initCode`.
const INIT_CODE_ADDRESS_LEN: usize = 20;

/// Which account the builder acts for, and its gas policy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuilderConfig {
    pub owner: Address,
    /// CREATE2 salt passed to the factory.
    pub index: U256,
    pub base_verification_gas_limit: U256,
}

impl BuilderConfig {
    pub fn new(owner: Address) -> Self {
        Self {
            owner,
            index: U256::zero(),
            base_verification_gas_limit: U256::from(DEFAULT_BASE_VERIFICATION_GAS_LIMIT),
        }
    }

    pub fn index(mut self, index: U256) -> Self {
        self.index = index;
        self
    }

    pub fn base_verification_gas_limit(mut self, gas: U256) -> Self {
        self.base_verification_gas_limit = gas;
        self
    }
}

/// Everything the builder talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub chain: Arc<dyn ChainClient>,
    pub factory: Arc<dyn FactoryContract>,
    pub accounts: Arc<dyn AccountConnector>,
    pub entry_point: Arc<dyn EntryPointContract>,
    pub fees: Arc<dyn FeeOracle>,
    pub pre_verification_gas: Arc<dyn PreVerificationGasEstimator>,
}

/// Builds unsigned single-call UserOperations for one owner's smart account.
///
/// The account address and the account handle are resolved at most once per
/// builder; deployment state and nonces are read fresh on every build.
pub struct UserOperationBuilder {
    config: BuilderConfig,
    chain: Arc<dyn ChainClient>,
    factory: Arc<dyn FactoryContract>,
    accounts: Arc<dyn AccountConnector>,
    entry_point: Arc<dyn EntryPointContract>,
    fees: Arc<dyn FeeOracle>,
    pre_verification_gas: Arc<dyn PreVerificationGasEstimator>,
    account_address: OnceCell<Address>,
    account: OnceCell<Arc<dyn AccountContract>>,
}

impl UserOperationBuilder {
    pub fn new(config: BuilderConfig, collaborators: Collaborators) -> Self {
        Self {
            config,
            chain: collaborators.chain,
            factory: collaborators.factory,
            accounts: collaborators.accounts,
            entry_point: collaborators.entry_point,
            fees: collaborators.fees,
            pre_verification_gas: collaborators.pre_verification_gas,
            account_address: OnceCell::new(),
            account: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    pub fn entry_point(&self) -> Address {
        self.entry_point.address()
    }

    /// Counterfactual account address, asked from the factory once and cached.
    pub async fn resolve_account_address(&self) -> BuilderResult<Address> {
        self.account_address
            .get_or_try_init(|| async {
                let address = self
                    .factory
                    .account_address(self.config.owner, self.config.index)
                    .await
                    .map_err(BuilderError::collaborator(Step::ResolveAccountAddress))?;
                debug!(
                    owner = ?self.config.owner,
                    index = %self.config.index,
                    account = ?address,
                    "resolved smart account address"
                );
                Ok::<_, BuilderError>(address)
            })
            .await
            .copied()
    }

    async fn account(&self) -> BuilderResult<&Arc<dyn AccountContract>> {
        let address = self.resolve_account_address().await?;
        Ok(self
            .account
            .get_or_init(|| async { self.accounts.connect(address) })
            .await)
    }

    /// True iff there is bytecode at the account address. Never cached.
    pub async fn is_deployed(&self) -> BuilderResult<bool> {
        let address = self.resolve_account_address().await?;
        let code = self
            .chain
            .get_code(address)
            .await
            .map_err(BuilderError::collaborator(Step::CheckDeployment))?;
        Ok(!code.as_ref().is_empty())
    }

    /// `0` for an undeployed account, otherwise the account's on-chain nonce.
    pub async fn next_nonce(&self) -> BuilderResult<U256> {
        if !self.is_deployed().await? {
            return Ok(U256::zero());
        }
        self.account()
            .await?
            .nonce()
            .await
            .map_err(BuilderError::collaborator(Step::FetchNonce))
    }

    /// `factory ++ createAccount(owner, index)`.
    ///
    /// Always builds the deployment code; whether it belongs in an operation
    /// (nonce 0 only) is for the caller to decide.
    pub fn build_init_code(&self, index: U256) -> BuilderResult<Bytes> {
        let calldata = self
            .factory
            .create_account_calldata(self.config.owner, index)
            .map_err(BuilderError::collaborator(Step::BuildInitCode))?;

        let factory = self.factory.address();
        let mut v = Vec::with_capacity(INIT_CODE_ADDRESS_LEN + calldata.len());
        v.extend_from_slice(factory.as_bytes());
        v.extend_from_slice(calldata.as_ref());
        Ok(Bytes::from(v))
    }

    /// Gas the factory call in `init_code` needs. Zero for empty init code.
    pub async fn estimate_creation_gas(&self, init_code: &Bytes) -> BuilderResult<U256> {
        if init_code.is_empty() {
            return Ok(U256::zero());
        }
        if init_code.len() < INIT_CODE_ADDRESS_LEN {
            return Err(BuilderError::Encoding(format!(
                "initCode is {} bytes, need at least {} for the factory address",
                init_code.len(),
                INIT_CODE_ADDRESS_LEN
            )));
        }

        let (target, payload) = init_code.split_at(INIT_CODE_ADDRESS_LEN);
        let target = Address::from_slice(target);
        let gas = self
            .chain
            .estimate_deployment_gas(target, Bytes::from(payload.to_vec()))
            .await
            .map_err(BuilderError::collaborator(Step::EstimateCreationGas))?;
        debug!(factory = ?target, %gas, "estimated account creation gas");
        Ok(gas)
    }

    /// `execute(to, value, data)` calldata plus the call gas limit, estimated as a
    /// call from the entry point when the caller gave none.
    pub async fn encode_call_and_gas_limit(&self, call: &Call) -> BuilderResult<(Bytes, U256)> {
        let account = self.account().await?;
        let call_data = account
            .encode_execute(call.to, call.value, call.data.clone())
            .map_err(BuilderError::collaborator(Step::EncodeCallData))?;

        let call_gas_limit = match call.explicit_gas_limit() {
            Some(gas) => gas,
            None => self
                .chain
                .estimate_call_gas(self.entry_point.address(), account.address(), call_data.clone())
                .await
                .map_err(BuilderError::collaborator(Step::EstimateCallGas))?,
        };
        Ok((call_data, call_gas_limit))
    }

    /// Assembles the unsigned operation for a single-call request.
    ///
    /// Any collaborator failure aborts the build; nothing is retried.
    pub async fn build_unsigned_operation(
        &self,
        request: &BuildRequest,
    ) -> BuilderResult<UserOperation> {
        let call = match request.calls.as_slice() {
            [call] => call,
            calls => {
                return Err(BuilderError::UnsupportedRequest(format!(
                    "exactly one call per user operation is supported, got {}",
                    calls.len()
                )))
            }
        };

        let (call_data, call_gas_limit) = self.encode_call_and_gas_limit(call).await?;
        debug!(%call_gas_limit, "encoded call data");

        let nonce = match request.nonce {
            Some(nonce) => nonce,
            None => self.next_nonce().await?,
        };

        let init_code = if nonce.is_zero() {
            self.build_init_code(self.config.index)?
        } else {
            Bytes::default()
        };

        let creation_gas = self.estimate_creation_gas(&init_code).await?;
        let verification_gas_limit = self
            .config
            .base_verification_gas_limit
            .saturating_add(creation_gas);

        let chain_id = self
            .chain
            .chain_id()
            .await
            .map_err(BuilderError::collaborator(Step::FetchChainId))?;
        let fees = self
            .fees
            .fee_data(chain_id)
            .await
            .map_err(BuilderError::collaborator(Step::FetchFeeData))?;

        let mut op = UserOperation {
            sender: self.resolve_account_address().await?,
            nonce,
            init_code,
            call_data,
            call_gas_limit,
            verification_gas_limit,
            pre_verification_gas: U256::zero(),
            max_fee_per_gas: fees.max_fee_per_gas,
            max_priority_fee_per_gas: fees.max_priority_fee_per_gas,
            paymaster_and_data: Bytes::default(),
            signature: Bytes::default(),
        };
        op.pre_verification_gas = self.pre_verification_gas.estimate(&op);

        info!(
            sender = ?op.sender,
            nonce = %op.nonce,
            deploys = !op.init_code.is_empty(),
            call_gas_limit = %op.call_gas_limit,
            verification_gas_limit = %op.verification_gas_limit,
            pre_verification_gas = %op.pre_verification_gas,
            chain_id,
            "built unsigned user operation"
        );
        Ok(op)
    }

    /// The hash the owner must sign, as computed by the entry point.
    pub async fn compute_operation_hash(&self, op: &UserOperation) -> BuilderResult<H256> {
        self.entry_point
            .user_operation_hash(op)
            .await
            .map_err(BuilderError::collaborator(Step::ComputeHash))
    }

    /// Signature over the operation hash. `op` is not modified; attach the result
    /// with [`UserOperation::with_signature`].
    pub async fn sign_operation_hash(
        &self,
        op: &UserOperation,
        signer: &dyn UserOperationSigner,
    ) -> BuilderResult<Bytes> {
        let hash = self.compute_operation_hash(op).await?;
        let signature = signer
            .sign_hash(hash)
            .await
            .map_err(BuilderError::collaborator(Step::Sign))?;
        debug!(user_op_hash = ?hash, signer = ?signer.address(), "signed user operation");
        Ok(signature)
    }
}
