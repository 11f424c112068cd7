use crate::error::BoxError;
use crate::provider::UserOperationSigner;
use anyhow::{Context, Result};
use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Bytes, H256};
use std::str::FromStr;

/// Signs userOpHashes with a local private key.
///
/// SimpleAccount v0.6 checks `ECDSA.recover(hash.toEthSignedMessageHash(), signature)`,
/// so the hash is signed as an EIP-191 personal message.
#[derive(Debug, Clone)]
pub struct LocalUserOperationSigner {
    wallet: LocalWallet,
}

impl LocalUserOperationSigner {
    pub fn new(wallet: LocalWallet) -> Self {
        Self { wallet }
    }

    pub fn from_private_key(private_key: &str, chain_id: u64) -> Result<Self> {
        let wallet = LocalWallet::from_str(private_key)
            .context("invalid owner private key")?
            .with_chain_id(chain_id);
        Ok(Self { wallet })
    }
}

#[async_trait]
impl UserOperationSigner for LocalUserOperationSigner {
    fn address(&self) -> Address {
        self.wallet.address()
    }

    async fn sign_hash(&self, hash: H256) -> Result<Bytes, BoxError> {
        let sig = self.wallet.sign_message(hash.as_bytes()).await?;
        Ok(Bytes::from(sig.to_vec()))
    }
}
