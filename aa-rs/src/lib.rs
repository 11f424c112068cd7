//! ERC-4337 UserOperation builder for SimpleAccount-style smart accounts
//! (EntryPoint v0.6).
//!
//! [`UserOperationBuilder`] resolves the counterfactual account address, builds
//! `initCode` for the first operation, fills in gas and fee fields, and hashes /
//! signs the result. Everything it talks to sits behind the traits in
//! [`provider`]; [`contracts`], [`fees`], [`gas`] and [`signer`] hold the
//! ethers-backed implementations.

pub mod abi;
pub mod builder;
pub mod config;
pub mod contracts;
pub mod encoding;
pub mod error;
pub mod fees;
pub mod gas;
pub mod provider;
pub mod signer;
pub mod types;

#[cfg(test)]
pub(crate) mod test_utils;

pub use builder::{BuilderConfig, Collaborators, UserOperationBuilder};
pub use error::{BoxError, BuilderError, BuilderResult, Step};
pub use provider::FeeData;
pub use types::{BuildRequest, Call, UserOperation};
