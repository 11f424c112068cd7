use crate::provider::PreVerificationGasEstimator;
use crate::types::UserOperation;
use ethers::types::{Bytes, U256};

/// Base verification gas limit before any account-creation cost is added.
pub const DEFAULT_BASE_VERIFICATION_GAS_LIMIT: u64 = 100_000;

/// Calldata-based pre-verification gas, as bundlers compute it for a single-op bundle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Overhead {
    pub fixed: U256,
    pub per_user_op: U256,
    pub per_user_op_word: U256,
    pub zero_byte: U256,
    pub non_zero_byte: U256,
    pub bundle_size: U256,
    /// Length of the signature assumed when the operation is not signed yet.
    pub sig_size: usize,
}

impl Default for Overhead {
    fn default() -> Self {
        Self {
            fixed: U256::from(21000),
            per_user_op: U256::from(18300),
            per_user_op_word: U256::from(4),
            zero_byte: U256::from(4),
            non_zero_byte: U256::from(16),
            bundle_size: U256::from(1),
            sig_size: 65,
        }
    }
}

impl Overhead {
    pub fn calculate_pre_verification_gas(&self, op: &UserOperation) -> U256 {
        // An unsigned op would be under-priced by the signature bytes it is about to gain.
        let packed = if op.is_signed() {
            op.pack()
        } else {
            op.clone()
                .with_signature(Bytes::from(vec![0xff; self.sig_size]))
                .pack()
        };

        let call_data = packed.iter().fold(U256::zero(), |acc, &b| {
            let byte_cost = if b == 0 {
                self.zero_byte
            } else {
                self.non_zero_byte
            };
            acc.saturating_add(byte_cost)
        });

        let word_cost = div_ceil(
            self.per_user_op_word
                .saturating_mul(U256::from(packed.len() + 31)),
            U256::from(32),
        );

        div_ceil(self.fixed, self.bundle_size)
            .saturating_add(call_data)
            .saturating_add(self.per_user_op)
            .saturating_add(word_cost)
    }
}

impl PreVerificationGasEstimator for Overhead {
    fn estimate(&self, op: &UserOperation) -> U256 {
        self.calculate_pre_verification_gas(op)
    }
}

fn div_ceil(num: U256, den: U256) -> U256 {
    if den.is_zero() {
        return num;
    }
    let (q, r) = num.div_mod(den);
    if r.is_zero() {
        q
    } else {
        q + 1
    }
}
