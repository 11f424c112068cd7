use std::fmt;
use thiserror::Error;

/// Error type returned by collaborators (RPC provider, contracts, fee services, signers).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type BuilderResult<T> = Result<T, BuilderError>;

/// The builder step a collaborator failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    ResolveAccountAddress,
    CheckDeployment,
    FetchNonce,
    BuildInitCode,
    EstimateCreationGas,
    EncodeCallData,
    EstimateCallGas,
    FetchChainId,
    FetchFeeData,
    ComputeHash,
    Sign,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Step::ResolveAccountAddress => "factory.getAddress",
            Step::CheckDeployment => "eth_getCode",
            Step::FetchNonce => "account.getNonce",
            Step::BuildInitCode => "factory.createAccount encoding",
            Step::EstimateCreationGas => "creation gas estimate",
            Step::EncodeCallData => "account.execute encoding",
            Step::EstimateCallGas => "call gas estimate",
            Step::FetchChainId => "eth_chainId",
            Step::FetchFeeData => "fee data",
            Step::ComputeHash => "entryPoint.getUserOpHash",
            Step::Sign => "signing userOpHash",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum BuilderError {
    /// The request asks for something this builder does not do (e.g. batched calls).
    #[error("unsupported request: {0}")]
    UnsupportedRequest(String),

    /// A collaborator failed; the original error is kept as the source.
    #[error("{step} failed: {source}")]
    Collaborator {
        step: Step,
        #[source]
        source: BoxError,
    },

    /// Malformed input bytes or values.
    #[error("invalid encoding: {0}")]
    Encoding(String),
}

impl BuilderError {
    /// Adapter for `map_err` that tags a collaborator error with its step.
    pub fn collaborator(step: Step) -> impl FnOnce(BoxError) -> Self {
        move |source| BuilderError::Collaborator { step, source }
    }

    pub fn step(&self) -> Option<Step> {
        match self {
            BuilderError::Collaborator { step, .. } => Some(*step),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn collaborator_error_keeps_source_and_step() {
        let err = BuilderError::collaborator(Step::FetchFeeData)("gas station down".into());
        assert_eq!(err.step(), Some(Step::FetchFeeData));
        assert_eq!(err.to_string(), "fee data failed: gas station down");
        assert_eq!(err.source().map(|s| s.to_string()).as_deref(), Some("gas station down"));
    }

    #[test]
    fn non_collaborator_errors_have_no_step() {
        assert_eq!(BuilderError::UnsupportedRequest("batch".into()).step(), None);
        assert_eq!(BuilderError::Encoding("short".into()).step(), None);
    }
}
