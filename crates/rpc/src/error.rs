use jsonrpsee::types::{error::INTERNAL_ERROR_CODE, ErrorObject, ErrorObjectOwned};
use kestrel_mempool::{
    InvalidMempoolUserOperationError, MempoolError, MempoolErrorKind, ReputationError, SanityError,
    SimulationError,
};
use kestrel_primitives::constants::rpc::error_codes::{
    EXECUTION_REVERTED, INSUFFICIENT_STAKE, INVALID_FIELDS, INVALID_SIGNATURE, NOT_IN_TIME_RANGE,
    OPCODE_VALIDATION, REPUTATION, SIMULATE_PAYMASTER_VALIDATION, SIMULATE_VALIDATION,
    UNSUPPORTED_AGGREGATOR,
};

/// A wrapper around the [ErrorObjectOwned](ErrorObjectOwned) type carrying the
/// ERC-4337 error codes
pub struct JsonRpcError(pub ErrorObjectOwned);

impl From<JsonRpcError> for ErrorObjectOwned {
    fn from(err: JsonRpcError) -> Self {
        err.0
    }
}

impl From<MempoolError> for JsonRpcError {
    fn from(err: MempoolError) -> Self {
        match err.kind {
            MempoolErrorKind::InvalidUserOperation(err) => match err {
                InvalidMempoolUserOperationError::Sanity(err) => err.into(),
                InvalidMempoolUserOperationError::Simulation(err) => err.into(),
                InvalidMempoolUserOperationError::Reputation(err) => err.into(),
            },
            other => {
                JsonRpcError(ErrorObject::owned(INTERNAL_ERROR_CODE, other.to_string(), None::<bool>))
            }
        }
    }
}

impl From<ReputationError> for JsonRpcError {
    fn from(err: ReputationError) -> Self {
        JsonRpcError(match err {
            ReputationError::BannedEntity { .. } | ReputationError::ThrottledEntity { .. } => {
                ErrorObject::owned(REPUTATION, err.to_string(), None::<bool>)
            }
            ReputationError::StakeTooLow { .. } |
            ReputationError::UnstakeDelayTooLow { .. } |
            ReputationError::UnstakedEntity { .. } => {
                ErrorObject::owned(INSUFFICIENT_STAKE, err.to_string(), None::<bool>)
            }
        })
    }
}

impl From<SanityError> for JsonRpcError {
    fn from(err: SanityError) -> Self {
        JsonRpcError(match err {
            SanityError::VerificationGasLimitTooHigh { .. } |
            SanityError::PreVerificationGasTooLow { .. } |
            SanityError::CallGasLimitTooLow { .. } |
            SanityError::MaxFeePerGasTooLow { .. } |
            SanityError::MaxPriorityFeePerGasTooHigh { .. } |
            SanityError::MaxPriorityFeePerGasTooLow { .. } |
            SanityError::FeeIncreaseTooLow { .. } |
            SanityError::Paymaster { .. } |
            SanityError::Sender { .. } => {
                ErrorObject::owned(INVALID_FIELDS, err.to_string(), None::<bool>)
            }
            // an address playing several roles is treated like a rule violation
            SanityError::EntityRoles { .. } => {
                ErrorObject::owned(OPCODE_VALIDATION, err.to_string(), None::<bool>)
            }
            SanityError::Reputation(err) => JsonRpcError::from(err).0,
            other => ErrorObject::owned(INTERNAL_ERROR_CODE, other.to_string(), None::<bool>),
        })
    }
}

impl From<SimulationError> for JsonRpcError {
    fn from(err: SimulationError) -> Self {
        let msg = err.to_string();
        JsonRpcError(match err {
            SimulationError::Signature => {
                ErrorObject::owned(INVALID_SIGNATURE, msg, None::<bool>)
            }
            SimulationError::Timestamp { .. } => {
                ErrorObject::owned(NOT_IN_TIME_RANGE, msg, None::<bool>)
            }
            SimulationError::Aggregator => {
                ErrorObject::owned(UNSUPPORTED_AGGREGATOR, msg, None::<bool>)
            }
            SimulationError::Validation { inner } => {
                // AA3* reverts blame the paymaster
                let code = if inner.contains("AA3") {
                    SIMULATE_PAYMASTER_VALIDATION
                } else {
                    SIMULATE_VALIDATION
                };
                ErrorObject::owned(code, msg, None::<bool>)
            }
            SimulationError::Execution { .. } => {
                ErrorObject::owned(EXECUTION_REVERTED, msg, None::<bool>)
            }
            SimulationError::Opcode { .. } |
            SimulationError::StorageAccess { .. } |
            SimulationError::CallStack { .. } |
            SimulationError::CodeHashes |
            SimulationError::OutOfGas => {
                ErrorObject::owned(OPCODE_VALIDATION, msg, None::<bool>)
            }
            SimulationError::Unstaked { .. } => {
                ErrorObject::owned(INSUFFICIENT_STAKE, msg, None::<bool>)
            }
            SimulationError::Reputation(err) => JsonRpcError::from(err).0,
            _ => ErrorObject::owned(INTERNAL_ERROR_CODE, msg, None::<bool>),
        })
    }
}

impl From<eyre::Report> for JsonRpcError {
    fn from(err: eyre::Report) -> Self {
        JsonRpcError(ErrorObject::owned(INTERNAL_ERROR_CODE, err.to_string(), None::<bool>))
    }
}
