use ethers::types::{Address, U256};
use kestrel_contracts::EntryPointError;
use kestrel_primitives::UserOperationHash;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Mempool error
#[derive(Debug, Error, Serialize, Deserialize)]
#[error("{kind}")]
pub struct MempoolError {
    /// The user operation hash that caused the error
    pub hash: UserOperationHash,
    /// The error kind
    pub kind: MempoolErrorKind,
}

/// Mempool error kind
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum MempoolErrorKind {
    /// User operation rejected because validation failed
    #[error(transparent)]
    InvalidUserOperation(#[from] InvalidMempoolUserOperationError),
    /// Provider error
    #[error("provider error: {inner}")]
    Provider {
        /// The inner error message
        inner: String,
    },
    /// Any other error
    #[error("other error: {inner}")]
    Other {
        /// The inner error message
        inner: String,
    },
}

impl From<ReputationError> for MempoolErrorKind {
    fn from(err: ReputationError) -> Self {
        MempoolErrorKind::InvalidUserOperation(InvalidMempoolUserOperationError::Reputation(err))
    }
}

impl From<SanityError> for MempoolErrorKind {
    fn from(err: SanityError) -> Self {
        MempoolErrorKind::InvalidUserOperation(InvalidMempoolUserOperationError::Sanity(err))
    }
}

impl From<SimulationError> for MempoolErrorKind {
    fn from(err: SimulationError) -> Self {
        MempoolErrorKind::InvalidUserOperation(InvalidMempoolUserOperationError::Simulation(err))
    }
}

/// Error when validating user operation failed
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum InvalidMempoolUserOperationError {
    /// User operation rejected because of the reputation of the entities
    #[error(transparent)]
    Reputation(#[from] ReputationError),
    /// User operation rejected because sanity check failed
    #[error(transparent)]
    Sanity(#[from] SanityError),
    /// User operation rejected because simulation check failed
    #[error(transparent)]
    Simulation(#[from] SimulationError),
}

/// Error related to reputation of the entities
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum ReputationError {
    /// Entity is banned
    #[error("{entity} {address:?} is banned")]
    BannedEntity { entity: String, address: Address },
    /// Entity is throttled
    #[error("{entity} {address:?} is throttled")]
    ThrottledEntity { entity: String, address: Address },
    /// Stake of the entity is too low
    #[error("{entity} {address:?} stake {stake} is too low (required {min_stake})")]
    StakeTooLow { entity: String, address: Address, stake: U256, min_stake: U256 },
    /// Unstake delay of the entity is too low
    #[error("{entity} {address:?} unstake delay {unstake_delay} is too low (required {min_unstake_delay})")]
    UnstakeDelayTooLow {
        entity: String,
        address: Address,
        unstake_delay: U256,
        min_unstake_delay: U256,
    },
    /// Unstaked entity exceeded what it is allowed to do
    #[error("{entity} {address:?} is unstaked")]
    UnstakedEntity { entity: String, address: Address },
}

/// Error when sanity check fails
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum SanityError {
    /// Verification gas limit is too high
    #[error("verificationGasLimit too high: expected at most {verification_gas_limit_expected}")]
    VerificationGasLimitTooHigh {
        verification_gas_limit: U256,
        verification_gas_limit_expected: U256,
    },
    /// Pre verification gas is too low
    #[error("preVerificationGas too low: expected at least {pre_verification_gas_expected}")]
    PreVerificationGasTooLow { pre_verification_gas: U256, pre_verification_gas_expected: U256 },
    /// Call gas limit is too low
    #[error("callGasLimit too low: expected at least {call_gas_limit_expected}")]
    CallGasLimitTooLow { call_gas_limit: U256, call_gas_limit_expected: U256 },
    /// Max fee per gas is too low (lower than current base fee per gas)
    #[error("maxFeePerGas too low: expected at least {base_fee_per_gas}")]
    MaxFeePerGasTooLow { max_fee_per_gas: U256, base_fee_per_gas: U256 },
    /// Max priority fee per gas is too high (higher than max fee per gas)
    #[error("maxPriorityFeePerGas too high: expected at most {max_fee_per_gas}")]
    MaxPriorityFeePerGasTooHigh { max_priority_fee_per_gas: U256, max_fee_per_gas: U256 },
    /// Max priority fee per gas is too low (lower than this bundler accepts)
    #[error("maxPriorityFeePerGas too low: expected at least {max_priority_fee_per_gas_expected}")]
    MaxPriorityFeePerGasTooLow {
        max_priority_fee_per_gas: U256,
        max_priority_fee_per_gas_expected: U256,
    },
    /// Fee increase too low to replace the user operation with same sender and nonce
    #[error("fee increase too low to replace user operation: {inner}")]
    FeeIncreaseTooLow { inner: String },
    /// Paymaster validation failed
    #[error("{inner}")]
    Paymaster { inner: String },
    /// Sender validation failed
    #[error("{inner}")]
    Sender { inner: String },
    /// An address is playing more than one entity role across the mempool
    #[error("a {entity} at {address:?} in this user operation is used as a {entity_other} entity in another user operation currently in mempool")]
    EntityRoles { entity: String, address: Address, entity_other: String },
    /// Reputation error
    #[error(transparent)]
    Reputation(ReputationError),
    /// Provider error
    #[error("provider error: {inner}")]
    Provider {
        /// The inner error message
        inner: String,
    },
    /// Any other error
    #[error("other error: {inner}")]
    Other {
        /// The inner error message
        inner: String,
    },
}

impl From<ReputationError> for SanityError {
    fn from(err: ReputationError) -> Self {
        SanityError::Reputation(err)
    }
}

impl From<EntryPointError> for SanityError {
    fn from(err: EntryPointError) -> Self {
        match err {
            EntryPointError::Provider { inner } => SanityError::Provider { inner },
            _ => SanityError::Other { inner: err.to_string() },
        }
    }
}

/// Error when simulation fails
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum SimulationError {
    /// Signature verification failed
    #[error("invalid account signature or paymaster signature")]
    Signature,
    /// User operation timestamp invalid
    #[error("{inner}")]
    Timestamp { inner: String },
    /// Signature aggregators are not supported
    #[error("signature aggregators are not supported")]
    Aggregator,
    /// Error during user operation validation
    #[error("{inner}")]
    Validation { inner: String },
    /// Error during user operation execution
    #[error("{inner}")]
    Execution { inner: String },
    /// Forbidden opcode executed during validation
    #[error("{entity} uses banned opcode: {opcode}")]
    Opcode { entity: String, opcode: String },
    /// Storage access rule violation
    #[error("storage access validation failed for slot: {slot}")]
    StorageAccess { slot: String },
    /// Unstaked entity did something it is not allowed to
    #[error("unstaked {entity} at {address:?}: {inner}")]
    Unstaked { entity: String, address: Address, inner: String },
    /// Errors related to calls made during validation
    #[error("illegal call: {inner}")]
    CallStack { inner: String },
    /// Code hashes changed between the first and the second simulations
    #[error("code hashes changed between the first and the second simulations")]
    CodeHashes,
    /// User operation ran out of gas during validation
    #[error("user operation out of gas")]
    OutOfGas,
    /// Reputation error
    #[error(transparent)]
    Reputation(ReputationError),
    /// Provider error
    #[error("provider error: {inner}")]
    Provider {
        /// The inner error message
        inner: String,
    },
    /// Any other error
    #[error("other error: {inner}")]
    Other {
        /// The inner error message
        inner: String,
    },
}

impl From<ReputationError> for SimulationError {
    fn from(err: ReputationError) -> Self {
        SimulationError::Reputation(err)
    }
}

impl From<EntryPointError> for SimulationError {
    fn from(err: EntryPointError) -> Self {
        match err {
            EntryPointError::FailedOp(op) => SimulationError::Validation { inner: op.to_string() },
            EntryPointError::ExecutionReverted(inner) => SimulationError::Execution { inner },
            EntryPointError::Provider { inner } => SimulationError::Provider { inner },
            _ => SimulationError::Other { inner: err.to_string() },
        }
    }
}
