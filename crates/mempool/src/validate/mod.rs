//! User operation validation: sanity checks, simulation checks and
//! simulation-trace (opcode/storage rule) checks, composable as tuples.

use crate::{
    mempool::Mempool, InvalidMempoolUserOperationError, Reputation, SanityError, SimulationError,
};
use alloy_chains::Chain;
use enumset::{EnumSet, EnumSetType};
use ethers::{providers::Middleware, types::U256};
use kestrel_contracts::{
    entry_point::SimulateValidationResult, tracer::JsTracerFrame, EntryPoint,
};
use kestrel_primitives::{
    constants::validation::entities::NUMBER_OF_LEVELS,
    reputation::StakeInfo,
    simulation::{CodeHash, StorageMap},
    UserOperation, UserOperationHash,
};

pub mod sanity;
pub mod simulation;
pub mod simulation_trace;
pub mod utils;
pub mod validator;

/// The outcome of a user operation validation.
#[derive(Debug, Clone, Default)]
pub struct UserOperationValidationOutcome {
    /// Entry this user operation replaces (same sender and nonce), if any
    pub prev_hash: Option<UserOperationHash>,
    /// Deposit required to pay for the maximum gas of this operation
    pub pre_fund: U256,
    /// Gas actually consumed by the validation step
    pub pre_op_gas: U256,
    /// Not-yet-valid operations carry their lower time bound
    pub valid_after: Option<U256>,
    /// Stake info of the factory, sender and paymaster, as reported by simulation
    pub stake_info: Option<[StakeInfo; NUMBER_OF_LEVELS]>,
    /// Code hashes of every contract touched during simulation
    pub code_hashes: Option<Vec<CodeHash>>,
    /// Storage read during simulation (for the bundle conflict check and the
    /// conditional send)
    pub storage_map: StorageMap,
}

/// The mode in which the user operation validator is running.
#[derive(EnumSetType, Debug)]
pub enum UserOperationValidatorMode {
    Sanity,
    Simulation,
    SimulationTrace,
}

/// The [UserOperation](UserOperation) validator trait.
/// Composable so that the bundler can choose which validation rules
/// (sanity, simulation, simulation trace) to apply.
#[async_trait::async_trait]
pub trait UserOperationValidator: Send + Sync {
    async fn validate_user_operation(
        &self,
        uo: &UserOperation,
        mempool: &Mempool,
        reputation: &Reputation,
        mode: EnumSet<UserOperationValidatorMode>,
    ) -> Result<UserOperationValidationOutcome, InvalidMempoolUserOperationError>;
}

/// Helper passed to every sanity check
pub struct SanityHelper<'a, M: Middleware + 'static> {
    pub entry_point: &'a EntryPoint<M>,
    pub chain: Chain,
}

#[async_trait::async_trait]
pub trait SanityCheck<M: Middleware>: Send + Sync {
    /// Performs a single sanity check on a user operation against the mempool
    /// and the reputation registry.
    ///
    /// # Returns
    /// `Ok(())` if the user operation passes, otherwise the [SanityError]
    /// naming the failed rule.
    async fn check_user_operation(
        &self,
        uo: &UserOperation,
        mempool: &Mempool,
        reputation: &Reputation,
        helper: &SanityHelper<M>,
    ) -> Result<(), SanityError>;
}

macro_rules! sanity_check_impls {
    ( $( $name:ident )+ ) => {
        #[allow(non_snake_case)]
        #[async_trait::async_trait]
        impl<M: Middleware, $($name : SanityCheck<M>,)+> SanityCheck<M> for ($($name,)+)
        {
            async fn check_user_operation(
                &self,
                uo: &UserOperation,
                mempool: &Mempool,
                reputation: &Reputation,
                helper: &SanityHelper<M>,
            ) -> Result<(), SanityError>
                {
                    let ($($name,)+) = self;
                    ($($name.check_user_operation(uo, mempool, reputation, helper).await?,)+);
                    Ok(())
                }
        }
    };
}

#[async_trait::async_trait]
impl<M: Middleware> SanityCheck<M> for () {
    async fn check_user_operation(
        &self,
        _uo: &UserOperation,
        _mempool: &Mempool,
        _reputation: &Reputation,
        _helper: &SanityHelper<M>,
    ) -> Result<(), SanityError> {
        Ok(())
    }
}

// These macros enable chaining sanity check implementations:
// `(SanityCheck1, SanityCheck2, ...).check_user_operation(...)`
sanity_check_impls! { A }
sanity_check_impls! { A B }
sanity_check_impls! { A B C }
sanity_check_impls! { A B C D }
sanity_check_impls! { A B C D F }
sanity_check_impls! { A B C D F G }
sanity_check_impls! { A B C D F G I }
sanity_check_impls! { A B C D F G I J }

/// Helper passed to every simulation check
pub struct SimulationHelper<'a> {
    pub simulate_validation_result: &'a SimulateValidationResult,
    pub valid_after: Option<U256>,
}

/// Trait for checks over the decoded `simulateValidation` result
pub trait SimulationCheck: Send + Sync {
    /// Checks a user operation against the decoded simulation result.
    ///
    /// # Returns
    /// `Ok(())` if the user operation passes, otherwise a [SimulationError].
    fn check_user_operation(
        &self,
        uo: &UserOperation,
        helper: &mut SimulationHelper,
    ) -> Result<(), SimulationError>;
}

macro_rules! simulation_check_impls {
    ( $( $name:ident )+ ) => {
        #[allow(non_snake_case)]
        impl<$($name : SimulationCheck,)+> SimulationCheck for ($($name,)+)
        {
            fn check_user_operation(
                &self,
                uo: &UserOperation,
                helper: &mut SimulationHelper,
            ) -> Result<(), SimulationError>
                {
                    let ($($name,)+) = self;
                    ($($name.check_user_operation(uo, helper)?,)+);
                    Ok(())
                }
        }
    };
}

simulation_check_impls! { A }
simulation_check_impls! { A B }
simulation_check_impls! { A B C }
simulation_check_impls! { A B C D }
simulation_check_impls! { A B C D F }
simulation_check_impls! { A B C D F G }

/// Helper passed to every simulation-trace check
pub struct SimulationTraceHelper<'a, M: Middleware + Send + Sync + 'static> {
    pub entry_point: &'a EntryPoint<M>,
    pub chain: Chain,
    pub simulate_validation_result: &'a SimulateValidationResult,
    pub js_trace: &'a JsTracerFrame,
    pub stake_info: Option<[StakeInfo; NUMBER_OF_LEVELS]>,
    pub code_hashes: Option<Vec<CodeHash>>,
}

#[async_trait::async_trait]
pub trait SimulationTraceCheck<M: Middleware>: Send + Sync {
    /// Checks a user operation against the collector tracer output.
    ///
    /// # Returns
    /// `Ok(())` if the user operation passes, otherwise a [SimulationError].
    async fn check_user_operation(
        &self,
        uo: &UserOperation,
        mempool: &Mempool,
        reputation: &Reputation,
        helper: &mut SimulationTraceHelper<M>,
    ) -> Result<(), SimulationError>;
}

macro_rules! simulation_trace_check_impls {
    ( $( $name:ident )+ ) => {
        #[allow(non_snake_case)]
        #[async_trait::async_trait]
        impl<M: Middleware, $($name : SimulationTraceCheck<M>,)+> SimulationTraceCheck<M> for ($($name,)+)
        {
            async fn check_user_operation(
                &self,
                uo: &UserOperation,
                mempool: &Mempool,
                reputation: &Reputation,
                helper: &mut SimulationTraceHelper<M>,
            ) -> Result<(), SimulationError>
                {
                    let ($($name,)+) = self;
                    ($($name.check_user_operation(uo, mempool, reputation, helper).await?,)+);
                    Ok(())
                }
        }
    };
}

#[async_trait::async_trait]
impl<M: Middleware> SimulationTraceCheck<M> for () {
    async fn check_user_operation(
        &self,
        _uo: &UserOperation,
        _mempool: &Mempool,
        _reputation: &Reputation,
        _helper: &mut SimulationTraceHelper<M>,
    ) -> Result<(), SimulationError> {
        Ok(())
    }
}

simulation_trace_check_impls! { A }
simulation_trace_check_impls! { A B }
simulation_trace_check_impls! { A B C }
simulation_trace_check_impls! { A B C D }
simulation_trace_check_impls! { A B C D F }
simulation_trace_check_impls! { A B C D F G }
