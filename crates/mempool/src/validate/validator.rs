use super::{
    sanity::{
        CallGas, Entities, MaxFee, Paymaster, Sender, UnstakedEntities, VerificationGas,
    },
    simulation::{Aggregator, Signature, Timestamp, VerificationExtraGas},
    simulation_trace::{
        CallStack, CodeHashes, ExternalContracts, Gas, Opcodes, StorageAccess,
    },
    utils::{extract_pre_fund, extract_pre_op_gas, extract_stake_info, extract_storage_map},
    SanityCheck, SanityHelper, SimulationCheck, SimulationHelper, SimulationTraceCheck,
    SimulationTraceHelper, UserOperationValidationOutcome, UserOperationValidator,
    UserOperationValidatorMode,
};
use crate::{
    mempool::Mempool, InvalidMempoolUserOperationError, Reputation, SimulationError,
};
use alloy_chains::Chain;
use enumset::EnumSet;
use ethers::{providers::Middleware, types::U256};
use kestrel_contracts::{
    decode_revert_error,
    entry_point::SimulateValidationResult,
    tracer::JsTracerFrame,
    EntryPoint, EntryPointError, EntryPointRevert,
};
use kestrel_primitives::{
    simulation::REVERT_OPCODE, UserOperation,
};
use tracing::debug;

pub type StandardValidator<M> = StandardUserOperationValidator<
    M,
    (Sender, VerificationGas, CallGas, MaxFee, Paymaster, Entities, UnstakedEntities),
    (Signature, Timestamp, Aggregator, VerificationExtraGas),
    (Gas, Opcodes, ExternalContracts, StorageAccess, CallStack, CodeHashes),
>;

pub type UnsafeValidator<M> = StandardUserOperationValidator<
    M,
    (Sender, VerificationGas, CallGas, MaxFee, Paymaster, Entities, UnstakedEntities),
    (Signature, Timestamp, Aggregator, VerificationExtraGas),
    (),
>;

/// Standard implementation of [UserOperationValidator].
pub struct StandardUserOperationValidator<M: Middleware + 'static, SanCk, SimCk, SimTrCk>
where
    SanCk: SanityCheck<M>,
    SimCk: SimulationCheck,
    SimTrCk: SimulationTraceCheck<M>,
{
    /// The [EntryPoint](EntryPoint) object.
    entry_point: EntryPoint<M>,
    /// A [EIP-155](https://eips.ethereum.org/EIPS/eip-155) chain ID.
    chain: Chain,
    /// An array of [SanityChecks](SanityCheck).
    sanity_checks: SanCk,
    /// An array of [SimulationChecks](SimulationCheck).
    simulation_checks: SimCk,
    /// An array of [SimulationTraceChecks](SimulationTraceCheck).
    simulation_trace_checks: SimTrCk,
}

impl<M: Middleware + Clone + 'static, SanCk, SimCk, SimTrCk> Clone
    for StandardUserOperationValidator<M, SanCk, SimCk, SimTrCk>
where
    SanCk: SanityCheck<M> + Clone,
    SimCk: SimulationCheck + Clone,
    SimTrCk: SimulationTraceCheck<M> + Clone,
{
    fn clone(&self) -> Self {
        Self {
            entry_point: self.entry_point.clone(),
            chain: self.chain,
            sanity_checks: self.sanity_checks.clone(),
            simulation_checks: self.simulation_checks.clone(),
            simulation_trace_checks: self.simulation_trace_checks.clone(),
        }
    }
}

/// Creates a [StandardUserOperationValidator] with the canonical checks for
/// safe mode: every sanity, simulation and simulation-trace rule.
pub fn new_canonical<M: Middleware + 'static>(
    entry_point: EntryPoint<M>,
    chain: Chain,
    max_verification_gas: U256,
    min_priority_fee_per_gas: U256,
) -> StandardValidator<M> {
    StandardUserOperationValidator::new(
        entry_point,
        chain,
        (
            Sender,
            VerificationGas { max_verification_gas },
            CallGas,
            MaxFee { min_priority_fee_per_gas },
            Paymaster,
            Entities,
            UnstakedEntities,
        ),
        (Signature, Timestamp, Aggregator, VerificationExtraGas),
        (Gas, Opcodes, ExternalContracts, StorageAccess, CallStack, CodeHashes),
    )
}

/// Creates a [StandardUserOperationValidator] for unsafe mode: the tracer
/// rules are skipped, simulation runs as a plain eth_call.
pub fn new_canonical_unsafe<M: Middleware + 'static>(
    entry_point: EntryPoint<M>,
    chain: Chain,
    max_verification_gas: U256,
    min_priority_fee_per_gas: U256,
) -> UnsafeValidator<M> {
    StandardUserOperationValidator::new(
        entry_point,
        chain,
        (
            Sender,
            VerificationGas { max_verification_gas },
            CallGas,
            MaxFee { min_priority_fee_per_gas },
            Paymaster,
            Entities,
            UnstakedEntities,
        ),
        (Signature, Timestamp, Aggregator, VerificationExtraGas),
        (),
    )
}

impl<M: Middleware + 'static, SanCk, SimCk, SimTrCk>
    StandardUserOperationValidator<M, SanCk, SimCk, SimTrCk>
where
    SanCk: SanityCheck<M>,
    SimCk: SimulationCheck,
    SimTrCk: SimulationTraceCheck<M>,
{
    pub fn new(
        entry_point: EntryPoint<M>,
        chain: Chain,
        sanity_checks: SanCk,
        simulation_checks: SimCk,
        simulation_trace_checks: SimTrCk,
    ) -> Self {
        Self { entry_point, chain, sanity_checks, simulation_checks, simulation_trace_checks }
    }

    /// Simulates validation of a [UserOperation](UserOperation) via an
    /// eth_call of `simulateValidation`.
    async fn simulate_validation(
        &self,
        uo: &UserOperation,
    ) -> Result<SimulateValidationResult, SimulationError> {
        self.entry_point
            .simulate_validation(uo.user_operation.clone())
            .await
            .map_err(SimulationError::from)
    }

    /// Simulates validation under the collector tracer and decodes both the
    /// validation result (from the top-level revert frame) and the tracer
    /// output.
    async fn simulate_validation_trace(
        &self,
        uo: &UserOperation,
    ) -> Result<(SimulateValidationResult, JsTracerFrame), SimulationError> {
        let geth_trace = self
            .entry_point
            .simulate_validation_trace(uo.user_operation.clone())
            .await
            .map_err(SimulationError::from)?;

        let js_trace = JsTracerFrame::try_from(geth_trace)
            .map_err(|err| SimulationError::Validation { inner: err.to_string() })?;

        // the top-level frame must revert with the encoded validation result
        let last = js_trace.calls.last().cloned().ok_or(SimulationError::Validation {
            inner: "tracer returned no call frames".into(),
        })?;
        if last.typ != *REVERT_OPCODE {
            return Err(SimulationError::Validation {
                inner: "simulateValidation did not revert".into(),
            });
        }
        let data = last.data.unwrap_or_default();

        let sim_res = match decode_revert_error(data) {
            Ok(EntryPointRevert::ValidationResult(res)) => {
                SimulateValidationResult::ValidationResult(res)
            }
            Ok(EntryPointRevert::ValidationResultWithAggregation(res)) => {
                SimulateValidationResult::ValidationResultWithAggregation(res)
            }
            Ok(EntryPointRevert::FailedOp(op)) => {
                return Err(SimulationError::from(EntryPointError::FailedOp(op)))
            }
            Ok(EntryPointRevert::RevertString(s)) => {
                return Err(SimulationError::Execution { inner: s })
            }
            Ok(other) => {
                return Err(SimulationError::Validation {
                    inner: format!("unexpected simulateValidation revert: {other:?}"),
                })
            }
            Err(err) => return Err(SimulationError::from(err)),
        };

        Ok((sim_res, js_trace))
    }
}

#[async_trait::async_trait]
impl<M: Middleware + 'static, SanCk, SimCk, SimTrCk> UserOperationValidator
    for StandardUserOperationValidator<M, SanCk, SimCk, SimTrCk>
where
    SanCk: SanityCheck<M>,
    SimCk: SimulationCheck,
    SimTrCk: SimulationTraceCheck<M>,
{
    /// Validates a [UserOperation](UserOperation): optional sanity checks,
    /// then `simulateValidation` (traced in safe mode, plain eth_call
    /// otherwise), then the checks selected by `mode`.
    ///
    /// # Arguments
    /// `uo` - [UserOperation](UserOperation) to validate.
    /// `mempool` - [Mempool](Mempool) object.
    /// `reputation` - [Reputation](Reputation) object.
    /// `mode` - [UserOperationValidatorMode](UserOperationValidatorMode) flags.
    ///
    /// # Returns
    /// A [UserOperationValidationOutcome](UserOperationValidationOutcome), or a
    /// [InvalidMempoolUserOperationError](InvalidMempoolUserOperationError).
    async fn validate_user_operation(
        &self,
        uo: &UserOperation,
        mempool: &Mempool,
        reputation: &Reputation,
        mode: EnumSet<UserOperationValidatorMode>,
    ) -> Result<UserOperationValidationOutcome, InvalidMempoolUserOperationError> {
        let mut out: UserOperationValidationOutcome = Default::default();

        if mode.contains(UserOperationValidatorMode::Sanity) {
            let sanity_helper = SanityHelper { entry_point: &self.entry_point, chain: self.chain };

            self.sanity_checks
                .check_user_operation(uo, mempool, reputation, &sanity_helper)
                .await?;
        }

        if let Some(uo_prev) = mempool.get_prev_by_sender(uo) {
            out.prev_hash = Some(uo_prev.hash);
        }

        debug!("Simulating user operation from {:?}", uo.sender);
        let (sim_res, js_trace) = if mode.contains(UserOperationValidatorMode::SimulationTrace) {
            let (sim_res, js_trace) = self.simulate_validation_trace(uo).await?;
            (sim_res, Some(js_trace))
        } else {
            (self.simulate_validation(uo).await?, None)
        };

        if mode.contains(UserOperationValidatorMode::Simulation) {
            let mut sim_helper =
                SimulationHelper { simulate_validation_result: &sim_res, valid_after: None };

            let res = self.simulation_checks.check_user_operation(uo, &mut sim_helper);
            out.valid_after = sim_helper.valid_after;
            res?;
        }

        out.pre_fund = extract_pre_fund(&sim_res);
        out.pre_op_gas = extract_pre_op_gas(&sim_res);
        out.stake_info = Some(extract_stake_info(uo, &sim_res));

        if let Some(js_trace) = js_trace {
            let mut sim_helper = SimulationTraceHelper {
                entry_point: &self.entry_point,
                chain: self.chain,
                simulate_validation_result: &sim_res,
                js_trace: &js_trace,
                stake_info: out.stake_info,
                code_hashes: None,
            };

            self.simulation_trace_checks
                .check_user_operation(uo, mempool, reputation, &mut sim_helper)
                .await?;

            out.code_hashes = sim_helper.code_hashes;
            out.storage_map = extract_storage_map(&js_trace);
        }

        Ok(out)
    }
}
