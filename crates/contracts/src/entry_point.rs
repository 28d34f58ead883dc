pub use crate::gen::{
    entry_point_api, AccountDeployedFilter, EntryPointAPI, EntryPointAPIEvents,
    SignatureAggregatorChangedFilter, UserOperationEventFilter,
};
use crate::{
    error::{decode_revert_error, EntryPointError, EntryPointRevert},
    tracer::JS_TRACER,
};
use ethers::{
    prelude::Event,
    providers::Middleware,
    types::{
        transaction::eip2718::TypedTransaction, Address, Bytes, GethDebugTracerType,
        GethDebugTracingCallOptions, GethDebugTracingOptions, GethTrace, U256,
    },
};
use kestrel_primitives::{
    constants::validation::simulation::SIMULATE_VALIDATION_GAS_LIMIT, UserOperationSigned,
};
use std::{fmt, sync::Arc};

/// Stake info of an entity, as carried in validation reverts
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StakeInfo {
    pub stake: U256,
    pub unstake_delay_sec: U256,
}

/// The `returnInfo` member of `ValidationResult`
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReturnInfo {
    pub pre_op_gas: U256,
    pub prefund: U256,
    pub sig_failed: bool,
    pub valid_after: U256,
    pub valid_until: U256,
    pub paymaster_context: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatorStakeInfo {
    pub aggregator: Address,
    pub stake_info: StakeInfo,
}

/// Payload of the `ValidationResult` revert of `simulateValidation`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub return_info: ReturnInfo,
    pub sender_info: StakeInfo,
    pub factory_info: StakeInfo,
    pub paymaster_info: StakeInfo,
}

/// Payload of the `ValidationResultWithAggregation` revert of `simulateValidation`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResultWithAggregation {
    pub return_info: ReturnInfo,
    pub sender_info: StakeInfo,
    pub factory_info: StakeInfo,
    pub paymaster_info: StakeInfo,
    pub aggregator_info: AggregatorStakeInfo,
}

/// Payload of the `FailedOp` revert
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FailedOp {
    pub op_index: U256,
    pub reason: String,
}

impl fmt::Display for FailedOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FailedOp(op {}): {}", self.op_index, self.reason)
    }
}

/// Outcome of `simulateValidation`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulateValidationResult {
    ValidationResult(ValidationResult),
    ValidationResultWithAggregation(ValidationResultWithAggregation),
}

/// Deposit info, as reported by `getDepositInfo`
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DepositInfo {
    pub deposit: U256,
    pub staked: bool,
    pub stake: U256,
    pub unstake_delay_sec: u32,
    pub withdraw_time: u64,
}

/// Typed wrapper around the ERC-4337 entry point contract (v0.6)
pub struct EntryPoint<M: Middleware + 'static> {
    eth_client: Arc<M>,
    address: Address,
    entry_point_api: EntryPointAPI<M>,
}

impl<M: Middleware + 'static> Clone for EntryPoint<M> {
    fn clone(&self) -> Self {
        Self {
            eth_client: self.eth_client.clone(),
            address: self.address,
            entry_point_api: self.entry_point_api.clone(),
        }
    }
}

impl<M: Middleware + 'static> EntryPoint<M> {
    pub fn new(eth_client: Arc<M>, address: Address) -> Self {
        let entry_point_api = EntryPointAPI::new(address, eth_client.clone());
        Self { eth_client, address, entry_point_api }
    }

    pub fn entry_point_api(&self) -> &EntryPointAPI<M> {
        &self.entry_point_api
    }

    pub fn events(&self) -> Event<Arc<M>, M, EntryPointAPIEvents> {
        self.entry_point_api.events()
    }

    pub fn eth_client(&self) -> Arc<M> {
        self.eth_client.clone()
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Runs `simulateValidation` as an eth_call and decodes the revert payload.
    /// The call reverting with `ValidationResult` is the success path.
    pub async fn simulate_validation(
        &self,
        uo: UserOperationSigned,
    ) -> Result<SimulateValidationResult, EntryPointError> {
        let mut call = self.entry_point_api.simulate_validation(uo.into());
        call.tx.set_gas(SIMULATE_VALIDATION_GAS_LIMIT);

        match call.call().await {
            Ok(_) => Err(EntryPointError::NoRevert { function: "simulateValidation".into() }),
            Err(err) => {
                let revert = Self::decode_contract_error(err)?;
                match revert {
                    EntryPointRevert::ValidationResult(res) => {
                        Ok(SimulateValidationResult::ValidationResult(res))
                    }
                    EntryPointRevert::ValidationResultWithAggregation(res) => {
                        Ok(SimulateValidationResult::ValidationResultWithAggregation(res))
                    }
                    EntryPointRevert::FailedOp(op) => Err(EntryPointError::FailedOp(op)),
                    EntryPointRevert::RevertString(s) => Err(EntryPointError::ExecutionReverted(s)),
                    other => Err(EntryPointError::Other {
                        inner: format!("unexpected simulateValidation revert: {other:?}"),
                    }),
                }
            }
        }
    }

    /// Runs `simulateValidation` under the collector tracer via `debug_traceCall`
    pub async fn simulate_validation_trace(
        &self,
        uo: UserOperationSigned,
    ) -> Result<GethTrace, EntryPointError> {
        let mut call = self.entry_point_api.simulate_validation(uo.into());
        call.tx.set_gas(SIMULATE_VALIDATION_GAS_LIMIT);

        self.eth_client
            .debug_trace_call(
                call.tx,
                None,
                GethDebugTracingCallOptions {
                    tracing_options: GethDebugTracingOptions {
                        tracer: Some(GethDebugTracerType::JsTracer(JS_TRACER.into())),
                        ..Default::default()
                    },
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| match EntryPointError::from_middleware_error::<M>(e) {
                Ok(revert) => EntryPointError::Other {
                    inner: format!("debug_traceCall returned revert data: {revert:?}"),
                },
                Err(err) => err,
            })
    }

    /// Dry-runs `handleOps` with an eth_call to surface a `FailedOp` before
    /// paying for the transaction
    pub async fn handle_ops_call(
        &self,
        uos: Vec<UserOperationSigned>,
        beneficiary: Address,
    ) -> Result<(), EntryPointError> {
        let ops = uos.into_iter().map(Into::into).collect::<Vec<entry_point_api::UserOperation>>();

        match self.entry_point_api.handle_ops(ops, beneficiary).call().await {
            Ok(_) => Ok(()),
            Err(err) => {
                let revert = Self::decode_contract_error(err)?;
                match revert {
                    EntryPointRevert::FailedOp(op) => Err(EntryPointError::FailedOp(op)),
                    EntryPointRevert::RevertString(s) => Err(EntryPointError::ExecutionReverted(s)),
                    other => Err(EntryPointError::Other {
                        inner: format!("handleOps reverted: {other:?}"),
                    }),
                }
            }
        }
    }

    /// Builds the unsigned `handleOps` transaction
    pub fn handle_ops_tx(
        &self,
        uos: Vec<UserOperationSigned>,
        beneficiary: Address,
    ) -> TypedTransaction {
        let ops = uos.into_iter().map(Into::into).collect::<Vec<entry_point_api::UserOperation>>();
        self.entry_point_api.handle_ops(ops, beneficiary).tx
    }

    /// Reads the entry point deposit of an address
    pub async fn balance_of(&self, addr: &Address) -> Result<U256, EntryPointError> {
        self.entry_point_api
            .balance_of(*addr)
            .call()
            .await
            .map_err(|err| EntryPointError::Other { inner: format!("balance of error: {err:?}") })
    }

    /// Reads the stake and deposit info of an address
    pub async fn get_deposit_info(&self, addr: &Address) -> Result<DepositInfo, EntryPointError> {
        let res = self.entry_point_api.get_deposit_info(*addr).call().await;

        match res {
            Ok((deposit, staked, stake, unstake_delay_sec, withdraw_time)) => Ok(DepositInfo {
                deposit: U256::from(deposit),
                staked,
                stake: U256::from(stake),
                unstake_delay_sec,
                withdraw_time,
            }),
            Err(err) => {
                Err(EntryPointError::Other { inner: format!("get deposit info error: {err:?}") })
            }
        }
    }

    fn decode_contract_error(
        err: ethers::contract::ContractError<M>,
    ) -> Result<EntryPointRevert, EntryPointError> {
        match err {
            ethers::contract::ContractError::DecodingError(e) => {
                Err(EntryPointError::Decode { inner: e.to_string() })
            }
            ethers::contract::ContractError::AbiError(e) => {
                Err(EntryPointError::Decode { inner: e.to_string() })
            }
            ethers::contract::ContractError::MiddlewareError { e } => {
                EntryPointError::from_middleware_error::<M>(e)
            }
            ethers::contract::ContractError::ProviderError { e } => {
                EntryPointError::from_provider_error(&e)
            }
            ethers::contract::ContractError::Revert(data) => decode_revert_error(data),
            _ => Err(EntryPointError::Other { inner: err.to_string() }),
        }
    }
}

impl From<UserOperationSigned> for entry_point_api::UserOperation {
    fn from(uo: UserOperationSigned) -> Self {
        Self {
            sender: uo.sender,
            nonce: uo.nonce,
            init_code: uo.init_code,
            call_data: uo.call_data,
            call_gas_limit: uo.call_gas_limit,
            verification_gas_limit: uo.verification_gas_limit,
            pre_verification_gas: uo.pre_verification_gas,
            max_fee_per_gas: uo.max_fee_per_gas,
            max_priority_fee_per_gas: uo.max_priority_fee_per_gas,
            paymaster_and_data: uo.paymaster_and_data,
            signature: uo.signature,
        }
    }
}

impl From<entry_point_api::UserOperation> for UserOperationSigned {
    fn from(uo: entry_point_api::UserOperation) -> Self {
        Self {
            sender: uo.sender,
            nonce: uo.nonce,
            init_code: uo.init_code,
            call_data: uo.call_data,
            call_gas_limit: uo.call_gas_limit,
            verification_gas_limit: uo.verification_gas_limit,
            pre_verification_gas: uo.pre_verification_gas,
            max_fee_per_gas: uo.max_fee_per_gas,
            max_priority_fee_per_gas: uo.max_priority_fee_per_gas,
            paymaster_and_data: uo.paymaster_and_data,
            signature: uo.signature,
        }
    }
}
