use crate::{
    mempool::Mempool,
    validate::{utils::extract_stake_info, SimulationTraceCheck, SimulationTraceHelper},
    Reputation, SimulationError,
};
use ethers::{
    abi::{self, ParamType},
    providers::Middleware,
};
use kestrel_contracts::{
    gen::SELECTORS_NAMES,
    tracer::{Call, CallEntry, JsTracerFrame},
};
use kestrel_primitives::{
    constants::validation::entities::{LEVEL_TO_ENTITY, PAYMASTER},
    simulation::{CREATE_OPCODE, RETURN_OPCODE, REVERT_OPCODE, VALIDATE_PAYMASTER_USER_OP_FUNCTION},
    UserOperation,
};

#[derive(Clone)]
pub struct CallStack;

impl CallStack {
    /// Matches call frame enters with exits to reconstruct the calls made
    /// during validation.
    fn parse_call_stack(
        &self,
        trace: &JsTracerFrame,
        calls: &mut Vec<CallEntry>,
    ) -> Result<(), SimulationError> {
        let mut st: Vec<Call> = vec![];

        for call in trace.calls.iter() {
            if call.typ == *REVERT_OPCODE || call.typ == *RETURN_OPCODE {
                let top = st.pop();

                if let Some(top) = top {
                    if top.typ.contains(CREATE_OPCODE.as_str()) {
                        calls.push(CallEntry {
                            typ: top.typ,
                            from: top.from,
                            to: top.to,
                            method: None,
                            ret: None,
                            rev: None,
                            value: None,
                        });
                    } else {
                        let method: Option<String> = {
                            if let Some(method) = top.method {
                                SELECTORS_NAMES.get(method.as_ref()).cloned()
                            } else {
                                None
                            }
                        };

                        if call.typ == *REVERT_OPCODE {
                            calls.push(CallEntry {
                                typ: top.typ,
                                from: top.from,
                                to: top.to,
                                method,
                                ret: None,
                                rev: call.data.clone(),
                                value: top.value,
                            });
                        } else {
                            calls.push(CallEntry {
                                typ: top.typ,
                                from: top.from,
                                to: top.to,
                                method,
                                ret: call.data.clone(),
                                rev: None,
                                value: top.value,
                            });
                        }
                    }
                }
            } else {
                st.push(call.clone());
            }
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl<M: Middleware> SimulationTraceCheck<M> for CallStack {
    /// Checks the calls made during validation: no calls into the entry point
    /// other than `depositTo` or the fallback, no value-bearing calls
    /// elsewhere, and no context returned by an unstaked paymaster.
    ///
    /// # Arguments
    /// `uo` - The user operation to check
    /// `helper` - The [SimulationTraceHelper]
    ///
    /// # Returns
    /// None if the check passes, otherwise a [SimulationError]
    async fn check_user_operation(
        &self,
        uo: &UserOperation,
        _mempool: &Mempool,
        reputation: &Reputation,
        helper: &mut SimulationTraceHelper<M>,
    ) -> Result<(), SimulationError> {
        if helper.stake_info.is_none() {
            helper.stake_info = Some(extract_stake_info(uo, helper.simulate_validation_result));
        }

        let mut calls: Vec<CallEntry> = vec![];
        self.parse_call_stack(helper.js_trace, &mut calls)?;

        for call in calls.iter() {
            // [OP-052] - the sender or the factory may call depositTo(sender) with
            // any value
            // [OP-053] - the sender may call the entry point's fallback with any value
            if call.to.unwrap_or_default() == helper.entry_point.address() &&
                call.from.unwrap_or_default() != helper.entry_point.address() &&
                (call.method.is_some() &&
                    call.method.clone().unwrap_or_default() != *"depositTo")
            {
                // [OP-054] - any other access to the entry point is forbidden
                return Err(SimulationError::CallStack {
                    inner: format!("illegal call into the entry point during validation: {call:?}"),
                });
            }

            // [OP-061] - CALL with value is forbidden, except for the calls into the
            // entry point described above
            if call.to.unwrap_or_default() != helper.entry_point.address() &&
                !call.value.unwrap_or_default().is_zero()
            {
                return Err(SimulationError::CallStack {
                    inner: format!("call with value during validation: {call:?}"),
                });
            }

            // paymaster
            for (i, stake_info) in helper.stake_info.unwrap_or_default().iter().enumerate() {
                if LEVEL_TO_ENTITY[i] == PAYMASTER &&
                    call.method.as_deref() == Some(VALIDATE_PAYMASTER_USER_OP_FUNCTION.as_str()) &&
                    call.to == Some(stake_info.address)
                {
                    if let Some(ret) = call.ret.as_ref() {
                        // validatePaymasterUserOp returns (bytes context, uint256 validationData)
                        let tokens =
                            abi::decode(&[ParamType::Bytes, ParamType::Uint(256)], ret.as_ref())
                                .map_err(|_| SimulationError::Validation {
                                    inner: "could not decode validatePaymasterUserOp return".into(),
                                })?;
                        let context = tokens
                            .into_iter()
                            .next()
                            .and_then(|t| t.into_bytes())
                            .unwrap_or_default();

                        // [EREP-050] - an unstaked paymaster may not return a context
                        if !context.is_empty() &&
                            reputation.verify_stake(PAYMASTER, Some(*stake_info)).is_err()
                        {
                            return Err(SimulationError::Unstaked {
                                entity: PAYMASTER.into(),
                                address: stake_info.address,
                                inner: "must not return context".into(),
                            });
                        }
                    }
                }
            }
        }

        Ok(())
    }
}
