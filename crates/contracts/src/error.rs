use crate::entry_point::{
    AggregatorStakeInfo, FailedOp, ReturnInfo, StakeInfo, ValidationResult,
    ValidationResultWithAggregation,
};
use crate::gen::signature_selector;
use ethers::{
    abi::{self, ParamType, Token},
    providers::{JsonRpcError, Middleware, MiddlewareError, ProviderError},
    types::{Address, Bytes, Selector, U256},
};
use lazy_static::lazy_static;
use regex::Regex;
use std::str::FromStr;
use thiserror::Error;

/// Entry point errors
#[derive(Debug, Error, Clone)]
pub enum EntryPointError {
    /// Failed user operation error
    #[error("{0}")]
    FailedOp(FailedOp),

    /// Execution reverted
    #[error("execution reverted: {0}")]
    ExecutionReverted(String),

    /// There is no revert when there should be
    #[error("{function} should revert")]
    NoRevert {
        /// function
        function: String,
    },

    /// Provider error
    #[error("provider error: {inner}")]
    Provider {
        /// The inner error message
        inner: String,
    },

    /// The node does not support a required method (JSON-RPC -32601)
    #[error("method not supported by the node: {method}")]
    MethodNotSupported {
        /// The missing method
        method: String,
    },

    /// Data decoding error
    #[error("decode error: {inner}")]
    Decode {
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

/// Decoded revert payloads of the entry point
#[derive(Debug, Clone)]
pub enum EntryPointRevert {
    ValidationResult(ValidationResult),
    ValidationResultWithAggregation(ValidationResultWithAggregation),
    FailedOp(FailedOp),
    SenderAddressResult(Address),
    RevertString(String),
    Unknown(Bytes),
}

const RETURN_INFO_COMPONENTS: [ParamType; 6] = [
    ParamType::Uint(256),
    ParamType::Uint(256),
    ParamType::Bool,
    ParamType::Uint(48),
    ParamType::Uint(48),
    ParamType::Bytes,
];

fn stake_info_ty() -> ParamType {
    ParamType::Tuple(vec![ParamType::Uint(256), ParamType::Uint(256)])
}

lazy_static! {
    pub static ref VALIDATION_RESULT_SELECTOR: Selector = signature_selector(
        "ValidationResult((uint256,uint256,bool,uint48,uint48,bytes),(uint256,uint256),(uint256,uint256),(uint256,uint256))"
    );
    pub static ref VALIDATION_RESULT_WITH_AGGREGATION_SELECTOR: Selector = signature_selector(
        "ValidationResultWithAggregation((uint256,uint256,bool,uint48,uint48,bytes),(uint256,uint256),(uint256,uint256),(uint256,uint256),(address,(uint256,uint256)))"
    );
    pub static ref FAILED_OP_SELECTOR: Selector = signature_selector("FailedOp(uint256,string)");
    pub static ref SENDER_ADDRESS_RESULT_SELECTOR: Selector =
        signature_selector("SenderAddressResult(address)");
    pub static ref ERROR_STRING_SELECTOR: Selector = signature_selector("Error(string)");
}

fn token_to_u256(token: Token) -> Result<U256, EntryPointError> {
    token
        .into_uint()
        .ok_or_else(|| EntryPointError::Decode { inner: "expected uint token".into() })
}

fn token_to_stake_info(token: Token) -> Result<StakeInfo, EntryPointError> {
    let mut tokens = token
        .into_tuple()
        .ok_or_else(|| EntryPointError::Decode { inner: "expected stake info tuple".into() })?
        .into_iter();
    Ok(StakeInfo {
        stake: token_to_u256(tokens.next().unwrap_or(Token::Uint(U256::zero())))?,
        unstake_delay_sec: token_to_u256(tokens.next().unwrap_or(Token::Uint(U256::zero())))?,
    })
}

fn token_to_return_info(token: Token) -> Result<ReturnInfo, EntryPointError> {
    let mut tokens = token
        .into_tuple()
        .ok_or_else(|| EntryPointError::Decode { inner: "expected return info tuple".into() })?
        .into_iter();
    let pre_op_gas = token_to_u256(tokens.next().unwrap_or(Token::Uint(U256::zero())))?;
    let prefund = token_to_u256(tokens.next().unwrap_or(Token::Uint(U256::zero())))?;
    let sig_failed = tokens
        .next()
        .and_then(|t| t.into_bool())
        .ok_or_else(|| EntryPointError::Decode { inner: "expected sigFailed bool".into() })?;
    let valid_after = token_to_u256(tokens.next().unwrap_or(Token::Uint(U256::zero())))?;
    let valid_until = token_to_u256(tokens.next().unwrap_or(Token::Uint(U256::zero())))?;
    let paymaster_context = tokens
        .next()
        .and_then(|t| t.into_bytes())
        .ok_or_else(|| EntryPointError::Decode { inner: "expected paymaster context".into() })?;
    Ok(ReturnInfo {
        pre_op_gas,
        prefund,
        sig_failed,
        valid_after,
        valid_until,
        paymaster_context: paymaster_context.into(),
    })
}

fn decode_validation_result(data: &[u8]) -> Result<ValidationResult, EntryPointError> {
    let tokens = abi::decode(
        &[
            ParamType::Tuple(RETURN_INFO_COMPONENTS.to_vec()),
            stake_info_ty(),
            stake_info_ty(),
            stake_info_ty(),
        ],
        data,
    )
    .map_err(|e| EntryPointError::Decode { inner: format!("validation result: {e}") })?;
    let mut tokens = tokens.into_iter();

    Ok(ValidationResult {
        return_info: token_to_return_info(tokens.next().unwrap_or(Token::Tuple(vec![])))?,
        sender_info: token_to_stake_info(tokens.next().unwrap_or(Token::Tuple(vec![])))?,
        factory_info: token_to_stake_info(tokens.next().unwrap_or(Token::Tuple(vec![])))?,
        paymaster_info: token_to_stake_info(tokens.next().unwrap_or(Token::Tuple(vec![])))?,
    })
}

fn decode_validation_result_with_aggregation(
    data: &[u8],
) -> Result<ValidationResultWithAggregation, EntryPointError> {
    let tokens = abi::decode(
        &[
            ParamType::Tuple(RETURN_INFO_COMPONENTS.to_vec()),
            stake_info_ty(),
            stake_info_ty(),
            stake_info_ty(),
            ParamType::Tuple(vec![ParamType::Address, stake_info_ty()]),
        ],
        data,
    )
    .map_err(|e| EntryPointError::Decode { inner: format!("aggregated validation result: {e}") })?;
    let mut tokens = tokens.into_iter();

    let return_info = token_to_return_info(tokens.next().unwrap_or(Token::Tuple(vec![])))?;
    let sender_info = token_to_stake_info(tokens.next().unwrap_or(Token::Tuple(vec![])))?;
    let factory_info = token_to_stake_info(tokens.next().unwrap_or(Token::Tuple(vec![])))?;
    let paymaster_info = token_to_stake_info(tokens.next().unwrap_or(Token::Tuple(vec![])))?;
    let mut agg_tokens = tokens
        .next()
        .and_then(|t| t.into_tuple())
        .ok_or_else(|| EntryPointError::Decode { inner: "expected aggregator tuple".into() })?
        .into_iter();
    let aggregator = agg_tokens
        .next()
        .and_then(|t| t.into_address())
        .ok_or_else(|| EntryPointError::Decode { inner: "expected aggregator address".into() })?;
    let stake_info = token_to_stake_info(agg_tokens.next().unwrap_or(Token::Tuple(vec![])))?;

    Ok(ValidationResultWithAggregation {
        return_info,
        sender_info,
        factory_info,
        paymaster_info,
        aggregator_info: AggregatorStakeInfo { aggregator, stake_info },
    })
}

fn decode_failed_op(data: &[u8]) -> Result<FailedOp, EntryPointError> {
    let tokens = abi::decode(&[ParamType::Uint(256), ParamType::String], data)
        .map_err(|e| EntryPointError::Decode { inner: format!("failed op: {e}") })?;
    let mut tokens = tokens.into_iter();
    let op_index = token_to_u256(tokens.next().unwrap_or(Token::Uint(U256::zero())))?;
    let reason = tokens
        .next()
        .and_then(|t| t.into_string())
        .ok_or_else(|| EntryPointError::Decode { inner: "expected failed op reason".into() })?;
    Ok(FailedOp { op_index, reason })
}

/// `revert("reason")` and `require(false, "reason")` revert with the error
/// signature `Error(string)` (0x08c379a0)
pub fn decode_revert_string(data: &[u8]) -> Option<String> {
    abi::decode(&[ParamType::String], data).ok().and_then(|t| t.into_iter().next()).and_then(|t| t.into_string())
}

/// Decodes the revert data of an entry point call into its typed payload
pub fn decode_revert_error(data: Bytes) -> Result<EntryPointRevert, EntryPointError> {
    if data.len() < 4 {
        return Err(EntryPointError::Decode {
            inner: format!("revert data too short: {} bytes", data.len()),
        });
    }

    let (selector, payload) = data.split_at(4);

    if selector == VALIDATION_RESULT_SELECTOR.as_slice() {
        return decode_validation_result(payload).map(EntryPointRevert::ValidationResult);
    }
    if selector == VALIDATION_RESULT_WITH_AGGREGATION_SELECTOR.as_slice() {
        return decode_validation_result_with_aggregation(payload)
            .map(EntryPointRevert::ValidationResultWithAggregation);
    }
    if selector == FAILED_OP_SELECTOR.as_slice() {
        return decode_failed_op(payload).map(EntryPointRevert::FailedOp);
    }
    if selector == SENDER_ADDRESS_RESULT_SELECTOR.as_slice() {
        let addr = abi::decode(&[ParamType::Address], payload)
            .ok()
            .and_then(|t| t.into_iter().next())
            .and_then(|t| t.into_address())
            .ok_or_else(|| EntryPointError::Decode { inner: "expected sender address".into() })?;
        return Ok(EntryPointRevert::SenderAddressResult(addr));
    }
    if selector == ERROR_STRING_SELECTOR.as_slice() {
        if let Some(reason) = decode_revert_string(payload) {
            return Ok(EntryPointRevert::RevertString(reason));
        }
    }

    Ok(EntryPointRevert::Unknown(data))
}

impl EntryPointError {
    pub fn from_provider_error(err: &ProviderError) -> Result<EntryPointRevert, Self> {
        match err {
            ProviderError::JsonRpcClientError(err) => err
                .as_error_response()
                .map(Self::from_json_rpc_error)
                .unwrap_or(Err(EntryPointError::Provider {
                    inner: format!("unknown json-rpc client error: {err:?}"),
                })),
            ProviderError::HTTPError(err) => {
                Err(EntryPointError::Provider { inner: format!("HTTP error: {err:?}") })
            }
            _ => {
                Err(EntryPointError::Provider { inner: format!("unknown provider error: {err:?}") })
            }
        }
    }

    pub fn from_json_rpc_error(err: &JsonRpcError) -> Result<EntryPointRevert, Self> {
        // -32601 means the node lacks a method the bundler depends on; never
        // misread it as a revert
        if err.code == -32601 {
            return Err(EntryPointError::MethodNotSupported { method: err.message.clone() });
        }

        if let Some(ref value) = err.data {
            match value {
                serde_json::Value::String(data) => {
                    let re = Regex::new(r"0x[0-9a-fA-F]+").expect("Regex rules valid");

                    let hex = if let Some(hex) = re.find(data) {
                        hex
                    } else {
                        return Err(EntryPointError::Decode {
                            inner: format!("hex string not found in {data:?}"),
                        });
                    };

                    let bytes = match Bytes::from_str(hex.into()) {
                        Ok(bytes) => bytes,
                        Err(e) => {
                            return Err(EntryPointError::Decode {
                                inner: format!(
                                    "string {data:?} could not be converted to bytes: {e:?}",
                                ),
                            })
                        }
                    };

                    return decode_revert_error(bytes);
                }
                other => {
                    return Err(Self::Decode {
                        inner: format!("json-rpc return data is not a string: {other:?}"),
                    })
                }
            }
        }

        Err(Self::Provider { inner: format!("json-rpc error doesn't contain data field: {err:?}") })
    }

    pub fn from_middleware_error<M: Middleware>(err: M::Error) -> Result<EntryPointRevert, Self> {
        if let Some(err) = err.as_error_response() {
            return Self::from_json_rpc_error(err);
        }

        if let Some(err) = err.as_provider_error() {
            return Self::from_provider_error(err);
        }

        Err(Self::Provider { inner: format!("middleware error: {err:?}") })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_op_selector_is_pinned() {
        assert_eq!(*FAILED_OP_SELECTOR, [0x22, 0x02, 0x66, 0xb6]);
        assert_eq!(*ERROR_STRING_SELECTOR, [0x08, 0xc3, 0x79, 0xa0]);
    }

    #[test]
    fn deserialize_failed_op() -> eyre::Result<()> {
        let err_msg = Bytes::from_str("0x220266b600000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000000040000000000000000000000000000000000000000000000000000000000000001e41413430206f76657220766572696669636174696f6e4761734c696d69740000")?;
        let res = decode_revert_error(err_msg)?;
        match res {
            EntryPointRevert::FailedOp(f) => {
                assert_eq!(f.op_index, U256::zero());
                assert_eq!(f.reason, "AA40 over verificationGasLimit");
            }
            _ => panic!("Invalid error message"),
        }
        Ok(())
    }

    #[test]
    fn deserialize_revert_string() -> eyre::Result<()> {
        let err_msg = Bytes::from_str("0x08c379a00000000000000000000000000000000000000000000000000000000000000020000000000000000000000000000000000000000000000000000000000000001841413934206761732076616c756573206f766572666c6f770000000000000000")?;
        let res = decode_revert_error(err_msg)?;
        match res {
            EntryPointRevert::RevertString(s) => {
                assert_eq!(s, "AA94 gas values overflow")
            }
            _ => panic!("Invalid error message"),
        }
        Ok(())
    }

    #[test]
    fn validation_result_round_trip() -> eyre::Result<()> {
        let encoded = abi::encode(&[
            Token::Tuple(vec![
                Token::Uint(U256::from(60_000)),
                Token::Uint(U256::from(1_000_000)),
                Token::Bool(false),
                Token::Uint(U256::zero()),
                Token::Uint(U256::zero()),
                Token::Bytes(vec![]),
            ]),
            Token::Tuple(vec![Token::Uint(U256::zero()), Token::Uint(U256::zero())]),
            Token::Tuple(vec![Token::Uint(U256::from(1)), Token::Uint(U256::from(86400))]),
            Token::Tuple(vec![Token::Uint(U256::zero()), Token::Uint(U256::zero())]),
        ]);
        let data = Bytes::from([VALIDATION_RESULT_SELECTOR.to_vec(), encoded].concat());

        match decode_revert_error(data)? {
            EntryPointRevert::ValidationResult(res) => {
                assert_eq!(res.return_info.pre_op_gas, U256::from(60_000));
                assert_eq!(res.return_info.prefund, U256::from(1_000_000));
                assert!(!res.return_info.sig_failed);
                assert_eq!(res.factory_info.unstake_delay_sec, U256::from(86400));
            }
            other => panic!("expected validation result, got {other:?}"),
        }
        Ok(())
    }
}
