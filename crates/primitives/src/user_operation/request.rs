//! User operation request (optional fields)

use super::UserOperationSigned;
use crate::utils::as_checksum_addr;
use ethers::types::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};

/// User operation as received over the wire, with gas fields and signature optional
/// (gas estimation accepts partially filled operations)
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UserOperationRequest {
    #[serde(serialize_with = "as_checksum_addr")]
    pub sender: Address,
    pub nonce: U256,
    #[serde(default)]
    pub init_code: Bytes,
    #[serde(default)]
    pub call_data: Bytes,
    #[serde(default)]
    pub call_gas_limit: Option<U256>,
    #[serde(default)]
    pub verification_gas_limit: Option<U256>,
    #[serde(default)]
    pub pre_verification_gas: Option<U256>,
    #[serde(default)]
    pub max_fee_per_gas: Option<U256>,
    #[serde(default)]
    pub max_priority_fee_per_gas: Option<U256>,
    #[serde(default)]
    pub paymaster_and_data: Bytes,
    #[serde(default)]
    pub signature: Option<Bytes>,
}

impl From<UserOperationRequest> for UserOperationSigned {
    fn from(req: UserOperationRequest) -> Self {
        Self {
            sender: req.sender,
            nonce: req.nonce,
            init_code: req.init_code,
            call_data: req.call_data,
            call_gas_limit: req.call_gas_limit.unwrap_or_default(),
            verification_gas_limit: req.verification_gas_limit.unwrap_or_default(),
            pre_verification_gas: req.pre_verification_gas.unwrap_or_default(),
            max_fee_per_gas: req.max_fee_per_gas.unwrap_or_default(),
            max_priority_fee_per_gas: req.max_priority_fee_per_gas.unwrap_or_default(),
            paymaster_and_data: req.paymaster_and_data,
            signature: req.signature.unwrap_or_default(),
        }
    }
}

impl From<UserOperationSigned> for UserOperationRequest {
    fn from(uo: UserOperationSigned) -> Self {
        Self {
            sender: uo.sender,
            nonce: uo.nonce,
            init_code: uo.init_code,
            call_data: uo.call_data,
            call_gas_limit: Some(uo.call_gas_limit),
            verification_gas_limit: Some(uo.verification_gas_limit),
            pre_verification_gas: Some(uo.pre_verification_gas),
            max_fee_per_gas: Some(uo.max_fee_per_gas),
            max_priority_fee_per_gas: Some(uo.max_priority_fee_per_gas),
            paymaster_and_data: uo.paymaster_and_data,
            signature: Some(uo.signature),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_request_with_missing_gas_fields() {
        let req: UserOperationRequest = serde_json::from_str(
            r#"{
                "sender": "0x9c5754De1443984659E1b3a8d1931D83475ba29C",
                "nonce": "0x0",
                "callData": "0xb61d27f6",
                "maxFeePerGas": "0x3b9aca00"
            }"#,
        )
        .unwrap();

        let uo: UserOperationSigned = req.into();
        assert_eq!(uo.call_gas_limit, U256::zero());
        assert_eq!(uo.max_fee_per_gas, U256::from(1_000_000_000u64));
        assert!(uo.init_code.is_empty());
    }

    #[test]
    fn reject_malformed_hex() {
        let res: Result<UserOperationRequest, _> = serde_json::from_str(
            r#"{"sender": "0x9c5754De1443984659E1b3a8d1931D83475ba29C", "nonce": "0xzz"}"#,
        );
        assert!(res.is_err());
    }
}
