use ethers::{contract::abigen, types::Selector, utils::keccak256};
use kestrel_primitives::constants::validation::entities::{
    FACTORY_LEVEL, PAYMASTER_LEVEL, SENDER_LEVEL,
};
use lazy_static::lazy_static;
use std::collections::HashMap;

abigen!(
    EntryPointAPI,
    r#"[
        struct UserOperation { address sender; uint256 nonce; bytes initCode; bytes callData; uint256 callGasLimit; uint256 verificationGasLimit; uint256 preVerificationGas; uint256 maxFeePerGas; uint256 maxPriorityFeePerGas; bytes paymasterAndData; bytes signature; }
        function simulateValidation(UserOperation calldata userOp) external
        function handleOps(UserOperation[] calldata ops, address beneficiary) external
        function getUserOpHash(UserOperation calldata userOp) external view returns (bytes32)
        function balanceOf(address account) external view returns (uint256)
        function getDepositInfo(address account) external view returns (uint112 deposit, bool staked, uint112 stake, uint32 unstakeDelaySec, uint48 withdrawTime)
        function getNonce(address sender, uint192 key) external view returns (uint256 nonce)
        function depositTo(address account) external payable
        event UserOperationEvent(bytes32 indexed userOpHash, address indexed sender, address indexed paymaster, uint256 nonce, bool success, uint256 actualGasCost, uint256 actualGasUsed)
        event AccountDeployed(bytes32 indexed userOpHash, address indexed sender, address factory, address paymaster)
        event SignatureAggregatorChanged(address indexed aggregator)
        event BeforeExecution()
        event UserOperationRevertReason(bytes32 indexed userOpHash, address indexed sender, uint256 nonce, bytes revertReason)
    ]"#
);

/// The user operation struct of the ABI signatures above, as a type string
pub const USER_OPERATION_TUPLE: &str =
    "(address,uint256,bytes,bytes,uint256,uint256,uint256,uint256,uint256,bytes,bytes)";

pub(crate) fn signature_selector(sig: &str) -> Selector {
    let hash = keccak256(sig.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

lazy_static! {
    /// Top-level method selectors observed during `simulateValidation`, mapped to the
    /// index of the entity the call frame validates (factory, sender, paymaster)
    pub static ref SELECTORS_INDICES: HashMap<Selector, usize> = {
        let mut map = HashMap::new();
        // SenderCreator.createSender(initCode)
        map.insert(signature_selector("createSender(bytes)"), FACTORY_LEVEL);
        // IAccount.validateUserOp(userOp, userOpHash, missingAccountFunds)
        map.insert(
            signature_selector(&format!("validateUserOp({USER_OPERATION_TUPLE},bytes32,uint256)")),
            SENDER_LEVEL,
        );
        // IPaymaster.validatePaymasterUserOp(userOp, userOpHash, maxCost)
        map.insert(
            signature_selector(&format!(
                "validatePaymasterUserOp({USER_OPERATION_TUPLE},bytes32,uint256)"
            )),
            PAYMASTER_LEVEL,
        );
        map
    };

    /// Known method selectors, mapped to function names (used by the call-stack rules)
    pub static ref SELECTORS_NAMES: HashMap<Selector, String> = {
        let mut map = HashMap::new();
        map.insert(signature_selector("createSender(bytes)"), "createSender".to_string());
        map.insert(
            signature_selector(&format!("validateUserOp({USER_OPERATION_TUPLE},bytes32,uint256)")),
            "validateUserOp".to_string(),
        );
        map.insert(
            signature_selector(&format!(
                "validatePaymasterUserOp({USER_OPERATION_TUPLE},bytes32,uint256)"
            )),
            "validatePaymasterUserOp".to_string(),
        );
        map.insert(signature_selector("depositTo(address)"), "depositTo".to_string());
        map.insert(signature_selector("balanceOf(address)"), "balanceOf".to_string());
        map
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_selectors() {
        // pinned against the deployed v0.6 entry point
        assert_eq!(
            signature_selector(&format!("validateUserOp({USER_OPERATION_TUPLE},bytes32,uint256)")),
            [0x3a, 0x87, 0x1c, 0xdd]
        );
        assert_eq!(
            signature_selector(&format!(
                "validatePaymasterUserOp({USER_OPERATION_TUPLE},bytes32,uint256)"
            )),
            [0xf4, 0x65, 0xc7, 0x7e]
        );
        assert_eq!(signature_selector("createSender(bytes)"), [0x57, 0x0e, 0x1a, 0x36]);
    }
}
