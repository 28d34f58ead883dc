//! Simulation-related types

use ethers::{
    contract::{EthAbiCodec, EthAbiType},
    types::{Address, H256},
};
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Time interval before a user operation expires (in seconds)
pub const EXPIRATION_TIMESTAMP_DIFF: u64 = 30;

lazy_static! {
    /// Opcodes the entities may not execute during validation (ERC-4337 rule OP-011)
    pub static ref FORBIDDEN_OPCODES: HashSet<String> = {
        let mut set = HashSet::new();
        set.insert("GASPRICE".to_string());
        set.insert("GASLIMIT".to_string());
        set.insert("DIFFICULTY".to_string());
        set.insert("TIMESTAMP".to_string());
        set.insert("BASEFEE".to_string());
        set.insert("BLOCKHASH".to_string());
        set.insert("NUMBER".to_string());
        set.insert("SELFBALANCE".to_string());
        set.insert("BALANCE".to_string());
        set.insert("ORIGIN".to_string());
        set.insert("GAS".to_string());
        set.insert("CREATE".to_string());
        set.insert("COINBASE".to_string());
        set.insert("SELFDESTRUCT".to_string());
        set.insert("RANDOM".to_string());
        set.insert("PREVRANDAO".to_string());
        set
    };
    pub static ref CREATE_OPCODE: String = "CREATE".to_string();
    pub static ref CREATE2_OPCODE: String = "CREATE2".to_string();
    pub static ref RETURN_OPCODE: String = "RETURN".to_string();
    pub static ref REVERT_OPCODE: String = "REVERT".to_string();
    pub static ref VALIDATE_PAYMASTER_USER_OP_FUNCTION: String =
        "validatePaymasterUserOp".to_string();
}

/// Code hash of a contract referenced during validation, fingerprinting the
/// state the validation outcome depends on
#[derive(
    Debug, Default, Clone, Eq, PartialEq, PartialOrd, Ord, Serialize, Deserialize, EthAbiCodec, EthAbiType,
)]
pub struct CodeHash {
    pub address: Address,
    pub hash: H256,
}

/// Storage touched during validation, keyed by account. An account-level root
/// (from `eth_getProof`) overrides any slot-level entries for that account.
#[derive(Debug, Default, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct StorageMap {
    /// Account storage roots
    pub root_hashes: HashMap<Address, H256>,
    /// Individual slot values
    pub slots: HashMap<Address, HashMap<H256, H256>>,
}
