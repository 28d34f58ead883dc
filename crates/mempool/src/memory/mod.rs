//! In-memory backends for the mempool and the reputation registry.
//! The mempool does not survive restarts; a fresh process starts empty.

mod mempool;
mod reputation;

use crate::{Mempool, Reputation};
use ethers::types::{Address, U256};
use kestrel_primitives::{
    reputation::ReputationEntry, simulation::CodeHash, UserOperationHash, UserOperationSigned,
};
use parking_lot::RwLock;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

/// Creates a [Mempool](Mempool) backed by in-memory maps
pub fn new_memory_mempool() -> Mempool {
    Mempool::new(
        Box::new(HashMap::<UserOperationHash, UserOperationSigned>::default()),
        Box::new(HashMap::<Address, HashSet<UserOperationHash>>::default()),
        Box::new(HashMap::<Address, HashSet<UserOperationHash>>::default()),
        Box::new(HashMap::<UserOperationHash, Vec<CodeHash>>::default()),
    )
}

/// Creates a [Reputation](Reputation) backed by in-memory maps
pub fn new_memory_reputation(
    min_inclusion_denominator: u64,
    throttling_slack: u64,
    ban_slack: u64,
    min_stake: U256,
    min_unstake_delay: U256,
    whitelist: HashSet<Address>,
    blacklist: HashSet<Address>,
) -> Reputation {
    Reputation::new(
        min_inclusion_denominator,
        throttling_slack,
        ban_slack,
        min_stake,
        min_unstake_delay,
        Arc::new(RwLock::new(whitelist)),
        Arc::new(RwLock::new(blacklist)),
        Box::new(HashMap::<Address, ReputationEntry>::default()),
    )
}
