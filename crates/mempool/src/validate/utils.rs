use ethers::types::{Address, H256, U256};
use kestrel_contracts::{entry_point::SimulateValidationResult, tracer::JsTracerFrame};
use kestrel_primitives::{
    constants::validation::entities::NUMBER_OF_LEVELS, get_address, reputation::StakeInfo,
    simulation::StorageMap, UserOperation,
};
use std::str::FromStr;

/// Extracts the gas used by the validation step from the simulation result
pub fn extract_pre_op_gas(sim_res: &SimulateValidationResult) -> U256 {
    match sim_res {
        SimulateValidationResult::ValidationResult(res) => res.return_info.pre_op_gas,
        SimulateValidationResult::ValidationResultWithAggregation(res) => {
            res.return_info.pre_op_gas
        }
    }
}

/// Extracts the required prefund from the simulation result
pub fn extract_pre_fund(sim_res: &SimulateValidationResult) -> U256 {
    match sim_res {
        SimulateValidationResult::ValidationResult(res) => res.return_info.prefund,
        SimulateValidationResult::ValidationResultWithAggregation(res) => res.return_info.prefund,
    }
}

/// Extracts the validity window `(valid_after, valid_until)` from the
/// simulation result
pub fn extract_timestamps(sim_res: &SimulateValidationResult) -> (U256, U256) {
    match sim_res {
        SimulateValidationResult::ValidationResult(res) => {
            (res.return_info.valid_after, res.return_info.valid_until)
        }
        SimulateValidationResult::ValidationResultWithAggregation(res) => {
            (res.return_info.valid_after, res.return_info.valid_until)
        }
    }
}

/// Extracts the per-entity stake info from the simulation result, indexed by
/// validation level (factory, sender, paymaster)
pub fn extract_stake_info(
    uo: &UserOperation,
    sim_res: &SimulateValidationResult,
) -> [StakeInfo; NUMBER_OF_LEVELS] {
    let (f_info, s_info, p_info) = match sim_res {
        SimulateValidationResult::ValidationResult(res) => {
            (res.factory_info, res.sender_info, res.paymaster_info)
        }
        SimulateValidationResult::ValidationResultWithAggregation(res) => {
            (res.factory_info, res.sender_info, res.paymaster_info)
        }
    };

    [
        // factory
        StakeInfo {
            address: get_address(&uo.init_code).unwrap_or(Address::zero()),
            stake: f_info.stake,
            unstake_delay: f_info.unstake_delay_sec,
        },
        // account
        StakeInfo { address: uo.sender, stake: s_info.stake, unstake_delay: s_info.unstake_delay_sec },
        // paymaster
        StakeInfo {
            address: get_address(&uo.paymaster_and_data).unwrap_or(Address::zero()),
            stake: p_info.stake,
            unstake_delay: p_info.unstake_delay_sec,
        },
    ]
}

/// Extracts the storage map (first-read slot values per account) from the
/// tracer output
pub fn extract_storage_map(js_trace: &JsTracerFrame) -> StorageMap {
    let mut storage_map = StorageMap::default();

    for l in js_trace.calls_from_entry_point.iter() {
        for (addr, acc) in l.access.iter() {
            if !storage_map.slots.contains_key(addr) {
                let mut slots = std::collections::HashMap::new();
                for (slot, value) in acc.reads.iter() {
                    if let (Ok(slot), Ok(value)) = (H256::from_str(slot), H256::from_str(value)) {
                        slots.insert(slot, value);
                    }
                }
                storage_map.slots.insert(*addr, slots);
            }
        }
    }

    storage_map
}

/// Merges multiple storage maps into one. An account-level root always beats
/// slot-level entries for that account.
pub fn merge_storage_maps(storage_maps: Vec<StorageMap>) -> StorageMap {
    let mut merged_map = StorageMap::default();

    for map in storage_maps {
        for (addr, entry) in map.root_hashes {
            merged_map.root_hashes.insert(addr, entry);
            merged_map.slots.remove(&addr);
        }

        for (addr, entry) in map.slots {
            if !merged_map.root_hashes.contains_key(&addr) {
                match merged_map.slots.get_mut(&addr) {
                    Some(slots) => {
                        for (slot, value) in entry {
                            slots.insert(slot, value);
                        }
                    }
                    None => {
                        merged_map.slots.insert(addr, entry);
                    }
                }
            }
        }
    }

    merged_map
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn slot(n: u64) -> H256 {
        H256::from_low_u64_be(n)
    }

    #[test]
    fn storage_map_merge_root_beats_slots() {
        let addr = Address::random();
        let root = H256::random();

        let mut with_slots = StorageMap::default();
        with_slots.slots.insert(addr, HashMap::from([(slot(1), slot(2))]));

        let mut with_root = StorageMap::default();
        with_root.root_hashes.insert(addr, root);

        // root arriving after slots
        let merged = merge_storage_maps(vec![with_slots.clone(), with_root.clone()]);
        assert_eq!(merged.root_hashes.get(&addr), Some(&root));
        assert!(!merged.slots.contains_key(&addr));

        // slots arriving after root
        let merged = merge_storage_maps(vec![with_root, with_slots]);
        assert_eq!(merged.root_hashes.get(&addr), Some(&root));
        assert!(!merged.slots.contains_key(&addr));
    }

    #[test]
    fn storage_map_merge_unions_slots() {
        let addr = Address::random();

        let mut fst = StorageMap::default();
        fst.slots.insert(addr, HashMap::from([(slot(1), slot(10))]));
        let mut snd = StorageMap::default();
        snd.slots.insert(addr, HashMap::from([(slot(2), slot(20))]));

        let merged = merge_storage_maps(vec![fst, snd]);
        let slots = merged.slots.get(&addr).unwrap();
        assert_eq!(slots.len(), 2);
        assert_eq!(slots.get(&slot(1)), Some(&slot(10)));
        assert_eq!(slots.get(&slot(2)), Some(&slot(20)));
    }
}
