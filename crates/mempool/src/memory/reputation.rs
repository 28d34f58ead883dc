use crate::{
    mempool::ClearOp,
    reputation::{HashSetOp, ReputationEntryOp},
    ReputationError,
};
use ethers::types::Address;
use kestrel_primitives::reputation::ReputationEntry;
use std::collections::{HashMap, HashSet};

impl HashSetOp for HashSet<Address> {
    fn add_into_list(&mut self, addr: &Address) -> bool {
        self.insert(*addr)
    }

    fn remove_from_list(&mut self, addr: &Address) -> bool {
        self.remove(addr)
    }

    fn is_in_list(&self, addr: &Address) -> bool {
        self.contains(addr)
    }
}

impl ClearOp for HashMap<Address, ReputationEntry> {
    fn clear(&mut self) {
        self.clear()
    }
}

impl ReputationEntryOp for HashMap<Address, ReputationEntry> {
    fn get_entry(&self, addr: &Address) -> Result<Option<ReputationEntry>, ReputationError> {
        Ok(self.get(addr).copied())
    }

    fn set_entry(
        &mut self,
        entry: ReputationEntry,
    ) -> Result<Option<ReputationEntry>, ReputationError> {
        Ok(self.insert(entry.address, entry))
    }

    fn contains_entry(&self, addr: &Address) -> Result<bool, ReputationError> {
        Ok(self.contains_key(addr))
    }

    fn update(&mut self) -> Result<(), ReputationError> {
        for ent in self.values_mut() {
            ent.uo_seen = ent.uo_seen * 23 / 24;
            ent.uo_included = ent.uo_included * 23 / 24;
        }
        self.retain(|_, ent| ent.uo_seen > 0 || ent.uo_included > 0);

        Ok(())
    }

    fn get_all(&self) -> Vec<ReputationEntry> {
        self.values().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::{memory::new_memory_reputation, utils::tests::reputation_test_case};
    use ethers::types::U256;
    use kestrel_primitives::constants::validation::reputation::{
        BAN_SLACK, MIN_INCLUSION_RATE_DENOMINATOR, THROTTLING_SLACK,
    };
    use std::collections::HashSet;

    #[tokio::test]
    async fn memory_reputation() {
        let reputation = new_memory_reputation(
            MIN_INCLUSION_RATE_DENOMINATOR,
            THROTTLING_SLACK,
            BAN_SLACK,
            U256::from(1),
            U256::from(1),
            HashSet::default(),
            HashSet::default(),
        );
        reputation_test_case(reputation);
    }
}
