use crate::{mempool::ClearOp, ReputationError};
use dyn_clone::DynClone;
use ethers::types::{Address, Bytes, U256};
use kestrel_primitives::{
    get_address,
    reputation::{ReputationEntry, ReputationStatus, StakeInfo},
};
use parking_lot::RwLock;
use std::{collections::HashSet, fmt::Debug, ops::Deref, sync::Arc};

/// Trait representing operations on an address set
pub trait HashSetOp: Default + Sync + Send {
    /// Adds the given address into the list
    fn add_into_list(&mut self, addr: &Address) -> bool;

    /// Removes the given address from the list
    fn remove_from_list(&mut self, addr: &Address) -> bool;

    /// Checks if the given address is in the list
    fn is_in_list(&self, addr: &Address) -> bool;
}

impl<T: HashSetOp> HashSetOp for Arc<RwLock<T>> {
    fn add_into_list(&mut self, addr: &Address) -> bool {
        self.write().add_into_list(addr)
    }

    fn remove_from_list(&mut self, addr: &Address) -> bool {
        self.write().remove_from_list(addr)
    }

    fn is_in_list(&self, addr: &Address) -> bool {
        self.read().is_in_list(addr)
    }
}

/// Trait representing operations on the reputation entry registry
pub trait ReputationEntryOp: ClearOp + Sync + Send + Debug + DynClone {
    /// Retrieves the reputation entry associated with the given address
    fn get_entry(&self, addr: &Address) -> Result<Option<ReputationEntry>, ReputationError>;

    /// Sets the reputation entry, returning the previous one if any
    fn set_entry(&mut self, entry: ReputationEntry)
        -> Result<Option<ReputationEntry>, ReputationError>;

    /// Checks if a reputation entry exists for the given address
    fn contains_entry(&self, addr: &Address) -> Result<bool, ReputationError>;

    /// Ages all entries: both counters decay to 23/24 of their value every
    /// cron tick, and entries that reach zero on both are dropped
    fn update(&mut self) -> Result<(), ReputationError>;

    /// Retrieves all reputation entries
    fn get_all(&self) -> Vec<ReputationEntry>;
}
dyn_clone::clone_trait_object!(ReputationEntryOp);

impl<T: ReputationEntryOp> ReputationEntryOp for Arc<RwLock<T>> {
    fn get_entry(&self, addr: &Address) -> Result<Option<ReputationEntry>, ReputationError> {
        self.read().get_entry(addr)
    }

    fn set_entry(
        &mut self,
        entry: ReputationEntry,
    ) -> Result<Option<ReputationEntry>, ReputationError> {
        self.write().set_entry(entry)
    }

    fn contains_entry(&self, addr: &Address) -> Result<bool, ReputationError> {
        self.read().contains_entry(addr)
    }

    fn update(&mut self) -> Result<(), ReputationError> {
        self.write().update()
    }

    fn get_all(&self) -> Vec<ReputationEntry> {
        self.read().get_all()
    }
}

/// Reputation of the entities seen by the mempool, with OK/THROTTLED/BANNED
/// classification and stake verification
#[derive(Debug)]
pub struct Reputation {
    /// Minimum denominator for calculating the minimum expected inclusions
    min_inclusion_denominator: u64,
    /// Constant for calculating the throttling threshold
    throttling_slack: u64,
    /// Constant for calculating the ban threshold
    ban_slack: u64,
    /// Minimum stake amount
    min_stake: U256,
    /// Minimum time required to unstake (in seconds)
    min_unstake_delay: U256,
    /// Whitelisted addresses, always OK
    whitelist: Arc<RwLock<HashSet<Address>>>,
    /// Blacklisted addresses, always BANNED
    blacklist: Arc<RwLock<HashSet<Address>>>,
    /// Entities' reputation registry
    entities: Box<dyn ReputationEntryOp>,
}

impl Clone for Reputation {
    fn clone(&self) -> Self {
        Self {
            min_inclusion_denominator: self.min_inclusion_denominator,
            throttling_slack: self.throttling_slack,
            ban_slack: self.ban_slack,
            min_stake: self.min_stake,
            min_unstake_delay: self.min_unstake_delay,
            whitelist: self.whitelist.clone(),
            blacklist: self.blacklist.clone(),
            entities: self.entities.clone(),
        }
    }
}

impl Reputation {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        min_inclusion_denominator: u64,
        throttling_slack: u64,
        ban_slack: u64,
        min_stake: U256,
        min_unstake_delay: U256,
        whitelist: Arc<RwLock<HashSet<Address>>>,
        blacklist: Arc<RwLock<HashSet<Address>>>,
        entities: Box<dyn ReputationEntryOp>,
    ) -> Self {
        Self {
            min_inclusion_denominator,
            throttling_slack,
            ban_slack,
            min_stake,
            min_unstake_delay,
            whitelist,
            blacklist,
            entities,
        }
    }

    /// Sets the default reputation entry for an address if it does not exist yet
    fn set_default(&mut self, addr: &Address) -> Result<(), ReputationError> {
        if !self.entities.contains_entry(addr)? {
            let ent = ReputationEntry::default_with_addr(*addr);

            self.entities.set_entry(ent)?;
        }

        Ok(())
    }

    /// Gets an entity's [ReputationEntry](ReputationEntry) by address, with the
    /// derived status filled in
    pub fn get(&self, addr: &Address) -> Result<ReputationEntry, ReputationError> {
        if let Some(ent) = self.entities.get_entry(addr)? {
            Ok(ReputationEntry { status: self.get_status(addr)?, ..ent })
        } else {
            Ok(ReputationEntry::default_with_addr(*addr))
        }
    }

    /// Increases the number of times an entity's address has been seen
    pub fn increment_seen(&mut self, addr: &Address) -> Result<(), ReputationError> {
        self.set_default(addr)?;
        if let Some(mut ent) = self.entities.get_entry(addr)? {
            ent.uo_seen += 1;
            self.entities.set_entry(ent)?;
        }
        Ok(())
    }

    /// Increases the number of times an entity was included in a bundle that
    /// made it on chain
    pub fn increment_included(&mut self, addr: &Address) -> Result<(), ReputationError> {
        self.set_default(addr)?;
        if let Some(mut ent) = self.entities.get_entry(addr)? {
            ent.uo_included += 1;
            self.entities.set_entry(ent)?;
        }
        Ok(())
    }

    /// Applies the hourly decay to all entities
    pub fn update_hourly(&mut self) -> Result<(), ReputationError> {
        self.entities.update()
    }

    /// Punitive update when `handleOps` reverted on chain and the failure was
    /// attributed to this entity
    pub fn crashed_handle_ops(&mut self, addr: &Address) -> Result<(), ReputationError> {
        self.set_default(addr)?;
        if let Some(mut ent) = self.entities.get_entry(addr)? {
            ent.uo_seen += 10000;
            ent.uo_included = 0;
            self.entities.set_entry(ent)?;
        }

        Ok(())
    }

    /// Adds an address to the whitelist
    pub fn add_whitelist(&mut self, addr: &Address) -> bool {
        self.whitelist.add_into_list(addr)
    }

    /// Removes an address from the whitelist
    pub fn remove_whitelist(&mut self, addr: &Address) -> bool {
        self.whitelist.remove_from_list(addr)
    }

    /// Checks if an address is in the whitelist
    pub fn is_whitelist(&self, addr: &Address) -> bool {
        self.whitelist.is_in_list(addr)
    }

    /// Adds an address to the blacklist
    pub fn add_blacklist(&mut self, addr: &Address) -> bool {
        self.blacklist.add_into_list(addr)
    }

    /// Removes an address from the blacklist
    pub fn remove_blacklist(&mut self, addr: &Address) -> bool {
        self.blacklist.remove_from_list(addr)
    }

    /// Checks if an address is in the blacklist
    pub fn is_blacklist(&self, addr: &Address) -> bool {
        self.blacklist.is_in_list(addr)
    }

    pub fn min_stake(&self) -> U256 {
        self.min_stake
    }

    pub fn min_unstake_delay(&self) -> U256 {
        self.min_unstake_delay
    }

    /// Gets an entity's reputation status. The whitelist and the blacklist
    /// override the computed status; unknown addresses are OK.
    pub fn get_status(&self, addr: &Address) -> Result<ReputationStatus, ReputationError> {
        if self.whitelist.is_in_list(addr) {
            return Ok(ReputationStatus::OK);
        }

        if self.blacklist.is_in_list(addr) {
            return Ok(ReputationStatus::BANNED);
        }

        Ok(match self.entities.get_entry(addr)? {
            Some(ent) => {
                let min_expected_included = ent.uo_seen / self.min_inclusion_denominator;
                if min_expected_included <= ent.uo_included + self.throttling_slack {
                    ReputationStatus::OK
                } else if min_expected_included <= ent.uo_included + self.ban_slack {
                    ReputationStatus::THROTTLED
                } else {
                    ReputationStatus::BANNED
                }
            }
            _ => ReputationStatus::OK,
        })
    }

    /// Reads the reputation status of the entity whose address is in the first
    /// 20 bytes (useful for `initCode` and `paymasterAndData`); no address
    /// means OK
    pub fn get_status_from_bytes(&self, bytes: &Bytes) -> Result<ReputationStatus, ReputationError> {
        let addr_opt = get_address(bytes.deref());
        if let Some(addr) = addr_opt {
            self.get_status(&addr)
        } else {
            Ok(ReputationStatus::OK)
        }
    }

    /// Verifies the stake information of an entity
    ///
    /// # Returns
    /// * `Ok(())` if the entity's stake is valid
    /// * `Err(ReputationError::StakeTooLow)` if the entity's stake is too low
    /// * `Err(ReputationError::UnstakeDelayTooLow)` if the entity unstakes too early
    pub fn verify_stake(
        &self,
        entity: &str,
        info: Option<StakeInfo>,
    ) -> Result<(), ReputationError> {
        if let Some(info) = info {
            if self.whitelist.is_in_list(&info.address) {
                return Ok(());
            }

            let err = if info.stake < self.min_stake {
                ReputationError::StakeTooLow {
                    entity: entity.into(),
                    address: info.address,
                    stake: info.stake,
                    min_stake: self.min_stake,
                }
            } else if info.unstake_delay < self.min_unstake_delay {
                ReputationError::UnstakeDelayTooLow {
                    entity: entity.into(),
                    address: info.address,
                    unstake_delay: info.unstake_delay,
                    min_unstake_delay: self.min_unstake_delay,
                }
            } else {
                return Ok(());
            };

            return Err(err);
        }

        Ok(())
    }

    /// Maximum number of mempool entries an unstaked entity may have:
    /// `10 + inclusion_rate * 10 + min(uo_included, 10000)`
    pub fn calculate_max_allowed_mempool_ops_unstaked(&self, addr: &Address) -> u64 {
        use kestrel_primitives::constants::validation::reputation::{
            INCLUSION_RATE_FACTOR, SAME_UNSTAKED_ENTITY_MEMPOOL_COUNT,
        };

        let ent = self.get(addr).unwrap_or(ReputationEntry::default_with_addr(*addr));

        if ent.uo_seen == 0 {
            SAME_UNSTAKED_ENTITY_MEMPOOL_COUNT as u64
        } else {
            let inclusion_rate = ent.uo_included as f64 / ent.uo_seen as f64;
            SAME_UNSTAKED_ENTITY_MEMPOOL_COUNT as u64 +
                (inclusion_rate * INCLUSION_RATE_FACTOR as f64) as u64 +
                std::cmp::min(ent.uo_included, 10000)
        }
    }

    /// Sets the given [ReputationEntries](ReputationEntry)
    pub fn set_entities(&mut self, entries: Vec<ReputationEntry>) -> Result<(), ReputationError> {
        for en in entries {
            self.entities.set_entry(en)?;
        }

        Ok(())
    }

    /// Gets all [ReputationEntries](ReputationEntry), with derived statuses
    pub fn get_all(&self) -> Result<Vec<ReputationEntry>, ReputationError> {
        Ok(self
            .entities
            .get_all()
            .into_iter()
            .flat_map(|entry| {
                let status = self.get_status(&entry.address)?;
                Ok::<ReputationEntry, ReputationError>(ReputationEntry { status, ..entry })
            })
            .collect())
    }

    /// Clears all [ReputationEntries](ReputationEntry)
    pub fn clear(&mut self) {
        self.entities.clear();
    }
}
