use crate::{
    mempool::Mempool,
    reputation::Reputation,
    validate::{SanityCheck, SanityHelper},
    ReputationError, SanityError,
};
use ethers::{
    providers::Middleware,
    types::{Address, U256},
};
use kestrel_primitives::{
    constants::validation::{
        entities::{FACTORY, PAYMASTER, SENDER},
        reputation::SAME_SENDER_MEMPOOL_COUNT,
    },
    reputation::StakeInfo,
    UserOperation,
};

#[derive(Clone)]
pub struct UnstakedEntities;

impl UnstakedEntities {
    /// Gets the deposit info for an entity
    async fn get_stake<'a, M: Middleware>(
        &self,
        addr: &Address,
        helper: &SanityHelper<'a, M>,
    ) -> Result<StakeInfo, SanityError> {
        let info = helper.entry_point.get_deposit_info(addr).await?;

        Ok(StakeInfo {
            address: *addr,
            stake: U256::from(info.stake),
            unstake_delay: U256::from(info.unstake_delay_sec),
        })
    }
}

#[async_trait::async_trait]
impl<M: Middleware> SanityCheck<M> for UnstakedEntities {
    /// Enforces the multi-role rule ([STO-040]: an address may not be a sender
    /// in one mempool entry and a factory/paymaster in another) and the
    /// unstaked entity quotas ([UREP-010]/[UREP-020]).
    ///
    /// # Arguments
    /// `uo` - The user operation to check
    /// `helper` - The [sanity check helper](SanityHelper)
    ///
    /// # Returns
    /// None if the check passes, otherwise a [SanityError]
    async fn check_user_operation(
        &self,
        uo: &UserOperation,
        mempool: &Mempool,
        reputation: &Reputation,
        helper: &SanityHelper<M>,
    ) -> Result<(), SanityError> {
        let (sender, factory, paymaster) = uo.get_entities();

        // sender
        // [STO-040] - the sender may not be a known factory or paymaster
        if mempool.get_number_by_entity(&sender) > 0 {
            return Err(SanityError::EntityRoles {
                entity: SENDER.into(),
                address: sender,
                entity_other: "factory/paymaster".into(),
            });
        }

        // [UREP-010] - unstaked senders are allowed only up to
        // SAME_SENDER_MEMPOOL_COUNT entries in the mempool
        let sender_stake = self.get_stake(&sender, helper).await?;
        if reputation.verify_stake(SENDER, Some(sender_stake)).is_err() &&
            mempool.get_number_by_sender(&uo.sender) >= SAME_SENDER_MEMPOOL_COUNT
        {
            return Err(ReputationError::UnstakedEntity {
                entity: SENDER.into(),
                address: uo.sender,
            }
            .into());
        }

        // factory
        if let Some(factory) = factory {
            // [STO-040] - the factory may not be a known sender
            if mempool.get_number_by_sender(&factory) > 0 {
                return Err(SanityError::EntityRoles {
                    entity: FACTORY.into(),
                    address: factory,
                    entity_other: SENDER.into(),
                });
            }

            let factory_stake = self.get_stake(&factory, helper).await?;
            if reputation.verify_stake(FACTORY, Some(factory_stake)).is_err() {
                // [UREP-020] - reputation-scaled allowance for other entities
                let uos_allowed = reputation.calculate_max_allowed_mempool_ops_unstaked(&factory);
                if mempool.get_number_by_entity(&factory) as u64 >= uos_allowed {
                    return Err(ReputationError::UnstakedEntity {
                        entity: FACTORY.into(),
                        address: factory,
                    }
                    .into());
                }
            }
        }

        // paymaster
        if let Some(paymaster) = paymaster {
            // [STO-040] - the paymaster may not be a known sender
            if mempool.get_number_by_sender(&paymaster) > 0 {
                return Err(SanityError::EntityRoles {
                    entity: PAYMASTER.into(),
                    address: paymaster,
                    entity_other: SENDER.into(),
                });
            }

            let paymaster_stake = self.get_stake(&paymaster, helper).await?;
            if reputation.verify_stake(PAYMASTER, Some(paymaster_stake)).is_err() {
                // [UREP-020] - reputation-scaled allowance for other entities
                let uos_allowed = reputation.calculate_max_allowed_mempool_ops_unstaked(&paymaster);
                if mempool.get_number_by_entity(&paymaster) as u64 >= uos_allowed {
                    return Err(ReputationError::UnstakedEntity {
                        entity: PAYMASTER.into(),
                        address: paymaster,
                    }
                    .into());
                }
            }
        }

        Ok(())
    }
}
