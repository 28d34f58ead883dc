use crate::{
    mempool::Mempool,
    reputation::Reputation,
    validate::{SanityCheck, SanityHelper},
    ReputationError, SanityError,
};
use ethers::{providers::Middleware, types::Address};
use kestrel_primitives::{
    constants::validation::{
        entities::{FACTORY, PAYMASTER, SENDER},
        reputation::THROTTLED_ENTITY_MEMPOOL_COUNT,
    },
    reputation::ReputationStatus,
    UserOperation,
};

#[derive(Clone)]
pub struct Entities;

impl Entities {
    /// [SREP-020] - a BANNED address is not allowed into the mempool
    fn check_banned(
        &self,
        entity: &str,
        addr: &Address,
        status: &ReputationStatus,
    ) -> Result<(), SanityError> {
        if *status == ReputationStatus::BANNED {
            return Err(
                ReputationError::BannedEntity { entity: entity.into(), address: *addr }.into()
            );
        }

        Ok(())
    }

    /// [SREP-030] - a THROTTLED address is limited to
    /// THROTTLED_ENTITY_MEMPOOL_COUNT entries in the mempool
    fn check_throttled(
        &self,
        entity: &str,
        addr: &Address,
        status: &ReputationStatus,
        mempool: &Mempool,
    ) -> Result<(), SanityError> {
        if *status == ReputationStatus::THROTTLED &&
            mempool.get_number_by_address(addr) >= THROTTLED_ENTITY_MEMPOOL_COUNT
        {
            return Err(
                ReputationError::ThrottledEntity { entity: entity.into(), address: *addr }.into()
            );
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl<M: Middleware> SanityCheck<M> for Entities {
    /// Gates every entity of the user operation on its reputation status.
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
        _helper: &SanityHelper<M>,
    ) -> Result<(), SanityError> {
        let (sender, factory, paymaster) = uo.get_entities();

        // [SREP-040] - an OK staked entity is unlimited by the reputation rule

        // sender
        let status = reputation.get_status(&sender)?;
        self.check_banned(SENDER, &sender, &status)?;
        self.check_throttled(SENDER, &sender, &status, mempool)?;

        // factory
        if let Some(factory) = factory {
            let status = reputation.get_status(&factory)?;
            self.check_banned(FACTORY, &factory, &status)?;
            self.check_throttled(FACTORY, &factory, &status, mempool)?;
        }

        // paymaster
        if let Some(paymaster) = paymaster {
            let status = reputation.get_status(&paymaster)?;
            self.check_banned(PAYMASTER, &paymaster, &status)?;
            self.check_throttled(PAYMASTER, &paymaster, &status, mempool)?;
        }

        Ok(())
    }
}
