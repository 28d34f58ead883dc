use crate::{
    mempool::Mempool,
    utils::calculate_valid_gas,
    validate::{SanityCheck, SanityHelper},
    Reputation, SanityError,
};
use ethers::providers::Middleware;
use kestrel_primitives::{constants::mempool::GAS_INCREASE_PERC, UserOperation};

#[derive(Clone)]
pub struct Sender;

#[async_trait::async_trait]
impl<M: Middleware> SanityCheck<M> for Sender {
    /// Checks the sender: either the account is already deployed, or the
    /// operation carries init code (never both, never neither); the init code
    /// must be absent or long enough to name the factory; a replacement for an
    /// existing `(sender, nonce)` entry must raise both fees by at least 10%.
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
        _reputation: &Reputation,
        helper: &SanityHelper<M>,
    ) -> Result<(), SanityError> {
        // init code is either empty or carries at least the 20-byte factory address
        if !uo.init_code.is_empty() && uo.init_code.len() < 20 {
            return Err(SanityError::Sender {
                inner: format!("initCode too short to hold a factory address: {} bytes", uo.init_code.len()),
            });
        }

        let code = helper
            .entry_point
            .eth_client()
            .get_code(uo.sender, None)
            .await
            .map_err(|e| SanityError::Provider { inner: e.to_string() })?;

        // either the sender is deployed, or there is init code
        if (code.is_empty() && uo.init_code.is_empty()) ||
            (!code.is_empty() && !uo.init_code.is_empty())
        {
            return Err(SanityError::Sender {
                inner: format!("sender {:?} vs init code {}: exactly one must be set", uo.sender, uo.init_code),
            });
        }

        if mempool.get_number_by_sender(&uo.sender) == 0 {
            return Ok(());
        }

        let uo_prev = mempool
            .get_all_by_sender(&uo.sender)
            .iter()
            .find(|uo_prev| uo_prev.nonce == uo.nonce)
            .cloned();

        if let Some(uo_prev) = uo_prev {
            if uo.max_fee_per_gas <
                calculate_valid_gas(uo_prev.max_fee_per_gas, GAS_INCREASE_PERC.into()) ||
                uo.max_priority_fee_per_gas <
                    calculate_valid_gas(
                        uo_prev.max_priority_fee_per_gas,
                        GAS_INCREASE_PERC.into(),
                    )
            {
                return Err(SanityError::FeeIncreaseTooLow {
                    inner: format!(
                        "replacement needs at least {GAS_INCREASE_PERC}% increase on both maxFeePerGas and maxPriorityFeePerGas"
                    ),
                });
            }
        }

        Ok(())
    }
}
