use crate::{
    mempool::Mempool,
    validate::{SanityCheck, SanityHelper},
    Reputation, SanityError,
};
use ethers::providers::Middleware;
use kestrel_primitives::{get_address, UserOperation};

#[derive(Clone)]
pub struct Paymaster;

#[async_trait::async_trait]
impl<M: Middleware> SanityCheck<M> for Paymaster {
    /// Checks the paymaster: `paymasterAndData` is either empty or carries at
    /// least the 20-byte paymaster address; the paymaster must be deployed and
    /// have enough deposit in the entry point.
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
        _mempool: &Mempool,
        _reputation: &Reputation,
        helper: &SanityHelper<M>,
    ) -> Result<(), SanityError> {
        if uo.paymaster_and_data.is_empty() {
            return Ok(());
        }

        let paymaster = match get_address(&uo.paymaster_and_data) {
            Some(paymaster) => paymaster,
            None => {
                return Err(SanityError::Paymaster {
                    inner: format!(
                        "paymasterAndData too short to hold a paymaster address: {} bytes",
                        uo.paymaster_and_data.len()
                    ),
                })
            }
        };

        let code = helper
            .entry_point
            .eth_client()
            .get_code(paymaster, None)
            .await
            .map_err(|e| SanityError::Provider { inner: e.to_string() })?;

        if code.is_empty() {
            return Err(SanityError::Paymaster {
                inner: format!("paymaster {paymaster:?} has no code"),
            });
        }

        let deposit_info = helper.entry_point.get_deposit_info(&paymaster).await?;

        if deposit_info.deposit < uo.max_fee_per_gas {
            return Err(SanityError::Paymaster {
                inner: format!("paymaster {paymaster:?} deposit too low"),
            });
        }

        Ok(())
    }
}
