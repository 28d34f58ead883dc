use crate::{
    mempool::Mempool,
    validate::{SanityCheck, SanityHelper},
    Reputation, SanityError,
};
use ethers::{providers::Middleware, types::U256};
use kestrel_primitives::UserOperation;

#[derive(Clone)]
pub struct CallGas;

#[async_trait::async_trait]
impl<M: Middleware> SanityCheck<M> for CallGas {
    /// Checks that the call gas limit covers at least the cost of a CALL with
    /// non-zero value.
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
        _helper: &SanityHelper<M>,
    ) -> Result<(), SanityError> {
        // https://github.com/wolflo/evm-opcodes/blob/main/gas.md#aa-1-call
        // gas_cost = 100 + 9000
        let call_gas_limit = U256::from(9100);

        if uo.call_gas_limit >= call_gas_limit {
            return Ok(());
        }

        Err(SanityError::CallGasLimitTooLow {
            call_gas_limit: uo.call_gas_limit,
            call_gas_limit_expected: call_gas_limit,
        })
    }
}
