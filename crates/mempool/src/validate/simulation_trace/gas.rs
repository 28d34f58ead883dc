use crate::{
    mempool::Mempool,
    validate::{SimulationTraceCheck, SimulationTraceHelper},
    Reputation, SimulationError,
};
use ethers::providers::Middleware;
use kestrel_primitives::UserOperation;

#[derive(Clone)]
pub struct Gas;

#[async_trait::async_trait]
impl<M: Middleware> SimulationTraceCheck<M> for Gas {
    /// Checks that no validation frame ran out of gas.
    ///
    /// # Arguments
    /// `_uo` - Not used in this check
    /// `helper` - The [SimulationTraceHelper]
    ///
    /// # Returns
    /// None if the check passes, otherwise a [SimulationError]
    async fn check_user_operation(
        &self,
        _uo: &UserOperation,
        _mempool: &Mempool,
        _reputation: &Reputation,
        helper: &mut SimulationTraceHelper<M>,
    ) -> Result<(), SimulationError> {
        // [OP-020] - revert on "out of gas" is forbidden as it can "leak" the gas
        // limit or the current call stack depth
        for call_info in helper.js_trace.calls_from_entry_point.iter() {
            if call_info.oog.unwrap_or(false) {
                return Err(SimulationError::OutOfGas);
            }
        }

        Ok(())
    }
}
