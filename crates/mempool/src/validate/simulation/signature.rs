use crate::{
    validate::{SimulationCheck, SimulationHelper},
    SimulationError,
};
use kestrel_contracts::entry_point::SimulateValidationResult;
use kestrel_primitives::UserOperation;

#[derive(Clone)]
pub struct Signature;

impl SimulationCheck for Signature {
    /// Validates the account and paymaster signature outcome of the simulation.
    ///
    /// # Arguments
    /// `_uo` - Not used in this check
    /// `helper` - The [SimulationHelper]
    ///
    /// # Returns
    /// None if the check passes, otherwise a [SimulationError]
    fn check_user_operation(
        &self,
        _uo: &UserOperation,
        helper: &mut SimulationHelper,
    ) -> Result<(), SimulationError> {
        let sig_failed = match helper.simulate_validation_result {
            SimulateValidationResult::ValidationResult(res) => res.return_info.sig_failed,
            SimulateValidationResult::ValidationResultWithAggregation(res) => {
                res.return_info.sig_failed
            }
        };

        if sig_failed {
            return Err(SimulationError::Signature);
        }

        Ok(())
    }
}
