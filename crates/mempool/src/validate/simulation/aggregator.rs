use crate::{
    validate::{SimulationCheck, SimulationHelper},
    SimulationError,
};
use kestrel_contracts::entry_point::SimulateValidationResult;
use kestrel_primitives::UserOperation;

#[derive(Clone)]
pub struct Aggregator;

impl SimulationCheck for Aggregator {
    /// Rejects user operations whose account delegates signature checking to
    /// an aggregator.
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
        if matches!(
            helper.simulate_validation_result,
            SimulateValidationResult::ValidationResultWithAggregation(_)
        ) {
            return Err(SimulationError::Aggregator);
        }

        Ok(())
    }
}
