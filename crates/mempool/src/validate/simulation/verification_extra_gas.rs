use crate::{
    validate::{utils::extract_pre_op_gas, SimulationCheck, SimulationHelper},
    SimulationError,
};
use ethers::types::U256;
use kestrel_primitives::{constants::validation::simulation::MIN_EXTRA_GAS, UserOperation};

#[derive(Clone)]
pub struct VerificationExtraGas;

impl SimulationCheck for VerificationExtraGas {
    /// Checks that the verification gas limit leaves headroom over what the
    /// validation step actually consumed:
    /// `verificationGasLimit - (preOpGas - preVerificationGas) >= MIN_EXTRA_GAS`.
    ///
    /// # Arguments
    /// `uo` - The user operation to check
    /// `helper` - The [SimulationHelper]
    ///
    /// # Returns
    /// None if the check passes, otherwise a [SimulationError]
    fn check_user_operation(
        &self,
        uo: &UserOperation,
        helper: &mut SimulationHelper,
    ) -> Result<(), SimulationError> {
        let pre_op_gas = extract_pre_op_gas(helper.simulate_validation_result);

        let gas_used = pre_op_gas.saturating_sub(uo.pre_verification_gas);
        let extra_gas = uo.verification_gas_limit.saturating_sub(gas_used);

        if extra_gas < U256::from(MIN_EXTRA_GAS) {
            return Err(SimulationError::Validation {
                inner: format!(
                    "verification gas should have {MIN_EXTRA_GAS} gas left over (has {extra_gas})"
                ),
            });
        }

        Ok(())
    }
}
