//! Checks over the decoded `simulateValidation` result.

pub mod aggregator;
pub mod signature;
pub mod timestamp;
pub mod verification_extra_gas;

pub use aggregator::Aggregator;
pub use signature::Signature;
pub use timestamp::Timestamp;
pub use verification_extra_gas::VerificationExtraGas;
