//! Kestrel primitives: core types shared by all crates of the bundler.

pub mod bundler;
pub mod constants;
pub mod reputation;
pub mod simulation;
mod user_operation;
pub mod uopool;
mod utils;
mod wallet;

pub use bundler::BundleMode;
pub use uopool::UoPoolMode;
pub use user_operation::{
    UserOperation, UserOperationByHash, UserOperationGasEstimation, UserOperationHash,
    UserOperationReceipt, UserOperationRequest, UserOperationSigned,
};
pub use utils::{as_checksum_addr, get_address};
pub use wallet::Wallet;
