//! Kestrel mempool: the user operation pool, the reputation subsystem and the
//! multi-stage validation pipeline.

mod error;
pub mod memory;
mod mempool;
mod reputation;
mod uopool;
mod utils;
pub mod validate;

pub use error::{
    InvalidMempoolUserOperationError, MempoolError, MempoolErrorKind, ReputationError, SanityError,
    SimulationError,
};
pub use mempool::{
    AddRemoveUserOp, AddRemoveUserOpHash, ClearOp, Mempool, UserOperationAct,
    UserOperationAddrAct, UserOperationAddrOp, UserOperationCodeHashAct, UserOperationCodeHashOp,
    UserOperationOp,
};
pub use reputation::{HashSetOp, Reputation, ReputationEntryOp};
pub use uopool::UoPool;
pub use utils::{calculate_valid_gas, div_ceil, equal_code_hashes, Overhead};
