//! Kestrel contracts: typed access to the ERC-4337 EntryPoint and the
//! stack-level collector tracer used during validation.

pub mod entry_point;
mod error;
pub mod gen;
pub mod tracer;
pub mod utils;

pub use entry_point::EntryPoint;
pub use error::{decode_revert_error, EntryPointError, EntryPointRevert};
