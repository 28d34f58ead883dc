//! Kestrel bundler: packs validated user operations into `handleOps`
//! transactions, dispatches them (plain or conditional), and drives the
//! single-writer execution loop.

mod bundler;
mod conditional;
mod ethereum;
pub mod service;

pub use bundler::{Bundler, SendBundleOp};
pub use conditional::ConditionalClient;
pub use ethereum::EthereumClient;
pub use service::{BundleSendResult, BundlerService};
