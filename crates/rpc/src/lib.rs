//! Kestrel RPC crate: handlers for the JSON-RPC methods of the ERC-4337
//! bundler spec (eth, debug and web3 namespaces).

mod debug;
pub mod debug_api;
mod error;
mod eth;
pub mod eth_api;
mod rpc;
mod web3;
pub mod web3_api;

pub use debug::DebugApiServerImpl;
pub use error::JsonRpcError;
pub use eth::EthApiServerImpl;
pub use rpc::JsonRpcServer;
pub use web3::Web3ApiServerImpl;
