use jsonrpsee::{core::RpcResult, proc_macros::rpc};

/// The `web3` namespace RPC methods trait
#[rpc(server, namespace = "web3")]
pub trait Web3Api {
    /// Returns the client version string.
    #[method(name = "clientVersion")]
    async fn client_version(&self) -> RpcResult<String>;
}
