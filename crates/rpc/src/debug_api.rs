use ethers::types::{Address, H256};
use jsonrpsee::{core::RpcResult, proc_macros::rpc};
use kestrel_primitives::{
    reputation::{ReputationEntry, StakeInfoResponse},
    BundleMode, UserOperationRequest,
};
use serde::{Deserialize, Serialize};

/// Result of state-changing debug methods
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub enum ResponseSuccess {
    #[serde(rename = "ok")]
    Ok,
}

/// The ERC-4337 `debug_bundler` namespace RPC methods trait, exposed only with
/// the debug RPC option enabled
#[rpc(server, namespace = "debug_bundler")]
pub trait DebugApi {
    /// Clears the mempool and the reputation registry.
    #[method(name = "clearState")]
    async fn clear_state(&self) -> RpcResult<ResponseSuccess>;

    /// Clears the mempool.
    #[method(name = "clearMempool")]
    async fn clear_mempool(&self) -> RpcResult<ResponseSuccess>;

    /// Clears the reputation registry.
    #[method(name = "clearReputation")]
    async fn clear_reputation(&self) -> RpcResult<ResponseSuccess>;

    /// Dumps all user operations currently in the mempool.
    #[method(name = "dumpMempool")]
    async fn dump_mempool(&self, entry_point: Address) -> RpcResult<Vec<UserOperationRequest>>;

    /// Sets the reputation entries of the given entities.
    #[method(name = "setReputation")]
    async fn set_reputation(
        &self,
        entries: Vec<ReputationEntry>,
        entry_point: Address,
    ) -> RpcResult<ResponseSuccess>;

    /// Dumps the reputation entries of all entities.
    #[method(name = "dumpReputation")]
    async fn dump_reputation(&self, entry_point: Address) -> RpcResult<Vec<ReputationEntry>>;

    /// Sets the bundling mode: `auto` or `manual`.
    #[method(name = "setBundlingMode")]
    async fn set_bundling_mode(&self, mode: BundleMode) -> RpcResult<ResponseSuccess>;

    /// Sets the auto-bundler interval (seconds); a zero interval leaves only
    /// the mempool size trigger.
    #[method(name = "setBundleInterval")]
    async fn set_bundle_interval(
        &self,
        interval: u64,
        max_pool_size: Option<usize>,
    ) -> RpcResult<ResponseSuccess>;

    /// Immediately bundles and sends the eligible user operations.
    ///
    /// # Returns
    /// * `RpcResult<H256>` - The transaction hash of the sent bundle.
    #[method(name = "sendBundleNow")]
    async fn send_bundle_now(&self) -> RpcResult<H256>;

    /// Returns the stake info of the given address.
    #[method(name = "getStakeStatus")]
    async fn get_stake_status(
        &self,
        address: Address,
        entry_point: Address,
    ) -> RpcResult<StakeInfoResponse>;
}
