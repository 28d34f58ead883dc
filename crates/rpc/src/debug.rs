use crate::{
    debug_api::{DebugApiServer, ResponseSuccess},
    error::JsonRpcError,
};
use async_trait::async_trait;
use ethers::{providers::Middleware, types::{Address, H256}};
use jsonrpsee::core::RpcResult;
use kestrel_bundler::{BundlerService, SendBundleOp};
use kestrel_mempool::validate::UserOperationValidator;
use kestrel_primitives::{
    constants::bundler::BUNDLE_MAX_POOL_SIZE, reputation::{ReputationEntry, StakeInfoResponse},
    BundleMode, UserOperationRequest,
};

/// `debug_bundler` namespace implementation, backed by the shared
/// [BundlerService](BundlerService) handle
pub struct DebugApiServerImpl<M, V, S>
where
    M: Middleware + 'static,
    V: UserOperationValidator + 'static,
    S: SendBundleOp,
{
    pub service: BundlerService<M, V, S>,
}

#[async_trait]
impl<M, V, S> DebugApiServer for DebugApiServerImpl<M, V, S>
where
    M: Middleware + 'static,
    V: UserOperationValidator + 'static,
    S: SendBundleOp,
{
    async fn clear_state(&self) -> RpcResult<ResponseSuccess> {
        let mut uopool = self.service.uopool.lock().await;
        uopool.clear();
        Ok(ResponseSuccess::Ok)
    }

    async fn clear_mempool(&self) -> RpcResult<ResponseSuccess> {
        let mut uopool = self.service.uopool.lock().await;
        uopool.clear_mempool();
        Ok(ResponseSuccess::Ok)
    }

    async fn clear_reputation(&self) -> RpcResult<ResponseSuccess> {
        let mut uopool = self.service.uopool.lock().await;
        uopool.clear_reputation();
        Ok(ResponseSuccess::Ok)
    }

    async fn dump_mempool(&self, _ep: Address) -> RpcResult<Vec<UserOperationRequest>> {
        let uopool = self.service.uopool.lock().await;

        let mut uos: Vec<UserOperationRequest> = uopool
            .get_all()
            .map_err(|err| JsonRpcError::from(err).0)?
            .into_iter()
            .map(|uo| uo.user_operation.into())
            .collect();
        uos.sort_by(|a, b| a.nonce.cmp(&b.nonce));

        Ok(uos)
    }

    async fn set_reputation(
        &self,
        entries: Vec<ReputationEntry>,
        _ep: Address,
    ) -> RpcResult<ResponseSuccess> {
        let mut uopool = self.service.uopool.lock().await;
        uopool.set_reputation(entries).map_err(|err| JsonRpcError::from(err).0)?;
        Ok(ResponseSuccess::Ok)
    }

    async fn dump_reputation(&self, _ep: Address) -> RpcResult<Vec<ReputationEntry>> {
        let uopool = self.service.uopool.lock().await;
        Ok(uopool.get_reputation())
    }

    async fn set_bundling_mode(&self, mode: BundleMode) -> RpcResult<ResponseSuccess> {
        self.service.set_bundling_mode(mode);
        Ok(ResponseSuccess::Ok)
    }

    async fn set_bundle_interval(
        &self,
        interval: u64,
        max_pool_size: Option<usize>,
    ) -> RpcResult<ResponseSuccess> {
        self.service
            .set_bundle_interval(interval, max_pool_size.unwrap_or(BUNDLE_MAX_POOL_SIZE));
        Ok(ResponseSuccess::Ok)
    }

    async fn send_bundle_now(&self) -> RpcResult<H256> {
        let res = self.service.send_bundles().await.map_err(|err| JsonRpcError::from(err).0)?;
        Ok(res.transaction_hash)
    }

    async fn get_stake_status(&self, addr: Address, _ep: Address) -> RpcResult<StakeInfoResponse> {
        let uopool = self.service.uopool.lock().await;
        uopool.get_stake_info(&addr).await.map_err(|err| JsonRpcError::from(err).0)
    }
}
