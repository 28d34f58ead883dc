use crate::{error::JsonRpcError, eth_api::EthApiServer};
use async_trait::async_trait;
use ethers::{
    providers::Middleware,
    types::{Address, U64},
    utils::to_checksum,
};
use jsonrpsee::{
    core::RpcResult,
    types::{error::ErrorCode, ErrorObject, ErrorObjectOwned},
};
use kestrel_bundler::{BundlerService, SendBundleOp};
use kestrel_mempool::validate::UserOperationValidator;
use kestrel_primitives::{
    constants::rpc::error_codes::INVALID_FIELDS, UserOperation, UserOperationByHash,
    UserOperationGasEstimation, UserOperationHash, UserOperationReceipt, UserOperationRequest,
    UserOperationSigned,
};
use std::str::FromStr;

/// `eth` namespace implementation, backed by the shared
/// [BundlerService](BundlerService) handle
pub struct EthApiServerImpl<M, V, S>
where
    M: Middleware + 'static,
    V: UserOperationValidator + 'static,
    S: SendBundleOp,
{
    pub service: BundlerService<M, V, S>,
    pub entry_point: Address,
    pub chain_id: u64,
}

fn invalid_hash_err() -> ErrorObjectOwned {
    ErrorObject::owned(
        ErrorCode::InvalidParams.code(),
        "Missing/invalid userOpHash".to_string(),
        None::<bool>,
    )
}

impl<M, V, S> EthApiServerImpl<M, V, S>
where
    M: Middleware + 'static,
    V: UserOperationValidator + 'static,
    S: SendBundleOp,
{
    fn check_entry_point(&self, ep: &Address) -> RpcResult<()> {
        if *ep != self.entry_point {
            return Err(ErrorObject::owned(
                INVALID_FIELDS,
                format!("entry point {ep:?} is not supported"),
                None::<bool>,
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl<M, V, S> EthApiServer for EthApiServerImpl<M, V, S>
where
    M: Middleware + 'static,
    V: UserOperationValidator + 'static,
    S: SendBundleOp,
{
    async fn chain_id(&self) -> RpcResult<U64> {
        Ok(self.chain_id.into())
    }

    async fn supported_entry_points(&self) -> RpcResult<Vec<String>> {
        Ok(vec![to_checksum(&self.entry_point, None)])
    }

    async fn send_user_operation(
        &self,
        uo: UserOperationRequest,
        ep: Address,
    ) -> RpcResult<UserOperationHash> {
        self.check_entry_point(&ep)?;

        let uo: UserOperationSigned = uo.into();
        self.service
            .send_user_operation(uo)
            .await
            .map_err(|err| JsonRpcError::from(err).into())
    }

    async fn estimate_user_operation_gas(
        &self,
        uo: UserOperationRequest,
        ep: Address,
    ) -> RpcResult<UserOperationGasEstimation> {
        self.check_entry_point(&ep)?;

        let uo: UserOperationSigned = uo.into();
        let hash = uo.hash(&ep, self.chain_id);
        let uo = UserOperation::from_user_operation_signed(hash, uo);

        let uopool = self.service.uopool.lock().await;
        uopool
            .estimate_user_operation_gas(&uo)
            .await
            .map_err(|err| JsonRpcError::from(err).into())
    }

    async fn get_user_operation_receipt(
        &self,
        uo_hash: String,
    ) -> RpcResult<Option<UserOperationReceipt>> {
        let uo_hash = UserOperationHash::from_str(&uo_hash).map_err(|_| invalid_hash_err())?;

        let uopool = self.service.uopool.lock().await;
        Ok(uopool.get_user_operation_receipt(&uo_hash).await.ok())
    }

    async fn get_user_operation_by_hash(
        &self,
        uo_hash: String,
    ) -> RpcResult<Option<UserOperationByHash>> {
        let uo_hash = UserOperationHash::from_str(&uo_hash).map_err(|_| invalid_hash_err())?;

        let uopool = self.service.uopool.lock().await;
        Ok(uopool.get_user_operation_by_hash(&uo_hash).await.ok())
    }
}
