use crate::web3_api::Web3ApiServer;
use async_trait::async_trait;
use jsonrpsee::core::RpcResult;

/// `web3` namespace implementation
pub struct Web3ApiServerImpl {
    /// Whether the bundler runs without the tracer rules; reflected in the
    /// version string so test suites can detect it
    pub unsafe_mode: bool,
}

#[async_trait]
impl Web3ApiServer for Web3ApiServerImpl {
    async fn client_version(&self) -> RpcResult<String> {
        let version = env!("CARGO_PKG_VERSION");
        Ok(if self.unsafe_mode {
            format!("kestrel/{version}/unsafe")
        } else {
            format!("kestrel/{version}")
        })
    }
}
