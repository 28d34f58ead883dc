//! JSON-RPC surface tests over a live (loopback) server; nothing here talks
//! to an Ethereum node.

use alloy_chains::Chain;
use ethers::{
    providers::{MockProvider, Provider},
    types::{Address, U64},
};
use jsonrpsee::{
    core::{client::ClientT, params::ArrayParams},
    http_client::{HttpClient, HttpClientBuilder},
    rpc_params,
};
use kestrel_bundler::{Bundler, BundlerService, EthereumClient};
use kestrel_contracts::EntryPoint;
use kestrel_mempool::{
    memory::{new_memory_mempool, new_memory_reputation},
    validate::validator::{new_canonical, StandardValidator},
    UoPool,
};
use kestrel_primitives::{UoPoolMode, Wallet};
use kestrel_rpc::{
    debug_api::DebugApiServer, eth_api::EthApiServer, web3_api::Web3ApiServer, DebugApiServerImpl,
    EthApiServerImpl, JsonRpcServer, Web3ApiServerImpl,
};
use serde_json::Value;
use std::{net::{IpAddr, Ipv4Addr}, sync::Arc};

const CHAIN_ID: u64 = 1337;
const KEY: &str = "0xdf1f39dd322a0cb54da8724bf1baf639f0d34916d529adbe2942a28b47dbed4a";

type TestMiddleware = Provider<MockProvider>;

async fn start_server(
    port: u16,
) -> eyre::Result<HttpClient> {
    let (provider, _mock) = Provider::mocked();
    let eth_client = Arc::new(provider);
    let ep_addr: Address = "0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789".parse()?;
    let entry_point = EntryPoint::new(eth_client.clone(), ep_addr);
    let chain = Chain::from_id(CHAIN_ID);
    let wallet = Wallet::from_key(KEY, CHAIN_ID)?;

    let validator: StandardValidator<TestMiddleware> =
        new_canonical(entry_point.clone(), chain, 5_000_000u64.into(), 0u64.into());

    let uopool = Arc::new(tokio::sync::Mutex::new(UoPool::new(
        UoPoolMode::Standard,
        entry_point.clone(),
        validator,
        new_memory_mempool(),
        new_memory_reputation(
            10,
            10,
            50,
            1u64.into(),
            1u64.into(),
            Default::default(),
            Default::default(),
        ),
        5_000_000u64.into(),
        100,
        chain,
        false,
    )));

    let client = Arc::new(EthereumClient::new(eth_client.clone(), wallet.clone()));
    let bundler = Bundler::new(
        wallet,
        Address::random(),
        entry_point,
        chain,
        100u64.into(),
        eth_client,
        client,
    );
    let service = BundlerService::new(uopool, bundler, 100);

    let mut server =
        JsonRpcServer::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port).with_cors(&["*".to_string()]);
    server.add_methods(
        EthApiServerImpl { service: service.clone(), entry_point: ep_addr, chain_id: CHAIN_ID }
            .into_rpc(),
    )?;
    server.add_methods(Web3ApiServerImpl { unsafe_mode: false }.into_rpc())?;
    server.add_methods(DebugApiServerImpl { service }.into_rpc())?;

    let handle = server.start().await?;
    // keep the server alive for the duration of the test process
    std::mem::forget(handle);

    Ok(HttpClientBuilder::default().build(format!("http://127.0.0.1:{port}"))?)
}

#[tokio::test]
async fn client_version_and_chain_id() -> eyre::Result<()> {
    let client = start_server(13370).await?;

    let version: String = client.request("web3_clientVersion", ArrayParams::new()).await?;
    assert!(version.starts_with("kestrel/"));
    assert!(!version.ends_with("/unsafe"));

    let chain_id: U64 = client.request("eth_chainId", ArrayParams::new()).await?;
    assert_eq!(chain_id, U64::from(CHAIN_ID));

    let eps: Vec<String> = client.request("eth_supportedEntryPoints", ArrayParams::new()).await?;
    assert_eq!(eps, vec!["0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789".to_string()]);

    Ok(())
}

#[tokio::test]
async fn unknown_method_and_wrong_entry_point() -> eyre::Result<()> {
    let client = start_server(13371).await?;

    // -32601 for methods outside the surface
    let res: Result<Value, _> = client.request("eth_notAMethod", ArrayParams::new()).await;
    let err = res.unwrap_err();
    assert!(err.to_string().contains("-32601") || err.to_string().contains("not found"));

    // -32602 when the entry point is not the configured one
    let uo = serde_json::json!({
        "sender": "0x9c5754De1443984659E1b3a8d1931D83475ba29C",
        "nonce": "0x0",
        "callData": "0x",
        "signature": "0x"
    });
    let other_ep = "0x0000000000000000000000000000000000000001";
    let res: Result<Value, _> =
        client.request("eth_sendUserOperation", rpc_params![uo, other_ep]).await;
    let err = res.unwrap_err();
    assert!(err.to_string().contains("-32602") || err.to_string().contains("not supported"));

    Ok(())
}

#[tokio::test]
async fn debug_state_round_trip() -> eyre::Result<()> {
    let client = start_server(13372).await?;
    let ep = "0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789";

    let res: String = client.request("debug_bundler_clearState", ArrayParams::new()).await?;
    assert_eq!(res, "ok");

    let mempool: Vec<Value> = client.request("debug_bundler_dumpMempool", rpc_params![ep]).await?;
    assert!(mempool.is_empty());

    // dumpReputation . setReputation . dumpReputation is the identity
    let entries = serde_json::json!([{
        "address": "0x9c5754De1443984659E1b3a8d1931D83475ba29C",
        "opsSeen": 5,
        "opsIncluded": 2,
        "status": "OK"
    }]);
    let res: String =
        client.request("debug_bundler_setReputation", rpc_params![entries, ep]).await?;
    assert_eq!(res, "ok");

    let dump: Value = client.request("debug_bundler_dumpReputation", rpc_params![ep]).await?;
    let dumped = dump.as_array().unwrap();
    assert_eq!(dumped.len(), 1);
    assert_eq!(dumped[0]["opsSeen"], 5);
    assert_eq!(dumped[0]["opsIncluded"], 2);

    let res: String =
        client.request("debug_bundler_setBundlingMode", rpc_params!["manual"]).await?;
    assert_eq!(res, "ok");

    Ok(())
}
