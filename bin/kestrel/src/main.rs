mod cli;

use alloy_chains::Chain;
use clap::Parser;
use cli::Args;
use ethers::{
    providers::{Http, Middleware, Provider, ProviderError},
    signers::Signer,
    types::Address,
};
use eyre::{bail, format_err};
use kestrel_bundler::{
    Bundler, BundlerService, ConditionalClient, EthereumClient, SendBundleOp,
};
use kestrel_contracts::EntryPoint;
use kestrel_mempool::{
    memory::{new_memory_mempool, new_memory_reputation},
    validate::{
        validator::{new_canonical, new_canonical_unsafe},
        UserOperationValidator,
    },
    Mempool, Reputation,
};
use kestrel_primitives::{
    constants::validation::reputation::{
        BAN_SLACK, MIN_INCLUSION_RATE_DENOMINATOR, NON_BUNDLER_BAN_SLACK,
        NON_BUNDLER_MIN_INCLUSION_RATE_DENOMINATOR, NON_BUNDLER_THROTTLING_SLACK,
        THROTTLING_SLACK,
    },
    UoPoolMode, Wallet,
};
use kestrel_rpc::{DebugApiServerImpl, EthApiServerImpl, JsonRpcServer, Web3ApiServerImpl};
use kestrel_rpc::{
    debug_api::DebugApiServer, eth_api::EthApiServer, web3_api::Web3ApiServer,
};
use std::{collections::HashSet, sync::Arc};
use tracing::info;
use tracing_subscriber::EnvFilter;

// reputation counters age by 23/24 every hour
const REPUTATION_CRON_INTERVAL: u64 = 60 * 60;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let eth_client = Arc::new(Provider::<Http>::try_from(args.eth_client_address.clone())?);
    let chain_id = eth_client.get_chainid().await?.as_u64();
    let chain = Chain::from_id(chain_id);
    info!("Connected to the Ethereum execution client at {}: {chain_id}", args.eth_client_address);

    let wallet = match (&args.mnemonic_file, &args.private_key) {
        (Some(path), None) => Wallet::from_file(path.clone(), chain_id)?,
        (None, Some(key)) => Wallet::from_key(key, chain_id)?,
        _ => bail!("provide exactly one of --mnemonic-file and --private-key"),
    };
    info!("Bundler signer: {:?}", wallet.signer.address());

    preflight(&eth_client, &args, &wallet).await?;

    let entry_point = EntryPoint::new(eth_client.clone(), args.entry_point);
    let mempool = new_memory_mempool();
    let (min_inclusion_denominator, throttling_slack, ban_slack) =
        if args.reputation_profile == "non-bundler" {
            (
                NON_BUNDLER_MIN_INCLUSION_RATE_DENOMINATOR,
                NON_BUNDLER_THROTTLING_SLACK,
                NON_BUNDLER_BAN_SLACK,
            )
        } else {
            (MIN_INCLUSION_RATE_DENOMINATOR, THROTTLING_SLACK, BAN_SLACK)
        };
    let reputation = new_memory_reputation(
        min_inclusion_denominator,
        throttling_slack,
        ban_slack,
        args.min_stake,
        args.min_unstake_delay,
        args.whitelist.iter().copied().collect::<HashSet<Address>>(),
        args.blacklist.iter().copied().collect::<HashSet<Address>>(),
    );

    match (args.unsafe_mode, args.conditional_rpc) {
        (false, false) => {
            let validator = new_canonical(
                entry_point.clone(),
                chain,
                args.max_verification_gas,
                args.min_priority_fee_per_gas,
            );
            let client = Arc::new(EthereumClient::new(eth_client.clone(), wallet.clone()));
            run(&args, eth_client, entry_point, chain, wallet, validator, client, mempool, reputation)
                .await
        }
        (false, true) => {
            let validator = new_canonical(
                entry_point.clone(),
                chain,
                args.max_verification_gas,
                args.min_priority_fee_per_gas,
            );
            let client = Arc::new(ConditionalClient::new(eth_client.clone(), wallet.clone()));
            run(&args, eth_client, entry_point, chain, wallet, validator, client, mempool, reputation)
                .await
        }
        (true, false) => {
            let validator = new_canonical_unsafe(
                entry_point.clone(),
                chain,
                args.max_verification_gas,
                args.min_priority_fee_per_gas,
            );
            let client = Arc::new(EthereumClient::new(eth_client.clone(), wallet.clone()));
            run(&args, eth_client, entry_point, chain, wallet, validator, client, mempool, reputation)
                .await
        }
        (true, true) => {
            let validator = new_canonical_unsafe(
                entry_point.clone(),
                chain,
                args.max_verification_gas,
                args.min_priority_fee_per_gas,
            );
            let client = Arc::new(ConditionalClient::new(eth_client.clone(), wallet.clone()));
            run(&args, eth_client, entry_point, chain, wallet, validator, client, mempool, reputation)
                .await
        }
    }
}

/// Startup checks (spec'd to exit the process instead of limping along)
async fn preflight(
    eth_client: &Arc<Provider<Http>>,
    args: &Args,
    wallet: &Wallet,
) -> eyre::Result<()> {
    let code = eth_client.get_code(args.entry_point, None).await?;
    if code.is_empty() {
        bail!("no entry point contract deployed at {:?}", args.entry_point);
    }

    let balance = eth_client.get_balance(wallet.signer.address(), None).await?;
    if balance.is_zero() {
        bail!("signer {:?} has no balance", wallet.signer.address());
    }

    if !args.unsafe_mode && !supports_method(eth_client, "debug_traceCall").await {
        bail!("the node does not support debug_traceCall, required outside --unsafe mode");
    }

    if args.conditional_rpc && !supports_method(eth_client, "eth_sendRawTransactionConditional").await
    {
        bail!("the node does not support eth_sendRawTransactionConditional");
    }

    Ok(())
}

/// Probes a JSON-RPC method: a supporting node answers an empty-params request
/// with something other than "method not found"
async fn supports_method(eth_client: &Arc<Provider<Http>>, method: &str) -> bool {
    let res: Result<serde_json::Value, ProviderError> = eth_client.request(method, ()).await;
    match res {
        Ok(_) => true,
        Err(ProviderError::JsonRpcClientError(err)) => {
            err.as_error_response().map(|e| e.code != -32601).unwrap_or(true)
        }
        Err(_) => true,
    }
}

#[allow(clippy::too_many_arguments)]
async fn run<V, S>(
    args: &Args,
    eth_client: Arc<Provider<Http>>,
    entry_point: EntryPoint<Provider<Http>>,
    chain: Chain,
    wallet: Wallet,
    validator: V,
    client: Arc<S>,
    mempool: Mempool,
    reputation: Reputation,
) -> eyre::Result<()>
where
    V: UserOperationValidator + 'static,
    S: SendBundleOp,
{
    let mode = if args.unsafe_mode { UoPoolMode::Unsafe } else { UoPoolMode::Standard };

    let uopool = kestrel_mempool::UoPool::new(
        mode,
        entry_point.clone(),
        validator,
        mempool,
        reputation,
        args.max_bundle_gas,
        args.gas_factor,
        chain,
        args.conditional_rpc,
    );
    let uopool = Arc::new(tokio::sync::Mutex::new(uopool));

    let bundler = Bundler::new(
        wallet,
        args.beneficiary,
        entry_point,
        chain,
        args.min_balance,
        eth_client,
        client,
    );

    let service = BundlerService::new(uopool, bundler, args.auto_bundle_mempool_size);
    service.set_bundle_interval(args.auto_bundle_interval, args.auto_bundle_mempool_size);
    service.set_reputation_cron(REPUTATION_CRON_INTERVAL);

    let mut server = JsonRpcServer::new(args.http_addr, args.port).with_cors(&["*".to_string()]);

    server.add_methods(
        EthApiServerImpl {
            service: service.clone(),
            entry_point: args.entry_point,
            chain_id: chain.id(),
        }
        .into_rpc(),
    )?;
    server.add_methods(Web3ApiServerImpl { unsafe_mode: args.unsafe_mode }.into_rpc())?;
    if args.debug_rpc {
        server.add_methods(DebugApiServerImpl { service: service.clone() }.into_rpc())?;
    }

    let handle = server.start().await?;
    info!("JSON-RPC server listening on {}:{}", args.http_addr, args.port);

    handle
        .stopped()
        .await;

    Err(format_err!("JSON-RPC server stopped"))
}
