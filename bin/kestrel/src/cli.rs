use clap::Parser;
use ethers::types::{Address, U256};
use expanded_pathbuf::ExpandedPathBuf;
use kestrel_primitives::constants::{
    bundler::{BUNDLE_INTERVAL, BUNDLE_MAX_POOL_SIZE},
    entry_point,
    rpc::HTTP_PORT,
};
use std::net::{IpAddr, Ipv4Addr};

fn parse_address(s: &str) -> Result<Address, String> {
    s.parse::<Address>().map_err(|_| format!("address {s} is not valid"))
}

fn parse_u256(s: &str) -> Result<U256, String> {
    U256::from_dec_str(s).map_err(|_| format!("{s} is not a valid number"))
}

/// Bundler CLI args
#[derive(Clone, Debug, Parser)]
#[command(name = "kestrel", about = "ERC-4337 account abstraction bundler")]
pub struct Args {
    /// Ethereum execution client RPC endpoint.
    #[clap(long, default_value = "http://127.0.0.1:8545")]
    pub eth_client_address: String,

    /// Entry point address.
    #[clap(long, default_value = entry_point::ADDRESS, value_parser = parse_address)]
    pub entry_point: Address,

    /// Path to the file with the mnemonic of the signer.
    #[clap(long, conflicts_with = "private_key")]
    pub mnemonic_file: Option<ExpandedPathBuf>,

    /// Private key of the signer (hex).
    #[clap(long, conflicts_with = "mnemonic_file")]
    pub private_key: Option<String>,

    /// The bundler beneficiary address, receiving the gas refunds.
    #[clap(long, value_parser = parse_address)]
    pub beneficiary: Address,

    /// The minimum balance the signer keeps; under it the refunds go to the
    /// signer itself.
    ///
    /// By default, this option is set to `100000000000000000` (0.1 native token).
    #[clap(long, default_value = "100000000000000000", value_parser = parse_u256)]
    pub min_balance: U256,

    /// Multiplier applied to the gas estimates, in percent (110 = +10%).
    #[clap(long, default_value_t = 100)]
    pub gas_factor: u64,

    /// HTTP-RPC address to listen on.
    #[clap(long, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    pub http_addr: IpAddr,

    /// HTTP-RPC port to listen on.
    #[clap(long, default_value_t = HTTP_PORT)]
    pub port: u16,

    /// Skips the stack-level tracer rules during validation (requires no
    /// debug_traceCall support from the node).
    #[clap(long = "unsafe")]
    pub unsafe_mode: bool,

    /// Exposes the debug_bundler_* RPC namespace.
    #[clap(long)]
    pub debug_rpc: bool,

    /// Dispatches bundles over eth_sendRawTransactionConditional.
    #[clap(long)]
    pub conditional_rpc: bool,

    /// Addresses of whitelisted entities.
    #[clap(long, value_delimiter = ',', value_parser = parse_address)]
    pub whitelist: Vec<Address>,

    /// Addresses of blacklisted entities.
    #[clap(long, value_delimiter = ',', value_parser = parse_address)]
    pub blacklist: Vec<Address>,

    /// Maximum gas a bundle may pack.
    #[clap(long, default_value = "5000000", value_parser = parse_u256)]
    pub max_bundle_gas: U256,

    /// Max allowed verification gas per user operation.
    #[clap(long, default_value = "5000000", value_parser = parse_u256)]
    pub max_verification_gas: U256,

    /// Minimum stake required for entities (wei).
    #[clap(long, default_value = "1", value_parser = parse_u256)]
    pub min_stake: U256,

    /// Minimum unstake delay required for entities (seconds).
    #[clap(long, default_value = "0", value_parser = parse_u256)]
    pub min_unstake_delay: U256,

    /// Minimum priority fee per gas the bundler accepts.
    #[clap(long, default_value = "0", value_parser = parse_u256)]
    pub min_priority_fee_per_gas: U256,

    /// Reputation thresholds to apply: the `bundler` profile gates this
    /// mempool, the `non-bundler` profile matches observers that only track
    /// third-party inclusions.
    #[clap(long, default_value = "bundler", value_parser = ["bundler", "non-bundler"])]
    pub reputation_profile: String,

    /// The auto-bundle interval in seconds; zero bundles only on the mempool
    /// size trigger.
    #[clap(long, default_value_t = BUNDLE_INTERVAL)]
    pub auto_bundle_interval: u64,

    /// Mempool size at which a bundle is attempted without the timer.
    #[clap(long, default_value_t = BUNDLE_MAX_POOL_SIZE)]
    pub auto_bundle_mempool_size: usize,
}
