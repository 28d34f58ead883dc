use alloy_chains::Chain;
use ethers::{
    providers::Middleware,
    signers::Signer,
    types::{
        transaction::eip2718::TypedTransaction, Address, Eip1559TransactionRequest, H256, U256,
        U64,
    },
};
use kestrel_contracts::EntryPoint;
use kestrel_primitives::{
    constants::bundler::BUNDLE_GAS_LIMIT, simulation::StorageMap, UserOperation, Wallet,
};
use std::sync::Arc;
use tracing::{info, trace};

/// The handoff between bundle construction and dispatch: implementations
/// submit the signed-or-signable transaction to the network
#[async_trait::async_trait]
pub trait SendBundleOp: Send + Sync + 'static {
    /// Submits a bundle transaction
    ///
    /// # Arguments
    /// * `bundle` - The `handleOps` transaction as a [TypedTransaction](TypedTransaction)
    /// * `storage_map` - Storage touched by the bundled operations, for
    ///   conditional dispatch
    ///
    /// # Returns
    /// * `H256` - The transaction hash
    async fn send_bundle(
        &self,
        bundle: TypedTransaction,
        storage_map: StorageMap,
    ) -> eyre::Result<H256>;
}

/// Builds and sends `handleOps` bundles
pub struct Bundler<M, S>
where
    M: Middleware + 'static,
    S: SendBundleOp,
{
    /// Wallet instance representing the bundler's signing keys
    pub wallet: Wallet,
    /// Beneficiary address where the gas refund is sent
    pub beneficiary: Address,
    /// Entry point contract
    pub entry_point: EntryPoint<M>,
    /// Chain the bundler is running on
    pub chain: Chain,
    /// Minimum balance the signer must keep; below it the gas refund is
    /// redirected to the signer itself
    pub min_balance: U256,
    /// Connection to the Ethereum execution client
    pub eth_client: Arc<M>,
    /// Client that dispatches the bundle
    pub client: Arc<S>,
}

impl<M, S> Clone for Bundler<M, S>
where
    M: Middleware + 'static,
    S: SendBundleOp,
{
    fn clone(&self) -> Self {
        Self {
            wallet: self.wallet.clone(),
            beneficiary: self.beneficiary,
            entry_point: self.entry_point.clone(),
            chain: self.chain,
            min_balance: self.min_balance,
            eth_client: self.eth_client.clone(),
            client: self.client.clone(),
        }
    }
}

impl<M, S> Bundler<M, S>
where
    M: Middleware + 'static,
    S: SendBundleOp,
{
    pub fn new(
        wallet: Wallet,
        beneficiary: Address,
        entry_point: EntryPoint<M>,
        chain: Chain,
        min_balance: U256,
        eth_client: Arc<M>,
        client: Arc<S>,
    ) -> Self {
        Self { wallet, beneficiary, entry_point, chain, min_balance, eth_client, client }
    }

    /// Picks the beneficiary for the next bundle: the configured address, or
    /// the signer itself when its balance fell under `min_balance`
    pub async fn select_beneficiary(&self) -> eyre::Result<Address> {
        let signer = self.wallet.signer.address();
        let balance = self.eth_client.get_balance(signer, None).await?;

        if balance <= self.min_balance {
            info!("Signer balance {balance} below minimum, redirecting gas refund to the signer");
            Ok(signer)
        } else {
            Ok(self.beneficiary)
        }
    }

    /// Builds the EIP-1559 `handleOps` transaction for the given operations
    async fn create_bundle(
        &self,
        uos: &[UserOperation],
        beneficiary: Address,
    ) -> eyre::Result<TypedTransaction> {
        let signer = self.wallet.signer.address();

        let call_tx = self.entry_point.handle_ops_tx(
            uos.iter().map(|uo| uo.user_operation.clone()).collect(),
            beneficiary,
        );

        let nonce = self.eth_client.get_transaction_count(signer, None).await?;
        let (max_fee_per_gas, max_priority_fee_per_gas) =
            match self.eth_client.estimate_eip1559_fees(None).await {
                Ok(fees) => fees,
                Err(_) => (U256::zero(), U256::zero()),
            };

        let tx = TypedTransaction::Eip1559(Eip1559TransactionRequest {
            to: call_tx.to().cloned(),
            from: Some(signer),
            data: call_tx.data().cloned(),
            chain_id: Some(U64::from(self.chain.id())),
            max_fee_per_gas: Some(max_fee_per_gas),
            max_priority_fee_per_gas: Some(max_priority_fee_per_gas),
            gas: Some(U256::from(BUNDLE_GAS_LIMIT)),
            nonce: Some(nonce),
            value: None,
            access_list: Default::default(),
        });

        Ok(tx)
    }

    /// Sends a bundle of [UserOperations](UserOperation)
    ///
    /// # Arguments
    /// * `uos` - The operations to bundle
    /// * `storage_map` - Storage touched by the operations during validation
    ///
    /// # Returns
    /// * `H256` - The transaction hash of the bundle
    pub async fn send_next_bundle(
        &self,
        uos: &[UserOperation],
        storage_map: StorageMap,
    ) -> eyre::Result<H256> {
        if uos.is_empty() {
            info!("Skipping creating a new bundle, no user operations");
            return Ok(H256::default());
        };

        info!("Creating a new bundle with {} user operations", uos.len());
        trace!("Bundle content: {uos:?}");

        let beneficiary = self.select_beneficiary().await?;
        let bundle = self.create_bundle(uos, beneficiary).await?;

        self.client.send_bundle(bundle, storage_map).await
    }
}
