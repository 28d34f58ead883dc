use crate::bundler::SendBundleOp;
use ethers::{
    middleware::SignerMiddleware,
    providers::Middleware,
    signers::{LocalWallet, Signer},
    types::{transaction::eip2718::TypedTransaction, H256},
    utils::hex,
};
use kestrel_primitives::{simulation::StorageMap, Wallet};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::trace;

/// Dispatch over the `eth_sendRawTransactionConditional` endpoint: the node
/// only includes the transaction while the supplied account state holds
#[derive(Clone)]
pub struct ConditionalClient<M>(pub SignerMiddleware<Arc<M>, LocalWallet>);

/// Encodes the storage map as the `knownAccounts` parameter: an account maps
/// to either its storage root or to individual slot values
fn known_accounts(storage_map: &StorageMap) -> Value {
    let mut accounts = Map::new();

    for (addr, root) in storage_map.root_hashes.iter() {
        accounts.insert(format!("{addr:?}"), json!(root));
    }

    for (addr, slots) in storage_map.slots.iter() {
        let slots = slots
            .iter()
            .map(|(slot, value)| (format!("{slot:?}"), json!(value)))
            .collect::<Map<String, Value>>();
        accounts.insert(format!("{addr:?}"), Value::Object(slots));
    }

    Value::Object(accounts)
}

#[async_trait::async_trait]
impl<M> SendBundleOp for ConditionalClient<M>
where
    M: Middleware + 'static,
{
    /// Signs the bundle transaction and submits it conditioned on the storage
    /// the bundled operations read during validation
    ///
    /// # Arguments
    /// * `bundle` - Bundle transaction as [TypedTransaction](TypedTransaction)
    /// * `storage_map` - Storage map turned into the `knownAccounts` condition
    ///
    /// # Returns
    /// * `H256` - The transaction hash
    async fn send_bundle(
        &self,
        bundle: TypedTransaction,
        storage_map: StorageMap,
    ) -> eyre::Result<H256> {
        trace!("Sending transaction to the conditional endpoint: {bundle:?}");

        let signature = self.0.signer().sign_transaction(&bundle).await?;
        let raw_tx = bundle.rlp_signed(&signature);

        let tx_hash: H256 = self
            .0
            .inner()
            .provider()
            .request(
                "eth_sendRawTransactionConditional",
                [
                    json!(hex::encode_prefixed(&raw_tx)),
                    json!({ "knownAccounts": known_accounts(&storage_map) }),
                ],
            )
            .await?;

        trace!("Conditional transaction sent: {tx_hash:?}");

        Ok(tx_hash)
    }
}

impl<M> ConditionalClient<M>
where
    M: Middleware + 'static,
{
    /// Creates a conditional client
    ///
    /// # Arguments
    /// * `eth_client` - Connection to the Ethereum execution client
    /// * `wallet` - A [Wallet](Wallet) instance
    pub fn new(eth_client: Arc<M>, wallet: Wallet) -> Self {
        let signer = SignerMiddleware::new(eth_client, wallet.signer);
        Self(signer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::Address;
    use std::collections::HashMap;

    #[test]
    fn known_accounts_encoding() {
        let addr_root = Address::random();
        let addr_slots = Address::random();
        let root = H256::random();
        let slot = H256::from_low_u64_be(1);
        let value = H256::from_low_u64_be(42);

        let mut map = StorageMap::default();
        map.root_hashes.insert(addr_root, root);
        map.slots.insert(addr_slots, HashMap::from([(slot, value)]));

        let encoded = known_accounts(&map);

        assert_eq!(encoded[format!("{addr_root:?}")], json!(root));
        assert_eq!(encoded[format!("{addr_slots:?}")][format!("{slot:?}")], json!(value));
    }
}
