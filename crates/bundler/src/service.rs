//! The execution manager: serializes all state-mutating work behind one
//! mutex and drives the auto-bundler and reputation-ageing timers.

use crate::bundler::{Bundler, SendBundleOp};
use ethers::{providers::Middleware, types::H256};
use eyre::format_err;
use kestrel_contracts::EntryPointError;
use kestrel_mempool::{validate::UserOperationValidator, MempoolError, UoPool};
use kestrel_primitives::{
    BundleMode, UserOperation, UserOperationHash, UserOperationSigned,
};
use parking_lot::Mutex as PlMutex;
use std::{sync::Arc, time::Duration};
use tokio::{sync::Mutex, task::JoinHandle, time::interval};
use tracing::{error, info, warn};

/// Outcome of a bundle send
#[derive(Clone, Debug, Default)]
pub struct BundleSendResult {
    pub transaction_hash: H256,
    pub user_operation_hashes: Vec<UserOperationHash>,
}

/// The bundler service: owns the pool behind the single-writer mutex,
/// dispatches bundles through the [Bundler](Bundler), and runs the timers.
pub struct BundlerService<M, V, S>
where
    M: Middleware + 'static,
    V: UserOperationValidator + 'static,
    S: SendBundleOp,
{
    /// The user operation pool, serialized behind the execution mutex
    pub uopool: Arc<Mutex<UoPool<M, V>>>,
    /// The bundle builder and sender
    pub bundler: Bundler<M, S>,
    /// Mempool size at which a bundle is attempted without the timer
    max_pool_size: Arc<PlMutex<usize>>,
    /// Auto-bundler timer task, replaced on reconfiguration
    bundle_task: Arc<PlMutex<Option<JoinHandle<()>>>>,
    /// Reputation ageing timer task, replaced on reconfiguration
    cron_task: Arc<PlMutex<Option<JoinHandle<()>>>>,
}

impl<M, V, S> Clone for BundlerService<M, V, S>
where
    M: Middleware + 'static,
    V: UserOperationValidator + 'static,
    S: SendBundleOp,
{
    fn clone(&self) -> Self {
        Self {
            uopool: self.uopool.clone(),
            bundler: self.bundler.clone(),
            max_pool_size: self.max_pool_size.clone(),
            bundle_task: self.bundle_task.clone(),
            cron_task: self.cron_task.clone(),
        }
    }
}

impl<M, V, S> BundlerService<M, V, S>
where
    M: Middleware + 'static,
    V: UserOperationValidator + 'static,
    S: SendBundleOp,
{
    pub fn new(
        uopool: Arc<Mutex<UoPool<M, V>>>,
        bundler: Bundler<M, S>,
        max_pool_size: usize,
    ) -> Self {
        Self {
            uopool,
            bundler,
            max_pool_size: Arc::new(PlMutex::new(max_pool_size)),
            bundle_task: Arc::new(PlMutex::new(None)),
            cron_task: Arc::new(PlMutex::new(None)),
        }
    }

    /// Takes in a user operation: validates it, adds it to the mempool, and
    /// attempts a bundle if the mempool size threshold is reached.
    pub async fn send_user_operation(
        &self,
        uo: UserOperationSigned,
    ) -> Result<UserOperationHash, MempoolError> {
        let uo_hash = {
            let mut uopool = self.uopool.lock().await;
            let hash =
                uo.hash(&uopool.entry_point.address(), self.bundler.chain.id());
            let uo = UserOperation::from_user_operation_signed(hash, uo);

            let res = uopool.validate_user_operation(&uo).await;
            uopool.add_user_operation(uo, res).await?
        };

        if let Err(err) = self.attempt_bundle(false).await {
            warn!("Bundle attempt after intake failed: {err:?}");
        }

        Ok(uo_hash)
    }

    /// Sends a bundle when forced (timer or debug endpoint) or when the
    /// mempool reached the configured size
    pub async fn attempt_bundle(&self, force: bool) -> eyre::Result<Option<BundleSendResult>> {
        let max_pool_size = *self.max_pool_size.lock();
        let count = self.uopool.lock().await.len();

        if force || count >= max_pool_size {
            return self.send_bundles().await.map(Some);
        }

        Ok(None)
    }

    /// Builds the next bundle from the sorted mempool and dispatches it.
    /// A contract-level `FailedOp` is attributed to the responsible entity
    /// instead of being sent.
    pub async fn send_bundles(&self) -> eyre::Result<BundleSendResult> {
        let mut uopool = self.uopool.lock().await;

        let sorted = uopool.get_sorted_user_operations()?;
        let (uos_valid, storage_map) = uopool.bundle_user_operations(sorted).await?;

        if uos_valid.is_empty() {
            if let Err(err) = uopool.handle_past_events().await {
                warn!("Failed to handle past events: {err:?}");
            }
            return Ok(BundleSendResult::default());
        }

        // dry-run handleOps to surface a FailedOp before paying for the
        // transaction
        let beneficiary = self.bundler.select_beneficiary().await?;
        if let Err(err) = uopool
            .entry_point
            .handle_ops_call(
                uos_valid.iter().map(|uo| uo.user_operation.clone()).collect(),
                beneficiary,
            )
            .await
        {
            return match err {
                EntryPointError::FailedOp(op) => {
                    warn!("handleOps failed: {op}");
                    Self::attribute_failed_op(&mut uopool, &uos_valid, &op)?;
                    if let Err(err) = uopool.handle_past_events().await {
                        warn!("Failed to handle past events: {err:?}");
                    }
                    Ok(BundleSendResult::default())
                }
                // the node is incompatible; there is no point retrying
                EntryPointError::MethodNotSupported { method } => {
                    Err(format_err!("node does not support a required method: {method}"))
                }
                other => Err(other.into()),
            };
        }

        let tx_hash = self.bundler.send_next_bundle(&uos_valid, storage_map).await?;

        if let Err(err) = uopool.handle_past_events().await {
            warn!("Failed to handle past events: {err:?}");
        }

        info!("Bundle sent: {tx_hash:?} with {} user operations", uos_valid.len());

        Ok(BundleSendResult {
            transaction_hash: tx_hash,
            user_operation_hashes: uos_valid.iter().map(|uo| uo.hash).collect(),
        })
    }

    /// Attributes a `FailedOp` revert: `AA1*` errors are the factory's fault,
    /// `AA2*` the sender's, `AA3*` the paymaster's; anything else drops the
    /// failing operation from the mempool.
    fn attribute_failed_op<Mw: Middleware + 'static, Val: UserOperationValidator>(
        uopool: &mut UoPool<Mw, Val>,
        uos: &[UserOperation],
        op: &kestrel_contracts::entry_point::FailedOp,
    ) -> eyre::Result<()> {
        let idx = op.op_index.as_usize();
        let uo = uos
            .get(idx)
            .ok_or_else(|| format_err!("FailedOp names op {idx} outside the bundle"))?;
        let (sender, factory, paymaster) = uo.get_entities();

        if op.reason.starts_with("AA1") {
            if let Some(factory) = factory {
                warn!("Charging factory {factory:?} for crashed handleOps");
                uopool.reputation.crashed_handle_ops(&factory)?;
            }
        } else if op.reason.starts_with("AA2") {
            warn!("Charging sender {sender:?} for crashed handleOps");
            uopool.reputation.crashed_handle_ops(&sender)?;
        } else if op.reason.starts_with("AA3") {
            if let Some(paymaster) = paymaster {
                warn!("Charging paymaster {paymaster:?} for crashed handleOps");
                uopool.reputation.crashed_handle_ops(&paymaster)?;
            }
        } else {
            warn!("Removing user operation {:?} that failed with {}", uo.hash, op.reason);
            uopool.remove_user_operation(&uo.hash);
        }

        Ok(())
    }

    /// Applies a bundling mode: `auto` bundles after every intake, `manual`
    /// only on the size threshold or the debug endpoint
    pub fn set_bundling_mode(&self, mode: BundleMode) {
        match mode {
            BundleMode::Auto => self.set_bundle_interval(0, 0),
            BundleMode::Manual => self.set_bundle_interval(0, 1000),
        }
    }

    /// (Re)schedules the auto-bundler: a zero interval disables the timer and
    /// leaves only the size trigger
    pub fn set_bundle_interval(&self, interval_secs: u64, max_pool_size: usize) {
        *self.max_pool_size.lock() = max_pool_size;

        let mut task = self.bundle_task.lock();
        if let Some(task) = task.take() {
            task.abort();
        }

        if interval_secs == 0 {
            info!("Auto bundling disabled, bundling on mempool size {max_pool_size}");
            return;
        }

        info!("Auto bundling every {interval_secs}s");

        let this = self.clone();
        *task = Some(tokio::spawn(async move {
            let mut tick = interval(Duration::from_secs(interval_secs));
            loop {
                tick.tick().await;
                // the timer survives individual failures
                if let Err(err) = this.attempt_bundle(true).await {
                    error!("Error while sending bundle: {err:?}");
                }
            }
        }));
    }

    /// (Re)schedules the reputation ageing cron
    pub fn set_reputation_cron(&self, interval_secs: u64) {
        let mut task = self.cron_task.lock();
        if let Some(task) = task.take() {
            task.abort();
        }

        if interval_secs == 0 {
            return;
        }

        let uopool = self.uopool.clone();
        *task = Some(tokio::spawn(async move {
            let mut tick = interval(Duration::from_secs(interval_secs));
            loop {
                tick.tick().await;
                let mut uopool = uopool.lock().await;
                if let Err(err) = uopool.reputation.update_hourly() {
                    error!("Reputation ageing failed: {err:?}");
                }
            }
        }));
    }
}
