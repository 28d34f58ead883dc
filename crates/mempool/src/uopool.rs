use crate::{
    mempool::Mempool,
    utils::div_ceil,
    validate::{
        utils::merge_storage_maps, UserOperationValidationOutcome, UserOperationValidator,
        UserOperationValidatorMode,
    },
    InvalidMempoolUserOperationError, MempoolError, MempoolErrorKind, Overhead, Reputation,
    ReputationError, SimulationError,
};
use alloy_chains::Chain;
use ethers::{
    prelude::LogMeta,
    providers::Middleware,
    types::{Address, BlockNumber, H256, U256, U64},
};
use eyre::format_err;
use kestrel_contracts::{
    entry_point::{EntryPointAPIEvents, UserOperationEventFilter},
    utils::parse_from_input_data,
    EntryPoint,
};
use kestrel_primitives::{
    constants::{
        mempool::LATEST_SCAN_DEPTH,
        validation::{
            entities::SENDER,
            reputation::THROTTLED_ENTITY_BUNDLE_COUNT,
        },
    },
    get_address,
    reputation::{ReputationEntry, ReputationStatus, StakeInfo, StakeInfoResponse},
    simulation::StorageMap,
    UoPoolMode, UserOperation, UserOperationByHash, UserOperationGasEstimation, UserOperationHash,
    UserOperationReceipt,
};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, trace, warn};

// percentage the pre-verification gas estimate is raised by to survive fee drift
const PRE_VERIFICATION_SAFE_RESERVE_PERC: u64 = 10;

/// The user operation pool service backend: holds the mempool, the reputation
/// registry, the validator and the entry point handle, and serves intake,
/// bundle building, event replay and the RPC data queries.
pub struct UoPool<M: Middleware + 'static, V: UserOperationValidator> {
    /// User operation pool mode
    pub mode: UoPoolMode,
    /// The [EntryPoint](EntryPoint) contract object
    pub entry_point: EntryPoint<M>,
    /// The [UserOperationValidator](UserOperationValidator) object
    pub validator: V,
    /// The [Mempool](Mempool) object
    pub mempool: Mempool,
    /// The [Reputation](Reputation) object
    pub reputation: Reputation,
    /// Maximum gas a single bundle may pack
    pub max_bundle_gas: U256,
    /// Multiplier applied to gas estimates, in percent (100 = unchanged)
    pub gas_factor_perc: u64,
    /// The [EIP-155](https://eips.ethereum.org/EIPS/eip-155) chain object
    pub chain: Chain,
    /// Whether bundles are dispatched over the conditional RPC endpoint
    /// (enables account-root mode for the storage map)
    pub conditional: bool,
    /// Cursor of the events replay: next block to scan
    last_block: Option<U64>,
    /// Aggregator named by the latest aggregator event, with its tx hash
    last_aggregator: Option<(H256, Address)>,
}

impl<M: Middleware + 'static, V: UserOperationValidator> UoPool<M, V> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        mode: UoPoolMode,
        entry_point: EntryPoint<M>,
        validator: V,
        mempool: Mempool,
        reputation: Reputation,
        max_bundle_gas: U256,
        gas_factor_perc: u64,
        chain: Chain,
        conditional: bool,
    ) -> Self {
        Self {
            mode,
            entry_point,
            validator,
            mempool,
            reputation,
            max_bundle_gas,
            gas_factor_perc,
            chain,
            conditional,
            last_block: None,
            last_aggregator: None,
        }
    }

    /// Returns all of the [UserOperations](UserOperation) in the mempool
    pub fn get_all(&self) -> eyre::Result<Vec<UserOperation>> {
        self.mempool.get_all().map_err(|err| {
            format_err!("Getting all user operations from mempool failed with error: {err:?}")
        })
    }

    /// Returns an array of [ReputationEntry](ReputationEntry) for all entities
    pub fn get_reputation(&self) -> Vec<ReputationEntry> {
        self.reputation.get_all().unwrap_or_default()
    }

    /// Sets the [ReputationEntries](ReputationEntry) for entities
    pub fn set_reputation(&mut self, reputation: Vec<ReputationEntry>) -> Result<(), ReputationError> {
        self.reputation.set_entities(reputation)
    }

    /// Clears the [Mempool](Mempool)
    pub fn clear_mempool(&mut self) {
        self.mempool.clear();
    }

    /// Clears the [Reputation](Reputation)
    pub fn clear_reputation(&mut self) {
        self.reputation.clear();
    }

    /// Clears both the [Mempool](Mempool) and the [Reputation](Reputation)
    pub fn clear(&mut self) {
        self.mempool.clear();
        self.reputation.clear();
    }

    /// Number of user operations currently in the mempool
    pub fn len(&self) -> usize {
        self.mempool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mempool.is_empty()
    }

    /// Validates a single [UserOperation](UserOperation) with the full rule
    /// set of the configured mode
    pub async fn validate_user_operation(
        &self,
        uo: &UserOperation,
    ) -> Result<UserOperationValidationOutcome, InvalidMempoolUserOperationError> {
        let mode = match self.mode {
            UoPoolMode::Standard => {
                UserOperationValidatorMode::Sanity |
                    UserOperationValidatorMode::Simulation |
                    UserOperationValidatorMode::SimulationTrace
            }
            UoPoolMode::Unsafe => {
                UserOperationValidatorMode::Sanity | UserOperationValidatorMode::Simulation
            }
        };

        self.validator.validate_user_operation(uo, &self.mempool, &self.reputation, mode).await
    }

    /// Adds a single validated user operation into the pool. If the operation
    /// replaces an existing `(sender, nonce)` entry, the replaced entry is
    /// dropped in place; otherwise the *seen* reputation counters of the
    /// entities advance.
    pub async fn add_user_operation(
        &mut self,
        uo: UserOperation,
        res: Result<UserOperationValidationOutcome, InvalidMempoolUserOperationError>,
    ) -> Result<UserOperationHash, MempoolError> {
        let res = match res {
            Ok(res) => res,
            Err(err) => {
                // a banned entity drags its other entries out of the pool too
                if let InvalidMempoolUserOperationError::Sanity(crate::SanityError::Reputation(
                    ReputationError::BannedEntity { address, entity: _ },
                )) = err
                {
                    self.remove_user_operation_by_entity(&address);
                }
                return Err(MempoolError { hash: uo.hash, kind: err.into() });
            }
        };

        if let Some(uo_hash) = res.prev_hash {
            self.remove_user_operation(&uo_hash);
        }

        match self.mempool.add(uo.clone()) {
            Ok(uo_hash) => {
                if let Some(code_hashes) = res.code_hashes {
                    if let Err(err) = self.mempool.set_code_hashes(&uo_hash, code_hashes) {
                        warn!("Failed to set code hashes for user operation {uo_hash:?}: {err:?}");
                    }
                }
                info!("{uo_hash:?} added to the mempool");
                trace!("{uo:?} added to the mempool");

                // the sender's seen counter only advances for staked accounts
                let sender_staked = res
                    .stake_info
                    .map(|info| {
                        self.reputation.verify_stake(SENDER, Some(info[1])).is_ok()
                    })
                    .unwrap_or(false);
                if sender_staked {
                    self.reputation
                        .increment_seen(&uo.sender)
                        .map_err(|e| MempoolError { hash: uo_hash, kind: e.into() })?;
                }
                if let Some(f_addr) = get_address(&uo.init_code) {
                    self.reputation
                        .increment_seen(&f_addr)
                        .map_err(|e| MempoolError { hash: uo_hash, kind: e.into() })?;
                }
                if let Some(p_addr) = get_address(&uo.paymaster_and_data) {
                    self.reputation
                        .increment_seen(&p_addr)
                        .map_err(|e| MempoolError { hash: uo_hash, kind: e.into() })?;
                }

                Ok(uo_hash)
            }
            Err(e) => Err(MempoolError { hash: uo.hash, kind: e }),
        }
    }

    /// User operations in inclusion order
    pub fn get_sorted_user_operations(&self) -> eyre::Result<Vec<UserOperation>> {
        self.mempool.get_sorted().map_err(|err| {
            format_err!("Getting sorted user operations from mempool failed with error: {err:?}")
        })
    }

    /// Packs an array of [UserOperations](UserOperation) into a bundle: greedy
    /// in inclusion order, bounded by `max_bundle_gas`, with paymaster deposit
    /// tracking and a cross-operation storage conflict check.
    pub async fn bundle_user_operations(
        &mut self,
        uos: Vec<UserOperation>,
    ) -> eyre::Result<(Vec<UserOperation>, StorageMap)> {
        let mut uos_valid = vec![];
        let mut senders = HashSet::new();
        let mut gas_total = U256::zero();
        let mut paymaster_deposit = HashMap::new();
        let mut staked_entity_count: HashMap<Address, u64> = HashMap::new();
        let mut storage_maps: Vec<StorageMap> = Vec::new();

        let senders_all = self.mempool.get_senders().into_iter().collect::<HashSet<_>>();

        'uos: for uo in uos {
            let p_opt = get_address(&uo.paymaster_and_data.0);
            let f_opt = get_address(&uo.init_code.0);

            let p_st = self.reputation.get_status_from_bytes(&uo.paymaster_and_data).map_err(
                |err| format_err!("Error getting reputation status with error: {err:?}"),
            )?;
            let f_st = self.reputation.get_status_from_bytes(&uo.init_code).map_err(|err| {
                format_err!("Error getting reputation status with error: {err:?}")
            })?;

            let p_c = p_opt.map(|p| staked_entity_count.get(&p).cloned().unwrap_or(0)).unwrap_or(0);
            let f_c = f_opt.map(|f| staked_entity_count.get(&f).cloned().unwrap_or(0)).unwrap_or(0);

            if p_st == ReputationStatus::BANNED || f_st == ReputationStatus::BANNED {
                self.mempool.remove(&uo.hash).map_err(|err| {
                    format_err!(
                        "Removing a banned user operation {:?} failed with error: {err:?}",
                        uo.hash,
                    )
                })?;
                continue;
            }

            // skip throttled paymasters/factories, and entities already at the
            // per-bundle cap
            if p_st == ReputationStatus::THROTTLED ||
                p_c > THROTTLED_ENTITY_BUNDLE_COUNT as u64
            {
                continue;
            }
            if f_st == ReputationStatus::THROTTLED ||
                f_c > THROTTLED_ENTITY_BUNDLE_COUNT as u64
            {
                continue;
            }

            // one operation per sender per bundle
            if senders.contains(&uo.sender) {
                continue;
            }

            let mode = match self.mode {
                UoPoolMode::Standard => {
                    UserOperationValidatorMode::Simulation |
                        UserOperationValidatorMode::SimulationTrace
                }
                UoPoolMode::Unsafe => UserOperationValidatorMode::Simulation.into(),
            };

            let val_out = self
                .validator
                .validate_user_operation(&uo, &self.mempool, &self.reputation, mode)
                .await;

            debug!("Second validation for user operation {:?} result: {:?}", uo.hash, val_out);

            match val_out {
                Ok(val_out) => {
                    // a storage conflict with another sender's account is not a
                    // failure; retry in a later bundle
                    for addr in val_out.storage_map.root_hashes.keys() {
                        if *addr != uo.sender && senders_all.contains(addr) {
                            continue 'uos;
                        }
                    }

                    for addr in val_out.storage_map.slots.keys() {
                        if *addr != uo.sender && senders_all.contains(addr) {
                            continue 'uos;
                        }
                    }

                    let gas_cost = val_out.pre_op_gas.saturating_add(uo.call_gas_limit);
                    let gas_total_new = gas_total.saturating_add(gas_cost);
                    if gas_total_new.gt(&self.max_bundle_gas) {
                        break;
                    }

                    if let Some(p) = p_opt {
                        let balance = match paymaster_deposit.get(&p) {
                            Some(n) => *n,
                            None => self.entry_point.balance_of(&p).await.map_err(|err| {
                                format_err!(
                                    "Getting balance of paymaster {p:?} failed with error: {err:?}",
                                )
                            })?,
                        };

                        if balance.lt(&val_out.pre_fund) {
                            continue;
                        }

                        staked_entity_count.entry(p).and_modify(|c| *c += 1).or_insert(1);
                        paymaster_deposit.insert(p, balance.saturating_sub(val_out.pre_fund));
                    }

                    if let Some(f) = f_opt {
                        staked_entity_count.entry(f).and_modify(|c| *c += 1).or_insert(1);
                    }

                    // in account-root mode the sender's whole storage root
                    // conditions the bundle instead of individual slots
                    let mut storage_map = val_out.storage_map;
                    if self.conditional {
                        let proof = self
                            .entry_point
                            .eth_client()
                            .get_proof(uo.sender, vec![], None)
                            .await
                            .map_err(|err| {
                                format_err!(
                                    "Getting proof of sender {:?} failed with error: {err:?}",
                                    uo.sender,
                                )
                            })?;
                        storage_map.root_hashes.insert(uo.sender, proof.storage_hash);
                        storage_map.slots.remove(&uo.sender);
                    }
                    storage_maps.push(storage_map);

                    gas_total = gas_total_new;
                }
                Err(err) => {
                    debug!("Second validation failed for {:?}: {err:?}", uo.hash);
                    self.mempool.remove(&uo.hash).map_err(|err| {
                        format_err!(
                            "Removing a user operation {:?} with failed 2nd validation failed with error: {err:?}", uo.hash,
                        )
                    })?;
                    continue;
                }
            }

            uos_valid.push(uo.clone());
            senders.insert(uo.sender);
        }

        Ok((uos_valid, merge_storage_maps(storage_maps)))
    }

    /// Replays the entry point events since the cursor: removes mined user
    /// operations from the mempool and credits inclusion to their entities.
    pub async fn handle_past_events(&mut self) -> eyre::Result<()> {
        let latest_block = self
            .entry_point
            .eth_client()
            .get_block_number()
            .await
            .map_err(|err| format_err!("Getting the latest block number failed: {err:?}"))?;

        let from_block = self
            .last_block
            .unwrap_or_else(|| latest_block.saturating_sub(U64::from(LATEST_SCAN_DEPTH)));
        self.last_block = Some(from_block);

        let events_filter =
            self.entry_point.events().from_block(from_block).to_block(latest_block);
        let events: Vec<(EntryPointAPIEvents, LogMeta)> =
            events_filter.query_with_meta().await.map_err(|err| {
                format_err!("Getting event logs failed with error: {err:?}")
            })?;

        for (event, meta) in events {
            match event {
                EntryPointAPIEvents::UserOperationEventFilter(uo_event) => {
                    self.remove_user_operation(&uo_event.user_op_hash.into()).unwrap_or_else(
                        || {
                            // also emitted for operations submitted by other bundlers
                            trace!(
                                "Unable to remove user operation {:?} from mempool",
                                uo_event.user_op_hash
                            )
                        },
                    );
                    self.include_address(uo_event.sender);
                    if !uo_event.paymaster.is_zero() {
                        self.include_address(uo_event.paymaster);
                    }
                    if let Some((tx_hash, aggregator)) = self.last_aggregator {
                        if tx_hash == meta.transaction_hash {
                            self.include_address(aggregator);
                        }
                    }
                }
                EntryPointAPIEvents::AccountDeployedFilter(deploy_event) => {
                    self.include_address(deploy_event.factory);
                }
                EntryPointAPIEvents::SignatureAggregatorChangedFilter(agg_event) => {
                    self.last_aggregator = Some((meta.transaction_hash, agg_event.aggregator));
                }
                _ => (),
            }

            self.last_block = Some(meta.block_number + U64::one());
        }

        Ok(())
    }

    fn include_address(&mut self, addr: Address) -> Option<()> {
        self.reputation.increment_included(&addr).ok()
    }

    /// Gets the block base fee per gas
    pub async fn base_fee_per_gas(&self) -> eyre::Result<U256> {
        let block = self
            .entry_point
            .eth_client()
            .get_block(BlockNumber::Latest)
            .await?
            .ok_or(format_err!("No block found"))?;
        block.base_fee_per_gas.ok_or(format_err!("No base fee found"))
    }

    /// Estimates `pre_verification_gas`, `verification_gas_limit` and
    /// `call_gas_limit` for a user operation. Indirectly invoked by the
    /// `eth_estimateUserOperationGas` JSON-RPC method.
    pub async fn estimate_user_operation_gas(
        &self,
        uo: &UserOperation,
    ) -> Result<UserOperationGasEstimation, MempoolError> {
        let pre_verification_gas = div_ceil(
            Overhead::default().calculate_pre_verification_gas(uo).saturating_mul(
                U256::from(100).saturating_add(PRE_VERIFICATION_SAFE_RESERVE_PERC.into()),
            ),
            U256::from(100),
        );

        let sim_res =
            self.entry_point.simulate_validation(uo.user_operation.clone()).await.map_err(
                |err| MempoolError {
                    hash: uo.hash,
                    kind: MempoolErrorKind::from(SimulationError::from(err)),
                },
            )?;

        let return_info = match &sim_res {
            kestrel_contracts::entry_point::SimulateValidationResult::ValidationResult(res) => {
                &res.return_info
            }
            kestrel_contracts::entry_point::SimulateValidationResult::ValidationResultWithAggregation(
                res,
            ) => &res.return_info,
        };

        let verification_gas_limit = return_info.pre_op_gas;
        let valid_after = (!return_info.valid_after.is_zero()).then_some(return_info.valid_after);
        let valid_until = (!return_info.valid_until.is_zero()).then_some(return_info.valid_until);

        // execution gas, measured against the sender account
        let call_gas_limit = self
            .entry_point
            .eth_client()
            .estimate_gas(
                &ethers::types::TransactionRequest::new()
                    .from(self.entry_point.address())
                    .to(uo.sender)
                    .data(uo.call_data.clone())
                    .into(),
                None,
            )
            .await
            .map_err(|err| MempoolError {
                hash: uo.hash,
                kind: MempoolErrorKind::from(SimulationError::Execution {
                    inner: err.to_string(),
                }),
            })?;
        let call_gas_limit = div_ceil(
            call_gas_limit.saturating_mul(U256::from(self.gas_factor_perc)),
            U256::from(100),
        );

        Ok(UserOperationGasEstimation {
            pre_verification_gas,
            verification_gas_limit,
            call_gas_limit,
            valid_after,
            valid_until,
        })
    }

    /// Filters the entry point logs for a given user operation hash
    pub async fn get_user_operation_event_meta(
        &self,
        uo_hash: &UserOperationHash,
    ) -> eyre::Result<Option<(UserOperationEventFilter, LogMeta)>> {
        let mut event: Option<(UserOperationEventFilter, LogMeta)> = None;
        let latest_block = self.entry_point.eth_client().get_block_number().await?;
        let filter = self
            .entry_point
            .entry_point_api()
            .event::<UserOperationEventFilter>()
            .from_block(latest_block.saturating_sub(U64::from(LATEST_SCAN_DEPTH)))
            .topic1(uo_hash.0);
        let res: Vec<(UserOperationEventFilter, LogMeta)> = filter.query_with_meta().await?;
        // the same user operation can appear twice in one bundle; take the last
        for log_meta in res.iter() {
            event = Some(log_meta.clone());
        }
        Ok(event)
    }

    /// Gets the user operation by hash, looking it up in the calldata of the
    /// transaction that included it. Indirectly invoked by the
    /// `eth_getUserOperationByHash` JSON-RPC method.
    pub async fn get_user_operation_by_hash(
        &self,
        uo_hash: &UserOperationHash,
    ) -> eyre::Result<UserOperationByHash> {
        let event = self.get_user_operation_event_meta(uo_hash).await?;

        if let Some((event, log_meta)) = event {
            if let Some((uo, ep)) = self
                .entry_point
                .eth_client()
                .get_transaction(log_meta.transaction_hash)
                .await?
                .and_then(|tx| {
                    let uos = parse_from_input_data(tx.input)?;
                    let ep = tx.to?;
                    uos.iter()
                        .find(|uo| uo.sender == event.sender && uo.nonce == event.nonce)
                        .map(|uo| (uo.clone(), ep))
                })
            {
                return Ok(UserOperationByHash {
                    user_operation: uo,
                    entry_point: ep,
                    transaction_hash: log_meta.transaction_hash,
                    block_hash: log_meta.block_hash,
                    block_number: log_meta.block_number,
                });
            }
        }

        Err(format_err!("No user operation found"))
    }

    /// Gets the [UserOperationReceipt](UserOperationReceipt) by hash.
    /// Indirectly invoked by the `eth_getUserOperationReceipt` JSON-RPC method.
    pub async fn get_user_operation_receipt(
        &self,
        uo_hash: &UserOperationHash,
    ) -> eyre::Result<UserOperationReceipt> {
        let event = self.get_user_operation_event_meta(uo_hash).await?;

        if let Some((event, log_meta)) = event {
            if let Some(tx_receipt) = self
                .entry_point
                .eth_client()
                .get_transaction_receipt(log_meta.transaction_hash)
                .await?
            {
                let uo = self.get_user_operation_by_hash(uo_hash).await?;
                return Ok(UserOperationReceipt {
                    user_operation_hash: *uo_hash,
                    sender: event.sender,
                    nonce: event.nonce,
                    actual_gas_cost: event.actual_gas_cost,
                    actual_gas_used: event.actual_gas_used,
                    success: event.success,
                    tx_receipt: tx_receipt.clone(),
                    logs: tx_receipt.logs.into_iter().collect(),
                    paymaster: get_address(&uo.user_operation.paymaster_and_data),
                });
            }
        }

        Err(format_err!("No user operation found"))
    }

    /// Removes the [UserOperation](UserOperation) from the mempool by hash
    pub fn remove_user_operation(&mut self, uo_hash: &UserOperationHash) -> Option<()> {
        match self.mempool.remove(uo_hash) {
            Ok(true) => Some(()),
            _ => None,
        }
    }

    pub fn remove_user_operation_by_entity(&mut self, entity: &Address) -> Option<()> {
        self.mempool.remove_by_entity(entity).ok()
    }

    /// Gets the [StakeInfoResponse](StakeInfoResponse) for an entity
    pub async fn get_stake_info(&self, addr: &Address) -> eyre::Result<StakeInfoResponse> {
        let info = self.entry_point.get_deposit_info(addr).await?;
        let stake_info = StakeInfo {
            address: *addr,
            stake: info.stake,
            unstake_delay: U256::from(info.unstake_delay_sec),
        };
        Ok(StakeInfoResponse {
            stake_info,
            is_staked: self.reputation.verify_stake("", Some(stake_info)).is_ok(),
        })
    }
}
