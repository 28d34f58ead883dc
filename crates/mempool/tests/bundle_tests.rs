//! Bundle-building properties, driven through a scripted validator so no
//! Ethereum node is needed.

use alloy_chains::Chain;
use async_trait::async_trait;
use enumset::EnumSet;
use ethers::{
    abi::Token,
    providers::{MockProvider, Provider},
    types::{Address, Bytes, H256, U256},
};
use kestrel_contracts::EntryPoint;
use kestrel_mempool::{
    memory::{new_memory_mempool, new_memory_reputation},
    validate::{
        UserOperationValidationOutcome, UserOperationValidator, UserOperationValidatorMode,
    },
    InvalidMempoolUserOperationError, Mempool, Reputation, SimulationError, UoPool,
};
use kestrel_primitives::{
    UoPoolMode, UserOperation, UserOperationHash, UserOperationSigned,
};
use std::collections::{HashMap, HashSet};

/// Validator with scripted outcomes: every operation validates with the given
/// gas numbers, except the ones marked failing or conflicting
#[derive(Clone, Default)]
struct ScriptedValidator {
    pre_op_gas: U256,
    pre_fund: U256,
    failing: HashSet<UserOperationHash>,
    /// operations whose validation touched a foreign account's storage
    conflicts: HashMap<UserOperationHash, Address>,
}

#[async_trait]
impl UserOperationValidator for ScriptedValidator {
    async fn validate_user_operation(
        &self,
        uo: &UserOperation,
        _mempool: &Mempool,
        _reputation: &Reputation,
        _mode: EnumSet<UserOperationValidatorMode>,
    ) -> Result<UserOperationValidationOutcome, InvalidMempoolUserOperationError> {
        if self.failing.contains(&uo.hash) {
            return Err(InvalidMempoolUserOperationError::Simulation(
                SimulationError::Validation { inner: "AA23 reverted".into() },
            ));
        }

        let mut out = UserOperationValidationOutcome {
            pre_op_gas: self.pre_op_gas,
            pre_fund: self.pre_fund,
            ..Default::default()
        };

        if let Some(addr) = self.conflicts.get(&uo.hash) {
            out.storage_map
                .slots
                .insert(*addr, HashMap::from([(H256::zero(), H256::zero())]));
        }

        Ok(out)
    }
}

const CHAIN_ID: u64 = 1337;

fn uo_with(
    ep: &Address,
    sender: Address,
    nonce: u64,
    priority_fee: u64,
    call_gas: u64,
) -> UserOperation {
    let uo = UserOperationSigned::random()
        .sender(sender)
        .nonce(nonce.into())
        .max_priority_fee_per_gas(priority_fee.into())
        .call_gas_limit(call_gas.into());
    let hash = uo.hash(ep, CHAIN_ID);
    UserOperation::from_user_operation_signed(hash, uo)
}

fn new_pool(
    validator: ScriptedValidator,
    max_bundle_gas: u64,
) -> (UoPool<Provider<MockProvider>, ScriptedValidator>, MockProvider) {
    let (provider, mock) = Provider::mocked();
    let ep_addr: Address = "0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789".parse().unwrap();
    let entry_point = EntryPoint::new(std::sync::Arc::new(provider), ep_addr);
    let reputation = new_memory_reputation(
        10,
        10,
        50,
        U256::from(1),
        U256::from(1),
        Default::default(),
        Default::default(),
    );

    let pool = UoPool::new(
        UoPoolMode::Unsafe,
        entry_point,
        validator,
        new_memory_mempool(),
        reputation,
        U256::from(max_bundle_gas),
        100,
        Chain::from_id(CHAIN_ID),
        false,
    );

    (pool, mock)
}

#[tokio::test]
async fn bundle_respects_the_gas_cap() {
    let validator = ScriptedValidator { pre_op_gas: 50_000.into(), ..Default::default() };
    // two operations of (50k + 50k) fit, the third overflows
    let (mut pool, _mock) = new_pool(validator, 250_000);
    let ep = pool.entry_point.address();

    for (i, fee) in [3u64, 2, 1].iter().enumerate() {
        let uo = uo_with(&ep, Address::random(), i as u64, *fee, 50_000);
        pool.mempool.add(uo).unwrap();
    }

    let sorted = pool.get_sorted_user_operations().unwrap();
    let (bundle, _) = pool.bundle_user_operations(sorted).await.unwrap();

    assert_eq!(bundle.len(), 2);
    assert_eq!(bundle[0].max_priority_fee_per_gas, U256::from(3));
    assert_eq!(bundle[1].max_priority_fee_per_gas, U256::from(2));
    // the operation over the cap stays in the mempool
    assert_eq!(pool.mempool.len(), 3);
}

#[tokio::test]
async fn bundle_admits_one_operation_per_sender() {
    let validator = ScriptedValidator { pre_op_gas: 10_000.into(), ..Default::default() };
    let (mut pool, _mock) = new_pool(validator, 10_000_000);
    let ep = pool.entry_point.address();

    let sender = Address::random();
    pool.mempool.add(uo_with(&ep, sender, 0, 2, 10_000)).unwrap();
    pool.mempool.add(uo_with(&ep, sender, 1, 1, 10_000)).unwrap();

    let sorted = pool.get_sorted_user_operations().unwrap();
    let (bundle, _) = pool.bundle_user_operations(sorted).await.unwrap();

    assert_eq!(bundle.len(), 1);
    assert_eq!(bundle[0].nonce, U256::zero());
    assert_eq!(pool.mempool.len(), 2);
}

#[tokio::test]
async fn bundle_skips_storage_conflicts_without_removal() {
    let ep_addr: Address = "0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789".parse().unwrap();
    let sender_a = Address::random();
    let sender_b = Address::random();

    let uo_a = uo_with(&ep_addr, sender_a, 0, 2, 10_000);
    let uo_b = uo_with(&ep_addr, sender_b, 0, 1, 10_000);

    // B's validation reads A's account storage
    let validator = ScriptedValidator {
        pre_op_gas: 10_000.into(),
        conflicts: HashMap::from([(uo_b.hash, sender_a)]),
        ..Default::default()
    };
    let (mut pool, _mock) = new_pool(validator, 10_000_000);

    pool.mempool.add(uo_a.clone()).unwrap();
    pool.mempool.add(uo_b.clone()).unwrap();

    let sorted = pool.get_sorted_user_operations().unwrap();
    let (bundle, _) = pool.bundle_user_operations(sorted).await.unwrap();

    assert_eq!(bundle.len(), 1);
    assert_eq!(bundle[0].hash, uo_a.hash);
    // conflicting operation is retried later, not dropped
    assert!(pool.mempool.get(&uo_b.hash).unwrap().is_some());
}

#[tokio::test]
async fn bundle_removes_operations_with_banned_entities() {
    let validator = ScriptedValidator { pre_op_gas: 10_000.into(), ..Default::default() };
    let (mut pool, _mock) = new_pool(validator, 10_000_000);
    let ep = pool.entry_point.address();

    let paymaster = Address::random();
    pool.reputation.add_blacklist(&paymaster);

    let uo = UserOperationSigned::random()
        .sender(Address::random())
        .max_priority_fee_per_gas(1.into())
        .call_gas_limit(10_000.into())
        .paymaster_and_data(paymaster.as_bytes().to_vec().into());
    let hash = uo.hash(&ep, CHAIN_ID);
    let uo = UserOperation::from_user_operation_signed(hash, uo);
    pool.mempool.add(uo).unwrap();

    let sorted = pool.get_sorted_user_operations().unwrap();
    let (bundle, _) = pool.bundle_user_operations(sorted).await.unwrap();

    assert!(bundle.is_empty());
    assert_eq!(pool.mempool.len(), 0);
}

#[tokio::test]
async fn bundle_skips_throttled_entities_without_removal() {
    let validator = ScriptedValidator { pre_op_gas: 10_000.into(), ..Default::default() };
    let (mut pool, _mock) = new_pool(validator, 10_000_000);
    let ep = pool.entry_point.address();

    // enough operations seen with none included makes the paymaster THROTTLED
    let paymaster = Address::random();
    pool.reputation
        .set_entities(vec![kestrel_primitives::reputation::ReputationEntry {
            address: paymaster,
            uo_seen: 300,
            uo_included: 0,
            status: Default::default(),
        }])
        .unwrap();

    let uo = UserOperationSigned::random()
        .sender(Address::random())
        .max_priority_fee_per_gas(1.into())
        .call_gas_limit(10_000.into())
        .paymaster_and_data(paymaster.as_bytes().to_vec().into());
    let hash = uo.hash(&ep, CHAIN_ID);
    let uo = UserOperation::from_user_operation_signed(hash, uo);
    pool.mempool.add(uo.clone()).unwrap();

    let sorted = pool.get_sorted_user_operations().unwrap();
    let (bundle, _) = pool.bundle_user_operations(sorted).await.unwrap();

    // throttled is enough to keep it out of the bundle, even on first sight
    assert!(bundle.is_empty());
    assert!(pool.mempool.get(&uo.hash).unwrap().is_some());
}

#[tokio::test]
async fn bundle_removes_operations_failing_revalidation() {
    let ep_addr: Address = "0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789".parse().unwrap();
    let uo = uo_with(&ep_addr, Address::random(), 0, 1, 10_000);

    let validator = ScriptedValidator {
        pre_op_gas: 10_000.into(),
        failing: HashSet::from([uo.hash]),
        ..Default::default()
    };
    let (mut pool, _mock) = new_pool(validator, 10_000_000);

    pool.mempool.add(uo.clone()).unwrap();

    let sorted = pool.get_sorted_user_operations().unwrap();
    let (bundle, _) = pool.bundle_user_operations(sorted).await.unwrap();

    assert!(bundle.is_empty());
    assert!(pool.mempool.get(&uo.hash).unwrap().is_none());
}

#[tokio::test]
async fn bundle_tracks_the_paymaster_deposit() {
    let prefund = U256::from(1_000u64);
    let validator =
        ScriptedValidator { pre_op_gas: 10_000.into(), pre_fund: prefund, ..Default::default() };
    let (mut pool, mock) = new_pool(validator, 10_000_000);
    let ep = pool.entry_point.address();

    // the paymaster deposit covers exactly one prefund
    mock.push::<Bytes, _>(Bytes::from(ethers::abi::encode(&[Token::Uint(prefund)]))).unwrap();

    let paymaster = Address::random();
    let mut add_with_paymaster = |fee: u64| {
        let uo = UserOperationSigned::random()
            .sender(Address::random())
            .max_priority_fee_per_gas(fee.into())
            .call_gas_limit(10_000.into())
            .paymaster_and_data(paymaster.as_bytes().to_vec().into());
        let hash = uo.hash(&ep, CHAIN_ID);
        let uo = UserOperation::from_user_operation_signed(hash, uo);
        pool.mempool.add(uo.clone()).unwrap();
        uo
    };

    let uo_fst = add_with_paymaster(2);
    let uo_snd = add_with_paymaster(1);

    let sorted = pool.get_sorted_user_operations().unwrap();
    let (bundle, _) = pool.bundle_user_operations(sorted).await.unwrap();

    assert_eq!(bundle.len(), 1);
    assert_eq!(bundle[0].hash, uo_fst.hash);
    // the starved operation waits for the paymaster to top up
    assert!(pool.mempool.get(&uo_snd.hash).unwrap().is_some());
}
