//! Offline checks of the tracer rule enforcement over synthetic tracer output.

use alloy_chains::Chain;
use ethers::{
    providers::{Http, Provider},
    types::{Address, Bytes, U256},
};
use kestrel_contracts::{
    entry_point::{ReturnInfo, SimulateValidationResult, StakeInfo, ValidationResult},
    tracer::{CallFromEntryPoint, ContractSizeInfo, JsTracerFrame},
    EntryPoint,
};
use kestrel_mempool::{
    memory::{new_memory_mempool, new_memory_reputation},
    validate::{
        simulation_trace::{ExternalContracts, Gas, Opcodes},
        SimulationTraceCheck, SimulationTraceHelper,
    },
    Mempool, Reputation, SimulationError,
};
use kestrel_primitives::{UserOperation, UserOperationSigned};
use std::{collections::HashMap, sync::Arc};

// selectors of the top-level validation calls (pinned in kestrel-contracts)
const VALIDATE_USER_OP_SIG: [u8; 4] = [0x3a, 0x87, 0x1c, 0xdd];
const CREATE_SENDER_SIG: [u8; 4] = [0x57, 0x0e, 0x1a, 0x36];

fn entry_point() -> EntryPoint<Provider<Http>> {
    let eth_client = Arc::new(Provider::<Http>::try_from("http://127.0.0.1:8545").unwrap());
    EntryPoint::new(eth_client, "0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789".parse().unwrap())
}

fn simulate_validation_result() -> SimulateValidationResult {
    SimulateValidationResult::ValidationResult(ValidationResult {
        return_info: ReturnInfo::default(),
        sender_info: StakeInfo::default(),
        factory_info: StakeInfo::default(),
        paymaster_info: StakeInfo::default(),
    })
}

fn frame(sig: [u8; 4]) -> CallFromEntryPoint {
    CallFromEntryPoint { top_level_method_sig: Bytes::from(sig.to_vec()), ..Default::default() }
}

fn pool() -> (Mempool, Reputation) {
    (
        new_memory_mempool(),
        new_memory_reputation(
            10,
            10,
            50,
            U256::from(1),
            U256::from(1),
            Default::default(),
            Default::default(),
        ),
    )
}

async fn run_check<C>(
    check: C,
    js_trace: &JsTracerFrame,
    uo: &UserOperation,
) -> Result<(), SimulationError>
where
    C: SimulationTraceCheck<Provider<Http>>,
{
    let ep = entry_point();
    let sim_res = simulate_validation_result();
    let (mempool, reputation) = pool();
    let mut helper = SimulationTraceHelper {
        entry_point: &ep,
        chain: Chain::from_id(1337),
        simulate_validation_result: &sim_res,
        js_trace,
        stake_info: None,
        code_hashes: None,
    };

    check.check_user_operation(uo, &mempool, &reputation, &mut helper).await
}

fn random_uo() -> UserOperation {
    let uo = UserOperationSigned::random();
    let hash = uo.hash(&Address::random(), 1337);
    UserOperation::from_user_operation_signed(hash, uo)
}

#[tokio::test]
async fn forbidden_opcode_is_rejected() {
    let mut level = frame(VALIDATE_USER_OP_SIG);
    level.opcodes.insert("GASPRICE".into(), 1);
    let trace = JsTracerFrame { calls_from_entry_point: vec![level], ..Default::default() };

    let res = run_check(Opcodes, &trace, &random_uo()).await;
    match res {
        Err(SimulationError::Opcode { entity, opcode }) => {
            assert_eq!(entity, "account");
            assert_eq!(opcode, "GASPRICE");
        }
        other => panic!("expected opcode violation, got {other:?}"),
    }
}

#[tokio::test]
async fn leaked_gas_opcode_is_rejected() {
    // the tracer only counts GAS when it is not directly consumed by a CALL
    let mut level = frame(VALIDATE_USER_OP_SIG);
    level.opcodes.insert("GAS".into(), 1);
    let trace = JsTracerFrame { calls_from_entry_point: vec![level], ..Default::default() };

    assert!(matches!(
        run_check(Opcodes, &trace, &random_uo()).await,
        Err(SimulationError::Opcode { .. })
    ));
}

#[tokio::test]
async fn unknown_top_level_frames_are_ignored() {
    let mut level = frame([0xde, 0xad, 0xbe, 0xef]);
    level.opcodes.insert("GASPRICE".into(), 1);
    let trace = JsTracerFrame { calls_from_entry_point: vec![level], ..Default::default() };

    assert!(run_check(Opcodes, &trace, &random_uo()).await.is_ok());
}

#[tokio::test]
async fn create2_is_allowed_once_for_the_factory() {
    let mut level = frame(CREATE_SENDER_SIG);
    level.opcodes.insert("CREATE2".into(), 1);
    let trace = JsTracerFrame { calls_from_entry_point: vec![level], ..Default::default() };
    assert!(run_check(Opcodes, &trace, &random_uo()).await.is_ok());

    // twice is a violation
    let mut level = frame(CREATE_SENDER_SIG);
    level.opcodes.insert("CREATE2".into(), 2);
    let trace = JsTracerFrame { calls_from_entry_point: vec![level], ..Default::default() };
    assert!(matches!(
        run_check(Opcodes, &trace, &random_uo()).await,
        Err(SimulationError::Opcode { .. })
    ));

    // and so is CREATE2 in the account's validation frame
    let mut level = frame(VALIDATE_USER_OP_SIG);
    level.opcodes.insert("CREATE2".into(), 1);
    let trace = JsTracerFrame { calls_from_entry_point: vec![level], ..Default::default() };
    assert!(matches!(
        run_check(Opcodes, &trace, &random_uo()).await,
        Err(SimulationError::Opcode { .. })
    ));
}

#[tokio::test]
async fn out_of_gas_fails_validation() {
    let mut level = frame(VALIDATE_USER_OP_SIG);
    level.oog = Some(true);
    let trace = JsTracerFrame { calls_from_entry_point: vec![level], ..Default::default() };

    assert!(matches!(
        run_check(Gas, &trace, &random_uo()).await,
        Err(SimulationError::OutOfGas)
    ));
}

#[tokio::test]
async fn call_into_undeployed_contract_is_rejected() {
    let uo = random_uo();

    let mut level = frame(VALIDATE_USER_OP_SIG);
    level.contract_size.insert(
        Address::random(),
        ContractSizeInfo { opcode: "CALL".into(), contract_size: 0 },
    );
    let trace = JsTracerFrame { calls_from_entry_point: vec![level], ..Default::default() };
    assert!(matches!(
        run_check(ExternalContracts, &trace, &uo).await,
        Err(SimulationError::Opcode { .. })
    ));

    // the sender itself may be undeployed (it is being created)
    let mut level = frame(VALIDATE_USER_OP_SIG);
    level
        .contract_size
        .insert(uo.sender, ContractSizeInfo { opcode: "CALL".into(), contract_size: 0 });
    let trace = JsTracerFrame { calls_from_entry_point: vec![level], ..Default::default() };
    assert!(run_check(ExternalContracts, &trace, &uo).await.is_ok());
}

#[tokio::test]
async fn probing_the_entry_point_code_is_rejected() {
    let ep = entry_point();

    let mut level = frame(VALIDATE_USER_OP_SIG);
    level.ext_code_access_info.insert(ep.address(), "EXTCODEHASH".into());
    let trace = JsTracerFrame { calls_from_entry_point: vec![level], ..Default::default() };

    assert!(matches!(
        run_check(ExternalContracts, &trace, &random_uo()).await,
        Err(SimulationError::Opcode { .. })
    ));
}

#[tokio::test]
async fn deployed_contract_access_passes() {
    let mut access = HashMap::new();
    access.insert(
        Address::random(),
        ContractSizeInfo { opcode: "STATICCALL".into(), contract_size: 1024 },
    );
    let mut level = frame(VALIDATE_USER_OP_SIG);
    level.contract_size = access;
    let trace = JsTracerFrame { calls_from_entry_point: vec![level], ..Default::default() };

    assert!(run_check(ExternalContracts, &trace, &random_uo()).await.is_ok());
}
