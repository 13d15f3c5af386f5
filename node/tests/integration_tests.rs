//! Cross-component scenarios driven through a fully wired [`PegNode`].

use std::sync::{Arc, Mutex};

use peg_access::RoleStore;
use peg_node::{NodeConfig, PegNode, StakingModel, StorageBackend};
use peg_nullables::{NullClock, NullDex};
use peg_staking::StakingEngine;
use peg_types::{Address, Amount, ErrorKind, PairReserves, PegEvent, Role, SECONDS_PER_YEAR};

const ADMIN: Address = Address::from_low_u8(1);
const TREASURY: Address = Address::from_low_u8(2);
const CONTROLLER: Address = Address::from_low_u8(4);
const STAKING: Address = Address::from_low_u8(5);
const LIQUIDITY: Address = Address::from_low_u8(6);
const BACKEND: Address = Address::from_low_u8(9);
const ALICE: Address = Address::from_low_u8(10);
const BOB: Address = Address::from_low_u8(11);
const CAROL: Address = Address::from_low_u8(12);

fn genesis() -> Amount {
    30_000_000 * 10u128.pow(18)
}

fn open_node(config: NodeConfig) -> (PegNode, Arc<NullClock>) {
    let clock = Arc::new(NullClock::new(1_700_000_000));
    let node = PegNode::from_config_with_clock(config, clock.clone()).unwrap();
    (node, clock)
}

/// Grant the off-chain backend its operational roles.
fn with_backend(node: &PegNode) {
    node.registry("AGC").unwrap().grant_role(&ADMIN, Role::Operator, &BACKEND).unwrap();
    node.registry("USC").unwrap().grant_role(&ADMIN, Role::Minter, &BACKEND).unwrap();
    node.registry("USDT").unwrap().grant_role(&ADMIN, Role::Minter, &BACKEND).unwrap();
    node.registry("controller").unwrap().grant_role(&ADMIN, Role::Redeemer, &BACKEND).unwrap();
}

fn sum_of_balances(node: &PegNode) -> Amount {
    let agc = node.reserve();
    let mut sum = agc.balance_of(&TREASURY).unwrap();
    for i in 0..agc.count_all_users().unwrap() {
        sum += agc.balance_of(&agc.user_at(i).unwrap().unwrap()).unwrap();
    }
    sum
}

// ---------------------------------------------------------------------------
// Rebasement
// ---------------------------------------------------------------------------

#[test]
fn rebasement_scales_users_treasury_and_supply() {
    let (node, _) = open_node(NodeConfig::in_memory());
    with_backend(&node);
    let agc = node.reserve();
    assert_eq!(agc.balance_of(&TREASURY).unwrap(), genesis());

    agc.mint(&BACKEND, &ALICE, 500).unwrap();
    agc.mint(&BACKEND, &BOB, 400).unwrap();
    let outcome = agc.perform_rebasement(&BACKEND, 3, 2, 0, 3).unwrap();

    assert_eq!(outcome.accounts_scaled, 2);
    assert_eq!(agc.balance_of(&ALICE).unwrap(), 750);
    assert_eq!(agc.balance_of(&BOB).unwrap(), 600);
    assert_eq!(agc.balance_of(&TREASURY).unwrap(), genesis() * 3 / 2);
    assert_eq!(agc.total_supply().unwrap(), (genesis() + 900) * 3 / 2);
    assert_eq!(sum_of_balances(&node), agc.total_supply().unwrap());
}

#[test]
fn per_account_mode_paginates_without_drift() {
    let mut config = NodeConfig::in_memory();
    config.reserve.rebase_mode = peg_ledger::RebaseSupplyMode::PerAccount;
    let (node, _) = open_node(config);
    with_backend(&node);
    let agc = node.reserve();
    for (seed, amount) in [(20u8, 101), (21, 303), (22, 505)] {
        agc.mint(&BACKEND, &Address::from_low_u8(seed), amount).unwrap();
    }

    agc.perform_rebasement(&BACKEND, 1, 2, 0, 2).unwrap();
    agc.perform_rebasement(&BACKEND, 1, 2, 2, 3).unwrap();

    assert_eq!(agc.balance_of(&Address::from_low_u8(20)).unwrap(), 50);
    assert_eq!(agc.balance_of(&Address::from_low_u8(22)).unwrap(), 252);
    assert_eq!(agc.balance_of(&TREASURY).unwrap(), genesis() / 2);
    assert_eq!(sum_of_balances(&node), agc.total_supply().unwrap());
}

// ---------------------------------------------------------------------------
// Redemption
// ---------------------------------------------------------------------------

#[test]
fn redemption_round_trip_conserves_each_ledger() {
    let (node, _) = open_node(NodeConfig::in_memory());
    with_backend(&node);
    let (agc, usc) = (node.reserve(), node.pegged());

    agc.mint(&BACKEND, &ALICE, 1_000).unwrap();
    node.controller().redeem_agc(&BACKEND, &ALICE, 400, 2_000).unwrap();
    assert_eq!(agc.balance_of(&ALICE).unwrap(), 600);
    assert_eq!(usc.balance_of(&ALICE).unwrap(), 2_000);

    usc.approve(&ALICE, &CONTROLLER, 500).unwrap();
    node.controller().redeem_usc(&BACKEND, &ALICE, 500, 100).unwrap();
    assert_eq!(usc.balance_of(&ALICE).unwrap(), 1_500);
    assert_eq!(agc.balance_of(&ALICE).unwrap(), 700);
    assert_eq!(usc.total_supply().unwrap(), 1_500);
    assert_eq!(sum_of_balances(&node), agc.total_supply().unwrap());
}

#[test]
fn failed_redemption_changes_nothing() {
    let (node, _) = open_node(NodeConfig::in_memory());
    with_backend(&node);
    let (agc, usc) = (node.reserve(), node.pegged());
    agc.mint(&BACKEND, &ALICE, 100).unwrap();
    usc.pause(&ADMIN).unwrap();

    let err = node.controller().redeem_agc(&BACKEND, &ALICE, 50, 50).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Paused);
    assert_eq!(agc.balance_of(&ALICE).unwrap(), 100);
    assert_eq!(agc.total_supply().unwrap(), genesis() + 100);

    let err = node.controller().redeem_agc(&ALICE, &ALICE, 50, 50).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
}

#[test]
fn renounced_role_stops_working() {
    let (node, _) = open_node(NodeConfig::in_memory());
    with_backend(&node);
    let agc_roles = node.registry("AGC").unwrap();
    node.reserve().mint(&BACKEND, &ALICE, 10).unwrap();

    agc_roles.renounce_role(&BACKEND, Role::Operator, &BACKEND).unwrap();
    let err = node.reserve().mint(&BACKEND, &ALICE, 10).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);
}

// ---------------------------------------------------------------------------
// Staking
// ---------------------------------------------------------------------------

#[test]
fn simple_staking_mints_pegged_rewards() {
    let (node, clock) = open_node(NodeConfig::in_memory());
    with_backend(&node);
    let (usdt, usc) = (node.stake_token(), node.pegged());
    let staking = node.staking().engine();

    usdt.mint(&BACKEND, &ALICE, 3_000).unwrap();
    usdt.approve(&ALICE, &STAKING, u128::MAX).unwrap();
    staking.deposit(&ALICE, 0, 2_000).unwrap();

    clock.advance(SECONDS_PER_YEAR);
    assert_eq!(staking.pending_reward(&ALICE, 0).unwrap(), 400);
    assert_eq!(staking.get_reward(&ALICE, 0).unwrap(), 400);
    assert_eq!(usc.balance_of(&ALICE).unwrap(), 400);

    staking.withdraw(&ALICE, 0, 2_000).unwrap();
    assert_eq!(usdt.balance_of(&ALICE).unwrap(), 3_000);
    assert_eq!(usdt.balance_of(&STAKING).unwrap(), 0);
}

#[test]
fn pool_staking_through_node() {
    let mut config = NodeConfig::in_memory();
    config.staking.model = StakingModel::Pool;
    config.staking.reward_per_second = 2;
    let (node, clock) = open_node(config);
    with_backend(&node);
    let farm = node.staking().as_pool().unwrap();
    assert!(node.staking().as_simple().is_none());

    let pool = farm.add_pool(&ADMIN, "USDT", 1, 0).unwrap();
    node.stake_token().mint(&BACKEND, &BOB, 100).unwrap();
    node.stake_token().approve(&BOB, &STAKING, 100).unwrap();
    farm.deposit(&BOB, pool, 100).unwrap();

    clock.advance(50);
    assert_eq!(node.staking().engine().get_reward(&BOB, pool).unwrap(), 100);
    assert_eq!(node.pegged().balance_of(&BOB).unwrap(), 100);
}

// ---------------------------------------------------------------------------
// Liquidity
// ---------------------------------------------------------------------------

#[test]
fn liquidity_provider_pulls_pegged_tokens() {
    let (mut node, _) = open_node(NodeConfig::in_memory());
    with_backend(&node);
    let usc_token = Address::from_low_u8(0x51);
    let usdt_token = Address::from_low_u8(0x52);
    let pair = Address::from_low_u8(0xAA);
    let dex = Arc::new(NullDex::new(
        pair,
        PairReserves {
            token0: usc_token,
            token1: usdt_token,
            reserve0: 1_000_000,
            reserve1: 1_000_000,
        },
    ));
    node.attach_liquidity(dex.clone(), &[(usc_token, "USC"), (usdt_token, "USDT")]).unwrap();
    node.pegged().mint(&BACKEND, &CAROL, 1_000).unwrap();
    node.pegged().approve(&CAROL, &LIQUIDITY, 1_000).unwrap();

    let provider = node.liquidity().unwrap();
    assert_eq!(provider.provide_liquidity(&CAROL, &usc_token, 1_000).unwrap(), 498);
    assert_eq!(node.pegged().balance_of(&pair).unwrap(), 1_000);
    assert_eq!(dex.liquidity_add_count(), 1);

    assert!(node.attach_liquidity(dex, &[(usc_token, "DOGE")]).is_err());
}

// ---------------------------------------------------------------------------
// Events and persistence
// ---------------------------------------------------------------------------

#[test]
fn events_follow_commits_only() {
    let (node, _) = open_node(NodeConfig::in_memory());
    with_backend(&node);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    node.events().subscribe(Box::new(move |e| sink.lock().unwrap().push(e.clone())));

    assert!(node.pegged().transfer(&ALICE, &BOB, 1).is_err());
    assert!(seen.lock().unwrap().is_empty());

    node.pegged().mint(&BACKEND, &ALICE, 5).unwrap();
    assert_eq!(
        seen.lock().unwrap().as_slice(),
        &[PegEvent::Transfer {
            ledger: "USC".into(),
            from: Address::ZERO,
            to: ALICE,
            amount: 5,
        }]
    );
}

fn lmdb_config(dir: &tempfile::TempDir) -> NodeConfig {
    let mut config = NodeConfig::default();
    config.storage = StorageBackend::Lmdb;
    config.data_dir = dir.path().to_path_buf();
    config.lmdb_map_size_mb = 64;
    config
}

#[test]
fn revoked_roles_stay_revoked_after_reopen() {
    let dir = tempfile::tempdir().expect("temp dir");
    {
        let (node, _) = open_node(lmdb_config(&dir));
        node.registry("USC").unwrap().revoke_role(&ADMIN, Role::Minter, &CONTROLLER).unwrap();
        node.registry("AGC").unwrap().revoke_role(&ADMIN, Role::Operator, &CONTROLLER).unwrap();
        node.registry("USC").unwrap().revoke_role(&ADMIN, Role::Minter, &STAKING).unwrap();
    }

    let (node, _) = open_node(lmdb_config(&dir));
    let usc = node.registry("USC").unwrap();
    let agc = node.registry("AGC").unwrap();
    assert!(!usc.has_role(Role::Minter, &CONTROLLER).unwrap());
    assert!(!agc.has_role(Role::Operator, &CONTROLLER).unwrap());
    assert!(!usc.has_role(Role::Minter, &STAKING).unwrap());
    assert!(agc.has_role(Role::Pauser, &ADMIN).unwrap());
}

#[test]
fn renounced_admin_is_not_restored_on_reopen() {
    let dir = tempfile::tempdir().expect("temp dir");
    {
        let (node, _) = open_node(lmdb_config(&dir));
        let agc = node.registry("AGC").unwrap();
        agc.revoke_role(&ADMIN, Role::Pauser, &ADMIN).unwrap();
        agc.renounce_role(&ADMIN, Role::Admin, &ADMIN).unwrap();
    }

    let (node, _) = open_node(lmdb_config(&dir));
    let agc = node.registry("AGC").unwrap();
    assert!(!agc.has_role(Role::Admin, &ADMIN).unwrap());
    assert!(!agc.has_role(Role::Pauser, &ADMIN).unwrap());
    assert_eq!(node.reserve().pause(&ADMIN).unwrap_err().kind(), ErrorKind::Unauthorized);
    // other scopes keep their admin
    assert!(node.registry("USC").unwrap().has_role(Role::Admin, &ADMIN).unwrap());
}

#[test]
fn lmdb_node_reopens_with_state() {
    let dir = tempfile::tempdir().expect("temp dir");
    let config = lmdb_config(&dir);

    {
        let (node, _) = open_node(config.clone());
        with_backend(&node);
        node.reserve().mint(&BACKEND, &ALICE, 500).unwrap();
        node.reserve().perform_rebasement(&BACKEND, 3, 2, 0, 1).unwrap();
        node.pegged().pause(&ADMIN).unwrap();
    }

    let (node, _) = open_node(config);
    assert_eq!(node.reserve().balance_of(&ALICE).unwrap(), 750);
    assert_eq!(node.reserve().balance_of(&TREASURY).unwrap(), genesis() * 3 / 2);
    assert_eq!(node.reserve().count_all_users().unwrap(), 1);
    assert!(node.pegged().is_paused().unwrap());
    // genesis mint ran once
    assert_eq!(node.reserve().total_supply().unwrap(), (genesis() + 500) * 3 / 2);
    assert!(node.registry("AGC").unwrap().has_role(Role::Operator, &BACKEND).unwrap());
}
