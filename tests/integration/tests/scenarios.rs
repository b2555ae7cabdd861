//! End-to-end vault dashboard scenarios against the simulated chain

use std::sync::Arc;

use alloy_primitives::{Address, U256};
use insurance_dashboard::queries::{QueryKey, QueryValue};
use insurance_dashboard::session::{ActionButton, Tab, NO_BUFFER_NOTICE};
use insurance_dashboard::sim::SimCall;
use insurance_integration_tests::{recorder, settle_time, usdc, TestContext};
use vault_model::{
    check_amount, outstanding_claims, AmountCheck, FlowState, Policy, PolicyStatus, TxStep,
    VaultPolicy,
};

/// Deposit happy path: approval confirmation hands off to the deposit
#[tokio::test]
async fn test_deposit_happy_path() {
    let ctx = TestContext::new();
    let vault = ctx.chain.create_vault("Flight Delay", U256::from(1_000_000_000u64));
    ctx.chain.mint_usdc(ctx.investor, U256::from(500_000_000u64));

    let (hook, seen) = recorder();
    let session = ctx.session(vault).with_transition_hook(hook);
    ctx.refresh().await;

    session.set_input("200");
    assert_eq!(session.amount(), U256::from(200_000_000u64));
    assert_eq!(session.button(), ActionButton { enabled: true, label: "Deposit" });

    session.submit().expect("deposit starts").await.unwrap();

    let flows = seen.lock().unwrap().clone();
    let mut states: Vec<FlowState> = flows.iter().map(|f| f.state).collect();
    states.dedup();
    assert_eq!(
        states,
        vec![
            FlowState::Approving,
            FlowState::Approved,
            FlowState::Depositing,
            FlowState::Success,
        ]
    );
    // Busy for every in-flight state, whatever the ceiling
    for flow in flows.iter().filter(|f| f.is_in_flight()) {
        assert_eq!(check_amount(flow, flow.amount, Some(U256::MAX)), AmountCheck::Busy);
    }

    assert_eq!(session.input(), "");
    assert_eq!(session.deposit_flow().snapshot().tx_hashes.len(), 2);

    ctx.refresh().await;
    assert_eq!(session.usdc_balance(), Some(U256::from(300_000_000u64)));
    assert_eq!(
        ctx.chain.shares_of(vault, ctx.investor),
        U256::from(200_000_000u64) * U256::from(1_000_000_000_000u64)
    );
}

/// Withdrawals are capped by free capital, not the gross liquid balance
#[tokio::test]
async fn test_withdrawal_capped_by_free_capital() {
    let ctx = TestContext::new();
    let vault = ctx.chain.create_vault("Exploit Cover", U256::from(1_000_000u64));
    ctx.buy_out_manager(vault);
    ctx.chain.set_accounting(
        vault,
        U256::from(900_000u64),
        U256::from(50_000u64),
        U256::from(900_000u64),
        7,
    );

    let mut session = ctx.session(vault);
    session.switch_tab(Tab::Withdraw);
    ctx.refresh().await;

    let view_key = QueryKey::VaultView { vault: Some(vault), user: Some(ctx.investor) };
    let view = ctx.cache.view(&view_key).value().cloned().expect("view loaded");
    assert_eq!(view.position.raw_max_withdraw, U256::from(1_000_000u64));
    assert_eq!(session.withdraw_limit(), Some(U256::from(50_000u64)));

    session.set_input("0.06");
    assert_eq!(
        session.button(),
        ActionButton { enabled: false, label: "Exceeds available buffer" }
    );
    assert!(session.submit().is_none());
    assert_eq!(session.withdraw_flow().state(), FlowState::Idle);
    assert!(ctx.chain.calls().is_empty());

    session.set_input("0.05");
    session.submit().expect("withdraw starts").await.unwrap();
    assert_eq!(session.withdraw_flow().state(), FlowState::Success);
    assert_eq!(ctx.chain.usdc_balance(ctx.investor), U256::from(50_000u64));
    assert_eq!(
        ctx.chain.calls(),
        vec![SimCall::Write(TxStep::Withdraw), SimCall::Confirmed(TxStep::Withdraw)]
    );
}

/// Deployed capital above total assets leaves nothing to withdraw
#[tokio::test]
async fn test_shortfall_shows_no_buffer() {
    let ctx = TestContext::new();
    let vault = ctx.chain.create_vault("Depeg Cover", U256::from(500_000u64));
    ctx.buy_out_manager(vault);
    ctx.chain.set_accounting(vault, U256::from(600_000u64), U256::ZERO, U256::ZERO, 3);

    let mut session = ctx.session(vault);
    session.switch_tab(Tab::Withdraw);
    assert_eq!(session.notice(), None, "unknown is not zero");

    ctx.refresh().await;
    assert_eq!(session.withdraw_limit(), Some(U256::ZERO));
    assert_eq!(session.notice(), Some(NO_BUFFER_NOTICE));

    session.set_input("0.000001");
    assert!(!session.button().enabled);
}

/// A wallet rejection ends the flow before any deposit is sent
#[tokio::test]
async fn test_approval_rejected() {
    let ctx = TestContext::new();
    let vault = ctx.chain.create_vault("Flight Delay", usdc(1_000));
    ctx.chain.mint_usdc(ctx.investor, usdc(500));
    ctx.chain.reject_next(
        TxStep::Approve,
        "User rejected the request.\n\nRequest Arguments:\n  from: 0xaaaa",
    );

    let (hook, seen) = recorder();
    let session = ctx.session(vault).with_transition_hook(hook);
    ctx.refresh().await;
    session.set_input("200");
    session.submit().expect("deposit starts").await.unwrap();

    let mut states: Vec<FlowState> = seen.lock().unwrap().iter().map(|f| f.state).collect();
    states.dedup();
    assert_eq!(states, vec![FlowState::Approving, FlowState::Error]);
    assert_eq!(
        session.deposit_flow().last_error().as_deref(),
        Some("User rejected the request.")
    );
    assert!(ctx.chain.calls().is_empty());
    assert_eq!(ctx.chain.allowance(ctx.investor, vault), U256::ZERO);

    assert!(session.reset());
    assert_eq!(session.deposit_flow().state(), FlowState::Idle);
    assert_eq!(session.deposit_flow().last_error(), None);
}

/// A deposit that reverts on-chain keeps the funds and the input
#[tokio::test]
async fn test_deposit_revert_keeps_input() {
    let ctx = TestContext::new();
    let vault = ctx.chain.create_vault("Flight Delay", usdc(1_000));
    ctx.chain.mint_usdc(ctx.investor, usdc(500));
    ctx.chain.revert_next(TxStep::Deposit, "EnforcedPause");

    let session = ctx.session(vault);
    ctx.refresh().await;
    session.set_input("100");
    session.submit().expect("deposit starts").await.unwrap();

    let flow = session.deposit_flow().snapshot();
    assert_eq!(flow.state, FlowState::Error);
    assert!(flow.last_error.unwrap().contains("EnforcedPause"));
    assert_eq!(session.input(), "100");
    assert_eq!(ctx.chain.usdc_balance(ctx.investor), usdc(500));
}

/// The background scheduler picks up a completed flow without waiting
/// for the next poll tick
#[tokio::test(start_paused = true)]
async fn test_scheduler_refreshes_after_flow() {
    let ctx = TestContext::new();
    let vault = ctx.chain.create_vault("Flight Delay", usdc(1_000));
    ctx.chain.create_vault("Smart Contract Cover", usdc(250));
    ctx.chain.mint_usdc(ctx.investor, usdc(500));

    let vaults_key = QueryKey::VaultAddresses { factory: ctx.context.addresses.vault_factory };
    ctx.cache.register(vaults_key.clone());
    let session = ctx.session(vault);

    let scheduler = insurance_dashboard::scheduler::Scheduler::new(
        ctx.chain.clone(),
        Arc::clone(&ctx.cache),
        std::time::Duration::from_secs(10),
        std::time::Duration::from_secs(1),
    );
    let poller = tokio::spawn(scheduler.run());
    tokio::time::sleep(settle_time()).await;

    match ctx.cache.latest(&vaults_key).value() {
        Some(QueryValue::Addresses(vaults)) => assert_eq!(vaults.len(), 2),
        other => panic!("vault list not loaded: {:?}", other),
    }
    assert_eq!(session.usdc_balance(), Some(usdc(500)));

    session.set_input("125");
    session.submit().expect("deposit starts").await.unwrap();
    tokio::time::sleep(settle_time()).await;
    assert_eq!(session.usdc_balance(), Some(usdc(375)));
    assert_eq!(session.withdraw_limit(), Some(usdc(125)));

    poller.abort();
}

/// Policy, receipt and portfolio reads load on mount and follow later
/// chain changes at the poll interval
#[tokio::test(start_paused = true)]
async fn test_policy_reads_follow_the_chain() {
    let ctx = TestContext::new();
    let vault = ctx.chain.create_vault("Flight Delay", usdc(1_000));
    ctx.buy_out_manager(vault);
    let policy = ctx.chain.register_policy(Policy {
        id: 0,
        name: "Flight delay LHR-JFK".to_string(),
        verification_type: 1,
        coverage_amount: usdc(800),
        premium_amount: usdc(40),
        duration: 86_400,
        start_time: 0,
        insurer: Address::repeat_byte(0x5e),
        trigger_threshold: U256::from(180u64),
        status: PolicyStatus::Active,
    });
    ctx.chain.attach_policy(
        vault,
        policy,
        VaultPolicy { premium: usdc(40), earned_premium: usdc(10), ..VaultPolicy::default() },
    );

    let addresses = ctx.context.addresses;
    let policies_key = QueryKey::VaultPolicies { vault: Some(vault), registry: addresses.policy_registry };
    let receipts_key = QueryKey::ClaimReceipts { receipts: addresses.claim_receipt };
    let positions_key = QueryKey::UserPositions { vaults: vec![vault], user: Some(ctx.investor) };
    for key in [&policies_key, &receipts_key, &positions_key] {
        ctx.cache.register(key.clone());
    }

    let scheduler = insurance_dashboard::scheduler::Scheduler::new(
        ctx.chain.clone(),
        Arc::clone(&ctx.cache),
        std::time::Duration::from_secs(10),
        std::time::Duration::from_secs(1),
    );
    let poller = tokio::spawn(scheduler.run());
    tokio::time::sleep(settle_time()).await;

    match ctx.cache.latest(&policies_key).value() {
        Some(QueryValue::VaultPolicies(entries)) => {
            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].unearned_premium(), usdc(30));
        }
        other => panic!("vault policies not loaded: {:?}", other),
    }
    match ctx.cache.latest(&positions_key).value() {
        Some(QueryValue::Positions(rows)) => assert_eq!(rows[0].assets, usdc(1_000)),
        other => panic!("positions not loaded: {:?}", other),
    }
    assert_eq!(ctx.cache.latest(&receipts_key).value(), Some(&QueryValue::Receipts(vec![])));

    ctx.chain.record_claim(vault, policy, usdc(600));
    tokio::time::sleep(std::time::Duration::from_secs(10)).await;
    match ctx.cache.latest(&receipts_key).value() {
        Some(QueryValue::Receipts(receipts)) => {
            assert_eq!(outstanding_claims(receipts), usdc(600));
            assert_eq!(receipts[0].insurer, Address::repeat_byte(0x5e));
        }
        other => panic!("receipts not reloaded: {:?}", other),
    }

    poller.abort();
}

/// A second sidebar on the same vault keeps its reads after the first closes
#[tokio::test]
async fn test_closing_one_sidebar_keeps_the_other_live() {
    let ctx = TestContext::new();
    let vault = ctx.chain.create_vault("Flight Delay", usdc(1_000));
    ctx.buy_out_manager(vault);

    let first = ctx.session(vault);
    let mut second = ctx.session(vault);
    ctx.refresh().await;
    drop(first);
    ctx.refresh().await;

    assert!(second.switch_tab(Tab::Withdraw));
    assert_eq!(second.withdraw_limit(), Some(usdc(1_000)));
    assert!(second.fill_max());
    assert_eq!(second.button(), ActionButton { enabled: true, label: "Withdraw" });
}
