//! Insurance Vault Dashboard
//!
//! Runs the read scheduler and a vault session against the simulated
//! chain, then performs one deposit and one withdrawal.

use std::sync::Arc;

use alloy_primitives::{Address, U256};
use anyhow::{Context, Result};
use insurance_dashboard::config::{ChainAddresses, Config};
use insurance_dashboard::queries::{PollClass, QueryKey, QueryValue};
use insurance_dashboard::read_cache::ReadCache;
use insurance_dashboard::scheduler::Scheduler;
use insurance_dashboard::session::{Tab, VaultSession};
use insurance_dashboard::sim::SimChain;
use tokio::time;
use vault_model::format::{format_bps, format_buffer_ratio, format_share_price, format_usdc};
use vault_model::math::ONE_USDC;
use vault_model::{outstanding_claims, Policy, PolicyStatus, VaultPolicy};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting Insurance Vault Dashboard");

    let config = Config::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({:#}), using default testnet config", e);
        Config::default_testnet()
    });
    log::info!("RPC endpoint: {} (chain {})", config.rpc_url, config.chain_id);

    let chain = Arc::new(SimChain::with_chain_id(config.chain_id));
    let vault = seed_chain(&chain, Address::repeat_byte(0xaa));
    let wallet = chain.wallet();
    let account = wallet.account.context("wallet not connected")?;

    // The simulated chain deploys its own contracts
    let mut context = config.resolve(wallet.chain_id);
    context.addresses = ChainAddresses {
        vault_factory: chain.factory(),
        usdc: chain.usdc(),
        policy_registry: chain.policy_registry(),
        claim_receipt: chain.claim_receipts(),
    };
    log::info!("Connected as {} ({:?})", account, context.role(Some(account)));

    let cache = Arc::new(ReadCache::new(config.staleness()));
    let scheduler = Scheduler::new(
        chain.clone(),
        cache.clone(),
        config.poll_interval(),
        config.ticker_interval(),
    );
    let vaults_key = QueryKey::VaultAddresses {
        factory: context.addresses.vault_factory,
    };
    cache.register(vaults_key.clone());
    let poller = tokio::spawn(scheduler.run());

    let mut session = VaultSession::new(chain.clone(), cache.clone(), &context, vault, account);
    settle().await;
    log_vaults(&cache, &vaults_key).await;
    log_policies(&cache, &context.addresses, vault).await;
    log_status(&session)?;

    if !session.set_input("250") {
        log::warn!("Deposit amount not accepted");
    }
    if let Some(handle) = session.submit() {
        handle.await.context("deposit task")?;
    }
    settle().await;
    log_status(&session)?;
    if !session.reset() {
        log::warn!("Deposit flow not reset");
    }

    if !session.switch_tab(Tab::Withdraw) {
        log::warn!("Withdraw tab not selected");
    }
    if !session.fill_max() {
        log::warn!("No withdrawable amount to fill");
    }
    log_status(&session)?;
    if let Some(handle) = session.submit() {
        handle.await.context("withdraw task")?;
    }
    settle().await;
    log_status(&session)?;

    drop(session);
    poller.abort();
    log::info!("Dashboard stopped");
    Ok(())
}

fn seed_chain(chain: &SimChain, account: Address) -> Address {
    let usdc = |whole: u64| U256::from(whole) * ONE_USDC;

    let vault = chain.create_vault("Parametric Flight Delay", usdc(1_000_000));
    chain.create_vault("Smart Contract Cover", usdc(400_000));
    chain.set_accounting(vault, usdc(700_000), usdc(25_000), usdc(30_000), 12);
    let policy = chain.register_policy(Policy {
        id: 0,
        name: "Flight delay LHR-JFK".to_string(),
        verification_type: 1,
        coverage_amount: usdc(500_000),
        premium_amount: usdc(30_000),
        duration: 30 * 86_400,
        start_time: 0,
        insurer: Address::repeat_byte(0x5e),
        trigger_threshold: U256::from(180u64),
        status: PolicyStatus::Active,
    });
    chain.attach_policy(
        vault,
        policy,
        VaultPolicy {
            allocation_weight: 10_000,
            premium: usdc(30_000),
            coverage: usdc(500_000),
            duration: 30 * 86_400,
            time_remaining: 12 * 86_400,
            ..VaultPolicy::default()
        },
    );
    chain.record_claim(vault, policy, usdc(25_000));
    chain.mint_usdc(account, usdc(5_000));
    chain.connect(account);
    vault
}

/// Let the scheduler pick up pending refreshes
async fn settle() {
    time::sleep(time::Duration::from_millis(50)).await;
}

async fn log_vaults(cache: &ReadCache, key: &QueryKey) {
    let Some(QueryValue::Addresses(vaults)) = cache.latest(key).value().cloned() else {
        log::warn!("Vault list not loaded");
        return;
    };
    log::info!("Found {} vaults", vaults.len());

    // TVL rows refresh at ticker cadence
    let infos_key = QueryKey::MultiVaultInfo { vaults };
    cache.register_with(infos_key.clone(), PollClass::Ticker);
    settle().await;
    if let Some(QueryValue::Vaults(infos)) = cache.latest(&infos_key).value() {
        for info in infos {
            log::info!(
                "{}: TVL {}, price {}, buffer {}, fee {}",
                info.name,
                format_usdc(info.total_assets),
                format_share_price(info.total_assets, info.total_shares),
                format_buffer_ratio(info.buffer_ratio_bps),
                format_bps(info.management_fee_bps)
            );
        }
    }
}

async fn log_policies(cache: &ReadCache, addresses: &ChainAddresses, vault: Address) {
    let policies_key = QueryKey::VaultPolicies {
        vault: Some(vault),
        registry: addresses.policy_registry,
    };
    let receipts_key = QueryKey::ClaimReceipts { receipts: addresses.claim_receipt };
    cache.register(policies_key.clone());
    cache.register(receipts_key.clone());
    settle().await;

    if let Some(QueryValue::VaultPolicies(entries)) = cache.latest(&policies_key).value() {
        for entry in entries {
            log::info!(
                "Policy #{} {}: {} coverage, {} unearned, {}",
                entry.policy_id,
                entry.global.name,
                format_usdc(entry.vault.coverage),
                format_usdc(entry.unearned_premium()),
                entry.effective_status().label()
            );
        }
    }
    if let Some(QueryValue::Receipts(receipts)) = cache.latest(&receipts_key).value() {
        log::info!(
            "{} claim receipts, {} outstanding",
            receipts.len(),
            format_usdc(outstanding_claims(receipts))
        );
    }
    cache.unregister(&policies_key);
    cache.unregister(&receipts_key);
}

fn log_status(session: &VaultSession<SimChain>) -> Result<()> {
    let status = serde_json::to_string(&session.status()).context("serialize status")?;
    log::info!("{}", status);
    Ok(())
}
