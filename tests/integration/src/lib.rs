//! Harness for end-to-end dashboard scenarios
//!
//! Wires a simulated chain, the shared read cache and its scheduler the
//! same way the binary does, with the testnet configuration.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy_primitives::{Address, U256};
use insurance_dashboard::config::{ChainAddresses, ChainContext, Config};
use insurance_dashboard::flow::TransitionHook;
use insurance_dashboard::read_cache::ReadCache;
use insurance_dashboard::scheduler::Scheduler;
use insurance_dashboard::session::VaultSession;
use insurance_dashboard::sim::SimChain;
use vault_model::TransactionFlow;

pub const BASE_SEPOLIA: u64 = 84532;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub struct TestContext {
    pub chain: Arc<SimChain>,
    pub cache: Arc<ReadCache>,
    pub scheduler: Scheduler<SimChain>,
    pub context: ChainContext,
    pub investor: Address,
}

impl TestContext {
    pub fn new() -> Self {
        init_logging();
        let config = Config::default_testnet();
        let chain = Arc::new(SimChain::new());
        let cache = Arc::new(ReadCache::new(config.staleness()));
        let scheduler = Scheduler::new(
            chain.clone(),
            cache.clone(),
            config.poll_interval(),
            config.ticker_interval(),
        );

        let mut context = config.resolve(BASE_SEPOLIA);
        context.addresses = ChainAddresses {
            vault_factory: chain.factory(),
            usdc: chain.usdc(),
            policy_registry: chain.policy_registry(),
            claim_receipt: chain.claim_receipts(),
        };

        let investor = Address::repeat_byte(0xaa);
        chain.connect(investor);

        Self {
            chain,
            cache,
            scheduler,
            context,
            investor,
        }
    }

    pub fn session(&self, vault: Address) -> VaultSession<SimChain> {
        VaultSession::new(
            self.chain.clone(),
            self.cache.clone(),
            &self.context,
            vault,
            self.investor,
        )
    }

    /// Give the investor every share the vault's seed deposit minted
    pub fn buy_out_manager(&self, vault: Address) {
        if let Some(snapshot) = self.chain.vault_snapshot(vault) {
            self.chain
                .transfer_shares(vault, self.investor, snapshot.total_shares);
        }
    }

    pub async fn refresh(&self) {
        self.scheduler.refresh_all().await;
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Raw USDC units for a whole-dollar amount
pub fn usdc(whole: u64) -> U256 {
    U256::from(whole) * U256::from(1_000_000u64)
}

/// Hook recording every flow it is shown, in order
pub fn recorder() -> (TransitionHook, Arc<Mutex<Vec<TransactionFlow>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let hook: TransitionHook = Arc::new(move |flow: &TransactionFlow| {
        sink.lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(flow.clone());
    });
    (hook, seen)
}

pub fn settle_time() -> Duration {
    Duration::from_millis(50)
}
