//! Deposit/withdraw sidebar for one vault and one connected account
//!
//! Owns the amount input and both flow engines, registers the reads it
//! depends on with the shared cache, and derives button state from the
//! latest values.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use alloy_primitives::{Address, U256};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use vault_model::format::{format_usdc, format_usdc_input, parse_usdc, sanitize_amount_input};
use vault_model::{
    check_amount, effective_max, estimate_shares, no_buffer_available, AmountCheck, FlowKind,
    FlowState,
};

use crate::chain::ChainClient;
use crate::config::{ChainContext, Role};
use crate::flow::{FlowEngine, FlowTarget, TransitionHook};
use crate::queries::QueryKey;
use crate::read_cache::ReadCache;

pub const NO_BUFFER_NOTICE: &str =
    "No buffer available for withdrawal. Capital is deployed to back policies.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Tab {
    Deposit,
    Withdraw,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionButton {
    pub enabled: bool,
    pub label: &'static str,
}

/// One-line summary for logs and the demo binary
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub tab: Tab,
    pub input: String,
    pub deposit: &'static str,
    pub withdraw: &'static str,
    pub last_error: Option<String>,
    pub usdc_balance: Option<String>,
    pub withdraw_limit: Option<String>,
    /// Vault reads older than the cache's staleness window
    pub stale: bool,
    pub button: ActionButton,
    pub notice: Option<&'static str>,
}

pub struct VaultSession<C: ChainClient> {
    tab: Tab,
    input: Arc<watch::Sender<String>>,
    deposit: FlowEngine<C>,
    withdraw: FlowEngine<C>,
    cache: Arc<ReadCache>,
    role: Option<Role>,
    vault: Address,
    balance_key: QueryKey,
    view_key: QueryKey,
    /// Quote for the amount currently in the deposit input
    preview_key: Mutex<Option<QueryKey>>,
}

impl<C: ChainClient> VaultSession<C> {
    pub fn new(
        chain: Arc<C>,
        cache: Arc<ReadCache>,
        context: &ChainContext,
        vault: Address,
        account: Address,
    ) -> Self {
        let (input, _) = watch::channel(String::new());
        let input = Arc::new(input);
        let target = FlowTarget {
            usdc: context.addresses.usdc,
            vault,
            account,
        };

        let engine = |kind| {
            let input = input.clone();
            FlowEngine::new(chain.clone(), target, kind)
                .with_cache(cache.clone())
                .with_success_hook(Arc::new(move || {
                    input.send_replace(String::new());
                }))
        };
        let deposit = engine(FlowKind::Deposit);
        let withdraw = engine(FlowKind::Withdraw);

        let balance_key = QueryKey::UsdcBalance {
            usdc: context.addresses.usdc,
            user: Some(account),
        };
        let view_key = QueryKey::VaultView {
            vault: Some(vault),
            user: Some(account),
        };
        cache.register(balance_key.clone());
        cache.register(view_key.clone());

        Self {
            tab: Tab::Deposit,
            input,
            deposit,
            withdraw,
            cache,
            role: context.role(Some(account)),
            vault,
            balance_key,
            view_key,
            preview_key: Mutex::new(None),
        }
    }

    /// Report every state change of either flow to `hook`
    pub fn with_transition_hook(mut self, hook: TransitionHook) -> Self {
        self.deposit = self.deposit.clone().with_transition_hook(hook.clone());
        self.withdraw = self.withdraw.clone().with_transition_hook(hook);
        self
    }

    pub fn tab(&self) -> Tab {
        self.tab
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn deposit_flow(&self) -> &FlowEngine<C> {
        &self.deposit
    }

    pub fn withdraw_flow(&self) -> &FlowEngine<C> {
        &self.withdraw
    }

    fn engine(&self) -> &FlowEngine<C> {
        match self.tab {
            Tab::Deposit => &self.deposit,
            Tab::Withdraw => &self.withdraw,
        }
    }

    fn busy(&self) -> bool {
        self.deposit.snapshot().is_in_flight() || self.withdraw.snapshot().is_in_flight()
    }

    pub fn input(&self) -> String {
        self.input.borrow().clone()
    }

    pub fn subscribe_input(&self) -> watch::Receiver<String> {
        self.input.subscribe()
    }

    /// Apply an edit to the amount field. Rejected edits leave it unchanged.
    pub fn set_input(&self, raw: &str) -> bool {
        if self.busy() {
            return false;
        }
        match sanitize_amount_input(raw) {
            Some(cleaned) => {
                self.input.send_replace(cleaned);
                self.track_preview();
                true
            }
            None => false,
        }
    }

    fn wanted_preview(&self) -> Option<QueryKey> {
        let assets = self.amount();
        if self.tab != Tab::Deposit || assets.is_zero() {
            return None;
        }
        Some(QueryKey::PreviewDeposit { vault: Some(self.vault), assets })
    }

    /// Keep one `previewDeposit` registration, for the current amount
    fn track_preview(&self) {
        let wanted = self.wanted_preview();
        let mut current = self.preview_key.lock().unwrap_or_else(PoisonError::into_inner);
        if *current == wanted {
            return;
        }
        if let Some(old) = current.take() {
            self.cache.unregister(&old);
        }
        if let Some(key) = &wanted {
            self.cache.register(key.clone());
        }
        *current = wanted;
    }

    pub fn amount(&self) -> U256 {
        parse_usdc(&self.input.borrow())
    }

    pub fn usdc_balance(&self) -> Option<U256> {
        self.cache.uint(&self.balance_key).value().copied()
    }

    /// Effective withdraw limit; `None` until every input has loaded
    pub fn withdraw_limit(&self) -> Option<U256> {
        effective_max(self.cache.reconcile_inputs(&self.view_key))
    }

    fn ceiling(&self) -> Option<U256> {
        match self.tab {
            Tab::Deposit => self.usdc_balance(),
            Tab::Withdraw => self.withdraw_limit(),
        }
    }

    /// Write the exact ceiling of the current tab into the input
    pub fn fill_max(&self) -> bool {
        if self.busy() {
            return false;
        }
        match self.ceiling() {
            Some(max) => {
                self.input.send_replace(format_usdc_input(max));
                self.track_preview();
                true
            }
            None => false,
        }
    }

    /// Shares minted by a deposit, or burned by a withdrawal, of the
    /// current amount. Deposits use the vault's own quote once it has
    /// loaded and the latest share price until then.
    pub fn estimate_shares(&self) -> Option<U256> {
        if let Some(key) = self.wanted_preview() {
            if let Some(shares) = self.cache.uint(&key).value() {
                return Some(*shares);
            }
        }
        let view = self.cache.view(&self.view_key);
        let snapshot = &view.value()?.snapshot;
        Some(estimate_shares(self.amount(), snapshot.total_assets, snapshot.total_shares))
    }

    /// Switch tabs, resetting both flows and the input. Refused while a
    /// flow is in flight.
    pub fn switch_tab(&mut self, tab: Tab) -> bool {
        if self.busy() {
            return false;
        }
        self.deposit.reset();
        self.withdraw.reset();
        self.input.send_replace(String::new());
        self.tab = tab;
        self.track_preview();
        true
    }

    pub fn check(&self) -> AmountCheck {
        check_amount(&self.engine().snapshot(), self.amount(), self.ceiling())
    }

    pub fn button(&self) -> ActionButton {
        let label = match (self.tab, self.engine().state()) {
            (_, FlowState::Approving) => "Approving...",
            (_, FlowState::Approved) => "Approved, depositing...",
            (_, FlowState::Depositing) => "Depositing...",
            (_, FlowState::Withdrawing) => "Withdrawing...",
            (Tab::Deposit, FlowState::Success) => "Deposit successful",
            (Tab::Withdraw, FlowState::Success) => "Withdrawal successful",
            (tab, FlowState::Idle | FlowState::Error) => match self.check() {
                AmountCheck::Empty => "Enter amount",
                AmountCheck::CeilingUnknown => "Loading...",
                AmountCheck::ExceedsCeiling if tab == Tab::Deposit => "Insufficient USDC balance",
                AmountCheck::ExceedsCeiling => "Exceeds available buffer",
                _ if tab == Tab::Deposit => "Deposit",
                _ => "Withdraw",
            },
        };
        ActionButton {
            enabled: self.check().is_ready(),
            label,
        }
    }

    pub fn notice(&self) -> Option<&'static str> {
        if self.tab == Tab::Withdraw && no_buffer_available(self.withdraw_limit()) {
            Some(NO_BUFFER_NOTICE)
        } else {
            None
        }
    }

    /// Re-check bounds and start the current tab's flow
    pub fn submit(&self) -> Option<JoinHandle<()>> {
        let check = self.check();
        if !check.is_ready() {
            log::debug!("{:?} submission rejected: {:?}", self.tab, check);
            return None;
        }
        self.engine().start(self.amount())
    }

    /// Dismiss a finished flow on the current tab
    pub fn reset(&self) -> bool {
        self.engine().reset()
    }

    pub fn status(&self) -> SessionStatus {
        let flow = self.engine().snapshot();
        SessionStatus {
            tab: self.tab,
            input: self.input(),
            deposit: self.deposit.state().label(),
            withdraw: self.withdraw.state().label(),
            last_error: flow.last_error,
            usdc_balance: self.usdc_balance().map(format_usdc),
            withdraw_limit: self.withdraw_limit().map(format_usdc),
            stale: self.cache.is_stale(&self.view_key, Instant::now()),
            button: self.button(),
            notice: self.notice(),
        }
    }
}

impl<C: ChainClient> Drop for VaultSession<C> {
    fn drop(&mut self) {
        self.cache.unregister(&self.balance_key);
        self.cache.unregister(&self.view_key);
        let preview = self.preview_key.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(key) = preview.take() {
            self.cache.unregister(&key);
        }
    }
}
