//! In-memory chain with ERC-4626 vault semantics
//!
//! Backs the demo binary and the tests. Writes are broadcast immediately
//! and executed when their confirmation is awaited; confirmations can be
//! held to observe flows mid-way. The gross liquid balance used for
//! `maxWithdraw` includes unearned premium, like the deployed vaults.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use alloy_primitives::{Address, B256, U256};
use futures::future::{BoxFuture, FutureExt};
use tokio::sync::watch;
use vault_model::math::{add_u256, div_u256, min_u256, mul_u256, sub_u256, DECIMALS_OFFSET_SCALE};
use vault_model::{
    estimate_assets, estimate_shares, ClaimReceipt, Policy, TxStep, VaultPolicy, VaultSnapshot,
};

use crate::chain::{ChainClient, ChainError, ReadCall, ReadValue, Receipt, Wallet, WriteCall};

/// Observable chain activity, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimCall {
    Write(TxStep),
    Confirmed(TxStep),
    Reverted(TxStep),
}

#[derive(Debug, Clone)]
struct SimVault {
    name: String,
    manager: Address,
    total_assets: U256,
    total_shares: U256,
    buffer_ratio_bps: u16,
    management_fee_bps: u16,
    deployed_capital: U256,
    pending_claims: U256,
    /// Premium held by the vault but not yet earned
    unearned_premium: U256,
    policy_count: u64,
    /// Allocations in attach order
    policies: Vec<(u64, VaultPolicy)>,
}

impl SimVault {
    fn liquid_balance(&self) -> U256 {
        add_u256(sub_u256(self.total_assets, self.deployed_capital), self.unearned_premium)
    }

    fn snapshot(&self) -> VaultSnapshot {
        VaultSnapshot {
            name: self.name.clone(),
            manager: self.manager,
            total_assets: self.total_assets,
            total_shares: self.total_shares,
            buffer_ratio_bps: self.buffer_ratio_bps,
            management_fee_bps: self.management_fee_bps,
            available_buffer: self.liquid_balance(),
            deployed_capital: self.deployed_capital,
            policy_count: self.policy_count,
        }
    }
}

/// Fixed contract addresses of the simulated deployment
#[derive(Debug, Clone, Copy)]
struct Deployment {
    usdc: Address,
    factory: Address,
    registry: Address,
    receipts: Address,
}

#[derive(Debug, Clone)]
struct PendingTx {
    from: Address,
    call: WriteCall,
}

#[derive(Debug, Default)]
struct SimState {
    signer: Option<Address>,
    /// (token, owner) -> balance; vault addresses double as share tokens
    balances: HashMap<(Address, Address), U256>,
    /// (owner, spender) -> USDC allowance
    allowances: HashMap<(Address, Address), U256>,
    vault_order: Vec<Address>,
    vaults: HashMap<Address, SimVault>,
    /// Registry policies; the index is the policy id
    policies: Vec<Policy>,
    /// Claim receipts; the index is the receipt id
    receipts: Vec<ClaimReceipt>,
    pending: HashMap<B256, PendingTx>,
    rejections: HashMap<TxStep, String>,
    reverts: HashMap<TxStep, String>,
    read_failure: Option<String>,
    read_requests: usize,
    calls: Vec<SimCall>,
    next_tx: u64,
    block: u64,
}

impl SimState {
    fn balance(&self, token: Address, owner: Address) -> U256 {
        self.balances.get(&(token, owner)).copied().unwrap_or(U256::ZERO)
    }

    fn credit(&mut self, token: Address, owner: Address, amount: U256) {
        let entry = self.balances.entry((token, owner)).or_insert(U256::ZERO);
        *entry = add_u256(*entry, amount);
    }

    fn debit(&mut self, token: Address, owner: Address, amount: U256) {
        let entry = self.balances.entry((token, owner)).or_insert(U256::ZERO);
        *entry = sub_u256(*entry, amount);
    }

    fn max_withdraw(&self, vault: Address, owner: Address) -> U256 {
        match self.vaults.get(&vault) {
            Some(v) => {
                let owned = estimate_assets(self.balance(vault, owner), v.total_assets, v.total_shares);
                min_u256(owned, v.liquid_balance())
            }
            None => U256::ZERO,
        }
    }

    fn read(&self, at: &Deployment, call: &ReadCall) -> Result<ReadValue, ChainError> {
        let no_code = || ChainError::Rpc(format!("no contract code at {}", call.target()));
        let reverted = |reason: &str| ChainError::Rpc(format!("execution reverted: {reason}"));
        match call {
            ReadCall::GetVaults { factory: f } => {
                if *f != at.factory {
                    return Err(no_code());
                }
                Ok(ReadValue::Addresses(self.vault_order.clone()))
            }
            ReadCall::VaultInfo { vault } => self
                .vaults
                .get(vault)
                .map(|v| ReadValue::VaultInfo(v.snapshot()))
                .ok_or_else(no_code),
            ReadCall::BalanceOf { token, owner } => {
                if *token != at.usdc && !self.vaults.contains_key(token) {
                    return Err(no_code());
                }
                Ok(ReadValue::Uint(self.balance(*token, *owner)))
            }
            ReadCall::ConvertToAssets { vault, shares } => self
                .vaults
                .get(vault)
                .map(|v| ReadValue::Uint(estimate_assets(*shares, v.total_assets, v.total_shares)))
                .ok_or_else(no_code),
            ReadCall::GetPolicyIds { vault } => self
                .vaults
                .get(vault)
                .map(|v| ReadValue::Ids(v.policies.iter().map(|(id, _)| *id).collect()))
                .ok_or_else(no_code),
            ReadCall::GetVaultPolicy { vault, policy_id } => {
                let v = self.vaults.get(vault).ok_or_else(no_code)?;
                v.policies
                    .iter()
                    .find(|(id, _)| id == policy_id)
                    .map(|(_, p)| ReadValue::VaultPolicy(p.clone()))
                    .ok_or_else(|| reverted("PolicyNotAllocated"))
            }
            ReadCall::PolicyCount { registry } => {
                if *registry != at.registry {
                    return Err(no_code());
                }
                Ok(ReadValue::Uint(U256::from(self.policies.len())))
            }
            ReadCall::GetPolicy { registry, policy_id } => {
                if *registry != at.registry {
                    return Err(no_code());
                }
                usize::try_from(*policy_id)
                    .ok()
                    .and_then(|i| self.policies.get(i))
                    .map(|p| ReadValue::Policy(p.clone()))
                    .ok_or_else(|| reverted("PolicyNotFound"))
            }
            ReadCall::NextReceiptId { receipts } => {
                if *receipts != at.receipts {
                    return Err(no_code());
                }
                Ok(ReadValue::Uint(U256::from(self.receipts.len())))
            }
            ReadCall::GetReceipt { receipts, receipt_id } => {
                if *receipts != at.receipts {
                    return Err(no_code());
                }
                usize::try_from(*receipt_id)
                    .ok()
                    .and_then(|i| self.receipts.get(i))
                    .map(|r| ReadValue::Receipt(r.clone()))
                    .ok_or_else(|| reverted("ReceiptNotFound"))
            }
            ReadCall::MaxWithdraw { vault, owner } => {
                if !self.vaults.contains_key(vault) {
                    return Err(no_code());
                }
                Ok(ReadValue::Uint(self.max_withdraw(*vault, *owner)))
            }
            ReadCall::TotalPendingClaims { vault } => self
                .vaults
                .get(vault)
                .map(|v| ReadValue::Uint(v.pending_claims))
                .ok_or_else(no_code),
            ReadCall::PreviewDeposit { vault, assets } => self
                .vaults
                .get(vault)
                .map(|v| ReadValue::Uint(estimate_shares(*assets, v.total_assets, v.total_shares)))
                .ok_or_else(no_code),
        }
    }

    /// Execute a mined transaction; `Err` carries the revert reason
    fn execute(&mut self, usdc: Address, tx: &PendingTx) -> Result<(), String> {
        match &tx.call {
            WriteCall::Approve { token, spender, amount } => {
                if *token != usdc {
                    return Err("approve on unknown token".to_string());
                }
                self.allowances.insert((tx.from, *spender), *amount);
                Ok(())
            }
            WriteCall::Deposit { vault, assets, receiver } => {
                let allowance = self.allowances.get(&(tx.from, *vault)).copied().unwrap_or(U256::ZERO);
                if allowance < *assets {
                    return Err("ERC20InsufficientAllowance".to_string());
                }
                if self.balance(usdc, tx.from) < *assets {
                    return Err("ERC20InsufficientBalance".to_string());
                }
                let v = self.vaults.get_mut(vault).ok_or("no such vault")?;
                let shares = estimate_shares(*assets, v.total_assets, v.total_shares);
                v.total_assets = add_u256(v.total_assets, *assets);
                v.total_shares = add_u256(v.total_shares, shares);

                self.allowances.insert((tx.from, *vault), sub_u256(allowance, *assets));
                self.debit(usdc, tx.from, *assets);
                self.credit(*vault, *receiver, shares);
                Ok(())
            }
            WriteCall::Withdraw { vault, assets, receiver, owner } => {
                if *assets > self.max_withdraw(*vault, *owner) {
                    return Err("ERC4626ExceededMaxWithdraw".to_string());
                }
                let v = self.vaults.get_mut(vault).ok_or("no such vault")?;
                // Round shares burned up, in the vault's favour
                let burned = if v.total_assets.is_zero() {
                    mul_u256(*assets, DECIMALS_OFFSET_SCALE)
                } else {
                    div_u256(
                        add_u256(mul_u256(*assets, v.total_shares), sub_u256(v.total_assets, U256::from(1u64))),
                        v.total_assets,
                    )
                };
                v.total_assets = sub_u256(v.total_assets, *assets);
                v.total_shares = sub_u256(v.total_shares, burned);

                self.debit(*vault, *owner, burned);
                self.credit(usdc, *receiver, *assets);
                Ok(())
            }
        }
    }
}

/// Default id of a local development chain
pub const SIM_CHAIN_ID: u64 = 31337;

pub struct SimChain {
    chain_id: u64,
    at: Deployment,
    state: Mutex<SimState>,
    /// `true` while confirmations flow freely
    gate: watch::Sender<bool>,
}

impl Default for SimChain {
    fn default() -> Self {
        Self::new()
    }
}

impl SimChain {
    pub fn new() -> Self {
        Self::with_chain_id(SIM_CHAIN_ID)
    }

    pub fn with_chain_id(chain_id: u64) -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            chain_id,
            at: Deployment {
                usdc: Address::with_last_byte(0x02),
                factory: Address::with_last_byte(0x01),
                registry: Address::with_last_byte(0x03),
                receipts: Address::with_last_byte(0x04),
            },
            state: Mutex::new(SimState::default()),
            gate,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn usdc(&self) -> Address {
        self.at.usdc
    }

    pub fn factory(&self) -> Address {
        self.at.factory
    }

    pub fn policy_registry(&self) -> Address {
        self.at.registry
    }

    pub fn claim_receipts(&self) -> Address {
        self.at.receipts
    }

    pub fn connect(&self, account: Address) {
        self.lock().signer = Some(account);
    }

    pub fn disconnect(&self) {
        self.lock().signer = None;
    }

    pub fn wallet(&self) -> Wallet {
        Wallet {
            account: self.lock().signer,
            chain_id: self.chain_id,
        }
    }

    /// Deploy a vault seeded with `seed_assets` owned by its manager at $1.00/share
    pub fn create_vault(&self, name: &str, seed_assets: U256) -> Address {
        let mut state = self.lock();
        let index = state.vault_order.len() as u8;
        let vault = Address::with_last_byte(0x10 + index);
        let manager = Address::with_last_byte(0x80 + index);
        let seed_shares = mul_u256(seed_assets, DECIMALS_OFFSET_SCALE);

        state.vaults.insert(
            vault,
            SimVault {
                name: name.to_string(),
                manager,
                total_assets: seed_assets,
                total_shares: seed_shares,
                buffer_ratio_bps: 2_000,
                management_fee_bps: 50,
                deployed_capital: U256::ZERO,
                pending_claims: U256::ZERO,
                unearned_premium: U256::ZERO,
                policy_count: 0,
                policies: Vec::new(),
            },
        );
        state.vault_order.push(vault);
        state.credit(vault, manager, seed_shares);
        vault
    }

    /// Move capital into policies and claims; `unearned_premium` inflates
    /// the gross liquid balance without adding to total assets.
    pub fn set_accounting(
        &self,
        vault: Address,
        deployed_capital: U256,
        pending_claims: U256,
        unearned_premium: U256,
        policy_count: u64,
    ) {
        if let Some(v) = self.lock().vaults.get_mut(&vault) {
            v.deployed_capital = deployed_capital;
            v.pending_claims = pending_claims;
            v.unearned_premium = unearned_premium;
            v.policy_count = policy_count;
        }
    }

    /// Hand `shares` of the vault from its manager to `owner`
    pub fn transfer_shares(&self, vault: Address, owner: Address, shares: U256) {
        let mut state = self.lock();
        let Some(manager) = state.vaults.get(&vault).map(|v| v.manager) else {
            return;
        };
        state.debit(vault, manager, shares);
        state.credit(vault, owner, shares);
    }

    pub fn mint_usdc(&self, owner: Address, amount: U256) {
        let usdc = self.at.usdc;
        self.lock().credit(usdc, owner, amount);
    }

    /// Add `policy` to the registry under the next id, which is returned
    pub fn register_policy(&self, mut policy: Policy) -> u64 {
        let mut state = self.lock();
        let id = state.policies.len() as u64;
        policy.id = id;
        state.policies.push(policy);
        id
    }

    /// Allocate part of the vault's capital to a registered policy
    pub fn attach_policy(&self, vault: Address, policy_id: u64, allocation: VaultPolicy) {
        if let Some(v) = self.lock().vaults.get_mut(&vault) {
            v.policies.push((policy_id, allocation));
            v.policy_count += 1;
        }
    }

    /// Issue a receipt for a triggered claim and return its id
    pub fn record_claim(&self, vault: Address, policy_id: u64, claim_amount: U256) -> u64 {
        let mut state = self.lock();
        let id = state.receipts.len() as u64;
        let insurer = usize::try_from(policy_id)
            .ok()
            .and_then(|i| state.policies.get(i))
            .map(|p| p.insurer)
            .unwrap_or(Address::ZERO);
        let timestamp = state.block;
        state.receipts.push(ClaimReceipt {
            receipt_id: id,
            policy_id,
            claim_amount,
            vault,
            insurer,
            timestamp,
            exercised: false,
        });
        id
    }

    /// The wallet refuses the next submission of `step`
    pub fn reject_next(&self, step: TxStep, message: &str) {
        self.lock().rejections.insert(step, message.to_string());
    }

    /// The next mined `step` reverts
    pub fn revert_next(&self, step: TxStep, reason: &str) {
        self.lock().reverts.insert(step, reason.to_string());
    }

    pub fn fail_reads(&self, message: &str) {
        self.lock().read_failure = Some(message.to_string());
    }

    pub fn restore_reads(&self) {
        self.lock().read_failure = None;
    }

    pub fn hold_confirmations(&self) {
        self.gate.send_replace(false);
    }

    pub fn release_confirmations(&self) {
        self.gate.send_replace(true);
    }

    pub fn calls(&self) -> Vec<SimCall> {
        self.lock().calls.clone()
    }

    /// Read requests served; a batch counts once
    pub fn read_requests(&self) -> usize {
        self.lock().read_requests
    }

    pub fn usdc_balance(&self, owner: Address) -> U256 {
        self.lock().balance(self.at.usdc, owner)
    }

    pub fn shares_of(&self, vault: Address, owner: Address) -> U256 {
        self.lock().balance(vault, owner)
    }

    pub fn allowance(&self, owner: Address, spender: Address) -> U256 {
        self.lock().allowances.get(&(owner, spender)).copied().unwrap_or(U256::ZERO)
    }

    pub fn vault_snapshot(&self, vault: Address) -> Option<VaultSnapshot> {
        self.lock().vaults.get(&vault).map(SimVault::snapshot)
    }

    fn serve(&self, calls: &[ReadCall]) -> Result<Vec<ReadValue>, ChainError> {
        let mut state = self.lock();
        state.read_requests += 1;
        if let Some(message) = &state.read_failure {
            return Err(ChainError::Rpc(message.clone()));
        }
        calls.iter().map(|c| state.read(&self.at, c)).collect()
    }
}

impl ChainClient for SimChain {
    fn read_contract(&self, call: ReadCall) -> BoxFuture<'_, Result<ReadValue, ChainError>> {
        async move {
            tokio::task::yield_now().await;
            let mut values = self.serve(std::slice::from_ref(&call))?;
            values.pop().ok_or(ChainError::UnexpectedReturn {
                selector: "sim",
                expected: "one result",
            })
        }
        .boxed()
    }

    fn read_contracts(
        &self,
        calls: Vec<ReadCall>,
    ) -> BoxFuture<'_, Result<Vec<ReadValue>, ChainError>> {
        async move {
            tokio::task::yield_now().await;
            self.serve(&calls)
        }
        .boxed()
    }

    fn write_contract(&self, call: WriteCall) -> BoxFuture<'_, Result<B256, ChainError>> {
        async move {
            tokio::task::yield_now().await;
            let mut state = self.lock();
            let from = state.signer.ok_or(ChainError::Disconnected)?;
            let step = call.step();
            if let Some(message) = state.rejections.remove(&step) {
                return Err(ChainError::Rejected(message));
            }

            state.next_tx += 1;
            let tx_hash = B256::left_padding_from(&state.next_tx.to_be_bytes());
            state.pending.insert(tx_hash, PendingTx { from, call });
            state.calls.push(SimCall::Write(step));
            Ok(tx_hash)
        }
        .boxed()
    }

    fn wait_for_confirmation(&self, tx_hash: B256) -> BoxFuture<'_, Result<Receipt, ChainError>> {
        async move {
            let mut gate = self.gate.subscribe();
            let opened = gate.wait_for(|open| *open).await.is_ok();
            if !opened {
                return Err(ChainError::Rpc("chain shut down".to_string()));
            }

            let mut state = self.lock();
            let tx = state
                .pending
                .remove(&tx_hash)
                .ok_or_else(|| ChainError::Rpc(format!("unknown transaction {}", tx_hash)))?;
            let step = tx.call.step();

            let forced = state.reverts.remove(&step);
            let outcome = match forced {
                Some(reason) => Err(reason),
                None => state.execute(self.at.usdc, &tx),
            };
            state.block += 1;

            match outcome {
                Ok(()) => {
                    state.calls.push(SimCall::Confirmed(step));
                    Ok(Receipt { tx_hash, block_number: state.block })
                }
                Err(reason) => {
                    state.calls.push(SimCall::Reverted(step));
                    Err(ChainError::Reverted { tx_hash, reason })
                }
            }
        }
        .boxed()
    }
}
