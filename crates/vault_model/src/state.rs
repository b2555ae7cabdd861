//! Vault reads and per-operation flow state

use alloy_primitives::{Address, B256, U256};
use arrayvec::ArrayVec;

/// Point-in-time read of one vault's `getVaultInfo()`.
///
/// Never mutated in place: each poll produces a new snapshot that replaces
/// the previous one wholesale.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VaultSnapshot {
    pub name: String,
    pub manager: Address,
    /// USDC raw units (6 decimals)
    pub total_assets: U256,
    /// Share units (18 decimals)
    pub total_shares: U256,
    pub buffer_ratio_bps: u16,
    pub management_fee_bps: u16,
    pub available_buffer: U256,
    /// Capital backing active policies
    pub deployed_capital: U256,
    pub policy_count: u64,
}

/// Per (vault, user) reads taken alongside a snapshot
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserPosition {
    pub share_balance: U256,
    /// `maxWithdraw(user)` as reported by the vault (gross liquid balance)
    pub raw_max_withdraw: U256,
    /// Vault-wide claims awaiting manual settlement
    pub pending_claims: U256,
}

/// A snapshot and position read in the same batch, so they always describe
/// the same chain state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VaultView {
    pub vault: Address,
    pub snapshot: VaultSnapshot,
    pub position: UserPosition,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
    Deposit,
    Withdraw,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowState {
    Idle,
    Approving,
    /// Approval confirmed, deposit about to be submitted
    Approved,
    Depositing,
    Withdrawing,
    Success,
    Error,
}

impl FlowState {
    pub fn is_terminal(self) -> bool {
        matches!(self, FlowState::Success | FlowState::Error)
    }

    /// A transaction has been (or is about to be) submitted and is not final
    pub fn is_in_flight(self) -> bool {
        !self.is_terminal() && self != FlowState::Idle
    }

    /// States from which the user may start a new operation
    pub fn accepts_start(self) -> bool {
        matches!(self, FlowState::Idle | FlowState::Error)
    }

    pub fn label(self) -> &'static str {
        match self {
            FlowState::Idle => "IDLE",
            FlowState::Approving => "APPROVING",
            FlowState::Approved => "APPROVED",
            FlowState::Depositing => "DEPOSITING",
            FlowState::Withdrawing => "WITHDRAWING",
            FlowState::Success => "SUCCESS",
            FlowState::Error => "ERROR",
        }
    }
}

/// Approve + deposit
pub const MAX_FLOW_TXS: usize = 2;

/// One user-initiated deposit or withdrawal
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionFlow {
    pub kind: FlowKind,
    pub state: FlowState,
    /// Fixed when the flow starts
    pub amount: U256,
    pub last_error: Option<String>,
    /// One hash per submitted transaction, in submission order
    pub tx_hashes: ArrayVec<B256, MAX_FLOW_TXS>,
}

impl TransactionFlow {
    pub fn new(kind: FlowKind) -> Self {
        Self {
            kind,
            state: FlowState::Idle,
            amount: U256::ZERO,
            last_error: None,
            tx_hashes: ArrayVec::new(),
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.state.is_in_flight()
    }
}
