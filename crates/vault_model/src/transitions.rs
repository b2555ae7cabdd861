//! Flow transition function - total, no panics
//!
//! `transition(flow, event) -> (flow, effect)` is the only way a
//! `TransactionFlow` changes. The caller executes the returned effect and
//! feeds the outcome back in as the next event. Events that do not apply
//! to the current state leave the flow unchanged and yield `Effect::None`.

use alloy_primitives::{B256, U256};

use crate::state::*;

/// One on-chain transaction within a flow
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TxStep {
    /// `approve(vault, amount)` on the asset token
    Approve,
    /// `deposit(amount, receiver)` on the vault
    Deposit,
    /// `withdraw(amount, receiver, owner)` on the vault
    Withdraw,
}

impl TxStep {
    /// State the flow sits in while this step is outstanding
    pub fn pending_state(self) -> FlowState {
        match self {
            TxStep::Approve => FlowState::Approving,
            TxStep::Deposit => FlowState::Depositing,
            TxStep::Withdraw => FlowState::Withdrawing,
        }
    }

    pub fn selector(self) -> &'static str {
        match self {
            TxStep::Approve => "approve",
            TxStep::Deposit => "deposit",
            TxStep::Withdraw => "withdraw",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FlowEvent {
    /// User confirmed an amount
    Start(U256),
    /// About to hand `step` to the signer
    Sending(TxStep),
    /// Signer accepted `step`, transaction broadcast
    Submitted(TxStep, B256),
    /// `step` mined and succeeded
    Confirmed(TxStep),
    /// Submission or confirmation failed
    Failed(String),
    Reset,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Effect {
    None,
    Submit { step: TxStep, amount: U256 },
    /// Flow reached SUCCESS; run the completion callback
    Complete,
}

/// First line of a possibly multi-line diagnostic
pub fn first_line(message: &str) -> String {
    message.lines().next().unwrap_or("").trim_end().to_string()
}

/// Apply one event to a flow
pub fn transition(flow: TransactionFlow, event: FlowEvent) -> (TransactionFlow, Effect) {
    match event {
        FlowEvent::Start(amount) => start(flow, amount),
        FlowEvent::Sending(step) => sending(flow, step),
        FlowEvent::Submitted(step, hash) => submitted(flow, step, hash),
        FlowEvent::Confirmed(step) => confirmed(flow, step),
        FlowEvent::Failed(message) => failed(flow, &message),
        FlowEvent::Reset => reset(flow),
    }
}

fn start(mut f: TransactionFlow, amount: U256) -> (TransactionFlow, Effect) {
    if amount.is_zero() || !f.state.accepts_start() {
        return (f, Effect::None);
    }

    let step = match f.kind {
        FlowKind::Deposit => TxStep::Approve,
        FlowKind::Withdraw => TxStep::Withdraw,
    };

    f.amount = amount;
    f.last_error = None;
    f.tx_hashes.clear();
    f.state = step.pending_state();

    (f, Effect::Submit { step, amount })
}

fn sending(mut f: TransactionFlow, step: TxStep) -> (TransactionFlow, Effect) {
    // APPROVED is transient: handing the deposit to the signer supersedes it
    if step == TxStep::Deposit && f.state == FlowState::Approved {
        f.state = FlowState::Depositing;
    }
    (f, Effect::None)
}

fn submitted(mut f: TransactionFlow, step: TxStep, hash: B256) -> (TransactionFlow, Effect) {
    if f.state == step.pending_state() {
        // Full only if a step reports twice; the first hash wins
        let _ = f.tx_hashes.try_push(hash);
    }
    (f, Effect::None)
}

fn confirmed(mut f: TransactionFlow, step: TxStep) -> (TransactionFlow, Effect) {
    match (step, f.state) {
        (TxStep::Approve, FlowState::Approving) => {
            f.state = FlowState::Approved;
            let amount = f.amount;
            (f, Effect::Submit { step: TxStep::Deposit, amount })
        }
        (TxStep::Deposit, FlowState::Depositing) | (TxStep::Withdraw, FlowState::Withdrawing) => {
            f.state = FlowState::Success;
            (f, Effect::Complete)
        }
        _ => (f, Effect::None),
    }
}

fn failed(mut f: TransactionFlow, message: &str) -> (TransactionFlow, Effect) {
    if matches!(
        f.state,
        FlowState::Approving
            | FlowState::Approved
            | FlowState::Depositing
            | FlowState::Withdrawing
    ) {
        f.state = FlowState::Error;
        f.last_error = Some(first_line(message));
    }
    (f, Effect::None)
}

fn reset(f: TransactionFlow) -> (TransactionFlow, Effect) {
    // In-flight transactions cannot be recalled, so their tracking stays
    if f.is_in_flight() {
        return (f, Effect::None);
    }
    (TransactionFlow::new(f.kind), Effect::None)
}
