//! Input checks and invariant helpers

use alloy_primitives::U256;

use crate::state::*;
use crate::transitions::{FlowEvent, TxStep};

/// Why an action button is (or is not) available
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AmountCheck {
    /// A flow is in flight
    Busy,
    /// Previous flow succeeded and has not been reset
    AwaitingReset,
    /// Zero or unparsable amount
    Empty,
    /// Ceiling not loaded yet
    CeilingUnknown,
    ExceedsCeiling,
    Ready,
}

impl AmountCheck {
    pub fn is_ready(self) -> bool {
        self == AmountCheck::Ready
    }
}

/// Client-side bounds check run before any submission.
///
/// `ceiling` is the USDC balance for deposits and the effective withdraw
/// limit for withdrawals. An unknown ceiling disables the action instead of
/// reading as zero.
pub fn check_amount(flow: &TransactionFlow, amount: U256, ceiling: Option<U256>) -> AmountCheck {
    if flow.is_in_flight() {
        return AmountCheck::Busy;
    }
    if !flow.state.accepts_start() {
        return AmountCheck::AwaitingReset;
    }
    if amount.is_zero() {
        return AmountCheck::Empty;
    }
    match ceiling {
        None => AmountCheck::CeilingUnknown,
        Some(max) if amount > max => AmountCheck::ExceedsCeiling,
        Some(_) => AmountCheck::Ready,
    }
}

/// Known zero ceiling: nothing can leave the vault right now
pub fn no_buffer_available(effective_max: Option<U256>) -> bool {
    effective_max == Some(U256::ZERO)
}

/// effective <= raw, checked against the reads it came from
pub fn within_raw_max(effective: U256, raw_max_withdraw: U256) -> bool {
    effective <= raw_max_withdraw
}

/// Every deposit hand-off in `events` comes after an approval confirmation
/// observed since the most recent start.
pub fn deposit_follows_approval(events: &[FlowEvent]) -> bool {
    let mut approved = false;
    for event in events {
        match event {
            FlowEvent::Start(_) => approved = false,
            FlowEvent::Confirmed(TxStep::Approve) => approved = true,
            FlowEvent::Sending(TxStep::Deposit) | FlowEvent::Submitted(TxStep::Deposit, _) => {
                if !approved {
                    return false;
                }
            }
            _ => {}
        }
    }
    true
}
