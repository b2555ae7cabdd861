//! Capital reconciliation: how much a user may safely withdraw
//!
//! The vault's `maxWithdraw` is bounded by its gross liquid balance, which
//! still contains unearned premium. Free capital is what remains of total
//! assets once capital deployed to policies and claims awaiting settlement
//! are set aside; the withdrawal ceiling shown to the user is the smaller
//! of the two.

use alloy_primitives::U256;

use crate::math::*;
use crate::state::{UserPosition, VaultSnapshot, VaultView};

/// Raw reads feeding the reconciliation, each `None` until loaded
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReconcileInputs {
    pub total_assets: Option<U256>,
    pub deployed_capital: Option<U256>,
    pub pending_claims: Option<U256>,
    pub raw_max_withdraw: Option<U256>,
}

impl ReconcileInputs {
    pub fn known(snapshot: &VaultSnapshot, position: &UserPosition) -> Self {
        Self {
            total_assets: Some(snapshot.total_assets),
            deployed_capital: Some(snapshot.deployed_capital),
            pending_claims: Some(position.pending_claims),
            raw_max_withdraw: Some(position.raw_max_withdraw),
        }
    }
}

impl From<&VaultView> for ReconcileInputs {
    fn from(view: &VaultView) -> Self {
        Self::known(&view.snapshot, &view.position)
    }
}

/// max(total_assets - deployed_capital - pending_claims, 0)
pub fn free_capital(total_assets: U256, deployed_capital: U256, pending_claims: U256) -> U256 {
    // A saturated sum still exceeds any representable total_assets
    let committed = add_u256(deployed_capital, pending_claims);
    sub_u256(total_assets, committed)
}

/// Effective withdrawal ceiling, or `None` while any input is unknown.
///
/// `None` must be treated as "withdrawal disabled", never as zero.
pub fn effective_max(inputs: ReconcileInputs) -> Option<U256> {
    let raw = inputs.raw_max_withdraw?;
    let free = free_capital(
        inputs.total_assets?,
        inputs.deployed_capital?,
        inputs.pending_claims?,
    );
    Some(min_u256(free, raw))
}

/// Effective ceiling for a snapshot/position pair that is fully loaded
pub fn effective_max_for(snapshot: &VaultSnapshot, position: &UserPosition) -> U256 {
    let free = free_capital(
        snapshot.total_assets,
        snapshot.deployed_capital,
        position.pending_claims,
    );
    min_u256(free, position.raw_max_withdraw)
}

/// Share price as USDC raw units per whole share (1_000_000 == $1.00).
///
/// total_assets * 10^12 / total_shares in dollar terms, kept in the
/// integer domain by scaling one more 10^6.
pub fn share_price_raw(total_assets: U256, total_shares: U256) -> U256 {
    if total_shares.is_zero() {
        return ONE_USDC;
    }
    mul_div(total_assets, ONE_SHARE, total_shares)
}

/// Shares minted for a deposit of `assets` at the current price
pub fn estimate_shares(assets: U256, total_assets: U256, total_shares: U256) -> U256 {
    if total_shares.is_zero() || total_assets.is_zero() {
        return mul_u256(assets, DECIMALS_OFFSET_SCALE);
    }
    mul_div(assets, total_shares, total_assets)
}

/// Assets redeemable for `shares` at the current price
pub fn estimate_assets(shares: U256, total_assets: U256, total_shares: U256) -> U256 {
    if total_shares.is_zero() {
        return div_u256(shares, DECIMALS_OFFSET_SCALE);
    }
    mul_div(shares, total_assets, total_shares)
}
