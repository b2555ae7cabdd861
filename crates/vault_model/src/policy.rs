//! Policy registry, per-vault policy allocations and claim receipts

use alloy_primitives::{Address, U256};

use crate::math::*;

/// Registry-level lifecycle of a policy
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PolicyStatus {
    Registered,
    Active,
    Claimed,
    Expired,
}

impl PolicyStatus {
    /// Decode the registry's enum; unknown codes read as `Registered`
    pub fn from_code(code: u8) -> Self {
        match code {
            1 => PolicyStatus::Active,
            2 => PolicyStatus::Claimed,
            3 => PolicyStatus::Expired,
            _ => PolicyStatus::Registered,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            PolicyStatus::Registered => 0,
            PolicyStatus::Active => 1,
            PolicyStatus::Claimed => 2,
            PolicyStatus::Expired => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PolicyStatus::Registered => "Registered",
            PolicyStatus::Active => "Active",
            PolicyStatus::Claimed => "Claimed",
            PolicyStatus::Expired => "Expired",
        }
    }
}

/// `PolicyRegistry.getPolicy(id)`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Policy {
    pub id: u64,
    pub name: String,
    /// Raw verification type code, carried through for display
    pub verification_type: u8,
    pub coverage_amount: U256,
    pub premium_amount: U256,
    /// Seconds
    pub duration: u64,
    pub start_time: u64,
    pub insurer: Address,
    pub trigger_threshold: U256,
    pub status: PolicyStatus,
}

/// `InsuranceVault.getVaultPolicy(id)`: the vault's share of one policy
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VaultPolicy {
    /// Basis points of the vault's deployed capital
    pub allocation_weight: u16,
    pub premium: U256,
    pub earned_premium: U256,
    pub coverage: U256,
    pub duration: u64,
    pub start_time: u64,
    pub time_remaining: u64,
    pub claimed: bool,
    pub expired: bool,
}

/// Registry policy joined with the vault's allocation to it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VaultPolicyEntry {
    pub policy_id: u64,
    pub global: Policy,
    pub vault: VaultPolicy,
}

impl VaultPolicyEntry {
    /// Vault-level claimed/expired flags win over the registry status
    pub fn effective_status(&self) -> PolicyStatus {
        if self.vault.claimed {
            PolicyStatus::Claimed
        } else if self.vault.expired {
            PolicyStatus::Expired
        } else {
            self.global.status
        }
    }

    /// Premium still to be earned by the vault
    pub fn unearned_premium(&self) -> U256 {
        sub_u256(self.vault.premium, self.vault.earned_premium)
    }
}

/// `ClaimReceipt.getReceipt(id)`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClaimReceipt {
    pub receipt_id: u64,
    pub policy_id: u64,
    pub claim_amount: U256,
    pub vault: Address,
    pub insurer: Address,
    pub timestamp: u64,
    pub exercised: bool,
}

/// One row of a user's portfolio
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PositionSummary {
    pub vault: Address,
    pub shares: U256,
    /// Assets the shares convert to at the quoted price
    pub assets: U256,
}

impl PositionSummary {
    /// Value `shares` at `assets_per_share`, the vault's
    /// `convertToAssets(10^18)` quote
    pub fn priced(vault: Address, shares: U256, assets_per_share: U256) -> Self {
        Self {
            vault,
            shares,
            assets: mul_div(shares, assets_per_share, ONE_SHARE),
        }
    }
}

/// Claims awaiting settlement: receipts not exercised yet
pub fn outstanding_claims(receipts: &[ClaimReceipt]) -> U256 {
    receipts
        .iter()
        .filter(|r| !r.exercised)
        .fold(U256::ZERO, |acc, r| add_u256(acc, r.claim_amount))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(status: PolicyStatus) -> Policy {
        Policy {
            id: 0,
            name: "Flight delay BA-117".to_string(),
            verification_type: 1,
            coverage_amount: U256::from(50_000_000_000u64),
            premium_amount: U256::from(2_500_000_000u64),
            duration: 30 * 86_400,
            start_time: 1_700_000_000,
            insurer: Address::repeat_byte(9),
            trigger_threshold: U256::from(180u64),
            status,
        }
    }

    #[test]
    fn test_status_codes() {
        for status in [
            PolicyStatus::Registered,
            PolicyStatus::Active,
            PolicyStatus::Claimed,
            PolicyStatus::Expired,
        ] {
            assert_eq!(PolicyStatus::from_code(status.code()), status);
        }
        assert_eq!(PolicyStatus::from_code(42), PolicyStatus::Registered);
    }

    #[test]
    fn test_vault_flags_override_registry_status() {
        let mut entry = VaultPolicyEntry {
            policy_id: 0,
            global: policy(PolicyStatus::Active),
            vault: VaultPolicy::default(),
        };
        assert_eq!(entry.effective_status(), PolicyStatus::Active);

        entry.vault.expired = true;
        assert_eq!(entry.effective_status(), PolicyStatus::Expired);

        entry.vault.claimed = true;
        assert_eq!(entry.effective_status(), PolicyStatus::Claimed);
    }

    #[test]
    fn test_unearned_premium_never_negative() {
        let mut entry = VaultPolicyEntry {
            policy_id: 0,
            global: policy(PolicyStatus::Active),
            vault: VaultPolicy {
                premium: U256::from(1_000u64),
                earned_premium: U256::from(400u64),
                ..VaultPolicy::default()
            },
        };
        assert_eq!(entry.unearned_premium(), U256::from(600u64));

        entry.vault.earned_premium = U256::from(2_000u64);
        assert_eq!(entry.unearned_premium(), U256::ZERO);
    }

    #[test]
    fn test_position_priced_at_quote() {
        // 150 shares at $1.02
        let shares = mul_u256(U256::from(150u64), ONE_SHARE);
        let row = PositionSummary::priced(Address::ZERO, shares, U256::from(1_020_000u64));
        assert_eq!(row.assets, U256::from(153_000_000u64));
    }

    #[test]
    fn test_outstanding_claims() {
        let receipt = |id, amount: u64, exercised| ClaimReceipt {
            receipt_id: id,
            policy_id: id,
            claim_amount: U256::from(amount),
            vault: Address::ZERO,
            insurer: Address::ZERO,
            timestamp: 0,
            exercised,
        };
        let receipts = [receipt(0, 100, true), receipt(1, 250, false), receipt(2, 50, false)];
        assert_eq!(outstanding_claims(&receipts), U256::from(300u64));
        assert_eq!(outstanding_claims(&[]), U256::ZERO);
    }
}
