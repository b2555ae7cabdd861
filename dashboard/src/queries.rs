//! Read query catalogue
//!
//! A [`QueryKey`] names one logical read together with its parameters.
//! Parameters that may not be known yet (vault not selected, wallet not
//! connected) are `Option`s; a key with a missing or zero parameter is
//! disabled and never reaches the chain.

use alloy_primitives::{Address, U256};
use vault_model::math::{low_u64, ONE_SHARE};
use vault_model::{
    ClaimReceipt, Policy, PositionSummary, UserPosition, VaultPolicyEntry, VaultSnapshot,
    VaultView,
};

use crate::chain::{ChainClient, ChainError, ReadCall, ReadValue};

/// Most entries an enumerating read (policies, receipts) will batch
pub const MAX_ENUMERATED: u64 = 1_000;

/// Polling cadence of a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PollClass {
    /// Regular contract reads (10 s by default)
    Standard,
    /// Display tickers (1 s by default)
    Ticker,
    /// Fetched once after registration, never re-polled
    Once,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    VaultAddresses { factory: Address },
    VaultInfo { vault: Option<Address> },
    /// Info for several vaults, read in one batch
    MultiVaultInfo { vaults: Vec<Address> },
    UserShares { vault: Option<Address>, user: Option<Address> },
    MaxWithdraw { vault: Option<Address>, user: Option<Address> },
    UsdcBalance { usdc: Address, user: Option<Address> },
    /// Shares and their value across vaults, read in one batch
    UserPositions { vaults: Vec<Address>, user: Option<Address> },
    PendingClaims { vault: Option<Address> },
    /// Policies a vault is allocated to, joined with the registry
    VaultPolicies { vault: Option<Address>, registry: Address },
    PolicyCount { registry: Address },
    /// Every policy in the registry
    Policies { registry: Address },
    /// Every claim receipt issued so far
    ClaimReceipts { receipts: Address },
    /// Snapshot + position for one user, read in one batch
    VaultView { vault: Option<Address>, user: Option<Address> },
    PreviewDeposit { vault: Option<Address>, assets: U256 },
}

/// Cached value of a query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryValue {
    Uint(U256),
    Addresses(Vec<Address>),
    Vault(VaultSnapshot),
    Vaults(Vec<VaultSnapshot>),
    View(VaultView),
    Positions(Vec<PositionSummary>),
    VaultPolicies(Vec<VaultPolicyEntry>),
    Policies(Vec<Policy>),
    Receipts(Vec<ClaimReceipt>),
}

fn known(addr: Option<Address>) -> Option<Address> {
    addr.filter(|a| !a.is_zero())
}

impl QueryKey {
    pub fn poll_class(&self) -> PollClass {
        match self {
            QueryKey::PreviewDeposit { .. } => PollClass::Once,
            _ => PollClass::Standard,
        }
    }

    /// Whether the preconditions for issuing this read hold
    pub fn enabled(&self) -> bool {
        match self {
            QueryKey::VaultAddresses { factory } => !factory.is_zero(),
            QueryKey::VaultInfo { vault } | QueryKey::PendingClaims { vault } => {
                known(*vault).is_some()
            }
            QueryKey::MultiVaultInfo { vaults } => !vaults.is_empty(),
            QueryKey::UserShares { vault, user }
            | QueryKey::MaxWithdraw { vault, user }
            | QueryKey::VaultView { vault, user } => {
                known(*vault).is_some() && known(*user).is_some()
            }
            QueryKey::UsdcBalance { usdc, user } => !usdc.is_zero() && known(*user).is_some(),
            QueryKey::UserPositions { vaults, user } => {
                !vaults.is_empty() && known(*user).is_some()
            }
            QueryKey::VaultPolicies { vault, registry } => {
                known(*vault).is_some() && !registry.is_zero()
            }
            QueryKey::PolicyCount { registry } | QueryKey::Policies { registry } => {
                !registry.is_zero()
            }
            QueryKey::ClaimReceipts { receipts } => !receipts.is_zero(),
            QueryKey::PreviewDeposit { vault, assets } => {
                known(*vault).is_some() && !assets.is_zero()
            }
        }
    }

    /// Issue the read. Callers must check [`QueryKey::enabled`] first; a
    /// disabled key reports `Disconnected` here.
    pub async fn fetch<C: ChainClient + ?Sized>(&self, chain: &C) -> Result<QueryValue, ChainError> {
        if !self.enabled() {
            return Err(ChainError::Disconnected);
        }
        match self {
            QueryKey::VaultAddresses { factory } => {
                let call = ReadCall::GetVaults { factory: *factory };
                let value = chain.read_contract(call).await?;
                Ok(QueryValue::Addresses(value.into_addresses("getVaults")?))
            }
            QueryKey::VaultInfo { vault: Some(vault) } => {
                let value = chain.read_contract(ReadCall::VaultInfo { vault: *vault }).await?;
                Ok(QueryValue::Vault(value.into_vault_info("getVaultInfo")?))
            }
            QueryKey::MultiVaultInfo { vaults } => {
                let calls = vaults.iter().map(|v| ReadCall::VaultInfo { vault: *v }).collect();
                let values = chain.read_contracts(calls).await?;
                if values.len() != vaults.len() {
                    return Err(ChainError::UnexpectedReturn {
                        selector: "getVaultInfo",
                        expected: "one result per vault",
                    });
                }
                let snapshots = values
                    .into_iter()
                    .map(|v| v.into_vault_info("getVaultInfo"))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(QueryValue::Vaults(snapshots))
            }
            QueryKey::UserShares { vault: Some(vault), user: Some(user) } => {
                let call = ReadCall::BalanceOf { token: *vault, owner: *user };
                Ok(QueryValue::Uint(chain.read_contract(call).await?.into_uint("balanceOf")?))
            }
            QueryKey::MaxWithdraw { vault: Some(vault), user: Some(user) } => {
                let call = ReadCall::MaxWithdraw { vault: *vault, owner: *user };
                Ok(QueryValue::Uint(chain.read_contract(call).await?.into_uint("maxWithdraw")?))
            }
            QueryKey::UsdcBalance { usdc, user: Some(user) } => {
                let call = ReadCall::BalanceOf { token: *usdc, owner: *user };
                Ok(QueryValue::Uint(chain.read_contract(call).await?.into_uint("balanceOf")?))
            }
            QueryKey::UserPositions { vaults, user: Some(user) } => {
                fetch_positions(chain, vaults, *user).await.map(QueryValue::Positions)
            }
            QueryKey::VaultPolicies { vault: Some(vault), registry } => {
                fetch_vault_policies(chain, *vault, *registry)
                    .await
                    .map(QueryValue::VaultPolicies)
            }
            QueryKey::PolicyCount { registry } => {
                let call = ReadCall::PolicyCount { registry: *registry };
                Ok(QueryValue::Uint(chain.read_contract(call).await?.into_uint("getPolicyCount")?))
            }
            QueryKey::Policies { registry } => {
                fetch_policies(chain, *registry).await.map(QueryValue::Policies)
            }
            QueryKey::ClaimReceipts { receipts } => {
                fetch_receipts(chain, *receipts).await.map(QueryValue::Receipts)
            }
            QueryKey::PendingClaims { vault: Some(vault) } => {
                let call = ReadCall::TotalPendingClaims { vault: *vault };
                let value = chain.read_contract(call).await?;
                Ok(QueryValue::Uint(value.into_uint("totalPendingClaims")?))
            }
            QueryKey::VaultView { vault: Some(vault), user: Some(user) } => {
                fetch_view(chain, *vault, *user).await.map(QueryValue::View)
            }
            QueryKey::PreviewDeposit { vault: Some(vault), assets } => {
                let call = ReadCall::PreviewDeposit { vault: *vault, assets: *assets };
                let value = chain.read_contract(call).await?;
                Ok(QueryValue::Uint(value.into_uint("previewDeposit")?))
            }
            _ => Err(ChainError::Disconnected),
        }
    }
}

async fn fetch_view<C: ChainClient + ?Sized>(
    chain: &C,
    vault: Address,
    user: Address,
) -> Result<VaultView, ChainError> {
    let calls = vec![
        ReadCall::VaultInfo { vault },
        ReadCall::BalanceOf { token: vault, owner: user },
        ReadCall::MaxWithdraw { vault, owner: user },
        ReadCall::TotalPendingClaims { vault },
    ];
    let mut values = chain.read_contracts(calls).await?.into_iter();
    let mut next = || {
        values.next().ok_or(ChainError::UnexpectedReturn {
            selector: "getVaultInfo",
            expected: "four batched results",
        })
    };

    let snapshot = next()?.into_vault_info("getVaultInfo")?;
    let share_balance = next()?.into_uint("balanceOf")?;
    let raw_max_withdraw = next()?.into_uint("maxWithdraw")?;
    let pending_claims = next()?.into_uint("totalPendingClaims")?;

    Ok(VaultView {
        vault,
        snapshot,
        position: UserPosition {
            share_balance,
            raw_max_withdraw,
            pending_claims,
        },
    })
}

/// One batch, with exactly one result per call
async fn batch<C: ChainClient + ?Sized>(
    chain: &C,
    calls: Vec<ReadCall>,
    selector: &'static str,
) -> Result<Vec<ReadValue>, ChainError> {
    let expected = calls.len();
    if expected == 0 {
        return Ok(Vec::new());
    }
    let values = chain.read_contracts(calls).await?;
    if values.len() != expected {
        return Err(ChainError::UnexpectedReturn {
            selector,
            expected: "one result per call",
        });
    }
    Ok(values)
}

/// Entry count reported by a registry, bounded before it sizes a batch
fn enumerated(count: U256, selector: &'static str) -> Result<u64, ChainError> {
    if count > U256::from(MAX_ENUMERATED) {
        return Err(ChainError::UnexpectedReturn {
            selector,
            expected: "a bounded entry count",
        });
    }
    Ok(low_u64(count))
}

async fn fetch_positions<C: ChainClient + ?Sized>(
    chain: &C,
    vaults: &[Address],
    user: Address,
) -> Result<Vec<PositionSummary>, ChainError> {
    let calls = vaults
        .iter()
        .flat_map(|&vault| {
            [
                ReadCall::BalanceOf { token: vault, owner: user },
                ReadCall::ConvertToAssets { vault, shares: ONE_SHARE },
            ]
        })
        .collect();
    let mut values = batch(chain, calls, "balanceOf").await?.into_iter();

    let mut rows = Vec::with_capacity(vaults.len());
    for &vault in vaults {
        let (Some(shares), Some(price)) = (values.next(), values.next()) else {
            break;
        };
        let shares = shares.into_uint("balanceOf")?;
        let price = price.into_uint("convertToAssets")?;
        rows.push(PositionSummary::priced(vault, shares, price));
    }
    Ok(rows)
}

async fn fetch_vault_policies<C: ChainClient + ?Sized>(
    chain: &C,
    vault: Address,
    registry: Address,
) -> Result<Vec<VaultPolicyEntry>, ChainError> {
    let ids = chain
        .read_contract(ReadCall::GetPolicyIds { vault })
        .await?
        .into_ids("getPolicyIds")?;

    // Vault allocations first, then the registry rows, in id order
    let calls = ids
        .iter()
        .map(|&policy_id| ReadCall::GetVaultPolicy { vault, policy_id })
        .chain(ids.iter().map(|&policy_id| ReadCall::GetPolicy { registry, policy_id }))
        .collect();
    let values = batch(chain, calls, "getVaultPolicy").await?;
    let (allocations, globals) = values.split_at(ids.len());

    ids.iter()
        .zip(allocations.iter().zip(globals))
        .map(|(&policy_id, (allocation, global))| {
            Ok(VaultPolicyEntry {
                policy_id,
                vault: allocation.clone().into_vault_policy("getVaultPolicy")?,
                global: global.clone().into_policy("getPolicy")?,
            })
        })
        .collect()
}

async fn fetch_policies<C: ChainClient + ?Sized>(
    chain: &C,
    registry: Address,
) -> Result<Vec<Policy>, ChainError> {
    let count = chain
        .read_contract(ReadCall::PolicyCount { registry })
        .await?
        .into_uint("getPolicyCount")?;
    let calls = (0..enumerated(count, "getPolicyCount")?)
        .map(|policy_id| ReadCall::GetPolicy { registry, policy_id })
        .collect();
    batch(chain, calls, "getPolicy")
        .await?
        .into_iter()
        .map(|v| v.into_policy("getPolicy"))
        .collect()
}

async fn fetch_receipts<C: ChainClient + ?Sized>(
    chain: &C,
    receipts: Address,
) -> Result<Vec<ClaimReceipt>, ChainError> {
    let next = chain
        .read_contract(ReadCall::NextReceiptId { receipts })
        .await?
        .into_uint("nextReceiptId")?;
    let calls = (0..enumerated(next, "nextReceiptId")?)
        .map(|receipt_id| ReadCall::GetReceipt { receipts, receipt_id })
        .collect();
    batch(chain, calls, "getReceipt")
        .await?
        .into_iter()
        .map(|v| v.into_receipt("getReceipt"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::B256;
    use futures::future::{BoxFuture, FutureExt};

    use crate::chain::{Receipt, WriteCall};

    /// Answers every single read with the same count; batches fail
    struct CountOnly(U256);

    impl ChainClient for CountOnly {
        fn read_contract(&self, _: ReadCall) -> BoxFuture<'_, Result<ReadValue, ChainError>> {
            let count = self.0;
            async move { Ok(ReadValue::Uint(count)) }.boxed()
        }

        fn read_contracts(
            &self,
            _: Vec<ReadCall>,
        ) -> BoxFuture<'_, Result<Vec<ReadValue>, ChainError>> {
            async { Err(ChainError::Rpc("batch not expected".to_string())) }.boxed()
        }

        fn write_contract(&self, _: WriteCall) -> BoxFuture<'_, Result<B256, ChainError>> {
            async { Err(ChainError::Disconnected) }.boxed()
        }

        fn wait_for_confirmation(&self, _: B256) -> BoxFuture<'_, Result<Receipt, ChainError>> {
            async { Err(ChainError::Disconnected) }.boxed()
        }
    }

    #[test]
    fn test_enabled_predicates() {
        let vault = Some(Address::repeat_byte(1));
        let user = Some(Address::repeat_byte(2));
        let usdc = Address::repeat_byte(3);

        assert!(!QueryKey::VaultAddresses { factory: Address::ZERO }.enabled());
        assert!(!QueryKey::VaultInfo { vault: None }.enabled());
        assert!(!QueryKey::VaultInfo { vault: Some(Address::ZERO) }.enabled());
        assert!(QueryKey::VaultInfo { vault }.enabled());
        assert!(!QueryKey::VaultView { vault, user: None }.enabled());
        assert!(QueryKey::VaultView { vault, user }.enabled());
        assert!(!QueryKey::UsdcBalance { usdc: Address::ZERO, user }.enabled());
        assert!(QueryKey::UsdcBalance { usdc, user }.enabled());
        assert!(!QueryKey::UserPositions { vaults: vec![], user }.enabled());
        assert!(!QueryKey::UserPositions { vaults: vec![Address::repeat_byte(1)], user: None }
            .enabled());
        assert!(!QueryKey::VaultPolicies { vault, registry: Address::ZERO }.enabled());
        assert!(!QueryKey::VaultPolicies { vault: None, registry: usdc }.enabled());
        assert!(QueryKey::VaultPolicies { vault, registry: usdc }.enabled());
        assert!(!QueryKey::Policies { registry: Address::ZERO }.enabled());
        assert!(!QueryKey::PolicyCount { registry: Address::ZERO }.enabled());
        assert!(!QueryKey::ClaimReceipts { receipts: Address::ZERO }.enabled());
        assert!(QueryKey::ClaimReceipts { receipts: usdc }.enabled());
        assert!(!QueryKey::MultiVaultInfo { vaults: vec![] }.enabled());
        assert!(!QueryKey::PreviewDeposit { vault, assets: U256::ZERO }.enabled());
    }

    #[test]
    fn test_poll_classes() {
        let preview = QueryKey::PreviewDeposit { vault: None, assets: U256::from(1u64) };
        assert_eq!(preview.poll_class(), PollClass::Once);
        assert_eq!(QueryKey::PendingClaims { vault: None }.poll_class(), PollClass::Standard);
    }

    #[tokio::test]
    async fn test_oversized_registry_is_not_batched() {
        let registry = Address::repeat_byte(3);
        let chain = CountOnly(U256::from(MAX_ENUMERATED + 1));
        let err = QueryKey::Policies { registry }.fetch(&chain).await.unwrap_err();
        assert_eq!(
            err,
            ChainError::UnexpectedReturn {
                selector: "getPolicyCount",
                expected: "a bounded entry count",
            }
        );

        let empty = CountOnly(U256::ZERO);
        let receipts = QueryKey::ClaimReceipts { receipts: registry }.fetch(&empty).await;
        assert_eq!(receipts, Ok(QueryValue::Receipts(vec![])));
    }
}
