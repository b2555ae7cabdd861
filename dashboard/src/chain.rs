//! Chain client capability consumed by the cache and flow engine
//!
//! The concrete RPC/ABI layer lives behind [`ChainClient`]; everything in
//! this crate talks to typed calls instead of encoded calldata.

use alloy_primitives::{Address, B256, U256};
use futures::future::BoxFuture;
use thiserror::Error;
use vault_model::{ClaimReceipt, Policy, TxStep, VaultPolicy, VaultSnapshot};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("RPC request failed: {0}")]
    Rpc(String),

    /// Wallet refused to sign or the node refused the transaction
    #[error("{0}")]
    Rejected(String),

    #[error("Transaction {tx_hash} reverted: {reason}")]
    Reverted { tx_hash: B256, reason: String },

    #[error("Unexpected return value from {selector}: expected {expected}")]
    UnexpectedReturn {
        selector: &'static str,
        expected: &'static str,
    },

    #[error("Wallet not connected")]
    Disconnected,
}

/// Read-only contract call
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ReadCall {
    GetVaults { factory: Address },
    VaultInfo { vault: Address },
    BalanceOf { token: Address, owner: Address },
    MaxWithdraw { vault: Address, owner: Address },
    TotalPendingClaims { vault: Address },
    PreviewDeposit { vault: Address, assets: U256 },
    ConvertToAssets { vault: Address, shares: U256 },
    GetPolicyIds { vault: Address },
    GetVaultPolicy { vault: Address, policy_id: u64 },
    PolicyCount { registry: Address },
    GetPolicy { registry: Address, policy_id: u64 },
    NextReceiptId { receipts: Address },
    GetReceipt { receipts: Address, receipt_id: u64 },
}

impl ReadCall {
    pub fn target(&self) -> Address {
        match self {
            ReadCall::GetVaults { factory } => *factory,
            ReadCall::VaultInfo { vault }
            | ReadCall::MaxWithdraw { vault, .. }
            | ReadCall::TotalPendingClaims { vault }
            | ReadCall::PreviewDeposit { vault, .. }
            | ReadCall::ConvertToAssets { vault, .. }
            | ReadCall::GetPolicyIds { vault }
            | ReadCall::GetVaultPolicy { vault, .. } => *vault,
            ReadCall::BalanceOf { token, .. } => *token,
            ReadCall::PolicyCount { registry } | ReadCall::GetPolicy { registry, .. } => *registry,
            ReadCall::NextReceiptId { receipts } | ReadCall::GetReceipt { receipts, .. } => {
                *receipts
            }
        }
    }

    pub fn selector(&self) -> &'static str {
        match self {
            ReadCall::GetVaults { .. } => "getVaults",
            ReadCall::VaultInfo { .. } => "getVaultInfo",
            ReadCall::BalanceOf { .. } => "balanceOf",
            ReadCall::MaxWithdraw { .. } => "maxWithdraw",
            ReadCall::TotalPendingClaims { .. } => "totalPendingClaims",
            ReadCall::PreviewDeposit { .. } => "previewDeposit",
            ReadCall::ConvertToAssets { .. } => "convertToAssets",
            ReadCall::GetPolicyIds { .. } => "getPolicyIds",
            ReadCall::GetVaultPolicy { .. } => "getVaultPolicy",
            ReadCall::PolicyCount { .. } => "getPolicyCount",
            ReadCall::GetPolicy { .. } => "getPolicy",
            ReadCall::NextReceiptId { .. } => "nextReceiptId",
            ReadCall::GetReceipt { .. } => "getReceipt",
        }
    }
}

/// Decoded return value of a [`ReadCall`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadValue {
    Uint(U256),
    Addresses(Vec<Address>),
    Ids(Vec<u64>),
    VaultInfo(VaultSnapshot),
    VaultPolicy(VaultPolicy),
    Policy(Policy),
    Receipt(ClaimReceipt),
}

impl ReadValue {
    pub fn into_uint(self, selector: &'static str) -> Result<U256, ChainError> {
        match self {
            ReadValue::Uint(v) => Ok(v),
            _ => Err(ChainError::UnexpectedReturn { selector, expected: "uint256" }),
        }
    }

    pub fn into_addresses(self, selector: &'static str) -> Result<Vec<Address>, ChainError> {
        match self {
            ReadValue::Addresses(v) => Ok(v),
            _ => Err(ChainError::UnexpectedReturn { selector, expected: "address[]" }),
        }
    }

    pub fn into_vault_info(self, selector: &'static str) -> Result<VaultSnapshot, ChainError> {
        match self {
            ReadValue::VaultInfo(v) => Ok(v),
            _ => Err(ChainError::UnexpectedReturn { selector, expected: "VaultInfo" }),
        }
    }

    pub fn into_ids(self, selector: &'static str) -> Result<Vec<u64>, ChainError> {
        match self {
            ReadValue::Ids(v) => Ok(v),
            _ => Err(ChainError::UnexpectedReturn { selector, expected: "uint256[]" }),
        }
    }

    pub fn into_vault_policy(self, selector: &'static str) -> Result<VaultPolicy, ChainError> {
        match self {
            ReadValue::VaultPolicy(v) => Ok(v),
            _ => Err(ChainError::UnexpectedReturn { selector, expected: "VaultPolicy" }),
        }
    }

    pub fn into_policy(self, selector: &'static str) -> Result<Policy, ChainError> {
        match self {
            ReadValue::Policy(v) => Ok(v),
            _ => Err(ChainError::UnexpectedReturn { selector, expected: "Policy" }),
        }
    }

    pub fn into_receipt(self, selector: &'static str) -> Result<ClaimReceipt, ChainError> {
        match self {
            ReadValue::Receipt(v) => Ok(v),
            _ => Err(ChainError::UnexpectedReturn { selector, expected: "Receipt" }),
        }
    }
}

/// State-changing contract call, signed by the connected wallet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteCall {
    Approve { token: Address, spender: Address, amount: U256 },
    Deposit { vault: Address, assets: U256, receiver: Address },
    Withdraw { vault: Address, assets: U256, receiver: Address, owner: Address },
}

impl WriteCall {
    pub fn target(&self) -> Address {
        match self {
            WriteCall::Approve { token, .. } => *token,
            WriteCall::Deposit { vault, .. } | WriteCall::Withdraw { vault, .. } => *vault,
        }
    }

    pub fn step(&self) -> TxStep {
        match self {
            WriteCall::Approve { .. } => TxStep::Approve,
            WriteCall::Deposit { .. } => TxStep::Deposit,
            WriteCall::Withdraw { .. } => TxStep::Withdraw,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: B256,
    pub block_number: u64,
}

/// Connected wallet, read-only to this crate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Wallet {
    pub account: Option<Address>,
    pub chain_id: u64,
}

impl Wallet {
    pub fn is_connected(&self) -> bool {
        self.account.is_some()
    }
}

pub trait ChainClient: Send + Sync + 'static {
    fn read_contract(&self, call: ReadCall) -> BoxFuture<'_, Result<ReadValue, ChainError>>;

    /// All calls answered from the same chain state, in one request
    fn read_contracts(
        &self,
        calls: Vec<ReadCall>,
    ) -> BoxFuture<'_, Result<Vec<ReadValue>, ChainError>>;

    /// Sign and broadcast; resolves once the transaction has a hash
    fn write_contract(&self, call: WriteCall) -> BoxFuture<'_, Result<B256, ChainError>>;

    /// Resolves when the transaction is mined; a revert is an error
    fn wait_for_confirmation(&self, tx_hash: B256) -> BoxFuture<'_, Result<Receipt, ChainError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_mismatch() {
        let err = ReadValue::Uint(U256::from(1u64))
            .into_addresses("getVaults")
            .unwrap_err();
        assert_eq!(
            err,
            ChainError::UnexpectedReturn { selector: "getVaults", expected: "address[]" }
        );
    }

    #[test]
    fn test_call_targets() {
        let vault = Address::repeat_byte(1);
        let usdc = Address::repeat_byte(2);
        let registry = Address::repeat_byte(3);
        let call = ReadCall::BalanceOf { token: usdc, owner: vault };
        assert_eq!(call.target(), usdc);
        assert_eq!(call.selector(), "balanceOf");

        let call = ReadCall::GetPolicy { registry, policy_id: 4 };
        assert_eq!(call.target(), registry);
        assert_eq!(call.selector(), "getPolicy");

        let call = ReadCall::GetReceipt { receipts: registry, receipt_id: 0 };
        assert_eq!(call.target(), registry);

        let write = WriteCall::Withdraw {
            vault,
            assets: U256::from(5u64),
            receiver: usdc,
            owner: usdc,
        };
        assert_eq!(write.target(), vault);
        assert_eq!(write.step(), TxStep::Withdraw);
    }

    #[test]
    fn test_rejected_displays_message_verbatim() {
        let err = ChainError::Rejected("User rejected the request.\nDetails".into());
        assert_eq!(err.to_string(), "User rejected the request.\nDetails");
    }
}
