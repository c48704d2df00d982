//! Chain-specific types and error definitions.

use alloy::primitives::{Address, BlockHash, TxHash, U256};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

// Re-export BlockchainConfig from config module to avoid duplication
pub use crate::config::schema::BlockchainConfig;

/// Chain ID type for strong typing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainId(pub u64);

impl From<u64> for ChainId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<ChainId> for u64 {
    fn from(id: ChainId) -> Self {
        id.0
    }
}

/// Errors that can occur during blockchain operations.
#[derive(Debug, Clone, Error)]
pub enum BlockchainError {
    /// RPC connection or request failed.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// RPC request timed out.
    #[error("RPC timeout after {0:?}")]
    Timeout(Duration),

    /// The node answered with a JSON-RPC error (bad params, execution reverted, ...).
    #[error("RPC request rejected: {0}")]
    Rejected(String),

    /// The requested object does not exist on chain.
    #[error("{0} not found")]
    NotFound(String),

    /// Invalid private key format or derivation error.
    #[error("Wallet error: {0}")]
    Wallet(String),

    /// Gas price exceeded maximum allowed.
    #[error("Gas price {current_gwei} gwei exceeds maximum {max_gwei} gwei")]
    GasPriceTooHigh { current_gwei: u64, max_gwei: u64 },

    /// Chain configuration mismatch.
    #[error("Chain ID mismatch: expected {expected}, got {actual}")]
    ChainMismatch { expected: u64, actual: u64 },

    /// Blockchain client not initialized or disabled.
    #[error("Blockchain not available: {0}")]
    NotAvailable(String),
}

impl BlockchainError {
    /// Whether retrying the same call may succeed.
    ///
    /// Connection failures and timeouts are transient. Anything the node
    /// answered deliberately, or that our own guards refused, is permanent.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BlockchainError::Rpc(_) | BlockchainError::Timeout(_) | BlockchainError::NotAvailable(_)
        )
    }
}

/// Result type for blockchain operations.
pub type BlockchainResult<T> = Result<T, BlockchainError>;

/// A freshly generated externally-owned account.
///
/// The private key is handed to the caller exactly once, inside the
/// operation result. It is never logged.
#[derive(Clone, Serialize, Deserialize)]
pub struct NewWallet {
    pub address: Address,
    pub private_key: String,
}

impl std::fmt::Debug for NewWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewWallet")
            .field("address", &self.address)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Native-token transfer submitted from a node-managed account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub from: Address,
    pub to: Address,
    pub value_wei: U256,
    /// Client-supplied nonce. When present, resubmission is idempotent.
    pub nonce: Option<u64>,
}

/// Block header summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockSummary {
    pub number: u64,
    pub hash: BlockHash,
    pub parent_hash: BlockHash,
    pub timestamp: u64,
    pub gas_used: u64,
    pub gas_limit: u64,
    pub base_fee_per_gas: Option<u64>,
    pub transaction_count: usize,
}

/// Transaction summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSummary {
    pub hash: TxHash,
    pub from: Address,
    pub to: Option<Address>,
    pub value_wei: U256,
    pub nonce: u64,
    pub block_number: Option<u64>,
}

/// Receipt summary for a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptSummary {
    pub transaction_hash: TxHash,
    pub block_number: Option<u64>,
    pub success: bool,
    pub gas_used: u64,
    pub contract_address: Option<Address>,
}

/// Node and network identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInfo {
    pub chain_id: ChainId,
    pub syncing: bool,
    pub latest_block: u64,
}
