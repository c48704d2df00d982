//! Operation envelope and wire format.

use alloy::primitives::{Address, TxHash, U256};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use uuid::Uuid;

use crate::blockchain::types::Transfer;
use crate::cache::CacheKey;
use crate::queue::Topic;

/// Globally unique operation identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(Uuid);

impl OperationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for OperationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// The fixed set of operations the gateway executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationKind {
    CreateWallet,
    GetBalance,
    SendFunds,
    GetTransactionHistory,
    GetTransactionCount,
    GetGasPrice,
    GetLatestBlock,
    GetBlock,
    GetTransaction,
    GetTransactionReceipt,
    EstimateGas,
    GetNetworkInfo,
}

impl OperationKind {
    pub const ALL: [OperationKind; 12] = [
        OperationKind::CreateWallet,
        OperationKind::GetBalance,
        OperationKind::SendFunds,
        OperationKind::GetTransactionHistory,
        OperationKind::GetTransactionCount,
        OperationKind::GetGasPrice,
        OperationKind::GetLatestBlock,
        OperationKind::GetBlock,
        OperationKind::GetTransaction,
        OperationKind::GetTransactionReceipt,
        OperationKind::EstimateGas,
        OperationKind::GetNetworkInfo,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::CreateWallet => "CREATE_WALLET",
            OperationKind::GetBalance => "GET_BALANCE",
            OperationKind::SendFunds => "SEND_FUNDS",
            OperationKind::GetTransactionHistory => "GET_TRANSACTION_HISTORY",
            OperationKind::GetTransactionCount => "GET_TRANSACTION_COUNT",
            OperationKind::GetGasPrice => "GET_GAS_PRICE",
            OperationKind::GetLatestBlock => "GET_LATEST_BLOCK",
            OperationKind::GetBlock => "GET_BLOCK",
            OperationKind::GetTransaction => "GET_TRANSACTION",
            OperationKind::GetTransactionReceipt => "GET_TRANSACTION_RECEIPT",
            OperationKind::EstimateGas => "ESTIMATE_GAS",
            OperationKind::GetNetworkInfo => "GET_NETWORK_INFO",
        }
    }

    /// Queue topic this kind is published on.
    ///
    /// Wallet management and chain reads use separate topics so a burst of
    /// one cannot starve the other.
    pub fn topic(self) -> Topic {
        match self {
            OperationKind::CreateWallet
            | OperationKind::SendFunds
            | OperationKind::GetTransactionHistory => Topic::WalletOperations,
            _ => Topic::ChainReads,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown operation kind '{0}'")]
pub struct UnknownKind(pub String);

impl FromStr for OperationKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase().replace('-', "_");
        OperationKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == wanted)
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

/// Kind-specific, already validated parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "params", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationRequest {
    CreateWallet,
    GetBalance { address: Address },
    SendFunds(Transfer),
    GetTransactionHistory { address: Address },
    GetTransactionCount { address: Address },
    GetGasPrice,
    GetLatestBlock,
    GetBlock { number: u64 },
    GetTransaction { hash: TxHash },
    GetTransactionReceipt { hash: TxHash },
    EstimateGas { from: Address, to: Address, value_wei: U256 },
    GetNetworkInfo,
}

impl OperationRequest {
    pub fn kind(&self) -> OperationKind {
        match self {
            OperationRequest::CreateWallet => OperationKind::CreateWallet,
            OperationRequest::GetBalance { .. } => OperationKind::GetBalance,
            OperationRequest::SendFunds(_) => OperationKind::SendFunds,
            OperationRequest::GetTransactionHistory { .. } => OperationKind::GetTransactionHistory,
            OperationRequest::GetTransactionCount { .. } => OperationKind::GetTransactionCount,
            OperationRequest::GetGasPrice => OperationKind::GetGasPrice,
            OperationRequest::GetLatestBlock => OperationKind::GetLatestBlock,
            OperationRequest::GetBlock { .. } => OperationKind::GetBlock,
            OperationRequest::GetTransaction { .. } => OperationKind::GetTransaction,
            OperationRequest::GetTransactionReceipt { .. } => OperationKind::GetTransactionReceipt,
            OperationRequest::EstimateGas { .. } => OperationKind::EstimateGas,
            OperationRequest::GetNetworkInfo => OperationKind::GetNetworkInfo,
        }
    }

    /// Cache key built from canonicalized parameters.
    ///
    /// `None` for kinds whose results must never be shared between callers.
    pub fn cache_key(&self) -> Option<CacheKey> {
        let params = match self {
            OperationRequest::CreateWallet | OperationRequest::SendFunds(_) => return None,
            OperationRequest::GetBalance { address }
            | OperationRequest::GetTransactionHistory { address }
            | OperationRequest::GetTransactionCount { address } => canonical_address(address),
            OperationRequest::GetGasPrice
            | OperationRequest::GetLatestBlock
            | OperationRequest::GetNetworkInfo => String::new(),
            OperationRequest::GetBlock { number } => number.to_string(),
            OperationRequest::GetTransaction { hash }
            | OperationRequest::GetTransactionReceipt { hash } => alloy::hex::encode_prefixed(hash),
            OperationRequest::EstimateGas { from, to, value_wei } => format!(
                "{}|{}|{}",
                canonical_address(from),
                canonical_address(to),
                value_wei
            ),
        };
        Some(CacheKey::new(self.kind(), params))
    }
}

fn canonical_address(address: &Address) -> String {
    alloy::hex::encode_prefixed(address)
}

/// A request envelope tracked end-to-end by its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub id: OperationId,
    pub request: OperationRequest,
    pub submitted_at_ms: u64,
}

/// Queue payload layout: `{"id", "kind", "params", "submitted_at_ms"}`.
#[derive(Debug, Serialize, Deserialize)]
struct WireOperation {
    id: OperationId,
    kind: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    params: Value,
    #[serde(default)]
    submitted_at_ms: u64,
}

/// Errors raised while decoding a queue payload.
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    /// Not even an id could be recovered.
    #[error("malformed operation payload: {0}")]
    Malformed(String),

    #[error("operation {id}: unknown operation kind '{kind}'")]
    UnknownKind { id: OperationId, kind: String },

    #[error("operation {id}: invalid {kind} parameters: {reason}")]
    InvalidParams {
        id: OperationId,
        kind: OperationKind,
        reason: String,
    },
}

impl DecodeError {
    /// Id of the operation the payload belonged to, when recoverable.
    pub fn operation_id(&self) -> Option<OperationId> {
        match self {
            DecodeError::Malformed(_) => None,
            DecodeError::UnknownKind { id, .. } | DecodeError::InvalidParams { id, .. } => Some(*id),
        }
    }
}

impl Operation {
    pub fn new(request: OperationRequest) -> Self {
        let submitted_at_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        Self {
            id: OperationId::new(),
            request,
            submitted_at_ms,
        }
    }

    pub fn kind(&self) -> OperationKind {
        self.request.kind()
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        let params = match serde_json::to_value(&self.request)? {
            Value::Object(mut tagged) => tagged.remove("params").unwrap_or(Value::Null),
            _ => Value::Null,
        };
        serde_json::to_vec(&WireOperation {
            id: self.id,
            kind: self.kind().as_str().to_string(),
            params,
            submitted_at_ms: self.submitted_at_ms,
        })
    }

    /// Decode in two phases so an unknown kind still yields the id.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let wire: WireOperation =
            serde_json::from_slice(payload).map_err(|e| DecodeError::Malformed(e.to_string()))?;

        let kind: OperationKind = wire.kind.parse().map_err(|_| DecodeError::UnknownKind {
            id: wire.id,
            kind: wire.kind.clone(),
        })?;

        let mut tagged = Map::new();
        tagged.insert("kind".to_string(), Value::String(kind.as_str().to_string()));
        if !wire.params.is_null() {
            tagged.insert("params".to_string(), wire.params);
        }
        let request: OperationRequest =
            serde_json::from_value(Value::Object(tagged)).map_err(|e| DecodeError::InvalidParams {
                id: wire.id,
                kind,
                reason: e.to_string(),
            })?;

        Ok(Self {
            id: wire.id,
            request,
            submitted_at_ms: wire.submitted_at_ms,
        })
    }
}
