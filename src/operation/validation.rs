//! Submission parameter validation.
//!
//! Malformed parameters are rejected here, before anything is enqueued,
//! so they never reach a worker.

use alloy::primitives::utils::parse_ether;
use alloy::primitives::{Address, TxHash, U256};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use thiserror::Error;

use crate::blockchain::types::Transfer;
use crate::operation::types::{OperationKind, OperationRequest};

static ADDRESS_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("address pattern compiles"));

static TX_HASH_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0x[0-9a-fA-F]{64}$").expect("tx hash pattern compiles"));

/// Raw parameters as they arrive from the submission edge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmitParams {
    /// Subject address; the sender for transfers and gas estimates.
    #[serde(alias = "from")]
    pub address: Option<String>,
    /// Destination address.
    #[serde(alias = "to_address")]
    pub to: Option<String>,
    /// Amount in ETH as a decimal string.
    #[serde(alias = "value")]
    pub amount: Option<String>,
    pub block_number: Option<u64>,
    #[serde(alias = "hash")]
    pub tx_hash: Option<String>,
    /// Client-supplied nonce for transfers.
    pub nonce: Option<u64>,
}

/// Why a submission was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidRequest {
    #[error("unknown operation kind '{0}'")]
    UnknownKind(String),

    #[error("missing required parameter '{0}'")]
    MissingField(&'static str),

    #[error("parameter '{field}' is not a valid address: '{value}'")]
    InvalidAddress { field: &'static str, value: String },

    #[error("'{0}' is not a valid transaction hash")]
    InvalidTxHash(String),

    #[error("invalid amount '{value}': {reason}")]
    InvalidAmount { value: String, reason: String },
}

/// Parse a `0x`-prefixed, 40-hex-digit address.
pub fn parse_address(field: &'static str, value: &str) -> Result<Address, InvalidRequest> {
    let invalid = || InvalidRequest::InvalidAddress {
        field,
        value: value.to_string(),
    };
    if !ADDRESS_PATTERN.is_match(value) {
        return Err(invalid());
    }
    value.parse().map_err(|_| invalid())
}

/// Parse a `0x`-prefixed, 64-hex-digit transaction hash.
pub fn parse_tx_hash(value: &str) -> Result<TxHash, InvalidRequest> {
    if !TX_HASH_PATTERN.is_match(value) {
        return Err(InvalidRequest::InvalidTxHash(value.to_string()));
    }
    value
        .parse()
        .map_err(|_| InvalidRequest::InvalidTxHash(value.to_string()))
}

/// Parse a decimal ETH amount into wei.
pub fn parse_amount(value: &str) -> Result<U256, InvalidRequest> {
    let wei = parse_ether(value.trim()).map_err(|e| InvalidRequest::InvalidAmount {
        value: value.to_string(),
        reason: e.to_string(),
    })?;
    if wei.is_zero() {
        return Err(InvalidRequest::InvalidAmount {
            value: value.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(wei)
}

fn required<'a>(field: &'static str, value: &'a Option<String>) -> Result<&'a str, InvalidRequest> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(InvalidRequest::MissingField(field))
}

/// Build a validated request for `kind` from raw parameters.
pub fn build_request(kind: OperationKind, params: &SubmitParams) -> Result<OperationRequest, InvalidRequest> {
    let address = || parse_address("address", required("address", &params.address)?);
    let to = || parse_address("to", required("to", &params.to)?);
    let amount = || parse_amount(required("amount", &params.amount)?);
    let hash = || parse_tx_hash(required("tx_hash", &params.tx_hash)?);

    let request = match kind {
        OperationKind::CreateWallet => OperationRequest::CreateWallet,
        OperationKind::GetBalance => OperationRequest::GetBalance { address: address()? },
        OperationKind::SendFunds => OperationRequest::SendFunds(Transfer {
            from: address()?,
            to: to()?,
            value_wei: amount()?,
            nonce: params.nonce,
        }),
        OperationKind::GetTransactionHistory => {
            OperationRequest::GetTransactionHistory { address: address()? }
        }
        OperationKind::GetTransactionCount => {
            OperationRequest::GetTransactionCount { address: address()? }
        }
        OperationKind::GetGasPrice => OperationRequest::GetGasPrice,
        OperationKind::GetLatestBlock => OperationRequest::GetLatestBlock,
        OperationKind::GetBlock => OperationRequest::GetBlock {
            number: params
                .block_number
                .ok_or(InvalidRequest::MissingField("block_number"))?,
        },
        OperationKind::GetTransaction => OperationRequest::GetTransaction { hash: hash()? },
        OperationKind::GetTransactionReceipt => {
            OperationRequest::GetTransactionReceipt { hash: hash()? }
        }
        OperationKind::EstimateGas => OperationRequest::EstimateGas {
            from: address()?,
            to: to()?,
            value_wei: amount()?,
        },
        OperationKind::GetNetworkInfo => OperationRequest::GetNetworkInfo,
    };
    Ok(request)
}

/// Same as [`build_request`] with the kind given by name.
pub fn build_request_named(kind: &str, params: &SubmitParams) -> Result<OperationRequest, InvalidRequest> {
    let kind: OperationKind = kind
        .parse()
        .map_err(|_| InvalidRequest::UnknownKind(kind.to_string()))?;
    build_request(kind, params)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR: &str = "0xabababababababababababababababababababab";
    const OTHER: &str = "0xcdcdcdcdcdcdcdcdcdcdcdcdcdcdcdcdcdcdcdcd";

    #[test]
    fn test_address_pattern() {
        assert!(parse_address("address", ADDR).is_ok());
        // Missing prefix
        assert!(parse_address("address", &ADDR[2..]).is_err());
        // Too short
        assert!(parse_address("address", "0xabab").is_err());
        // Not hex
        assert!(parse_address("address", "0xzzababababababababababababababababababab").is_err());
    }

    #[test]
    fn test_tx_hash_pattern() {
        let hash = format!("0x{}", "12".repeat(32));
        assert!(parse_tx_hash(&hash).is_ok());
        assert!(parse_tx_hash(&hash[..40]).is_err());
    }

    #[test]
    fn test_amount_is_converted_to_wei() {
        assert_eq!(parse_amount("1.5").unwrap(), U256::from(1_500_000_000_000_000_000u128));
        assert!(matches!(parse_amount("0"), Err(InvalidRequest::InvalidAmount { .. })));
        assert!(matches!(parse_amount("lots"), Err(InvalidRequest::InvalidAmount { .. })));
    }

    #[test]
    fn test_send_funds_requires_all_fields() {
        let params = SubmitParams {
            address: Some(ADDR.into()),
            to: Some(OTHER.into()),
            ..SubmitParams::default()
        };
        assert_eq!(
            build_request(OperationKind::SendFunds, &params),
            Err(InvalidRequest::MissingField("amount"))
        );

        let params = SubmitParams {
            amount: Some("0.25".into()),
            nonce: Some(9),
            ..params
        };
        match build_request(OperationKind::SendFunds, &params).unwrap() {
            OperationRequest::SendFunds(transfer) => {
                assert_eq!(transfer.nonce, Some(9));
                assert_eq!(transfer.value_wei, U256::from(250_000_000_000_000_000u128));
            }
            other => panic!("unexpected request {other:?}"),
        }
    }

    #[test]
    fn test_from_alias_and_unknown_kind() {
        let params: SubmitParams = serde_json::from_str(&format!(r#"{{"from":"{ADDR}"}}"#)).unwrap();
        assert!(build_request_named("get_balance", &params).is_ok());
        assert_eq!(
            build_request_named("MINT", &params),
            Err(InvalidRequest::UnknownKind("MINT".into()))
        );
    }

    #[test]
    fn test_parameterless_kinds() {
        let params = SubmitParams::default();
        assert_eq!(
            build_request(OperationKind::GetGasPrice, &params).unwrap(),
            OperationRequest::GetGasPrice
        );
        assert_eq!(
            build_request(OperationKind::GetBlock, &params),
            Err(InvalidRequest::MissingField("block_number"))
        );
    }
}
