//! Transfer request building.
//!
//! # Responsibilities
//! - Build native-token transfer requests for node-managed accounts
//! - Guard against gas price spikes
//! - Apply the configured gas price safety margin

use alloy::network::TransactionBuilder;
use alloy::rpc::types::TransactionRequest;

use crate::blockchain::types::{BlockchainConfig, BlockchainError, BlockchainResult, Transfer};

/// Gas limit of a plain value transfer.
pub const TRANSFER_GAS_LIMIT: u64 = 21_000;

const WEI_PER_GWEI: u128 = 1_000_000_000;

/// Builds `TransactionRequest`s for transfers.
pub struct TransferBuilder<'a> {
    config: &'a BlockchainConfig,
}

impl<'a> TransferBuilder<'a> {
    pub fn new(config: &'a BlockchainConfig) -> Self {
        Self { config }
    }

    /// Build a transfer request.
    ///
    /// # Arguments
    /// * `transfer` - Sender, recipient and value
    /// * `nonce` - Nonce to submit with (client-supplied or fetched)
    /// * `gas_price` - Current network gas price in wei
    pub fn build(
        &self,
        transfer: &Transfer,
        nonce: u64,
        gas_price: u128,
    ) -> BlockchainResult<TransactionRequest> {
        let gas_price_gwei = gas_price / WEI_PER_GWEI;
        if gas_price_gwei > self.config.max_gas_price_gwei as u128 {
            return Err(BlockchainError::GasPriceTooHigh {
                current_gwei: u64::try_from(gas_price_gwei).unwrap_or(u64::MAX),
                max_gwei: self.config.max_gas_price_gwei,
            });
        }

        let adjusted_gas_price = (gas_price as f64 * self.config.gas_price_multiplier) as u128;

        Ok(TransactionRequest::default()
            .with_from(transfer.from)
            .with_to(transfer.to)
            .with_value(transfer.value_wei)
            .with_nonce(nonce)
            .with_gas_price(adjusted_gas_price)
            .with_chain_id(self.config.chain_id)
            .with_gas_limit(TRANSFER_GAS_LIMIT))
    }
}
