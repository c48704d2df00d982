//! Executes one operation: cache check, retried chain call, cache fill.

use alloy::primitives::utils::{format_ether, format_units};
use alloy::primitives::{Address, TxHash, U256};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::blockchain::types::Transfer;
use crate::blockchain::{BlockchainError, BlockchainResult, ChainClient};
use crate::cache::ResultCache;
use crate::config::CacheConfig;
use crate::operation::OperationRequest;
use crate::resilience::RetryExecutor;
use crate::worker::ordering::AddressLocks;

/// How a request is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route<'a> {
    /// Not idempotent; serialized per sender with its own retry rule.
    Transfer(&'a Transfer),
    /// Safe to retry under the general policy.
    Call(ChainCall),
}

/// Every chain call except a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChainCall {
    CreateWallet,
    Balance(Address),
    History(Address),
    TransactionCount(Address),
    GasPrice,
    LatestBlock,
    Block(u64),
    Transaction(TxHash),
    Receipt(TxHash),
    EstimateGas { from: Address, to: Address, value_wei: U256 },
    NetworkInfo,
}

impl<'a> From<&'a OperationRequest> for Route<'a> {
    fn from(request: &'a OperationRequest) -> Self {
        let call = match request {
            OperationRequest::SendFunds(transfer) => return Route::Transfer(transfer),
            OperationRequest::CreateWallet => ChainCall::CreateWallet,
            OperationRequest::GetBalance { address } => ChainCall::Balance(*address),
            OperationRequest::GetTransactionHistory { address } => ChainCall::History(*address),
            OperationRequest::GetTransactionCount { address } => ChainCall::TransactionCount(*address),
            OperationRequest::GetGasPrice => ChainCall::GasPrice,
            OperationRequest::GetLatestBlock => ChainCall::LatestBlock,
            OperationRequest::GetBlock { number } => ChainCall::Block(*number),
            OperationRequest::GetTransaction { hash } => ChainCall::Transaction(*hash),
            OperationRequest::GetTransactionReceipt { hash } => ChainCall::Receipt(*hash),
            OperationRequest::EstimateGas { from, to, value_wei } => ChainCall::EstimateGas {
                from: *from,
                to: *to,
                value_wei: *value_wei,
            },
            OperationRequest::GetNetworkInfo => ChainCall::NetworkInfo,
        };
        Route::Call(call)
    }
}

/// Composition of cache, retry policy and chain client, built once at startup.
pub struct OperationHandler {
    chain: Arc<dyn ChainClient>,
    cache: ResultCache,
    cache_config: CacheConfig,
    retry: RetryExecutor,
    /// `None` when transfers from one sender may run concurrently.
    send_locks: Option<AddressLocks>,
}

impl OperationHandler {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        cache: ResultCache,
        cache_config: CacheConfig,
        retry: RetryExecutor,
        send_locks: Option<AddressLocks>,
    ) -> Self {
        Self {
            chain,
            cache,
            cache_config,
            retry,
            send_locks,
        }
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    pub fn send_locks(&self) -> Option<&AddressLocks> {
        self.send_locks.as_ref()
    }

    /// Resolve a request to its success payload.
    pub async fn handle(&self, request: &OperationRequest) -> BlockchainResult<Value> {
        let key = request.cache_key();
        if let Some(hit) = key.as_ref().and_then(|key| self.cache.get(key)) {
            tracing::debug!("Served from cache");
            return Ok(hit);
        }

        let payload = match Route::from(request) {
            Route::Transfer(transfer) => self.send_funds(transfer).await?,
            Route::Call(call) => {
                self.retry
                    .execute(request.kind().as_str(), || self.invoke(call))
                    .await?
            }
        };

        if let Some(key) = key {
            self.cache
                .put(key, payload.clone(), self.cache_config.policy_for(request.kind()));
        }
        Ok(payload)
    }

    /// Transfers are not idempotent: without a client nonce a retry could
    /// send twice, so they get exactly one attempt.
    async fn send_funds(&self, transfer: &Transfer) -> BlockchainResult<Value> {
        let _ordering = match &self.send_locks {
            Some(locks) => Some(locks.lock(transfer.from).await),
            None => None,
        };

        let hash = if transfer.nonce.is_some() {
            self.retry
                .execute("SEND_FUNDS", || self.chain.send_funds(transfer))
                .await?
        } else {
            self.retry.execute_once(self.chain.send_funds(transfer)).await?
        };

        tracing::info!(from = %transfer.from, to = %transfer.to, tx_hash = %hash, "Transfer submitted");
        Ok(json!({
            "transaction_hash": hash,
            "from": transfer.from,
            "to": transfer.to,
            "value_wei": transfer.value_wei.to_string(),
            "value_eth": format_ether(transfer.value_wei),
            "nonce": transfer.nonce,
        }))
    }

    async fn invoke(&self, call: ChainCall) -> BlockchainResult<Value> {
        let payload = match call {
            ChainCall::CreateWallet => {
                let wallet = self.chain.create_wallet().await?;
                json!({
                    "address": wallet.address,
                    "private_key": wallet.private_key,
                })
            }
            ChainCall::Balance(address) => {
                let balance = self.chain.get_balance(address).await?;
                json!({
                    "address": address,
                    "balance_wei": balance.to_string(),
                    "balance_eth": format_ether(balance),
                })
            }
            ChainCall::History(address) => {
                let transactions = self.chain.get_transaction_history(address).await?;
                json!({
                    "address": address,
                    "count": transactions.len(),
                    "transactions": transactions,
                })
            }
            ChainCall::TransactionCount(address) => {
                let count = self.chain.get_transaction_count(address).await?;
                json!({ "address": address, "transaction_count": count })
            }
            ChainCall::GasPrice => {
                let price = self.chain.get_gas_price().await?;
                json!({
                    "gas_price_wei": price.to_string(),
                    "gas_price_gwei": format_units(U256::from(price), "gwei").unwrap_or_default(),
                })
            }
            ChainCall::LatestBlock => {
                let number = self.chain.get_block_number().await?;
                json!({ "block_number": number })
            }
            ChainCall::Block(number) => {
                let block = self
                    .chain
                    .get_block(number)
                    .await?
                    .ok_or_else(|| BlockchainError::NotFound(format!("block {number}")))?;
                json!(block)
            }
            ChainCall::Transaction(hash) => {
                let tx = self
                    .chain
                    .get_transaction(hash)
                    .await?
                    .ok_or_else(|| BlockchainError::NotFound(format!("transaction {hash}")))?;
                json!(tx)
            }
            ChainCall::Receipt(hash) => {
                let receipt = self
                    .chain
                    .get_transaction_receipt(hash)
                    .await?
                    .ok_or_else(|| BlockchainError::NotFound(format!("receipt for {hash}")))?;
                json!(receipt)
            }
            ChainCall::EstimateGas { from, to, value_wei } => {
                let gas = self.chain.estimate_gas(from, to, value_wei).await?;
                json!({ "gas_limit": gas })
            }
            ChainCall::NetworkInfo => json!(self.chain.get_network_info().await?),
        };
        Ok(payload)
    }
}
