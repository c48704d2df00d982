//! Blockchain RPC client with timeout and error handling.
//!
//! # Responsibilities
//! - Define the `ChainClient` boundary the worker pool executes against
//! - Connect to JSON-RPC endpoints (primary + failovers)
//! - Query chain state (balances, blocks, transactions, receipts)
//! - Submit transfers from node-managed accounts
//! - Classify failures as transient or permanent

use alloy::consensus::Transaction as ConsensusTransaction;
use alloy::eips::BlockNumberOrTag;
use alloy::network::{TransactionBuilder, TransactionResponse};
use alloy::primitives::{Address, TxHash, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::{SyncStatus, TransactionRequest};
use alloy::transports::TransportResult;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::blockchain::transaction::TransferBuilder;
use crate::blockchain::types::{
    BlockSummary, BlockchainConfig, BlockchainError, BlockchainResult, ChainId, NetworkInfo,
    NewWallet, ReceiptSummary, TransactionSummary, Transfer,
};
use crate::blockchain::wallet;

/// Remote chain operations, one method per operation kind.
///
/// Implementations may fail transiently; callers decide whether to retry.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn create_wallet(&self) -> BlockchainResult<NewWallet>;

    async fn get_balance(&self, address: Address) -> BlockchainResult<U256>;

    async fn get_transaction_count(&self, address: Address) -> BlockchainResult<u64>;

    /// Submit a transfer. Not idempotent unless `transfer.nonce` is set.
    async fn send_funds(&self, transfer: &Transfer) -> BlockchainResult<TxHash>;

    /// Transactions touching `address` within the recent history window.
    async fn get_transaction_history(&self, address: Address) -> BlockchainResult<Vec<TransactionSummary>>;

    async fn get_gas_price(&self) -> BlockchainResult<u128>;

    async fn get_block_number(&self) -> BlockchainResult<u64>;

    async fn get_block(&self, number: u64) -> BlockchainResult<Option<BlockSummary>>;

    async fn get_transaction(&self, hash: TxHash) -> BlockchainResult<Option<TransactionSummary>>;

    async fn get_transaction_receipt(&self, hash: TxHash) -> BlockchainResult<Option<ReceiptSummary>>;

    async fn estimate_gas(&self, from: Address, to: Address, value_wei: U256) -> BlockchainResult<u64>;

    async fn get_network_info(&self) -> BlockchainResult<NetworkInfo>;
}

type DynProvider = Arc<dyn Provider + Send + Sync>;

/// JSON-RPC backed `ChainClient` with failover support.
#[derive(Clone)]
pub struct RpcChainClient {
    /// List of providers (primary + failovers).
    providers: Vec<DynProvider>,
    /// Configuration.
    config: BlockchainConfig,
    /// Request timeout duration.
    timeout_duration: Duration,
}

impl RpcChainClient {
    /// Create a new blockchain client.
    ///
    /// Creation succeeds even when the endpoint is unreachable; the chain id
    /// check only warns so the gateway can start and report unhealthy.
    pub async fn new(config: BlockchainConfig) -> BlockchainResult<Self> {
        let timeout_duration = Duration::from_secs(config.rpc_timeout_secs);
        let mut providers = Vec::new();

        let primary_url: url::Url = config.rpc_url.parse().map_err(|e| {
            BlockchainError::Rpc(format!("Invalid RPC URL '{}': {}", config.rpc_url, e))
        })?;
        providers.push(Arc::new(ProviderBuilder::new().connect_http(primary_url)) as DynProvider);

        for url_str in &config.failover_urls {
            if let Ok(url) = url_str.parse() {
                providers.push(Arc::new(ProviderBuilder::new().connect_http(url)) as DynProvider);
            } else {
                tracing::warn!(url = %url_str, "Ignoring invalid failover RPC URL");
            }
        }

        let client = Self {
            providers,
            config: config.clone(),
            timeout_duration,
        };

        match client.verify_chain_id().await {
            Ok(()) => {
                tracing::info!(
                    rpc_url = %config.rpc_url,
                    chain_id = config.chain_id,
                    failovers = client.providers.len() - 1,
                    "Chain client initialized"
                );
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Chain client initialized but chain verification failed"
                );
            }
        }

        Ok(client)
    }

    /// Verify the connected chain ID matches configuration.
    pub async fn verify_chain_id(&self) -> BlockchainResult<()> {
        let chain_id = self.chain_id().await?;
        if chain_id.0 != self.config.chain_id {
            return Err(BlockchainError::ChainMismatch {
                expected: self.config.chain_id,
                actual: chain_id.0,
            });
        }
        Ok(())
    }

    async fn chain_id(&self) -> BlockchainResult<ChainId> {
        self.with_failover("chain id", |p| async move { p.get_chain_id().await })
            .await
            .map(ChainId)
    }

    /// Get the configuration.
    pub fn config(&self) -> &BlockchainConfig {
        &self.config
    }

    /// Run `call` against each provider in order until one answers.
    ///
    /// A JSON-RPC error response is the node's definitive answer and is not
    /// retried on the next provider.
    async fn with_failover<T, F, Fut>(&self, what: &'static str, call: F) -> BlockchainResult<T>
    where
        F: Fn(DynProvider) -> Fut,
        Fut: Future<Output = TransportResult<T>>,
    {
        let mut last_error = None;
        for (i, provider) in self.providers.iter().enumerate() {
            match timeout(self.timeout_duration, call(provider.clone())).await {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(e)) if e.as_error_resp().is_some() => {
                    return Err(BlockchainError::Rejected(e.to_string()));
                }
                Ok(Err(e)) => {
                    tracing::warn!(provider_idx = i, call = what, error = %e, "RPC error, trying next provider");
                    last_error = Some(BlockchainError::Rpc(format!("{}: {}", what, e)));
                }
                Err(_) => {
                    tracing::warn!(provider_idx = i, call = what, "RPC timeout, trying next provider");
                    last_error = Some(BlockchainError::Timeout(self.timeout_duration));
                }
            }
        }
        Err(last_error
            .unwrap_or_else(|| BlockchainError::Rpc(format!("All providers failed to get {}", what))))
    }

    /// Primary provider only. Used for calls that must not be replayed
    /// against a second endpoint.
    async fn on_primary<T, Fut>(&self, what: &'static str, fut: Fut) -> BlockchainResult<T>
    where
        Fut: Future<Output = TransportResult<T>>,
    {
        match timeout(self.timeout_duration, fut).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) if e.as_error_resp().is_some() => Err(BlockchainError::Rejected(e.to_string())),
            Ok(Err(e)) => Err(BlockchainError::Rpc(format!("{}: {}", what, e))),
            Err(_) => Err(BlockchainError::Timeout(self.timeout_duration)),
        }
    }

    fn primary(&self) -> DynProvider {
        self.providers[0].clone()
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn create_wallet(&self) -> BlockchainResult<NewWallet> {
        wallet::generate()
    }

    async fn get_balance(&self, address: Address) -> BlockchainResult<U256> {
        self.with_failover("balance", |p| async move { p.get_balance(address).await })
            .await
    }

    async fn get_transaction_count(&self, address: Address) -> BlockchainResult<u64> {
        self.with_failover("transaction count", |p| async move {
            p.get_transaction_count(address).await
        })
        .await
    }

    async fn send_funds(&self, transfer: &Transfer) -> BlockchainResult<TxHash> {
        let gas_price = self.get_gas_price().await?;
        let nonce = match transfer.nonce {
            Some(nonce) => nonce,
            None => self.get_transaction_count(transfer.from).await?,
        };
        let request = TransferBuilder::new(&self.config).build(transfer, nonce, gas_price)?;

        let primary = self.primary();
        let tx_hash = self
            .on_primary("send transaction", async move {
                primary
                    .send_transaction(request)
                    .await
                    .map(|pending| *pending.tx_hash())
            })
            .await?;

        tracing::info!(
            from = %transfer.from,
            to = %transfer.to,
            nonce = nonce,
            tx_hash = %tx_hash,
            "Transfer submitted"
        );
        Ok(tx_hash)
    }

    async fn get_transaction_history(&self, address: Address) -> BlockchainResult<Vec<TransactionSummary>> {
        let latest = self.get_block_number().await?;
        let first = latest.saturating_sub(self.config.history_scan_blocks.saturating_sub(1));

        let fetches = (first..=latest).map(|number| {
            self.with_failover("block", move |p| async move {
                p.get_block_by_number(BlockNumberOrTag::Number(number))
                    .full()
                    .await
            })
        });

        let mut history = Vec::new();
        for block in futures_util::future::join_all(fetches).await {
            let Some(block) = block? else { continue };
            let Some(transactions) = block.transactions.as_transactions() else {
                continue;
            };
            for tx in transactions {
                let touches = TransactionResponse::from(tx) == address
                    || ConsensusTransaction::to(tx) == Some(address);
                if touches {
                    history.push(transaction_summary(tx));
                }
            }
        }
        history.sort_by(|a, b| b.block_number.cmp(&a.block_number));
        Ok(history)
    }

    async fn get_gas_price(&self) -> BlockchainResult<u128> {
        self.with_failover("gas price", |p| async move { p.get_gas_price().await })
            .await
    }

    async fn get_block_number(&self) -> BlockchainResult<u64> {
        self.with_failover("block number", |p| async move { p.get_block_number().await })
            .await
    }

    async fn get_block(&self, number: u64) -> BlockchainResult<Option<BlockSummary>> {
        let block = self
            .with_failover("block", |p| async move {
                p.get_block_by_number(BlockNumberOrTag::Number(number)).await
            })
            .await?;

        Ok(block.map(|block| BlockSummary {
            number: block.header.number,
            hash: block.header.hash,
            parent_hash: block.header.parent_hash,
            timestamp: block.header.timestamp,
            gas_used: block.header.gas_used,
            gas_limit: block.header.gas_limit,
            base_fee_per_gas: block.header.base_fee_per_gas,
            transaction_count: block.transactions.len(),
        }))
    }

    async fn get_transaction(&self, hash: TxHash) -> BlockchainResult<Option<TransactionSummary>> {
        let tx = self
            .with_failover("transaction", |p| async move { p.get_transaction_by_hash(hash).await })
            .await?;
        Ok(tx.as_ref().map(transaction_summary))
    }

    async fn get_transaction_receipt(&self, hash: TxHash) -> BlockchainResult<Option<ReceiptSummary>> {
        let receipt = self
            .with_failover("receipt", |p| async move { p.get_transaction_receipt(hash).await })
            .await?;

        Ok(receipt.map(|receipt| ReceiptSummary {
            transaction_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
            success: receipt.status(),
            gas_used: u64::try_from(receipt.gas_used).unwrap_or(u64::MAX),
            contract_address: receipt.contract_address,
        }))
    }

    async fn estimate_gas(&self, from: Address, to: Address, value_wei: U256) -> BlockchainResult<u64> {
        let request = TransactionRequest::default()
            .with_from(from)
            .with_to(to)
            .with_value(value_wei);

        self.with_failover("gas estimate", |p| {
            let request = request.clone();
            async move { p.estimate_gas(request).await }
        })
        .await
    }

    async fn get_network_info(&self) -> BlockchainResult<NetworkInfo> {
        let chain_id = self.chain_id().await?;
        let syncing = self
            .with_failover("sync status", |p| async move { p.syncing().await })
            .await?;
        let latest_block = self.get_block_number().await?;

        Ok(NetworkInfo {
            chain_id,
            syncing: matches!(syncing, SyncStatus::Info(_)),
            latest_block,
        })
    }
}

fn transaction_summary(tx: &alloy::rpc::types::Transaction) -> TransactionSummary {
    TransactionSummary {
        hash: TransactionResponse::tx_hash(tx),
        from: TransactionResponse::from(tx),
        to: ConsensusTransaction::to(tx),
        value_wei: ConsensusTransaction::value(tx),
        nonce: ConsensusTransaction::nonce(tx),
        block_number: tx.block_number,
    }
}

impl std::fmt::Debug for RpcChainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcChainClient")
            .field("rpc_url", &self.config.rpc_url)
            .field("chain_id", &self.config.chain_id)
            .field("timeout_secs", &self.config.rpc_timeout_secs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> BlockchainConfig {
        BlockchainConfig {
            rpc_url: "http://localhost:8545".to_string(),
            chain_id: 31337, // Anvil default
            rpc_timeout_secs: 2,
            ..BlockchainConfig::default()
        }
    }

    #[tokio::test]
    async fn test_client_creation() {
        // Creation must not fail when nothing listens on the endpoint.
        let result = RpcChainClient::new(test_config()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_rpc_url_rejected() {
        let mut config = test_config();
        config.rpc_url = "not a url".to_string();
        let err = RpcChainClient::new(config).await.unwrap_err();
        assert!(err.to_string().contains("Invalid RPC URL"));
    }

    #[tokio::test]
    async fn test_rpc_failover_reports_transient_error() {
        let mut config = test_config();
        config.rpc_url = "http://127.0.0.1:1".to_string();
        config.failover_urls.push("http://127.0.0.1:2".to_string());

        let client = RpcChainClient::new(config).await.unwrap();
        let err = client.get_block_number().await.unwrap_err();
        assert!(err.is_transient());
    }
}
