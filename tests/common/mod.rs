//! Shared utilities for integration tests.

#![allow(dead_code)]

use alloy::primitives::{Address, TxHash, B256, U256};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use web3_gateway::blockchain::types::{
    BlockSummary, BlockchainResult, ChainId, NetworkInfo, NewWallet, ReceiptSummary,
    TransactionSummary, Transfer,
};
use web3_gateway::blockchain::{BlockchainError, ChainClient};
use web3_gateway::config::GatewayConfig;
use web3_gateway::Gateway;

pub const ADDR: &str = "0xabababababababababababababababababababab";
pub const OTHER: &str = "0xcdcdcdcdcdcdcdcdcdcdcdcdcdcdcdcdcdcdcdcd";

/// 1.5 ETH.
pub const BALANCE_WEI: u128 = 1_500_000_000_000_000_000;

/// Programmable in-process chain.
///
/// Every call is counted. `fail_next` makes the next N calls fail with a
/// transient RPC error; `fail_permanently` makes every call fail with a
/// node rejection. `delay` holds each call open, and the peak number of
/// overlapping calls is tracked. `panic_on_balance` makes balance lookups
/// panic outright.
#[derive(Default)]
pub struct StubChainClient {
    pub calls: AtomicU32,
    pub balance_calls: AtomicU32,
    pub send_calls: AtomicU32,
    pub block_number_calls: AtomicU32,
    fail_next: AtomicU32,
    fail_permanently: AtomicBool,
    panic_on_balance: AtomicBool,
    delay_ms: AtomicU64,
    active: AtomicUsize,
    pub peak_active: AtomicUsize,
    pub transfers: Mutex<Vec<Transfer>>,
}

impl StubChainClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    pub fn fail_permanently(&self, on: bool) {
        self.fail_permanently.store(on, Ordering::SeqCst);
    }

    pub fn panic_on_balance(&self, on: bool) {
        self.panic_on_balance.store(on, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> BlockchainResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_active.fetch_max(now, Ordering::SeqCst);

        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.fail_permanently.load(Ordering::SeqCst) {
            return Err(BlockchainError::Rejected("stub rejects everything".into()));
        }
        let failing = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(BlockchainError::Rpc("stub transient failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainClient for StubChainClient {
    async fn create_wallet(&self) -> BlockchainResult<NewWallet> {
        self.enter().await?;
        Ok(NewWallet {
            address: Address::repeat_byte(0x11),
            private_key: format!("0x{}", "22".repeat(32)),
        })
    }

    async fn get_balance(&self, _address: Address) -> BlockchainResult<U256> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        if self.panic_on_balance.load(Ordering::SeqCst) {
            panic!("stub balance lookup blew up");
        }
        self.enter().await?;
        Ok(U256::from(BALANCE_WEI))
    }

    async fn get_transaction_count(&self, _address: Address) -> BlockchainResult<u64> {
        self.enter().await?;
        Ok(7)
    }

    async fn send_funds(&self, transfer: &Transfer) -> BlockchainResult<TxHash> {
        let n = self.send_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.enter().await?;
        if let Ok(mut sent) = self.transfers.lock() {
            sent.push(transfer.clone());
        }
        Ok(B256::from(U256::from(n)))
    }

    async fn get_transaction_history(&self, _address: Address) -> BlockchainResult<Vec<TransactionSummary>> {
        self.enter().await?;
        Ok(Vec::new())
    }

    async fn get_gas_price(&self) -> BlockchainResult<u128> {
        self.enter().await?;
        Ok(20_000_000_000)
    }

    async fn get_block_number(&self) -> BlockchainResult<u64> {
        self.block_number_calls.fetch_add(1, Ordering::SeqCst);
        self.enter().await?;
        Ok(1_000)
    }

    async fn get_block(&self, number: u64) -> BlockchainResult<Option<BlockSummary>> {
        self.enter().await?;
        if number > 1_000 {
            return Ok(None);
        }
        Ok(Some(BlockSummary {
            number,
            hash: B256::repeat_byte(0x33),
            parent_hash: B256::repeat_byte(0x32),
            timestamp: 1_700_000_000,
            gas_used: 21_000,
            gas_limit: 30_000_000,
            base_fee_per_gas: Some(7),
            transaction_count: 1,
        }))
    }

    async fn get_transaction(&self, _hash: TxHash) -> BlockchainResult<Option<TransactionSummary>> {
        self.enter().await?;
        Ok(None)
    }

    async fn get_transaction_receipt(&self, hash: TxHash) -> BlockchainResult<Option<ReceiptSummary>> {
        self.enter().await?;
        Ok(Some(ReceiptSummary {
            transaction_hash: hash,
            block_number: Some(999),
            success: true,
            gas_used: 21_000,
            contract_address: None,
        }))
    }

    async fn estimate_gas(&self, _from: Address, _to: Address, _value_wei: U256) -> BlockchainResult<u64> {
        self.enter().await?;
        Ok(21_000)
    }

    async fn get_network_info(&self) -> BlockchainResult<NetworkInfo> {
        self.enter().await?;
        Ok(NetworkInfo {
            chain_id: ChainId(31337),
            syncing: false,
            latest_block: 1_000,
        })
    }
}

/// Defaults tuned for tests: short retry delays, no chain health probe.
pub fn test_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.workers.concurrency = 4;
    config.retries.delay_ms = 10;
    config.retries.max_delay_ms = 50;
    config.retries.attempt_timeout_ms = 1_000;
    config.health_check.enabled = false;
    config.timeouts.max_wait_ms = 5_000;
    config
}

pub async fn start_gateway(config: GatewayConfig, chain: Arc<StubChainClient>) -> Gateway {
    Gateway::start(config, chain).await.unwrap()
}
