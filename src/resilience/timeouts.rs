//! Timeout enforcement.
//!
//! Every remote call runs under a deadline. A call that overruns is
//! cancelled and reported as `BlockchainError::Timeout`, which the retry
//! loop treats as transient.

use std::future::Future;
use std::time::Duration;

use crate::blockchain::{BlockchainError, BlockchainResult};

pub async fn with_deadline<T, Fut>(deadline: Duration, call: Fut) -> BlockchainResult<T>
where
    Fut: Future<Output = BlockchainResult<T>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(BlockchainError::Timeout(deadline)),
    }
}
